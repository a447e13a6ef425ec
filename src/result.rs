//! Attack result artifacts and the per-sub-target result tracker.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{Hit, Metrics};
use crate::report::calculate_metrics;
use crate::target::HttpTarget;

/// Reference to the stored hits of one finished attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub http_target_id: String,
    /// Unique within its HTTP target
    pub name: String,
    #[serde(skip)]
    full_path: PathBuf,
}

impl AttackResult {
    pub fn new(http_target_id: impl Into<String>, dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            http_target_id: http_target_id.into(),
            full_path: dir.join(&name),
            name,
        }
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Write hits as JSON lines to a new result file. An existing file is
    /// never replaced.
    pub fn save(&self, hits: &[Hit]) -> anyhow::Result<()> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.full_path)
            .with_context(|| format!("Failed to create result file: {}", self.full_path.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        for hit in hits {
            serde_json::to_writer(&mut writer, hit)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read back the hits of the result file. Unparseable lines are skipped.
    pub fn load(&self) -> anyhow::Result<Vec<Hit>> {
        let file = std::fs::File::open(&self.full_path)
            .with_context(|| format!("Failed to open result file: {}", self.full_path.display()))?;
        let hits = BufReader::new(file)
            .lines()
            .filter_map(|line| {
                let line = line.ok()?;
                serde_json::from_str(&line).ok()
            })
            .collect();
        Ok(hits)
    }

    /// Summarize the stored hits
    pub fn report(&self) -> anyhow::Result<Metrics> {
        let hits = self.load()?;
        Ok(calculate_metrics(&hits).unwrap_or_default())
    }
}

/// What `add_result` does when the name is already tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnDuplicate {
    /// Fail with [`Error::DuplicateResultName`]
    #[default]
    Reject,
    /// Replace the existing entry, keeping its position
    Overwrite,
}

impl HttpTarget {
    /// Track a new result stored under `dir`.
    pub fn add_result(&mut self, dir: &Path, name: &str, on_duplicate: OnDuplicate) -> Result<&AttackResult> {
        let result = AttackResult::new(self.id.clone(), dir, name);

        let index = match self.results.iter().position(|r| r.name == name) {
            Some(_) if on_duplicate == OnDuplicate::Reject => {
                return Err(Error::DuplicateResultName(name.to_string()));
            }
            Some(index) => {
                self.results[index] = result;
                index
            }
            None => {
                self.results.push(result);
                self.results.len() - 1
            }
        };
        Ok(&self.results[index])
    }

    pub fn get_result_by_name(&self, name: &str) -> Option<&AttackResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Stop tracking the result named `name`; the order of the remaining
    /// results is kept. Nothing happens if the name is unknown.
    pub fn delete_result(&mut self, name: &str) -> Option<AttackResult> {
        let index = self.results.iter().position(|r| r.name == name)?;
        Some(self.results.remove(index))
    }
}
