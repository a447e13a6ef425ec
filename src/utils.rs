use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{HttpClientHandler, WebSocketClientHandler};
use crate::models::{FormInput, Header, KeyFormInput};
use crate::target::Target;

/// Parse HTTP headers from strings like "Name: Value"
pub fn parse_headers(headers: &[String]) -> Result<Vec<Header>> {
    let mut result = Vec::new();

    for header_str in headers {
        let (name, value) = header_str
            .split_once(':')
            .with_context(|| format!("Invalid header format: {}", header_str))?;
        result.push(Header::new(name.trim(), value.trim()));
    }

    Ok(result)
}

/// Parse parameters from strings like "name=value". Values that parse as
/// numbers are kept as numbers.
pub fn parse_params(params: &[String]) -> Result<KeyFormInput> {
    let mut result = KeyFormInput::new();

    for param_str in params {
        let (name, value) = param_str
            .split_once('=')
            .with_context(|| format!("Invalid parameter format: {}", param_str))?;
        let input = if value.trim().parse::<f64>().is_ok() {
            FormInput::number(value.trim())
        } else {
            FormInput::string(value)
        };
        result.insert(name.trim(), input);
    }

    Ok(result)
}

/// Header list as a form input map
pub fn headers_to_form(headers: &[Header]) -> KeyFormInput {
    headers
        .iter()
        .map(|h| (h.name.clone(), FormInput::string(h.value.clone())))
        .collect()
}

/// Load targets from a JSON file.
///
/// HTTP sub-targets are bound to [`HttpClientHandler`], WebSocket
/// sub-targets to [`WebSocketClientHandler`].
pub fn load_targets_file(path: &Path) -> Result<Vec<Target>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut targets: Vec<Target> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON targets: {}", path.display()))?;

    let http_handler = Arc::new(HttpClientHandler::default());
    let web_socket_handler = Arc::new(WebSocketClientHandler);
    for target in &mut targets {
        for ht in &mut target.http_targets {
            ht.set_handler(http_handler.clone());
        }
        for wt in &mut target.web_socket_targets {
            wt.set_handler(web_socket_handler.clone());
        }
    }

    Ok(targets)
}

/// Get a writer for a file or stdout
pub fn get_writer(path: &str) -> Result<Box<dyn Write>> {
    if path == "stdout" {
        Ok(Box::new(io::stdout()))
    } else {
        let file = File::create(path).context(format!("Failed to create file: {}", path))?;
        Ok(Box::new(file))
    }
}

/// Format a duration in a human-readable format
pub fn format_duration(duration: Duration) -> String {
    let total_micros = duration.as_micros();

    if total_micros < 1_000 {
        return format!("{}µs", total_micros);
    }

    let total_millis = duration.as_millis();
    if total_millis < 1_000 {
        return format!("{:.2}ms", duration.as_secs_f64() * 1000.0);
    }

    let total_secs = duration.as_secs_f64();
    if total_secs < 60.0 {
        return format!("{:.2}s", total_secs);
    }

    let minutes = (total_secs / 60.0).floor();
    let seconds = total_secs - (minutes * 60.0);
    format!("{}m{:.2}s", minutes as u64, seconds)
}

/// Format a size in a human-readable format
pub fn format_size(size: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if size < KB {
        format!("{}B", size)
    } else if size < MB {
        format!("{:.2}KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.2}MB", size as f64 / MB as f64)
    } else {
        format!("{:.2}GB", size as f64 / GB as f64)
    }
}
