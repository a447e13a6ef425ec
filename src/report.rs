use std::io::Write;
use std::time::Duration;

use crate::models::{Hit, Metrics};
use crate::utils::{format_duration, format_size};

/// Calculate metrics from the hits of an attack
pub fn calculate_metrics(hits: &[Hit]) -> Option<Metrics> {
    let first = hits.iter().map(|h| h.timestamp).min()?;
    let last = hits.iter().map(|h| h.timestamp).max()?;

    let requests = hits.len();
    let success = hits.iter().filter(|h| h.is_success()).count();
    let success_rate = success as f64 / requests as f64;

    let duration = (last - first).to_std().unwrap_or(Duration::ZERO);

    let mut latencies: Vec<Duration> = hits.iter().map(|h| h.latency).collect();
    latencies.sort();

    let min = latencies.first().copied().unwrap_or_default();
    let max = latencies.last().copied().unwrap_or_default();
    let sum: Duration = latencies.iter().sum();
    let mean = sum / latencies.len() as u32;

    let rate = if duration.as_secs_f64() > 0.0 {
        requests as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    let mut errors: Vec<String> = Vec::new();
    for error in hits.iter().filter_map(|h| h.error.as_ref()) {
        if !errors.contains(error) {
            errors.push(error.clone());
        }
    }

    Some(Metrics {
        requests,
        success,
        duration,
        min,
        max,
        mean,
        p50: percentile(&latencies, 0.5),
        p90: percentile(&latencies, 0.9),
        p95: percentile(&latencies, 0.95),
        p99: percentile(&latencies, 0.99),
        rate,
        bytes_in: hits.iter().map(|h| h.bytes_in).sum(),
        bytes_out: hits.iter().map(|h| h.bytes_out).sum(),
        success_rate,
        errors,
    })
}

/// Calculate a percentile from a sorted list of durations
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }

    let index = (sorted.len() as f64 * p) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Write a text report of the metrics
pub fn write_text_report<W: Write>(writer: &mut W, metrics: &Metrics) -> std::io::Result<()> {
    if metrics.requests == 0 {
        writeln!(writer, "No results to report")?;
        return Ok(());
    }

    writeln!(writer, "Requests:\t{}", metrics.requests)?;
    writeln!(writer, "Duration:\t{}", format_duration(metrics.duration))?;
    writeln!(writer, "Rate:\t\t{:.2} req/s", metrics.rate)?;
    writeln!(writer, "Success:\t{} ({:.2}%)", metrics.success, metrics.success_rate * 100.0)?;
    writeln!(writer, "Min:\t\t{}", format_duration(metrics.min))?;
    writeln!(writer, "Mean:\t\t{}", format_duration(metrics.mean))?;
    writeln!(writer, "50th percentile:\t{}", format_duration(metrics.p50))?;
    writeln!(writer, "90th percentile:\t{}", format_duration(metrics.p90))?;
    writeln!(writer, "95th percentile:\t{}", format_duration(metrics.p95))?;
    writeln!(writer, "99th percentile:\t{}", format_duration(metrics.p99))?;
    writeln!(writer, "Max:\t\t{}", format_duration(metrics.max))?;
    writeln!(writer, "Bytes in:\t{}", format_size(metrics.bytes_in))?;
    writeln!(writer, "Bytes out:\t{}", format_size(metrics.bytes_out))?;
    if !metrics.errors.is_empty() {
        writeln!(writer, "Errors:")?;
        for error in &metrics.errors {
            writeln!(writer, "\t{}", error)?;
        }
    }

    Ok(())
}
