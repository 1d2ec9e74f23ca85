use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::ValueEnum;
use forage_core::task::TaskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Text,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        })
    }
}

/// `forage_results_YYYYmmdd_HHMMSS.<ext>` in the working directory.
pub fn default_output_path(format: OutputFormat) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("forage_results_{timestamp}.{}", format.extension()))
}

pub fn save_results(results: &[TaskResult], format: OutputFormat, path: &Path) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(results, path),
        OutputFormat::Json => write_json(results, path),
        OutputFormat::Text => write_text(results, path),
    }
}

fn write_csv(results: &[TaskResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writer.write_record([
        "index",
        "target",
        "success",
        "attempts",
        "duration_secs",
        "error",
        "payload",
    ])?;
    for result in results {
        writer.write_record([
            result.index.to_string(),
            result.target.clone(),
            result.success.to_string(),
            result.attempts.to_string(),
            format!("{:.3}", result.duration.as_secs_f64()),
            result.error.clone().unwrap_or_default(),
            if result.payload.is_null() {
                String::new()
            } else {
                result.payload.to_string()
            },
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(results: &[TaskResult], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

fn write_text(results: &[TaskResult], path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for result in results {
        writeln!(file, "=== [{}] {} ===", result.index, result.target)?;
        writeln!(
            file,
            "status: {}",
            if result.success { "ok" } else { "failed" }
        )?;
        writeln!(file, "attempts: {}", result.attempts)?;
        writeln!(file, "duration: {:.2}s", result.duration.as_secs_f64())?;
        if let Some(error) = &result.error {
            writeln!(file, "error: {error}")?;
        }
        if !result.payload.is_null() {
            writeln!(file, "{}", serde_json::to_string_pretty(&result.payload)?)?;
        }
        writeln!(file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forage_core::task::ScrapeTask;
    use std::time::Duration;

    fn sample_results() -> Vec<TaskResult> {
        let ok = TaskResult::completed(
            &ScrapeTask::new("https://example.com/a", 0, 3),
            serde_json::json!({"title": "A", "likes": "12"}),
            Duration::from_millis(1500),
        );
        let failed = TaskResult::failed(
            &ScrapeTask::new("https://example.com/b", 1, 3),
            "page did not render body",
            Duration::from_secs(8),
        );
        vec![ok, failed]
    }

    #[test]
    fn test_json_sink_writes_readable_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        save_results(&sample_results(), OutputFormat::Json, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["target"], "https://example.com/a");
        assert_eq!(array[0]["payload"]["likes"], "12");
        assert_eq!(array[1]["success"], false);
        assert_eq!(array[1]["duration_secs"], 8.0);
    }

    #[test]
    fn test_csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        save_results(&sample_results(), OutputFormat::Csv, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("index,target,success"));
        assert!(lines[2].contains("page did not render body"));
    }

    #[test]
    fn test_text_sink_includes_target_and_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        save_results(&sample_results(), OutputFormat::Text, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("=== [0] https://example.com/a ==="));
        assert!(raw.contains("status: failed"));
        assert!(raw.contains("error: page did not render body"));
    }

    #[test]
    fn test_default_output_path_uses_format_extension() {
        let path = default_output_path(OutputFormat::Csv);
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        assert!(path.to_str().unwrap().starts_with("forage_results_"));
    }
}
