use crate::analyzer::LogAnalyzer;
use crate::error::Result;
use chrono::NaiveDateTime;
use log::info;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

const STATS_PREFIX: &str = "Stats ";

/// Walk every physical line of `path` in order, numbering from 1.
///
/// Invalid UTF-8 is replaced rather than rejected, so one bad byte never
/// aborts the pass. The file handle is dropped when the walk ends, on the
/// error path as well.
async fn for_each_line<F>(path: &Path, mut handle: F) -> Result<usize>
where
    F: FnMut(usize, &str),
{
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_number += 1;
        let line = String::from_utf8_lossy(&buf);
        handle(line_number, &*line);
    }

    Ok(line_number)
}

/// Single parse pass feeding every line of the log into the analyzer.
pub async fn parse_log(path: &Path, analyzer: &mut LogAnalyzer) -> Result<()> {
    info!("Analyzing Klipper log: {}", path.display());

    for_each_line(path, |number, line| analyzer.ingest_line(number, line)).await?;

    info!("Parsed {} lines", analyzer.lines_read());
    info!("Found {} stats entries", analyzer.snapshots().len());
    info!("Found {} MCU configurations", analyzer.mcus().len());
    info!("Found {} errors/warnings", analyzer.errors().len());
    info!("Found {} config sections", analyzer.config_sections().len());

    Ok(())
}

/// Copy every `Stats ` line of the log into `output`, tagged with its line number.
pub async fn extract_stats(path: &Path, output: &Path, extracted_at: NaiveDateTime) -> Result<usize> {
    let mut stats_lines = Vec::new();
    for_each_line(path, |number, line| {
        let line = line.trim();
        if line.starts_with(STATS_PREFIX) {
            stats_lines.push((number, line.to_string()));
        }
    })
    .await?;

    let content = render_stats_extract(path, &stats_lines, extracted_at);
    tokio::fs::write(output, content).await?;

    info!("Extracted {} stats lines to {}", stats_lines.len(), output.display());
    Ok(stats_lines.len())
}

fn render_stats_extract(source: &Path, stats_lines: &[(usize, String)], extracted_at: NaiveDateTime) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Klipper Stats Lines Extracted from {}\n", source.display()));
    out.push_str(&format!("# Total stats lines found: {}\n", stats_lines.len()));
    out.push_str(&format!("# Extracted on: {}\n\n", extracted_at.format("%Y-%m-%d %H:%M:%S")));
    for (number, line) in stats_lines {
        out.push_str(&format!("Line {}: {}\n", number, line));
    }
    out
}
