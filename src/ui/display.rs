//! Result lines and tables printed after a run.

use std::path::Path;

use bytesize::ByteSize;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::config::ArmorConfig;
use crate::types::{DecodeReport, EncodeReport, Processing};
use crate::worker::GroupHealth;

pub fn format_bytes(bytes: u64) -> String {
    ByteSize::b(bytes).display().iec().to_string()
}

pub fn show_success(processing: Processing, path: &Path) {
    println!();
    println!("{} {}", style("✓").green(), style(format!("File {} successfully: {}", processing.done(), path.display())).bold());
}

pub fn show_pruned(paths: &[std::path::PathBuf]) {
    for path in paths {
        println!("{} {}", style("-").dim(), style(format!("Removed old archive: {}", path.display())).dim());
    }
}

/// Warns about a decode that finished but lost data.
pub fn show_partial(report: &DecodeReport) {
    println!();
    println!("{} {}", style("!").yellow(), style(format!("Partial recovery: {report}")).yellow().bold());
    for failed in &report.failed {
        let id = failed.sequence.map_or_else(|| "?".to_owned(), |s| s.to_string());
        println!("    group {}: {}", style(id).bold(), failed.reason);
    }
}

pub fn encode_table(config: &ArmorConfig, report: &EncodeReport) -> Table {
    let overhead = if report.input_bytes == 0 { 0.0 } else { ratio(report.output_bytes, report.input_bytes) };

    let mut table = base_table();
    table.add_row(vec!["Shards".to_owned(), format!("{} required + {} redundant", config.required_shards, config.redundant_shards)]);
    table.add_row(vec!["Telomere".to_owned(), format!("{} bytes", config.telomere_length)]);
    table.add_row(vec!["Groups".to_owned(), report.groups.to_string()]);
    table.add_row(vec!["Blocks".to_owned(), report.blocks.to_string()]);
    table.add_row(vec!["Input".to_owned(), format_bytes(report.input_bytes)]);
    table.add_row(vec!["Output".to_owned(), format!("{} ({overhead:.2}x)", format_bytes(report.output_bytes))]);
    table
}

pub fn decode_table(report: &DecodeReport, stream_bytes: u64) -> Table {
    let status = if report.is_complete() {
        "intact"
    } else if !report.boundary_seen {
        "not an armored stream"
    } else if report.failed.is_empty() {
        "truncated"
    } else {
        "damaged"
    };

    let mut table = base_table();
    table.add_row(vec!["Stream".to_owned(), format_bytes(stream_bytes)]);
    table.add_row(vec!["Status".to_owned(), status.to_owned()]);
    table.add_row(vec!["Groups recovered".to_owned(), report.groups_recovered.to_string()]);
    table.add_row(vec!["Groups lost".to_owned(), report.failed.len().to_string()]);
    table.add_row(vec!["Fragments discarded".to_owned(), report.fragments_discarded.to_string()]);
    table.add_row(vec!["Recoverable payload".to_owned(), format_bytes(report.bytes_recovered)]);
    table
}

/// One row per group, in stream order.
pub fn group_table(groups: &[GroupHealth]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_content_arrangement(ContentArrangement::Dynamic).set_header(vec!["Group", "Status", "Payload"]);

    for group in groups {
        let id = group.sequence.map_or_else(|| "?".to_owned(), |s| s.to_string());
        let status = group.problem.as_deref().unwrap_or("ok");
        table.add_row(vec![id, status.to_owned(), format_bytes(group.bytes)]);
    }

    table
}

pub fn print_table(table: &Table) {
    println!();
    println!("{table}");
}

fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_content_arrangement(ContentArrangement::Dynamic).set_header(vec!["Property", "Value"]);
    table
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    numerator as f64 / denominator as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArmorError;
    use crate::types::FailedGroup;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert!(format_bytes(1024).contains("KiB"));
        assert!(format_bytes(3 * 1024 * 1024).contains("MiB"));
    }

    #[test]
    fn test_encode_table() {
        let report = EncodeReport { groups: 2, blocks: 5, input_bytes: 2048, output_bytes: 4096 };
        let rendered = encode_table(&ArmorConfig::default(), &report).to_string();
        assert!(rendered.contains("4 required + 2 redundant"));
        assert!(rendered.contains("2.00x"));
    }

    #[test]
    fn test_group_table() {
        let groups = [
            GroupHealth { sequence: Some(0), bytes: 2048, problem: None },
            GroupHealth { sequence: None, bytes: 0, problem: Some("meta checksum mismatch".to_owned()) },
        ];
        let rendered = group_table(&groups).to_string();
        assert!(rendered.contains("ok"));
        assert!(rendered.contains("?"));
        assert!(rendered.contains("meta checksum mismatch"));
    }

    #[test]
    fn test_decode_table_status() {
        let intact = DecodeReport { groups_recovered: 1, boundary_seen: true, clean_end: true, ..Default::default() };
        assert!(decode_table(&intact, 10).to_string().contains("intact"));

        let garbage = DecodeReport::default();
        assert!(decode_table(&garbage, 10).to_string().contains("not an armored stream"));

        let damaged = DecodeReport { failed: vec![FailedGroup { sequence: Some(1), reason: ArmorError::BoundaryNotFound }], boundary_seen: true, clean_end: true, ..Default::default() };
        assert!(decode_table(&damaged, 10).to_string().contains("damaged"));
    }
}
