//! Text and JSON rendering of command reports, plus the transfer spinner.

use std::fmt::Write as _;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::{Command, Report};
use crate::{AreaUsage, DirectoryEntry, DiskFree, DiskUsage, Error, ExportEntry};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Formats a byte count as a human-readable string (B, KB, MB, GB, TB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Creates a spinner shown while a transfer runs.
pub fn transfer_spinner(command: &Command) -> ProgressBar {
    let label = match command {
        Command::Get { remote, .. } => format!("Downloading {remote}"),
        Command::Put { locals, .. } => format!("Uploading {}", locals.join(", ")),
        Command::Import { link, .. } => format!("Importing {link}"),
        _ => "Working".to_string(),
    };
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .expect("spinner template is valid"),
    );
    spinner.set_message(label);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Prints an error to stderr.
pub fn print_error(error: &Error) {
    eprintln!("{} {error}", style("error:").red().bold());
}

fn render_entries(entries: &[DirectoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let kind = if entry.is_directory { 'd' } else { '-' };
        let size = entry.size.as_deref().unwrap_or("-");
        let date = entry.date.as_deref().unwrap_or("");
        let _ = write!(out, "{kind} {size:>12}  {date:<18}  {}", entry.name);
        if entry.is_directory && !entry.name.ends_with('/') {
            out.push('/');
        }
        if let Some(link) = &entry.link {
            let _ = write!(out, "  {}", style(link).underlined());
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn render_exports(entries: &[ExportEntry]) -> String {
    entries
        .iter()
        .map(render_export)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_export(entry: &ExportEntry) -> String {
    let mut line = format!("{}  {}", entry.remote_path, entry.link);
    if let Some(token) = &entry.auth_token {
        let _ = write!(line, "  (auth token: {token})");
    }
    line
}

fn area_line(label: &str, area: &AreaUsage) -> String {
    format!(
        "  {label:<12} {:>12}  {} file(s), {} folder(s)",
        format_bytes(area.bytes),
        area.files,
        area.folders
    )
}

fn render_df(df: &DiskFree) -> String {
    [
        area_line("Cloud drive", &df.cloud_drive),
        area_line("Inbox", &df.inbox),
        area_line("Rubbish bin", &df.rubbish_bin),
        SEPARATOR.to_string(),
        format!(
            "  Used {} of {} ({:.2}%)",
            format_bytes(df.total_used),
            format_bytes(df.total_storage),
            df.used_percentage
        ),
        format!("  File versions: {}", format_bytes(df.file_versions)),
    ]
    .join("\n")
}

fn render_du(du: &DiskUsage) -> String {
    let mut out = String::new();
    for entry in &du.entries {
        let _ = writeln!(
            out,
            "  {:>12}  {:>12}  {}",
            format_bytes(entry.size),
            format_bytes(entry.size_with_versions),
            entry.remote_path
        );
    }
    let _ = writeln!(out, "{SEPARATOR}");
    let _ = write!(
        out,
        "  {:>12}  {:>12}  total (with versions)",
        format_bytes(du.total),
        format_bytes(du.total_with_versions)
    );
    out
}

fn to_json(report: &Report) -> serde_json::Result<serde_json::Value> {
    match report {
        Report::Done => Ok(serde_json::json!({ "ok": true })),
        Report::Text(text) => Ok(serde_json::Value::String(text.clone())),
        Report::Optional(value) => serde_json::to_value(value),
        Report::Entries(entries) => serde_json::to_value(entries),
        Report::Export(entry) => serde_json::to_value(entry),
        Report::Exports(entries) => serde_json::to_value(entries),
        Report::DiskFree(df) => serde_json::to_value(df),
        Report::DiskUsage(du) => serde_json::to_value(du),
    }
}

/// Renders a report for stdout. Empty output means nothing to print.
pub fn render(report: &Report, json: bool) -> String {
    if json {
        return to_json(report)
            .and_then(|value| serde_json::to_string_pretty(&value))
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    }
    match report {
        Report::Done => String::new(),
        Report::Text(text) => text.clone(),
        Report::Optional(value) => value.clone().unwrap_or_else(|| "Not logged in.".to_string()),
        Report::Entries(entries) => render_entries(entries),
        Report::Export(entry) => render_export(entry),
        Report::Exports(entries) => render_exports(entries),
        Report::DiskFree(df) => render_df(df),
        Report::DiskUsage(du) => render_du(du),
    }
}
