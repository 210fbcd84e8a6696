//! Directory listings produced by `ls` and `find`.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

static FIND_FOLDER_EXPORTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^<]+) <([\w:]+)> \(folder, [^:]+: (.+)\)$").expect("valid regex")
});

static FIND_FOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^<]+) <([\w:]+)> \(folder\)$").expect("valid regex"));

static FIND_FILE_EXPORTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^<]+) <([\w:]+)> \(([^,)]+),[^:]+: (.+)\)$").expect("valid regex")
});

static FIND_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^<]+) <([\w:]+)> \(([^)]+)\)$").expect("valid regex"));

/// Format MEGAcmd uses for modification times in long listings.
const LS_DATE_FORMAT: &str = "%d%b%Y %H:%M:%S";

/// Byte offsets of the fixed-width columns in `ls -hal --show-handles`.
const FLAGS: std::ops::Range<usize> = 0..4;
const VERSION: std::ops::Range<usize> = 4..9;
const SIZE: std::ops::Range<usize> = 9..22;
const DATE: std::ops::Range<usize> = 22..41;
const HANDLE: std::ops::Range<usize> = 41..52;
const NAME_START: usize = 52;

/// A file or folder reported by `ls` or `find`.
///
/// `ls` fills in flags, version, size and date but never a link; `find`
/// fills in the link of exported nodes but never flags or date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// Node name (`ls`) or full remote path (`find`).
    pub name: String,
    /// MEGA node handle, e.g. `H:a0a0a0a0`.
    pub handle: String,
    /// Whether the node is a folder.
    pub is_directory: bool,
    /// Entry flags, e.g. `-ep-`.
    pub flags: Option<String>,
    /// Version count as printed.
    pub version: Option<String>,
    /// Human-readable size, files only.
    pub size: Option<String>,
    /// Modification date as printed, e.g. `01Jan2024 12:00:00`.
    pub date: Option<String>,
    /// Public link, if the node is exported.
    pub link: Option<String>,
}

impl DirectoryEntry {
    /// Parses [`date`](Self::date) as MEGAcmd prints it.
    #[must_use]
    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.date
            .as_deref()
            .and_then(|d| NaiveDateTime::parse_from_str(d, LS_DATE_FORMAT).ok())
    }
}

/// Treats MEGAcmd's `-` placeholder as absent.
fn column(line: &str, range: std::ops::Range<usize>) -> Option<Option<String>> {
    let value = line.get(range)?.trim();
    Some((!value.is_empty() && value != "-").then(|| value.to_string()))
}

/// Parses the output of `ls -hal --show-handles`.
///
/// The first line is the column header. Returns the first line that does not
/// fit the fixed-width layout as the error.
pub(crate) fn parse_ls(stdout: &str) -> Result<Vec<DirectoryEntry>, String> {
    stdout
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_ls_line(line).ok_or_else(|| line.to_string()))
        .collect()
}

fn parse_ls_line(line: &str) -> Option<DirectoryEntry> {
    let flags = line.get(FLAGS)?.trim().to_string();
    let name = line.get(NAME_START..)?.trim().to_string();
    if flags.is_empty() || name.is_empty() {
        return None;
    }
    Some(DirectoryEntry {
        name,
        handle: line.get(HANDLE)?.trim().to_string(),
        is_directory: flags.starts_with('d'),
        version: column(line, VERSION)?,
        size: column(line, SIZE)?,
        date: column(line, DATE)?,
        flags: Some(flags),
        link: None,
    })
}

/// Parses the output of `find -l --show-handles`.
pub(crate) fn parse_find(stdout: &str) -> Result<Vec<DirectoryEntry>, String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_find_line(line).ok_or_else(|| line.to_string()))
        .collect()
}

fn parse_find_line(line: &str) -> Option<DirectoryEntry> {
    let entry = |name: &str, handle: &str, is_directory, size: Option<&str>, link: Option<&str>| {
        DirectoryEntry {
            name: name.to_string(),
            handle: handle.to_string(),
            is_directory,
            flags: None,
            version: None,
            size: size.map(str::to_string),
            date: None,
            link: link.map(str::to_string),
        }
    };

    if let Some(c) = FIND_FOLDER_EXPORTED_RE.captures(line) {
        return Some(entry(&c[1], &c[2], true, None, Some(&c[3])));
    }
    if let Some(c) = FIND_FOLDER_RE.captures(line) {
        return Some(entry(&c[1], &c[2], true, None, None));
    }
    if let Some(c) = FIND_FILE_EXPORTED_RE.captures(line) {
        return Some(entry(&c[1], &c[2], false, Some(&c[3]), Some(&c[4])));
    }
    FIND_FILE_RE
        .captures(line)
        .map(|c| entry(&c[1], &c[2], false, Some(&c[3]), None))
}
