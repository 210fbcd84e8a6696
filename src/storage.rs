//! Storage accounting reported by `df` and `du`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static DF_AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(Cloud drive|Inbox|Vault|Rubbish bin):\s+(\d+) in\s+(\d+) file\(s\) and\s+(\d+) folder\(s\)")
        .expect("valid regex")
});

static DF_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*USED STORAGE:\s+(\d+)\s+([\d.]+)% of\s+(\d+)").expect("valid regex")
});

static DF_VERSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Total size taken up by file versions:\s+(\d+)").expect("valid regex")
});

static DU_TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Total storage used:\s+(\d+)\s+(\d+)$").expect("valid regex"));

static DU_ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):\s+(\d+)\s+(\d+)$").expect("valid regex"));

/// Bytes, files and folders held by one storage area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AreaUsage {
    /// Bytes stored.
    pub bytes: u64,
    /// Number of files.
    pub files: u64,
    /// Number of folders.
    pub folders: u64,
}

/// Account-wide storage usage from `df`.
///
/// Lines missing from the output leave their fields at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskFree {
    /// The main cloud drive.
    pub cloud_drive: AreaUsage,
    /// Called "Vault" by newer MEGAcmd releases.
    pub inbox: AreaUsage,
    /// The rubbish bin.
    pub rubbish_bin: AreaUsage,
    /// Bytes used across the account.
    pub total_used: u64,
    /// Used storage as a percentage in `0.0..=100.0`.
    pub used_percentage: f64,
    /// Account quota in bytes.
    pub total_storage: u64,
    /// Bytes taken by previous file versions.
    pub file_versions: u64,
}

/// One path reported by `du`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskUsageEntry {
    /// Remote path as MEGAcmd printed it.
    pub remote_path: String,
    /// Bytes, current versions only.
    pub size: u64,
    /// Bytes including previous versions.
    pub size_with_versions: u64,
}

/// Output of `du --versions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    /// One entry per requested path.
    pub entries: Vec<DiskUsageEntry>,
    /// Sum of [`DiskUsageEntry::size`].
    pub total: u64,
    /// Sum of [`DiskUsageEntry::size_with_versions`].
    pub total_with_versions: u64,
}

fn number(s: &str) -> u64 {
    // The regexes only capture digit runs; overflow is the only failure.
    s.parse().unwrap_or(u64::MAX)
}

pub(crate) fn parse_df(stdout: &str) -> DiskFree {
    let mut df = DiskFree::default();
    for line in stdout.lines() {
        if let Some(c) = DF_AREA_RE.captures(line) {
            let usage = AreaUsage {
                bytes: number(&c[2]),
                files: number(&c[3]),
                folders: number(&c[4]),
            };
            match &c[1] {
                "Cloud drive" => df.cloud_drive = usage,
                "Rubbish bin" => df.rubbish_bin = usage,
                _ => df.inbox = usage,
            }
        } else if let Some(c) = DF_TOTAL_RE.captures(line) {
            df.total_used = number(&c[1]);
            df.used_percentage = c[2].parse().unwrap_or(0.0);
            df.total_storage = number(&c[3]);
        } else if let Some(c) = DF_VERSIONS_RE.captures(line) {
            df.file_versions = number(&c[1]);
        }
    }
    df
}

pub(crate) fn parse_du(stdout: &str) -> DiskUsage {
    let mut du = DiskUsage::default();
    for line in stdout.lines().map(str::trim) {
        if let Some(c) = DU_TOTAL_RE.captures(line) {
            du.total = number(&c[1]);
            du.total_with_versions = number(&c[2]);
        } else if let Some(c) = DU_ENTRY_RE.captures(line) {
            du.entries.push(DiskUsageEntry {
                remote_path: c[1].to_string(),
                size: number(&c[2]),
                size_with_versions: number(&c[3]),
            });
        }
    }
    du
}
