//! Public link management (`export`).

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static LIST_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+) \(([^,]+), shared as exported permanent file link: ([^)]+)\)$")
        .expect("valid regex")
});

static LIST_FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+) \(folder, shared as exported permanent folder link: ([^)]+)\)$")
        .expect("valid regex")
});

static AUTH_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+) AuthToken=(.+?)$").expect("valid regex"));

static ADD_FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Exported (.+?): (ht.+?)\n\s+AuthToken = (.+)$").expect("valid regex")
});

static ADD_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Exported (.+?): (ht.+?)$").expect("valid regex"));

/// Printed on stderr when a free account asks for a password-protected link.
pub(crate) const PRO_ONLY_PASSWORD: &str = "Only PRO users can protect links with passwords";

/// An exported (publicly linked) node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    /// Remote path of the exported node.
    pub remote_path: String,
    /// Public link, without any auth token.
    pub link: String,
    /// Human-readable size; `None` for folders and for freshly added exports.
    pub size: Option<String>,
    /// Whether the link points at a folder.
    pub is_folder: bool,
    /// Present on writable folder links.
    pub auth_token: Option<String>,
}

/// What `export` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportAction {
    /// Create a link for `remote_path`.
    Add {
        remote_path: String,
        /// Folders only.
        writable: bool,
        /// PRO accounts only.
        password: Option<String>,
    },
    /// Remove the link of `remote_path`.
    Delete { remote_path: String },
    /// List exports under `remote_path`, or under the current remote folder.
    List { remote_path: Option<String> },
}

/// Result of [`MegaCmd::export`](crate::MegaCmd::export), one variant per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The new link.
    Added(ExportEntry),
    Deleted,
    /// Every export found.
    Listed(Vec<ExportEntry>),
}

/// Parses the confirmation `export -a` prints.
pub(crate) fn parse_export_add(stdout: &str) -> Option<ExportEntry> {
    if let Some(c) = ADD_FOLDER_RE.captures(stdout) {
        return Some(ExportEntry {
            remote_path: c[1].to_string(),
            link: c[2].to_string(),
            size: None,
            is_folder: true,
            auth_token: Some(c[3].to_string()),
        });
    }
    ADD_FILE_RE.captures(stdout).map(|c| ExportEntry {
        remote_path: c[1].to_string(),
        link: c[2].to_string(),
        size: None,
        is_folder: is_folder_link(&c[2]),
        auth_token: None,
    })
}

/// Folder links use `/folder/`, or `#F!` in the legacy format.
fn is_folder_link(link: &str) -> bool {
    link.contains("/folder/") || link.contains("#F!")
}

/// Parses the listing `export [path]` prints. Returns the first unrecognised line as the error.
pub(crate) fn parse_export_list(stdout: &str) -> Result<Vec<ExportEntry>, String> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_export_line(line).ok_or_else(|| line.to_string()))
        .collect()
}

fn parse_export_line(line: &str) -> Option<ExportEntry> {
    let (remote_path, size, link, is_folder) = if let Some(c) = LIST_FILE_RE.captures(line) {
        (c[1].to_string(), Some(c[2].to_string()), c[3].to_string(), false)
    } else {
        let c = LIST_FOLDER_RE.captures(line)?;
        (c[1].to_string(), None, c[2].to_string(), true)
    };

    let (link, auth_token) = match AUTH_TOKEN_RE.captures(&link) {
        Some(c) => (c[1].to_string(), Some(c[2].to_string())),
        None => (link, None),
    };

    Some(ExportEntry {
        remote_path,
        link,
        size,
        is_folder,
        auth_token,
    })
}
