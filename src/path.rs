//! Normalisation of remote and local paths before they reach MEGAcmd.

/// Strips leading spaces/newlines and a leading `./` from a remote path.
///
/// With `ensure_trailing_slash`, the result ends in `/` so MEGAcmd treats it
/// as a folder.
#[must_use]
pub fn clean_remote_path(path: &str, ensure_trailing_slash: bool) -> String {
    let p = path.trim_start_matches([' ', '\n']);
    let mut p = p.strip_prefix("./").unwrap_or(p).to_string();
    if ensure_trailing_slash && !p.ends_with('/') {
        p.push('/');
    }
    p
}

/// Strips leading spaces/newlines and trailing slashes from a local path.
///
/// A path made only of slashes collapses to `/`.
#[must_use]
pub fn clean_local_path(path: &str, ensure_trailing_slash: bool) -> String {
    let p = path.trim_start_matches([' ', '\n']);
    let trimmed = p.trim_end_matches('/');
    let mut p = if trimmed.is_empty() && p.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    };
    if ensure_trailing_slash && !p.ends_with('/') {
        p.push('/');
    }
    p
}
