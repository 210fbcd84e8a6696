//! The MEGAcmd dispatcher: one method per supported subcommand.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ShimConfig;
use crate::error::{Error, ErrorCode, Result};
use crate::export::{self, ExportAction, ExportEntry, ExportOutcome};
use crate::invocation::{Invocation, Subcommand};
use crate::listing::{self, DirectoryEntry};
use crate::path::{clean_local_path, clean_remote_path};
use crate::runner::{CommandOutput, CommandRunner, TokioCommandRunner};
use crate::storage::{self, DiskFree, DiskUsage};

static WHOAMI_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Account e-mail: (.+)$").expect("valid regex"));

static SESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Your \(secret\) session is:\s+(.+)$").expect("valid regex")
});

static LOGOUT_SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)session id: (.+)$").expect("valid regex"));

const DOWNLOAD_FINISHED: &str = "Download finished";
const UPLOAD_FINISHED: &str = "Upload finished";
const IMPORT_MARKERS: [&str; 2] = ["Imported folder complete:", "Imported file complete:"];
const NOT_LOGGED_IN: &str = "Not logged in";

/// How to authenticate with [`MegaCmd::login`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    /// E-mail and password, with an optional two-factor code.
    Credentials {
        /// Account e-mail.
        email: String,
        /// Account password. Never logged.
        password: String,
        /// Two-factor code, if the account has 2FA enabled.
        auth_code: Option<String>,
    },
    /// A session string previously returned by [`MegaCmd::session`] or
    /// [`MegaCmd::logout`] with `keep_session`.
    Session(String),
}

impl Login {
    /// E-mail and password login without a two-factor code.
    #[must_use]
    pub fn credentials(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Credentials {
            email: email.into(),
            password: password.into(),
            auth_code: None,
        }
    }

    /// Resumes a saved session.
    #[must_use]
    pub fn session(session: impl Into<String>) -> Self {
        Self::Session(session.into())
    }

    /// Adds a two-factor code. No effect on session logins.
    #[must_use]
    pub fn with_auth_code(mut self, code: impl Into<String>) -> Self {
        if let Self::Credentials { auth_code, .. } = &mut self {
            *auth_code = Some(code.into());
        }
        self
    }
}

/// Options for [`MegaCmd::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Destination; MEGAcmd's current local folder when unset.
    pub local_path: Option<String>,
    /// Password for password-protected links.
    pub password: Option<String>,
    /// Merge a downloaded folder into an existing local folder.
    pub merge: bool,
}

impl GetOptions {
    /// Creates options that download into MEGAcmd's current local folder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local destination.
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Sets the password for a password-protected link.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets whether to merge into an existing local folder.
    #[must_use]
    pub const fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }
}

/// Options for [`MegaCmd::rm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove folders and their contents.
    pub recursive: bool,
    /// Skip MEGAcmd's confirmation prompt.
    pub force: bool,
}

impl RemoveOptions {
    /// Creates options for a plain, confirmed delete.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            recursive: false,
            force: false,
        }
    }

    /// Sets whether folders are removed with their contents.
    #[must_use]
    pub const fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Sets whether the confirmation prompt is skipped.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Filters for [`MegaCmd::find`]. Everything unset matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Where to start; MEGAcmd's current remote folder when unset.
    pub remote_path: Option<String>,
    /// Wildcard pattern matched against names.
    pub pattern: Option<String>,
    /// Modification time constraint in MEGAcmd syntax, e.g. `-1d`.
    pub mtime: Option<String>,
    /// Size constraint in MEGAcmd syntax, e.g. `+1M`.
    pub size: Option<String>,
}

impl FindOptions {
    /// Creates options that match everything under the current remote folder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the folder to search from.
    #[must_use]
    pub fn with_remote_path(mut self, path: impl Into<String>) -> Self {
        self.remote_path = Some(path.into());
        self
    }

    /// Sets the name pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets the modification time constraint.
    #[must_use]
    pub fn with_mtime(mut self, mtime: impl Into<String>) -> Self {
        self.mtime = Some(mtime.into());
        self
    }

    /// Sets the size constraint.
    #[must_use]
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }
}

/// Locates the MEGAcmd binary, searching `PATH` for bare names.
fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    if executable.as_os_str().is_empty() {
        return Err(Error::ExecutableNotFound {
            path: executable.to_path_buf(),
        });
    }
    which::which(executable).map_err(|e| {
        log::debug!("Could not resolve {}: {e}", executable.display());
        Error::ExecutableNotFound {
            path: executable.to_path_buf(),
        }
    })
}

fn require_paths<S: AsRef<str>>(subcommand: Subcommand, paths: &[S]) -> Result<()> {
    if paths.is_empty() {
        return Err(Error::InvalidArguments(format!(
            "{subcommand} needs at least one path"
        )));
    }
    Ok(())
}

fn clean_remotes<S: AsRef<str>>(paths: &[S]) -> impl Iterator<Item = String> + '_ {
    paths.iter().map(|p| clean_remote_path(p.as_ref(), false))
}

fn is_not_logged_in(output: &CommandOutput) -> bool {
    ErrorCode::from_exit_code(output.code) == ErrorCode::NotLoggedIn
        || output.stderr.contains(NOT_LOGGED_IN)
        || output.stdout.contains(NOT_LOGGED_IN)
}

/// Drives an external MEGAcmd binary.
///
/// Every method runs one MEGAcmd subcommand to completion. MEGAcmd keeps its
/// own server and session between runs, so a `login` is visible to later
/// calls on this or any other handle.
pub struct MegaCmd<R: CommandRunner = TokioCommandRunner> {
    executable: PathBuf,
    runner: R,
}

impl MegaCmd<TokioCommandRunner> {
    /// Creates a dispatcher for the binary at `executable`.
    ///
    /// A bare name such as `mega-exec` is looked up in `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutableNotFound`] if the binary cannot be located.
    /// Nothing is spawned.
    pub fn new(executable: impl AsRef<Path>) -> Result<Self> {
        let executable = resolve_executable(executable.as_ref())?;
        Ok(Self {
            executable,
            runner: TokioCommandRunner::new(),
        })
    }

    /// Creates a dispatcher for the binary named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutableNotFound`] if the binary cannot be located.
    pub fn from_config(config: &ShimConfig) -> Result<Self> {
        Self::new(&config.executable)
    }
}

impl<R: CommandRunner> MegaCmd<R> {
    /// Creates a dispatcher with a custom runner. The path is not checked.
    #[must_use]
    pub fn with_runner(executable: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            executable: executable.into(),
            runner,
        }
    }

    /// Path of the binary being driven.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Runs an invocation and returns its output whatever the exit code.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        log::info!("Running command: {} {invocation}", self.executable.display());
        let output = self
            .runner
            .run(&self.executable, &invocation.to_argv())
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ExecutableNotFound {
                        path: self.executable.clone(),
                    }
                } else {
                    Error::Io(e)
                }
            })?;
        log::debug!(
            "`{invocation}` exited with {} ({} bytes stdout, stderr: {:?})",
            output.code,
            output.stdout.len(),
            output.stderr
        );
        Ok(output)
    }

    /// Runs an invocation, failing on a non-zero exit code.
    async fn execute_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.execute(invocation).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(command_error(invocation, output))
        }
    }

    /// Runs an invocation whose stdout must contain one of `markers`.
    async fn execute_expecting(&self, invocation: &Invocation, markers: &[&str]) -> Result<()> {
        let output = self.execute_checked(invocation).await?;
        if markers.iter().any(|m| output.stdout.contains(m)) {
            Ok(())
        } else {
            Err(unexpected(invocation, output.stdout))
        }
    }

    /// Logs in with credentials or a saved session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty e-mail, password or
    /// session, and [`Error::Command`] if MEGAcmd rejects the login.
    pub async fn login(&self, login: &Login) -> Result<()> {
        let invocation = match login {
            Login::Credentials {
                email,
                password,
                auth_code,
            } => {
                if email.is_empty() || password.is_empty() {
                    return Err(Error::InvalidArguments(
                        "e-mail and password are required for user login".to_string(),
                    ));
                }
                Invocation::new(Subcommand::Login)
                    .arg(email.as_str())
                    .secret(password.as_str())
                    .opt_secret_option("auth-code", auth_code.as_deref())
            }
            Login::Session(session) => {
                if session.is_empty() {
                    return Err(Error::InvalidArguments(
                        "session string is required for session login".to_string(),
                    ));
                }
                Invocation::new(Subcommand::Login).secret(session.as_str())
            }
        };
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Logs out. With `keep_session`, returns the session id MEGAcmd keeps
    /// alive so it can be passed to [`Login::Session`] later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails.
    pub async fn logout(&self, keep_session: bool) -> Result<Option<String>> {
        let invocation = Invocation::new(Subcommand::Logout).flag(keep_session, "--keep-session");
        let output = self.execute_checked(&invocation).await?;
        if !keep_session {
            return Ok(None);
        }
        Ok(LOGOUT_SESSION_RE
            .captures(&output.stdout)
            .map(|c| c[1].trim().to_string()))
    }

    /// Lists a remote folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails, or
    /// [`Error::UnexpectedOutput`] if a row does not fit the long-listing layout.
    pub async fn ls(&self, remote_path: &str) -> Result<Vec<DirectoryEntry>> {
        let invocation = Invocation::new(Subcommand::Ls)
            .args(["-hal", "--show-handles"])
            .arg(clean_remote_path(remote_path, false));
        let output = self.execute_checked(&invocation).await?;
        listing::parse_ls(&output.stdout).map_err(|line| unexpected(&invocation, line))
    }

    /// Returns the tree under `remote_path` (or the current remote folder) as printed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails.
    pub async fn tree(&self, remote_path: Option<&str>) -> Result<String> {
        let invocation = Invocation::new(Subcommand::Tree)
            .opt_arg(remote_path.map(|p| clean_remote_path(p, false)));
        Ok(self.execute_checked(&invocation).await?.stdout)
    }

    /// Returns the contents of one or more remote files.
    ///
    /// With several files MEGAcmd concatenates them; splitting is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty list, and
    /// [`Error::Command`] if MEGAcmd fails (e.g. [`ErrorCode::NotFound`]).
    pub async fn cat<S: AsRef<str>>(&self, remote_paths: &[S]) -> Result<String> {
        require_paths(Subcommand::Cat, remote_paths)?;
        let invocation = Invocation::new(Subcommand::Cat).args(clean_remotes(remote_paths));
        Ok(self.execute_checked(&invocation).await?.stdout)
    }

    /// Copies remote nodes to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty source list, and
    /// [`Error::Command`] if MEGAcmd fails.
    pub async fn cp<S: AsRef<str>>(&self, sources: &[S], destination: &str) -> Result<()> {
        require_paths(Subcommand::Cp, sources)?;
        let invocation = Invocation::new(Subcommand::Cp)
            .args(clean_remotes(sources))
            .arg(clean_remote_path(destination, false));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Moves or renames remote nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty source list, and
    /// [`Error::Command`] if MEGAcmd fails.
    pub async fn mv<S: AsRef<str>>(&self, sources: &[S], destination: &str) -> Result<()> {
        require_paths(Subcommand::Mv, sources)?;
        let invocation = Invocation::new(Subcommand::Mv)
            .args(clean_remotes(sources))
            .arg(clean_remote_path(destination, false));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Deletes remote nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty list, and
    /// [`Error::Command`] if MEGAcmd fails.
    pub async fn rm<S: AsRef<str>>(&self, remote_paths: &[S], options: RemoveOptions) -> Result<()> {
        require_paths(Subcommand::Rm, remote_paths)?;
        let invocation = Invocation::new(Subcommand::Rm)
            .flag(options.recursive, "-r")
            .flag(options.force, "-f")
            .args(clean_remotes(remote_paths));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Creates a remote folder, with `parents` also creating missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails (e.g. [`ErrorCode::AlreadyExists`]).
    pub async fn mkdir(&self, remote_path: &str, parents: bool) -> Result<()> {
        let invocation = Invocation::new(Subcommand::Mkdir)
            .flag(parents, "-p")
            .arg(clean_remote_path(remote_path, false));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Downloads a remote file or folder (or a public link).
    ///
    /// With `merge`, a file download treats the local path as the target file
    /// and a folder download copies the folder's contents into the local path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails ([`ErrorCode::NotFound`]
    /// for a missing remote path, [`ErrorCode::InvalidState`] or
    /// [`ErrorCode::InvalidType`] for a bad local destination), or
    /// [`Error::UnexpectedOutput`] if the download was not reported finished.
    pub async fn get(&self, remote_path: &str, options: &GetOptions) -> Result<()> {
        let invocation = Invocation::new(Subcommand::Get)
            .flag(options.merge, "-m")
            .opt_secret_option("password", options.password.as_deref())
            .arg(clean_remote_path(remote_path, false))
            .opt_arg(options.local_path.as_deref().map(|p| clean_local_path(p, false)));
        self.execute_expecting(&invocation, &[DOWNLOAD_FINISHED]).await
    }

    /// Uploads local files or folders.
    ///
    /// With several local items `remote_path` is required and is treated as a folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty list or several items
    /// without a destination, [`Error::Command`] if MEGAcmd fails, or
    /// [`Error::UnexpectedOutput`] if the upload was not reported finished.
    pub async fn put<S: AsRef<str>>(&self, local_paths: &[S], remote_path: Option<&str>) -> Result<()> {
        require_paths(Subcommand::Put, local_paths)?;
        let several = local_paths.len() > 1;
        if several && remote_path.is_none() {
            return Err(Error::InvalidArguments(
                "a remote folder is required when uploading several items".to_string(),
            ));
        }
        let invocation = Invocation::new(Subcommand::Put)
            .arg("-c")
            .args(local_paths.iter().map(|p| clean_local_path(p.as_ref(), false)))
            .opt_arg(remote_path.map(|p| clean_remote_path(p, several)));
        self.execute_expecting(&invocation, &[UPLOAD_FINISHED]).await
    }

    /// Imports a public link into the account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails ([`ErrorCode::InvalidType`]
    /// for an invalid destination), or [`Error::UnexpectedOutput`] if the
    /// import was not reported complete.
    pub async fn import(
        &self,
        exported_link: &str,
        remote_path: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        let invocation = Invocation::new(Subcommand::Import)
            .arg(exported_link)
            .opt_secret_option("password", password)
            .opt_arg(remote_path.map(|p| clean_remote_path(p, false)));
        self.execute_expecting(&invocation, &IMPORT_MARKERS).await
    }

    /// Runs one export action. The dedicated `export_*` methods return more
    /// precise types.
    ///
    /// # Errors
    ///
    /// See [`export_add`](Self::export_add), [`export_delete`](Self::export_delete)
    /// and [`export_list`](Self::export_list).
    pub async fn export(&self, action: &ExportAction) -> Result<ExportOutcome> {
        match action {
            ExportAction::Add {
                remote_path,
                writable,
                password,
            } => self
                .export_add(remote_path, *writable, password.as_deref())
                .await
                .map(ExportOutcome::Added),
            ExportAction::Delete { remote_path } => self
                .export_delete(remote_path)
                .await
                .map(|()| ExportOutcome::Deleted),
            ExportAction::List { remote_path } => self
                .export_list(remote_path.as_deref())
                .await
                .map(ExportOutcome::Listed),
        }
    }

    /// Creates a public link. The returned entry never carries a size.
    ///
    /// Password protection is a PRO feature; on free accounts MEGAcmd creates
    /// the link without one and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails, or
    /// [`Error::UnexpectedOutput`] if the confirmation cannot be parsed.
    pub async fn export_add(
        &self,
        remote_path: &str,
        writable: bool,
        password: Option<&str>,
    ) -> Result<ExportEntry> {
        let invocation = Invocation::new(Subcommand::Export)
            .args(["-f", "-a"])
            .arg(clean_remote_path(remote_path, false))
            .flag(writable, "--writable")
            .opt_secret_option("password", password);
        let output = self.execute_checked(&invocation).await?;
        if output.stderr.contains(export::PRO_ONLY_PASSWORD) {
            log::warn!("Password protection is a PRO feature. Export created without password.");
        }
        export::parse_export_add(&output.stdout).ok_or_else(|| unexpected(&invocation, output.stdout))
    }

    /// Removes the public link of `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails.
    pub async fn export_delete(&self, remote_path: &str) -> Result<()> {
        let invocation = Invocation::new(Subcommand::Export)
            .arg("-d")
            .arg(clean_remote_path(remote_path, false));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Lists exports under `remote_path`, or under the current remote folder.
    ///
    /// Nothing exported is an empty list, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails, or
    /// [`Error::UnexpectedOutput`] for an unrecognised line.
    pub async fn export_list(&self, remote_path: Option<&str>) -> Result<Vec<ExportEntry>> {
        let invocation = Invocation::new(Subcommand::Export)
            .opt_arg(remote_path.map(|p| clean_remote_path(p, false)));
        let output = self.execute(&invocation).await?;
        if !output.success() {
            if ErrorCode::from_exit_code(output.code) == ErrorCode::NotFound {
                log::debug!("No exports found by `{invocation}`");
                return Ok(Vec::new());
            }
            return Err(command_error(&invocation, output));
        }
        export::parse_export_list(&output.stdout).map_err(|line| unexpected(&invocation, line))
    }

    /// Returns account-wide storage usage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails.
    pub async fn df(&self) -> Result<DiskFree> {
        let output = self.execute_checked(&Invocation::new(Subcommand::Df)).await?;
        Ok(storage::parse_df(&output.stdout))
    }

    /// Returns the size of remote files or folders, with and without versions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] for an empty list, and
    /// [`Error::Command`] if MEGAcmd fails.
    pub async fn du<S: AsRef<str>>(&self, remote_paths: &[S]) -> Result<DiskUsage> {
        require_paths(Subcommand::Du, remote_paths)?;
        let invocation = Invocation::new(Subcommand::Du)
            .arg("--versions")
            .args(clean_remotes(remote_paths));
        let output = self.execute_checked(&invocation).await?;
        Ok(storage::parse_du(&output.stdout))
    }

    /// Searches the remote tree.
    ///
    /// Entries never carry flags or dates; sizes are set for files and links
    /// for exported nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails, or
    /// [`Error::UnexpectedOutput`] for an unrecognised line.
    pub async fn find(&self, options: &FindOptions) -> Result<Vec<DirectoryEntry>> {
        let invocation = Invocation::new(Subcommand::Find)
            .args(["-l", "--show-handles"])
            .opt_arg(options.mtime.as_ref().map(|t| format!("--mtime={t}")))
            .opt_arg(options.size.as_ref().map(|s| format!("--size={s}")))
            .opt_arg(options.remote_path.as_deref().map(|p| clean_remote_path(p, false)))
            .opt_arg(options.pattern.as_ref().map(|p| format!("--pattern={p}")));
        let output = self.execute_checked(&invocation).await?;
        listing::parse_find(&output.stdout).map_err(|line| unexpected(&invocation, line))
    }

    /// Returns the current session string, or `None` when not logged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] for other failures, or
    /// [`Error::UnexpectedOutput`] if the session cannot be found in the output.
    pub async fn session(&self) -> Result<Option<String>> {
        let invocation = Invocation::new(Subcommand::Session);
        let output = self.execute(&invocation).await?;
        if !output.success() {
            return if is_not_logged_in(&output) {
                Ok(None)
            } else {
                Err(command_error(&invocation, output))
            };
        }
        // Not echoed into the error: the output holds the secret.
        match SESSION_RE.captures(&output.stdout) {
            Some(c) => Ok(Some(c[1].trim().to_string())),
            None => Err(unexpected(&invocation, "<session output withheld>".to_string())),
        }
    }

    /// Returns the e-mail of the logged-in account, or `None` when not logged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] for other failures, or
    /// [`Error::UnexpectedOutput`] if no e-mail is reported.
    pub async fn whoami(&self) -> Result<Option<String>> {
        let invocation = Invocation::new(Subcommand::Whoami);
        let output = self.execute(&invocation).await?;
        if !output.success() {
            return if is_not_logged_in(&output) {
                Ok(None)
            } else {
                Err(command_error(&invocation, output))
            };
        }
        match WHOAMI_EMAIL_RE.captures(&output.stdout) {
            Some(c) => Ok(Some(c[1].trim().to_string())),
            None => Err(unexpected(&invocation, output.stdout)),
        }
    }

    /// Returns MEGAcmd's version banner as printed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutableNotFound`] if the binary vanished, or
    /// [`Error::Command`] if it fails.
    pub async fn version(&self) -> Result<String> {
        Ok(self
            .execute_checked(&Invocation::new(Subcommand::Version))
            .await?
            .stdout)
    }

    /// Changes the current remote folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails ([`ErrorCode::NotFound`]
    /// for a missing folder).
    pub async fn cd(&self, remote_path: &str) -> Result<()> {
        let invocation =
            Invocation::new(Subcommand::Cd).arg(clean_remote_path(remote_path, false));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Changes MEGAcmd's current local folder.
    ///
    /// Relative paths are resolved by the MEGAcmd server, not against this
    /// process's working directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails ([`ErrorCode::InvalidType`]
    /// for a bad local path).
    pub async fn lcd(&self, local_path: &str) -> Result<()> {
        let invocation = Invocation::new(Subcommand::Lcd).arg(clean_local_path(local_path, false));
        self.execute_checked(&invocation).await?;
        Ok(())
    }

    /// Returns the current remote folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails.
    pub async fn pwd(&self) -> Result<String> {
        Ok(self.execute_checked(&Invocation::new(Subcommand::Pwd)).await?.stdout)
    }

    /// Returns MEGAcmd's current local folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if MEGAcmd fails.
    pub async fn lpwd(&self) -> Result<String> {
        Ok(self.execute_checked(&Invocation::new(Subcommand::Lpwd)).await?.stdout)
    }
}

fn command_error(invocation: &Invocation, output: CommandOutput) -> Error {
    log::error!("`{invocation}` failed with code {}: {}", output.code, output.stderr);
    Error::Command {
        command: invocation.to_string(),
        code: output.code,
        stderr: output.stderr,
    }
}

fn unexpected(invocation: &Invocation, output: String) -> Error {
    log::error!("Unexpected output from `{invocation}`");
    Error::UnexpectedOutput {
        command: invocation.to_string(),
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Replies to each subcommand with a canned output and records every argv.
    #[derive(Default)]
    struct MockRunner {
        replies: Mutex<HashMap<String, CommandOutput>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        fn reply(self, subcommand: &str, output: CommandOutput) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(subcommand.to_string(), output);
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(self
                .replies
                .lock()
                .unwrap()
                .get(&args[0])
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Remembers who logged in, like the MEGAcmd server does.
    #[derive(Default)]
    struct SessionRunner {
        user: Mutex<Option<String>>,
    }

    #[async_trait]
    impl CommandRunner for SessionRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> std::io::Result<CommandOutput> {
            let mut user = self.user.lock().unwrap();
            Ok(match args[0].as_str() {
                "login" => {
                    *user = Some(args[1].clone());
                    CommandOutput::ok("")
                }
                "logout" => {
                    *user = None;
                    CommandOutput::ok("Logging out...")
                }
                "whoami" => match user.as_ref() {
                    Some(email) => CommandOutput::ok(format!("Account e-mail: {email}")),
                    None => CommandOutput::failed(57, "[err: ] Not logged in."),
                },
                _ => CommandOutput::failed(51, "unsupported"),
            })
        }
    }

    /// Fails every spawn the way a missing binary does.
    struct MissingBinary;

    #[async_trait]
    impl CommandRunner for MissingBinary {
        async fn run(&self, _program: &Path, _args: &[String]) -> std::io::Result<CommandOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn mega(runner: MockRunner) -> MegaCmd<MockRunner> {
        MegaCmd::with_runner("/usr/bin/mega-exec", runner)
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn new_rejects_missing_binary() {
        let err = MegaCmd::new("/definitely/not/here/mega-exec").err().unwrap();
        assert!(matches!(err, Error::ExecutableNotFound { .. }));
    }

    #[test]
    fn new_rejects_empty_path() {
        let err = MegaCmd::new("").err().unwrap();
        assert!(matches!(err, Error::ExecutableNotFound { .. }));
    }

    #[tokio::test]
    async fn spawn_not_found_maps_to_executable_not_found() {
        let mega = MegaCmd::with_runner("/gone/mega-exec", MissingBinary);
        let err = mega.version().await.unwrap_err();
        match err {
            Error::ExecutableNotFound { path } => assert_eq!(path, Path::new("/gone/mega-exec")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn raw_text_commands_pass_output_through() {
        let text = "line one\n  line two\nline three";
        let mega = mega(
            MockRunner::default()
                .reply("tree", CommandOutput::ok(text))
                .reply("cat", CommandOutput::ok(text))
                .reply("version", CommandOutput::ok(text))
                .reply("pwd", CommandOutput::ok(text))
                .reply("lpwd", CommandOutput::ok(text)),
        );
        assert_eq!(mega.tree(None).await.unwrap(), text);
        assert_eq!(mega.cat(&["/a.txt"]).await.unwrap(), text);
        assert_eq!(mega.version().await.unwrap(), text);
        assert_eq!(mega.pwd().await.unwrap(), text);
        assert_eq!(mega.lpwd().await.unwrap(), text);
    }

    #[tokio::test]
    async fn tree_preserves_line_order() {
        let tree = "/\n├── docs\n│   └── a.txt\n└── photos\n    └── cat.jpg";
        let runner = MockRunner::default().reply("tree", CommandOutput::ok(tree));
        let mega = mega(runner);
        let out = mega.tree(Some("/")).await.unwrap();
        assert_eq!(out, tree);
        assert_eq!(out.lines().collect::<Vec<_>>(), tree.lines().collect::<Vec<_>>());
        assert_eq!(mega.runner.calls(), vec![argv(&["tree", "/"])]);
    }

    #[tokio::test]
    async fn login_then_whoami_returns_same_email() {
        let mega = MegaCmd::with_runner("mega-exec", SessionRunner::default());
        assert_eq!(mega.whoami().await.unwrap(), None);
        mega.login(&Login::credentials("me@example.com", "hunter2"))
            .await
            .unwrap();
        assert_eq!(mega.whoami().await.unwrap().as_deref(), Some("me@example.com"));
        mega.logout(false).await.unwrap();
        assert_eq!(mega.whoami().await.unwrap(), None);
    }

    #[tokio::test]
    async fn login_argument_vectors() {
        let mega = mega(MockRunner::default());
        mega.login(&Login::credentials("me@example.com", "pw").with_auth_code("123456"))
            .await
            .unwrap();
        mega.login(&Login::session("SESSIONSTRING")).await.unwrap();
        assert_eq!(
            mega.runner.calls(),
            vec![
                argv(&["login", "me@example.com", "pw", "--auth-code=123456"]),
                argv(&["login", "SESSIONSTRING"]),
            ]
        );
    }

    #[tokio::test]
    async fn login_rejects_empty_credentials_without_spawning() {
        let mega = mega(MockRunner::default());
        let err = mega.login(&Login::credentials("", "pw")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        let err = mega.login(&Login::session("")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert!(mega.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_login_error_hides_password() {
        let mega = mega(
            MockRunner::default().reply("login", CommandOutput::failed(52, "Invalid email")),
        );
        let err = mega
            .login(&Login::credentials("bad", "hunter2"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidEmail));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn logout_keep_session_returns_session_id() {
        let mega = mega(MockRunner::default().reply(
            "logout",
            CommandOutput::ok("Logging out... session id: ABCDEF123"),
        ));
        assert_eq!(mega.logout(true).await.unwrap().as_deref(), Some("ABCDEF123"));
        assert_eq!(mega.logout(false).await.unwrap(), None);
        assert_eq!(
            mega.runner.calls(),
            vec![argv(&["logout", "--keep-session"]), argv(&["logout"])]
        );
    }

    #[tokio::test]
    async fn ls_parses_listing() {
        let mega = mega(
            MockRunner::default().reply("ls", CommandOutput::ok(listing::tests::ls_listing())),
        );
        let entries = mega.ls("./docs").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_directory);
        assert_eq!(entries[1].name, "notes.txt");
        assert_eq!(
            mega.runner.calls(),
            vec![argv(&["ls", "-hal", "--show-handles", "docs"])]
        );
    }

    #[tokio::test]
    async fn ls_failure_is_a_command_error() {
        let mega = mega(MockRunner::default().reply(
            "ls",
            CommandOutput::failed(53, "Couldn't find /nope"),
        ));
        let err = mega.ls("/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cat_requires_a_path() {
        let mega = mega(MockRunner::default());
        let none: [&str; 0] = [];
        assert!(matches!(
            mega.cat(&none).await.unwrap_err(),
            Error::InvalidArguments(_)
        ));
        assert!(mega.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn file_management_argument_vectors() {
        let mega = mega(MockRunner::default());
        mega.cp(&["/a.txt", "/b.txt"], "/backup/").await.unwrap();
        mega.mv(&["/old.txt"], "/new.txt").await.unwrap();
        mega.rm(&["/tmp"], RemoveOptions::new().with_recursive(true).with_force(true))
            .await
            .unwrap();
        mega.rm(&["/x.txt"], RemoveOptions::new()).await.unwrap();
        mega.mkdir("/a/b/c", true).await.unwrap();
        mega.mkdir(" /d", false).await.unwrap();
        assert_eq!(
            mega.runner.calls(),
            vec![
                argv(&["cp", "/a.txt", "/b.txt", "/backup/"]),
                argv(&["mv", "/old.txt", "/new.txt"]),
                argv(&["rm", "-r", "-f", "/tmp"]),
                argv(&["rm", "/x.txt"]),
                argv(&["mkdir", "-p", "/a/b/c"]),
                argv(&["mkdir", "/d"]),
            ]
        );
    }

    #[tokio::test]
    async fn mkdir_existing_reports_code() {
        let mega = mega(MockRunner::default().reply(
            "mkdir",
            CommandOutput::failed(64, "Folder already exists"),
        ));
        let err = mega.mkdir("/docs", false).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::AlreadyExists));
    }

    #[tokio::test]
    async fn get_succeeds_on_finished_download() {
        let mega = mega(MockRunner::default().reply(
            "get",
            CommandOutput::ok("TRANSFERRING ||####|| 100.00%\nDownload finished: /tmp/a.txt"),
        ));
        let options = GetOptions::new()
            .with_local_path("/tmp/")
            .with_password("secret")
            .with_merge(true);
        mega.get("./a.txt", &options).await.unwrap();
        assert_eq!(
            mega.runner.calls(),
            vec![argv(&["get", "-m", "--password=secret", "a.txt", "/tmp"])]
        );
    }

    #[tokio::test]
    async fn get_without_finished_marker_is_unexpected() {
        let mega = mega(MockRunner::default().reply("get", CommandOutput::ok("hmm")));
        let err = mega.get("/a.txt", &GetOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedOutput { .. }));
    }

    #[tokio::test]
    async fn get_error_codes_are_decoded() {
        for (code, expected) in [
            (53, ErrorCode::NotFound),
            (54, ErrorCode::InvalidState),
            (55, ErrorCode::InvalidType),
        ] {
            let mega = mega(MockRunner::default().reply("get", CommandOutput::failed(code, "no")));
            let err = mega
                .get("/a.txt", &GetOptions::new().with_password("pw"))
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), Some(expected));
            assert!(!err.to_string().contains("=pw"));
        }
    }

    #[tokio::test]
    async fn put_single_and_multiple() {
        let mega = mega(
            MockRunner::default().reply("put", CommandOutput::ok("Upload finished: /docs")),
        );
        mega.put(&["notes.txt/"], None).await.unwrap();
        mega.put(&["a.txt", "b.txt"], Some("/docs")).await.unwrap();
        assert_eq!(
            mega.runner.calls(),
            vec![
                argv(&["put", "-c", "notes.txt"]),
                argv(&["put", "-c", "a.txt", "b.txt", "/docs/"]),
            ]
        );
    }

    #[tokio::test]
    async fn put_several_items_needs_destination() {
        let mega = mega(MockRunner::default());
        let err = mega.put(&["a.txt", "b.txt"], None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
        assert!(mega.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn import_recognises_file_and_folder() {
        let link = "https://mega.nz/file/abc#key";
        let file = mega(MockRunner::default().reply(
            "import",
            CommandOutput::ok("Imported file complete: /a.txt"),
        ));
        file.import(link, Some("/inbox"), Some("pw")).await.unwrap();
        assert_eq!(
            file.runner.calls(),
            vec![argv(&["import", link, "--password=pw", "/inbox"])]
        );

        let folder = mega(MockRunner::default().reply(
            "import",
            CommandOutput::ok("Imported folder complete: /shared"),
        ));
        folder.import(link, None, None).await.unwrap();

        let odd = mega(MockRunner::default().reply("import", CommandOutput::ok("??")));
        assert!(matches!(
            odd.import(link, None, None).await.unwrap_err(),
            Error::UnexpectedOutput { .. }
        ));
    }

    #[tokio::test]
    async fn export_actions() {
        let mega = mega(MockRunner::default().reply(
            "export",
            CommandOutput::ok("Exported /docs/a.txt: https://mega.nz/file/abc#key"),
        ));
        let added = mega.export_add("/docs/a.txt", false, None).await.unwrap();
        assert_eq!(added.link, "https://mega.nz/file/abc#key");

        let outcome = mega
            .export(&ExportAction::Delete {
                remote_path: "/docs/a.txt".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ExportOutcome::Deleted);

        mega.export_add("/shared", true, Some("pw")).await.unwrap();
        assert_eq!(
            mega.runner.calls(),
            vec![
                argv(&["export", "-f", "-a", "/docs/a.txt"]),
                argv(&["export", "-d", "/docs/a.txt"]),
                argv(&["export", "-f", "-a", "/shared", "--writable", "--password=pw"]),
            ]
        );
    }

    #[tokio::test]
    async fn export_list_through_dispatcher() {
        let line = "/docs/a.txt (1.50 KB, shared as exported permanent file link: https://mega.nz/file/abc#key)";
        let mega = mega(MockRunner::default().reply("export", CommandOutput::ok(line)));
        let outcome = mega
            .export(&ExportAction::List { remote_path: None })
            .await
            .unwrap();
        match outcome {
            ExportOutcome::Listed(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].size.as_deref(), Some("1.50 KB"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(mega.runner.calls(), vec![argv(&["export"])]);
    }

    #[tokio::test]
    async fn df_and_du() {
        let mega = mega(
            MockRunner::default()
                .reply("df", CommandOutput::ok(storage::tests::DF_OUTPUT))
                .reply("du", CommandOutput::ok("/docs: 10 20\nTotal storage used: 10 20")),
        );
        let df = mega.df().await.unwrap();
        assert_eq!(df.cloud_drive.files, 12);
        let du = mega.du(&["/docs"]).await.unwrap();
        assert_eq!(du.entries.len(), 1);
        assert_eq!(du.total_with_versions, 20);
        assert_eq!(mega.runner.calls()[1], argv(&["du", "--versions", "/docs"]));
    }

    #[tokio::test]
    async fn find_argument_order() {
        let mega = mega(MockRunner::default().reply(
            "find",
            CommandOutput::ok("/docs/a.txt <H:a0a0a0a0> (12.00 KB)"),
        ));
        let options = FindOptions::new()
            .with_remote_path("/docs")
            .with_pattern("*.txt")
            .with_mtime("-1d")
            .with_size("+1k");
        let entries = mega.find(&options).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            mega.runner.calls(),
            vec![argv(&[
                "find",
                "-l",
                "--show-handles",
                "--mtime=-1d",
                "--size=+1k",
                "/docs",
                "--pattern=*.txt",
            ])]
        );
    }

    #[tokio::test]
    async fn session_states() {
        let logged_in = mega(MockRunner::default().reply(
            "session",
            CommandOutput::ok("Your (secret) session is: ABCDEF123"),
        ));
        assert_eq!(logged_in.session().await.unwrap().as_deref(), Some("ABCDEF123"));

        let logged_out = mega(
            MockRunner::default().reply("session", CommandOutput::failed(57, "Not logged in.")),
        );
        assert_eq!(logged_out.session().await.unwrap(), None);

        let broken = mega(MockRunner::default().reply("session", CommandOutput::failed(59, "boom")));
        assert_eq!(
            broken.session().await.unwrap_err().error_code(),
            Some(ErrorCode::Unexpected)
        );
    }

    #[tokio::test]
    async fn whoami_without_email_is_unexpected() {
        let mega = mega(MockRunner::default().reply("whoami", CommandOutput::ok("???")));
        assert!(matches!(
            mega.whoami().await.unwrap_err(),
            Error::UnexpectedOutput { .. }
        ));
    }

    #[tokio::test]
    async fn cd_and_lcd() {
        let mega = mega(MockRunner::default());
        mega.cd("./docs").await.unwrap();
        mega.lcd("/tmp/work/").await.unwrap();
        assert_eq!(
            mega.runner.calls(),
            vec![argv(&["cd", "docs"]), argv(&["lcd", "/tmp/work"])]
        );

        let missing = self::mega(
            MockRunner::default().reply("cd", CommandOutput::failed(53, "Not found")),
        );
        assert!(missing.cd("/nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn export_list_with_nothing_exported_is_empty() {
        let mega = mega(MockRunner::default().reply(
            "export",
            CommandOutput::failed(53, "[err: ] Couldn't find anything exported below current folder."),
        ));
        assert_eq!(mega.export_list(None).await.unwrap(), Vec::new());
        assert_eq!(
            mega.export(&ExportAction::List { remote_path: None })
                .await
                .unwrap(),
            ExportOutcome::Listed(Vec::new())
        );

        let broken = self::mega(
            MockRunner::default().reply("export", CommandOutput::failed(59, "boom")),
        );
        assert_eq!(
            broken.export_list(Some("/docs")).await.unwrap_err().error_code(),
            Some(ErrorCode::Unexpected)
        );
    }

    #[tokio::test]
    async fn export_add_without_pro_still_returns_link() {
        let mega = mega(MockRunner::default().reply(
            "export",
            CommandOutput {
                stdout: "Exported /docs/a.txt: https://mega.nz/file/abc#key".to_string(),
                stderr: format!("[err: ] {}", export::PRO_ONLY_PASSWORD),
                code: 0,
            },
        ));
        let entry = mega
            .export_add("/docs/a.txt", false, Some("pw"))
            .await
            .unwrap();
        assert_eq!(entry.link, "https://mega.nz/file/abc#key");
        assert!(!entry.is_folder);
    }

    #[tokio::test]
    async fn empty_path_lists_are_rejected_without_spawning() {
        let mega = mega(MockRunner::default());
        let none: [&str; 0] = [];

        let errors = [
            mega.cp(&none, "/dest").await.unwrap_err(),
            mega.mv(&none, "/dest").await.unwrap_err(),
            mega.rm(&none, RemoveOptions::new()).await.unwrap_err(),
            mega.put(&none, Some("/docs")).await.unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, Error::InvalidArguments(_)), "{err:?}");
        }
        assert!(matches!(
            mega.du(&none).await.unwrap_err(),
            Error::InvalidArguments(_)
        ));
        assert!(mega.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn not_logged_in_text_under_other_codes() {
        let mega = mega(
            MockRunner::default()
                .reply("whoami", CommandOutput::failed(1, "[err: ] Not logged in."))
                .reply(
                    "session",
                    CommandOutput {
                        stdout: "Not logged in.".to_string(),
                        stderr: String::new(),
                        code: 54,
                    },
                ),
        );
        assert_eq!(mega.whoami().await.unwrap(), None);
        assert_eq!(mega.session().await.unwrap(), None);
    }
}
