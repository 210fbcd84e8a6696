//! megashim - drive the MEGAcmd command-line client from Rust.
//!
//! Each method on [`MegaCmd`] runs one MEGAcmd subcommand as a child process
//! and returns its output, parsed where the output has structure. MEGAcmd
//! keeps the login session in its own server, so calls share it.
//!
//! # Example
//!
//! ```no_run
//! use megashim::{Login, MegaCmd};
//!
//! # async fn example() -> megashim::Result<()> {
//! let mega = MegaCmd::new("mega-exec")?;
//! mega.login(&Login::credentials("me@example.com", "password")).await?;
//!
//! for entry in mega.ls("/").await? {
//!     println!("{} {}", if entry.is_directory { "d" } else { "-" }, entry.name);
//! }
//!
//! println!("{}", mega.tree(Some("/")).await?);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod invocation;
pub mod listing;
pub mod path;
pub mod runner;
pub mod storage;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use client::{FindOptions, GetOptions, Login, MegaCmd, RemoveOptions};
pub use config::ShimConfig;
pub use error::{Error, ErrorCode, Result};
pub use export::{ExportAction, ExportEntry, ExportOutcome};
pub use invocation::{Invocation, Subcommand};
pub use listing::DirectoryEntry;
pub use path::{clean_local_path, clean_remote_path};
pub use runner::{CommandOutput, CommandRunner, TokioCommandRunner};
pub use storage::{AreaUsage, DiskFree, DiskUsage, DiskUsageEntry};
