//! Subcommand names and argument vectors passed to MEGAcmd.

use std::fmt;

/// The MEGAcmd subcommands this crate knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subcommand {
    Login,
    Logout,
    Ls,
    Tree,
    Cat,
    Cp,
    Mv,
    Rm,
    Mkdir,
    Get,
    Put,
    Import,
    Export,
    Df,
    Du,
    Find,
    Session,
    Whoami,
    Version,
    Cd,
    Lcd,
    Pwd,
    Lpwd,
}

impl Subcommand {
    /// Every supported subcommand.
    pub const ALL: [Self; 23] = [
        Self::Login,
        Self::Logout,
        Self::Ls,
        Self::Tree,
        Self::Cat,
        Self::Cp,
        Self::Mv,
        Self::Rm,
        Self::Mkdir,
        Self::Get,
        Self::Put,
        Self::Import,
        Self::Export,
        Self::Df,
        Self::Du,
        Self::Find,
        Self::Session,
        Self::Whoami,
        Self::Version,
        Self::Cd,
        Self::Lcd,
        Self::Pwd,
        Self::Lpwd,
    ];

    /// The name MEGAcmd expects as its first argument.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Ls => "ls",
            Self::Tree => "tree",
            Self::Cat => "cat",
            Self::Cp => "cp",
            Self::Mv => "mv",
            Self::Rm => "rm",
            Self::Mkdir => "mkdir",
            Self::Get => "get",
            Self::Put => "put",
            Self::Import => "import",
            Self::Export => "export",
            Self::Df => "df",
            Self::Du => "du",
            Self::Find => "find",
            Self::Session => "session",
            Self::Whoami => "whoami",
            Self::Version => "version",
            Self::Cd => "cd",
            Self::Lcd => "lcd",
            Self::Pwd => "pwd",
            Self::Lpwd => "lpwd",
        }
    }

    /// Looks up a subcommand by its MEGAcmd name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.as_str() == name)
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single positional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Plain(String),
    /// Passed to the process verbatim but never printed.
    Secret(String),
}

const REDACTED: &str = "********";

/// A subcommand plus its arguments, ready to hand to a [`CommandRunner`](crate::CommandRunner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    subcommand: Subcommand,
    args: Vec<Arg>,
}

impl Invocation {
    /// Starts an invocation with no arguments.
    #[must_use]
    pub const fn new(subcommand: Subcommand) -> Self {
        Self {
            subcommand,
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    /// Appends several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|a| Arg::Plain(a.into())));
        self
    }

    /// Appends `arg` only when `cond` holds.
    #[must_use]
    pub fn flag(self, cond: bool, arg: &str) -> Self {
        if cond { self.arg(arg) } else { self }
    }

    /// Appends an argument if present.
    #[must_use]
    pub fn opt_arg(self, arg: Option<impl Into<String>>) -> Self {
        match arg {
            Some(a) => self.arg(a),
            None => self,
        }
    }

    /// Appends an argument that must not appear in logs or error messages.
    #[must_use]
    pub fn secret(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Secret(arg.into()));
        self
    }

    /// Appends `--name=value` as a secret, if a value is given.
    #[must_use]
    pub fn opt_secret_option(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.secret(format!("--{name}={v}")),
            None => self,
        }
    }

    /// The subcommand being run.
    #[must_use]
    pub const fn subcommand(&self) -> Subcommand {
        self.subcommand
    }

    /// The full argument vector passed to the process, subcommand first.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        std::iter::once(self.subcommand.as_str().to_string())
            .chain(self.args.iter().map(|a| match a {
                Arg::Plain(s) | Arg::Secret(s) => s.clone(),
            }))
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand.as_str())?;
        for arg in &self.args {
            match arg {
                Arg::Plain(s) => write!(f, " {s}")?,
                Arg::Secret(s) => match s.split_once('=') {
                    Some((name, _)) if name.starts_with("--") => write!(f, " {name}={REDACTED}")?,
                    _ => write!(f, " {REDACTED}")?,
                },
            }
        }
        Ok(())
    }
}
