//! CLI mode for megashim - maps command-line arguments onto [`MegaCmd`] methods.

mod output;

use std::path::PathBuf;

use crate::{
    CommandRunner, DirectoryEntry, DiskFree, DiskUsage, Error, ExportAction, ExportEntry,
    ExportOutcome, FindOptions, GetOptions, Login, MegaCmd, RemoveOptions, ShimConfig,
    Subcommand,
};

pub use output::{format_bytes, print_error};

const USAGE: &str = "\
Usage: megashim [--megacmd PATH] [--config PATH] [--json] <command> [args...]

Commands:
  login [EMAIL [PASSWORD]] [--auth-code=CODE]   (falls back to MEGA_EMAIL, MEGA_PASSWORD, MEGA_MFA)
  login --session=SESSION
  logout [--keep-session]
  ls [PATH]                 tree [PATH]              cat PATH...
  cp SRC... DEST            mv SRC... DEST           rm [-r] [-f] PATH...
  mkdir [-p] PATH           get [-m] [--password=P] REMOTE [LOCAL]
  put LOCAL... [REMOTE]     import LINK [REMOTE] [--password=P]
  export [PATH]             export -a PATH [--writable] [--password=P]
  export -d PATH            df                       du PATH...
  find [PATH] [--pattern=P] [--mtime=T] [--size=S]
  session  whoami  version  cd PATH  lcd PATH  pwd  lpwd

Global options:
  --megacmd PATH   MEGAcmd executable (default from config, else mega-exec)
  --config PATH    Config file (default: <config dir>/megashim/config.toml)
  --json           Print structured results as JSON
  -h, --help       Show this help

Arguments after `--` are never read as flags, e.g. `megashim login EMAIL -- -pass`.";

/// A parsed `megashim` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub executable: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub json: bool,
    pub command: Command,
}

/// One MEGAcmd operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Login(Login),
    Logout { keep_session: bool },
    Ls(String),
    Tree(Option<String>),
    Cat(Vec<String>),
    Cp { sources: Vec<String>, destination: String },
    Mv { sources: Vec<String>, destination: String },
    Rm { paths: Vec<String>, options: RemoveOptions },
    Mkdir { path: String, parents: bool },
    Get { remote: String, options: GetOptions },
    Put { locals: Vec<String>, remote: Option<String> },
    Import { link: String, remote: Option<String>, password: Option<String> },
    Export(ExportAction),
    Df,
    Du(Vec<String>),
    Find(FindOptions),
    Session,
    Whoami,
    Version,
    Cd(String),
    Lcd(String),
    Pwd,
    Lpwd,
}

impl Command {
    /// Transfers can take a while; the CLI shows a spinner for them.
    #[must_use]
    pub const fn is_transfer(&self) -> bool {
        matches!(self, Self::Get { .. } | Self::Put { .. } | Self::Import { .. })
    }
}

/// What a command produced, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Done,
    Text(String),
    /// `whoami`/`session`/`logout --keep-session`; `None` when there is nothing to show.
    Optional(Option<String>),
    Entries(Vec<DirectoryEntry>),
    Export(ExportEntry),
    Exports(Vec<ExportEntry>),
    DiskFree(DiskFree),
    DiskUsage(DiskUsage),
}

/// Splits arguments into `-x`/`--name[=value]` flags and positionals.
/// Everything after `--` is positional.
fn split_flags(args: &[String]) -> (Vec<&str>, Vec<&str>) {
    let (head, tail) = match args.iter().position(|a| a == "--") {
        Some(end) => (&args[..end], &args[end + 1..]),
        None => (args, &args[args.len()..]),
    };
    let (flags, mut pos): (Vec<&str>, Vec<&str>) = head
        .iter()
        .map(String::as_str)
        .partition(|a| a.len() > 1 && a.starts_with('-'));
    pos.extend(tail.iter().map(String::as_str));
    (flags, pos)
}

fn flag_name(flag: &str) -> &str {
    flag.split_once('=').map_or(flag, |(name, _)| name)
}

fn has_flag(flags: &[&str], name: &str) -> bool {
    flags.iter().any(|f| *f == name)
}

fn flag_value(flags: &[&str], name: &str) -> Option<String> {
    flags.iter().find_map(|f| match f.split_once('=') {
        Some((n, value)) if n == name => Some(value.to_string()),
        _ => None,
    })
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn one(subcommand: Subcommand, pos: &[&str]) -> Result<String, String> {
    match pos {
        [only] => Ok((*only).to_string()),
        _ => Err(format!("{subcommand} takes exactly one path")),
    }
}

fn at_most_one(subcommand: Subcommand, pos: &[&str]) -> Result<Option<String>, String> {
    match pos {
        [] => Ok(None),
        [only] => Ok(Some((*only).to_string())),
        _ => Err(format!("{subcommand} takes at most one path")),
    }
}

fn none(subcommand: Subcommand, pos: &[&str]) -> Result<(), String> {
    if pos.is_empty() {
        Ok(())
    } else {
        Err(format!("{subcommand} takes no arguments"))
    }
}

fn sources_and_destination(
    subcommand: Subcommand,
    pos: &[&str],
) -> Result<(Vec<String>, String), String> {
    match pos {
        [sources @ .., destination] if !sources.is_empty() => {
            Ok((owned(sources), (*destination).to_string()))
        }
        _ => Err(format!("{subcommand} needs at least one source and a destination")),
    }
}

/// Flags each subcommand accepts, by name.
const fn allowed_flags(subcommand: Subcommand) -> &'static [&'static str] {
    match subcommand {
        Subcommand::Login => &["--session", "--auth-code"],
        Subcommand::Logout => &["--keep-session"],
        Subcommand::Rm => &["-r", "-f"],
        Subcommand::Mkdir => &["-p"],
        Subcommand::Get => &["-m", "--password"],
        Subcommand::Import => &["--password"],
        Subcommand::Export => &["-a", "-d", "--writable", "--password"],
        Subcommand::Find => &["--pattern", "--mtime", "--size"],
        _ => &[],
    }
}

fn parse_login(
    flags: &[&str],
    pos: &[&str],
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Login, String> {
    if let Some(session) = flag_value(flags, "--session") {
        if !pos.is_empty() || flag_value(flags, "--auth-code").is_some() {
            return Err("login --session takes no other arguments".to_string());
        }
        return Ok(Login::session(session));
    }
    if pos.len() > 2 {
        return Err("login takes at most an e-mail and a password".to_string());
    }
    let email = pos
        .first()
        .map(|s| (*s).to_string())
        .or_else(|| env("MEGA_EMAIL"))
        .ok_or("no e-mail given and MEGA_EMAIL is not set")?;
    let password = pos
        .get(1)
        .map(|s| (*s).to_string())
        .or_else(|| env("MEGA_PASSWORD"))
        .ok_or("no password given and MEGA_PASSWORD is not set")?;
    let login = Login::credentials(email, password);
    Ok(
        match flag_value(flags, "--auth-code").or_else(|| env("MEGA_MFA")) {
            Some(code) => login.with_auth_code(code),
            None => login,
        },
    )
}

fn parse_export(flags: &[&str], pos: &[&str]) -> Result<ExportAction, String> {
    let add = has_flag(flags, "-a");
    let delete = has_flag(flags, "-d");
    let writable = has_flag(flags, "--writable");
    let password = flag_value(flags, "--password");

    if !add && (writable || password.is_some()) {
        return Err("--writable and --password only apply to export -a".to_string());
    }
    match (add, delete) {
        (true, true) => Err("export takes either -a or -d, not both".to_string()),
        (true, false) => Ok(ExportAction::Add {
            remote_path: one(Subcommand::Export, pos)?,
            writable,
            password,
        }),
        (false, true) => Ok(ExportAction::Delete {
            remote_path: one(Subcommand::Export, pos)?,
        }),
        (false, false) => Ok(ExportAction::List {
            remote_path: at_most_one(Subcommand::Export, pos)?,
        }),
    }
}

fn parse_command(
    subcommand: Subcommand,
    args: &[String],
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Command, String> {
    let (flags, pos) = split_flags(args);
    let allowed = allowed_flags(subcommand);
    if let Some(bad) = flags.iter().find(|f| !allowed.contains(&flag_name(f))) {
        return Err(format!("{subcommand} does not accept {bad}"));
    }

    Ok(match subcommand {
        Subcommand::Login => Command::Login(parse_login(&flags, &pos, env)?),
        Subcommand::Logout => {
            none(subcommand, &pos)?;
            Command::Logout {
                keep_session: has_flag(&flags, "--keep-session"),
            }
        }
        Subcommand::Ls => {
            Command::Ls(at_most_one(subcommand, &pos)?.unwrap_or_else(|| "/".to_string()))
        }
        Subcommand::Tree => Command::Tree(at_most_one(subcommand, &pos)?),
        Subcommand::Cat | Subcommand::Du if pos.is_empty() => {
            return Err(format!("{subcommand} needs at least one path"));
        }
        Subcommand::Cat => Command::Cat(owned(&pos)),
        Subcommand::Du => Command::Du(owned(&pos)),
        Subcommand::Cp => {
            let (sources, destination) = sources_and_destination(subcommand, &pos)?;
            Command::Cp {
                sources,
                destination,
            }
        }
        Subcommand::Mv => {
            let (sources, destination) = sources_and_destination(subcommand, &pos)?;
            Command::Mv {
                sources,
                destination,
            }
        }
        Subcommand::Rm => {
            if pos.is_empty() {
                return Err("rm needs at least one path".to_string());
            }
            Command::Rm {
                paths: owned(&pos),
                options: RemoveOptions::new()
                    .with_recursive(has_flag(&flags, "-r"))
                    .with_force(has_flag(&flags, "-f")),
            }
        }
        Subcommand::Mkdir => Command::Mkdir {
            path: one(subcommand, &pos)?,
            parents: has_flag(&flags, "-p"),
        },
        Subcommand::Get => {
            let (remote, local) = match pos.as_slice() {
                [remote] => ((*remote).to_string(), None),
                [remote, local] => ((*remote).to_string(), Some((*local).to_string())),
                _ => return Err("get takes a remote path and an optional local path".to_string()),
            };
            let mut options = GetOptions::new().with_merge(has_flag(&flags, "-m"));
            options.local_path = local;
            options.password = flag_value(&flags, "--password");
            Command::Get { remote, options }
        }
        Subcommand::Put => match pos.as_slice() {
            [] => return Err("put needs at least one local path".to_string()),
            [local] => Command::Put {
                locals: vec![(*local).to_string()],
                remote: None,
            },
            [locals @ .., remote] => Command::Put {
                locals: owned(locals),
                remote: Some((*remote).to_string()),
            },
        },
        Subcommand::Import => match pos.as_slice() {
            [link, rest @ ..] if rest.len() <= 1 => Command::Import {
                link: (*link).to_string(),
                remote: rest.first().map(|s| (*s).to_string()),
                password: flag_value(&flags, "--password"),
            },
            _ => return Err("import takes a link and an optional remote path".to_string()),
        },
        Subcommand::Export => Command::Export(parse_export(&flags, &pos)?),
        Subcommand::Df => {
            none(subcommand, &pos)?;
            Command::Df
        }
        Subcommand::Find => {
            let mut options = FindOptions::new();
            options.remote_path = at_most_one(subcommand, &pos)?;
            options.pattern = flag_value(&flags, "--pattern");
            options.mtime = flag_value(&flags, "--mtime");
            options.size = flag_value(&flags, "--size");
            Command::Find(options)
        }
        Subcommand::Session => {
            none(subcommand, &pos)?;
            Command::Session
        }
        Subcommand::Whoami => {
            none(subcommand, &pos)?;
            Command::Whoami
        }
        Subcommand::Version => {
            none(subcommand, &pos)?;
            Command::Version
        }
        Subcommand::Cd => Command::Cd(one(subcommand, &pos)?),
        Subcommand::Lcd => Command::Lcd(one(subcommand, &pos)?),
        Subcommand::Pwd => {
            none(subcommand, &pos)?;
            Command::Pwd
        }
        Subcommand::Lpwd => {
            none(subcommand, &pos)?;
            Command::Lpwd
        }
    })
}

/// Parses `megashim` arguments (without the program name).
///
/// `env` looks up environment variables; it is only consulted for login
/// credentials.
///
/// # Errors
///
/// Returns a usage message for unknown commands, unknown flags or a wrong
/// number of arguments.
pub fn parse_args(args: &[String], env: &dyn Fn(&str) -> Option<String>) -> Result<Options, String> {
    let mut executable = None;
    let mut config_path = None;
    let mut json = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--megacmd" | "--config" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| format!("{} requires a value", args[i]))?;
                if args[i] == "--megacmd" {
                    executable = Some(PathBuf::from(value));
                } else {
                    config_path = Some(PathBuf::from(value));
                }
                i += 1;
            }
            "--json" => json = true,
            "-h" | "--help" => {
                return Ok(Options {
                    executable,
                    config_path,
                    json,
                    command: Command::Help,
                });
            }
            _ => break,
        }
        i += 1;
    }

    let command = match args.get(i) {
        None => Command::Help,
        Some(name) => {
            let subcommand =
                Subcommand::from_name(name).ok_or_else(|| format!("unknown command: {name}"))?;
            parse_command(subcommand, &args[i + 1..], env)?
        }
    };

    Ok(Options {
        executable,
        config_path,
        json,
        command,
    })
}

/// Runs one parsed command against `mega`.
///
/// # Errors
///
/// Returns whatever the underlying [`MegaCmd`] method returns.
pub async fn dispatch<R: CommandRunner>(mega: &MegaCmd<R>, command: Command) -> crate::Result<Report> {
    Ok(match command {
        Command::Help => Report::Text(USAGE.to_string()),
        Command::Login(login) => {
            mega.login(&login).await?;
            Report::Done
        }
        Command::Logout { keep_session } => {
            let session = mega.logout(keep_session).await?;
            if keep_session {
                Report::Optional(session)
            } else {
                Report::Done
            }
        }
        Command::Ls(path) => Report::Entries(mega.ls(&path).await?),
        Command::Tree(path) => Report::Text(mega.tree(path.as_deref()).await?),
        Command::Cat(paths) => Report::Text(mega.cat(&paths).await?),
        Command::Cp {
            sources,
            destination,
        } => {
            mega.cp(&sources, &destination).await?;
            Report::Done
        }
        Command::Mv {
            sources,
            destination,
        } => {
            mega.mv(&sources, &destination).await?;
            Report::Done
        }
        Command::Rm { paths, options } => {
            mega.rm(&paths, options).await?;
            Report::Done
        }
        Command::Mkdir { path, parents } => {
            mega.mkdir(&path, parents).await?;
            Report::Done
        }
        Command::Get { remote, options } => {
            mega.get(&remote, &options).await?;
            Report::Done
        }
        Command::Put { locals, remote } => {
            mega.put(&locals, remote.as_deref()).await?;
            Report::Done
        }
        Command::Import {
            link,
            remote,
            password,
        } => {
            mega.import(&link, remote.as_deref(), password.as_deref())
                .await?;
            Report::Done
        }
        Command::Export(action) => match mega.export(&action).await? {
            ExportOutcome::Added(entry) => Report::Export(entry),
            ExportOutcome::Deleted => Report::Done,
            ExportOutcome::Listed(entries) => Report::Exports(entries),
        },
        Command::Df => Report::DiskFree(mega.df().await?),
        Command::Du(paths) => Report::DiskUsage(mega.du(&paths).await?),
        Command::Find(options) => Report::Entries(mega.find(&options).await?),
        Command::Session => Report::Optional(mega.session().await?),
        Command::Whoami => Report::Optional(mega.whoami().await?),
        Command::Version => Report::Text(mega.version().await?),
        Command::Cd(path) => {
            mega.cd(&path).await?;
            Report::Done
        }
        Command::Lcd(path) => {
            mega.lcd(&path).await?;
            Report::Done
        }
        Command::Pwd => Report::Text(mega.pwd().await?),
        Command::Lpwd => Report::Text(mega.lpwd().await?),
    })
}

/// Maps an error onto a process exit code, passing MEGAcmd's own code through.
#[must_use]
pub fn exit_code(error: &Error) -> u8 {
    error
        .error_code()
        .and_then(|code| u8::try_from(code.as_i32().unsigned_abs()).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the configuration cannot be
/// loaded, MEGAcmd cannot be found, or the command fails.
pub async fn run() -> crate::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = parse_args(&args, &|name: &str| std::env::var(name).ok())
        .map_err(Error::InvalidArguments)?;

    if options.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = match &options.config_path {
        Some(path) => ShimConfig::load(path)?,
        None => ShimConfig::load_default()?,
    };
    let executable = options.executable.unwrap_or(config.executable);
    let json = options.json || config.json;

    let mega = MegaCmd::new(&executable)?;

    let spinner = options
        .command
        .is_transfer()
        .then(|| output::transfer_spinner(&options.command));
    let result = dispatch(&mega, options.command).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let rendered = output::render(&result?, json);
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}
