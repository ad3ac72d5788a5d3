use std::fmt;

use progress_core::model::ChecklistId;
use services::{AppServices, AuthStatus, ProgressSyncService, SyncOutcome};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { name: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    VerifiedWithoutUser,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::VerifiedWithoutUser => write!(f, "--verified requires --user"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- show   [options]");
    eprintln!("  cargo run -p app -- toggle <checklist> <item> [options]");
    eprintln!("  cargo run -p app -- reset  <checklist> [options]");
    eprintln!("  cargo run -p app -- sync   [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   default sqlite:progress.sqlite3");
    eprintln!("  --user <id>         signed-in user; anonymous when omitted");
    eprintln!("  --verified          the user's email is verified (enables remote sync)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PROGRESS_DB_URL, PROGRESS_USER, PROGRESS_API_URL, PROGRESS_API_TOKEN,");
    eprintln!("  PROGRESS_DEBOUNCE_MS, PROGRESS_LANGUAGES, PROGRESS_EXAMS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Show,
    Toggle { checklist: String, item: String },
    Reset { checklist: String },
    Sync,
}

struct Args {
    command: Command,
    db_url: String,
    auth: AuthStatus,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PROGRESS_DB_URL")
            .ok()
            .map_or_else(|| "sqlite:progress.sqlite3".into(), normalize_sqlite_url);
        let mut user = std::env::var("PROGRESS_USER")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let mut verified = false;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => user = Some(require_value(&mut args, "--user")?),
                "--verified" => verified = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let auth = match (user, verified) {
            (None, true) => return Err(ArgsError::VerifiedWithoutUser),
            (None, false) => AuthStatus::Anonymous,
            (Some(user), false) => AuthStatus::unverified(user),
            (Some(user), true) => AuthStatus::verified(user),
        };

        Ok(Self {
            command: Command::from_positional(positional)?,
            db_url,
            auth,
        })
    }
}

impl Command {
    fn from_positional(args: Vec<String>) -> Result<Self, ArgsError> {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            None | Some("show") => Self::Show,
            Some("sync") => Self::Sync,
            Some("toggle") => Self::Toggle {
                checklist: args.next().ok_or(ArgsError::MissingArg { name: "checklist" })?,
                item: args.next().ok_or(ArgsError::MissingArg { name: "item" })?,
            },
            Some("reset") => Self::Reset {
                checklist: args.next().ok_or(ArgsError::MissingArg { name: "checklist" })?,
            },
            Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
        };
        match args.next() {
            Some(extra) => Err(ArgsError::UnknownArg(extra)),
            None => Ok(command),
        }
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_progress(sync: &ProgressSyncService) -> Result<(), Box<dyn std::error::Error>> {
    let state = sync.snapshot()?;
    for (cache_key, record) in state.iter() {
        println!(
            "{:<28} {:>4} topics done  {:>4} items",
            ChecklistId::from_cache_key(cache_key).to_string(),
            record.completed_topics(),
            record.len()
        );
    }
    Ok(())
}

fn describe(outcome: SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Unchanged | SyncOutcome::Reloaded(_) => "progress loaded".into(),
        SyncOutcome::Purged { removed, .. } => {
            format!("removed {removed} checklists cached for another account")
        }
        SyncOutcome::Migrated { checklists, .. } => {
            format!("imported {checklists} local checklists into the account")
        }
        SyncOutcome::MigrationFailed(_) => {
            "could not import local progress; it will be retried next sync".into()
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let app = AppServices::from_env(&parsed.db_url).await?;
    let sync = app.sync();

    if parsed.auth.can_use_remote() && !app.remote_configured() {
        tracing::warn!("user is verified but PROGRESS_API_URL is not set");
    }

    let outcome = sync.mount(parsed.auth.clone()).await?;
    tracing::debug!(?outcome, "mounted progress");

    match parsed.command {
        Command::Show => print_progress(&sync)?,
        Command::Sync => {
            println!("{}", describe(outcome));
            print_progress(&sync)?;
        }
        Command::Toggle { checklist, item } => {
            let done = sync.toggle_item(&checklist, &item).await?;
            println!("{checklist}: {item} -> {}", if done { "done" } else { "not done" });
        }
        Command::Reset { checklist } => {
            sync.reset_checklist(&checklist).await?;
            println!("{checklist}: reset");
        }
    }

    sync.flush().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|arg| (*arg).to_owned()))
    }

    #[test]
    fn toggle_takes_checklist_and_item() {
        let args = parse(&["toggle", "python_dsa", "Two Pointers", "--db", "sqlite::memory:"])
            .unwrap();
        assert_eq!(
            args.command,
            Command::Toggle {
                checklist: "python_dsa".into(),
                item: "Two Pointers".into()
            }
        );
        assert_eq!(args.db_url, "sqlite::memory:");
    }

    #[test]
    fn user_flags_select_auth_status() {
        let args = parse(&["sync", "--user", "u1", "--verified"]).unwrap();
        assert_eq!(args.auth, AuthStatus::verified("u1"));
        let args = parse(&["--user", "u1"]).unwrap();
        assert_eq!(args.command, Command::Show);
        assert_eq!(args.auth, AuthStatus::unverified("u1"));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(parse(&["toggle", "dsa"]), Err(ArgsError::MissingArg { .. })));
        assert!(matches!(parse(&["launch"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(parse(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
        assert!(matches!(parse(&["reset", "dsa", "extra"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/progress.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/progress.sqlite3"));
    }
}
