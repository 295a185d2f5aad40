use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskflow",
    version,
    about = "TaskFlow: a personal task tracker",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "taskflowrc")]
    pub taskflowrc: Option<PathBuf>,

    /// Directory holding the stored state; overrides `data.location`.
    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a task.
    Add(AddArgs),
    /// List tasks matching a filter and search term.
    List {
        #[arg(long, short = 'f')]
        filter: Option<String>,
        #[arg(long, short = 's')]
        search: Option<String>,
    },
    /// Show every field of one task.
    Info { id: String },
    /// Flip a task between open and completed.
    Toggle { id: String },
    Edit(EditArgs),
    Delete { id: String },
    /// Drag a task onto another task's position.
    Move {
        id: String,
        #[arg(long)]
        onto: String,
    },
    ClearCompleted,
    Stats,
    /// Show or change the theme: light, dark or toggle.
    Theme { value: Option<String> },
    /// Show settings, or change them with key=value pairs.
    Settings {
        #[arg(value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()))]
        pairs: Vec<KeyVal>,
    },
    Export {
        #[arg(long, default_value = "json")]
        format: String,
        /// Write here instead of stdout. A directory gets the dated backup name.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Replace all tasks with those in an export file (`-` for stdin).
    Import { source: String },
}

impl Default for Command {
    fn default() -> Self {
        Self::List {
            filter: None,
            search: None,
        }
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    #[arg(long, short = 'c')]
    pub category: Option<String>,

    #[arg(long, short = 'p')]
    pub priority: Option<String>,

    /// today, tomorrow, friday, +3d, in 2 weeks, 2026-05-01, ...
    #[arg(long, short = 'd')]
    pub due: Option<String>,

    #[arg(long = "tag", short = 't', action = ArgAction::Append)]
    pub tags: Vec<String>,

    #[arg(long, short = 'n')]
    pub notes: Option<String>,

    /// Estimated minutes.
    #[arg(long)]
    pub estimate: Option<u64>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long, short = 'c')]
    pub category: Option<String>,

    #[arg(long, short = 'p')]
    pub priority: Option<String>,

    #[arg(long, short = 'd', conflicts_with = "no_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub no_due: bool,

    /// Replaces the tag list.
    #[arg(long = "tag", short = 't', action = ArgAction::Append, conflicts_with = "clear_tags")]
    pub tags: Vec<String>,

    #[arg(long)]
    pub clear_tags: bool,

    #[arg(long, short = 'n')]
    pub notes: Option<String>,

    #[arg(long)]
    pub estimate: Option<u64>,

    #[arg(long)]
    pub actual: Option<u64>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        let parsed = s.strip_prefix("rc.").and_then(|rest| {
            rest.split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (k.to_string(), v.to_string()))
        });

        match parsed {
            Some((k, v)) if !k.is_empty() => {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
            }
            _ => cleaned.push(arg),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(|s| OsString::from(*s)).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&["taskflow", "rc.color=off", "list", "rc.default.filter:active"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, args(&["taskflow", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("color".to_string(), "off".to_string()),
                ("default.filter".to_string(), "active".to_string()),
            ]
        );
    }

    #[test]
    fn parses_add_with_metadata() {
        let cli = GlobalCli::try_parse_from(args(&[
            "taskflow", "-v", "add", "Buy", "milk", "-p", "high", "--tag", "home", "--tag", "errand", "--due",
            "tomorrow",
        ]))
        .expect("valid args");

        assert_eq!(cli.verbose, 1);
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add, got {:?}", cli.command);
        };
        assert_eq!(add.text, vec!["Buy".to_string(), "milk".to_string()]);
        assert_eq!(add.priority.as_deref(), Some("high"));
        assert_eq!(add.tags, vec!["home".to_string(), "errand".to_string()]);
        assert_eq!(add.due.as_deref(), Some("tomorrow"));
    }

    #[test]
    fn edit_rejects_due_with_no_due() {
        let err = GlobalCli::try_parse_from(args(&["taskflow", "edit", "abc", "--due", "today", "--no-due"]));
        assert!(err.is_err());
    }

    #[test]
    fn missing_command_defaults_to_list() {
        let cli = GlobalCli::try_parse_from(args(&["taskflow", "--rc", "color=off"])).expect("valid args");
        assert_eq!(cli.command.unwrap_or_default(), Command::default());
        assert_eq!(
            cli.rc_overrides,
            vec![KeyVal {
                key: "color".to_string(),
                value: "off".to_string()
            }]
        );
    }
}
