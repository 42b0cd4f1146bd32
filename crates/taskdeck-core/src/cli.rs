use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::builder::ValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::model::{Priority, Status};
use crate::views::FilterMode;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
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

fn priority_parser() -> ValueParser {
    ValueParser::new(|s: &str| s.parse::<Priority>())
}

fn status_parser() -> ValueParser {
    ValueParser::new(|s: &str| s.parse::<Status>())
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: projects, tasks and calendars, online or offline",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "taskdeckrc")]
    pub taskdeckrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check whether the remote API is reachable and show which storage is in use.
    Status,

    #[command(subcommand)]
    Project(ProjectCommand),

    #[command(subcommand)]
    Task(TaskCommand),

    /// Month calendar (defaults to the current month).
    Month {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },

    /// Sunday-start week containing DATE (defaults to today).
    Week {
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a project and all of its tasks.
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(
            long,
            default_value = "all",
            value_parser = ValueParser::new(|s: &str| s.parse::<FilterMode>())
        )]
        filter: FilterMode,
        #[arg(long, value_parser = priority_parser())]
        priority: Option<Priority>,
        #[arg(long, value_parser = status_parser())]
        status: Option<Status>,
    },
    Add {
        title: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = priority_parser())]
        priority: Option<Priority>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        reminder: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = priority_parser())]
        priority: Option<Priority>,
        #[arg(long, value_parser = status_parser())]
        status: Option<Status>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long, conflicts_with = "clear_reminder")]
        reminder: Option<String>,
        #[arg(long)]
        clear_reminder: bool,
    },
    Delete {
        id: String,
    },
    /// Flip a task between pending and completed.
    Toggle {
        id: String,
    },
    /// Give the listed tasks order 0, 1, 2, ... in the order given.
    Reorder {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
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
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Global flags that consume the following argument as their value.
const VALUE_FLAGS: [&str; 3] = ["--rc", "--taskdeckrc", "--data"];

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it. Only arguments ahead of the subcommand
/// are considered, so a task title like `rc.x=1` is left alone.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    while let Some(arg) = iter.next() {
        let s = arg.to_string_lossy().into_owned();

        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
        if VALUE_FLAGS.contains(&s.as_str()) {
            if let Some(value) = iter.next() {
                cleaned.push(value);
            }
        } else if s == "--" || !s.starts_with('-') {
            // The subcommand (or `--`) ends the global section.
            break;
        }
    }
    cleaned.extend(iter);

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "taskdeck",
            "rc.api.enabled=off",
            "--data",
            "/tmp/deck",
            "rc.color:off",
            "task",
            "list",
        ]))
        .expect("preprocess");

        assert_eq!(
            pre.cleaned_args,
            args(&["taskdeck", "--data", "/tmp/deck", "task", "list"])
        );
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.api.enabled".to_string(), "off".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn rc_lookalikes_after_the_subcommand_are_kept() {
        let raw = args(&["taskdeck", "task", "add", "rc.x=1", "--project", "p"]);
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args, raw);
        assert!(pre.rc_overrides.is_empty());

        // A flag value that looks like an override is not one either.
        let raw = args(&["taskdeck", "--taskdeckrc", "rc.file:x", "status"]);
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args, raw);
        assert!(pre.rc_overrides.is_empty());

        let cli = GlobalCli::try_parse_from(args(&[
            "taskdeck", "task", "add", "rc.x=1", "--project", "p",
        ]))
        .expect("parse");
        match cli.command {
            Some(Command::Task(TaskCommand::Add { title, .. })) => assert_eq!(title, "rc.x=1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_task_list_filters() {
        let cli = GlobalCli::try_parse_from([
            "taskdeck",
            "task",
            "list",
            "--filter",
            "upcoming",
            "--priority",
            "high",
        ])
        .expect("parse");

        match cli.command {
            Some(Command::Task(TaskCommand::List {
                filter, priority, ..
            })) => {
                assert_eq!(filter, FilterMode::Upcoming);
                assert_eq!(priority, Some(Priority::High));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn reorder_requires_ids() {
        assert!(GlobalCli::try_parse_from(["taskdeck", "task", "reorder"]).is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        GlobalCli::command().debug_assert();
    }
}
