use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::datetime::parse_form_date;
use crate::form::TaskForm;
use crate::task::RepeatMode;

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

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskform",
    version,
    about = "Create and edit tasks from the terminal",
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

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List projects, newest first.
    Projects,
    /// Add a project to the catalog.
    ProjectAdd { name: String },
    /// Create a task.
    Add(FormArgs),
    /// Edit an existing task.
    Edit {
        id: u64,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Show a stored task.
    Info { id: u64 },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FormArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub project: Option<u64>,

    /// Tick the "one-time task" box.
    #[arg(long, conflicts_with = "repeat")]
    pub one_time: bool,

    #[arg(
        long,
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<RepeatMode>())
    )]
    pub repeat: Option<RepeatMode>,

    /// Day-picker weekdays, Sunday = 1 (e.g. `2,4,6`).
    #[arg(long)]
    pub days: Option<String>,

    #[arg(long)]
    pub repeat_date: Option<String>,

    #[arg(long)]
    pub estimate: Option<f64>,

    #[arg(long)]
    pub estimate_date: Option<String>,
}

impl FormArgs {
    /// Replays the flags as the UI events they stand for.
    #[tracing::instrument(skip_all)]
    pub fn apply(&self, form: &mut TaskForm) -> anyhow::Result<()> {
        if let Some(name) = &self.name {
            form.set_name(name.as_str());
        }
        if let Some(description) = &self.description {
            form.set_description(description.as_str());
        }
        if let Some(project) = self.project {
            form.set_project(project);
        }

        if self.one_time {
            form.set_regular(true);
        } else if let Some(mode) = self.repeat {
            form.set_regular(false);
            form.set_repeat_mode(mode);
        }

        if let Some(days) = &self.days {
            form.set_picked_days(days.as_str());
        }
        if let Some(raw) = &self.repeat_date {
            let date = parse_form_date(raw)?;
            form.pick_repeat_date(date);
        }
        if let Some(estimate) = self.estimate {
            form.set_estimate_time(Some(estimate));
        }
        if let Some(raw) = &self.estimate_date {
            let date = parse_form_date(raw)?;
            form.pick_estimate_date(date);
        }
        Ok(())
    }
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
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list.
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
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
