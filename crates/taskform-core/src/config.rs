//! The `~/.taskformrc` settings file.
//!
//! Lines are `key = value`, `# comments` or
//! `include <path>`. Every key the form
//! understands is checked when it is read, so
//! a typo in a value fails at startup with the
//! file and line rather than later in a
//! command.

use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::projects::FetchFailurePolicy;

pub const KEY_DATA_LOCATION: &str =
  "data.location";
pub const KEY_FETCH_FAILURE: &str =
  "projects.fetch_failure";
pub const KEY_COLOR: &str = "color";
pub const KEY_TIMEZONE: &str =
  "timezone";

const RC_ENV_VAR: &str = "TASKFORMRC";

#[derive(Debug, Clone)]
pub struct Config {
  values: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let values = [
      (KEY_DATA_LOCATION, "~/.taskform"),
      (KEY_FETCH_FAILURE, "silent"),
      (KEY_COLOR, "on")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();
    Self {
      values,
      loaded_files: vec![]
    }
  }
}

/// One meaningful rc line.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting { key: &'a str, value: &'a str }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading taskformrc");
        let mut chain = Vec::new();
        cfg.read_rc(&path, &mut chain)?;
      }
      | None => {
        warn!(
          "no taskformrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Applies `rc.key=value` pairs from the
  /// command line, validating each like a
  /// file entry.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (raw_key, value) in overrides {
      let key = raw_key
        .strip_prefix("rc.")
        .unwrap_or(&raw_key);
      check_setting(key, &value)
        .with_context(|| {
          format!(
            "invalid override rc.{key}"
          )
        })?;
      debug!(key, value = %value, "applying override");
      self
        .values
        .insert(key.to_string(), value);
    }
    Ok(())
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.values.get(key).cloned()
  }

  pub fn color(&self) -> bool {
    self
      .values
      .get(KEY_COLOR)
      .and_then(|raw| parse_switch(raw))
      .unwrap_or(true)
  }

  pub fn fetch_failure_policy(
    &self
  ) -> FetchFailurePolicy {
    self
      .values
      .get(KEY_FETCH_FAILURE)
      .and_then(|raw| raw.parse().ok())
      .unwrap_or_default()
  }

  /// The configured IANA zone, if any.
  pub fn timezone(&self) -> Option<Tz> {
    self
      .values
      .get(KEY_TIMEZONE)
      .and_then(|raw| {
        raw.trim().parse().ok()
      })
  }

  /// Reads one file. `chain` holds the
  /// canonical paths of the files currently
  /// being read, outermost first.
  fn read_rc(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let identity = fs::canonicalize(&path)
      .unwrap_or_else(|_| path.clone());
    if chain.contains(&identity) {
      let cycle = chain
        .iter()
        .chain(std::iter::once(&identity))
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
      bail!("include cycle: {cycle}");
    }

    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());
    chain.push(identity);

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };
      let Some(line) =
        parse_rc_line(raw_line)
          .with_context(at)?
      else {
        continue;
      };

      match line {
        | RcLine::Include(target) => {
          let target =
            resolve_include_path(
              &base_dir, target
            )
            .with_context(at)?;
          if target.exists() {
            debug!(include = %target.display(), line = idx + 1, "following include");
            self.read_rc(&target, chain)?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
        | RcLine::Setting {
          key,
          value
        } => {
          check_setting(key, value)
            .with_context(at)?;
          trace!(key, value, "loaded config key");
          self.values.insert(
            key.to_string(),
            value.to_string()
          );
        }
      }
    }

    chain.pop();
    Ok(())
  }
}

/// `None` for blank and comment-only lines.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    return Ok(Some(RcLine::Include(
      target.trim()
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected `key = value`, got \
         {raw:?}"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    bail!("missing key before `=`");
  }
  Ok(Some(RcLine::Setting {
    key,
    value: value.trim()
  }))
}

/// Rejects bad values for known keys; unknown
/// keys are kept but logged.
fn check_setting(
  key: &str,
  value: &str
) -> anyhow::Result<()> {
  match key {
    | KEY_DATA_LOCATION => {
      if value.trim().is_empty() {
        bail!("{key} cannot be empty");
      }
    }
    | KEY_FETCH_FAILURE => {
      value
        .parse::<FetchFailurePolicy>()?;
    }
    | KEY_COLOR => {
      if parse_switch(value).is_none() {
        bail!(
          "invalid color setting: \
           {value}"
        );
      }
    }
    | KEY_TIMEZONE => {
      value.trim().parse::<Tz>().map_err(
        |err| {
          anyhow!(
            "invalid timezone \
             {value:?}: {err}"
          )
        }
      )?;
    }
    | other => {
      warn!(key = other, "unknown config key; ignoring");
    }
  }
  Ok(())
}

fn parse_switch(
  raw: &str
) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}

/// `--data` wins over `data.location`; the
/// directory is created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get(KEY_DATA_LOCATION)
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(location)) => {
      expand_tilde(Path::new(&location))
    }
    | (None, None) => dirs::home_dir()
      .map(|home| home.join(".taskform"))
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory"
        )
      })?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// Explicit path, then `$TASKFORMRC`
/// (`/dev/null` disables it), then
/// `~/.taskformrc` when present.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let candidate = dirs::home_dir()?
    .join(".taskformrc");
  candidate.exists().then_some(candidate)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    bail!("include path cannot be empty");
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
