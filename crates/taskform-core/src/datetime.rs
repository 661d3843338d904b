use std::fs;
use std::path::PathBuf;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;

/// Text format of every date stored on a task.
pub const FORM_DATE_FORMAT: &str =
  "%d.%m.%Y";

const TIMEZONE_ENV_VAR: &str =
  "TASKFORM_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKFORM_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Source of "today" for activation and date-picker checks.
pub trait Clock: Send + Sync {
  fn today(&self) -> NaiveDate;

  /// Day-picker numbering: Sunday = 1
  /// ... Saturday = 7.
  fn today_weekday(&self) -> u32 {
    weekday_number(self.today())
  }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
  tz: Tz
}

impl SystemClock {
  pub fn new(tz: Tz) -> Self {
    Self { tz }
  }

  /// Resolves the zone from the `timezone`
  /// key, then `$TASKFORM_TIMEZONE`, then
  /// the TOML file named by
  /// `$TASKFORM_TIME_CONFIG`, else UTC.
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> Self {
    if let Some(tz) = cfg.timezone() {
      return Self::new(tz);
    }

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Self::new(tz);
    }

    if let Some(path) =
      timezone_config_path()
      && let Some(tz) =
        load_timezone_from_file(&path)
    {
      return Self::new(tz);
    }

    tracing::debug!(
      "no timezone configured; using UTC"
    );
    Self::new(chrono_tz::UTC)
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }
}

impl Clock for SystemClock {
  fn today(&self) -> NaiveDate {
    Utc::now()
      .with_timezone(&self.tz)
      .date_naive()
  }
}

/// A clock pinned to one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  date: NaiveDate
}

impl FixedClock {
  pub fn new(date: NaiveDate) -> Self {
    Self { date }
  }
}

impl Clock for FixedClock {
  fn today(&self) -> NaiveDate {
    self.date
  }
}

#[must_use]
pub fn weekday_number(
  date: NaiveDate
) -> u32 {
  date.weekday().number_from_sunday()
}

#[must_use]
pub fn format_form_date(
  date: NaiveDate
) -> String {
  date
    .format(FORM_DATE_FORMAT)
    .to_string()
}

/// Parses `d.M.yyyy`, with or without
/// zero padding.
pub fn parse_form_date(
  input: &str
) -> anyhow::Result<NaiveDate> {
  let date_re = Regex::new(
    r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile failure: \
       {e}"
    )
  })?;

  let token = input.trim();
  let caps =
    date_re.captures(token).ok_or_else(|| {
      anyhow!(
        "expected dd.mm.yyyy, got: \
         {token}"
      )
    })?;

  let day: u32 = caps[1]
    .parse()
    .context("invalid day")?;
  let month: u32 = caps[2]
    .parse()
    .context("invalid month")?;
  let year: i32 = caps[3]
    .parse()
    .context("invalid year")?;

  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .ok_or_else(|| {
    anyhow!(
      "date does not exist: {token}"
    )
  })
}

/// Picked calendar dates must lie strictly
/// after today.
#[must_use]
pub fn accept_picked_date(
  picked: NaiveDate,
  today: NaiveDate
) -> Option<String> {
  (picked > today)
    .then(|| format_form_date(picked))
}

/// True when the digit for `weekday`
/// occurs in the picker text.
#[must_use]
pub fn weekday_is_picked(
  picked_days: &str,
  weekday: u32
) -> bool {
  let Some(digit) =
    char::from_digit(weekday, 10)
  else {
    return false;
  };
  picked_days.contains(digit)
}

fn timezone_config_path()
-> Option<PathBuf> {
  let raw = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  )
  .ok()?;
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(PathBuf::from(trimmed))
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::info!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured form timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}
