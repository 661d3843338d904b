use serde::{Deserialize, Serialize};

use crate::datetime::weekday_is_picked;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    EveryDay,
    EveryWeek,
    ExactDate,
}

impl RepeatMode {
    /// Which repeat-detail input the presentation layer should show.
    pub fn detail(self) -> RepeatDetail {
        match self {
            RepeatMode::EveryDay => RepeatDetail::None,
            RepeatMode::EveryWeek => RepeatDetail::DayPicker,
            RepeatMode::ExactDate => RepeatDetail::ExactDate,
        }
    }
}

impl std::str::FromStr for RepeatMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-day" | "every_day" | "daily" => Ok(RepeatMode::EveryDay),
            "every-week" | "every_week" | "weekly" => Ok(RepeatMode::EveryWeek),
            "exact-date" | "exact_date" | "date" => Ok(RepeatMode::ExactDate),
            other => Err(anyhow::anyhow!("unknown repeat mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatDetail {
    None,
    DayPicker,
    ExactDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Task {
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub project_id: Option<u64>,

    #[serde(default)]
    pub is_regular_task: bool,

    #[serde(default)]
    pub repeat_mode: RepeatMode,

    /// Weekday numbers (Sunday = 1) as entered by the day picker.
    #[serde(default)]
    pub picked_days: String,

    /// `dd.MM.yyyy`, empty when unset.
    #[serde(default)]
    pub repeat_date: String,

    /// `dd.MM.yyyy`, empty when unset.
    #[serde(default)]
    pub estimate_date: String,

    #[serde(default)]
    pub estimate_time: Option<f64>,

    #[serde(default)]
    pub is_active: bool,
}

impl Task {
    pub fn is_every_week(&self) -> bool {
        self.is_regular_task && self.repeat_mode == RepeatMode::EveryWeek
    }

    /// Whether the task is eligible to start on `today` (rendered as
    /// `today_text`) falling on `weekday`.
    pub fn activation_for(&self, weekday: u32, today_text: &str) -> bool {
        if !self.is_regular_task {
            return false;
        }
        match self.repeat_mode {
            RepeatMode::EveryDay => true,
            RepeatMode::EveryWeek => weekday_is_picked(&self.picked_days, weekday),
            RepeatMode::ExactDate => self.repeat_date == today_text,
        }
    }
}

/// Rounds to two decimal places, half away from zero, on the value as it
/// is written out: `1.005` becomes `1.01` even though the nearest `f64`
/// sits just below it.
pub fn round_estimate(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    // Display gives the shortest text that reads back as the same f64.
    let text = value.abs().to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    if frac.len() <= 2 {
        return value;
    }
    let Ok(mut cents) = format!("{whole}{}", &frac[..2]).parse::<u128>() else {
        return (value * 100.0).round() / 100.0;
    };
    if frac.as_bytes()[2] >= b'5' {
        cents += 1;
    }
    format!("{}.{:02}", cents / 100, cents % 100)
        .parse::<f64>()
        .map_or(value, |rounded| rounded.copysign(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_defaults() {
        let task = Task::default();
        assert_eq!(task.id, None);
        assert!(!task.is_regular_task);
        assert_eq!(task.repeat_mode, RepeatMode::EveryDay);
        assert!(task.picked_days.is_empty());
        assert!(!task.is_active);
        assert_eq!(task.project_id, None);
        assert_eq!(task.estimate_time, None);
    }

    #[test]
    fn rounds_estimate_to_two_places() {
        assert_eq!(round_estimate(3.14159), 3.14);
        assert_eq!(round_estimate(2.005_000_1), 2.01);
        assert_eq!(round_estimate(1.256), 1.26);
        assert_eq!(round_estimate(4.5), 4.5);
        assert_eq!(round_estimate(0.0), 0.0);
    }

    #[test]
    fn rounds_written_halves_up() {
        // Both sit just below the half in binary.
        assert_eq!(round_estimate(1.005), 1.01);
        assert_eq!(round_estimate(2.675), 2.68);
        assert_eq!(round_estimate(-1.005), -1.01);
        assert_eq!(round_estimate(0.994), 0.99);
        assert_eq!(round_estimate(0.995), 1.0);
    }

    #[test]
    fn parses_repeat_mode_names() {
        assert_eq!("every-week".parse::<RepeatMode>().ok(), Some(RepeatMode::EveryWeek));
        assert_eq!("DAILY".parse::<RepeatMode>().ok(), Some(RepeatMode::EveryDay));
        assert!("monthly".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn activation_requires_regular_task() {
        let task = Task {
            repeat_mode: RepeatMode::EveryDay,
            ..Task::default()
        };
        assert!(!task.activation_for(3, "14.10.2026"));
    }

    #[test]
    fn serde_uses_snake_case_modes() {
        let task = Task {
            repeat_mode: RepeatMode::ExactDate,
            ..Task::default()
        };
        let raw = serde_json::to_string(&task).expect("serialize");
        assert!(raw.contains("\"exact_date\""));
        let back: Task = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(back, task);
    }
}
