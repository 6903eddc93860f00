use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Custom => "custom",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Frequency {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "custom" => Ok(Frequency::Custom),
            other => Err(format!("unsupported frequency: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub frequency: Frequency,
    /// Weekday indices 0 (Monday) through 6 (Sunday); weekly habits only.
    pub weekly_days: Vec<u32>,
    /// Day-of-month values 1 through 31; monthly habits only.
    pub monthly_days: Vec<u32>,
    pub target_days: i64,
    pub is_active: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HabitRecord {
    /// Whether the habit's schedule requires action on `date`.
    ///
    /// Custom habits repeat every `target_days` days counted from the
    /// habit's creation date (the creation day itself is due).
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekly => self
                .weekly_days
                .contains(&date.weekday().num_days_from_monday()),
            Frequency::Monthly => self.monthly_days.contains(&date.day()),
            Frequency::Custom => {
                let anchor = self.created_at.date_naive();
                if date < anchor {
                    return false;
                }
                let cadence = self.target_days.max(1);
                (date - anchor).num_days() % cadence == 0
            }
        }
    }

    /// Most recent due day on or before `date`, if any. Daily, weekly and
    /// monthly schedules recur indefinitely into the past; custom cadences
    /// have no due days before the creation anchor.
    pub fn last_due_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        // A weekly/monthly row with an empty schedule set has no due days
        // at all; without this guard the scan would walk to NaiveDate::MIN.
        let has_due_days = match self.frequency {
            Frequency::Weekly => !self.weekly_days.is_empty(),
            Frequency::Monthly => !self.monthly_days.is_empty(),
            Frequency::Daily | Frequency::Custom => true,
        };
        if !has_due_days {
            return None;
        }

        let mut cursor = date;
        loop {
            if self.is_due_on(cursor) {
                return Some(cursor);
            }
            if self.frequency == Frequency::Custom && cursor <= self.created_at.date_naive() {
                return None;
            }
            cursor = cursor.pred_opt()?;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitCompletionRecord {
    pub id: String,
    pub habit_id: String,
    pub completion_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitCreateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub frequency: Frequency,
    #[serde(default)]
    pub weekly_days: Option<Vec<u32>>,
    #[serde(default)]
    pub monthly_days: Option<Vec<u32>>,
    #[serde(default)]
    pub target_days: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitUpdateInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub weekly_days: Option<Vec<u32>>,
    #[serde(default)]
    pub monthly_days: Option<Vec<u32>>,
    #[serde(default)]
    pub target_days: Option<i64>,
}

/// Listing decoration for the habits overview screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitWithStatus {
    #[serde(flatten)]
    pub habit: HabitRecord,
    pub is_due_today: bool,
    pub is_completed_today: bool,
}

/// Result of a completion toggle, echoed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub completed: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub xp_points: i64,
    pub level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitDetail {
    #[serde(flatten)]
    pub habit: HabitRecord,
    pub completions: Vec<HabitCompletionRecord>,
    pub completion_rate: f64,
    pub calendar: Vec<CalendarDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCompletionCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitStats {
    pub active_habits: i64,
    pub completed_today: i64,
    pub completion_rate: f64,
    pub longest_streak: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_consistent_habit: Option<String>,
    pub completion_data: Vec<DailyCompletionCount>,
}
