use std::convert::TryFrom;

use chrono::NaiveDate;
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_date, parse_datetime, parse_datetime_opt};
use crate::error::{AppError, AppResult};
use crate::models::habit::{Frequency, HabitCompletionRecord, HabitRecord};

#[derive(Debug, Clone)]
pub struct HabitRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub frequency: String,
    pub weekly_days: String,
    pub monthly_days: String,
    pub target_days: i64,
    pub is_active: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_completed: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl HabitRow {
    pub fn from_record(record: &HabitRecord) -> AppResult<Self> {
        Ok(Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            frequency: record.frequency.as_str().to_string(),
            weekly_days: serde_json::to_string(&record.weekly_days)?,
            monthly_days: serde_json::to_string(&record.monthly_days)?,
            target_days: record.target_days,
            is_active: record.is_active,
            current_streak: record.current_streak,
            longest_streak: record.longest_streak,
            last_completed: record.last_completed.map(|ts| ts.to_rfc3339()),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        })
    }

    pub fn into_record(self) -> AppResult<HabitRecord> {
        let frequency =
            Frequency::try_from(self.frequency.as_str()).map_err(AppError::validation)?;

        Ok(HabitRecord {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            frequency,
            weekly_days: serde_json::from_str(&self.weekly_days)?,
            monthly_days: serde_json::from_str(&self.monthly_days)?,
            target_days: self.target_days,
            is_active: self.is_active,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_completed: parse_datetime_opt(self.last_completed.as_deref())?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for HabitRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            frequency: row.get("frequency")?,
            weekly_days: row.get("weekly_days")?,
            monthly_days: row.get("monthly_days")?,
            target_days: row.get("target_days")?,
            is_active: row.get("is_active")?,
            current_streak: row.get("current_streak")?,
            longest_streak: row.get("longest_streak")?,
            last_completed: row.get("last_completed")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRow {
    pub id: String,
    pub habit_id: String,
    pub completion_date: String,
    pub created_at: String,
}

impl CompletionRow {
    pub fn into_record(self) -> AppResult<HabitCompletionRecord> {
        Ok(HabitCompletionRecord {
            id: self.id,
            habit_id: self.habit_id,
            completion_date: parse_date(&self.completion_date)?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for CompletionRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            habit_id: row.get("habit_id")?,
            completion_date: row.get("completion_date")?,
            created_at: row.get("created_at")?,
        })
    }
}

const HABIT_COLUMNS: &str = r#"
    id,
    user_id,
    name,
    description,
    frequency,
    weekly_days,
    monthly_days,
    target_days,
    is_active,
    current_streak,
    longest_streak,
    last_completed,
    created_at,
    updated_at
"#;

pub struct HabitRepository;

impl HabitRepository {
    pub fn insert(conn: &Connection, row: &HabitRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO habits (
                    id,
                    user_id,
                    name,
                    description,
                    frequency,
                    weekly_days,
                    monthly_days,
                    target_days,
                    is_active,
                    current_streak,
                    longest_streak,
                    last_completed,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :user_id,
                    :name,
                    :description,
                    :frequency,
                    :weekly_days,
                    :monthly_days,
                    :target_days,
                    :is_active,
                    :current_streak,
                    :longest_streak,
                    :last_completed,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":name": &row.name,
                ":description": &row.description,
                ":frequency": &row.frequency,
                ":weekly_days": &row.weekly_days,
                ":monthly_days": &row.monthly_days,
                ":target_days": &row.target_days,
                ":is_active": &row.is_active,
                ":current_streak": &row.current_streak,
                ":longest_streak": &row.longest_streak,
                ":last_completed": &row.last_completed,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn update(conn: &Connection, row: &HabitRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE habits SET
                    name = :name,
                    description = :description,
                    frequency = :frequency,
                    weekly_days = :weekly_days,
                    monthly_days = :monthly_days,
                    target_days = :target_days,
                    is_active = :is_active,
                    current_streak = :current_streak,
                    longest_streak = :longest_streak,
                    last_completed = :last_completed,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":description": &row.description,
                ":frequency": &row.frequency,
                ":weekly_days": &row.weekly_days,
                ":monthly_days": &row.monthly_days,
                ":target_days": &row.target_days,
                ":is_active": &row.is_active,
                ":current_streak": &row.current_streak,
                ":longest_streak": &row.longest_streak,
                ":last_completed": &row.last_completed,
                ":updated_at": &row.updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<HabitRow>> {
        let query = format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = :id");
        let mut stmt = conn.prepare(&query)?;

        let row = stmt
            .query_row(named_params! {":id": id}, |row| HabitRow::try_from(row))
            .optional()?;

        Ok(row)
    }

    pub fn list_for_user(
        conn: &Connection,
        user_id: &str,
        active_only: bool,
    ) -> AppResult<Vec<HabitRow>> {
        let query = if active_only {
            format!(
                "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = :user_id AND is_active = 1 ORDER BY created_at DESC"
            )
        } else {
            format!(
                "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = :user_id ORDER BY created_at DESC"
            )
        };
        let mut stmt = conn.prepare(&query)?;

        let rows = stmt
            .query_map(named_params! {":user_id": user_id}, |row| {
                HabitRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn set_active(
        conn: &Connection,
        id: &str,
        is_active: bool,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE habits SET is_active = :is_active, updated_at = :updated_at WHERE id = :id",
            named_params! {
                ":id": id,
                ":is_active": is_active,
                ":updated_at": updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn update_streak(
        conn: &Connection,
        id: &str,
        current_streak: i64,
        longest_streak: i64,
        last_completed: Option<&str>,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE habits SET
                    current_streak = :current_streak,
                    longest_streak = :longest_streak,
                    last_completed = COALESCE(:last_completed, last_completed),
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": id,
                ":current_streak": current_streak,
                ":longest_streak": longest_streak,
                ":last_completed": last_completed,
                ":updated_at": updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn insert_completion(conn: &Connection, row: &CompletionRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO habit_completions (id, habit_id, completion_date, created_at)
                VALUES (:id, :habit_id, :completion_date, :created_at)
            "#,
            named_params! {
                ":id": &row.id,
                ":habit_id": &row.habit_id,
                ":completion_date": &row.completion_date,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find_completion(
        conn: &Connection,
        habit_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<CompletionRow>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT id, habit_id, completion_date, created_at
                FROM habit_completions
                WHERE habit_id = :habit_id AND completion_date = :completion_date
            "#,
        )?;

        let row = stmt
            .query_row(
                named_params! {
                    ":habit_id": habit_id,
                    ":completion_date": date.to_string(),
                },
                |row| CompletionRow::try_from(row),
            )
            .optional()?;

        Ok(row)
    }

    pub fn delete_completion(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute(
            "DELETE FROM habit_completions WHERE id = :id",
            named_params! {":id": id},
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn list_completions(
        conn: &Connection,
        habit_id: &str,
        since: Option<NaiveDate>,
    ) -> AppResult<Vec<CompletionRow>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT id, habit_id, completion_date, created_at
                FROM habit_completions
                WHERE habit_id = :habit_id
                  AND (:since IS NULL OR completion_date >= :since)
                ORDER BY completion_date DESC
            "#,
        )?;

        let rows = stmt
            .query_map(
                named_params! {
                    ":habit_id": habit_id,
                    ":since": since.map(|d| d.to_string()),
                },
                |row| CompletionRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Ids of the user's active habits completed on `date`. Deactivated
    /// habits keep their history but drop out of today's counts.
    pub fn completed_habit_ids_on(
        conn: &Connection,
        user_id: &str,
        date: NaiveDate,
    ) -> AppResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT hc.habit_id
                FROM habit_completions hc
                JOIN habits h ON h.id = hc.habit_id
                WHERE h.user_id = :user_id
                  AND h.is_active = 1
                  AND hc.completion_date = :completion_date
            "#,
        )?;

        let ids = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":completion_date": date.to_string(),
                },
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    /// Per-day completion counts across all of the user's habits.
    pub fn completion_counts_since(
        conn: &Connection,
        user_id: &str,
        since: NaiveDate,
    ) -> AppResult<Vec<(String, i64)>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT hc.completion_date, COUNT(hc.id)
                FROM habit_completions hc
                JOIN habits h ON h.id = hc.habit_id
                WHERE h.user_id = :user_id AND hc.completion_date >= :since
                GROUP BY hc.completion_date
            "#,
        )?;

        let counts = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":since": since.to_string(),
                },
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    pub fn count_active(conn: &Connection, user_id: &str) -> AppResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM habits WHERE user_id = :user_id AND is_active = 1",
            named_params! {":user_id": user_id},
            |row| row.get(0),
        )?;

        Ok(count)
    }

    pub fn max_longest_streak(conn: &Connection, user_id: &str) -> AppResult<i64> {
        let max = conn.query_row(
            "SELECT COALESCE(MAX(longest_streak), 0) FROM habits WHERE user_id = :user_id",
            named_params! {":user_id": user_id},
            |row| row.get(0),
        )?;

        Ok(max)
    }

    pub fn most_consistent(conn: &Connection, user_id: &str) -> AppResult<Option<HabitRow>> {
        let query = format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = :user_id ORDER BY longest_streak DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&query)?;

        let row = stmt
            .query_row(named_params! {":user_id": user_id}, |row| {
                HabitRow::try_from(row)
            })
            .optional()?;

        Ok(row)
    }
}
