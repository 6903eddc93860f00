use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_amount, parse_date_opt, parse_datetime, parse_datetime_opt};
use crate::error::{AppError, AppResult};
use crate::models::wallet::SavingsGoalRecord;

#[derive(Debug, Clone)]
pub struct GoalRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub target_amount: String,
    pub target_date: Option<String>,
    pub is_completed: bool,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl GoalRow {
    pub fn from_record(record: &SavingsGoalRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            target_amount: record.target_amount.to_string(),
            target_date: record.target_date.map(|d| d.to_string()),
            is_completed: record.is_completed,
            completed_at: record.completed_at.map(|ts| ts.to_rfc3339()),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }

    pub fn into_record(self) -> AppResult<SavingsGoalRecord> {
        Ok(SavingsGoalRecord {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            target_amount: parse_amount(&self.target_amount)?,
            target_date: parse_date_opt(self.target_date.as_deref())?,
            is_completed: self.is_completed,
            completed_at: parse_datetime_opt(self.completed_at.as_deref())?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for GoalRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            target_amount: row.get("target_amount")?,
            target_date: row.get("target_date")?,
            is_completed: row.get("is_completed")?,
            completed_at: row.get("completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

const GOAL_COLUMNS: &str = r#"
    id,
    user_id,
    name,
    description,
    target_amount,
    target_date,
    is_completed,
    completed_at,
    created_at,
    updated_at
"#;

pub struct GoalRepository;

impl GoalRepository {
    pub fn insert(conn: &Connection, row: &GoalRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO savings_goals (
                    id,
                    user_id,
                    name,
                    description,
                    target_amount,
                    target_date,
                    is_completed,
                    completed_at,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :user_id,
                    :name,
                    :description,
                    :target_amount,
                    :target_date,
                    :is_completed,
                    :completed_at,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":name": &row.name,
                ":description": &row.description,
                ":target_amount": &row.target_amount,
                ":target_date": &row.target_date,
                ":is_completed": &row.is_completed,
                ":completed_at": &row.completed_at,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn update(conn: &Connection, row: &GoalRow) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE savings_goals SET
                    name = :name,
                    description = :description,
                    target_amount = :target_amount,
                    target_date = :target_date,
                    is_completed = :is_completed,
                    completed_at = :completed_at,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": &row.id,
                ":name": &row.name,
                ":description": &row.description,
                ":target_amount": &row.target_amount,
                ":target_date": &row.target_date,
                ":is_completed": &row.is_completed,
                ":completed_at": &row.completed_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<GoalRow>> {
        let query = format!("SELECT {GOAL_COLUMNS} FROM savings_goals WHERE id = :id");
        let mut stmt = conn.prepare(&query)?;

        let row = stmt
            .query_row(named_params! {":id": id}, |row| GoalRow::try_from(row))
            .optional()?;

        Ok(row)
    }

    pub fn list_for_user(conn: &Connection, user_id: &str) -> AppResult<Vec<GoalRow>> {
        let query = format!(
            "SELECT {GOAL_COLUMNS} FROM savings_goals WHERE user_id = :user_id ORDER BY target_date ASC, created_at ASC"
        );
        let mut stmt = conn.prepare(&query)?;

        let rows = stmt
            .query_map(named_params! {":user_id": user_id}, |row| {
                GoalRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Stamps the one-way completion latch. Never called in the other
    /// direction; `is_completed` does not revert.
    pub fn mark_completed(
        conn: &Connection,
        id: &str,
        completed_at: &str,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE savings_goals SET
                    is_completed = 1,
                    completed_at = :completed_at,
                    updated_at = :updated_at
                WHERE id = :id AND is_completed = 0
            "#,
            named_params! {
                ":id": id,
                ":completed_at": completed_at,
                ":updated_at": updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }
}
