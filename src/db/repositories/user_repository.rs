use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::parse_datetime;
use crate::error::{AppError, AppResult};
use crate::models::user::UserRecord;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub xp_points: i64,
    pub level: i64,
    pub created_at: String,
}

impl UserRow {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record.username.clone(),
            xp_points: record.xp_points,
            level: record.level,
            created_at: record.created_at.to_rfc3339(),
        }
    }

    pub fn into_record(self) -> AppResult<UserRecord> {
        Ok(UserRecord {
            id: self.id,
            username: self.username,
            xp_points: self.xp_points,
            level: self.level,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for UserRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            xp_points: row.get("xp_points")?,
            level: row.get("level")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct UserRepository;

impl UserRepository {
    pub fn insert(conn: &Connection, row: &UserRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO users (id, username, xp_points, level, created_at)
                VALUES (:id, :username, :xp_points, :level, :created_at)
            "#,
            named_params! {
                ":id": &row.id,
                ":username": &row.username,
                ":xp_points": &row.xp_points,
                ":level": &row.level,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<UserRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, username, xp_points, level, created_at FROM users WHERE id = :id",
        )?;

        let row = stmt
            .query_row(named_params! {":id": id}, |row| UserRow::try_from(row))
            .optional()?;

        Ok(row)
    }

    pub fn update_progress(
        conn: &Connection,
        id: &str,
        xp_points: i64,
        level: i64,
    ) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE users SET xp_points = :xp_points, level = :level WHERE id = :id",
            named_params! {
                ":id": id,
                ":xp_points": xp_points,
                ":level": level,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }
}
