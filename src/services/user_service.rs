use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::user_repository::{UserRepository, UserRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::user::{UserCreateInput, UserRecord};

/// Account progression: XP grants and the 100-XP-per-level curve.
#[derive(Clone)]
pub struct UserService {
    db: DbPool,
}

impl UserService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_user(&self, input: UserCreateInput) -> AppResult<UserRecord> {
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::validation("用户名不能为空"));
        }
        if username.chars().count() > 64 {
            return Err(AppError::validation("用户名长度需在 64 字以内"));
        }

        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            username,
            xp_points: 0,
            level: 1,
            created_at: Utc::now(),
        };

        let row = UserRow::from_record(&record);
        self.db
            .with_connection(|conn| UserRepository::insert(conn, &row))?;
        info!(user_id = %record.id, "user created");
        Ok(record)
    }

    pub fn get_user(&self, id: &str) -> AppResult<UserRecord> {
        let row = self
            .db
            .with_connection(|conn| UserRepository::find_by_id(conn, id))?
            .ok_or_else(AppError::not_found)?;
        let record = row.into_record()?;
        debug!(user_id = %record.id, "user fetched");
        Ok(record)
    }

    pub fn grant_xp(&self, user_id: &str, points: i64) -> AppResult<UserRecord> {
        self.db
            .with_transaction(|tx| Self::grant_xp_tx(tx, user_id, points))
    }

    /// Transaction-scoped XP grant so callers can combine it with their own
    /// writes into one atomic unit.
    pub fn grant_xp_tx(conn: &Connection, user_id: &str, points: i64) -> AppResult<UserRecord> {
        if points <= 0 {
            return Err(AppError::validation("经验值需大于 0"));
        }

        let mut record = UserRepository::find_by_id(conn, user_id)?
            .ok_or_else(AppError::not_found)?
            .into_record()?;

        record.xp_points += points;
        while record.xp_points >= record.xp_needed() {
            record.level += 1;
            info!(user_id = %record.id, level = record.level, "user leveled up");
        }

        UserRepository::update_progress(conn, user_id, record.xp_points, record.level)?;
        debug!(user_id = %record.id, xp = record.xp_points, "xp granted");
        Ok(record)
    }
}
