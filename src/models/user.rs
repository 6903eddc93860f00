use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// XP granted for every habit completion.
pub const XP_PER_HABIT_COMPLETION: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub xp_points: i64,
    pub level: i64,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// XP required to reach the next level (100 XP per level).
    pub fn xp_needed(&self) -> i64 {
        self.level * 100
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreateInput {
    pub username: String,
}
