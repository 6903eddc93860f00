use std::collections::HashSet;

use chrono::{Duration, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::habit_repository::{CompletionRow, HabitRepository, HabitRow};
use crate::db::repositories::user_repository::UserRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::habit::{
    CalendarDay, DailyCompletionCount, HabitCreateInput, HabitDetail, HabitRecord, HabitStats,
    HabitUpdateInput, HabitWithStatus, ToggleOutcome,
};
use crate::models::user::XP_PER_HABIT_COMPLETION;
use crate::services::user_service::UserService;

const DETAIL_WINDOW_DAYS: i64 = 30;
const STATS_WINDOW_DAYS: i64 = 7;

#[derive(Clone)]
pub struct HabitService {
    db: DbPool,
}

impl HabitService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn create_habit(&self, user_id: &str, input: HabitCreateInput) -> AppResult<HabitRecord> {
        let now = Utc::now();
        let mut record = HabitRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: normalize_name(&input.name)?,
            description: normalize_description(input.description)?,
            frequency: input.frequency,
            weekly_days: input.weekly_days.unwrap_or_default(),
            monthly_days: input.monthly_days.unwrap_or_default(),
            target_days: input.target_days.unwrap_or(1),
            is_active: true,
            current_streak: 0,
            longest_streak: 0,
            last_completed: None,
            created_at: now,
            updated_at: now,
        };

        normalize_schedule(&mut record)?;

        let row = HabitRow::from_record(&record)?;
        self.db
            .with_connection(|conn| HabitRepository::insert(conn, &row))?;
        info!(habit_id = %record.id, frequency = %record.frequency, "habit created");
        Ok(record)
    }

    pub fn update_habit(
        &self,
        user_id: &str,
        habit_id: &str,
        update: HabitUpdateInput,
    ) -> AppResult<HabitRecord> {
        let mut record = self.get_habit(user_id, habit_id)?;

        if let Some(name) = update.name {
            record.name = normalize_name(&name)?;
        }
        if let Some(description) = update.description {
            record.description = normalize_description(Some(description))?;
        }
        if let Some(frequency) = update.frequency {
            record.frequency = frequency;
        }
        if let Some(weekly_days) = update.weekly_days {
            record.weekly_days = weekly_days;
        }
        if let Some(monthly_days) = update.monthly_days {
            record.monthly_days = monthly_days;
        }
        if let Some(target_days) = update.target_days {
            record.target_days = target_days;
        }
        record.updated_at = Utc::now();

        normalize_schedule(&mut record)?;

        let row = HabitRow::from_record(&record)?;
        self.db
            .with_connection(|conn| HabitRepository::update(conn, &row))?;
        info!(habit_id = %record.id, "habit updated");
        Ok(record)
    }

    /// Soft delete: the habit drops out of listings but its completion
    /// history stays intact.
    pub fn delete_habit(&self, user_id: &str, habit_id: &str) -> AppResult<()> {
        let record = self.get_habit(user_id, habit_id)?;
        let now = Utc::now().to_rfc3339();
        self.db
            .with_connection(|conn| HabitRepository::set_active(conn, &record.id, false, &now))?;
        info!(habit_id = %record.id, "habit deactivated");
        Ok(())
    }

    pub fn get_habit(&self, user_id: &str, habit_id: &str) -> AppResult<HabitRecord> {
        let row = self
            .db
            .with_connection(|conn| HabitRepository::find_by_id(conn, habit_id))?
            .ok_or_else(AppError::not_found)?;
        let record = row.into_record()?;
        if record.user_id != user_id {
            return Err(AppError::forbidden());
        }
        debug!(habit_id = %record.id, "habit fetched");
        Ok(record)
    }

    /// Active habits decorated with today's due/completed status.
    pub fn list_habits(&self, user_id: &str, today: NaiveDate) -> AppResult<Vec<HabitWithStatus>> {
        let (rows, completed_ids) = self.db.with_connection(|conn| {
            let rows = HabitRepository::list_for_user(conn, user_id, true)?;
            let completed = HabitRepository::completed_habit_ids_on(conn, user_id, today)?;
            Ok((rows, completed))
        })?;

        let completed_ids: HashSet<String> = completed_ids.into_iter().collect();
        let habits = rows
            .into_iter()
            .map(|row| {
                let habit = row.into_record()?;
                let is_due_today = habit.is_due_on(today);
                let is_completed_today = completed_ids.contains(&habit.id);
                Ok(HabitWithStatus {
                    habit,
                    is_due_today,
                    is_completed_today,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        debug!(count = habits.len(), "habits listed");
        Ok(habits)
    }

    /// Completion history view: last 30 days of completions, completion
    /// rate over that window and a per-day calendar map.
    pub fn habit_detail(
        &self,
        user_id: &str,
        habit_id: &str,
        today: NaiveDate,
    ) -> AppResult<HabitDetail> {
        let habit = self.get_habit(user_id, habit_id)?;
        let window_start = today - Duration::days(DETAIL_WINDOW_DAYS);

        let rows = self.db.with_connection(|conn| {
            HabitRepository::list_completions(conn, &habit.id, Some(window_start))
        })?;
        let completions = rows
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;

        let completed_dates: HashSet<NaiveDate> =
            completions.iter().map(|c| c.completion_date).collect();

        let total_days = (today - window_start).num_days() + 1;
        let completion_rate = if total_days > 0 {
            completions.len() as f64 / total_days as f64 * 100.0
        } else {
            0.0
        };

        let calendar = (0..total_days)
            .map(|offset| {
                let date = today - Duration::days(offset);
                CalendarDay {
                    date,
                    completed: completed_dates.contains(&date),
                }
            })
            .collect();

        Ok(HabitDetail {
            habit,
            completions,
            completion_rate,
            calendar,
        })
    }

    /// Flip the completion state for one day. A single transaction covers
    /// the completion row, the streak counters and the XP grant, so readers
    /// never observe a partial update.
    pub fn toggle_completion(
        &self,
        user_id: &str,
        habit_id: &str,
        date: NaiveDate,
    ) -> AppResult<ToggleOutcome> {
        let today = Utc::now().date_naive();
        if date > today {
            return Err(AppError::validation("不能为未来日期打卡"));
        }

        self.db.with_transaction(|tx| {
            let habit = HabitRepository::find_by_id(tx, habit_id)?
                .ok_or_else(AppError::not_found)?
                .into_record()?;
            if habit.user_id != user_id {
                return Err(AppError::forbidden());
            }

            let now = Utc::now();
            let existing = HabitRepository::find_completion(tx, &habit.id, date)?;

            let outcome = match existing {
                Some(completion) => {
                    HabitRepository::delete_completion(tx, &completion.id)?;
                    let current_streak = (habit.current_streak - 1).max(0);
                    HabitRepository::update_streak(
                        tx,
                        &habit.id,
                        current_streak,
                        habit.longest_streak,
                        None,
                        &now.to_rfc3339(),
                    )?;

                    let user = UserRepository::find_by_id(tx, user_id)?
                        .ok_or_else(AppError::not_found)?
                        .into_record()?;

                    info!(habit_id = %habit.id, %date, "habit completion removed");
                    ToggleOutcome {
                        completed: false,
                        current_streak,
                        longest_streak: habit.longest_streak,
                        xp_points: user.xp_points,
                        level: user.level,
                    }
                }
                None => {
                    let completion = CompletionRow {
                        id: Uuid::new_v4().to_string(),
                        habit_id: habit.id.clone(),
                        completion_date: date.to_string(),
                        created_at: now.to_rfc3339(),
                    };
                    HabitRepository::insert_completion(tx, &completion)?;

                    let current_streak = habit.current_streak + 1;
                    let longest_streak = habit.longest_streak.max(current_streak);
                    HabitRepository::update_streak(
                        tx,
                        &habit.id,
                        current_streak,
                        longest_streak,
                        Some(&now.to_rfc3339()),
                        &now.to_rfc3339(),
                    )?;

                    let user = UserService::grant_xp_tx(tx, user_id, XP_PER_HABIT_COMPLETION)?;

                    info!(habit_id = %habit.id, %date, streak = current_streak, "habit completed");
                    ToggleOutcome {
                        completed: true,
                        current_streak,
                        longest_streak,
                        xp_points: user.xp_points,
                        level: user.level,
                    }
                }
            };

            Ok(outcome)
        })
    }

    /// Recompute the streak from completion history and persist it. This is
    /// the recovery path; its result must match the incrementally
    /// maintained counter.
    pub fn recompute_streak(
        &self,
        user_id: &str,
        habit_id: &str,
        today: NaiveDate,
    ) -> AppResult<i64> {
        let habit = self.get_habit(user_id, habit_id)?;

        let rows = self
            .db
            .with_connection(|conn| HabitRepository::list_completions(conn, &habit.id, None))?;
        let completed: HashSet<NaiveDate> = rows
            .into_iter()
            .map(|row| row.into_record().map(|c| c.completion_date))
            .collect::<AppResult<_>>()?;

        let current_streak = streak_from_history(&habit, &completed, today);
        let longest_streak = habit.longest_streak.max(current_streak);
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            HabitRepository::update_streak(
                conn,
                &habit.id,
                current_streak,
                longest_streak,
                None,
                &now,
            )
        })?;

        debug!(habit_id = %habit.id, streak = current_streak, "streak recomputed");
        Ok(current_streak)
    }

    /// Dashboard numbers: active habit count, today's completions and the
    /// last seven days of completion activity.
    pub fn stats(&self, user_id: &str, today: NaiveDate) -> AppResult<HabitStats> {
        let window_start = today - Duration::days(STATS_WINDOW_DAYS - 1);

        let (active_habits, completed_ids, counts, longest_streak, most_consistent) =
            self.db.with_connection(|conn| {
                let active = HabitRepository::count_active(conn, user_id)?;
                let completed = HabitRepository::completed_habit_ids_on(conn, user_id, today)?;
                let counts =
                    HabitRepository::completion_counts_since(conn, user_id, window_start)?;
                let longest = HabitRepository::max_longest_streak(conn, user_id)?;
                let consistent = HabitRepository::most_consistent(conn, user_id)?;
                Ok((active, completed, counts, longest, consistent))
            })?;

        let completed_today = completed_ids.len() as i64;
        let completion_rate = if active_habits > 0 {
            completed_today as f64 / active_habits as f64 * 100.0
        } else {
            0.0
        };

        let completion_data = (0..STATS_WINDOW_DAYS)
            .map(|offset| {
                let date = window_start + Duration::days(offset);
                let count = counts
                    .iter()
                    .find(|(day, _)| *day == date.to_string())
                    .map(|(_, count)| *count)
                    .unwrap_or(0);
                DailyCompletionCount { date, count }
            })
            .collect();

        let most_consistent_habit = most_consistent
            .map(|row| row.into_record().map(|habit| habit.name))
            .transpose()?;

        Ok(HabitStats {
            active_habits,
            completed_today,
            completion_rate,
            longest_streak,
            most_consistent_habit,
            completion_data,
        })
    }
}

/// Count consecutive completed due days scanning backward from `today`.
/// Non-due days never break the run. Today itself gets a grace period: a
/// due-but-not-yet-completed today starts the scan at the previous due day
/// instead of ending the streak.
pub fn streak_from_history(
    habit: &HabitRecord,
    completed: &HashSet<NaiveDate>,
    today: NaiveDate,
) -> i64 {
    let Some(mut cursor) = habit.last_due_on_or_before(today) else {
        return 0;
    };

    if !completed.contains(&cursor) {
        if cursor != today {
            return 0;
        }
        match previous_due_day(habit, cursor) {
            Some(previous) => cursor = previous,
            None => return 0,
        }
    }

    let mut streak = 0;
    loop {
        if !completed.contains(&cursor) {
            break;
        }
        streak += 1;
        match previous_due_day(habit, cursor) {
            Some(previous) => cursor = previous,
            None => break,
        }
    }

    streak
}

fn previous_due_day(habit: &HabitRecord, from: NaiveDate) -> Option<NaiveDate> {
    habit.last_due_on_or_before(from.pred_opt()?)
}

fn normalize_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("习惯名称不能为空"));
    }
    if trimmed.chars().count() > 100 {
        return Err(AppError::validation("习惯名称长度需在 100 字以内"));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: Option<String>) -> AppResult<Option<String>> {
    match description {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            if trimmed.chars().count() > 500 {
                return Err(AppError::validation("描述长度需在 500 字以内"));
            }
            Ok(Some(trimmed.to_string()))
        }
        None => Ok(None),
    }
}

fn normalize_schedule(record: &mut HabitRecord) -> AppResult<()> {
    use crate::models::habit::Frequency;

    if record.target_days < 1 || record.target_days > 31 {
        return Err(AppError::validation("目标天数需在 1 到 31 之间"));
    }

    match record.frequency {
        Frequency::Weekly => {
            if record.weekly_days.is_empty() {
                return Err(AppError::validation("每周习惯至少需要选择一天"));
            }
            if record.weekly_days.iter().any(|day| *day > 6) {
                return Err(AppError::validation("星期取值需在 0 到 6 之间"));
            }
            record.weekly_days.sort_unstable();
            record.weekly_days.dedup();
            record.monthly_days.clear();
        }
        Frequency::Monthly => {
            if record.monthly_days.is_empty() {
                return Err(AppError::validation("每月习惯至少需要选择一天"));
            }
            if record.monthly_days.iter().any(|day| *day < 1 || *day > 31) {
                return Err(AppError::validation("日期取值需在 1 到 31 之间"));
            }
            record.monthly_days.sort_unstable();
            record.monthly_days.dedup();
            record.weekly_days.clear();
        }
        Frequency::Daily | Frequency::Custom => {
            record.weekly_days.clear();
            record.monthly_days.clear();
        }
    }

    Ok(())
}
