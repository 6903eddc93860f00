use chrono::{Datelike, Duration, NaiveDate, Utc};
use tempfile::TempDir;

use pocketpal::db::repositories::habit_repository::{CompletionRow, HabitRepository};
use pocketpal::db::DbPool;
use pocketpal::error::AppError;
use pocketpal::models::habit::{Frequency, HabitCreateInput, HabitUpdateInput};
use pocketpal::models::user::UserCreateInput;
use pocketpal::services::Services;

fn setup() -> (TempDir, Services) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db = DbPool::new(dir.path().join("app.db")).expect("open database");
    (dir, Services::new(db))
}

fn create_user(services: &Services, username: &str) -> String {
    services
        .users
        .create_user(UserCreateInput {
            username: username.to_string(),
        })
        .expect("create user")
        .id
}

fn daily_input(name: &str) -> HabitCreateInput {
    HabitCreateInput {
        name: name.to_string(),
        description: None,
        frequency: Frequency::Daily,
        weekly_days: None,
        monthly_days: None,
        target_days: None,
    }
}

/// The `count` most recent due weekdays on or before `today`, oldest first.
fn recent_due_days(weekly_days: &[u32], today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut cursor = today;
    let mut found = Vec::new();
    while found.len() < count {
        if weekly_days.contains(&cursor.weekday().num_days_from_monday()) {
            found.push(cursor);
        }
        cursor = cursor.pred_opt().expect("date underflow");
    }
    found.reverse();
    found
}

#[test]
fn completing_a_habit_grants_xp_and_starts_a_streak() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();

    let today = Utc::now().date_naive();
    let outcome = services
        .habits
        .toggle_completion(&user_id, &habit.id, today)
        .unwrap();

    assert!(outcome.completed);
    assert_eq!(outcome.current_streak, 1);
    assert_eq!(outcome.longest_streak, 1);
    assert_eq!(outcome.xp_points, 10);
    assert_eq!(outcome.level, 1);
}

#[test]
fn toggling_twice_removes_the_completion() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();
    let today = Utc::now().date_naive();

    services
        .habits
        .toggle_completion(&user_id, &habit.id, today)
        .unwrap();
    let outcome = services
        .habits
        .toggle_completion(&user_id, &habit.id, today)
        .unwrap();

    assert!(!outcome.completed);
    assert_eq!(outcome.current_streak, 0);

    let detail = services
        .habits
        .habit_detail(&user_id, &habit.id, today)
        .unwrap();
    assert!(detail.completions.is_empty());
}

#[test]
fn recompute_agrees_with_the_incremental_counter() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("背单词"))
        .unwrap();
    let today = Utc::now().date_naive();

    let mut incremental = 0;
    for offset in (0..3).rev() {
        let outcome = services
            .habits
            .toggle_completion(&user_id, &habit.id, today - Duration::days(offset))
            .unwrap();
        incremental = outcome.current_streak;
    }

    assert_eq!(incremental, 3);
    let recomputed = services
        .habits
        .recompute_streak(&user_id, &habit.id, today)
        .unwrap();
    assert_eq!(recomputed, incremental);
}

#[test]
fn recompute_stops_at_a_missed_day() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("背单词"))
        .unwrap();
    let today = Utc::now().date_naive();

    // Completed today and two days ago, yesterday missed.
    services
        .habits
        .toggle_completion(&user_id, &habit.id, today - Duration::days(2))
        .unwrap();
    services
        .habits
        .toggle_completion(&user_id, &habit.id, today)
        .unwrap();

    let recomputed = services
        .habits
        .recompute_streak(&user_id, &habit.id, today)
        .unwrap();
    assert_eq!(recomputed, 1);

    let record = services.habits.get_habit(&user_id, &habit.id).unwrap();
    assert_eq!(record.current_streak, 1);
    assert_eq!(record.longest_streak, 2);
}

#[test]
fn weekly_streak_skips_non_due_days() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let weekly_days = vec![0, 2, 4]; // Monday, Wednesday, Friday
    let habit = services
        .habits
        .create_habit(
            &user_id,
            HabitCreateInput {
                name: "练琴".to_string(),
                description: None,
                frequency: Frequency::Weekly,
                weekly_days: Some(weekly_days.clone()),
                monthly_days: None,
                target_days: None,
            },
        )
        .unwrap();

    let today = Utc::now().date_naive();
    for date in recent_due_days(&weekly_days, today, 3) {
        services
            .habits
            .toggle_completion(&user_id, &habit.id, date)
            .unwrap();
    }

    let recomputed = services
        .habits
        .recompute_streak(&user_id, &habit.id, today)
        .unwrap();
    assert_eq!(recomputed, 3);
}

#[test]
fn future_completions_are_rejected() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();

    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let err = services
        .habits
        .toggle_completion(&user_id, &habit.id, tomorrow)
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn other_users_habits_are_off_limits() {
    let (_dir, services) = setup();
    let owner = create_user(&services, "小明");
    let intruder = create_user(&services, "小红");
    let habit = services
        .habits
        .create_habit(&owner, daily_input("晨跑"))
        .unwrap();
    let today = Utc::now().date_naive();

    let err = services
        .habits
        .toggle_completion(&intruder, &habit.id, today)
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = services
        .habits
        .toggle_completion(&owner, "missing-habit", today)
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[test]
fn weekly_habits_require_at_least_one_day() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");

    let err = services
        .habits
        .create_habit(
            &user_id,
            HabitCreateInput {
                name: "练琴".to_string(),
                description: None,
                frequency: Frequency::Weekly,
                weekly_days: None,
                monthly_days: None,
                target_days: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn deactivated_habits_keep_their_history() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();
    let today = Utc::now().date_naive();

    services
        .habits
        .toggle_completion(&user_id, &habit.id, today)
        .unwrap();
    services.habits.delete_habit(&user_id, &habit.id).unwrap();

    let listed = services.habits.list_habits(&user_id, today).unwrap();
    assert!(listed.is_empty());

    let detail = services
        .habits
        .habit_detail(&user_id, &habit.id, today)
        .unwrap();
    assert!(!detail.habit.is_active);
    assert_eq!(detail.completions.len(), 1);
}

#[test]
fn listing_reports_due_and_completed_status() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let daily = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();

    let today = Utc::now().date_naive();
    // A weekly habit scheduled only for a weekday other than today.
    let off_day = (today.weekday().num_days_from_monday() + 1) % 7;
    services
        .habits
        .create_habit(
            &user_id,
            HabitCreateInput {
                name: "大扫除".to_string(),
                description: None,
                frequency: Frequency::Weekly,
                weekly_days: Some(vec![off_day]),
                monthly_days: None,
                target_days: None,
            },
        )
        .unwrap();

    services
        .habits
        .toggle_completion(&user_id, &daily.id, today)
        .unwrap();

    let listed = services.habits.list_habits(&user_id, today).unwrap();
    assert_eq!(listed.len(), 2);

    let daily_status = listed.iter().find(|h| h.habit.id == daily.id).unwrap();
    assert!(daily_status.is_due_today);
    assert!(daily_status.is_completed_today);

    let weekly_status = listed.iter().find(|h| h.habit.id != daily.id).unwrap();
    assert!(!weekly_status.is_due_today);
    assert!(!weekly_status.is_completed_today);
}

#[test]
fn ten_completions_reach_level_two() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("背单词"))
        .unwrap();
    let today = Utc::now().date_naive();

    let mut last_level = 1;
    for offset in (0..10).rev() {
        let outcome = services
            .habits
            .toggle_completion(&user_id, &habit.id, today - Duration::days(offset))
            .unwrap();
        last_level = outcome.level;
    }

    let user = services.users.get_user(&user_id).unwrap();
    assert_eq!(user.xp_points, 100);
    assert_eq!(user.level, 2);
    assert_eq!(last_level, 2);
}

#[test]
fn updating_frequency_revalidates_the_schedule() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();

    let err = services
        .habits
        .update_habit(
            &user_id,
            &habit.id,
            HabitUpdateInput {
                frequency: Some(Frequency::Monthly),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let updated = services
        .habits
        .update_habit(
            &user_id,
            &habit.id,
            HabitUpdateInput {
                frequency: Some(Frequency::Monthly),
                monthly_days: Some(vec![1, 15]),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.frequency, Frequency::Monthly);
    assert_eq!(updated.monthly_days, vec![1, 15]);
    assert!(updated.weekly_days.is_empty());
}

#[test]
fn stats_ignore_completions_of_deactivated_habits() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let kept = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();
    let dropped = services
        .habits
        .create_habit(&user_id, daily_input("午睡"))
        .unwrap();
    let today = Utc::now().date_naive();

    services
        .habits
        .toggle_completion(&user_id, &kept.id, today)
        .unwrap();
    services
        .habits
        .toggle_completion(&user_id, &dropped.id, today)
        .unwrap();
    services.habits.delete_habit(&user_id, &dropped.id).unwrap();

    let stats = services.habits.stats(&user_id, today).unwrap();
    assert_eq!(stats.active_habits, 1);
    assert_eq!(stats.completed_today, 1);
    assert_eq!(stats.completion_rate, 100.0);
}

#[test]
fn duplicate_completion_dates_hit_the_unique_constraint() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db = DbPool::new(dir.path().join("app.db")).expect("open database");
    let services = Services::new(db.clone());
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();
    let today = Utc::now().date_naive();

    let insert = |id: &str| {
        let row = CompletionRow {
            id: id.to_string(),
            habit_id: habit.id.clone(),
            completion_date: today.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        db.with_connection(|conn| HabitRepository::insert_completion(conn, &row))
    };

    insert("c1").unwrap();
    let err = insert("c2").unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));
}

#[test]
fn stats_cover_the_last_seven_days() {
    let (_dir, services) = setup();
    let user_id = create_user(&services, "小明");
    let habit = services
        .habits
        .create_habit(&user_id, daily_input("晨跑"))
        .unwrap();
    let today = Utc::now().date_naive();

    services
        .habits
        .toggle_completion(&user_id, &habit.id, today)
        .unwrap();
    services
        .habits
        .toggle_completion(&user_id, &habit.id, today - Duration::days(1))
        .unwrap();

    let stats = services.habits.stats(&user_id, today).unwrap();
    assert_eq!(stats.active_habits, 1);
    assert_eq!(stats.completed_today, 1);
    assert_eq!(stats.completion_rate, 100.0);
    assert_eq!(stats.longest_streak, 2);
    assert_eq!(stats.most_consistent_habit.as_deref(), Some("晨跑"));
    assert_eq!(stats.completion_data.len(), 7);
    assert_eq!(stats.completion_data.last().unwrap().count, 1);
    assert_eq!(stats.completion_data[5].count, 1);
}
