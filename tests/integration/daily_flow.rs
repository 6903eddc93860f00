//! End-to-end walk through a typical day: earn pocket money, complete
//! habits, put money toward a goal and review the month.

use chrono::{Datelike, Duration, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;

use pocketpal::db::DbPool;
use pocketpal::models::habit::{Frequency, HabitCreateInput};
use pocketpal::models::user::UserCreateInput;
use pocketpal::models::wallet::{
    ContributionInput, GoalCreateInput, TransactionCreateInput, TransactionFilter,
    TransactionType,
};
use pocketpal::services::Services;

fn setup() -> (TempDir, Services) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let db = DbPool::new(dir.path().join("app.db")).expect("open database");
    (dir, Services::new(db))
}

#[test]
fn a_full_day_of_habits_and_savings() {
    let (_dir, services) = setup();
    let today = Utc::now().date_naive();

    let user = services
        .users
        .create_user(UserCreateInput {
            username: "小米".to_string(),
        })
        .unwrap();
    assert_eq!(user.level, 1);
    assert_eq!(user.xp_points, 0);

    // Morning: set up two habits and complete the daily one.
    let running = services
        .habits
        .create_habit(
            &user.id,
            HabitCreateInput {
                name: "晨跑".to_string(),
                description: Some("围着小区跑两圈".to_string()),
                frequency: Frequency::Daily,
                weekly_days: None,
                monthly_days: None,
                target_days: None,
            },
        )
        .unwrap();
    services
        .habits
        .create_habit(
            &user.id,
            HabitCreateInput {
                name: "存钱复盘".to_string(),
                description: None,
                frequency: Frequency::Monthly,
                weekly_days: None,
                monthly_days: Some(vec![1]),
                target_days: None,
            },
        )
        .unwrap();

    let outcome = services
        .habits
        .toggle_completion(&user.id, &running.id, today)
        .unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.current_streak, 1);
    assert_eq!(outcome.xp_points, 10);

    // Pocket money arrives, some of it gets spent.
    services
        .wallet
        .record_transaction(
            &user.id,
            TransactionCreateInput {
                amount: dec!(50),
                category: "零花钱".to_string(),
                transaction_type: TransactionType::Income,
                description: "每周零花钱".to_string(),
                notes: None,
                date: Some(today),
            },
        )
        .unwrap();
    services
        .wallet
        .record_transaction(
            &user.id,
            TransactionCreateInput {
                amount: dec!(12),
                category: "零食".to_string(),
                transaction_type: TransactionType::Expense,
                description: "放学买奶茶".to_string(),
                notes: None,
                date: Some(today),
            },
        )
        .unwrap();

    // Evening: start a goal and move the rest toward it.
    let goal = services
        .wallet
        .create_goal(
            &user.id,
            GoalCreateInput {
                name: "新耳机".to_string(),
                description: None,
                target_amount: dec!(60),
                target_date: Some(today + Duration::days(30)),
            },
            today,
        )
        .unwrap();

    let first = services
        .wallet
        .add_contribution(
            &user.id,
            &goal.id,
            ContributionInput {
                amount: dec!(38),
                description: None,
                date: Some(today),
                notes: None,
            },
        )
        .unwrap();
    assert!(!first.goal_completed);
    assert_eq!(first.saved_amount, dec!(38));

    let second = services
        .wallet
        .add_contribution(
            &user.id,
            &goal.id,
            ContributionInput {
                amount: dec!(22),
                description: None,
                date: Some(today),
                notes: None,
            },
        )
        .unwrap();
    assert!(second.goal_completed);
    assert_eq!(second.saved_amount, dec!(60));
    assert_eq!(second.progress, dec!(100));

    // The dashboard reflects all of it.
    let listed = services.habits.list_habits(&user.id, today).unwrap();
    assert_eq!(listed.len(), 2);
    let stats = services.habits.stats(&user.id, today).unwrap();
    assert_eq!(stats.active_habits, 2);
    assert_eq!(stats.completed_today, 1);

    let goals = services.wallet.list_goals(&user.id, today).unwrap();
    assert_eq!(goals.len(), 1);
    assert!(goals[0].goal.is_completed);

    let summary = services
        .wallet
        .monthly_summary(&user.id, today.year(), today.month())
        .unwrap();
    assert_eq!(summary.total_income, dec!(50));
    assert_eq!(summary.total_expenses, dec!(12));
    assert_eq!(summary.savings, dec!(38));

    let transfers = services
        .wallet
        .list_transactions(
            &user.id,
            &TransactionFilter {
                transaction_type: Some(TransactionType::Transfer),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(transfers.len(), 2);
    assert!(transfers
        .iter()
        .all(|tx| tx.savings_goal_id.as_deref() == Some(goal.id.as_str())));

    let refreshed = services.users.get_user(&user.id).unwrap();
    assert_eq!(refreshed.xp_points, 10);
    assert_eq!(refreshed.level, 1);
}
