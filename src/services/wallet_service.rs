use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::goal_repository::{GoalRepository, GoalRow};
use crate::db::repositories::transaction_repository::{TransactionRepository, TransactionRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::wallet::{
    CategorySpending, ContributionInput, ContributionOutcome, GoalCreateInput, GoalUpdateInput,
    GoalWithProgress, MonthlySummary, SavingsGoalRecord, TransactionCreateInput, TransactionFilter,
    TransactionRecord, TransactionType,
};

const SAVINGS_CATEGORY: &str = "Savings";

#[derive(Clone)]
pub struct WalletService {
    db: DbPool,
}

impl WalletService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    // ----- transactions -----

    pub fn record_transaction(
        &self,
        user_id: &str,
        input: TransactionCreateInput,
    ) -> AppResult<TransactionRecord> {
        if input.transaction_type == TransactionType::Transfer {
            return Err(AppError::validation("转账需通过储蓄目标进行"));
        }
        validate_amount(input.amount)?;
        let description = normalize_description(&input.description)?;
        let category = input.category.trim().to_string();
        if category.is_empty() {
            return Err(AppError::validation("分类不能为空"));
        }

        let now = Utc::now();
        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount: input.amount,
            category,
            transaction_type: input.transaction_type,
            description,
            notes: normalize_notes(input.notes),
            date: input.date.unwrap_or_else(|| now.date_naive()),
            savings_goal_id: None,
            created_at: now,
        };

        let row = TransactionRow::from_record(&record);
        self.db
            .with_connection(|conn| TransactionRepository::insert(conn, &row))?;
        info!(
            transaction_id = %record.id,
            transaction_type = %record.transaction_type,
            "transaction recorded"
        );
        Ok(record)
    }

    pub fn delete_transaction(&self, user_id: &str, transaction_id: &str) -> AppResult<()> {
        let record = self.get_transaction(user_id, transaction_id)?;
        self.db
            .with_connection(|conn| TransactionRepository::delete(conn, &record.id))?;
        info!(transaction_id = %record.id, "transaction deleted");
        Ok(())
    }

    pub fn get_transaction(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> AppResult<TransactionRecord> {
        let row = self
            .db
            .with_connection(|conn| TransactionRepository::find_by_id(conn, transaction_id))?
            .ok_or_else(AppError::not_found)?;
        let record = row.into_record()?;
        if record.user_id != user_id {
            return Err(AppError::forbidden());
        }
        Ok(record)
    }

    pub fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<TransactionRecord>> {
        let rows = self
            .db
            .with_connection(|conn| TransactionRepository::list_for_user(conn, user_id, filter))?;
        let records = rows
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;
        debug!(count = records.len(), "transactions listed");
        Ok(records)
    }

    // ----- savings goals -----

    pub fn create_goal(
        &self,
        user_id: &str,
        input: GoalCreateInput,
        today: NaiveDate,
    ) -> AppResult<SavingsGoalRecord> {
        let name = normalize_name(&input.name)?;
        validate_target_amount(input.target_amount)?;
        if let Some(target_date) = input.target_date {
            // Only new goals require a future date; edits may keep a date
            // that has since passed.
            if target_date <= today {
                return Err(AppError::validation("目标日期必须晚于今天"));
            }
        }

        let now = Utc::now();
        let record = SavingsGoalRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name,
            description: normalize_notes(input.description),
            target_amount: input.target_amount,
            target_date: input.target_date,
            is_completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let row = GoalRow::from_record(&record);
        self.db
            .with_connection(|conn| GoalRepository::insert(conn, &row))?;
        info!(goal_id = %record.id, "savings goal created");
        Ok(record)
    }

    pub fn update_goal(
        &self,
        user_id: &str,
        goal_id: &str,
        update: GoalUpdateInput,
    ) -> AppResult<SavingsGoalRecord> {
        let mut record = self.get_goal(user_id, goal_id)?;

        if let Some(name) = update.name {
            record.name = normalize_name(&name)?;
        }
        if let Some(description) = update.description {
            record.description = normalize_notes(Some(description));
        }
        if let Some(target_amount) = update.target_amount {
            validate_target_amount(target_amount)?;
            record.target_amount = target_amount;
        }
        if let Some(target_date) = update.target_date {
            record.target_date = Some(target_date);
        }
        record.updated_at = Utc::now();

        let row = GoalRow::from_record(&record);
        self.db
            .with_connection(|conn| GoalRepository::update(conn, &row))?;
        info!(goal_id = %record.id, "savings goal updated");
        Ok(record)
    }

    pub fn get_goal(&self, user_id: &str, goal_id: &str) -> AppResult<SavingsGoalRecord> {
        let row = self
            .db
            .with_connection(|conn| GoalRepository::find_by_id(conn, goal_id))?
            .ok_or_else(AppError::not_found)?;
        let record = row.into_record()?;
        if record.user_id != user_id {
            return Err(AppError::forbidden());
        }
        Ok(record)
    }

    pub fn get_goal_with_progress(
        &self,
        user_id: &str,
        goal_id: &str,
        today: NaiveDate,
    ) -> AppResult<GoalWithProgress> {
        let goal = self.get_goal(user_id, goal_id)?;
        let saved_amount = self
            .db
            .with_connection(|conn| TransactionRepository::sum_for_goal(conn, &goal.id))?;
        Ok(decorate_goal(goal, saved_amount, today))
    }

    pub fn list_goals(&self, user_id: &str, today: NaiveDate) -> AppResult<Vec<GoalWithProgress>> {
        let decorated = self.db.with_connection(|conn| {
            let rows = GoalRepository::list_for_user(conn, user_id)?;
            rows.into_iter()
                .map(|row| {
                    let goal = row.into_record()?;
                    let saved = TransactionRepository::sum_for_goal(conn, &goal.id)?;
                    Ok(decorate_goal(goal, saved, today))
                })
                .collect::<AppResult<Vec<_>>>()
        })?;

        debug!(count = decorated.len(), "savings goals listed");
        Ok(decorated)
    }

    /// Move pocket money into a goal. The transfer transaction, the derived
    /// balance and the completion latch all move in one transaction.
    pub fn add_contribution(
        &self,
        user_id: &str,
        goal_id: &str,
        input: ContributionInput,
    ) -> AppResult<ContributionOutcome> {
        validate_amount(input.amount)?;

        self.db.with_transaction(|tx| {
            let goal = GoalRepository::find_by_id(tx, goal_id)?
                .ok_or_else(AppError::not_found)?
                .into_record()?;
            if goal.user_id != user_id {
                return Err(AppError::forbidden());
            }

            let now = Utc::now();
            let description = match input.description {
                Some(text) => normalize_description(&text)?,
                None => format!("Transfer to {}", goal.name),
            };

            let record = TransactionRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                amount: input.amount,
                category: SAVINGS_CATEGORY.to_string(),
                transaction_type: TransactionType::Transfer,
                description,
                notes: normalize_notes(input.notes),
                date: input.date.unwrap_or_else(|| now.date_naive()),
                savings_goal_id: Some(goal.id.clone()),
                created_at: now,
            };
            TransactionRepository::insert(tx, &TransactionRow::from_record(&record))?;

            let saved_amount = TransactionRepository::sum_for_goal(tx, &goal.id)?;
            let progress = goal.progress(saved_amount);

            let goal_completed = if !goal.is_completed && saved_amount >= goal.target_amount {
                let stamp = now.to_rfc3339();
                GoalRepository::mark_completed(tx, &goal.id, &stamp, &stamp)?;
                info!(goal_id = %goal.id, "savings goal reached");
                true
            } else {
                goal.is_completed
            };

            info!(
                goal_id = %goal.id,
                amount = %record.amount,
                saved = %saved_amount,
                "contribution added"
            );
            Ok(ContributionOutcome {
                transaction: record,
                saved_amount,
                progress,
                goal_completed,
            })
        })
    }

    // ----- summaries -----

    /// Income, expenses and net savings for one calendar month. Transfers
    /// stay internal and count toward neither side.
    pub fn monthly_summary(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> AppResult<MonthlySummary> {
        let (start, end) = month_bounds(year, month)?;

        let (total_income, total_expenses) = self.db.with_connection(|conn| {
            let income = TransactionRepository::sum_by_type_in_range(
                conn,
                user_id,
                TransactionType::Income,
                start,
                end,
            )?;
            let expenses = TransactionRepository::sum_by_type_in_range(
                conn,
                user_id,
                TransactionType::Expense,
                start,
                end,
            )?;
            Ok((income, expenses))
        })?;

        Ok(MonthlySummary {
            year,
            month,
            total_income,
            total_expenses,
            savings: total_income - total_expenses,
        })
    }

    pub fn spending_by_category(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> AppResult<Vec<CategorySpending>> {
        let (start, end) = month_bounds(year, month)?;

        let totals = self.db.with_connection(|conn| {
            TransactionRepository::expense_totals_by_category(conn, user_id, start, end)
        })?;

        Ok(totals
            .into_iter()
            .map(|(category, total_amount)| CategorySpending {
                category,
                total_amount,
            })
            .collect())
    }

    /// Month-by-month summaries for the `months` calendar months ending at
    /// `year`/`month`, oldest first. Feeds the dashboard trend chart.
    pub fn spending_trend(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
        months: u32,
    ) -> AppResult<Vec<MonthlySummary>> {
        if months == 0 {
            return Err(AppError::validation("月份数需大于 0"));
        }

        let mut trend = Vec::with_capacity(months as usize);
        for offset in (0..months).rev() {
            let (y, m) = months_back(year, month, offset)?;
            trend.push(self.monthly_summary(user_id, y, m)?);
        }
        Ok(trend)
    }
}

/// The calendar month `offset` months before `year`/`month`.
fn months_back(year: i32, month: u32, offset: u32) -> AppResult<(i32, u32)> {
    if !(1..=12).contains(&month) {
        return Err(AppError::validation("月份需在 1 到 12 之间"));
    }
    let total = year as i64 * 12 + i64::from(month) - 1 - i64::from(offset);
    Ok((total.div_euclid(12) as i32, (total.rem_euclid(12) + 1) as u32))
}

fn decorate_goal(goal: SavingsGoalRecord, saved_amount: Decimal, today: NaiveDate) -> GoalWithProgress {
    let progress = goal.progress(saved_amount);
    let days_remaining = goal.days_remaining(today);
    GoalWithProgress {
        goal,
        saved_amount,
        progress,
        days_remaining,
    }
}

/// First and last day of a calendar month. December rolls the upper bound
/// into January of the next year.
fn month_bounds(year: i32, month: u32) -> AppResult<(NaiveDate, NaiveDate)> {
    if !(1..=12).contains(&month) {
        return Err(AppError::validation("月份需在 1 到 12 之间"));
    }
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::validation("日期非法"))?;
    let next_month_start = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AppError::validation("日期非法"))?;
    Ok((start, next_month_start - Duration::days(1)))
}

fn validate_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::validation("金额需大于 0"));
    }
    Ok(())
}

fn validate_target_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::validation("目标金额需大于 0"));
    }
    Ok(())
}

fn normalize_name(name: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("名称不能为空"));
    }
    if trimmed.chars().count() > 100 {
        return Err(AppError::validation("名称长度需在 100 字以内"));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: &str) -> AppResult<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("描述不能为空"));
    }
    if trimmed.chars().count() > 200 {
        return Err(AppError::validation("描述长度需在 200 字以内"));
    }
    Ok(trimmed.to_string())
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
