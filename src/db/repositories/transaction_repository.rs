use std::convert::TryFrom;

use chrono::NaiveDate;
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::db::repositories::{parse_amount, parse_date, parse_datetime};
use crate::error::{AppError, AppResult};
use crate::models::wallet::{TransactionFilter, TransactionRecord, TransactionType};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub id: String,
    pub user_id: String,
    pub amount: String,
    pub category: String,
    pub transaction_type: String,
    pub description: String,
    pub notes: Option<String>,
    pub tx_date: String,
    pub savings_goal_id: Option<String>,
    pub created_at: String,
}

impl TransactionRow {
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            amount: record.amount.to_string(),
            category: record.category.clone(),
            transaction_type: record.transaction_type.as_str().to_string(),
            description: record.description.clone(),
            notes: record.notes.clone(),
            tx_date: record.date.to_string(),
            savings_goal_id: record.savings_goal_id.clone(),
            created_at: record.created_at.to_rfc3339(),
        }
    }

    pub fn into_record(self) -> AppResult<TransactionRecord> {
        let transaction_type = TransactionType::try_from(self.transaction_type.as_str())
            .map_err(AppError::validation)?;

        Ok(TransactionRecord {
            id: self.id,
            user_id: self.user_id,
            amount: parse_amount(&self.amount)?,
            category: self.category,
            transaction_type,
            description: self.description,
            notes: self.notes,
            date: parse_date(&self.tx_date)?,
            savings_goal_id: self.savings_goal_id,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for TransactionRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            amount: row.get("amount")?,
            category: row.get("category")?,
            transaction_type: row.get("transaction_type")?,
            description: row.get("description")?,
            notes: row.get("notes")?,
            tx_date: row.get("tx_date")?,
            savings_goal_id: row.get("savings_goal_id")?,
            created_at: row.get("created_at")?,
        })
    }
}

const TRANSACTION_COLUMNS: &str = r#"
    id,
    user_id,
    amount,
    category,
    transaction_type,
    description,
    notes,
    tx_date,
    savings_goal_id,
    created_at
"#;

pub struct TransactionRepository;

impl TransactionRepository {
    pub fn insert(conn: &Connection, row: &TransactionRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO transactions (
                    id,
                    user_id,
                    amount,
                    category,
                    transaction_type,
                    description,
                    notes,
                    tx_date,
                    savings_goal_id,
                    created_at
                ) VALUES (
                    :id,
                    :user_id,
                    :amount,
                    :category,
                    :transaction_type,
                    :description,
                    :notes,
                    :tx_date,
                    :savings_goal_id,
                    :created_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":amount": &row.amount,
                ":category": &row.category,
                ":transaction_type": &row.transaction_type,
                ":description": &row.description,
                ":notes": &row.notes,
                ":tx_date": &row.tx_date,
                ":savings_goal_id": &row.savings_goal_id,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<TransactionRow>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = :id");
        let mut stmt = conn.prepare(&query)?;

        let row = stmt
            .query_row(named_params! {":id": id}, |row| {
                TransactionRow::try_from(row)
            })
            .optional()?;

        Ok(row)
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute(
            "DELETE FROM transactions WHERE id = :id",
            named_params! {":id": id},
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn list_for_user(
        conn: &Connection,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<TransactionRow>> {
        let query = format!(
            r#"
                SELECT {TRANSACTION_COLUMNS} FROM transactions
                WHERE user_id = :user_id
                  AND (:transaction_type IS NULL OR transaction_type = :transaction_type)
                  AND (:category IS NULL OR category = :category)
                  AND (:start_date IS NULL OR tx_date >= :start_date)
                  AND (:end_date IS NULL OR tx_date <= :end_date)
                ORDER BY tx_date DESC, created_at DESC
            "#
        );
        let mut stmt = conn.prepare(&query)?;

        let rows = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":transaction_type": filter.transaction_type.map(|t| t.as_str()),
                    ":category": &filter.category,
                    ":start_date": filter.start_date.map(|d| d.to_string()),
                    ":end_date": filter.end_date.map(|d| d.to_string()),
                },
                |row| TransactionRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Sum of amounts linked to a goal. Amounts are decimal strings, so the
    /// sum is taken in Rust rather than with SQLite's float SUM().
    pub fn sum_for_goal(conn: &Connection, goal_id: &str) -> AppResult<Decimal> {
        let mut stmt = conn.prepare(
            "SELECT amount FROM transactions WHERE savings_goal_id = :goal_id",
        )?;

        let amounts = stmt
            .query_map(named_params! {":goal_id": goal_id}, |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut total = Decimal::ZERO;
        for amount in amounts {
            total += parse_amount(&amount)?;
        }

        Ok(total)
    }

    /// Sum of amounts of one transaction type over a closed date interval.
    pub fn sum_by_type_in_range(
        conn: &Connection,
        user_id: &str,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Decimal> {
        let mut stmt = conn.prepare(
            r#"
                SELECT amount FROM transactions
                WHERE user_id = :user_id
                  AND transaction_type = :transaction_type
                  AND tx_date >= :start AND tx_date <= :end
            "#,
        )?;

        let amounts = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":transaction_type": transaction_type.as_str(),
                    ":start": start.to_string(),
                    ":end": end.to_string(),
                },
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut total = Decimal::ZERO;
        for amount in amounts {
            total += parse_amount(&amount)?;
        }

        Ok(total)
    }

    /// Expense totals per category over a closed date interval, largest
    /// first.
    pub fn expense_totals_by_category(
        conn: &Connection,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AppResult<Vec<(String, Decimal)>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT category, amount FROM transactions
                WHERE user_id = :user_id
                  AND transaction_type = 'expense'
                  AND tx_date >= :start AND tx_date <= :end
            "#,
        )?;

        let rows = stmt
            .query_map(
                named_params! {
                    ":user_id": user_id,
                    ":start": start.to_string(),
                    ":end": end.to_string(),
                },
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut totals: Vec<(String, Decimal)> = Vec::new();
        for (category, amount) in rows {
            let amount = parse_amount(&amount)?;
            match totals.iter_mut().find(|(name, _)| *name == category) {
                Some((_, total)) => *total += amount,
                None => totals.push((category, amount)),
            }
        }

        totals.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(totals)
    }
}
