pub mod goal_repository;
pub mod habit_repository;
pub mod transaction_repository;
pub mod user_repository;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::{AppError, AppResult};

pub(crate) fn parse_datetime(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::validation(format!("时间格式非法: {value}")))
}

pub(crate) fn parse_datetime_opt(value: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    value.map(parse_datetime).transpose()
}

pub(crate) fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("日期格式非法: {value}")))
}

pub(crate) fn parse_date_opt(value: Option<&str>) -> AppResult<Option<NaiveDate>> {
    value.map(parse_date).transpose()
}

pub(crate) fn parse_amount(value: &str) -> AppResult<Decimal> {
    value
        .parse::<Decimal>()
        .map_err(|_| AppError::validation(format!("金额格式非法: {value}")))
}
