pub mod habit;
pub mod user;
pub mod wallet;
