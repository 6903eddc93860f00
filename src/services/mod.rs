pub mod habit_service;
pub mod user_service;
pub mod wallet_service;

pub use habit_service::HabitService;
pub use user_service::UserService;
pub use wallet_service::WalletService;

use crate::db::DbPool;

/// Shared service wiring over one database pool.
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub habits: HabitService,
    pub wallet: WalletService,
}

impl Services {
    pub fn new(db: DbPool) -> Self {
        Self {
            users: UserService::new(db.clone()),
            habits: HabitService::new(db.clone()),
            wallet: WalletService::new(db),
        }
    }
}
