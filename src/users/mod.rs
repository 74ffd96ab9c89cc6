pub mod model;
pub mod repo;
#[cfg(test)]
pub mod memory;

pub use model::{User, UserIdentity};
pub use repo::{PgUserStore, StoreError, UserStore};
