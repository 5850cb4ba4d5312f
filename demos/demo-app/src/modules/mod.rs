pub mod cache;
pub mod database;
pub mod users;

pub use cache::CacheModule;
pub use database::DatabaseModule;
pub use users::UsersModule;
