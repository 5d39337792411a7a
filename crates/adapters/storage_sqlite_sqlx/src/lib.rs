//! # relayhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `DeviceRepository` port defined in `relayhub-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between the device aggregate and its `devices` / `circuits` rows
//!
//! ## Dependency rule
//! Depends on `relayhub-app` (for port traits) and `relayhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod device_repo;
pub mod error;
pub mod pool;

pub use device_repo::SqliteDeviceRepository;
pub use error::StorageError;
pub use pool::{Config, Database};
