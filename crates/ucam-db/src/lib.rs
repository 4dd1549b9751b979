//! UCAM Database: SurrealDB connection management, schema migrations and
//! repository implementations for the access table, the audit log, the
//! governance catalog, memberships and issued statements.

mod connection;
mod error;
pub mod repository;
mod schema;
mod setup;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{SCHEMA_VERSION, current_version, run_migrations, schema_v1, schema_v2};
pub use setup::{SetupStatus, ensure_setup};
