//! SQLite persistence backend for ormlink.
//!
//! ```no_run
//! use ormlink_core::{Session, SchemaBundle};
//! use ormlink_sqlite::{SqliteBackend, SqliteConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::open(SqliteConfig::new("app.db"))?;
//! let session = Session::new(SchemaBundle::new(), backend)?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod error;

pub use backend::SqliteBackend;
pub use config::{SqliteConfig, DEFAULT_BUSY_TIMEOUT};
pub use error::{Result, SqliteError};
