//! Scripted in-memory driver for exercising the rowset layer without a
//! data source.

pub mod memory_driver;
pub mod value;

pub use memory_driver::{column, MemoryConnection, MemoryDriver, MemoryRow, MemoryStatement, Outcome};
pub use value::Value;

/// Loads `.env` from the working directory or a parent, once per process.
/// Variables already set in the environment are kept.
#[cfg(feature = "test-helpers")]
pub fn load_dotenv() {
    static LOADED: std::sync::Once = std::sync::Once::new();
    LOADED.call_once(|| {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
    });
}
