pub mod callable_statement;
pub mod config;
pub mod connection;
pub mod environment;
pub mod metadata;
pub mod prepared_statement;
pub mod result_set;
pub mod statement;
mod streaming;
pub mod transaction;
pub mod warnings;

pub use callable_statement::CallableStatement;
pub use config::{ConfigOverrides, EngineConfig};
pub use connection::Connection;
pub use environment::{DataSource, DriverManager, InstalledDriver};
pub use metadata::ResultSetMetaData;
pub use prepared_statement::PreparedStatement;
pub use result_set::{ColumnIndex, ResultSet};
pub use statement::{ResultSetConcurrency, ResultSetType, Statement};
pub use transaction::{IsolationLevel, Transaction, TransactionState};
pub use warnings::{ErrorHandler, SqlWarning};
