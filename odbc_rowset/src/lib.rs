//! Rowset, cursor and parameter binding layer for ODBC clients.
//!
//! Result rows are fetched into column-wise buffers a page at a time and
//! read through a cursor that can scroll, position and write rows back.
//! Parameters use the same buffers, with long values streamed to the driver
//! at execution time.

pub mod driver;
pub mod engine;
mod error;
pub mod observability;
pub mod protocol;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use driver::{ConnectionProtocol, Diagnostic, DriverInfo, StatementProtocol};
pub use engine::{
    CallableStatement, ColumnIndex, Connection, DriverManager, EngineConfig, IsolationLevel,
    PreparedStatement, ResultSet, ResultSetConcurrency, ResultSetMetaData, ResultSetType,
    SqlWarning, Statement,
};
pub use error::{ErrorCategory, OdbcError, Result, StructuredError};
pub use protocol::{ChunkStream, ColumnBuffer, Date, Guid, Rowset, SqlType, Time, Timestamp};
