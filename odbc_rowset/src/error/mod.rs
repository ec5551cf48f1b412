use crate::protocol::{NativeKind, SqlType};
use odbc_api::handles::Record as OdbcRecord;
use thiserror::Error;

/// Error category for decision-making (retry, abort, reconnect, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - retry may resolve
    Transient,
    /// Fatal error - should abort operation
    Fatal,
    /// Validation error - caller can correct the arguments and retry
    Validation,
    /// Connection lost - should reconnect
    ConnectionLost,
}

#[derive(Error, Debug, Clone)]
pub enum OdbcError {
    #[error("ODBC error: {0}")]
    OdbcApi(String),

    #[error("Environment not initialized")]
    EnvironmentNotInitialized,

    /// Error reported by the driver through its diagnostic records.
    #[error("{message}")]
    Structured {
        sqlstate: [u8; 5],
        native_code: i32,
        message: String,
    },

    #[error("Unhandled SQL type {0}")]
    UnsupportedType(SqlType),

    #[error("Could not {verb} SQL type {sql_type}, C type {native} {target}")]
    UnsupportedCoercion {
        verb: &'static str,
        sql_type: SqlType,
        native: NativeKind,
        target: &'static str,
    },

    #[error("Parameter index {0} out of bounds")]
    ParameterIndexOutOfBounds(usize),

    #[error("Parameter index {0} out of range")]
    ParameterIndexOutOfRange(usize),

    #[error("Column index {0} out of range")]
    ColumnIndexOutOfRange(usize),

    #[error("Column {0} not found in result set")]
    ColumnNotFound(String),

    #[error("Illegal operation while on insert row")]
    OnInsertRow,

    #[error("Operation not possible on a forward-only cursor")]
    UnsupportedOnForwardOnlyCursor,

    #[error("{0}")]
    InvalidCursorState(&'static str),

    #[error("relative(): no current row")]
    RelativeWithoutCurrentRow,

    #[error("Invalid fetch size {0}")]
    InvalidFetchSize(i64),

    #[error("Cannot re-execute; statement has an open result set")]
    OpenResultSetExists,

    #[error("Statement did not return a result set")]
    NoResultSet,

    #[error("{0}")]
    InvalidDateTime(String),

    #[error("Invalid character value for cast: {0}")]
    InvalidCharacterValue(String),

    #[error("Memory allocation failure ({0} bytes)")]
    AllocationFailed(usize),

    #[error("Error reading stream: {0}")]
    StreamError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),
}

impl From<odbc_api::Error> for OdbcError {
    fn from(err: odbc_api::Error) -> Self {
        if let Some(structured) = try_extract_structured(&err) {
            return structured;
        }
        OdbcError::OdbcApi(err.to_string())
    }
}

fn try_extract_structured(err: &odbc_api::Error) -> Option<OdbcError> {
    use odbc_api::Error as OdbcErr;
    let record = match err {
        OdbcErr::Diagnostics { record, .. } => record,
        OdbcErr::UnsupportedOdbcApiVersion(record) => record,
        _ => return None,
    };
    Some(structured_from_odbc_record(record))
}

fn structured_from_odbc_record(record: &OdbcRecord) -> OdbcError {
    OdbcError::Structured {
        sqlstate: record.state.0,
        native_code: record.native_error,
        message: record.to_string(),
    }
}

impl OdbcError {
    pub fn sqlstate(&self) -> [u8; 5] {
        match self {
            OdbcError::Structured { sqlstate, .. } => *sqlstate,
            OdbcError::EnvironmentNotInitialized => *b"HY010",
            OdbcError::ParameterIndexOutOfBounds(_) | OdbcError::ParameterIndexOutOfRange(_) => {
                *b"S1093"
            }
            OdbcError::ColumnIndexOutOfRange(_) => *b"42S12",
            OdbcError::ColumnNotFound(_) => *b"42S22",
            OdbcError::OnInsertRow | OdbcError::UnsupportedOnForwardOnlyCursor => *b"HY010",
            OdbcError::InvalidCursorState(_) => *b"HY109",
            OdbcError::RelativeWithoutCurrentRow => *b"HY107",
            OdbcError::InvalidFetchSize(_) => *b"HY024",
            OdbcError::OpenResultSetExists | OdbcError::NoResultSet => *b"24000",
            OdbcError::InvalidDateTime(_) => *b"22007",
            OdbcError::InvalidCharacterValue(_) => *b"22018",
            OdbcError::AllocationFailed(_) => *b"HY001",
            OdbcError::UnsupportedFeature(_) => *b"S1C00",
            OdbcError::ValidationError(_) => *b"HY009",
            OdbcError::OdbcApi(_)
            | OdbcError::UnsupportedType(_)
            | OdbcError::UnsupportedCoercion { .. }
            | OdbcError::StreamError(_)
            | OdbcError::InternalError(_) => *b"HY000",
        }
    }

    pub fn sqlstate_str(&self) -> String {
        String::from_utf8_lossy(&self.sqlstate()).into_owned()
    }

    pub fn native_code(&self) -> i32 {
        match self {
            OdbcError::Structured { native_code, .. } => *native_code,
            _ => 0,
        }
    }

    pub fn message(&self) -> String {
        match self {
            OdbcError::Structured { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }

    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            sqlstate: self.sqlstate(),
            native_code: self.native_code(),
            message: self.message(),
        }
    }

    /// Returns true if the error is transient and may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            OdbcError::Structured { sqlstate, .. } => {
                // Connection errors (08xxx) and timeouts (HYT00/HYT01)
                (sqlstate[0] == b'0' && sqlstate[1] == b'8') || sqlstate.starts_with(b"HYT")
            }
            OdbcError::InternalError(msg) => msg.contains("timeout") || msg.contains("Timeout"),
            _ => false,
        }
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        match self {
            OdbcError::EnvironmentNotInitialized => true,
            OdbcError::Structured { sqlstate, .. } => sqlstate[0] == b'0' && sqlstate[1] == b'8',
            _ => false,
        }
    }

    /// Local contract violations: raised without consulting the driver and
    /// recoverable by the caller.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            OdbcError::UnsupportedCoercion { .. }
                | OdbcError::ParameterIndexOutOfBounds(_)
                | OdbcError::ParameterIndexOutOfRange(_)
                | OdbcError::ColumnIndexOutOfRange(_)
                | OdbcError::ColumnNotFound(_)
                | OdbcError::OnInsertRow
                | OdbcError::UnsupportedOnForwardOnlyCursor
                | OdbcError::InvalidCursorState(_)
                | OdbcError::RelativeWithoutCurrentRow
                | OdbcError::InvalidFetchSize(_)
                | OdbcError::OpenResultSetExists
                | OdbcError::NoResultSet
                | OdbcError::InvalidDateTime(_)
                | OdbcError::InvalidCharacterValue(_)
                | OdbcError::ValidationError(_)
        )
    }

    /// Returns the error category for decision-making
    pub fn error_category(&self) -> ErrorCategory {
        if self.is_contract_violation() {
            return ErrorCategory::Validation;
        }
        if matches!(
            self,
            OdbcError::UnsupportedFeature(_)
                | OdbcError::UnsupportedType(_)
                | OdbcError::AllocationFailed(_)
        ) {
            return ErrorCategory::Fatal;
        }
        if self.is_connection_error() {
            return ErrorCategory::ConnectionLost;
        }
        if self.is_retryable() {
            return ErrorCategory::Transient;
        }
        ErrorCategory::Fatal
    }
}

#[derive(Debug, Clone)]
pub struct StructuredError {
    pub sqlstate: [u8; 5],
    pub native_code: i32,
    pub message: String,
}

impl StructuredError {
    pub fn sqlstate_str(&self) -> String {
        String::from_utf8_lossy(&self.sqlstate).into_owned()
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.sqlstate_str())?;
        if self.native_code != 0 {
            write!(f, " ({})", self.native_code)?;
        }
        write!(f, " {}", self.message)
    }
}

pub type Result<T> = std::result::Result<T, OdbcError>;
