//! Call-level interface the rowset layer drives.
//!
//! Every call reports only success or failure; the detail lives in the
//! handle's diagnostic records, which the caller drains right after the call.
//! A failed call yields its first record as the error, a successful call with
//! records yields warnings.

pub mod info;

use crate::engine::transaction::IsolationLevel;
use crate::protocol::{BufferView, NativeKind, RowStatus, SqlType};
use std::fmt;
use std::sync::Arc;

pub use info::{Concurrency, CursorType, DriverInfo, SupportedFunctions};

/// A driver call returned `SQL_ERROR`; details are in the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFailed;

pub type CallResult<T> = std::result::Result<T, CallFailed>;

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub sqlstate: [u8; 5],
    pub native_code: i32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(sqlstate: &str, native_code: i32, message: impl Into<String>) -> Self {
        let mut state = *b"HY000";
        let bytes = sqlstate.as_bytes();
        if bytes.len() == 5 {
            state.copy_from_slice(bytes);
        }
        Self {
            sqlstate: state,
            native_code,
            message: message.into(),
        }
    }

    pub fn sqlstate_str(&self) -> String {
        String::from_utf8_lossy(&self.sqlstate).into_owned()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (native {})",
            self.sqlstate_str(),
            self.message,
            self.native_code
        )
    }
}

/// Handles that accumulate diagnostic records.
pub trait DiagnosticSource {
    /// Returns and clears the records left by the last call.
    fn diagnostics(&mut self) -> Vec<Diagnostic>;
}

/// Opaque value the driver hands back from `param_data` to name the
/// parameter or column whose data it wants: the 1-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataToken(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    NeedData,
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Rows(usize),
    NoData,
}

/// Result of one `get_data` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetData {
    /// Bytes available before the call, `NULL_DATA` or `NO_TOTAL`.
    Indicator(i64),
    /// The whole value was returned by earlier calls.
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDirection {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

impl FetchDirection {
    /// `SQL_FETCH_*` value.
    pub fn code(self) -> u16 {
        match self {
            Self::Next => 1,
            Self::First => 2,
            Self::Last => 3,
            Self::Prior => 4,
            Self::Absolute(_) => 5,
            Self::Relative(_) => 6,
        }
    }

    pub fn offset(self) -> i64 {
        match self {
            Self::Absolute(n) | Self::Relative(n) => n,
            _ => 0,
        }
    }
}

/// `SQLSetPos` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOp {
    Position,
    Refresh,
    Update,
    Delete,
    Add,
}

impl PositionOp {
    pub fn code(self) -> u16 {
        match self {
            Self::Position => 0,
            Self::Refresh => 1,
            Self::Update => 2,
            Self::Delete => 3,
            Self::Add => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    In,
    InOut,
    Out,
}

impl ParamDirection {
    /// `SQL_PARAM_*` value.
    pub fn code(self) -> i16 {
        match self {
            Self::In => 1,
            Self::InOut => 2,
            Self::Out => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// Where a binding's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    /// The buffer view passed with each call, `len` bytes per row.
    Buffer { len: usize },
    /// Supplied through `param_data`/`put_data` under this token.
    DataAtExec(DataToken),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamBinding {
    pub direction: ParamDirection,
    pub native: NativeKind,
    pub sql_type: SqlType,
    pub precision: usize,
    pub scale: i16,
    pub target: BindTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub native: NativeKind,
    pub target: BindTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescription {
    pub sql_type: SqlType,
    pub precision: usize,
    pub scale: i16,
    pub nullable: Nullability,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub label: String,
    pub type_name: String,
    pub table_name: String,
    pub sql_type: SqlType,
    pub precision: usize,
    /// Octet length; ODBC 3 drivers report character widths here.
    pub length: usize,
    pub scale: i16,
    pub nullable: Nullability,
    pub display_size: usize,
    pub case_sensitive: bool,
}

impl ColumnDescription {
    /// Description with the derived attributes filled in from the type.
    pub fn new(name: impl Into<String>, sql_type: SqlType, precision: usize, scale: i16) -> Self {
        let name = name.into();
        let display_size = match sql_type {
            SqlType::NUMERIC | SqlType::DECIMAL => precision + 2,
            SqlType::BIT => 1,
            SqlType::TINYINT => 4,
            SqlType::SMALLINT => 6,
            SqlType::INTEGER => 11,
            SqlType::BIGINT => 20,
            SqlType::REAL => 14,
            SqlType::FLOAT | SqlType::DOUBLE => 24,
            SqlType::DATE => 10,
            SqlType::TIME => 8,
            SqlType::TIMESTAMP => 19,
            SqlType::GUID => 36,
            SqlType::BINARY | SqlType::VARBINARY | SqlType::LONGVARBINARY => precision * 2,
            _ => precision,
        };
        let case_sensitive = matches!(
            sql_type,
            SqlType::CHAR
                | SqlType::VARCHAR
                | SqlType::LONGVARCHAR
                | SqlType::WCHAR
                | SqlType::WVARCHAR
                | SqlType::WLONGVARCHAR
        );
        Self {
            label: name.clone(),
            name,
            type_name: sql_type.name().to_string(),
            table_name: String::new(),
            sql_type,
            precision,
            length: precision,
            scale,
            nullable: Nullability::Unknown,
            display_size,
            case_sensitive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementAttribute {
    QueryTimeout(u32),
    MaxRows(u64),
    MaxFieldSize(u64),
    CursorType(CursorType),
    Concurrency(Concurrency),
    EscapeProcessing(bool),
}

/// Cancels the statement's running call from another thread.
pub trait Canceller: Send + Sync {
    fn cancel(&self) -> CallResult<()>;
}

/// One statement handle.
///
/// Buffers are lent for the duration of each call as views starting at the
/// row the columns were bound at; no call retains them.
pub trait StatementProtocol: DiagnosticSource + Send {
    fn prepare(&mut self, sql: &str) -> CallResult<()>;
    fn exec_direct(&mut self, sql: &str, params: &mut [BufferView<'_>]) -> CallResult<ExecOutcome>;
    fn execute(&mut self, params: &mut [BufferView<'_>]) -> CallResult<ExecOutcome>;

    fn num_params(&mut self) -> CallResult<usize>;
    fn describe_param(&mut self, index: usize) -> CallResult<ParamDescription>;
    fn bind_param(&mut self, index: usize, binding: ParamBinding) -> CallResult<()>;
    fn reset_params(&mut self) -> CallResult<()>;
    /// Next data-at-execution token, or `None` once the pending operation
    /// completed.
    fn param_data(&mut self, params: &mut [BufferView<'_>]) -> CallResult<Option<DataToken>>;
    fn put_data(&mut self, chunk: &[u8]) -> CallResult<()>;

    fn num_result_cols(&mut self) -> CallResult<usize>;
    fn describe_col(&mut self, column: usize) -> CallResult<ColumnDescription>;
    fn row_count(&mut self) -> CallResult<i64>;
    fn more_results(&mut self) -> CallResult<bool>;

    /// Requests a rowset size; returns the size the driver applied.
    fn set_row_array_size(&mut self, rows: usize) -> CallResult<usize>;
    fn bind_col(&mut self, column: usize, binding: ColumnBinding) -> CallResult<()>;
    fn unbind_col(&mut self, column: usize) -> CallResult<()>;
    fn unbind_cols(&mut self) -> CallResult<()>;
    fn fetch(
        &mut self,
        direction: FetchDirection,
        columns: &mut [BufferView<'_>],
        row_status: &mut [RowStatus],
    ) -> CallResult<FetchOutcome>;
    fn get_data(&mut self, column: usize, native: NativeKind, buf: &mut [u8]) -> CallResult<GetData>;
    /// `row` is 1-based within the bound rowset.
    fn set_pos(
        &mut self,
        row: usize,
        op: PositionOp,
        columns: &mut [BufferView<'_>],
        row_status: &mut [RowStatus],
    ) -> CallResult<ExecOutcome>;
    fn bulk_add(&mut self, columns: &mut [BufferView<'_>]) -> CallResult<ExecOutcome>;
    /// Absolute number of the first row of the current rowset, 0 if unknown.
    fn row_number(&mut self) -> CallResult<i64>;

    fn set_attribute(&mut self, attribute: StatementAttribute) -> CallResult<()>;
    fn set_cursor_name(&mut self, name: &str) -> CallResult<()>;
    fn cursor_name(&mut self) -> CallResult<String>;
    fn close_cursor(&mut self) -> CallResult<()>;
    fn canceller(&self) -> Arc<dyn Canceller>;
}

/// One connection handle.
pub trait ConnectionProtocol: DiagnosticSource + Send {
    fn allocate_statement(&mut self) -> CallResult<Box<dyn StatementProtocol>>;
    fn driver_info(&mut self) -> CallResult<DriverInfo>;
    fn set_auto_commit(&mut self, on: bool) -> CallResult<()>;
    fn auto_commit(&mut self) -> CallResult<bool>;
    fn commit(&mut self) -> CallResult<()>;
    fn rollback(&mut self) -> CallResult<()>;
    fn set_isolation(&mut self, level: IsolationLevel) -> CallResult<()>;
    fn isolation(&mut self) -> CallResult<IsolationLevel>;
    fn disconnect(&mut self) -> CallResult<()>;
}
