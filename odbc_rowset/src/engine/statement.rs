use super::config::EngineConfig;
use super::connection::Registration;
use super::result_set::ResultSet;
use super::warnings::{ErrorHandler, SqlWarning};
use crate::driver::{
    CallResult, Canceller, Concurrency, CursorType, DriverInfo, ExecOutcome, StatementAttribute,
    StatementProtocol,
};
use crate::error::{OdbcError, Result};
use crate::observability::StructuredLogger;
use log::Level;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Scrolling behaviour requested for the result sets of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSetType {
    #[default]
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSetConcurrency {
    #[default]
    ReadOnly,
    Updatable,
}

/// Driver statement plus the state shared between a statement and the
/// result set it produced.
pub(crate) struct StatementCore {
    pub(crate) proto: Box<dyn StatementProtocol>,
    pub(crate) errors: Arc<ErrorHandler>,
    pub(crate) logger: StructuredLogger,
    pub(crate) config: EngineConfig,
    pub(crate) info: Arc<DriverInfo>,
    pub(crate) result_set_type: ResultSetType,
    pub(crate) concurrency: ResultSetConcurrency,
    pub(crate) fetch_size: usize,
    pub(crate) result_set_open: bool,
    pub(crate) cursor_open: bool,
    pub(crate) last_no_data: bool,
}

pub(crate) type SharedCore = Arc<Mutex<StatementCore>>;

pub(crate) fn lock_core(core: &SharedCore) -> Result<MutexGuard<'_, StatementCore>> {
    core.lock()
        .map_err(|_| OdbcError::InternalError("Failed to lock statement mutex".to_string()))
}

impl StatementCore {
    pub(crate) fn check<T>(&mut self, result: CallResult<T>, what: &str) -> Result<T> {
        self.errors.check(self.proto.as_mut(), result, what)
    }

    pub(crate) fn check_with_state<T>(
        &mut self,
        result: CallResult<T>,
        what: &str,
        fallback_state: &str,
    ) -> Result<T> {
        self.errors
            .check_with_state(self.proto.as_mut(), result, what, fallback_state)
    }

    pub(crate) fn is_scrollable(&self) -> bool {
        self.result_set_type != ResultSetType::ForwardOnly
    }

    fn set_attribute(&mut self, attribute: StatementAttribute, what: &str) -> Result<()> {
        let result = self.proto.set_attribute(attribute);
        self.check(result, what)
    }

    /// Picks the cursor type and concurrency for the requested result set
    /// type, failing when the driver cannot provide them.
    fn apply_result_set_type(&mut self) -> Result<()> {
        let info = Arc::clone(&self.info);
        let cursor = match self.result_set_type {
            ResultSetType::ForwardOnly => CursorType::ForwardOnly,
            ResultSetType::ScrollInsensitive => {
                if !info.supports_static() {
                    return Err(OdbcError::UnsupportedFeature(
                        "Scroll-insensitive result sets need a static cursor".to_string(),
                    ));
                }
                CursorType::Static
            }
            ResultSetType::ScrollSensitive => {
                if !info.supports_scroll_sensitive() {
                    return Err(OdbcError::UnsupportedFeature(
                        "Scroll-sensitive result sets need a dynamic or keyset cursor".to_string(),
                    ));
                }
                info.scroll_sensitive_cursor()
            }
        };
        if cursor != CursorType::ForwardOnly {
            self.set_attribute(StatementAttribute::CursorType(cursor), "Error setting cursor type")?;
        }

        match self.concurrency {
            ResultSetConcurrency::ReadOnly => {
                if cursor != CursorType::ForwardOnly {
                    if !info.supports_read_only(cursor) {
                        return Err(OdbcError::UnsupportedFeature(
                            "Read-only concurrency is not supported for this cursor type".to_string(),
                        ));
                    }
                    self.set_attribute(
                        StatementAttribute::Concurrency(Concurrency::ReadOnly),
                        "Error setting concurrency",
                    )?;
                }
            }
            ResultSetConcurrency::Updatable => {
                if !info.supports_updatable(cursor) {
                    return Err(OdbcError::UnsupportedFeature(
                        "Updatable result sets are not supported for this cursor type".to_string(),
                    ));
                }
                let concurrency = info.updatable_concurrency(cursor);
                self.set_attribute(
                    StatementAttribute::Concurrency(concurrency),
                    "Error setting concurrency",
                )?;
            }
        }
        Ok(())
    }

    /// Clears warnings and closes a cursor left over from the previous
    /// execution. Fails while a result set is still open.
    pub(crate) fn before_execute(&mut self) -> Result<()> {
        self.errors.clear_warnings();
        if self.result_set_open {
            return Err(OdbcError::OpenResultSetExists);
        }
        if self.cursor_open {
            let result = self.proto.close_cursor();
            self.check(result, "Error closing cursor")?;
            self.cursor_open = false;
        }
        Ok(())
    }

    pub(crate) fn after_execute(&mut self, outcome: ExecOutcome) {
        self.cursor_open = true;
        self.last_no_data = outcome == ExecOutcome::NoData;
    }

    /// Whether the last execution left result columns to fetch.
    pub(crate) fn has_results(&mut self) -> bool {
        match self.proto.num_result_cols() {
            Ok(columns) => self
                .check(Ok(columns), "Error counting result columns")
                .is_ok_and(|columns| columns > 0),
            Err(_) => {
                for record in self.proto.diagnostics() {
                    log::debug!("Result column count unavailable: {}", record);
                }
                false
            }
        }
    }

    pub(crate) fn log_execute(&self, sql: &str, outcome: ExecOutcome, params: usize) {
        let mut metadata = HashMap::new();
        let outcome = match outcome {
            ExecOutcome::Success => "success",
            ExecOutcome::NeedData => "need_data",
            ExecOutcome::NoData => "no_data",
        };
        metadata.insert("outcome".to_string(), outcome.to_string());
        if params > 0 {
            metadata.insert("params".to_string(), params.to_string());
        }
        self.logger.log_execute(Level::Debug, sql, &metadata);
    }
}

/// Statement executing SQL text directly.
///
/// Only one result set can be open at a time; executing again while one is
/// open fails with `OpenResultSetExists`.
pub struct Statement {
    pub(crate) core: SharedCore,
    canceller: Arc<dyn Canceller>,
    errors: Arc<ErrorHandler>,
    registration: Registration,
    result_set_type: ResultSetType,
    concurrency: ResultSetConcurrency,
    query_timeout: u32,
    max_rows: u64,
    max_field_size: u64,
    closed: bool,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("result_set_type", &self.result_set_type)
            .field("concurrency", &self.concurrency)
            .field("query_timeout", &self.query_timeout)
            .field("max_rows", &self.max_rows)
            .field("max_field_size", &self.max_field_size)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Statement {
    pub(crate) fn new(
        proto: Box<dyn StatementProtocol>,
        info: Arc<DriverInfo>,
        config: EngineConfig,
        registration: Registration,
        result_set_type: ResultSetType,
        concurrency: ResultSetConcurrency,
    ) -> Result<Self> {
        let logger = StructuredLogger::new(config.logging_enabled);
        let errors = Arc::new(ErrorHandler::new(
            config.collect_warnings,
            config.max_warnings,
            logger,
        ));
        let canceller = proto.canceller();
        let mut core = StatementCore {
            proto,
            errors: Arc::clone(&errors),
            logger,
            fetch_size: config.fetch_size.max(1),
            config,
            info,
            result_set_type,
            concurrency,
            result_set_open: false,
            cursor_open: false,
            last_no_data: false,
        };
        core.apply_result_set_type()?;
        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            canceller,
            errors,
            registration,
            result_set_type,
            concurrency,
            query_timeout: 0,
            max_rows: 0,
            max_field_size: 0,
            closed: false,
        })
    }

    pub(crate) fn registration(&self) -> &Registration {
        &self.registration
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(OdbcError::InvalidCursorState("Statement is closed"));
        }
        Ok(())
    }

    pub fn result_set_type(&self) -> ResultSetType {
        self.result_set_type
    }

    pub fn result_set_concurrency(&self) -> ResultSetConcurrency {
        self.concurrency
    }

    /// Executes `sql`; returns true when it produced a result set.
    pub fn execute(&mut self, sql: &str) -> Result<bool> {
        self.ensure_open()?;
        let shared = Arc::clone(&self.core);
        let mut core = lock_core(&shared)?;
        core.before_execute()?;
        self.registration.describe(sql);

        let result = core.proto.exec_direct(sql, &mut []);
        let outcome = core.check(result, &format!("Error executing \"{}\"", sql))?;
        core.after_execute(outcome);
        core.log_execute(sql, outcome, 0);
        Ok(core.has_results())
    }

    pub fn execute_query(&mut self, sql: &str) -> Result<ResultSet> {
        if !self.execute(sql)? {
            return Err(OdbcError::NoResultSet);
        }
        ResultSet::open(Arc::clone(&self.core))
    }

    pub fn execute_update(&mut self, sql: &str) -> Result<i64> {
        self.execute(sql)?;
        self.update_count()
    }

    /// The pending result set of the last execution, if any.
    pub fn result_set(&mut self) -> Result<Option<ResultSet>> {
        self.ensure_open()?;
        let pending = {
            let mut core = lock_core(&self.core)?;
            core.cursor_open && !core.result_set_open && core.has_results()
        };
        if !pending {
            return Ok(None);
        }
        ResultSet::open(Arc::clone(&self.core)).map(Some)
    }

    /// Rows affected by the last execution; -1 when it returned no count.
    pub fn update_count(&self) -> Result<i64> {
        let mut core = lock_core(&self.core)?;
        if core.last_no_data {
            return Ok(-1);
        }
        let result = core.proto.row_count();
        core.check(result, "Error fetching update count")
    }

    /// Moves to the next result of a batch. Returns false once there are no
    /// more results or the driver cannot report them.
    pub fn more_results(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let mut core = lock_core(&self.core)?;
        if !core.info.functions.more_results {
            return Ok(false);
        }
        if core.result_set_open {
            return Err(OdbcError::OpenResultSetExists);
        }
        let result = core.proto.more_results();
        let more = core.check(result, "Error fetching more results")?;
        core.last_no_data = !more;
        Ok(more)
    }

    pub fn fetch_size(&self) -> Result<usize> {
        Ok(lock_core(&self.core)?.fetch_size)
    }

    /// Rows per fetch for result sets opened afterwards; 0 means 1.
    pub fn set_fetch_size(&mut self, rows: i64) -> Result<()> {
        if rows < 0 {
            return Err(OdbcError::InvalidFetchSize(rows));
        }
        lock_core(&self.core)?.fetch_size = (rows as usize).max(1);
        Ok(())
    }

    fn set_attribute(&mut self, attribute: StatementAttribute, what: &str) -> Result<()> {
        self.ensure_open()?;
        let mut core = lock_core(&self.core)?;
        core.set_attribute(attribute, what)
    }

    pub fn query_timeout(&self) -> u32 {
        self.query_timeout
    }

    /// Seconds a statement may run; 0 disables the limit.
    pub fn set_query_timeout(&mut self, seconds: u32) -> Result<()> {
        self.set_attribute(
            StatementAttribute::QueryTimeout(seconds),
            "Error setting query timeout",
        )?;
        self.query_timeout = seconds;
        Ok(())
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    pub fn set_max_rows(&mut self, rows: u64) -> Result<()> {
        self.set_attribute(StatementAttribute::MaxRows(rows), "Error setting max rows")?;
        self.max_rows = rows;
        Ok(())
    }

    pub fn max_field_size(&self) -> u64 {
        self.max_field_size
    }

    pub fn set_max_field_size(&mut self, bytes: u64) -> Result<()> {
        self.set_attribute(
            StatementAttribute::MaxFieldSize(bytes),
            "Error setting max field size",
        )?;
        self.max_field_size = bytes;
        Ok(())
    }

    pub fn set_escape_processing(&mut self, on: bool) -> Result<()> {
        self.set_attribute(
            StatementAttribute::EscapeProcessing(on),
            "Error setting escape processing",
        )
    }

    pub fn set_cursor_name(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let mut core = lock_core(&self.core)?;
        let result = core.proto.set_cursor_name(name);
        core.check(result, "Error setting cursor name")
    }

    pub fn cursor_name(&self) -> Result<String> {
        let mut core = lock_core(&self.core)?;
        let result = core.proto.cursor_name();
        core.check(result, "Error fetching cursor name")
    }

    /// Requests cancellation of the running call. Safe to call from any
    /// thread; see also [`Statement::canceller`].
    pub fn cancel(&self) -> Result<()> {
        let result = self.canceller.cancel();
        self.errors.check_detached(result, "Error canceling statement")
    }

    /// Handle that cancels this statement from another thread.
    pub fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::clone(&self.canceller)
    }

    /// Hands over the warnings collected since the last execution.
    pub fn take_warnings(&self) -> Vec<SqlWarning> {
        self.errors.take_warnings()
    }

    pub fn clear_warnings(&self) {
        self.errors.clear_warnings();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the cursor and removes the statement from its connection's
    /// registry. A result set still open keeps its cursor until it is
    /// closed itself.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        {
            let mut core = lock_core(&self.core)?;
            if core.cursor_open && !core.result_set_open {
                let result = core.proto.close_cursor();
                core.check(result, "Error closing cursor")?;
                core.cursor_open = false;
            }
        }
        self.registration.release();
        self.closed = true;
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("Closing statement on drop failed: {}", e);
        }
    }
}
