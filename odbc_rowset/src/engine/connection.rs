use super::callable_statement::CallableStatement;
use super::config::EngineConfig;
use super::prepared_statement::PreparedStatement;
use super::statement::{ResultSetConcurrency, ResultSetType, Statement};
use super::transaction::{IsolationLevel, Transaction};
use super::warnings::{ErrorHandler, SqlWarning};
use crate::driver::{ConnectionProtocol, DriverInfo, ParamDirection};
use crate::error::{OdbcError, Result};
use crate::observability::StructuredLogger;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

const SUMMARY_LEN: usize = 80;

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    live: HashMap<u64, String>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock_registry(registry: &SharedRegistry) -> Result<MutexGuard<'_, Registry>> {
    registry
        .lock()
        .map_err(|_| OdbcError::InternalError("Failed to lock statement registry mutex".to_string()))
}

fn summarize(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SUMMARY_LEN) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

/// A statement's entry in its connection's registry; removed on release or
/// drop.
#[derive(Debug)]
pub(crate) struct Registration {
    registry: SharedRegistry,
    id: u64,
    released: bool,
}

impl Registration {
    fn new(registry: &SharedRegistry, sql: &str) -> Result<Self> {
        let mut guard = lock_registry(registry)?;
        guard.next_id += 1;
        let id = guard.next_id;
        guard.live.insert(id, summarize(sql));
        Ok(Self {
            registry: Arc::clone(registry),
            id,
            released: false,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Records the SQL the statement runs now.
    pub(crate) fn describe(&self, sql: &str) {
        if self.released {
            return;
        }
        if let Ok(mut guard) = self.registry.lock() {
            guard.live.insert(self.id, summarize(sql));
        }
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.registry.lock() {
            Ok(mut guard) => {
                guard.live.remove(&self.id);
            }
            Err(_) => log::debug!("Statement registry poisoned; entry {} kept", self.id),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release();
    }
}

/// Connection to a data source and the factory for its statements.
///
/// Statements created here inherit the connection's [`EngineConfig`] and
/// capability table, and stay listed in its registry until closed or
/// dropped.
pub struct Connection {
    protocol: Mutex<Box<dyn ConnectionProtocol>>,
    info: Arc<DriverInfo>,
    config: EngineConfig,
    registry: SharedRegistry,
    errors: ErrorHandler,
    closed: Mutex<bool>,
}

impl Connection {
    /// Wraps an established driver connection with the configuration
    /// resolved from the environment.
    pub fn new(protocol: Box<dyn ConnectionProtocol>) -> Result<Self> {
        Self::with_config(protocol, EngineConfig::from_env())
    }

    pub fn with_config(mut protocol: Box<dyn ConnectionProtocol>, config: EngineConfig) -> Result<Self> {
        let logger = StructuredLogger::new(config.logging_enabled);
        let errors = ErrorHandler::new(config.collect_warnings, config.max_warnings, logger);
        let result = protocol.driver_info();
        let info = errors.check(protocol.as_mut(), result, "Error reading driver information")?;
        log::debug!(
            "Connected through {} {} (ODBC {}.{})",
            info.driver_name,
            info.driver_version,
            info.major_version,
            info.minor_version
        );
        Ok(Self {
            protocol: Mutex::new(protocol),
            info: Arc::new(info),
            config,
            registry: Arc::new(Mutex::new(Registry::default())),
            errors,
            closed: Mutex::new(false),
        })
    }

    fn lock_protocol(&self) -> Result<MutexGuard<'_, Box<dyn ConnectionProtocol>>> {
        self.protocol
            .lock()
            .map_err(|_| OdbcError::InternalError("Failed to lock connection mutex".to_string()))
    }

    fn ensure_open(&self) -> Result<()> {
        let closed = self
            .closed
            .lock()
            .map_err(|_| OdbcError::InternalError("Failed to lock connection mutex".to_string()))?;
        if *closed {
            return Err(OdbcError::Structured {
                sqlstate: *b"08003",
                native_code: 0,
                message: "Connection is closed".to_string(),
            });
        }
        Ok(())
    }

    pub fn driver_info(&self) -> &DriverInfo {
        &self.info
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn new_statement(
        &self,
        sql: &str,
        result_set_type: ResultSetType,
        concurrency: ResultSetConcurrency,
    ) -> Result<Statement> {
        self.ensure_open()?;
        let proto = {
            let mut protocol = self.lock_protocol()?;
            let result = protocol.allocate_statement();
            self.errors
                .check(protocol.as_mut(), result, "Error allocating statement")?
        };
        let registration = Registration::new(&self.registry, sql)?;
        log::trace!("Statement {} allocated", registration.id());
        Statement::new(
            proto,
            Arc::clone(&self.info),
            self.config.clone(),
            registration,
            result_set_type,
            concurrency,
        )
    }

    pub fn create_statement(&self) -> Result<Statement> {
        self.create_statement_with(ResultSetType::ForwardOnly, ResultSetConcurrency::ReadOnly)
    }

    pub fn create_statement_with(
        &self,
        result_set_type: ResultSetType,
        concurrency: ResultSetConcurrency,
    ) -> Result<Statement> {
        self.new_statement("", result_set_type, concurrency)
    }

    pub fn prepare_statement(&self, sql: &str) -> Result<PreparedStatement> {
        self.prepare_statement_with(sql, ResultSetType::ForwardOnly, ResultSetConcurrency::ReadOnly)
    }

    pub fn prepare_statement_with(
        &self,
        sql: &str,
        result_set_type: ResultSetType,
        concurrency: ResultSetConcurrency,
    ) -> Result<PreparedStatement> {
        let statement = self.new_statement(sql, result_set_type, concurrency)?;
        PreparedStatement::new(statement, sql, ParamDirection::In)
    }

    pub fn prepare_call(&self, sql: &str) -> Result<CallableStatement> {
        let statement =
            self.new_statement(sql, ResultSetType::ForwardOnly, ResultSetConcurrency::ReadOnly)?;
        CallableStatement::new(statement, sql)
    }

    /// Number of statements created here and not yet closed or dropped.
    pub fn open_statement_count(&self) -> usize {
        self.registry.lock().map(|r| r.live.len()).unwrap_or(0)
    }

    /// SQL summaries of the live statements, oldest first.
    pub fn open_statements(&self) -> Vec<String> {
        let Ok(registry) = self.registry.lock() else {
            return Vec::new();
        };
        let mut live: Vec<_> = registry.live.iter().collect();
        live.sort_by_key(|(id, _)| **id);
        live.into_iter().map(|(_, sql)| sql.clone()).collect()
    }

    pub fn auto_commit(&self) -> Result<bool> {
        self.ensure_open()?;
        let mut protocol = self.lock_protocol()?;
        let result = protocol.auto_commit();
        self.errors
            .check(protocol.as_mut(), result, "Error reading auto-commit mode")
    }

    pub fn set_auto_commit(&self, on: bool) -> Result<()> {
        self.ensure_open()?;
        let mut protocol = self.lock_protocol()?;
        let result = protocol.set_auto_commit(on);
        self.errors
            .check(protocol.as_mut(), result, "Error setting auto-commit mode")
    }

    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let mut protocol = self.lock_protocol()?;
        let result = protocol.commit();
        self.errors.check(protocol.as_mut(), result, "Error committing")
    }

    pub fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        let mut protocol = self.lock_protocol()?;
        let result = protocol.rollback();
        self.errors.check(protocol.as_mut(), result, "Error rolling back")
    }

    pub fn transaction_isolation(&self) -> Result<IsolationLevel> {
        self.ensure_open()?;
        let mut protocol = self.lock_protocol()?;
        let result = protocol.isolation();
        self.errors
            .check(protocol.as_mut(), result, "Error reading transaction isolation")
    }

    pub fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        let mut protocol = self.lock_protocol()?;
        let result = protocol.set_isolation(level);
        self.errors
            .check(protocol.as_mut(), result, "Error setting transaction isolation")
    }

    /// Starts a manual-commit scope; see [`Transaction`].
    pub fn begin_transaction(&self, isolation: Option<IsolationLevel>) -> Result<Transaction<'_>> {
        Transaction::begin(self, isolation)
    }

    pub fn with_transaction<F, T>(&self, isolation: Option<IsolationLevel>, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        Transaction::execute(self, isolation, f)
    }

    pub fn take_warnings(&self) -> Vec<SqlWarning> {
        self.errors.take_warnings()
    }

    pub fn clear_warnings(&self) {
        self.errors.clear_warnings();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(true)
    }

    /// Disconnects. Statements still alive fail on their next driver call.
    pub fn close(&self) -> Result<()> {
        let mut closed = self
            .closed
            .lock()
            .map_err(|_| OdbcError::InternalError("Failed to lock connection mutex".to_string()))?;
        if *closed {
            return Ok(());
        }
        let open = self.open_statement_count();
        if open > 0 {
            log::debug!("Closing connection with {} open statements", open);
        }
        let mut protocol = self.lock_protocol()?;
        let result = protocol.disconnect();
        self.errors
            .check(protocol.as_mut(), result, "Error disconnecting")?;
        *closed = true;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("Disconnect on drop failed: {}", e);
        }
    }
}
