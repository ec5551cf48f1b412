use super::value::{read_cell, write_cell, Value};
use crate::driver::{
    BindTarget, CallFailed, CallResult, Canceller, ColumnBinding, ColumnDescription, Concurrency,
    ConnectionProtocol, CursorType, DataToken, Diagnostic, DiagnosticSource, DriverInfo,
    ExecOutcome, FetchDirection, FetchOutcome, GetData, Nullability, ParamBinding,
    ParamDescription, ParamDirection, PositionOp, StatementAttribute, StatementProtocol,
};
use crate::engine::transaction::IsolationLevel;
use crate::protocol::{pending_length, BufferView, NativeKind, RowStatus, SqlType, NULL_DATA};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One stored row and the status a cursor reports for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub values: Vec<Value>,
    pub status: RowStatus,
}

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<ColumnDescription>,
    rows: Vec<MemoryRow>,
}

/// What executing a scripted statement does.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Opens a cursor over the named table.
    Rows(String),
    /// Reports an update count.
    Count(i64),
    /// Appends the parameter values as a new row of the named table.
    Insert(String),
    /// Writes values into output parameters (1-based index).
    Call(Vec<(usize, Value)>),
    Fail(Diagnostic),
}

#[derive(Debug, Default)]
struct Script {
    outcomes: Vec<Outcome>,
    params: Option<Vec<ParamDescription>>,
    warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
enum Injection {
    Fail(Diagnostic),
    Warn(Diagnostic),
}

#[derive(Debug)]
struct Database {
    tables: HashMap<String, Table>,
    snapshot: Option<HashMap<String, Table>>,
    scripts: HashMap<String, Script>,
    injections: Vec<(String, Injection)>,
    calls: Vec<String>,
    put_chunks: Vec<usize>,
    info: DriverInfo,
    max_row_array_size: usize,
    report_row_number: bool,
    commits: usize,
    rollbacks: usize,
    cancels: Arc<AtomicUsize>,
    next_cursor: usize,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            snapshot: None,
            scripts: HashMap::new(),
            injections: Vec::new(),
            calls: Vec::new(),
            put_chunks: Vec::new(),
            info: DriverInfo::default(),
            max_row_array_size: usize::MAX,
            report_row_number: true,
            commits: 0,
            rollbacks: 0,
            cancels: Arc::new(AtomicUsize::new(0)),
            next_cursor: 1,
        }
    }
}

type SharedDatabase = Arc<Mutex<Database>>;

fn lock(db: &SharedDatabase) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted in-memory data source implementing the driver protocol.
///
/// Statements are matched by their exact SQL text against scripts registered
/// up front; cursors scroll over named tables following the ODBC
/// `SQLFetchScroll` positioning rules.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    db: SharedDatabase,
}

/// Column description shorthand for table definitions.
pub fn column(name: &str, sql_type: SqlType, precision: usize, scale: i16) -> ColumnDescription {
    let mut desc = ColumnDescription::new(name, sql_type, precision, scale);
    desc.nullable = Nullability::Nullable;
    desc
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver_info(info: DriverInfo) -> Self {
        let driver = Self::default();
        lock(&driver.db).info = info;
        driver
    }

    pub fn set_driver_info(&self, info: DriverInfo) {
        lock(&self.db).info = info;
    }

    /// Caps the rowset size the driver accepts.
    pub fn set_max_row_array_size(&self, rows: usize) {
        lock(&self.db).max_row_array_size = rows.max(1);
    }

    /// When false, the current row number is reported as 0 (unknown).
    pub fn set_report_row_number(&self, report: bool) {
        lock(&self.db).report_row_number = report;
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnDescription>) {
        lock(&self.db).tables.insert(
            name.to_string(),
            Table {
                columns,
                rows: Vec::new(),
            },
        );
    }

    pub fn insert_rows(&self, table: &str, rows: Vec<Vec<Value>>) {
        let mut db = lock(&self.db);
        let table = db.tables.entry(table.to_string()).or_default();
        table.rows.extend(rows.into_iter().map(|values| MemoryRow {
            values,
            status: RowStatus::Success,
        }));
    }

    pub fn rows(&self, table: &str) -> Vec<MemoryRow> {
        lock(&self.db)
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn script(&self, sql: &str, outcomes: Vec<Outcome>) {
        lock(&self.db)
            .scripts
            .entry(sql.to_string())
            .or_default()
            .outcomes = outcomes;
    }

    pub fn script_query(&self, sql: &str, table: &str) {
        self.script(sql, vec![Outcome::Rows(table.to_string())]);
    }

    pub fn script_update(&self, sql: &str, count: i64) {
        self.script(sql, vec![Outcome::Count(count)]);
    }

    pub fn script_insert(&self, sql: &str, table: &str) {
        self.script(sql, vec![Outcome::Insert(table.to_string())]);
    }

    pub fn script_call(&self, sql: &str, outputs: Vec<(usize, Value)>) {
        self.script(sql, vec![Outcome::Call(outputs)]);
    }

    pub fn script_error(&self, sql: &str, diagnostic: Diagnostic) {
        self.script(sql, vec![Outcome::Fail(diagnostic)]);
    }

    /// Several results for one statement, walked with `more_results`.
    pub fn script_results(&self, sql: &str, outcomes: Vec<Outcome>) {
        self.script(sql, outcomes);
    }

    pub fn script_params(&self, sql: &str, params: Vec<ParamDescription>) {
        lock(&self.db)
            .scripts
            .entry(sql.to_string())
            .or_default()
            .params = Some(params);
    }

    pub fn script_warning(&self, sql: &str, diagnostic: Diagnostic) {
        lock(&self.db)
            .scripts
            .entry(sql.to_string())
            .or_default()
            .warnings
            .push(diagnostic);
    }

    /// Makes the next call named `call` (e.g. `"fetch"`) fail.
    pub fn fail_next(&self, call: &str, diagnostic: Diagnostic) {
        lock(&self.db)
            .injections
            .push((call.to_string(), Injection::Fail(diagnostic)));
    }

    /// Makes the next call named `call` succeed with a warning.
    pub fn warn_next(&self, call: &str, diagnostic: Diagnostic) {
        lock(&self.db)
            .injections
            .push((call.to_string(), Injection::Warn(diagnostic)));
    }

    /// Names of the statement calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.db).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.db).calls.clear();
    }

    pub fn call_count(&self, call: &str) -> usize {
        lock(&self.db).calls.iter().filter(|c| *c == call).count()
    }

    /// Length of every `put_data` chunk received.
    pub fn put_chunks(&self) -> Vec<usize> {
        lock(&self.db).put_chunks.clone()
    }

    pub fn cancel_count(&self) -> usize {
        lock(&self.db).cancels.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        lock(&self.db).commits
    }

    pub fn rollback_count(&self) -> usize {
        lock(&self.db).rollbacks
    }

    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            db: Arc::clone(&self.db),
            diagnostics: Vec::new(),
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            connected: true,
        }
    }
}

fn enter(db: &SharedDatabase, diagnostics: &mut Vec<Diagnostic>, call: &str) -> CallResult<()> {
    let mut db = lock(db);
    db.calls.push(call.to_string());
    if let Some(pos) = db.injections.iter().position(|(name, _)| name == call) {
        let (_, injection) = db.injections.remove(pos);
        match injection {
            Injection::Fail(d) => {
                diagnostics.push(d);
                return Err(CallFailed);
            }
            Injection::Warn(d) => diagnostics.push(d),
        }
    }
    Ok(())
}

pub struct MemoryConnection {
    db: SharedDatabase,
    diagnostics: Vec<Diagnostic>,
    auto_commit: bool,
    isolation: IsolationLevel,
    connected: bool,
}

impl MemoryConnection {
    fn enter(&mut self, call: &str) -> CallResult<()> {
        if !self.connected {
            self.diagnostics
                .push(Diagnostic::new("08003", 0, "Connection not open"));
            return Err(CallFailed);
        }
        enter(&self.db, &mut self.diagnostics, call)
    }
}

impl DiagnosticSource for MemoryConnection {
    fn diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl ConnectionProtocol for MemoryConnection {
    fn allocate_statement(&mut self) -> CallResult<Box<dyn StatementProtocol>> {
        self.enter("allocate_statement")?;
        let (cursor_id, cancels) = {
            let mut db = lock(&self.db);
            let id = db.next_cursor;
            db.next_cursor += 1;
            (id, Arc::clone(&db.cancels))
        };
        Ok(Box::new(MemoryStatement::new(
            Arc::clone(&self.db),
            cursor_id,
            cancels,
        )))
    }

    fn driver_info(&mut self) -> CallResult<DriverInfo> {
        self.enter("driver_info")?;
        Ok(lock(&self.db).info.clone())
    }

    fn set_auto_commit(&mut self, on: bool) -> CallResult<()> {
        self.enter("set_auto_commit")?;
        let mut db = lock(&self.db);
        if on {
            db.snapshot = None;
        } else if self.auto_commit {
            db.snapshot = Some(db.tables.clone());
        }
        self.auto_commit = on;
        Ok(())
    }

    fn auto_commit(&mut self) -> CallResult<bool> {
        self.enter("auto_commit")?;
        Ok(self.auto_commit)
    }

    fn commit(&mut self) -> CallResult<()> {
        self.enter("commit")?;
        let mut db = lock(&self.db);
        db.commits += 1;
        if !self.auto_commit {
            db.snapshot = Some(db.tables.clone());
        }
        Ok(())
    }

    fn rollback(&mut self) -> CallResult<()> {
        self.enter("rollback")?;
        let mut db = lock(&self.db);
        db.rollbacks += 1;
        if let Some(snapshot) = db.snapshot.clone() {
            db.tables = snapshot;
        }
        Ok(())
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> CallResult<()> {
        self.enter("set_isolation")?;
        self.isolation = level;
        Ok(())
    }

    fn isolation(&mut self) -> CallResult<IsolationLevel> {
        self.enter("isolation")?;
        Ok(self.isolation)
    }

    fn disconnect(&mut self) -> CallResult<()> {
        self.enter("disconnect")?;
        self.connected = false;
        Ok(())
    }
}

struct MemoryCanceller {
    requested: AtomicBool,
    cancels: Arc<AtomicUsize>,
}

impl Canceller for MemoryCanceller {
    fn cancel(&self) -> CallResult<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct OpenCursor {
    table: String,
    columns: Vec<ColumnDescription>,
    /// First row of the rowset (1-based); 0 before the start, `len + 1`
    /// after the end.
    start: i64,
    fetched: usize,
    /// Rowset size of the previous fetch; NEXT advances by it.
    last_size: usize,
    /// Row of the rowset `get_data` and `set_pos` refer to.
    row: usize,
    get_data: Option<(usize, usize)>,
}

enum PendingOp {
    Execute(Outcome),
    Update { row: usize },
    Add,
}

struct DataAtExec {
    op: PendingOp,
    values: Vec<Value>,
    natives: HashMap<usize, NativeKind>,
    tokens: VecDeque<usize>,
    current: Option<usize>,
    buffer: Vec<u8>,
}

enum Landing {
    Row(i64),
    BeforeStart,
    AfterEnd,
}

fn land(row: i64, len: i64) -> Landing {
    if row < 1 {
        Landing::BeforeStart
    } else if row > len {
        Landing::AfterEnd
    } else {
        Landing::Row(row)
    }
}

fn scroll(start: i64, len: i64, size: i64, direction: FetchDirection) -> Landing {
    match direction {
        FetchDirection::Next => {
            if start <= 0 {
                land(1, len)
            } else if start > len {
                Landing::AfterEnd
            } else {
                land(start + size, len)
            }
        }
        FetchDirection::Prior => {
            if start <= 1 {
                Landing::BeforeStart
            } else if start > len {
                land((len - size + 1).max(1), len)
            } else {
                land((start - size).max(1), len)
            }
        }
        FetchDirection::First => {
            if len == 0 {
                Landing::BeforeStart
            } else {
                Landing::Row(1)
            }
        }
        FetchDirection::Last => {
            if len == 0 {
                Landing::AfterEnd
            } else {
                Landing::Row((len - size + 1).max(1))
            }
        }
        FetchDirection::Absolute(k) => {
            if k < 0 {
                if -k <= len {
                    Landing::Row(len + k + 1)
                } else {
                    Landing::BeforeStart
                }
            } else if k == 0 {
                Landing::BeforeStart
            } else {
                land(k, len)
            }
        }
        FetchDirection::Relative(k) => {
            if start <= 0 {
                if k > 0 {
                    land(k, len)
                } else {
                    Landing::BeforeStart
                }
            } else if start > len {
                if k < 0 {
                    scroll(0, len, size, FetchDirection::Absolute(k))
                } else {
                    Landing::AfterEnd
                }
            } else {
                let target = start + k;
                if target < 1 && start > 1 && -k <= size {
                    Landing::Row(1)
                } else {
                    land(target, len)
                }
            }
        }
    }
}

fn is_pending(status: i64) -> bool {
    status != NULL_DATA && pending_length(status).is_some()
}

pub struct MemoryStatement {
    db: SharedDatabase,
    diagnostics: Vec<Diagnostic>,
    sql: Option<String>,
    params: BTreeMap<usize, ParamBinding>,
    columns: BTreeMap<usize, ColumnBinding>,
    cursor: Option<OpenCursor>,
    more: VecDeque<Outcome>,
    row_count: i64,
    row_array_size: usize,
    cursor_type: CursorType,
    concurrency: Concurrency,
    cursor_name: String,
    pending: Option<DataAtExec>,
    canceller: Arc<MemoryCanceller>,
}

impl MemoryStatement {
    fn new(db: SharedDatabase, id: usize, cancels: Arc<AtomicUsize>) -> Self {
        Self {
            db,
            diagnostics: Vec::new(),
            sql: None,
            params: BTreeMap::new(),
            columns: BTreeMap::new(),
            cursor: None,
            more: VecDeque::new(),
            row_count: -1,
            row_array_size: 1,
            cursor_type: CursorType::ForwardOnly,
            concurrency: Concurrency::ReadOnly,
            cursor_name: format!("SQL_CUR{}", id),
            pending: None,
            canceller: Arc::new(MemoryCanceller {
                requested: AtomicBool::new(false),
                cancels,
            }),
        }
    }

    fn enter(&mut self, call: &str) -> CallResult<()> {
        enter(&self.db, &mut self.diagnostics, call)
    }

    fn fail<T>(&mut self, sqlstate: &str, message: &str) -> CallResult<T> {
        self.diagnostics.push(Diagnostic::new(sqlstate, 0, message));
        Err(CallFailed)
    }

    fn param_count(sql: &str) -> usize {
        sql.matches('?').count()
    }

    fn cursor_mut(&mut self) -> CallResult<&mut OpenCursor> {
        match self.cursor {
            Some(ref mut cursor) => Ok(cursor),
            None => {
                self.diagnostics
                    .push(Diagnostic::new("24000", 0, "Invalid cursor state"));
                Err(CallFailed)
            }
        }
    }

    fn start_execution(&mut self, params: &mut [BufferView<'_>]) -> CallResult<ExecOutcome> {
        let Some(sql) = self.sql.clone() else {
            return self.fail("HY010", "Function sequence error");
        };
        if self.canceller.requested.swap(false, Ordering::SeqCst) {
            log::debug!("memory driver: stale cancel request dropped");
        }
        self.cursor = None;
        self.row_count = -1;

        let (mut outcomes, warnings) = {
            let db = lock(&self.db);
            match db.scripts.get(&sql) {
                Some(script) => (
                    script.outcomes.iter().cloned().collect::<VecDeque<_>>(),
                    script.warnings.clone(),
                ),
                None => (VecDeque::new(), Vec::new()),
            }
        };
        let Some(first) = outcomes.pop_front() else {
            return self.fail("42000", &format!("Syntax error or access violation: {}", sql));
        };
        self.more = outcomes;

        let expected = Self::param_count(&sql);
        if (1..=expected).any(|i| !self.params.contains_key(&i)) {
            return self.fail("07002", "COUNT field incorrect");
        }

        let width = self.params.keys().next_back().copied().unwrap_or(0).max(expected);
        let mut values = vec![Value::Null; width];
        let mut natives = HashMap::new();
        let mut tokens = VecDeque::new();
        for (&index, binding) in &self.params {
            let Some(view) = params.get(index - 1) else {
                continue;
            };
            if let BindTarget::DataAtExec(DataToken(token)) = binding.target {
                if is_pending(view.status[0]) {
                    tokens.push_back(token);
                    natives.insert(token, binding.native);
                }
            }
            if binding.direction != ParamDirection::Out {
                values[index - 1] = read_cell(view, 0);
            }
        }
        self.diagnostics.extend(warnings);

        let pending = DataAtExec {
            op: PendingOp::Execute(first),
            values,
            natives,
            tokens,
            current: None,
            buffer: Vec::new(),
        };
        if pending.tokens.is_empty() {
            self.complete(pending, params)
        } else {
            self.pending = Some(pending);
            Ok(ExecOutcome::NeedData)
        }
    }

    fn open_result(&mut self, outcome: Outcome, params: &mut [BufferView<'_>], values: Vec<Value>) -> CallResult<ExecOutcome> {
        match outcome {
            Outcome::Rows(table) => {
                let columns = lock(&self.db).tables.get(&table).map(|t| t.columns.clone());
                let Some(columns) = columns else {
                    return self.fail("42S02", &format!("Base table or view not found: {}", table));
                };
                self.cursor = Some(OpenCursor {
                    table,
                    columns,
                    start: 0,
                    fetched: 0,
                    last_size: 0,
                    row: 0,
                    get_data: None,
                });
                self.row_count = -1;
                Ok(ExecOutcome::Success)
            }
            Outcome::Count(count) => {
                self.row_count = count;
                if count == 0 {
                    Ok(ExecOutcome::NoData)
                } else {
                    Ok(ExecOutcome::Success)
                }
            }
            Outcome::Insert(table) => {
                let mut db = lock(&self.db);
                let Some(target) = db.tables.get_mut(&table) else {
                    drop(db);
                    return self.fail("42S02", &format!("Base table or view not found: {}", table));
                };
                target.rows.push(MemoryRow {
                    values,
                    status: RowStatus::Success,
                });
                drop(db);
                self.row_count = 1;
                Ok(ExecOutcome::Success)
            }
            Outcome::Call(outputs) => {
                for (index, value) in outputs {
                    let writable = self
                        .params
                        .get(&index)
                        .is_some_and(|b| b.direction != ParamDirection::In);
                    if !writable {
                        continue;
                    }
                    if let Some(view) = params.get_mut(index - 1) {
                        if let Err(d) = write_cell(view, 0, &value) {
                            self.diagnostics.push(d);
                            return Err(CallFailed);
                        }
                    }
                }
                self.row_count = -1;
                Ok(ExecOutcome::Success)
            }
            Outcome::Fail(diagnostic) => {
                self.diagnostics.push(diagnostic);
                Err(CallFailed)
            }
        }
    }

    fn complete(&mut self, pending: DataAtExec, views: &mut [BufferView<'_>]) -> CallResult<ExecOutcome> {
        match pending.op {
            PendingOp::Execute(outcome) => self.open_result(outcome, views, pending.values),
            PendingOp::Update { row } => {
                let table = self.cursor_mut()?.table.clone();
                let mut db = lock(&self.db);
                if let Some(stored) = db.tables.get_mut(&table).and_then(|t| t.rows.get_mut(row)) {
                    for (i, value) in pending.values.into_iter().enumerate() {
                        if let Some(value) = value_if_bound(value) {
                            if let Some(slot) = stored.values.get_mut(i) {
                                *slot = value;
                            }
                        }
                    }
                    stored.status = RowStatus::Updated;
                }
                Ok(ExecOutcome::Success)
            }
            PendingOp::Add => {
                let table = self.cursor_mut()?.table.clone();
                let mut db = lock(&self.db);
                if let Some(target) = db.tables.get_mut(&table) {
                    let width = target.columns.len();
                    let mut values: Vec<Value> = pending
                        .values
                        .into_iter()
                        .map(|v| value_if_bound(v).unwrap_or(Value::Null))
                        .collect();
                    values.resize(width, Value::Null);
                    target.rows.push(MemoryRow {
                        values,
                        status: RowStatus::Added,
                    });
                }
                drop(db);
                self.row_count = 1;
                Ok(ExecOutcome::Success)
            }
        }
    }

    /// Values of the bound columns in rowset row `row`; unbound columns are
    /// carried as `Unbound`.
    fn collect_row(
        &self,
        views: &[BufferView<'_>],
        row: usize,
    ) -> (Vec<Value>, HashMap<usize, NativeKind>, VecDeque<usize>) {
        let mut values = Vec::with_capacity(views.len());
        let mut natives = HashMap::new();
        let mut tokens = VecDeque::new();
        for (i, view) in views.iter().enumerate() {
            let column = i + 1;
            match self.columns.get(&column) {
                Some(binding) => match binding.target {
                    BindTarget::DataAtExec(DataToken(token)) => {
                        if view.status.get(row).copied().is_some_and(is_pending) {
                            tokens.push_back(token);
                            natives.insert(token, binding.native);
                        }
                        values.push(unbound());
                    }
                    BindTarget::Buffer { .. } => {
                        if row < view.rows() {
                            values.push(read_cell(view, row));
                        } else {
                            values.push(unbound());
                        }
                    }
                },
                None => values.push(unbound()),
            }
        }
        (values, natives, tokens)
    }

    fn fill_rowset(
        &mut self,
        views: &mut [BufferView<'_>],
        row_status: &mut [RowStatus],
        from: usize,
        count: usize,
        at: usize,
    ) -> CallResult<()> {
        let Some(table) = self.cursor.as_ref().map(|c| c.table.clone()) else {
            return self.fail("24000", "Invalid cursor state");
        };
        let rows: Vec<MemoryRow> = {
            let db = lock(&self.db);
            db.tables
                .get(&table)
                .map(|t| t.rows.iter().skip(from).take(count).cloned().collect())
                .unwrap_or_default()
        };
        for (offset, stored) in rows.iter().enumerate() {
            let target = at + offset;
            for (&column, binding) in &self.columns {
                if !matches!(binding.target, BindTarget::Buffer { .. }) {
                    continue;
                }
                let Some(view) = views.get_mut(column - 1) else {
                    continue;
                };
                if target >= view.rows() {
                    continue;
                }
                let value = stored.values.get(column - 1).cloned().unwrap_or(Value::Null);
                match write_cell(view, target, &value) {
                    Ok(true) => self.diagnostics.push(Diagnostic::new(
                        "01004",
                        0,
                        "String data, right truncated",
                    )),
                    Ok(false) => {}
                    Err(d) => {
                        self.diagnostics.push(d);
                        return Err(CallFailed);
                    }
                }
            }
            if let Some(slot) = row_status.get_mut(target) {
                *slot = stored.status;
            }
        }
        Ok(())
    }
}

/// Marker for "column not bound, leave the stored value alone".
fn unbound() -> Value {
    Value::Bytes(UNBOUND_MARKER.to_vec())
}

const UNBOUND_MARKER: &[u8] = b"\0memory-driver-unbound\0";

fn value_if_bound(value: Value) -> Option<Value> {
    match value {
        Value::Bytes(ref b) if b.as_slice() == UNBOUND_MARKER => None,
        other => Some(other),
    }
}

impl DiagnosticSource for MemoryStatement {
    fn diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl StatementProtocol for MemoryStatement {
    fn prepare(&mut self, sql: &str) -> CallResult<()> {
        self.enter("prepare")?;
        let known = lock(&self.db).scripts.contains_key(sql);
        if !known {
            return self.fail("42000", &format!("Syntax error or access violation: {}", sql));
        }
        self.sql = Some(sql.to_string());
        Ok(())
    }

    fn exec_direct(&mut self, sql: &str, params: &mut [BufferView<'_>]) -> CallResult<ExecOutcome> {
        self.enter("exec_direct")?;
        self.sql = Some(sql.to_string());
        self.start_execution(params)
    }

    fn execute(&mut self, params: &mut [BufferView<'_>]) -> CallResult<ExecOutcome> {
        self.enter("execute")?;
        self.start_execution(params)
    }

    fn num_params(&mut self) -> CallResult<usize> {
        self.enter("num_params")?;
        let Some(sql) = self.sql.clone() else {
            return self.fail("HY010", "Function sequence error");
        };
        let scripted = lock(&self.db)
            .scripts
            .get(&sql)
            .and_then(|s| s.params.as_ref().map(Vec::len));
        Ok(scripted.unwrap_or_else(|| Self::param_count(&sql)))
    }

    fn describe_param(&mut self, index: usize) -> CallResult<ParamDescription> {
        self.enter("describe_param")?;
        let Some(sql) = self.sql.clone() else {
            return self.fail("HY010", "Function sequence error");
        };
        let scripted = lock(&self.db)
            .scripts
            .get(&sql)
            .and_then(|s| s.params.as_ref().and_then(|p| p.get(index - 1).copied()));
        match scripted {
            Some(desc) => Ok(desc),
            None if index >= 1 && index <= Self::param_count(&sql) => Ok(ParamDescription {
                sql_type: SqlType::VARCHAR,
                precision: 0,
                scale: 0,
                nullable: Nullability::Unknown,
            }),
            None => self.fail("07009", "Invalid descriptor index"),
        }
    }

    fn bind_param(&mut self, index: usize, binding: ParamBinding) -> CallResult<()> {
        self.enter("bind_param")?;
        if index == 0 {
            return self.fail("07009", "Invalid descriptor index");
        }
        self.params.insert(index, binding);
        Ok(())
    }

    fn reset_params(&mut self) -> CallResult<()> {
        self.enter("reset_params")?;
        self.params.clear();
        Ok(())
    }

    fn param_data(&mut self, params: &mut [BufferView<'_>]) -> CallResult<Option<DataToken>> {
        self.enter("param_data")?;
        if self.canceller.requested.swap(false, Ordering::SeqCst) {
            self.pending = None;
            return self.fail("HY008", "Operation canceled");
        }
        let Some(mut pending) = self.pending.take() else {
            return self.fail("HY010", "Function sequence error");
        };
        if let Some(token) = pending.current.take() {
            let bytes = std::mem::take(&mut pending.buffer);
            let value = match pending.natives.get(&token) {
                Some(NativeKind::Binary) => Value::Bytes(bytes),
                _ => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
            };
            if let Some(slot) = pending.values.get_mut(token - 1) {
                *slot = value;
            }
        }
        match pending.tokens.pop_front() {
            Some(token) => {
                pending.current = Some(token);
                self.pending = Some(pending);
                Ok(Some(DataToken(token)))
            }
            None => {
                self.complete(pending, params)?;
                Ok(None)
            }
        }
    }

    fn put_data(&mut self, chunk: &[u8]) -> CallResult<()> {
        self.enter("put_data")?;
        lock(&self.db).put_chunks.push(chunk.len());
        match self.pending.as_mut() {
            Some(pending) if pending.current.is_some() => {
                pending.buffer.extend_from_slice(chunk);
                Ok(())
            }
            _ => self.fail("HY010", "Function sequence error"),
        }
    }

    fn num_result_cols(&mut self) -> CallResult<usize> {
        self.enter("num_result_cols")?;
        Ok(self.cursor.as_ref().map(|c| c.columns.len()).unwrap_or(0))
    }

    fn describe_col(&mut self, column: usize) -> CallResult<ColumnDescription> {
        self.enter("describe_col")?;
        let desc = self
            .cursor
            .as_ref()
            .and_then(|c| column.checked_sub(1).and_then(|i| c.columns.get(i)).cloned());
        match desc {
            Some(desc) => Ok(desc),
            None => self.fail("07009", "Invalid descriptor index"),
        }
    }

    fn row_count(&mut self) -> CallResult<i64> {
        self.enter("row_count")?;
        Ok(self.row_count)
    }

    fn more_results(&mut self) -> CallResult<bool> {
        self.enter("more_results")?;
        self.cursor = None;
        match self.more.pop_front() {
            Some(outcome) => {
                let outcome = self.open_result(outcome, &mut [], Vec::new())?;
                Ok(outcome != ExecOutcome::NoData || self.row_count == 0)
            }
            None => Ok(false),
        }
    }

    fn set_row_array_size(&mut self, rows: usize) -> CallResult<usize> {
        self.enter("set_row_array_size")?;
        let max = lock(&self.db).max_row_array_size;
        self.row_array_size = rows.clamp(1, max);
        if self.row_array_size != rows {
            self.diagnostics
                .push(Diagnostic::new("01S02", 0, "Option value changed"));
        }
        Ok(self.row_array_size)
    }

    fn bind_col(&mut self, column: usize, binding: ColumnBinding) -> CallResult<()> {
        self.enter("bind_col")?;
        if column == 0 {
            return self.fail("07009", "Invalid descriptor index");
        }
        self.columns.insert(column, binding);
        Ok(())
    }

    fn unbind_col(&mut self, column: usize) -> CallResult<()> {
        self.enter("unbind_col")?;
        self.columns.remove(&column);
        Ok(())
    }

    fn unbind_cols(&mut self) -> CallResult<()> {
        self.enter("unbind_cols")?;
        self.columns.clear();
        Ok(())
    }

    fn fetch(
        &mut self,
        direction: FetchDirection,
        columns: &mut [BufferView<'_>],
        row_status: &mut [RowStatus],
    ) -> CallResult<FetchOutcome> {
        self.enter("fetch")?;
        let scrollable = self.cursor_type != CursorType::ForwardOnly;
        if !scrollable && direction != FetchDirection::Next {
            return self.fail("HY106", "Fetch type out of range");
        }
        let size = self.row_array_size;
        let db_len = {
            let table = self.cursor_mut()?.table.clone();
            lock(&self.db).tables.get(&table).map(|t| t.rows.len()).unwrap_or(0)
        };
        let len = db_len as i64;
        let cursor = self.cursor_mut()?;
        let step = match (direction, cursor.last_size) {
            (FetchDirection::Next, prev) if prev > 0 => prev,
            _ => size,
        };
        let landing = scroll(cursor.start, len, step as i64, direction);
        cursor.last_size = size;
        cursor.row = 0;
        cursor.get_data = None;
        match landing {
            Landing::Row(start) => {
                let fetched = ((len - start + 1) as usize).min(size);
                cursor.start = start;
                cursor.fetched = fetched;
                for slot in row_status.iter_mut().take(size) {
                    *slot = RowStatus::NoRow;
                }
                self.fill_rowset(columns, row_status, (start - 1) as usize, fetched, 0)?;
                Ok(FetchOutcome::Rows(fetched))
            }
            Landing::BeforeStart => {
                cursor.start = 0;
                cursor.fetched = 0;
                Ok(FetchOutcome::NoData)
            }
            Landing::AfterEnd => {
                cursor.start = len + 1;
                cursor.fetched = 0;
                Ok(FetchOutcome::NoData)
            }
        }
    }

    fn get_data(&mut self, column: usize, native: NativeKind, buf: &mut [u8]) -> CallResult<GetData> {
        self.enter("get_data")?;
        let cursor = self.cursor_mut()?;
        let on_row = cursor.fetched > 0 && cursor.row < cursor.fetched;
        let index = (cursor.start.max(1) - 1) as usize + cursor.row;
        let (table, state) = (cursor.table.clone(), cursor.get_data);
        if !on_row || column == 0 {
            return self.fail("24000", "Invalid cursor state");
        }
        let value = lock(&self.db)
            .tables
            .get(&table)
            .and_then(|t| t.rows.get(index))
            .and_then(|r| r.values.get(column - 1).cloned())
            .unwrap_or(Value::Null);

        let offset = match state {
            Some((c, offset)) if c == column => offset,
            _ => 0,
        };
        let Some(bytes) = value.stream_bytes(native) else {
            if state.is_some_and(|(c, _)| c == column) {
                return Ok(GetData::NoData);
            }
            self.cursor_mut()?.get_data = Some((column, 0));
            return Ok(GetData::Indicator(NULL_DATA));
        };
        if state.is_some_and(|(c, _)| c == column) && offset >= bytes.len() {
            return Ok(GetData::NoData);
        }
        let remaining = &bytes[offset.min(bytes.len())..];
        let room = match native {
            NativeKind::Char => buf.len().saturating_sub(1),
            _ => buf.len(),
        };
        let n = remaining.len().min(room);
        buf[..n].copy_from_slice(&remaining[..n]);
        if native == NativeKind::Char && n < buf.len() {
            buf[n] = 0;
        }
        self.cursor_mut()?.get_data = Some((column, offset + n.max(usize::from(remaining.is_empty()))));
        Ok(GetData::Indicator(remaining.len() as i64))
    }

    fn set_pos(
        &mut self,
        row: usize,
        op: PositionOp,
        columns: &mut [BufferView<'_>],
        row_status: &mut [RowStatus],
    ) -> CallResult<ExecOutcome> {
        self.enter("set_pos")?;
        let (start, fetched) = {
            let cursor = self.cursor_mut()?;
            (cursor.start, cursor.fetched)
        };
        let limit = if op == PositionOp::Add {
            columns.first().map(|v| v.rows()).unwrap_or(0)
        } else {
            fetched
        };
        if row == 0 || row > limit {
            return self.fail("HY107", "Row value out of range");
        }
        if matches!(op, PositionOp::Update | PositionOp::Delete | PositionOp::Add)
            && self.concurrency == Concurrency::ReadOnly
        {
            return self.fail("HY092", "Cursor is read-only");
        }
        let table_row = (start.max(1) - 1) as usize + row - 1;
        match op {
            PositionOp::Position => {
                let cursor = self.cursor_mut()?;
                cursor.row = row - 1;
                cursor.get_data = None;
                Ok(ExecOutcome::Success)
            }
            PositionOp::Refresh => {
                {
                    let cursor = self.cursor_mut()?;
                    cursor.row = row - 1;
                    cursor.get_data = None;
                }
                self.fill_rowset(columns, row_status, table_row, 1, row - 1)?;
                Ok(ExecOutcome::Success)
            }
            PositionOp::Delete => {
                let table = self.cursor_mut()?.table.clone();
                if let Some(stored) = lock(&self.db)
                    .tables
                    .get_mut(&table)
                    .and_then(|t| t.rows.get_mut(table_row))
                {
                    stored.status = RowStatus::Deleted;
                }
                if let Some(slot) = row_status.get_mut(row - 1) {
                    *slot = RowStatus::Deleted;
                }
                Ok(ExecOutcome::Success)
            }
            PositionOp::Update | PositionOp::Add => {
                let (values, natives, tokens) = self.collect_row(columns, row - 1);
                let pending = DataAtExec {
                    op: if op == PositionOp::Update {
                        PendingOp::Update { row: table_row }
                    } else {
                        PendingOp::Add
                    },
                    values,
                    natives,
                    tokens,
                    current: None,
                    buffer: Vec::new(),
                };
                if op == PositionOp::Update {
                    if let Some(slot) = row_status.get_mut(row - 1) {
                        *slot = RowStatus::Updated;
                    }
                }
                if pending.tokens.is_empty() {
                    self.complete(pending, columns)
                } else {
                    self.pending = Some(pending);
                    Ok(ExecOutcome::NeedData)
                }
            }
        }
    }

    fn bulk_add(&mut self, columns: &mut [BufferView<'_>]) -> CallResult<ExecOutcome> {
        self.enter("bulk_add")?;
        let supported = lock(&self.db).info.functions.bulk_operations;
        if !supported {
            return self.fail("IM001", "Driver does not support this function");
        }
        self.cursor_mut()?;
        if self.concurrency == Concurrency::ReadOnly {
            return self.fail("HY092", "Cursor is read-only");
        }
        let rows = self
            .row_array_size
            .min(columns.first().map(|v| v.rows()).unwrap_or(0));
        for row in 0..rows {
            let (values, natives, tokens) = self.collect_row(columns, row);
            let pending = DataAtExec {
                op: PendingOp::Add,
                values,
                natives,
                tokens,
                current: None,
                buffer: Vec::new(),
            };
            if pending.tokens.is_empty() {
                self.complete(pending, columns)?;
            } else {
                self.pending = Some(pending);
                return Ok(ExecOutcome::NeedData);
            }
        }
        Ok(ExecOutcome::Success)
    }

    fn row_number(&mut self) -> CallResult<i64> {
        self.enter("row_number")?;
        let report = lock(&self.db).report_row_number;
        let cursor = self.cursor_mut()?;
        if !report || cursor.fetched == 0 {
            return Ok(0);
        }
        Ok(cursor.start)
    }

    fn set_attribute(&mut self, attribute: StatementAttribute) -> CallResult<()> {
        self.enter("set_attribute")?;
        match attribute {
            StatementAttribute::CursorType(cursor_type) => self.cursor_type = cursor_type,
            StatementAttribute::Concurrency(concurrency) => self.concurrency = concurrency,
            StatementAttribute::QueryTimeout(_)
            | StatementAttribute::MaxRows(_)
            | StatementAttribute::MaxFieldSize(_)
            | StatementAttribute::EscapeProcessing(_) => {}
        }
        Ok(())
    }

    fn set_cursor_name(&mut self, name: &str) -> CallResult<()> {
        self.enter("set_cursor_name")?;
        if name.is_empty() {
            return self.fail("34000", "Invalid cursor name");
        }
        self.cursor_name = name.to_string();
        Ok(())
    }

    fn cursor_name(&mut self) -> CallResult<String> {
        self.enter("cursor_name")?;
        Ok(self.cursor_name.clone())
    }

    fn close_cursor(&mut self) -> CallResult<()> {
        self.enter("close_cursor")?;
        self.cursor = None;
        self.pending = None;
        Ok(())
    }

    fn canceller(&self) -> Arc<dyn Canceller> {
        Arc::clone(&self.canceller) as Arc<dyn Canceller>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landed(l: Landing) -> i64 {
        match l {
            Landing::Row(r) => r,
            Landing::BeforeStart => 0,
            Landing::AfterEnd => -1,
        }
    }

    #[test]
    fn test_scroll_landing_rules() {
        assert_eq!(landed(scroll(0, 10, 3, FetchDirection::Next)), 1);
        assert_eq!(landed(scroll(1, 10, 3, FetchDirection::Next)), 4);
        assert_eq!(landed(scroll(10, 10, 3, FetchDirection::Next)), -1);
        assert_eq!(landed(scroll(11, 10, 3, FetchDirection::Prior)), 8);
        assert_eq!(landed(scroll(2, 10, 3, FetchDirection::Prior)), 1);
        assert_eq!(landed(scroll(1, 10, 3, FetchDirection::Prior)), 0);
        assert_eq!(landed(scroll(5, 10, 3, FetchDirection::Last)), 8);
        assert_eq!(landed(scroll(5, 0, 3, FetchDirection::First)), 0);
        assert_eq!(landed(scroll(0, 10, 3, FetchDirection::Absolute(-2))), 9);
        assert_eq!(landed(scroll(0, 10, 3, FetchDirection::Absolute(-11))), 0);
        assert_eq!(landed(scroll(0, 10, 3, FetchDirection::Absolute(11))), -1);
        assert_eq!(landed(scroll(11, 10, 3, FetchDirection::Relative(-1))), 10);
        assert_eq!(landed(scroll(3, 10, 3, FetchDirection::Relative(-3))), 1);
        assert_eq!(landed(scroll(3, 10, 1, FetchDirection::Relative(-3))), 0);
    }

    fn driver() -> MemoryDriver {
        let driver = MemoryDriver::new();
        driver.create_table(
            "T",
            vec![
                column("ID", SqlType::INTEGER, 10, 0),
                column("NAME", SqlType::VARCHAR, 20, 0),
            ],
        );
        driver.insert_rows(
            "T",
            vec![
                vec![Value::Int(1), Value::text("one")],
                vec![Value::Int(2), Value::Null],
            ],
        );
        driver.script_query("SELECT * FROM T", "T");
        driver
    }

    #[test]
    fn test_unknown_sql_reports_syntax_error() {
        let mut stmt = driver().connect().allocate_statement().unwrap();
        assert!(stmt.exec_direct("SELECT nope", &mut []).is_err());
        let diags = stmt.diagnostics();
        assert_eq!(diags[0].sqlstate_str(), "42000");
    }

    #[test]
    fn test_get_data_in_pieces() {
        let mut stmt = driver().connect().allocate_statement().unwrap();
        stmt.exec_direct("SELECT * FROM T", &mut []).unwrap();
        let mut status = [RowStatus::Success];
        assert_eq!(
            stmt.fetch(FetchDirection::Next, &mut [], &mut status).unwrap(),
            FetchOutcome::Rows(1)
        );
        let mut buf = [0u8; 3];
        assert_eq!(
            stmt.get_data(2, NativeKind::Char, &mut buf).unwrap(),
            GetData::Indicator(3)
        );
        assert_eq!(&buf, b"on\0");
        assert_eq!(
            stmt.get_data(2, NativeKind::Char, &mut buf).unwrap(),
            GetData::Indicator(1)
        );
        assert_eq!(&buf[..2], b"e\0");
        assert_eq!(
            stmt.get_data(2, NativeKind::Char, &mut buf).unwrap(),
            GetData::NoData
        );

        stmt.fetch(FetchDirection::Next, &mut [], &mut status).unwrap();
        assert_eq!(
            stmt.get_data(2, NativeKind::Char, &mut buf).unwrap(),
            GetData::Indicator(NULL_DATA)
        );
        assert_eq!(
            stmt.fetch(FetchDirection::Next, &mut [], &mut status).unwrap(),
            FetchOutcome::NoData
        );
    }

    #[test]
    fn test_forward_only_rejects_scrolling() {
        let mut stmt = driver().connect().allocate_statement().unwrap();
        stmt.exec_direct("SELECT * FROM T", &mut []).unwrap();
        assert!(stmt.fetch(FetchDirection::Last, &mut [], &mut []).is_err());
        assert_eq!(stmt.diagnostics()[0].sqlstate_str(), "HY106");
    }

    #[test]
    fn test_injected_failure_applies_once() {
        let driver = driver();
        driver.fail_next("prepare", Diagnostic::new("08S01", 10054, "link failure"));
        let mut stmt = driver.connect().allocate_statement().unwrap();
        assert!(stmt.prepare("SELECT * FROM T").is_err());
        assert_eq!(stmt.diagnostics()[0].native_code, 10054);
        assert!(stmt.prepare("SELECT * FROM T").is_ok());
        assert_eq!(driver.call_count("prepare"), 2);
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let driver = driver();
        driver.script_insert("INSERT INTO T VALUES (?, ?)", "T");
        let mut conn = driver.connect();
        conn.set_auto_commit(false).unwrap();
        driver.insert_rows("T", vec![vec![Value::Int(3), Value::text("three")]]);
        assert_eq!(driver.rows("T").len(), 3);
        conn.rollback().unwrap();
        assert_eq!(driver.rows("T").len(), 2);
        assert_eq!(driver.rollback_count(), 1);
    }
}
