use super::metadata::ResultSetMetaData;
use super::statement::{lock_core, ResultSetConcurrency, SharedCore, StatementCore};
use super::streaming::{open_fetch_stream, supply_pending_data};
use crate::driver::{
    BindTarget, ColumnBinding, DataToken, ExecOutcome, FetchDirection, FetchOutcome, PositionOp,
};
use crate::error::{OdbcError, Result};
use crate::observability::StructuredLogger;
use crate::protocol::{
    ChunkStream, ColumnBuffer, Date, Guid, RowStatus, Rowset, Time, Timestamp, NO_TOTAL, NULL_DATA,
};
use std::fmt;
use std::sync::Arc;

const BEFORE_FIRST: i64 = -3;
const AFTER_LAST: i64 = -2;
const INSERT_ROW: i64 = -1;
/// Positioned on a row whose absolute number the driver cannot report.
const UNKNOWN: i64 = 0;

const NO_CURRENT_ROW: &str = "No current row";

/// Column reference accepted by the result set accessors: a 1-based index
/// or a column name, matched without regard to case.
pub trait ColumnIndex {
    fn resolve(&self, metadata: &ResultSetMetaData) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, metadata: &ResultSetMetaData) -> Result<usize> {
        if *self == 0 || *self > metadata.column_count() {
            return Err(OdbcError::ColumnIndexOutOfRange(*self));
        }
        Ok(*self)
    }
}

impl ColumnIndex for i32 {
    fn resolve(&self, metadata: &ResultSetMetaData) -> Result<usize> {
        usize::try_from(*self).unwrap_or(0).resolve(metadata)
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, metadata: &ResultSetMetaData) -> Result<usize> {
        metadata.find_column(self)
    }
}

impl ColumnIndex for String {
    fn resolve(&self, metadata: &ResultSetMetaData) -> Result<usize> {
        metadata.find_column(self)
    }
}

/// Positioned operation run with streamed columns bound for data at
/// execution.
#[derive(Clone, Copy)]
enum Positioned {
    BulkAdd,
    SetPos(usize, PositionOp),
}

fn direction_name(direction: FetchDirection) -> &'static str {
    match direction {
        FetchDirection::Next => "NEXT",
        FetchDirection::Prior => "PRIOR",
        FetchDirection::First => "FIRST",
        FetchDirection::Last => "LAST",
        FetchDirection::Absolute(_) => "ABSOLUTE",
        FetchDirection::Relative(_) => "RELATIVE",
    }
}

fn position_what(op: PositionOp) -> &'static str {
    match op {
        PositionOp::Position => "Error positioning cursor",
        PositionOp::Refresh => "Error refreshing row",
        PositionOp::Update => "Error updating row",
        PositionOp::Delete => "Error deleting row",
        PositionOp::Add => "Error inserting row",
    }
}

/// Location after a fetch that returned no rows.
fn no_data_location(direction: FetchDirection) -> i64 {
    match direction {
        FetchDirection::Relative(n) if n < 0 => BEFORE_FIRST,
        FetchDirection::Absolute(0) => BEFORE_FIRST,
        FetchDirection::First | FetchDirection::Prior => BEFORE_FIRST,
        _ => AFTER_LAST,
    }
}

fn set_array_size(core: &mut StatementCore, rows: usize) -> Result<usize> {
    let result = core.proto.set_row_array_size(rows);
    let applied = core.check(result, "Error setting rowset size")?;
    if applied != rows {
        log::debug!("Driver changed rowset size from {} to {}", rows, applied);
    }
    Ok(applied.max(1))
}

fn build_rowset(metadata: &ResultSetMetaData, rows: usize, odbc3: bool) -> Result<Rowset> {
    let mut rowset = Rowset::new(rows, odbc3);
    for index in 1..=metadata.column_count() {
        rowset.add_column(
            metadata.buffer_type(index),
            metadata.buffer_precision(index, odbc3),
            metadata.scale(index)?,
        )?;
    }
    Ok(rowset)
}

/// Binds every fixed-width column; long columns are read with `get_data`.
fn bind_columns(core: &mut StatementCore, rowset: &Rowset) -> Result<()> {
    for (i, column) in rowset.columns().iter().enumerate() {
        if column.is_streamed() {
            continue;
        }
        let binding = ColumnBinding {
            native: column.native(),
            target: BindTarget::Buffer {
                len: column.width(),
            },
        };
        let result = core.proto.bind_col(i + 1, binding);
        core.check(result, "Error binding column")?;
    }
    Ok(())
}

/// Cursor over the rows produced by a statement.
///
/// Rows are fetched a page (`fetch_size` rows) at a time into a rowset;
/// moving within the page costs no fetch. Scrollable result sets keep one
/// extra rowset row as the insert row.
pub struct ResultSet {
    core: SharedCore,
    metadata: ResultSetMetaData,
    rowset: Rowset,
    row_status: Vec<RowStatus>,
    logger: StructuredLogger,
    scrollable: bool,
    updatable: bool,
    can_position: bool,
    odbc3: bool,
    forced_single_row: bool,
    chunk_size: usize,
    fetch_size: usize,
    pending_fetch_size: Option<usize>,
    rows_in_rowset: usize,
    location: i64,
    /// First rowset row the columns are bound at.
    bind_pos: usize,
    saved_row: usize,
    saved_location: i64,
    last_was_null: bool,
    closed: bool,
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("scrollable", &self.scrollable)
            .field("updatable", &self.updatable)
            .field("fetch_size", &self.fetch_size)
            .field("rows_in_rowset", &self.rows_in_rowset)
            .field("location", &self.location)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl ResultSet {
    pub(crate) fn open(core: SharedCore) -> Result<Self> {
        let shared = Arc::clone(&core);
        let mut guard = lock_core(&shared)?;
        let metadata = ResultSetMetaData::describe(&mut guard)?;
        let scrollable = guard.is_scrollable();
        let updatable = guard.concurrency == ResultSetConcurrency::Updatable;
        let odbc3 = guard.info.is_odbc3();
        let can_position = guard.info.functions.set_pos;

        let forced_single_row = !scrollable && metadata.needs_get_data();
        let requested = if forced_single_row { 1 } else { guard.fetch_size };
        let fetch_size = set_array_size(&mut guard, requested)?;
        let rows = fetch_size + usize::from(scrollable || updatable);
        let rowset = build_rowset(&metadata, rows, odbc3)?;
        bind_columns(&mut guard, &rowset)?;

        guard.result_set_open = true;
        let logger = guard.logger;
        let chunk_size = guard.config.getdata_chunk_size.max(1);
        drop(guard);

        log::debug!(
            "Opened result set: {} columns, fetch size {}, scrollable {}",
            metadata.column_count(),
            fetch_size,
            scrollable
        );
        Ok(Self {
            core,
            metadata,
            rowset,
            row_status: vec![RowStatus::default(); rows],
            logger,
            scrollable,
            updatable,
            can_position,
            odbc3,
            forced_single_row,
            chunk_size,
            fetch_size,
            pending_fetch_size: None,
            rows_in_rowset: 0,
            location: BEFORE_FIRST,
            bind_pos: 0,
            saved_row: 0,
            saved_location: BEFORE_FIRST,
            last_was_null: false,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(OdbcError::InvalidCursorState("Result set is closed"));
        }
        Ok(())
    }

    fn ensure_movable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.location == INSERT_ROW {
            return Err(OdbcError::OnInsertRow);
        }
        Ok(())
    }

    fn ensure_scrollable(&self) -> Result<()> {
        self.ensure_movable()?;
        if !self.scrollable {
            return Err(OdbcError::UnsupportedOnForwardOnlyCursor);
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.location >= 0
    }

    fn extra_rows(&self) -> usize {
        usize::from(self.scrollable || self.updatable)
    }

    /// Sizes the rowset for `rows` per fetch and binds the new buffers.
    fn apply_fetch_size(&mut self, rows: usize) -> Result<()> {
        let shared = Arc::clone(&self.core);
        let mut core = lock_core(&shared)?;
        let applied = set_array_size(&mut core, rows)?;
        let total = applied + self.extra_rows();
        let rowset = build_rowset(&self.metadata, total, self.odbc3)?;
        bind_columns(&mut core, &rowset)?;
        drop(core);

        self.rowset = rowset;
        self.row_status = vec![RowStatus::default(); total];
        self.fetch_size = applied;
        self.bind_pos = 0;
        Ok(())
    }

    fn prepare_for_fetch(&mut self) -> Result<()> {
        if let Some(rows) = self.pending_fetch_size.take() {
            self.apply_fetch_size(rows)?;
        }
        Ok(())
    }

    /// Fetches a page in `direction` and updates the location. Returns
    /// whether any row was fetched.
    fn fetch(&mut self, direction: FetchDirection) -> Result<bool> {
        self.prepare_for_fetch()?;
        let shared = Arc::clone(&self.core);
        let mut core = lock_core(&shared)?;
        let result = {
            let mut views = self.rowset.column_views(self.bind_pos);
            core.proto
                .fetch(direction, &mut views, &mut self.row_status[self.bind_pos..])
        };
        let outcome = core.check(result, "Error fetching rows")?;
        self.rowset.set_current_row(0);

        let rows = match outcome {
            FetchOutcome::Rows(n) => n,
            FetchOutcome::NoData => 0,
        };
        if rows == 0 {
            self.rows_in_rowset = 0;
            self.location = no_data_location(direction);
        } else {
            if self.scrollable {
                let result = core.proto.row_number();
                let number = core.check(result, "Error fetching row number")?;
                self.location = if number > 0 { number } else { UNKNOWN };
            } else if self.location <= 0 {
                self.location = 1;
            } else {
                self.location += self.rows_in_rowset as i64;
            }
            self.rows_in_rowset = rows;
        }
        self.logger.log_fetch(
            direction_name(direction),
            direction.offset(),
            rows,
            self.location,
        );
        Ok(rows > 0)
    }

    fn set_pos(&mut self, row: usize, op: PositionOp) -> Result<ExecOutcome> {
        let shared = Arc::clone(&self.core);
        let mut core = lock_core(&shared)?;
        let result = {
            let mut views = self.rowset.column_views(self.bind_pos);
            core.proto.set_pos(
                row + 1 - self.bind_pos,
                op,
                &mut views,
                &mut self.row_status[self.bind_pos..],
            )
        };
        core.check_with_state(result, position_what(op), "HY109")
    }

    /// Makes `row` of the page current, on the driver side too when
    /// long columns are read from it.
    fn move_to(&mut self, row: usize) -> Result<()> {
        self.rowset.set_current_row(row);
        if self.scrollable && self.can_position {
            self.set_pos(row, PositionOp::Position)?;
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<bool> {
        self.ensure_movable()?;
        let current = self.rowset.current_row();
        if self.is_valid() && current + 1 < self.rows_in_rowset {
            self.move_to(current + 1)?;
            return Ok(true);
        }
        if self.location == AFTER_LAST {
            return Ok(false);
        }
        self.fetch(FetchDirection::Next)
    }

    pub fn previous(&mut self) -> Result<bool> {
        self.ensure_scrollable()?;
        let current = self.rowset.current_row();
        if self.is_valid() && current > 0 {
            self.move_to(current - 1)?;
            return Ok(true);
        }
        if self.location == BEFORE_FIRST {
            return Ok(false);
        }
        let old = self.location;
        if !self.fetch(FetchDirection::Prior)? {
            return Ok(false);
        }
        let offset = old - self.location;
        let in_page = offset >= 1 && offset <= self.rows_in_rowset as i64;
        let row = if old > 0 && self.location > 0 && in_page {
            (offset - 1) as usize
        } else {
            self.rows_in_rowset - 1
        };
        if row != 0 {
            self.move_to(row)?;
        }
        Ok(true)
    }

    pub fn first(&mut self) -> Result<bool> {
        self.ensure_scrollable()?;
        self.fetch(FetchDirection::First)
    }

    pub fn last(&mut self) -> Result<bool> {
        self.ensure_scrollable()?;
        if !self.fetch(FetchDirection::Last)? {
            return Ok(false);
        }
        let row = self.rows_in_rowset - 1;
        if row != 0 {
            self.move_to(row)?;
        }
        Ok(true)
    }

    /// Moves to absolute row `row`; negative values count from the end.
    pub fn absolute(&mut self, row: i64) -> Result<bool> {
        self.ensure_scrollable()?;
        self.fetch(FetchDirection::Absolute(row))
    }

    /// Moves `rows` rows from the current row.
    pub fn relative(&mut self, rows: i64) -> Result<bool> {
        self.ensure_scrollable()?;
        if !self.is_valid() {
            return Err(OdbcError::RelativeWithoutCurrentRow);
        }
        if rows == 0 {
            return Ok(true);
        }
        let current = self.rowset.current_row() as i64;
        let target = current + rows;
        if target >= 0 && target < self.rows_in_rowset as i64 {
            self.move_to(target as usize)?;
            return Ok(true);
        }
        self.fetch(FetchDirection::Relative(rows + current))
    }

    pub fn before_first(&mut self) -> Result<()> {
        self.ensure_scrollable()?;
        if self.location != BEFORE_FIRST {
            self.fetch(FetchDirection::Absolute(0))?;
        }
        Ok(())
    }

    pub fn after_last(&mut self) -> Result<()> {
        self.ensure_scrollable()?;
        if self.location != AFTER_LAST && self.fetch(FetchDirection::Last)? {
            self.fetch(FetchDirection::Next)?;
        }
        Ok(())
    }

    pub fn is_before_first(&self) -> bool {
        self.location == BEFORE_FIRST
    }

    pub fn is_after_last(&self) -> bool {
        self.location == AFTER_LAST
    }

    /// Runs a one-row fetch in `direction` outside the location bookkeeping,
    /// then refetches the page with `restore`. Returns whether a row was
    /// found.
    fn probe(&mut self, direction: FetchDirection, restore: FetchDirection) -> Result<bool> {
        let shared = Arc::clone(&self.core);
        let mut core = lock_core(&shared)?;
        set_array_size(&mut core, 1)?;
        let result = {
            let mut views = self.rowset.column_views(self.bind_pos);
            core.proto
                .fetch(direction, &mut views, &mut self.row_status[self.bind_pos..])
        };
        let probed = core.check(result, "Error fetching rows");
        let resized = set_array_size(&mut core, self.fetch_size);
        let found = matches!(probed?, FetchOutcome::Rows(n) if n > 0);
        resized?;

        let result = {
            let mut views = self.rowset.column_views(self.bind_pos);
            core.proto
                .fetch(restore, &mut views, &mut self.row_status[self.bind_pos..])
        };
        core.check(result, "Error fetching rows")?;
        Ok(found)
    }

    pub fn is_first(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if !self.is_valid() {
            return Ok(false);
        }
        let current = self.rowset.current_row();
        if self.location > 0 {
            return Ok(self.location == 1 && current == 0);
        }
        if current > 0 {
            return Ok(false);
        }
        match self.probe(FetchDirection::Prior, FetchDirection::Next) {
            Ok(found) => {
                self.rowset.set_current_row(0);
                Ok(!found)
            }
            Err(e) => {
                self.location = BEFORE_FIRST;
                self.rows_in_rowset = 0;
                Err(e)
            }
        }
    }

    pub fn is_last(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if !self.is_valid() {
            return Ok(false);
        }
        let current = self.rowset.current_row();
        if current + 1 < self.rows_in_rowset {
            return Ok(false);
        }
        if self.rows_in_rowset < self.fetch_size {
            return Ok(true);
        }
        if !self.scrollable {
            return Err(OdbcError::UnsupportedOnForwardOnlyCursor);
        }
        let restore = if self.location > 0 {
            FetchDirection::Absolute(self.location)
        } else {
            FetchDirection::Prior
        };
        match self.probe(FetchDirection::Next, restore) {
            Ok(found) => {
                self.move_to(current)?;
                Ok(!found)
            }
            Err(e) => {
                self.location = AFTER_LAST;
                self.rows_in_rowset = 0;
                Err(e)
            }
        }
    }

    /// Absolute number of the current row; 0 when unknown or off the rows.
    pub fn get_row(&self) -> i64 {
        if self.location > 0 {
            return self.location + self.rowset.current_row() as i64;
        }
        if self.location == INSERT_ROW && self.saved_location > 0 {
            return self.saved_location + self.saved_row as i64;
        }
        0
    }

    pub fn move_to_insert_row(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.updatable {
            return Err(OdbcError::UnsupportedFeature(
                "Result set is not updatable".to_string(),
            ));
        }
        if self.location == INSERT_ROW {
            return Ok(());
        }
        self.saved_row = self.rowset.current_row();
        self.saved_location = self.location;
        self.rowset.set_current_row(self.fetch_size);
        self.location = INSERT_ROW;
        Ok(())
    }

    /// Leaves the insert row for the row that was current before it.
    pub fn move_to_current_row(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.location != INSERT_ROW {
            return Ok(());
        }
        if self.bind_pos > 0 {
            {
                let shared = Arc::clone(&self.core);
                let mut core = lock_core(&shared)?;
                set_array_size(&mut core, self.fetch_size)?;
                self.rowset.set_current_row(0);
                self.bind_pos = 0;
                bind_columns(&mut core, &self.rowset)?;
            }
            self.location = self.saved_location;
            if self.saved_location > 0 {
                self.fetch(FetchDirection::Absolute(self.saved_location))?;
            } else if self.saved_location == AFTER_LAST {
                if self.fetch(FetchDirection::Absolute(-1))? {
                    self.fetch(FetchDirection::Next)?;
                }
            } else {
                self.fetch(FetchDirection::Absolute(0))?;
            }
        } else {
            self.location = self.saved_location;
        }

        if self.is_valid() && self.saved_row < self.rows_in_rowset {
            self.move_to(self.saved_row)?;
        } else {
            self.rowset.set_current_row(0);
        }
        Ok(())
    }

    /// Binds streamed columns carrying data to send; returns their indexes.
    fn bind_streams(&mut self, core: &mut StatementCore) -> Result<Vec<usize>> {
        let mut bound = Vec::new();
        for index in 1..=self.rowset.column_count() {
            let column = self.rowset.column(index);
            if !column.is_streamed() || !column.has_pending_stream() {
                continue;
            }
            let binding = ColumnBinding {
                native: column.native(),
                target: BindTarget::DataAtExec(DataToken(index)),
            };
            let result = core.proto.bind_col(index, binding);
            core.check(result, "Error binding column")?;
            bound.push(index);
        }
        Ok(bound)
    }

    fn unbind_streams(core: &mut StatementCore, bound: &[usize]) -> Result<()> {
        for &index in bound {
            let result = core.proto.unbind_col(index);
            core.check(result, "Error unbinding column")?;
        }
        Ok(())
    }

    fn positioned_call(&mut self, core: &mut StatementCore, call: Positioned) -> Result<()> {
        let (result, what) = {
            let mut views = self.rowset.column_views(self.bind_pos);
            match call {
                Positioned::BulkAdd => (core.proto.bulk_add(&mut views), "Error inserting row"),
                Positioned::SetPos(row, op) => (
                    core.proto.set_pos(
                        row + 1 - self.bind_pos,
                        op,
                        &mut views,
                        &mut self.row_status[self.bind_pos..],
                    ),
                    position_what(op),
                ),
            }
        };
        let outcome = core.check_with_state(result, what, "HY109")?;
        if outcome == ExecOutcome::NeedData {
            supply_pending_data(core, &mut self.rowset, self.bind_pos, false)?;
        }
        Ok(())
    }

    /// Runs `call` with streamed values supplied at execution, then drops
    /// the stream bindings and the values sent.
    fn run_positioned(&mut self, call: Positioned) -> Result<()> {
        let shared = Arc::clone(&self.core);
        let mut core = lock_core(&shared)?;
        let bound = self.bind_streams(&mut core)?;
        let result = self.positioned_call(&mut core, call);
        let unbound = Self::unbind_streams(&mut core, &bound);
        self.rowset.after_update();
        result?;
        unbound
    }

    /// Inserts the contents of the insert row.
    pub fn insert_row(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.location != INSERT_ROW {
            return Err(OdbcError::InvalidCursorState("Not on insert row"));
        }
        if self.odbc3 {
            if self.bind_pos == 0 {
                let shared = Arc::clone(&self.core);
                let mut core = lock_core(&shared)?;
                set_array_size(&mut core, 1)?;
                self.bind_pos = self.fetch_size;
                bind_columns(&mut core, &self.rowset)?;
            }
            self.run_positioned(Positioned::BulkAdd)
        } else {
            self.run_positioned(Positioned::SetPos(self.fetch_size, PositionOp::Add))
        }
    }

    fn ensure_current_row(&self) -> Result<()> {
        self.ensure_scrollable()?;
        if !self.is_valid() {
            return Err(OdbcError::InvalidCursorState(NO_CURRENT_ROW));
        }
        Ok(())
    }

    pub fn update_row(&mut self) -> Result<()> {
        self.ensure_current_row()?;
        let row = self.rowset.current_row();
        self.run_positioned(Positioned::SetPos(row, PositionOp::Update))
    }

    pub fn delete_row(&mut self) -> Result<()> {
        self.ensure_current_row()?;
        let row = self.rowset.current_row();
        self.set_pos(row, PositionOp::Delete)?;
        Ok(())
    }

    /// Reloads the current row from the data source.
    pub fn refresh_row(&mut self) -> Result<()> {
        self.ensure_current_row()?;
        let row = self.rowset.current_row();
        self.set_pos(row, PositionOp::Refresh)?;
        self.rowset.after_update();
        Ok(())
    }

    /// Discards updates made to the current row or the insert row.
    pub fn cancel_row_updates(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.location == INSERT_ROW {
            for index in 1..=self.rowset.column_count() {
                self.rowset.column_mut(index).set_null();
            }
            self.rowset.after_update();
            return Ok(());
        }
        if !self.is_valid() {
            return Err(OdbcError::InvalidCursorState(NO_CURRENT_ROW));
        }
        self.refresh_row()
    }

    fn current_status(&self) -> Result<RowStatus> {
        self.ensure_open()?;
        if !self.is_valid() {
            return Err(OdbcError::InvalidCursorState(NO_CURRENT_ROW));
        }
        Ok(self.row_status[self.rowset.current_row()])
    }

    pub fn row_updated(&self) -> Result<bool> {
        Ok(self.current_status()? == RowStatus::Updated)
    }

    pub fn row_inserted(&self) -> Result<bool> {
        Ok(self.current_status()? == RowStatus::Added)
    }

    pub fn row_deleted(&self) -> Result<bool> {
        Ok(self.current_status()? == RowStatus::Deleted)
    }

    /// Resolves `column` for an accessor on the current or insert row.
    fn accessible(&self, column: impl ColumnIndex) -> Result<usize> {
        self.ensure_open()?;
        let index = column.resolve(&self.metadata)?;
        if !self.is_valid() && self.location != INSERT_ROW {
            return Err(OdbcError::InvalidCursorState(NO_CURRENT_ROW));
        }
        Ok(index)
    }

    fn get_with<T, F>(&mut self, column: impl ColumnIndex, get: F) -> Result<T>
    where
        F: FnOnce(&ColumnBuffer) -> Result<T>,
    {
        let index = self.accessible(column)?;
        self.ensure_stream(index)?;
        let buffer = self.rowset.column(index);
        self.last_was_null = buffer.is_null();
        get(buffer)
    }

    fn update_with<F>(&mut self, column: impl ColumnIndex, set: F) -> Result<()>
    where
        F: FnOnce(&mut ColumnBuffer) -> Result<()>,
    {
        let index = self.accessible(column)?;
        set(self.rowset.column_mut(index))
    }

    /// Attaches a stream over the driver-side value of long column `index`
    /// unless one is attached already.
    fn ensure_stream(&mut self, index: usize) -> Result<()> {
        let column = self.rowset.column(index);
        if !column.is_streamed() || column.has_stream() || self.location == INSERT_ROW {
            return Ok(());
        }
        let native = column.native();
        let stream = open_fetch_stream(&self.core, index, native, self.chunk_size)?;
        let status = if stream.is_null() { NULL_DATA } else { NO_TOTAL };
        let column = self.rowset.column_mut(index);
        column.set_fetched_stream(stream);
        column.set_status(status);
        Ok(())
    }

    /// Reads a long value to the end; `None` when it is NULL. The drained
    /// stream stays attached, so reading again yields no more data.
    fn drain_stream(&mut self, index: usize) -> Result<Option<Vec<u8>>> {
        self.ensure_stream(index)?;
        let column = self.rowset.column_mut(index);
        let bytes = match column.get_stream()? {
            Some(stream) if !stream.is_null() => Some(stream.read_to_vec()?),
            _ => None,
        };
        self.last_was_null = bytes.is_none();
        Ok(bytes)
    }

    fn get_stream(&mut self, column: impl ColumnIndex) -> Result<Option<&mut ChunkStream>> {
        let index = self.accessible(column)?;
        self.ensure_stream(index)?;
        let buffer = self.rowset.column_mut(index);
        let null = buffer.is_null() && !buffer.has_stream();
        let stream = buffer.get_stream()?.filter(|s| !s.is_null());
        self.last_was_null = null || stream.is_none();
        Ok(stream)
    }

    /// Whether the last value read was NULL.
    pub fn was_null(&self) -> bool {
        self.last_was_null
    }

    pub fn get_boolean(&mut self, column: impl ColumnIndex) -> Result<bool> {
        self.get_with(column, ColumnBuffer::get_boolean)
    }

    pub fn get_byte(&mut self, column: impl ColumnIndex) -> Result<i8> {
        self.get_with(column, ColumnBuffer::get_byte)
    }

    pub fn get_short(&mut self, column: impl ColumnIndex) -> Result<i16> {
        self.get_with(column, ColumnBuffer::get_short)
    }

    pub fn get_int(&mut self, column: impl ColumnIndex) -> Result<i32> {
        self.get_with(column, ColumnBuffer::get_int)
    }

    pub fn get_long(&mut self, column: impl ColumnIndex) -> Result<i64> {
        self.get_with(column, ColumnBuffer::get_long)
    }

    pub fn get_float(&mut self, column: impl ColumnIndex) -> Result<f32> {
        self.get_with(column, ColumnBuffer::get_float)
    }

    pub fn get_double(&mut self, column: impl ColumnIndex) -> Result<f64> {
        self.get_with(column, ColumnBuffer::get_double)
    }

    pub fn get_date(&mut self, column: impl ColumnIndex) -> Result<Date> {
        self.get_with(column, ColumnBuffer::get_date)
    }

    pub fn get_time(&mut self, column: impl ColumnIndex) -> Result<Time> {
        self.get_with(column, ColumnBuffer::get_time)
    }

    pub fn get_timestamp(&mut self, column: impl ColumnIndex) -> Result<Timestamp> {
        self.get_with(column, ColumnBuffer::get_timestamp)
    }

    pub fn get_guid(&mut self, column: impl ColumnIndex) -> Result<Guid> {
        self.get_with(column, ColumnBuffer::get_guid)
    }

    /// Long columns are read to the end.
    pub fn get_string(&mut self, column: impl ColumnIndex) -> Result<String> {
        let index = self.accessible(column)?;
        if self.rowset.column(index).is_streamed() {
            let bytes = self.drain_stream(index)?.unwrap_or_default();
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        self.get_with(index, ColumnBuffer::get_string)
    }

    /// Long columns are read to the end.
    pub fn get_bytes(&mut self, column: impl ColumnIndex) -> Result<Vec<u8>> {
        let index = self.accessible(column)?;
        if self.rowset.column(index).is_streamed() {
            return Ok(self.drain_stream(index)?.unwrap_or_default());
        }
        self.get_with(index, ColumnBuffer::get_bytes)
    }

    /// Stream over a long character value; `None` when it is NULL.
    pub fn get_ascii_stream(&mut self, column: impl ColumnIndex) -> Result<Option<&mut ChunkStream>> {
        self.get_stream(column)
    }

    /// Stream over a long binary value; `None` when it is NULL.
    pub fn get_binary_stream(&mut self, column: impl ColumnIndex) -> Result<Option<&mut ChunkStream>> {
        self.get_stream(column)
    }

    pub fn update_null(&mut self, column: impl ColumnIndex) -> Result<()> {
        self.update_with(column, |c| {
            c.set_null();
            Ok(())
        })
    }

    pub fn update_boolean(&mut self, column: impl ColumnIndex, value: bool) -> Result<()> {
        self.update_with(column, |c| c.set_boolean(value))
    }

    pub fn update_byte(&mut self, column: impl ColumnIndex, value: i8) -> Result<()> {
        self.update_with(column, |c| c.set_byte(value))
    }

    pub fn update_short(&mut self, column: impl ColumnIndex, value: i16) -> Result<()> {
        self.update_with(column, |c| c.set_short(value))
    }

    pub fn update_int(&mut self, column: impl ColumnIndex, value: i32) -> Result<()> {
        self.update_with(column, |c| c.set_int(value))
    }

    pub fn update_long(&mut self, column: impl ColumnIndex, value: i64) -> Result<()> {
        self.update_with(column, |c| c.set_long(value))
    }

    pub fn update_float(&mut self, column: impl ColumnIndex, value: f32) -> Result<()> {
        self.update_with(column, |c| c.set_float(value))
    }

    pub fn update_double(&mut self, column: impl ColumnIndex, value: f64) -> Result<()> {
        self.update_with(column, |c| c.set_double(value))
    }

    pub fn update_string(&mut self, column: impl ColumnIndex, value: &str) -> Result<()> {
        self.update_with(column, |c| c.set_string(value))
    }

    pub fn update_bytes(&mut self, column: impl ColumnIndex, value: &[u8]) -> Result<()> {
        self.update_with(column, |c| c.set_bytes(value))
    }

    pub fn update_date(&mut self, column: impl ColumnIndex, value: &Date) -> Result<()> {
        self.update_with(column, |c| c.set_date(value))
    }

    pub fn update_time(&mut self, column: impl ColumnIndex, value: &Time) -> Result<()> {
        self.update_with(column, |c| c.set_time(value))
    }

    pub fn update_timestamp(&mut self, column: impl ColumnIndex, value: &Timestamp) -> Result<()> {
        self.update_with(column, |c| c.set_timestamp(value))
    }

    pub fn update_guid(&mut self, column: impl ColumnIndex, value: &Guid) -> Result<()> {
        self.update_with(column, |c| c.set_guid(value))
    }

    /// Character data of `len` bytes sent when the row is written.
    pub fn update_ascii_stream(
        &mut self,
        column: impl ColumnIndex,
        stream: ChunkStream,
        len: usize,
    ) -> Result<()> {
        self.update_with(column, |c| c.set_stream(stream, len))
    }

    /// Binary data of `len` bytes sent when the row is written.
    pub fn update_binary_stream(
        &mut self,
        column: impl ColumnIndex,
        stream: ChunkStream,
        len: usize,
    ) -> Result<()> {
        self.update_with(column, |c| c.set_stream(stream, len))
    }

    /// 1-based index of the first column named `name`, ignoring case.
    pub fn find_column(&self, name: &str) -> Result<usize> {
        self.metadata.find_column(name)
    }

    pub fn metadata(&self) -> &ResultSetMetaData {
        &self.metadata
    }

    pub fn fetch_size(&self) -> usize {
        self.pending_fetch_size.unwrap_or(self.fetch_size)
    }

    /// Rows per fetch; 0 means 1. Takes effect at once when no row is
    /// current, otherwise with the next fetch.
    pub fn set_fetch_size(&mut self, rows: i64) -> Result<()> {
        self.ensure_movable()?;
        if rows < 0 {
            return Err(OdbcError::InvalidFetchSize(rows));
        }
        if self.forced_single_row {
            return Ok(());
        }
        let rows = (rows as usize).max(1);
        if rows == self.fetch_size {
            self.pending_fetch_size = None;
            return Ok(());
        }
        if self.is_valid() {
            self.pending_fetch_size = Some(rows);
            Ok(())
        } else {
            self.apply_fetch_size(rows)
        }
    }

    pub fn cursor_name(&self) -> Result<String> {
        self.ensure_open()?;
        let mut core = lock_core(&self.core)?;
        let result = core.proto.cursor_name();
        core.check(result, "Error fetching cursor name")
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the column bindings. The statement may execute again
    /// afterwards.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.rowset.after_update();
        let mut core = lock_core(&self.core)?;
        core.result_set_open = false;
        let result = core.proto.unbind_cols();
        core.check(result, "Error unbinding columns")
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("Closing result set on drop failed: {}", e);
        }
    }
}
