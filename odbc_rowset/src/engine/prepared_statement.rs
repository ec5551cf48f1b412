use super::result_set::ResultSet;
use super::statement::{lock_core, Statement, StatementCore};
use super::streaming::supply_pending_data;
use crate::driver::{BindTarget, DataToken, ExecOutcome, ParamBinding, ParamDirection};
use crate::error::{OdbcError, Result};
use crate::protocol::{
    pending_length, ChunkStream, ColumnBuffer, Date, Guid, Rowset, SqlType, Time, Timestamp,
};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

const STRING_PRECISION: usize = 255;

/// Statement prepared once and executed with a table of parameters.
///
/// Parameters are numbered from 1. When the driver reports neither count
/// nor types up front, the table grows as parameters are set, so they must
/// be set in order the first time.
pub struct PreparedStatement {
    statement: Statement,
    sql: String,
    params: Rowset,
    directions: Vec<ParamDirection>,
    default_direction: ParamDirection,
    bound: bool,
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("statement", &self.statement)
            .field("sql", &self.sql)
            .field("directions", &self.directions)
            .field("default_direction", &self.default_direction)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl PreparedStatement {
    pub(crate) fn new(statement: Statement, sql: &str, default_direction: ParamDirection) -> Result<Self> {
        let shared = Arc::clone(&statement.core);
        let mut core = lock_core(&shared)?;
        let result = core.proto.prepare(sql);
        core.check_with_state(result, &format!("Error preparing {}", sql), "HY007")?;

        let odbc3 = core.info.is_odbc3();
        let mut prepared = Self {
            statement,
            sql: sql.to_string(),
            params: Rowset::new(1, odbc3),
            directions: Vec::new(),
            default_direction,
            bound: false,
        };
        let setup = prepared.setup_params(&mut core);
        drop(core);
        setup?;
        Ok(prepared)
    }

    /// Fills the parameter table from what the driver can tell about the
    /// prepared statement.
    fn setup_params(&mut self, core: &mut StatementCore) -> Result<()> {
        let functions = core.info.functions;
        if !functions.num_params {
            return Ok(());
        }
        let result = core.proto.num_params();
        let count = core.check(result, "Error fetching parameter count")?;
        for index in 1..=count {
            let (sql_type, precision, scale) = if functions.describe_param {
                let result = core.proto.describe_param(index);
                let desc = core.check(result, "Error describing parameter")?;
                if desc.precision == 0 && desc.scale == 0 {
                    (desc.sql_type, desc.sql_type.default_precision(), 0)
                } else {
                    (desc.sql_type, desc.precision, desc.scale)
                }
            } else {
                (SqlType::VARCHAR, STRING_PRECISION, 0)
            };
            self.params.add_column(sql_type, precision, scale)?;
            self.directions.push(self.default_direction);
        }
        log::trace!("Prepared {} with {} parameters", self.sql, count);
        Ok(())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn param_count(&self) -> usize {
        self.params.column_count()
    }

    pub fn param_direction(&self, index: usize) -> Option<ParamDirection> {
        index.checked_sub(1).and_then(|i| self.directions.get(i)).copied()
    }

    pub(crate) fn param(&self, index: usize) -> &ColumnBuffer {
        self.params.column(index)
    }

    pub(crate) fn set_direction(&mut self, index: usize, direction: ParamDirection) -> Result<()> {
        let Some(current) = self.param_direction(index) else {
            return Err(OdbcError::ParameterIndexOutOfBounds(index));
        };
        if current != direction && self.bound {
            self.unbind_params()?;
        }
        self.directions[index - 1] = direction;
        Ok(())
    }

    fn unbind_params(&mut self) -> Result<()> {
        if self.bound {
            let mut core = lock_core(&self.statement.core)?;
            let result = core.proto.reset_params();
            core.check(result, "Error unbinding parameters")?;
        }
        self.params.after_update();
        self.bound = false;
        Ok(())
    }

    /// Makes sure parameter `index` exists with one of `allowed` types.
    ///
    /// The next unknown index appends a parameter of `allowed[0]`; an
    /// existing parameter of another type is recreated.
    pub(crate) fn check_param(
        &mut self,
        index: usize,
        allowed: &[SqlType],
        default_precision: usize,
        default_scale: i16,
    ) -> Result<()> {
        let known = self.params.column_count();
        if index == 0 || index > known + 1 {
            return Err(OdbcError::ParameterIndexOutOfBounds(index));
        }
        let wanted = allowed[0];
        if index == known + 1 {
            if self.bound {
                self.unbind_params()?;
            }
            self.params.add_column(wanted, default_precision, default_scale)?;
            self.directions.push(self.default_direction);
            return Ok(());
        }
        if !allowed.contains(&self.params.column(index).sql_type()) {
            if self.bound {
                self.unbind_params()?;
            }
            let replaced =
                self.params
                    .replace_column(index, wanted, default_precision, default_scale)?;
            if !replaced {
                return Err(OdbcError::InternalError(format!(
                    "Parameter {} cannot change type off the first row",
                    index
                )));
            }
        }
        Ok(())
    }

    fn set_with<F>(
        &mut self,
        index: usize,
        allowed: &[SqlType],
        precision: usize,
        set: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ColumnBuffer) -> Result<()>,
    {
        self.check_param(index, allowed, precision, 0)?;
        set(self.params.column_mut(index))
    }

    pub fn set_boolean(&mut self, index: usize, value: bool) -> Result<()> {
        self.set_with(index, &[SqlType::BIT, SqlType::TINYINT], 0, |c| c.set_boolean(value))
    }

    pub fn set_byte(&mut self, index: usize, value: i8) -> Result<()> {
        self.set_with(index, &[SqlType::TINYINT], 0, |c| c.set_byte(value))
    }

    pub fn set_short(&mut self, index: usize, value: i16) -> Result<()> {
        self.set_with(index, &[SqlType::SMALLINT, SqlType::INTEGER], 0, |c| {
            c.set_short(value)
        })
    }

    pub fn set_int(&mut self, index: usize, value: i32) -> Result<()> {
        self.set_with(index, &[SqlType::INTEGER], 0, |c| c.set_int(value))
    }

    pub fn set_long(&mut self, index: usize, value: i64) -> Result<()> {
        self.set_with(
            index,
            &[SqlType::BIGINT, SqlType::NUMERIC, SqlType::DECIMAL],
            0,
            |c| c.set_long(value),
        )
    }

    pub fn set_float(&mut self, index: usize, value: f32) -> Result<()> {
        self.set_with(
            index,
            &[SqlType::REAL, SqlType::FLOAT, SqlType::DOUBLE],
            0,
            |c| c.set_float(value),
        )
    }

    pub fn set_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.set_with(index, &[SqlType::DOUBLE], 0, |c| c.set_double(value))
    }

    pub fn set_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.set_with(
            index,
            &[SqlType::VARCHAR, SqlType::CHAR],
            STRING_PRECISION,
            |c| c.set_string(value),
        )
    }

    pub fn set_date(&mut self, index: usize, value: &Date) -> Result<()> {
        self.set_with(index, &[SqlType::DATE], 10, |c| c.set_date(value))
    }

    pub fn set_time(&mut self, index: usize, value: &Time) -> Result<()> {
        self.set_with(index, &[SqlType::TIME], 8, |c| c.set_time(value))
    }

    pub fn set_timestamp(&mut self, index: usize, value: &Timestamp) -> Result<()> {
        self.set_with(index, &[SqlType::TIMESTAMP], 19, |c| c.set_timestamp(value))
    }

    pub fn set_bytes(&mut self, index: usize, value: &[u8]) -> Result<()> {
        self.set_with(
            index,
            &[SqlType::VARBINARY, SqlType::BINARY],
            STRING_PRECISION,
            |c| c.set_bytes(value),
        )
    }

    pub fn set_guid(&mut self, index: usize, value: &Guid) -> Result<()> {
        self.set_with(index, &[SqlType::GUID], 0, |c| c.set_guid(value))
    }

    /// Character data of `len` bytes sent at execution time.
    pub fn set_ascii_stream(&mut self, index: usize, stream: ChunkStream, len: usize) -> Result<()> {
        self.set_with(index, &[SqlType::LONGVARCHAR], 0, |c| c.set_stream(stream, len))
    }

    /// Binary data of `len` bytes sent at execution time.
    pub fn set_binary_stream(&mut self, index: usize, stream: ChunkStream, len: usize) -> Result<()> {
        self.set_with(index, &[SqlType::LONGVARBINARY], 0, |c| {
            c.set_stream(stream, len)
        })
    }

    pub fn set_null(&mut self, index: usize, sql_type: SqlType) -> Result<()> {
        self.set_with(index, &[sql_type], sql_type.default_precision(), |c| {
            c.set_null();
            Ok(())
        })
    }

    /// Sets every parameter to NULL, keeping its type.
    pub fn clear_parameters(&mut self) -> Result<()> {
        self.unbind_params()?;
        for index in 1..=self.params.column_count() {
            self.params.column_mut(index).set_null();
        }
        Ok(())
    }

    fn bind_params(&mut self, core: &mut StatementCore) -> Result<()> {
        for index in 1..=self.params.column_count() {
            let column = self.params.column(index);
            let direction = self.directions[index - 1];
            let binding = if column.is_streamed() {
                ParamBinding {
                    direction,
                    native: column.native(),
                    sql_type: column.sql_type(),
                    precision: pending_length(column.status()).unwrap_or(0),
                    scale: 0,
                    target: BindTarget::DataAtExec(DataToken(index)),
                }
            } else {
                ParamBinding {
                    direction,
                    native: column.native(),
                    sql_type: column.sql_type(),
                    precision: column.precision(),
                    scale: column.scale(),
                    target: BindTarget::Buffer {
                        len: column.width(),
                    },
                }
            };
            let result = core.proto.bind_param(index, binding);
            core.check(result, "Error binding parameter")?;
        }
        self.bound = true;
        Ok(())
    }

    fn run(&mut self, core: &mut StatementCore) -> Result<ExecOutcome> {
        if !self.bound {
            self.bind_params(core)?;
        }
        let result = {
            let mut views = self.params.column_views(0);
            core.proto.execute(&mut views)
        };
        let outcome = core.check(result, &format!("Error executing \"{}\"", self.sql))?;
        if outcome == ExecOutcome::NeedData {
            supply_pending_data(core, &mut self.params, 0, true)?;
        }
        Ok(outcome)
    }

    /// Executes with the current parameter values; returns true when a
    /// result set was produced.
    pub fn execute(&mut self) -> Result<bool> {
        let shared = Arc::clone(&self.statement.core);
        let mut core = lock_core(&shared)?;
        core.before_execute()?;

        match self.run(&mut core) {
            Ok(outcome) => {
                core.after_execute(outcome);
                core.log_execute(&self.sql, outcome, self.params.column_count());
                Ok(core.has_results())
            }
            Err(e) => {
                if self.bound {
                    let result = core.proto.reset_params();
                    if let Err(reset) = core.check(result, "Error unbinding parameters") {
                        log::debug!("Unbinding after failed execute: {}", reset);
                    }
                    self.bound = false;
                }
                Err(e)
            }
        }
    }

    pub fn execute_query(&mut self) -> Result<ResultSet> {
        if !self.execute()? {
            return Err(OdbcError::NoResultSet);
        }
        ResultSet::open(Arc::clone(&self.statement.core))
    }

    pub fn execute_update(&mut self) -> Result<i64> {
        self.execute()?;
        self.statement.update_count()
    }
}

impl Deref for PreparedStatement {
    type Target = Statement;

    fn deref(&self) -> &Statement {
        &self.statement
    }
}

impl DerefMut for PreparedStatement {
    fn deref_mut(&mut self) -> &mut Statement {
        &mut self.statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverInfo, Nullability, ParamDescription, SupportedFunctions};
    use crate::engine::{Connection, EngineConfig};
    use crate::testing::{column, MemoryDriver, Value};

    const INSERT: &str = "INSERT INTO T VALUES (?, ?, ?)";

    fn driver(functions: SupportedFunctions) -> MemoryDriver {
        let driver = MemoryDriver::with_driver_info(DriverInfo {
            functions,
            ..DriverInfo::default()
        });
        driver.create_table(
            "T",
            vec![
                column("ID", SqlType::INTEGER, 10, 0),
                column("NAME", SqlType::VARCHAR, 20, 0),
                column("NOTES", SqlType::LONGVARCHAR, 0, 0),
            ],
        );
        driver.script_insert(INSERT, "T");
        driver
    }

    fn connect(driver: &MemoryDriver) -> Connection {
        Connection::with_config(Box::new(driver.connect()), EngineConfig::default()).unwrap()
    }

    fn type_blind() -> SupportedFunctions {
        SupportedFunctions {
            num_params: false,
            describe_param: false,
            ..SupportedFunctions::default()
        }
    }

    #[test]
    fn test_type_blind_driver_needs_parameters_in_order() {
        let driver = driver(type_blind());
        let conn = connect(&driver);
        let mut ps = conn.prepare_statement(INSERT).unwrap();
        assert_eq!(ps.param_count(), 0);

        let err = ps.set_int(3, 1).unwrap_err();
        assert_eq!(err.sqlstate_str(), "S1093");
        assert_eq!(ps.param_count(), 0);

        ps.set_int(1, 1).unwrap();
        ps.set_string(2, "one").unwrap();
        ps.set_null(3, SqlType::LONGVARCHAR).unwrap();
        assert_eq!(ps.param_count(), 3);
        assert_eq!(ps.execute_update().unwrap(), 1);
        assert_eq!(driver.rows("T")[0].values[1], Value::text("one"));
    }

    #[test]
    fn test_described_parameters_are_created_up_front() {
        let driver = driver(SupportedFunctions::default());
        driver.script_params(
            INSERT,
            vec![
                ParamDescription {
                    sql_type: SqlType::INTEGER,
                    precision: 10,
                    scale: 0,
                    nullable: Nullability::NoNulls,
                },
                ParamDescription {
                    sql_type: SqlType::VARCHAR,
                    precision: 0,
                    scale: 0,
                    nullable: Nullability::Nullable,
                },
                ParamDescription {
                    sql_type: SqlType::LONGVARCHAR,
                    precision: 0,
                    scale: 0,
                    nullable: Nullability::Nullable,
                },
            ],
        );
        let conn = connect(&driver);
        let mut ps = conn.prepare_statement(INSERT).unwrap();
        assert_eq!(ps.param_count(), 3);
        assert_eq!(ps.param(2).precision(), SqlType::VARCHAR.default_precision());
        assert_eq!(ps.param_direction(1), Some(ParamDirection::In));

        ps.set_int(3, 5).unwrap();
        assert_eq!(ps.param(3).sql_type(), SqlType::INTEGER);
        ps.set_long(1, 7).unwrap();
        assert_eq!(ps.param(1).sql_type(), SqlType::BIGINT);
    }

    #[test]
    fn test_bound_parameter_changes_type_between_executions() {
        let driver = driver(type_blind());
        let conn = connect(&driver);
        let mut ps = conn.prepare_statement(INSERT).unwrap();
        ps.set_int(1, 1).unwrap();
        ps.set_int(2, 10).unwrap();
        ps.set_null(3, SqlType::LONGVARCHAR).unwrap();
        assert_eq!(ps.execute_update().unwrap(), 1);
        assert_eq!(ps.param(2).sql_type(), SqlType::INTEGER);

        ps.set_int(1, 2).unwrap();
        ps.set_string(2, "two").unwrap();
        assert_eq!(ps.param(2).sql_type(), SqlType::VARCHAR);
        assert_eq!(ps.param(1).sql_type(), SqlType::INTEGER);
        assert_eq!(ps.execute_update().unwrap(), 1);

        let rows = driver.rows("T");
        assert_eq!(rows[1].values[0], Value::Int(2));
        assert_eq!(rows[1].values[1], Value::text("two"));
    }

    #[test]
    fn test_counted_parameters_default_to_varchar() {
        let driver = driver(SupportedFunctions {
            describe_param: false,
            ..SupportedFunctions::default()
        });
        let conn = connect(&driver);
        let ps = conn.prepare_statement(INSERT).unwrap();
        assert_eq!(ps.param_count(), 3);
        assert_eq!(ps.param(3).sql_type(), SqlType::VARCHAR);
        assert_eq!(ps.param(3).precision(), 255);
    }

    #[test]
    fn test_prepare_failure_names_the_sql() {
        let driver = driver(type_blind());
        let conn = connect(&driver);
        let err = conn.prepare_statement("SELECT bogus").unwrap_err();
        assert_eq!(err.sqlstate_str(), "42000");
        assert!(err.to_string().starts_with("Error preparing SELECT bogus: "));
    }

    #[test]
    fn test_stream_parameter_sends_declared_length() {
        let driver = driver(type_blind());
        let conn = connect(&driver);
        let mut ps = conn.prepare_statement(INSERT).unwrap();
        ps.set_int(1, 1).unwrap();
        ps.set_string(2, "long").unwrap();
        ps.set_ascii_stream(3, ChunkStream::from_bytes("0123456789abc"), 10)
            .unwrap();
        ps.execute().unwrap();
        assert_eq!(driver.rows("T")[0].values[2], Value::text("0123456789"));

        ps.set_ascii_stream(3, ChunkStream::from_bytes("ignored"), 0).unwrap();
        ps.execute().unwrap();
        assert_eq!(driver.rows("T")[1].values[2], Value::text(""));
        assert_eq!(driver.put_chunks(), vec![10, 0]);
    }

    #[test]
    fn test_failed_execute_leaves_parameters_unbound() {
        let driver = driver(type_blind());
        let conn = connect(&driver);
        let mut ps = conn.prepare_statement(INSERT).unwrap();
        ps.set_int(1, 1).unwrap();
        ps.set_string(2, "x").unwrap();
        ps.set_null(3, SqlType::LONGVARCHAR).unwrap();
        driver.fail_next("execute", crate::driver::Diagnostic::new("23000", 2627, "duplicate key"));

        let err = ps.execute().unwrap_err();
        assert_eq!(err.sqlstate_str(), "23000");
        assert_eq!(err.to_string(), format!("Error executing \"{}\": duplicate key", INSERT));
        assert!(!ps.bound);

        driver.clear_calls();
        ps.execute().unwrap();
        assert_eq!(driver.call_count("bind_param"), 3);
    }

    #[test]
    fn test_clear_parameters_nulls_every_value() {
        let driver = driver(type_blind());
        let conn = connect(&driver);
        let mut ps = conn.prepare_statement(INSERT).unwrap();
        ps.set_int(1, 9).unwrap();
        ps.set_string(2, "nine").unwrap();
        ps.set_null(3, SqlType::LONGVARCHAR).unwrap();
        ps.clear_parameters().unwrap();
        assert!(ps.param(1).is_null());
        assert_eq!(ps.param(2).sql_type(), SqlType::VARCHAR);
        ps.execute().unwrap();
        assert_eq!(driver.rows("T")[0].values[0], Value::Null);
    }
}
