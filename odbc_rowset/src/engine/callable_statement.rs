use super::prepared_statement::PreparedStatement;
use super::statement::Statement;
use crate::driver::ParamDirection;
use crate::error::{OdbcError, Result};
use crate::protocol::{ColumnBuffer, Date, Guid, SqlType, Time, Timestamp};
use std::ops::{Deref, DerefMut};

/// Prepared call of a stored procedure whose parameters may return values.
///
/// Parameters default to INOUT; register them as IN or OUT to narrow the
/// direction. Output values are read after `execute`.
pub struct CallableStatement {
    prepared: PreparedStatement,
    last_was_null: bool,
}

impl CallableStatement {
    pub(crate) fn new(statement: Statement, sql: &str) -> Result<Self> {
        Ok(Self {
            prepared: PreparedStatement::new(statement, sql, ParamDirection::InOut)?,
            last_was_null: false,
        })
    }

    pub fn register_in_parameter(&mut self, index: usize) -> Result<()> {
        self.prepared.set_direction(index, ParamDirection::In)
    }

    /// Declares `index` as an output of `sql_type`.
    pub fn register_out_parameter(&mut self, index: usize, sql_type: SqlType, scale: i16) -> Result<()> {
        self.prepared
            .check_param(index, &[sql_type], sql_type.default_precision(), scale)?;
        self.prepared.set_direction(index, ParamDirection::Out)
    }

    fn out_param(&mut self, index: usize) -> Result<&ColumnBuffer> {
        if index == 0 || index > self.prepared.param_count() {
            return Err(OdbcError::ParameterIndexOutOfRange(index));
        }
        let param = self.prepared.param(index);
        self.last_was_null = param.is_null();
        Ok(param)
    }

    /// Whether the last value read was NULL.
    pub fn was_null(&self) -> bool {
        self.last_was_null
    }

    pub fn get_boolean(&mut self, index: usize) -> Result<bool> {
        self.out_param(index)?.get_boolean()
    }

    pub fn get_byte(&mut self, index: usize) -> Result<i8> {
        self.out_param(index)?.get_byte()
    }

    pub fn get_short(&mut self, index: usize) -> Result<i16> {
        self.out_param(index)?.get_short()
    }

    pub fn get_int(&mut self, index: usize) -> Result<i32> {
        self.out_param(index)?.get_int()
    }

    pub fn get_long(&mut self, index: usize) -> Result<i64> {
        self.out_param(index)?.get_long()
    }

    pub fn get_float(&mut self, index: usize) -> Result<f32> {
        self.out_param(index)?.get_float()
    }

    pub fn get_double(&mut self, index: usize) -> Result<f64> {
        self.out_param(index)?.get_double()
    }

    pub fn get_string(&mut self, index: usize) -> Result<String> {
        self.out_param(index)?.get_string()
    }

    pub fn get_bytes(&mut self, index: usize) -> Result<Vec<u8>> {
        self.out_param(index)?.get_bytes()
    }

    pub fn get_date(&mut self, index: usize) -> Result<Date> {
        self.out_param(index)?.get_date()
    }

    pub fn get_time(&mut self, index: usize) -> Result<Time> {
        self.out_param(index)?.get_time()
    }

    pub fn get_timestamp(&mut self, index: usize) -> Result<Timestamp> {
        self.out_param(index)?.get_timestamp()
    }

    pub fn get_guid(&mut self, index: usize) -> Result<Guid> {
        self.out_param(index)?.get_guid()
    }
}

impl Deref for CallableStatement {
    type Target = PreparedStatement;

    fn deref(&self) -> &PreparedStatement {
        &self.prepared
    }
}

impl DerefMut for CallableStatement {
    fn deref_mut(&mut self) -> &mut PreparedStatement {
        &mut self.prepared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverInfo, SupportedFunctions};
    use crate::engine::{Connection, EngineConfig};
    use crate::testing::{MemoryDriver, Value};

    const CALL: &str = "{call next_id(?, ?)}";

    fn connect(driver: &MemoryDriver) -> Connection {
        Connection::with_config(Box::new(driver.connect()), EngineConfig::default()).unwrap()
    }

    fn driver() -> MemoryDriver {
        let driver = MemoryDriver::with_driver_info(DriverInfo {
            functions: SupportedFunctions {
                num_params: false,
                describe_param: false,
                ..SupportedFunctions::default()
            },
            ..DriverInfo::default()
        });
        driver.script_call(CALL, vec![(1, Value::text("ignored")), (2, Value::Int(42))]);
        driver
    }

    #[test]
    fn test_out_parameter_receives_value() {
        let driver = driver();
        let conn = connect(&driver);
        let mut call = conn.prepare_call(CALL).unwrap();
        call.set_string(1, "orders").unwrap();
        call.register_in_parameter(1).unwrap();
        call.register_out_parameter(2, SqlType::INTEGER, 0).unwrap();
        assert_eq!(call.param_direction(2), Some(ParamDirection::Out));

        assert!(!call.execute().unwrap());
        assert_eq!(call.get_int(2).unwrap(), 42);
        assert!(!call.was_null());
        assert_eq!(call.get_string(1).unwrap(), "orders");
    }

    #[test]
    fn test_default_direction_is_inout() {
        let driver = driver();
        let conn = connect(&driver);
        let mut call = conn.prepare_call(CALL).unwrap();
        call.set_string(1, "orders").unwrap();
        call.set_int(2, 0).unwrap();
        assert_eq!(call.param_direction(1), Some(ParamDirection::InOut));
        call.execute().unwrap();
        assert_eq!(call.get_string(1).unwrap(), "ignored");
    }

    #[test]
    fn test_getter_index_checks() {
        let driver = driver();
        let conn = connect(&driver);
        let mut call = conn.prepare_call(CALL).unwrap();
        call.register_out_parameter(1, SqlType::VARCHAR, 0).unwrap();
        let err = call.get_int(2).unwrap_err();
        assert_eq!(err.sqlstate_str(), "S1093");
        assert!(err.to_string().contains("out of range"));

        assert_eq!(call.get_string(1).unwrap(), "");
        assert!(call.was_null());

        let err = call.register_in_parameter(5).unwrap_err();
        assert_eq!(err.sqlstate_str(), "S1093");
    }
}
