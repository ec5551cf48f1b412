use std::fmt;

/// SQL data type code as reported by the driver (`SQL_*` constants).
///
/// Codes without a buffer mapping surface as `UnsupportedType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SqlType(pub i16);

impl SqlType {
    pub const UNKNOWN: SqlType = SqlType(0);
    pub const CHAR: SqlType = SqlType(1);
    pub const NUMERIC: SqlType = SqlType(2);
    pub const DECIMAL: SqlType = SqlType(3);
    pub const INTEGER: SqlType = SqlType(4);
    pub const SMALLINT: SqlType = SqlType(5);
    pub const FLOAT: SqlType = SqlType(6);
    pub const REAL: SqlType = SqlType(7);
    pub const DOUBLE: SqlType = SqlType(8);
    pub const VARCHAR: SqlType = SqlType(12);
    pub const DATE: SqlType = SqlType(91);
    pub const TIME: SqlType = SqlType(92);
    pub const TIMESTAMP: SqlType = SqlType(93);
    pub const LONGVARCHAR: SqlType = SqlType(-1);
    pub const BINARY: SqlType = SqlType(-2);
    pub const VARBINARY: SqlType = SqlType(-3);
    pub const LONGVARBINARY: SqlType = SqlType(-4);
    pub const BIGINT: SqlType = SqlType(-5);
    pub const TINYINT: SqlType = SqlType(-6);
    pub const BIT: SqlType = SqlType(-7);
    pub const WCHAR: SqlType = SqlType(-8);
    pub const WVARCHAR: SqlType = SqlType(-9);
    pub const WLONGVARCHAR: SqlType = SqlType(-10);
    pub const GUID: SqlType = SqlType(-11);

    /// Folds driver-specific and wide character codes onto the types the
    /// rowset knows how to buffer.
    pub fn remap_extended(self) -> SqlType {
        match self.0 {
            -95 => Self::BINARY,
            -96 => Self::VARBINARY,
            -97 | -98 => Self::LONGVARBINARY,
            -99 => Self::LONGVARCHAR,
            -350 => Self::WLONGVARCHAR,
            _ => self,
        }
        .narrow()
    }

    fn narrow(self) -> SqlType {
        match self {
            Self::WCHAR => Self::CHAR,
            Self::WVARCHAR => Self::VARCHAR,
            Self::WLONGVARCHAR => Self::LONGVARCHAR,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CHAR => "CHAR",
            Self::NUMERIC => "NUMERIC",
            Self::DECIMAL => "DECIMAL",
            Self::INTEGER => "INTEGER",
            Self::SMALLINT => "SMALLINT",
            Self::FLOAT => "FLOAT",
            Self::REAL => "REAL",
            Self::DOUBLE => "DOUBLE",
            Self::VARCHAR => "VARCHAR",
            Self::DATE => "DATE",
            Self::TIME => "TIME",
            Self::TIMESTAMP => "TIMESTAMP",
            Self::LONGVARCHAR => "LONGVARCHAR",
            Self::BINARY => "BINARY",
            Self::VARBINARY => "VARBINARY",
            Self::LONGVARBINARY => "LONGVARBINARY",
            Self::BIGINT => "BIGINT",
            Self::TINYINT => "TINYINT",
            Self::BIT => "BIT",
            Self::WCHAR => "WCHAR",
            Self::WVARCHAR => "WVARCHAR",
            Self::WLONGVARCHAR => "WLONGVARCHAR",
            Self::GUID => "GUID",
            _ => "UNKNOWN",
        }
    }

    /// Precision used when a driver describes a parameter as 0/0.
    pub fn default_precision(self) -> usize {
        match self {
            Self::CHAR | Self::VARCHAR | Self::BINARY | Self::VARBINARY => 255,
            Self::TIMESTAMP => 19,
            _ => 0,
        }
    }

    /// Long types are never materialized in a fixed buffer.
    pub fn is_streamed(self) -> bool {
        matches!(self, Self::LONGVARCHAR | Self::LONGVARBINARY)
    }

    /// Maps an odbc-api type description onto (type, precision, scale).
    pub fn describe(data_type: &odbc_api::DataType) -> (SqlType, usize, i16) {
        use odbc_api::DataType;

        fn len(length: &Option<std::num::NonZeroUsize>) -> usize {
            length.map(|l| l.get()).unwrap_or(0)
        }

        match data_type {
            DataType::Char { length } => (Self::CHAR, len(length), 0),
            DataType::Varchar { length } => (Self::VARCHAR, len(length), 0),
            DataType::LongVarchar { length } => (Self::LONGVARCHAR, len(length), 0),
            DataType::WChar { length } => (Self::WCHAR, len(length), 0),
            DataType::WVarchar { length } => (Self::WVARCHAR, len(length), 0),
            DataType::Binary { length } => (Self::BINARY, len(length), 0),
            DataType::Varbinary { length } => (Self::VARBINARY, len(length), 0),
            DataType::LongVarbinary { length } => (Self::LONGVARBINARY, len(length), 0),
            DataType::Numeric { precision, scale } => (Self::NUMERIC, *precision, *scale),
            DataType::Decimal { precision, scale } => (Self::DECIMAL, *precision, *scale),
            DataType::Integer => (Self::INTEGER, 10, 0),
            DataType::SmallInt => (Self::SMALLINT, 5, 0),
            DataType::TinyInt => (Self::TINYINT, 3, 0),
            DataType::BigInt => (Self::BIGINT, 19, 0),
            DataType::Bit => (Self::BIT, 1, 0),
            DataType::Real => (Self::REAL, 7, 0),
            DataType::Float { .. } => (Self::FLOAT, 15, 0),
            DataType::Double => (Self::DOUBLE, 15, 0),
            DataType::Date => (Self::DATE, 10, 0),
            DataType::Time { .. } => (Self::TIME, 8, 0),
            DataType::Timestamp { .. } => (Self::TIMESTAMP, 19, 0),
            DataType::Other { data_type, .. } => (SqlType(data_type.0), 0, 0),
            _ => (Self::UNKNOWN, 0, 0),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// Native (C side) representation of a bound buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeKind {
    Char,
    Bit,
    TinyInt,
    Short,
    Long,
    BigInt,
    Float,
    Double,
    Binary,
    Date,
    Time,
    Timestamp,
    Guid,
}

impl NativeKind {
    /// `SQL_C_*` code passed to bind calls.
    pub fn c_type(self) -> i16 {
        match self {
            Self::Char => 1,
            Self::Bit => -7,
            Self::TinyInt => -6,
            Self::Short => 5,
            Self::Long => 4,
            Self::BigInt => -25,
            Self::Float => 7,
            Self::Double => 8,
            Self::Binary => -2,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Guid => -11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Char => "SQL_C_CHAR",
            Self::Bit => "SQL_C_BIT",
            Self::TinyInt => "SQL_C_TINYINT",
            Self::Short => "SQL_C_SHORT",
            Self::Long => "SQL_C_LONG",
            Self::BigInt => "SQL_C_SBIGINT",
            Self::Float => "SQL_C_FLOAT",
            Self::Double => "SQL_C_DOUBLE",
            Self::Binary => "SQL_C_BINARY",
            Self::Date => "SQL_C_TYPE_DATE",
            Self::Time => "SQL_C_TYPE_TIME",
            Self::Timestamp => "SQL_C_TYPE_TIMESTAMP",
            Self::Guid => "SQL_C_GUID",
        }
    }
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.c_type(), self.name())
    }
}

/// Length/indicator sentinels shared with the driver.
pub const NULL_DATA: i64 = -1;
pub const DATA_AT_EXEC: i64 = -2;
pub const NTS: i64 = -3;
pub const NO_TOTAL: i64 = -4;
pub const LEN_DATA_AT_EXEC_OFFSET: i64 = -100;

/// Status marking a value of `len` bytes that will be supplied at execute time.
pub fn len_data_at_exec(len: usize) -> i64 {
    LEN_DATA_AT_EXEC_OFFSET - len as i64
}

/// Declared length of a pending data-at-execution value, if `status` is one.
pub fn pending_length(status: i64) -> Option<usize> {
    if status <= LEN_DATA_AT_EXEC_OFFSET {
        Some((LEN_DATA_AT_EXEC_OFFSET - status) as usize)
    } else if status == DATA_AT_EXEC {
        Some(0)
    } else {
        None
    }
}

/// Per-row status written by block fetches and positioned operations.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RowStatus {
    #[default]
    Success = 0,
    Deleted = 1,
    Updated = 2,
    NoRow = 3,
    Added = 4,
    Error = 5,
    SuccessWithInfo = 6,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_codes() {
        assert_eq!(SqlType::CHAR.0, 1);
        assert_eq!(SqlType::VARCHAR.0, 12);
        assert_eq!(SqlType::LONGVARCHAR.0, -1);
        assert_eq!(SqlType::BIGINT.0, -5);
        assert_eq!(SqlType::TIMESTAMP.0, 93);
        assert_eq!(SqlType::GUID.0, -11);
    }

    #[test]
    fn test_remap_extended_codes() {
        assert_eq!(SqlType(-99).remap_extended(), SqlType::LONGVARCHAR);
        assert_eq!(SqlType(-98).remap_extended(), SqlType::LONGVARBINARY);
        assert_eq!(SqlType(-350).remap_extended(), SqlType::LONGVARCHAR);
        assert_eq!(SqlType::WVARCHAR.remap_extended(), SqlType::VARCHAR);
        assert_eq!(SqlType::INTEGER.remap_extended(), SqlType::INTEGER);
    }

    #[test]
    fn test_sql_type_display_includes_name() {
        assert_eq!(SqlType::INTEGER.to_string(), "4 (INTEGER)");
        assert_eq!(SqlType(1234).to_string(), "1234 (UNKNOWN)");
    }

    #[test]
    fn test_default_precision() {
        assert_eq!(SqlType::VARCHAR.default_precision(), 255);
        assert_eq!(SqlType::VARBINARY.default_precision(), 255);
        assert_eq!(SqlType::TIMESTAMP.default_precision(), 19);
        assert_eq!(SqlType::INTEGER.default_precision(), 0);
    }

    #[test]
    fn test_is_streamed() {
        assert!(SqlType::LONGVARCHAR.is_streamed());
        assert!(SqlType::LONGVARBINARY.is_streamed());
        assert!(!SqlType::VARCHAR.is_streamed());
    }

    #[test]
    fn test_native_kind_c_types() {
        assert_eq!(NativeKind::Char.c_type(), 1);
        assert_eq!(NativeKind::BigInt.c_type(), -25);
        assert_eq!(NativeKind::Timestamp.c_type(), 93);
        assert_eq!(NativeKind::Long.to_string(), "4 (SQL_C_LONG)");
    }

    #[test]
    fn test_len_data_at_exec_sentinel() {
        assert_eq!(len_data_at_exec(0), -100);
        assert_eq!(len_data_at_exec(10), -110);
        assert_eq!(pending_length(len_data_at_exec(42)), Some(42));
        assert_eq!(pending_length(DATA_AT_EXEC), Some(0));
        assert_eq!(pending_length(NULL_DATA), None);
        assert_eq!(pending_length(17), None);
    }

    #[test]
    fn test_describe_odbc_api_types() {
        use odbc_api::DataType;
        use std::num::NonZero;

        assert_eq!(
            SqlType::describe(&DataType::Varchar {
                length: NonZero::new(40)
            }),
            (SqlType::VARCHAR, 40, 0)
        );
        assert_eq!(
            SqlType::describe(&DataType::Decimal {
                precision: 10,
                scale: 2
            }),
            (SqlType::DECIMAL, 10, 2)
        );
        assert_eq!(SqlType::describe(&DataType::Integer), (SqlType::INTEGER, 10, 0));
        assert_eq!(
            SqlType::describe(&DataType::Timestamp { precision: 3 }),
            (SqlType::TIMESTAMP, 19, 0)
        );
        assert_eq!(
            SqlType::describe(&DataType::LongVarbinary { length: None }),
            (SqlType::LONGVARBINARY, 0, 0)
        );
    }
}
