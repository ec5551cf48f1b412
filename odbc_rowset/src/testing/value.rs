use crate::driver::Diagnostic;
use crate::protocol::{BufferView, Date, Guid, NativeKind, Time, Timestamp, NTS, NULL_DATA};
use std::fmt;

/// Cell value held by the in-memory driver's tables.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    Guid(Guid),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(v.to_string()),
            Value::Double(v) => Some(v.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::Date(d) => Some(d.to_string()),
            Value::Time(t) => Some(t.to_string()),
            Value::Timestamp(ts) => Some(ts.to_string()),
            Value::Guid(g) => Some(g.to_string()),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Double(v) => Some(*v as i64),
            Value::Text(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().map(|f| f as i64))
            }
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => Some(Timestamp::from(*d)),
            Value::Text(s) => s
                .parse::<Timestamp>()
                .ok()
                .or_else(|| s.parse::<Date>().ok().map(Timestamp::from)),
            _ => None,
        }
    }

    /// Bytes handed out by `get_data` for a value of this kind.
    pub(crate) fn stream_bytes(&self, native: NativeKind) -> Option<Vec<u8>> {
        match (self, native) {
            (Value::Null, _) => None,
            (Value::Bytes(b), _) => Some(b.clone()),
            (other, _) => other.as_text().map(String::into_bytes),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Reads row `row` of a bound buffer the way a driver consumes a parameter.
pub(crate) fn read_cell(view: &BufferView<'_>, row: usize) -> Value {
    let status = view.status[row];
    if status == NULL_DATA || (status < 0 && status != NTS) || view.streamed {
        return Value::Null;
    }
    let cell = view.cell(row);
    match view.native {
        NativeKind::Char => {
            let cap = view.width.saturating_sub(1);
            let len = if status == NTS {
                cell.iter().position(|&b| b == 0).unwrap_or(cap)
            } else {
                (status as usize).min(cap)
            };
            Value::Text(String::from_utf8_lossy(&cell[..len]).into_owned())
        }
        NativeKind::Binary => Value::Bytes(cell[..(status.max(0) as usize).min(view.width)].to_vec()),
        NativeKind::Bit | NativeKind::TinyInt => Value::Int(cell[0] as i8 as i64),
        NativeKind::Short => Value::Int(i16::from_ne_bytes([cell[0], cell[1]]) as i64),
        NativeKind::Long => Value::Int(i32::from_ne_bytes([cell[0], cell[1], cell[2], cell[3]]) as i64),
        NativeKind::BigInt => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&cell[..8]);
            Value::Int(i64::from_ne_bytes(raw))
        }
        NativeKind::Float => {
            Value::Double(f32::from_ne_bytes([cell[0], cell[1], cell[2], cell[3]]) as f64)
        }
        NativeKind::Double => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&cell[..8]);
            Value::Double(f64::from_ne_bytes(raw))
        }
        NativeKind::Date => Value::Date(Date::read_struct(cell)),
        NativeKind::Time => Value::Time(Time::read_struct(cell)),
        NativeKind::Timestamp => Value::Timestamp(Timestamp::read_struct(cell)),
        NativeKind::Guid => Value::Guid(Guid::read_struct(cell)),
    }
}

fn cast_error(value: &Value, native: NativeKind) -> Diagnostic {
    Diagnostic::new(
        "22018",
        0,
        format!("Invalid character value for cast: {} to {}", value, native.name()),
    )
}

/// Writes `value` into row `row` of a bound buffer. Returns true when the
/// value had to be truncated.
pub(crate) fn write_cell(
    view: &mut BufferView<'_>,
    row: usize,
    value: &Value,
) -> Result<bool, Diagnostic> {
    if view.streamed {
        return Ok(false);
    }
    if value.is_null() {
        view.status[row] = NULL_DATA;
        return Ok(false);
    }
    let native = view.native;
    let width = view.width;
    let int = || value.as_i64().ok_or_else(|| cast_error(value, native));
    let real = || value.as_f64().ok_or_else(|| cast_error(value, native));
    let mut truncated = false;
    let status = match native {
        NativeKind::Char => {
            let text = value.as_text().unwrap_or_default();
            let bytes = text.as_bytes();
            let cap = width.saturating_sub(1);
            let n = bytes.len().min(cap);
            truncated = n < bytes.len();
            let cell = view.cell_mut(row);
            cell[..n].copy_from_slice(&bytes[..n]);
            if n < cell.len() {
                cell[n] = 0;
            }
            bytes.len() as i64
        }
        NativeKind::Binary => {
            let bytes = value.stream_bytes(native).unwrap_or_default();
            let n = bytes.len().min(width);
            truncated = n < bytes.len();
            view.cell_mut(row)[..n].copy_from_slice(&bytes[..n]);
            bytes.len() as i64
        }
        NativeKind::Bit => {
            view.cell_mut(row)[0] = (int()? != 0) as u8;
            1
        }
        NativeKind::TinyInt => {
            view.cell_mut(row)[0] = int()? as i8 as u8;
            1
        }
        NativeKind::Short => {
            view.cell_mut(row).copy_from_slice(&(int()? as i16).to_ne_bytes());
            2
        }
        NativeKind::Long => {
            view.cell_mut(row).copy_from_slice(&(int()? as i32).to_ne_bytes());
            4
        }
        NativeKind::BigInt => {
            view.cell_mut(row).copy_from_slice(&int()?.to_ne_bytes());
            8
        }
        NativeKind::Float => {
            view.cell_mut(row).copy_from_slice(&(real()? as f32).to_ne_bytes());
            4
        }
        NativeKind::Double => {
            view.cell_mut(row).copy_from_slice(&real()?.to_ne_bytes());
            8
        }
        NativeKind::Date => {
            let date = match value {
                Value::Date(d) => *d,
                other => other
                    .as_timestamp()
                    .ok_or_else(|| cast_error(value, native))?
                    .date(),
            };
            date.write_struct(view.cell_mut(row));
            Date::STRUCT_SIZE as i64
        }
        NativeKind::Time => {
            let time = match value {
                Value::Time(t) => *t,
                Value::Text(s) => s.parse::<Time>().map_err(|_| cast_error(value, native))?,
                other => other
                    .as_timestamp()
                    .ok_or_else(|| cast_error(value, native))?
                    .time(),
            };
            time.write_struct(view.cell_mut(row));
            Time::STRUCT_SIZE as i64
        }
        NativeKind::Timestamp => {
            let ts = value.as_timestamp().ok_or_else(|| cast_error(value, native))?;
            ts.write_struct(view.cell_mut(row));
            Timestamp::STRUCT_SIZE as i64
        }
        NativeKind::Guid => {
            let guid = match value {
                Value::Guid(g) => *g,
                Value::Text(s) => s.parse::<Guid>().map_err(|_| cast_error(value, native))?,
                _ => return Err(cast_error(value, native)),
            };
            guid.write_struct(view.cell_mut(row));
            Guid::STRUCT_SIZE as i64
        }
    };
    view.status[row] = status;
    Ok(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ColumnBuffer, SqlType};

    fn buffer(sql_type: SqlType, precision: usize) -> ColumnBuffer {
        ColumnBuffer::new(sql_type, precision, 0, 1, true).unwrap()
    }

    fn view(col: &mut ColumnBuffer) -> BufferView<'_> {
        let (sql_type, native, width, streamed) =
            (col.sql_type(), col.native(), col.width(), col.is_streamed());
        let (data, status) = col.storage_from(0);
        BufferView {
            sql_type,
            native,
            width,
            streamed,
            data,
            status,
        }
    }

    #[test]
    fn test_write_then_read_through_column_buffer() {
        let mut col = buffer(SqlType::INTEGER, 10);
        write_cell(&mut view(&mut col), 0, &Value::text("42")).unwrap();
        assert_eq!(col.get_int().unwrap(), 42);
        col.set_int(-7).unwrap();
        assert_eq!(read_cell(&view(&mut col), 0), Value::Int(-7));
    }

    #[test]
    fn test_char_write_reports_truncation() {
        let mut col = buffer(SqlType::VARCHAR, 3);
        let truncated = write_cell(&mut view(&mut col), 0, &Value::text("abcdef")).unwrap();
        assert!(truncated);
        assert_eq!(col.get_string().unwrap(), "abc");
        assert_eq!(col.status(), 6);
    }

    #[test]
    fn test_null_and_cast_failures() {
        let mut col = buffer(SqlType::DOUBLE, 15);
        write_cell(&mut view(&mut col), 0, &Value::Null).unwrap();
        assert!(col.is_null());
        let err = write_cell(&mut view(&mut col), 0, &Value::text("abc")).unwrap_err();
        assert_eq!(err.sqlstate_str(), "22018");
    }

    #[test]
    fn test_date_from_timestamp_value() {
        let mut col = buffer(SqlType::DATE, 10);
        let ts = Timestamp::from_parts(2024, 2, 29, 10, 0, 0, 0).unwrap();
        write_cell(&mut view(&mut col), 0, &Value::Timestamp(ts)).unwrap();
        assert_eq!(col.get_date().unwrap().to_string(), "2024-02-29");
    }
}
