use super::chunk_stream::ChunkStream;
use super::datetime::{Date, Guid, Time, Timestamp};
use super::types::{len_data_at_exec, NativeKind, SqlType, NO_TOTAL, NTS, NULL_DATA};
use crate::error::{OdbcError, Result};

/// Numeric value read from a buffer before narrowing to the requested type.
#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    fn as_i64(self) -> i64 {
        match self {
            Number::Int(v) => v,
            Number::Real(v) => v as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Real(v) => v,
        }
    }
}

fn parse_number(text: &str) -> Result<Number> {
    let t = text.trim();
    if let Ok(v) = t.parse::<i64>() {
        return Ok(Number::Int(v));
    }
    t.parse::<f64>()
        .map(Number::Real)
        .map_err(|_| OdbcError::InvalidCharacterValue(text.to_string()))
}

/// Strips an ODBC `{d '...'}`, `{t '...'}` or `{ts '...'}` escape.
fn unescape(text: &str) -> &str {
    let t = text.trim();
    for prefix in ["{ts '", "{d '", "{t '"] {
        if let Some(inner) = t.strip_prefix(prefix).and_then(|r| r.strip_suffix("'}")) {
            return inner;
        }
    }
    t
}

/// Storage for one bound column or parameter across every row of a rowset.
///
/// Fixed-width values live in one contiguous block of `rows * width` bytes
/// in the driver's native layout. Long values have no storage; they travel
/// through a [`ChunkStream`] attached to the current row.
#[derive(Debug)]
pub struct ColumnBuffer {
    sql_type: SqlType,
    native: NativeKind,
    precision: usize,
    scale: i16,
    width: usize,
    rows: usize,
    current_row: usize,
    data: Vec<u8>,
    status: Vec<i64>,
    streamed: bool,
    stream: Option<ChunkStream>,
}

impl ColumnBuffer {
    /// `odbc3` selects 64-bit native storage for BIGINT; older drivers get
    /// a character buffer.
    pub fn new(
        sql_type: SqlType,
        precision: usize,
        scale: i16,
        rows: usize,
        odbc3: bool,
    ) -> Result<Self> {
        let mut scale = scale;
        let (native, width, streamed) = match sql_type {
            SqlType::CHAR | SqlType::VARCHAR => {
                scale = 0;
                (NativeKind::Char, precision + 1, false)
            }
            SqlType::NUMERIC | SqlType::DECIMAL => (NativeKind::Char, precision + 3, false),
            SqlType::BIGINT => {
                scale = 0;
                if odbc3 {
                    (NativeKind::BigInt, 8, false)
                } else {
                    (NativeKind::Char, 21, false)
                }
            }
            SqlType::BIT => {
                scale = 0;
                (NativeKind::Bit, 1, false)
            }
            SqlType::TINYINT => {
                scale = 0;
                (NativeKind::TinyInt, 1, false)
            }
            SqlType::SMALLINT => {
                scale = 0;
                (NativeKind::Short, 2, false)
            }
            SqlType::INTEGER => {
                scale = 0;
                (NativeKind::Long, 4, false)
            }
            SqlType::FLOAT | SqlType::DOUBLE => (NativeKind::Double, 8, false),
            SqlType::REAL => (NativeKind::Float, 4, false),
            SqlType::BINARY | SqlType::VARBINARY => (NativeKind::Binary, precision, false),
            SqlType::DATE => (NativeKind::Date, Date::STRUCT_SIZE, false),
            SqlType::TIME => (NativeKind::Time, Time::STRUCT_SIZE, false),
            SqlType::TIMESTAMP => (NativeKind::Timestamp, Timestamp::STRUCT_SIZE, false),
            SqlType::GUID => (NativeKind::Guid, Guid::STRUCT_SIZE, false),
            SqlType::LONGVARCHAR => (NativeKind::Char, 0, true),
            SqlType::LONGVARBINARY => (NativeKind::Binary, 0, true),
            other => return Err(OdbcError::UnsupportedType(other)),
        };

        let total = rows
            .checked_mul(width)
            .ok_or(OdbcError::AllocationFailed(usize::MAX))?;
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| OdbcError::AllocationFailed(total))?;
        data.resize(total, 0);
        let mut status = Vec::new();
        status
            .try_reserve_exact(rows)
            .map_err(|_| OdbcError::AllocationFailed(rows * std::mem::size_of::<i64>()))?;
        status.resize(rows, NULL_DATA);

        Ok(Self {
            sql_type,
            native,
            precision,
            scale,
            width,
            rows,
            current_row: 0,
            data,
            status,
            streamed,
            stream: None,
        })
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn native(&self) -> NativeKind {
        self.native
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn scale(&self) -> i16 {
        self.scale
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_streamed(&self) -> bool {
        self.streamed
    }

    pub fn current_row(&self) -> usize {
        self.current_row
    }

    pub(crate) fn set_row(&mut self, row: usize) {
        self.current_row = row;
    }

    /// Length/indicator of the current row.
    pub fn status(&self) -> i64 {
        self.status[self.current_row]
    }

    pub fn set_status(&mut self, status: i64) {
        self.status[self.current_row] = status;
    }

    pub fn is_null(&self) -> bool {
        self.status() == NULL_DATA
    }

    /// Storage and indicators from `from_row` to the end of the buffer.
    pub fn storage_from(&mut self, from_row: usize) -> (&mut [u8], &mut [i64]) {
        let from_row = from_row.min(self.rows);
        (
            &mut self.data[from_row * self.width..],
            &mut self.status[from_row..],
        )
    }

    fn cell(&self) -> &[u8] {
        let start = self.current_row * self.width;
        &self.data[start..start + self.width]
    }

    fn cell_mut(&mut self) -> &mut [u8] {
        let start = self.current_row * self.width;
        &mut self.data[start..start + self.width]
    }

    fn unsupported_get(&self, target: &'static str) -> OdbcError {
        OdbcError::UnsupportedCoercion {
            verb: "get",
            sql_type: self.sql_type,
            native: self.native,
            target,
        }
    }

    fn unsupported_set(&self, target: &'static str) -> OdbcError {
        OdbcError::UnsupportedCoercion {
            verb: "set",
            sql_type: self.sql_type,
            native: self.native,
            target,
        }
    }

    /// Text held by a character buffer on the current row.
    fn text(&self) -> String {
        let cell = self.cell();
        let cap = self.width.saturating_sub(1);
        let len = match self.status() {
            NTS => cell.iter().position(|&b| b == 0).unwrap_or(cap),
            NO_TOTAL => cap,
            n if n >= 0 => (n as usize).min(cap),
            _ => 0,
        };
        String::from_utf8_lossy(&cell[..len]).into_owned()
    }

    fn number(&self, target: &'static str) -> Result<Number> {
        let cell = self.cell();
        match self.native {
            NativeKind::Bit | NativeKind::TinyInt => Ok(Number::Int(cell[0] as i8 as i64)),
            NativeKind::Short => Ok(Number::Int(i16::from_ne_bytes([cell[0], cell[1]]) as i64)),
            NativeKind::Long => Ok(Number::Int(
                i32::from_ne_bytes([cell[0], cell[1], cell[2], cell[3]]) as i64,
            )),
            NativeKind::BigInt => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&cell[..8]);
                Ok(Number::Int(i64::from_ne_bytes(raw)))
            }
            NativeKind::Float => Ok(Number::Real(
                f32::from_ne_bytes([cell[0], cell[1], cell[2], cell[3]]) as f64,
            )),
            NativeKind::Double => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&cell[..8]);
                Ok(Number::Real(f64::from_ne_bytes(raw)))
            }
            NativeKind::Char if !self.streamed => parse_number(&self.text()),
            _ => Err(self.unsupported_get(target)),
        }
    }

    pub fn get_boolean(&self) -> Result<bool> {
        Ok(self.get_int()? != 0)
    }

    pub fn get_byte(&self) -> Result<i8> {
        Ok(self.get_int()? as i8)
    }

    pub fn get_short(&self) -> Result<i16> {
        Ok(self.get_int()? as i16)
    }

    pub fn get_int(&self) -> Result<i32> {
        if self.is_null() {
            return Ok(0);
        }
        Ok(self.number("as an int")?.as_i64() as i32)
    }

    pub fn get_long(&self) -> Result<i64> {
        if self.is_null() {
            return Ok(0);
        }
        Ok(self.number("as a long")?.as_i64())
    }

    pub fn get_float(&self) -> Result<f32> {
        if self.is_null() {
            return Ok(0.0);
        }
        Ok(self.number("as a float")?.as_f64() as f32)
    }

    pub fn get_double(&self) -> Result<f64> {
        if self.is_null() {
            return Ok(0.0);
        }
        Ok(self.number("as a double")?.as_f64())
    }

    pub fn get_date(&self) -> Result<Date> {
        if self.is_null() {
            return Ok(Date::default());
        }
        match self.native {
            NativeKind::Date => Ok(Date::read_struct(self.cell())),
            NativeKind::Timestamp => Ok(Timestamp::read_struct(self.cell()).date()),
            NativeKind::Char if !self.streamed => unescape(&self.text()).parse(),
            _ => Err(self.unsupported_get("as a Date")),
        }
    }

    pub fn get_time(&self) -> Result<Time> {
        if self.is_null() {
            return Ok(Time::default());
        }
        match self.native {
            NativeKind::Time => Ok(Time::read_struct(self.cell())),
            NativeKind::Timestamp => Ok(Timestamp::read_struct(self.cell()).time()),
            NativeKind::Char if !self.streamed => unescape(&self.text()).parse(),
            _ => Err(self.unsupported_get("as a Time")),
        }
    }

    pub fn get_timestamp(&self) -> Result<Timestamp> {
        if self.is_null() {
            return Ok(Timestamp::default());
        }
        match self.native {
            NativeKind::Timestamp => Ok(Timestamp::read_struct(self.cell())),
            NativeKind::Date => Ok(Date::read_struct(self.cell()).into()),
            NativeKind::Time => Ok(Timestamp::from_time(Time::read_struct(self.cell()))),
            NativeKind::Char if !self.streamed => unescape(&self.text()).parse(),
            _ => Err(self.unsupported_get("as a Timestamp")),
        }
    }

    pub fn get_guid(&self) -> Result<Guid> {
        if self.is_null() {
            return Ok(Guid::default());
        }
        match self.native {
            NativeKind::Guid => Ok(Guid::read_struct(self.cell())),
            _ => Err(self.unsupported_get("as a Guid")),
        }
    }

    pub fn get_string(&self) -> Result<String> {
        if self.is_null() {
            return Ok(String::new());
        }
        match self.native {
            NativeKind::Char if !self.streamed => Ok(self.text()),
            NativeKind::Date => Ok(self.get_date()?.to_string()),
            NativeKind::Time => Ok(self.get_time()?.to_string()),
            NativeKind::Timestamp => Ok(self.get_timestamp()?.to_string()),
            NativeKind::Guid => Ok(self.get_guid()?.to_string()),
            NativeKind::Bit | NativeKind::TinyInt | NativeKind::Short | NativeKind::Long => {
                Ok(self.get_int()?.to_string())
            }
            NativeKind::BigInt => Ok(self.get_long()?.to_string()),
            NativeKind::Float => Ok(self.get_float()?.to_string()),
            NativeKind::Double => Ok(self.get_double()?.to_string()),
            _ => Err(self.unsupported_get("as a string")),
        }
    }

    pub fn get_bytes(&self) -> Result<Vec<u8>> {
        if self.is_null() {
            return Ok(Vec::new());
        }
        match self.native {
            NativeKind::Char | NativeKind::Binary if !self.streamed => {
                let cell = self.cell();
                let len = match self.status() {
                    NTS => cell.iter().position(|&b| b == 0).unwrap_or(cell.len()),
                    n if n >= 0 => (n as usize).min(cell.len()),
                    _ => cell.len(),
                };
                Ok(cell[..len].to_vec())
            }
            _ => Err(self.unsupported_get("as bytes")),
        }
    }

    fn store_number(&mut self, value: Number, target: &'static str) -> Result<()> {
        let size = match self.native {
            NativeKind::Bit | NativeKind::TinyInt => {
                self.cell_mut()[0] = value.as_i64() as i8 as u8;
                1
            }
            NativeKind::Short => {
                let v = value.as_i64() as i16;
                self.cell_mut()[..2].copy_from_slice(&v.to_ne_bytes());
                2
            }
            NativeKind::Long => {
                let v = value.as_i64() as i32;
                self.cell_mut()[..4].copy_from_slice(&v.to_ne_bytes());
                4
            }
            NativeKind::BigInt => {
                let v = value.as_i64();
                self.cell_mut()[..8].copy_from_slice(&v.to_ne_bytes());
                8
            }
            NativeKind::Float => {
                let v = value.as_f64() as f32;
                self.cell_mut()[..4].copy_from_slice(&v.to_ne_bytes());
                4
            }
            NativeKind::Double => {
                let v = value.as_f64();
                self.cell_mut()[..8].copy_from_slice(&v.to_ne_bytes());
                8
            }
            NativeKind::Char if !self.streamed => {
                let text = match value {
                    Number::Int(v) => v.to_string(),
                    Number::Real(v) => v.to_string(),
                };
                return self.set_string(&text);
            }
            _ => return Err(self.unsupported_set(target)),
        };
        self.set_status(size);
        Ok(())
    }

    pub fn set_boolean(&mut self, value: bool) -> Result<()> {
        self.set_int(value as i32)
    }

    pub fn set_byte(&mut self, value: i8) -> Result<()> {
        self.set_int(value as i32)
    }

    pub fn set_short(&mut self, value: i16) -> Result<()> {
        self.set_int(value as i32)
    }

    pub fn set_int(&mut self, value: i32) -> Result<()> {
        self.store_number(Number::Int(value as i64), "to an int")
    }

    pub fn set_long(&mut self, value: i64) -> Result<()> {
        self.store_number(Number::Int(value), "to a long")
    }

    pub fn set_float(&mut self, value: f32) -> Result<()> {
        if self.native == NativeKind::Char && !self.streamed {
            return self.set_string(&value.to_string());
        }
        self.store_number(Number::Real(value as f64), "to a float")
    }

    pub fn set_double(&mut self, value: f64) -> Result<()> {
        self.store_number(Number::Real(value), "to a double")
    }

    pub fn set_date(&mut self, value: &Date) -> Result<()> {
        match self.native {
            NativeKind::Date => {
                value.write_struct(self.cell_mut());
                self.set_status(Date::STRUCT_SIZE as i64);
                Ok(())
            }
            NativeKind::Timestamp => {
                Timestamp::from(*value).write_struct(self.cell_mut());
                self.set_status(Timestamp::STRUCT_SIZE as i64);
                Ok(())
            }
            NativeKind::Char if !self.streamed => self.set_string(&format!("{{d '{}'}}", value)),
            _ => Err(self.unsupported_set("to a Date")),
        }
    }

    pub fn set_time(&mut self, value: &Time) -> Result<()> {
        match self.native {
            NativeKind::Time => {
                value.write_struct(self.cell_mut());
                self.set_status(Time::STRUCT_SIZE as i64);
                Ok(())
            }
            NativeKind::Char if !self.streamed => self.set_string(&format!("{{t '{}'}}", value)),
            _ => Err(self.unsupported_set("to a Time")),
        }
    }

    pub fn set_timestamp(&mut self, value: &Timestamp) -> Result<()> {
        match self.native {
            NativeKind::Timestamp => {
                value.write_struct(self.cell_mut());
                self.set_status(Timestamp::STRUCT_SIZE as i64);
                Ok(())
            }
            NativeKind::Char if !self.streamed => self.set_string(&format!("{{ts '{}'}}", value)),
            _ => Err(self.unsupported_set("to a Timestamp")),
        }
    }

    pub fn set_guid(&mut self, value: &Guid) -> Result<()> {
        match self.native {
            NativeKind::Guid => {
                value.write_struct(self.cell_mut());
                self.set_status(Guid::STRUCT_SIZE as i64);
                Ok(())
            }
            NativeKind::Char if !self.streamed => self.set_string(&value.to_string()),
            _ => Err(self.unsupported_set("to a Guid")),
        }
    }

    pub fn set_string(&mut self, value: &str) -> Result<()> {
        match self.native {
            NativeKind::Char if self.streamed => {
                let len = value.len();
                self.set_stream(ChunkStream::from_bytes(value.as_bytes().to_vec()), len)
            }
            NativeKind::Char => {
                let cap = self.width.saturating_sub(1);
                let bytes = value.as_bytes();
                let len = bytes.len().min(cap);
                let pad = if self.sql_type == SqlType::CHAR {
                    cap - len
                } else {
                    0
                };
                let cell = self.cell_mut();
                cell[..len].copy_from_slice(&bytes[..len]);
                cell[len..len + pad].fill(b' ');
                if len + pad < cell.len() {
                    cell[len + pad] = 0;
                }
                self.set_status((len + pad) as i64);
                Ok(())
            }
            NativeKind::Bit
            | NativeKind::TinyInt
            | NativeKind::Short
            | NativeKind::Long
            | NativeKind::BigInt => {
                let v = parse_number(value)?.as_i64();
                self.store_number(Number::Int(v), "to a string")
            }
            NativeKind::Float | NativeKind::Double => {
                let v = parse_number(value)?.as_f64();
                self.store_number(Number::Real(v), "to a string")
            }
            NativeKind::Date => self.set_date(&unescape(value).parse()?),
            NativeKind::Time => self.set_time(&unescape(value).parse()?),
            NativeKind::Timestamp => self.set_timestamp(&unescape(value).parse()?),
            NativeKind::Guid => self.set_guid(&value.parse()?),
            NativeKind::Binary => Err(self.unsupported_set("to a string")),
        }
    }

    pub fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        match self.native {
            NativeKind::Binary if self.streamed => {
                self.set_stream(ChunkStream::from_bytes(value.to_vec()), value.len())
            }
            NativeKind::Binary | NativeKind::Guid => {
                let len = value.len().min(self.width);
                self.cell_mut()[..len].copy_from_slice(&value[..len]);
                self.set_status(len as i64);
                Ok(())
            }
            _ => Err(self.unsupported_set("to bytes")),
        }
    }

    pub fn set_null(&mut self) {
        self.reset_stream();
        self.set_status(NULL_DATA);
    }

    pub fn get_stream(&mut self) -> Result<Option<&mut ChunkStream>> {
        if !self.streamed {
            return Err(self.unsupported_get("as a stream"));
        }
        Ok(self.stream.as_mut())
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// True when the current row carries a stream with data left to send.
    pub fn has_pending_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.is_exhausted())
    }

    /// Attaches a value of `len` bytes to be supplied at execution time.
    pub fn set_stream(&mut self, stream: ChunkStream, len: usize) -> Result<()> {
        if !self.streamed {
            return Err(self.unsupported_set("to a stream"));
        }
        self.reset_stream();
        self.stream = Some(stream);
        self.set_status(len_data_at_exec(len));
        Ok(())
    }

    /// Attaches a stream over a fetched value; the indicator is left alone.
    pub fn set_fetched_stream(&mut self, stream: ChunkStream) {
        self.reset_stream();
        self.stream = Some(stream);
    }

    pub fn owns_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(ChunkStream::is_owned)
    }

    pub fn reset_stream(&mut self) {
        self.stream = None;
    }

    /// Long columns are never bound, so their indicator is only known once
    /// a stream is opened on the new row.
    pub fn row_changed(&mut self) {
        self.reset_stream();
        if self.streamed {
            self.set_status(NULL_DATA);
        }
    }

    pub fn after_update(&mut self) {
        self.reset_stream();
    }
}
