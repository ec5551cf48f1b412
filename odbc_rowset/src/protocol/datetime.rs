use crate::error::{OdbcError, Result};
use std::fmt;
use std::str::FromStr;

fn out_of_range(kind: &str, what: &str, value: i64) -> OdbcError {
    OdbcError::InvalidDateTime(format!("Invalid {}: {} out of range ({})", kind, what, value))
}

fn parse_field(kind: &str, input: &str, field: &str) -> Result<i64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        return Err(OdbcError::InvalidDateTime(format!(
            "Unrecognized {} format: {}",
            kind, input
        )));
    }
    field
        .parse::<i64>()
        .map_err(|_| OdbcError::InvalidDateTime(format!("Unrecognized {} format: {}", kind, input)))
}

/// Calendar date with the field ranges of `SQL_DATE_STRUCT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    year: i16,
    month: u16,
    day: u16,
}

impl Date {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        if !(i16::MIN as i32..=i16::MAX as i32).contains(&year) {
            return Err(out_of_range("DATE", "year", year as i64));
        }
        if !(1..=12).contains(&month) {
            return Err(out_of_range("DATE", "month", month as i64));
        }
        if !(1..=31).contains(&day) {
            return Err(out_of_range("DATE", "day", day as i64));
        }
        Ok(Self {
            year: year as i16,
            month: month as u16,
            day: day as u16,
        })
    }

    pub fn year(&self) -> i32 {
        self.year as i32
    }

    pub fn month(&self) -> u32 {
        self.month as u32
    }

    pub fn day(&self) -> u32 {
        self.day as u32
    }

    pub(crate) const STRUCT_SIZE: usize = 6;

    pub(crate) fn write_struct(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.year.to_ne_bytes());
        out[2..4].copy_from_slice(&self.month.to_ne_bytes());
        out[4..6].copy_from_slice(&self.day.to_ne_bytes());
    }

    pub(crate) fn read_struct(raw: &[u8]) -> Self {
        Self {
            year: i16::from_ne_bytes([raw[0], raw[1]]),
            month: u16::from_ne_bytes([raw[2], raw[3]]),
            day: u16::from_ne_bytes([raw[4], raw[5]]),
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for Date {
    type Err = OdbcError;

    fn from_str(s: &str) -> Result<Self> {
        let b = s.as_bytes();
        if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
            return Err(OdbcError::InvalidDateTime(format!(
                "Unrecognized date format: {}",
                s
            )));
        }
        let year = parse_field("date", s, &s[0..4])?;
        let month = parse_field("date", s, &s[5..7])?;
        let day = parse_field("date", s, &s[8..10])?;
        Date::new(year as i32, month as u32, day as u32)
    }
}

/// Time of day with the field ranges of `SQL_TIME_STRUCT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    hour: u16,
    minute: u16,
    second: u16,
}

impl Time {
    pub fn new(hour: u32, minute: u32, second: u32) -> Result<Self> {
        if hour > 23 {
            return Err(out_of_range("TIME", "hour", hour as i64));
        }
        if minute > 59 {
            return Err(out_of_range("TIME", "minute", minute as i64));
        }
        // 60 and 61 are leap seconds
        if second > 61 {
            return Err(out_of_range("TIME", "second", second as i64));
        }
        Ok(Self {
            hour: hour as u16,
            minute: minute as u16,
            second: second as u16,
        })
    }

    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }

    pub fn second(&self) -> u32 {
        self.second as u32
    }

    pub(crate) const STRUCT_SIZE: usize = 6;

    pub(crate) fn write_struct(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.hour.to_ne_bytes());
        out[2..4].copy_from_slice(&self.minute.to_ne_bytes());
        out[4..6].copy_from_slice(&self.second.to_ne_bytes());
    }

    pub(crate) fn read_struct(raw: &[u8]) -> Self {
        Self {
            hour: u16::from_ne_bytes([raw[0], raw[1]]),
            minute: u16::from_ne_bytes([raw[2], raw[3]]),
            second: u16::from_ne_bytes([raw[4], raw[5]]),
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl FromStr for Time {
    type Err = OdbcError;

    fn from_str(s: &str) -> Result<Self> {
        let b = s.as_bytes();
        if b.len() != 8 || b[2] != b':' || b[5] != b':' {
            return Err(OdbcError::InvalidDateTime(format!(
                "Unrecognized time format: {}",
                s
            )));
        }
        let hour = parse_field("time", s, &s[0..2])?;
        let minute = parse_field("time", s, &s[3..5])?;
        let second = parse_field("time", s, &s[6..8])?;
        if hour < 0 || minute < 0 || second < 0 {
            return Err(OdbcError::InvalidDateTime(format!(
                "Unrecognized time format: {}",
                s
            )));
        }
        Time::new(hour as u32, minute as u32, second as u32)
    }
}

/// Date and time with nanosecond fraction (`SQL_TIMESTAMP_STRUCT`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    date: Date,
    time: Time,
    nanos: u32,
}

impl Timestamp {
    pub fn new(date: Date, time: Time, nanos: u32) -> Result<Self> {
        if nanos > 999_999_999 {
            return Err(out_of_range("TIMESTAMP", "nanos", nanos as i64));
        }
        Ok(Self { date, time, nanos })
    }

    pub fn from_parts(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        nanos: u32,
    ) -> Result<Self> {
        Self::new(
            Date::new(year, month, day)?,
            Time::new(hour, minute, second)?,
            nanos,
        )
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub(crate) const STRUCT_SIZE: usize = 16;

    pub(crate) fn write_struct(&self, out: &mut [u8]) {
        self.date.write_struct(&mut out[0..6]);
        self.time.write_struct(&mut out[6..12]);
        out[12..16].copy_from_slice(&self.nanos.to_ne_bytes());
    }

    pub(crate) fn read_struct(raw: &[u8]) -> Self {
        Self {
            date: Date::read_struct(&raw[0..6]),
            time: Time::read_struct(&raw[6..12]),
            nanos: u32::from_ne_bytes([raw[12], raw[13], raw[14], raw[15]]),
        }
    }

    /// Timestamp holding only a time of day; the date part is zeroed.
    pub(crate) fn from_time(time: Time) -> Self {
        Self {
            date: Date::default(),
            time,
            nanos: 0,
        }
    }
}

impl From<Date> for Timestamp {
    fn from(date: Date) -> Self {
        Self {
            date,
            time: Time::default(),
            nanos: 0,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)?;
        if self.nanos > 0 {
            write!(f, ".{:09}", self.nanos)?;
        }
        Ok(())
    }
}

impl FromStr for Timestamp {
    type Err = OdbcError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() < 19 || s.len() > 30 || !s.is_ascii() || s.as_bytes()[10] != b' ' {
            return Err(OdbcError::InvalidDateTime(format!(
                "Unrecognized timestamp format: {}",
                s
            )));
        }
        let date: Date = s[0..10].parse()?;
        let time: Time = s[11..19].parse()?;
        let nanos = match &s[19..] {
            "" => 0,
            rest => {
                let digits = rest.strip_prefix('.').unwrap_or("");
                if digits.is_empty()
                    || digits.len() > 9
                    || !digits.bytes().all(|b| b.is_ascii_digit())
                {
                    return Err(OdbcError::InvalidDateTime(format!(
                        "Unrecognized timestamp format: {}",
                        s
                    )));
                }
                let value: u32 = digits.parse().map_err(|_| {
                    OdbcError::InvalidDateTime(format!("Unrecognized timestamp format: {}", s))
                })?;
                value * 10u32.pow(9 - digits.len() as u32)
            }
        };
        Timestamp::new(date, time, nanos)
    }
}

/// Globally unique identifier laid out as `SQLGUID`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub(crate) const STRUCT_SIZE: usize = 16;

    pub(crate) fn write_struct(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.data1.to_ne_bytes());
        out[4..6].copy_from_slice(&self.data2.to_ne_bytes());
        out[6..8].copy_from_slice(&self.data3.to_ne_bytes());
        out[8..16].copy_from_slice(&self.data4);
    }

    pub(crate) fn read_struct(raw: &[u8]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&raw[8..16]);
        Self {
            data1: u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]),
            data2: u16::from_ne_bytes([raw[4], raw[5]]),
            data3: u16::from_ne_bytes([raw[6], raw[7]]),
            data4,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        for b in &self.data4[2..] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for Guid {
    type Err = OdbcError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || OdbcError::InvalidCharacterValue(format!("Invalid GUID: {}", s));
        let s = s.trim().trim_start_matches('{').trim_end_matches('}');
        let parts: Vec<&str> = s.split('-').collect();
        if !s.is_ascii()
            || parts.len() != 5
            || [8, 4, 4, 4, 12]
                .iter()
                .zip(&parts)
                .any(|(len, part)| part.len() != *len)
        {
            return Err(invalid());
        }
        let data1 = u32::from_str_radix(parts[0], 16).map_err(|_| invalid())?;
        let data2 = u16::from_str_radix(parts[1], 16).map_err(|_| invalid())?;
        let data3 = u16::from_str_radix(parts[2], 16).map_err(|_| invalid())?;
        let tail = format!("{}{}", parts[3], parts[4]);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self {
            data1,
            data2,
            data3,
            data4,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_display_and_parse() {
        let d = Date::new(2024, 2, 9).unwrap();
        assert_eq!(d.to_string(), "2024-02-09");
        assert_eq!("2024-02-09".parse::<Date>().unwrap(), d);
    }

    #[test]
    fn test_date_rejects_bad_format() {
        let err = "2024-2-9".parse::<Date>().unwrap_err();
        assert_eq!(&err.sqlstate(), b"22007");
        assert!(err.to_string().contains("Unrecognized date format"));
    }

    #[test]
    fn test_date_rejects_out_of_range_month() {
        let err = "2024-13-01".parse::<Date>().unwrap_err();
        assert_eq!(&err.sqlstate(), b"22007");
        assert!(err.to_string().contains("month out of range (13)"));
    }

    #[test]
    fn test_time_display_and_parse() {
        let t = Time::new(7, 5, 3).unwrap();
        assert_eq!(t.to_string(), "07:05:03");
        assert_eq!("07:05:03".parse::<Time>().unwrap(), t);
        assert!("24:00:00".parse::<Time>().is_err());
        assert!("7:05:03".parse::<Time>().is_err());
    }

    #[test]
    fn test_timestamp_display_without_fraction() {
        let ts = Timestamp::from_parts(1999, 12, 31, 23, 59, 58, 0).unwrap();
        assert_eq!(ts.to_string(), "1999-12-31 23:59:58");
    }

    #[test]
    fn test_timestamp_fraction_roundtrip() {
        let ts: Timestamp = "2001-01-02 03:04:05.5".parse().unwrap();
        assert_eq!(ts.nanos(), 500_000_000);
        assert_eq!(ts.to_string(), "2001-01-02 03:04:05.500000000");
        assert_eq!(ts.to_string().parse::<Timestamp>().unwrap(), ts);
    }

    #[test]
    fn test_timestamp_rejects_garbage_fraction() {
        assert!("2001-01-02 03:04:05.x".parse::<Timestamp>().is_err());
        assert!("2001-01-02T03:04:05".parse::<Timestamp>().is_err());
        assert!("2001-01-02".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_struct_layouts() {
        let ts = Timestamp::from_parts(2020, 6, 15, 12, 30, 45, 123).unwrap();
        let mut raw = [0u8; Timestamp::STRUCT_SIZE];
        ts.write_struct(&mut raw);
        assert_eq!(i16::from_ne_bytes([raw[0], raw[1]]), 2020);
        assert_eq!(u16::from_ne_bytes([raw[8], raw[9]]), 30);
        assert_eq!(Timestamp::read_struct(&raw), ts);
    }

    #[test]
    fn test_guid_text_form() {
        let text = "6f9619ff-8b86-d011-b42d-00c04fc964ff";
        let g: Guid = text.parse().unwrap();
        assert_eq!(g.data1, 0x6f9619ff);
        assert_eq!(g.data4[0], 0xb4);
        assert_eq!(g.to_string(), text);

        let mut raw = [0u8; Guid::STRUCT_SIZE];
        g.write_struct(&mut raw);
        assert_eq!(Guid::read_struct(&raw), g);
    }

    #[test]
    fn test_guid_rejects_bad_text() {
        let err = "not-a-guid".parse::<Guid>().unwrap_err();
        assert_eq!(&err.sqlstate(), b"22018");
    }
}
