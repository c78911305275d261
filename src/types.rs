use core::fmt;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};

/// Civil date/time with the 2-second resolution of the MS-DOS wire format.
///
/// Representable years span [1980, 2107]; values outside that window are
/// clamped on construction so the encoded form never wraps.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DateTimeCS {
    year: u16,
    month: u16,
    day: u16,
    hour: u16,
    minute: u16,
    second: u16,
}

pub const DOS_EPOCH_YEAR: u16 = 1980;
pub const DOS_MAX_YEAR: u16 = 2107;

impl Default for DateTimeCS {
    /// MS-DOS origin time, 1980-01-01 00:00:00.
    fn default() -> Self {
        Self {
            year: DOS_EPOCH_YEAR,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl DateTimeCS {
    pub fn new(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Self {
        Self {
            year: year.clamp(DOS_EPOCH_YEAR, DOS_MAX_YEAR),
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub fn from_chrono_datetime<Tz: TimeZone>(datetime: DateTime<Tz>) -> Self {
        let year = datetime.year().clamp(DOS_EPOCH_YEAR as i32, DOS_MAX_YEAR as i32) as u16;
        Self {
            year,
            month: datetime.month() as u16,
            day: datetime.day() as u16,
            hour: datetime.hour() as u16,
            minute: datetime.minute() as u16,
            second: datetime.second() as u16,
        }
    }

    pub fn now() -> Self {
        Self::from_chrono_datetime(Local::now())
    }

    pub fn from_timestamp(timestamp: i32) -> Self {
        match Utc.timestamp_opt(timestamp as i64, 0) {
            chrono::LocalResult::Single(single) => Self::from_chrono_datetime(single),
            chrono::LocalResult::Ambiguous(first, _) => Self::from_chrono_datetime(first),
            chrono::LocalResult::None => Self::default(),
        }
    }

    pub fn from_msdos(datepart: u16, timepart: u16) -> Self {
        let seconds = (timepart & 0b0000000000011111) << 1;
        let minutes = (timepart & 0b0000011111100000) >> 5;
        let hours = (timepart & 0b1111100000000000) >> 11;
        let days = datepart & 0b0000000000011111;
        let months = (datepart & 0b0000000111100000) >> 5;
        let years = (datepart & 0b1111111000000000) >> 9;

        Self {
            year: years + DOS_EPOCH_YEAR,
            month: months,
            day: days,
            hour: hours,
            minute: minutes,
            second: seconds,
        }
    }

    /// Encode as the (date, time) pair of the local and central headers.
    pub fn ms_dos(&self) -> (u16, u16) {
        let date = self.day | (self.month << 5) | self.year.saturating_sub(DOS_EPOCH_YEAR) << 9;
        let time = (self.second / 2) | (self.minute << 5) | self.hour << 11;
        (date, time)
    }

    pub fn to_time(&self) -> chrono::NaiveDateTime {
        let fallback = DateTimeCS::default();
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
            .or_else(|| {
                NaiveDate::from_ymd_opt(
                    fallback.year as i32,
                    fallback.month as u32,
                    fallback.day as u32,
                )
            })
            .unwrap_or_default();

        date.and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
            .unwrap_or_default()
    }

    pub fn to_timestamp(&self) -> i32 {
        let timestamp = self.to_time().and_utc().timestamp();
        i32::try_from(timestamp).unwrap_or(i32::MAX)
    }
}

impl fmt::Display for DateTimeCS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_time())
    }
}

/// The (timezone-less) date and time written in the archive alongside a file.
///
/// Use `FileDateTime::Zero` if the date and time are insignificant; that
/// encodes as 0, which is 1980, January 1st, 12AM.
/// Use `FileDateTime::Custom` to set an explicit date and time.
/// `FileDateTime::Now` takes the current local time.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum FileDateTime {
    /// MS-DOS origin time i.e. 1980, January 1st, 12AM.
    #[default]
    Zero,

    Custom(DateTimeCS),

    Now,

    /// Current timestamp, also recorded in a 0x5455 extended-timestamp extra.
    UnixNow,

    /// Custom unix time (seconds since epoch), also recorded in a 0x5455
    /// extended-timestamp extra.
    UnixCustom(i32),
}

impl FileDateTime {
    fn tuple(&self) -> DateTimeCS {
        match self {
            FileDateTime::Zero => DateTimeCS::default(),
            FileDateTime::Custom(date_time) => *date_time,
            FileDateTime::Now | FileDateTime::UnixNow => DateTimeCS::now(),
            FileDateTime::UnixCustom(timestamp) => DateTimeCS::from_timestamp(*timestamp),
        }
    }

    pub fn ms_dos(&self) -> (u16, u16) {
        self.tuple().ms_dos()
    }

    pub fn timestamp(&self) -> Option<i32> {
        match self {
            FileDateTime::Zero => Some(DateTimeCS::default().to_timestamp()),
            FileDateTime::Custom(date_time) => Some(date_time.to_timestamp()),
            FileDateTime::Now | FileDateTime::UnixNow => {
                Some(i32::try_from(Utc::now().timestamp()).unwrap_or(i32::MAX))
            }
            FileDateTime::UnixCustom(timestamp) => Some(*timestamp),
        }
    }

    /// True when the option asks for a 0x5455 extra in addition to DOS time.
    pub fn extended_timestamp(&self) -> bool {
        matches!(self, FileDateTime::UnixNow | FileDateTime::UnixCustom(_))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ms_dos_encoding_is_bit_exact() {
        let dt = DateTimeCS::new(2023, 4, 19, 9, 40, 34);
        let (date, time) = dt.ms_dos();

        assert_eq!(date, ((2023 - 1980) << 9) | (4 << 5) | 19);
        assert_eq!(time, (9 << 11) | (40 << 5) | (34 / 2));
    }

    #[test]
    fn ms_dos_round_trip_even_seconds() {
        for &(y, mo, d, h, mi, s) in &[
            (1980u16, 1u16, 1u16, 0u16, 0u16, 0u16),
            (1999, 12, 31, 23, 59, 58),
            (2023, 4, 19, 9, 40, 34),
            (2107, 12, 31, 23, 59, 58),
        ] {
            let dt = DateTimeCS::new(y, mo, d, h, mi, s);
            let (date, time) = dt.ms_dos();
            assert_eq!(DateTimeCS::from_msdos(date, time), dt);
        }
    }

    #[test]
    fn odd_seconds_round_down() {
        let dt = DateTimeCS::new(2001, 6, 15, 12, 30, 31);
        let (date, time) = dt.ms_dos();
        let back = DateTimeCS::from_msdos(date, time);
        assert_eq!(back, DateTimeCS::new(2001, 6, 15, 12, 30, 30));
    }

    #[test]
    fn years_clamp_to_dos_range() {
        let early = DateTimeCS::new(1960, 1, 1, 0, 0, 0);
        assert_eq!(early, DateTimeCS::default());

        let late = DateTimeCS::new(2200, 1, 1, 0, 0, 0);
        let (date, _) = late.ms_dos();
        assert_eq!(date >> 9, (DOS_MAX_YEAR - DOS_EPOCH_YEAR));
    }

    #[test]
    fn zero_is_dos_epoch() {
        assert_eq!(DateTimeCS::from_msdos(0, 0).to_timestamp(), 315_532_800);
        assert_eq!(FileDateTime::Zero.ms_dos(), (1 << 5 | 1, 0));
    }
}
