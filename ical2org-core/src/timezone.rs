//! 时间规范化：把任意事件时间转换为查看者的本地时间。

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use icu::time::zone::{WindowsParser, iana::IanaParserExtended};

use crate::{Error, EventTime};

/// 查看者所在的时区
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalZone {
    /// 进程的系统本地时区 (受 TZ 环境影响)
    #[default]
    System,
    /// 显式指定的 IANA 时区
    Named(Tz),
}

/// 规范化后的本地时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTime {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl LocalTime {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Date(date) => *date,
            Self::DateTime(datetime) => datetime.date(),
        }
    }
}

impl LocalZone {
    /// 转换为本地墙上时间；日期原样返回，浮动时间视为已是本地时间
    pub fn normalize(&self, time: &EventTime) -> LocalTime {
        match time {
            EventTime::Date(date) => LocalTime::Date(*date),
            EventTime::Floating(naive) => LocalTime::DateTime(*naive),
            EventTime::Zoned(instant) => LocalTime::DateTime(match self {
                Self::System => instant.with_timezone(&Local).naive_local(),
                Self::Named(tz) => instant.with_timezone(tz).naive_local(),
            }),
        }
    }

    /// UTC 时刻在本地时区的墙上时间
    pub fn localize(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::System => instant.with_timezone(&Local).naive_local(),
            Self::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }
}

impl FromStr for LocalZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            name if name.eq_ignore_ascii_case("local") || name.eq_ignore_ascii_case("system") => {
                Ok(Self::System)
            }
            name => name
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|_| Error::UnknownTimeZone(name.to_string())),
        }
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// TZID 解析器
///
/// 依次尝试 VTIMEZONE 中 `X-LIC-LOCATION` 声明的位置、IANA 名称，
/// 以及 Windows 时区名 (Exchange/Outlook 导出的日历)。
#[derive(Debug, Clone, Default)]
pub struct TzidResolver {
    locations: HashMap<String, String>,
}

impl TzidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记 VTIMEZONE 的 TZID 对应的 IANA 位置
    pub fn register_location(&mut self, tzid: impl Into<String>, location: impl Into<String>) {
        self.locations.insert(tzid.into(), location.into());
    }

    pub fn resolve(&self, tzid: &str) -> Option<Tz> {
        let tzid = tzid.trim();
        if let Some(tz) = self
            .locations
            .get(tzid)
            .and_then(|location| location.trim().parse::<Tz>().ok())
        {
            return Some(tz);
        }

        tzid.parse::<Tz>()
            .ok()
            .or_else(|| normalize_tzid(tzid).parse::<Tz>().ok())
    }
}

/// 将 Windows 时区名和带前缀的 TZID 规范化为 IANA 名称
fn normalize_tzid(tzid: &str) -> String {
    let stripped = tzid
        .strip_prefix("/mozilla.org/")
        .or_else(|| tzid.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(tzid);

    let windows_parser = WindowsParser::new();
    if let Some(tz) = windows_parser.parse(stripped, None) {
        let iana_parser = IanaParserExtended::new();
        for entry in iana_parser.iter() {
            if entry.time_zone == tz {
                return entry.canonical.to_string();
            }
        }
    }

    let iana_parser = IanaParserExtended::new();
    let parsed = iana_parser.parse(stripped);
    if parsed.time_zone != icu::time::TimeZone::UNKNOWN {
        return parsed.canonical.to_string();
    }

    stripped.to_string()
}
