use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Weekday};
use chrono_tz::Tz;

use crate::timezone::LocalZone;

/// 事件时间 (DTSTART / DTEND / EXDATE / UNTIL 等)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    /// 全天事件使用的日期 (VALUE=DATE)
    Date(NaiveDate),
    /// 带时区的时间 (UTC 或 TZID)
    Zoned(DateTime<Tz>),
    /// 浮动时间，按查看者本地时间解释
    Floating(NaiveDateTime),
}

impl EventTime {
    /// 是否为全天日期
    pub const fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// 重复频率 (FREQ)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// 不支持的频率 (SECONDLY, HOURLY ...)，生成时不产生约束
    Other(String),
}

impl Frequency {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "DAILY" => Self::Daily,
            "WEEKLY" => Self::Weekly,
            "MONTHLY" => Self::Monthly,
            "YEARLY" => Self::Yearly,
            other => Self::Other(other.to_string()),
        }
    }
}

/// BYDAY 中的一项，例如 `MO`、`2TU`、`-1FR`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByDay {
    /// 月内第几个该星期几，负数表示从月底倒数
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}

/// 重复规则 (RRULE)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    /// 仅在源数据显式给出 INTERVAL 时为 Some
    pub interval: Option<u32>,
    pub count: Option<u32>,
    pub until: Option<EventTime>,
    pub by_day: Vec<ByDay>,
    pub by_month_day: Vec<i32>,
    pub by_month: Vec<u32>,
}

impl RecurrenceRule {
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq,
            interval: None,
            count: None,
            until: None,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
        }
    }

    /// 实际生效的间隔，缺省为 1
    pub fn effective_interval(&self) -> u32 {
        self.interval.unwrap_or(1)
    }
}

/// 事件的重复方式，在解析时确定一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Singular,
    Recurring {
        rule: RecurrenceRule,
        /// EXDATE，按输入顺序展开
        exceptions: Vec<EventTime>,
    },
}

/// 单个日历事件 (VEVENT)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub uid: Option<String>,
    pub created: Option<EventTime>,
    pub last_modified: Option<EventTime>,
    pub start: EventTime,
    pub end: EventTime,
    pub schedule: Schedule,
}

impl EventRecord {
    pub const fn is_recurring(&self) -> bool {
        matches!(self.schedule, Schedule::Recurring { .. })
    }

    /// 事件排序：先按 UID，UID 相同时带重复规则的主事件排在前面
    pub fn agenda_order(&self, other: &Self) -> Ordering {
        self.uid
            .cmp(&other.uid)
            .then_with(|| other.is_recurring().cmp(&self.is_recurring()))
    }
}

/// 源日历的元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarMeta {
    pub product_id: Option<String>,
    pub version: Option<String>,
}

impl CalendarMeta {
    /// 源日历缺少 PRODID 时为空字符串
    pub fn product_id_or_empty(&self) -> &str {
        self.product_id.as_deref().unwrap_or("")
    }

    pub fn version_or_empty(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

/// 解析后的日历
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    pub meta: CalendarMeta,
    pub events: Vec<EventRecord>,
}

/// org 生成选项
#[derive(Debug, Clone, Default)]
pub struct OrgOptions {
    /// 查看者所在时区
    pub zone: LocalZone,
}
