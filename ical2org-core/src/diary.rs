//! Emacs diary sexp generation for recurrence rules.
//!
//! A recurring event becomes one `<%%(and ...)>` predicate that org-agenda
//! evaluates once per calendar day. Each RRULE attribute maps to one
//! [`Fragment`]; absent attributes contribute nothing.

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};

use crate::{
    ByDay, Error, EventTime, Frequency, RecurrenceRule, Result,
    timezone::{LocalTime, LocalZone},
};

/// 谓词中的一个片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// BYMONTHDAY
    MonthDays(Vec<i32>),
    /// BYDAY：带序号的项各自成为 `diary-float`，其余合并为一个星期集合
    Weekdays {
        ordinals: Vec<(i32, Weekday)>,
        days: Vec<Weekday>,
    },
    /// BYMONTH
    Months(Vec<u32>),
    /// INTERVAL
    Interval {
        freq: Frequency,
        interval: u32,
        start: NaiveDate,
    },
    /// 闭区间
    Range { start: NaiveDate, end: NaiveDate },
    /// YEARLY 的月/日锚点
    Anniversary { month: u32, day: u32 },
    /// EXDATE
    Except(NaiveDate),
}

impl Fragment {
    /// 渲染为 diary sexp 文本
    pub fn render(&self) -> String {
        match self {
            Self::MonthDays(days) => {
                format!("(memq (calendar-extract-day date) '({}))", join(days))
            }
            Self::Weekdays { ordinals, days } => {
                let mut forms: Vec<String> = ordinals
                    .iter()
                    .map(|(n, weekday)| format!("(diary-float t {} {})", weekday_code(*weekday), n))
                    .collect();
                if !days.is_empty() {
                    let codes: Vec<u32> = days.iter().map(|d| weekday_code(*d)).collect();
                    forms.push(format!(
                        "(memq (calendar-day-of-week date) '({}))",
                        join(&codes)
                    ));
                }
                forms.join(" ")
            }
            Self::Months(months) => {
                format!("(memq (calendar-extract-month date) '({}))", join(months))
            }
            Self::Interval {
                freq,
                interval,
                start,
            } => render_interval(freq, *interval, *start),
            Self::Range { start, end } => {
                format!("(diary-block {} {})", mdy(*start), mdy(*end))
            }
            Self::Anniversary { month, day } => format!("(diary-date {month} {day} t)"),
            Self::Except(date) => format!("(not (diary-date {}))", mdy(*date)),
        }
    }

    /// 在给定日期上求值，语义与该片段位于 `(and ...)` 中时一致
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Self::MonthDays(days) => days.contains(&(date.day() as i32)),
            Self::Weekdays { ordinals, days } => {
                ordinals
                    .iter()
                    .all(|(n, weekday)| is_nth_weekday(date, *n, *weekday))
                    && (days.is_empty() || days.contains(&date.weekday()))
            }
            Self::Months(months) => months.contains(&date.month()),
            Self::Interval {
                freq,
                interval,
                start,
            } => elapsed_periods(freq, *start, date)
                .is_none_or(|elapsed| elapsed % i64::from(*interval) == 0),
            Self::Range { start, end } => *start <= date && date <= *end,
            Self::Anniversary { month, day } => date.month() == *month && date.day() == *day,
            Self::Except(excluded) => date != *excluded,
        }
    }
}

/// 完整的 diary 谓词
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiaryPredicate {
    pub fragments: Vec<Fragment>,
}

impl DiaryPredicate {
    /// 渲染为 org 的 diary 时间戳 `<%%(and ...)>`
    pub fn render(&self) -> String {
        let mut body = String::from("(and");
        for fragment in &self.fragments {
            body.push(' ');
            body.push_str(&fragment.render());
        }
        body.push(')');
        format!("<%%{body}>")
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.fragments.iter().all(|fragment| fragment.matches(date))
    }
}

/// 根据重复规则构建谓词
///
/// `start` 为 DTSTART，`exceptions` 为展开后的 EXDATE，所有时间都先经过
/// `zone` 规范化为本地时间。
pub fn build_predicate(
    rule: &RecurrenceRule,
    start: &EventTime,
    exceptions: &[EventTime],
    zone: &LocalZone,
) -> Result<DiaryPredicate> {
    let local_start = zone.normalize(start);
    let start_date = local_start.date();

    let mut fragments = Vec::new();
    fragments.extend(day_fragment(rule));
    fragments.extend(month_fragment(rule));
    fragments.extend(interval_fragment(rule, start_date));
    fragments.extend(anniversary_fragment(rule, start_date));
    fragments.extend(range_fragment(rule, local_start, zone)?);
    fragments.extend(exception_fragments(exceptions, zone));

    tracing::debug!(
        "生成重复谓词: freq={:?}, 片段数={}",
        rule.freq,
        fragments.len()
    );

    Ok(DiaryPredicate { fragments })
}

/// BYMONTHDAY 优先；否则使用 BYDAY
pub fn day_fragment(rule: &RecurrenceRule) -> Option<Fragment> {
    if !rule.by_month_day.is_empty() {
        return Some(Fragment::MonthDays(rule.by_month_day.clone()));
    }
    if rule.by_day.is_empty() {
        return None;
    }

    let mut ordinals = Vec::new();
    let mut days = Vec::new();
    for ByDay { ordinal, weekday } in &rule.by_day {
        match ordinal {
            Some(n) => ordinals.push((*n, *weekday)),
            None => days.push(*weekday),
        }
    }
    Some(Fragment::Weekdays { ordinals, days })
}

pub fn month_fragment(rule: &RecurrenceRule) -> Option<Fragment> {
    (!rule.by_month.is_empty()).then(|| Fragment::Months(rule.by_month.clone()))
}

/// 仅当源数据显式给出 INTERVAL 且频率受支持时产生
pub fn interval_fragment(rule: &RecurrenceRule, start: NaiveDate) -> Option<Fragment> {
    let interval = rule.interval?;
    if matches!(rule.freq, Frequency::Other(_)) {
        return None;
    }
    Some(Fragment::Interval {
        freq: rule.freq.clone(),
        interval,
        start,
    })
}

pub fn anniversary_fragment(rule: &RecurrenceRule, start: NaiveDate) -> Option<Fragment> {
    (rule.freq == Frequency::Yearly).then(|| Fragment::Anniversary {
        month: start.month(),
        day: start.day(),
    })
}

/// UNTIL 优先于 COUNT；两者都没有时不限制范围
pub fn range_fragment(
    rule: &RecurrenceRule,
    start: LocalTime,
    zone: &LocalZone,
) -> Result<Option<Fragment>> {
    let end = if let Some(until) = &rule.until {
        zone.normalize(until).date()
    } else if let Some(count) = rule.count {
        match project_count_end(rule, count, start)? {
            Some(end) => end,
            None => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    Ok(Some(Fragment::Range {
        start: start.date(),
        end,
    }))
}

pub fn exception_fragments(exceptions: &[EventTime], zone: &LocalZone) -> Vec<Fragment> {
    exceptions
        .iter()
        .map(|time| Fragment::Except(zone.normalize(time).date()))
        .collect()
}

/// 从 DTSTART 向后推算 COUNT × INTERVAL 个周期作为结束日期
///
/// WEEKLY 时按 BYDAY 项数均分，允许出现小数周。
fn project_count_end(
    rule: &RecurrenceRule,
    count: u32,
    start: LocalTime,
) -> Result<Option<NaiveDate>> {
    let periods = count.saturating_mul(rule.effective_interval());
    let overflow = || Error::DateOutOfRange(format!("COUNT={count} from {}", start.date()));

    let end = match rule.freq {
        Frequency::Yearly => {
            add_months(start, periods.saturating_mul(12)).ok_or_else(overflow)?
        }
        Frequency::Monthly => add_months(start, periods).ok_or_else(overflow)?,
        Frequency::Weekly => {
            let per_week = rule.by_day.len().max(1) as f64;
            let days = f64::from(periods) / per_week * 7.0;
            add_fractional_days(start, days).ok_or_else(overflow)?
        }
        Frequency::Daily => start
            .date()
            .checked_add_signed(Duration::days(i64::from(periods)))
            .ok_or_else(overflow)?,
        Frequency::Other(ref freq) => {
            tracing::warn!("不支持的重复频率 {}，COUNT 不限制范围", freq);
            return Ok(None);
        }
    };
    Ok(Some(end))
}

fn add_months(start: LocalTime, months: u32) -> Option<NaiveDate> {
    start.date().checked_add_months(Months::new(months))
}

/// 日期只取整天；带时间的起点按秒累加后取日期
fn add_fractional_days(start: LocalTime, days: f64) -> Option<NaiveDate> {
    match start {
        LocalTime::Date(date) => date.checked_add_signed(Duration::days(days.floor() as i64)),
        LocalTime::DateTime(datetime) => datetime
            .checked_add_signed(Duration::seconds((days * 86_400.0).round() as i64))
            .map(|end| end.date()),
    }
}

fn render_interval(freq: &Frequency, interval: u32, start: NaiveDate) -> String {
    let day_diff = format!(
        "(- (calendar-absolute-from-gregorian date) (calendar-absolute-from-gregorian '({})))",
        mdy(start)
    );
    match freq {
        Frequency::Daily => format!("(= 0 (% {day_diff} {interval}))"),
        Frequency::Weekly => format!("(= 0 (% (/ {day_diff} 7) {interval}))"),
        Frequency::Monthly => format!(
            "(= 0 (% (+ (* 12 (- (calendar-extract-year date) {})) \
             (- (calendar-extract-month date) {})) {interval}))",
            start.year(),
            start.month()
        ),
        Frequency::Yearly => format!(
            "(= 0 (% (- (calendar-extract-year date) {}) {interval}))",
            start.year()
        ),
        Frequency::Other(_) => String::new(),
    }
}

/// 自 `start` 起经过的周期数，按民用日历计算
fn elapsed_periods(freq: &Frequency, start: NaiveDate, date: NaiveDate) -> Option<i64> {
    let days = date.signed_duration_since(start).num_days();
    let months = i64::from(date.year() - start.year()) * 12 + i64::from(date.month())
        - i64::from(start.month());
    match freq {
        Frequency::Daily => Some(days),
        Frequency::Weekly => Some(days / 7),
        Frequency::Monthly => Some(months),
        Frequency::Yearly => Some(i64::from(date.year() - start.year())),
        Frequency::Other(_) => None,
    }
}

fn is_nth_weekday(date: NaiveDate, n: i32, weekday: Weekday) -> bool {
    if date.weekday() != weekday {
        return false;
    }
    let day = date.day() as i32;
    if n > 0 {
        (day - 1) / 7 + 1 == n
    } else if n < 0 {
        (days_in_month(date) as i32 - day) / 7 + 1 == -n
    } else {
        false
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// SU=0, MO=1 ... SA=6，与 `calendar-day-of-week` 一致
pub fn weekday_code(weekday: Weekday) -> u32 {
    weekday.num_days_from_sunday()
}

fn mdy(date: NaiveDate) -> String {
    format!("{} {} {}", date.month(), date.day(), date.year())
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
