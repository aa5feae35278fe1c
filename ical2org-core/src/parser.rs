use std::{
    io::{BufReader, Read},
    sync::LazyLock,
};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Weekday};
use chrono_tz::Tz;
use ical::{
    parser::ical::{IcalParser, component::IcalEvent},
    property::Property,
};
use regex::Regex;

use crate::{
    ByDay, Calendar, Error, EventRecord, EventTime, Frequency, RecurrenceRule, Result, Schedule,
    timezone::TzidResolver,
};

static BY_DAY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?\d{1,2})?(MO|TU|WE|TH|FR|SA|SU)$").expect("BYDAY pattern is valid")
});

impl Calendar {
    /// 从字节切片加载ICS
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let cursor = std::io::Cursor::new(bytes.as_ref());
        Self::from_reader(cursor)
    }

    /// 从读取器中加载ICS，流中可以包含多个 VCALENDAR
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let parser = IcalParser::new(BufReader::new(reader));
        let mut calendar = Self::default();

        for ical in parser {
            let ical = ical.map_err(|err| Error::Parse(err.to_string()))?;

            let meta = &mut calendar.meta;
            if meta.product_id.is_none() {
                meta.product_id = property_value(&ical.properties, "PRODID").map(str::to_string);
            }
            if meta.version.is_none() {
                meta.version = property_value(&ical.properties, "VERSION").map(str::to_string);
            }

            let mut resolver = TzidResolver::new();
            for timezone in &ical.timezones {
                let tzid = property_value(&timezone.properties, "TZID");
                let location = property_value(&timezone.properties, "X-LIC-LOCATION");
                if let (Some(tzid), Some(location)) = (tzid, location) {
                    resolver.register_location(tzid, location);
                }
            }

            for event in &ical.events {
                calendar.events.push(decode_event(event, &resolver)?);
            }
        }

        tracing::info!("解析日历完成: {} 个事件", calendar.events.len());
        Ok(calendar)
    }
}

/// 将 VEVENT 解码为类型化的事件记录
///
/// `resolver` 提供所在 VCALENDAR 中 VTIMEZONE 声明的 TZID 映射。
pub fn decode_event(event: &IcalEvent, resolver: &TzidResolver) -> Result<EventRecord> {
    let properties = &event.properties;

    let summary = text_value(properties, "SUMMARY").ok_or(Error::MissingField("SUMMARY"))?;
    let start = find_property(properties, "DTSTART")
        .ok_or(Error::MissingField("DTSTART"))
        .and_then(|prop| parse_event_time("DTSTART", prop, resolver))?;
    let end = find_property(properties, "DTEND")
        .ok_or(Error::MissingField("DTEND"))
        .and_then(|prop| parse_event_time("DTEND", prop, resolver))?;

    if start.is_date() != end.is_date() {
        return Err(Error::invalid(
            "DTEND",
            property_value(properties, "DTEND").unwrap_or_default(),
            "DTSTART and DTEND must both be dates or both be date-times",
        ));
    }

    let schedule = match property_value(properties, "RRULE") {
        Some(rrule) => Schedule::Recurring {
            rule: parse_rrule(rrule)?,
            exceptions: exception_dates(properties, resolver)?,
        },
        None => Schedule::Singular,
    };

    let record = EventRecord {
        summary,
        description: text_value(properties, "DESCRIPTION"),
        location: text_value(properties, "LOCATION"),
        uid: property_value(properties, "UID").map(str::to_string),
        created: optional_time(properties, "CREATED", resolver)?,
        last_modified: optional_time(properties, "LAST-MODIFIED", resolver)?,
        start,
        end,
        schedule,
    };

    tracing::debug!(
        "解码事件: uid={:?}, summary={}, recurring={}",
        record.uid,
        record.summary,
        record.is_recurring()
    );

    Ok(record)
}

/// 解析 RRULE 的值，例如 `FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE`
pub fn parse_rrule(value: &str) -> Result<RecurrenceRule> {
    let mut freq = None;
    let mut rule = RecurrenceRule::new(Frequency::Daily);

    for part in value.split(';').map(str::trim).filter(|part| !part.is_empty()) {
        let (key, val) = part
            .split_once('=')
            .ok_or_else(|| Error::MalformedRule(format!("invalid rule part {part:?}")))?;

        match key.to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(Frequency::parse(val)),
            "INTERVAL" => rule.interval = Some(parse_positive("INTERVAL", val)?),
            "COUNT" => rule.count = Some(parse_positive("COUNT", val)?),
            "UNTIL" => rule.until = Some(parse_time_value("UNTIL", val, None, false)?),
            "BYDAY" => {
                rule.by_day = split_list(val).map(parse_by_day).collect::<Result<_>>()?;
            }
            "BYMONTHDAY" => {
                rule.by_month_day = split_list(val)
                    .map(|item| parse_number::<i32>("BYMONTHDAY", item))
                    .collect::<Result<_>>()?;
            }
            "BYMONTH" => {
                rule.by_month = split_list(val)
                    .map(|item| parse_number::<u32>("BYMONTH", item))
                    .collect::<Result<_>>()?;
            }
            other => tracing::debug!("忽略重复规则字段 {}", other),
        }
    }

    rule.freq = freq.ok_or_else(|| Error::MalformedRule(format!("missing FREQ in {value:?}")))?;
    if let Frequency::Other(ref name) = rule.freq {
        tracing::warn!("不支持的重复频率 {}，将不生成间隔约束", name);
    }
    Ok(rule)
}

/// 解析 BYDAY 中的一项，例如 `TU`、`2TU`、`-1FR`
pub fn parse_by_day(token: &str) -> Result<ByDay> {
    let malformed = || Error::MalformedRule(format!("invalid BYDAY token {token:?}"));
    let upper = token.to_ascii_uppercase();
    let caps = BY_DAY_PATTERN.captures(&upper).ok_or_else(malformed)?;

    let ordinal = match caps.get(1) {
        Some(n) => match n.as_str().parse::<i32>() {
            Ok(0) | Err(_) => return Err(malformed()),
            Ok(n) => Some(n),
        },
        None => None,
    };
    let weekday = match &caps[2] {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        _ => Weekday::Sun,
    };

    Ok(ByDay { ordinal, weekday })
}

/// 解析带参数的时间属性 (VALUE=DATE、TZID)
pub fn parse_event_time(
    field: &str,
    prop: &Property,
    resolver: &TzidResolver,
) -> Result<EventTime> {
    let value = prop
        .value
        .as_deref()
        .ok_or_else(|| Error::invalid(field, "", "empty value"))?;
    let tzid = zone_param(prop, resolver);
    parse_time_value(field, value.trim(), tzid, is_date_param(prop))
}

/// TZID 参数及其解析结果
type ZoneParam<'a> = Option<(&'a str, Option<Tz>)>;

fn parse_time_value(
    field: &str,
    value: &str,
    tzid: ZoneParam<'_>,
    is_date: bool,
) -> Result<EventTime> {
    if is_date || value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(EventTime::Date)
            .map_err(|err| Error::invalid(field, value, err.to_string()));
    }

    let (raw, is_utc) = match value.strip_suffix('Z') {
        Some(raw) => (raw, true),
        None => (value, false),
    };
    let naive = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .map_err(|err| Error::invalid(field, value, err.to_string()))?;

    if is_utc {
        return Ok(EventTime::Zoned(Tz::UTC.from_utc_datetime(&naive)));
    }

    match tzid {
        Some((name, Some(tz))) => resolve_zoned(tz, naive)
            .map(EventTime::Zoned)
            .ok_or_else(|| Error::invalid(field, value, format!("not representable in {name}"))),
        Some((name, None)) => {
            tracing::warn!("未知时区 {}，{} 按本地时间处理", name, field);
            Ok(EventTime::Floating(naive))
        }
        None => Ok(EventTime::Floating(naive)),
    }
}

/// 夏令时重叠取较早的时刻，跳过的时间顺延一小时
fn resolve_zoned(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

/// 所有 EXDATE 属性中的日期，按出现顺序展开
fn exception_dates(properties: &[Property], resolver: &TzidResolver) -> Result<Vec<EventTime>> {
    let mut dates = Vec::new();
    for prop in properties
        .iter()
        .filter(|prop| prop.name.eq_ignore_ascii_case("EXDATE"))
    {
        let Some(value) = prop.value.as_deref() else {
            continue;
        };
        let tzid = zone_param(prop, resolver);
        let is_date = is_date_param(prop);
        for item in split_list(value) {
            dates.push(parse_time_value("EXDATE", item, tzid, is_date)?);
        }
    }
    Ok(dates)
}

fn optional_time(
    properties: &[Property],
    name: &'static str,
    resolver: &TzidResolver,
) -> Result<Option<EventTime>> {
    find_property(properties, name)
        .filter(|prop| prop.value.is_some())
        .map(|prop| parse_event_time(name, prop, resolver))
        .transpose()
}

fn zone_param<'a>(prop: &'a Property, resolver: &TzidResolver) -> ZoneParam<'a> {
    property_param(prop, "TZID").map(|name| (name, resolver.resolve(name)))
}

fn is_date_param(prop: &Property) -> bool {
    property_param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
}

fn find_property<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties
        .iter()
        .find(|prop| prop.name.eq_ignore_ascii_case(name))
}

fn property_value<'a>(properties: &'a [Property], name: &str) -> Option<&'a str> {
    find_property(properties, name).and_then(|prop| prop.value.as_deref())
}

fn property_param<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(|value| value.trim_matches('"'))
}

fn text_value(properties: &[Property], name: &str) -> Option<String> {
    property_value(properties, name).map(unescape_text)
}

/// 反转义ICS文本内容
fn unescape_text(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => unescaped.push('\n'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::MalformedRule(format!("invalid {field} value {value:?}")))
}

fn parse_positive(field: &str, value: &str) -> Result<u32> {
    match parse_number::<u32>(field, value)? {
        0 => Err(Error::MalformedRule(format!("{field} must be positive"))),
        n => Ok(n),
    }
}
