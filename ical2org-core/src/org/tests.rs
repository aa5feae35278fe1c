use super::*;
use crate::{CalendarMeta, timezone::LocalZone};
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;

fn stockholm() -> OrgOptions {
    OrgOptions {
        zone: LocalZone::Named(chrono_tz::Europe::Stockholm),
    }
}

fn generated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, 1, 7, 30, 0).unwrap()
}

fn ics(events: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\nVERSION:2.0\n\
         PRODID:-//Example Corp//Calendar 1.0//EN\n\
         {events}END:VCALENDAR\n"
    )
    .replace('\n', "\r\n")
}

fn parse(events: &str) -> Calendar {
    Calendar::from_bytes(ics(events)).expect("解析ICS失败")
}

fn event(start: EventTime, end: EventTime) -> EventRecord {
    EventRecord {
        summary: "Meeting".to_string(),
        description: None,
        location: None,
        uid: Some("uid-1".to_string()),
        created: None,
        last_modified: None,
        start,
        end,
        schedule: Schedule::Singular,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn timed_event_uses_local_time_range() {
    let generator = OrgGenerator::new(stockholm());
    let record = event(
        EventTime::Zoned(Tz::UTC.with_ymd_and_hms(2021, 3, 1, 9, 0, 0).unwrap()),
        EventTime::Zoned(
            chrono_tz::America::New_York
                .with_ymd_and_hms(2021, 3, 1, 5, 30, 0)
                .unwrap(),
        ),
    );

    assert_eq!(generator.time_range(&record), "10:00--11:30 ");
    let block = generator.format_event(&record).unwrap();
    assert!(
        block.contains("  <%%(diary-block 3 1 2021 3 1 2021)> 10:00--11:30 Meeting\n"),
        "unexpected block:\n{block}"
    );
}

#[test]
fn all_day_event_end_is_inclusive() {
    let generator = OrgGenerator::new(stockholm());
    let record = event(
        EventTime::Date(date(2021, 4, 2)),
        EventTime::Date(date(2021, 4, 6)),
    );

    assert_eq!(generator.time_range(&record), "");
    let block = generator.format_event(&record).unwrap();
    assert!(block.contains("  <%%(diary-block 4 2 2021 4 5 2021)> Meeting\n"));
}

#[test]
fn single_all_day_event() {
    let generator = OrgGenerator::new(stockholm());
    let record = event(
        EventTime::Date(date(2021, 12, 31)),
        EventTime::Date(date(2022, 1, 1)),
    );

    let block = generator.format_event(&record).unwrap();
    assert!(block.contains("<%%(diary-block 12 31 2021 12 31 2021)> Meeting"));
}

#[test]
fn multi_line_summary_stays_on_heading() {
    let generator = OrgGenerator::new(stockholm());
    let mut record = event(
        EventTime::Date(date(2021, 4, 2)),
        EventTime::Date(date(2021, 4, 3)),
    );
    record.summary = "Line one\r\nLine two".to_string();
    record.location = Some("Room 1\nBuilding B".to_string());

    let block = generator.format_event(&record).unwrap();
    assert!(block.starts_with("* Line one Line two\n"));
    assert!(block.contains("  :LOCATION: Room 1 Building B\n"));
    assert!(block.contains("<%%(diary-block 4 2 2021 4 2 2021)> Line one Line two\n"));
    assert!(
        block.lines().skip(1).all(|line| line.starts_with(BODY_INDENT)),
        "{block}"
    );
}

#[test]
fn multi_day_timed_event_spans_days() {
    let generator = OrgGenerator::new(stockholm());
    let record = event(
        EventTime::Zoned(Tz::UTC.with_ymd_and_hms(2021, 6, 4, 20, 0, 0).unwrap()),
        EventTime::Zoned(Tz::UTC.with_ymd_and_hms(2021, 6, 6, 8, 0, 0).unwrap()),
    );

    let block = generator.format_event(&record).unwrap();
    assert!(block.contains("<%%(diary-block 6 4 2021 6 6 2021)> 22:00--10:00 Meeting"));
}

#[test]
fn full_event_block_layout() {
    let calendar = parse(
        "BEGIN:VEVENT\n\
         UID:standup@example.com\n\
         SUMMARY:Standup\n\
         LOCATION:Room 4\n\
         DESCRIPTION:Agenda:\\n* status\\n* blockers\n\
         CREATED:20210101T120000Z\n\
         LAST-MODIFIED:20210215T083000Z\n\
         DTSTART;TZID=Europe/Stockholm:20210301T091500\n\
         DTEND;TZID=Europe/Stockholm:20210301T093000\n\
         RRULE:FREQ=WEEKLY;BYDAY=MO,WE,FR\n\
         END:VEVENT\n",
    );
    let generator = OrgGenerator::new(stockholm());

    let block = generator.format_event(&calendar.events[0]).unwrap();
    assert_eq!(
        block,
        "* Standup\n\
         \x20 :PROPERTIES:\n\
         \x20 :LOCATION: Room 4\n\
         \x20 :ID: standup@example.com\n\
         \x20 :CREATED: [2021-01-01 Fri 13:00]\n\
         \x20 :LAST_MODIFIED: [2021-02-15 Mon 09:30]\n\
         \x20 :END:\n\
         \x20 <%%(and (memq (calendar-day-of-week date) '(1 3 5)))> 09:15--09:30 Standup\n\
         \x20 Agenda:\n\
         \x20 * status\n\
         \x20 * blockers\n"
    );
}

#[test]
fn absent_optional_fields_produce_no_lines() {
    let generator = OrgGenerator::new(stockholm());
    let mut record = event(
        EventTime::Date(date(2021, 4, 2)),
        EventTime::Date(date(2021, 4, 3)),
    );
    record.uid = None;

    let block = generator.format_event(&record).unwrap();
    assert_eq!(
        block,
        "* Meeting\n  :PROPERTIES:\n  :END:\n  <%%(diary-block 4 2 2021 4 2 2021)> Meeting\n"
    );
}

#[test]
fn recurring_all_day_event_has_no_time() {
    let calendar = parse(
        "BEGIN:VEVENT\n\
         UID:birthday\n\
         SUMMARY:Birthday\n\
         DTSTART;VALUE=DATE:20200315\n\
         DTEND;VALUE=DATE:20200316\n\
         RRULE:FREQ=YEARLY;INTERVAL=2\n\
         END:VEVENT\n",
    );
    let generator = OrgGenerator::new(stockholm());

    let block = generator.format_event(&calendar.events[0]).unwrap();
    assert!(block.contains(
        "  <%%(and (= 0 (% (- (calendar-extract-year date) 2020) 2)) \
         (diary-date 3 15 t))> Birthday\n"
    ));
}

#[test]
fn recurring_event_with_exceptions() {
    let calendar = parse(
        "BEGIN:VEVENT\n\
         UID:review\n\
         SUMMARY:Review\n\
         DTSTART:20210325T130000Z\n\
         DTEND:20210325T140000Z\n\
         RRULE:FREQ=WEEKLY;COUNT=10\n\
         EXDATE:20210401T130000Z\n\
         EXDATE:20210408T130000Z\n\
         END:VEVENT\n",
    );
    let generator = OrgGenerator::new(stockholm());

    let block = generator.format_event(&calendar.events[0]).unwrap();
    assert!(block.contains(
        "<%%(and (diary-block 3 25 2021 6 3 2021) (not (diary-date 4 1 2021)) \
         (not (diary-date 4 8 2021)))> 14:00--15:00 Review"
    ));
}

#[test]
fn formatting_is_idempotent() {
    let calendar = parse(
        "BEGIN:VEVENT\n\
         UID:x\n\
         SUMMARY:Planning\n\
         DTSTART:20210301T100000Z\n\
         DTEND:20210301T110000Z\n\
         RRULE:FREQ=MONTHLY;BYMONTHDAY=1;COUNT=6\n\
         END:VEVENT\n",
    );
    let generator = OrgGenerator::new(stockholm());

    let first = generator.format_event(&calendar.events[0]).unwrap();
    let second = generator.format_event(&calendar.events[0]).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        generator.generate(&calendar, generated_at()).unwrap(),
        generator.generate(&calendar, generated_at()).unwrap()
    );
}

#[test]
fn document_header_and_separators() {
    let calendar = parse(
        "BEGIN:VEVENT\n\
         UID:b\n\
         SUMMARY:Second\n\
         DTSTART;VALUE=DATE:20210302\n\
         DTEND;VALUE=DATE:20210303\n\
         END:VEVENT\n\
         BEGIN:VEVENT\n\
         UID:a\n\
         SUMMARY:First\n\
         DTSTART;VALUE=DATE:20210301\n\
         DTEND;VALUE=DATE:20210302\n\
         END:VEVENT\n",
    );
    let generator = OrgGenerator::new(stockholm());

    let org_content = generator.generate(&calendar, generated_at()).unwrap();
    assert_eq!(
        org_content,
        "# -*- buffer-read-only: t -*-\n\
         #+PRODID: -//Example Corp//Calendar 1.0//EN\n\
         #+VERSION: 2.0\n\
         #+DATE: [2021-03-01 Mon 08:30]\n\
         \n\
         * First\n\
         \x20 :PROPERTIES:\n\
         \x20 :ID: a\n\
         \x20 :END:\n\
         \x20 <%%(diary-block 3 1 2021 3 1 2021)> First\n\
         \n\
         * Second\n\
         \x20 :PROPERTIES:\n\
         \x20 :ID: b\n\
         \x20 :END:\n\
         \x20 <%%(diary-block 3 2 2021 3 2 2021)> Second\n"
    );
}

#[test]
fn master_event_sorts_before_override() {
    let calendar = parse(
        "BEGIN:VEVENT\n\
         UID:series\n\
         SUMMARY:Moved instance\n\
         RECURRENCE-ID:20210308T100000Z\n\
         DTSTART:20210309T100000Z\n\
         DTEND:20210309T110000Z\n\
         END:VEVENT\n\
         BEGIN:VEVENT\n\
         UID:series\n\
         SUMMARY:Weekly series\n\
         DTSTART:20210301T100000Z\n\
         DTEND:20210301T110000Z\n\
         RRULE:FREQ=WEEKLY\n\
         END:VEVENT\n",
    );
    let generator = OrgGenerator::new(stockholm());

    let org_content = generator.generate(&calendar, generated_at()).unwrap();
    let master = org_content.find("* Weekly series").expect("master missing");
    let instance = org_content.find("* Moved instance").expect("override missing");
    assert!(master < instance);
}

#[test]
fn empty_calendar_has_only_header() {
    let calendar = Calendar {
        meta: CalendarMeta::default(),
        events: Vec::new(),
    };
    let generator = OrgGenerator::new(stockholm());

    let org_content = generator.generate(&calendar, generated_at()).unwrap();
    assert_eq!(
        org_content,
        "# -*- buffer-read-only: t -*-\n#+PRODID: \n#+VERSION: \n#+DATE: [2021-03-01 Mon 08:30]\n\n"
    );
}

#[test]
fn convert_writes_nothing_on_missing_summary() {
    let input = ics(
        "BEGIN:VEVENT\n\
         UID:ok\n\
         SUMMARY:Fine\n\
         DTSTART:20210301T100000Z\n\
         DTEND:20210301T110000Z\n\
         END:VEVENT\n\
         BEGIN:VEVENT\n\
         UID:broken\n\
         DTSTART:20210302T100000Z\n\
         DTEND:20210302T110000Z\n\
         END:VEVENT\n",
    );
    let mut output = Vec::new();

    let err = convert(input.as_bytes(), &mut output, stockholm(), generated_at()).unwrap_err();
    assert!(matches!(err, Error::MissingField("SUMMARY")));
    assert!(output.is_empty());
}

#[test]
fn convert_writes_whole_document() {
    let input = ics(
        "BEGIN:VEVENT\n\
         UID:ok\n\
         SUMMARY:Fine\n\
         DTSTART:20210301T100000Z\n\
         DTEND:20210301T110000Z\n\
         END:VEVENT\n",
    );
    let mut output = Vec::new();

    convert(input.as_bytes(), &mut output, stockholm(), generated_at()).unwrap();
    let org_content = String::from_utf8(output).unwrap();
    assert!(org_content.starts_with("# -*- buffer-read-only: t -*-\n"));
    assert!(org_content.ends_with("  <%%(diary-block 3 1 2021 3 1 2021)> 11:00--12:00 Fine\n"));
}

#[test]
fn malformed_rule_aborts_generation() {
    let input = ics(
        "BEGIN:VEVENT\n\
         SUMMARY:Broken rule\n\
         DTSTART:20210301T100000Z\n\
         DTEND:20210301T110000Z\n\
         RRULE:INTERVAL=2\n\
         END:VEVENT\n",
    );
    let mut output = Vec::new();

    let err = convert(input.as_bytes(), &mut output, stockholm(), generated_at()).unwrap_err();
    assert!(matches!(err, Error::MalformedRule(_)));
    assert!(output.is_empty());
}
