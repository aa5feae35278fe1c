use std::io::{Read, Write};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{
    Calendar, Error, EventRecord, EventTime, OrgOptions, Result, Schedule,
    diary::{Fragment, build_predicate},
    timezone::LocalTime,
};

#[cfg(test)]
mod tests;

const READ_ONLY_MARKER: &str = "# -*- buffer-read-only: t -*-";
const BODY_INDENT: &str = "  ";

/// org-agenda 文档生成器
pub struct OrgGenerator {
    options: OrgOptions,
}

impl OrgGenerator {
    pub fn new(options: OrgOptions) -> Self {
        Self { options }
    }

    /// 生成完整的 org 文档
    ///
    /// 事件按 UID 排序，UID 相同时主重复事件排在实例覆盖之前。
    pub fn generate(&self, calendar: &Calendar, generated_at: DateTime<Utc>) -> Result<String> {
        let mut events: Vec<&EventRecord> = calendar.events.iter().collect();
        events.sort_by(|a, b| a.agenda_order(b));

        let mut org_content = String::new();

        // 文件头部
        org_content.push_str(READ_ONLY_MARKER);
        org_content.push('\n');
        org_content.push_str(&format!(
            "#+PRODID: {}\n",
            calendar.meta.product_id_or_empty()
        ));
        org_content.push_str(&format!("#+VERSION: {}\n", calendar.meta.version_or_empty()));
        org_content.push_str(&format!(
            "#+DATE: {}\n",
            inactive_timestamp(self.options.zone.localize(generated_at))
        ));

        let blocks = events
            .into_iter()
            .map(|event| self.format_event(event))
            .collect::<Result<Vec<_>>>()?;

        org_content.push('\n');
        org_content.push_str(&blocks.join("\n"));

        tracing::info!("生成 org 文档: {} 个事件", blocks.len());
        Ok(org_content)
    }

    /// 生成单个事件的文本块，以换行结尾
    pub fn format_event(&self, event: &EventRecord) -> Result<String> {
        let summary = single_line(&event.summary);
        let mut block = format!("* {summary}\n");

        self.add_properties(&mut block, event);

        let anchor = match &event.schedule {
            Schedule::Singular => self.single_anchor(event)?,
            Schedule::Recurring { rule, exceptions } => {
                build_predicate(rule, &event.start, exceptions, &self.options.zone)?.render()
            }
        };
        block.push_str(&format!(
            "{BODY_INDENT}{anchor} {}{summary}\n",
            self.time_range(event)
        ));

        if let Some(ref description) = event.description {
            for line in description.lines() {
                block.push_str(BODY_INDENT);
                block.push_str(line);
                block.push('\n');
            }
        }

        Ok(block)
    }

    /// 添加属性抽屉
    fn add_properties(&self, block: &mut String, event: &EventRecord) {
        block.push_str(&format!("{BODY_INDENT}:PROPERTIES:\n"));
        if let Some(ref location) = event.location {
            block.push_str(&format!(
                "{BODY_INDENT}:LOCATION: {}\n",
                single_line(location)
            ));
        }
        if let Some(ref uid) = event.uid {
            block.push_str(&format!("{BODY_INDENT}:ID: {uid}\n"));
        }
        if let Some(ref created) = event.created {
            block.push_str(&format!(
                "{BODY_INDENT}:CREATED: {}\n",
                self.passive_timestamp(created)
            ));
        }
        if let Some(ref modified) = event.last_modified {
            block.push_str(&format!(
                "{BODY_INDENT}:LAST_MODIFIED: {}\n",
                self.passive_timestamp(modified)
            ));
        }
        block.push_str(&format!("{BODY_INDENT}:END:\n"));
    }

    /// 非重复事件的日期区间；全天事件的结束日期是排他的，需要减一天
    fn single_anchor(&self, event: &EventRecord) -> Result<String> {
        let zone = &self.options.zone;
        let start = zone.normalize(&event.start).date();
        let end = match zone.normalize(&event.end) {
            LocalTime::Date(exclusive_end) => exclusive_end.pred_opt().ok_or_else(|| {
                Error::DateOutOfRange(format!("DTEND {exclusive_end} has no previous day"))
            })?,
            LocalTime::DateTime(end) => end.date(),
        };
        Ok(format!("<%%{}>", Fragment::Range { start, end }.render()))
    }

    /// 时间段 `HH:MM--HH:MM `，全天事件为空
    pub fn time_range(&self, event: &EventRecord) -> String {
        let zone = &self.options.zone;
        match (zone.normalize(&event.start), zone.normalize(&event.end)) {
            (LocalTime::DateTime(start), LocalTime::DateTime(end)) => {
                format!("{}--{} ", start.format("%H:%M"), end.format("%H:%M"))
            }
            _ => String::new(),
        }
    }

    fn passive_timestamp(&self, time: &EventTime) -> String {
        match self.options.zone.normalize(time) {
            LocalTime::Date(date) => date.format("[%Y-%m-%d %a]").to_string(),
            LocalTime::DateTime(datetime) => inactive_timestamp(datetime),
        }
    }
}

impl Default for OrgGenerator {
    fn default() -> Self {
        Self::new(OrgOptions::default())
    }
}

/// 读取整个 ICS 输入并写出 org 文档
///
/// 只有在整个文档生成成功后才会写出，出错时输出端不会收到任何字节。
pub fn convert<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    options: OrgOptions,
    generated_at: DateTime<Utc>,
) -> Result<()> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .map_err(Error::UnreadableInput)?;

    let calendar = Calendar::from_bytes(raw)?;
    let org_content = OrgGenerator::new(options).generate(&calendar, generated_at)?;

    output
        .write_all(org_content.as_bytes())
        .and_then(|()| output.flush())
        .map_err(Error::UnwritableOutput)
}

/// 标题和属性值只能占一行，内嵌换行折叠为空格
fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn inactive_timestamp(datetime: NaiveDateTime) -> String {
    datetime.format("[%Y-%m-%d %a %H:%M]").to_string()
}
