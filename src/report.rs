//! Daily report message interpreter.
//!
//! Drivers send their daily counts as free text, one delivery type per
//! line:
//!
//! ```text
//! ヤマト30
//! 佐川 20
//! メモ:順調でした
//! ```
//!
//! [`parse_report_message`] reads such a message into
//! [`ParsedReportLine`]s and a note.  [`interpret`] then resolves each
//! label against the active delivery types using the strategies in
//! [`MatchStrategy::ORDER`] and classifies the whole message as a
//! [`ReportOutcome`].  The reply texts sent back to the driver are
//! built here too.

use crate::models::{
    DailyReport, DeliveryType, Driver, MatchedReportLine, ParsedReportLine, ReportSource,
};
use crate::registry::DeliveryTypeRegistry;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line prefixes that mark the rest of the line as the note.
const NOTE_MARKERS: [&str; 4] = ["メモ:", "備考:", "memo:", "notes:"];

/// `<label><optional ':' '：' or whitespace><digits>` over the whole line.
static ENTRY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)[:：\s]*([0-9]+)$").expect("valid entry pattern"));

/// Carrier nicknames: a label containing any alias resolves to the first
/// type whose name contains the keyword.
const KEYWORD_ALIASES: [(&str, &[&str]); 4] = [
    ("ヤマト", &["yamato", "やまと", "ヤマト"]),
    ("佐川", &["sagawa", "さがわ", "佐川"]),
    ("ネコポス", &["nekopos", "ねこぽす", "ネコポス"]),
    ("宅急便", &["takkyubin", "たっきゅうびん"]),
];

/// Lines and note read from one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub lines: Vec<ParsedReportLine>,
    /// Empty when the message has no note line.
    pub note: String,
}

/// Reads a message line by line.
///
/// Lines that do not have the `label quantity` shape, or whose quantity
/// is zero or does not fit in a `u64`, are skipped.  When several note
/// lines are present the last one wins.
pub fn parse_report_message(text: &str) -> ParsedMessage {
    let mut parsed = ParsedMessage::default();
    for line in text.split('\n') {
        let trimmed = line.trim();
        if NOTE_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            if let Some((_, value)) = trimmed.split_once(':') {
                parsed.note = value.trim().to_string();
            }
            continue;
        }
        let Some(caps) = ENTRY_PATTERN.captures(trimmed) else {
            continue;
        };
        let label = caps[1].trim();
        let Ok(quantity) = caps[2].parse::<u64>() else {
            tracing::debug!(line = trimmed, "quantity out of range, skipping");
            continue;
        };
        if label.is_empty() || quantity == 0 {
            continue;
        }
        parsed.lines.push(ParsedReportLine {
            raw_type_name: label.to_string(),
            quantity,
        });
    }
    parsed
}

/// One way of resolving a label to a delivery type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Case-insensitive equality.
    Exact,
    /// Case-insensitive containment in either direction.
    Substring,
    /// Carrier nickname table.
    KeywordAlias,
}

impl MatchStrategy {
    /// Strategies in priority order; the first hit wins.
    pub const ORDER: [MatchStrategy; 3] = [
        MatchStrategy::Exact,
        MatchStrategy::Substring,
        MatchStrategy::KeywordAlias,
    ];

    pub fn find<'a>(self, label: &str, types: &[&'a DeliveryType]) -> Option<&'a DeliveryType> {
        let normalized = label.to_lowercase();
        match self {
            MatchStrategy::Exact => types
                .iter()
                .find(|t| t.name.to_lowercase() == normalized)
                .copied(),
            MatchStrategy::Substring => types
                .iter()
                .find(|t| {
                    let name = t.name.to_lowercase();
                    name.contains(&normalized) || normalized.contains(&name)
                })
                .copied(),
            MatchStrategy::KeywordAlias => KEYWORD_ALIASES
                .iter()
                .filter(|(_, aliases)| {
                    aliases
                        .iter()
                        .any(|a| normalized.contains(&a.to_lowercase()))
                })
                .find_map(|(keyword, _)| types.iter().find(|t| t.name.contains(keyword)).copied()),
        }
    }
}

/// Resolves a label against `types`, trying each strategy in turn.
pub fn find_delivery_type<'a>(label: &str, types: &[&'a DeliveryType]) -> Option<&'a DeliveryType> {
    MatchStrategy::ORDER.iter().find_map(|strategy| {
        let found = strategy.find(label, types);
        if let Some(t) = found {
            tracing::debug!(label, matched = %t.name, ?strategy, "resolved delivery type");
        }
        found
    })
}

/// A message with at least one resolved line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedReport {
    pub matched: Vec<MatchedReportLine>,
    /// Labels that resolved to nothing, in message order.
    pub unmatched_labels: Vec<String>,
    pub note: String,
}

impl AcceptedReport {
    pub fn total_quantity(&self) -> u64 {
        self.matched
            .iter()
            .fold(0, |acc, m| acc.saturating_add(m.quantity))
    }

    /// Some labels matched and some did not.
    pub fn is_partial(&self) -> bool {
        !self.unmatched_labels.is_empty()
    }

    /// Builds the daily report to persist, dated `date`.
    pub fn to_daily_report(&self, driver: &Driver, date: NaiveDate, now: DateTime<Utc>) -> DailyReport {
        DailyReport {
            id: Uuid::new_v4(),
            driver_id: driver.id.clone(),
            driver_name: driver.name.clone(),
            date,
            work_details: self.matched.clone(),
            notes: self.note.clone(),
            source: ReportSource::Line,
            created_at: now,
        }
    }
}

/// How a whole message was understood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// No line had the `label quantity` shape.
    NothingRecognized,
    /// Lines were read but none resolved to a delivery type.
    NoMatches {
        unmatched_labels: Vec<String>,
        known_types: Vec<String>,
    },
    Accepted(AcceptedReport),
}

/// Parses `text` and resolves every line against the active types in
/// `registry`.  A line whose amount does not fit in yen is reported
/// back as unmatched.
pub fn interpret(text: &str, registry: &DeliveryTypeRegistry) -> ReportOutcome {
    let parsed = parse_report_message(text);
    if parsed.lines.is_empty() {
        return ReportOutcome::NothingRecognized;
    }

    let active: Vec<&DeliveryType> = registry.active().collect();
    let mut matched = Vec::new();
    let mut unmatched_labels = Vec::new();
    for line in &parsed.lines {
        match find_delivery_type(&line.raw_type_name, &active) {
            Some(t) => match MatchedReportLine::new(t, line.quantity) {
                Ok(m) => matched.push(m),
                Err(err) => {
                    tracing::warn!(label = %line.raw_type_name, error = %err, "report line rejected");
                    unmatched_labels.push(line.raw_type_name.clone());
                }
            },
            None => unmatched_labels.push(line.raw_type_name.clone()),
        }
    }

    if matched.is_empty() {
        return ReportOutcome::NoMatches {
            unmatched_labels,
            known_types: registry.active_names(),
        };
    }
    ReportOutcome::Accepted(AcceptedReport {
        matched,
        unmatched_labels,
        note: parsed.note,
    })
}

fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|i| format!("• {}", i.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `2024年5月3日 (金)`
pub fn format_report_date(date: NaiveDate) -> String {
    const WEEKDAYS: [&str; 7] = ["日", "月", "火", "水", "木", "金", "土"];
    let weekday = WEEKDAYS[date.weekday().num_days_from_sunday() as usize];
    format!("{}年{}月{}日 ({})", date.year(), date.month(), date.day(), weekday)
}

pub fn nothing_recognized_message() -> String {
    "❌ 配送タイプと個数を認識できませんでした。\n\n\
     例:\nヤマト30\n佐川20\nメモ:順調でした\n\n\
     「フォーマット」と送信すると詳細を確認できます。"
        .to_string()
}

pub fn no_match_message(unmatched_labels: &[String], known_types: &[String]) -> String {
    format!(
        "❌ 登録されている配送タイプが見つかりませんでした。\n\n認識できなかったタイプ:\n{}\n\n登録済みの配送タイプ:\n{}",
        bullet_list(unmatched_labels),
        bullet_list(known_types)
    )
}

/// Confirmation sent after a report has been recorded.
pub fn confirmation_message(report: &AcceptedReport, driver_name: &str, date: NaiveDate) -> String {
    let breakdown: Vec<String> = report
        .matched
        .iter()
        .map(|m| format!("{}: {}個", m.delivery_type_name, m.quantity))
        .collect();
    let mut message = format!(
        "✅ 日報を受け付けました！\n\n📅 日付: {}\n👤 {}\n📦 合計: {}個\n\n{}",
        format_report_date(date),
        driver_name,
        report.total_quantity(),
        bullet_list(&breakdown)
    );
    if !report.note.is_empty() {
        message.push_str(&format!("\n\n📝 {}", report.note));
    }
    if report.is_partial() {
        message.push_str(&format!(
            "\n\n⚠️ 以下は登録されていません:\n{}",
            bullet_list(&report.unmatched_labels)
        ));
    }
    message
}
