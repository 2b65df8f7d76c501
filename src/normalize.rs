use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::StringRecord;

use crate::models::InvalidRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    ShiftName,
    ShiftType,
    ShiftStart,
    ShiftEnd,
    FirstName,
    LastName,
    StaffId,
    PayrollId,
    PriorityRanking,
    TaskName,
    TaskType,
    TaskStart,
    TaskEnd,
    TaskDuration,
    Comments,
    PrivateGuestName,
    IsRequestPrivate,
    PrivateGuestNote,
}

/// Accepted header labels per canonical field, already normalized.
/// Earlier labels win when a file carries more than one variant.
const SYNONYMS: &[(Field, &[&str])] = &[
    (
        Field::Date,
        &[
            "date (yyyy/mm/dd)",
            "date (yyyy-mm-dd)",
            "date",
            "date (dd/mm/yyyy)",
            "date (mm/dd/yyyy)",
        ],
    ),
    (Field::ShiftName, &["shift name", "shiftname"]),
    (Field::ShiftType, &["shift type", "shifttype"]),
    (
        Field::ShiftStart,
        &["shift start (hh:mm)", "shift start", "shift start (hhmm)", "shiftstart"],
    ),
    (
        Field::ShiftEnd,
        &["shift end (hh:mm)", "shift end", "shift end (hhmm)", "shiftend"],
    ),
    (Field::FirstName, &["staff first name", "first name", "firstname"]),
    (Field::LastName, &["staff last name", "last name", "lastname"]),
    (Field::StaffId, &["staff id", "staffid", "staff_id"]),
    (Field::PayrollId, &["payroll id", "payrollid", "payroll_id"]),
    (
        Field::PriorityRanking,
        &["priority ranking", "priority", "priorityranking"],
    ),
    (Field::TaskName, &["task name", "taskname"]),
    (Field::TaskType, &["task type", "tasktype"]),
    (
        Field::TaskStart,
        &["task start (hh:mm)", "task start", "task start (hhmm)", "taskstart"],
    ),
    (
        Field::TaskEnd,
        &["task end (hh:mm)", "task end", "task end (hhmm)", "taskend"],
    ),
    (Field::TaskDuration, &["task duration", "taskduration"]),
    (Field::Comments, &["comments", "comment"]),
    (
        Field::PrivateGuestName,
        &["private guest name", "private guest", "guest name"],
    ),
    (
        Field::IsRequestPrivate,
        &["is request private", "request private", "is private"],
    ),
    (
        Field::PrivateGuestNote,
        &["private guest note", "guest note", "private note"],
    ),
];

const NULL_VALUES: [&str; 3] = ["", "NULL", "NaN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Known(Field),
    Passthrough,
    Ignored,
}

/// Resolved assignment of header positions to canonical fields.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut columns: Vec<Column> = normalized
            .iter()
            .map(|name| {
                if name.is_empty() || name.starts_with("unnamed") {
                    Column::Ignored
                } else {
                    Column::Passthrough
                }
            })
            .collect();

        for (field, labels) in SYNONYMS {
            let found = labels.iter().find_map(|label| {
                normalized
                    .iter()
                    .zip(&columns)
                    .position(|(name, column)| *column == Column::Passthrough && name == label)
            });
            if let Some(idx) = found {
                columns[idx] = Column::Known(*field);
            }
        }

        if !columns.contains(&Column::Known(Field::Date)) {
            let fallback = normalized
                .iter()
                .zip(&columns)
                .position(|(name, column)| *column == Column::Passthrough && name.starts_with("date"));
            if let Some(idx) = fallback {
                columns[idx] = Column::Known(Field::Date);
            }
        }

        Self {
            names: headers.iter().map(|h| clean_label(h)).collect(),
            columns,
        }
    }

    pub fn index_of(&self, field: Field) -> Option<usize> {
        self.columns.iter().position(|c| *c == Column::Known(field))
    }

    pub fn has(&self, field: Field) -> bool {
        self.index_of(field).is_some()
    }

    fn value<'r>(&self, record: &'r StringRecord, field: Field) -> Option<&'r str> {
        self.index_of(field)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|value| !NULL_VALUES.contains(value))
    }

    fn passthrough(&self, record: &StringRecord) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| **column == Column::Passthrough)
            .filter_map(|(idx, _)| {
                let value = record.get(idx)?.trim();
                (!value.is_empty()).then(|| (self.names[idx].clone(), value.to_string()))
            })
            .collect()
    }
}

/// A CSV row mapped onto canonical fields with typed date and times.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub line: u64,
    pub date: NaiveDate,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub staff_id: Option<String>,
    pub payroll_id: Option<String>,
    pub shift_name: Option<String>,
    pub shift_type: Option<String>,
    pub shift_start: Option<String>,
    pub shift_end: Option<String>,
    pub priority_ranking: Option<String>,
    pub task_duration: Option<String>,
    pub is_request_private: Option<String>,
    pub task_name: Option<String>,
    pub task_type: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub comments: Option<String>,
    pub private_guest_name: Option<String>,
    pub private_guest_note: Option<String>,
    pub extra: BTreeMap<String, String>,
}

pub fn normalize_row(
    map: &ColumnMap,
    record: &StringRecord,
    line: u64,
) -> Result<NormalizedRow, InvalidRow> {
    let invalid = |reason: String| InvalidRow { line, reason };

    if record.iter().all(|cell| cell.trim().is_empty()) {
        return Err(invalid("row has no values".to_string()));
    }

    let raw_date = map
        .value(record, Field::Date)
        .ok_or_else(|| invalid("missing date".to_string()))?;
    let date = parse_date(raw_date).ok_or_else(|| invalid(format!("unparseable date {raw_date:?}")))?;

    let text = |field| map.value(record, field).map(str::to_string);

    Ok(NormalizedRow {
        line,
        date,
        first_name: text(Field::FirstName),
        last_name: text(Field::LastName),
        staff_id: text(Field::StaffId),
        payroll_id: text(Field::PayrollId),
        shift_name: text(Field::ShiftName),
        shift_type: text(Field::ShiftType),
        shift_start: text(Field::ShiftStart),
        shift_end: text(Field::ShiftEnd),
        priority_ranking: text(Field::PriorityRanking),
        task_duration: text(Field::TaskDuration),
        is_request_private: text(Field::IsRequestPrivate),
        task_name: text(Field::TaskName),
        task_type: text(Field::TaskType),
        start_time: map.value(record, Field::TaskStart).and_then(parse_time),
        end_time: map.value(record, Field::TaskEnd).and_then(parse_time),
        comments: text(Field::Comments),
        private_guest_name: text(Field::PrivateGuestName),
        private_guest_note: text(Field::PrivateGuestNote),
        extra: map.passthrough(record),
    })
}

/// Lowercased, trimmed header label with BOM/zero-width characters removed
/// and inner whitespace collapsed.
pub fn normalize_header(raw: &str) -> String {
    clean_label(raw).to_lowercase()
}

fn clean_label(raw: &str) -> String {
    raw.replace(['\u{feff}', '\u{200b}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strict `YYYY/MM/DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let bytes = raw.as_bytes();
    if bytes.len() < 8 || bytes[4] != b'/' || !bytes[..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()
}

/// 24-hour `HH:MM` (or `HH.MM`); a full `YYYY-MM-DD HH:MM` timestamp keeps its time.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(&raw.replace('.', ":"), "%H:%M")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
                .ok()
                .map(|dt| dt.time())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn header_matching_tolerates_case_whitespace_and_synonyms() {
        let map = ColumnMap::from_headers(&headers(&[
            "\u{feff}Date (YYYY/MM/DD)",
            "  FIRST   name ",
            "Staff Last Name",
            "TaskName",
            "Task Start (HH:MM)",
        ]));
        assert_eq!(map.index_of(Field::Date), Some(0));
        assert_eq!(map.index_of(Field::FirstName), Some(1));
        assert_eq!(map.index_of(Field::LastName), Some(2));
        assert_eq!(map.index_of(Field::TaskName), Some(3));
        assert_eq!(map.index_of(Field::TaskStart), Some(4));
        assert!(!map.has(Field::TaskEnd));
    }

    #[test]
    fn any_date_prefixed_column_is_a_fallback_date() {
        let map = ColumnMap::from_headers(&headers(&["Task Name", "Date of Lesson"]));
        assert_eq!(map.index_of(Field::Date), Some(1));
    }

    #[test]
    fn unknown_columns_pass_through_and_unnamed_are_dropped() {
        let map = ColumnMap::from_headers(&headers(&[
            "Date (YYYY/MM/DD)",
            "Resort Area",
            "Unnamed: 7",
        ]));
        let record = StringRecord::from(vec!["2024/01/05", "Base", "junk"]);
        let row = normalize_row(&map, &record, 2).unwrap();
        assert_eq!(row.extra.len(), 1);
        assert_eq!(row.extra.get("Resort Area").map(String::as_str), Some("Base"));
    }

    #[test]
    fn missing_optional_columns_become_none() {
        let map = ColumnMap::from_headers(&headers(&["Date (YYYY/MM/DD)", "Task Name"]));
        let record = StringRecord::from(vec!["2024/01/05", "Novice Group"]);
        let row = normalize_row(&map, &record, 2).unwrap();
        assert_eq!(row.task_name.as_deref(), Some("Novice Group"));
        assert_eq!(row.first_name, None);
        assert_eq!(row.start_time, None);
    }

    #[test]
    fn bad_date_rejects_row_with_line_number() {
        let map = ColumnMap::from_headers(&headers(&["Date (YYYY/MM/DD)"]));
        let err = normalize_row(&map, &StringRecord::from(vec!["13/45/2024"]), 9).unwrap_err();
        assert_eq!(err.line, 9);
        assert!(err.reason.contains("13/45/2024"));
    }

    #[test]
    fn bad_time_is_soft() {
        let map = ColumnMap::from_headers(&headers(&[
            "Date (YYYY/MM/DD)",
            "Task Start (HH:MM)",
            "Task End (HH:MM)",
        ]));
        let record = StringRecord::from(vec!["2024/01/05", "late", "11:30"]);
        let row = normalize_row(&map, &record, 2).unwrap();
        assert_eq!(row.start_time, None);
        assert_eq!(row.end_time, NaiveTime::from_hms_opt(11, 30, 0));
    }

    #[test]
    fn date_parsing_is_strict() {
        assert_eq!(parse_date("2024/01/05"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(parse_date("2024-01-05"), None);
        assert_eq!(parse_date("05/01/2024"), None);
        assert_eq!(parse_date("2024/02/30"), None);
    }

    #[test]
    fn time_parsing_accepts_known_shapes() {
        let nine_thirty = NaiveTime::from_hms_opt(9, 30, 0);
        assert_eq!(parse_time("09:30"), nine_thirty);
        assert_eq!(parse_time(" 9.30 "), nine_thirty);
        assert_eq!(parse_time("2024-01-05 09:30"), nine_thirty);
        assert_eq!(parse_time("25:00"), None);
        assert_eq!(parse_time("noon"), None);
    }
}
