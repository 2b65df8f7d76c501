use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::classify;
use crate::models::{AgeBand, BookingRecord, Level};
use crate::normalize::NormalizedRow;

pub fn build_record(row: NormalizedRow) -> BookingRecord {
    let task_type = row.task_type.unwrap_or_default();
    let task_name = clean_task_name(row.task_name.as_deref(), &task_type);
    let instructor = display_name(row.first_name.as_deref(), row.last_name.as_deref());
    let staff_id = staff_identity(row.staff_id.as_deref(), &instructor);

    let (mut age_band, level) = classify::classify(&task_name, &task_type);

    let notes = [
        Some(task_name.as_str()),
        row.comments.as_deref(),
        row.private_guest_note.as_deref(),
        row.private_guest_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    let age_inferred = if level == Level::Private {
        classify::infer_age(&notes)
    } else {
        None
    };
    if let Some(age) = age_inferred {
        age_band = if age < classify::KIDS_AGE_LIMIT {
            AgeBand::Kids
        } else {
            AgeBand::Adults
        };
    }

    BookingRecord {
        booking_id: booking_id(row.date, &staff_id, row.start_time, row.end_time, &task_name),
        date: row.date,
        week: row.date.iso_week().week(),
        week_year: row.date.iso_week().year(),
        staff_id,
        instructor,
        first_name: row.first_name,
        last_name: row.last_name,
        payroll_id: row.payroll_id,
        shift_name: row.shift_name,
        shift_type: row.shift_type,
        shift_start: row.shift_start,
        shift_end: row.shift_end,
        priority_ranking: row.priority_ranking,
        task_duration: row.task_duration,
        is_request_private: row.is_request_private,
        task_name,
        task_type,
        start_time: row.start_time,
        end_time: row.end_time,
        comments: row.comments,
        private_guest_name: row.private_guest_name,
        private_guest_note: row.private_guest_note,
        age_band,
        level,
        is_teaching: level.is_teaching(),
        age_inferred,
        ability_hint: classify::ability_hint(&notes),
        extra: row.extra,
    }
}

/// `date|staff_id|start-end|task_name`; a missing time contributes an empty string.
pub fn booking_id(
    date: NaiveDate,
    staff_id: &str,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    task_name: &str,
) -> String {
    format!(
        "{}|{}|{}-{}|{}",
        date.format("%Y-%m-%d"),
        staff_id,
        format_time(start),
        format_time(end),
        task_name
    )
}

fn format_time(time: Option<NaiveTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default()
}

/// Placeholder task names ("", single characters, "a") defer to the task type.
pub fn clean_task_name(task_name: Option<&str>, task_type: &str) -> String {
    match task_name.map(str::trim) {
        Some(name) if name.chars().count() > 1 && !name.eq_ignore_ascii_case("a") => {
            name.to_string()
        }
        _ => task_type.to_string(),
    }
}

pub fn display_name(first: Option<&str>, last: Option<&str>) -> String {
    [first, last]
        .into_iter()
        .flatten()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Explicit staff id when the export carries one, otherwise the case-folded display name.
pub fn staff_identity(explicit: Option<&str>, instructor: &str) -> String {
    match explicit.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => instructor.to_lowercase(),
    }
}
