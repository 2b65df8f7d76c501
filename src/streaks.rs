use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{scheduled_minutes, Level, Streak, TeachingEntry};

pub const DEFAULT_MIN_LENGTH: usize = 5;

/// An instructor's dominant level on one teaching day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayLevel {
    pub date: NaiveDate,
    pub level: Level,
    pub minutes: i64,
}

pub async fn find_streaks_in_store(
    store: &Store,
    min_length: usize,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Streak>, StoreError> {
    let entries = store.fetch_teaching_entries(from, to).await?;
    debug!(entries = entries.len(), "loaded teaching history");
    Ok(find_streaks(&entries, min_length))
}

/// Maximal runs of consecutive dates on which an instructor's dominant level
/// stayed the same, longest first, then by instructor and start date.
pub fn find_streaks(entries: &[TeachingEntry], min_length: usize) -> Vec<Streak> {
    let min_length = min_length.max(1);
    let mut by_staff: BTreeMap<&str, Vec<&TeachingEntry>> = BTreeMap::new();

    for entry in entries.iter().filter(|entry| entry.level.is_teaching()) {
        by_staff.entry(entry.staff_id.as_str()).or_default().push(entry);
    }

    let mut streaks = Vec::new();

    for staff_entries in by_staff.values() {
        let instructor = staff_entries
            .iter()
            .map(|entry| entry.instructor.as_str())
            .min()
            .unwrap_or_default();

        let days = daily_dominant_levels(staff_entries);
        let mut run_start = 0;

        for idx in 1..=days.len() {
            let continues = idx < days.len()
                && days[idx].level == days[idx - 1].level
                && days[idx - 1].date.succ_opt() == Some(days[idx].date);
            if continues {
                continue;
            }

            let length = idx - run_start;
            if length >= min_length {
                let minutes: i64 = days[run_start..idx].iter().map(|day| day.minutes).sum();
                debug!(
                    instructor,
                    level = days[run_start].level.as_str(),
                    length,
                    minutes,
                    "streak found"
                );
                streaks.push(Streak {
                    instructor: instructor.to_string(),
                    level: days[run_start].level,
                    length,
                    start_date: days[run_start].date,
                    end_date: days[idx - 1].date,
                });
            }
            run_start = idx;
        }
    }

    streaks.sort_by(|a, b| {
        b.length
            .cmp(&a.length)
            .then_with(|| a.instructor.cmp(&b.instructor))
            .then_with(|| a.start_date.cmp(&b.start_date))
            .then_with(|| a.level.cmp(&b.level))
    });
    streaks
}

/// Dominant level per date for one instructor's entries, ordered by date.
/// Ties on minutes go to the level earlier in precedence order; dates with
/// no scheduled minutes are left out.
pub fn daily_dominant_levels(entries: &[&TeachingEntry]) -> Vec<DayLevel> {
    let mut minutes_by_day: BTreeMap<NaiveDate, BTreeMap<Level, i64>> = BTreeMap::new();

    for entry in entries {
        *minutes_by_day
            .entry(entry.date)
            .or_default()
            .entry(entry.level)
            .or_insert(0) += scheduled_minutes(entry.start_time, entry.end_time);
    }

    minutes_by_day
        .into_iter()
        .filter_map(|(date, per_level)| {
            let mut best: Option<(Level, i64)> = None;
            for (level, minutes) in per_level {
                if best.map_or(true, |(_, top)| minutes > top) {
                    best = Some((level, minutes));
                }
            }
            best.filter(|(_, minutes)| *minutes > 0)
                .map(|(level, minutes)| DayLevel {
                    date,
                    level,
                    minutes,
                })
        })
        .collect()
}
