use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeBand {
    Kids,
    Adults,
}

impl AgeBand {
    pub fn as_str(self) -> &'static str {
        match self {
            AgeBand::Kids => "Kids",
            AgeBand::Adults => "Adults",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kids" => Ok(AgeBand::Kids),
            "adults" => Ok(AgeBand::Adults),
            other => Err(format!("unknown age band {other:?}")),
        }
    }
}

/// Teaching level. Variants are declared in classification precedence order,
/// so the derived `Ord` doubles as the tie-break order for dominant levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    NonTeaching,
    Private,
    FirstTime,
    Novice,
    Beginner,
    Intermediate,
    Advanced,
    Freestyle,
    MeetAndGreet,
    Training,
    Available,
    Other,
}

impl Level {
    pub const ALL: [Level; 12] = [
        Level::NonTeaching,
        Level::Private,
        Level::FirstTime,
        Level::Novice,
        Level::Beginner,
        Level::Intermediate,
        Level::Advanced,
        Level::Freestyle,
        Level::MeetAndGreet,
        Level::Training,
        Level::Available,
        Level::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::NonTeaching => "Non Teaching",
            Level::Private => "Private",
            Level::FirstTime => "1st Time",
            Level::Novice => "Novice",
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
            Level::Freestyle => "Freestyle",
            Level::MeetAndGreet => "Meet & Greet",
            Level::Training => "Training",
            Level::Available => "Available",
            Level::Other => "Other",
        }
    }

    pub fn is_teaching(self) -> bool {
        !matches!(
            self,
            Level::NonTeaching | Level::Available | Level::Training | Level::MeetAndGreet
        )
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Level::ALL
            .into_iter()
            .find(|level| {
                level.as_str().eq_ignore_ascii_case(wanted)
                    || format!("{level:?}").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("unknown level {wanted:?}"))
    }
}

/// One scheduled task instance, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub booking_id: String,
    pub date: NaiveDate,
    pub week: u32,
    /// ISO week-numbering year that `week` belongs to.
    pub week_year: i32,
    pub staff_id: String,
    pub instructor: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub payroll_id: Option<String>,
    pub shift_name: Option<String>,
    pub shift_type: Option<String>,
    pub shift_start: Option<String>,
    pub shift_end: Option<String>,
    pub priority_ranking: Option<String>,
    pub task_duration: Option<String>,
    pub is_request_private: Option<String>,
    pub task_name: String,
    pub task_type: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub comments: Option<String>,
    pub private_guest_name: Option<String>,
    pub private_guest_note: Option<String>,
    pub age_band: AgeBand,
    pub level: Level,
    pub is_teaching: bool,
    pub age_inferred: Option<u8>,
    pub ability_hint: Option<Level>,
    pub extra: BTreeMap<String, String>,
}

impl BookingRecord {
    /// Scheduled minutes; zero when either time is missing or the span is not positive.
    pub fn duration_minutes(&self) -> i64 {
        scheduled_minutes(self.start_time, self.end_time)
    }
}

pub fn scheduled_minutes(start: Option<NaiveTime>, end: Option<NaiveTime>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).num_minutes().max(0),
        _ => 0,
    }
}

/// A row that was excluded from the store, with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub upload_id: Uuid,
    pub source: String,
    pub header_row: usize,
    pub inserted_count: u64,
    pub skipped_count: u64,
    pub invalid_row_count: u64,
    pub invalid_rows: Vec<InvalidRow>,
}

/// Minimal projection of a teaching booking used for streak detection.
#[derive(Debug, Clone)]
pub struct TeachingEntry {
    pub staff_id: String,
    pub instructor: String,
    pub date: NaiveDate,
    pub level: Level,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Streak {
    pub instructor: String,
    pub level: Level,
    pub length: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub week: Option<u32>,
    pub week_year: Option<i32>,
    pub age_band: Option<AgeBand>,
    pub level: Option<Level>,
    pub teaching_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub instructor: String,
    pub age_band: AgeBand,
    pub level: Level,
    pub bookings: i64,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub instructor: String,
    pub counts: BTreeMap<Level, i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub total_bookings: i64,
    pub uploads: i64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}
