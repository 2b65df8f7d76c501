//! CSV exports for spreadsheet consumers. Column order and header names are
//! fixed; the header row is written even when there are no data rows.

use std::io;

use serde::Serialize;

use crate::models::{Level, PivotRow, Streak, SummaryRow};

pub const SUMMARY_HEADERS: [&str; 5] = ["instructor", "age_band", "level", "bookings", "minutes"];
pub const STREAK_HEADERS: [&str; 5] = ["instructor", "level", "length", "start_date", "end_date"];

#[derive(Serialize)]
struct SummaryLine<'a> {
    instructor: &'a str,
    age_band: &'static str,
    level: &'static str,
    bookings: i64,
    minutes: i64,
}

#[derive(Serialize)]
struct StreakLine<'a> {
    instructor: &'a str,
    level: &'static str,
    length: usize,
    start_date: String,
    end_date: String,
}

fn writer<W: io::Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().has_headers(false).from_writer(out)
}

pub fn write_summary<W: io::Write>(out: W, rows: &[SummaryRow]) -> csv::Result<()> {
    let mut csv = writer(out);
    csv.write_record(SUMMARY_HEADERS)?;
    for row in rows {
        csv.serialize(SummaryLine {
            instructor: &row.instructor,
            age_band: row.age_band.as_str(),
            level: row.level.as_str(),
            bookings: row.bookings,
            minutes: row.minutes,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// `instructor` followed by one column per level in precedence order.
pub fn pivot_headers() -> Vec<&'static str> {
    std::iter::once("instructor")
        .chain(Level::ALL.iter().map(|level| level.as_str()))
        .collect()
}

pub fn write_pivot<W: io::Write>(out: W, rows: &[PivotRow]) -> csv::Result<()> {
    let mut csv = writer(out);
    csv.write_record(pivot_headers())?;
    for row in rows {
        let mut line = vec![row.instructor.clone()];
        line.extend(
            Level::ALL
                .iter()
                .map(|level| row.counts.get(level).copied().unwrap_or(0).to_string()),
        );
        csv.write_record(&line)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_streaks<W: io::Write>(out: W, streaks: &[Streak]) -> csv::Result<()> {
    let mut csv = writer(out);
    csv.write_record(STREAK_HEADERS)?;
    for streak in streaks {
        csv.serialize(StreakLine {
            instructor: &streak.instructor,
            level: streak.level.as_str(),
            length: streak.length,
            start_date: streak.start_date.format("%Y-%m-%d").to_string(),
            end_date: streak.end_date.format("%Y-%m-%d").to_string(),
        })?;
    }
    csv.flush()?;
    Ok(())
}
