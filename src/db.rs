use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    AgeBand, BookingRecord, HistoryStats, Level, PivotRow, QueryFilter, SummaryRow, TeachingEntry,
};

/// Metadata for one ingestion run, written alongside its bookings.
#[derive(Debug, Clone)]
pub struct UploadLog {
    pub upload_id: Uuid,
    pub source: String,
    pub header_row: usize,
    pub delimiter: char,
    pub invalid_count: u64,
}

/// Handle on the booking history. Callers open one per operation and
/// `close` it when done; concurrent writers must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    #[instrument]
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::Open)?
            .create_if_missing(true);

        // One connection: keeps in-memory databases alive and writes single-file.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("store ready");
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Inserts the batch in one transaction. Records whose `booking_id`
    /// already exists (in history or earlier in the batch) are skipped.
    #[instrument(skip_all, fields(upload_id = %upload.upload_id, records = records.len()))]
    pub async fn insert_batch(
        &self,
        upload: &UploadLog,
        records: &[BookingRecord],
    ) -> Result<(u64, u64), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO uploads
            (upload_id, source, header_row, delimiter, inserted_count, skipped_count, invalid_count, ingested_at)
            VALUES (?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(upload.upload_id.to_string())
        .bind(&upload.source)
        .bind(upload.header_row as i64)
        .bind(upload.delimiter.to_string())
        .bind(upload.invalid_count as i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let mut inserted = 0u64;
        let mut skipped = 0u64;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO bookings
                (booking_id, date, week, week_year, staff_id, instructor, first_name, last_name,
                 payroll_id, shift_name, shift_type, shift_start, shift_end, priority_ranking,
                 task_name, task_type, start_time, end_time, minutes, task_duration, comments,
                 private_guest_name, is_request_private, private_guest_note, age_band, level,
                 is_teaching, age_inferred, ability_hint, extra, upload_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                        ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (booking_id) DO NOTHING
                "#,
            )
            .bind(&record.booking_id)
            .bind(record.date)
            .bind(record.week as i64)
            .bind(record.week_year)
            .bind(&record.staff_id)
            .bind(&record.instructor)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.payroll_id)
            .bind(&record.shift_name)
            .bind(&record.shift_type)
            .bind(&record.shift_start)
            .bind(&record.shift_end)
            .bind(&record.priority_ranking)
            .bind(&record.task_name)
            .bind(&record.task_type)
            .bind(record.start_time)
            .bind(record.end_time)
            .bind(record.duration_minutes())
            .bind(&record.task_duration)
            .bind(&record.comments)
            .bind(&record.private_guest_name)
            .bind(&record.is_request_private)
            .bind(&record.private_guest_note)
            .bind(record.age_band.as_str())
            .bind(record.level.as_str())
            .bind(record.is_teaching)
            .bind(record.age_inferred.map(i64::from))
            .bind(record.ability_hint.map(Level::as_str))
            .bind(serde_json::to_string(&record.extra)?)
            .bind(upload.upload_id.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }

        sqlx::query(
            "UPDATE uploads SET inserted_count = ?, skipped_count = ? WHERE upload_id = ?",
        )
        .bind(inserted as i64)
        .bind(skipped as i64)
        .bind(upload.upload_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(inserted, skipped, "batch committed");
        Ok((inserted, skipped))
    }

    /// Teaching bookings, optionally bounded by an inclusive date window.
    pub async fn fetch_teaching_entries(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TeachingEntry>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT staff_id, instructor, date, level, start_time, end_time \
             FROM bookings WHERE is_teaching = 1",
        );
        if let Some(from) = from {
            query.push(" AND date >= ").push_bind(from);
        }
        if let Some(to) = to {
            query.push(" AND date <= ").push_bind(to);
        }
        query.push(" ORDER BY staff_id, date");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut entries = Vec::with_capacity(rows.len());

        for row in rows {
            entries.push(TeachingEntry {
                staff_id: row.try_get("staff_id")?,
                instructor: row.try_get("instructor")?,
                date: row.try_get("date")?,
                level: level_column(&row)?,
                start_time: row.try_get("start_time")?,
                end_time: row.try_get("end_time")?,
            });
        }

        Ok(entries)
    }

    /// Booking count and scheduled minutes per (instructor, age band, level).
    pub async fn summary(&self, filter: &QueryFilter) -> Result<Vec<SummaryRow>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT instructor, age_band, level, COUNT(*) AS bookings, \
             COALESCE(SUM(minutes), 0) AS minutes FROM bookings",
        );
        push_filter(&mut query, filter);
        query.push(" GROUP BY instructor, age_band, level");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut summary = Vec::with_capacity(rows.len());

        for row in rows {
            let age_band: String = row.try_get("age_band")?;
            summary.push(SummaryRow {
                instructor: row.try_get("instructor")?,
                age_band: AgeBand::from_str(&age_band).map_err(StoreError::Corrupt)?,
                level: level_column(&row)?,
                bookings: row.try_get("bookings")?,
                minutes: row.try_get("minutes")?,
            });
        }

        summary.sort_by(|a, b| {
            (&a.instructor, a.age_band, a.level).cmp(&(&b.instructor, b.age_band, b.level))
        });
        Ok(summary)
    }

    /// Booking counts per instructor with one entry for every level.
    pub async fn pivot(&self, filter: &QueryFilter) -> Result<Vec<PivotRow>, StoreError> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT instructor, level, COUNT(*) AS bookings FROM bookings");
        push_filter(&mut query, filter);
        query.push(" GROUP BY instructor, level");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut by_instructor: BTreeMap<String, BTreeMap<Level, i64>> = BTreeMap::new();

        for row in rows {
            let counts = by_instructor
                .entry(row.try_get("instructor")?)
                .or_insert_with(|| Level::ALL.into_iter().map(|level| (level, 0)).collect());
            *counts.entry(level_column(&row)?).or_insert(0) += row.try_get::<i64, _>("bookings")?;
        }

        Ok(by_instructor
            .into_iter()
            .map(|(instructor, counts)| PivotRow { instructor, counts })
            .collect())
    }

    pub async fn stats(&self) -> Result<HistoryStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, MIN(date) AS first_date, MAX(date) AS last_date FROM bookings",
        )
        .fetch_one(&self.pool)
        .await?;
        let uploads: i64 = sqlx::query("SELECT COUNT(*) AS uploads FROM uploads")
            .fetch_one(&self.pool)
            .await?
            .try_get("uploads")?;

        Ok(HistoryStats {
            total_bookings: row.try_get("total")?,
            uploads,
            first_date: row.try_get("first_date")?,
            last_date: row.try_get("last_date")?,
        })
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &QueryFilter) {
    query.push(" WHERE 1 = 1");
    if let Some(week) = filter.week {
        query.push(" AND week = ").push_bind(i64::from(week));
    }
    if let Some(week_year) = filter.week_year {
        query.push(" AND week_year = ").push_bind(week_year);
    }
    if let Some(age_band) = filter.age_band {
        query.push(" AND age_band = ").push_bind(age_band.as_str());
    }
    if let Some(level) = filter.level {
        query.push(" AND level = ").push_bind(level.as_str());
    }
    if filter.teaching_only {
        query.push(" AND is_teaching = 1");
    }
}

fn level_column(row: &SqliteRow) -> Result<Level, StoreError> {
    let raw: String = row.try_get("level")?;
    Level::from_str(&raw).map_err(StoreError::Corrupt)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::normalize::NormalizedRow;
    use crate::record::build_record;

    pub(crate) async fn memory_store() -> Store {
        Store::open("sqlite::memory:").await.expect("in-memory store")
    }

    pub(crate) fn upload(invalid_count: u64) -> UploadLog {
        UploadLog {
            upload_id: Uuid::new_v4(),
            source: "test.csv".to_string(),
            header_row: 0,
            delimiter: ',',
            invalid_count,
        }
    }

    pub(crate) fn booking(
        first: &str,
        date: (i32, u32, u32),
        task_name: &str,
        task_type: &str,
        hours: (u32, u32),
    ) -> BookingRecord {
        build_record(NormalizedRow {
            line: 2,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            first_name: Some(first.to_string()),
            last_name: Some("Tester".to_string()),
            staff_id: None,
            payroll_id: None,
            shift_name: None,
            shift_type: None,
            shift_start: None,
            shift_end: None,
            priority_ranking: None,
            task_duration: None,
            is_request_private: None,
            task_name: Some(task_name.to_string()),
            task_type: Some(task_type.to_string()),
            start_time: NaiveTime::from_hms_opt(hours.0, 0, 0),
            end_time: NaiveTime::from_hms_opt(hours.1, 0, 0),
            comments: None,
            private_guest_name: None,
            private_guest_note: None,
            extra: BTreeMap::new(),
        })
    }

    /// Makes the store refuse any booking with this task name, failing its transaction.
    pub(crate) async fn reject_task(store: &Store, task_name: &str) {
        let trigger = format!(
            "CREATE TRIGGER reject_task BEFORE INSERT ON bookings \
             WHEN NEW.task_name = '{task_name}' \
             BEGIN SELECT RAISE(ABORT, 'rejected task'); END"
        );
        sqlx::query(&trigger)
            .execute(&store.pool)
            .await
            .expect("install trigger");
    }

    #[tokio::test]
    async fn duplicate_keys_are_skipped_not_rejected() {
        let store = memory_store().await;
        let records = vec![
            booking("Ana", (2024, 1, 1), "Novice Group", "Group", (9, 11)),
            booking("Ana", (2024, 1, 1), "Novice Group", "Group", (9, 11)),
            booking("Ana", (2024, 1, 1), "Novice Group", "Group", (13, 15)),
        ];

        let first = store.insert_batch(&upload(0), &records).await.unwrap();
        assert_eq!(first, (2, 1));

        let second = store.insert_batch(&upload(0), &records).await.unwrap();
        assert_eq!(second, (0, 3));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_bookings, 2);
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.first_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[tokio::test]
    async fn filters_compose_with_and() {
        let store = memory_store().await;
        let records = vec![
            booking("Ana", (2024, 1, 1), "Kids Novice", "Group", (9, 11)),
            booking("Ana", (2024, 1, 1), "Adult Novice", "Group", (11, 12)),
            booking("Ana", (2024, 1, 2), "Adult Advanced", "Group", (9, 12)),
            booking("Ben", (2024, 1, 8), "Adult Novice", "Group", (9, 10)),
            booking("Ben", (2024, 1, 8), "Setup", "Non Teaching", (8, 9)),
        ];
        store.insert_batch(&upload(0), &records).await.unwrap();

        let week_one = QueryFilter {
            week: Some(1),
            level: Some(Level::Novice),
            ..QueryFilter::default()
        };
        let rows = store.summary(&week_one).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.instructor == "Ana"));
        assert_eq!(rows[0].age_band, AgeBand::Kids);
        assert_eq!(rows[0].minutes, 120);

        let teaching = QueryFilter {
            teaching_only: true,
            age_band: Some(AgeBand::Adults),
            ..QueryFilter::default()
        };
        let pivot = store.pivot(&teaching).await.unwrap();
        assert_eq!(pivot.len(), 2);
        assert_eq!(pivot[1].instructor, "Ben Tester");
        assert_eq!(pivot[1].counts[&Level::Novice], 1);
        assert_eq!(pivot[1].counts[&Level::NonTeaching], 0);
        assert_eq!(pivot[1].counts.len(), Level::ALL.len());
    }

    #[tokio::test]
    async fn teaching_entries_respect_date_window() {
        let store = memory_store().await;
        let records = vec![
            booking("Ana", (2024, 1, 1), "Novice", "Group", (9, 11)),
            booking("Ana", (2024, 1, 2), "Novice", "Group", (9, 11)),
            booking("Ana", (2024, 1, 3), "Training", "Group", (9, 11)),
        ];
        store.insert_batch(&upload(0), &records).await.unwrap();

        let all = store.fetch_teaching_entries(None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let windowed = store
            .fetch_teaching_entries(NaiveDate::from_ymd_opt(2024, 1, 2), None)
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].level, Level::Novice);
        assert_eq!(windowed[0].start_time, NaiveTime::from_hms_opt(9, 0, 0));
    }

    #[tokio::test]
    async fn failed_row_rolls_back_whole_batch() {
        let store = memory_store().await;
        reject_task(&store, "Broken Group").await;
        let records = vec![
            booking("Ana", (2024, 1, 1), "Novice Group", "Group", (9, 11)),
            booking("Ana", (2024, 1, 1), "Broken Group", "Group", (11, 12)),
            booking("Ana", (2024, 1, 2), "Novice Group", "Group", (9, 11)),
        ];

        let err = store.insert_batch(&upload(0), &records).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_bookings, 0);
        assert_eq!(stats.uploads, 0);

        let accepted = [records[0].clone(), records[2].clone()];
        assert_eq!(store.insert_batch(&upload(0), &accepted).await.unwrap(), (2, 0));
    }

    #[tokio::test]
    async fn raw_shift_and_request_columns_are_stored() {
        let store = memory_store().await;
        let mut record = booking("Ana", (2024, 1, 1), "Private 2hr", "Private", (9, 11));
        record.shift_start = Some("08:30".to_string());
        record.shift_end = Some("16:00".to_string());
        record.priority_ranking = Some("3".to_string());
        record.task_duration = Some("2h".to_string());
        record.is_request_private = Some("Y".to_string());
        store.insert_batch(&upload(0), &[record]).await.unwrap();

        let row = sqlx::query(
            "SELECT shift_start, shift_end, priority_ranking, task_duration, is_request_private \
             FROM bookings",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        let text = |column: &str| row.try_get::<Option<String>, _>(column).unwrap();
        assert_eq!(text("shift_start").as_deref(), Some("08:30"));
        assert_eq!(text("shift_end").as_deref(), Some("16:00"));
        assert_eq!(text("priority_ranking").as_deref(), Some("3"));
        assert_eq!(text("task_duration").as_deref(), Some("2h"));
        assert_eq!(text("is_request_private").as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn week_filter_separates_iso_years() {
        let store = memory_store().await;
        let records = vec![
            booking("Ana", (2024, 1, 2), "Novice", "Group", (9, 11)),
            booking("Ana", (2024, 12, 31), "Novice", "Group", (9, 10)),
        ];
        store.insert_batch(&upload(0), &records).await.unwrap();

        let any_year = QueryFilter {
            week: Some(1),
            ..QueryFilter::default()
        };
        assert_eq!(store.summary(&any_year).await.unwrap()[0].bookings, 2);

        let week_year = |year| QueryFilter {
            week: Some(1),
            week_year: Some(year),
            ..QueryFilter::default()
        };
        let early = store.summary(&week_year(2024)).await.unwrap();
        assert_eq!((early[0].bookings, early[0].minutes), (1, 120));
        let late = store.summary(&week_year(2025)).await.unwrap();
        assert_eq!((late[0].bookings, late[0].minutes), (1, 60));
    }
}
