//! Main bucket store implementation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, info};

use glucolog_types::{DayDeviceCounts, DeviceCount, Measurement, ParseError, day, validate_id};

use crate::error::{Error, Result};
use crate::models::StoredBucket;
use crate::schema;

/// SQLite-based store of per-device-per-day measurement buckets.
///
/// The connection sits behind a mutex, so a `BucketStore` can be shared
/// across threads (`Arc<BucketStore>`). Every merge runs as one IMMEDIATE
/// transaction; concurrent merges to the same `(device, day)` key apply in
/// a strict serial order and none are lost.
pub struct BucketStore {
    conn: Mutex<Connection>,
}

impl BucketStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better performance
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means a panic mid-query; the transaction it was
        // in has already rolled back, so the connection is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// Merge operations
impl BucketStore {
    /// Merge one measurement into its `(device, day)` bucket.
    ///
    /// Creates the bucket if it does not exist, otherwise appends the entry
    /// and folds the value into the running min/max/sum/count. The average
    /// is recomputed inside the same atomic statement, so no interleaving
    /// writer can observe or produce a stale `avg_value`.
    pub fn merge(
        &self,
        device_id: &str,
        user_id: &str,
        time: OffsetDateTime,
        value: i64,
    ) -> Result<()> {
        let day = day::truncate_to_day(time);
        self.merge_group(device_id, user_id, day, &[Measurement::new(time, value)])
    }

    /// Merge a pre-grouped batch of measurements into one `(device, day)`
    /// bucket in a single transaction.
    ///
    /// The group's local min/max/sum/count are folded into the bucket in one
    /// shot; the final bucket state is identical to calling [`merge`] once
    /// per measurement in slice order. Callers are responsible for grouping
    /// measurements by their truncated day.
    ///
    /// [`merge`]: BucketStore::merge
    pub fn merge_group(
        &self,
        device_id: &str,
        user_id: &str,
        day: Date,
        measurements: &[Measurement],
    ) -> Result<()> {
        validate_id(device_id)?;
        validate_id(user_id)?;

        if measurements.is_empty() {
            debug!("Empty merge group for {} on {}, nothing to do", device_id, day);
            return Ok(());
        }

        // Fold the group locally so the upsert applies it in one statement.
        let mut min_value = measurements[0].value;
        let mut max_value = measurements[0].value;
        let mut sum_values: i64 = 0;
        let mut times_ns = Vec::with_capacity(measurements.len());
        for m in measurements {
            min_value = min_value.min(m.value);
            max_value = max_value.max(m.value);
            sum_values += m.value;
            times_ns.push(time_to_ns(m.time)?);
        }
        let count = measurements.len() as i64;
        let day_secs = day::day_start(day).unix_timestamp();

        let mut conn = self.lock();
        self.apply_group(
            &mut conn,
            device_id,
            user_id,
            day_secs,
            min_value,
            max_value,
            sum_values,
            count,
            measurements,
            &times_ns,
        )
        .map_err(|source| Error::Merge {
            device_id: device_id.to_string(),
            day,
            source,
        })?;

        debug!(
            "Merged {} measurement(s) into bucket ({}, {})",
            count, device_id, day
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_group(
        &self,
        conn: &mut Connection,
        device_id: &str,
        user_id: &str,
        day_secs: i64,
        min_value: i64,
        max_value: i64,
        sum_values: i64,
        count: i64,
        measurements: &[Measurement],
        times_ns: &[i64],
    ) -> std::result::Result<(), rusqlite::Error> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Create-or-update with the average derived in the same statement;
        // unqualified columns in DO UPDATE refer to the pre-update row.
        tx.execute(
            "INSERT INTO buckets
                (user_id, device_id, day, min_value, max_value, sum_values,
                 count_readings, avg_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CAST(?6 AS REAL) / ?7)
             ON CONFLICT(device_id, day) DO UPDATE SET
                min_value = MIN(min_value, excluded.min_value),
                max_value = MAX(max_value, excluded.max_value),
                sum_values = sum_values + excluded.sum_values,
                count_readings = count_readings + excluded.count_readings,
                avg_value = CAST(sum_values + excluded.sum_values AS REAL)
                            / (count_readings + excluded.count_readings)",
            params![
                user_id, device_id, day_secs, min_value, max_value, sum_values, count
            ],
        )?;

        let bucket_id: i64 = tx.query_row(
            "SELECT id FROM buckets WHERE device_id = ?1 AND day = ?2",
            params![device_id, day_secs],
            |row| row.get(0),
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO bucket_entries (bucket_id, time_ns, value) VALUES (?1, ?2, ?3)",
            )?;
            for (m, ns) in measurements.iter().zip(times_ns) {
                stmt.execute(params![bucket_id, ns, m.value])?;
            }
        }

        tx.commit()
    }
}

// Read operations
impl BucketStore {
    /// Fetch all of a user's buckets whose day falls in `[start_day, end_day]`
    /// inclusive, ascending by day (devices ascending within a day).
    ///
    /// Entries are loaded in arrival order. Returns an empty vec when the
    /// user has no buckets in range; absence of data is not an error.
    pub fn fetch_range(
        &self,
        user_id: &str,
        start_day: Date,
        end_day: Date,
    ) -> Result<Vec<StoredBucket>> {
        validate_id(user_id)?;

        let start_secs = day::day_start(start_day).unix_timestamp();
        let end_secs = day::day_start(end_day).unix_timestamp();

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, device_id, day, min_value, max_value,
                    sum_values, count_readings, avg_value
             FROM buckets
             WHERE user_id = ?1 AND day BETWEEN ?2 AND ?3
             ORDER BY day ASC, device_id ASC",
        )?;

        let mut buckets = stmt
            .query_map(params![user_id, start_secs, end_secs], |row| {
                Ok(StoredBucket {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    device_id: row.get(2)?,
                    day: OffsetDateTime::from_unix_timestamp(row.get(3)?)
                        .unwrap()
                        .date(),
                    entries: Vec::new(),
                    min_value: row.get(4)?,
                    max_value: row.get(5)?,
                    sum_values: row.get(6)?,
                    count_readings: row.get::<_, i64>(7)? as u64,
                    avg_value: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut entries_stmt = conn.prepare(
            "SELECT time_ns, value FROM bucket_entries
             WHERE bucket_id = ?1 ORDER BY id ASC",
        )?;
        for bucket in &mut buckets {
            bucket.entries = entries_stmt
                .query_map([bucket.id], |row| {
                    Ok(Measurement {
                        time: OffsetDateTime::from_unix_timestamp_nanos(
                            row.get::<_, i64>(0)? as i128,
                        )
                        .unwrap(),
                        value: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
        }

        debug!(
            "Fetched {} bucket(s) for {} in [{}, {}]",
            buckets.len(),
            user_id,
            start_day,
            end_day
        );
        Ok(buckets)
    }

    /// Fetch one bucket by its `(device, day)` key, if it exists.
    pub fn get_bucket(&self, device_id: &str, day: Date) -> Result<Option<StoredBucket>> {
        validate_id(device_id)?;

        let day_secs = day::day_start(day).unix_timestamp();
        let conn = self.lock();

        let bucket = conn
            .query_row(
                "SELECT id, user_id, device_id, day, min_value, max_value,
                        sum_values, count_readings, avg_value
                 FROM buckets WHERE device_id = ?1 AND day = ?2",
                params![device_id, day_secs],
                |row| {
                    Ok(StoredBucket {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        device_id: row.get(2)?,
                        day: OffsetDateTime::from_unix_timestamp(row.get(3)?)
                            .unwrap()
                            .date(),
                        entries: Vec::new(),
                        min_value: row.get(4)?,
                        max_value: row.get(5)?,
                        sum_values: row.get(6)?,
                        count_readings: row.get::<_, i64>(7)? as u64,
                        avg_value: row.get(8)?,
                    })
                },
            )
            .optional()?;

        let Some(mut bucket) = bucket else {
            return Ok(None);
        };

        bucket.entries = conn
            .prepare(
                "SELECT time_ns, value FROM bucket_entries
                 WHERE bucket_id = ?1 ORDER BY id ASC",
            )?
            .query_map([bucket.id], |row| {
                Ok(Measurement {
                    time: OffsetDateTime::from_unix_timestamp_nanos(row.get::<_, i64>(0)? as i128)
                        .unwrap(),
                    value: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(bucket))
    }

    /// Per-day, per-device reading counts for buckets whose day is at or
    /// after `now - lookback_days`.
    ///
    /// Days ascend; within a day, devices ascend by id. Counts come straight
    /// from the persisted `count_readings` running field.
    pub fn fetch_daily_device_counts(
        &self,
        user_id: &str,
        lookback_days: i64,
    ) -> Result<Vec<DayDeviceCounts>> {
        validate_id(user_id)?;

        let cutoff = (OffsetDateTime::now_utc() - Duration::days(lookback_days)).unix_timestamp();

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT day, device_id, count_readings
             FROM buckets
             WHERE user_id = ?1 AND day >= ?2
             ORDER BY day ASC, device_id ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id, cutoff], |row| {
                Ok((
                    OffsetDateTime::from_unix_timestamp(row.get(0)?)
                        .unwrap()
                        .date(),
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut days: Vec<DayDeviceCounts> = Vec::new();
        for (row_day, device_id, count) in rows {
            match days.last_mut() {
                Some(current) if current.day == row_day => {
                    current.devices.push(DeviceCount { device_id, count });
                }
                _ => days.push(DayDeviceCounts {
                    day: row_day,
                    devices: vec![DeviceCount { device_id, count }],
                }),
            }
        }

        Ok(days)
    }

    /// Count buckets, optionally for one user.
    pub fn count_buckets(&self, user_id: Option<&str>) -> Result<u64> {
        let conn = self.lock();
        let count: i64 = match user_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(*) FROM buckets WHERE user_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM buckets", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

fn time_to_ns(time: OffsetDateTime) -> Result<i64> {
    i64::try_from(time.unix_timestamp_nanos())
        .map_err(|_| Error::Invalid(ParseError::InvalidTimestamp(time.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::{date, datetime};

    fn stats(store: &BucketStore, device: &str, day: Date) -> (i64, i64, i64, u64, f64) {
        let bucket = store.get_bucket(device, day).unwrap().unwrap();
        (
            bucket.min_value,
            bucket.max_value,
            bucket.sum_values,
            bucket.count_readings,
            bucket.avg_value,
        )
    }

    #[test]
    fn test_merge_creates_bucket() {
        let store = BucketStore::open_in_memory().unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 08:00:00 UTC), 104)
            .unwrap();

        let bucket = store.get_bucket("d1", date!(2024-03-15)).unwrap().unwrap();
        assert_eq!(bucket.user_id, "u1");
        assert_eq!(bucket.device_id, "d1");
        assert_eq!(bucket.day, date!(2024-03-15));
        assert_eq!(bucket.entries.len(), 1);
        assert_eq!(bucket.min_value, 104);
        assert_eq!(bucket.max_value, 104);
        assert_eq!(bucket.sum_values, 104);
        assert_eq!(bucket.count_readings, 1);
        assert!((bucket.avg_value - 104.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_updates_running_stats() {
        let store = BucketStore::open_in_memory().unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 08:00:00 UTC), 100)
            .unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 09:00:00 UTC), 105)
            .unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 07:00:00 UTC), 98)
            .unwrap();

        let bucket = store.get_bucket("d1", date!(2024-03-15)).unwrap().unwrap();
        assert_eq!(bucket.count_readings, 3);
        assert_eq!(bucket.entries.len(), 3);
        assert_eq!(bucket.min_value, 98);
        assert_eq!(bucket.max_value, 105);
        assert_eq!(bucket.sum_values, 303);
        assert!((bucket.avg_value - 101.0).abs() < 1e-9);

        // Arrival order, not time order
        assert_eq!(
            bucket.entries.iter().map(|m| m.value).collect::<Vec<_>>(),
            vec![100, 105, 98]
        );
    }

    #[test]
    fn test_merge_splits_by_calendar_day() {
        let store = BucketStore::open_in_memory().unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 23:59:59.999999999 UTC), 90)
            .unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-16 00:00:00 UTC), 110)
            .unwrap();

        assert_eq!(stats(&store, "d1", date!(2024-03-15)).3, 1);
        assert_eq!(stats(&store, "d1", date!(2024-03-16)).3, 1);
    }

    #[test]
    fn test_merge_rejects_bad_ids() {
        let store = BucketStore::open_in_memory().unwrap();
        let err = store
            .merge("", "u1", datetime!(2024-03-15 08:00:00 UTC), 100)
            .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));

        let err = store
            .merge("d1", "no spaces allowed", datetime!(2024-03-15 08:00:00 UTC), 100)
            .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn test_merge_group_equivalent_to_singles() {
        let measurements = vec![
            Measurement::new(datetime!(2024-03-15 08:00:00 UTC), 100),
            Measurement::new(datetime!(2024-03-15 12:30:00 UTC), 140),
            Measurement::new(datetime!(2024-03-15 06:15:00 UTC), 82),
            Measurement::new(datetime!(2024-03-15 20:00:00 UTC), 121),
        ];

        let singles = BucketStore::open_in_memory().unwrap();
        for m in &measurements {
            singles.merge("d1", "u1", m.time, m.value).unwrap();
        }

        let grouped = BucketStore::open_in_memory().unwrap();
        grouped
            .merge_group("d1", "u1", date!(2024-03-15), &measurements)
            .unwrap();

        let a = singles.get_bucket("d1", date!(2024-03-15)).unwrap().unwrap();
        let b = grouped.get_bucket("d1", date!(2024-03-15)).unwrap().unwrap();
        assert_eq!(a.entries, b.entries);
        assert_eq!(a.min_value, b.min_value);
        assert_eq!(a.max_value, b.max_value);
        assert_eq!(a.sum_values, b.sum_values);
        assert_eq!(a.count_readings, b.count_readings);
        assert!((a.avg_value - b.avg_value).abs() < 1e-9);
    }

    #[test]
    fn test_merge_group_empty_is_noop() {
        let store = BucketStore::open_in_memory().unwrap();
        store
            .merge_group("d1", "u1", date!(2024-03-15), &[])
            .unwrap();
        assert!(store.get_bucket("d1", date!(2024-03-15)).unwrap().is_none());
    }

    #[test]
    fn test_ingestion_commutes() {
        // Statistics must be permutation-invariant even though entry order
        // differs.
        let values = [100i64, 105, 98];
        let perms: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut results = Vec::new();
        for perm in perms {
            let store = BucketStore::open_in_memory().unwrap();
            for (i, &idx) in perm.iter().enumerate() {
                let t = datetime!(2024-03-15 08:00:00 UTC) + Duration::hours(i as i64);
                store.merge("d1", "u1", t, values[idx]).unwrap();
            }
            results.push(stats(&store, "d1", date!(2024-03-15)));
        }

        for result in &results[1..] {
            assert_eq!(result.0, results[0].0);
            assert_eq!(result.1, results[0].1);
            assert_eq!(result.2, results[0].2);
            assert_eq!(result.3, results[0].3);
            assert!((result.4 - results[0].4).abs() < 1e-9);
        }
    }

    #[test]
    fn test_average_invariant_holds_after_every_merge() {
        let store = BucketStore::open_in_memory().unwrap();
        let values = [310i64, 7, 154, 154, 29, 888, 41];
        for (i, &v) in values.iter().enumerate() {
            let t = datetime!(2024-03-15 00:05:00 UTC) + Duration::minutes(5 * i as i64);
            store.merge("d1", "u1", t, v).unwrap();

            let bucket = store.get_bucket("d1", date!(2024-03-15)).unwrap().unwrap();
            let expected = bucket.sum_values as f64 / bucket.count_readings as f64;
            assert!((bucket.avg_value - expected).abs() < 1e-9);
            assert_eq!(bucket.count_readings as usize, bucket.entries.len());
        }
    }

    #[test]
    fn test_fetch_range_inclusive_and_ordered() {
        let store = BucketStore::open_in_memory().unwrap();
        for (day, value) in [
            (datetime!(2024-03-14 10:00:00 UTC), 90),
            (datetime!(2024-03-15 10:00:00 UTC), 100),
            (datetime!(2024-03-16 10:00:00 UTC), 110),
            (datetime!(2024-03-17 10:00:00 UTC), 120),
        ] {
            store.merge("d1", "u1", day, value).unwrap();
        }

        let buckets = store
            .fetch_range("u1", date!(2024-03-15), date!(2024-03-16))
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].day, date!(2024-03-15));
        assert_eq!(buckets[1].day, date!(2024-03-16));
    }

    #[test]
    fn test_fetch_range_filters_by_user() {
        let store = BucketStore::open_in_memory().unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 08:00:00 UTC), 100)
            .unwrap();
        store
            .merge("d2", "u2", datetime!(2024-03-15 08:00:00 UTC), 200)
            .unwrap();

        let buckets = store
            .fetch_range("u1", date!(2024-03-15), date!(2024-03-15))
            .unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].user_id, "u1");

        // No buckets at all is an empty result, not an error
        let none = store
            .fetch_range("u3", date!(2024-03-15), date!(2024-03-15))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_get_bucket_absent_is_none() {
        let store = BucketStore::open_in_memory().unwrap();
        assert!(store.get_bucket("d1", date!(2024-03-15)).unwrap().is_none());
    }

    #[test]
    fn test_daily_device_counts_ordering() {
        let store = BucketStore::open_in_memory().unwrap();
        let today = day::day_start(day::truncate_to_day(OffsetDateTime::now_utc()));

        // d2 inserted first to prove ordering is by id, not arrival
        store.merge("d2", "u1", today + Duration::hours(1), 100).unwrap();
        store.merge("d2", "u1", today + Duration::hours(2), 105).unwrap();
        store.merge("d2", "u1", today + Duration::hours(3), 102).unwrap();
        store.merge("d1", "u1", today + Duration::hours(4), 98).unwrap();
        store.merge("d1", "u1", today + Duration::hours(5), 99).unwrap();

        let overview = store.fetch_daily_device_counts("u1", 1).unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].day, today.date());
        assert_eq!(overview[0].devices.len(), 2);
        assert_eq!(overview[0].devices[0].device_id, "d1");
        assert_eq!(overview[0].devices[0].count, 2);
        assert_eq!(overview[0].devices[1].device_id, "d2");
        assert_eq!(overview[0].devices[1].count, 3);
    }

    #[test]
    fn test_daily_device_counts_lookback_excludes_old_days() {
        let store = BucketStore::open_in_memory().unwrap();
        let now = OffsetDateTime::now_utc();

        store.merge("d1", "u1", now, 100).unwrap();
        store.merge("d1", "u1", now - Duration::days(30), 90).unwrap();

        let overview = store.fetch_daily_device_counts("u1", 7).unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].day, day::truncate_to_day(now));
    }

    #[test]
    fn test_concurrent_merges_to_one_key_all_persist() {
        let store = Arc::new(BucketStore::open_in_memory().unwrap());
        let base = datetime!(2024-03-15 08:00:00 UTC);
        let n = 16i64;

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .merge("d1", "u1", base + Duration::minutes(i), 100 + i)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let bucket = store.get_bucket("d1", date!(2024-03-15)).unwrap().unwrap();
        let expected_sum: i64 = (0..n).map(|i| 100 + i).sum();
        assert_eq!(bucket.count_readings, n as u64);
        assert_eq!(bucket.entries.len(), n as usize);
        assert_eq!(bucket.sum_values, expected_sum);
        assert_eq!(bucket.min_value, 100);
        assert_eq!(bucket.max_value, 100 + n - 1);
        assert!((bucket.avg_value - expected_sum as f64 / n as f64).abs() < 1e-9);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let store = BucketStore::open(&path).unwrap();
        store
            .merge("d1", "u1", datetime!(2024-03-15 08:00:00 UTC), 100)
            .unwrap();
        drop(store);

        let reopened = BucketStore::open(&path).unwrap();
        assert_eq!(reopened.count_buckets(Some("u1")).unwrap(), 1);
    }
}
