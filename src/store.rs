use crate::{
    bucket::{SchemaConflict, Totals},
    series_key::BucketKey,
    Bucket, Period,
};
use chrono::{DateTime, Utc};
use fjall::{CompressionType, PartitionCreateOptions, TxKeyspace, TxPartition};

const BUCKETS_PARTITION: &str = "_tally#v1#buckets";
const NAMES_PARTITION: &str = "_tally#v1#names";

/// How an upsert combines with an existing bucket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpsertMode {
    /// Add the totals to the existing bucket (daily fold).
    Increment,

    /// Overwrite the existing bucket (rollup, end-of-day totals).
    Replace,
}

/// Result of an atomic upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct Upserted {
    /// The bucket as written.
    pub bucket: Bucket,

    /// Set if an increment disagreed with the shape of the existing bucket.
    pub conflict: Option<SchemaConflict>,
}

/// Durable keyed storage for buckets.
///
/// Implementations must apply [`StatisticStore::upsert`] atomically per key:
/// two concurrent increments of the same bucket must both be reflected.
pub trait StatisticStore: Send + Sync {
    /// Atomically creates or updates one bucket.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `key.start` is not aligned to `key.period`,
    /// [`crate::Error::Contention`] if a concurrent writer prevented the update.
    fn upsert(&self, key: &BucketKey, totals: Totals, mode: UpsertMode) -> crate::Result<Upserted>;

    /// Returns a single bucket.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    fn get(&self, key: &BucketKey) -> crate::Result<Option<Bucket>>;

    /// Returns all buckets of a series and period with `start ∈ [from, to)`, ordered by start.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    fn range(
        &self,
        name: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<Vec<Bucket>>;

    /// Adds up all buckets of a series and period with `start ∈ [from, to)`.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    fn sum_range(
        &self,
        name: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<Totals> {
        let mut totals = Totals::default();
        for bucket in self.range(name, period, from, to)? {
            totals.absorb(bucket.totals());
        }
        Ok(totals)
    }

    /// Atomically replaces a derived bucket with the sum of the `finer` buckets with
    /// `start ∈ [key.start, to)`.
    ///
    /// The finer buckets are read inside the same transaction that writes the derived bucket,
    /// so concurrent folds and rederivations of the same key are applied one after another.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `key.start` is not aligned to `key.period`
    /// or `to` does not lie after it,
    /// [`crate::Error::Contention`] if a concurrent writer prevented the update.
    fn rederive(&self, key: &BucketKey, finer: Period, to: DateTime<Utc>) -> crate::Result<Bucket>;

    /// Lists the distinct series names starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    fn find_names(&self, prefix: &str) -> crate::Result<Vec<String>>;
}

/// Bucket store on top of a `fjall` keyspace.
pub struct FjallStore {
    keyspace: TxKeyspace,
    buckets: TxPartition,
    names: TxPartition,
}

impl FjallStore {
    /// Opens the store's partitions in an existing keyspace.
    ///
    /// Partitions are prefixed with `_tally#` to avoid name clashes with other applications.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn new(keyspace: &TxKeyspace) -> crate::Result<Self> {
        let opts = PartitionCreateOptions::default()
            .block_size(4_096)
            .compression(CompressionType::Lz4)
            .max_memtable_size(8_000_000);

        let buckets = keyspace.open_partition(BUCKETS_PARTITION, opts)?;

        let opts = PartitionCreateOptions::default()
            .block_size(4_096)
            .compression(CompressionType::Lz4)
            .max_memtable_size(4_000_000);

        let names = keyspace.open_partition(NAMES_PARTITION, opts)?;

        Ok(Self {
            keyspace: keyspace.clone(),
            buckets,
            names,
        })
    }

    fn to_bucket(name: &str, period: Period, start: DateTime<Utc>, totals: Totals) -> Bucket {
        Bucket {
            name: name.to_owned(),
            period,
            start,
            count: totals.count,
            sum: totals.sum,
        }
    }
}

impl StatisticStore for FjallStore {
    fn upsert(&self, key: &BucketKey, totals: Totals, mode: UpsertMode) -> crate::Result<Upserted> {
        if !key.period.is_aligned(key.start) {
            return Err(crate::Error::InvalidArgument(
                "bucket start is not aligned to its period",
            ));
        }

        let encoded_key = key.encode();

        // NOTE: Write transactions are serialized (single writer),
        // so the read-merge-write below cannot interleave with another upsert
        let mut tx = self.keyspace.write_tx();

        let (merged, conflict) = match (mode, tx.get(&self.buckets, &encoded_key)?) {
            (UpsertMode::Increment, Some(bytes)) => {
                let mut current = Totals::decode(&bytes)?;
                let conflict = current.fold(totals);
                (current, conflict)
            }
            (UpsertMode::Increment | UpsertMode::Replace, _) => (totals, None),
        };

        tx.insert(&self.buckets, encoded_key, merged.encode());
        tx.insert(&self.names, key.name, "");
        tx.commit()?;

        log::trace!(
            "upserted {}/{}/{} ({mode:?}) => {merged:?}",
            key.name,
            key.period,
            key.start
        );

        Ok(Upserted {
            bucket: Self::to_bucket(key.name, key.period, key.start, merged),
            conflict,
        })
    }

    fn rederive(&self, key: &BucketKey, finer: Period, to: DateTime<Utc>) -> crate::Result<Bucket> {
        if !key.period.is_aligned(key.start) {
            return Err(crate::Error::InvalidArgument(
                "bucket start is not aligned to its period",
            ));
        }

        if to <= key.start {
            return Err(crate::Error::InvalidArgument("empty range"));
        }

        let lo = BucketKey::format(key.name, finer, key.start);
        let hi = BucketKey::format(key.name, finer, to);

        let mut tx = self.keyspace.write_tx();

        let mut totals = Totals::default();

        for kv in tx.range(&self.buckets, lo..hi) {
            let (_, v) = kv?;
            totals.absorb(Totals::decode(&v)?);
        }

        tx.insert(&self.buckets, key.encode(), totals.encode());
        tx.insert(&self.names, key.name, "");
        tx.commit()?;

        log::trace!(
            "rederived {}/{}/{} from {finer} => {totals:?}",
            key.name,
            key.period,
            key.start
        );

        Ok(Self::to_bucket(key.name, key.period, key.start, totals))
    }

    fn get(&self, key: &BucketKey) -> crate::Result<Option<Bucket>> {
        self.buckets
            .get(key.encode())?
            .map(|bytes| -> crate::Result<Bucket> {
                let totals = Totals::decode(&bytes)?;
                Ok(Self::to_bucket(key.name, key.period, key.start, totals))
            })
            .transpose()
    }

    fn range(
        &self,
        name: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<Vec<Bucket>> {
        if from >= to {
            return Ok(vec![]);
        }

        let lo = BucketKey::format(name, period, from);
        let hi = BucketKey::format(name, period, to);

        let read_tx = self.keyspace.read_tx();

        let buckets = read_tx
            .range(&self.buckets, lo..hi)
            .map(|kv| -> crate::Result<Bucket> {
                let (k, v) = kv?;
                let (_, _, start) = BucketKey::decode(&k)?;
                let totals = Totals::decode(&v)?;
                Ok(Self::to_bucket(name, period, start, totals))
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(buckets)
    }

    fn find_names(&self, prefix: &str) -> crate::Result<Vec<String>> {
        let read_tx = self.keyspace.read_tx();

        let names = read_tx
            .prefix(&self.names, prefix)
            .map(|kv| -> crate::Result<String> {
                let (k, _) = kv?;
                String::from_utf8(k.to_vec()).map_err(|_| crate::Error::Decode)
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(names)
    }
}

/// Runs a store operation, retrying it up to `max_retries` times on retryable errors.
pub(crate) fn with_retries<T>(
    max_retries: usize,
    what: &dyn std::fmt::Display,
    mut op: impl FnMut() -> crate::Result<T>,
) -> crate::Result<T> {
    let mut attempt = 0;

    loop {
        match op() {
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                log::warn!("{what} failed ({e}), retrying ({attempt}/{max_retries})");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, 0, 0, 0).unwrap()
    }

    #[test_log::test]
    fn store_increment_creates_then_adds() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        let key = BucketKey::enclosing("alert.type.fire", Period::Day, day(3));

        let first = store.upsert(&key, Totals::count(2), UpsertMode::Increment)?;
        assert_eq!(2, first.bucket.count);
        assert_eq!(None, first.conflict);

        let second = store.upsert(&key, Totals::count(3), UpsertMode::Increment)?;
        assert_eq!(5, second.bucket.count);
        assert_eq!(None, second.bucket.sum);

        assert_eq!(Some(second.bucket), store.get(&key)?);

        Ok(())
    }

    #[test_log::test]
    fn store_replace_overwrites() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        let key = BucketKey::enclosing("speed", Period::Month, day(10));

        store.upsert(
            &key,
            Totals {
                count: 4,
                sum: Some(8.0),
            },
            UpsertMode::Increment,
        )?;
        let replaced = store.upsert(&key, Totals::count(1), UpsertMode::Replace)?;

        assert_eq!(Totals::count(1), replaced.bucket.totals());
        assert_eq!(None, replaced.conflict);
        assert_eq!(day(1), replaced.bucket.start);

        Ok(())
    }

    #[test_log::test]
    fn store_increment_reports_conflict() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        let key = BucketKey::enclosing("alert", Period::Day, day(1));

        store.upsert(&key, Totals::count(1), UpsertMode::Increment)?;
        let upserted = store.upsert(
            &key,
            Totals {
                count: 1,
                sum: Some(3.0),
            },
            UpsertMode::Increment,
        )?;

        assert_eq!(Some(SchemaConflict::UnexpectedValue), upserted.conflict);
        assert_eq!(Totals::count(2), upserted.bucket.totals());

        Ok(())
    }

    #[test_log::test]
    fn store_rejects_unaligned_start() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        let key = BucketKey {
            name: "alert",
            period: Period::Month,
            start: day(2),
        };

        assert!(matches!(
            store.upsert(&key, Totals::count(1), UpsertMode::Replace),
            Err(crate::Error::InvalidArgument(_))
        ));
        assert!(store.find_names("")?.is_empty());

        Ok(())
    }

    #[test_log::test]
    fn store_range_is_half_open() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        for d in 1..=5 {
            let key = BucketKey::enclosing("alert", Period::Day, day(d));
            store.upsert(&key, Totals::count(u64::from(d)), UpsertMode::Increment)?;
        }

        // NOTE: Different series and period must not leak into the range
        store.upsert(
            &BucketKey::enclosing("alert.x", Period::Day, day(2)),
            Totals::count(100),
            UpsertMode::Increment,
        )?;
        store.upsert(
            &BucketKey::enclosing("alert", Period::Month, day(2)),
            Totals::count(100),
            UpsertMode::Replace,
        )?;

        let buckets = store.range("alert", Period::Day, day(2), day(5))?;
        assert_eq!(
            vec![day(2), day(3), day(4)],
            buckets.iter().map(|b| b.start).collect::<Vec<_>>()
        );

        assert_eq!(
            Totals::count(2 + 3 + 4),
            store.sum_range("alert", Period::Day, day(2), day(5))?
        );
        assert_eq!(
            Totals::default(),
            store.sum_range("alert", Period::Day, day(10), day(20))?
        );
        assert!(store.range("alert", Period::Day, day(5), day(2))?.is_empty());

        Ok(())
    }

    #[test_log::test]
    fn store_rederive_replaces_with_finer_sum() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        for d in [1, 15, 29] {
            let key = BucketKey::enclosing("speed", Period::Day, day(d));
            let totals = Totals {
                count: 1,
                sum: Some(f64::from(d)),
            };
            store.upsert(&key, totals, UpsertMode::Increment)?;
        }

        // NOTE: March must not be included
        let march = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        store.upsert(
            &BucketKey::enclosing("speed", Period::Day, march),
            Totals::count(100),
            UpsertMode::Increment,
        )?;

        let key = BucketKey::enclosing("speed", Period::Month, day(10));
        store.upsert(&key, Totals::count(7), UpsertMode::Replace)?;

        let bucket = store.rederive(&key, Period::Day, march)?;
        assert_eq!(3, bucket.count);
        assert_eq!(Some(45.0), bucket.sum);
        assert_eq!(Some(bucket), store.get(&key)?);

        assert!(matches!(
            store.rederive(&key, Period::Day, day(1)),
            Err(crate::Error::InvalidArgument(_))
        ));

        Ok(())
    }

    #[test_log::test]
    fn store_find_names_by_prefix() -> crate::Result<()> {
        let path = tempfile::tempdir()?;
        let keyspace = fjall::Config::new(&path).open_transactional()?;
        let store = FjallStore::new(&keyspace)?;

        for name in ["alert.type.accident", "alert.type.fire", "affected.type.injured"] {
            let key = BucketKey::enclosing(name, Period::Day, day(1));
            store.upsert(&key, Totals::count(1), UpsertMode::Increment)?;
            store.upsert(&key, Totals::count(1), UpsertMode::Increment)?;
        }

        assert_eq!(
            vec!["alert.type.accident", "alert.type.fire"],
            store.find_names("alert.")?
        );
        assert_eq!(3, store.find_names("")?.len());
        assert!(store.find_names("device.")?.is_empty());

        Ok(())
    }

    #[test_log::test]
    fn retries_are_bounded() {
        let mut calls = 0;
        let result: crate::Result<()> = with_retries(3, &"test op", || {
            calls += 1;
            Err(crate::Error::Contention)
        });

        assert!(matches!(result, Err(crate::Error::Contention)));
        assert_eq!(4, calls);
    }

    #[test_log::test]
    fn retries_stop_on_success() -> crate::Result<()> {
        let mut calls = 0;
        let value = with_retries(3, &"test op", || {
            calls += 1;
            if calls < 3 {
                Err(crate::Error::Contention)
            } else {
                Ok(calls)
            }
        })?;

        assert_eq!(3, value);
        Ok(())
    }

    #[test_log::test]
    fn retries_skip_permanent_errors() {
        let mut calls = 0;
        let result: crate::Result<()> = with_retries(3, &"test op", || {
            calls += 1;
            Err(crate::Error::Decode)
        });

        assert!(result.is_err());
        assert_eq!(1, calls);
    }
}
