use crate::{
    series_key::BucketKey,
    store::{with_retries, StatisticStore},
    Bucket, Period,
};
use chrono::{DateTime, Days, Utc};
use std::sync::Arc;

/// Outcome of a boundary check over a set of series.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RollupSummary {
    /// Number of derived buckets written
    pub rolled_up: usize,

    /// Number of rollups that failed (and may simply be re-run)
    pub failed: usize,
}

/// Derives MONTH and YEAR buckets by re-summing the next finer buckets.
#[derive(Clone)]
pub struct RollupEngine {
    store: Arc<dyn StatisticStore>,
    max_retries: usize,
}

impl RollupEngine {
    /// Creates a rollup engine reading from and writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StatisticStore>, max_retries: usize) -> Self {
        Self { store, max_retries }
    }

    /// Recomputes the `period` bucket of `name` enclosing `instant`.
    ///
    /// The bucket is replaced with the sum of all finer buckets in the period,
    /// so running this repeatedly yields the same bucket.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for [`Period::Day`], which is folded, not derived,
    /// or if the period ends beyond the representable range.
    pub fn rollup(
        &self,
        name: &str,
        period: Period,
        instant: DateTime<Utc>,
    ) -> crate::Result<Bucket> {
        let Some(finer) = period.finer() else {
            return Err(crate::Error::InvalidArgument(
                "daily buckets are folded, not rolled up",
            ));
        };

        let to = period
            .checked_ends_at(instant)
            .ok_or(crate::Error::InvalidArgument("instant out of range"))?;

        let key = BucketKey::enclosing(name, period, instant);

        let bucket = with_retries(
            self.max_retries,
            &format_args!("rollup of {name}/{period}/{}", key.start),
            || self.store.rederive(&key, finer, to),
        )?;

        log::debug!(
            "rolled up {name}/{period}/{} from {finer}: count={} sum={:?}",
            key.start.date_naive(),
            bucket.count,
            bucket.sum,
        );

        Ok(bucket)
    }

    /// Runs the rollups made due by the day before `today` having ended.
    ///
    /// If yesterday belongs to another month than `today`, yesterday's month is rolled up,
    /// and likewise for years. Months are rolled up before years, because
    /// YEAR buckets are derived from MONTH buckets.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if there is no representable day before `today`.
    /// Failing rollups are only counted in the summary.
    pub fn close_day<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        today: DateTime<Utc>,
    ) -> crate::Result<RollupSummary> {
        let yesterday = today
            .checked_sub_days(Days::new(1))
            .ok_or(crate::Error::InvalidArgument("instant out of range"))?;

        let due = [Period::Month, Period::Year]
            .into_iter()
            .filter(|period| period.begins_at(yesterday) != period.begins_at(today))
            .collect::<Vec<_>>();

        let mut summary = RollupSummary::default();

        if due.is_empty() {
            return Ok(summary);
        }

        for name in names {
            for &period in &due {
                match self.rollup(name, period, yesterday) {
                    Ok(_) => summary.rolled_up += 1,
                    Err(e) => {
                        log::error!(
                            "rollup of {name}/{period}/{} failed: {e}",
                            period.begins_at(yesterday).date_naive(),
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Runs [`RollupEngine::close_day`] for every known series.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if there is no representable day before `today`,
    /// or error if the series names could not be listed.
    pub fn sweep(&self, today: DateTime<Utc>) -> crate::Result<RollupSummary> {
        let names = self.store.find_names("")?;

        let summary = self.close_day(names.iter().map(String::as_str), today)?;

        log::info!(
            "swept {} series for {}: {summary:?}",
            names.len(),
            today.date_naive(),
        );

        Ok(summary)
    }
}
