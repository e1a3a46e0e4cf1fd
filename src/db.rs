use crate::{
    aggregator::{DailyAggregator, Observation},
    db_builder::Builder,
    dispatch::Dispatcher,
    rollup::{RollupEngine, RollupSummary},
    series_key::BucketKey,
    store::{with_retries, StatisticStore, UpsertMode},
    Bucket, Period, Totals, Value,
};
use chrono::{DateTime, Days, Utc};
use std::{collections::BTreeMap, sync::Arc};

/// A statistics rollup engine.
///
/// Observations are folded into daily buckets in the background,
/// monthly and annual buckets are derived from them by [`Statistics::close_day`],
/// [`Statistics::end_of_day`] or [`Statistics::sweep`].
pub struct Statistics {
    store: Arc<dyn StatisticStore>,
    dispatcher: Dispatcher,
    rollups: RollupEngine,
    max_retries: usize,
}

impl Statistics {
    /// Creates a new statistics builder.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Opens or recovers statistics at the given path, using default settings.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        Self::builder().open(path)
    }

    pub(crate) fn from_store(
        store: Arc<dyn StatisticStore>,
        workers: usize,
        queue_capacity: Option<usize>,
        max_retries: usize,
    ) -> crate::Result<Self> {
        let aggregator = DailyAggregator::new(store.clone(), max_retries);
        let dispatcher = Dispatcher::start(&aggregator, workers, queue_capacity)?;
        let rollups = RollupEngine::new(store.clone(), max_retries);

        Ok(Self {
            store,
            dispatcher,
            rollups,
            max_retries,
        })
    }

    /// Submits an observation, to be folded into its daily bucket asynchronously.
    ///
    /// Returns as soon as the observation is enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if the name is empty, `samples` is 0
    /// or `value` is not finite. Nothing is enqueued in that case.
    pub fn submit(
        &self,
        name: &str,
        timestamp: DateTime<Utc>,
        value: Option<Value>,
        samples: u64,
    ) -> crate::Result<()> {
        let observation = Observation::new(name, timestamp, value, samples)?;
        log::trace!("submitting {observation:?}");
        self.dispatcher.enqueue(observation)
    }

    /// Counts a single sample of a count-only series.
    ///
    /// # Errors
    ///
    /// See [`Statistics::submit`].
    pub fn record(&self, name: &str, timestamp: DateTime<Utc>) -> crate::Result<()> {
        self.submit(name, timestamp, None, 1)
    }

    /// Counts `samples` samples of a count-only series.
    ///
    /// # Errors
    ///
    /// See [`Statistics::submit`].
    pub fn record_samples(
        &self,
        name: &str,
        timestamp: DateTime<Utc>,
        samples: u64,
    ) -> crate::Result<()> {
        self.submit(name, timestamp, None, samples)
    }

    /// Records one sample carrying `value`.
    ///
    /// # Errors
    ///
    /// See [`Statistics::submit`].
    pub fn record_value(
        &self,
        name: &str,
        timestamp: DateTime<Utc>,
        value: Value,
    ) -> crate::Result<()> {
        self.submit(name, timestamp, Some(value), 1)
    }

    /// Number of submitted observations not folded yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Blocks until all observations submitted so far are folded.
    pub fn flush(&self) {
        self.dispatcher.flush();
    }

    /// Stops accepting observations, folds the remaining ones and stops the workers.
    pub fn shutdown(mut self) {
        self.dispatcher.shutdown();
    }

    /// Returns the buckets of a series with `start ∈ [from, to)`, keyed by start.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn query(
        &self,
        name: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> crate::Result<BTreeMap<DateTime<Utc>, Bucket>> {
        log::debug!("querying {name}/{period} [{from}..{to})");

        Ok(self
            .store
            .range(name, period, from, to)?
            .into_iter()
            .map(|bucket| (bucket.start, bucket))
            .collect())
    }

    /// Returns the bucket of a series enclosing `instant`.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn get(
        &self,
        name: &str,
        period: Period,
        instant: DateTime<Utc>,
    ) -> crate::Result<Option<Bucket>> {
        self.store.get(&BucketKey::enclosing(name, period, instant))
    }

    /// Lists all series names starting with `prefix`, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn list_names(&self, prefix: &str) -> crate::Result<Vec<String>> {
        self.store.find_names(prefix)
    }

    /// Recomputes the MONTH or YEAR bucket of `name` enclosing `instant`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for [`Period::Day`],
    /// or if the period ends beyond the representable range.
    pub fn rollup(
        &self,
        name: &str,
        period: Period,
        instant: DateTime<Utc>,
    ) -> crate::Result<Bucket> {
        self.rollups.rollup(name, period, instant)
    }

    /// Rolls up the given series if the day before `today` closed a month or year.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if there is no representable day before `today`.
    pub fn close_day<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        today: DateTime<Utc>,
    ) -> crate::Result<RollupSummary> {
        self.rollups.close_day(names, today)
    }

    /// Rolls up every known series if the day before `today` closed a month or year.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if there is no representable day before `today`,
    /// or error if the series names could not be listed.
    pub fn sweep(&self, today: DateTime<Utc>) -> crate::Result<RollupSummary> {
        self.rollups.sweep(today)
    }

    /// Daily batch: stores externally counted totals for the day before `today`,
    /// then runs the rollups that day made due for those series.
    ///
    /// Yesterday's DAY buckets are replaced, so the batch can be re-run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if a name is invalid
    /// or there is no representable day before `today`,
    /// or error if a daily bucket could not be written.
    pub fn end_of_day<'a>(
        &self,
        today: DateTime<Utc>,
        counts: impl IntoIterator<Item = (&'a str, u64)>,
    ) -> crate::Result<RollupSummary> {
        let yesterday = today
            .checked_sub_days(Days::new(1))
            .ok_or(crate::Error::InvalidArgument("instant out of range"))?;

        let mut names = crate::HashSet::default();

        for (name, count) in counts {
            let name = crate::StatName::try_from(name)?;
            let key = BucketKey::enclosing(*name, Period::Day, yesterday);

            with_retries(
                self.max_retries,
                &format_args!("daily total of {}/{}", key.name, key.start),
                || self.store.upsert(&key, Totals::count(count), UpsertMode::Replace),
            )?;

            names.insert(*name);
        }

        log::info!(
            "stored {} daily totals for {}",
            names.len(),
            yesterday.date_naive()
        );

        self.rollups.close_day(names, today)
    }
}
