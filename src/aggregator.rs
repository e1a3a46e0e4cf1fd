use crate::{
    bucket::Totals,
    series_key::BucketKey,
    store::{with_retries, StatisticStore, UpsertMode},
    Bucket, Period, StatName, Value,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A named sample waiting to be folded into its daily bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub(crate) name: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) value: Option<Value>,
    pub(crate) samples: u64,
}

impl Observation {
    /// Validates and creates an observation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if the name is empty or contains a NUL byte,
    /// `samples` is 0, or `value` is not finite.
    pub fn new(
        name: &str,
        timestamp: DateTime<Utc>,
        value: Option<Value>,
        samples: u64,
    ) -> crate::Result<Self> {
        let name = StatName::try_from(name)?;

        if samples == 0 {
            return Err(crate::Error::InvalidArgument("sample count must be at least 1"));
        }

        if value.is_some_and(|v| !v.is_finite()) {
            return Err(crate::Error::InvalidArgument("value is not finite"));
        }

        Ok(Self {
            name: name.to_string(),
            timestamp,
            value,
            samples,
        })
    }

    /// Name of the statistic series
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the sample was taken
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn totals(&self) -> Totals {
        Totals {
            count: self.samples,
            sum: self.value,
        }
    }
}

/// Folds observations into daily buckets.
#[derive(Clone)]
pub struct DailyAggregator {
    store: Arc<dyn StatisticStore>,
    max_retries: usize,
}

impl DailyAggregator {
    /// Creates an aggregator writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn StatisticStore>, max_retries: usize) -> Self {
        Self { store, max_retries }
    }

    /// Adds the observation to the DAY bucket of its name and day.
    ///
    /// A value that does not match the shape of the existing bucket is discarded
    /// (and logged), the samples are counted regardless.
    ///
    /// # Errors
    ///
    /// Returns error if the store could not apply the update after all retries.
    pub fn fold(&self, observation: &Observation) -> crate::Result<Bucket> {
        let key = BucketKey::enclosing(&observation.name, Period::Day, observation.timestamp);

        let upserted = with_retries(
            self.max_retries,
            &format_args!("fold into {}/{}", key.name, key.start),
            || self.store.upsert(&key, observation.totals(), UpsertMode::Increment),
        )?;

        if let Some(conflict) = upserted.conflict {
            log::warn!(
                "schema conflict on {} ({}): {conflict}, counted samples only",
                key.name,
                key.start.date_naive(),
            );
        }

        Ok(upserted.bucket)
    }
}
