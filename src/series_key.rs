use crate::{stat_name::NAME_TERMINATOR, Period};
use chrono::{DateTime, Utc};

/// Identifies exactly one bucket.
///
/// Encoded as `name ‖ 0x00 ‖ period tag ‖ start`, so all buckets of a
/// series and period are contiguous and sorted by start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketKey<'a> {
    /// Name of the statistic series
    pub name: &'a str,

    /// Granularity of the bucket
    pub period: Period,

    /// Canonical start of the period
    pub start: DateTime<Utc>,
}

impl<'a> BucketKey<'a> {
    /// Creates the key of the bucket enclosing `instant`.
    #[must_use]
    pub fn enclosing(name: &'a str, period: Period, instant: DateTime<Utc>) -> Self {
        Self {
            name,
            period,
            start: period.begins_at(instant),
        }
    }

    /// Returns the prefix shared by all buckets of a series with the given period.
    pub(crate) fn prefix(name: &str, period: Period) -> Vec<u8> {
        let mut buf = Vec::with_capacity(name.len() + 2 + 8);
        buf.extend_from_slice(name.as_bytes());
        buf.push(NAME_TERMINATOR);
        buf.push(period.tag());
        buf
    }

    /// Encodes the key of a bucket of `name`/`period` starting at `start`.
    ///
    /// `start` is not required to be aligned, which allows encoding range bounds.
    pub(crate) fn format(name: &str, period: Period, start: DateTime<Utc>) -> Vec<u8> {
        let mut buf = Self::prefix(name, period);
        buf.extend_from_slice(&crate::time::encode(start));
        buf
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        Self::format(self.name, self.period, self.start)
    }

    /// Splits an encoded key into its period and start.
    ///
    /// The name is returned as the remaining prefix, not validated.
    pub(crate) fn decode(bytes: &[u8]) -> crate::Result<(&[u8], Period, DateTime<Utc>)> {
        let Some(split) = bytes.len().checked_sub(10) else {
            return Err(crate::Error::Decode);
        };

        let (name, rest) = bytes.split_at(split);

        let [terminator, tag, ts @ ..] = rest else {
            return Err(crate::Error::Decode);
        };

        if *terminator != NAME_TERMINATOR {
            return Err(crate::Error::Decode);
        }

        let ts: [u8; 8] = ts.try_into().map_err(|_| crate::Error::Decode)?;

        Ok((name, Period::from_tag(*tag)?, crate::time::decode(ts)?))
    }
}
