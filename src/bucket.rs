use crate::{Period, Value};
use byteorder::{BigEndian, ReadBytesExt};
use chrono::{DateTime, Utc};

/// Sample count and optional accumulated value.
///
/// A series is either count-only (`sum` is always `None`) or count+sum.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Totals {
    /// Number of samples.
    pub count: u64,

    /// Sum of accumulated values, absent for count-only series.
    pub sum: Option<Value>,
}

/// An observation disagreed with the shape of the series it was folded into.
///
/// The value component of the observation is discarded, its samples are still counted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchemaConflict {
    /// A value was supplied for a count-only series.
    UnexpectedValue,

    /// No value was supplied for a series that accumulates values.
    MissingValue,
}

impl std::fmt::Display for SchemaConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedValue => write!(f, "value supplied for a count-only series"),
            Self::MissingValue => write!(f, "no value supplied for a series with a sum"),
        }
    }
}

impl Totals {
    /// Count-only totals.
    #[must_use]
    pub const fn count(count: u64) -> Self {
        Self { count, sum: None }
    }

    /// Merges an increment into the totals of an existing bucket.
    ///
    /// Counts always add up. Sums only add up if both sides carry one,
    /// otherwise the existing shape wins and the conflict is returned.
    pub fn fold(&mut self, delta: Self) -> Option<SchemaConflict> {
        self.count = self.count.saturating_add(delta.count);

        match (&mut self.sum, delta.sum) {
            (Some(sum), Some(v)) => {
                *sum += v;
                None
            }
            (None, None) => None,
            (None, Some(_)) => Some(SchemaConflict::UnexpectedValue),
            (Some(_), None) => Some(SchemaConflict::MissingValue),
        }
    }

    /// Adds up finer buckets when deriving a coarser one.
    ///
    /// Unlike [`Totals::fold`] this never conflicts:
    /// the sum is present as soon as any input has one.
    pub(crate) fn absorb(&mut self, other: Self) {
        self.count = self.count.saturating_add(other.count);

        if let Some(v) = other.sum {
            *self.sum.get_or_insert(0.0) += v;
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(17);
        bytes.extend_from_slice(&self.count.to_be_bytes());

        match self.sum {
            Some(sum) => {
                bytes.push(1);
                bytes.extend_from_slice(&sum.to_be_bytes());
            }
            None => bytes.push(0),
        }

        bytes
    }

    pub(crate) fn decode(mut reader: &[u8]) -> crate::Result<Self> {
        let count = reader
            .read_u64::<BigEndian>()
            .map_err(|_| crate::Error::Decode)?;

        let sum = match reader.read_u8().map_err(|_| crate::Error::Decode)? {
            0 => None,
            1 => Some(
                reader
                    .read_f64::<BigEndian>()
                    .map_err(|_| crate::Error::Decode)?,
            ),
            _ => return Err(crate::Error::Decode),
        };

        if !reader.is_empty() {
            return Err(crate::Error::Decode);
        }

        Ok(Self { count, sum })
    }
}

/// A persisted aggregate for one statistic over one period instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
    /// Name of the statistic series
    pub name: String,

    /// Granularity of the bucket
    pub period: Period,

    /// Canonical start of the period (inclusive)
    pub start: DateTime<Utc>,

    /// Total number of samples
    pub count: u64,

    /// Total accumulated value, absent for count-only series
    pub sum: Option<Value>,
}

impl Bucket {
    /// Exclusive end of the bucket's period, `None` for the last representable period.
    #[must_use]
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.period.checked_ends_at(self.start)
    }

    /// Mean accumulated value per sample, if the series carries values.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<Value> {
        match (self.sum, self.count) {
            (Some(sum), count) if count > 0 => Some(sum / count as Value),
            _ => None,
        }
    }

    /// Count and sum of the bucket.
    #[must_use]
    pub fn totals(&self) -> Totals {
        Totals {
            count: self.count,
            sum: self.sum,
        }
    }
}
