//! A simple, embeddable statistics rollup engine.
//!
//! It uses <https://github.com/fjall-rs/fjall> as its underlying storage engine.
//!
//! Named samples (a count, optionally with an accumulated value) are submitted without waiting,
//! and folded into one bucket per series and day by background workers.
//! Monthly and annual buckets are derived data: they are re-summed from the next finer buckets
//! whenever a day closes a month or year, so recomputing them is always safe.
//!
//! ```
//! # let path = tempfile::tempdir()?;
//! use chrono::{TimeZone, Utc};
//! use tally::{Period, Statistics};
//!
//! let stats = Statistics::new(&path)?;
//!
//! let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
//!
//! stats.record("alert.type.accident", ts)?;
//! stats.record("alert.type.accident", ts)?;
//! stats.record_value("vehicle.speed", ts, 42.0)?;
//!
//! // wait for the background workers (normally not needed)
//! stats.flush();
//!
//! let days = stats.query(
//!     "alert.type.accident",
//!     Period::Day,
//!     Period::Month.begins_at(ts),
//!     Period::Month.ends_at(ts),
//! )?;
//!
//! assert_eq!(2, days[&Period::Day.begins_at(ts)].count);
//!
//! // at midnight, after the first day of the next month...
//! let summary = stats.sweep(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())?;
//! assert_eq!(2, summary.rolled_up);
//!
//! let march = stats.get("vehicle.speed", Period::Month, ts)?.unwrap();
//! assert_eq!(Some(42.0), march.sum);
//!
//! # Ok::<(), tally::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![warn(clippy::result_unit_err)]

mod aggregator;
mod bucket;
mod db;
mod db_builder;
mod dispatch;
mod error;
mod period;
mod rollup;
mod series_key;
mod stat_name;
mod store;
mod time;

type HashSet<K> = std::collections::HashSet<K, rustc_hash::FxBuildHasher>;

pub use aggregator::{DailyAggregator, Observation};
pub use bucket::{Bucket, SchemaConflict, Totals};
pub use db::Statistics;
pub use db_builder::Builder;
pub use error::{Error, Result};
pub use period::Period;
pub use rollup::{RollupEngine, RollupSummary};
pub use series_key::BucketKey;
pub use stat_name::StatName;
pub use store::{FjallStore, StatisticStore, UpsertMode, Upserted};
pub use time::timestamp;

/// Accumulated value of a sample
pub type Value = f64;
