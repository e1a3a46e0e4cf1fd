use crate::{store::StatisticStore, FjallStore, Statistics};
use fjall::{BlockCache, TxKeyspace};
use std::{path::Path, sync::Arc};

/// Builder for [`Statistics`].
pub struct Builder {
    cache_size_mib: u64,
    workers: usize,
    queue_capacity: Option<usize>,
    max_retries: usize,
}

impl Builder {
    pub(crate) fn new() -> Self {
        Self {
            cache_size_mib: 64,
            workers: 4,
            queue_capacity: None,
            max_retries: 3,
        }
    }

    /// Sets the cache size in MiB.
    ///
    /// Default = 64 MiB
    #[must_use]
    pub fn cache_size_mib(mut self, mib: u64) -> Self {
        self.cache_size_mib = mib;
        self
    }

    /// Sets the number of threads folding observations into daily buckets.
    ///
    /// Default = 4, at least 1 thread is always started.
    #[must_use]
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Bounds the ingestion queue.
    ///
    /// When the queue is full, submissions fail with [`crate::Error::QueueFull`]
    /// instead of blocking the producer.
    ///
    /// Default = unbounded
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets how often a failed store write is retried before giving up.
    ///
    /// Default = 3
    #[must_use]
    pub fn max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Opens or recovers statistics.
    ///
    /// If you have a keyspace already in your application, you may
    /// want to use `open_in_keyspace` instead.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn open<P: AsRef<Path>>(self, path: P) -> crate::Result<Statistics> {
        log::info!("opening statistics at {}", path.as_ref().display());

        let keyspace = fjall::Config::new(path)
            .block_cache(Arc::new(BlockCache::with_capacity_bytes(
                self.cache_size_mib * 1_024 * 1_024,
            )))
            .open_transactional()?;

        self.open_in_keyspace(&keyspace)
    }

    /// Uses an existing `fjall` keyspace to open statistics.
    ///
    /// Partitions are prefixed with `_tally#` to avoid name clashes with other applications.
    ///
    /// # Errors
    ///
    /// Returns error if an I/O error occurred.
    pub fn open_in_keyspace(self, keyspace: &TxKeyspace) -> crate::Result<Statistics> {
        let store = FjallStore::new(keyspace)?;
        self.open_with_store(Arc::new(store))
    }

    /// Uses any bucket store.
    ///
    /// # Errors
    ///
    /// Returns error if the fold workers could not be started.
    pub fn open_with_store(self, store: Arc<dyn StatisticStore>) -> crate::Result<Statistics> {
        Statistics::from_store(store, self.workers, self.queue_capacity, self.max_retries)
    }
}
