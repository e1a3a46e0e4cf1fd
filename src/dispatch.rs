use crate::aggregator::{DailyAggregator, Observation};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

/// In-process queue between producers and the daily aggregator.
///
/// Observations are delivered at most once: whatever is still queued
/// when the process dies is lost, nothing is ever redelivered.
pub struct Dispatcher {
    sender: Option<flume::Sender<Observation>>,
    workers: Vec<JoinHandle<()>>,

    /// Observations enqueued, but not folded yet
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Spawns `workers` fold threads.
    ///
    /// If `capacity` is `None`, the queue is unbounded.
    ///
    /// # Errors
    ///
    /// Returns error if a worker thread could not be spawned.
    pub fn start(
        aggregator: &DailyAggregator,
        workers: usize,
        capacity: Option<usize>,
    ) -> crate::Result<Self> {
        let (sender, receiver) = match capacity {
            Some(capacity) => flume::bounded(capacity),
            None => flume::unbounded(),
        };

        let in_flight = Arc::new(AtomicUsize::new(0));

        let workers = (0..workers.max(1))
            .map(|idx| {
                let receiver = receiver.clone();
                let aggregator = aggregator.clone();
                let in_flight = in_flight.clone();

                std::thread::Builder::new()
                    .name(format!("tally-fold-{idx}"))
                    .spawn(move || {
                        log::debug!("fold worker {idx} started");

                        for observation in receiver.iter() {
                            if let Err(e) = aggregator.fold(&observation) {
                                log::error!(
                                    "dropped observation {} @ {}: {e}",
                                    observation.name(),
                                    observation.timestamp(),
                                );
                            }
                            in_flight.fetch_sub(1, Ordering::AcqRel);
                        }

                        log::debug!("fold worker {idx} stopped");
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        log::info!("started {} fold workers", workers.len());

        Ok(Self {
            sender: Some(sender),
            workers,
            in_flight,
        })
    }

    /// Enqueues an observation without waiting for it to be folded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::QueueFull`] if the bounded queue is full,
    /// [`crate::Error::QueueClosed`] after shutdown.
    pub fn enqueue(&self, observation: Observation) -> crate::Result<()> {
        let Some(sender) = &self.sender else {
            return Err(crate::Error::QueueClosed);
        };

        // NOTE: Count before sending, otherwise a fast worker could decrement first
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        match sender.try_send(observation) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);

                match e {
                    flume::TrySendError::Full(observation) => {
                        log::warn!(
                            "ingestion queue is full, rejected observation {}",
                            observation.name(),
                        );
                        Err(crate::Error::QueueFull)
                    }
                    flume::TrySendError::Disconnected(_) => Err(crate::Error::QueueClosed),
                }
            }
        }
    }

    /// Number of observations enqueued but not folded yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Blocks until every observation enqueued so far has been folded (or dropped).
    pub fn flush(&self) {
        while self.pending() > 0 {
            if self.workers.iter().all(JoinHandle::is_finished) {
                log::error!("all fold workers are gone, {} observations lost", self.pending());
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Closes the queue, drains it and joins all workers.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }

        log::info!("shutting down, draining {} observations", self.pending());

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("fold worker panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
