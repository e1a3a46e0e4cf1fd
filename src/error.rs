/// Error type
#[derive(Debug)]
pub enum Error {
    /// An IO error.
    Io(std::io::Error),

    /// Error in storage engine.
    Storage(fjall::Error),

    /// A caller-supplied argument was rejected before anything was written.
    InvalidArgument(&'static str),

    /// The store could not apply an atomic upsert because of a concurrent writer.
    ///
    /// The operation may be retried.
    Contention,

    /// A persisted bucket or key could not be decoded.
    Decode,

    /// The ingestion queue has been shut down.
    QueueClosed,

    /// The bounded ingestion queue is full, the observation was not enqueued.
    QueueFull,
}

impl Error {
    /// Returns `true` if repeating the failed store operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention | Self::Storage(_) | Self::Io(_))
    }
}

impl From<fjall::Error> for Error {
    fn from(value: fjall::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => {
                write!(f, "{e}",)
            }
            Self::Io(e) => {
                write!(f, "{e}",)
            }
            Self::InvalidArgument(reason) => {
                write!(f, "InvalidArgument: {reason}",)
            }
            Self::Contention => {
                write!(f, "Contention",)
            }
            Self::Decode => {
                write!(f, "Decode",)
            }
            Self::QueueClosed => {
                write!(f, "QueueClosed",)
            }
            Self::QueueFull => {
                write!(f, "QueueFull",)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Result helper type
pub type Result<T> = std::result::Result<T, Error>;
