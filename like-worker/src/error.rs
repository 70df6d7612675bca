use like_common::queue::QueueError;
use like_common::store::{FailureKind, StoreError};
use thiserror::Error;

/// Enumeration of errors that can interrupt one cycle of the aggregation loop.
/// None of them stop the loop.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to pop from the like queue: {0}")]
    Queue(#[from] QueueError),
    #[error("failed to aggregate like: {0}")]
    Store(#[from] StoreError),
}

impl WorkerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkerError::Queue(error) if error.is_transient() => FailureKind::Transient,
            WorkerError::Queue(_) => FailureKind::Permanent,
            WorkerError::Store(error) => error.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use like_common::event::ParseEventKeyError;

    #[test]
    fn kind_follows_the_source_error() {
        let unavailable = WorkerError::from(QueueError::Unavailable("like_queue".to_owned()));
        assert_eq!(unavailable.kind(), FailureKind::Transient);

        let malformed = WorkerError::from(QueueError::MalformedEntry(
            ParseEventKeyError::MissingSeparator("garbage".to_owned()),
        ));
        assert_eq!(malformed.kind(), FailureKind::Permanent);

        let rejected = WorkerError::from(StoreError::Rejected {
            key: "post:1".to_owned(),
            reason: "check constraint".to_owned(),
        });
        assert_eq!(rejected.kind(), FailureKind::Permanent);

        assert_eq!(
            WorkerError::from(StoreError::Unavailable).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            WorkerError::from(StoreError::ConnectTimeout(std::time::Duration::from_secs(2)))
                .kind(),
            FailureKind::Transient
        );
    }
}
