use std::time;

use like_common::event::EventKey;
use like_common::health::HealthHandle;
use like_common::queue::LikeQueue;
use like_common::store::{CounterStore, FailureKind, StoreConnector};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::error::WorkerError;

/// Where the aggregation loop is, carrying what the next step needs.
pub enum WorkerState<S> {
    /// No store connection yet. Retried until the store answers.
    ConnectingStore,
    /// Suspended on the queue until the next like arrives.
    Listening(S),
    /// A like was popped and is being applied to the store.
    Processing(S, EventKey),
}

impl<S> WorkerState<S> {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerState::ConnectingStore => "connecting_store",
            WorkerState::Listening(_) => "listening",
            WorkerState::Processing(_, _) => "processing",
        }
    }
}

/// A single sequential consumer: pops one like at a time and increments its counter.
///
/// Failures never stop the loop. A like whose increment fails has already left the queue, so it
/// is dropped, and the worker waits one backoff interval before listening again.
pub struct LikeWorker<Q, C> {
    /// An identifier for this worker, used in logs.
    name: String,
    /// The queue we pop likes from.
    queue: Q,
    /// Opens the connection to the counter store.
    connector: C,
    /// The wait applied after every failure.
    backoff: Backoff,
    /// The liveness check handle, to call on a schedule to report healthy
    liveness: HealthHandle,
}

impl<Q, C> LikeWorker<Q, C>
where
    Q: LikeQueue,
    C: StoreConnector,
{
    pub fn new(
        name: &str,
        queue: Q,
        connector: C,
        backoff: Backoff,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            name: name.to_owned(),
            queue,
            connector,
            backoff,
            liveness,
        }
    }

    /// Run the loop for the rest of the process lifetime.
    pub async fn run(&self) {
        let mut state = WorkerState::ConnectingStore;

        loop {
            state = self.step(state).await;
        }
    }

    /// Make one transition of the loop.
    pub async fn step(&self, state: WorkerState<C::Store>) -> WorkerState<C::Store> {
        match state {
            WorkerState::ConnectingStore => self.connect_store().await,
            WorkerState::Listening(store) => match self.wait_for_like().await {
                Ok(key) => WorkerState::Processing(store, key),
                Err(error) => {
                    self.report_failure("listening", &error);
                    self.backoff.wait().await;
                    WorkerState::Listening(store)
                }
            },
            WorkerState::Processing(store, key) => {
                if let Err(error) = self.process(&store, &key).await {
                    // Not requeued: the like is lost.
                    self.report_failure("processing", &error);
                    self.backoff.wait().await;
                }
                WorkerState::Listening(store)
            }
        }
    }

    async fn connect_store(&self) -> WorkerState<C::Store> {
        // Waiting on the store is expected at startup, it doesn't make the process unhealthy.
        self.liveness.report_healthy();
        metrics::counter!("like_worker_store_connect_attempts_total").increment(1);

        match self.connector.connect().await {
            Ok(store) => {
                info!("{} connected to the counter store, listening for likes", self.name);
                WorkerState::Listening(store)
            }
            Err(error) => {
                warn!(
                    "{} could not connect to the counter store: {}. Retrying in {:?}",
                    self.name,
                    error,
                    self.backoff.interval()
                );
                self.backoff.wait().await;
                WorkerState::ConnectingStore
            }
        }
    }

    /// Wait until a like is available in the queue, reporting liveness every time the pop times out.
    async fn wait_for_like(&self) -> Result<EventKey, WorkerError> {
        loop {
            self.liveness.report_healthy();

            if let Some(key) = self.queue.blocking_pop().await? {
                return Ok(key);
            }
        }
    }

    /// Apply one like to the store.
    pub async fn process(&self, store: &C::Store, key: &EventKey) -> Result<(), WorkerError> {
        debug!("processing like for {}", key);
        let start = time::Instant::now();

        store.increment(key).await?;

        let labels = [("entity_kind", key.entity_kind().to_owned())];
        metrics::counter!("like_worker_processed_total", &labels).increment(1);
        metrics::histogram!("like_worker_processing_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());
        info!("finished processing like for {}", key);

        Ok(())
    }

    fn report_failure(&self, stage: &'static str, error: &WorkerError) {
        let kind = error.kind();
        let labels = [("stage", stage), ("kind", kind.as_str())];
        metrics::counter!("like_worker_failed_total", &labels).increment(1);

        match kind {
            FailureKind::Transient => warn!(
                "{} {} failed, retrying in {:?}: {}",
                self.name,
                stage,
                self.backoff.interval(),
                error
            ),
            FailureKind::Permanent => error!(
                "{} {} failed, dropping the like: {}",
                self.name, stage, error
            ),
        }
    }
}
