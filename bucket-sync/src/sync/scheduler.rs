//! Bounded-concurrency runner for one batch of tasks.
//!
//! Tasks are registered synchronously by [`Scheduler::submit`]. Admission
//! goes through a fair semaphore, so when every slot is taken submissions
//! wait in FIFO order and are released one-for-one as running tasks finish.
//! A batch drains once it is closed and nothing is running or waiting; the
//! drain signal fires exactly once.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("batch is closed to new tasks")]
    Closed,
    #[error("batch was aborted before the task was admitted")]
    Aborted,
}

type DrainCallback = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    limit: usize,
    slots: Arc<Semaphore>,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    drained: watch::Sender<bool>,
}

struct State {
    // Submitted and not yet finished: running plus waiting.
    pending: usize,
    closed: bool,
    aborted: bool,
    drained: bool,
    on_drained: Option<DrainCallback>,
}

impl Scheduler {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self::build(limit, None)
    }

    /// `on_drained` runs on a separate task once the batch has drained.
    pub fn with_on_drained<F>(limit: usize, on_drained: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::build(limit, Some(Box::new(on_drained)))
    }

    fn build(limit: usize, on_drained: Option<DrainCallback>) -> Self {
        let limit = limit.max(1);
        let (drained, _) = watch::channel(false);
        Self {
            limit,
            slots: Arc::new(Semaphore::new(limit)),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    pending: 0,
                    closed: false,
                    aborted: false,
                    drained: false,
                    on_drained,
                }),
                drained,
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.slots.available_permits()
    }

    /// Registered submissions not yet admitted.
    pub fn waiting(&self) -> usize {
        self.shared.lock().pending.saturating_sub(self.in_flight())
    }

    /// Registers `task` and returns a future resolving to the task's own
    /// output once it has been admitted and run.
    ///
    /// Registration happens before the returned future is first polled.
    /// A task's output, failure included, is returned only to its own
    /// submitter.
    pub fn submit<F, Fut>(
        &self,
        task: F,
    ) -> impl Future<Output = Result<Fut::Output, SchedulerError>> + use<F, Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let ticket = self.register();
        async move {
            let mut ticket = ticket?;
            ticket.admitted().await?;
            let output = task().await;
            drop(ticket);
            Ok(output)
        }
    }

    /// Marks the batch as fully submitted. An empty batch drains immediately.
    pub fn close(&self) {
        let drained = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.settle()
        };
        self.shared.fire(drained);
    }

    /// Closes the batch and releases every queued submission without running
    /// it. Tasks already admitted run to completion.
    pub fn abort(&self) {
        let drained = {
            let mut state = self.shared.lock();
            state.closed = true;
            state.aborted = true;
            self.slots.close();
            state.settle()
        };
        self.shared.fire(drained);
    }

    pub fn is_drained(&self) -> bool {
        *self.shared.drained.borrow()
    }

    /// Resolves once the batch has drained.
    pub async fn drained(&self) {
        let mut rx = self.shared.drained.subscribe();
        let _ = rx.wait_for(|drained| *drained).await;
    }

    fn register(&self) -> Result<Ticket, SchedulerError> {
        let mut state = self.shared.lock();
        if state.aborted {
            return Err(SchedulerError::Aborted);
        }
        if state.closed {
            return Err(SchedulerError::Closed);
        }
        state.pending += 1;
        // Free slots only exist while nobody is queued on the semaphore.
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok();
        Ok(Ticket {
            shared: Arc::clone(&self.shared),
            slots: Arc::clone(&self.slots),
            permit,
        })
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self) {
        let drained = {
            let mut state = self.lock();
            state.pending -= 1;
            state.settle()
        };
        self.fire(drained);
    }

    fn fire(&self, drained: Option<Option<DrainCallback>>) {
        let Some(callback) = drained else {
            return;
        };
        self.drained.send_replace(true);
        if let Some(callback) = callback {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { callback() });
                }
                Err(_) => callback(),
            }
        }
    }
}

impl State {
    // Returns the drain callback slot exactly once, on the transition to drained.
    fn settle(&mut self) -> Option<Option<DrainCallback>> {
        if self.drained || !self.closed || self.pending > 0 {
            return None;
        }
        self.drained = true;
        Some(self.on_drained.take())
    }
}

struct Ticket {
    shared: Arc<Shared>,
    slots: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Ticket {
    async fn admitted(&mut self) -> Result<(), SchedulerError> {
        if self.permit.is_none() {
            let permit = Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::Aborted)?;
            self.permit = Some(permit);
        }
        Ok(())
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        // Slot goes back before the batch can be seen as drained.
        drop(self.permit.take());
        self.shared.finish();
    }
}
