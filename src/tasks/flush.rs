//! Deferred Flush Task
//!
//! Single-shot task that coalesces manifest writes: however many mutations
//! request a flush before it runs, the job runs once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct FlushState {
    scheduled: bool,
    cancelled: bool,
    task: Option<JoinHandle<()>>,
}

/// Idempotent, cancellable deferred job.
///
/// [`schedule`](Self::schedule) spawns the job on the current tokio runtime
/// unless a run is already pending. On a current-thread runtime it runs at the
/// next cooperative tick, after the caller's synchronous burst. Without a
/// runtime the request stays pending until the owner runs the job itself and
/// calls [`clear`](Self::clear). On a multi-thread runtime the job may start on
/// another worker before the burst ends; later requests then schedule again.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct DeferredFlush {
    state: Arc<Mutex<FlushState>>,
    job: Arc<dyn Fn() + Send + Sync>,
}

impl DeferredFlush {
    pub fn new(job: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(FlushState::default())),
            job: Arc::new(job),
        }
    }

    /// Requests a run. Returns `false` if one was already pending or the
    /// flush has been cancelled.
    pub fn schedule(&self) -> bool {
        let mut state = self.state.lock();
        if state.scheduled || state.cancelled {
            return false;
        }
        state.scheduled = true;

        let Ok(runtime) = Handle::try_current() else {
            debug!("No async runtime, flush waits for an explicit call");
            return true;
        };
        let shared = Arc::clone(&self.state);
        let job = Arc::clone(&self.job);
        state.task = Some(runtime.spawn(async move {
            {
                let mut state = shared.lock();
                if !state.scheduled || state.cancelled {
                    return;
                }
                state.scheduled = false;
                state.task = None;
            }
            job();
        }));
        true
    }

    pub fn is_scheduled(&self) -> bool {
        self.state.lock().scheduled
    }

    /// Drops a pending run, if any. Later requests schedule normally.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.scheduled = false;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    /// Drops a pending run and refuses every later request.
    pub fn cancel(&self) {
        self.clear();
        self.state.lock().cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

impl fmt::Debug for DeferredFlush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeferredFlush")
            .field("scheduled", &state.scheduled)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}
