//! Timeouts, and the timer thread which enforces them.

use std::{
    fmt::{self, Formatter, Debug},
    io,
    sync::{Arc, OnceLock},
    thread,
    time::{Duration, Instant},
};
use tokio::{
    runtime::{Builder, Handle},
    sync::oneshot,
    task::AbortHandle,
    time::sleep,
};


/// Name of the thread driving the global [`Timer`]
pub const TIMER_THREAD_NAME: &str = "lamina-timer";


/// How long a blocking or racing operation may wait
///
/// Converts from [`Duration`] (relative) and [`Instant`] (absolute).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Never time out
    #[default]
    Never,
    /// Time out once this much time has passed since the operation started
    After(Duration),
    /// Time out at this deadline
    At(Instant),
}

impl Timeout {
    /// The absolute deadline, if any, with relative timeouts measured from now
    ///
    /// A relative timeout too large to represent is treated as never.
    pub fn deadline(&self) -> Option<Instant> {
        match *self {
            Timeout::Never => None,
            Timeout::After(duration) => Instant::now().checked_add(duration),
            Timeout::At(deadline) => Some(deadline),
        }
    }

    /// Pin a relative timeout to an absolute deadline measured from now
    pub fn fix(self) -> Self {
        match self.deadline() {
            Some(deadline) => Timeout::At(deadline),
            None => Timeout::Never,
        }
    }

    /// Time left until the deadline, or `None` if this never times out
    ///
    /// Zero once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline().map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

impl From<Instant> for Timeout {
    fn from(deadline: Instant) -> Self {
        Timeout::At(deadline)
    }
}


/// One-shot scheduler, run on a dedicated thread
///
/// The thread drives a single-threaded tokio runtime with only the time driver enabled. It shuts
/// down when the last clone of its `Timer` is dropped; callbacks not yet due at that point never
/// run.
///
/// Most code uses [`Timer::global`]. Construct others with [`TimerBuilder`].
#[derive(Clone)]
pub struct Timer(Arc<TimerInner>);

struct TimerInner {
    handle: Handle,
    thread_name: String,
    // dropping this lets the timer thread exit.
    _shutdown: oneshot::Sender<()>,
}

impl Timer {
    /// The process-wide timer, started on first use
    ///
    /// Panics if the timer thread cannot be started.
    pub fn global() -> &'static Timer {
        static GLOBAL: OnceLock<Timer> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            TimerBuilder::new()
                .build()
                .unwrap_or_else(|e| panic!("failed to start global lamina timer: {}", e))
        })
    }

    /// Invoke `f` once, on the timer thread, no sooner than `delay` from now
    pub fn schedule_once<F>(&self, delay: Duration, f: F) -> Scheduled
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.0.handle.spawn(async move {
            sleep(delay).await;
            f();
        });
        Scheduled(task.abort_handle())
    }
}

impl Debug for Timer {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("Timer").field(&self.0.thread_name).finish()
    }
}


/// Handle to a callback scheduled with [`Timer::schedule_once`]
///
/// Dropping it does not cancel anything.
#[derive(Debug)]
pub struct Scheduled(AbortHandle);

impl Scheduled {
    /// Prevent the callback from running, if it has not started yet
    pub fn cancel(&self) {
        self.0.abort();
    }

    /// Whether the callback has run or been cancelled
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}


/// Builder for a [`Timer`]
#[derive(Debug, Clone)]
pub struct TimerBuilder {
    thread_name: String,
}

impl TimerBuilder {
    /// Construct with default settings
    pub fn new() -> Self {
        TimerBuilder {
            thread_name: TIMER_THREAD_NAME.to_owned(),
        }
    }

    /// Set the name of the timer thread
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Start the timer thread
    pub fn build(self) -> io::Result<Timer> {
        let rt = Builder::new_current_thread().enable_time().build()?;
        let handle = rt.handle().clone();
        let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();
        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                debug!("timer thread started");
                // resolves with an error once the sender is dropped
                let _ = rt.block_on(shutdown_recv);
                debug!("timer thread stopping");
            })?;
        Ok(Timer(Arc::new(TimerInner {
            handle,
            thread_name: self.thread_name,
            _shutdown: shutdown_send,
        })))
    }
}

impl Default for TimerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
