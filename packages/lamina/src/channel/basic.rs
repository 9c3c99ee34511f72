// the general unbounded, multi-consumer channel.

use super::{
    api::Channel,
    callback::{CallbackId, Listener, OnClosed, Receiver},
    core::{self, Lock, State},
    error::{ClosedError, SealedError},
};
use std::fmt::{self, Formatter, Debug};


/// Create a channel
///
/// Shorthand for [`BasicChannel::new`].
pub fn channel<T>() -> BasicChannel<T>
where
    T: Clone + Send + 'static,
{
    BasicChannel::new()
}

/// Unbounded, ordered, closable channel with any number of producers and consumers
///
/// This is a cheap handle: clones refer to the same channel.
///
/// Each operation which changes the channel's state is one atomic transition, which also decides
/// which registered callbacks get which buffered messages. The callbacks are invoked on the
/// calling thread after the transition commits. See [`Channel`] for the operations.
pub struct BasicChannel<T>(core::Channel<T>);

impl<T> BasicChannel<T>
where
    T: Clone + Send + 'static,
{
    /// Construct an empty, open channel
    pub fn new() -> Self {
        BasicChannel(core::Channel::new())
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.0.lock().backlog().len()
    }

    /// Whether no messages are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two handles refer to the same channel
    pub fn same_channel(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }

    // run a registration transition, failing if closed.
    fn register(&self, f: impl FnOnce(&mut Lock<'_, T>)) -> Result<(), ClosedError> {
        if self.0.state() == State::Closed as u8 {
            return Err(ClosedError);
        }
        let mut lock = self.0.lock();
        if lock.state() == State::Closed {
            return Err(ClosedError);
        }
        f(&mut lock);
        lock.commit().run();
        Ok(())
    }

    // run an enqueue transition, failing if sealed.
    fn push(&self, msg: T, seal: bool) -> Result<(), SealedError<T>> {
        if self.0.state() != State::Open as u8 {
            return Err(SealedError(msg));
        }
        let mut lock = self.0.lock();
        if lock.state() != State::Open {
            return Err(SealedError(msg));
        }
        lock.enqueue(msg);
        if seal {
            lock.seal();
        }
        lock.commit().run();
        Ok(())
    }
}

impl<T> Channel<T> for BasicChannel<T>
where
    T: Clone + Send + 'static,
{
    fn listen(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        self.register(|lock| lock.listen(listener, false))
    }

    fn listen_all(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        self.register(|lock| lock.listen(listener, true))
    }

    fn receive(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        self.register(|lock| lock.receive(receiver, false))
    }

    fn receive_all(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        self.register(|lock| lock.receive(receiver, true))
    }

    fn cancel_callback(&self, id: CallbackId) {
        if self.0.lock().cancel(id) {
            trace!(?id, "callback cancelled");
        }
    }

    fn enqueue(&self, msg: T) -> Result<(), SealedError<T>> {
        self.push(msg, false)
    }

    fn enqueue_and_close(&self, msg: T) -> Result<(), SealedError<T>> {
        self.push(msg, true)
    }

    fn close(&self) {
        if self.0.state() != State::Open as u8 {
            return;
        }
        let mut lock = self.0.lock();
        lock.seal();
        lock.commit().run();
    }

    fn is_sealed(&self) -> bool {
        self.0.state() != State::Open as u8
    }

    fn is_closed(&self) -> bool {
        self.0.state() == State::Closed as u8
    }

    fn on_closed(&self, f: OnClosed) {
        if self.0.state() != State::Closed as u8 {
            let mut lock = self.0.lock();
            if lock.state() != State::Closed {
                lock.on_closed(f);
                return;
            }
        }
        f.fire();
    }
}

impl<T> Clone for BasicChannel<T> {
    fn clone(&self) -> Self {
        BasicChannel(self.0.clone())
    }
}

impl<T> Default for BasicChannel<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for BasicChannel<T>
where
    T: Clone + Debug,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let lock = self.0.lock();
        f.debug_struct("BasicChannel")
            .field("state", &lock.state())
            .field("backlog", lock.backlog())
            .field("callbacks", &lock.callback_count())
            .finish()
    }
}
