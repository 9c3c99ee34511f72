// the capability set shared by every kind of channel.

use super::{
    callback::{CallbackId, Listener, OnClosed, Receiver},
    error::{ClosedError, SealedError},
};
use std::sync::Arc;


/// Capabilities of a channel
///
/// Every channel kind implements this, and every combinator in this crate is written only in terms
/// of it, so any conforming implementation may be substituted for any other.
///
/// There are four ways of consuming messages:
///
/// - [`listen`](Self::listen) and [`listen_all`](Self::listen_all) register an advisory
///   [`Listener`], which is offered messages and may decline them.
/// - [`receive`](Self::receive) and [`receive_all`](Self::receive_all) register a guaranteed
///   [`Receiver`], which is always invoked with the messages assigned to it.
///
/// The non-`_all` variants are one-shot: they deregister after their first delivery (and for
/// listeners, after their first offer). The `_all` variants stay registered until cancelled or
/// until the channel closes.
pub trait Channel<T>: Send + Sync {
    /// Register a one-shot advisory callback
    fn listen(&self, listener: Listener<T>) -> Result<(), ClosedError>;

    /// Register a permanent advisory callback
    fn listen_all(&self, listener: Listener<T>) -> Result<(), ClosedError>;

    /// Register a one-shot guaranteed callback
    fn receive(&self, receiver: Receiver<T>) -> Result<(), ClosedError>;

    /// Register a permanent guaranteed callback, which receives every message from now on
    fn receive_all(&self, receiver: Receiver<T>) -> Result<(), ClosedError>;

    /// Deregister the callback with the given id, if registered
    ///
    /// Only affects future deliveries: a delivery which has already been committed still happens.
    fn cancel_callback(&self, id: CallbackId);

    /// Append a message to the channel
    fn enqueue(&self, msg: T) -> Result<(), SealedError<T>>;

    /// Append a final message to the channel, and seal it
    fn enqueue_and_close(&self, msg: T) -> Result<(), SealedError<T>>;

    /// Seal the channel without a final message
    ///
    /// Does nothing if already sealed.
    fn close(&self);

    /// Whether no more enqueues will ever be accepted
    fn is_sealed(&self) -> bool;

    /// Whether the channel is sealed and drained, such that no message will ever be delivered again
    fn is_closed(&self) -> bool;

    /// Register a callback to be invoked once when the channel becomes closed
    ///
    /// If the channel is already closed, it is invoked immediately. It can be cancelled with
    /// [`cancel_callback`](Self::cancel_callback).
    fn on_closed(&self, f: OnClosed);
}

/// Type-erased, shared channel
pub type AnyChannel<T> = Arc<dyn Channel<T>>;

impl<T, C> Channel<T> for Arc<C>
where
    C: Channel<T> + ?Sized,
{
    fn listen(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        (**self).listen(listener)
    }

    fn listen_all(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        (**self).listen_all(listener)
    }

    fn receive(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        (**self).receive(receiver)
    }

    fn receive_all(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        (**self).receive_all(receiver)
    }

    fn cancel_callback(&self, id: CallbackId) {
        (**self).cancel_callback(id)
    }

    fn enqueue(&self, msg: T) -> Result<(), SealedError<T>> {
        (**self).enqueue(msg)
    }

    fn enqueue_and_close(&self, msg: T) -> Result<(), SealedError<T>> {
        (**self).enqueue_and_close(msg)
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_sealed(&self) -> bool {
        (**self).is_sealed()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn on_closed(&self, f: OnClosed) {
        (**self).on_closed(f)
    }
}
