// the degenerate, always closed channel.

use super::{
    api::Channel,
    callback::{CallbackId, Listener, OnClosed, Receiver},
    error::{ClosedError, SealedError},
};
use std::{
    fmt::{self, Formatter, Debug},
    marker::PhantomData,
};


/// Create a closed channel
pub fn closed_channel<T>() -> ClosedChannel<T> {
    ClosedChannel(PhantomData)
}

/// Channel which is closed from the start
///
/// Every registration fails with [`ClosedError`], and every enqueue fails with [`SealedError`].
pub struct ClosedChannel<T>(PhantomData<fn() -> T>);

impl<T> Channel<T> for ClosedChannel<T> {
    fn listen(&self, _: Listener<T>) -> Result<(), ClosedError> {
        Err(ClosedError)
    }

    fn listen_all(&self, _: Listener<T>) -> Result<(), ClosedError> {
        Err(ClosedError)
    }

    fn receive(&self, _: Receiver<T>) -> Result<(), ClosedError> {
        Err(ClosedError)
    }

    fn receive_all(&self, _: Receiver<T>) -> Result<(), ClosedError> {
        Err(ClosedError)
    }

    fn cancel_callback(&self, _: CallbackId) {}

    fn enqueue(&self, msg: T) -> Result<(), SealedError<T>> {
        Err(SealedError(msg))
    }

    fn enqueue_and_close(&self, msg: T) -> Result<(), SealedError<T>> {
        Err(SealedError(msg))
    }

    fn close(&self) {}

    fn is_sealed(&self) -> bool {
        true
    }

    fn is_closed(&self) -> bool {
        true
    }

    fn on_closed(&self, f: OnClosed) {
        f.fire();
    }
}

impl<T> Clone for ClosedChannel<T> {
    fn clone(&self) -> Self {
        ClosedChannel(PhantomData)
    }
}

impl<T> Default for ClosedChannel<T> {
    fn default() -> Self {
        closed_channel()
    }
}

impl<T> Debug for ClosedChannel<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("ClosedChannel")
    }
}
