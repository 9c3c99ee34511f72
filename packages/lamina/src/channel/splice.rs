// read/write facade over two channels.

use super::{
    api::{AnyChannel, Channel},
    basic::BasicChannel,
    callback::{CallbackId, Listener, OnClosed, Receiver},
    error::{ClosedError, SealedError},
};
use std::{
    fmt::{self, Formatter, Debug},
    sync::Arc,
};


/// Compose a read side and a write side into one channel
///
/// Shorthand for [`Splice::new`].
pub fn splice<T, S, D>(src: S, dst: D) -> Splice<T>
where
    S: Channel<T> + 'static,
    D: Channel<T> + 'static,
{
    Splice::new(src, dst)
}

/// Create a full-duplex pipe out of two simplex channels
///
/// Messages enqueued into either returned channel are received from the other.
pub fn channel_pair<T>() -> (Splice<T>, Splice<T>)
where
    T: Clone + Send + 'static,
{
    let a = BasicChannel::new();
    let b = BasicChannel::new();
    (Splice::new(a.clone(), b.clone()), Splice::new(b, a))
}

/// Channel which reads from one channel and writes to another
///
/// Registrations, [`is_closed`](Channel::is_closed) and [`on_closed`](Channel::on_closed) go to
/// the source. Enqueues, [`close`](Channel::close) and [`is_sealed`](Channel::is_sealed) go to the
/// destination. Cancellations go to both. The splice owns neither side beyond holding a handle.
pub struct Splice<T> {
    src: AnyChannel<T>,
    dst: AnyChannel<T>,
}

impl<T> Splice<T> {
    /// Construct from a source to read from and a destination to write to
    pub fn new<S, D>(src: S, dst: D) -> Self
    where
        S: Channel<T> + 'static,
        D: Channel<T> + 'static,
    {
        Splice {
            src: Arc::new(src),
            dst: Arc::new(dst),
        }
    }

    /// The read side
    pub fn src(&self) -> &AnyChannel<T> {
        &self.src
    }

    /// The write side
    pub fn dst(&self) -> &AnyChannel<T> {
        &self.dst
    }
}

impl<T> Channel<T> for Splice<T> {
    fn listen(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        self.src.listen(listener)
    }

    fn listen_all(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        self.src.listen_all(listener)
    }

    fn receive(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        self.src.receive(receiver)
    }

    fn receive_all(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        self.src.receive_all(receiver)
    }

    fn cancel_callback(&self, id: CallbackId) {
        self.src.cancel_callback(id);
        self.dst.cancel_callback(id);
    }

    fn enqueue(&self, msg: T) -> Result<(), SealedError<T>> {
        self.dst.enqueue(msg)
    }

    fn enqueue_and_close(&self, msg: T) -> Result<(), SealedError<T>> {
        self.dst.enqueue_and_close(msg)
    }

    fn close(&self) {
        self.dst.close()
    }

    fn is_sealed(&self) -> bool {
        self.dst.is_sealed()
    }

    fn is_closed(&self) -> bool {
        self.src.is_closed()
    }

    fn on_closed(&self, f: OnClosed) {
        self.src.on_closed(f)
    }
}

impl<T> Clone for Splice<T> {
    fn clone(&self) -> Self {
        Splice {
            src: Arc::clone(&self.src),
            dst: Arc::clone(&self.dst),
        }
    }
}

impl<T> Debug for Splice<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Splice")
            .field("src_closed", &self.src.is_closed())
            .field("dst_sealed", &self.dst.is_sealed())
            .finish()
    }
}
