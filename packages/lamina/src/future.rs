//! Bridge from channels to async code.

use crate::{
    channel::{
        api::Channel,
        callback::{CallbackId, Receiver},
        error::ClosedError,
    },
    util::atomic_take::AtomicTake,
};
use std::{
    fmt::{self, Formatter, Debug},
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;


/// Future for the channel's next message
///
/// Registers a one-shot [`receive`](Channel::receive) right away, so the message is claimed when
/// it arrives even if the future is not being polled. Resolves to [`ClosedError`] if the channel
/// is or becomes closed first. Dropping the future before it resolves cancels the registration.
pub fn read_channel<T, C>(ch: &C) -> ReadFut<T>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{
    let (send, recv) = oneshot::channel();
    let send = AtomicTake::some(send);
    let id = CallbackId::next();
    // if the channel drops the receiver without calling it, the sender goes with it, which is
    // how closing reaches the future
    let registered = ch.receive(Receiver::with_id(id, move |msg| {
        if let Some(send) = send.take() {
            let _ = send.send(msg);
        }
    }));

    let cancel = match registered {
        Ok(()) => {
            let ch = ch.clone();
            Some(Box::new(move || ch.cancel_callback(id)) as Box<dyn FnOnce() + Send>)
        }
        Err(ClosedError) => None,
    };
    ReadFut {
        recv,
        cancel,
        terminated: false,
    }
}

/// See [`read_channel`]
pub struct ReadFut<T> {
    recv: oneshot::Receiver<T>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
    terminated: bool,
}

impl<T> Future for ReadFut<T> {
    type Output = Result<T, ClosedError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        assert!(!this.terminated, "ReadFut polled after completion");
        match Pin::new(&mut this.recv).poll(cx) {
            Poll::Ready(result) => {
                this.terminated = true;
                this.cancel = None;
                Poll::Ready(result.map_err(|_| ClosedError))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(feature = "futures")]
impl<T> futures::future::FusedFuture for ReadFut<T> {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<T> Drop for ReadFut<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            trace!("ReadFut dropped before resolving");
            cancel();
        }
    }
}

impl<T> Debug for ReadFut<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ReadFut")
            .field("terminated", &self.terminated)
            .finish()
    }
}
