//! Combinators which move messages out of a channel as they arrive.

use crate::channel::{
    api::Channel,
    basic::BasicChannel,
    callback::{CallbackId, OnClosed, Receiver},
    constant::ConstantChannel,
    error::ClosedError,
    splice::Splice,
};
use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};


/// Run `f` on each of the channel's messages, one at a time, in order
///
/// Only one message is claimed from the channel at a time, with a one-shot
/// [`receive`](Channel::receive) which is renewed after `f` returns. So `f` never runs
/// concurrently with itself, and messages not yet passed to `f` remain available in the channel.
/// Whichever thread delivers a message runs `f`, and keeps running it for as long as the renewed
/// registration is satisfied straight away, so a long backlog is worked off in a loop rather than
/// by recursion.
///
/// The returned constant channel completes once the channel is closed and the last message has
/// been processed.
///
/// If `f` panics, the panic propagates to the thread which delivered the message, and the pump
/// stops: no further messages are taken from the channel. The returned constant channel still
/// completes once the channel closes.
pub fn receive_in_order<T, C, F>(ch: C, f: F) -> ConstantChannel<()>
where
    T: Clone + Send + 'static,
    C: Channel<T> + 'static,
    F: FnMut(T) + Send + 'static,
{
    let done = ConstantChannel::new();
    let pump = Arc::new(InOrder {
        ch,
        f: Mutex::new(f),
        state: Mutex::new(InOrderState {
            next: None,
            running: false,
            closed: false,
        }),
        done: done.clone(),
    });

    // a closed channel fires this straight away
    let pump_2 = Arc::clone(&pump);
    pump.ch.on_closed(OnClosed::new(move || pump_2.closed()));
    if pump.register().is_err() {
        trace!("receive_in_order on closed channel");
    }
    done
}

struct InOrder<T, C, F> {
    ch: C,
    f: Mutex<F>,
    state: Mutex<InOrderState<T>>,
    done: ConstantChannel<()>,
}

struct InOrderState<T> {
    // message delivered but not yet processed. at most one, since only one receive is ever
    // registered at a time.
    next: Option<T>,
    // whether some thread is currently in the drive loop.
    running: bool,
    closed: bool,
}

impl<T, C, F> InOrder<T, C, F> {
    fn lock(&self) -> MutexGuard<'_, InOrderState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // leave the drive loop, finishing if the channel closed meanwhile.
    fn stop(&self, mut lock: MutexGuard<'_, InOrderState<T>>) {
        lock.running = false;
        let finished = lock.closed;
        drop(lock);
        if finished {
            self.finish();
        }
    }

    fn closed(&self) {
        let mut lock = self.lock();
        lock.closed = true;
        let finished = !lock.running;
        drop(lock);
        if finished {
            self.finish();
        }
    }

    fn finish(&self) {
        if self.done.enqueue(()).is_ok() {
            debug!("receive_in_order finished");
        }
    }
}

impl<T, C, F> InOrder<T, C, F>
where
    T: Clone + Send + 'static,
    C: Channel<T> + 'static,
    F: FnMut(T) + Send + 'static,
{
    fn register(self: &Arc<Self>) -> Result<(), ClosedError> {
        let this = Arc::clone(self);
        self.ch.receive(Receiver::new(move |msg| this.deliver(msg)))
    }

    fn deliver(self: &Arc<Self>, msg: T) {
        let mut lock = self.lock();
        debug_assert!(lock.next.is_none(), "internal bug");
        lock.next = Some(msg);
        if lock.running {
            // the running loop picks it up
            return;
        }
        lock.running = true;
        drop(lock);
        self.drive();
    }

    // process messages until none is immediately available.
    fn drive(self: &Arc<Self>) {
        loop {
            let mut lock = self.lock();
            let Some(msg) = lock.next.take() else {
                self.stop(lock);
                return;
            };
            drop(lock);

            {
                let mut f = self.f.lock().unwrap_or_else(PoisonError::into_inner);
                let guard = StopOnUnwind(&**self);
                (*f)(msg);
                mem::forget(guard);
            }
            // the renewed receive may deliver into next before returning
            let _ = self.register();
        }
    }
}

// stops the pump when dropped, which only happens if the handler unwinds.
struct StopOnUnwind<'a, T, C, F>(&'a InOrder<T, C, F>);

impl<T, C, F> Drop for StopOnUnwind<'_, T, C, F> {
    fn drop(&mut self) {
        debug!("receive_in_order handler panicked");
        self.0.stop(self.0.lock());
    }
}


/// Forward every message from `src` to `dst`
///
/// Shorthand for [`siphon_when`] with a predicate that accepts everything.
pub fn siphon<T, S, D>(src: &S, dst: D) -> Result<CallbackId, ClosedError>
where
    T: Clone + Send + 'static,
    S: Channel<T> + Clone + 'static,
    D: Channel<T> + 'static,
{
    siphon_when(|_| true, src, dst)
}

/// Forward messages from `src` which satisfy `pred` to `dst`
///
/// Registers a permanent [`receive_all`](Channel::receive_all) on `src`, whose id is returned and
/// can be used to stop the forwarding. Messages which don't satisfy `pred` are consumed and
/// dropped. The registration cancels itself the first time `dst` is found to be sealed, and the
/// message which found it sealed is dropped.
pub fn siphon_when<T, P, S, D>(pred: P, src: &S, dst: D) -> Result<CallbackId, ClosedError>
where
    T: Clone + Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
    S: Channel<T> + Clone + 'static,
    D: Channel<T> + 'static,
{
    let id = CallbackId::next();
    let src_2 = src.clone();
    src.receive_all(Receiver::with_id(id, move |msg| {
        let sealed = dst.is_sealed() || (pred(&msg) && dst.enqueue(msg).is_err());
        if sealed {
            trace!(?id, "siphon destination sealed");
            src_2.cancel_callback(id);
        }
    }))?;
    Ok(id)
}


/// New channel containing `f` applied to each message from `ch`
///
/// Every message of `ch` is consumed with a permanent [`receive_all`](Channel::receive_all). The
/// new channel is closed when `ch` closes, and the registration on `ch` is cancelled if the new
/// channel is sealed by other means.
pub fn wrap_channel<T, U, C, F>(ch: &C, f: F) -> BasicChannel<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let wrapped = BasicChannel::new();

    let id = CallbackId::next();
    let out = wrapped.clone();
    let ch_2 = ch.clone();
    let _ = ch.receive_all(Receiver::with_id(id, move |msg| {
        if out.enqueue(f(msg)).is_err() {
            ch_2.cancel_callback(id);
        }
    }));

    // a closed channel fires this straight away
    let out = wrapped.clone();
    ch.on_closed(OnClosed::new(move || out.close()));
    wrapped
}

/// Endpoint over `ch` which converts messages in both directions
///
/// Messages read from the returned splice are those of `ch` mapped through `receive_fn` (see
/// [`wrap_channel`]). Messages enqueued into it are mapped through `enqueue_fn` and enqueued
/// into `ch`. Closing the endpoint closes `ch`.
pub fn wrap_endpoint<T, U, C, R, E>(ch: &C, receive_fn: R, enqueue_fn: E) -> Splice<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
    R: Fn(T) -> U + Send + Sync + 'static,
    E: Fn(U) -> T + Send + Sync + 'static,
{
    let read = wrap_channel(ch, receive_fn);

    let write = BasicChannel::new();
    let inner = ch.clone();
    let _ = write.receive_all(Receiver::new(move |msg| {
        // a sealed ch drops the message, as enqueueing into it directly would
        let _ = inner.enqueue(enqueue_fn(msg));
    }));
    let inner = ch.clone();
    write.on_closed(OnClosed::new(move || inner.close()));

    Splice::new(read, write)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{
        callback::{Claim, Listener},
        constant::constant_channel,
    };
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        sync::atomic::{AtomicBool, Ordering::SeqCst},
        thread,
        time::Duration,
    };

    fn drain<T: Clone + Send + 'static>(ch: &BasicChannel<T>) -> Vec<T> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_2 = Arc::clone(&log);
        let receiver = Receiver::new(move |msg| log_2.lock().unwrap().push(msg));
        let id = receiver.id();
        ch.receive_all(receiver).unwrap();
        ch.cancel_callback(id);
        let msgs = log.lock().unwrap().clone();
        msgs
    }

    #[test]
    fn in_order_processes_backlog_in_order() {
        let ch = BasicChannel::new();
        for n in 0..10_000 {
            ch.enqueue(n).unwrap();
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_2 = Arc::clone(&seen);
        let done = receive_in_order(ch.clone(), move |n| seen_2.lock().unwrap().push(n));
        assert!(ch.is_empty());
        assert!(!done.is_complete());

        ch.enqueue(10_000).unwrap();
        ch.close();
        assert!(done.is_complete());
        assert_eq!(*seen.lock().unwrap(), (0..=10_000).collect::<Vec<_>>());
    }

    #[test]
    fn in_order_never_overlaps() {
        let ch = BasicChannel::new();
        let busy = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let busy_2 = Arc::clone(&busy);
        let seen_2 = Arc::clone(&seen);
        let done = receive_in_order(ch.clone(), move |n: (usize, usize)| {
            assert!(!busy_2.swap(true, SeqCst), "overlapping invocation");
            thread::sleep(Duration::from_micros(50));
            seen_2.lock().unwrap().push(n);
            busy_2.store(false, SeqCst);
        });

        let producers = (0..4)
            .map(|p| {
                let ch = ch.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        ch.enqueue((p, i)).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for producer in producers {
            producer.join().unwrap();
        }
        ch.close();

        let start = std::time::Instant::now();
        while !done.is_complete() {
            assert!(start.elapsed() < Duration::from_secs(5));
            thread::sleep(Duration::from_millis(1));
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 200);
        for p in 0..4 {
            let of_p = seen.iter().filter(|&&(q, _)| q == p).map(|&(_, i)| i).collect::<Vec<_>>();
            assert_eq!(of_p, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn in_order_leaves_unprocessed_messages() {
        let ch = BasicChannel::new();
        ch.enqueue(1).unwrap();
        ch.enqueue(2).unwrap();
        let ch_2 = ch.clone();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_2 = Arc::clone(&observed);
        receive_in_order(ch.clone(), move |n| {
            // the next message is still in the channel while this one is processed
            observed_2.lock().unwrap().push((n, ch_2.len()));
        });
        assert_eq!(*observed.lock().unwrap(), vec![(1, 1), (2, 0)]);
    }

    #[test]
    fn in_order_on_closed_channel() {
        let ch = BasicChannel::<u8>::new();
        ch.close();
        let done = receive_in_order(ch, |_| panic!("no messages"));
        assert!(done.is_complete());
    }

    #[test]
    fn in_order_handler_panic_stops_pump() {
        let ch = BasicChannel::new();
        let done = receive_in_order(ch.clone(), |n: u8| assert_ne!(n, 1, "cannot handle 1"));
        assert!(catch_unwind(AssertUnwindSafe(|| ch.enqueue(1))).is_err());

        // nothing is taken after the panic, but closing still completes the pump
        ch.enqueue(2).unwrap();
        assert_eq!(ch.len(), 1);
        assert!(!done.is_complete());
        assert_eq!(drain(&ch), vec![2]);
        ch.close();
        assert!(done.is_complete());
    }

    #[test]
    fn siphon_when_filters() {
        let src = BasicChannel::new();
        let dst = BasicChannel::new();
        siphon_when(|n: &i32| n % 2 == 0, &src, dst.clone()).unwrap();
        for n in 0..6 {
            src.enqueue(n).unwrap();
        }
        assert!(src.is_empty());
        assert_eq!(drain(&dst), vec![0, 2, 4]);
    }

    #[test]
    fn siphon_stops_at_sealed_destination() {
        let src = BasicChannel::new();
        let dst = BasicChannel::new();
        siphon(&src, dst.clone()).unwrap();
        src.enqueue(1).unwrap();
        dst.close();
        // consumed and dropped, and the siphon deregisters
        src.enqueue(2).unwrap();
        src.enqueue(3).unwrap();
        assert_eq!(src.len(), 1);
        assert_eq!(drain(&dst), vec![1]);

        let src = BasicChannel::<u8>::new();
        src.close();
        assert_eq!(siphon(&src, BasicChannel::new()), Err(ClosedError));
    }

    #[test]
    fn siphon_can_be_cancelled() {
        let src = BasicChannel::new();
        let dst = BasicChannel::new();
        let id = siphon(&src, dst.clone()).unwrap();
        src.enqueue("a").unwrap();
        src.cancel_callback(id);
        src.enqueue("b").unwrap();
        assert_eq!(src.len(), 1);
        assert_eq!(drain(&dst), vec!["a"]);
    }

    #[test]
    fn wrap_channel_maps_and_closes() {
        let ch = BasicChannel::new();
        ch.enqueue(1).unwrap();
        let wrapped = wrap_channel(&ch, |n: i32| n.to_string());
        ch.enqueue(2).unwrap();
        assert!(ch.is_empty());
        assert_eq!(wrapped.len(), 2);

        ch.close();
        assert!(wrapped.is_sealed());
        assert_eq!(drain(&wrapped), vec!["1".to_owned(), "2".to_owned()]);
        assert!(wrapped.is_closed());
    }

    #[test]
    fn wrap_channel_of_constant() {
        let ch = constant_channel();
        let wrapped = wrap_channel(&ch, |n: u8| n * 2);
        ch.enqueue(21).unwrap();
        let claimed = Arc::new(Mutex::new(None));
        let claimed_2 = Arc::clone(&claimed);
        wrapped.listen(Listener::new(move |_| {
            let claimed = Arc::clone(&claimed_2);
            Claim::consume(move |n| *claimed.lock().unwrap() = Some(n))
        })).unwrap();
        assert_eq!(*claimed.lock().unwrap(), Some(42));
    }

    #[test]
    fn wrap_endpoint_both_directions() {
        let ch = BasicChannel::new();
        let endpoint = wrap_endpoint(&ch, |n: u32| n.to_string(), |s: String| s.len() as u32);

        endpoint.enqueue("four".to_owned()).unwrap();
        // the write side feeds ch, and ch feeds the read side
        let read = Arc::new(Mutex::new(Vec::new()));
        let read_2 = Arc::clone(&read);
        endpoint.receive_all(Receiver::new(move |s| read_2.lock().unwrap().push(s))).unwrap();
        ch.enqueue(7).unwrap();
        assert_eq!(*read.lock().unwrap(), vec!["4".to_owned(), "7".to_owned()]);

        endpoint.close();
        assert!(ch.is_closed());
        assert!(endpoint.is_closed());
    }
}
