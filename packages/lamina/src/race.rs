//! Racing several channels for their first message.

use crate::{
    channel::{
        api::Channel,
        callback::{CallbackId, Claim, Listener, OnClosed, Receiver},
        constant::ConstantChannel,
    },
    time::{Scheduled, Timeout, Timer},
    util::atomic_take::AtomicTake,
};
use std::sync::{
    atomic::{
        Ordering::AcqRel,
        AtomicUsize,
    },
    Arc,
    OnceLock,
};


/// Race several channels for their first message, without losing anyone else's
///
/// Returns a constant channel which completes with `Some((key, msg))` for the first channel to
/// offer a message, or with `None` if the timeout elapses first. Registrations are one-shot
/// [`listen`](Channel::listen)s, so only the winning channel's message is consumed: every other
/// channel keeps its messages. Once resolved, every outstanding registration is cancelled.
///
/// A zero timeout still lets messages which are already buffered win. Channels which are closed
/// are skipped, and if every channel is or becomes closed before anything wins, the result is
/// `None`. In particular, polling no channels at all resolves to `None` at once.
pub fn poll<K, T, C, I>(channels: I, timeout: Timeout) -> ConstantChannel<Option<(K, T)>>
where
    I: IntoIterator<Item = (K, C)>,
    K: Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
    C: Channel<T> + 'static,
{
    race(channels, timeout, Mode::Listen)
}

/// Race several channels for their first message, discarding the losers' messages
///
/// Same contract as [`poll`], but registers one-shot [`receive`](Channel::receive)s. Every
/// channel which delivers a message before the registrations are cancelled has that message
/// consumed, and only the first one is forwarded: the others are dropped. This skips the
/// claim negotiation, but must not be used on channels which have other consumers which would
/// miss those messages.
pub fn poll_star<K, T, C, I>(channels: I, timeout: Timeout) -> ConstantChannel<Option<(K, T)>>
where
    I: IntoIterator<Item = (K, C)>,
    K: Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
    C: Channel<T> + 'static,
{
    race(channels, timeout, Mode::Receive)
}


#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Mode {
    Listen,
    Receive,
}

// shared state of one race.
struct Race<K, T, C> {
    // whoever takes this has won.
    result: AtomicTake<ConstantChannel<Option<(K, T)>>>,
    // set once registration is done.
    registrations: OnceLock<Vec<Registration<C>>>,
    timer: OnceLock<Scheduled>,
    // number of registered channels not yet closed, plus one while still registering.
    open: AtomicUsize,
}

struct Registration<C> {
    channel: C,
    callback: CallbackId,
    on_closed: CallbackId,
}

impl<K, T, C> Race<K, T, C>
where
    K: Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
    C: Channel<T> + 'static,
{
    fn is_resolved(&self) -> bool {
        self.result.is_taken()
    }

    // try to win with the given outcome. returns whether this won.
    fn resolve(&self, outcome: Option<(K, T)>) -> bool {
        match self.result.take() {
            Some(result) => {
                self.complete(result, outcome);
                true
            }
            None => false,
        }
    }

    // deliver the outcome to the already taken result channel, and stop the race.
    fn complete(&self, result: ConstantChannel<Option<(K, T)>>, outcome: Option<(K, T)>) {
        debug!(won = outcome.is_some(), "race resolved");
        // nothing else ever enqueues into the result
        let _ = result.enqueue(outcome);
        self.cancel_all();
    }

    // cancel every registration made so far and the timer. safe to call more than once.
    fn cancel_all(&self) {
        if let Some(timer) = self.timer.get() {
            timer.cancel();
        }
        if let Some(registrations) = self.registrations.get() {
            for registration in registrations {
                registration.channel.cancel_callback(registration.callback);
                registration.channel.cancel_callback(registration.on_closed);
            }
        }
    }

    fn channel_closed(&self) {
        if self.open.fetch_sub(1, AcqRel) == 1 {
            trace!("every raced channel is closed");
            self.resolve(None);
        }
    }
}

fn race<K, T, C, I>(channels: I, timeout: Timeout, mode: Mode) -> ConstantChannel<Option<(K, T)>>
where
    I: IntoIterator<Item = (K, C)>,
    K: Clone + Send + Sync + 'static,
    T: Clone + Send + 'static,
    C: Channel<T> + 'static,
{
    // relative timeouts count from now, not from after registration
    let timeout = timeout.fix();
    let result = ConstantChannel::new();
    let race = Arc::new(Race {
        result: AtomicTake::some(result.clone()),
        registrations: OnceLock::new(),
        timer: OnceLock::new(),
        open: AtomicUsize::new(1),
    });

    let mut registrations = Vec::new();
    for (key, channel) in channels {
        if race.is_resolved() {
            break;
        }

        let callback = CallbackId::next();
        let registered = match mode {
            Mode::Listen => {
                let race = Arc::clone(&race);
                channel.listen(Listener::with_id(callback, move |_| {
                    // this runs while the offering channel is held, so only claim here and do the
                    // rest in the consumer
                    match race.result.take() {
                        Some(result) => {
                            let race = Arc::clone(&race);
                            let key = key.clone();
                            Claim::consume(move |msg| race.complete(result, Some((key, msg))))
                        }
                        None => Claim::Decline,
                    }
                }))
            }
            Mode::Receive => {
                let race = Arc::clone(&race);
                channel.receive(Receiver::with_id(callback, move |msg| {
                    race.resolve(Some((key.clone(), msg)));
                }))
            }
        };
        if registered.is_err() {
            trace!("skipping closed channel in race");
            continue;
        }

        race.open.fetch_add(1, AcqRel);
        let on_closed = {
            let race = Arc::clone(&race);
            OnClosed::new(move || race.channel_closed())
        };
        let on_closed_id = on_closed.id();
        channel.on_closed(on_closed);
        registrations.push(Registration {
            channel,
            callback,
            on_closed: on_closed_id,
        });
    }
    trace!(channels = registrations.len(), ?mode, "race registered");
    let _ = race.registrations.set(registrations);

    // anything which won during registration could not see the registrations yet
    if race.is_resolved() {
        race.cancel_all();
        return result;
    }

    // release the registration guard
    race.channel_closed();

    match timeout.remaining() {
        None => (),
        Some(remaining) if remaining.is_zero() => {
            if race.resolve(None) {
                debug!("race timed out immediately");
            }
        }
        Some(remaining) => {
            let race_2 = Arc::clone(&race);
            let scheduled = Timer::global().schedule_once(remaining, move || {
                if race_2.resolve(None) {
                    debug!("race timed out");
                }
            });
            let _ = race.timer.set(scheduled);
            // the race may have been won while the timer was being scheduled
            if race.is_resolved() {
                race.cancel_all();
            }
        }
    }

    result
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{
        basic::BasicChannel,
        closed::closed_channel,
        constant::constant_channel,
    };
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        thread,
        time::{Duration, Instant},
    };

    // block until the constant channel completes.
    fn wait<T: Clone + Send + 'static>(ch: &ConstantChannel<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(value) = ch.value() {
                return value;
            }
            assert!(Instant::now() < deadline, "constant channel never completed");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn poll_leaves_losers_untouched() {
        let a = BasicChannel::new();
        let b = BasicChannel::new();
        a.enqueue(1).unwrap();

        let result = poll([("a", a.clone()), ("b", b.clone())], Timeout::Never);
        assert_eq!(result.value(), Some(Some(("a", 1))));
        assert_eq!(a.len(), 0);
        assert_eq!(b.len(), 0);

        // b's registration was cancelled, so its next message stays buffered
        b.enqueue(2).unwrap();
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn poll_only_claims_one() {
        let a = BasicChannel::new();
        let b = BasicChannel::new();
        a.enqueue(1).unwrap();
        b.enqueue(2).unwrap();

        let result = poll([("a", a.clone()), ("b", b.clone())], Timeout::Never);
        assert_eq!(result.value(), Some(Some(("a", 1))));
        assert_eq!(a.len() + b.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn poll_resolves_on_later_message() {
        let a = BasicChannel::<u32>::new();
        let result = poll([((), a.clone())], Timeout::Never);
        assert_eq!(result.value(), None);

        let a_2 = a.clone();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            a_2.enqueue(7).unwrap();
        });
        assert_eq!(wait(&result), Some(((), 7)));
        producer.join().unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn poll_resolves_past_panicking_listener() {
        let a = BasicChannel::<u8>::new();
        let result = poll([(0, a.clone())], Timeout::Never);
        a.listen_all(Listener::new(|_: &u8| -> Claim<u8> { panic!("listener failed") }))
            .unwrap();

        // the poll still claims the message, and the panic surfaces afterwards
        assert!(catch_unwind(AssertUnwindSafe(|| a.enqueue(5))).is_err());
        assert_eq!(result.value(), Some(Some((0, 5))));
        assert!(a.is_empty());
    }

    #[test]
    fn poll_no_channels_times_out() {
        let start = Instant::now();
        let result = poll(Vec::<(u8, BasicChannel<u8>)>::new(), Duration::from_millis(5).into());
        assert_eq!(wait(&result), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn poll_times_out() {
        let a = BasicChannel::<u8>::new();
        let result = poll([(0, a.clone())], Duration::from_millis(20).into());
        assert_eq!(wait(&result), None);

        // the timeout cancelled the registration
        a.enqueue(1).unwrap();
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn zero_timeout_still_takes_buffered() {
        let a = BasicChannel::new();
        let b = BasicChannel::<u8>::new();
        b.enqueue(3).unwrap();
        let result = poll([(0, a.clone()), (1, b.clone())], Duration::ZERO.into());
        assert_eq!(result.value(), Some(Some((1, 3))));

        let result = poll([(0, a.clone()), (1, b.clone())], Duration::ZERO.into());
        assert_eq!(result.value(), Some(None));
        a.enqueue(4).unwrap();
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn poll_all_closed() {
        let closed = BasicChannel::<u8>::new();
        closed.close();
        let result = poll(
            [
                (0, Arc::new(closed) as Arc<dyn Channel<u8>>),
                (1, Arc::new(closed_channel::<u8>()) as Arc<dyn Channel<u8>>),
            ],
            Timeout::Never,
        );
        assert_eq!(result.value(), Some(None));

        let closing = BasicChannel::<u8>::new();
        let result = poll([(0, closing.clone())], Timeout::Never);
        assert_eq!(result.value(), None);
        closing.close();
        assert_eq!(result.value(), Some(None));
    }

    #[test]
    fn poll_constant_channel() {
        let ch = constant_channel();
        ch.enqueue("done").unwrap();
        let result = poll([("c", ch.clone())], Timeout::Never);
        assert_eq!(result.value(), Some(Some(("c", "done"))));
        // constant channels are never consumed
        assert_eq!(ch.value(), Some("done"));
    }

    #[test]
    fn poll_star_consumes() {
        let a = BasicChannel::new();
        a.enqueue(5).unwrap();
        a.enqueue(6).unwrap();
        let result = poll_star([("a", a.clone())], Timeout::Never);
        assert_eq!(result.value(), Some(Some(("a", 5))));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn concurrent_producers_one_winner() {
        for _ in 0..50 {
            let channels = (0..4).map(|_| BasicChannel::new()).collect::<Vec<_>>();
            let result = poll(
                channels.iter().cloned().enumerate(),
                Timeout::Never,
            );
            let producers = channels
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, ch)| thread::spawn(move || ch.enqueue(i).unwrap()))
                .collect::<Vec<_>>();
            for producer in producers {
                producer.join().unwrap();
            }

            let (key, msg) = wait(&result).unwrap();
            assert_eq!(key, msg);
            // exactly one message was claimed
            let remaining = channels.iter().map(BasicChannel::len).sum::<usize>();
            assert_eq!(remaining, 3);
            assert!(channels[key].is_empty());
        }
    }
}
