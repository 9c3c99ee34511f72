// minimal safe state machine for the general channel. the exposed `BasicChannel` is a convenience
// wrapper around this.
//
// every state change is a transition on the lockable state: lock, apply the operation's own
// mutation, then `commit`, which computes the delivery plan, publishes the new state byte and
// releases the lock. the returned `Plan` is run by the caller afterwards, so user callbacks other
// than listener offers never run while the state is held.

use super::callback::{
    CallbackId,
    Claim,
    Consumer,
    Listener,
    OnClosed,
    Receiver,
};
use smallvec::SmallVec;
use std::{
    any::Any,
    collections::VecDeque,
    mem::take,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::{
        atomic::{
            Ordering::{Acquire, Release},
            AtomicU8,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};


// handle to a channel.
pub(crate) struct Channel<T>(Arc<Shared<T>>);

// channel shared state.
struct Shared<T> {
    // mutex around lockable state.
    lockable: Mutex<Lockable<T>>,
    // mirror of Lockable.state, published on commit so that state queries need not lock.
    state: AtomicU8,
}

// channel lockable state.
struct Lockable<T> {
    // buffered messages, oldest first.
    backlog: VecDeque<T>,
    // permanent listeners.
    listeners: Vec<Listener<T>>,
    // transient listeners which have not yet been offered a message.
    pending_listeners: Vec<Listener<T>>,
    // permanent receivers.
    receivers: Vec<Receiver<T>>,
    // transient receivers which have not yet been assigned a message.
    pending_receivers: Vec<Receiver<T>>,
    // callbacks to fire upon closing.
    on_closed: Vec<OnClosed>,
    // lifecycle state.
    //
    // - only ever moves forward: open -> sealed -> closed.
    // - if not open, the end of the backlog is the close point and enqueues are rejected.
    // - becomes closed at the end of the first transition which leaves it sealed with an empty
    //   backlog. all callback sets are empty once closed.
    state: State,
}

// possible values for Lockable.state and Shared.state.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum State {
    // enqueueing is possible.
    Open,
    // no more enqueues will be accepted, but buffered messages remain.
    Sealed,
    // sealed and drained.
    Closed,
}

impl<T: Clone> Channel<T> {
    // construct an empty, open channel.
    pub(crate) fn new() -> Self {
        Channel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                backlog: VecDeque::new(),
                listeners: Vec::new(),
                pending_listeners: Vec::new(),
                receivers: Vec::new(),
                pending_receivers: Vec::new(),
                on_closed: Vec::new(),
                state: State::Open,
            }),
            state: AtomicU8::new(State::Open as u8),
        }))
    }

    // atomic-read the state byte.
    pub(crate) fn state(&self) -> u8 {
        self.0.state.load(Acquire)
    }

    // lock the channel.
    //
    // listener panics are caught inside the plan, so the mutex is only poisoned by an internal
    // assertion failing.
    pub(crate) fn lock(&self) -> Lock<'_, T> {
        Lock {
            shared: &self.0,
            lock: self.0.lockable.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    // whether two handles refer to the same channel.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }
}

// lock on a channel.
pub(crate) struct Lock<'a, T> {
    shared: &'a Arc<Shared<T>>,
    lock: MutexGuard<'a, Lockable<T>>,
}

impl<'a, T: Clone> Lock<'a, T> {
    // the current lifecycle state.
    pub(crate) fn state(&self) -> State {
        self.lock.state
    }

    // buffered messages, oldest first.
    pub(crate) fn backlog(&self) -> &VecDeque<T> {
        &self.lock.backlog
    }

    // number of registered callbacks, of all kinds.
    pub(crate) fn callback_count(&self) -> usize {
        let l = &*self.lock;
        l.listeners.len()
            + l.pending_listeners.len()
            + l.receivers.len()
            + l.pending_receivers.len()
            + l.on_closed.len()
    }

    // append a message.
    //
    // panics if not open.
    pub(crate) fn enqueue(&mut self, msg: T) {
        assert_eq!(self.lock.state, State::Open, "internal bug");
        self.lock.backlog.push_back(msg);
    }

    // seal the channel, if open.
    pub(crate) fn seal(&mut self) {
        if self.lock.state == State::Open {
            debug!(backlog = self.lock.backlog.len(), "channel sealed");
            self.lock.state = State::Sealed;
        }
    }

    // register a listener.
    //
    // panics if closed.
    pub(crate) fn listen(&mut self, listener: Listener<T>, permanent: bool) {
        assert_ne!(self.lock.state, State::Closed, "internal bug");
        if permanent {
            self.lock.listeners.push(listener);
        } else {
            self.lock.pending_listeners.push(listener);
        }
    }

    // register a receiver.
    //
    // panics if closed.
    pub(crate) fn receive(&mut self, receiver: Receiver<T>, permanent: bool) {
        assert_ne!(self.lock.state, State::Closed, "internal bug");
        if permanent {
            self.lock.receivers.push(receiver);
        } else {
            self.lock.pending_receivers.push(receiver);
        }
    }

    // register a close callback.
    //
    // panics if closed.
    pub(crate) fn on_closed(&mut self, f: OnClosed) {
        assert_ne!(self.lock.state, State::Closed, "internal bug");
        self.lock.on_closed.push(f);
    }

    // remove the callback with the given id from whichever set holds it. returns whether anything
    // was removed.
    pub(crate) fn cancel(&mut self, id: CallbackId) -> bool {
        let before = self.callback_count();
        let l = &mut *self.lock;
        l.listeners.retain(|f| f.id() != id);
        l.pending_listeners.retain(|f| f.id() != id);
        l.receivers.retain(|f| f.id() != id);
        l.pending_receivers.retain(|f| f.id() != id);
        l.on_closed.retain(|f| f.id() != id);
        before != self.callback_count()
    }

    // compute the delivery plan, publish the resulting state, and release the lock.
    //
    // the plan must be run by the caller.
    pub(crate) fn commit(self) -> Plan<T> {
        let Lock { shared, mut lock } = self;
        let plan = lock.plan();
        shared.state.store(lock.state as u8, Release);
        drop(lock);
        plan
    }
}

impl<T: Clone> Lockable<T> {
    // take every message which is currently deliverable out of the backlog, in order.
    fn plan(&mut self) -> Plan<T> {
        let mut plan = Plan::default();

        // receivers pass. the head goes to every receiver at once, and the rest go to permanent
        // receivers only, since the transient ones have been used up.
        if !self.backlog.is_empty()
            && !(self.receivers.is_empty() && self.pending_receivers.is_empty())
        {
            if let Some(head) = self.backlog.pop_front() {
                let targets = self.receivers.iter()
                    .cloned()
                    .chain(self.pending_receivers.drain(..))
                    .collect();
                plan.dispatches.push(Dispatch::Receive(head, targets));
            }
            if !self.receivers.is_empty() {
                for msg in self.backlog.drain(..) {
                    let targets = self.receivers.iter().cloned().collect();
                    plan.dispatches.push(Dispatch::Receive(msg, targets));
                }
            }
        }

        // listeners pass. transient listeners get exactly one offer: the first message examined.
        if !self.backlog.is_empty()
            && !(self.listeners.is_empty() && self.pending_listeners.is_empty())
        {
            let mut transient = take(&mut self.pending_listeners);
            while let Some(msg) = self.backlog.front() {
                let mut consumers: SmallVec<[Consumer<T>; 2]> = SmallVec::new();
                for listener in self.listeners.iter().chain(transient.iter()) {
                    match catch_unwind(AssertUnwindSafe(|| listener.offer(msg))) {
                        Ok(Claim::Consume(consumer)) => consumers.push(consumer),
                        Ok(Claim::Decline) => (),
                        // a panicking listener declines. the panic resumes after the plan runs,
                        // so whatever was claimed so far is still delivered.
                        Err(panic) => {
                            debug!(id = ?listener.id(), "listener panicked during offer");
                            plan.panic.get_or_insert(panic);
                        }
                    }
                }
                transient.clear();
                let stop = consumers.is_empty() || plan.panic.is_some();
                if !consumers.is_empty() {
                    if let Some(msg) = self.backlog.pop_front() {
                        plan.dispatches.push(Dispatch::Consume(msg, consumers));
                    }
                }
                if stop {
                    break;
                }
            }
        }

        // reaching the close point of a sealed channel closes it.
        if self.state == State::Sealed && self.backlog.is_empty() {
            debug!("channel closed");
            self.state = State::Closed;
            self.listeners.clear();
            self.pending_listeners.clear();
            self.receivers.clear();
            self.pending_receivers.clear();
            plan.on_closed = take(&mut self.on_closed);
        }

        if !plan.is_empty() {
            trace!(
                deliveries = plan.dispatches.len(),
                remaining = self.backlog.len(),
                "planned deliveries"
            );
        }
        plan
    }
}


// side effects computed by a transition, to be run once it has committed.
pub(crate) struct Plan<T> {
    // messages removed from the backlog, in order, with the callbacks entitled to them.
    dispatches: SmallVec<[Dispatch<T>; 4]>,
    // close callbacks, if the transition closed the channel.
    on_closed: Vec<OnClosed>,
    // first panic caught from a listener offer, resumed at the end of run.
    panic: Option<Box<dyn Any + Send>>,
}

// a message removed from the backlog along with the callbacks it's assigned to.
enum Dispatch<T> {
    // assigned to receivers.
    Receive(T, SmallVec<[Receiver<T>; 2]>),
    // claimed by listeners.
    Consume(T, SmallVec<[Consumer<T>; 2]>),
}

impl<T> Default for Plan<T> {
    fn default() -> Self {
        Plan {
            dispatches: SmallVec::new(),
            on_closed: Vec::new(),
            panic: None,
        }
    }
}

impl<T: Clone> Plan<T> {
    // whether running this would do nothing.
    pub(crate) fn is_empty(&self) -> bool {
        self.dispatches.is_empty() && self.on_closed.is_empty() && self.panic.is_none()
    }

    // invoke every callback in the plan, in order, each exactly once. then resume a listener's
    // panic, if one was caught.
    pub(crate) fn run(self) {
        for dispatch in self.dispatches {
            match dispatch {
                Dispatch::Receive(msg, receivers) => {
                    fan_out(msg, receivers, |receiver, msg| receiver.deliver(msg));
                }
                Dispatch::Consume(msg, consumers) => {
                    fan_out(msg, consumers, |consumer, msg| consumer(msg));
                }
            }
        }
        for f in self.on_closed {
            f.fire();
        }
        if let Some(panic) = self.panic {
            resume_unwind(panic);
        }
    }
}

// call every target with the message, cloning it for all but the last.
fn fan_out<T, F, I>(msg: T, targets: I, mut call: impl FnMut(F, T))
where
    T: Clone,
    I: IntoIterator<Item = F>,
{
    let mut targets = targets.into_iter().peekable();
    while let Some(target) = targets.next() {
        if targets.peek().is_some() {
            call(target, msg.clone());
        } else {
            call(target, msg);
            break;
        }
    }
}
