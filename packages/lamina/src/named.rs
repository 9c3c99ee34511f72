//! Channels looked up by name.

use crate::channel::basic::BasicChannel;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    any::{Any, TypeId},
    borrow::Borrow,
    fmt::{self, Formatter, Debug},
    hash::Hash,
    sync::OnceLock,
};


/// Map from keys to channels, which creates channels on first lookup
///
/// Concurrent first lookups of the same key create exactly one channel. Releasing a key only
/// forgets the channel: it does not close it, and handles to it keep working.
pub struct Registry<K, T> {
    channels: DashMap<K, BasicChannel<T>>,
}

impl<K, T> Registry<K, T>
where
    K: Eq + Hash,
    T: Clone + Send + 'static,
{
    /// Construct empty
    pub fn new() -> Self {
        Registry {
            channels: DashMap::new(),
        }
    }

    /// The channel for `key`, creating it if there is none
    pub fn get_or_create(&self, key: K) -> BasicChannel<T> {
        self.get_or_create_with(key, |_| ())
    }

    /// The channel for `key`, creating it if there is none
    ///
    /// If this call created the channel, `on_create` is called with it before it is returned.
    /// Other threads may already be using the channel by then.
    pub fn get_or_create_with<F>(&self, key: K, on_create: F) -> BasicChannel<T>
    where
        F: FnOnce(&BasicChannel<T>),
    {
        let (ch, created) = match self.channels.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(BasicChannel::new()).clone(), true),
        };
        // the map shard is unlocked by now, so on_create may use the registry
        if created {
            debug!("named channel created");
            on_create(&ch);
        }
        ch
    }

    /// The channel for `key`, if there is one
    pub fn get<Q>(&self, key: &Q) -> Option<BasicChannel<T>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.channels.get(key).map(|ch| ch.clone())
    }

    /// Forget the channel for `key`, returning it if there was one
    pub fn release<Q>(&self, key: &Q) -> Option<BasicChannel<T>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let released = self.channels.remove(key).map(|(_, ch)| ch);
        if released.is_some() {
            debug!("named channel released");
        }
        released
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether there are no channels
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl<K, T> Default for Registry<K, T>
where
    K: Eq + Hash,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Debug for Registry<K, T>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.channels.len())
            .finish()
    }
}


// ==== process-wide registry ====

// one leaked Registry<String, T> per message type T, keyed by TypeId::of::<T>.
type TypeMap = DashMap<TypeId, &'static (dyn Any + Send + Sync)>;

fn global_registry<T>() -> &'static Registry<String, T>
where
    T: Clone + Send + 'static,
{
    static REGISTRIES: OnceLock<TypeMap> = OnceLock::new();

    let registries = REGISTRIES.get_or_init(DashMap::new);
    let registry = *registries
        .entry(TypeId::of::<T>())
        .or_insert_with(|| -> &'static (dyn Any + Send + Sync) {
            Box::leak(Box::new(Registry::<String, T>::new()))
        });
    match registry.downcast_ref::<Registry<String, T>>() {
        Some(registry) => registry,
        None => unreachable!("named channel registry stored under wrong type id"),
    }
}

/// The process-wide channel named `key` with message type `T`, creating it if there is none
///
/// Names are scoped by message type: channels of different message types never share a name.
///
/// Names are strings, and a borrowed and an owned string of the same text name the same channel.
/// For keys of any other type, keep a [`Registry<K, T>`](Registry) of your own.
pub fn named_channel<T>(key: &str) -> BasicChannel<T>
where
    T: Clone + Send + 'static,
{
    named_channel_with(key, |_| ())
}

/// Like [`named_channel`], calling `on_create` with the channel if this call created it
///
/// Also keyed by string only. See [`Registry::get_or_create_with`] for other key types.
pub fn named_channel_with<T, F>(key: &str, on_create: F) -> BasicChannel<T>
where
    T: Clone + Send + 'static,
    F: FnOnce(&BasicChannel<T>),
{
    let registry = global_registry::<T>();
    match registry.get(key) {
        Some(ch) => ch,
        None => registry.get_or_create_with(key.to_owned(), on_create),
    }
}

/// Forget the process-wide channel named `key` with message type `T`
///
/// Returns whether there was one. The channel is not closed.
pub fn release_named_channel<T>(key: &str) -> bool
where
    T: Clone + Send + 'static,
{
    global_registry::<T>().release(key).is_some()
}
