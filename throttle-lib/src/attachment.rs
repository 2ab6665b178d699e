//! Side-channel metadata for requests and responses.
//!
//! Handlers sometimes need to remember something about a request (which
//! [`Client`](crate::Client) submitted it, for example) without the request
//! type knowing about it. [`attach`] stores such data next to the object and
//! [`read`] retrieves it again.
//!
//! The store is created lazily on the first [`attach`] and lives exactly as
//! long as the object that owns it. There is no way to remove entries.
//!
//! Attaching requires mutable access to the object, so concurrent writers on
//! the same object are ruled out by the borrow checker rather than by a lock.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-erased attached value
pub type AttachmentValue = Arc<dyn Any + Send + Sync>;

/// A mapping from keys to arbitrary values attached to an object
#[derive(Clone, Default)]
pub struct Attachments(HashMap<String, AttachmentValue>);

impl Attachments {
    /// Create an empty mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any previous value stored under `key`
    #[must_use]
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Any + Send + Sync,
    {
        self.insert(key, value);
        self
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Any + Send + Sync,
    {
        self.0.insert(key.into(), Arc::new(value));
    }

    /// Get the value stored under `key` if it has type `T`
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.0.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Whether a value is stored under `key`, regardless of its type
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merge `other` into `self`; keys present in both take the value from `other`
    pub fn merge(&mut self, other: Attachments) {
        self.0.extend(other.0);
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the stored keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Attachments").field("keys", &keys).finish()
    }
}

/// Types which carry an attachment slot
pub trait Attachable {
    /// The current attachments, if any were ever added
    fn attachments(&self) -> Option<&Attachments>;

    /// The lazily initialized attachment slot
    fn attachments_slot(&mut self) -> &mut Option<Attachments>;
}

/// Merge `data` into the attachments of `object`, creating them on first use
pub fn attach<O: Attachable + ?Sized>(object: &mut O, data: Attachments) {
    object
        .attachments_slot()
        .get_or_insert_with(Attachments::new)
        .merge(data);
}

/// Retrieve the attachments of `object`
///
/// Returns `None` if nothing was ever attached.
pub fn read<O: Attachable + ?Sized>(object: &O) -> Option<&Attachments> {
    object.attachments()
}
