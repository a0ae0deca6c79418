//! Per-stream dictionaries for property names and object ids.
//!
//! Both sides assign indices starting at 1 in first-seen order. Index 0 on
//! the wire means "new entry follows inline". When the encoder's counter
//! reaches the sentinel, both sides clear their tables and the entry that
//! triggered it is sent inline with the sentinel in place of 0.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Sentinel index that clears the property dictionary (9 bits).
pub const PROPERTY_SENTINEL: u16 = 0x1FF;

/// Sentinel index that clears the object dictionary (11 bits).
pub const OBJECT_SENTINEL: u16 = 0x7FF;

/// Index written for an entry that is sent inline.
pub const NEW_ENTRY: u16 = 0;

/// Encoder-side dictionary mapping keys to wire indices.
#[derive(Debug, Clone)]
pub struct EncodeDictionary<K> {
    entries: HashMap<K, u16>,
    last: u16,
    sentinel: u16,
}

impl<K: Hash + Eq> EncodeDictionary<K> {
    pub fn new(sentinel: u16) -> Self {
        Self {
            entries: HashMap::new(),
            last: 0,
            sentinel,
        }
    }

    /// Return the index to write for `key`, registering it if unseen.
    ///
    /// Known keys return their index. Unseen keys return [`NEW_ENTRY`], or
    /// the sentinel when the table was just cleared to make room.
    pub fn index_for<Q>(&mut self, key: &Q) -> u16
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(&index) = self.entries.get(key) {
            return index;
        }
        let mut result = NEW_ENTRY;
        self.last += 1;
        if self.last == self.sentinel {
            self.entries.clear();
            self.last = 1;
            result = self.sentinel;
        }
        self.entries.insert(key.to_owned(), self.last);
        result
    }

    /// Whether a wire index means the entry is written inline.
    pub fn is_inline(&self, index: u16) -> bool {
        index == NEW_ENTRY || index == self.sentinel
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the decoder should treat an index read from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The entry follows inline and must be appended.
    New,
    /// A previously seen entry, zero-based.
    Existing(usize),
}

/// Decoder-side dictionary holding entries in arrival order.
#[derive(Debug, Clone)]
pub struct DecodeDictionary<V> {
    entries: Vec<V>,
    sentinel: u16,
}

impl<V> DecodeDictionary<V> {
    pub fn new(sentinel: u16) -> Self {
        Self {
            entries: Vec::new(),
            sentinel,
        }
    }

    /// Interpret a wire index. The sentinel clears the table first.
    pub fn slot(&mut self, index: u16) -> Slot {
        if index == self.sentinel {
            self.entries.clear();
            return Slot::New;
        }
        if index == NEW_ENTRY {
            Slot::New
        } else {
            Slot::Existing(usize::from(index) - 1)
        }
    }

    pub fn push(&mut self, value: V) {
        self.entries.push(value);
    }

    pub fn get(&self, position: usize) -> Option<&V> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
