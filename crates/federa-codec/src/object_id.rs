use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::CodecError;

/// Size of an object identifier in bytes.
pub const OBJECT_ID_LEN: usize = 12;

const SALT_LEN: usize = 5;
const COUNTER_MODULUS: u32 = 0xFF_FFFF;

/// A 12-byte object identifier.
///
/// Layout: 4-byte big-endian Unix timestamp (seconds), 5-byte process salt,
/// 3-byte big-endian counter. Renders as 24 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// The all-zero identifier.
    pub const ZERO: ObjectId = ObjectId([0; OBJECT_ID_LEN]);

    /// Wrap raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Creation time in seconds since the Unix epoch.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The 3-byte counter component.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([0, self.0[9], self.0[10], self.0[11]])
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::InvalidObjectId(s.to_string());
        if s.len() != OBJECT_ID_LEN * 2 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; OBJECT_ID_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl serde::Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Produces time-ordered, process-distinct object identifiers.
///
/// The salt and counter are owned by the generator rather than by global
/// state, so independent generators can coexist (e.g. in tests).
#[derive(Debug)]
pub struct ObjectIdGenerator {
    salt: [u8; SALT_LEN],
    counter: AtomicU32,
}

impl ObjectIdGenerator {
    /// Create a generator with a random salt.
    pub fn new() -> Self {
        let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
        Self::with_salt(salt, 0)
    }

    /// Create a generator with an explicit salt and starting counter.
    pub fn with_salt(salt: [u8; SALT_LEN], counter: u32) -> Self {
        Self {
            salt,
            counter: AtomicU32::new(counter % COUNTER_MODULUS),
        }
    }

    /// The process salt.
    pub fn salt(&self) -> [u8; SALT_LEN] {
        self.salt
    }

    /// Generate an identifier stamped with the current time.
    pub fn generate(&self) -> ObjectId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.generate_at(now as u32)
    }

    /// Generate an identifier stamped with an explicit timestamp.
    pub fn generate_at(&self, timestamp: u32) -> ObjectId {
        let counter = self.next_counter();

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(&self.salt);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    fn next_counter(&self) -> u32 {
        let previous = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some((c + 1) % COUNTER_MODULUS)
            })
            .unwrap_or_else(|c| c);
        (previous + 1) % COUNTER_MODULUS
    }
}

impl Default for ObjectIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
