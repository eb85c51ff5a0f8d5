//! Time-ordered 128-bit identities
//!
//! A [`Ulid`] packs a 48-bit millisecond timestamp and 80 random bits into two
//! words. Identities compare by timestamp first, so ids generated later sort
//! after earlier ones. The textual form is the canonical 26 character
//! Crockford base-32 string.

use crate::error::{AssetError, Result};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const INVALID: u8 = 0xff;

/// Length of the string form
pub const ULID_STR_LEN: usize = 26;

const TIMESTAMP_MASK: u64 = (1 << 48) - 1;

static LAST_GENERATED: Mutex<Ulid> = parking_lot::const_mutex(Ulid::nil());

const DECODE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        let c = ALPHABET[i];
        table[c as usize] = i as u8;
        table[c.to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    table
};

/// Universally unique lexicographically sortable identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ulid {
    /// Timestamp (48 bits) followed by the upper 16 random bits
    hi: u64,
    /// Lower 64 random bits
    lo: u64,
}

impl Ulid {
    /// The all-zero identity. Never produced by [`Ulid::generate`].
    pub const fn nil() -> Self {
        Self { hi: 0, lo: 0 }
    }

    /// Build an identity from its components
    pub const fn from_parts(timestamp_ms: u64, rand_hi: u16, rand_lo: u64) -> Self {
        Self {
            hi: ((timestamp_ms & TIMESTAMP_MASK) << 16) | rand_hi as u64,
            lo: rand_lo,
        }
    }

    /// Generate a new identity from the current time and randomness.
    ///
    /// Ids generated within the same millisecond are strictly increasing.
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut rng = rand::rng();
        let candidate = Self::from_parts(now, rng.random(), rng.random());

        let mut last = LAST_GENERATED.lock();
        let id = if candidate.timestamp() == last.timestamp() && candidate <= *last {
            last.increment().unwrap_or(candidate)
        } else {
            candidate
        };
        *last = id;
        id
    }

    /// Milliseconds since the UNIX epoch
    pub fn timestamp(&self) -> u64 {
        self.hi >> 16
    }

    /// Whether this is the all-zero identity
    pub fn is_nil(&self) -> bool {
        self.hi == 0 && self.lo == 0
    }

    /// Whether this identity can name an asset
    pub fn is_valid(&self) -> bool {
        !self.is_nil()
    }

    /// The random part plus one, if it does not overflow into the timestamp
    fn increment(&self) -> Option<Self> {
        let (lo, carry) = self.lo.overflowing_add(1);
        let rand_hi = (self.hi & 0xffff) + carry as u64;
        if rand_hi > 0xffff {
            return None;
        }
        Some(Self {
            hi: (self.hi & !0xffff) | rand_hi,
            lo,
        })
    }

    /// Encode into the 26 character base-32 form
    pub fn encode(&self) -> [u8; ULID_STR_LEN] {
        let mut out = [0u8; ULID_STR_LEN];
        for (i, slot) in out.iter_mut().take(13).enumerate() {
            *slot = ALPHABET[((self.hi >> (61 - 5 * i)) & 31) as usize];
        }
        out[13] = ALPHABET[(((self.hi << 4) | (self.lo >> 60)) & 31) as usize];
        for (i, slot) in out.iter_mut().skip(14).enumerate() {
            *slot = ALPHABET[((self.lo >> (55 - 5 * i)) & 31) as usize];
        }
        out
    }

    /// Decode the string form, case-insensitive.
    ///
    /// Anything that is not exactly 26 valid characters, or that does not fit in
    /// 128 bits, decodes to [`Ulid::nil`].
    pub fn from_str_lossy(s: &str) -> Self {
        Self::decode(s.as_bytes()).unwrap_or_default()
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ULID_STR_LEN {
            return None;
        }
        let mut digits = [0u64; ULID_STR_LEN];
        for (digit, &c) in digits.iter_mut().zip(bytes) {
            let value = DECODE[c as usize];
            if value == INVALID {
                return None;
            }
            *digit = value as u64;
        }
        // the first character only carries the top 3 bits
        if digits[0] > 7 {
            return None;
        }

        let mut hi = 0u64;
        for (i, digit) in digits.iter().take(13).enumerate() {
            hi |= digit << (61 - 5 * i);
        }
        hi |= digits[13] >> 4;
        let mut lo = (digits[13] & 15) << 60;
        for (i, digit) in digits.iter().skip(14).enumerate() {
            lo |= digit << (55 - 5 * i);
        }
        Some(Self { hi, lo })
    }
}

impl FromStr for Ulid {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s.as_bytes()).ok_or_else(|| AssetError::InvalidUlid(s.to_string()))
    }
}

impl fmt::Display for Ulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode();
        // ALPHABET is ASCII
        f.write_str(std::str::from_utf8(&encoded).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Ulid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ulid({self})")
    }
}

impl Serialize for Ulid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ulid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
