//! Object keys for generated uploads.
//!
//! Every upload writes a fresh object. Keys are derived from a random 128-bit identifier (UUID
//! v4) and rendered as 32 lowercase hex characters without dashes, so they are fixed-width and
//! safe to use in any path-style storage URL.

use std::fmt;

use uuid::Uuid;

/// Length of the rendered key in characters.
pub const KEY_LENGTH: usize = 32;

/// A unique, fixed-width object key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Generates a new random key.
    ///
    /// Collisions across a run (and across concurrent workers) are negligible since each key
    /// carries 122 bits of randomness.
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
