//! Party identities and the normalized composite key
//!
//! Identity equality is the engine's only notion of "same party". Every
//! comparison, index, and grouping goes through [`PartyKey`] so the
//! trim/case-fold rules live in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Field separator inside a composite key. Unit separator cannot appear
/// in trimmed user input, so composed keys never collide across fields.
const KEY_SEPARATOR: char = '\u{1f}';

/// Normalized composite party key
///
/// Built from the defining fields of an identity: trimmed, case-folded,
/// and joined with a non-printable separator. Two identities are the same
/// party exactly when their keys are equal. No fuzzy matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyKey(String);

impl PartyKey {
    /// Compose a key from a kind tag and the identity's defining fields
    pub fn compose(kind: &str, fields: &[&str]) -> Self {
        let mut key = String::from(kind);
        for field in fields {
            key.push(KEY_SEPARATOR);
            key.push_str(&Self::normalize(field));
        }
        Self(key)
    }

    /// Normalize a single identity field (trim + case-fold)
    pub fn normalize(field: &str) -> String {
        field.trim().to_lowercase()
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.replace(KEY_SEPARATOR, "/"))
    }
}

/// Farmer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmerIdentity {
    /// Farmer name
    pub name: String,

    /// Phone number
    pub phone: String,

    /// Village
    pub village: String,
}

impl FarmerIdentity {
    /// Create new farmer identity
    pub fn new(name: impl Into<String>, phone: impl Into<String>, village: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            village: village.into(),
        }
    }

    /// Normalized composite key for this farmer
    pub fn key(&self) -> PartyKey {
        PartyKey::compose("farmer", &[&self.name, &self.phone, &self.village])
    }
}

/// Buyer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerIdentity {
    /// Buyer name
    pub name: String,
}

impl BuyerIdentity {
    /// Create new buyer identity
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Normalized composite key for this buyer
    pub fn key(&self) -> PartyKey {
        PartyKey::compose("buyer", &[&self.name])
    }
}

/// A party on either side of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyRef {
    /// A farmer (payer of dues on the farmer side)
    Farmer(FarmerIdentity),
    /// A buyer (payer of sale charges and surcharges)
    Buyer(BuyerIdentity),
}

impl PartyRef {
    /// Normalized composite key for this party
    pub fn key(&self) -> PartyKey {
        match self {
            PartyRef::Farmer(f) => f.key(),
            PartyRef::Buyer(b) => b.key(),
        }
    }

    /// Display name (as entered, untrimmed)
    pub fn name(&self) -> &str {
        match self {
            PartyRef::Farmer(f) => &f.name,
            PartyRef::Buyer(b) => &b.name,
        }
    }

    /// Check if this party is a farmer
    pub fn is_farmer(&self) -> bool {
        matches!(self, PartyRef::Farmer(_))
    }

    /// Reject identities whose defining name is empty after trimming
    pub fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(Error::Validation("missing party identity".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for PartyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyRef::Farmer(p) => write!(f, "farmer {}", p.name.trim()),
            PartyRef::Buyer(p) => write!(f, "buyer {}", p.name.trim()),
        }
    }
}
