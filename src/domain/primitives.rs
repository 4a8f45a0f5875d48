//! Domain primitives: GainId, AttemptId, CardType, CountryCode.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use thiserror::Error;

/// Stable opaque account key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GainId(String);

impl GainId {
    /// Create a GainId from a string.
    pub fn new(id: String) -> Self {
        GainId(id)
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("account id must not be empty")]
pub struct GainIdParseError;

impl FromStr for GainId {
    type Err = GainIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(GainIdParseError);
        }
        Ok(GainId(trimmed.to_string()))
    }
}

/// Identifier of one logical withdrawal attempt.
///
/// Derived from the client's request id when one is supplied, so that a
/// redelivered request maps onto the same attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    /// Deterministic attempt id for a client-supplied request id.
    pub fn derive(account: &GainId, request_id: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(account.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(request_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        AttemptId(digest[..32].to_string())
    }

    /// Fresh random attempt id.
    pub fn generate() -> Self {
        AttemptId(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Rebuild an attempt id loaded from storage.
    pub fn from_stored(id: String) -> Self {
        AttemptId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gift card services that can be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    Fortnite,
    Visa,
    Amazon,
    Steam,
    Roblox,
}

impl CardType {
    pub const ALL: [CardType; 5] = [
        CardType::Fortnite,
        CardType::Visa,
        CardType::Amazon,
        CardType::Steam,
        CardType::Roblox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Fortnite => "Fortnite",
            CardType::Visa => "Visa",
            CardType::Amazon => "Amazon",
            CardType::Steam => "Steam",
            CardType::Roblox => "Roblox",
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported value: {0}")]
pub struct UnsupportedValue(pub String);

impl FromStr for CardType {
    type Err = UnsupportedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CardType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnsupportedValue(s.to_string()))
    }
}

/// Card region. `WW` (worldwide) is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CountryCode {
    US,
    UK,
    CA,
    DE,
    FR,
    AU,
    #[default]
    WW,
}

impl CountryCode {
    pub const ALL: [CountryCode; 7] = [
        CountryCode::US,
        CountryCode::UK,
        CountryCode::CA,
        CountryCode::DE,
        CountryCode::FR,
        CountryCode::AU,
        CountryCode::WW,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CountryCode::US => "US",
            CountryCode::UK => "UK",
            CountryCode::CA => "CA",
            CountryCode::DE => "DE",
            CountryCode::FR => "FR",
            CountryCode::AU => "AU",
            CountryCode::WW => "WW",
        }
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountryCode {
    type Err = UnsupportedValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CountryCode::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnsupportedValue(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gainid_rejects_blank() {
        assert!(GainId::from_str("   ").is_err());
        assert_eq!(GainId::from_str(" abc ").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_card_type_is_case_sensitive() {
        assert_eq!(CardType::from_str("Steam").unwrap(), CardType::Steam);
        assert!(CardType::from_str("steam").is_err());
        assert!(CardType::from_str("Paypal").is_err());
    }

    #[test]
    fn test_country_code_parse_and_default() {
        assert_eq!(CountryCode::from_str("UK").unwrap(), CountryCode::UK);
        assert!(CountryCode::from_str("Uk").is_err());
        assert_eq!(CountryCode::default(), CountryCode::WW);
    }

    #[test]
    fn test_attempt_id_derivation_is_stable_per_account() {
        let a = GainId::new("user-a".to_string());
        let b = GainId::new("user-b".to_string());

        let first = AttemptId::derive(&a, "req-1");
        assert_eq!(first, AttemptId::derive(&a, "req-1"));
        assert_ne!(first, AttemptId::derive(&b, "req-1"));
        assert_eq!(first.as_str().len(), 32);
    }

    #[test]
    fn test_generated_attempt_ids_differ() {
        assert_ne!(AttemptId::generate(), AttemptId::generate());
    }

    #[test]
    fn test_card_type_serialization() {
        let json = serde_json::to_string(&CardType::Roblox).unwrap();
        assert_eq!(json, "\"Roblox\"");
    }
}
