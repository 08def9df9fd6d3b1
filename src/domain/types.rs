//! Core identifier and classification types for the promo engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a normalized promo code.
pub const MAX_CODE_LEN: usize = 64;

/// Promo code identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromoCodeId(pub uuid::Uuid);

impl PromoCodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for PromoCodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PromoCodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable user identifier issued by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized promo code string.
///
/// Codes are compared after trimming, dropping inner whitespace and
/// upper-casing, so `" found 25 "` and `"FOUND25"` name the same code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromoCodeKey(String);

impl PromoCodeKey {
    /// Normalize raw user input into a lookup key.
    pub fn parse(raw: &str) -> Result<Self, InvalidValue> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect();

        if normalized.is_empty() {
            return Err(InvalidValue::new("code", "promo code must not be empty"));
        }
        if normalized.chars().count() > MAX_CODE_LEN {
            return Err(InvalidValue::new(
                "code",
                format!("promo code must be at most {MAX_CODE_LEN} characters"),
            ));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromoCodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marketplace account kind a promo code is aimed at
///
/// Deserializes through [`FromStr`], so `"Agent"` and `"fsbo"` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum UserType {
    Agent,
    Landlord,
    Owner,
    Renter,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Agent => "agent",
            UserType::Landlord => "landlord",
            UserType::Owner => "owner",
            UserType::Renter => "renter",
        }
    }

    /// Human-readable audience name used in rejection messages.
    pub fn audience(&self) -> &'static str {
        match self {
            UserType::Agent => "Real Estate Agents",
            UserType::Landlord => "Landlords",
            UserType::Owner => "Property Owners",
            UserType::Renter => "Renters",
        }
    }
}

impl FromStr for UserType {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(UserType::Agent),
            "landlord" => Ok(UserType::Landlord),
            "owner" | "fsbo" => Ok(UserType::Owner),
            "renter" => Ok(UserType::Renter),
            other => Err(InvalidValue::new(
                "user_type",
                format!("unknown user type: {other:?}"),
            )),
        }
    }
}

impl TryFrom<String> for UserType {
    type Error = InvalidValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO-3166 alpha-2 country code, always upper-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(raw: &str) -> Result<Self, InvalidValue> {
        let trimmed = raw.trim();
        if trimmed.len() != 2 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(InvalidValue::new(
                "country",
                format!("country must be a two-letter ISO code, got {raw:?}"),
            ));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CountryCode {
    type Error = InvalidValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription state written onto the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Inactive,
    Trial,
    Active,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            other => Err(InvalidValue::new(
                "subscription_status",
                format!("unknown subscription status: {other:?}"),
            )),
        }
    }
}

/// A field value that failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub field: &'static str,
    pub message: String,
}

impl InvalidValue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InvalidValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_normalization() {
        let key = PromoCodeKey::parse("  found 25\t").unwrap();
        assert_eq!(key.as_str(), "FOUND25");
        assert_eq!(PromoCodeKey::parse("Found25").unwrap(), key);
    }

    #[test]
    fn test_code_rejects_empty_and_long() {
        assert!(PromoCodeKey::parse("   ").is_err());
        assert!(PromoCodeKey::parse(&"A".repeat(MAX_CODE_LEN + 1)).is_err());
        assert!(PromoCodeKey::parse(&"A".repeat(MAX_CODE_LEN)).is_ok());
    }

    #[test]
    fn test_user_type_parsing() {
        assert_eq!("Agent".parse::<UserType>().unwrap(), UserType::Agent);
        assert_eq!("fsbo".parse::<UserType>().unwrap(), UserType::Owner);
        assert!("broker".parse::<UserType>().is_err());
        assert_eq!(UserType::Agent.audience(), "Real Estate Agents");
    }

    #[test]
    fn test_user_type_serde_accepts_parse_forms() {
        for (raw, expected) in [
            ("\"agent\"", UserType::Agent),
            ("\"Agent\"", UserType::Agent),
            ("\"LANDLORD\"", UserType::Landlord),
            ("\"fsbo\"", UserType::Owner),
        ] {
            assert_eq!(serde_json::from_str::<UserType>(raw).unwrap(), expected);
        }
        assert!(serde_json::from_str::<UserType>("\"broker\"").is_err());
        assert_eq!(serde_json::to_string(&UserType::Owner).unwrap(), "\"owner\"");
    }

    #[test]
    fn test_country_code() {
        assert_eq!(CountryCode::parse(" gy ").unwrap().as_str(), "GY");
        assert!(CountryCode::parse("GUY").is_err());
        assert!(CountryCode::parse("G1").is_err());

        let json = serde_json::to_string(&CountryCode::parse("tt").unwrap()).unwrap();
        assert_eq!(json, "\"TT\"");
        assert!(serde_json::from_str::<CountryCode>("\"xyz\"").is_err());
    }
}
