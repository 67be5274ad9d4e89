//! CAIP-2 chain identifiers.
//!
//! A CAIP-2 id is `{namespace}:{reference}` (e.g. `eip155:8453`, `solana:<genesis>`).
//! [`ChainIdPattern`] additionally supports the `eip155:*` wildcard form used by the
//! scheme registry's matching rules.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    pub namespace: String,
    pub reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid chain id format: {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or_else(|| ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(ChainId {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}

/// A pattern over chain ids used by the scheme registry (`spec.md` §4.A matching rules).
///
/// Exact patterns win over wildcard patterns when both would match the same chain id.
#[derive(Debug, Clone)]
pub enum ChainIdPattern {
    Wildcard { namespace: String },
    Exact { namespace: String, reference: String },
}

impl ChainIdPattern {
    pub fn wildcard<S: Into<String>>(namespace: S) -> Self {
        Self::Wildcard {
            namespace: namespace.into(),
        }
    }

    pub fn exact<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self::Exact {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn matches(&self, chain_id: &ChainId) -> bool {
        match self {
            ChainIdPattern::Wildcard { namespace } => chain_id.namespace == *namespace,
            ChainIdPattern::Exact { namespace, reference } => {
                chain_id.namespace == *namespace && chain_id.reference == *reference
            }
        }
    }

    /// Specificity used to break ties when more than one pattern matches: exact beats
    /// wildcard.
    pub fn specificity(&self) -> u8 {
        match self {
            ChainIdPattern::Wildcard { .. } => 0,
            ChainIdPattern::Exact { .. } => 1,
        }
    }
}

impl fmt::Display for ChainIdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainIdPattern::Wildcard { namespace } => write!(f, "{namespace}:*"),
            ChainIdPattern::Exact { namespace, reference } => write!(f, "{namespace}:{reference}"),
        }
    }
}

impl From<ChainId> for ChainIdPattern {
    fn from(chain_id: ChainId) -> Self {
        ChainIdPattern::exact(chain_id.namespace, chain_id.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let id = ChainId::new("eip155", "8453");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"eip155:8453\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn wildcard_matches_any_reference_in_namespace() {
        let pattern = ChainIdPattern::wildcard("eip155");
        assert!(pattern.matches(&ChainId::new("eip155", "1")));
        assert!(pattern.matches(&ChainId::new("eip155", "8453")));
        assert!(!pattern.matches(&ChainId::new("solana", "mainnet")));
    }

    #[test]
    fn exact_pattern_is_more_specific_than_wildcard() {
        let exact = ChainIdPattern::exact("eip155", "8453");
        let wildcard = ChainIdPattern::wildcard("eip155");
        assert!(exact.specificity() > wildcard.specificity());
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(ChainId::from_str("nocolon").is_err());
        assert!(ChainId::from_str("eip155:").is_err());
        assert!(ChainId::from_str(":8453").is_err());
    }
}
