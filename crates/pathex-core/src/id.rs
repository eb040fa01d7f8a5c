use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_ID_LEN: usize = 128;

/// Identifier of a knowledge-graph entity.
///
/// Both stable identifiers (`R-HSA-109581`, optionally versioned as `R-HSA-109581.3`) and
/// numeric database ids (`109581`) are accepted. Identifiers become cache filenames, so the
/// accepted alphabet is restricted to ASCII alphanumerics plus `-`, `_` and `.`, and a leading
/// `.` is rejected.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityId {
    Stable(String),
    Numeric(u64),
}

impl EntityId {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let value = raw.trim();
        let invalid = |reason| ParseError::InvalidId {
            value: value.to_string(),
            reason,
        };

        if value.is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if value.len() > MAX_ID_LEN {
            return Err(invalid("identifier is too long"));
        }
        if value.starts_with('.') {
            return Err(invalid("identifier may not start with '.'"));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        {
            return Err(invalid("identifier contains unsupported characters"));
        }

        if value.bytes().all(|b| b.is_ascii_digit()) {
            return value
                .parse::<u64>()
                .map(EntityId::Numeric)
                .map_err(|_| invalid("numeric identifier is out of range"));
        }

        Ok(EntityId::Stable(value.to_string()))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Stable(id) => f.write_str(id),
            EntityId::Numeric(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for EntityId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_parse_as_numeric_ids() {
        assert_eq!(EntityId::parse("109581").unwrap(), EntityId::Numeric(109581));
        assert_eq!(
            EntityId::parse(" R-HSA-109581.3 ").unwrap(),
            EntityId::Stable("R-HSA-109581.3".to_string())
        );
    }

    #[test]
    fn path_like_identifiers_are_rejected() {
        for raw in ["", "..", ".hidden", "R-HSA/1", "a b", "R-HSA-1%2F", "\u{e9}"] {
            assert!(EntityId::parse(raw).is_err(), "{raw:?} should be rejected");
        }
        assert!(EntityId::parse(&"9".repeat(40)).is_err());
    }

    #[test]
    fn serde_uses_the_display_form() {
        let id: EntityId = serde_json::from_str("\"R-HSA-1\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"R-HSA-1\"");
        assert!(serde_json::from_str::<EntityId>("\"../x\"").is_err());
    }
}
