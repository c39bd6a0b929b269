//! Cache Key Module
//!
//! Composite keys made of a namespace and a qualifier.

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

// == Key Qualifier ==
/// Identifies an entity (or a derived view) within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyQualifier {
    /// Numeric primary key
    Id(i64),
    /// Business code (dict code, role code, config key)
    Code(String),
    /// Owning parent id
    Parent(i64),
}

impl fmt::Display for KeyQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyQualifier::Id(id) => write!(f, "{}", id),
            KeyQualifier::Code(code) => write!(f, "code:{}", code),
            KeyQualifier::Parent(id) => write!(f, "parent:{}", id),
        }
    }
}

impl FromStr for KeyQualifier {
    type Err = CacheError;

    /// Parses the rendered form: `5`, `code:sex` or `parent:7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(code) = s.strip_prefix("code:") {
            if code.is_empty() {
                return Err(CacheError::InvalidKey(s.to_string()));
            }
            return Ok(KeyQualifier::Code(code.to_string()));
        }
        if let Some(parent) = s.strip_prefix("parent:") {
            return parent
                .parse()
                .map(KeyQualifier::Parent)
                .map_err(|_| CacheError::InvalidKey(s.to_string()));
        }
        s.parse()
            .map(KeyQualifier::Id)
            .map_err(|_| CacheError::InvalidKey(s.to_string()))
    }
}

// == Cache Key ==
/// A namespaced cache key.
///
/// Several keys may alias the same logical entity (a dict is reachable by
/// id and by code); keeping the aliases consistent is the job of the
/// domain managers, not of the key itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: &'static str,
    qualifier: KeyQualifier,
}

impl CacheKey {
    pub fn new(namespace: &'static str, qualifier: KeyQualifier) -> Self {
        Self {
            namespace,
            qualifier,
        }
    }

    pub fn id(namespace: &'static str, id: i64) -> Self {
        Self::new(namespace, KeyQualifier::Id(id))
    }

    pub fn code(namespace: &'static str, code: impl Into<String>) -> Self {
        Self::new(namespace, KeyQualifier::Code(code.into()))
    }

    pub fn parent(namespace: &'static str, parent_id: i64) -> Self {
        Self::new(namespace, KeyQualifier::Parent(parent_id))
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn qualifier(&self) -> &KeyQualifier {
        &self.qualifier
    }

    /// Renders the storage key, `<prefix><qualifier>`.
    ///
    /// The same string is used in both tiers so the L2 keyspace can be
    /// pattern-deleted by prefix.
    pub fn render(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.qualifier)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.qualifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keys() {
        assert_eq!(CacheKey::id("dict", 5).render("dict:"), "dict:5");
        assert_eq!(CacheKey::code("dict", "sex").render("dict:"), "dict:code:sex");
        assert_eq!(CacheKey::parent("menu", 3).render("menu:"), "menu:parent:3");
    }

    #[test]
    fn test_parse_qualifier() {
        assert_eq!("42".parse::<KeyQualifier>().unwrap(), KeyQualifier::Id(42));
        assert_eq!(
            "code:sex".parse::<KeyQualifier>().unwrap(),
            KeyQualifier::Code("sex".into())
        );
        assert_eq!(
            "parent:9".parse::<KeyQualifier>().unwrap(),
            KeyQualifier::Parent(9)
        );
        assert!("code:".parse::<KeyQualifier>().is_err());
        assert!("abc".parse::<KeyQualifier>().is_err());
    }

    #[test]
    fn test_qualifier_round_trips_through_display() {
        let q = KeyQualifier::Code("user_status".into());
        assert_eq!(q.to_string().parse::<KeyQualifier>().unwrap(), q);
    }
}
