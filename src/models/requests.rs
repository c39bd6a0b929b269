//! Request DTOs for the admin API
//!
//! Path parameters of incoming HTTP requests.

use serde::Deserialize;

use crate::cache::{CacheKey, KeyQualifier, NamespaceRegistry};
use crate::error::{CacheError, Result};

/// Path of `DELETE /cache/keys/:namespace/:qualifier`
///
/// # Fields
/// - `namespace`: a registered namespace name, e.g. `dict`
/// - `qualifier`: the rendered qualifier, `5`, `code:sex` or `parent:7`
#[derive(Debug, Clone, Deserialize)]
pub struct KeyPath {
    pub namespace: String,
    pub qualifier: String,
}

impl KeyPath {
    /// Resolves the path against the registry into a cache key.
    pub fn to_key(&self, registry: &NamespaceRegistry) -> Result<CacheKey> {
        let namespace = registry
            .resolve(&self.namespace)
            .ok_or_else(|| CacheError::UnknownNamespace(self.namespace.clone()))?;
        let qualifier: KeyQualifier = self.qualifier.parse()?;
        Ok(CacheKey::new(namespace, qualifier))
    }
}
