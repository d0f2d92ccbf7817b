//! Bidirectional mapping between public Gemini-style model ids and the
//! backend's model ids.
//!
//! The map is built once at startup from a fixed table plus any extra pairs
//! from the config file, and must remain a bijection: every public id maps to
//! exactly one backend id and back. Unknown ids on either side are errors for
//! the callers, never silently passed through.

use crate::error::{ProxyError, Result};
use std::collections::HashMap;

/// Built-in pairs of (public model id, backend model id).
const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("gemma-3-1b-it", "gemma3:1b"),
    ("gemma-3-4b-it", "gemma3:4b"),
    ("gemma-3-12b-it", "gemma3:12b"),
    ("gemma-3-27b-it", "gemma3:27b"),
];

/// Immutable bidirectional model-name lookup table.
#[derive(Debug, Clone)]
pub struct ModelMap {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl ModelMap {
    /// Build the map from the builtin table plus extra pairs from config.
    ///
    /// # Errors
    /// Returns `ProxyError::Config` if any public or backend id appears twice,
    /// since that would break the reverse lookup.
    pub fn new<'a>(extra: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut map = Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        };
        for &(public, backend) in BUILTIN_MODELS {
            map.insert(public, backend)?;
        }
        for (public, backend) in extra {
            map.insert(public, backend)?;
        }
        Ok(map)
    }

    fn insert(&mut self, public: &str, backend: &str) -> Result<()> {
        if self
            .forward
            .insert(public.to_string(), backend.to_string())
            .is_some()
        {
            return Err(ProxyError::config(format!(
                "Duplicate model mapping for public id '{public}'"
            )));
        }
        if self
            .reverse
            .insert(backend.to_string(), public.to_string())
            .is_some()
        {
            return Err(ProxyError::config(format!(
                "Duplicate model mapping for backend id '{backend}'"
            )));
        }
        Ok(())
    }

    /// Only the builtin table, no config extras.
    pub fn builtin() -> Self {
        Self::new(std::iter::empty()).expect("builtin model table is a bijection")
    }

    /// Resolve a public model id to the backend's id.
    #[must_use]
    pub fn to_backend(&self, public: &str) -> Option<&str> {
        self.forward.get(public).map(String::as_str)
    }

    /// Resolve a backend model id back to the public id.
    #[must_use]
    pub fn to_public(&self, backend: &str) -> Option<&str> {
        self.reverse.get(backend).map(String::as_str)
    }

    /// All public model ids, for the model-listing endpoint.
    pub fn public_ids(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }
}
