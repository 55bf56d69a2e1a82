//! Element catalog: domain code token → section and friendly name
//!
//! Loaded once per process from a JSON array of entries and queried for
//! every issue the reconciler decodes.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SubmitError, SubmitResult};

/// One catalog row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Domain code token as it appears in messages, e.g. `iA9`
    pub token: String,
    /// Single-letter section identifier
    pub section: String,
    pub display_code: String,
    pub display_name: String,
}

/// Static lookup table. Keys are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ElementCatalog {
    entries: Vec<CatalogEntry>,
    by_token: HashMap<String, usize>,
    by_display_code: HashMap<String, usize>,
}

impl ElementCatalog {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut by_token = HashMap::with_capacity(entries.len());
        let mut by_display_code = HashMap::with_capacity(entries.len());

        for (idx, entry) in entries.iter().enumerate() {
            let token = entry.token.trim().to_lowercase();
            if !token.is_empty() {
                by_token.insert(token, idx);
            }
            let code = entry.display_code.trim().to_lowercase();
            if !code.is_empty() {
                by_display_code.entry(code).or_insert(idx);
            }
        }

        Self {
            entries,
            by_token,
            by_display_code,
        }
    }

    pub fn from_json_str(json: &str) -> SubmitResult<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    /// Load the catalog from a JSON file
    pub fn load(path: &Path) -> SubmitResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SubmitError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), entries = catalog.len(), "Element catalog loaded");
        Ok(catalog)
    }

    /// Resolve a domain code token
    pub fn resolve(&self, token: &str) -> Option<&CatalogEntry> {
        let key = token.trim().to_lowercase();
        self.by_token.get(&key).map(|&idx| &self.entries[idx])
    }

    /// Resolve a non-domain business code through the display-code index
    pub fn resolve_business_code(&self, code: &str) -> Option<&CatalogEntry> {
        let key = code.trim().to_lowercase();
        self.by_display_code
            .get(&key)
            .map(|&idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
