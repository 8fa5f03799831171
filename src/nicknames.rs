use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::MatchError;

const BUILTIN_NICKNAMES: &str = include_str!("../data/nicknames.json");

/// Lookup table of given-name variants: canonical form → known nicknames.
///
/// Two names are variants of each other when one is the canonical form of
/// the other, or both belong to the same canonical group.
#[derive(Debug, Clone, Default)]
pub struct NicknameTable {
    groups: BTreeMap<String, BTreeSet<String>>,
    // name → canonical forms it belongs to (a nickname may serve several)
    index: HashMap<String, BTreeSet<String>>,
}

impl NicknameTable {
    /// Table loaded from the bundled `data/nicknames.json`.
    pub fn builtin() -> Self {
        Self::parse_or_empty(BUILTIN_NICKNAMES)
    }

    /// An unreadable table disables nickname matching rather than the scorer.
    fn parse_or_empty(raw: &str) -> Self {
        match Self::from_json(raw) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!("Nickname table is invalid, continuing without nicknames: {}", e);
                Self::default()
            }
        }
    }

    /// Parse a `{"canonical": ["variant", ...]}` document.
    pub fn from_json(raw: &str) -> Result<Self, MatchError> {
        let parsed: BTreeMap<String, Vec<String>> = serde_json::from_str(raw)
            .map_err(|e| MatchError::MappingLoad(format!("nickname table: {}", e)))?;

        let mut table = Self::default();
        for (canonical, variants) in parsed {
            table.extend(&canonical, variants);
        }
        Ok(table)
    }

    /// Add variants for `canonical`, creating the group if needed.
    pub fn extend<I, S>(&mut self, canonical: &str, variants: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let canonical = canonical.trim().to_lowercase();
        if canonical.is_empty() {
            return;
        }

        self.index
            .entry(canonical.clone())
            .or_default()
            .insert(canonical.clone());
        let group = self.groups.entry(canonical.clone()).or_default();
        for variant in variants {
            let variant = variant.as_ref().trim().to_lowercase();
            if variant.is_empty() || variant == canonical {
                continue;
            }
            group.insert(variant.clone());
            self.index
                .entry(variant)
                .or_default()
                .insert(canonical.clone());
        }
    }

    /// True when `a` and `b` are distinct forms of the same given name.
    pub fn are_variants(&self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        match (self.index.get(a), self.index.get(b)) {
            (Some(groups_a), Some(groups_b)) => !groups_a.is_disjoint(groups_b),
            _ => false,
        }
    }

    /// Variants listed for a canonical form.
    pub fn variants_of(&self, canonical: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(canonical)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
