use moka::sync::Cache;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::MatchError;
use crate::models::{ConfidenceTier, FieldMapping, MappingStats, SourceMapping, UnifiedField};

const BUILTIN_VARIATIONS: &str = include_str!("../data/field_variations.json");

pub const CANONICAL_CONFIDENCE: f64 = 1.0;
pub const EXACT_VARIATION_CONFIDENCE: f64 = 0.9;
pub const PARTIAL_VARIATION_CONFIDENCE: f64 = 0.7;

// Shortest variation allowed to match inside a longer column name.
const MIN_CONTAINED_VARIATION: usize = 3;
// Shortest column allowed to match inside a longer variation.
const MIN_CONTAINED_COLUMN: usize = 5;

const CUSTOMER_HINTS: [&str; 3] = ["customer", "client", "user"];
const SPLIT_NAME_HINTS: [&str; 4] = ["first", "last", "given", "family"];
const BIRTH_HINTS: [&str; 3] = ["birth", "born", "dob"];

#[derive(Debug, Deserialize)]
struct VariationEntry {
    field: UnifiedField,
    variations: Vec<String>,
}

/// Known column spellings per unified field, in priority order.
#[derive(Debug, Clone, Default)]
pub struct FieldVariations {
    entries: Vec<(UnifiedField, Vec<String>)>,
}

impl FieldVariations {
    /// Table loaded from the bundled `data/field_variations.json`.
    pub fn builtin() -> Self {
        Self::parse_or_empty(BUILTIN_VARIATIONS)
    }

    /// An unreadable table leaves only the exact field-name and contextual rules.
    fn parse_or_empty(raw: &str) -> Self {
        match Self::from_json(raw) {
            Ok(variations) => variations,
            Err(e) => {
                tracing::error!("Field variation table is invalid, continuing without it: {}", e);
                Self::default()
            }
        }
    }

    /// Parse a `[{"field": ..., "variations": [...]}, ...]` document.
    pub fn from_json(raw: &str) -> Result<Self, MatchError> {
        let parsed: Vec<VariationEntry> = serde_json::from_str(raw)
            .map_err(|e| MatchError::MappingLoad(format!("field variations: {}", e)))?;

        let mut table = Self::default();
        for entry in parsed {
            table.extend(entry.field, entry.variations);
        }
        Ok(table)
    }

    /// Add spellings for `field`. New fields go to the end of the priority order.
    pub fn extend<I, S>(&mut self, field: UnifiedField, variations: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let position = match self.entries.iter().position(|(f, _)| *f == field) {
            Some(position) => position,
            None => {
                self.entries.push((field, Vec::new()));
                self.entries.len() - 1
            }
        };
        let known = &mut self.entries[position].1;
        for variation in variations {
            let variation = variation.as_ref().trim().to_lowercase();
            if !variation.is_empty() && !known.contains(&variation) {
                known.push(variation);
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &UnifiedField> {
        self.entries.iter().map(|(field, _)| field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&UnifiedField, &[String])> {
        self.entries.iter().map(|(f, v)| (f, v.as_slice()))
    }
}

/// Order-independent fingerprint of a column set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaHash(String);

impl SchemaHash {
    /// SHA-256 (hex) of the sorted column names joined with `|`.
    pub fn of<S: AsRef<str>>(columns: &[S]) -> Self {
        let mut sorted: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(sorted.join("|").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Bounded cache of generated mappings keyed by column set.
pub struct MappingCache {
    inner: Cache<SchemaHash, SourceMapping>,
    hits: AtomicU64,
}

impl MappingCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder().max_capacity(capacity).build(),
            hits: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &SchemaHash) -> Option<SourceMapping> {
        let found = self.inner.get(key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, key: SchemaHash, mapping: SourceMapping) {
        self.inner.insert(key, mapping);
    }

    /// Number of lookups served from the cache so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

impl std::fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingCache")
            .field("entries", &self.inner.entry_count())
            .field("hits", &self.hits())
            .finish()
    }
}

/// Rule-based column → unified field mapper.
///
/// A column is tried, in order, against the canonical field names, the exact
/// known spellings, spellings contained in (or containing) the column, and
/// finally the generic `id` / `name` / `date` tokens, which only map when
/// the sibling columns support the reading.
#[derive(Debug)]
pub struct SchemaMapper {
    variations: FieldVariations,
    cache: MappingCache,
}

impl Default for SchemaMapper {
    fn default() -> Self {
        Self::new(FieldVariations::builtin(), MappingCache::new(100))
    }
}

impl SchemaMapper {
    pub fn new(variations: FieldVariations, cache: MappingCache) -> Self {
        Self { variations, cache }
    }

    pub fn cache(&self) -> &MappingCache {
        &self.cache
    }

    /// Map one column of a source whose full column list is `siblings`.
    pub fn map_column<S: AsRef<str>>(&self, column: &str, siblings: &[S]) -> Option<FieldMapping> {
        let lowered = column.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }

        if let Some(field) = self.variations.fields().find(|f| f.as_str() == lowered) {
            return Some(FieldMapping::new(field.clone(), CANONICAL_CONFIDENCE));
        }

        for (field, variations) in self.variations.iter() {
            if variations.iter().any(|v| *v == lowered) {
                return Some(FieldMapping::new(field.clone(), EXACT_VARIATION_CONFIDENCE));
            }
        }

        if let Some(field) = self.partial_match(&lowered) {
            return Some(FieldMapping::new(field, PARTIAL_VARIATION_CONFIDENCE));
        }

        contextual_match(&lowered, siblings)
    }

    fn partial_match(&self, lowered: &str) -> Option<UnifiedField> {
        // Longest spelling found inside the column wins; ties keep priority order.
        let mut best: Option<(&UnifiedField, usize)> = None;
        for (field, variations) in self.variations.iter() {
            let spellings = variations.iter().map(String::as_str).chain([field.as_str()]);
            for spelling in spellings {
                if spelling.len() >= MIN_CONTAINED_VARIATION
                    && lowered.contains(spelling)
                    && best.map_or(true, |(_, len)| spelling.len() > len)
                {
                    best = Some((field, spelling.len()));
                }
            }
        }
        if let Some((field, _)) = best {
            return Some(field.clone());
        }

        if lowered.len() < MIN_CONTAINED_COLUMN {
            return None;
        }
        self.variations
            .iter()
            .find(|(_, variations)| variations.iter().any(|v| v.contains(lowered)))
            .map(|(field, _)| field.clone())
    }

    /// Build the mapping for a source, reusing a cached one for the same column set.
    pub fn generate_mapping<S: AsRef<str>>(&self, source_name: &str, columns: &[S]) -> SourceMapping {
        let key = SchemaHash::of(columns);
        if let Some(mut cached) = self.cache.get(&key) {
            tracing::debug!("Mapping cache hit for {} ({})", source_name, key.as_str());
            cached.source_name = source_name.to_string();
            return cached;
        }

        let mut mapping = SourceMapping::new(source_name);
        for column in columns {
            let column = column.as_ref();
            match self.map_column(column, columns) {
                Some(field_mapping) => {
                    mapping.mappings.insert(column.to_string(), field_mapping);
                }
                None => mapping.unmapped_fields.push(column.to_string()),
            }
        }
        mapping.mapping_stats = mapping_stats(&mapping, columns.len());

        tracing::info!(
            "Mapped {}/{} columns for {} (high: {}, medium: {}, low: {})",
            mapping.mapping_stats.mapped_fields,
            mapping.mapping_stats.total_fields,
            source_name,
            mapping.mapping_stats.high_confidence,
            mapping.mapping_stats.medium_confidence,
            mapping.mapping_stats.low_confidence
        );
        if !mapping.unmapped_fields.is_empty() {
            tracing::debug!("Unmapped columns for {}: {:?}", source_name, mapping.unmapped_fields);
        }

        self.cache.insert(key, mapping.clone());
        mapping
    }
}

fn contextual_match<S: AsRef<str>>(lowered: &str, siblings: &[S]) -> Option<FieldMapping> {
    let has_token = |token: &str| {
        lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|t| t == token)
    };
    let others: Vec<String> = siblings
        .iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .filter(|c| c != lowered)
        .collect();
    let others_mention = |hints: &[&str]| others.iter().any(|c| hints.iter().any(|h| c.contains(h)));

    if has_token("id") && others_mention(&CUSTOMER_HINTS[..]) {
        Some(FieldMapping::new(UnifiedField::CustomerId, 0.6))
    } else if has_token("name") && !others_mention(&SPLIT_NAME_HINTS[..]) {
        Some(FieldMapping::new(UnifiedField::FullName, 0.6))
    } else if has_token("date") && others_mention(&BIRTH_HINTS[..]) {
        Some(FieldMapping::new(UnifiedField::Dob, 0.5))
    } else {
        None
    }
}

fn mapping_stats(mapping: &SourceMapping, total_fields: usize) -> MappingStats {
    let mut stats = MappingStats {
        total_fields,
        mapped_fields: mapping.mappings.len(),
        ..Default::default()
    };
    for field_mapping in mapping.mappings.values() {
        match ConfidenceTier::from_confidence(field_mapping.confidence) {
            ConfidenceTier::High => stats.high_confidence += 1,
            ConfidenceTier::Medium => stats.medium_confidence += 1,
            ConfidenceTier::Low => stats.low_confidence += 1,
        }
    }
    if total_fields > 0 {
        stats.success_rate = stats.mapped_fields as f64 / total_fields as f64;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(mapper: &SchemaMapper, column: &str) -> Option<(UnifiedField, f64)> {
        mapped_among(mapper, column, &[column])
    }

    fn mapped_among(mapper: &SchemaMapper, column: &str, siblings: &[&str]) -> Option<(UnifiedField, f64)> {
        mapper
            .map_column(column, siblings)
            .map(|m| (m.unified_field, m.confidence))
    }

    #[test]
    fn test_builtin_variations_parse() {
        let variations = FieldVariations::from_json(BUILTIN_VARIATIONS).unwrap();
        assert_eq!(variations.len(), 12);
        assert_eq!(variations.fields().next(), Some(&UnifiedField::CustomerId));
    }

    #[test]
    fn test_unreadable_variations_fall_back_to_empty() {
        let variations = FieldVariations::parse_or_empty("[{\"field\": \"email\"}");
        assert_eq!(variations.len(), 0);

        assert_eq!(FieldVariations::parse_or_empty(BUILTIN_VARIATIONS).len(), 12);
    }

    #[test]
    fn test_confidence_levels() {
        let mapper = SchemaMapper::default();

        assert_eq!(mapped(&mapper, "National_ID"), Some((UnifiedField::NationalId, 1.0)));
        assert_eq!(mapped(&mapper, "ssn"), Some((UnifiedField::NationalId, 0.9)));
        assert_eq!(mapped(&mapper, "client_email_address"), Some((UnifiedField::Email, 0.7)));
        assert_eq!(mapped(&mapper, "favourite_colour"), None);
    }

    #[test]
    fn test_contextual_rules_need_supporting_columns() {
        let mapper = SchemaMapper::default();

        assert_eq!(mapped(&mapper, "name"), Some((UnifiedField::FullName, 0.6)));
        assert_eq!(mapped_among(&mapper, "name", &["name", "first_nm"]), None);

        assert_eq!(mapped(&mapper, "account_id"), None);
        assert_eq!(
            mapped_among(&mapper, "account_id", &["account_id", "client_ref"]),
            Some((UnifiedField::CustomerId, 0.6))
        );

        assert_eq!(mapped(&mapper, "date"), None);
        assert_eq!(
            mapped_among(&mapper, "date", &["date", "place_born"]),
            Some((UnifiedField::Dob, 0.5))
        );
    }

    #[test]
    fn test_longest_contained_spelling_wins() {
        let mapper = SchemaMapper::default();
        // "email" beats the shorter customer "id"
        assert_eq!(mapped(&mapper, "email_id"), Some((UnifiedField::Email, 0.7)));
        // column contained in a longer spelling
        assert_eq!(mapped(&mapper, "mobile"), Some((UnifiedField::Phone, 0.7)));
    }

    #[test]
    fn test_generate_mapping_stats() {
        let mapper = SchemaMapper::default();
        let columns = ["customer_name", "birth_date", "colour", "notes"];
        let mapping = mapper.generate_mapping("crm", &columns);

        assert_eq!(mapping.source_name, "crm");
        assert_eq!(mapping.mapping_stats.total_fields, 4);
        assert_eq!(mapping.mapping_stats.mapped_fields, 2);
        assert_eq!(mapping.mapping_stats.high_confidence, 2);
        assert_eq!(mapping.mapping_stats.success_rate, 0.5);
        assert_eq!(mapping.unmapped_fields, vec!["colour", "notes"]);
        assert_eq!(
            mapping.mappings["birth_date"].mapping_type,
            Some(ConfidenceTier::High)
        );
    }

    #[test]
    fn test_schema_hash_ignores_column_order() {
        assert_eq!(SchemaHash::of(&["a", "b"]), SchemaHash::of(&["b", "a"]));
        assert_ne!(SchemaHash::of(&["a", "b"]), SchemaHash::of(&["a", "c"]));
        assert_eq!(SchemaHash::of(&["a"]).as_str().len(), 64);
    }

    #[test]
    fn test_cache_reused_for_same_column_set() {
        let mapper = SchemaMapper::new(FieldVariations::builtin(), MappingCache::new(10));

        let first = mapper.generate_mapping("crm", &["ssn", "fullname"]);
        assert_eq!(mapper.cache().hits(), 0);

        let second = mapper.generate_mapping("erp", &["fullname", "ssn"]);
        assert_eq!(mapper.cache().hits(), 1);
        assert_eq!(second.source_name, "erp");
        assert_eq!(second.mappings, first.mappings);
    }

    #[test]
    fn test_runtime_extension() {
        let mut variations = FieldVariations::builtin();
        variations.extend(UnifiedField::NationalId, ["cpf"]);
        let mapper = SchemaMapper::new(variations, MappingCache::new(10));

        assert_eq!(mapped(&mapper, "CPF"), Some((UnifiedField::NationalId, 0.9)));
    }
}
