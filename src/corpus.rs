use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::MatchError;
use crate::models::{Record, SourceMapping};
use crate::schema_mapper::SchemaMapper;

/// Records of one source plus its column mapping, if one was supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceData {
    pub records: Vec<Record>,
    pub mapping: Option<SourceMapping>,
}

impl SourceData {
    /// Union of column names over all records, sorted.
    pub fn columns(&self) -> Vec<String> {
        self.records
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Inventory entry describing one loaded source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub record_count: usize,
    pub columns: Vec<String>,
    pub mapped_columns: usize,
    pub mapping_confidence: f64,
}

/// Immutable snapshot of all loaded sources, ordered by source name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    sources: BTreeMap<String, SourceData>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a source.
    pub fn insert_source(
        &mut self,
        name: impl Into<String>,
        records: Vec<Record>,
        mapping: Option<SourceMapping>,
    ) {
        self.sources
            .insert(name.into(), SourceData { records, mapping });
    }

    pub fn with_source(
        mut self,
        name: impl Into<String>,
        records: Vec<Record>,
        mapping: Option<SourceMapping>,
    ) -> Self {
        self.insert_source(name, records, mapping);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SourceData> {
        self.sources.get(name)
    }

    pub fn sources(&self) -> impl Iterator<Item = (&String, &SourceData)> {
        self.sources.iter()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn record_count(&self) -> usize {
        self.sources.values().map(|s| s.records.len()).sum()
    }

    /// True when there is nothing to search: no sources, or no records in any.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Generate mappings for sources loaded without one. Returns how many were filled.
    pub fn infer_missing_mappings(&mut self, mapper: &SchemaMapper) -> usize {
        let mut filled = 0;
        for (name, data) in self.sources.iter_mut() {
            if data.mapping.is_some() {
                continue;
            }
            let columns = data.columns();
            if columns.is_empty() {
                continue;
            }
            data.mapping = Some(mapper.generate_mapping(name, &columns));
            filled += 1;
        }
        if filled > 0 {
            tracing::info!("Inferred schema mappings for {} source(s)", filled);
        }
        filled
    }

    pub fn describe(&self) -> Vec<SourceInfo> {
        self.sources
            .iter()
            .map(|(name, data)| SourceInfo {
                name: name.clone(),
                record_count: data.records.len(),
                columns: data.columns(),
                mapped_columns: data.mapping.as_ref().map_or(0, |m| m.mappings.len()),
                mapping_confidence: data
                    .mapping
                    .as_ref()
                    .map_or(0.0, SourceMapping::average_confidence),
            })
            .collect()
    }
}

/// Supplier of the corpus for a search (file loaders, databases, fixtures).
pub trait CorpusSource: Send + Sync {
    /// Load the current snapshot. Failures are reported, never replaced by an empty corpus.
    fn load(&self) -> Result<Corpus, MatchError>;
}

/// Corpus already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    corpus: Corpus,
}

impl InMemoryCorpus {
    pub fn new(corpus: Corpus) -> Self {
        Self { corpus }
    }
}

impl CorpusSource for InMemoryCorpus {
    fn load(&self) -> Result<Corpus, MatchError> {
        Ok(self.corpus.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnifiedField;
    use serde_json::json;

    fn rows(values: Vec<serde_json::Value>) -> Vec<Record> {
        values
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect()
    }

    #[test]
    fn test_empty_sources_count_as_no_data() {
        let corpus = Corpus::new().with_source("crm", Vec::new(), None);
        assert_eq!(corpus.source_count(), 1);
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_infer_missing_mappings_keeps_supplied_ones() {
        let supplied = SourceMapping::new("bank").with("holder", UnifiedField::FullName, 0.9);
        let mut corpus = Corpus::new()
            .with_source(
                "bank",
                rows(vec![json!({"holder": "Jane Roe"})]),
                Some(supplied.clone()),
            )
            .with_source(
                "crm",
                rows(vec![json!({"customer_name": "Jane Roe", "birth_date": "1990-01-01"})]),
                None,
            );

        let filled = corpus.infer_missing_mappings(&SchemaMapper::default());

        assert_eq!(filled, 1);
        assert_eq!(corpus.get("bank").unwrap().mapping, Some(supplied));
        let crm = corpus.get("crm").unwrap().mapping.as_ref().unwrap();
        assert_eq!(crm.columns_for(&UnifiedField::Dob), vec!["birth_date"]);
    }

    #[test]
    fn test_describe_lists_columns() {
        let corpus = Corpus::new().with_source(
            "crm",
            rows(vec![json!({"a": 1}), json!({"b": 2})]),
            None,
        );
        let info = corpus.describe();

        assert_eq!(info[0].record_count, 2);
        assert_eq!(info[0].columns, vec!["a".to_string(), "b".to_string()]);
    }
}
