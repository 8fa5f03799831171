use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::corpus::CorpusSource;
use crate::errors::{MatchError, ResultExt};
use crate::models::{Query, SearchOutcome};
use crate::profile_store::ProfileStore;
use crate::schema_mapper::{FieldVariations, MappingCache, SchemaMapper};
use crate::search::SearchEngine;

/// Answer to one profile lookup.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileLookup {
    #[serde(flatten)]
    pub outcome: SearchOutcome,
    /// Where the merged profile was written, when it was.
    pub saved_to: Option<PathBuf>,
}

/// Orchestrates a lookup: load, map, search, persist.
pub struct ProfileService<S: CorpusSource> {
    config: Config,
    source: S,
    mapper: SchemaMapper,
    engine: Arc<SearchEngine>,
    store: ProfileStore,
}

impl<S: CorpusSource> ProfileService<S> {
    pub fn new(config: Config, source: S) -> Self {
        let mapper = SchemaMapper::new(
            FieldVariations::builtin(),
            MappingCache::new(config.mapping_cache_capacity),
        );
        Self::with_parts(config, source, mapper, SearchEngine::default())
    }

    pub fn with_parts(config: Config, source: S, mapper: SchemaMapper, engine: SearchEngine) -> Self {
        let store = ProfileStore::new(config.profiles_dir.clone());
        Self {
            config,
            source,
            mapper,
            engine: Arc::new(engine),
            store,
        }
    }

    pub fn mapper(&self) -> &SchemaMapper {
        &self.mapper
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub async fn find_profile(&self, query: Query) -> Result<ProfileLookup, MatchError> {
        let rules = self.engine.aggregator().rules();
        if query.is_empty() {
            return Err(MatchError::InvalidQuery("query has no fields".to_string()));
        }
        if !query.iter().any(|(field, _)| rules.rule(field).is_some()) {
            return Err(MatchError::InvalidQuery(
                "query has no field that takes part in matching".to_string(),
            ));
        }

        let mut corpus = self.source.load().context("loading corpus")?;
        corpus.infer_missing_mappings(&self.mapper);
        tracing::info!(
            "Searching {} record(s) across {} source(s)",
            corpus.record_count(),
            corpus.source_count()
        );

        let outcome = if self.config.parallel_search {
            Arc::clone(&self.engine)
                .search_parallel(query, Arc::new(corpus))
                .await?
        } else {
            self.engine.search(&query, &corpus)
        };

        let mut saved_to = None;
        if let (true, Some(profile)) = (self.config.persist_profiles, &outcome.merged_profile) {
            match self.store.save(&outcome.query, profile).await {
                Ok(path) => saved_to = Some(path),
                // The lookup itself succeeded; a failed write is not fatal.
                Err(e) => tracing::error!("Failed to persist profile: {}", e),
            }
        }

        Ok(ProfileLookup { outcome, saved_to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Corpus, InMemoryCorpus};
    use crate::models::{SearchStatus, UnifiedField};

    struct BrokenSource;

    impl CorpusSource for BrokenSource {
        fn load(&self) -> Result<Corpus, MatchError> {
            Err(MatchError::CorpusLoad("sources directory missing".to_string()))
        }
    }

    fn config() -> Config {
        Config {
            persist_profiles: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let service = ProfileService::new(config(), InMemoryCorpus::default());
        let err = service.find_profile(Query::new()).await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidQuery(_)));

        let gender_only = Query::new().with(UnifiedField::Gender, "F");
        let err = service.find_profile(gender_only).await.unwrap_err();
        assert!(matches!(err, MatchError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_load_failure_surfaced() {
        let service = ProfileService::new(config(), BrokenSource);
        let query = Query::new().with(UnifiedField::FullName, "Jane Roe");

        let err = service.find_profile(query).await.unwrap_err();

        assert!(matches!(err.root(), MatchError::CorpusLoad(_)));
    }

    #[tokio::test]
    async fn test_empty_corpus_reports_no_data() {
        let service = ProfileService::new(config(), InMemoryCorpus::default());
        let query = Query::new().with(UnifiedField::FullName, "Jane Roe");

        let lookup = service.find_profile(query).await.unwrap();

        assert_eq!(lookup.outcome.status, SearchStatus::NoData);
        assert!(lookup.saved_to.is_none());
    }
}
