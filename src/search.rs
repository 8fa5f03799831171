//! Search and ranking over a corpus.
//!
//! Each source is scanned independently: every record is scored, accepted
//! records are ranked and capped per source, and the survivors are then
//! ranked across sources and merged. Sources share no mutable state, so the
//! async entry point scores them on the blocking pool and produces exactly
//! the same outcome as the sequential one.

use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregator::{has_any_value, MatchAggregator};
use crate::config::MatchingRules;
use crate::corpus::{Corpus, SourceData};
use crate::errors::{MatchError, ScoringError};
use crate::merge;
use crate::models::{
    MatchResult, MatchSummary, Query, Record, ScoringReport, SearchOutcome, SearchStatus,
    SkippedRecord, SourceMapping, SourcedMatch,
};
use crate::scorers::ScorerRegistry;

/// Retained matches and bookkeeping for one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceScan {
    pub matches: Vec<MatchResult>,
    pub report: ScoringReport,
}

/// Descending by (strong, overall score, meets requirements).
pub fn per_source_order(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.is_strong_match
        .cmp(&a.is_strong_match)
        .then_with(|| b.overall_score.total_cmp(&a.overall_score))
        .then_with(|| b.meets_requirements.cmp(&a.meets_requirements))
}

/// Keep every strong match plus the next best few, or the top few when none is strong.
///
/// Expects `ranked` already sorted with [`per_source_order`].
pub fn cap_source_matches(mut ranked: Vec<MatchResult>, rules: &MatchingRules) -> Vec<MatchResult> {
    let strong = ranked.iter().filter(|m| m.is_strong_match).count();
    let keep = if strong > 0 {
        strong + rules.non_strong_extra
    } else {
        rules.top_without_strong
    };
    ranked.truncate(keep);
    ranked
}

pub struct SearchEngine {
    aggregator: MatchAggregator,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(MatchAggregator::new(
            MatchingRules::default(),
            ScorerRegistry::default(),
        ))
    }
}

impl SearchEngine {
    pub fn new(aggregator: MatchAggregator) -> Self {
        Self { aggregator }
    }

    pub fn aggregator(&self) -> &MatchAggregator {
        &self.aggregator
    }

    /// Score one record; `Ok(None)` when it is not accepted.
    fn evaluate(
        &self,
        query: &Query,
        record: &Record,
        mapping: Option<&SourceMapping>,
    ) -> Result<Option<MatchResult>, ScoringError> {
        if !has_any_value(record) {
            return Ok(None);
        }

        let score = self.aggregator.score_record(query, record, mapping)?;
        if score.field_scores.is_empty() || !self.aggregator.accepts(&score) {
            return Ok(None);
        }

        Ok(Some(MatchResult {
            record: record.clone(),
            overall_score: score.overall_score,
            field_scores: score.field_scores,
            is_strong_match: score.is_strong_match,
            meets_requirements: score.meets_requirements,
        }))
    }

    /// Score, filter, rank and cap the records of one source.
    pub fn scan_source(&self, query: &Query, source_name: &str, data: &SourceData) -> SourceScan {
        let mut report = ScoringReport::default();
        let mut accepted = Vec::new();

        for (index, record) in data.records.iter().enumerate() {
            report.records_scored += 1;
            match self.evaluate(query, record, data.mapping.as_ref()) {
                Ok(Some(result)) => {
                    report.records_accepted += 1;
                    accepted.push(result);
                }
                Ok(None) => report.records_rejected += 1,
                Err(e) => {
                    tracing::warn!("Skipping record {} of {}: {}", index, source_name, e);
                    report.records_skipped += 1;
                    report.errors.push(SkippedRecord {
                        source: source_name.to_string(),
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        accepted.sort_by(per_source_order);
        let matches = cap_source_matches(accepted, self.aggregator.rules());

        tracing::debug!(
            "Source {}: {} scored, {} accepted, {} kept",
            source_name,
            report.records_scored,
            report.records_accepted,
            matches.len()
        );

        SourceScan { matches, report }
    }

    /// Search every source of `corpus` in order.
    pub fn search(&self, query: &Query, corpus: &Corpus) -> SearchOutcome {
        let search_id = Uuid::new_v4();
        let span = tracing::info_span!("search", %search_id);
        let _enter = span.enter();

        if corpus.is_empty() {
            tracing::info!("No data available for search");
            return no_data(search_id, query);
        }

        let scans = corpus
            .sources()
            .map(|(name, data)| (name.clone(), self.scan_source(query, name, data)))
            .collect();
        self.assemble(search_id, query, scans)
    }

    /// Search with one blocking task per source.
    ///
    /// Fails only when a scoring task panics.
    pub async fn search_parallel(
        self: Arc<Self>,
        query: Query,
        corpus: Arc<Corpus>,
    ) -> Result<SearchOutcome, MatchError> {
        let search_id = Uuid::new_v4();
        let span = tracing::info_span!("search", %search_id);

        async move {
            if corpus.is_empty() {
                tracing::info!("No data available for search");
                return Ok(no_data(search_id, &query));
            }

            let query = Arc::new(query);
            let mut tasks = JoinSet::new();
            for name in corpus.source_names() {
                let engine = Arc::clone(&self);
                let corpus = Arc::clone(&corpus);
                let query = Arc::clone(&query);
                let task_span = tracing::Span::current();
                tasks.spawn_blocking(move || {
                    let _enter = task_span.enter();
                    let scan = corpus
                        .get(&name)
                        .map(|data| engine.scan_source(&query, &name, data))
                        .unwrap_or_default();
                    (name, scan)
                });
            }

            let mut scans = BTreeMap::new();
            while let Some(joined) = tasks.join_next().await {
                let (name, scan) = joined
                    .map_err(|e| MatchError::Internal(format!("source scoring task failed: {}", e)))?;
                scans.insert(name, scan);
            }

            Ok(self.assemble(search_id, &query, scans))
        }
        .instrument(span)
        .await
    }

    fn assemble(
        &self,
        search_id: Uuid,
        query: &Query,
        scans: BTreeMap<String, SourceScan>,
    ) -> SearchOutcome {
        let mut report = ScoringReport::default();
        let mut matches_by_source = BTreeMap::new();
        for (name, scan) in scans {
            report.absorb(scan.report);
            if !scan.matches.is_empty() {
                matches_by_source.insert(name, scan.matches);
            }
        }

        let individual_matches = merge::rank_across_sources(&matches_by_source);
        let merged_profile = merge::merge_matches(&individual_matches);
        let summary = summarize(&matches_by_source, &individual_matches);

        let status = if individual_matches.is_empty() {
            SearchStatus::NoMatch
        } else {
            SearchStatus::Matched
        };
        tracing::info!(
            "Search finished: {} ({} match(es) from {} source(s), {} skipped)",
            status.message(),
            summary.total_matches,
            summary.sources_matched,
            report.records_skipped
        );

        SearchOutcome {
            search_id,
            status,
            query: query.clone(),
            matches_by_source,
            individual_matches,
            merged_profile,
            summary,
            report,
            searched_at: Utc::now(),
        }
    }
}

fn no_data(search_id: Uuid, query: &Query) -> SearchOutcome {
    SearchOutcome {
        search_id,
        status: SearchStatus::NoData,
        query: query.clone(),
        matches_by_source: BTreeMap::new(),
        individual_matches: Vec::new(),
        merged_profile: None,
        summary: MatchSummary::default(),
        report: ScoringReport::default(),
        searched_at: Utc::now(),
    }
}

pub fn summarize(
    matches_by_source: &BTreeMap<String, Vec<MatchResult>>,
    individual: &[SourcedMatch],
) -> MatchSummary {
    MatchSummary {
        total_matches: individual.len(),
        sources_matched: matches_by_source.len(),
        source_breakdown: matches_by_source
            .iter()
            .map(|(name, matches)| (name.clone(), matches.len()))
            .collect(),
        has_strong_matches: individual.iter().any(|m| m.result.is_strong_match),
        highest_score: individual
            .iter()
            .map(|m| m.result.overall_score)
            .fold(0.0, f64::max),
    }
}
