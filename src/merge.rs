//! Cross-source ranking and reduction of the retained matches into a single
//! merged profile.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{MatchQuality, MatchResult, MergedProfile, SourcedMatch};

/// Keys removed from the base record before it becomes the profile body.
const SCORING_KEYS: [&str; 5] = [
    "overall_score",
    "match_score",
    "field_scores",
    "is_strong_match",
    "meets_requirements",
];

/// Descending by (strong, overall score).
pub fn cross_source_order(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.is_strong_match
        .cmp(&a.is_strong_match)
        .then_with(|| b.overall_score.total_cmp(&a.overall_score))
}

/// Flatten per-source matches into one list, tagged with their source.
///
/// Sources are visited in name order and the sort is stable, so ties keep
/// their per-source rank.
pub fn rank_across_sources(matches_by_source: &BTreeMap<String, Vec<MatchResult>>) -> Vec<SourcedMatch> {
    let mut ranked: Vec<SourcedMatch> = matches_by_source
        .iter()
        .flat_map(|(source, matches)| {
            matches.iter().map(move |result| SourcedMatch {
                source: source.clone(),
                result: result.clone(),
            })
        })
        .collect();
    ranked.sort_by(|a, b| cross_source_order(&a.result, &b.result));
    ranked
}

/// Reduce ranked matches to one profile, stamped with the current time.
pub fn merge_matches(ranked: &[SourcedMatch]) -> Option<MergedProfile> {
    merge_matches_at(ranked, Utc::now())
}

/// Reduce ranked matches to one profile.
///
/// The base is the first element of `ranked`; `None` when there is nothing to merge.
pub fn merge_matches_at(ranked: &[SourcedMatch], merged_at: DateTime<Utc>) -> Option<MergedProfile> {
    let base = ranked.first()?;

    let mut body = base.result.record.clone();
    for key in SCORING_KEYS {
        body.remove(key);
    }

    let sources: BTreeSet<&str> = ranked.iter().map(|m| m.source.as_str()).collect();

    tracing::debug!(
        "Merged profile from {} ({} match(es) across {} source(s))",
        base.source,
        ranked.len(),
        sources.len()
    );

    Some(MergedProfile {
        body,
        sources: sources.into_iter().map(str::to_string).collect(),
        match_count: ranked.len(),
        match_quality: MatchQuality {
            is_strong_match: base.result.is_strong_match,
            overall_score: base.result.overall_score,
            field_scores: base.result.field_scores.clone(),
        },
        merged_at,
    })
}
