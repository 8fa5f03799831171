//! Combines per-field scores into one verdict per record.
//!
//! For every query field the aggregator resolves the record columns to
//! compare (schema mapping first, column-name heuristics second), keeps the
//! best score per field, averages the scored fields by weight and applies
//! the strong-match rules and the minimum-requirements gate.

use serde_json::Value;

use crate::config::MatchingRules;
use crate::errors::ScoringError;
use crate::models::{value_as_text, FieldScoreSet, Query, Record, SourceMapping, UnifiedField};
use crate::scorers::ScorerRegistry;

/// Columns never used as match evidence.
const DECOY_COLUMNS: [&str; 8] = [
    "source_name",
    "source",
    "source_file",
    "file_name",
    "overall_score",
    "match_score",
    "field_scores",
    "is_strong_match",
];

/// Outcome of scoring one record against a query.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateScore {
    pub overall_score: f64,
    pub field_scores: FieldScoreSet,
    pub is_strong_match: bool,
    pub meets_requirements: bool,
}

pub struct MatchAggregator {
    rules: MatchingRules,
    scorers: ScorerRegistry,
}

impl MatchAggregator {
    pub fn new(rules: MatchingRules, scorers: ScorerRegistry) -> Self {
        Self { rules, scorers }
    }

    pub fn rules(&self) -> &MatchingRules {
        &self.rules
    }

    /// Score `record` against `query`.
    ///
    /// Fails only when a compared column holds a non-scalar value.
    pub fn score_record(
        &self,
        query: &Query,
        record: &Record,
        mapping: Option<&SourceMapping>,
    ) -> Result<AggregateScore, ScoringError> {
        let mut field_scores = FieldScoreSet::new();

        for (field, query_value) in query.iter() {
            if self.rules.rule(field).is_none() {
                tracing::trace!("Skipping field {} - no matching weight", field);
                continue;
            }

            let candidates = candidate_values(field, record, mapping)?;
            if candidates.is_empty() {
                tracing::trace!("Field {} not found in record columns", field);
                continue;
            }

            let best = candidates
                .iter()
                .map(|candidate| self.scorers.score(field, query_value, candidate))
                .fold(0.0, f64::max);
            tracing::trace!("Final score for {}: {}", field, best);
            field_scores.record(field.clone(), best);
        }

        let overall_score = self.overall_score(&field_scores);
        let is_strong_match = is_strong_match(&field_scores);
        let meets_requirements = self.meets_minimum_requirements(query, &field_scores);

        Ok(AggregateScore {
            overall_score,
            field_scores,
            is_strong_match,
            meets_requirements,
        })
    }

    /// Weighted average over the fields that produced a score; 0 when none did.
    pub fn overall_score(&self, scores: &FieldScoreSet) -> f64 {
        let (weighted_sum, total_weight) =
            scores
                .iter()
                .fold((0.0_f64, 0.0_f64), |(sum, total), (field, score)| {
                    let weight = self.rules.weight(field);
                    (sum + score * weight, total + weight)
                });

        if total_weight > 0.0 {
            (weighted_sum / total_weight).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    /// Gate applied to records that are not strong matches.
    pub fn meets_minimum_requirements(&self, query: &Query, scores: &FieldScoreSet) -> bool {
        if scores.is_empty() || scores.max() < self.rules.weak_match {
            return false;
        }

        let id_score = scores.get(&UnifiedField::NationalId);
        let name_score = scores.get(&UnifiedField::FullName);
        let anchored = id_score >= self.rules.fuzzy_threshold(&UnifiedField::NationalId)
            || name_score >= self.rules.fuzzy_threshold(&UnifiedField::FullName);
        if !anchored {
            return false;
        }

        if query.contains(&UnifiedField::FullName) && query.contains(&UnifiedField::Dob) {
            let dob_score = scores.get(&UnifiedField::Dob);
            let consistent = (dob_score == 100.0 && name_score >= 60.0)
                || (name_score >= 90.0 && dob_score >= 60.0)
                || (name_score >= 65.0 && dob_score >= 65.0);
            if !consistent {
                return false;
            }
        }

        let weak_fields = scores.values().filter(|s| *s < 50.0).count();
        weak_fields * 2 <= scores.len()
    }

    /// Acceptance decision for the search pass.
    pub fn accepts(&self, score: &AggregateScore) -> bool {
        score.is_strong_match
            || score.field_scores.get(&UnifiedField::NationalId) == 100.0
            || (score.overall_score >= self.rules.good_match
                && score.meets_requirements
                && score.field_scores.count_at_least(self.rules.good_match) >= 2)
    }
}

/// High-confidence composite rules; any one of them makes a strong match.
pub fn is_strong_match(scores: &FieldScoreSet) -> bool {
    let id = scores.get(&UnifiedField::NationalId);
    let name = scores.get(&UnifiedField::FullName);
    let dob = scores.get(&UnifiedField::Dob);
    let email = scores.get(&UnifiedField::Email);

    if id == 100.0 {
        return true;
    }
    if (name >= 85.0 && dob >= 90.0)
        || (name >= 95.0 && dob >= 80.0)
        || (dob == 100.0 && name >= 80.0)
    {
        return true;
    }
    if email >= 98.0 && (name >= 75.0 || dob >= 85.0) {
        return true;
    }
    scores.count_at_least(85.0) >= 3 || scores.count_at_least(95.0) >= 2
}

fn is_decoy(column: &str) -> bool {
    let lowered = column.to_lowercase();
    lowered.starts_with('_') || DECOY_COLUMNS.contains(&lowered.as_str())
}

/// Lowercase words of a column name. Splits on punctuation and on camelCase
/// boundaries, so `CustomerID`, `clientId` and `custDOB` yield `id`/`dob`.
fn tokens(column: &str) -> Vec<String> {
    let chars: Vec<char> = column.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let boundary = c.is_ascii_uppercase()
            && match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                // "IDNumber": the last capital of a run starts the next word
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Column-name heuristic used when the mapping names no column for `field`.
fn heuristic_matches(field: &UnifiedField, column: &str) -> bool {
    let lowered = column.to_lowercase();
    let column_tokens = tokens(column);
    let has_token = |t: &str| column_tokens.iter().any(|c| c == t);
    let contains_any = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    match field {
        UnifiedField::FullName => lowered.contains("name"),
        UnifiedField::NationalId => {
            has_token("id") || contains_any(&["national", "ssn", "tax_id", "passport", "id_no"])
        }
        UnifiedField::Email => contains_any(&["email", "e_mail", "mail"]),
        UnifiedField::Phone => {
            has_token("tel") || contains_any(&["phone", "mobile", "telephone", "cell"])
        }
        UnifiedField::Dob => has_token("dob") || contains_any(&["birth", "born"]),
        UnifiedField::Address => contains_any(&["address", "street"]),
        other => lowered.contains(other.as_str()),
    }
}

/// Record columns to compare for `field`.
pub fn resolve_columns(
    field: &UnifiedField,
    record: &Record,
    mapping: Option<&SourceMapping>,
) -> Vec<String> {
    if let Some(mapping) = mapping {
        let mapped: Vec<String> = mapping
            .columns_for(field)
            .into_iter()
            .filter(|column| record.contains_key(*column))
            .map(str::to_string)
            .collect();
        if !mapped.is_empty() {
            return mapped;
        }
    }

    if record.contains_key(field.as_str()) {
        return vec![field.as_str().to_string()];
    }

    record
        .keys()
        .filter(|column| !is_decoy(column) && heuristic_matches(field, column))
        .cloned()
        .collect()
}

fn text_of(record: &Record, column: &str) -> Result<Option<String>, ScoringError> {
    match record.get(column) {
        Some(value) => value_as_text(column, value),
        None => Ok(None),
    }
}

/// Raw candidate values for `field`, including assembled names for
/// `full_name` when the record splits a name over several columns.
fn candidate_values(
    field: &UnifiedField,
    record: &Record,
    mapping: Option<&SourceMapping>,
) -> Result<Vec<String>, ScoringError> {
    let columns = resolve_columns(field, record, mapping);

    let mut values: Vec<String> = Vec::with_capacity(columns.len() + 1);
    for column in &columns {
        if let Some(text) = text_of(record, column)? {
            values.push(text);
        }
    }

    if field == &UnifiedField::FullName {
        let mut parts: Vec<String> = Vec::new();
        for value in &values {
            let part = value.trim().to_string();
            if !part.is_empty() && !parts.contains(&part) {
                parts.push(part);
            }
        }
        let mut assembled = Vec::new();
        if parts.len() > 1 {
            assembled.push(parts.join(" "));
        }
        if let Some(split) = first_last_name(record, mapping)? {
            assembled.push(split);
        }
        for name in assembled {
            if !values.contains(&name) {
                values.push(name);
            }
        }
    }

    Ok(values)
}

/// "first last" from dedicated first/last name columns, when both exist.
fn first_last_name(
    record: &Record,
    mapping: Option<&SourceMapping>,
) -> Result<Option<String>, ScoringError> {
    let pick = |field: UnifiedField, fallback: &str| -> Option<String> {
        mapping
            .and_then(|m| {
                m.columns_for(&field)
                    .into_iter()
                    .find(|column| record.contains_key(*column))
                    .map(str::to_string)
            })
            .or_else(|| record.contains_key(fallback).then(|| fallback.to_string()))
    };

    let (Some(first_col), Some(last_col)) = (
        pick(UnifiedField::FirstName, "first_name"),
        pick(UnifiedField::LastName, "last_name"),
    ) else {
        return Ok(None);
    };

    match (text_of(record, &first_col)?, text_of(record, &last_col)?) {
        (Some(first), Some(last)) => Ok(Some(format!("{} {}", first.trim(), last.trim()))),
        _ => Ok(None),
    }
}

/// True when the record carries any value at all (used to skip blank rows).
pub fn has_any_value(record: &Record) -> bool {
    record.values().any(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn aggregator() -> MatchAggregator {
        MatchAggregator::new(MatchingRules::default(), ScorerRegistry::default())
    }

    fn scores(pairs: &[(UnifiedField, f64)]) -> FieldScoreSet {
        let mut set = FieldScoreSet::new();
        for (field, score) in pairs {
            set.record(field.clone(), *score);
        }
        set
    }

    #[test]
    fn test_resolve_prefers_mapping() {
        let rec = record(json!({"client_nm": "Jane Roe", "name": "ignored"}));
        let mapping = SourceMapping::new("crm").with("client_nm", UnifiedField::FullName, 0.9);

        assert_eq!(
            resolve_columns(&UnifiedField::FullName, &rec, Some(&mapping)),
            vec!["client_nm".to_string()]
        );
    }

    #[test]
    fn test_resolve_heuristics_skip_decoys() {
        let rec = record(json!({
            "source_name": "bank",
            "customer_name": "Jane Roe",
            "customer_id": "B1",
            "valid_from": "2020-01-01"
        }));

        assert_eq!(
            resolve_columns(&UnifiedField::FullName, &rec, None),
            vec!["customer_name".to_string()]
        );
        assert_eq!(
            resolve_columns(&UnifiedField::NationalId, &rec, None),
            vec!["customer_id".to_string()]
        );
    }

    #[test]
    fn test_resolve_heuristics_split_camel_case() {
        let rec = record(json!({
            "CustomerID": "B1",
            "custDOB": "1974-11-11",
            "homeTel": "2024561111",
            "_rowId": "7"
        }));

        assert_eq!(
            resolve_columns(&UnifiedField::NationalId, &rec, None),
            vec!["CustomerID".to_string()]
        );
        assert_eq!(
            resolve_columns(&UnifiedField::Dob, &rec, None),
            vec!["custDOB".to_string()]
        );
        assert_eq!(
            resolve_columns(&UnifiedField::Phone, &rec, None),
            vec!["homeTel".to_string()]
        );

        let rec = record(json!({"clientId": "C9", "valid": "yes", "width": 3}));
        assert_eq!(
            resolve_columns(&UnifiedField::NationalId, &rec, None),
            vec!["clientId".to_string()]
        );
    }

    #[test]
    fn test_column_tokens() {
        assert_eq!(tokens("CustomerID"), vec!["customer", "id"]);
        assert_eq!(tokens("clientId"), vec!["client", "id"]);
        assert_eq!(tokens("custDOB"), vec!["cust", "dob"]);
        assert_eq!(tokens("IDNumber"), vec!["id", "number"]);
        assert_eq!(tokens("customer_id"), vec!["customer", "id"]);
        assert_eq!(tokens("phone2Mobile"), vec!["phone2", "mobile"]);
    }

    #[test]
    fn test_split_name_columns_are_assembled() {
        let rec = record(json!({"first_name": "Kate", "last_name": "Winslet"}));
        let query = Query::new().with(UnifiedField::FullName, "Kate Winslet");

        let result = aggregator().score_record(&query, &rec, None).unwrap();
        assert_eq!(result.field_scores.get(&UnifiedField::FullName), 100.0);
    }

    #[test]
    fn test_overall_score_uses_only_scored_fields() {
        let agg = aggregator();
        let set = scores(&[(UnifiedField::FullName, 80.0), (UnifiedField::Dob, 100.0)]);
        let expected = (80.0 * 0.40 + 100.0 * 0.25) / 0.65;

        assert!((agg.overall_score(&set) - expected).abs() < 1e-9);
        assert_eq!(agg.overall_score(&FieldScoreSet::new()), 0.0);
    }

    #[test]
    fn test_strong_match_rules() {
        assert!(is_strong_match(&scores(&[(UnifiedField::NationalId, 100.0)])));
        assert!(is_strong_match(&scores(&[
            (UnifiedField::FullName, 85.0),
            (UnifiedField::Dob, 90.0)
        ])));
        assert!(is_strong_match(&scores(&[
            (UnifiedField::FullName, 95.0),
            (UnifiedField::Dob, 80.0)
        ])));
        assert!(is_strong_match(&scores(&[
            (UnifiedField::FullName, 80.0),
            (UnifiedField::Dob, 100.0)
        ])));
        assert!(is_strong_match(&scores(&[
            (UnifiedField::Email, 98.0),
            (UnifiedField::Dob, 85.0)
        ])));
        assert!(is_strong_match(&scores(&[
            (UnifiedField::Email, 96.0),
            (UnifiedField::Phone, 95.0)
        ])));
        assert!(!is_strong_match(&scores(&[
            (UnifiedField::FullName, 84.0),
            (UnifiedField::Dob, 90.0)
        ])));
        assert!(!is_strong_match(&scores(&[(UnifiedField::NationalId, 99.0)])));
    }

    #[test]
    fn test_minimum_requirements_gate() {
        let agg = aggregator();
        let query = Query::new()
            .with(UnifiedField::FullName, "x")
            .with(UnifiedField::Dob, "y");

        // name anchored, dob agrees
        assert!(agg.meets_minimum_requirements(
            &query,
            &scores(&[(UnifiedField::FullName, 80.0), (UnifiedField::Dob, 80.0)])
        ));
        // name anchored but dob too far off
        assert!(!agg.meets_minimum_requirements(
            &query,
            &scores(&[(UnifiedField::FullName, 80.0), (UnifiedField::Dob, 40.0)])
        ));
        // no anchor field
        assert!(!agg.meets_minimum_requirements(
            &Query::new().with(UnifiedField::Email, "e"),
            &scores(&[(UnifiedField::Email, 100.0)])
        ));
        // more than half of the scored fields weak
        assert!(!agg.meets_minimum_requirements(
            &Query::new().with(UnifiedField::NationalId, "i"),
            &scores(&[
                (UnifiedField::NationalId, 90.0),
                (UnifiedField::Email, 30.0),
                (UnifiedField::Phone, 20.0)
            ])
        ));
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let rec = record(json!({"full_name": ["Jane", "Roe"]}));
        let query = Query::new().with(UnifiedField::FullName, "Jane Roe");

        let err = aggregator().score_record(&query, &rec, None).unwrap_err();
        assert!(matches!(err, ScoringError::MalformedValue { kind: "array", .. }));
    }
}
