use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::ScoringError;

// ============ Unified Schema ============

/// Identifier of an attribute in the unified customer schema.
///
/// Only the first five variants carry matching weights; the rest are
/// recognised so mappings and records can name them, and `Other` keeps the
/// schema open for fields added by the mapping collaborator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnifiedField {
    NationalId,
    FullName,
    Dob,
    Email,
    Phone,
    CustomerId,
    FirstName,
    LastName,
    Gender,
    Address,
    Country,
    UpdatedAt,
    Other(String),
}

impl UnifiedField {
    /// Fields that participate in scoring, in weight-table order.
    pub const SCORED: [UnifiedField; 5] = [
        UnifiedField::NationalId,
        UnifiedField::FullName,
        UnifiedField::Dob,
        UnifiedField::Email,
        UnifiedField::Phone,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            UnifiedField::NationalId => "national_id",
            UnifiedField::FullName => "full_name",
            UnifiedField::Dob => "dob",
            UnifiedField::Email => "email",
            UnifiedField::Phone => "phone",
            UnifiedField::CustomerId => "customer_id",
            UnifiedField::FirstName => "first_name",
            UnifiedField::LastName => "last_name",
            UnifiedField::Gender => "gender",
            UnifiedField::Address => "address",
            UnifiedField::Country => "country",
            UnifiedField::UpdatedAt => "updated_at",
            UnifiedField::Other(name) => name,
        }
    }
}

impl From<&str> for UnifiedField {
    fn from(raw: &str) -> Self {
        let name = raw.trim().to_lowercase();
        match name.as_str() {
            "national_id" => UnifiedField::NationalId,
            "full_name" => UnifiedField::FullName,
            "dob" => UnifiedField::Dob,
            "email" => UnifiedField::Email,
            "phone" => UnifiedField::Phone,
            "customer_id" => UnifiedField::CustomerId,
            "first_name" => UnifiedField::FirstName,
            "last_name" => UnifiedField::LastName,
            "gender" => UnifiedField::Gender,
            "address" => UnifiedField::Address,
            "country" => UnifiedField::Country,
            "updated_at" => UnifiedField::UpdatedAt,
            _ => UnifiedField::Other(name),
        }
    }
}

impl From<String> for UnifiedField {
    fn from(raw: String) -> Self {
        UnifiedField::from(raw.as_str())
    }
}

impl From<UnifiedField> for String {
    fn from(field: UnifiedField) -> Self {
        field.as_str().to_string()
    }
}

impl fmt::Display for UnifiedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Schema Mapping ============

/// Confidence category of a column mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceTier::High
        } else if confidence >= 0.7 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Association between one source column and a unified field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub unified_field: UnifiedField,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_type: Option<ConfidenceTier>,
}

impl FieldMapping {
    pub fn new(unified_field: UnifiedField, confidence: f64) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            unified_field,
            confidence,
            mapping_type: Some(ConfidenceTier::from_confidence(confidence)),
        }
    }
}

/// Summary counters attached to a generated mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingStats {
    pub total_fields: usize,
    pub mapped_fields: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub success_rate: f64,
}

/// Column → unified field mapping for one source.
///
/// Deserializes the persisted `*_schema_map.json` documents; only
/// `source_name` and `mappings` are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub source_name: String,
    #[serde(default)]
    pub mappings: BTreeMap<String, FieldMapping>,
    #[serde(default)]
    pub unmapped_fields: Vec<String>,
    #[serde(default)]
    pub mapping_stats: MappingStats,
}

impl SourceMapping {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    /// Builder-style insert used by callers assembling mappings by hand.
    pub fn with(mut self, column: impl Into<String>, field: UnifiedField, confidence: f64) -> Self {
        self.mappings
            .insert(column.into(), FieldMapping::new(field, confidence));
        self
    }

    /// Source columns mapped to `field`, highest confidence first.
    pub fn columns_for(&self, field: &UnifiedField) -> Vec<&str> {
        let mut columns: Vec<(&str, f64)> = self
            .mappings
            .iter()
            .filter(|(_, m)| &m.unified_field == field)
            .map(|(column, m)| (column.as_str(), m.confidence))
            .collect();
        columns.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        columns.into_iter().map(|(column, _)| column).collect()
    }

    /// Parse a persisted mapping document.
    pub fn from_json(raw: &str) -> Result<Self, crate::errors::MatchError> {
        serde_json::from_str(raw)
            .map_err(|e| crate::errors::MatchError::MappingLoad(e.to_string()))
    }

    /// Mean confidence over all mapped columns (0 when nothing is mapped).
    pub fn average_confidence(&self) -> f64 {
        if self.mappings.is_empty() {
            return 0.0;
        }
        self.mappings.values().map(|m| m.confidence).sum::<f64>() / self.mappings.len() as f64
    }
}

// ============ Records & Queries ============

/// One flat row from a source table: column name → raw value.
pub type Record = serde_json::Map<String, Value>;

/// Render a scalar record value as text.
///
/// `Ok(None)` means "empty" (null or blank); non-scalar values are a
/// per-record scoring error.
pub fn value_as_text(column: &str, value: &Value) -> Result<Option<String>, ScoringError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) => Err(ScoringError::MalformedValue {
            column: column.to_string(),
            kind: "array",
        }),
        Value::Object(_) => Err(ScoringError::MalformedValue {
            column: column.to_string(),
            kind: "object",
        }),
    }
}

/// Partial customer description supplied by the caller.
///
/// Only non-empty values are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query {
    fields: BTreeMap<UnifiedField, String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: UnifiedField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: UnifiedField, value: impl Into<String>) {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, value);
        }
    }

    /// Build from loosely-typed `(name, value)` pairs, e.g. a decoded request body.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |query, (name, value)| query.with(UnifiedField::from(name), value))
    }

    pub fn get(&self, field: &UnifiedField) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &UnifiedField) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UnifiedField, &str)> {
        self.fields.iter().map(|(f, v)| (f, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

// ============ Scoring Results ============

/// Per-field scores (0-100) for one query/record pair. Zero scores are never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldScoreSet {
    scores: BTreeMap<UnifiedField, f64>,
}

impl FieldScoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a score, keeping the maximum per field and dropping zeros.
    pub fn record(&mut self, field: UnifiedField, score: f64) {
        if score <= 0.0 || score.is_nan() {
            return;
        }
        let score = score.min(100.0);
        let entry = self.scores.entry(field).or_insert(score);
        if score > *entry {
            *entry = score;
        }
    }

    /// Score for `field`, 0 when absent.
    pub fn get(&self, field: &UnifiedField) -> f64 {
        self.scores.get(field).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, field: &UnifiedField) -> bool {
        self.scores.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UnifiedField, f64)> {
        self.scores.iter().map(|(f, s)| (f, *s))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.values().copied()
    }

    pub fn max(&self) -> f64 {
        self.values().fold(0.0, f64::max)
    }

    /// Number of fields scoring at least `threshold`.
    pub fn count_at_least(&self, threshold: f64) -> usize {
        self.values().filter(|s| *s >= threshold).count()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// A record annotated with its score data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    #[serde(flatten)]
    pub record: Record,
    pub overall_score: f64,
    pub field_scores: FieldScoreSet,
    pub is_strong_match: bool,
    pub meets_requirements: bool,
}

/// A retained match tagged with the source it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcedMatch {
    pub source: String,
    #[serde(flatten)]
    pub result: MatchResult,
}

/// Score summary of the base match of a merged profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchQuality {
    pub is_strong_match: bool,
    pub overall_score: f64,
    pub field_scores: FieldScoreSet,
}

/// The single representative record answering a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedProfile {
    /// Field values of the base match, without scoring fields.
    #[serde(flatten)]
    pub body: Record,
    pub sources: Vec<String>,
    pub match_count: usize,
    pub match_quality: MatchQuality,
    pub merged_at: DateTime<Utc>,
}

// ============ Search Outcome ============

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    /// At least one record was accepted.
    Matched,
    /// Records were scored but none was accepted.
    NoMatch,
    /// The corpus held no sources or no records.
    NoData,
}

impl SearchStatus {
    pub fn message(&self) -> &'static str {
        match self {
            SearchStatus::Matched => "Matching profile found",
            SearchStatus::NoMatch => "No matching profile found",
            SearchStatus::NoData => "No data available",
        }
    }
}

/// Aggregate statistics over the retained matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchSummary {
    pub total_matches: usize,
    pub sources_matched: usize,
    pub source_breakdown: BTreeMap<String, usize>,
    pub has_strong_matches: bool,
    pub highest_score: f64,
}

/// A record that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub source: String,
    pub index: usize,
    pub reason: String,
}

/// Bookkeeping for one scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoringReport {
    pub records_scored: usize,
    pub records_accepted: usize,
    pub records_rejected: usize,
    pub records_skipped: usize,
    pub errors: Vec<SkippedRecord>,
}

impl ScoringReport {
    pub fn absorb(&mut self, other: ScoringReport) {
        self.records_scored += other.records_scored;
        self.records_accepted += other.records_accepted;
        self.records_rejected += other.records_rejected;
        self.records_skipped += other.records_skipped;
        self.errors.extend(other.errors);
    }
}

/// Full answer to a search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub search_id: Uuid,
    pub status: SearchStatus,
    pub query: Query,
    pub matches_by_source: BTreeMap<String, Vec<MatchResult>>,
    pub individual_matches: Vec<SourcedMatch>,
    pub merged_profile: Option<MergedProfile>,
    pub summary: MatchSummary,
    pub report: ScoringReport,
    pub searched_at: DateTime<Utc>,
}

impl SearchOutcome {
    pub fn match_count(&self) -> usize {
        self.individual_matches.len()
    }
}
