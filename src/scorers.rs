//! Per-field similarity scorers.
//!
//! Each scorer normalizes both inputs first and returns 0 when either side
//! normalizes to nothing. Scores are on a 0-100 scale.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::UnifiedField;
use crate::nicknames::NicknameTable;
use crate::normalize::{normalize_email, normalize_id, normalize_name, normalize_phone, parse_date};
use crate::similarity::{
    partial_ratio, ratio, sequence_ratio, token_set_ratio, token_sort_ratio, ScoringPipeline,
};

/// Score assigned when two names differ only by a known nickname.
pub const NICKNAME_SCORE: f64 = 95.0;
/// Score assigned to the "first name + last initial" pattern.
pub const INITIAL_PATTERN_SCORE: f64 = 90.0;
/// Score assigned when two phone numbers share their last seven digits.
pub const PHONE_SUFFIX_SCORE: f64 = 90.0;

pub trait FieldScorer: Send + Sync {
    /// Similarity between a query value and a candidate value, 0-100.
    fn score(&self, query: &str, candidate: &str) -> f64;
}

// ============ Names ============

pub struct NameScorer {
    pipeline: ScoringPipeline,
}

impl NameScorer {
    pub fn new(nicknames: Arc<NicknameTable>) -> Self {
        let by_nickname = Arc::clone(&nicknames);
        let by_initial = nicknames;
        let pipeline = ScoringPipeline::new("full_name")
            .with_string_measures()
            .with("nickname", move |a, b| nickname_score(&by_nickname, a, b))
            .with("first_plus_initial", move |a, b| {
                initial_pattern_score(&by_initial, a, b)
            })
            .with("word_best_match", word_best_match);
        Self { pipeline }
    }
}

impl FieldScorer for NameScorer {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let query = normalize_name(query);
        let candidate = normalize_name(candidate);
        if query.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        self.pipeline.best(&query, &candidate)
    }
}

/// Fixed high score when the names share a nickname pair and the remaining
/// tokens agree (or one side has nothing else to compare).
fn nickname_score(table: &NicknameTable, a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();

    for (i, ta) in tokens_a.iter().enumerate() {
        for (j, tb) in tokens_b.iter().enumerate() {
            if !table.are_variants(ta, tb) {
                continue;
            }
            let rest_a = remove_at(&tokens_a, i);
            let rest_b = remove_at(&tokens_b, j);
            if rest_a.is_empty() || rest_b.is_empty() || token_set_ratio(&rest_a, &rest_b) >= 80.0
            {
                return NICKNAME_SCORE;
            }
        }
    }
    0.0
}

fn remove_at(tokens: &[&str], index: usize) -> String {
    tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, t)| *t)
        .collect::<Vec<_>>()
        .join(" ")
}

/// "Leonardo DiCaprio" vs "Leo D": similar first names and a last name
/// reduced to its initial on one side.
fn initial_pattern_score(table: &NicknameTable, a: &str, b: &str) -> f64 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    if tokens_a.len() < 2 || tokens_b.len() < 2 {
        return 0.0;
    }

    let (first_a, last_a) = (tokens_a[0], tokens_a[tokens_a.len() - 1]);
    let (first_b, last_b) = (tokens_b[0], tokens_b[tokens_b.len() - 1]);

    let is_initial = last_a.chars().count() == 1 || last_b.chars().count() == 1;
    if !is_initial || last_a.chars().next() != last_b.chars().next() {
        return 0.0;
    }

    let first_similarity = if table.are_variants(first_a, first_b) {
        NICKNAME_SCORE
    } else {
        ratio(first_a, first_b).max(partial_ratio(first_a, first_b))
    };

    if first_similarity >= 80.0 {
        INITIAL_PATTERN_SCORE
    } else {
        0.0
    }
}

/// Average of each token's best ratio against the other name, taken in the
/// more favourable direction so the measure stays symmetric.
fn word_best_match(a: &str, b: &str) -> f64 {
    fn one_way(from: &[&str], to: &[&str]) -> f64 {
        if from.is_empty() || to.is_empty() {
            return 0.0;
        }
        let total: f64 = from
            .iter()
            .map(|word| to.iter().map(|other| ratio(word, other)).fold(0.0, f64::max))
            .sum();
        total / from.len() as f64
    }

    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    one_way(&tokens_a, &tokens_b).max(one_way(&tokens_b, &tokens_a))
}

// ============ Dates ============

pub struct DateScorer;

impl DateScorer {
    /// Map an absolute day difference onto the fixed score buckets.
    pub fn bucket(days: i64) -> f64 {
        match days.abs() {
            0 => 100.0,
            1 => 90.0,
            2..=7 => 80.0,
            8..=30 => 60.0,
            31..=365 => 40.0,
            _ => 0.0,
        }
    }
}

impl FieldScorer for DateScorer {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        match (parse_date(query), parse_date(candidate)) {
            (Some(q), Some(c)) => Self::bucket((q - c).num_days()),
            _ => 0.0,
        }
    }
}

// ============ Identifiers ============

pub struct IdScorer {
    pipeline: ScoringPipeline,
}

impl Default for IdScorer {
    fn default() -> Self {
        let pipeline = ScoringPipeline::new("national_id")
            .with("ratio", ratio)
            .with("partial", partial_ratio)
            .with("token_sort", token_sort_ratio)
            .with("same_length_sequence", |a, b| {
                if a.chars().count() == b.chars().count() {
                    sequence_ratio(a, b)
                } else {
                    0.0
                }
            });
        Self { pipeline }
    }
}

impl FieldScorer for IdScorer {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let query = normalize_id(query);
        let candidate = normalize_id(candidate);
        if query.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        if query == candidate {
            return 100.0;
        }
        self.pipeline.best(&query, &candidate)
    }
}

// ============ Emails ============

pub struct EmailScorer;

impl FieldScorer for EmailScorer {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let (Some(query), Some(candidate)) = (normalize_email(query), normalize_email(candidate))
        else {
            return 0.0;
        };
        if query == candidate {
            return 100.0;
        }

        let (Some((query_local, query_domain)), Some((cand_local, cand_domain))) =
            (query.rsplit_once('@'), candidate.rsplit_once('@'))
        else {
            return 0.0;
        };

        // Domain weighted higher than the local part
        0.4 * ratio(query_local, cand_local) + 0.6 * ratio(query_domain, cand_domain)
    }
}

// ============ Phones ============

pub struct PhoneScorer {
    pipeline: ScoringPipeline,
}

impl Default for PhoneScorer {
    fn default() -> Self {
        let pipeline = ScoringPipeline::new("phone")
            .with("ratio", ratio)
            .with("partial", partial_ratio)
            .with("last_seven_digits", |a, b| {
                if last_digits(a, 7).is_some() && last_digits(a, 7) == last_digits(b, 7) {
                    PHONE_SUFFIX_SCORE
                } else {
                    0.0
                }
            });
        Self { pipeline }
    }
}

fn last_digits(number: &str, count: usize) -> Option<&str> {
    number
        .len()
        .checked_sub(count)
        .and_then(|start| number.get(start..))
}

impl FieldScorer for PhoneScorer {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let (Some(query), Some(candidate)) = (normalize_phone(query), normalize_phone(candidate))
        else {
            return 0.0;
        };
        if query == candidate {
            return 100.0;
        }
        self.pipeline.best(&query, &candidate)
    }
}

// ============ Other fields ============

/// Case-insensitive edit ratio for fields without a dedicated scorer.
pub struct TextScorer;

impl FieldScorer for TextScorer {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let query = query.trim().to_lowercase();
        let candidate = candidate.trim().to_lowercase();
        ratio(&query, &candidate)
    }
}

// ============ Registry ============

/// Scorer lookup by unified field.
pub struct ScorerRegistry {
    scorers: HashMap<UnifiedField, Box<dyn FieldScorer>>,
    fallback: TextScorer,
}

impl ScorerRegistry {
    pub fn new(nicknames: Arc<NicknameTable>) -> Self {
        let mut scorers: HashMap<UnifiedField, Box<dyn FieldScorer>> = HashMap::new();
        scorers.insert(UnifiedField::FullName, Box::new(NameScorer::new(nicknames)));
        scorers.insert(UnifiedField::Dob, Box::new(DateScorer));
        scorers.insert(UnifiedField::NationalId, Box::new(IdScorer::default()));
        scorers.insert(UnifiedField::Email, Box::new(EmailScorer));
        scorers.insert(UnifiedField::Phone, Box::new(PhoneScorer::default()));
        Self {
            scorers,
            fallback: TextScorer,
        }
    }

    /// Replace or add the scorer for a field.
    pub fn register(&mut self, field: UnifiedField, scorer: Box<dyn FieldScorer>) {
        self.scorers.insert(field, scorer);
    }

    pub fn scorer_for(&self, field: &UnifiedField) -> &dyn FieldScorer {
        self.scorers
            .get(field)
            .map(|scorer| scorer.as_ref())
            .unwrap_or(&self.fallback)
    }

    pub fn score(&self, field: &UnifiedField, query: &str, candidate: &str) -> f64 {
        self.scorer_for(field).score(query, candidate)
    }
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NicknameTable::builtin()))
    }
}
