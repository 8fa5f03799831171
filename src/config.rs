use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::models::UnifiedField;

/// Runtime settings of the matching service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory merged profiles are written to.
    pub profiles_dir: PathBuf,
    /// Maximum number of distinct column sets kept in the mapping cache.
    pub mapping_cache_capacity: u64,
    /// Score sources on the blocking pool instead of inline.
    pub parallel_search: bool,
    /// Persist merged profiles after each successful search.
    pub persist_profiles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profiles_dir: PathBuf::from("profiles_found"),
            mapping_cache_capacity: 100,
            parallel_search: true,
            persist_profiles: true,
        }
    }
}

fn env_flag(name: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{} must be a boolean, got '{}'", name, other),
        },
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            profiles_dir: match std::env::var("PROFILES_DIR") {
                Err(_) => defaults.profiles_dir,
                Ok(dir) => {
                    if dir.trim().is_empty() {
                        anyhow::bail!("PROFILES_DIR cannot be empty");
                    }
                    PathBuf::from(dir)
                }
            },
            mapping_cache_capacity: std::env::var("MAPPING_CACHE_CAPACITY")
                .unwrap_or_else(|_| defaults.mapping_cache_capacity.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAPPING_CACHE_CAPACITY must be a positive number"))
                .and_then(|capacity: u64| {
                    if capacity == 0 {
                        anyhow::bail!("MAPPING_CACHE_CAPACITY must be greater than zero");
                    }
                    Ok(capacity)
                })?,
            parallel_search: env_flag("PARALLEL_SEARCH", defaults.parallel_search)?,
            persist_profiles: env_flag("PERSIST_PROFILES", defaults.persist_profiles)?,
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Profiles dir: {}", config.profiles_dir.display());
        tracing::debug!("Mapping cache capacity: {}", config.mapping_cache_capacity);
        tracing::debug!(
            "Parallel search: {}, persist profiles: {}",
            config.parallel_search,
            config.persist_profiles
        );

        Ok(config)
    }
}

/// Weight and acceptance threshold of one scored field.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FieldRule {
    pub weight: f64,
    pub fuzzy_threshold: f64,
}

/// Thresholds driving aggregation, acceptance and per-source capping.
///
/// `Default` is the strict rule set; the older looser constants are not
/// carried.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchingRules {
    pub fields: BTreeMap<UnifiedField, FieldRule>,
    /// Overall score required for a non-strong record to be accepted.
    pub good_match: f64,
    /// Best single field score required by the minimum-requirements gate.
    pub weak_match: f64,
    /// Non-strong matches kept after the strong ones of a source.
    pub non_strong_extra: usize,
    /// Matches kept for a source without strong matches.
    pub top_without_strong: usize,
}

impl Default for MatchingRules {
    fn default() -> Self {
        let fields = [
            (UnifiedField::NationalId, 0.20, 85.0),
            (UnifiedField::FullName, 0.40, 75.0),
            (UnifiedField::Dob, 0.25, 90.0),
            (UnifiedField::Email, 0.10, 95.0),
            (UnifiedField::Phone, 0.05, 85.0),
        ]
        .into_iter()
        .map(|(field, weight, fuzzy_threshold)| {
            (
                field,
                FieldRule {
                    weight,
                    fuzzy_threshold,
                },
            )
        })
        .collect();

        Self {
            fields,
            good_match: 75.0,
            weak_match: 65.0,
            non_strong_extra: 2,
            top_without_strong: 3,
        }
    }
}

impl MatchingRules {
    pub fn rule(&self, field: &UnifiedField) -> Option<&FieldRule> {
        self.fields.get(field)
    }

    pub fn weight(&self, field: &UnifiedField) -> f64 {
        self.rule(field).map(|r| r.weight).unwrap_or(0.0)
    }

    pub fn fuzzy_threshold(&self, field: &UnifiedField) -> f64 {
        self.rule(field).map(|r| r.fuzzy_threshold).unwrap_or(100.0)
    }

    /// Sum of all configured weights.
    pub fn total_weight(&self) -> f64 {
        self.fields.values().map(|r| r.weight).sum()
    }

    /// Reject rule sets whose weights cannot produce a meaningful average.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fields.is_empty() {
            anyhow::bail!("matching rules define no scored fields");
        }
        for (field, rule) in &self.fields {
            if rule.weight.is_nan() || rule.weight <= 0.0 {
                anyhow::bail!("weight for {} must be positive", field);
            }
            if !(0.0..=100.0).contains(&rule.fuzzy_threshold) {
                anyhow::bail!("threshold for {} must be within 0-100", field);
            }
        }
        Ok(())
    }
}
