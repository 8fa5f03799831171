//! Profile Match Library
//!
//! Probabilistic entity resolution across heterogeneous customer-data
//! sources: source columns are mapped onto a unified schema, and a partial
//! query (name, date of birth, national ID, email, phone) is matched against
//! every record of every source, ranked, and merged into one profile.
//!
//! # Modules
//!
//! - `normalize`: Name, date, phone, email and ID normalizers.
//! - `similarity`: Fuzzy string measures and the max-reducing scoring pipeline.
//! - `nicknames`: Given-name variant table.
//! - `scorers`: Per-field scorers and their registry.
//! - `aggregator`: Weighted aggregation, strong-match rules and acceptance gate.
//! - `search`: Per-source scanning, ranking and capping.
//! - `merge`: Cross-source ranking and profile merging.
//! - `schema_mapper`: Rule-based column mapping with a bounded mapping cache.
//! - `corpus`: Loaded sources and the corpus collaborator trait.
//! - `profile_store`: Merged profile persistence.
//! - `service`: Request orchestration.
//! - `config`: Configuration and matching rules.
//! - `errors`: Error handling types.
//! - `models`: Core data models.
//! - `obs`: Observability and logging.

pub mod aggregator;
pub mod config;
pub mod corpus;
pub mod errors;
pub mod merge;
pub mod models;
pub mod nicknames;
pub mod normalize;
pub mod obs;
pub mod profile_store;
pub mod schema_mapper;
pub mod scorers;
pub mod search;
pub mod service;
pub mod similarity;

pub use config::{Config, MatchingRules};
pub use corpus::{Corpus, CorpusSource, InMemoryCorpus};
pub use errors::{MatchError, ResultExt, ScoringError};
pub use models::{MergedProfile, Query, SearchOutcome, SearchStatus, UnifiedField};
pub use search::SearchEngine;
pub use service::{ProfileLookup, ProfileService};
