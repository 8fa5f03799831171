use std::fmt;

/// Errors surfaced to callers of the matching service.
///
/// Scoring problems never show up here: they are recovered per record and
/// reported through [`ScoringError`] inside the search report.
#[derive(Debug)]
pub enum MatchError {
    /// The corpus collaborator failed to produce records.
    CorpusLoad(String),
    /// A schema mapping could not be loaded or parsed.
    MappingLoad(String),
    /// The query carries no usable field.
    InvalidQuery(String),
    /// Writing a merged profile failed.
    Storage(String),
    /// JSON (de)serialization failure.
    Serialization(String),
    /// Unexpected internal failure (e.g. a scoring worker panicked).
    Internal(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<MatchError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::CorpusLoad(msg) => write!(f, "Corpus load failed: {}", msg),
            MatchError::MappingLoad(msg) => write!(f, "Mapping load failed: {}", msg),
            MatchError::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
            MatchError::Storage(msg) => write!(f, "Storage error: {}", msg),
            MatchError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            MatchError::Internal(msg) => write!(f, "Internal error: {}", msg),
            MatchError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MatchError::WithContext { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl MatchError {
    /// Innermost error, skipping any context wrappers.
    pub fn root(&self) -> &MatchError {
        match self {
            MatchError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        MatchError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        MatchError::Serialization(err.to_string())
    }
}

/// Per-record scoring failure.
///
/// The search engine isolates these: the record is counted as skipped and
/// the batch continues.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// A compared column holds a value that is not a scalar (array/object).
    MalformedValue { column: String, kind: &'static str },
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::MalformedValue { column, kind } => {
                write!(f, "column '{}' holds a non-scalar {} value", column, kind)
            }
        }
    }
}

impl std::error::Error for ScoringError {}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `MatchError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, MatchError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, MatchError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, MatchError> {
    fn context(self, context: impl Into<String>) -> Result<T, MatchError> {
        self.map_err(|e| MatchError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, MatchError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| MatchError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for io errors raised while persisting profiles
impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, MatchError> {
        self.map_err(|e| MatchError::WithContext {
            source: Box::new(MatchError::from(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, MatchError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| MatchError::WithContext {
            source: Box::new(MatchError::from(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_display() {
        let result: Result<(), MatchError> = Err(MatchError::CorpusLoad("disk gone".into()));
        let err = result.context("loading sources").unwrap_err();

        assert_eq!(
            err.to_string(),
            "loading sources: Corpus load failed: disk gone"
        );
        assert!(matches!(err.root(), MatchError::CorpusLoad(_)));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        let err = result.with_context(|| "writing profile".to_string()).unwrap_err();

        assert!(matches!(err.root(), MatchError::Storage(_)));
    }
}
