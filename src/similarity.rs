//! String similarity measures on a 0-100 scale, plus the "try several
//! strategies, keep the best" pipeline shared by every field scorer.

use std::collections::BTreeSet;
use std::fmt;
use strsim::normalized_levenshtein;

/// Whole-string edit-distance ratio.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b) * 100.0
}

/// Best ratio of the shorter string against every equally long window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let long_chars: Vec<char> = long.chars().collect();
    let window = short.chars().count();

    let mut best = 0.0_f64;
    for start in 0..=(long_chars.len() - window) {
        let slice: String = long_chars[start..start + window].iter().collect();
        best = best.max(ratio(short, &slice));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

/// Ratio after sorting whitespace tokens, so word order does not matter.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

/// Set-based token comparison that tolerates missing or extra tokens.
///
/// When one side's tokens are a subset of the other's the score is 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let common: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let joined_common = common.join(" ");
    let combine = |rest: &[&str]| -> String {
        if joined_common.is_empty() {
            rest.join(" ")
        } else {
            format!("{} {}", joined_common, rest.join(" "))
        }
    };
    let with_a = combine(&only_a);
    let with_b = combine(&only_b);

    ratio(&joined_common, &with_a)
        .max(ratio(&joined_common, &with_b))
        .max(ratio(&with_a, &with_b))
}

/// Character-sequence ratio: `2 * M / T` where `M` is the length of the
/// longest common subsequence and `T` the combined length.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let matched = prev[b.len()];

    200.0 * matched as f64 / (a.len() + b.len()) as f64
}

/// A named similarity strategy.
pub type Strategy = Box<dyn Fn(&str, &str) -> f64 + Send + Sync>;

/// Ordered list of strategies reduced by maximum.
pub struct ScoringPipeline {
    label: &'static str,
    strategies: Vec<(&'static str, Strategy)>,
}

impl ScoringPipeline {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            strategies: Vec::new(),
        }
    }

    pub fn with<F>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: Fn(&str, &str) -> f64 + Send + Sync + 'static,
    {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    /// The standard string measures, in evaluation order.
    pub fn with_string_measures(self) -> Self {
        self.with("ratio", ratio)
            .with("token_sort", token_sort_ratio)
            .with("token_set", token_set_ratio)
            .with("partial", partial_ratio)
            .with("sequence", sequence_ratio)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Maximum over all strategies, clamped to [0, 100].
    pub fn best(&self, a: &str, b: &str) -> f64 {
        let mut best = 0.0_f64;
        let mut winner = "none";
        for (name, strategy) in &self.strategies {
            let score = strategy(a, b);
            if score > best {
                best = score;
                winner = *name;
            }
        }
        tracing::trace!(
            pipeline = self.label,
            strategy = winner,
            score = best,
            "best strategy"
        );
        best.clamp(0.0, 100.0)
    }
}

impl fmt::Debug for ScoringPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringPipeline")
            .field("label", &self.label)
            .field(
                "strategies",
                &self.strategies.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            )
            .finish()
    }
}
