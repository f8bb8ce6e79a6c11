use lazy_static::lazy_static;
use regex::Regex;
use strsim::jaro_winkler;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Fuzzy matcher resolving user-written filter values to stored values
pub struct FuzzyMatcher {
    /// Similarity threshold (0.0-1.0) for accepting a candidate
    pub similarity_threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.80,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            similarity_threshold: threshold,
        }
    }

    /// Normalize a string for fuzzy matching
    /// - Converts to lowercase
    /// - Removes punctuation
    /// - Collapses whitespace
    pub fn normalize_string(&self, s: &str) -> String {
        let stripped: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();

        WHITESPACE.replace_all(&stripped, " ").trim().to_string()
    }

    /// Calculate similarity between two strings
    /// Returns a score between 0.0 and 1.0 (higher = more similar)
    pub fn similarity(&self, s1: &str, s2: &str) -> f64 {
        let norm1 = self.normalize_string(s1);
        let norm2 = self.normalize_string(s2);

        let jw_score = jaro_winkler(&norm1, &norm2);

        // "zomato" vs "Zomato Ltd"
        let is_substring = norm1.contains(&norm2) || norm2.contains(&norm1);
        let substring_bonus = if is_substring && !norm1.is_empty() && !norm2.is_empty() {
            let len_diff = (norm1.len() as f64 - norm2.len() as f64).abs();
            let max_len = norm1.len().max(norm2.len()) as f64;
            (1.0 - (len_diff / max_len)) * 0.1
        } else {
            0.0
        };

        (jw_score + substring_bonus).min(1.0)
    }

    pub fn is_match(&self, s1: &str, s2: &str) -> bool {
        self.similarity(s1, s2) >= self.similarity_threshold
    }

    /// Find the best matching candidate for `target`
    /// Returns (candidate, similarity_score) if one clears the threshold, None otherwise.
    /// Ties keep the earliest candidate.
    pub fn best_match<'a, I>(&self, target: &str, candidates: I) -> Option<(String, f64)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut best: Option<(String, f64)> = None;

        for candidate in candidates {
            let score = self.similarity(target, candidate);
            if score < self.similarity_threshold {
                continue;
            }
            let better = match &best {
                Some((_, best_score)) => score > *best_score,
                None => true,
            };
            if better {
                best = Some((candidate.clone(), score));
            }
        }

        best
    }
}
