// scrubline-entropy/src/scoring/mod.rs

/// Weights for the confidence calculation.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    /// Added to the confidence when a credential keyword precedes the token.
    pub keyword_match_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword_match_weight: 0.15,
        }
    }
}

/// Calculates a confidence score for a candidate token.
///
/// A score of `1.0` or more means the token should be treated as a secret.
/// The entropy term is the token's entropy relative to `entropy_threshold`.
pub fn calculate_confidence(
    token_entropy: f64,
    entropy_threshold: f64,
    has_keyword_context: bool,
    weights: &ScoringWeights,
) -> f64 {
    if entropy_threshold <= 0.0 {
        return 0.0;
    }
    let entropy_contribution = token_entropy / entropy_threshold;
    let context_contribution = if has_keyword_context {
        weights.keyword_match_weight
    } else {
        0.0
    };

    entropy_contribution + context_contribution
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_raises_confidence() {
        let weights = ScoringWeights::default();
        let without = calculate_confidence(3.6, 4.0, false, &weights);
        let with = calculate_confidence(3.6, 4.0, true, &weights);
        assert!(without < 1.0);
        assert!(with >= 1.0);
    }

    #[test]
    fn test_zero_threshold_never_matches() {
        assert_eq!(calculate_confidence(5.0, 0.0, true, &ScoringWeights::default()), 0.0);
    }
}
