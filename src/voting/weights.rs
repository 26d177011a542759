use serde::{Deserialize, Serialize};

/// Expertise-based weight bonus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicWeights {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bonus")]
    pub bonus_per_match: f64,
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: f64,
}

impl Default for DynamicWeights {
    fn default() -> Self {
        Self {
            enabled: false,
            bonus_per_match: default_bonus(),
            max_multiplier: default_max_multiplier(),
        }
    }
}

fn default_bonus() -> f64 {
    0.5
}

fn default_max_multiplier() -> f64 {
    2.0
}

/// Weight an agent votes with on a session with the given topics.
///
/// Each expertise tag that matches a topic (case-insensitively) adds
/// `bonus_per_match`, capped at `base * max_multiplier`.
pub fn effective_weight(
    base: f64,
    expertise: &[String],
    topics: &[String],
    config: &DynamicWeights,
) -> f64 {
    if !config.enabled || topics.is_empty() {
        return base;
    }

    let matches = expertise
        .iter()
        .filter(|tag| topics.iter().any(|topic| topic.eq_ignore_ascii_case(tag)))
        .count();

    (base + matches as f64 * config.bonus_per_match).min(base * config.max_multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn enabled() -> DynamicWeights {
        DynamicWeights {
            enabled: true,
            bonus_per_match: 0.5,
            max_multiplier: 2.0,
        }
    }

    #[test]
    fn test_disabled_returns_base() {
        let config = DynamicWeights::default();
        let w = effective_weight(1.0, &tags(&["security"]), &tags(&["security"]), &config);
        assert_eq!(w, 1.0);
    }

    #[test]
    fn test_bonus_per_match() {
        let w = effective_weight(1.0, &tags(&["security", "db"]), &tags(&["Security"]), &enabled());
        assert!((w - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_bonus_capped() {
        let expertise = tags(&["a", "b", "c", "d"]);
        let topics = tags(&["a", "b", "c", "d"]);
        let w = effective_weight(1.0, &expertise, &topics, &enabled());
        assert!((w - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_topics_no_bonus() {
        let w = effective_weight(1.5, &tags(&["a"]), &[], &enabled());
        assert_eq!(w, 1.5);
    }
}
