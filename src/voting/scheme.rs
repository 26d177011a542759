use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{DecisionOutcome, Vote, VoteValue};

const WEIGHT_EPSILON: f64 = 1e-9;

/// Scheme name as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeName {
    #[default]
    WeightedMajority,
    Unanimous,
    Supermajority,
    ConsentBased,
    Advisory,
}

impl SchemeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeName::WeightedMajority => "weighted_majority",
            SchemeName::Unanimous => "unanimous",
            SchemeName::Supermajority => "supermajority",
            SchemeName::ConsentBased => "consent_based",
            SchemeName::Advisory => "advisory",
        }
    }
}

/// Named supermajority thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPreset {
    TwoThirds,
    ThreeQuarters,
}

impl ThresholdPreset {
    pub fn value(&self) -> f64 {
        match self {
            ThresholdPreset::TwoThirds => 2.0 / 3.0,
            ThresholdPreset::ThreeQuarters => 0.75,
        }
    }
}

/// Tallying strategy with its parameters resolved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Scheme {
    WeightedMajority { threshold: f64 },
    Unanimous,
    Supermajority { threshold: f64 },
    ConsentBased,
    Advisory,
}

impl Scheme {
    /// An explicit threshold wins over a preset; supermajority falls back to 2/3
    /// and weighted majority to a simple majority.
    pub fn resolve(
        name: SchemeName,
        threshold: Option<f64>,
        preset: Option<ThresholdPreset>,
    ) -> Self {
        match name {
            SchemeName::WeightedMajority => Scheme::WeightedMajority {
                threshold: threshold.or(preset.map(|p| p.value())).unwrap_or(0.5),
            },
            SchemeName::Supermajority => Scheme::Supermajority {
                threshold: threshold
                    .or(preset.map(|p| p.value()))
                    .unwrap_or(ThresholdPreset::TwoThirds.value()),
            },
            SchemeName::Unanimous => Scheme::Unanimous,
            SchemeName::ConsentBased => Scheme::ConsentBased,
            SchemeName::Advisory => Scheme::Advisory,
        }
    }

    pub fn name(&self) -> SchemeName {
        match self {
            Scheme::WeightedMajority { .. } => SchemeName::WeightedMajority,
            Scheme::Unanimous => SchemeName::Unanimous,
            Scheme::Supermajority { .. } => SchemeName::Supermajority,
            Scheme::ConsentBased => SchemeName::ConsentBased,
            Scheme::Advisory => SchemeName::Advisory,
        }
    }

    /// Whether a ballot value belongs to this scheme's domain
    pub fn accepts(&self, value: VoteValue) -> bool {
        match self {
            Scheme::ConsentBased => matches!(
                value,
                VoteValue::Consent | VoteValue::Object | VoteValue::Abstain
            ),
            _ => matches!(
                value,
                VoteValue::Approve | VoteValue::Reject | VoteValue::Abstain
            ),
        }
    }
}

/// What the tally needs to know about a voter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoterProfile {
    pub weight: f64,
    pub can_veto: bool,
}

impl Default for VoterProfile {
    fn default() -> Self {
        Self {
            weight: 1.0,
            can_veto: false,
        }
    }
}

/// Effective voter profiles keyed by agent id
pub type Roster = HashMap<String, VoterProfile>;

#[derive(Debug, Clone, PartialEq)]
pub struct Ballot {
    pub agent_id: String,
    pub value: VoteValue,
}

impl Ballot {
    pub fn new(agent_id: impl Into<String>, value: VoteValue) -> Self {
        Self {
            agent_id: agent_id.into(),
            value,
        }
    }
}

impl From<&Vote> for Ballot {
    fn from(vote: &Vote) -> Self {
        Self::new(vote.agent_id.clone(), vote.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub scheme: SchemeName,
    pub approve: f64,
    pub reject: f64,
    pub abstain: f64,
    pub total_weight: f64,
    pub ballots: usize,
    pub quorum: usize,
    pub quorum_met: bool,
    pub threshold_met: bool,
    /// None means inconclusive, never rejection
    pub outcome: Option<DecisionOutcome>,
    pub veto_exercised: bool,
    /// Weighted schemes only: non-zero approve and reject weight are equal
    pub deadlocked: bool,
    pub summary: String,
}

/// Count ballots under `scheme`.
///
/// Voters missing from the roster count at weight 1.0 without veto power.
pub fn tally(scheme: &Scheme, ballots: &[Ballot], roster: &Roster, quorum: usize) -> Tally {
    let mut approve = 0.0;
    let mut reject = 0.0;
    let mut abstain = 0.0;
    let mut rejections = 0usize;
    let mut veto_exercised = false;

    for ballot in ballots {
        let profile = roster.get(&ballot.agent_id).copied().unwrap_or_default();
        match ballot.value {
            VoteValue::Approve | VoteValue::Consent => approve += profile.weight,
            VoteValue::Reject | VoteValue::Object => {
                reject += profile.weight;
                rejections += 1;
                if profile.can_veto {
                    veto_exercised = true;
                }
            }
            VoteValue::Abstain => abstain += profile.weight,
        }
    }

    let ratio = if approve + reject > 0.0 {
        approve / (approve + reject)
    } else {
        0.0
    };

    let (threshold_met, decided) = match scheme {
        Scheme::WeightedMajority { threshold } | Scheme::Supermajority { threshold } => {
            let met = ratio + WEIGHT_EPSILON >= *threshold;
            let outcome = if met && !veto_exercised {
                DecisionOutcome::Approved
            } else {
                DecisionOutcome::Rejected
            };
            (met, outcome)
        }
        Scheme::Unanimous | Scheme::ConsentBased => {
            let met = rejections == 0;
            let outcome = if met {
                DecisionOutcome::Approved
            } else {
                DecisionOutcome::Rejected
            };
            (met, outcome)
        }
        Scheme::Advisory => (ratio + WEIGHT_EPSILON >= 0.5, DecisionOutcome::Escalated),
    };

    let quorum_met = ballots.len() >= quorum;
    let outcome = quorum_met.then_some(decided);
    let weighted = matches!(
        scheme,
        Scheme::WeightedMajority { .. } | Scheme::Supermajority { .. }
    );
    let deadlocked =
        weighted && quorum_met && approve > 0.0 && (approve - reject).abs() < WEIGHT_EPSILON;

    let summary = format!(
        "{}: approve {:.2}, reject {:.2}, abstain {:.2} ({} of {} ballots for quorum){}{}",
        scheme.name().as_str(),
        approve,
        reject,
        abstain,
        ballots.len(),
        quorum,
        match outcome {
            Some(o) => format!(" -> {}", o.as_str()),
            None => " -> inconclusive".to_string(),
        },
        if veto_exercised { " [veto]" } else { "" },
    );

    Tally {
        scheme: scheme.name(),
        approve,
        reject,
        abstain,
        total_weight: approve + reject + abstain,
        ballots: ballots.len(),
        quorum,
        quorum_met,
        threshold_met,
        outcome,
        veto_exercised,
        deadlocked,
        summary,
    }
}
