//! Pluggable voting schemes
//!
//! Tallying is a pure function of the scheme, the ballots and the voter
//! roster. Nothing in here touches storage or the event bus.

pub mod scheme;
pub mod weights;

pub use scheme::{tally, Ballot, Roster, Scheme, SchemeName, Tally, ThresholdPreset, VoterProfile};
pub use weights::{effective_weight, DynamicWeights};
