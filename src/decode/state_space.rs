//! The closed decoder state set.

use serde::{Deserialize, Serialize};

/// Number of base states.
pub const NUM_STATES: usize = 5;

/// Base decoder states, in index order.
///
/// `A` and `B` are the two speakers, `Ovl` both speaking at once, `Leak`
/// bleed-through from one channel into the other's microphone. Leak is not
/// real speech and can never begin an inter-pausal unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    #[serde(rename = "SIL")]
    Sil,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "OVL")]
    Ovl,
    #[serde(rename = "LEAK")]
    Leak,
}

impl State {
    /// All states in index order.
    pub const ALL: [State; NUM_STATES] = [State::Sil, State::A, State::B, State::Ovl, State::Leak];

    /// Index of this state in the canonical ordering.
    pub fn index(self) -> usize {
        match self {
            State::Sil => 0,
            State::A => 1,
            State::B => 2,
            State::Ovl => 3,
            State::Leak => 4,
        }
    }

    /// State for an index, if in range.
    pub fn from_index(index: usize) -> Option<State> {
        State::ALL.get(index).copied()
    }

    /// Canonical label.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Sil => "SIL",
            State::A => "A",
            State::B => "B",
            State::Ovl => "OVL",
            State::Leak => "LEAK",
        }
    }

    /// Parse a canonical label.
    pub fn from_label(label: &str) -> Option<State> {
        match label {
            "SIL" => Some(State::Sil),
            "A" => Some(State::A),
            "B" => Some(State::B),
            "OVL" => Some(State::Ovl),
            "LEAK" => Some(State::Leak),
            _ => None,
        }
    }

    /// True for the states that can begin an IPU (A, B, OVL).
    pub fn is_ipu_label(self) -> bool {
        matches!(self, State::A | State::B | State::Ovl)
    }

    /// True for the two plain speaker states.
    pub fn is_speaker(self) -> bool {
        matches!(self, State::A | State::B)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
