use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::{ParlanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AgentState {
    Idle = 0,
    Listening = 1,
    Thinking = 2,
    Speaking = 3,
}

impl AgentState {
    pub const ALL: [AgentState; 4] = [
        AgentState::Idle,
        AgentState::Listening,
        AgentState::Thinking,
        AgentState::Speaking,
    ];

    fn from_u8(raw: u8) -> AgentState {
        match raw {
            1 => AgentState::Listening,
            2 => AgentState::Thinking,
            3 => AgentState::Speaking,
            _ => AgentState::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Idle => "Idle",
            AgentState::Listening => "Listening",
            AgentState::Thinking => "Thinking",
            AgentState::Speaking => "Speaking",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of permitted `from -> to` edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    allowed: [[bool; 4]; 4],
}

impl TransitionTable {
    /// Builds a table, rejecting self-loops and repeated edges.
    pub fn new(edges: &[(AgentState, AgentState)]) -> Result<Self> {
        let mut allowed = [[false; 4]; 4];
        for &(from, to) in edges {
            if from == to {
                return Err(ParlanceError::Config(format!("self transition on {from}")));
            }
            let cell = &mut allowed[from as usize][to as usize];
            if *cell {
                return Err(ParlanceError::Config(format!("duplicate transition {from} -> {to}")));
            }
            *cell = true;
        }
        Ok(Self { allowed })
    }

    /// The turn-taking cycle plus the two interruption edges.
    pub fn conversational() -> Self {
        use AgentState::*;
        let mut allowed = [[false; 4]; 4];
        for (from, to) in [
            (Idle, Listening),
            (Listening, Thinking),
            (Thinking, Speaking),
            (Speaking, Idle),
            (Speaking, Listening),
            (Thinking, Listening),
        ] {
            allowed[from as usize][to as usize] = true;
        }
        Self { allowed }
    }

    pub fn allows(&self, from: AgentState, to: AgentState) -> bool {
        self.allowed[from as usize][to as usize]
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::conversational()
    }
}

/// Atomically updated current state, guarded by a transition table.
#[derive(Debug)]
pub struct StateMachine {
    current: AtomicU8,
    table: TransitionTable,
}

impl StateMachine {
    pub fn new(table: TransitionTable) -> Self {
        Self {
            current: AtomicU8::new(AgentState::Idle as u8),
            table,
        }
    }

    pub fn current(&self) -> AgentState {
        AgentState::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Moves `from -> to`; fails when the edge is not in the table or the
    /// machine is no longer in `from`.
    pub fn transition(&self, from: AgentState, to: AgentState) -> Result<()> {
        if !self.table.allows(from, to) {
            return Err(ParlanceError::IllegalTransition { from, to });
        }
        self.current
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| ParlanceError::IllegalTransition {
                from: AgentState::from_u8(actual),
                to,
            })
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(TransitionTable::conversational())
    }
}
