//! Completion polling
//!
//! Each core is polled on its own until it leaves the running state or its
//! retry budget runs out. The per-core outcomes are gathered into a
//! [`PollReport`] from which the bad-core set is derived.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::backend::Transport;
use crate::error::{NetExpError, Result};
use crate::protocol::{core_config_address, CompletionState, RootBlock};
use crate::types::CoreAddr;

/// Final completion status of one core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The core reported success
    Success,
    /// The core reported something other than running or success
    Failed(u32),
    /// The core was still running when the retry budget ran out
    TimedOut,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Success)
    }
}

/// Retry policy for polling a single core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Waits allowed while the core is running
    pub retries: u32,
}

/// Read the completion state of `core` until it settles
pub fn poll_core<T: Transport + ?Sized>(
    transport: &mut T,
    core: CoreAddr,
    policy: PollPolicy,
) -> Result<PollOutcome> {
    let address = core_config_address(core.core) + RootBlock::COMPLETION_STATE_OFFSET as u32;
    let mut remaining = policy.retries;

    loop {
        let bytes = transport.read_bytes(core, address, 4)?;
        let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
            NetExpError::MalformedRecord(format!(
                "Completion state of {} is {} bytes, expected 4",
                core,
                bytes.len()
            ))
        })?;

        match CompletionState::from_raw(u32::from_le_bytes(raw)) {
            CompletionState::Success => return Ok(PollOutcome::Success),
            CompletionState::Running if remaining == 0 => return Ok(PollOutcome::TimedOut),
            CompletionState::Running => {
                remaining -= 1;
                transport.wait(policy.interval);
            }
            other => return Ok(PollOutcome::Failed(other.to_raw())),
        }
    }
}

/// Outcomes of every polled core, in polling order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub outcomes: Vec<(CoreAddr, PollOutcome)>,
}

impl PollReport {
    pub fn push(&mut self, core: CoreAddr, outcome: PollOutcome) {
        self.outcomes.push((core, outcome));
    }

    /// Cores that failed or timed out
    pub fn bad_cores(&self) -> BTreeSet<CoreAddr> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|&(core, _)| core)
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_success())
    }

    pub fn outcome(&self, core: CoreAddr) -> Option<PollOutcome> {
        self.outcomes
            .iter()
            .find(|&&(c, _)| c == core)
            .map(|&(_, outcome)| outcome)
    }
}
