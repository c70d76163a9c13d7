//! Handshake state tracking.

use framebridge_core::Origin;

/// Initiator side: `Idle → Offering → Paired`, or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    Idle,
    Offering,
    Paired,
    Failed,
}

/// Responder side: `Waiting → Ready`. The responder never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Waiting,
    Ready,
}

/// Transient initiator state for one pairing attempt.
#[derive(Debug)]
pub struct HandshakeSession {
    state: InitiatorState,
    attempts: u32,
    max_attempts: u32,
    target: Origin,
}

impl HandshakeSession {
    pub fn new(target: Origin, max_attempts: u32) -> Self {
        Self {
            state: InitiatorState::Idle,
            attempts: 0,
            max_attempts,
            target,
        }
    }

    /// The embedded context is loaded; start offering.
    pub fn begin(&mut self) {
        if self.state == InitiatorState::Idle {
            self.state = InitiatorState::Offering;
            self.attempts = 0;
        }
    }

    /// Claim the next offer. `None` once the budget is spent or the session
    /// is no longer offering.
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.state != InitiatorState::Offering || self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn pair(&mut self) {
        if self.state == InitiatorState::Offering {
            self.state = InitiatorState::Paired;
        }
    }

    pub fn fail(&mut self) {
        if self.state != InitiatorState::Paired {
            self.state = InitiatorState::Failed;
        }
    }

    pub fn state(&self) -> InitiatorState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn target(&self) -> &Origin {
        &self.target
    }
}
