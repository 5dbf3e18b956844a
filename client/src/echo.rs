//! Origin-echo filter.
//!
//! Every mutation this client makes is broadcast back to it on the
//! notification channel. The filter decides, for each incoming notification,
//! whether it must be applied to the local list or suppressed because the
//! change was already applied optimistically.
//!
//! # Modes
//!
//! - [`EchoMode::SingleSlot`]: one `awaiting_own_echo` flag. A local success
//!   sets it; the next notification of either kind clears it and is
//!   suppressed. Nothing correlates the two, so a foreign event landing in
//!   the gap is suppressed instead of the echo, and the echo is then applied
//!   a second time. Two local mutations before the first echo have the same
//!   problem.
//! - [`EchoMode::Correlated`]: each mutation carries a token that the store
//!   copies into its broadcast. The ledger tracks tokens from the moment the
//!   request is sent, so the echo is recognized whether it arrives before or
//!   after the response, and any number of mutations may be in flight.

use std::collections::HashMap;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::EchoMode;
use crate::types::Notification;

/// What to do with an incoming notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Suppress,
}

/// Ledger state of one correlation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    /// Request sent, neither response nor echo seen.
    InFlight,
    /// Response applied optimistically, echo still expected.
    Armed,
    /// Echo applied before the response arrived.
    Echoed,
}

#[derive(Debug, Clone)]
enum Slot {
    Single { awaiting_own_echo: bool },
    Correlated { ledger: HashMap<Uuid, TokenState> },
}

/// Decides apply-or-suppress for notifications.
#[derive(Debug, Clone)]
pub struct EchoFilter {
    slot: Slot,
}

impl EchoFilter {
    #[must_use]
    pub fn new(mode: EchoMode) -> Self {
        let slot = match mode {
            EchoMode::SingleSlot => Slot::Single {
                awaiting_own_echo: false,
            },
            EchoMode::Correlated => Slot::Correlated {
                ledger: HashMap::new(),
            },
        };
        Self { slot }
    }

    #[must_use]
    pub fn mode(&self) -> EchoMode {
        match self.slot {
            Slot::Single { .. } => EchoMode::SingleSlot,
            Slot::Correlated { .. } => EchoMode::Correlated,
        }
    }

    /// Issues a token for a request about to be sent.
    ///
    /// Returns `None` in single-slot mode, where requests carry no token.
    pub fn issue_token(&mut self) -> Option<Uuid> {
        match &mut self.slot {
            Slot::Single { .. } => None,
            Slot::Correlated { ledger } => {
                let token = Uuid::new_v4();
                ledger.insert(token, TokenState::InFlight);
                trace!(%token, "Issued correlation token");
                Some(token)
            }
        }
    }

    /// Records that a local mutation succeeded.
    ///
    /// Returns `true` if the caller should apply the optimistic update, and
    /// `false` if the echo already delivered it.
    pub fn on_local_success(&mut self, token: Option<Uuid>) -> bool {
        match &mut self.slot {
            Slot::Single { awaiting_own_echo } => {
                *awaiting_own_echo = true;
                true
            }
            Slot::Correlated { ledger } => {
                let Some(token) = token else {
                    return true;
                };
                match ledger.get(&token).copied() {
                    Some(TokenState::InFlight) => {
                        ledger.insert(token, TokenState::Armed);
                        true
                    }
                    Some(TokenState::Echoed) => {
                        ledger.remove(&token);
                        debug!(%token, "Echo arrived before response, skipping optimistic update");
                        false
                    }
                    Some(TokenState::Armed) | None => true,
                }
            }
        }
    }

    /// Records that a local mutation failed.
    pub fn on_local_failure(&mut self, token: Option<Uuid>) {
        self.forget(token);
    }

    /// Stops tracking `token` without arming anything. Used when the list
    /// shows the mutation's echo was already applied.
    pub fn forget(&mut self, token: Option<Uuid>) {
        if let (Slot::Correlated { ledger }, Some(token)) = (&mut self.slot, token) {
            ledger.remove(&token);
        }
    }

    /// Classifies an incoming notification and advances the state.
    pub fn observe(&mut self, notification: &Notification) -> Decision {
        match &mut self.slot {
            Slot::Single { awaiting_own_echo } => {
                if *awaiting_own_echo {
                    *awaiting_own_echo = false;
                    Decision::Suppress
                } else {
                    Decision::Apply
                }
            }
            Slot::Correlated { ledger } => {
                let Some(token) = notification.token() else {
                    return Decision::Apply;
                };
                match ledger.get(&token).copied() {
                    Some(TokenState::Armed) => {
                        ledger.remove(&token);
                        Decision::Suppress
                    }
                    Some(TokenState::InFlight) => {
                        ledger.insert(token, TokenState::Echoed);
                        Decision::Apply
                    }
                    // A duplicate delivery of an echo we already applied.
                    Some(TokenState::Echoed) => Decision::Suppress,
                    None => Decision::Apply,
                }
            }
        }
    }

    /// True while at least one optimistic update still expects its echo.
    #[must_use]
    pub fn is_awaiting_echo(&self) -> bool {
        match &self.slot {
            Slot::Single { awaiting_own_echo } => *awaiting_own_echo,
            Slot::Correlated { ledger } => ledger.values().any(|s| *s == TokenState::Armed),
        }
    }

    /// Number of tokens the ledger is tracking (always 0 in single-slot mode).
    #[must_use]
    pub fn tracked_tokens(&self) -> usize {
        match &self.slot {
            Slot::Single { .. } => 0,
            Slot::Correlated { ledger } => ledger.len(),
        }
    }

    /// Returns to the idle state, forgetting every expected echo.
    pub fn reset(&mut self) {
        match &mut self.slot {
            Slot::Single { awaiting_own_echo } => *awaiting_own_echo = false,
            Slot::Correlated { ledger } => ledger.clear(),
        }
    }
}
