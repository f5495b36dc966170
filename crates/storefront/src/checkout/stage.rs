//! Checkout state machine.
//!
//! ```text
//! Idle -> Validating -> Allocating -> Building -> Committing -> Succeeded
//!   \          \             \            \            \
//!    +----------+-------------+------------+------------+----> Failed
//! ```
//!
//! `Succeeded` and `Failed` are terminal. Every checkout request starts a fresh
//! [`CheckoutAttempt`].

use std::fmt;

use tracing::{error, info};
use uuid::Uuid;

/// Stage of one checkout attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckoutStage {
    Idle,
    /// Cart, session, customer, and stock checks.
    Validating,
    /// Next order and order-item identifiers.
    Allocating,
    /// Stock arithmetic and mutation assembly.
    Building,
    /// The single write request is in flight.
    Committing,
    Succeeded,
    Failed,
}

impl CheckoutStage {
    /// Whether the machine may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Validating)
                | (Self::Validating, Self::Allocating)
                | (Self::Allocating, Self::Building)
                | (Self::Building, Self::Committing)
                | (Self::Committing, Self::Succeeded)
                | (
                    Self::Idle
                        | Self::Validating
                        | Self::Allocating
                        | Self::Building
                        | Self::Committing,
                    Self::Failed
                )
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Allocating => "allocating",
            Self::Building => "building",
            Self::Committing => "committing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One run of the checkout state machine.
#[derive(Debug, Clone)]
pub struct CheckoutAttempt {
    id: Uuid,
    history: Vec<CheckoutStage>,
}

impl CheckoutAttempt {
    /// Start a fresh attempt in `Idle`.
    #[must_use]
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            history: vec![CheckoutStage::Idle],
        }
    }

    /// Correlation id of this attempt.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> CheckoutStage {
        self.history
            .last()
            .copied()
            .unwrap_or(CheckoutStage::Idle)
    }

    /// Every stage visited, in order.
    #[must_use]
    pub fn history(&self) -> &[CheckoutStage] {
        &self.history
    }

    /// Move to `next`. Illegal transitions are refused and logged.
    pub fn advance(&mut self, next: CheckoutStage) -> bool {
        let current = self.stage();
        let legal = current.can_transition_to(next);
        debug_assert!(legal, "illegal checkout transition {current} -> {next}");
        if !legal {
            error!(from = %current, to = %next, "Illegal checkout transition");
            return false;
        }
        info!(from = %current, to = %next, "Checkout stage");
        self.history.push(next);
        true
    }
}
