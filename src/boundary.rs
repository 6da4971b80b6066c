//! Error boundary state machine.
//!
//! ```text
//! Healthy --render fails--> Propagating(error)        (at the failing instance)
//! Healthy --descendant fails--> Caught(error, token)  (at the nearest boundary)
//! Caught(_, token) --reset(token)--> Healthy          (failed child remounted from scratch)
//! ```
//!
//! A boundary catches on behalf of one child slot: the direct child whose subtree failed. Only
//! that slot shows the fallback; the boundary's other children keep rendering normally. A reset
//! carrying any other token is stale and leaves the boundary untouched.

use crate::foundation::error::{ArborError, RenderError};
use crate::instance::{InstancePath, PathSegment};
use crate::scheduler::{QueueHandle, Request};

/// Generation of a caught failure. A fresh token is issued every time a boundary catches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResetToken(pub(crate) u64);

impl ResetToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ErrorStatus {
    #[default]
    Healthy,
    Caught {
        error: RenderError,
        token: ResetToken,
        /// Direct child whose subtree failed; the fallback renders in its place.
        slot: PathSegment,
    },
    Propagating(RenderError),
}

impl ErrorStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn caught(&self) -> Option<(&RenderError, ResetToken)> {
        match self {
            Self::Caught { error, token, .. } => Some((error, *token)),
            _ => None,
        }
    }

    pub fn caught_slot(&self) -> Option<&PathSegment> {
        match self {
            Self::Caught { slot, .. } => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn fail(&mut self, error: RenderError) {
        *self = Self::Propagating(error);
    }

    /// Returns false if the boundary was not healthy; a boundary that already shows its fallback
    /// does not catch again.
    pub(crate) fn catch(&mut self, error: RenderError, token: ResetToken, slot: PathSegment) -> bool {
        if !self.is_healthy() {
            return false;
        }
        *self = Self::Caught { error, token, slot };
        true
    }

    pub(crate) fn reset(&mut self, token: ResetToken) -> bool {
        match self {
            Self::Caught { token: current, .. } if *current == token => {
                *self = Self::Healthy;
                true
            }
            _ => false,
        }
    }
}

/// What a boundary's fallback receives: the failure, its token and a way to retry.
#[derive(Clone, Debug)]
pub struct CaughtError {
    pub error: RenderError,
    pub token: ResetToken,
    pub boundary: InstancePath,
    pub(crate) queue: QueueHandle,
}

impl CaughtError {
    /// Request a fresh attempt at the child subtree that failed. Takes effect on the next flush.
    /// Returns false if the runtime that owned the boundary is gone.
    pub fn reset(&self) -> bool {
        self.queue.push(Request::Reset {
            boundary: self.boundary.clone(),
            token: self.token,
        })
    }
}

/// A failure that reached the root without meeting a boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct UncaughtError {
    pub path: InstancePath,
    pub error: RenderError,
}

impl From<UncaughtError> for ArborError {
    fn from(e: UncaughtError) -> Self {
        Self::Uncaught {
            path: e.path.to_string(),
            message: e.error.to_string(),
        }
    }
}
