//! Expiration and not-before checks

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use cloudauth::{clock::Clock, Token};

use super::{TokenValidator, ValidatorKind};
use crate::error::{Rejection, ValidationFailure};

/// Rejects tokens that are expired, not yet valid, or lack an expiration
///
/// Both checks allow for the configured clock skew. A token without `exp` is
/// never treated as valid indefinitely.
pub struct TimestampValidator {
    clock: Arc<dyn Clock + Send + Sync>,
    skew: Duration,
}

impl TimestampValidator {
    /// Constructs a validator reading the time from `clock`
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, skew: Duration) -> Self {
        Self { clock, skew }
    }

    /// Checks the token's timestamps against the current time
    ///
    /// # Errors
    ///
    /// Returns the reason the token is not currently valid.
    pub fn check(&self, token: &Token) -> Result<(), Rejection> {
        let now = self.clock.now();

        let expired_at = token.expiration()?.ok_or(Rejection::MissingClaim("exp"))?;
        if now > expired_at.saturating_add(self.skew) {
            return Err(Rejection::TokenExpired { expired_at });
        }

        if let Some(not_before) = token.not_before()? {
            if now.saturating_add(self.skew) < not_before {
                return Err(Rejection::TokenNotYetValid { not_before });
            }
        }

        Ok(())
    }
}

impl fmt::Debug for TimestampValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampValidator")
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenValidator for TimestampValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Timestamp
    }

    async fn validate(&self, token: &Token) -> Result<(), ValidationFailure> {
        Ok(self.check(token)?)
    }
}
