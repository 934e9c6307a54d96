//! Audience checks

use std::sync::Arc;

use async_trait::async_trait;
use cloudauth::Token;

use super::{TokenValidator, ValidatorKind};
use crate::{
    config::TrustConfiguration,
    error::{Rejection, ValidationFailure},
};

/// Rejects tokens not addressed to this application
///
/// The audience candidates are the `aud` claim or, when it is absent or
/// empty, the application prefixes of granted scopes (`<app>.<scope>`),
/// together with the client the token was issued to. The token is accepted
/// if any candidate is accepted by the trust configuration.
#[derive(Debug)]
pub struct AudienceValidator {
    trust: Arc<TrustConfiguration>,
}

impl AudienceValidator {
    /// Constructs a validator for the given trust configuration
    #[must_use]
    pub fn new(trust: Arc<TrustConfiguration>) -> Self {
        Self { trust }
    }

    /// Checks the token's audience candidates
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::MissingClaim`] if the token has no audience
    /// candidates at all, or [`Rejection::AudienceMismatch`] if none is
    /// accepted.
    pub fn check(&self, token: &Token) -> Result<(), Rejection> {
        let candidates = audience_candidates(token)?;

        if candidates.is_empty() {
            return Err(Rejection::MissingClaim("aud"));
        }

        if candidates.iter().any(|c| self.trust.accepts_audience(c)) {
            Ok(())
        } else {
            Err(Rejection::AudienceMismatch {
                found: candidates.into_iter().map(str::to_owned).collect(),
            })
        }
    }
}

fn audience_candidates(token: &Token) -> Result<Vec<&str>, Rejection> {
    let mut candidates = token.audiences()?;

    if candidates.is_empty() {
        candidates = token
            .scopes()?
            .into_iter()
            .filter_map(|scope| scope.split_once('.').map(|(app, _)| app))
            .filter(|app| !app.is_empty())
            .collect();
    }

    if let Some(client_id) = token.client_id()? {
        candidates.push(client_id);
    }

    let mut seen = Vec::with_capacity(candidates.len());
    candidates.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(*c);
            true
        }
    });

    Ok(candidates)
}

#[async_trait]
impl TokenValidator for AudienceValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Audience
    }

    async fn validate(&self, token: &Token) -> Result<(), ValidationFailure> {
        Ok(self.check(token)?)
    }
}
