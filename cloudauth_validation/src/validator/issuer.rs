//! Issuer and key set URL domain checks

use std::sync::Arc;

use async_trait::async_trait;
use cloudauth::Token;
use url::Url;

use super::{TokenValidator, ValidatorKind};
use crate::{
    config::TrustConfiguration,
    error::{Rejection, ValidationFailure},
};

/// Rejects tokens not issued within a trusted issuer domain
///
/// A token that names its own key set through the `jku` header is also
/// rejected unless that key set lies within a trusted domain, even when the
/// issuer itself is trusted.
#[derive(Debug)]
pub struct IssuerValidator {
    trust: Arc<TrustConfiguration>,
}

impl IssuerValidator {
    /// Constructs a validator for the given trust configuration
    #[must_use]
    pub fn new(trust: Arc<TrustConfiguration>) -> Self {
        Self { trust }
    }

    /// Checks the token's `iss` claim and `jku` header
    ///
    /// # Errors
    ///
    /// Returns the reason the issuer or key set URL is not trusted.
    pub fn check(&self, token: &Token) -> Result<(), Rejection> {
        let issuer = token.issuer()?.ok_or(Rejection::MissingClaim("iss"))?;
        if self.trust.trusted_url(issuer).is_none() {
            return Err(Rejection::IssuerMismatch {
                issuer: issuer.to_owned(),
            });
        }

        trusted_key_url(&self.trust, token)?;
        Ok(())
    }
}

/// The token's `jku` header, if present and within a trusted domain
///
/// # Errors
///
/// Returns [`Rejection::UntrustedKeyUrl`] if the header names a key set
/// outside the trusted domains.
pub(crate) fn trusted_key_url(
    trust: &TrustConfiguration,
    token: &Token,
) -> Result<Option<Url>, Rejection> {
    match token.key_url()? {
        None => Ok(None),
        Some(jku) => trust
            .trusted_url(jku)
            .map(Some)
            .ok_or_else(|| Rejection::UntrustedKeyUrl {
                url: jku.to_owned(),
            }),
    }
}

#[async_trait]
impl TokenValidator for IssuerValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Issuer
    }

    async fn validate(&self, token: &Token) -> Result<(), ValidationFailure> {
        Ok(self.check(token)?)
    }
}
