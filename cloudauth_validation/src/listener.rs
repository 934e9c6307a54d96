//! Hooks notified of validation outcomes

use std::{fmt, sync::Arc};

use cloudauth::Token;

use crate::ValidationError;

/// Observes the outcome of each validation
///
/// Listeners are called on the validating task, in registration order, after
/// every validator has run. They must not block.
pub trait ValidationListener: Send + Sync + fmt::Debug {
    /// Called when a token passed every validator
    fn on_success(&self, token: &Token);

    /// Called when a token failed one or more validators
    fn on_failure(&self, token: &Token, errors: &[ValidationError]);
}

impl<T: ValidationListener + ?Sized> ValidationListener for Arc<T> {
    fn on_success(&self, token: &Token) {
        T::on_success(self, token);
    }

    fn on_failure(&self, token: &Token, errors: &[ValidationError]) {
        T::on_failure(self, token, errors);
    }
}

/// Emits one `tracing` event per validation outcome
///
/// Only the subject and client ID of the token are recorded, never the token
/// itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingListener;

impl ValidationListener for TracingListener {
    fn on_success(&self, token: &Token) {
        tracing::debug!(
            token.sub = token.subject().ok().flatten(),
            token.client_id = token.client_id().ok().flatten(),
            "token accepted"
        );
    }

    fn on_failure(&self, token: &Token, errors: &[ValidationError]) {
        let reasons = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let fault = errors.iter().any(|e| e.failure().is_fault());

        tracing::info!(
            token.sub = token.subject().ok().flatten(),
            token.client_id = token.client_id().ok().flatten(),
            fault,
            %reasons,
            "token rejected"
        );
    }
}
