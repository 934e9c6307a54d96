//! Aggregated validation outcomes

use std::fmt;

use crate::{
    error::{Fault, Rejection, ValidationFailure},
    validator::ValidatorKind,
};

/// A failure reported by one validator
#[derive(Clone, Debug)]
pub struct ValidationError {
    validator: ValidatorKind,
    failure: ValidationFailure,
}

impl ValidationError {
    pub(crate) fn new(validator: ValidatorKind, failure: ValidationFailure) -> Self {
        Self { validator, failure }
    }

    /// The validator that reported the failure
    #[must_use]
    pub fn validator(&self) -> ValidatorKind {
        self.validator
    }

    /// The failure
    #[must_use]
    pub fn failure(&self) -> &ValidationFailure {
        &self.failure
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.validator, self.failure)
    }
}

/// The outcome of validating one token
///
/// A token is valid only if no validator reported a failure. Failures are
/// kept in the order the validators ran.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub(crate) fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    /// Whether the token passed every validator
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The failures, in validator order
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Human-readable reasons the token was not accepted
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Whether any validator reported an infrastructure fault
    #[must_use]
    pub fn has_fault(&self) -> bool {
        self.errors.iter().any(|e| e.failure.is_fault())
    }

    /// The business-rule rejections
    pub fn rejections(&self) -> impl Iterator<Item = &Rejection> {
        self.errors.iter().filter_map(|e| e.failure.rejection())
    }

    /// The infrastructure faults
    pub fn faults(&self) -> impl Iterator<Item = &Fault> {
        self.errors.iter().filter_map(|e| e.failure.fault())
    }

    /// The failure reported by the given validator, if any
    #[must_use]
    pub fn failure_of(&self, validator: ValidatorKind) -> Option<&ValidationFailure> {
        self.errors
            .iter()
            .find(|e| e.validator == validator)
            .map(|e| &e.failure)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("valid");
        }

        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            fmt::Display::fmt(error, f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_valid() {
        let result = ValidationResult::default();
        assert!(result.is_valid());
        assert!(!result.has_fault());
        assert_eq!(result.to_string(), "valid");
    }

    #[test]
    fn reports_reasons_in_order() {
        let result = ValidationResult::from_errors(vec![
            ValidationError::new(
                ValidatorKind::Audience,
                Rejection::MissingClaim("aud").into(),
            ),
            ValidationError::new(ValidatorKind::Signature, Fault::NoKeySource.into()),
        ]);

        assert!(!result.is_valid());
        assert!(result.has_fault());
        assert_eq!(
            result.reasons(),
            vec![
                "audience: missing required claim 'aud'".to_owned(),
                "signature: no key set endpoint available".to_owned(),
            ]
        );
        assert_eq!(result.rejections().count(), 1);
        assert_eq!(result.faults().count(), 1);
        assert!(result.failure_of(ValidatorKind::Timestamp).is_none());
    }
}
