//! The validator chain applied to every token

use std::{fmt, sync::Arc};

use cloudauth::{
    clock::{Clock, System},
    Token,
};

use crate::{
    cache::KeyCache,
    config::{KeyCacheConfig, SignatureSkipPolicy, TrustConfiguration, ValidationSettings},
    context::ValidationContext,
    discovery::DiscoveryCache,
    error::{AuthenticationError, ConfigError, Rejection},
    fetch::{DiscoveryFetcher, KeySetFetcher},
    listener::ValidationListener,
    result::{ValidationError, ValidationResult},
    validator::{
        AudienceValidator, IssuerValidator, SignatureValidator, TimestampValidator,
        TokenValidator, ValidatorKind,
    },
};

/// Runs every configured validator against a token and aggregates the
/// outcome
///
/// Validators run in a fixed order: timestamp, issuer, audience, any custom
/// validators, then signature. Local checks therefore complete before any
/// key is fetched. Every validator runs even after an earlier one failed, so
/// the result lists all the reasons a token was not accepted. The only
/// exception is signature verification, which may be skipped according to
/// the configured [`SignatureSkipPolicy`].
///
/// Once all validators have run, registered listeners are told the outcome.
///
/// # Example
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use cloudauth_validation::{CombiningValidator, TracingListener, TrustConfiguration};
///
/// let trust = TrustConfiguration::new("auth.example.com")
///     .with_client_id("app-client-1")
///     .with_token_keys_endpoint("https://auth.example.com/token_keys".parse()?);
///
/// let validator = CombiningValidator::http_builder(trust)?
///     .with_listener(TracingListener)
///     .build()?;
///
/// let result = validator.validate(&"eyJ...".parse()?).await;
/// if !result.is_valid() {
///     println!("rejected: {result}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CombiningValidator {
    validators: Vec<Arc<dyn TokenValidator>>,
    listeners: Vec<Arc<dyn ValidationListener>>,
    signature_skip: SignatureSkipPolicy,
    key_cache: Arc<KeyCache>,
}

impl CombiningValidator {
    /// Starts building a validator that retrieves keys through `fetcher`
    pub fn builder<F>(trust: TrustConfiguration, fetcher: F) -> CombiningValidatorBuilder
    where
        F: KeySetFetcher + DiscoveryFetcher + 'static,
    {
        let fetcher = Arc::new(fetcher);
        CombiningValidatorBuilder {
            trust,
            key_fetcher: fetcher.clone(),
            discovery_fetcher: fetcher,
            settings: ValidationSettings::default(),
            key_cache_config: KeyCacheConfig::default(),
            key_cache: None,
            clock: Arc::new(System),
            custom: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Starts building a validator that retrieves keys over HTTP
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    #[cfg(feature = "reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    pub fn http_builder(
        trust: TrustConfiguration,
    ) -> Result<CombiningValidatorBuilder, crate::error::FetchError> {
        Ok(Self::builder(trust, crate::fetch::HttpFetcher::new()?))
    }

    /// Validates a decoded token
    ///
    /// Never fails: infrastructure faults are reported in the result
    /// alongside business-rule rejections.
    pub async fn validate(&self, token: &Token) -> ValidationResult {
        let mut errors = Vec::new();

        for validator in &self.validators {
            let kind = validator.kind();

            if kind == ValidatorKind::Signature && self.skip_signature(&errors) {
                tracing::debug!("skipping signature verification after earlier failures");
                errors.push(ValidationError::new(
                    kind,
                    Rejection::SignatureNotChecked.into(),
                ));
                continue;
            }

            if let Err(failure) = validator.validate(token).await {
                tracing::trace!(validator = %kind, %failure, "validator reported failure");
                errors.push(ValidationError::new(kind, failure));
            }
        }

        let result = ValidationResult::from_errors(errors);

        for listener in &self.listeners {
            if result.is_valid() {
                listener.on_success(token);
            } else {
                listener.on_failure(token, result.errors());
            }
        }

        result
    }

    /// Decodes and validates a compact token, then makes it the
    /// authenticated token of the current [`ValidationContext`]
    ///
    /// If the token is not accepted, the context is cleared instead, so that
    /// no earlier principal remains visible.
    ///
    /// On a tokio runtime, call this inside [`ValidationContext::scope`].
    /// Without a scope the token is still returned, but it is not stored and
    /// a warning is logged.
    ///
    /// # Errors
    ///
    /// * [`AuthenticationError::Malformed`] if the token cannot be decoded
    /// * [`AuthenticationError::Invalid`] with the full validation result if
    ///   any validator failed
    pub async fn authenticate(&self, compact: &str) -> Result<Arc<Token>, AuthenticationError> {
        let token = match Token::decode(compact) {
            Ok(token) => Arc::new(token),
            Err(err) => {
                ValidationContext::clear();
                return Err(err.into());
            }
        };

        let result = self.validate(&token).await;
        if result.is_valid() {
            ValidationContext::set(Arc::clone(&token));
            Ok(token)
        } else {
            ValidationContext::clear();
            Err(AuthenticationError::Invalid(result))
        }
    }

    /// The key cache used for signature verification
    ///
    /// Exposed so that applications can invalidate cached key sets.
    #[must_use]
    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    fn skip_signature(&self, earlier: &[ValidationError]) -> bool {
        match self.signature_skip {
            SignatureSkipPolicy::Never => false,
            SignatureSkipPolicy::AfterFault => earlier.iter().any(|e| e.failure().is_fault()),
            SignatureSkipPolicy::AfterAnyFailure => !earlier.is_empty(),
        }
    }
}

/// Configures a [`CombiningValidator`]
#[must_use]
pub struct CombiningValidatorBuilder {
    trust: TrustConfiguration,
    key_fetcher: Arc<dyn KeySetFetcher>,
    discovery_fetcher: Arc<dyn DiscoveryFetcher>,
    settings: ValidationSettings,
    key_cache_config: KeyCacheConfig,
    key_cache: Option<Arc<KeyCache>>,
    clock: Arc<dyn Clock + Send + Sync>,
    custom: Vec<Arc<dyn TokenValidator>>,
    listeners: Vec<Arc<dyn ValidationListener>>,
}

impl CombiningValidatorBuilder {
    /// Sets the clock skew tolerance and signature skip policy
    pub fn with_settings(mut self, settings: ValidationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sizes the key and discovery caches
    ///
    /// Ignored for the key cache if one is supplied with
    /// [`with_key_cache()`][Self::with_key_cache].
    pub fn with_key_cache_config(mut self, config: KeyCacheConfig) -> Self {
        self.key_cache_config = config;
        self
    }

    /// Shares an existing key cache, e.g. between validators for different
    /// audiences of the same identity service
    pub fn with_key_cache(mut self, cache: Arc<KeyCache>) -> Self {
        self.key_cache = Some(cache);
        self
    }

    /// Replaces the system clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a validator to run after the audience check and before signature
    /// verification
    pub fn with_validator(mut self, validator: impl TokenValidator + 'static) -> Self {
        self.custom.push(Arc::new(validator));
        self
    }

    /// Adds a listener to notify of each outcome
    pub fn with_listener(mut self, listener: impl ValidationListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Builds the validator
    ///
    /// # Errors
    ///
    /// Returns an error if the trust configuration is incomplete.
    pub fn build(self) -> Result<CombiningValidator, ConfigError> {
        self.trust.check()?;

        let trust = Arc::new(self.trust);
        let key_cache = self
            .key_cache
            .unwrap_or_else(|| Arc::new(KeyCache::new(self.key_cache_config)));
        let discovery = Arc::new(DiscoveryCache::new(self.key_cache_config));

        let mut validators: Vec<Arc<dyn TokenValidator>> = vec![
            Arc::new(TimestampValidator::new(
                self.clock.clone(),
                self.settings.clock_skew(),
            )),
            Arc::new(IssuerValidator::new(trust.clone())),
            Arc::new(AudienceValidator::new(trust.clone())),
        ];
        validators.extend(self.custom);
        validators.push(Arc::new(SignatureValidator::new(
            trust,
            key_cache.clone(),
            discovery,
            self.key_fetcher,
            self.discovery_fetcher,
            self.clock,
        )));

        Ok(CombiningValidator {
            validators,
            listeners: self.listeners,
            signature_skip: self.settings.signature_skip(),
            key_cache,
        })
    }
}

impl fmt::Debug for CombiningValidatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombiningValidatorBuilder")
            .field("trust", &self.trust)
            .field("settings", &self.settings)
            .field("key_cache_config", &self.key_cache_config)
            .field("custom", &self.custom)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cloudauth::clock::{TestClock, UnixTime};
    use color_eyre::Result;
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::{
        error::{Fault, FetchError, ValidationFailure},
        test::{ScriptedFetcher, TestKey},
    };

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        key: TestKey,
        fetcher: Arc<ScriptedFetcher>,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let key = TestKey::generate("k1")?;
            let fetcher = Arc::new(ScriptedFetcher::default());
            fetcher.publish_keys(&keys_endpoint()?, [&key]);
            Ok(Self { key, fetcher })
        }

        fn builder(&self) -> Result<CombiningValidatorBuilder> {
            let trust = TrustConfiguration::new("example.com")
                .with_client_id("app-client-1")
                .with_token_keys_endpoint(keys_endpoint()?);

            Ok(CombiningValidator::builder(trust, self.fetcher.clone())
                .with_clock(Arc::new(TestClock::new(UnixTime(NOW)))))
        }

        fn validator(&self) -> Result<CombiningValidator> {
            Ok(self.builder()?.build()?)
        }
    }

    fn keys_endpoint() -> Result<Url> {
        Ok(Url::parse("https://auth.example.com/token_keys")?)
    }

    fn claims() -> serde_json::Value {
        json!({
            "iss": "https://auth.example.com",
            "aud": ["app-client-1"],
            "sub": "alice",
            "exp": NOW + 3600,
        })
    }

    fn with_claim(key: &str, value: serde_json::Value) -> serde_json::Value {
        let mut claims = claims();
        claims[key] = value;
        claims
    }

    fn kinds(result: &ValidationResult) -> Vec<ValidatorKind> {
        result.errors().iter().map(ValidationError::validator).collect()
    }

    #[derive(Debug)]
    struct UnreachableRevocationList(Url);

    impl UnreachableRevocationList {
        fn new() -> Result<Self> {
            Ok(Self(Url::parse("https://revocation.example.com/crl")?))
        }
    }

    #[async_trait]
    impl TokenValidator for UnreachableRevocationList {
        fn kind(&self) -> ValidatorKind {
            ValidatorKind::Custom("revocation")
        }

        async fn validate(&self, _token: &Token) -> Result<(), ValidationFailure> {
            Err(Fault::Discovery {
                endpoint: self.0.clone(),
                source: Arc::new(FetchError::Status { status: 503 }),
            }
            .into())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingListener {
        outcomes: Mutex<Vec<Result<(), usize>>>,
    }

    impl ValidationListener for RecordingListener {
        fn on_success(&self, _token: &Token) {
            self.outcomes.lock().expect("poisoned").push(Ok(()));
        }

        fn on_failure(&self, _token: &Token, errors: &[ValidationError]) {
            self.outcomes.lock().expect("poisoned").push(Err(errors.len()));
        }
    }

    #[tokio::test]
    async fn accepts_well_formed_token() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;

        let result = validator.validate(&f.key.token(claims())?).await;

        assert!(result.is_valid(), "{result}");
        assert!(result.reasons().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn reports_only_the_failing_check() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;

        let token = f.key.token(with_claim("aud", json!(["other-app"])))?;
        let result = validator.validate(&token).await;

        assert_eq!(kinds(&result), vec![ValidatorKind::Audience]);
        assert!(!result.has_fault());
        assert_eq!(f.fetcher.key_fetches(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_expired_token() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;

        let token = f.key.token(with_claim("exp", json!(NOW - 3600)))?;
        let result = validator.validate(&token).await;

        assert_eq!(kinds(&result), vec![ValidatorKind::Timestamp]);
        assert!(matches!(
            result.failure_of(ValidatorKind::Timestamp),
            Some(ValidationFailure::Rejected(Rejection::TokenExpired { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn reports_every_failure() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;

        let token = f.key.token(json!({
            "iss": "https://auth.example.net",
            "aud": ["other-app"],
            "exp": NOW - 3600,
        }))?;
        let result = validator.validate(&token).await;

        assert_eq!(
            kinds(&result),
            vec![
                ValidatorKind::Timestamp,
                ValidatorKind::Issuer,
                ValidatorKind::Audience
            ]
        );
        assert_eq!(result.reasons().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_untrusted_issuer_even_with_valid_signature() -> Result<()> {
        let f = Fixture::new()?;
        let jku = Url::parse("https://tenant.example.com/token_keys")?;
        f.fetcher.publish_keys(&jku, [&f.key]);
        let validator = f.validator()?;

        let token = f.key.token_with_header(
            json!({ "alg": "RS256", "kid": "k1", "jku": jku.as_str() }),
            with_claim("iss", json!("https://login.example.org")),
        )?;
        let result = validator.validate(&token).await;

        assert_eq!(kinds(&result), vec![ValidatorKind::Issuer]);
        assert_eq!(f.fetcher.fetched_key_urls(), vec![jku]);
        Ok(())
    }

    #[tokio::test]
    async fn distinguishes_faults_from_rejections() -> Result<()> {
        let f = Fixture::new()?;
        f.fetcher.fail_key_fetches(true);
        let validator = f.validator()?;

        let result = validator.validate(&f.key.token(claims())?).await;

        assert!(!result.is_valid());
        assert!(result.has_fault());
        assert!(matches!(
            result.failure_of(ValidatorKind::Signature),
            Some(ValidationFailure::Fault(Fault::KeyRetrieval { .. }))
        ));
        assert_eq!(result.rejections().count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn skips_signature_after_fault() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f
            .builder()?
            .with_validator(UnreachableRevocationList::new()?)
            .build()?;

        let result = validator.validate(&f.key.token(claims())?).await;

        assert_eq!(
            kinds(&result),
            vec![ValidatorKind::Custom("revocation"), ValidatorKind::Signature]
        );
        assert!(matches!(
            result.failure_of(ValidatorKind::Signature),
            Some(ValidationFailure::Rejected(Rejection::SignatureNotChecked))
        ));
        assert_eq!(f.fetcher.key_fetches(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn verifies_signature_after_fault_when_never_skipping() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f
            .builder()?
            .with_settings(
                ValidationSettings::default().with_signature_skip(SignatureSkipPolicy::Never),
            )
            .with_validator(UnreachableRevocationList::new()?)
            .build()?;

        let result = validator.validate(&f.key.token(claims())?).await;

        assert_eq!(kinds(&result), vec![ValidatorKind::Custom("revocation")]);
        assert_eq!(f.fetcher.key_fetches(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn default_policy_verifies_signature_of_rejected_token() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;

        let token = f.key.token(with_claim("aud", json!(["other-app"])))?;
        let result = validator.validate(&token).await;

        assert_eq!(kinds(&result), vec![ValidatorKind::Audience]);
        assert_eq!(f.fetcher.key_fetches(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn skips_signature_after_any_failure_when_configured() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f
            .builder()?
            .with_settings(
                ValidationSettings::default()
                    .with_signature_skip(SignatureSkipPolicy::AfterAnyFailure),
            )
            .build()?;

        let token = f.key.token(with_claim("aud", json!(["other-app"])))?;
        let result = validator.validate(&token).await;

        assert_eq!(
            kinds(&result),
            vec![ValidatorKind::Audience, ValidatorKind::Signature]
        );
        assert_eq!(f.fetcher.key_fetches(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn applies_configured_clock_skew() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f
            .builder()?
            .with_settings(
                ValidationSettings::default().with_clock_skew(std::time::Duration::ZERO),
            )
            .build()?;

        let token = f.key.token(with_claim("exp", json!(NOW - 60)))?;
        assert!(!validator.validate(&token).await.is_valid());

        let lenient = f.validator()?;
        assert!(lenient.validate(&token).await.is_valid());
        Ok(())
    }

    #[tokio::test]
    async fn notifies_listeners_in_order() -> Result<()> {
        let f = Fixture::new()?;
        let first = Arc::new(RecordingListener::default());
        let second = Arc::new(RecordingListener::default());
        let validator = f
            .builder()?
            .with_listener(first.clone())
            .with_listener(second.clone())
            .build()?;

        let _ = validator.validate(&f.key.token(claims())?).await;
        let _ = validator
            .validate(&f.key.token(with_claim("aud", json!("other-app")))?)
            .await;

        for listener in [first, second] {
            assert_eq!(
                *listener.outcomes.lock().expect("poisoned"),
                vec![Ok(()), Err(1)]
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn authenticate_stores_accepted_token() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;
        let compact = f.key.compact(claims())?;

        ValidationContext::scope(async {
            let token = validator.authenticate(&compact).await?;
            let current = ValidationContext::get();
            assert_eq!(current.as_deref().map(Token::as_str), Some(token.as_str()));
            Ok::<_, color_eyre::Report>(())
        })
        .await
    }

    #[tokio::test]
    async fn authenticate_clears_context_on_rejection() -> Result<()> {
        let f = Fixture::new()?;
        let validator = f.validator()?;
        let good = f.key.compact(claims())?;
        let expired = f.key.compact(with_claim("exp", json!(NOW - 3600)))?;

        ValidationContext::scope(async {
            validator.authenticate(&good).await?;

            let err = validator.authenticate(&expired).await.unwrap_err();
            assert!(matches!(err, AuthenticationError::Invalid(_)));
            assert!(!err.has_fault());
            assert!(ValidationContext::get().is_none());

            let err = validator.authenticate("not-a-token").await.unwrap_err();
            assert!(matches!(err, AuthenticationError::Malformed(_)));
            Ok::<_, color_eyre::Report>(())
        })
        .await
    }

    #[tokio::test]
    async fn unscoped_authenticate_does_not_leak_into_other_tasks() -> Result<()> {
        let f = Fixture::new()?;
        let validator = Arc::new(f.validator()?);
        let compact = f.key.compact(claims())?;

        let authenticating = Arc::clone(&validator);
        let token = tokio::spawn(async move { authenticating.authenticate(&compact).await })
            .await??;
        let seen = tokio::spawn(async { ValidationContext::get() }).await?;

        assert!(!token.as_str().is_empty());
        assert!(seen.is_none());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_see_only_their_own_token() -> Result<()> {
        let f = Fixture::new()?;
        let validator = Arc::new(f.validator()?);

        let mut handles = Vec::new();
        for i in 0..16 {
            let compact = f.key.compact(with_claim("sub", json!(format!("user-{i}"))))?;
            let validator = validator.clone();
            handles.push(tokio::spawn(ValidationContext::scope(async move {
                validator.authenticate(&compact).await?;
                tokio::task::yield_now().await;
                let current = ValidationContext::get()
                    .and_then(|t| t.subject().ok().flatten().map(str::to_owned));
                Ok::<_, color_eyre::Report>((format!("user-{i}"), current))
            })));
        }

        for handle in handles {
            let (expected, current) = handle.await??;
            assert_eq!(current, Some(expected));
        }
        assert_eq!(f.fetcher.key_fetches(), 1);
        Ok(())
    }

    #[test]
    fn refuses_incomplete_trust_configuration() -> Result<()> {
        let f = Fixture::new()?;
        let err = CombiningValidator::builder(
            TrustConfiguration::new("example.com"),
            f.fetcher.clone(),
        )
        .build()
        .unwrap_err();

        assert_eq!(err, ConfigError::NoAudience);
        Ok(())
    }
}
