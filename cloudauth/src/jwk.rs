//! JSON Web Keys usable for token verification
//!
//! The specifications for JSON Web Keys can be found in [RFC7517][].
//! Only RSA public keys intended for signatures are represented here; other
//! key types are skipped when a key set is parsed.
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517

use aliri_braid::braid;
use serde::Deserialize;

use crate::{error, jwa};

const DEFAULT_KEY_ID: &str = "default-kid";

/// The key ID assumed for tokens and keys that do not carry one
#[must_use]
pub fn default_key_id() -> &'static KeyIdRef {
    KeyIdRef::from_str(DEFAULT_KEY_ID)
}

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// An identified JSON Web Key holding an RSA public key
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    algorithm: Option<jwa::SigningAlgorithm>,
    key: jwa::rsa::PublicKey,
}

impl Jwk {
    /// Wraps a public key with no identifier or algorithm restriction
    pub fn new(key: jwa::rsa::PublicKey) -> Self {
        Self {
            key_id: None,
            algorithm: None,
            key,
        }
    }

    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The key ID, or [`default_key_id()`] if the key does not carry one
    #[must_use]
    pub fn effective_key_id(&self) -> &KeyIdRef {
        self.key_id().unwrap_or(default_key_id())
    }

    /// The algorithm this key is restricted to, if any
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::SigningAlgorithm> {
        self.algorithm
    }

    /// The public key material
    #[must_use]
    pub fn public_key(&self) -> &jwa::rsa::PublicKey {
        &self.key
    }

    /// Extracts the public key material
    #[must_use]
    pub fn into_public_key(self) -> jwa::rsa::PublicKey {
        self.key
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: impl Into<KeyId>) -> Self {
        Self {
            key_id: Some(kid.into()),
            ..self
        }
    }

    /// Restricts the key to an algorithm
    pub fn with_algorithm(self, alg: jwa::SigningAlgorithm) -> Self {
        Self {
            algorithm: Some(alg),
            ..self
        }
    }

    /// Whether the key may be used to verify a token signed with `alg`
    #[must_use]
    pub fn is_compatible(&self, alg: jwa::SigningAlgorithm) -> bool {
        self.algorithm.map_or(true, |a| a == alg)
    }
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::KeyRejected;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        if dto.kty != "RSA" {
            return Err(error::key_rejected(format!(
                "unsupported key type '{}'",
                dto.kty
            )));
        }

        if let Some(usage) = dto.usage.as_deref() {
            if usage != "sig" {
                return Err(error::key_rejected(format!(
                    "key usage '{usage}' is not for signatures"
                )));
            }
        }

        let algorithm = dto
            .alg
            .as_deref()
            .map(str::parse::<jwa::SigningAlgorithm>)
            .transpose()
            .map_err(error::key_rejected)?;

        let key = jwa::rsa::PublicKey::from_components(
            crate::b64::decode_url(&dto.n).map_err(error::key_rejected)?,
            crate::b64::decode_url(&dto.e).map_err(error::key_rejected)?,
        )?;

        Ok(Self {
            key_id: dto.kid,
            algorithm,
            key,
        })
    }
}

#[derive(Deserialize)]
struct JwkDto {
    kty: String,
    #[serde(default)]
    kid: Option<KeyId>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(rename = "use", default)]
    usage: Option<String>,
    n: String,
    e: String,
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test;

    #[test]
    fn decodes_rsa_signing_key() -> Result<()> {
        let key = test::TestKey::generate("k1")?;
        let jwk: Jwk = serde_json::from_value(key.to_jwk_json())?;

        assert_eq!(jwk.key_id(), Some(KeyIdRef::from_str("k1")));
        assert_eq!(jwk.algorithm(), Some(jwa::SigningAlgorithm::RS256));
        assert_eq!(jwk.public_key(), &key.public_key()?);
        Ok(())
    }

    #[test]
    fn keys_without_id_use_default_id() -> Result<()> {
        let key = test::TestKey::generate("ignored")?;
        let mut json = key.to_jwk_json();
        json.as_object_mut().expect("object").remove("kid");

        let jwk: Jwk = serde_json::from_value(json)?;
        assert_eq!(jwk.key_id(), None);
        assert_eq!(jwk.effective_key_id(), default_key_id());
        Ok(())
    }

    #[test]
    fn effective_key_id_prefers_explicit_id() -> Result<()> {
        let key = test::TestKey::generate("k1")?;
        let jwk = Jwk::new(key.public_key()?).with_key_id("rotating-7".to_owned());

        let kid: &KeyIdRef = jwk.effective_key_id();
        assert_eq!(kid.as_str(), "rotating-7");
        assert_ne!(kid, default_key_id());
        Ok(())
    }

    #[test]
    fn rejects_encryption_keys() -> Result<()> {
        let key = test::TestKey::generate("k1")?;
        let mut json = key.to_jwk_json();
        json["use"] = "enc".into();

        assert!(serde_json::from_value::<Jwk>(json).is_err());
        Ok(())
    }

    #[test]
    fn rejects_other_algorithms() -> Result<()> {
        let key = test::TestKey::generate("k1")?;
        let mut json = key.to_jwk_json();
        json["alg"] = "PS256".into();

        assert!(serde_json::from_value::<Jwk>(json).is_err());
        Ok(())
    }

    #[test]
    fn rejects_non_rsa_keys() {
        let json = serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "kid": "ec",
            "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
            "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
        });

        assert!(serde_json::from_value::<Jwk>(json).is_err());
    }

    #[test]
    fn unrestricted_keys_are_compatible() -> Result<()> {
        let key = test::TestKey::generate("k1")?;
        let jwk = Jwk::new(key.public_key()?);
        assert!(jwk.is_compatible(jwa::SigningAlgorithm::RS256));
        Ok(())
    }
}
