use serde::Deserialize;

use crate::{jwk, Jwk};

/// A JSON Web Key Set (JWKS)
///
/// Keys that cannot be used to verify RS256 signatures are skipped with a
/// warning when a set is parsed, so that a single unusable entry does not
/// make the rest of the set unavailable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// A view of the keys in this set
    #[must_use]
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Consumes the set, returning its keys
    #[must_use]
    pub fn into_keys(self) -> Vec<Jwk> {
        self.keys
    }

    /// Whether the set holds no usable keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<Jwk> for Jwks {
    fn from_iter<T: IntoIterator<Item = Jwk>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct TolerantKeysVisitor;

    impl<'de> serde::de::Visitor<'de> for TolerantKeysVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element()? {
                match value {
                    MaybeJwk::Jwk(jwk) => values.push(jwk),
                    MaybeJwk::Unusable(key) => {
                        tracing::warn!(
                            jwks.idx = index,
                            jwk.kty = ?key.kty,
                            jwk.kid = ?key.kid,
                            "jwk.use" = ?key.usage,
                            jwk.alg = ?key.alg,
                            "skipping JWK not usable for RS256 verification"
                        );
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(Jwk),
        Unusable(JwkLike),
    }

    #[derive(Deserialize)]
    struct JwkLike {
        #[serde(default)]
        kty: Option<String>,
        #[serde(default)]
        kid: Option<jwk::KeyId>,
        #[serde(rename = "use", default)]
        usage: Option<String>,
        #[serde(default)]
        alg: Option<String>,
    }

    deserializer.deserialize_seq(TolerantKeysVisitor)
}
