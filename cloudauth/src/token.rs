//! Decoded JSON Web Tokens
//!
//! A [`Token`] is the structurally decoded form of a compact-serialized JWT:
//! three `.`-separated Base64URL segments holding a JSON header, a JSON
//! payload and a signature. Decoding establishes structure only. Whether the
//! token should be trusted is decided elsewhere.

use std::{fmt, str::FromStr};

use crate::{
    b64,
    clock::UnixTime,
    error::{self, DecodeError, Segment},
    json::{JsonObject, JsonValue},
    jwk::KeyIdRef,
};

/// A structurally decoded, immutable JSON Web Token
///
/// The original compact form is retained so that the signed content can be
/// handed to signature verification exactly as it was received.
#[derive(Clone)]
#[must_use]
pub struct Token {
    raw: String,
    signed_len: usize,
    header: JsonObject,
    payload: JsonObject,
    signature: Vec<u8>,
}

impl Token {
    /// Decodes a compact-serialized token
    ///
    /// # Errors
    ///
    /// * [`DecodeError::MalformedToken`] if the input does not have exactly
    ///   three segments
    /// * [`DecodeError::MalformedEncoding`] if any segment is not Base64URL
    /// * [`DecodeError::MalformedClaims`] if the header or payload is not a
    ///   JSON object
    pub fn decode(compact: &str) -> Result<Self, DecodeError> {
        let segments: Vec<&str> = compact.split('.').collect();
        let [header, payload, signature] = segments[..] else {
            return Err(DecodeError::MalformedToken {
                segments: segments.len(),
            });
        };

        let header = decode_object(header, Segment::Header)?;
        let payload = decode_object(payload, Segment::Payload)?;
        let signature = decode_segment(signature, Segment::Signature)?;

        let signed_len = compact.rfind('.').unwrap_or_default();

        Ok(Self {
            raw: compact.to_owned(),
            signed_len,
            header,
            payload,
            signature,
        })
    }

    /// The token in its original compact form
    ///
    /// This is a credential; avoid writing it anywhere it may be retained.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The JOSE header
    pub fn header(&self) -> &JsonObject {
        &self.header
    }

    /// The claims
    pub fn payload(&self) -> &JsonObject {
        &self.payload
    }

    /// The decoded signature bytes
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The bytes covered by the signature
    ///
    /// This is the encoded header, a `.`, and the encoded payload, exactly as
    /// they appeared in the input.
    #[must_use]
    pub fn signed_content(&self) -> &[u8] {
        &self.raw.as_bytes()[..self.signed_len]
    }

    /// The `alg` header parameter
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is present but not a string.
    pub fn algorithm(&self) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.header.get_str("alg")
    }

    /// The `kid` header parameter
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is present but not a string.
    pub fn key_id(&self) -> Result<Option<&KeyIdRef>, error::ClaimTypeMismatch> {
        Ok(self.header.get_str("kid")?.map(KeyIdRef::from_str))
    }

    /// The `jku` header parameter, naming the key set the token claims to be
    /// signed by
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter is present but not a string.
    pub fn key_url(&self) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.header.get_str("jku")
    }

    /// The `iss` claim
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is present but not a string.
    pub fn issuer(&self) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.payload.get_str("iss")
    }

    /// The `aud` claim as a list
    ///
    /// A single string audience is returned as a one-element list, and an
    /// absent claim as an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is neither a string nor a list of strings.
    pub fn audiences(&self) -> Result<Vec<&str>, error::ClaimTypeMismatch> {
        Ok(self.payload.get_string_list("aud")?.unwrap_or_default())
    }

    /// The `sub` claim
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is present but not a string.
    pub fn subject(&self) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.payload.get_str("sub")
    }

    /// The `exp` claim
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is present but not a non-negative number.
    pub fn expiration(&self) -> Result<Option<UnixTime>, error::ClaimTypeMismatch> {
        self.payload.get_unix_time("exp")
    }

    /// The `nbf` claim
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is present but not a non-negative number.
    pub fn not_before(&self) -> Result<Option<UnixTime>, error::ClaimTypeMismatch> {
        self.payload.get_unix_time("nbf")
    }

    /// The `iat` claim
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is present but not a non-negative number.
    pub fn issued_at(&self) -> Result<Option<UnixTime>, error::ClaimTypeMismatch> {
        self.payload.get_unix_time("iat")
    }

    /// The client the token was issued to
    ///
    /// Taken from `cid`, then `azp`, then `client_id`, whichever is present
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the first present claim is not a string.
    pub fn client_id(&self) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.first_str(&["cid", "azp", "client_id"])
    }

    /// The tenant the token was issued for, from `zid` or `app_tid`
    ///
    /// # Errors
    ///
    /// Returns an error if the first present claim is not a string.
    pub fn tenant_id(&self) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.first_str(&["zid", "app_tid"])
    }

    /// The granted scopes
    ///
    /// The `scope` claim may be a list of strings or a single
    /// space-delimited string.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is neither a string nor a list of strings.
    pub fn scopes(&self) -> Result<Vec<&str>, error::ClaimTypeMismatch> {
        match self.payload.get("scope") {
            None => Ok(Vec::new()),
            Some(value) => match value.as_str() {
                Some(s) => Ok(s.split_whitespace().collect()),
                None => Ok(self.payload.get_string_list("scope")?.unwrap_or_default()),
            },
        }
    }

    /// Whether the payload carries the named claim
    #[must_use]
    pub fn has_claim(&self, name: &str) -> bool {
        self.payload.contains_key(name)
    }

    /// Gets an arbitrary claim
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<JsonValue<'_>> {
        self.payload.get(name)
    }

    fn encoded_signature(&self) -> &str {
        self.raw.get(self.signed_len + 1..).unwrap_or_default()
    }

    fn first_str(&self, names: &[&str]) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        match names.iter().find(|n| self.payload.contains_key(n)) {
            Some(name) => self.payload.get_str(name),
            None => Ok(None),
        }
    }
}

fn decode_segment(segment: &str, which: Segment) -> Result<Vec<u8>, DecodeError> {
    b64::decode_url(segment).map_err(|source| DecodeError::MalformedEncoding {
        segment: which,
        source,
    })
}

fn decode_object(segment: &str, which: Segment) -> Result<JsonObject, DecodeError> {
    let raw = decode_segment(segment, which)?;
    JsonObject::from_slice(&raw).map_err(|source| DecodeError::MalformedClaims {
        segment: which,
        source,
    })
}

impl FromStr for Token {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Prints `***JWT***` unless the alternate form is requested
///
/// With `{:#?}` the header and payload segments are printed in a quoted
/// string and the signature is elided, unless a width is given, in which case
/// at most that many characters of the signature are revealed.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            f.write_str(&self.raw[..=self.signed_len])?;
            limited_reveal(self.encoded_signature(), &mut *f, 0)?;
            f.write_str("\"")
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

/// Prints `***JWT***` unless the alternate form is requested
///
/// With `{:#}` the whole token is printed; a width limits how many
/// characters of the signature are revealed.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str(&self.raw[..=self.signed_len])?;
            limited_reveal(self.encoded_signature(), &mut *f, usize::MAX)
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}
