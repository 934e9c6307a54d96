//! A minimal, read-only view of JSON objects
//!
//! Token headers and payloads are arbitrary string-keyed JSON objects. The
//! types here expose them through typed getters so that callers never need to
//! match on the underlying parser's value representation. Every getter
//! distinguishes between an absent member (`Ok(None)`) and a member of the
//! wrong JSON type (`Err(ClaimTypeMismatch)`).

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{clock::UnixTime, error};

/// The kind of a JSON value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JsonKind {
    /// `null`
    Null,
    /// `true` or `false`
    Bool,
    /// Any JSON number
    Number,
    /// A JSON string
    String,
    /// A JSON array
    Array,
    /// A JSON object
    Object,
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };

        f.write_str(s)
    }
}

/// An owned JSON object
///
/// Only constructed by decoding; there is no way to mutate the object once
/// it has been parsed.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
#[must_use]
pub struct JsonObject {
    members: Map<String, Value>,
}

impl JsonObject {
    /// Parses a JSON object from raw bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid JSON, or if the top-level
    /// value is anything other than an object.
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// A borrowed view of this object
    #[inline]
    pub fn view(&self) -> JsonObjectRef<'_> {
        JsonObjectRef {
            members: &self.members,
        }
    }

    /// Whether the object contains the named member
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    /// The number of members in the object
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the object has no members
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over the member names
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Gets an untyped member
    #[must_use]
    pub fn get(&self, key: &str) -> Option<JsonValue<'_>> {
        self.view().get(key)
    }

    /// Gets a string member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a string.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, error::ClaimTypeMismatch> {
        self.view().get_str(key)
    }

    /// Gets a member that may be a single string or an array of strings
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but is neither a string nor
    /// an array made up only of strings.
    pub fn get_string_list(
        &self,
        key: &str,
    ) -> Result<Option<Vec<&str>>, error::ClaimTypeMismatch> {
        self.view().get_string_list(key)
    }

    /// Gets an unsigned integer member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a non-negative integer.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, error::ClaimTypeMismatch> {
        self.view().get_u64(key)
    }

    /// Gets a numeric member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a number.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, error::ClaimTypeMismatch> {
        self.view().get_f64(key)
    }

    /// Gets a boolean member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a boolean.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, error::ClaimTypeMismatch> {
        self.view().get_bool(key)
    }

    /// Gets a member holding seconds since the Unix epoch
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a non-negative number.
    pub fn get_unix_time(&self, key: &str) -> Result<Option<UnixTime>, error::ClaimTypeMismatch> {
        self.view().get_unix_time(key)
    }

    /// Gets a nested object member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not an object.
    pub fn get_object(
        &self,
        key: &str,
    ) -> Result<Option<JsonObjectRef<'_>>, error::ClaimTypeMismatch> {
        self.view().get_object(key)
    }
}

/// A borrowed JSON object
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JsonObjectRef<'a> {
    members: &'a Map<String, Value>,
}

impl<'a> JsonObjectRef<'a> {
    /// Gets an untyped member
    #[must_use]
    pub fn get(self, key: &str) -> Option<JsonValue<'a>> {
        self.members.get(key).map(JsonValue::new)
    }

    /// Whether the object contains the named member
    #[must_use]
    pub fn contains_key(self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    /// Iterates over the member names
    pub fn keys(self) -> impl Iterator<Item = &'a str> {
        self.members.keys().map(String::as_str)
    }

    /// Gets a string member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a string.
    pub fn get_str(self, key: &str) -> Result<Option<&'a str>, error::ClaimTypeMismatch> {
        self.typed(key, "string", JsonValue::as_str)
    }

    /// Gets a member that may be a single string or an array of strings
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but is neither a string nor
    /// an array made up only of strings.
    pub fn get_string_list(
        self,
        key: &str,
    ) -> Result<Option<Vec<&'a str>>, error::ClaimTypeMismatch> {
        self.typed(key, "string or array of strings", |v| match v.inner {
            Value::String(s) => Some(vec![s.as_str()]),
            Value::Array(items) => items.iter().map(Value::as_str).collect(),
            _ => None,
        })
    }

    /// Gets an unsigned integer member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a non-negative integer.
    pub fn get_u64(self, key: &str) -> Result<Option<u64>, error::ClaimTypeMismatch> {
        self.typed(key, "unsigned integer", JsonValue::as_u64)
    }

    /// Gets a numeric member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a number.
    pub fn get_f64(self, key: &str) -> Result<Option<f64>, error::ClaimTypeMismatch> {
        self.typed(key, "number", JsonValue::as_f64)
    }

    /// Gets a boolean member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a boolean.
    pub fn get_bool(self, key: &str) -> Result<Option<bool>, error::ClaimTypeMismatch> {
        self.typed(key, "boolean", JsonValue::as_bool)
    }

    /// Gets a member holding seconds since the Unix epoch
    ///
    /// Fractional seconds are truncated.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not a non-negative number.
    pub fn get_unix_time(self, key: &str) -> Result<Option<UnixTime>, error::ClaimTypeMismatch> {
        self.typed(key, "numeric date", |v| match v.as_u64() {
            Some(secs) => Some(UnixTime(secs)),
            None => v.as_f64().and_then(UnixTime::from_secs_f64),
        })
    }

    /// Gets a nested object member
    ///
    /// # Errors
    ///
    /// Returns an error if the member is present but not an object.
    pub fn get_object(
        self,
        key: &str,
    ) -> Result<Option<JsonObjectRef<'a>>, error::ClaimTypeMismatch> {
        self.typed(key, "object", JsonValue::as_object)
    }

    fn typed<T>(
        self,
        key: &str,
        expected: &'static str,
        convert: impl FnOnce(JsonValue<'a>) -> Option<T>,
    ) -> Result<Option<T>, error::ClaimTypeMismatch> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match convert(value) {
                Some(v) => Ok(Some(v)),
                None => Err(error::claim_type_mismatch(key, expected, value.kind())),
            },
        }
    }
}

/// A borrowed JSON value of any kind
#[derive(Clone, Copy, PartialEq)]
pub struct JsonValue<'a> {
    inner: &'a Value,
}

impl<'a> JsonValue<'a> {
    fn new(inner: &'a Value) -> Self {
        Self { inner }
    }

    /// The kind of value
    #[must_use]
    pub fn kind(self) -> JsonKind {
        match self.inner {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Bool,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }

    /// Whether the value is `null`
    #[must_use]
    pub fn is_null(self) -> bool {
        self.inner.is_null()
    }

    /// The value as a string, if it is one
    #[must_use]
    pub fn as_str(self) -> Option<&'a str> {
        self.inner.as_str()
    }

    /// The value as a boolean, if it is one
    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        self.inner.as_bool()
    }

    /// The value as an unsigned integer, if it is one
    #[must_use]
    pub fn as_u64(self) -> Option<u64> {
        self.inner.as_u64()
    }

    /// The value as a signed integer, if it is one
    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        self.inner.as_i64()
    }

    /// The value as a floating point number, if it is any number
    #[must_use]
    pub fn as_f64(self) -> Option<f64> {
        self.inner.as_f64()
    }

    /// The elements of the value, if it is an array
    #[must_use]
    pub fn as_array(self) -> Option<impl ExactSizeIterator<Item = JsonValue<'a>>> {
        self.inner
            .as_array()
            .map(|items| items.iter().map(JsonValue::new))
    }

    /// The value as an object, if it is one
    #[must_use]
    pub fn as_object(self) -> Option<JsonObjectRef<'a>> {
        self.inner
            .as_object()
            .map(|members| JsonObjectRef { members })
    }
}

impl fmt::Debug for JsonValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self.inner, f)
    }
}

impl fmt::Display for JsonValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    const CLAIMS: &str = r#"{
        "iss": "https://issuer.example.com",
        "aud": ["app-client-1", "app-client-2"],
        "azp": "app-client-1",
        "exp": 1700000000,
        "nbf": 1699999000.75,
        "admin": true,
        "ext_attr": { "enhancer": "XSUAA", "zdn": "tenant-a" },
        "mixed": ["a", 1]
    }"#;

    fn claims() -> Result<JsonObject> {
        Ok(JsonObject::from_slice(CLAIMS.as_bytes())?)
    }

    #[test]
    fn reads_typed_members() -> Result<()> {
        let obj = claims()?;

        assert_eq!(obj.get_str("iss")?, Some("https://issuer.example.com"));
        assert_eq!(
            obj.get_string_list("aud")?,
            Some(vec!["app-client-1", "app-client-2"])
        );
        assert_eq!(obj.get_string_list("azp")?, Some(vec!["app-client-1"]));
        assert_eq!(obj.get_u64("exp")?, Some(1_700_000_000));
        assert_eq!(obj.get_bool("admin")?, Some(true));
        assert_eq!(obj.get_str("missing")?, None);
        Ok(())
    }

    #[test]
    fn truncates_fractional_timestamps() -> Result<()> {
        let obj = claims()?;

        assert_eq!(obj.get_unix_time("nbf")?, Some(UnixTime(1_699_999_000)));
        assert_eq!(obj.get_unix_time("exp")?, Some(UnixTime(1_700_000_000)));
        Ok(())
    }

    #[test]
    fn reports_type_mismatch_with_claim_name() -> Result<()> {
        let obj = claims()?;

        let err = obj.get_str("exp").unwrap_err();
        assert_eq!(err.claim(), "exp");
        assert_eq!(err.found(), JsonKind::Number);

        let err = obj.get_string_list("mixed").unwrap_err();
        assert_eq!(err.claim(), "mixed");
        assert_eq!(err.found(), JsonKind::Array);

        assert!(obj.get_unix_time("iss").is_err());
        Ok(())
    }

    #[test]
    fn navigates_nested_objects() -> Result<()> {
        let obj = claims()?;

        let ext = obj.get_object("ext_attr")?.expect("ext_attr present");
        assert_eq!(ext.get_str("zdn")?, Some("tenant-a"));
        assert!(obj.get_object("iss").is_err());
        Ok(())
    }

    #[test]
    fn rejects_non_object_documents() {
        assert!(JsonObject::from_slice(b"[1,2,3]").is_err());
        assert!(JsonObject::from_slice(b"\"just a string\"").is_err());
        assert!(JsonObject::from_slice(b"{\"unterminated\": ").is_err());
    }

    #[test]
    fn negative_timestamps_are_mismatches() -> Result<()> {
        let obj = JsonObject::from_slice(br#"{"exp": -5}"#)?;
        assert!(obj.get_unix_time("exp").is_err());
        Ok(())
    }
}
