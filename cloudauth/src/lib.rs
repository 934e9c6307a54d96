//! Primitives for authenticating bearer tokens presented to a cloud application
//!
//! This crate handles the parts of JSON Web Token ([RFC7519][]) handling that
//! do not require any trust decisions:
//!
//! * decoding the compact serialization into a [`Token`] with a read-only
//!   JSON view of its header and payload
//! * typed access to claims, failing with [`ClaimTypeMismatch`][error::ClaimTypeMismatch]
//!   rather than silently coercing values
//! * parsing JSON Web Key Sets ([RFC7517][]) into RSA public keys
//! * verifying RS256 signatures over the exact bytes that were signed
//!
//! Deciding whether a token should be *trusted* is the job of the
//! `cloudauth_validation` crate, which builds on these primitives.
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use cloudauth::Token;
//!
//! let token = Token::decode(concat!(
//!     "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIn0.",
//!     "eyJpc3MiOiJodHRwczovL2lzc3Vlci5leGFtcGxlLmNvbSIsImF1ZCI6WyJhcHAtY2xpZW50LTEiXX0.",
//!     "c2lnbmF0dXJl"
//! )).unwrap();
//!
//! assert_eq!(token.algorithm().unwrap(), Some("RS256"));
//! assert_eq!(token.key_id().unwrap().unwrap().as_str(), "k1");
//! assert_eq!(token.issuer().unwrap(), Some("https://issuer.example.com"));
//! assert_eq!(token.audiences().unwrap(), vec!["app-client-1"]);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod b64;
pub mod clock;
pub mod error;
pub mod json;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod token;


#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use token::Token;
