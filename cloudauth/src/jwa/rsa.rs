//! RSA public keys

use std::fmt;

use super::SigningAlgorithm;
use crate::error;

const MIN_MODULUS_BYTES: usize = 2048 / 8;
const MAX_MODULUS_BYTES: usize = 8192 / 8;

/// RSA public key components
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PublicKey {
    /// The public modulus, big-endian without leading zeros
    modulus: Vec<u8>,

    /// The public exponent, big-endian without leading zeros
    exponent: Vec<u8>,
}

impl PublicKey {
    /// The public key's modulus
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// The public key's exponent
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// The size of the modulus in bits
    #[must_use]
    pub fn bits(&self) -> usize {
        let lead = self.modulus.first().map_or(0, |b| 8 - b.leading_zeros() as usize);
        (self.modulus.len().saturating_sub(1)) * 8 + lead
    }

    /// Constructs a public key from the big-endian modulus and exponent
    ///
    /// Leading zero octets are ignored.
    ///
    /// # Errors
    ///
    /// The modulus is shorter than 2048 bits or longer than 8192 bits, or
    /// the exponent is empty.
    pub fn from_components(
        modulus: impl Into<Vec<u8>>,
        exponent: impl Into<Vec<u8>>,
    ) -> Result<Self, error::KeyRejected> {
        let modulus = strip_leading_zeros(modulus.into());
        let exponent = strip_leading_zeros(exponent.into());

        if modulus.len() < MIN_MODULUS_BYTES || modulus.len() > MAX_MODULUS_BYTES {
            return Err(error::key_rejected(format!(
                "key modulus must be between 2048 and 8192 bits, found {} bytes",
                modulus.len()
            )));
        }

        if exponent.is_empty() {
            return Err(error::key_rejected("key exponent must not be zero"));
        }

        Ok(Self { modulus, exponent })
    }

    /// Verifies `signature` over `data`
    ///
    /// # Errors
    ///
    /// Returns an error if the signature was not produced by the private half
    /// of this key over exactly these bytes.
    pub fn verify(
        &self,
        alg: SigningAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(alg.verification_params(), data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .field("exponent", &self.exponent)
            .finish()
    }
}

fn strip_leading_zeros(mut raw: Vec<u8>) -> Vec<u8> {
    let zeros = raw.iter().take_while(|&&b| b == 0).count();
    raw.drain(..zeros);
    raw
}
