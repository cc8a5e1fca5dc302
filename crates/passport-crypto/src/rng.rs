//! Secure random byte sources for IVs and key generation

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Source of random bytes consumed by encryption and key generation.
///
/// Production code uses [`OsRandom`]; tests substitute a fixed source so that
/// ciphertexts become reproducible.
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()>;
}

/// The operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::Primitive(format!("OS random source: {e}")))
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &R {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()> {
        (**self).fill(buf)
    }
}

/// Repeats a fixed byte. Only for known-answer tests.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedRandom(pub u8);

#[cfg(test)]
impl RandomSource for FixedRandom {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()> {
        buf.fill(self.0);
        Ok(())
    }
}

/// Always fails, to exercise the primitive error path.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BrokenRandom;

#[cfg(test)]
impl RandomSource for BrokenRandom {
    fn fill(&self, _buf: &mut [u8]) -> CryptoResult<()> {
        Err(CryptoError::Primitive("entropy unavailable".into()))
    }
}
