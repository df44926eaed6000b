//! Generation of fresh 12-digit authorization codes.
//!
//! Candidates are drawn uniformly and pre-checked against the stored
//! collection; a collision regenerates. Over a 10^12 code space the retry
//! loop effectively never spins, so no retry bound is imposed. The unique
//! constraint on the `code` column remains the actual guarantee: the
//! caller retries the insert on a code-uniqueness conflict.

use ring::rand::{SecureRandom, SystemRandom};

use crate::services::lifecycle::CodeError;
use crate::store::CodeStore;

pub const CODE_LENGTH: usize = 12;

#[derive(Debug, thiserror::Error)]
#[error("random source failure")]
pub struct RandomSourceError;

/// Byte source for code generation. Production uses the system CSPRNG;
/// tests inject scripted bytes to force specific codes and collisions.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomSourceError>;
}

pub struct SystemRandomSource {
    rng: SystemRandom,
}

impl SystemRandomSource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandomSource {
    fn fill(&self, dest: &mut [u8]) -> Result<(), RandomSourceError> {
        self.rng.fill(dest).map_err(|_| RandomSourceError)
    }
}

/// Twelve uniform decimal digits. Bytes of 250 and above are rejected so
/// the modulo keeps each digit uniform.
pub fn random_digits(rng: &dyn RandomSource) -> Result<String, RandomSourceError> {
    let mut digits = String::with_capacity(CODE_LENGTH);
    let mut buf = [0u8; 16];
    while digits.len() < CODE_LENGTH {
        rng.fill(&mut buf)?;
        for &byte in &buf {
            if byte < 250 {
                digits.push(char::from(b'0' + byte % 10));
                if digits.len() == CODE_LENGTH {
                    break;
                }
            }
        }
    }
    Ok(digits)
}

/// Produces a code not currently present in the collection. Pure
/// lookup-and-retry; reservation happens when the caller persists the
/// entity.
pub async fn generate(
    rng: &dyn RandomSource,
    store: &dyn CodeStore,
) -> Result<String, CodeError> {
    loop {
        let candidate = random_digits(rng)?;
        if !store.code_exists(&candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!("generated code already exists, retrying");
    }
}
