//! One-time-code generation.
//!
//! Codes are six decimal digits drawn from the OS entropy source. A small
//! in-process ledger remembers codes that are still within their lifetime so
//! the same digits are never handed out twice while a previous issuance could
//! still be redeemed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Number of decimal digits in a generated code.
pub const CODE_DIGITS: usize = 6;

/// Source of fresh one-time codes.
pub trait CodeGenerator: Send + Sync {
    /// Produce a zero-padded six-digit decimal code, unique among codes
    /// generated by this process whose lifetime has not yet elapsed.
    ///
    /// # Errors
    /// Returns an error if the underlying entropy source fails.
    fn next(&self, now: DateTime<Utc>) -> Result<String>;
}

/// Cryptographic generator backed by `OsRng`.
pub struct OsRngCodes {
    lifetime: chrono::Duration,
    issued: Mutex<VecDeque<(String, DateTime<Utc>)>>,
}

impl OsRngCodes {
    /// `lifetime` is how long an issued code stays reserved; it should match
    /// the configured code TTL.
    #[must_use]
    pub fn new(lifetime: chrono::Duration) -> Self {
        Self {
            lifetime,
            issued: Mutex::new(VecDeque::new()),
        }
    }

    fn raw_code() -> Result<String> {
        // Rejection sampling keeps the six digits uniform; the largest
        // multiple of 10^6 that fits in a u32 is 4_294_000_000.
        loop {
            let mut bytes = [0u8; 4];
            OsRng
                .try_fill_bytes(&mut bytes)
                .context("failed to draw OTP entropy")?;
            let value = u32::from_le_bytes(bytes);
            if value < 4_294_000_000 {
                return Ok(format!("{:06}", value % 1_000_000));
            }
        }
    }
}

impl CodeGenerator for OsRngCodes {
    fn next(&self, now: DateTime<Utc>) -> Result<String> {
        let mut issued = self
            .issued
            .lock()
            .map_err(|_| anyhow::anyhow!("OTP ledger poisoned"))?;

        // Drop entries whose reservation window has passed.
        while let Some((_, at)) = issued.front() {
            if *at + self.lifetime <= now {
                issued.pop_front();
            } else {
                break;
            }
        }

        loop {
            let code = Self::raw_code()?;
            if issued.iter().all(|(existing, _)| *existing != code) {
                issued.push_back((code.clone(), now));
                return Ok(code);
            }
        }
    }
}

/// True when `code` is exactly six ASCII decimal digits.
#[must_use]
pub fn well_formed(code: &str) -> bool {
    code.len() == CODE_DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    #[test]
    fn codes_are_six_zero_padded_digits() {
        let codes = OsRngCodes::new(Duration::minutes(10));
        for _ in 0..64 {
            let code = codes.next(Utc::now()).expect("code");
            assert!(well_formed(&code), "unexpected code shape: {code}");
        }
    }

    #[test]
    fn codes_are_unique_within_lifetime() {
        let codes = OsRngCodes::new(Duration::minutes(10));
        let now = Utc::now();
        let mut seen = HashSet::new();
        for _ in 0..256 {
            let code = codes.next(now).expect("code");
            assert!(seen.insert(code), "code reused within its lifetime");
        }
    }

    #[test]
    fn reservation_expires_with_lifetime() {
        let codes = OsRngCodes::new(Duration::minutes(10));
        let now = Utc::now();
        let _ = codes.next(now).expect("code");
        // After the lifetime has fully elapsed the ledger is purged.
        let _ = codes.next(now + Duration::minutes(11)).expect("code");
        let issued = codes.issued.lock().expect("ledger");
        assert_eq!(issued.len(), 1);
    }

    #[test]
    fn well_formed_rejects_non_digits() {
        assert!(well_formed("012345"));
        assert!(!well_formed("12345"));
        assert!(!well_formed("1234567"));
        assert!(!well_formed("12a456"));
        assert!(!well_formed(""));
    }
}
