//! Password hashing and verification.
//!
//! Hashes are Argon2id PHC strings. Verification against a missing account runs
//! against a throwaway hash so "no such account" and "wrong password" take
//! comparable time.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;

pub trait PasswordScheme: Send + Sync {
    /// # Errors
    /// Returns an error if hashing fails.
    fn hash(&self, password: &str) -> Result<String>;

    /// `false` for a mismatch and for an unparseable stored hash.
    fn verify(&self, stored_hash: &str, password: &str) -> bool;

    /// Burn the cost of one verification without a real account.
    fn verify_dummy(&self, password: &str);
}

pub struct Argon2Passwords {
    params: Params,
    dummy_hash: String,
}

impl Argon2Passwords {
    /// # Errors
    /// Returns an error if the throwaway hash cannot be computed.
    pub fn new() -> Result<Self> {
        Self::with_params(Params::default())
    }

    /// # Errors
    /// Returns an error if the throwaway hash cannot be computed.
    pub fn with_params(params: Params) -> Result<Self> {
        let mut scheme = Self {
            params,
            dummy_hash: String::new(),
        };
        scheme.dummy_hash = scheme.hash("tessera-timing-equalizer")?;
        Ok(scheme)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordScheme for Argon2Passwords {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| anyhow!("failed to hash password"))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, stored_hash: &str, password: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        // Parameters come from the PHC string, so older hashes keep verifying.
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    fn verify_dummy(&self, password: &str) {
        let _ = self.verify(&self.dummy_hash, password);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Result<Argon2Passwords> {
        let params = Params::new(8, 1, 1, None).map_err(|e| anyhow!("{e}"))?;
        Argon2Passwords::with_params(params)
    }

    #[test]
    fn hash_then_verify() -> Result<()> {
        let scheme = cheap()?;
        let hash = scheme.hash("correct horse")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(scheme.verify(&hash, "correct horse"));
        assert!(!scheme.verify(&hash, "battery staple"));
        Ok(())
    }

    #[test]
    fn hashes_are_salted() -> Result<()> {
        let scheme = cheap()?;
        assert_ne!(scheme.hash("same")?, scheme.hash("same")?);
        Ok(())
    }

    #[test]
    fn garbage_hash_never_verifies() -> Result<()> {
        let scheme = cheap()?;
        assert!(!scheme.verify("not-a-phc-string", "anything"));
        assert!(!scheme.verify("", ""));
        scheme.verify_dummy("anything");
        Ok(())
    }
}
