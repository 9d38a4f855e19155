// src/keys.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GateError, Result};

pub const PUBLIC_KEY_PREFIX: &str = "supm_";
pub const SECRET_KEY_PREFIX: &str = "sk_";

// public keys look like supm_<32 hex>, secret keys sk_<64 hex>
static PUBLIC_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^supm_[a-f0-9]{32}$").expect("public key pattern"));
static SECRET_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sk_[a-f0-9]{64}$").expect("secret key pattern"));

/// The two structurally distinct API key classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyClass {
    /// Embeddable ingestion key
    Public,
    /// Server-side retrieval key
    Secret,
}

impl KeyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyClass::Public => "public",
            KeyClass::Secret => "secret",
        }
    }

    /// Guesses the class from the key prefix. Shape is not checked.
    pub fn detect(key: &str) -> Option<Self> {
        if key.starts_with(PUBLIC_KEY_PREFIX) {
            Some(KeyClass::Public)
        } else if key.starts_with(SECRET_KEY_PREFIX) {
            Some(KeyClass::Secret)
        } else {
            None
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            KeyClass::Public => &PUBLIC_KEY_RE,
            KeyClass::Secret => &SECRET_KEY_RE,
        }
    }
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural check of an API key. Pure; never touches a store.
pub fn validate_key_format(class: KeyClass, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GateError::Format(format!("missing {} key", class)));
    }

    if !class.pattern().is_match(key) {
        return Err(GateError::Format(format!("invalid {} key format", class)));
    }

    Ok(())
}
