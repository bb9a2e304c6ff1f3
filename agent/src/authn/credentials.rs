//! Per-device API token resolution
//!
//! Tokens are looked up at fetch time, first match wins:
//!
//! 1. `API_TOKEN_<NAME>`: display name upper-cased, spaces replaced with `_`
//! 2. `API_TOKEN_<HOST>`: host with `.` and `:` replaced with `_`
//! 3. `API_TOKEN`: the global token

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::debug;

use crate::errors::BackupError;
use crate::models::device::Device;

/// Environment key holding the global token. Also the prefix of per-device keys.
pub const GLOBAL_TOKEN_KEY: &str = "API_TOKEN";

/// Read-only key/value lookup, normally the process environment
pub trait EnvLookup: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Which tier a token was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Name,
    Host,
    Global,
}

/// A resolved bearer token
#[derive(Debug)]
pub struct Credential {
    pub token: SecretString,
    pub source: TokenSource,
    pub key: String,
}

/// Environment key for a token bound to a device display name
pub fn name_token_key(display_name: &str) -> String {
    format!(
        "{}_{}",
        GLOBAL_TOKEN_KEY,
        display_name.replace(' ', "_").to_uppercase()
    )
}

/// Environment key for a token bound to a device host
pub fn host_token_key(host: &str) -> String {
    format!("{}_{}", GLOBAL_TOKEN_KEY, host.replace(['.', ':'], "_"))
}

/// Resolves device tokens from an injected lookup
#[derive(Clone)]
pub struct CredentialResolver {
    lookup: Arc<dyn EnvLookup>,
}

impl CredentialResolver {
    pub fn new(lookup: Arc<dyn EnvLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve the token for `device`
    pub fn resolve(&self, device: &Device) -> Result<Credential, BackupError> {
        let mut checked_keys = Vec::with_capacity(3);

        if let Some(name) = device.display_name.as_deref() {
            let key = name_token_key(name);
            if let Some(credential) = self.lookup_key(&key, TokenSource::Name) {
                return Ok(credential);
            }
            checked_keys.push(key);
        }

        let key = host_token_key(device.host());
        if let Some(credential) = self.lookup_key(&key, TokenSource::Host) {
            return Ok(credential);
        }
        checked_keys.push(key);

        if let Some(credential) = self.lookup_key(GLOBAL_TOKEN_KEY, TokenSource::Global) {
            return Ok(credential);
        }
        checked_keys.push(GLOBAL_TOKEN_KEY.to_string());

        Err(BackupError::AuthError {
            display_name: device.label().to_string(),
            checked_keys,
        })
    }

    fn lookup_key(&self, key: &str, source: TokenSource) -> Option<Credential> {
        let value = self.lookup.get(key).filter(|v| !v.trim().is_empty())?;
        debug!(key, ?source, "Resolved API token");
        Some(Credential {
            token: SecretString::from(value),
            source,
            key: key.to_string(),
        })
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}
