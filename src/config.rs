//! Configuration loading from `.env` files.

use std::{env, path::PathBuf};

use anyhow::{Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for event storage.
    pub store_root: PathBuf,
    /// Listen address, e.g. `0.0.0.0:8080`.
    pub bind: String,
    /// Relay name advertised in the information document.
    pub name: String,
    /// Relay description advertised in the information document.
    pub description: String,
    /// Operator public key (hex), if any.
    pub pubkey: String,
    /// Operator contact, if any.
    pub contact: String,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let store_root = PathBuf::from(env::var("STORE_ROOT")?);
        let bind = env::var("BIND").unwrap_or_else(|_| "0.0.0.0:8080".into());
        let name = env::var("RELAY_NAME").unwrap_or_else(|_| "castr".into());
        let description = env::var("RELAY_DESCRIPTION").unwrap_or_default();
        let pubkey = env::var("RELAY_PUBKEY").unwrap_or_default();
        let contact = env::var("RELAY_CONTACT").unwrap_or_default();
        Ok(Self {
            store_root,
            bind,
            name,
            description,
            pubkey,
            contact,
        })
    }
}
