//! Nostr event model and kind policy.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Simple tag wrapper preserving tag fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name (first field), empty string for degenerate tags.
    pub fn name(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    /// Tag value (second field), if present.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Core Nostr event received from clients and served to subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (x-only, hex).
    pub pubkey: String,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Kind number, e.g. `1` or `30023`.
    pub kind: i32,
    /// Arbitrary tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Persistence policy derived from the event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClass {
    /// Persisted, immutable.
    Regular,
    /// Broadcast but never persisted.
    Ephemeral,
    /// At most one persisted event per `(pubkey, kind)`.
    Replaceable,
    /// At most one persisted event per `(pubkey, kind, d-tag)`.
    ParamReplaceable,
    /// Kind 5: a request to delete referenced events.
    Deletion,
}

impl Event {
    /// Classify the event kind into its persistence policy.
    pub fn kind_class(&self) -> KindClass {
        match self.kind {
            5 => KindClass::Deletion,
            0 | 3 => KindClass::Replaceable,
            k if (10_000..20_000).contains(&k) => KindClass::Replaceable,
            k if (20_000..30_000).contains(&k) => KindClass::Ephemeral,
            k if (30_000..40_000).contains(&k) => KindClass::ParamReplaceable,
            _ => KindClass::Regular,
        }
    }

    /// Value of the first `d` tag, empty string when absent.
    pub fn d_tag(&self) -> String {
        self.tags
            .iter()
            .find(|t| t.name() == "d")
            .and_then(Tag::value)
            .unwrap_or("")
            .to_string()
    }

    /// Values of all `e` tags.
    pub fn e_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.name() == "e")
            .filter_map(Tag::value)
            .collect()
    }

    /// Values of all `p` tags.
    pub fn p_tags(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.name() == "p")
            .filter_map(Tag::value)
            .collect()
    }

    /// Parsed `expiration` tag value, `None` when missing or unparsable.
    pub fn expiration(&self) -> Option<i64> {
        self.tags
            .iter()
            .find(|t| t.name() == "expiration")
            .and_then(Tag::value)
            .and_then(|v| v.parse().ok())
    }

    /// Whether the event carries an expiration at or before `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration().map_or(false, |exp| exp <= now)
    }
}

/// Recompute the Nostr event hash from its fields.
pub fn event_hash(ev: &Event) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    let data = serde_json::to_vec(&arr)?;
    let hash = Sha256::digest(&data);
    Ok(hash.into())
}

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
