//! Event acceptance pipeline and deletion engine.

use std::sync::Arc;

use tracing::{debug, error};

use crate::event::{unix_now, Event, KindClass};
use crate::registry::Registry;
use crate::storage::EventStore;
use crate::verify;

/// Gift-wrap envelopes may be deleted by the recipients named in their `p`
/// tags rather than their author.
const GIFT_WRAP_KIND: i32 = 1059;

/// Outcome of the acceptance pipeline, surfaced to the publisher as an OK
/// frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Acceptance {
    pub accepted: bool,
    pub reason: String,
}

impl Acceptance {
    fn ok() -> Self {
        Self {
            accepted: true,
            reason: String::new(),
        }
    }

    fn reject(reason: &str) -> Self {
        Self {
            accepted: false,
            reason: reason.to_string(),
        }
    }
}

/// The relay core: decides what persists, what supersedes what, and hands
/// accepted events to the broadcast bus.
pub struct Relay {
    store: Arc<dyn EventStore>,
    registry: Arc<Registry>,
}

impl Relay {
    pub fn new(store: Arc<dyn EventStore>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Run an inbound event through the kind-policy pipeline. Never errors
    /// across this boundary: storage failures become reject reasons.
    pub fn accept(&self, ev: &Event) -> Acceptance {
        if !verify::verify(ev) {
            return Acceptance::reject("invalid: signature");
        }
        if ev.kind_class() == KindClass::Deletion {
            // A deletion is a request, not a guarantee: the publisher gets
            // OK regardless of how many targets were authorized.
            self.apply_deletions(ev);
            return Acceptance::ok();
        }
        if ev.tags.iter().any(|t| t.name().contains('-')) {
            return Acceptance::reject(
                "auth-required: this event may only be published by its author",
            );
        }
        if ev.kind_class() == KindClass::Ephemeral {
            self.registry.broadcast(ev);
            return Acceptance::ok();
        }
        if ev.is_expired(unix_now()) {
            // Already-expired events are acknowledged but go nowhere.
            return Acceptance::ok();
        }
        if ev.kind == 3
            && ev
                .tags
                .iter()
                .any(|t| t.name() == "p" && !t.value().map_or(false, is_hex64))
        {
            return Acceptance::reject("invalid: contact list p-tag has invalid pubkey format");
        }
        if let Err(e) = self.store.persist(ev) {
            error!(error = %e, id = %ev.id, "persist failed");
            return Acceptance::reject("error: database error");
        }
        self.registry.broadcast(ev);
        Acceptance::ok()
    }

    /// Delete the events a kind-5 event references, where authorized.
    /// Unauthorized or missing targets are skipped silently.
    fn apply_deletions(&self, ev: &Event) {
        for target_id in ev.e_tags() {
            let target = match self.store.get(target_id) {
                Ok(Some(target)) => target,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, target = %target_id, "deletion lookup failed");
                    continue;
                }
            };
            let authorized = if target.kind == GIFT_WRAP_KIND {
                target.p_tags().iter().any(|p| *p == ev.pubkey)
            } else {
                target.pubkey == ev.pubkey
            };
            if !authorized {
                debug!(target = %target.id, "skipping unauthorized deletion");
                continue;
            }
            if let Err(e) = self.store.delete_by_id(&target.id) {
                error!(error = %e, target = %target.id, "deletion failed");
            }
        }
    }
}

fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}
