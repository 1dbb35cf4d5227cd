//! Process-wide client registry and broadcast bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::event::Event;
use crate::subscription::Client;

/// Registry of live clients. Mutation (add/remove) and broadcast iteration
/// are serialized by the interior lock; dispatch itself happens outside it.
pub struct Registry {
    clients: RwLock<HashMap<u64, Arc<Client>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new client around its outbound frame channel.
    pub fn add(&self, out: mpsc::Sender<String>) -> Arc<Client> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let client = Client::new(id, out);
        self.clients.write().unwrap().insert(id, client.clone());
        client
    }

    /// Deregister and close a client. Idempotent.
    pub fn remove(&self, client: &Client) {
        self.clients.write().unwrap().remove(&client.id());
        client.close();
    }

    /// Fan a newly accepted event out to every client's interested
    /// subscriptions. Each client is dispatched on its own task so one slow
    /// client cannot stall the others.
    pub fn broadcast(&self, ev: &Event) {
        let snapshot: Vec<Arc<Client>> = self.clients.read().unwrap().values().cloned().collect();
        for client in snapshot {
            let ev = ev.clone();
            tokio::spawn(async move {
                client.dispatch(&ev);
            });
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
