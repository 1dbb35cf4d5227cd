//! Storage collaborator: the contract the relay core consumes, and a
//! file-backed implementation.

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result};
use serde_json::to_writer;
use walkdir::WalkDir;

use crate::event::{unix_now, Event, KindClass};
use crate::filter::{Filter, DEFAULT_QUERY_LIMIT};

/// Contract between the relay core and its persistent store.
///
/// The core never assumes a specific backend; replacement for replaceable
/// kinds must be atomic within `persist`, and `query` must suppress expired
/// events.
pub trait EventStore: Send + Sync {
    /// Insert an event. Duplicate ids are a no-op; replaceable and
    /// parameterized-replaceable kinds supersede atomically, keeping the
    /// event with the greatest `(created_at, -id)` per coordinate.
    fn persist(&self, ev: &Event) -> Result<()>;

    /// Look up an event by id.
    fn get(&self, id: &str) -> Result<Option<Event>>;

    /// Remove an event by id. Idempotent.
    fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Invoke `emit` for each stored event matching any filter, newest-first
    /// by `created_at`, honoring per-filter limits (default 500). `emit`
    /// returning false stops the stream.
    fn query(&self, filters: &[Filter], emit: &mut dyn FnMut(Event) -> bool) -> Result<()>;

    /// Unbounded match count, summed across filters.
    fn count(&self, filters: &[Filter]) -> Result<u64>;
}

/// File-backed store: one JSON file per event under a sharded `events/`
/// tree, with an in-memory table rebuilt from disk at open.
pub struct FsStore {
    root: PathBuf,
    table: Mutex<HashMap<String, Event>>,
}

impl FsStore {
    /// Open (or create) a store rooted at `root`, scanning existing events
    /// into the table.
    pub fn open(root: PathBuf) -> Result<Self> {
        let events_dir = root.join("events");
        fs::create_dir_all(&events_dir).context("creating events directory")?;
        let mut table = HashMap::new();
        for entry in WalkDir::new(&events_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let data = fs::read_to_string(entry.path())?;
            let ev: Event = serde_json::from_str(&data)
                .with_context(|| format!("decoding {}", entry.path().display()))?;
            table.insert(ev.id.clone(), ev);
        }
        Ok(Self {
            root,
            table: Mutex::new(table),
        })
    }

    /// Compute the canonical path for an event ID.
    fn event_path(&self, id: &str) -> PathBuf {
        self.root
            .join("events")
            .join(&id[0..2])
            .join(&id[2..4])
            .join(format!("{}.json", id))
    }

    /// Write the event JSON atomically and record it in the table.
    fn insert(&self, table: &mut HashMap<String, Event>, ev: &Event) -> Result<()> {
        let path = self.event_path(&ev.id);
        let parent = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)?;
        let tmp = tempfile::NamedTempFile::new_in(&parent)?;
        to_writer(&tmp, ev)?;
        tmp.persist(&path)?;
        table.insert(ev.id.clone(), ev.clone());
        Ok(())
    }

    /// Remove the superseded holder of a coordinate, or report that the
    /// incoming event loses. `d` narrows the coordinate for parameterized
    /// kinds.
    fn evict_superseded(
        &self,
        table: &mut HashMap<String, Event>,
        ev: &Event,
        d: Option<&str>,
    ) -> bool {
        let current = table
            .values()
            .find(|cur| {
                cur.pubkey == ev.pubkey
                    && cur.kind == ev.kind
                    && d.map_or(true, |d| cur.d_tag() == d)
            })
            .cloned();
        if let Some(cur) = current {
            let keeps = cur.created_at > ev.created_at
                || (cur.created_at == ev.created_at && cur.id < ev.id);
            if keeps {
                return false;
            }
            table.remove(&cur.id);
            let _ = fs::remove_file(self.event_path(&cur.id));
        }
        true
    }

    fn select(&self, filters: &[Filter]) -> Vec<Event> {
        let now = unix_now();
        let table = self.table.lock().unwrap();
        let mut picked: Vec<Event> = Vec::new();
        let mut seen = HashSet::new();
        for f in filters {
            let mut hits: Vec<&Event> = table
                .values()
                .filter(|ev| !ev.is_expired(now) && f.matches(ev))
                .collect();
            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            hits.truncate(f.limit.unwrap_or(DEFAULT_QUERY_LIMIT));
            for ev in hits {
                if seen.insert(ev.id.clone()) {
                    picked.push(ev.clone());
                }
            }
        }
        picked.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        picked
    }
}

impl EventStore for FsStore {
    fn persist(&self, ev: &Event) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        if table.contains_key(&ev.id) {
            return Ok(());
        }
        match ev.kind_class() {
            KindClass::Replaceable => {
                if !self.evict_superseded(&mut table, ev, None) {
                    return Ok(());
                }
            }
            KindClass::ParamReplaceable => {
                let d = ev.d_tag();
                if !self.evict_superseded(&mut table, ev, Some(&d)) {
                    return Ok(());
                }
            }
            _ => {}
        }
        self.insert(&mut table, ev)
    }

    fn get(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.table.lock().unwrap().get(id).cloned())
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        let mut table = self.table.lock().unwrap();
        if table.remove(id).is_some() {
            let _ = fs::remove_file(self.event_path(id));
        }
        Ok(())
    }

    fn query(&self, filters: &[Filter], emit: &mut dyn FnMut(Event) -> bool) -> Result<()> {
        for ev in self.select(filters) {
            if !emit(ev) {
                break;
            }
        }
        Ok(())
    }

    fn count(&self, filters: &[Filter]) -> Result<u64> {
        let now = unix_now();
        let table = self.table.lock().unwrap();
        let mut total = 0u64;
        for f in filters {
            total += table
                .values()
                .filter(|ev| !ev.is_expired(now) && f.matches(ev))
                .count() as u64;
        }
        Ok(total)
    }
}
