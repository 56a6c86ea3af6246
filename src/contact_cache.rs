//! Per-owner, time-windowed cache of harvested contacts.
//!
//! Entries are immutable snapshots behind an `Arc`; a refresh swaps the whole
//! snapshot, so readers see either the old or the new contents, never a mix.

use crate::config::DEFAULT_CACHE_TTL;
use crate::contact::{Contact, ContactSet};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct CachedContacts {
    pub senders: ContactSet,
    pub recipients: ContactSet,
    pub refreshed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedContacts {
    /// Senders followed by recipients.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> + Clone {
        self.senders.iter().chain(self.recipients.iter())
    }
}

#[derive(Debug, Clone)]
pub enum CacheLookup {
    Fresh(Arc<CachedContacts>),
    Stale,
}

impl CacheLookup {
    pub fn fresh(self) -> Option<Arc<CachedContacts>> {
        match self {
            CacheLookup::Fresh(entry) => Some(entry),
            CacheLookup::Stale => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CacheLookup::Stale)
    }
}

pub struct ContactCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Arc<CachedContacts>>>,
    refresh_guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for ContactCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ContactCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            refresh_guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, owner: &str) -> CacheLookup {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(owner) {
            Some(entry) if self.clock.now() < entry.expires_at => CacheLookup::Fresh(Arc::clone(entry)),
            Some(_) => {
                debug!("Contact cache for {} has expired", owner);
                CacheLookup::Stale
            }
            None => CacheLookup::Stale,
        }
    }

    /// Replaces the owner's contacts wholesale and restarts the TTL window.
    pub fn refresh(&self, owner: &str, senders: ContactSet, recipients: ContactSet) -> Arc<CachedContacts> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(3));
        let entry = Arc::new(CachedContacts {
            senders,
            recipients,
            refreshed_at: now,
            expires_at: now + ttl,
        });

        info!(
            "Contact cache refreshed for {}: {} senders, {} recipients, expires at {}",
            owner,
            entry.senders.len(),
            entry.recipients.len(),
            entry.expires_at
        );

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(owner.to_string(), Arc::clone(&entry));
        entry
    }

    pub fn invalidate(&self, owner: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(owner).is_some() {
            debug!("Contact cache invalidated for {}", owner);
        }
    }

    /// The lock that serialises rebuilds of one owner's entry. Holders should
    /// re-check `get` after acquiring it: another task may have just refreshed.
    pub fn refresh_guard(&self, owner: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guards = self
            .refresh_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(guards.entry(owner.to_string()).or_default())
    }
}
