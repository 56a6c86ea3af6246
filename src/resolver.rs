//! Resolves free-text names to email addresses from the user's mail history.

use crate::accounts::MailboxAccess;
use crate::config::{ScanSettings, ScanStrategy};
use crate::contact::ContactSet;
use crate::contact_cache::ContactCache;
use crate::errors::AssistantResult;
use crate::fetcher::{BatchFetcher, ScanOutcome};
use crate::gmail_api::MailboxProvider;
use crate::matcher::match_contacts;
use crate::retry::{Sleeper, TokioSleeper};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedRecipient {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub suggested_recipients: Vec<SuggestedRecipient>,
}

impl From<ContactSet> for ResolveResponse {
    fn from(contacts: ContactSet) -> Self {
        ResolveResponse {
            suggested_recipients: contacts
                .into_iter()
                .map(|c| SuggestedRecipient {
                    name: c.name,
                    email: c.address,
                })
                .collect(),
        }
    }
}

pub struct ContactResolver {
    access: Arc<dyn MailboxAccess>,
    cache: Arc<ContactCache>,
    settings: ScanSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl ContactResolver {
    pub fn new(access: Arc<dyn MailboxAccess>, cache: Arc<ContactCache>, settings: ScanSettings) -> Self {
        Self {
            access,
            cache,
            settings,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn cache(&self) -> &Arc<ContactCache> {
        &self.cache
    }

    /// Matches `names` against the senders and recipients found in `owner`'s mailbox.
    ///
    /// Mailbox failures shrink the result instead of failing the call; only a
    /// missing Google account is reported as an error.
    pub async fn resolve_contacts<S: AsRef<str>>(&self, owner: &str, names: &[S]) -> AssistantResult<ResolveResponse> {
        let candidates: Vec<&str> = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .collect();
        if candidates.is_empty() {
            debug!("No candidate names for {}, nothing to resolve", owner);
            return Ok(ResolveResponse::default());
        }

        let mailbox = self.access.mailbox_for(owner).await?;
        let started = Instant::now();

        let matches = match self.settings.strategy {
            ScanStrategy::Cached => self.resolve_cached(owner, mailbox, &candidates).await,
            ScanStrategy::Targeted => self.resolve_targeted(mailbox, &candidates).await,
        };

        info!(
            "Resolved {:?} to {} contacts for {} in {:.2?}",
            candidates,
            matches.len(),
            owner,
            started.elapsed()
        );
        Ok(matches.into())
    }

    fn fetcher(&self, mailbox: Arc<dyn MailboxProvider>) -> BatchFetcher {
        BatchFetcher::from_settings(mailbox, &self.settings, Arc::clone(&self.sleeper))
    }

    async fn resolve_cached(&self, owner: &str, mailbox: Arc<dyn MailboxProvider>, candidates: &[&str]) -> ContactSet {
        if let Some(entry) = self.cache.get(owner).fresh() {
            debug!("Using cached contacts for {}", owner);
            return match_contacts(candidates, entry.contacts());
        }

        let guard = self.cache.refresh_guard(owner);
        let _refreshing = guard.lock().await;

        // Someone else may have rebuilt the entry while we waited.
        if let Some(entry) = self.cache.get(owner).fresh() {
            debug!("Contacts for {} were refreshed by a concurrent request", owner);
            return match_contacts(candidates, entry.contacts());
        }

        let started = Instant::now();
        let outcome = self.fetcher(mailbox).scan(None).await;
        info!("Full mailbox scan for {} took {:.2?}", owner, started.elapsed());

        if outcome.is_complete() {
            let entry = self.cache.refresh(owner, outcome.senders, outcome.recipients);
            match_contacts(candidates, entry.contacts())
        } else {
            warn!(
                "Mailbox scan for {} was partial ({} dropped batches, {} dropped messages, listing failed: {}); not caching",
                owner, outcome.dropped_batches, outcome.dropped_messages, outcome.listing_failed
            );
            match_contacts(candidates, outcome.contacts())
        }
    }

    async fn resolve_targeted(&self, mailbox: Arc<dyn MailboxProvider>, candidates: &[&str]) -> ContactSet {
        let fetcher = self.fetcher(mailbox);
        let queries: Vec<String> = candidates.iter().map(|name| targeted_query(name)).collect();

        let outcomes = join_all(queries.iter().map(|q| fetcher.scan(Some(q.as_str())))).await;
        let merged = outcomes.into_iter().fold(ScanOutcome::default(), |mut acc, outcome| {
            acc.merge(outcome);
            acc
        });

        if !merged.is_complete() {
            warn!(
                "Targeted scans were partial ({} dropped batches, {} dropped messages, listing failed: {})",
                merged.dropped_batches, merged.dropped_messages, merged.listing_failed
            );
        }

        match_contacts(candidates, merged.contacts())
    }
}

/// `to:<name> OR from:<name>`, quoting names that contain whitespace.
pub fn targeted_query(name: &str) -> String {
    let term = name.trim().replace('"', "");
    let term = if term.contains(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term
    };
    format!("to:{} OR from:{}", term, term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::Contact;

    #[test]
    fn test_targeted_query_quotes_full_names() {
        assert_eq!(targeted_query("Bob"), "to:Bob OR from:Bob");
        assert_eq!(targeted_query(" John Doe "), "to:\"John Doe\" OR from:\"John Doe\"");
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let contacts: ContactSet = vec![Contact::new("Bob", "bob@y.com")].into_iter().collect();
        let json = serde_json::to_value(ResolveResponse::from(contacts)).unwrap();
        assert_eq!(json["suggestedRecipients"][0]["email"], "bob@y.com");
    }
}
