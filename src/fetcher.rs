//! Mailbox scanning: paginated listing, batched header fetches, rate-limit retry.

use crate::config::{ScanSettings, MAX_BATCH_SIZE, MAX_PAGE_SIZE};
use crate::contact::{Contact, ContactSet};
use crate::errors::GmailResult;
use crate::gmail_api::{MailboxProvider, MessageHeaders, MessagePage};
use crate::header::contacts_from_header;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// What one scan harvested, plus how much of the mailbox it failed to read.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub senders: ContactSet,
    pub recipients: ContactSet,
    pub messages_seen: usize,
    pub pages: usize,
    pub dropped_batches: usize,
    /// Messages a fetched batch could not return, other than deleted ones.
    pub dropped_messages: usize,
    /// Messages deleted between listing and fetching.
    pub missing_messages: usize,
    pub listing_failed: bool,
}

impl ScanOutcome {
    /// True when every page was listed and every listed message that still
    /// exists was read.
    pub fn is_complete(&self) -> bool {
        self.dropped_batches == 0 && self.dropped_messages == 0 && !self.listing_failed
    }

    pub fn merge(&mut self, other: ScanOutcome) {
        self.senders.merge(other.senders);
        self.recipients.merge(other.recipients);
        self.messages_seen += other.messages_seen;
        self.pages += other.pages;
        self.dropped_batches += other.dropped_batches;
        self.dropped_messages += other.dropped_messages;
        self.missing_messages += other.missing_messages;
        self.listing_failed |= other.listing_failed;
    }

    /// Senders followed by recipients.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> + Clone {
        self.senders.iter().chain(self.recipients.iter())
    }

    fn absorb_batch(&mut self, items: Vec<GmailResult<MessageHeaders>>) {
        for item in items {
            match item {
                Ok(message) => self.absorb(&message),
                Err(e) if e.is_not_found() => {
                    debug!("Skipping deleted message: {}", e);
                    self.missing_messages += 1;
                }
                Err(e) => {
                    warn!("Dropping message in batch: {}", e);
                    self.dropped_messages += 1;
                }
            }
        }
    }

    fn absorb(&mut self, message: &MessageHeaders) {
        for value in message.values("From") {
            self.senders.extend(contacts_from_header(value));
        }
        for value in message.values("To") {
            self.recipients.extend(contacts_from_header(value));
        }
    }
}

pub struct BatchFetcher {
    provider: Arc<dyn MailboxProvider>,
    page_size: u32,
    batch_size: usize,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl BatchFetcher {
    pub fn new(provider: Arc<dyn MailboxProvider>) -> Self {
        Self {
            provider,
            page_size: MAX_PAGE_SIZE,
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn from_settings(
        provider: Arc<dyn MailboxProvider>,
        settings: &ScanSettings,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self::new(provider)
            .with_page_size(settings.page_size)
            .with_batch_size(settings.batch_size)
            .with_retry_policy(RetryPolicy::fixed(settings.backoff))
            .with_sleeper(sleeper)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Walks every page matching `query` (all messages when `None`) and
    /// collects the senders and recipients of each message.
    ///
    /// Never fails: a listing error stops pagination and a batch error drops
    /// that batch, both recorded in the outcome.
    pub async fn scan(&self, query: Option<&str>) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = match self.list_page(query, page_token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        "Listing messages failed (query={:?}, page {}): {}",
                        query,
                        outcome.pages + 1,
                        e
                    );
                    outcome.listing_failed = true;
                    break;
                }
            };

            outcome.pages += 1;
            outcome.messages_seen += page.messages.len();

            let ids: Vec<String> = page.messages.into_iter().map(|m| m.id).collect();
            let batches = join_all(ids.chunks(self.batch_size).map(|chunk| self.fetch_batch(chunk))).await;

            for batch in batches {
                match batch {
                    Some(items) => outcome.absorb_batch(items),
                    None => outcome.dropped_batches += 1,
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(
            "Scan finished (query={:?}): {} messages over {} pages, {} senders, {} recipients, {} dropped batches, {} dropped messages, {} deleted",
            query,
            outcome.messages_seen,
            outcome.pages,
            outcome.senders.len(),
            outcome.recipients.len(),
            outcome.dropped_batches,
            outcome.dropped_messages,
            outcome.missing_messages
        );

        outcome
    }

    async fn list_page(&self, query: Option<&str>, page_token: Option<&str>) -> GmailResult<MessagePage> {
        self.retry
            .run(self.sleeper.as_ref(), "message list", || {
                self.provider.list_messages(query, page_token, self.page_size)
            })
            .await
    }

    async fn fetch_batch(&self, ids: &[String]) -> Option<Vec<GmailResult<MessageHeaders>>> {
        debug!("Fetching batch of {} messages", ids.len());

        let result = self
            .retry
            .run(self.sleeper.as_ref(), "batch fetch", || self.provider.batch_get(ids))
            .await;

        match result {
            Ok(items) => Some(items),
            Err(e) => {
                error!("Dropping batch of {} messages: {}", ids.len(), e);
                None
            }
        }
    }
}
