/// Mailbox Scan Tests Module
///
/// Pagination, batch grouping, rate-limit backoff and partial failure of
/// the batch fetcher, run against an in-memory mailbox.
mod common;

use common::{message, FakeMailbox};
use gmail_assistant::fetcher::BatchFetcher;
use gmail_assistant::retry::{RecordingSleeper, RetryPolicy};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn numbered_mailbox(count: usize) -> FakeMailbox {
    FakeMailbox::with_messages(
        (0..count)
            .map(|i| {
                message(
                    &format!("m{}", i),
                    &format!("Sender {} <sender{}@example.com>", i, i),
                    "me@example.com",
                )
            })
            .collect(),
    )
}

fn fetcher(mailbox: Arc<FakeMailbox>, sleeper: Arc<RecordingSleeper>) -> BatchFetcher {
    BatchFetcher::new(mailbox).with_sleeper(sleeper)
}

#[cfg(test)]
mod fetcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_follows_page_tokens() {
        let mailbox = Arc::new(numbered_mailbox(25));
        let sleeper = Arc::new(RecordingSleeper::new());
        let outcome = fetcher(mailbox.clone(), sleeper)
            .with_page_size(10)
            .with_batch_size(4)
            .scan(None)
            .await;

        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.messages_seen, 25);
        assert_eq!(outcome.senders.len(), 25);
        assert_eq!(outcome.recipients.len(), 1);
        assert!(outcome.is_complete());
        assert_eq!(mailbox.list_calls(), 3);
        // 10 -> 3 batches, 10 -> 3 batches, 5 -> 2 batches
        assert_eq!(mailbox.batch_calls(), 8);
    }

    #[tokio::test]
    async fn test_sizes_are_clamped_to_gmail_limits() {
        let mailbox = Arc::new(numbered_mailbox(0));
        let f = BatchFetcher::new(mailbox)
            .with_page_size(5000)
            .with_batch_size(0);
        assert_eq!(f.page_size(), 500);
        assert_eq!(f.batch_size(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_once_matches_clean_run() {
        let clean_mailbox = Arc::new(numbered_mailbox(12));
        let clean = fetcher(clean_mailbox, Arc::new(RecordingSleeper::new()))
            .with_batch_size(5)
            .scan(None)
            .await;

        let limited_mailbox = numbered_mailbox(12);
        limited_mailbox.rate_limited_batches.store(1, Ordering::SeqCst);
        let limited_mailbox = Arc::new(limited_mailbox);
        let sleeper = Arc::new(RecordingSleeper::new());
        let limited = fetcher(limited_mailbox.clone(), sleeper.clone())
            .with_batch_size(5)
            .scan(None)
            .await;

        let mut clean_addresses: Vec<String> = clean.contacts().map(|c| c.key()).collect();
        let mut limited_addresses: Vec<String> = limited.contacts().map(|c| c.key()).collect();
        clean_addresses.sort();
        limited_addresses.sort();

        assert_eq!(clean_addresses, limited_addresses);
        assert!(limited.is_complete());
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
        assert_eq!(limited_mailbox.batch_calls(), 4);
    }

    #[tokio::test]
    async fn test_repeated_rate_limits_keep_retrying() {
        let mailbox = numbered_mailbox(3);
        mailbox.rate_limited_batches.store(5, Ordering::SeqCst);
        let mailbox = Arc::new(mailbox);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = fetcher(mailbox, sleeper.clone()).scan(None).await;

        assert_eq!(outcome.senders.len(), 3);
        assert_eq!(sleeper.delays().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_batch_is_dropped_and_scan_continues() {
        let mailbox = numbered_mailbox(10);
        mailbox.failing_batches.store(1, Ordering::SeqCst);
        let mailbox = Arc::new(mailbox);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = fetcher(mailbox, sleeper.clone())
            .with_batch_size(5)
            .scan(None)
            .await;

        assert_eq!(outcome.dropped_batches, 1);
        assert_eq!(outcome.senders.len(), 5);
        assert!(!outcome.is_complete());
        assert!(sleeper.delays().is_empty(), "non-rate-limit errors are not retried");
    }

    #[tokio::test]
    async fn test_failed_message_makes_scan_partial() {
        let mut mailbox = numbered_mailbox(6);
        mailbox.failing_messages = vec!["m2".to_string()];
        let outcome = fetcher(Arc::new(mailbox), Arc::new(RecordingSleeper::new()))
            .with_batch_size(3)
            .scan(None)
            .await;

        assert_eq!(outcome.dropped_batches, 0);
        assert_eq!(outcome.dropped_messages, 1);
        assert_eq!(outcome.senders.len(), 5);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_deleted_message_keeps_scan_complete() {
        let mut mailbox = numbered_mailbox(4);
        mailbox.deleted_messages = vec!["m0".to_string()];
        let outcome = fetcher(Arc::new(mailbox), Arc::new(RecordingSleeper::new()))
            .scan(None)
            .await;

        assert_eq!(outcome.missing_messages, 1);
        assert_eq!(outcome.dropped_messages, 0);
        assert_eq!(outcome.senders.len(), 3);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_listing_failure_yields_empty_partial_outcome() {
        let mut mailbox = numbered_mailbox(3);
        mailbox.fail_listing = true;
        let outcome = fetcher(Arc::new(mailbox), Arc::new(RecordingSleeper::new()))
            .scan(None)
            .await;

        assert!(outcome.listing_failed);
        assert!(outcome.senders.is_empty());
        assert_eq!(outcome.pages, 0);
    }

    #[tokio::test]
    async fn test_bounded_policy_gives_up_on_rate_limits() {
        let mailbox = numbered_mailbox(3);
        mailbox.rate_limited_batches.store(10, Ordering::SeqCst);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = fetcher(Arc::new(mailbox), sleeper.clone())
            .with_retry_policy(RetryPolicy::fixed(Duration::from_millis(10)).with_max_attempts(3))
            .scan(None)
            .await;

        assert_eq!(outcome.dropped_batches, 1);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(10); 2]);
    }

    #[tokio::test]
    async fn test_recipient_lists_are_split() {
        let mailbox = FakeMailbox::with_messages(vec![message(
            "m1",
            "Bob <bob@y.com>",
            "alice@z.com, \"Carol King\" <carol@z.com>",
        )]);
        let outcome = fetcher(Arc::new(mailbox), Arc::new(RecordingSleeper::new()))
            .scan(None)
            .await;

        assert!(outcome.senders.contains("bob@y.com"));
        assert_eq!(outcome.recipients.len(), 2);
        assert_eq!(outcome.recipients.get("carol@z.com").unwrap().name, "Carol King");
    }
}
