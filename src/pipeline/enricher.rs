//! Metadata enrichment
//!
//! Fills missing author and URL fields from the configured provider
//! chain. Lookups for distinct books run concurrently under a
//! semaphore; all results are joined before any store write, so the
//! store only ever sees sequential updates from this stage.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::domain::book::{Book, BookMetadata};
use crate::infrastructure::book_repository::BookRepository;
use crate::infrastructure::config::EnrichmentConfig;
use crate::infrastructure::metadata_providers::MetadataProvider;
use crate::pipeline::WatchError;

/// Counters for one enrichment pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentOutcome {
    pub candidates: u32,
    pub enriched: u32,
    pub unmatched: u32,
    pub failed: u32,
}

/// Result slot for one book's provider chain walk
struct LookupOutcome {
    book_id: i64,
    metadata: Option<BookMetadata>,
    provider_errors: u32,
}

pub struct MetadataEnricher {
    repository: BookRepository,
    providers: Vec<Arc<dyn MetadataProvider>>,
    batch_size: u32,
    max_concurrent_lookups: usize,
}

impl MetadataEnricher {
    pub fn new(
        repository: BookRepository,
        providers: Vec<Arc<dyn MetadataProvider>>,
        config: &EnrichmentConfig,
    ) -> Self {
        Self {
            repository,
            providers,
            batch_size: config.batch_size,
            max_concurrent_lookups: config.max_concurrent_lookups.max(1),
        }
    }

    /// One enrichment pass over the least recently attempted
    /// incomplete books.
    pub async fn enrich(
        &self,
        cancellation_token: &CancellationToken,
    ) -> Result<EnrichmentOutcome, WatchError> {
        let candidates = self
            .repository
            .get_enrichment_candidates(self.batch_size as i64)
            .await?;

        let mut outcome = EnrichmentOutcome {
            candidates: candidates.len() as u32,
            ..Default::default()
        };
        if candidates.is_empty() || self.providers.is_empty() {
            return Ok(outcome);
        }

        // Stamp the batch up front: an unmatched book must not head the
        // candidate queue again next pass
        let now = Utc::now();
        let batch_ids: Vec<i64> = candidates.iter().map(|book| book.id).collect();
        self.repository
            .record_enrichment_attempt(&batch_ids, now)
            .await?;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_lookups));
        let mut handles = Vec::with_capacity(candidates.len());

        for book in candidates {
            let providers = self.providers.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = cancellation_token.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return LookupOutcome {
                            book_id: book.id,
                            metadata: None,
                            provider_errors: 0,
                        };
                    }
                };
                walk_provider_chain(&book, &providers, &token).await
            }));
        }

        let results = futures::future::join_all(handles).await;

        for result in results {
            let lookup = match result {
                Ok(lookup) => lookup,
                Err(e) => {
                    tracing::error!("Enrichment task panicked: {}", e);
                    outcome.failed += 1;
                    continue;
                }
            };

            match lookup.metadata {
                Some(metadata) => {
                    self.repository
                        .fill_missing_metadata(
                            lookup.book_id,
                            metadata.author.as_deref(),
                            metadata.url.as_deref(),
                            now,
                        )
                        .await?;
                    outcome.enriched += 1;
                }
                None if lookup.provider_errors > 0 => outcome.failed += 1,
                None => outcome.unmatched += 1,
            }
        }

        tracing::info!(
            "Enrichment pass: {} candidates, {} enriched, {} unmatched, {} failed",
            outcome.candidates,
            outcome.enriched,
            outcome.unmatched,
            outcome.failed
        );

        Ok(outcome)
    }
}

/// Try providers in priority order until one returns a field this book
/// is missing. Provider errors skip to the next provider; they never
/// abort the pass.
async fn walk_provider_chain(
    book: &Book,
    providers: &[Arc<dyn MetadataProvider>],
    cancellation_token: &CancellationToken,
) -> LookupOutcome {
    let mut provider_errors = 0;

    for provider in providers {
        if cancellation_token.is_cancelled() {
            break;
        }

        match provider.lookup(&book.isbn, cancellation_token).await {
            Ok(Some(metadata)) if fills_a_gap(book, &metadata) => {
                tracing::debug!(
                    "Enriched {} from provider {}",
                    book.isbn,
                    provider.name()
                );
                return LookupOutcome {
                    book_id: book.id,
                    metadata: Some(metadata),
                    provider_errors,
                };
            }
            Ok(_) => {
                // Not found, or found but covers no missing field
                continue;
            }
            Err(e) => {
                provider_errors += 1;
                tracing::warn!(
                    "Provider {} failed for {}: {}",
                    provider.name(),
                    book.isbn,
                    e
                );
            }
        }
    }

    LookupOutcome {
        book_id: book.id,
        metadata: None,
        provider_errors,
    }
}

/// Usable means the metadata offers a value for a field the book lacks.
fn fills_a_gap(book: &Book, metadata: &BookMetadata) -> bool {
    (book.author.is_none() && metadata.author.is_some())
        || (book.source_url.is_none() && metadata.url.is_some())
}
