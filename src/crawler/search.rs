//! Keyword search over titles or company names

use crate::crawler::fetcher::{Endpoint, FetchClient, FetchError};
use crate::crawler::records::{extract_records, Record};
use crate::output::{Pass, RunSummary};
use crate::state::Progress;
use crate::storage::RecordSink;
use crate::HarvestError;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// What a search query matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Title,
    Company,
}

impl SearchKind {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Title => Endpoint::SearchByTitle,
            Self::Company => Endpoint::SearchByCompany,
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Company => write!(f, "company"),
        }
    }
}

/// Fetches one page of search results (pages start at 1)
pub async fn search_page(
    client: &FetchClient,
    kind: SearchKind,
    query: &str,
    page: u32,
) -> Result<Vec<Record>, FetchError> {
    let page = page.to_string();
    let response = client
        .fetch(kind.endpoint(), &[("query", query), ("page", page.as_str())])
        .await?;
    extract_records(kind.endpoint(), response)
}

/// Pages through search results into `sink`
///
/// Stops at the first empty page, after `max_pages`, on cancellation, or on
/// the first failed page. A failed page is logged, not returned as an error.
pub async fn search(
    client: &FetchClient,
    kind: SearchKind,
    query: &str,
    max_pages: u32,
    sink: &mut RecordSink,
    cancel: &CancellationToken,
) -> Result<RunSummary, HarvestError> {
    let mut summary = RunSummary::new(Pass::Search, max_pages as usize, sink.path().to_path_buf());
    let mut progress = Progress::new(max_pages as usize);

    tracing::info!("Searching {} for {:?} (up to {} pages)", kind, query, max_pages);

    for page in 1..=max_pages {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        match search_page(client, kind, query, page).await {
            Ok(records) if records.is_empty() => {
                tracing::info!("No results on page {}; search complete", page);
                break;
            }
            Ok(records) => {
                for record in &records {
                    sink.append(record)?;
                }
                sink.flush()?;

                summary.tally.completed += 1;
                summary.tally.records += records.len() as u64;
                tracing::info!(
                    "Page {}: {} records | total: {}",
                    page,
                    records.len(),
                    summary.tally.records
                );
            }
            Err(e) => {
                tracing::warn!("Page {}: {} ({}); stopping search", page, e.kind(), e);
                summary.tally.failed += 1;
                break;
            }
        }
        progress.advance();
    }

    sink.flush()?;
    summary.elapsed = progress.elapsed();
    Ok(summary)
}
