use futures::stream::{self, StreamExt};
use std::cmp::Reverse;
use std::collections::HashSet;

use crate::feed::fetcher::{SourceFetcher, Transport};
use crate::feed::types::{Article, FeedResult, Source};

/// Bounds applied to one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateLimits {
    /// Maximum articles returned by [`Aggregator::aggregate_all`].
    pub all_sources_cap: usize,
    /// Maximum simultaneous source fetches.
    pub concurrency: usize,
}

impl Default for AggregateLimits {
    fn default() -> Self {
        Self {
            all_sources_cap: 50,
            concurrency: 10,
        }
    }
}

/// A source whose fetch settled as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: Source,
    pub message: String,
}

/// Merged, deduplicated, date-sorted articles plus a per-source tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub articles: Vec<Article>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<SourceFailure>,
}

impl Aggregation {
    /// Every source failed. Distinct from "sources answered but had no
    /// articles", which also produces an empty list.
    pub fn is_total_failure(&self) -> bool {
        self.attempted > 0 && self.succeeded == 0
    }

    /// Human-readable tally, e.g. "3 of 5 sources returned data".
    pub fn summary(&self) -> String {
        format!(
            "{} of {} sources returned data",
            self.succeeded, self.attempted
        )
    }
}

/// Fetches several sources concurrently and merges their items.
#[derive(Clone)]
pub struct Aggregator<T> {
    fetcher: SourceFetcher<T>,
    limits: AggregateLimits,
}

impl<T: Transport> Aggregator<T> {
    pub fn new(fetcher: SourceFetcher<T>, limits: AggregateLimits) -> Self {
        Self { fetcher, limits }
    }

    pub fn limits(&self) -> AggregateLimits {
        self.limits
    }

    /// Aggregates every source, capped at `all_sources_cap` articles.
    pub async fn aggregate_all(&self, sources: &[Source]) -> Aggregation {
        self.aggregate(sources, Some(self.limits.all_sources_cap)).await
    }

    /// Aggregates a user-chosen subset. Only the per-feed item cap applies.
    pub async fn aggregate_subset(&self, sources: &[Source]) -> Aggregation {
        self.aggregate(sources, None).await
    }

    /// Settles every fetch before merging; one failing source never
    /// discards the others. Never returns an error.
    async fn aggregate(&self, sources: &[Source], cap: Option<usize>) -> Aggregation {
        let fetchable: Vec<Source> = sources
            .iter()
            .filter(|s| !s.is_sentinel())
            .cloned()
            .collect();
        if fetchable.is_empty() {
            return Aggregation::default();
        }

        // `buffered` yields in input order whatever the completion order, so
        // the merge (and therefore which duplicate wins) is deterministic.
        let fetcher = &self.fetcher;
        let settled: Vec<(Source, FeedResult)> = stream::iter(fetchable)
            .map(|source| async move {
                let result = match fetcher.fetch(&source.url).await {
                    Ok(feed) => feed,
                    Err(e) => {
                        tracing::warn!(source = %source.name, error = %e, "A feed failed to load");
                        FeedResult::error(&source.url, e.to_string())
                    }
                };
                (source, result)
            })
            .buffered(self.limits.concurrency.max(1))
            .collect()
            .await;

        let aggregation = merge(settled, cap);
        tracing::info!(
            succeeded = aggregation.succeeded,
            attempted = aggregation.attempted,
            articles = aggregation.articles.len(),
            "Aggregation complete"
        );
        aggregation
    }
}

/// Merges settled per-source results in the order given.
///
/// Links are compared as exact strings; the first copy of a link wins.
/// Articles without a link cannot be deduplicated and are left out.
pub fn merge(settled: Vec<(Source, FeedResult)>, cap: Option<usize>) -> Aggregation {
    let mut aggregation = Aggregation {
        attempted: settled.len(),
        ..Aggregation::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for (source, result) in settled {
        if !result.is_ok() {
            aggregation.failures.push(SourceFailure {
                source,
                message: result.message.unwrap_or_default(),
            });
            continue;
        }
        aggregation.succeeded += 1;
        for article in result.items {
            if article.link.is_empty() || seen.contains(&article.link) {
                continue;
            }
            seen.insert(article.link.clone());
            aggregation.articles.push(article);
        }
    }

    sort_newest_first(&mut aggregation.articles);
    if let Some(cap) = cap {
        aggregation.articles.truncate(cap);
    }
    aggregation
}

/// Sorts by publish date, newest first.
///
/// Articles whose date is empty or unparsable go after every dated article.
/// The sort is stable, so ties and undated articles keep merge order.
pub fn sort_newest_first(articles: &mut [Article]) {
    // `Reverse(None)` orders after every `Reverse(Some(_))`.
    articles.sort_by_cached_key(|a| Reverse(a.published_at()));
}
