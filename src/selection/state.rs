//! Aggregation mode, working set and manual picks, as a plain state machine.
//!
//! No I/O happens here. Every fetch the state asks for is described by a
//! [`FetchTicket`] carrying the generation it was issued under; results are
//! only applied while that generation is still current, so a slow response
//! for a source the user has since left is dropped instead of overwriting
//! the newer selection.

use thiserror::Error;

use crate::feed::{Aggregation, Article, FeedResult, FetchError, Source};

/// Which articles are in view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Nothing selected yet.
    Idle,
    Single(Source),
    All,
    /// Sources ticked for a custom report. Nothing is fetched until the
    /// report is requested.
    Custom(Vec<Source>),
}

/// Loading indicator. A foreground load blanks the list; a background
/// refresh keeps it visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Single(Source),
    All,
}

/// Identifies one in-flight fetch and the selection it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub target: FetchTarget,
    pub background: bool,
}

/// A local precondition failed. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("A minimum of {required} articles are required. Found only {found}.")]
    TooFewArticles { required: usize, found: usize },
    #[error("A minimum of {required} articles are required across selected feeds. Found only {found}.")]
    TooFewAcrossSources { required: usize, found: usize },
    #[error("Select at least one article to generate a report")]
    NoPicks,
    #[error("No custom sources selected")]
    NoCustomSources,
    #[error("Article selection needs a single source with loaded articles")]
    PickModeUnavailable,
    #[error("Article selection mode is not active")]
    NotPicking,
    #[error("Article {0} is not in the current working set")]
    UnknownArticle(String),
}

#[derive(Debug, Clone)]
pub struct SelectionState {
    mode: Mode,
    articles: Vec<Article>,
    pick_mode: bool,
    picks: Vec<String>,
    generation: u64,
    load: LoadState,
    error: Option<String>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            articles: Vec::new(),
            pick_mode: false,
            picks: Vec::new(),
            generation: 0,
            load: LoadState::Idle,
            error: None,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// The working set.
    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn is_pick_mode(&self) -> bool {
        self.pick_mode
    }

    /// Picked guids in the order they were picked.
    pub fn picks(&self) -> &[String] {
        &self.picks
    }

    pub fn load_state(&self) -> LoadState {
        self.load
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sources ticked for a custom report, empty outside custom mode.
    pub fn custom_sources(&self) -> &[Source] {
        match &self.mode {
            Mode::Custom(sources) => sources,
            _ => &[],
        }
    }

    /// Invalidates in-flight fetches and drops everything tied to the
    /// previous view.
    fn reset_view(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.articles.clear();
        self.pick_mode = false;
        self.picks.clear();
        self.error = None;
        self.load = LoadState::Idle;
    }

    /// Selects a source and returns the foreground fetch to run.
    ///
    /// The sentinel switches to [`Mode::All`] and asks for the all-sources
    /// aggregation instead of a single fetch. Any custom selection is
    /// discarded either way.
    pub fn select_source(&mut self, source: Source) -> FetchTicket {
        self.reset_view();
        self.load = LoadState::Loading;

        let target = if source.is_sentinel() {
            self.mode = Mode::All;
            FetchTarget::All
        } else {
            self.mode = Mode::Single(source.clone());
            FetchTarget::Single(source)
        };
        tracing::debug!(generation = self.generation, ?target, "Selection changed");

        FetchTicket {
            generation: self.generation,
            target,
            background: false,
        }
    }

    /// Ticks or unticks a source for a custom report. Returns whether it is
    /// now ticked.
    ///
    /// Leaves single/all mode and clears the working set, but fetches
    /// nothing: the custom set is only aggregated when a report is requested.
    pub fn toggle_custom_source(&mut self, source: Source) -> bool {
        let mut selected = match std::mem::replace(&mut self.mode, Mode::Idle) {
            Mode::Custom(sources) => sources,
            _ => Vec::new(),
        };
        self.reset_view();

        let now_selected = match selected.iter().position(|s| s.url == source.url) {
            Some(pos) => {
                selected.remove(pos);
                false
            }
            None => {
                selected.push(source);
                true
            }
        };
        if !selected.is_empty() {
            self.mode = Mode::Custom(selected);
        }
        now_selected
    }

    /// Background refresh for the selected single source, if any.
    ///
    /// Skipped while any fetch is still running: two refreshes share a
    /// generation, so an overlapping one could settle last with older data.
    pub fn refresh_ticket(&mut self) -> Option<FetchTicket> {
        let Mode::Single(source) = &self.mode else {
            return None;
        };
        if self.load != LoadState::Idle {
            tracing::debug!(load = ?self.load, "Skipping refresh, a fetch is in flight");
            return None;
        }
        self.load = LoadState::Refreshing;
        self.error = None;
        Some(FetchTicket {
            generation: self.generation,
            target: FetchTarget::Single(source.clone()),
            background: true,
        })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                expected = self.generation,
                got = ticket.generation,
                "Ignoring stale fetch result (generation mismatch)"
            );
            return false;
        }
        true
    }

    fn finish_load(&mut self, ticket: &FetchTicket) {
        // A background refresh never clears a foreground spinner.
        if !ticket.background || self.load == LoadState::Refreshing {
            self.load = LoadState::Idle;
        }
    }

    /// Applies a single-source fetch result. Returns false if the ticket is
    /// stale and the result was discarded.
    pub fn apply_feed(
        &mut self,
        ticket: &FetchTicket,
        result: Result<FeedResult, FetchError>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let FetchTarget::Single(source) = &ticket.target else {
            return false;
        };
        self.finish_load(ticket);

        match result {
            Ok(feed) if feed.is_ok() => {
                self.error = None;
                self.replace_articles(feed.items);
            }
            Ok(feed) => {
                let message = feed
                    .message
                    .unwrap_or_else(|| "Failed to fetch RSS feed.".to_string());
                self.error = Some(format!("Failed to load feed from {}: {}", source.name, message));
            }
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "Feed load failed");
                self.error = Some(format!("Failed to load feed from {}: {}", source.name, e));
            }
        }
        true
    }

    /// Applies an all-sources aggregation. Returns false if stale.
    pub fn apply_aggregation(&mut self, ticket: &FetchTicket, aggregation: Aggregation) -> bool {
        if !self.is_current(ticket) || ticket.target != FetchTarget::All {
            return false;
        }
        self.finish_load(ticket);

        self.error = if aggregation.is_total_failure() {
            Some(format!("Failed to load all feeds: {}", aggregation.summary()))
        } else {
            None
        };
        self.replace_articles(aggregation.articles);
        true
    }

    /// Ends a fetch that produced no result. Returns false if stale.
    pub fn abandon(&mut self, ticket: &FetchTicket, message: &str) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.finish_load(ticket);
        self.error = Some(message.to_string());
        true
    }

    /// Swaps the working set in place. Picks that no longer refer to a
    /// visible article are dropped.
    fn replace_articles(&mut self, articles: Vec<Article>) {
        self.articles = articles;
        let articles = &self.articles;
        self.picks.retain(|guid| articles.iter().any(|a| &a.guid == guid));
        if self.articles.is_empty() {
            self.pick_mode = false;
        }
    }

    /// Enters or leaves manual pick mode, clearing prior picks either way.
    /// Returns whether pick mode is now on.
    pub fn toggle_pick_mode(&mut self) -> Result<bool, ValidationError> {
        if !self.pick_mode
            && (!matches!(self.mode, Mode::Single(_)) || self.articles.is_empty())
        {
            return Err(ValidationError::PickModeUnavailable);
        }
        self.pick_mode = !self.pick_mode;
        self.picks.clear();
        Ok(self.pick_mode)
    }

    /// Picks or unpicks an article by guid. Returns whether it is now picked.
    pub fn toggle_pick(&mut self, guid: &str) -> Result<bool, ValidationError> {
        if !self.pick_mode {
            return Err(ValidationError::NotPicking);
        }
        if !self.articles.iter().any(|a| a.guid == guid) {
            return Err(ValidationError::UnknownArticle(guid.to_string()));
        }
        match self.picks.iter().position(|g| g == guid) {
            Some(pos) => {
                self.picks.remove(pos);
                Ok(false)
            }
            None => {
                self.picks.push(guid.to_string());
                Ok(true)
            }
        }
    }

    /// Newest `window` articles of the working set, provided it holds at
    /// least `min` articles.
    pub fn report_window(
        &self,
        min: usize,
        window: usize,
    ) -> Result<Vec<Article>, ValidationError> {
        take_window(&self.articles, min, window)
    }

    /// Picked articles in working-set order.
    pub fn picked_articles(&self) -> Result<Vec<Article>, ValidationError> {
        if self.picks.is_empty() {
            return Err(ValidationError::NoPicks);
        }
        Ok(self
            .articles
            .iter()
            .filter(|a| self.picks.contains(&a.guid))
            .cloned()
            .collect())
    }
}

/// First `window` articles, if there are at least `min`. An empty set never
/// qualifies, whatever `min` says.
pub fn take_window(
    articles: &[Article],
    min: usize,
    window: usize,
) -> Result<Vec<Article>, ValidationError> {
    let required = min.max(1);
    if articles.len() < required {
        return Err(ValidationError::TooFewArticles {
            required,
            found: articles.len(),
        });
    }
    Ok(articles.iter().take(window).cloned().collect())
}
