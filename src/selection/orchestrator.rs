use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::feed::{
    AggregateLimits, Aggregation, Aggregator, Article, FeedResult, FetchError, Source,
    SourceFetcher, Transport,
};
use crate::selection::report::{
    AlertKind, GenerationError, Report, ReportGenerator, ReportKind, ReportRequest,
};
use crate::selection::state::{
    take_window, FetchTarget, FetchTicket, SelectionState, ValidationError,
};

/// Failure of a report operation.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Report thresholds and the background refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub min_report_articles: usize,
    pub report_window: usize,
    pub refresh_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_report_articles: 5,
            report_window: 5,
            refresh_interval: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Results from background fetch tasks.
#[derive(Debug)]
pub enum SelectionEvent {
    FeedLoaded {
        ticket: FetchTicket,
        result: Result<FeedResult, FetchError>,
    },
    AllLoaded {
        ticket: FetchTicket,
        aggregation: Aggregation,
    },
    /// A background task panicked.
    ///
    /// Fields:
    /// - `task`: Name of the task that panicked ("feed_load", "refresh", "aggregate_all")
    /// - `error`: The panic message extracted from the panic payload
    TaskPanicked {
        ticket: FetchTicket,
        task: &'static str,
        error: String,
    },
}

/// Drives a [`SelectionState`]: spawns the fetches it asks for, feeds results
/// back through [`Orchestrator::handle_event`] and gates report requests.
///
/// Fetches run on the tokio runtime and report through the channel returned
/// by [`Orchestrator::new`]. Superseded fetches are not aborted; their
/// results arrive with an old generation and are dropped.
pub struct Orchestrator<T, G> {
    sources: Vec<Source>,
    fetcher: SourceFetcher<T>,
    aggregator: Aggregator<T>,
    generator: G,
    settings: Settings,
    state: SelectionState,
    event_tx: mpsc::Sender<SelectionEvent>,
}

impl<T, G> Orchestrator<T, G>
where
    T: Transport + Clone + 'static,
    G: ReportGenerator,
{
    pub fn new(
        sources: Vec<Source>,
        fetcher: SourceFetcher<T>,
        limits: AggregateLimits,
        generator: G,
        settings: Settings,
    ) -> (Self, mpsc::Receiver<SelectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(32);
        let aggregator = Aggregator::new(fetcher.clone(), limits);
        let orchestrator = Self {
            sources,
            fetcher,
            aggregator,
            generator,
            settings,
            state: SelectionState::new(),
            event_tx,
        };
        (orchestrator, event_rx)
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Configured sources, in display and merge order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn select_source(&mut self, source: Source) -> FetchTicket {
        let ticket = self.state.select_source(source);
        self.spawn_fetch(ticket.clone());
        ticket
    }

    pub fn toggle_custom_source(&mut self, source: Source) -> bool {
        self.state.toggle_custom_source(source)
    }

    pub fn toggle_pick_mode(&mut self) -> Result<bool, ValidationError> {
        self.state.toggle_pick_mode()
    }

    pub fn toggle_pick(&mut self, guid: &str) -> Result<bool, ValidationError> {
        self.state.toggle_pick(guid)
    }

    /// Starts a background refresh of the selected single source. Returns
    /// false when there is nothing to refresh.
    pub fn auto_refresh(&mut self) -> bool {
        match self.state.refresh_ticket() {
            Some(ticket) => {
                tracing::info!(generation = ticket.generation, "Auto-refreshing selected feed");
                self.spawn_fetch(ticket);
                true
            }
            None => false,
        }
    }

    /// Applies a background result. Returns false if it was stale.
    pub fn handle_event(&mut self, event: SelectionEvent) -> bool {
        match event {
            SelectionEvent::FeedLoaded { ticket, result } => self.state.apply_feed(&ticket, result),
            SelectionEvent::AllLoaded { ticket, aggregation } => {
                self.state.apply_aggregation(&ticket, aggregation)
            }
            SelectionEvent::TaskPanicked { ticket, task, error } => {
                self.state.abandon(&ticket, &format!("{task} task failed: {error}"))
            }
        }
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let tx = self.event_tx.clone();
        match ticket.target.clone() {
            FetchTarget::Single(source) => {
                let fetcher = self.fetcher.clone();
                let task = if ticket.background { "refresh" } else { "feed_load" };
                tokio::spawn(async move {
                    let event = match catch_task_panic(fetcher.fetch_source(&source)).await {
                        Ok(result) => SelectionEvent::FeedLoaded { ticket, result },
                        Err(error) => {
                            tracing::error!(task, error = %error, "Background task panicked");
                            SelectionEvent::TaskPanicked { ticket, task, error }
                        }
                    };
                    send_event(&tx, event).await;
                });
            }
            FetchTarget::All => {
                let aggregator = self.aggregator.clone();
                let sources = self.sources.clone();
                tokio::spawn(async move {
                    let event = match catch_task_panic(aggregator.aggregate_all(&sources)).await {
                        Ok(aggregation) => SelectionEvent::AllLoaded { ticket, aggregation },
                        Err(error) => {
                            tracing::error!(
                                task = "aggregate_all",
                                error = %error,
                                "Background task panicked"
                            );
                            SelectionEvent::TaskPanicked {
                                ticket,
                                task: "aggregate_all",
                                error,
                            }
                        }
                    };
                    send_event(&tx, event).await;
                });
            }
        }
    }

    pub async fn executive_report(&self) -> Result<Report, SelectionError> {
        self.window_report(ReportKind::Executive).await
    }

    pub async fn focused_report(&self, alert: AlertKind) -> Result<Report, SelectionError> {
        self.window_report(ReportKind::Focused(alert)).await
    }

    pub async fn full_report(&self) -> Result<Report, SelectionError> {
        self.window_report(ReportKind::Full).await
    }

    /// Newest articles of the working set.
    async fn window_report(&self, kind: ReportKind) -> Result<Report, SelectionError> {
        let articles = self
            .state
            .report_window(self.settings.min_report_articles, self.settings.report_window)?;
        self.generate(kind, articles).await
    }

    /// Aggregates the custom set (no all-sources cap), then reports on the
    /// newest articles of the merged result.
    pub async fn custom_report(&self) -> Result<Report, SelectionError> {
        let sources = self.state.custom_sources().to_vec();
        if sources.is_empty() {
            return Err(ValidationError::NoCustomSources.into());
        }

        let aggregation = self.aggregator.aggregate_subset(&sources).await;
        let articles = take_window(
            &aggregation.articles,
            self.settings.min_report_articles,
            self.settings.report_window,
        )
        .map_err(|e| match e {
            ValidationError::TooFewArticles { required, found } => {
                ValidationError::TooFewAcrossSources { required, found }
            }
            other => other,
        })?;

        let names = sources.into_iter().map(|s| s.name).collect();
        self.generate(ReportKind::Custom(names), articles).await
    }

    /// Reports on the picked articles, in working-set order.
    pub async fn selection_report(&self) -> Result<Report, SelectionError> {
        let articles = self.state.picked_articles()?;
        self.generate(ReportKind::FromSelection, articles).await
    }

    async fn generate(
        &self,
        kind: ReportKind,
        articles: Vec<Article>,
    ) -> Result<Report, SelectionError> {
        let request = ReportRequest::new(kind, articles);
        let title = request.kind.title();
        tracing::info!(report = title, articles = request.articles.len(), "Requesting report");

        let text = self.generator.generate(&request).await.map_err(|e| {
            tracing::warn!(report = title, error = %e, "Report generation failed");
            e
        })?;

        Ok(Report {
            title: title.to_string(),
            text,
            sources: request.articles,
        })
    }
}

async fn send_event(tx: &mpsc::Sender<SelectionEvent>, event: SelectionEvent) {
    if let Err(e) = tx.send(event).await {
        tracing::warn!(error = %e, "Channel send failed (receiver dropped)");
    }
}

/// Runs `future`, turning a panic into `Err(message)`.
async fn catch_task_panic<F, O>(future: F) -> Result<O, String>
where
    F: std::future::Future<Output = O>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::state::{LoadState, Mode};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct StubTransport {
        bodies: Arc<HashMap<String, (Duration, String)>>,
    }

    impl StubTransport {
        fn new(feeds: &[(&str, u64, String)]) -> Self {
            let bodies = feeds
                .iter()
                .map(|(url, delay, body)| {
                    (url.to_string(), (Duration::from_millis(*delay), body.clone()))
                })
                .collect();
            Self {
                bodies: Arc::new(bodies),
            }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn fetch_text(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let Some((delay, body)) = self.bodies.get(url) else {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                    reason: "Internal Server Error".to_string(),
                });
            };
            tokio::time::sleep(*delay).await;
            Ok(body.clone().into_bytes())
        }
    }

    /// Records every request and answers with a fixed string.
    #[derive(Clone, Default)]
    struct RecordingGenerator {
        requests: Arc<Mutex<Vec<ReportRequest>>>,
    }

    impl RecordingGenerator {
        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReportGenerator for RecordingGenerator {
        async fn generate(&self, request: &ReportRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok("report".to_string())
        }
    }

    fn rss(prefix: &str, n: usize) -> String {
        let items: String = (0..n)
            .map(|i| {
                format!(
                    "<item><title>{prefix}{i}</title><link>https://{prefix}/{i}</link>\
                     <guid>{prefix}-{i}</guid>\
                     <pubDate>2024-01-{:02}T00:00:00Z</pubDate></item>",
                    28 - i.min(27)
                )
            })
            .collect();
        format!("<rss><channel><title>{prefix}</title>{items}</channel></rss>")
    }

    fn source(name: &str) -> Source {
        Source::new(name, name)
    }

    fn orchestrator(
        feeds: &[(&str, u64, String)],
        generator: RecordingGenerator,
    ) -> (
        Orchestrator<StubTransport, RecordingGenerator>,
        mpsc::Receiver<SelectionEvent>,
    ) {
        let sources = feeds.iter().map(|(url, _, _)| source(url)).collect();
        Orchestrator::new(
            sources,
            SourceFetcher::new(StubTransport::new(feeds)),
            AggregateLimits::default(),
            generator,
            Settings::default(),
        )
    }

    async fn load(
        orch: &mut Orchestrator<StubTransport, RecordingGenerator>,
        rx: &mut mpsc::Receiver<SelectionEvent>,
        name: &str,
    ) {
        orch.select_source(source(name));
        let event = rx.recv().await.unwrap();
        assert!(orch.handle_event(event));
    }

    #[tokio::test]
    async fn test_four_articles_fail_validation_without_generator_call() {
        let generator = RecordingGenerator::default();
        let (mut orch, mut rx) = orchestrator(&[("a", 0, rss("a", 4))], generator.clone());
        load(&mut orch, &mut rx, "a").await;
        assert_eq!(orch.state().articles().len(), 4);

        for result in [
            orch.executive_report().await,
            orch.focused_report(AlertKind::KeySecurityAlerts).await,
            orch.full_report().await,
        ] {
            match result {
                Err(SelectionError::Validation(ValidationError::TooFewArticles {
                    required: 5,
                    found: 4,
                })) => {}
                other => panic!("Expected TooFewArticles, got {:?}", other),
            }
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_executive_report_uses_newest_window() {
        let generator = RecordingGenerator::default();
        let (mut orch, mut rx) = orchestrator(&[("a", 0, rss("a", 8))], generator.clone());
        load(&mut orch, &mut rx, "a").await;

        let report = orch.executive_report().await.unwrap();
        assert_eq!(report.title, "Executive Intelligence Briefing");
        assert_eq!(report.sources.len(), 5);
        assert_eq!(report.sources[0].index, 1);
        assert_eq!(report.sources[0].article.title, "a0");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_result_for_previous_source_is_discarded() {
        let (mut orch, mut rx) = orchestrator(
            &[("a", 500, rss("a", 3)), ("b", 10, rss("b", 2))],
            RecordingGenerator::default(),
        );

        let first = orch.select_source(source("a"));
        let second = orch.select_source(source("b"));
        assert_ne!(first.generation, second.generation);

        let mut applied = Vec::new();
        for _ in 0..2 {
            let event = rx.recv().await.unwrap();
            applied.push(orch.handle_event(event));
        }
        assert_eq!(applied, vec![true, false]);

        let titles: Vec<_> = orch.state().articles().iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["b0", "b1"]);
        assert_eq!(orch.state().mode(), &Mode::Single(source("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_discarded_after_switching_to_all() {
        let (mut orch, mut rx) = orchestrator(
            &[("a", 200, rss("a", 6)), ("b", 0, rss("b", 2))],
            RecordingGenerator::default(),
        );
        orch.select_source(source("b"));
        let event = rx.recv().await.unwrap();
        orch.handle_event(event);
        assert!(orch.auto_refresh());
        assert_eq!(orch.state().load_state(), LoadState::Refreshing);

        orch.select_source(Source::all_sources());
        let mut applied = 0;
        for _ in 0..2 {
            let event = rx.recv().await.unwrap();
            if orch.handle_event(event) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(orch.state().mode(), &Mode::All);
        assert_eq!(orch.state().articles().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_is_skipped() {
        let (mut orch, mut rx) =
            orchestrator(&[("a", 300, rss("a", 6))], RecordingGenerator::default());
        load(&mut orch, &mut rx, "a").await;

        assert!(orch.auto_refresh());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!orch.auto_refresh());

        let event = rx.recv().await.unwrap();
        assert!(orch.handle_event(event));
        assert_eq!(orch.state().load_state(), LoadState::Idle);
        assert_eq!(orch.state().articles().len(), 6);

        // Nothing else was spawned, so no older result can land later.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert!(orch.auto_refresh());
    }

    #[tokio::test]
    async fn test_all_sources_merge_with_failing_source() {
        let feeds = [("a", 0, rss("a", 3)), ("b", 0, rss("b", 3))];
        let (mut orch, mut rx) = Orchestrator::new(
            vec![source("a"), source("missing"), source("b")],
            SourceFetcher::new(StubTransport::new(&feeds)),
            AggregateLimits::default(),
            RecordingGenerator::default(),
            Settings::default(),
        );
        orch.select_source(Source::all_sources());
        let event = rx.recv().await.unwrap();
        assert!(orch.handle_event(event));
        assert_eq!(orch.state().articles().len(), 6);
        assert_eq!(orch.state().error(), None);
    }

    #[tokio::test]
    async fn test_custom_report_aggregates_on_demand() {
        let generator = RecordingGenerator::default();
        let (mut orch, _rx) = orchestrator(
            &[("a", 0, rss("a", 3)), ("b", 0, rss("b", 3))],
            generator.clone(),
        );
        orch.toggle_custom_source(source("a"));
        orch.toggle_custom_source(source("b"));

        let report = orch.custom_report().await.unwrap();
        assert_eq!(report.title, "Custom Intelligence Report");
        assert_eq!(report.sources.len(), 5);

        let requests = generator.requests.lock().unwrap();
        assert_eq!(
            requests[0].kind,
            ReportKind::Custom(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_custom_report_needs_enough_articles() {
        let generator = RecordingGenerator::default();
        let (mut orch, _rx) = orchestrator(
            &[("a", 0, rss("a", 2)), ("b", 0, rss("b", 2))],
            generator.clone(),
        );
        assert!(matches!(
            orch.custom_report().await,
            Err(SelectionError::Validation(ValidationError::NoCustomSources))
        ));

        orch.toggle_custom_source(source("a"));
        orch.toggle_custom_source(source("b"));
        let err = orch.custom_report().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "A minimum of 5 articles are required across selected feeds. Found only 4."
        );
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_custom_set_never_reaches_generator() {
        let generator = RecordingGenerator::default();
        let settings = Settings {
            min_report_articles: 0,
            ..Settings::default()
        };
        let (mut orch, _rx) = Orchestrator::new(
            vec![source("missing")],
            SourceFetcher::new(StubTransport::new(&[])),
            AggregateLimits::default(),
            generator.clone(),
            settings,
        );
        orch.toggle_custom_source(source("missing"));

        match orch.custom_report().await {
            Err(SelectionError::Validation(ValidationError::TooFewAcrossSources {
                required: 1,
                found: 0,
            })) => {}
            other => panic!("Expected TooFewAcrossSources, got {:?}", other),
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_selection_report_uses_picks() {
        let generator = RecordingGenerator::default();
        let (mut orch, mut rx) = orchestrator(&[("a", 0, rss("a", 3))], generator.clone());
        load(&mut orch, &mut rx, "a").await;

        orch.toggle_pick_mode().unwrap();
        assert!(matches!(
            orch.selection_report().await,
            Err(SelectionError::Validation(ValidationError::NoPicks))
        ));
        assert_eq!(generator.calls(), 0);

        orch.toggle_pick("a-2").unwrap();
        let report = orch.selection_report().await.unwrap();
        assert_eq!(report.title, "Report from Selected Articles");
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].article.guid, "a-2");
    }

    #[tokio::test]
    async fn test_single_source_failure_message() {
        let (mut orch, mut rx) = orchestrator(&[], RecordingGenerator::default());
        orch.select_source(Source::new("Down", "down"));
        let event = rx.recv().await.unwrap();
        orch.handle_event(event);
        let message = orch.state().error().unwrap();
        assert!(message.starts_with("Failed to load feed from Down: "));
        assert!(message.contains("500"));
        assert_eq!(orch.state().load_state(), LoadState::Idle);
    }
}
