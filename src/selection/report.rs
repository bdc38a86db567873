use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::feed::Article;
use crate::util::strip_markup;

/// Focus areas for a focused report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
pub enum AlertKind {
    /// CVEs, malware families, patches and mitigations
    KeySecurityAlerts,
    /// Breaches and attacks: victims, actors, timeline, impact
    MajorCyberIncidents,
    /// Strategic impact on a diversified enterprise
    ImpactToConglomerate,
}

impl AlertKind {
    pub fn label(self) -> &'static str {
        match self {
            AlertKind::KeySecurityAlerts => "Key Security Alerts",
            AlertKind::MajorCyberIncidents => "Major Cyber Incidents",
            AlertKind::ImpactToConglomerate => "Impact to Conglomerate",
        }
    }
}

/// Which report the generator is asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReportKind {
    Executive,
    Focused(AlertKind),
    Full,
    /// Aggregated from a custom source set, named for attribution.
    Custom(Vec<String>),
    FromSelection,
}

impl ReportKind {
    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Executive => "Executive Intelligence Briefing",
            ReportKind::Focused(alert) => alert.label(),
            ReportKind::Full => "Full Intelligence Report",
            ReportKind::Custom(_) => "Custom Intelligence Report",
            ReportKind::FromSelection => "Report from Selected Articles",
        }
    }
}

/// An article with its stable 1-based citation number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitedArticle {
    pub index: usize,
    pub article: Article,
}

/// What the generator receives: an already scoped, size-checked article
/// sequence numbered from 1 so generated text can cite `[Article N]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub articles: Vec<CitedArticle>,
}

impl ReportRequest {
    pub fn new(kind: ReportKind, articles: Vec<Article>) -> Self {
        let articles = articles
            .into_iter()
            .enumerate()
            .map(|(i, article)| CitedArticle {
                index: i + 1,
                article,
            })
            .collect();
        Self { kind, articles }
    }
}

/// A finished report and the articles it was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    pub text: String,
    pub sources: Vec<CitedArticle>,
}

/// Opaque failure from the report generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to generate report: {0}")]
pub struct GenerationError(pub String);

/// Turns a [`ReportRequest`] into text. Implementations typically call a
/// hosted text-generation model.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, request: &ReportRequest) -> Result<String, GenerationError>;
}

/// Offline generator: a numbered digest of the cited articles.
///
/// Uses the same `Article N: title` layout a model prompt would, which makes
/// it handy for checking exactly what a report would be built from.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestGenerator;

#[async_trait]
impl ReportGenerator for DigestGenerator {
    async fn generate(&self, request: &ReportRequest) -> Result<String, GenerationError> {
        if request.articles.is_empty() {
            return Err(GenerationError("no articles to summarize".to_string()));
        }
        let mut text = format!("{}\n\n", request.kind.title());
        if let ReportKind::Custom(names) = &request.kind {
            text.push_str(&format!("Sources: {}\n\n", names.join(", ")));
        }
        let body: Vec<String> = request
            .articles
            .iter()
            .map(|cited| {
                let description = strip_markup(&cited.article.description);
                format!(
                    "Article {}: {}\n{}",
                    cited.index,
                    cited.article.title,
                    description.trim()
                )
            })
            .collect();
        text.push_str(&body.join("\n\n---\n\n"));
        Ok(text)
    }
}
