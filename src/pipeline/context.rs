//! Read-only planning context
//!
//! Lookups against the external collaborators go through [`ContextProvider`].
//! [`load_context`] fetches everything once per run, concurrently, with
//! bounded retry, and hands the stages an immutable [`PlanningContext`].

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::catalog::SendTypeCatalog;
use crate::error::{Error, Result};
use crate::models::{ContentRankings, Creator, PerformanceTrends, RiskSegment};
use crate::utils::retry::{fetch_with_retry, RetryConfig};

/// External lookups consumed by the planner
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Mandatory; failure aborts the run
    async fn creator_profile(&self, creator_id: &str) -> anyhow::Result<Creator>;

    /// `None` when no trend history exists
    async fn performance_trends(&self, creator_id: &str) -> anyhow::Result<Option<PerformanceTrends>>;

    /// `None` when the creator has no ranked content
    async fn content_rankings(&self, creator_id: &str) -> anyhow::Result<Option<ContentRankings>>;

    async fn send_type_catalog(&self) -> anyhow::Result<SendTypeCatalog>;

    async fn flagged_segments(&self, creator_id: &str) -> anyhow::Result<Vec<RiskSegment>>;
}

/// Everything the stages read, fetched once
#[derive(Debug, Clone)]
pub struct PlanningContext {
    pub creator: Creator,
    pub trends: Option<PerformanceTrends>,
    pub rankings: Option<ContentRankings>,
    pub catalog: SendTypeCatalog,
    pub flagged_segments: Vec<RiskSegment>,
    /// Optional lookups that failed and fell back to defaults
    pub warnings: Vec<String>,
}

/// Fall back to the empty value when an optional lookup is exhausted.
/// Timeouts and every other error still propagate.
fn optional<T: Default>(fetched: Result<T>, warnings: &mut Vec<String>) -> Result<T> {
    match fetched {
        Err(Error::ContextUnavailable { lookup, attempts, reason }) => {
            warn!(lookup, attempts, reason = %reason, "Optional lookup unavailable, continuing without it");
            warnings.push(format!(
                "DEGRADED: {lookup} unavailable after {attempts} attempt(s) ({reason}); defaults used"
            ));
            Ok(T::default())
        }
        other => other,
    }
}

/// Fetch the full context with retry
///
/// `creator_profile` and `send_type_catalog` are mandatory. The remaining
/// lookups degrade to empty values with a warning once retries run out.
pub async fn load_context<P>(provider: &P, creator_id: &str, retry: &RetryConfig) -> Result<PlanningContext>
where
    P: ContextProvider + ?Sized,
{
    let (creator, trends, rankings, catalog, flagged_segments) = tokio::join!(
        fetch_with_retry(retry, "creator_profile", || provider.creator_profile(creator_id)),
        fetch_with_retry(retry, "performance_trends", || provider.performance_trends(creator_id)),
        fetch_with_retry(retry, "content_rankings", || provider.content_rankings(creator_id)),
        fetch_with_retry(retry, "send_type_catalog", || provider.send_type_catalog()),
        fetch_with_retry(retry, "flagged_segments", || provider.flagged_segments(creator_id)),
    );
    let (creator, catalog) = (creator?, catalog?);

    let mut warnings = Vec::new();
    let trends = optional(trends, &mut warnings)?;
    let rankings = optional(rankings, &mut warnings)?;
    let flagged_segments = optional(flagged_segments, &mut warnings)?;

    if catalog.is_empty() {
        return Err(Error::missing("send_type_catalog"));
    }

    info!(
        creator = %creator.id,
        tier = creator.tier,
        page_type = %creator.page_type,
        has_trends = trends.is_some(),
        has_rankings = rankings.is_some(),
        send_types = catalog.len(),
        flagged = flagged_segments.len(),
        degraded_lookups = warnings.len(),
        "Planning context loaded"
    );

    Ok(PlanningContext {
        creator,
        trends,
        rankings,
        catalog,
        flagged_segments,
        warnings,
    })
}

// ============================================================================
// Static provider
// ============================================================================

/// In-memory provider for a single creator, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticContext {
    pub creator: Creator,
    #[serde(default)]
    pub trends: Option<PerformanceTrends>,
    #[serde(default)]
    pub rankings: Option<ContentRankings>,
    /// Built-in catalog when absent
    #[serde(default)]
    pub catalog: Option<SendTypeCatalog>,
    #[serde(default)]
    pub flagged_segments: Vec<RiskSegment>,
}

impl StaticContext {
    pub fn new(creator: Creator) -> Self {
        Self {
            creator,
            trends: None,
            rankings: None,
            catalog: None,
            flagged_segments: Vec::new(),
        }
    }

    pub fn with_trends(mut self, trends: PerformanceTrends) -> Self {
        self.trends = Some(trends);
        self
    }

    pub fn with_rankings(mut self, rankings: ContentRankings) -> Self {
        self.rankings = Some(rankings);
        self
    }

    pub fn with_catalog(mut self, catalog: SendTypeCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_flagged_segments(mut self, segments: Vec<RiskSegment>) -> Self {
        self.flagged_segments = segments;
        self
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse planning context")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read context file: {}", path.display()))?;
        debug!(path = %path.display(), "Loaded context file");
        Self::from_json(&content)
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn creator_profile(&self, creator_id: &str) -> anyhow::Result<Creator> {
        if creator_id != self.creator.id {
            bail!("unknown creator '{creator_id}'");
        }
        Ok(self.creator.clone())
    }

    async fn performance_trends(&self, _creator_id: &str) -> anyhow::Result<Option<PerformanceTrends>> {
        Ok(self.trends.clone())
    }

    async fn content_rankings(&self, _creator_id: &str) -> anyhow::Result<Option<ContentRankings>> {
        Ok(self.rankings.clone())
    }

    async fn send_type_catalog(&self) -> anyhow::Result<SendTypeCatalog> {
        Ok(self.catalog.clone().unwrap_or_default())
    }

    async fn flagged_segments(&self, _creator_id: &str) -> anyhow::Result<Vec<RiskSegment>> {
        Ok(self.flagged_segments.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageType;

    fn fast() -> RetryConfig {
        RetryConfig::with_delays(2, 1, 2)
    }

    #[tokio::test]
    async fn test_static_context_loads() {
        let provider = StaticContext::new(Creator::new("ctx-1", 2, PageType::Free))
            .with_flagged_segments(vec![RiskSegment::LowEngagement]);
        let ctx = load_context(&provider, "ctx-1", &fast()).await.unwrap();
        assert_eq!(ctx.creator.tier, 2);
        assert!(ctx.trends.is_none());
        assert_eq!(ctx.catalog.len(), SendTypeCatalog::default().len());
        assert_eq!(ctx.flagged_segments, vec![RiskSegment::LowEngagement]);
    }

    #[tokio::test]
    async fn test_unknown_creator_is_unavailable() {
        let provider = StaticContext::new(Creator::new("ctx-1", 2, PageType::Free));
        let err = load_context(&provider, "someone-else", &fast()).await.unwrap_err();
        assert!(matches!(err, Error::ContextUnavailable { lookup: "creator_profile", attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_missing_input() {
        let provider =
            StaticContext::new(Creator::new("ctx-1", 2, PageType::Free)).with_catalog(SendTypeCatalog::new(Vec::new()));
        let err = load_context(&provider, "ctx-1", &fast()).await.unwrap_err();
        assert!(matches!(err, Error::MissingInput { field: "send_type_catalog" }));
    }

    /// Static provider whose optional lookups always fail
    struct OptionalOutage(StaticContext);

    #[async_trait]
    impl ContextProvider for OptionalOutage {
        async fn creator_profile(&self, creator_id: &str) -> anyhow::Result<Creator> {
            self.0.creator_profile(creator_id).await
        }

        async fn performance_trends(&self, _creator_id: &str) -> anyhow::Result<Option<PerformanceTrends>> {
            bail!("trends store down")
        }

        async fn content_rankings(&self, _creator_id: &str) -> anyhow::Result<Option<ContentRankings>> {
            bail!("rankings service down")
        }

        async fn send_type_catalog(&self) -> anyhow::Result<SendTypeCatalog> {
            self.0.send_type_catalog().await
        }

        async fn flagged_segments(&self, _creator_id: &str) -> anyhow::Result<Vec<RiskSegment>> {
            bail!("segments service down")
        }
    }

    #[tokio::test]
    async fn test_optional_lookups_degrade() {
        let provider = OptionalOutage(StaticContext::new(Creator::new("ctx-1", 2, PageType::Free)));
        let ctx = load_context(&provider, "ctx-1", &fast()).await.unwrap();

        assert!(ctx.trends.is_none());
        assert!(ctx.rankings.is_none());
        assert!(ctx.flagged_segments.is_empty());
        assert_eq!(ctx.warnings.len(), 3);
        assert!(ctx.warnings.iter().all(|w| w.starts_with("DEGRADED")));
        assert!(ctx.warnings.iter().any(|w| w.contains("content_rankings")));
    }

    #[tokio::test]
    async fn test_mandatory_lookup_still_aborts() {
        let provider = OptionalOutage(StaticContext::new(Creator::new("ctx-1", 2, PageType::Free)));
        let err = load_context(&provider, "nobody", &fast()).await.unwrap_err();
        assert!(matches!(err, Error::ContextUnavailable { lookup: "creator_profile", .. }));
    }

    #[test]
    fn test_from_json_defaults() {
        let ctx = StaticContext::from_json(r#"{"creator": {"id": "c", "tier": 4, "page_type": "paid"}}"#).unwrap();
        assert_eq!(ctx.creator.page_type, PageType::Paid);
        assert!(ctx.catalog.is_none());
        assert!(ctx.flagged_segments.is_empty());
    }
}
