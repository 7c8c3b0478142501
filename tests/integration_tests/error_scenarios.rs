//! Error handling scenarios
//!
//! Lookup failures, timeouts, degraded inputs and unsatisfiable constraints.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use sendplan::catalog::SendTypeCatalog;
use sendplan::config::PlannerConfig;
use sendplan::error::{Error, SendplanErrorTrait, Severity};
use sendplan::models::{ContentRankings, Creator, PageType, PerformanceTrends, RiskSegment};
use sendplan::pipeline::{ContextProvider, SchedulePipeline, StaticContext};
use sendplan::utils::RetryConfig;
use sendplan::validation::{ConsensusKind, VerdictStatus};

use crate::common::{context, rankings, week_start};

fn fast_config() -> PlannerConfig {
    let mut config = PlannerConfig::default();
    config.retry = RetryConfig::with_delays(3, 1, 5).with_timeout(50);
    config
}

/// Wraps a static context with slow or flaky lookups
struct UnreliableContext {
    inner: StaticContext,
    ranking_failures: u32,
    ranking_calls: AtomicU32,
    trend_delay: Duration,
    trends_down: bool,
}

impl UnreliableContext {
    fn new(inner: StaticContext) -> Self {
        Self {
            inner,
            ranking_failures: 0,
            ranking_calls: AtomicU32::new(0),
            trend_delay: Duration::ZERO,
            trends_down: false,
        }
    }
}

#[async_trait]
impl ContextProvider for UnreliableContext {
    async fn creator_profile(&self, creator_id: &str) -> anyhow::Result<Creator> {
        self.inner.creator_profile(creator_id).await
    }

    async fn performance_trends(&self, creator_id: &str) -> anyhow::Result<Option<PerformanceTrends>> {
        tokio::time::sleep(self.trend_delay).await;
        if self.trends_down {
            anyhow::bail!("trends store unavailable");
        }
        self.inner.performance_trends(creator_id).await
    }

    async fn content_rankings(&self, creator_id: &str) -> anyhow::Result<Option<ContentRankings>> {
        let call = self.ranking_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.ranking_failures {
            anyhow::bail!("rankings service unavailable");
        }
        self.inner.content_rankings(creator_id).await
    }

    async fn send_type_catalog(&self) -> anyhow::Result<SendTypeCatalog> {
        self.inner.send_type_catalog().await
    }

    async fn flagged_segments(&self, creator_id: &str) -> anyhow::Result<Vec<RiskSegment>> {
        self.inner.flagged_segments(creator_id).await
    }
}

// ============================================================================
// Lookup Failures
// ============================================================================

#[tokio::test]
async fn test_unknown_creator_aborts() {
    let err = SchedulePipeline::new(fast_config())
        .run(&context("known", 3, PageType::Paid), "unknown", week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ContextUnavailable { lookup: "creator_profile", .. }));
    assert_eq!(err.severity(), Severity::Blocking);
}

#[tokio::test]
async fn test_flaky_lookup_recovers() {
    let mut provider = UnreliableContext::new(context("flaky", 3, PageType::Paid));
    provider.ranking_failures = 2;

    let outcome = SchedulePipeline::new(fast_config())
        .run(&provider, "flaky", week_start())
        .await
        .unwrap();

    assert_eq!(provider.ranking_calls.load(Ordering::SeqCst), 3);
    assert!(outcome.warnings.iter().all(|w| !w.contains("no content rankings")));
}

#[tokio::test]
async fn test_lookup_timeout_is_fatal() {
    let mut provider = UnreliableContext::new(context("slow", 3, PageType::Paid));
    provider.trend_delay = Duration::from_millis(500);

    let err = SchedulePipeline::new(fast_config())
        .run(&provider, "slow", week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StageTimeout { lookup: "performance_trends", timeout_ms: 50 }));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_empty_catalog_is_blocking() {
    let provider = context("empty", 3, PageType::Paid).with_catalog(SendTypeCatalog::new(Vec::new()));
    let err = SchedulePipeline::new(fast_config())
        .run(&provider, "empty", week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingInput { field: "send_type_catalog" }));
}

#[tokio::test]
async fn test_invalid_tier_is_blocking() {
    let err = SchedulePipeline::new(fast_config())
        .run(&context("tier-0", 0, PageType::Free), "tier-0", week_start())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidTier(0)));
}

// ============================================================================
// Degraded Inputs
// ============================================================================

#[tokio::test]
async fn test_missing_trends_and_rankings_degrade() {
    let provider = StaticContext::new(Creator::new("bare", 2, PageType::Paid));
    let outcome = SchedulePipeline::new(fast_config())
        .run(&provider, "bare", week_start())
        .await
        .unwrap();

    let volume = outcome.volume.unwrap();
    assert!(volume.degraded);
    assert_eq!(volume.confidence_score, 0.3);
    assert_eq!(volume.daily_targets.iter().max().copied(), Some(9));
    assert!(outcome.warnings.iter().filter(|w| w.starts_with("DEGRADED")).count() >= 2);
}

#[tokio::test]
async fn test_failed_optional_lookups_degrade() {
    let mut provider = UnreliableContext::new(context("outage", 3, PageType::Paid));
    provider.ranking_failures = u32::MAX;
    provider.trends_down = true;

    let outcome = SchedulePipeline::new(fast_config())
        .run(&provider, "outage", week_start())
        .await
        .unwrap();

    assert_eq!(provider.ranking_calls.load(Ordering::SeqCst), 3);
    let volume = outcome.volume.as_ref().unwrap();
    assert!(volume.degraded);
    assert_eq!(volume.confidence_score, 0.3);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.starts_with("DEGRADED") && w.contains("content_rankings")));
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.starts_with("DEGRADED") && w.contains("performance_trends")));
    assert!(outcome.verdict.warnings.iter().any(|w| w.contains("content_rankings")));
    assert!(outcome.pricing.is_some());
}

// ============================================================================
// Structural Rejections
// ============================================================================

#[tokio::test]
async fn test_unsatisfiable_timing_rejects() {
    let mut config = fast_config();
    config.timing.global_gap_minutes = 300;

    let outcome = SchedulePipeline::new(config)
        .run(&context("cramped", 5, PageType::Paid), "cramped", week_start())
        .await
        .unwrap();

    assert_eq!(outcome.verdict.status, VerdictStatus::Rejected);
    assert_eq!(outcome.verdict.consensus, ConsensusKind::StructuralRejection);
    assert!(outcome.schedule.is_none());
    assert!(outcome
        .verdict
        .issues
        .iter()
        .any(|i| i.constraint == "timing_conflict" && i.day.is_some()));
}

#[tokio::test]
async fn test_no_eligible_types_rejects() {
    let paid_only = SendTypeCatalog::new(
        SendTypeCatalog::default()
            .types
            .into_iter()
            .filter(|t| t.page_restriction == Some(PageType::Paid))
            .collect(),
    );
    let provider = StaticContext::new(Creator::new("free-only", 3, PageType::Free))
        .with_rankings(rankings())
        .with_catalog(paid_only);

    let outcome = SchedulePipeline::new(fast_config())
        .run(&provider, "free-only", week_start())
        .await
        .unwrap();

    assert_eq!(outcome.verdict.status, VerdictStatus::Rejected);
    assert!(outcome.schedule.is_none());
    assert_eq!(outcome.verdict.issues[0].constraint, "allocation");
    assert_eq!(outcome.verdict.issues[0].severity, Severity::Structural);
}
