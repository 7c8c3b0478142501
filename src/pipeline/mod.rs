//! Weekly planning pipeline
//!
//! ```text
//! load_context
//!     │
//!     ▼
//! VolumeResolver → SendTypeAllocator → DiversityEnforcer
//!     → TimingAssigner → PricingOptimizer → ValidationConsensus
//! ```
//!
//! Stages run strictly in sequence, each consuming its predecessor's output.
//! Blocking failures abort with `Err`; structural failures end in a REJECTED
//! verdict and no schedule is returned.

pub mod context;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::allocation::{strategy, SendTypeAllocator};
use crate::config::PlannerConfig;
use crate::diversity::{DiversityEnforcer, DiversityReport};
use crate::error::{Issue, Result, SendplanErrorTrait, Severity};
use crate::models::{week_start_of, WeeklySchedule};
use crate::pricing::{PricingContext, PricingOptimizer, PricingSummary};
use crate::timing::TimingAssigner;
use crate::validation::{ScheduleSnapshot, ValidationConsensus, ValidationVerdict, VerdictStatus};
use crate::volume::{VolumeConfig, VolumeResolver};

pub use context::{load_context, ContextProvider, PlanningContext, StaticContext};

/// Result of one planning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub verdict: ValidationVerdict,
    /// Present only when the verdict is not REJECTED
    pub schedule: Option<WeeklySchedule>,
    pub pricing: Option<PricingSummary>,
    pub volume: Option<VolumeConfig>,
    pub diversity: Option<DiversityReport>,
    /// Degraded and advisory notes from every stage
    pub warnings: Vec<String>,
}

impl PipelineOutcome {
    fn rejected(issues: Vec<Issue>, warnings: Vec<String>) -> Self {
        let mut verdict = ValidationVerdict::unscored(issues);
        verdict.warnings = warnings.clone();
        Self {
            verdict,
            schedule: None,
            pricing: None,
            volume: None,
            diversity: None,
            warnings,
        }
    }

    pub fn is_deployable(&self) -> bool {
        self.verdict.is_deployable()
    }
}

pub struct SchedulePipeline {
    config: PlannerConfig,
}

impl SchedulePipeline {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Load context for `creator_id` and plan the week containing `week_of`
    pub async fn run<P>(&self, provider: &P, creator_id: &str, week_of: NaiveDate) -> Result<PipelineOutcome>
    where
        P: ContextProvider + ?Sized,
    {
        let ctx = load_context(provider, creator_id, &self.config.retry).await?;
        self.plan(&ctx, week_of).await
    }

    /// Plan from an already loaded context
    pub async fn plan(&self, ctx: &PlanningContext, week_of: NaiveDate) -> Result<PipelineOutcome> {
        let week_start = week_start_of(week_of);
        let creator = &ctx.creator;
        let mut warnings = ctx.warnings.clone();

        // Volume
        let volume = VolumeResolver::new(self.config.volume.clone()).resolve(creator, ctx.trends.as_ref(), week_start)?;
        warnings.extend(volume.warnings);
        let volume = volume.value;

        // Allocation
        let allocation = match SendTypeAllocator::new(&ctx.catalog).allocate(creator, &volume, ctx.rankings.as_ref()) {
            Ok(resolved) => resolved,
            Err(e) if e.severity() == Severity::Blocking => return Err(e.into()),
            Err(e) => {
                warn!(creator = %creator.id, error = %e, "Allocation failed");
                let issue = Issue::new(Severity::Structural, "allocation", e.to_string());
                return Ok(PipelineOutcome::rejected(vec![issue], warnings));
            }
        };
        warnings.extend(allocation.warnings);

        // Diversity
        let (week, diversity) =
            DiversityEnforcer::new(&ctx.catalog, self.config.diversity.clone()).enforce(allocation.value);
        warnings.extend(diversity.warnings.iter().cloned());
        let mut structural: Vec<Issue> = diversity
            .violations
            .iter()
            .filter(|i| i.severity >= Severity::Structural)
            .cloned()
            .collect();

        // Timing
        let schedule = week.into_schedule(&creator.id, &ctx.catalog);
        let seed = strategy::rotation_seed(creator.seed(), week_start);
        let (schedule, timing) = TimingAssigner::new(&ctx.catalog, self.config.timing.clone()).assign(schedule, seed);
        warnings.extend(timing.warnings);
        structural.extend(timing.conflicts);

        // Pricing
        let rankings = ctx.rankings.clone().unwrap_or_default();
        let pricing_ctx = PricingContext::from_volume(creator.tier, &volume);
        let (schedule, pricing) =
            match PricingOptimizer::new(&ctx.catalog, self.config.pricing.clone()).price(schedule, &rankings, &pricing_ctx) {
                Ok(priced) => priced,
                Err(e) if e.severity() == Severity::Blocking => return Err(e.into()),
                Err(e) => {
                    warn!(creator = %creator.id, error = %e, "Pricing failed");
                    structural.push(Issue::new(Severity::Structural, "pricing", e.to_string()));
                    let mut outcome = PipelineOutcome::rejected(structural, warnings);
                    outcome.volume = Some(volume);
                    outcome.diversity = Some(diversity);
                    return Ok(outcome);
                }
            };

        // Validation
        let snapshot = Arc::new(ScheduleSnapshot {
            schedule: schedule.clone(),
            catalog: ctx.catalog.clone(),
            page_type: creator.page_type,
            rankings,
            flagged_segments: ctx.flagged_segments.clone(),
        });
        let mut verdict = ValidationConsensus::new(&self.config)
            .evaluate(snapshot)
            .await?
            .reject_structural(structural);
        verdict.warnings = warnings.clone();

        info!(
            creator = %creator.id,
            week_start = %week_start,
            items = schedule.items.len(),
            status = %verdict.status,
            score = verdict.score,
            projected_revenue = pricing.total_projected_revenue,
            warnings = warnings.len(),
            "Planning run complete"
        );

        let deployable = verdict.status != VerdictStatus::Rejected;
        Ok(PipelineOutcome {
            verdict,
            schedule: deployable.then_some(schedule),
            pricing: Some(pricing),
            volume: Some(volume),
            diversity: Some(diversity),
            warnings,
        })
    }
}

impl Default for SchedulePipeline {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}
