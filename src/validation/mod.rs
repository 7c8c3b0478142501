//! Consensus validation
//!
//! Two scorers with disjoint rubrics evaluate the finished schedule:
//!
//! - [`compliance`] - Hard rules: diversity, spacing, required fields, bounds
//! - [`strategic`] - Revenue soundness, authenticity, coherence, risk coverage
//!
//! Both run as parallel blocking tasks over one shared snapshot and are joined
//! by [`combine`], a small decision table.

pub mod compliance;
pub mod strategic;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::SendTypeCatalog;
use crate::config::{PlannerConfig, ScorerCutoffs, ValidationSettings};
use crate::error::{Error, Issue, Result, Severity};
use crate::models::{ContentRankings, PageType, RiskSegment, WeeklySchedule};

pub use compliance::ComplianceScorer;
pub use strategic::StrategicScorer;

/// Status emitted by a scorer and by the final verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Approved,
    NeedsReview,
    Rejected,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "APPROVED"),
            Self::NeedsReview => write!(f, "NEEDS_REVIEW"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// How the two scores were reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusKind {
    /// Both approved
    FullConsensus,
    /// Mixed, scores close enough to average
    Averaged,
    /// Mixed, moderate divergence; lower score reported
    Conservative,
    /// Mixed, divergence demands manual reconciliation
    RequiresReview,
    /// Both rejected
    BothRejected,
    /// A scorer fell below its hard floor
    HardRejection,
    /// An upstream constraint could not be satisfied
    StructuralRejection,
}

/// One scorer's result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerReport {
    pub scorer: String,
    pub score: f64,
    pub status: VerdictStatus,
    pub hard_rejected: bool,
    /// Points per rubric line (deductions for compliance, earned points for strategic)
    pub breakdown: BTreeMap<String, f64>,
    pub issues: Vec<Issue>,
}

impl ScorerReport {
    pub fn from_score(scorer: &str, score: f64, cutoffs: &ScorerCutoffs) -> Self {
        let score = score.clamp(0.0, 100.0);
        let (status, hard_rejected) = classify(cutoffs, score);
        Self {
            scorer: scorer.to_string(),
            score,
            status,
            hard_rejected,
            breakdown: BTreeMap::new(),
            issues: Vec::new(),
        }
    }
}

/// Status and hard-floor flag for a score
pub fn classify(cutoffs: &ScorerCutoffs, score: f64) -> (VerdictStatus, bool) {
    let status = if score >= cutoffs.approve_at {
        VerdictStatus::Approved
    } else if score >= cutoffs.review_at {
        VerdictStatus::NeedsReview
    } else {
        VerdictStatus::Rejected
    };
    (status, score < cutoffs.hard_floor)
}

/// Final decision on a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub score: f64,
    pub status: VerdictStatus,
    pub consensus: ConsensusKind,
    pub divergence: f64,
    pub manual_reconciliation: bool,
    pub compliance: ScorerReport,
    pub strategic: ScorerReport,
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
}

impl ValidationVerdict {
    /// Rejection for a run that failed before scoring
    pub fn unscored(issues: Vec<Issue>) -> Self {
        let report = |scorer: &str| ScorerReport {
            scorer: scorer.to_string(),
            score: 0.0,
            status: VerdictStatus::Rejected,
            hard_rejected: true,
            breakdown: BTreeMap::new(),
            issues: Vec::new(),
        };
        Self {
            score: 0.0,
            status: VerdictStatus::Rejected,
            consensus: ConsensusKind::StructuralRejection,
            divergence: 0.0,
            manual_reconciliation: false,
            compliance: report("compliance"),
            strategic: report("strategic"),
            issues,
            warnings: Vec::new(),
        }
    }

    pub fn is_deployable(&self) -> bool {
        self.status == VerdictStatus::Approved
    }

    /// Force rejection for constraints upstream stages could not satisfy
    pub fn reject_structural(mut self, issues: Vec<Issue>) -> Self {
        if issues.is_empty() {
            return self;
        }
        self.status = VerdictStatus::Rejected;
        self.consensus = ConsensusKind::StructuralRejection;
        self.score = self.score.min(self.compliance.score).min(self.strategic.score);
        let mut merged = issues;
        merged.append(&mut self.issues);
        self.issues = merged;
        self
    }

    /// Issues at or above `severity`
    pub fn issues_at_least(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity >= severity)
    }
}

/// Combine the two scorer reports
pub fn combine(compliance: ScorerReport, strategic: ScorerReport, settings: &ValidationSettings) -> ValidationVerdict {
    let (a, b) = (compliance.score, strategic.score);
    let divergence = (a - b).abs();
    let mean = (a + b) / 2.0;
    let low = a.min(b);

    let (status, consensus, score) = if compliance.hard_rejected || strategic.hard_rejected {
        (VerdictStatus::Rejected, ConsensusKind::HardRejection, low)
    } else {
        match (compliance.status, strategic.status) {
            (VerdictStatus::Approved, VerdictStatus::Approved) => {
                (VerdictStatus::Approved, ConsensusKind::FullConsensus, mean)
            }
            (VerdictStatus::Rejected, VerdictStatus::Rejected) => {
                (VerdictStatus::Rejected, ConsensusKind::BothRejected, low)
            }
            _ if divergence > settings.reconciliation_divergence => {
                (VerdictStatus::NeedsReview, ConsensusKind::RequiresReview, low)
            }
            _ if divergence <= settings.averaging_divergence => {
                (VerdictStatus::NeedsReview, ConsensusKind::Averaged, mean)
            }
            _ => (VerdictStatus::NeedsReview, ConsensusKind::Conservative, low),
        }
    };

    let mut issues = compliance.issues.clone();
    issues.extend(strategic.issues.iter().cloned());

    ValidationVerdict {
        score,
        status,
        consensus,
        divergence,
        manual_reconciliation: consensus == ConsensusKind::RequiresReview,
        compliance,
        strategic,
        issues,
        warnings: Vec::new(),
    }
}

/// Immutable view of a finished schedule and the context it was built from
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub schedule: WeeklySchedule,
    pub catalog: SendTypeCatalog,
    pub page_type: PageType,
    pub rankings: ContentRankings,
    pub flagged_segments: Vec<RiskSegment>,
}

/// A pure rubric over a snapshot
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, snapshot: &ScheduleSnapshot) -> ScorerReport;
}

/// Runs both scorers and combines their reports
pub struct ValidationConsensus {
    compliance: Arc<ComplianceScorer>,
    strategic: Arc<StrategicScorer>,
    settings: ValidationSettings,
}

impl ValidationConsensus {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            compliance: Arc::new(ComplianceScorer::new(
                config.validation.compliance,
                config.diversity.clone(),
                config.timing.clone(),
            )),
            strategic: Arc::new(StrategicScorer::new(
                config.validation.strategic,
                config.validation.regularity_cv_threshold,
            )),
            settings: config.validation.clone(),
        }
    }

    /// Score in parallel on the blocking pool and join
    pub async fn evaluate(&self, snapshot: Arc<ScheduleSnapshot>) -> Result<ValidationVerdict> {
        let compliance = {
            let scorer = Arc::clone(&self.compliance);
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || scorer.evaluate(&snapshot))
        };
        let strategic = {
            let scorer = Arc::clone(&self.strategic);
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || scorer.evaluate(&snapshot))
        };

        let (compliance, strategic) =
            tokio::try_join!(compliance, strategic).map_err(|e| Error::ScorerTask(e.to_string()))?;
        Ok(self.finish(compliance, strategic))
    }

    /// Score sequentially on the current thread
    pub fn evaluate_blocking(&self, snapshot: &ScheduleSnapshot) -> ValidationVerdict {
        let compliance = self.compliance.evaluate(snapshot);
        let strategic = self.strategic.evaluate(snapshot);
        self.finish(compliance, strategic)
    }

    fn finish(&self, compliance: ScorerReport, strategic: ScorerReport) -> ValidationVerdict {
        let verdict = combine(compliance, strategic, &self.settings);
        match verdict.status {
            VerdictStatus::Rejected => warn!(
                score = verdict.score,
                compliance = verdict.compliance.score,
                strategic = verdict.strategic.score,
                consensus = ?verdict.consensus,
                "Schedule rejected"
            ),
            _ => info!(
                score = verdict.score,
                status = %verdict.status,
                divergence = verdict.divergence,
                consensus = ?verdict.consensus,
                "Consensus reached"
            ),
        }
        verdict
    }
}
