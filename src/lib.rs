//! sendplan - Weekly send-schedule planner
//!
//! Builds a week of timed sends for a creator page, balancing revenue,
//! engagement and retention under diversity, spacing and pricing constraints,
//! then validates the result with two independent scorers.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Planner settings (TOML file, environment overrides)
//! - [`models`] - Core data structures and types
//! - [`catalog`] - Send type definitions and the built-in catalog
//! - [`volume`] - Daily send counts from tier and trend history
//! - [`allocation`] - Strategy rotation, content flavor and send type allocation
//! - [`diversity`] - Diversity scoring and greedy repair
//! - [`timing`] - Clock times, followup offsets and expiries
//! - [`pricing`] - Price optimization and revenue projection
//! - [`validation`] - Compliance and strategic scorers joined by consensus
//! - [`pipeline`] - Context loading and stage orchestration
//! - [`utils`] - Retry helpers
//!
//! # Example
//!
//! ```no_run
//! use sendplan::models::{Creator, PageType};
//! use sendplan::pipeline::{SchedulePipeline, StaticContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let context = StaticContext::new(Creator::new("creator-1", 3, PageType::Paid));
//!     let week = chrono::NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
//!     let outcome = SchedulePipeline::default().run(&context, "creator-1", week).await?;
//!     println!("{}", outcome.verdict.status);
//!     Ok(())
//! }
//! ```

pub mod allocation;
pub mod catalog;
pub mod config;
pub mod diversity;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod timing;
pub mod utils;
pub mod validation;
pub mod volume;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{SendType, SendTypeCatalog};
    pub use crate::config::PlannerConfig;
    pub use crate::error::{Error, Issue, Result, SendplanErrorTrait, Severity};
    pub use crate::models::{Category, ContentRankings, ContentTier, Creator, PageType, WeeklySchedule};
    pub use crate::pipeline::{ContextProvider, PipelineOutcome, SchedulePipeline, StaticContext};
    pub use crate::validation::{ValidationVerdict, VerdictStatus};
}

// Direct re-exports for convenience
pub use models::{Creator, WeeklySchedule};
pub use volume::Resolved;
