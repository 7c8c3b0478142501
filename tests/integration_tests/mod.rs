//! Integration tests module
//!
//! End-to-end tests for the sendplan pipeline, including:
//! - Complete volume → allocation → diversity → timing → pricing → validation runs
//! - Reference scenarios
//! - Error handling for missing or invalid context

pub mod error_scenarios;
pub mod pipeline_test;
pub mod scenario_test;
