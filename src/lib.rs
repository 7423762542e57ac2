//! # Budget Report Pipeline
//!
//! Report scheduling and financial aggregation for a departmental
//! budget-tracking backend.
//!
//! ## Core Concepts
//!
//! - **Period**: a (month, year) reporting window
//! - **Aggregation Engine**: read-only spending, breakdown and trend computations
//! - **Budget Analyst**: turns aggregated figures into a narrative via a text-generation
//!   provider, with a deterministic fallback when the provider fails
//! - **Report Scheduler**: coalesces bursts of mutations into one global recomputation
//!   per period after a quiet interval
//! - **Report Writer**: idempotent, keyed persistence with replace or reject-if-exists policies
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_report_pipeline::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let provider: Arc<dyn TextCompletion> = Arc::new(GeminiClient::new(GeminiConfig::from_env()?));
//! let config = PipelineConfig::from_env()?;
//!
//! let pipeline = Arc::new(ReportPipeline::new(store.clone(), provider, config.clone()));
//! let scheduler = ReportScheduler::new(pipeline.clone(), &config);
//!
//! // After every expense/budget mutation:
//! scheduler.schedule(Period::new(3, 2024)?);
//!
//! // Dashboards read the latest stored report alongside live aggregates.
//! let dashboard = pipeline.aggregated_dashboard(Period::new(3, 2024)?).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod utils;
pub mod writer;

pub use config::PipelineConfig;
pub use engine::{AggregationEngine, DepartmentBreakdown, TrendPoint};
pub use error::{PipelineError, Result};
pub use llm::*;
pub use pipeline::{AggregatedDashboard, DepartmentDashboard, ReportPipeline};
pub use scheduler::{PeriodJob, ReportScheduler};
pub use schema::*;
pub use store::{BudgetStore, DepartmentFilter, ExpenseFilter, MemoryStore};
pub use utils::{Clock, FixedClock, SystemClock};
pub use writer::{ReportWriter, WritePolicy};
