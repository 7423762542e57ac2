use crate::engine::DepartmentBreakdown;
use crate::error::Result;
use crate::schema::{CategoryTotal, GlobalInsights, Period, RiskLevel};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A black-box text-generation service: prompt in, free-form text out.
///
/// Implementations return `PipelineError::Upstream` for transport failures,
/// rate limiting or rejected credentials.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Numeric facts about one department for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentSnapshot {
    pub department_name: String,
    pub period: Period,
    pub allocated: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percentage_used: f64,
    pub previous_month_spent: f64,
    pub category_breakdown: Vec<CategoryTotal>,
}

/// Company-wide facts for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub period: Period,
    pub total_budget: f64,
    pub total_spent: f64,
    pub percentage_used: f64,
    pub previous_month_spent: f64,
    pub departments: Vec<DepartmentBreakdown>,
}

impl GlobalSnapshot {
    pub fn remaining(&self) -> f64 {
        self.total_budget - self.total_spent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DepartmentAnalysis {
    #[schemars(description = "Two or three sentences on how the department is tracking against its budget")]
    pub summary: String,

    #[serde(rename = "riskLevel", alias = "risk_level")]
    pub risk_level: RiskLevel,

    #[schemars(description = "Short, actionable recommendations")]
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalAnalysis {
    #[schemars(description = "Two or three sentences on company-wide budget utilisation")]
    pub summary: String,

    #[serde(rename = "riskLevel", alias = "risk_level")]
    pub risk_level: RiskLevel,

    #[schemars(description = "Short, actionable recommendations")]
    #[serde(default)]
    pub recommendations: Vec<String>,

    #[serde(flatten)]
    pub insights: GlobalInsights,
}

/// Result of an analysis request. `ai_generated` is false when the
/// deterministic fallback stood in for the provider; `failure` then says why.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome<T> {
    pub analysis: T,
    pub ai_generated: bool,
    pub failure: Option<String>,
}

impl<T> AnalysisOutcome<T> {
    pub fn provided(analysis: T) -> Self {
        Self {
            analysis,
            ai_generated: true,
            failure: None,
        }
    }

    pub fn fallback(analysis: T, reason: impl Into<String>) -> Self {
        Self {
            analysis,
            ai_generated: false,
            failure: Some(reason.into()),
        }
    }
}
