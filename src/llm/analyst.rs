use crate::error::{PipelineError, Result};
use crate::llm::prompts::{department_prompt, global_prompt};
use crate::llm::types::*;
use crate::llm::utils::parse_structured;
use crate::schema::{DepartmentRisk, GlobalInsights, RiskLevel};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;

const FALLBACK_RECOMMENDATIONS: [&str; 3] = [
    "Review the largest expense categories for savings opportunities.",
    "Check remaining budget before approving new discretionary purchases.",
    "Revisit allocations at the next budget review if the trend continues.",
];

const FALLBACK_OPTIMIZATION_TIPS: [&str; 2] = [
    "Consolidate recurring vendor contracts across departments.",
    "Defer non-essential spending in departments above 90% utilisation.",
];

/// Turns aggregation snapshots into narrative analyses.
///
/// Provider failures never escape: a call or parse failure yields the
/// deterministic fallback with `ai_generated == false`. Only malformed input
/// (negative or non-finite figures) is returned as an error.
#[derive(Clone)]
pub struct BudgetAnalyst {
    provider: Arc<dyn TextCompletion>,
}

impl BudgetAnalyst {
    pub fn new(provider: Arc<dyn TextCompletion>) -> Self {
        Self { provider }
    }

    pub async fn analyze_department(
        &self,
        snapshot: &DepartmentSnapshot,
    ) -> Result<AnalysisOutcome<DepartmentAnalysis>> {
        check_figure("allocated budget", snapshot.allocated)?;
        check_figure("spent", snapshot.spent)?;
        check_figure("previous month spent", snapshot.previous_month_spent)?;

        let prompt = department_prompt(snapshot)?;
        match self.request::<DepartmentAnalysis>(&prompt).await {
            Ok(analysis) => Ok(AnalysisOutcome::provided(analysis)),
            Err(e) => {
                warn!(
                    "Analysis for department '{}' ({}) fell back to defaults: {}",
                    snapshot.department_name, snapshot.period, e
                );
                Ok(AnalysisOutcome::fallback(
                    fallback_department(snapshot),
                    e.to_string(),
                ))
            }
        }
    }

    pub async fn analyze_global(
        &self,
        snapshot: &GlobalSnapshot,
    ) -> Result<AnalysisOutcome<GlobalAnalysis>> {
        check_figure("total budget", snapshot.total_budget)?;
        check_figure("total spent", snapshot.total_spent)?;
        check_figure("previous month spent", snapshot.previous_month_spent)?;
        for department in &snapshot.departments {
            check_figure(&format!("{} allocated budget", department.name), department.allocated)?;
            check_figure(&format!("{} spent", department.name), department.spent)?;
        }

        let prompt = global_prompt(snapshot)?;
        match self.request::<GlobalAnalysis>(&prompt).await {
            Ok(analysis) => Ok(AnalysisOutcome::provided(analysis)),
            Err(e) => {
                warn!(
                    "Global analysis for {} fell back to defaults: {}",
                    snapshot.period, e
                );
                Ok(AnalysisOutcome::fallback(fallback_global(snapshot), e.to_string()))
            }
        }
    }

    async fn request<T: DeserializeOwned>(&self, prompt: &str) -> Result<T> {
        let raw = self.provider.complete(prompt).await?;
        debug!("Provider returned {} bytes", raw.len());
        parse_structured(&raw)
    }
}

fn check_figure(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PipelineError::InvalidInput(format!(
            "{} must be a non-negative number, got {}",
            label, value
        )));
    }
    Ok(())
}

fn fallback_recommendations() -> Vec<String> {
    FALLBACK_RECOMMENDATIONS.iter().map(|s| s.to_string()).collect()
}

pub fn fallback_department(snapshot: &DepartmentSnapshot) -> DepartmentAnalysis {
    DepartmentAnalysis {
        summary: format!(
            "{} has used {:.2}% of its {} budget, spending {:.2} of {:.2} allocated ({:.2} remaining).",
            snapshot.department_name,
            snapshot.percentage_used,
            snapshot.period.label(),
            snapshot.spent,
            snapshot.allocated,
            snapshot.remaining
        ),
        risk_level: RiskLevel::from_percentage(snapshot.percentage_used),
        recommendations: fallback_recommendations(),
    }
}

pub fn fallback_global(snapshot: &GlobalSnapshot) -> GlobalAnalysis {
    let department_risks: Vec<DepartmentRisk> = snapshot
        .departments
        .iter()
        .map(|d| DepartmentRisk {
            department: d.name.clone(),
            risk_level: RiskLevel::from_percentage(d.percentage_used),
            reason: format!("{:.2}% of allocation used", d.percentage_used),
        })
        .collect();

    let stretched = department_risks
        .iter()
        .filter(|r| r.risk_level != RiskLevel::Low)
        .count();

    GlobalAnalysis {
        summary: format!(
            "The company has used {:.2}% of its {} budget, spending {:.2} of {:.2} across {} department(s).",
            snapshot.percentage_used,
            snapshot.period.label(),
            snapshot.total_spent,
            snapshot.total_budget,
            snapshot.departments.len()
        ),
        risk_level: RiskLevel::from_percentage(snapshot.percentage_used),
        recommendations: fallback_recommendations(),
        insights: GlobalInsights {
            insights: vec![format!(
                "{} of {} department(s) are above 75% utilisation.",
                stretched,
                snapshot.departments.len()
            )],
            department_risks,
            predicted_next_month_spend: snapshot.total_spent,
            optimization_tips: FALLBACK_OPTIMIZATION_TIPS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
    }
}
