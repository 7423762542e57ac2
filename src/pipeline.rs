use crate::config::PipelineConfig;
use crate::engine::{AggregationEngine, DepartmentBreakdown, TrendPoint};
use crate::error::{PipelineError, Result};
use crate::llm::{BudgetAnalyst, DepartmentSnapshot, GlobalSnapshot, TextCompletion};
use crate::scheduler::PeriodJob;
use crate::schema::{
    CategoryTotal, Department, DepartmentFigure, DepartmentId, Period, Report, ReportData,
    ReportKey, ReportType, UserId,
};
use crate::store::{BudgetStore, DepartmentFilter, ExpenseFilter};
use crate::utils::{percentage_used, round2, Clock, SystemClock};
use crate::writer::{ReportWriter, WritePolicy};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedDashboard {
    pub period: Period,
    pub total_budget: f64,
    pub total_spent: f64,
    pub remaining: f64,
    pub percentage_used: f64,
    pub departments: Vec<DepartmentBreakdown>,
    pub trend: Vec<TrendPoint>,
    /// Latest Global report for the period, if a run has ever succeeded.
    pub report: Option<Report>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentDashboard {
    pub department: Department,
    pub period: Period,
    pub spent: f64,
    pub remaining: f64,
    pub percentage_used: f64,
    pub expense_count: usize,
    pub categories: Vec<CategoryTotal>,
    pub trend: Vec<TrendPoint>,
    pub report: Option<Report>,
}

/// Aggregation, analysis and persistence wired together.
///
/// Scheduled recomputation ([`ReportPipeline::recompute_global`]) absorbs
/// provider failures and stores the fallback analysis. On-demand department
/// generation surfaces them instead and writes nothing.
pub struct ReportPipeline {
    store: Arc<dyn BudgetStore>,
    engine: AggregationEngine,
    analyst: BudgetAnalyst,
    writer: ReportWriter,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl ReportPipeline {
    pub fn new(
        store: Arc<dyn BudgetStore>,
        provider: Arc<dyn TextCompletion>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_clock(store, provider, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn BudgetStore>,
        provider: Arc<dyn TextCompletion>,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: AggregationEngine::new(store.clone(), clock.clone(), config.max_concurrency),
            analyst: BudgetAnalyst::new(provider),
            writer: ReportWriter::new(store.clone()),
            store,
            clock,
            config,
        }
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Company-wide figures over Active departments. Per-department spending
    /// is computed concurrently; one failing department fails the snapshot.
    /// Prior-period spend covers the same departments as current spend.
    pub async fn global_snapshot(&self, period: Period) -> Result<GlobalSnapshot> {
        let active = self
            .store
            .find_departments(&DepartmentFilter::active())
            .await?;
        debug!("Aggregating {} active department(s) for {}", active.len(), period);

        let (departments, previous) = futures::try_join!(
            self.engine.breakdown_for(active.clone(), period),
            self.engine.breakdown_for(active, period.previous()),
        )?;

        let previous_month_spent: f64 = previous.iter().map(|d| d.spent).sum();

        let total_budget: f64 = departments.iter().map(|d| d.allocated).sum();
        let total_spent: f64 = departments.iter().map(|d| d.spent).sum();

        Ok(GlobalSnapshot {
            period,
            total_budget,
            total_spent,
            percentage_used: percentage_used(total_spent, total_budget),
            previous_month_spent,
            departments,
        })
    }

    /// Rebuilds and upserts the Global report for `period`. Provider failures
    /// are absorbed into the fallback analysis; store and aggregation failures
    /// abort the run and leave any previously stored report in place.
    pub async fn recompute_global(&self, period: Period) -> Result<Report> {
        let snapshot = self.global_snapshot(period).await?;
        let outcome = self.analyst.analyze_global(&snapshot).await?;

        let departments = snapshot
            .departments
            .iter()
            .map(|d| DepartmentFigure {
                department_id: d.department_id,
                name: d.name.clone(),
                allocated: d.allocated,
                spent: d.spent,
                percentage: round2(d.percentage_used),
                status: d.status,
            })
            .collect();

        let analysis = outcome.analysis;
        let report = Report {
            id: Uuid::new_v4(),
            report_type: ReportType::Global,
            department_id: None,
            period,
            summary: analysis.summary,
            risk_level: analysis.risk_level,
            recommendations: analysis.recommendations,
            data: report_data(
                snapshot.total_budget,
                snapshot.total_spent,
                snapshot.previous_month_spent,
            ),
            departments,
            category_breakdown: Vec::new(),
            insights: Some(analysis.insights),
            ai_generated: outcome.ai_generated,
            generated_by: None,
            generated_at: self.clock.now(),
        };

        self.writer.write(report, WritePolicy::Replace).await
    }

    /// Admin-triggered report for one department. Fails with `Conflict` when a
    /// report already exists for the key, and with `Upstream` when the
    /// provider could not produce an analysis; nothing is written in either case.
    pub async fn generate_department_report(
        &self,
        department_id: DepartmentId,
        period: Period,
        generated_by: Option<UserId>,
    ) -> Result<Report> {
        let department = self.require_department(department_id).await?;
        let key = ReportKey::department(department_id, period);

        if self.store.find_report(&key).await?.is_some() {
            return Err(PipelineError::Conflict(format!(
                "Report already exists for {}; delete it before regenerating",
                key
            )));
        }

        let (spent, previous_month_spent, category_breakdown) = futures::try_join!(
            self.engine.department_spending(department_id, Some(period)),
            self.engine
                .department_spending(department_id, Some(period.previous())),
            self.engine.expense_breakdown(department_id, period),
        )?;

        let allocated = department.allocated_budget;
        let snapshot = DepartmentSnapshot {
            department_name: department.name.clone(),
            period,
            allocated,
            spent,
            remaining: allocated - spent,
            percentage_used: percentage_used(spent, allocated),
            previous_month_spent,
            category_breakdown,
        };

        let outcome = self.analyst.analyze_department(&snapshot).await?;
        if !outcome.ai_generated {
            return Err(PipelineError::Upstream(format!(
                "Report generation failed for {}: {}",
                department.name,
                outcome.failure.unwrap_or_else(|| "analysis unavailable".to_string())
            )));
        }

        let analysis = outcome.analysis;
        let report = Report {
            id: Uuid::new_v4(),
            report_type: ReportType::Department,
            department_id: Some(department_id),
            period,
            summary: analysis.summary,
            risk_level: analysis.risk_level,
            recommendations: analysis.recommendations,
            data: report_data(allocated, spent, previous_month_spent),
            departments: Vec::new(),
            category_breakdown: snapshot.category_breakdown,
            insights: None,
            ai_generated: true,
            generated_by,
            generated_at: self.clock.now(),
        };

        info!("Generated department report for '{}' {}", department.name, period);
        self.writer.write(report, WritePolicy::RejectIfExists).await
    }

    /// Removes a department report so it can be regenerated.
    pub async fn delete_department_report(
        &self,
        department_id: DepartmentId,
        period: Period,
    ) -> Result<()> {
        let key = ReportKey::department(department_id, period);
        if self.store.delete_report(&key).await? {
            info!("Deleted report {}", key);
            Ok(())
        } else {
            Err(PipelineError::NotFound(format!("Report {}", key)))
        }
    }

    pub async fn aggregated_dashboard(&self, period: Period) -> Result<AggregatedDashboard> {
        let key = ReportKey::global(period);
        let (total_budget, total_spent, departments, trend, report) = futures::try_join!(
            self.engine.total_budget(period),
            self.engine.total_spent(period),
            self.engine.department_breakdown(period),
            self.engine
                .monthly_trend(None, period.year(), self.config.trend_months),
            self.store.find_report(&key),
        )?;

        Ok(AggregatedDashboard {
            period,
            total_budget,
            total_spent,
            remaining: total_budget - total_spent,
            percentage_used: percentage_used(total_spent, total_budget),
            departments,
            trend,
            report,
        })
    }

    pub async fn department_dashboard(
        &self,
        department_id: DepartmentId,
        period: Period,
    ) -> Result<DepartmentDashboard> {
        let department = self.require_department(department_id).await?;
        let count_filter = ExpenseFilter::all()
            .department(department_id)
            .in_period(period)?;
        let key = ReportKey::department(department_id, period);

        let (spent, expense_count, categories, trend, report) = futures::try_join!(
            self.engine.department_spending(department_id, Some(period)),
            self.store.count_expenses(&count_filter),
            self.engine.expense_breakdown(department_id, period),
            self.engine
                .monthly_trend(Some(department_id), period.year(), self.config.trend_months),
            self.store.find_report(&key),
        )?;

        let allocated = department.allocated_budget;
        Ok(DepartmentDashboard {
            department,
            period,
            spent,
            remaining: allocated - spent,
            percentage_used: percentage_used(spent, allocated),
            expense_count,
            categories,
            trend,
            report,
        })
    }

    async fn require_department(&self, department_id: DepartmentId) -> Result<Department> {
        self.store
            .find_department(department_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Department {}", department_id)))
    }
}

#[async_trait]
impl PeriodJob for ReportPipeline {
    async fn run(&self, period: Period) -> Result<()> {
        self.recompute_global(period).await.map(|_| ())
    }
}

fn report_data(budget: f64, spent: f64, previous_month_spent: f64) -> ReportData {
    ReportData {
        budget,
        spent,
        remaining: budget - spent,
        percentage: round2(percentage_used(spent, budget)),
        previous_month_spent,
        month_over_month_change: round2(spent - previous_month_spent),
    }
}
