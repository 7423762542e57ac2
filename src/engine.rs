use crate::error::{PipelineError, Result};
use crate::schema::{
    CategoryTotal, Department, DepartmentId, DepartmentStatus, ExpenseCategory, Period,
};
use crate::store::{BudgetStore, DepartmentFilter, ExpenseFilter};
use crate::utils::{month_label, months_back, percentage_used, Clock};
use chrono::Datelike;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One department's position within a period. Values keep full precision;
/// rounding happens only when a report is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentBreakdown {
    pub department_id: DepartmentId,
    pub name: String,
    pub status: DepartmentStatus,
    pub allocated: f64,
    pub spent: f64,
    /// Negative when the department has overspent.
    pub remaining: f64,
    pub percentage_used: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub month: u32,
    pub year: i32,
    pub label: String,
    pub spent: f64,
}

/// Read-only aggregations over departments and expenses. Every method only
/// reads from the store, so calls may run concurrently with each other.
#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn BudgetStore>,
    clock: Arc<dyn Clock>,
    max_concurrency: usize,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn BudgetStore>, clock: Arc<dyn Clock>, max_concurrency: usize) -> Self {
        Self {
            store,
            clock,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Departments bound to `period`, or every department when none is.
    pub async fn departments_for_period(&self, period: Period) -> Result<Vec<Department>> {
        let all = self.store.find_departments(&DepartmentFilter::all()).await?;
        let bound: Vec<Department> = all
            .iter()
            .filter(|d| d.is_bound_to(period))
            .cloned()
            .collect();

        if bound.is_empty() {
            debug!(
                "No departments bound to {}; using all {} departments",
                period,
                all.len()
            );
            Ok(all)
        } else {
            Ok(bound)
        }
    }

    pub async fn total_budget(&self, period: Period) -> Result<f64> {
        Ok(self
            .departments_for_period(period)
            .await?
            .iter()
            .map(|d| d.allocated_budget)
            .sum())
    }

    pub async fn total_spent(&self, period: Period) -> Result<f64> {
        let filter = ExpenseFilter::all().in_period(period)?;
        Ok(sum_amounts(&self.store.find_expenses(&filter).await?))
    }

    /// Spending for one department in `period`, or over its whole history
    /// when no period is given.
    pub async fn department_spending(
        &self,
        department_id: DepartmentId,
        period: Option<Period>,
    ) -> Result<f64> {
        let filter = ExpenseFilter::all().department(department_id);
        let filter = match period {
            Some(period) => filter.in_period(period)?,
            None => filter,
        };
        Ok(sum_amounts(&self.store.find_expenses(&filter).await?))
    }

    /// Category totals for one department, largest first.
    pub async fn expense_breakdown(
        &self,
        department_id: DepartmentId,
        period: Period,
    ) -> Result<Vec<CategoryTotal>> {
        let filter = ExpenseFilter::all()
            .department(department_id)
            .in_period(period)?;
        let expenses = self.store.find_expenses(&filter).await?;

        let mut grouped: BTreeMap<ExpenseCategory, (f64, usize)> = BTreeMap::new();
        for expense in &expenses {
            let entry = grouped.entry(expense.category).or_insert((0.0, 0));
            entry.0 += expense.amount;
            entry.1 += 1;
        }

        let mut totals: Vec<CategoryTotal> = grouped
            .into_iter()
            .map(|(category, (total, count))| CategoryTotal {
                category,
                total,
                count,
            })
            .collect();

        totals.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(Ordering::Equal)
                .then(a.category.cmp(&b.category))
        });

        Ok(totals)
    }

    /// Per-department figures for the departments applicable to `period`.
    pub async fn department_breakdown(&self, period: Period) -> Result<Vec<DepartmentBreakdown>> {
        let departments = self.departments_for_period(period).await?;
        self.breakdown_for(departments, period).await
    }

    /// Computes spending for each department concurrently, bounded by
    /// `max_concurrency`. Any single failure fails the whole call; a
    /// department is never silently dropped. Output keeps input order.
    pub async fn breakdown_for(
        &self,
        departments: Vec<Department>,
        period: Period,
    ) -> Result<Vec<DepartmentBreakdown>> {
        stream::iter(departments)
            .map(|department| async move {
                let spent = self
                    .department_spending(department.id, Some(period))
                    .await?;
                let allocated = department.allocated_budget;
                Ok::<_, PipelineError>(DepartmentBreakdown {
                    department_id: department.id,
                    name: department.name,
                    status: department.status,
                    allocated,
                    spent,
                    remaining: allocated - spent,
                    percentage_used: percentage_used(spent, allocated),
                })
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    /// `number_of_months` entries ending at the current calendar month, oldest
    /// first. The month comes from the clock; `year` anchors the walk and is
    /// decremented each time the walk crosses January.
    pub async fn monthly_trend(
        &self,
        department_id: Option<DepartmentId>,
        year: i32,
        number_of_months: usize,
    ) -> Result<Vec<TrendPoint>> {
        let current_month = self.clock.today().month();

        let periods: Vec<Period> = (0..number_of_months as u32)
            .rev()
            .map(|offset| {
                let (y, m) = months_back(year, current_month, offset);
                Period::from_parts_unchecked(y, m)
            })
            .collect();

        let spent = futures::future::try_join_all(periods.iter().map(|period| async move {
            match department_id {
                Some(id) => self.department_spending(id, Some(*period)).await,
                None => self.total_spent(*period).await,
            }
        }))
        .await?;

        Ok(periods
            .into_iter()
            .zip(spent)
            .map(|(period, spent)| TrendPoint {
                month: period.month(),
                year: period.year(),
                label: month_label(period.month()).to_string(),
                spent,
            })
            .collect())
    }
}

fn sum_amounts(expenses: &[crate::schema::Expense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}
