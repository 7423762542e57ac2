//! Data-store seam for departments, expenses and reports.
//!
//! Any persistence backend can sit behind [`BudgetStore`]; [`MemoryStore`]
//! is the process-local implementation used by tests and embedded setups.

use crate::error::{PipelineError, Result};
use crate::schema::{
    Department, DepartmentId, DepartmentStatus, Expense, Period, Report, ReportKey,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepartmentFilter {
    pub id: Option<DepartmentId>,
    pub status: Option<DepartmentStatus>,
}

impl DepartmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            status: Some(DepartmentStatus::Active),
            ..Self::default()
        }
    }

    pub fn by_id(id: DepartmentId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn matches(&self, department: &Department) -> bool {
        self.id.map_or(true, |id| department.id == id)
            && self.status.map_or(true, |s| department.status == s)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseFilter {
    pub department_id: Option<DepartmentId>,
    /// Inclusive on both ends.
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl ExpenseFilter {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn department(mut self, id: DepartmentId) -> Self {
        self.department_id = Some(id);
        self
    }

    #[must_use]
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = Some((start, end));
        self
    }

    /// Restricts to the calendar-month window of `period`.
    pub fn in_period(self, period: Period) -> Result<Self> {
        let (start, end) = period.window()?;
        Ok(self.between(start, end))
    }

    pub fn matches(&self, expense: &Expense) -> bool {
        self.department_id
            .map_or(true, |id| expense.department_id == id)
            && self
                .date_range
                .map_or(true, |(start, end)| expense.date >= start && expense.date <= end)
    }
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn find_departments(&self, filter: &DepartmentFilter) -> Result<Vec<Department>>;

    async fn find_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>>;

    async fn count_expenses(&self, filter: &ExpenseFilter) -> Result<usize>;

    async fn find_report(&self, key: &ReportKey) -> Result<Option<Report>>;

    /// Inserts or fully replaces the report stored under `report.key()`.
    async fn upsert_report(&self, report: Report) -> Result<()>;

    /// Inserts only when the key is free. Returns `false` and leaves the
    /// existing report untouched otherwise.
    async fn insert_report(&self, report: Report) -> Result<bool>;

    /// Returns whether a report was removed.
    async fn delete_report(&self, key: &ReportKey) -> Result<bool>;

    async fn find_department(&self, id: DepartmentId) -> Result<Option<Department>> {
        Ok(self
            .find_departments(&DepartmentFilter::by_id(id))
            .await?
            .into_iter()
            .next())
    }
}

#[derive(Default)]
struct MemoryTables {
    departments: Vec<Department>,
    expenses: Vec<Expense>,
    reports: HashMap<ReportKey, Report>,
}

/// Lock-guarded in-memory tables. Report writes are single map operations
/// under the write lock, so readers never see a half-written report.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
    report_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryTables>> {
        self.tables
            .read()
            .map_err(|_| PipelineError::Store("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryTables>> {
        self.tables
            .write()
            .map_err(|_| PipelineError::Store("memory store lock poisoned".to_string()))
    }

    pub fn add_department(&self, department: Department) -> Result<DepartmentId> {
        department.validate()?;
        let id = department.id;
        let mut tables = self.write()?;
        tables.departments.retain(|d| d.id != id);
        tables.departments.push(department);
        Ok(id)
    }

    pub fn set_department_status(&self, id: DepartmentId, status: DepartmentStatus) -> Result<()> {
        let mut tables = self.write()?;
        let department = tables
            .departments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| PipelineError::NotFound(format!("Department {}", id)))?;
        department.status = status;
        Ok(())
    }

    /// Rejects expenses that reference an unknown department.
    pub fn add_expense(&self, expense: Expense) -> Result<uuid::Uuid> {
        expense.validate()?;
        let mut tables = self.write()?;
        if !tables.departments.iter().any(|d| d.id == expense.department_id) {
            return Err(PipelineError::NotFound(format!(
                "Department {}",
                expense.department_id
            )));
        }
        let id = expense.id;
        tables.expenses.push(expense);
        Ok(id)
    }

    /// Number of successful report inserts/replacements since creation.
    pub fn report_writes(&self) -> usize {
        self.report_writes.load(Ordering::SeqCst)
    }

    pub fn report_count(&self) -> usize {
        self.read().map(|t| t.reports.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn find_departments(&self, filter: &DepartmentFilter) -> Result<Vec<Department>> {
        Ok(self
            .read()?
            .departments
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn find_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        Ok(self
            .read()?
            .expenses
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn count_expenses(&self, filter: &ExpenseFilter) -> Result<usize> {
        Ok(self
            .read()?
            .expenses
            .iter()
            .filter(|e| filter.matches(e))
            .count())
    }

    async fn find_report(&self, key: &ReportKey) -> Result<Option<Report>> {
        Ok(self.read()?.reports.get(key).cloned())
    }

    async fn upsert_report(&self, report: Report) -> Result<()> {
        report.validate()?;
        let key = report.key();
        let replaced = self.write()?.reports.insert(key, report).is_some();
        self.report_writes.fetch_add(1, Ordering::SeqCst);
        debug!("Upserted report {} (replaced: {})", key, replaced);
        Ok(())
    }

    async fn insert_report(&self, report: Report) -> Result<bool> {
        report.validate()?;
        let key = report.key();
        let mut tables = self.write()?;
        if tables.reports.contains_key(&key) {
            return Ok(false);
        }
        tables.reports.insert(key, report);
        self.report_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete_report(&self, key: &ReportKey) -> Result<bool> {
        Ok(self.write()?.reports.remove(key).is_some())
    }
}
