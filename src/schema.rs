use crate::error::{PipelineError, Result};
use crate::utils::{month_label, month_window, next_month_of, parse_period_string, prev_month_of};
use chrono::{DateTime, Datelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type DepartmentId = Uuid;
pub type UserId = Uuid;

pub const MIN_REPORT_YEAR: i32 = 2020;
pub const MAX_REPORT_YEAR: i32 = 2100;

/// A reporting window: one calendar month.
///
/// Bounds (month 1-12, year 2020-2100) are enforced when a period is built
/// from caller input. Neighbours obtained through [`Period::previous`] and
/// [`Period::next`] may step one month past the year bounds; they are only
/// ever used as aggregation windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PeriodRepr", into = "PeriodRepr")]
pub struct Period {
    year: i32,
    month: u32,
}

#[derive(Serialize, Deserialize)]
struct PeriodRepr {
    month: u32,
    year: i32,
}

impl TryFrom<PeriodRepr> for Period {
    type Error = PipelineError;

    fn try_from(repr: PeriodRepr) -> Result<Self> {
        Period::new(repr.month, repr.year)
    }
}

impl From<Period> for PeriodRepr {
    fn from(period: Period) -> Self {
        PeriodRepr {
            month: period.month,
            year: period.year,
        }
    }
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(PipelineError::Validation(format!(
                "Invalid month {}: must be between 1 and 12",
                month
            )));
        }
        if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&year) {
            return Err(PipelineError::Validation(format!(
                "Invalid year {}: must be between {} and {}",
                year, MIN_REPORT_YEAR, MAX_REPORT_YEAR
            )));
        }
        Ok(Self { year, month })
    }

    /// Parses `YYYY-MM`.
    pub fn parse(s: &str) -> Result<Self> {
        let (year, month) = parse_period_string(s)?;
        Self::new(month, year)
    }

    /// The period an instant falls in.
    pub fn of(instant: DateTime<Utc>) -> Result<Self> {
        Self::new(instant.month(), instant.year())
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn previous(&self) -> Self {
        let (year, month) = prev_month_of(self.year, self.month);
        Self { year, month }
    }

    pub fn next(&self) -> Self {
        let (year, month) = next_month_of(self.year, self.month);
        Self { year, month }
    }

    pub(crate) fn from_parts_unchecked(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        month_window(self.year, self.month)
    }

    pub fn label(&self) -> String {
        format!("{} {}", month_label(self.month), self.year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DepartmentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub allocated_budget: f64,
    pub status: DepartmentStatus,
    /// Period this allocation is bound to. Unbound departments apply to every period.
    pub period: Option<Period>,
}

impl Department {
    pub fn new(name: impl Into<String>, allocated_budget: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            allocated_budget,
            status: DepartmentStatus::Active,
            period: None,
        }
    }

    #[must_use]
    pub fn for_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: DepartmentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == DepartmentStatus::Active
    }

    pub fn is_bound_to(&self, period: Period) -> bool {
        self.period == Some(period)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Department name must not be empty".to_string(),
            ));
        }
        if !self.allocated_budget.is_finite() || self.allocated_budget < 0.0 {
            return Err(PipelineError::Validation(format!(
                "Department '{}' has invalid allocated budget {}",
                self.name, self.allocated_budget
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ExpenseCategory {
    Travel,
    Supplies,
    Equipment,
    Software,
    Salaries,
    Marketing,
    Utilities,
    Training,
    Maintenance,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 10] = [
        ExpenseCategory::Travel,
        ExpenseCategory::Supplies,
        ExpenseCategory::Equipment,
        ExpenseCategory::Software,
        ExpenseCategory::Salaries,
        ExpenseCategory::Marketing,
        ExpenseCategory::Utilities,
        ExpenseCategory::Training,
        ExpenseCategory::Maintenance,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Travel => "Travel",
            ExpenseCategory::Supplies => "Supplies",
            ExpenseCategory::Equipment => "Equipment",
            ExpenseCategory::Software => "Software",
            ExpenseCategory::Salaries => "Salaries",
            ExpenseCategory::Marketing => "Marketing",
            ExpenseCategory::Utilities => "Utilities",
            ExpenseCategory::Training => "Training",
            ExpenseCategory::Maintenance => "Maintenance",
            ExpenseCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        ExpenseCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| PipelineError::Validation(format!("Unknown expense category: {}", s)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub department_id: DepartmentId,
    pub amount: f64,
    pub category: ExpenseCategory,
    pub date: DateTime<Utc>,
    pub created_by: Option<UserId>,
}

impl Expense {
    pub fn new(
        department_id: DepartmentId,
        amount: f64,
        category: ExpenseCategory,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            department_id,
            amount,
            category,
            date,
            created_by: None,
        }
    }

    #[must_use]
    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(PipelineError::Validation(format!(
                "Expense amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ReportType {
    Department,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum RiskLevel {
    #[serde(alias = "low", alias = "LOW")]
    #[schemars(description = "Spending comfortably within budget")]
    Low,

    #[serde(alias = "medium", alias = "MEDIUM")]
    #[schemars(description = "Spending approaching the allocation; worth monitoring")]
    Medium,

    #[serde(alias = "high", alias = "HIGH")]
    #[schemars(description = "Spending at or over the allocation; action needed")]
    High,
}

impl RiskLevel {
    /// Threshold rule used wherever the provider does not decide: above 90% is
    /// High, above 75% is Medium.
    pub fn from_percentage(percentage_used: f64) -> Self {
        if percentage_used > 90.0 {
            RiskLevel::High
        } else if percentage_used > 75.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

/// Natural key of a stored report. At most one report exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportKey {
    pub report_type: ReportType,
    pub department_id: Option<DepartmentId>,
    pub period: Period,
}

impl ReportKey {
    pub fn global(period: Period) -> Self {
        Self {
            report_type: ReportType::Global,
            department_id: None,
            period,
        }
    }

    pub fn department(department_id: DepartmentId, period: Period) -> Self {
        Self {
            report_type: ReportType::Department,
            department_id: Some(department_id),
            period,
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.department_id {
            Some(id) => write!(f, "{:?}[{}] {}", self.report_type, id, self.period),
            None => write!(f, "{:?} {}", self.report_type, self.period),
        }
    }
}

/// Persisted numeric snapshot. Percentages and deltas are rounded to 2 dp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub budget: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percentage: f64,
    pub previous_month_spent: f64,
    /// `spent - previous_month_spent`
    pub month_over_month_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentFigure {
    pub department_id: DepartmentId,
    pub name: String,
    pub allocated: f64,
    pub spent: f64,
    pub percentage: f64,
    pub status: DepartmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DepartmentRisk {
    #[schemars(description = "Department name exactly as given in the input")]
    pub department: String,

    pub risk_level: RiskLevel,

    #[schemars(description = "One sentence explaining the rating")]
    #[serde(default)]
    pub reason: String,
}

/// Extra findings carried only by Global reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlobalInsights {
    #[schemars(description = "Company-wide observations about the spending pattern")]
    #[serde(default)]
    pub insights: Vec<String>,

    #[schemars(description = "Risk rating for every department listed in the input")]
    #[serde(default)]
    pub department_risks: Vec<DepartmentRisk>,

    #[schemars(description = "Expected company-wide spend for the next month")]
    #[serde(default)]
    pub predicted_next_month_spend: f64,

    #[schemars(description = "Concrete ways to reduce or rebalance spending")]
    #[serde(default)]
    pub optimization_tips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub report_type: ReportType,
    pub department_id: Option<DepartmentId>,
    pub period: Period,
    pub summary: String,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub data: ReportData,
    /// Per-department figures; Global reports only.
    #[serde(default)]
    pub departments: Vec<DepartmentFigure>,
    /// Category totals; Department reports only.
    #[serde(default)]
    pub category_breakdown: Vec<CategoryTotal>,
    pub insights: Option<GlobalInsights>,
    /// False when the narrative came from the deterministic fallback.
    pub ai_generated: bool,
    pub generated_by: Option<UserId>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn key(&self) -> ReportKey {
        ReportKey {
            report_type: self.report_type,
            department_id: self.department_id,
            period: self.period,
        }
    }

    /// Checks the type/department pairing: Department reports must name a
    /// department, Global reports must not.
    pub fn validate(&self) -> Result<()> {
        match (self.report_type, self.department_id) {
            (ReportType::Department, None) => Err(PipelineError::Validation(
                "Department report requires a department reference".to_string(),
            )),
            (ReportType::Global, Some(_)) => Err(PipelineError::Validation(
                "Global report must not reference a department".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
