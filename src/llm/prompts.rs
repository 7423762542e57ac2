// Prompt builders for budget analysis requests

use crate::error::Result;
use crate::llm::types::{DepartmentAnalysis, DepartmentSnapshot, GlobalAnalysis, GlobalSnapshot};
use schemars::schema_for;

const OUTPUT_RULES: &str = r#"
## OUTPUT FORMAT
Return ONLY a single JSON object matching the schema below.
- No markdown, no commentary before or after the object.
- `riskLevel` must be exactly one of "Low", "Medium" or "High".
- Monetary values are plain numbers without currency symbols.
"#;

fn schema_block<T: schemars::JsonSchema>() -> Result<String> {
    Ok(serde_json::to_string_pretty(&schema_for!(T))?)
}

pub fn department_prompt(snapshot: &DepartmentSnapshot) -> Result<String> {
    let categories = if snapshot.category_breakdown.is_empty() {
        "  (no expenses recorded)\n".to_string()
    } else {
        snapshot
            .category_breakdown
            .iter()
            .map(|c| format!("  - {}: {:.2} across {} expense(s)\n", c.category, c.total, c.count))
            .collect()
    };

    Ok(format!(
        r#"You are a corporate financial analyst reviewing one department's budget.

## DEPARTMENT
Name: {name}
Period: {period}

## FIGURES
Allocated budget: {allocated:.2}
Spent this period: {spent:.2}
Remaining: {remaining:.2}
Budget used: {pct:.2}%
Spent in the previous month: {prev:.2}

## SPENDING BY CATEGORY
{categories}
## YOUR TASK
1. Summarise how the department is tracking against its allocation.
2. Rate the risk of overspending before the period closes.
3. Give 3-5 concrete recommendations.
{rules}
```json
{schema}
```
"#,
        name = snapshot.department_name,
        period = snapshot.period.label(),
        allocated = snapshot.allocated,
        spent = snapshot.spent,
        remaining = snapshot.remaining,
        pct = snapshot.percentage_used,
        prev = snapshot.previous_month_spent,
        categories = categories,
        rules = OUTPUT_RULES,
        schema = schema_block::<DepartmentAnalysis>()?,
    ))
}

pub fn global_prompt(snapshot: &GlobalSnapshot) -> Result<String> {
    let departments: String = snapshot
        .departments
        .iter()
        .map(|d| {
            format!(
                "  - {}: allocated {:.2}, spent {:.2}, used {:.2}%\n",
                d.name, d.allocated, d.spent, d.percentage_used
            )
        })
        .collect();

    Ok(format!(
        r#"You are the CFO's analyst preparing the monthly company-wide budget review.

## PERIOD
{period}

## COMPANY TOTALS
Total budget: {budget:.2}
Total spent: {spent:.2}
Remaining: {remaining:.2}
Budget used: {pct:.2}%
Spent in the previous month: {prev:.2}

## DEPARTMENTS ({count})
{departments}
## YOUR TASK
1. Summarise company-wide utilisation.
2. Rate the overall risk and the risk of every department listed above.
3. List key insights about the spending pattern.
4. Predict next month's total spend.
5. Give recommendations and cost-optimisation tips.
{rules}
```json
{schema}
```
"#,
        period = snapshot.period.label(),
        budget = snapshot.total_budget,
        spent = snapshot.total_spent,
        remaining = snapshot.remaining(),
        pct = snapshot.percentage_used,
        prev = snapshot.previous_month_spent,
        count = snapshot.departments.len(),
        departments = departments,
        rules = OUTPUT_RULES,
        schema = schema_block::<GlobalAnalysis>()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CategoryTotal, ExpenseCategory, Period};

    #[test]
    fn test_department_prompt_embeds_figures_and_schema() {
        let snapshot = DepartmentSnapshot {
            department_name: "Marketing".to_string(),
            period: Period::new(3, 2024).unwrap(),
            allocated: 1000.0,
            spent: 950.0,
            remaining: 50.0,
            percentage_used: 95.0,
            previous_month_spent: 400.0,
            category_breakdown: vec![CategoryTotal {
                category: ExpenseCategory::Marketing,
                total: 950.0,
                count: 3,
            }],
        };

        let prompt = department_prompt(&snapshot).unwrap();
        assert!(prompt.contains("Marketing"));
        assert!(prompt.contains("Mar 2024"));
        assert!(prompt.contains("Budget used: 95.00%"));
        assert!(prompt.contains("\"riskLevel\""));
        assert!(prompt.contains("\"recommendations\""));
    }
}
