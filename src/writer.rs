use crate::error::{PipelineError, Result};
use crate::schema::Report;
use crate::store::BudgetStore;
use log::info;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Insert, or fully replace whatever is stored under the key. Used by
    /// scheduled recomputation.
    Replace,
    /// Insert only when the key is free; otherwise fail with `Conflict` and
    /// leave the stored report as it was. Used by on-demand generation.
    RejectIfExists,
}

#[derive(Clone)]
pub struct ReportWriter {
    store: Arc<dyn BudgetStore>,
}

impl ReportWriter {
    pub fn new(store: Arc<dyn BudgetStore>) -> Self {
        Self { store }
    }

    /// Persists `report` under its natural key as a single store operation.
    pub async fn write(&self, report: Report, policy: WritePolicy) -> Result<Report> {
        report.validate()?;
        let key = report.key();

        match policy {
            WritePolicy::Replace => {
                self.store.upsert_report(report.clone()).await?;
            }
            WritePolicy::RejectIfExists => {
                if !self.store.insert_report(report.clone()).await? {
                    return Err(PipelineError::Conflict(format!(
                        "Report already exists for {}; delete it before regenerating",
                        key
                    )));
                }
            }
        }

        info!(
            "Stored report {} (risk {}, ai_generated {}) with {:?}",
            key, report.risk_level, report.ai_generated, policy
        );
        Ok(report)
    }
}
