use crate::domain::optimization::parameter::{LabParameter, RawLabParameter};
use crate::domain::optimization::range_generator::{
    ParameterOptimizationPlan, ParameterRangeGenerator, PlanAction, RangeConfig,
};
use crate::domain::ports::LabDataSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Fetches a lab's parameters and turns them into range plans.
pub struct ParameterPlanner {
    source: Arc<dyn LabDataSource>,
    generator: ParameterRangeGenerator,
}

impl ParameterPlanner {
    pub fn new(source: Arc<dyn LabDataSource>, config: RangeConfig) -> Self {
        Self {
            source,
            generator: ParameterRangeGenerator::new(config),
        }
    }

    pub async fn plan_for_lab(&self, lab_id: &str) -> Result<Vec<ParameterOptimizationPlan>> {
        let raw = self
            .source
            .fetch_lab_parameters(lab_id)
            .await
            .context(format!("Failed to fetch parameters for lab {}", lab_id))?;

        let plans = self.plan_raw(&raw);
        let optimized = plans
            .iter()
            .filter(|p| p.action == PlanAction::Optimize)
            .count();
        info!(
            "Lab {}: {} parameters, {} to optimize",
            lab_id,
            plans.len(),
            optimized
        );
        Ok(plans)
    }

    /// Plans for parameters already in hand, e.g. loaded from a file.
    pub fn plan_raw(&self, raw: &[RawLabParameter]) -> Vec<ParameterOptimizationPlan> {
        let typed: Vec<LabParameter> = raw.iter().map(LabParameter::from_raw).collect();
        self.generator.plan(&typed)
    }
}
