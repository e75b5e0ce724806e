use async_trait::async_trait;

use webpilot_core::errors::GeneratorError;
use webpilot_core::plan::TaskPlan;

/// Capability that turns a natural-language command into a structured
/// multi-step browser-automation plan.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn create_plan(&self, command: &str) -> Result<TaskPlan, GeneratorError>;
}
