use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use webpilot_core::errors::GeneratorError;
use webpilot_core::plan::{Step, TaskPlan};

use crate::generator::PlanGenerator;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone)]
pub enum MockPlanResponse {
    /// Return this plan.
    Plan(TaskPlan),
    /// Fail with this error.
    Error(GeneratorError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockPlanResponse>),
}

impl MockPlanResponse {
    /// Convenience: a single-step navigate plan.
    pub fn navigate(url: &str) -> Self {
        Self::Plan(TaskPlan::new(vec![
            Step::new("navigate").with_param("url", serde_json::json!(url)),
        ]))
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockPlanResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock generator that returns pre-programmed responses in sequence.
pub struct MockGenerator {
    responses: Vec<MockPlanResponse>,
    call_count: AtomicUsize,
}

impl MockGenerator {
    pub fn new(responses: Vec<MockPlanResponse>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PlanGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn create_plan(&self, _command: &str) -> Result<TaskPlan, GeneratorError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        let Some(mut response) = self.responses.get(idx).cloned() else {
            return Err(GeneratorError::InvalidResponse(format!(
                "MockGenerator: no response configured for call {idx}"
            )));
        };

        while let MockPlanResponse::Delay(delay, inner) = response {
            tokio::time::sleep(delay).await;
            response = *inner;
        }

        match response {
            MockPlanResponse::Plan(plan) => Ok(plan),
            MockPlanResponse::Error(err) => Err(err),
            MockPlanResponse::Delay(..) => unreachable!(),
        }
    }
}
