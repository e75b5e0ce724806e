pub mod generator;
pub mod openai;

pub mod mock;

pub use generator::PlanGenerator;
pub use mock::{MockGenerator, MockPlanResponse};
pub use openai::OpenAiGenerator;
