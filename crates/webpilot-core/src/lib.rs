pub mod errors;
pub mod ids;
pub mod plan;

pub use errors::{GeneratorError, ProtocolError};
pub use ids::{ConnectionId, SessionId, TaskId};
pub use plan::{Step, TaskPlan};
