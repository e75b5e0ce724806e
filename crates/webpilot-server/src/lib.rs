pub mod config;
pub mod registry;
pub mod server;
pub mod session;
pub mod wire;

pub use config::ServerConfig;
pub use registry::{ConnectionMeta, ConnectionRegistry};
pub use server::{start, ServerHandle};
pub use session::SessionProtocol;
