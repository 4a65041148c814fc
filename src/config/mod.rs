pub mod email;
pub mod event;
pub mod gateway;

pub use email::{EmailConfig, EmailTemplates};
pub use event::EventConfig;
pub use gateway::GatewayConfig;
