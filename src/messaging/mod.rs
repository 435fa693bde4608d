mod bus;
mod types;

pub use bus::MessageBus;
pub use types::PipelineMessage;
