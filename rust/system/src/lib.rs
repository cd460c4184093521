pub mod executor;
pub mod receiver;
pub mod scheduler;
#[allow(clippy::module_inception)]
pub mod system;
pub mod types;
pub mod wrapped_message;

// Re-export types
pub use receiver::*;
pub use scheduler::Scheduler;
pub use system::*;
pub use types::*;
pub(crate) use wrapped_message::*;
