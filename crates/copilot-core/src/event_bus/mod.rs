mod tokio_bus;
mod traits;

pub use tokio_bus::TokioBroadcastBus;
pub use traits::{AppEvent, EventBus, EventFilter, EventType};
