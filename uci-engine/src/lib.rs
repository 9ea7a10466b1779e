pub mod adapter;
pub mod error;
pub mod pool;

pub use adapter::{EngineAdapter, SearchOutcome};
pub use error::EngineError;
pub use pool::{EnginePool, EngineTask, DEFAULT_WORKERS, QUEUE_CAPACITY};
