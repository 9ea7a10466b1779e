use std::fmt;
use std::io;

#[derive(Debug)]
pub enum EngineError {
    /// The engine binary could not be started.
    Spawn(io::Error),
    /// Reading from or writing to the engine failed.
    Io(io::Error),
    /// The engine did not produce the expected output in time.
    Timeout(&'static str),
    /// The engine closed its stdout mid-request.
    Closed,
    /// The pool's task queue is saturated.
    QueueFull,
    /// The pool no longer accepts tasks.
    ShuttingDown,
    /// Workers did not exit within the shutdown deadline.
    ShutdownTimeout,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Spawn(e) => write!(f, "failed to spawn engine: {e}"),
            EngineError::Io(e) => write!(f, "engine i/o error: {e}"),
            EngineError::Timeout(what) => write!(f, "engine timed out waiting for {what}"),
            EngineError::Closed => write!(f, "engine closed its output stream"),
            EngineError::QueueFull => write!(f, "engine task queue is full"),
            EngineError::ShuttingDown => write!(f, "engine pool is shutting down"),
            EngineError::ShutdownTimeout => write!(f, "engine pool shutdown timed out"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Spawn(e) | EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}
