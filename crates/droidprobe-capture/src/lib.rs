pub mod config;
pub mod correlator;
pub mod feed;
pub mod flow;
pub mod interceptor;
pub mod mitm;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("flow log serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{binary} not found or not executable: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("interceptor is already running")]
    AlreadyRunning,
}
