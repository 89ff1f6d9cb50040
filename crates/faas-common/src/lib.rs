// Re-export dependencies used in public interfaces of common types

pub use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use uuid;

mod cpus;
mod models;
mod stats;
mod validation;

pub use cpus::{MilliCpus, ParseCpusError};
pub use models::*;
pub use stats::{decimate, Stat};
pub use validation::ValidationError;

/// Errors reported by the collaborators around the agent core
/// (datastore, hooks, execution backend).
#[derive(Error, Debug)]
pub enum FaasError {
    #[error("Executor Error: {0}")]
    Executor(String),

    #[error("Datastore Error: {0}")]
    Datastore(String),

    #[error("Hook Error: {0}")]
    Hook(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid Definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Define the primary Result type for FaaS operations
pub type Result<T> = std::result::Result<T, FaasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization() {
        let route = Route {
            app_id: "app1".to_string(),
            path: "/hello".to_string(),
            image: "fnproject/hello".to_string(),
            memory: 256,
            cpus: "500m".parse().unwrap(),
            ..Default::default()
        };
        let json = serde_json::to_string(&route).unwrap();
        println!("{json}");
        assert!(json.contains("\"cpus\":\"500m\""));
        assert!(json.contains("\"type\":\"sync\""));

        let back: Route = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cpus, MilliCpus(500));
        assert_eq!(back.memory, 256);
    }

    #[test]
    fn test_error_display() {
        let err = FaasError::from(ValidationError::MissingImage);
        assert_eq!(err.to_string(), "Invalid Definition: missing route image");
    }
}
