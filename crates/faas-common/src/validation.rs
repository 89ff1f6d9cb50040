use crate::models::{
    Annotations, CallType, Route, MAX_ASYNC_TIMEOUT, MAX_IDLE_TIMEOUT, MAX_MEMORY,
    MAX_SYNC_TIMEOUT,
};
use thiserror::Error;

const MAX_ANNOTATION_KEYS: usize = 100;
const MAX_ANNOTATION_KEY_BYTES: usize = 128;
const MAX_ANNOTATION_VALUE_BYTES: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing route app id")]
    MissingAppId,
    #[error("missing route path")]
    MissingPath,
    #[error("invalid route path: {0}")]
    InvalidPath(String),
    #[error("missing route image")]
    MissingImage,
    #[error("timeout must be between 1 and {max} seconds for {call_type} routes, got {got}")]
    InvalidTimeout {
        call_type: CallType,
        max: u32,
        got: u32,
    },
    #[error("idle timeout must be between 1 and 3600 seconds, got {0}")]
    InvalidIdleTimeout(u32),
    #[error("memory must be between 1 and 8192 MB, got {0}")]
    InvalidMemory(u64),
    #[error("tmpfs size {tmpfs_size} MB exceeds memory {memory} MB")]
    InvalidTmpFsSize { tmpfs_size: u32, memory: u64 },
    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),
}

impl Route {
    /// Check that the route can be turned into a runnable call: image, path,
    /// timeouts and resource sizes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.app_id.is_empty() {
            return Err(ValidationError::MissingAppId);
        }
        if self.path.is_empty() {
            return Err(ValidationError::MissingPath);
        }
        if !self.path.starts_with('/')
            || self
                .path
                .chars()
                .any(|c| matches!(c, ':' | '?' | '#') || c.is_whitespace())
        {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }
        if self.image.trim().is_empty() {
            return Err(ValidationError::MissingImage);
        }

        let max = match self.call_type {
            CallType::Sync => MAX_SYNC_TIMEOUT,
            CallType::Async => MAX_ASYNC_TIMEOUT,
        };
        if self.timeout == 0 || self.timeout > max {
            return Err(ValidationError::InvalidTimeout {
                call_type: self.call_type,
                max,
                got: self.timeout,
            });
        }
        if self.idle_timeout == 0 || self.idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(ValidationError::InvalidIdleTimeout(self.idle_timeout));
        }
        if self.memory == 0 || self.memory > MAX_MEMORY {
            return Err(ValidationError::InvalidMemory(self.memory));
        }
        if u64::from(self.tmpfs_size) > self.memory {
            return Err(ValidationError::InvalidTmpFsSize {
                tmpfs_size: self.tmpfs_size,
                memory: self.memory,
            });
        }

        self.annotations.validate()
    }
}

impl Annotations {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.len() > MAX_ANNOTATION_KEYS {
            return Err(ValidationError::InvalidAnnotation(format!(
                "too many keys ({} > {MAX_ANNOTATION_KEYS})",
                self.len()
            )));
        }
        for (key, value) in &self.0 {
            if key.is_empty() {
                return Err(ValidationError::InvalidAnnotation("empty key".to_string()));
            }
            if key.len() > MAX_ANNOTATION_KEY_BYTES {
                return Err(ValidationError::InvalidAnnotation(format!(
                    "key {key:?} too long"
                )));
            }
            if value.to_string().len() > MAX_ANNOTATION_VALUE_BYTES {
                return Err(ValidationError::InvalidAnnotation(format!(
                    "value for {key:?} too long"
                )));
            }
        }
        Ok(())
    }
}
