use crate::{MilliCpus, Stat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_TIMEOUT: u32 = 30; // seconds
pub const DEFAULT_IDLE_TIMEOUT: u32 = 30; // seconds
pub const DEFAULT_MEMORY: u64 = 128; // MB
pub const MAX_SYNC_TIMEOUT: u32 = 120;
pub const MAX_ASYNC_TIMEOUT: u32 = 3600;
pub const MAX_IDLE_TIMEOUT: u32 = MAX_ASYNC_TIMEOUT;
pub const MAX_MEMORY: u64 = 8 * 1024; // MB

/// Environment handed to the function container. Ordered so that building it
/// from the same inputs always yields the same map.
pub type Config = BTreeMap<String, String>;

/// Multi-valued HTTP headers in a serializable form.
pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Sync,
    Async,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Sync => "sync",
            CallType::Async => "async",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Default,
    Http,
    Json,
    CloudEvent,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Default => "default",
            Format::Http => "http",
            Format::Json => "json",
            Format::CloudEvent => "cloudevent",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form metadata attached to apps, routes, functions and triggers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(pub BTreeMap<String, Value>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer `other` on top of `self`. Keys in `other` win; a `null` value in
    /// `other` removes the key.
    pub fn merge_change(&self, other: &Annotations) -> Annotations {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            if v.is_null() {
                merged.remove(k);
            } else {
                merged.insert(k.clone(), v.clone());
            }
        }
        Annotations(merged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub app_id: String,
    pub path: String,
    pub image: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub format: Option<Format>,
    pub memory: u64,
    pub cpus: MilliCpus,
    pub timeout: u32,
    pub idle_timeout: u32,
    pub tmpfs_size: u32,
    pub headers: Headers,
    pub config: Config,
    pub annotations: Annotations,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            path: String::new(),
            image: String::new(),
            call_type: CallType::Sync,
            format: None,
            memory: DEFAULT_MEMORY,
            cpus: MilliCpus::default(),
            timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            tmpfs_size: 0,
            headers: Headers::new(),
            config: Config::new(),
            annotations: Annotations::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    pub id: String,
    pub name: String,
    pub app_id: String,
    pub image: String,
    pub format: Option<Format>,
    pub memory: u64,
    pub timeout: u32,
    pub idle_timeout: u32,
    pub config: Config,
    pub annotations: Annotations,
}

impl Default for Function {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            app_id: String::new(),
            image: String::new(),
            format: None,
            memory: DEFAULT_MEMORY,
            timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            config: Config::new(),
            annotations: Annotations::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub app_id: String,
    pub fn_id: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub source: String,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Queued,
    Running,
    Success,
    Timeout,
    Error,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Success | CallStatus::Timeout | CallStatus::Error
        )
    }
}

/// Identity and execution parameters of a call. Fixed once the call is
/// assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    pub id: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    pub image: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub format: Format,
    #[serde(default)]
    pub priority: i32,
    pub timeout: u32,
    pub idle_timeout: u32,
    pub memory: u64,
    #[serde(default)]
    pub cpus: MilliCpus,
    #[serde(default)]
    pub tmpfs_size: u32,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog_url: Option<String>,
}

impl CallParams {
    pub fn is_async(&self) -> bool {
        self.call_type == CallType::Async
    }
}

/// Lifecycle fields of a call, written only by the start and end phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallState {
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub stats: Vec<Stat>,
}

/// Stored form of a call, as kept by the datastore/queue and replayed for
/// async redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallModel {
    #[serde(flatten)]
    pub params: CallParams,
    #[serde(flatten)]
    pub state: CallState,
    #[serde(default)]
    pub payload: String,
}

impl CallModel {
    pub fn new(params: CallParams) -> Self {
        Self {
            params,
            state: CallState::default(),
            payload: String::new(),
        }
    }
}
