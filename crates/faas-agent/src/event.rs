//! Structured (CloudEvents) invocation envelopes.
//!
//! The platform ships the app, function and trigger definitions inside the
//! event's extension map. They are decoded into [`EventExtensions`] when the
//! event is parsed, so nothing downstream deals with untyped extension values.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use faas_common::{App, Function, Trigger};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Media type of a structured-mode CloudEvent.
pub const CLOUD_EVENT_MEDIA_TYPE: &str = "application/cloudevents+json";

const APP_EXTENSION: &str = "app";
const FN_EXTENSION: &str = "fn";
const TRIGGER_EXTENSION: &str = "trigger";

/// One of the extension kinds the platform understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Extension {
    App(App),
    Fn(Function),
    Trigger(Trigger),
}

impl Extension {
    /// Decode the value stored under `key`. Unknown keys yield `Ok(None)`.
    pub fn decode(key: &str, value: Value) -> Result<Option<Self>> {
        let invalid = |e: serde_json::Error| Error::InvalidExtensions(format!("{key}: {e}"));
        let ext = match key {
            APP_EXTENSION => Extension::App(serde_json::from_value(value).map_err(invalid)?),
            FN_EXTENSION => Extension::Fn(serde_json::from_value(value).map_err(invalid)?),
            TRIGGER_EXTENSION => {
                Extension::Trigger(serde_json::from_value(value).map_err(invalid)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(ext))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventExtensions {
    pub app: App,
    pub function: Function,
    pub trigger: Trigger,
}

impl EventExtensions {
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let (mut app, mut function, mut trigger) = (None, None, None);
        for (key, value) in map {
            match Extension::decode(&key, value)? {
                Some(Extension::App(a)) => app = Some(a),
                Some(Extension::Fn(f)) => function = Some(f),
                Some(Extension::Trigger(t)) => trigger = Some(t),
                None => {}
            }
        }
        let missing = |name: &str| Error::InvalidExtensions(format!("missing {name} extension"));
        Ok(Self {
            app: app.ok_or_else(|| missing(APP_EXTENSION))?,
            function: function.ok_or_else(|| missing(FN_EXTENSION))?,
            trigger: trigger.ok_or_else(|| missing(TRIGGER_EXTENSION))?,
        })
    }

    fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        // plain data structs, serialization cannot fail
        map.insert(
            APP_EXTENSION.to_string(),
            serde_json::to_value(self.app).unwrap_or(Value::Null),
        );
        map.insert(
            FN_EXTENSION.to_string(),
            serde_json::to_value(self.function).unwrap_or(Value::Null),
        );
        map.insert(
            TRIGGER_EXTENSION.to_string(),
            serde_json::to_value(self.trigger).unwrap_or(Value::Null),
        );
        map
    }
}

/// Wire shape of the envelope, before extension validation.
#[derive(Debug, Serialize, Deserialize)]
struct RawCloudEvent {
    #[serde(rename = "cloudEventsVersion", alias = "specversion")]
    spec_version: String,
    #[serde(rename = "eventType", alias = "type")]
    event_type: String,
    source: String,
    #[serde(rename = "eventID", alias = "id")]
    id: String,
    #[serde(rename = "eventTime", alias = "time", default, skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
    #[serde(rename = "contentType", alias = "datacontenttype", default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default)]
    extensions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudEvent {
    pub spec_version: String,
    pub event_type: String,
    pub source: String,
    pub id: String,
    pub time: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub extensions: EventExtensions,
    pub data: Option<Value>,
}

impl CloudEvent {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawCloudEvent = serde_json::from_slice(bytes)?;
        let extensions = match raw.extensions {
            Some(Value::Object(map)) => EventExtensions::from_map(map)?,
            Some(other) => {
                return Err(Error::InvalidExtensions(format!(
                    "expected an object, got {other}"
                )))
            }
            None => return Err(Error::InvalidExtensions("no extensions".to_string())),
        };
        Ok(Self {
            spec_version: raw.spec_version,
            event_type: raw.event_type,
            source: raw.source,
            id: raw.id,
            time: raw.time,
            content_type: raw.content_type,
            extensions,
            data: raw.data,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let raw = RawCloudEvent {
            spec_version: self.spec_version.clone(),
            event_type: self.event_type.clone(),
            source: self.source.clone(),
            id: self.id.clone(),
            time: self.time,
            content_type: self.content_type.clone(),
            extensions: Some(Value::Object(self.extensions.clone().into_map())),
            data: self.data.clone(),
        };
        Ok(serde_json::to_vec(&raw)?)
    }

    /// The event's inline data as the function payload: strings are passed
    /// through as-is, other JSON values are re-encoded.
    pub fn payload(&self) -> String {
        match &self.data {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// Parse a `Content-Type` value down to its lowercased media type, ignoring
/// parameters. Parameter values may be tokens or quoted strings; malformed
/// values are rejected.
pub fn parse_media_type(value: &str) -> std::result::Result<String, String> {
    let (media_type, mut params) = value.split_once(';').unwrap_or((value, ""));
    let media_type = media_type.trim().to_ascii_lowercase();

    let (kind, subtype) = media_type
        .split_once('/')
        .ok_or_else(|| format!("no media type in {value:?}"))?;
    if !is_token(kind) || !is_token(subtype) {
        return Err(format!("invalid media type {media_type:?}"));
    }

    loop {
        params = params.trim_start();
        if params.is_empty() {
            break;
        }
        let current = params;
        let invalid = || format!("invalid media parameter {current:?}");
        let (key, raw) = params.split_once('=').ok_or_else(invalid)?;
        if !is_token(key.trim()) {
            return Err(invalid());
        }

        let tail = match raw.strip_prefix('"') {
            Some(quoted) => skip_quoted(quoted).ok_or_else(invalid)?,
            None => {
                let end = raw
                    .find(|c: char| c == ';' || c.is_whitespace())
                    .unwrap_or(raw.len());
                if !is_token(&raw[..end]) {
                    return Err(invalid());
                }
                &raw[end..]
            }
        };

        let tail = tail.trim_start();
        params = match tail.strip_prefix(';') {
            Some(next) => next,
            None if tail.is_empty() => tail,
            None => return Err(invalid()),
        };
    }
    Ok(media_type)
}

/// Skip the body of a quoted string (opening quote already consumed) and
/// return what follows the closing quote.
fn skip_quoted(s: &str) -> Option<&str> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(&s[i + 1..]),
            _ => {}
        }
    }
    None
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

pub fn is_cloud_event_media_type(content_type: &str) -> std::result::Result<bool, String> {
    parse_media_type(content_type).map(|t| t == CLOUD_EVENT_MEDIA_TYPE)
}
