//! Inbound wire messages and the typed envelope handed to data feed handlers.
//!
//! A frame is UTF-8 text with `\n` separated lines:
//!
//! ```text
//! <acknowledgement>
//! <tenant>/<apiType>/<id>
//! <action>
//! <json payload, possibly spanning several lines>
//! ```

use std::fmt;
use std::str::FromStr;

use platform_api::subscriptions::ApiType;
use serde::de::DeserializeOwned;

const LINE_SEPARATOR: char = '\n';
const API_SEPARATOR: char = '/';

/// The four raw fields of one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageData {
    pub acknowledgement: String,
    pub api_url: String,
    pub action: String,
    pub raw_message: String,
}

/// Split a frame into its fields.
///
/// Missing lines become empty strings; this never fails so that a malformed
/// frame cannot take down the receive loop.
pub fn extract(text: &str) -> MessageData {
    let lines: Vec<&str> = text.split(LINE_SEPARATOR).collect();
    let field = |index: usize| lines.get(index).map(|line| line.to_string()).unwrap_or_default();

    MessageData {
        acknowledgement: field(0),
        api_url: field(1),
        action: field(2),
        raw_message: lines.get(3..).map(|rest| rest.join("\n")).unwrap_or_default(),
    }
}

/// The `tenant/apiType/id` scope of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Api {
    pub text: String,
    pub tenant: Option<String>,
    /// `None` when the segment is absent or not a known API.
    pub api_type: Option<ApiType>,
    pub id: Option<String>,
}

impl Api {
    pub fn new(text: &str) -> Self {
        let segments: Vec<&str> = text
            .split(API_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect();

        Self {
            text: text.to_string(),
            tenant: segments.first().map(|s| s.to_string()),
            api_type: segments.get(1).and_then(|s| s.parse().ok()),
            id: segments.get(2).map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

impl FromStr for ActionType {
    type Err = ();

    // The platform sends past tense keywords (CREATED); the imperative form is accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" | "created" => Ok(ActionType::Create),
            "update" | "updated" => Ok(ActionType::Update),
            "delete" | "deleted" => Ok(ActionType::Delete),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActionType::Create => write!(f, "CREATE"),
            ActionType::Update => write!(f, "UPDATE"),
            ActionType::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub text: String,
    pub action_type: Option<ActionType>,
}

impl Action {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            action_type: text.parse().ok(),
        }
    }
}

/// What a data feed handler receives for every frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageObject {
    /// Raw payload without the metadata lines.
    pub message: String,
    pub api: Api,
    pub action: Action,
}

impl MessageObject {
    /// Deserialize the JSON payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.message)
    }
}

impl From<&MessageData> for MessageObject {
    fn from(data: &MessageData) -> Self {
        Self {
            message: data.raw_message.clone(),
            api: Api::new(&data.api_url),
            action: Action::new(&data.action),
        }
    }
}
