//! Decision rendering at the integration boundary.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::ResponseType;
use crate::error::Result;
use crate::limit::Decision;

/// JSON content type reported alongside serialized output.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The structured response shape.
///
/// The field set varies by outcome; absent fields are omitted rather than
/// serialized as null.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResponseBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklisted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_on_this_request: Option<bool>,
    /// RFC 3339 expiry of the block, for either block outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_till: Option<String>,
}

impl From<&Decision> for ResponseBody {
    fn from(decision: &Decision) -> Self {
        let blocked_till = decision.blocked_till.map(|till| till.to_rfc3339());
        if decision.blacklisted {
            Self {
                success: false,
                blacklisted: Some(true),
                already_blocked: None,
                blocked_on_this_request: None,
                blocked_till: None,
            }
        } else if decision.already_blocked {
            Self {
                success: false,
                blacklisted: None,
                already_blocked: Some(true),
                blocked_on_this_request: None,
                blocked_till,
            }
        } else if decision.blocked_on_this_request {
            Self {
                success: false,
                blacklisted: None,
                already_blocked: None,
                blocked_on_this_request: Some(true),
                blocked_till,
            }
        } else {
            Self {
                success: true,
                blacklisted: None,
                already_blocked: None,
                blocked_on_this_request: None,
                blocked_till: None,
            }
        }
    }
}

/// A rendered decision in one of the configured output shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Structured, named-field value.
    Object(ResponseBody),
    /// Serialized JSON with its content type.
    Json {
        body: String,
        content_type: &'static str,
    },
    /// Plain key-value mapping.
    Map(HashMap<String, String>),
}

/// Render a decision into the configured output shape.
pub fn format(decision: &Decision, response_type: ResponseType) -> Result<Output> {
    let body = ResponseBody::from(decision);
    match response_type {
        ResponseType::Object => Ok(Output::Object(body)),
        ResponseType::Json => Ok(Output::Json {
            body: serde_json::to_string(&body)?,
            content_type: JSON_CONTENT_TYPE,
        }),
        ResponseType::Map => {
            let mut map = HashMap::new();
            map.insert("success".to_string(), body.success.to_string());
            if let Some(blacklisted) = body.blacklisted {
                map.insert("blacklisted".to_string(), blacklisted.to_string());
            }
            if let Some(already) = body.already_blocked {
                map.insert("already_blocked".to_string(), already.to_string());
            }
            if let Some(triggered) = body.blocked_on_this_request {
                map.insert("blocked_on_this_request".to_string(), triggered.to_string());
            }
            if let Some(till) = body.blocked_till {
                map.insert("blocked_till".to_string(), till);
            }
            Ok(Output::Map(map))
        }
    }
}
