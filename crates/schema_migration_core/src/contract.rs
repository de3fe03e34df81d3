use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource property carrying the migration-set fingerprint. The control
/// plane diffs this value between deployments to decide whether the handler
/// needs to be re-invoked at all.
pub const MIGRATION_HASH_PROPERTY: &str = "migrationDirectoryHash";

/// Lifecycle signal from the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Inbound custom-resource event. Field names follow the control plane's
/// wire format; unknown top-level fields (ResponseURL, ResourceType, ...)
/// are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomResourceEvent {
    #[serde(rename = "RequestType")]
    pub request_type: RequestType,
    #[serde(rename = "StackId")]
    pub stack_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    #[serde(rename = "ResourceProperties", default)]
    pub resource_properties: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Outbound custom-resource response. StackId, RequestId, and
/// LogicalResourceId must echo the event; PhysicalResourceId must stay
/// identical across invocations for the same logical resource or the
/// control plane treats each run as a replacement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomResourceResponse {
    #[serde(rename = "StackId")]
    pub stack_id: String,
    #[serde(rename = "RequestId")]
    pub request_id: String,
    #[serde(rename = "LogicalResourceId")]
    pub logical_resource_id: String,
    #[serde(rename = "PhysicalResourceId")]
    pub physical_resource_id: String,
    #[serde(rename = "Status")]
    pub status: ResponseStatus,
    #[serde(rename = "Reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "Data")]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a raw lifecycle event at the boundary. Events with an
/// unrecognized RequestType or missing correlation fields are rejected here
/// rather than dispatched on a guess.
pub fn parse_event(event: &Value) -> Result<CustomResourceEvent, ValidationError> {
    if !event.is_object() {
        return Err(ValidationError::new("Lifecycle event must be a JSON object"));
    }

    serde_json::from_value(event.clone())
        .map_err(|error| ValidationError::new(format!("Malformed lifecycle event: {error}")))
}
