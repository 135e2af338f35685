use spin_sdk::http::Response;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// One message per violated field, surfaced to the caller verbatim.
    Validation(BTreeMap<String, String>),
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// A multi-document update was rolled back or the store was unreachable.
    /// The caller may retry the request unchanged.
    Transient(String),
    InternalError(String),
}

impl ApiError {
    pub fn not_permitted() -> Self {
        ApiError::Forbidden("You're not allowed to perform this operation.".to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(fields) => {
                let joined = fields
                    .iter()
                    .map(|(field, msg)| format!("{}: {}", field, msg))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "Validation failed: {}", joined)
            }
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Transient(msg) => write!(f, "Temporary failure: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

fn json_error(status: u16, body: serde_json::Value) -> Response {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(&body).unwrap_or_default())
        .build()
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Validation(fields) => {
                json_error(400, serde_json::json!({"error": fields}))
            }
            ApiError::BadRequest(msg) => json_error(400, serde_json::json!({"error": msg})),
            ApiError::Unauthorized => json_error(401, serde_json::json!({"error": "Unauthorized"})),
            ApiError::Forbidden(msg) => json_error(403, serde_json::json!({"error": msg})),
            ApiError::NotFound(msg) => json_error(404, serde_json::json!({"error": msg})),
            ApiError::Conflict(msg) => json_error(409, serde_json::json!({"error": msg})),
            ApiError::Transient(msg) => json_error(503, serde_json::json!({"error": msg})),
            ApiError::InternalError(msg) => json_error(500, serde_json::json!({"error": msg})),
        }
    }
}

impl std::error::Error for ApiError {}

// Persistence and serialization failures bubble up as internal errors unless
// a manager has already classified them.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}
