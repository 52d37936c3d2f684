//! Request and response shapes for in-process function modules.

use crate::Header;

/// A call into a function module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerRequest {
    pub body: Vec<u8>,
    pub header: Header,
    pub query_string: String,
    pub method: String,
    pub host: String,
}

/// What a module hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResponse {
    /// Written back to the caller verbatim.
    pub body: Vec<u8>,
    /// HTTP status, e.g. 200.
    pub status_code: u16,
    /// Extra headers the response should carry.
    pub header: Header,
}

impl HandlerResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            status_code,
            header: Header::new(),
        }
    }
}

/// Caller identity and module metadata for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerContext {
    pub module_name: String,
    pub module_version: String,
    pub identity: String,
    pub roles: String,
    /// Whether the request body arrived base64-encoded.
    pub base64_encoded: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("module {module} failed: {reason}")]
    Failed { module: String, reason: String },
}

impl HandlerError {
    /// Status the gateway should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Failed { .. } => 500,
        }
    }
}

/// A function implemented as an in-process module.
pub trait ModuleHandler: Send + Sync {
    fn handle_request(
        &self,
        ctx: &HandlerContext,
        req: HandlerRequest,
    ) -> Result<HandlerResponse, HandlerError>;
}
