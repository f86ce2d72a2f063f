//! Tool-level errors for the swcache server.
//!
//! Engine errors keep the codes assigned in `swcache_core`; these cover
//! failures that only exist at the tool boundary.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool parameters could not be turned into an engine request.
    #[error("INVALID_INPUT: {0}")]
    InvalidParams(String),

    /// A tool output failed to serialize.
    #[error("OUTPUT_FAILED: {0}")]
    Output(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidParams(msg) => (-32602, msg.clone()),
            ToolError::Output(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
