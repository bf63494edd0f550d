//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes. 4xxx codes are caused by
//! the request, 5xxx by the engine.

use jsonrpsee::types::ErrorObjectOwned;
use nbapp_core::error::{AppError, ErrorCategory};
use serde_json::json;

/// RPC Error Codes
pub mod code {
    pub const PARAMETER_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const FORMAT_ERROR: i32 = 4002;
    pub const CONFIG_ERROR: i32 = 4003;
    pub const FORBIDDEN: i32 = 4030;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const ENVIRONMENT_ERROR: i32 = 5001;
    pub const EXECUTION_ERROR: i32 = 5002;
    pub const TIMEOUT: i32 = 5040;
}

/// JSON-RPC code for an error category
pub fn category_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Parameter => code::PARAMETER_ERROR,
        ErrorCategory::NotFound => code::NOT_FOUND,
        ErrorCategory::Format => code::FORMAT_ERROR,
        ErrorCategory::Config => code::CONFIG_ERROR,
        ErrorCategory::Environment => code::ENVIRONMENT_ERROR,
        ErrorCategory::Execution => code::EXECUTION_ERROR,
        ErrorCategory::Timeout => code::TIMEOUT,
        ErrorCategory::Io | ErrorCategory::Unknown => code::INTERNAL_ERROR,
    }
}

/// Convert AppError to JSON-RPC ErrorObject
///
/// Parameter errors carry the offending input names as `data.inputs`.
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = category_code(err.category());
    match &err {
        AppError::Parameter(e) => {
            let inputs = e.names();
            ErrorObjectOwned::owned(code, err.to_string(), Some(json!({ "inputs": inputs })))
        }
        _ => ErrorObjectOwned::owned(code, err.to_string(), None::<()>),
    }
}

pub fn forbidden(message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code::FORBIDDEN, message.into(), None::<()>)
}
