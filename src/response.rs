//! Response envelope and status resolution from an error catalog.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

/// HTTP status of a successful response.
pub const STATUS_OK: u16 = 200;
/// HTTP status used when the error code is unknown.
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

const OK_CODE: &str = "OK";

/// Body returned by a service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gvcc_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gvcc_key: Option<String>,
}

impl ResponseDto {
    pub fn with_error_code(code: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            ..Self::default()
        }
    }
}

/// One entry of a service's error catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub status: u16,
    pub description: String,
    pub code: String,
    pub key: String,
}

impl ErrorDescriptor {
    /// Descriptor of a successful response.
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK,
            description: OK_CODE.to_string(),
            code: String::new(),
            key: String::new(),
        }
    }
}

/// Error catalog keyed by error code.
pub type ErrorCatalog = HashMap<String, ErrorDescriptor>;

/// Resolves the HTTP status of `body`.
///
/// A missing body is a server error. A blank or `OK` error code is a
/// success. Any other code is looked up in `catalog`: a known code yields its
/// status and copies the descriptor's code and key into the body, an unknown
/// one yields a server error.
///
/// ```
/// use stepflag::response::{resolve_status, ErrorCatalog, ErrorDescriptor, ResponseDto};
///
/// let mut catalog = ErrorCatalog::new();
/// catalog.insert("NOT_FOUND".to_string(), ErrorDescriptor {
///     status: 404,
///     description: "not found".to_string(),
///     code: "E404".to_string(),
///     key: "error.notFound".to_string(),
/// });
///
/// let mut body = ResponseDto::with_error_code("NOT_FOUND");
/// assert_eq!(resolve_status(Some(&mut body), &catalog), 404);
/// assert_eq!(body.gvcc_key.as_deref(), Some("error.notFound"));
/// ```
pub fn resolve_status(body: Option<&mut ResponseDto>, catalog: &ErrorCatalog) -> u16 {
    let Some(body) = body else {
        return STATUS_INTERNAL_SERVER_ERROR;
    };

    let code = body
        .error_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or(OK_CODE)
        .to_string();
    debug!(code = %code, "resolving response status");

    if code == OK_CODE {
        return STATUS_OK;
    }

    match catalog.get(&code) {
        Some(info) => {
            body.gvcc_code = Some(info.code.clone());
            body.gvcc_key = Some(info.key.clone());
            info.status
        }
        None => {
            error!(code = %code, body = ?body, "error code not managed");
            STATUS_INTERNAL_SERVER_ERROR
        }
    }
}

/// Builds the body for `error` (success when `None`) and resolves its status.
pub fn to_response(error: Option<&ErrorDescriptor>, catalog: &ErrorCatalog) -> (u16, ResponseDto) {
    let ok = ErrorDescriptor::ok();
    let error = error.unwrap_or(&ok);

    let mut body = ResponseDto {
        description: Some(error.description.clone()),
        error_code: Some(error.code.clone()),
        ..ResponseDto::default()
    };
    let status = resolve_status(Some(&mut body), catalog);
    (status, body)
}
