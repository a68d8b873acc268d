use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Wire-neutral error kinds shared by every protocol gateway.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BasimError {
    #[error("unknown point: {0}")]
    UnknownPoint(String),
    #[error("point not writable: {0}")]
    NotWritable(String),
    #[error("priority out of range 1..16: {0}")]
    BadPriority(u8),
    #[error("value of wrong kind/range for point {path}: {detail}")]
    BadType { path: String, detail: String },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("unknown scenario: {0}")]
    BadScenario(String),
    #[error("invalid topology: {0}")]
    BadTopology(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("point {0} is not owned by the calling model")]
    NotOwner(String),
}

impl BasimError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            BasimError::UnknownPoint(_) => StatusCode::NOT_FOUND,
            BasimError::NotWritable(_)
            | BasimError::BadPriority(_)
            | BasimError::BadType { .. }
            | BasimError::BadScenario(_) => StatusCode::BAD_REQUEST,
            BasimError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            BasimError::Forbidden => StatusCode::FORBIDDEN,
            BasimError::BadTopology(_) | BasimError::Internal(_) | BasimError::NotOwner(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Modbus exception code per spec §6: 01 illegal function, 02 illegal
    /// address, 03 illegal value.
    pub fn modbus_exception(&self) -> tokio_modbus::ExceptionCode {
        match self {
            BasimError::UnknownPoint(_) => tokio_modbus::ExceptionCode::IllegalDataAddress,
            BasimError::NotWritable(_) | BasimError::BadType { .. } | BasimError::BadPriority(_) => {
                tokio_modbus::ExceptionCode::IllegalDataValue
            }
            _ => tokio_modbus::ExceptionCode::IllegalFunction,
        }
    }

    /// BACnet error class/code pair, loosely following the BACnet standard's
    /// `object` and `property` error classes.
    pub fn bacnet_error(&self) -> (&'static str, &'static str) {
        match self {
            BasimError::UnknownPoint(_) => ("object", "unknownObject"),
            BasimError::NotWritable(_) => ("property", "writeAccessDenied"),
            BasimError::BadPriority(_) => ("property", "invalidArrayIndex"),
            BasimError::BadType { .. } => ("property", "invalidDataType"),
            BasimError::NotAuthenticated | BasimError::Forbidden => ("security", "accessDenied"),
            _ => ("device", "operationalProblem"),
        }
    }
}

impl IntoResponse for BasimError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type BasimResult<T> = Result<T, BasimError>;
