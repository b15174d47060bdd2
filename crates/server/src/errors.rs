use axum::{http::StatusCode, response::IntoResponse};
use clinicdesk_core::app::ServiceError;
use clinicdesk_core::domain::costs::CostError;
use clinicdesk_core::domain::model::ValidationError;
use clinicdesk_core::domain::scheduling::ScheduleError;
use clinicdesk_core::ports::calendar::CalendarError;
use clinicdesk_core::ports::repo::RepoError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug)]
pub struct ServerError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ServerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let code = status_code_to_string(status);
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, axum::Json(body)).into_response()
    }
}

impl From<RepoError> for ServerError {
    fn from(err: RepoError) -> Self {
        if err.is_unique_violation() {
            return ServerError::new(StatusCode::CONFLICT, "record already exists");
        }
        match err {
            RepoError::NotFound(what) => {
                ServerError::new(StatusCode::NOT_FOUND, format!("{what} not found"))
            }
            RepoError::Conflict(message) => ServerError::new(StatusCode::CONFLICT, message),
            RepoError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ServerError::internal("database error")
            }
        }
    }
}

impl From<CalendarError> for ServerError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::NotConnected | CalendarError::Disabled => {
                ServerError::new(StatusCode::CONFLICT, err.to_string())
            }
            other => {
                tracing::warn!(error = %other, "calendar request failed");
                ServerError::new(StatusCode::BAD_GATEWAY, other.to_string())
            }
        }
    }
}

impl From<ServiceError> for ServerError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Repo(e) => e.into(),
            ServiceError::Calendar(e) => e.into(),
            ServiceError::Cost(e) => ServerError::bad_request(e.to_string()),
            ServiceError::Schedule(e) => ServerError::bad_request(e.to_string()),
            ServiceError::Invalid(message) => ServerError::bad_request(message),
            ServiceError::Forbidden(message) => ServerError::forbidden(message),
            ServiceError::Rejected(report) => {
                let status = if report.has_conflicts() {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::BAD_REQUEST
                };
                let details = serde_json::to_value(&report).unwrap_or(Value::Null);
                ServerError::new(status, "appointment rejected").with_details(details)
            }
        }
    }
}

impl From<CostError> for ServerError {
    fn from(err: CostError) -> Self {
        ServerError::bad_request(err.to_string())
    }
}

impl From<ScheduleError> for ServerError {
    fn from(err: ScheduleError) -> Self {
        ServerError::bad_request(err.to_string())
    }
}

impl From<ValidationError> for ServerError {
    fn from(err: ValidationError) -> Self {
        ServerError::bad_request(err.0)
    }
}

fn status_code_to_string(status: StatusCode) -> String {
    match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        StatusCode::INTERNAL_SERVER_ERROR => "internal_error",
        StatusCode::BAD_GATEWAY => "bad_gateway",
        _ => status.canonical_reason().unwrap_or("error"),
    }
    .to_string()
}
