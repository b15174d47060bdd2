//! Use cases shared by the HTTP layer:
//! validation, then repository access,
//! then audit.

use thiserror::Error;

use crate::domain::costs::CostError;
use crate::domain::model::ValidationError;
use crate::domain::scheduling::{
  ScheduleError,
  ValidationReport
};
use crate::ports::calendar::CalendarError;
use crate::ports::repo::RepoError;

pub mod audit;
pub mod billing;
pub mod calendar_sync;
pub mod costs;
pub mod scheduling;

#[derive(Debug, Error)]

pub enum ServiceError {
  #[error(transparent)]
  Repo(#[from] RepoError),
  #[error(transparent)]
  Cost(#[from] CostError),
  #[error(transparent)]
  Schedule(#[from] ScheduleError),
  #[error(transparent)]
  Calendar(#[from] CalendarError),
  #[error("{0}")]
  Invalid(String),
  /// The requested time failed one or
  /// more scheduling checks.
  #[error("appointment rejected")]
  Rejected(ValidationReport),
  #[error("{0}")]
  Forbidden(String)
}

impl From<ValidationError> for ServiceError {
  fn from(err: ValidationError) -> Self {
    ServiceError::Invalid(err.0)
  }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
