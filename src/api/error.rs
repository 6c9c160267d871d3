use thiserror::Error;

#[derive(Error, PartialEq, Clone, Debug)]
pub enum DashboardError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Not logged in")]
    Unauthenticated,
    #[error("Access Denied: {0}")]
    AccessDenied(String),
    #[error("{0} doesn't exist")]
    NotFound(String),
}
