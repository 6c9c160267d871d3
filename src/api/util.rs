use log::debug;
use reqwest::StatusCode;

use super::DashboardError;

pub fn map_any_err_and_code(e: anyhow::Error) -> (StatusCode, String) {
    debug!("Error: {:#}", e);
    let code = match e.downcast_ref::<DashboardError>() {
        Some(DashboardError::Validation(_)) => StatusCode::BAD_REQUEST,
        Some(DashboardError::Unauthenticated) => StatusCode::UNAUTHORIZED,
        Some(DashboardError::AccessDenied(_)) => StatusCode::FORBIDDEN,
        Some(DashboardError::NotFound(_)) => StatusCode::NOT_FOUND,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, format!("{:#}", e))
}
pub fn map_any_err(e: anyhow::Error) -> String {
    debug!("Error: {:#}", e);
    format!("{:#}", e)
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Context;

    #[test]
    fn status_codes_follow_error_kind() {
        let (code, _) = map_any_err_and_code(DashboardError::Unauthenticated.into());
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        let (code, msg) =
            map_any_err_and_code(DashboardError::Validation("no amount".into()).into());
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(msg.contains("no amount"));
        let (code, _) = map_any_err_and_code(anyhow::anyhow!("db is gone"));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn context_keeps_error_kind() {
        let e: anyhow::Result<()> =
            Err(DashboardError::NotFound("Change 3".into())).context("reviewing change");
        let (code, msg) = map_any_err_and_code(e.unwrap_err());
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(msg.starts_with("reviewing change"));
    }
}
