//! Classification of a received response status.

use reqwest::StatusCode;

use super::redirect::is_followable_redirect;

/// How the dispatcher proceeds with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Read the body and deliver it.
    Success,
    /// 301/302: follow or fail depending on verb and hop count.
    Redirect,
    /// 401: log out locally and re-authenticate.
    AuthRequired,
    /// Any other status >= 400.
    HttpError,
}

/// Classifies a status code.
#[must_use]
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status == StatusCode::UNAUTHORIZED {
        StatusClass::AuthRequired
    } else if is_followable_redirect(status) {
        StatusClass::Redirect
    } else if status.as_u16() >= 400 {
        StatusClass::HttpError
    } else {
        StatusClass::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify_status(StatusCode::CREATED), StatusClass::Success);
        assert_eq!(classify_status(StatusCode::NO_CONTENT), StatusClass::Success);
        assert_eq!(classify_status(StatusCode::NOT_MODIFIED), StatusClass::Success);
        assert_eq!(
            classify_status(StatusCode::TEMPORARY_REDIRECT),
            StatusClass::Success
        );
        assert_eq!(
            classify_status(StatusCode::MOVED_PERMANENTLY),
            StatusClass::Redirect
        );
        assert_eq!(classify_status(StatusCode::FOUND), StatusClass::Redirect);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            StatusClass::AuthRequired
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::HttpError);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::HttpError);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::HttpError
        );
    }
}
