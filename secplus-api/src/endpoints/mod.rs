pub mod install;
pub mod push;
pub mod session;

use serde::Deserialize;

/// Error envelope the backend uses across its surfaces. The function
/// endpoint answers `{"error": "..."}`, the auth endpoints answer
/// `{"msg": "..."}` or `{"error_description": "..."}` depending on the
/// failure class, so all of them are probed in order.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub msg: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.error)
            .or(self.msg)
            .or(self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_description() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"revoked"}"#)
                .unwrap();
        assert_eq!(body.into_message().unwrap(), "revoked");
    }

    #[test]
    fn error_body_falls_back_to_msg() {
        let body: ErrorBody = serde_json::from_str(r#"{"msg":"Token has expired"}"#).unwrap();
        assert_eq!(body.into_message().unwrap(), "Token has expired");
    }
}
