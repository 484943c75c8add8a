use serde::{Deserialize, Serialize};

// Requests

/// Query payload for the `create-install` flow of the generate-link
/// function. The function is query-driven; optional fields are simply
/// omitted from the query string.
#[derive(Debug, Clone, Serialize)]
pub struct CreateInstall {
    flow: &'static str,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wh_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl CreateInstall {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            flow: "create-install",
            email: email.into(),
            name: None,
            wh_id: None,
            inst: None,
            redirect_to: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn wh_id(mut self, wh_id: impl Into<String>) -> Self {
        self.wh_id = Some(wh_id.into());
        self
    }

    pub fn inst(mut self, inst: impl Into<String>) -> Self {
        self.inst = Some(inst.into());
        self
    }

    pub fn redirect_to(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = Some(redirect_to.into());
        self
    }
}

/// Query payload for the `exchange-install` flow. `device_info` is a
/// JSON-serialized device descriptor the backend keeps for bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeInstall {
    flow: &'static str,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
}

impl ExchangeInstall {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            flow: "exchange-install",
            code: code.into(),
            device_info: None,
        }
    }

    pub fn device_info(mut self, device_info: impl Into<String>) -> Self {
        self.device_info = Some(device_info.into());
        self
    }
}

// Responses

#[derive(Debug, Deserialize)]
pub(crate) struct CreateInstallRaw {
    #[serde(default)]
    pub ok: bool,
    pub code: Option<String>,
    pub email: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeInstallRaw {
    #[serde(default)]
    pub ok: bool,
    pub email: Option<String>,
    pub email_otp: Option<String>,
    pub error: Option<String>,
}

/// A freshly minted single-use install code, ready to be pinned to the
/// start URL and ferried through storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInstall {
    pub code: String,
    pub email: String,
}

/// The one-time login grant obtained by redeeming an install code. The
/// `email_otp` must still be redeemed through the standard OTP
/// verification call to become a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeGrant {
    pub email: String,
    pub email_otp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_install_query_omits_absent_fields() {
        let req = CreateInstall::new("doc@clinic.example").wh_id("wh-9");
        let query = serde_urlencoded_like(&req);
        assert!(query.contains("flow=create-install"));
        assert!(query.contains("email=doc%40clinic.example"));
        assert!(query.contains("wh_id=wh-9"));
        assert!(!query.contains("name="));
        assert!(!query.contains("redirect_to="));
    }

    #[test]
    fn exchange_raw_parses_success_shape() {
        let raw: ExchangeInstallRaw = serde_json::from_str(
            r#"{"ok":true,"email":"doc@clinic.example","email_otp":"123456"}"#,
        )
        .unwrap();
        assert!(raw.ok);
        assert_eq!(raw.email_otp.as_deref(), Some("123456"));
    }

    #[test]
    fn exchange_raw_parses_error_shape() {
        let raw: ExchangeInstallRaw =
            serde_json::from_str(r#"{"ok":false,"error":"code already used"}"#).unwrap();
        assert!(!raw.ok);
        assert_eq!(raw.error.as_deref(), Some("code already used"));
    }

    fn serde_urlencoded_like<T: serde::Serialize>(value: &T) -> String {
        // reqwest uses serde_urlencoded under the hood for `.query()`;
        // json round-trip is close enough to assert field presence.
        let json = serde_json::to_value(value).unwrap();
        json.as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| {
                let v = v.as_str().unwrap_or_default().replace('@', "%40");
                format!("{}={}", k, v)
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}
