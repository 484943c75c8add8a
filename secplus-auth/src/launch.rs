use std::borrow::Cow;

use url::Url;

use secplus_api::endpoints::install::CreateInstall;

use crate::error::AuthError;

/// Query parameters carried by an install or activation link. Unknown
/// parameters are ignored; empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchQuery {
    pub email: Option<String>,
    pub name: Option<String>,
    pub wh_id: Option<String>,
    pub inst: Option<String>,
    pub code: Option<String>,
    pub redirect_to: Option<String>,
}

impl LaunchQuery {
    pub fn parse(url: &str) -> Result<Self, AuthError> {
        let parsed =
            Url::parse(url).map_err(|e| AuthError::LaunchUrl(format!("{}: {}", url, e)))?;
        Ok(Self::from_pairs(parsed.query_pairs()))
    }

    pub fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            let value = value.into_owned();
            match key.as_ref() {
                "email" => query.email = Some(value),
                "name" => query.name = Some(value),
                "wh_id" => query.wh_id = Some(value),
                "inst" => query.inst = Some(value),
                "code" => query.code = Some(value),
                "redirect_to" => query.redirect_to = Some(value),
                _ => {}
            }
        }
        query
    }

    /// Build the install request this link describes, if it carries the
    /// required email.
    pub fn to_create_install(&self) -> Option<CreateInstall> {
        let mut request = CreateInstall::new(self.email.clone()?);
        if let Some(name) = &self.name {
            request = request.name(name);
        }
        if let Some(wh_id) = &self.wh_id {
            request = request.wh_id(wh_id);
        }
        if let Some(inst) = &self.inst {
            request = request.inst(inst);
        }
        if let Some(redirect_to) = &self.redirect_to {
            request = request.redirect_to(redirect_to);
        }
        Some(request)
    }
}
