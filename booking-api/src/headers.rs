use axum::http::{HeaderName, HeaderValue};
use axum_extra::headers::{self, Header};

pub static X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");

/// `X-User-Email`: the authenticated caller, as set by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEmail(pub String);

impl Header for UserEmail {
    fn name() -> &'static HeaderName {
        &X_USER_EMAIL
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = values.next().ok_or_else(headers::Error::invalid)?;
        let email = value.to_str().map_err(|_| headers::Error::invalid())?;
        Ok(UserEmail(email.trim().to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        if let Ok(value) = HeaderValue::from_str(&self.0) {
            values.extend(std::iter::once(value));
        }
    }
}
