use serde::{Serialize, Serializer};
use std::fmt;

/// An email address that hides its local part in Debug and Display output.
///
/// Serialization still writes the real value, so the wrapper can sit inside
/// response types; it only guards against leaking addresses through
/// `tracing::info!("{}", ...)` style log lines.
#[derive(Clone, PartialEq, Eq)]
pub struct MaskedEmail(pub String);

impl MaskedEmail {
    fn masked(&self) -> String {
        match self.0.split_once('@') {
            Some((local, domain)) => match local.chars().next() {
                Some(first) => format!("{}***@{}", first, domain),
                None => format!("***@{}", domain),
            },
            None if self.0.is_empty() => String::new(),
            None => "********".to_string(),
        }
    }
}

impl From<&str> for MaskedEmail {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for MaskedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaskedEmail({})", self.masked())
    }
}

impl fmt::Display for MaskedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl Serialize for MaskedEmail {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_local_part() {
        let email = MaskedEmail::from("alice@example.com");
        assert_eq!(email.to_string(), "a***@example.com");
        assert_eq!(format!("{:?}", email), "MaskedEmail(a***@example.com)");
    }

    #[test]
    fn test_malformed_values_are_fully_masked() {
        assert_eq!(MaskedEmail::from("not-an-email").to_string(), "********");
        assert_eq!(MaskedEmail::from("@example.com").to_string(), "***@example.com");
        assert_eq!(MaskedEmail::from("").to_string(), "");
    }

    #[test]
    fn test_serialization_keeps_real_value() {
        let json = serde_json::to_string(&MaskedEmail::from("bob@x.com")).unwrap();
        assert_eq!(json, "\"bob@x.com\"");
    }
}
