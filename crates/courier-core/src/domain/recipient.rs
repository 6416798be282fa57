use std::fmt;

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// A syntactically valid email address.
///
/// The only way to get one from untrusted input is `Recipient::parse`, so a
/// job's recipient list never holds an unvalidated string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if !EmailAddress::is_valid(trimmed) {
            return Err(ValidationError::InvalidAddress(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Recipient {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a@x.com")]
    #[case("first.last+tag@example.org")]
    #[case("  padded@example.com  ")]
    fn accepts_valid_addresses(#[case] raw: &str) {
        let r = Recipient::parse(raw).unwrap();
        assert_eq!(r.as_str(), raw.trim());
    }

    #[rstest]
    #[case("")]
    #[case("not-an-address")]
    #[case("@x.com")]
    #[case("a@")]
    fn rejects_invalid_addresses(#[case] raw: &str) {
        assert_eq!(
            Recipient::parse(raw),
            Err(ValidationError::InvalidAddress(raw.to_string()))
        );
    }
}
