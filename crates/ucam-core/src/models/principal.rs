//! Acting principal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Email of the user performing an operation. Identity is established by
/// the platform in front of UCAM; this is only carried for attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(String);

impl Principal {
    pub const UNKNOWN: &'static str = "unknown";

    /// Blank input maps to [`Principal::UNKNOWN`].
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        let trimmed = email.trim();
        if trimmed.is_empty() {
            Self(Self::UNKNOWN.into())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_email_is_unknown() {
        assert!(Principal::new("  ").is_unknown());
        assert_eq!(Principal::new(" a@b.com ").as_str(), "a@b.com");
    }
}
