//! Payload types carried by user-initiated events: redacted secrets, typed
//! identifiers, mutation drafts and the client-side validation errors they
//! can raise.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

pub const CASE_ID_PREFIX: char = 'A';
pub const CASE_ID_DIGITS: usize = 22;

// --- Secret wrapper: redacts Debug, zeroizes on Drop ---

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(CaseId);
typed_id!(Username);

impl CaseId {
    /// Accepts exactly `A` followed by 22 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.strip_prefix(CASE_ID_PREFIX) {
            Some(digits)
                if digits.len() == CASE_ID_DIGITS && digits.bytes().all(|b| b.is_ascii_digit()) =>
            {
                Ok(Self(raw.to_owned()))
            }
            _ => Err(ValidationError::Syntax {
                field: "case_id",
                reason: format!("expected '{CASE_ID_PREFIX}' followed by {CASE_ID_DIGITS} digits"),
            }),
        }
    }
}

/// Server-assigned account identifier.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("required field '{field}' is empty")]
    EmptyInput { field: &'static str },
    #[error("'{field}' is malformed: {reason}")]
    Syntax { field: &'static str, reason: String },
    #[error("identifier '{0}' already exists")]
    RepeatedId(String),
    #[error("no record with identifier '{0}'")]
    MissingRecord(String),
}

impl ValidationError {
    pub fn syntax(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Syntax {
            field,
            reason: reason.into(),
        }
    }
}

/// Rejects the first empty value in declaration order.
pub fn require_non_empty(fields: &[(&'static str, &str)]) -> Result<(), ValidationError> {
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((field, _)) => Err(ValidationError::EmptyInput { field }),
        None => Ok(()),
    }
}

// --- Drafts ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseDraft {
    pub case_id: String,
    pub case_name: String,
}

impl CaseDraft {
    pub fn new(case_id: impl Into<String>, case_name: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            case_name: case_name.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserDraft {
    pub username: String,
    pub password: Secret,
    pub confirm_password: Secret,
}

impl UserDraft {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password),
            confirm_password: Secret::new(confirm_password),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: Secret,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty(&[
            ("username", self.username.as_str()),
            ("password", self.password.expose()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn secret_debug_is_redacted() {
        let s = Secret::new("super_secret");
        assert_eq!(format!("{s:?}"), "[REDACTED]");
    }

    #[test]
    fn secret_serializes_as_plain_string() {
        let s = Secret::new("pw");
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"pw\"");
    }

    #[test]
    fn user_draft_debug_hides_passwords() {
        let draft = UserDraft::new("alice", "hunter2", "hunter2");
        let printed = format!("{draft:?}");
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn case_id_accepts_exact_pattern() {
        assert!(CaseId::parse("A0000000000000000000001").is_ok());
        assert!(CaseId::parse("A1234567890123456789012").is_ok());
    }

    #[test]
    fn case_id_rejects_wrong_length() {
        assert!(CaseId::parse("A000000000000000000001").is_err());
        assert!(CaseId::parse("A00000000000000000000001").is_err());
        assert!(CaseId::parse("A").is_err());
    }

    #[test]
    fn case_id_rejects_wrong_prefix_or_digits() {
        assert!(CaseId::parse("a0000000000000000000001").is_err());
        assert!(CaseId::parse("B0000000000000000000001").is_err());
        assert!(CaseId::parse("A000000000000000000000x").is_err());
        assert!(CaseId::parse(" A0000000000000000000001").is_err());
        // Non-ASCII digits are not accepted.
        assert!(CaseId::parse("A000000000000000000000٣").is_err());
    }

    fn matches_case_id_shape(raw: &str) -> bool {
        raw.len() == 23 && raw.starts_with('A') && raw[1..].bytes().all(|b| b.is_ascii_digit())
    }

    proptest! {
        #[test]
        fn prop_case_id_accepted_iff_shape_matches(raw in "\\PC{0,30}") {
            prop_assert_eq!(CaseId::parse(&raw).is_ok(), matches_case_id_shape(&raw));
        }

        #[test]
        fn prop_case_id_near_misses(raw in "[Aa ]?[0-9x٣]{20,24}") {
            prop_assert_eq!(CaseId::parse(&raw).is_ok(), matches_case_id_shape(&raw));
        }

        #[test]
        fn prop_well_formed_case_ids_round_trip(raw in "A[0-9]{22}") {
            let id = CaseId::parse(&raw);
            prop_assert!(id.is_ok());
            prop_assert_eq!(id.map(|id| id.to_string()).ok(), Some(raw));
        }
    }

    #[test]
    fn require_non_empty_reports_first_empty_field() {
        let result = require_non_empty(&[("a", "x"), ("b", ""), ("c", "")]);
        assert_eq!(result, Err(ValidationError::EmptyInput { field: "b" }));
        assert!(require_non_empty(&[("a", "x")]).is_ok());
    }

    #[test]
    fn login_form_requires_both_fields() {
        assert!(LoginForm::new("admin", "pw").validate().is_ok());
        assert_matches::assert_matches!(
            LoginForm::new("", "pw").validate(),
            Err(ValidationError::EmptyInput { field: "username" })
        );
        assert_matches::assert_matches!(
            LoginForm::new("admin", "").validate(),
            Err(ValidationError::EmptyInput { field: "password" })
        );
    }

    #[test]
    fn user_id_displays_as_number() {
        assert_eq!(UserId(42).to_string(), "42");
        assert_eq!(serde_json::to_string(&UserId(7)).unwrap(), "7");
    }
}
