//! Normalized request identifiers

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// The email/phone pair a resolution request is keyed on.
///
/// Values are normalized: email is trimmed and lower-cased, phone is
/// trimmed only. Blank values become `None`. At least one is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifiers {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Identifiers {
    /// Validate and normalize raw request fields.
    ///
    /// `None` means the field was absent from the request; `Some("")` means
    /// it was present but blank.
    pub fn normalize(
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Self, ValidationError> {
        if email.is_none() && phone_number.is_none() {
            return Err(ValidationError::MissingIdentifiers);
        }

        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase);
        let phone_number = phone_number
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        if email.is_none() && phone_number.is_none() {
            return Err(ValidationError::EmptyIdentifiers);
        }

        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        (self.email, self.phone_number)
    }
}
