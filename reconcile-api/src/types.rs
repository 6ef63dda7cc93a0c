//! Request and response bodies for the identify endpoint.

use reconcile_core::{ConsolidatedContact, Identifiers, ValidationError};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /identify` body.
///
/// The outer `Option` records whether a field was sent at all; the inner
/// one whether it was `null`. The two validation errors depend on that
/// distinction.
///
/// Wrongly typed values are not dropped as if absent: a numeric
/// `phoneNumber` is used as its decimal text, and any other non-string
/// value fails the whole request with `INVALID_INPUT`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default, deserialize_with = "present_string")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub email: Option<Option<String>>,

    /// Accepted as a JSON string or number.
    #[serde(default, deserialize_with = "present_phone")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub phone_number: Option<Option<String>>,
}

impl IdentifyRequest {
    /// Validate and normalize the request into engine identifiers.
    pub fn into_identifiers(self) -> Result<Identifiers, ValidationError> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(ValidationError::MissingIdentifiers);
        }

        let email = self.email.flatten();
        let phone_number = self.phone_number.flatten();
        Identifiers::normalize(email.as_deref(), phone_number.as_deref()).map_err(|err| match err {
            // Fields were sent, but only as nulls.
            ValidationError::MissingIdentifiers => ValidationError::EmptyIdentifiers,
            other => other,
        })
    }
}

fn present_string<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn present_phone<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Some(None)),
        Value::String(s) => Ok(Some(Some(s))),
        Value::Number(n) => Ok(Some(Some(n.to_string()))),
        other => Err(de::Error::custom(format!(
            "phoneNumber must be a string, number or null, found {}",
            other
        ))),
    }
}

/// `POST /identify` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IdentifyResponse {
    pub contact: ConsolidatedContact,
}

impl From<ConsolidatedContact> for IdentifyResponse {
    fn from(contact: ConsolidatedContact) -> Self {
        Self { contact }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> IdentifyRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_absent_and_null_fields_are_distinguished() {
        assert_eq!(parse("{}"), IdentifyRequest::default());

        let request = parse(r#"{"email": null}"#);
        assert_eq!(request.email, Some(None));
        assert_eq!(request.phone_number, None);
    }

    #[test]
    fn test_missing_vs_empty_identifiers() {
        assert_eq!(
            parse("{}").into_identifiers(),
            Err(ValidationError::MissingIdentifiers)
        );
        assert_eq!(
            parse(r#"{"email": null, "phoneNumber": null}"#).into_identifiers(),
            Err(ValidationError::EmptyIdentifiers)
        );
        assert_eq!(
            parse(r#"{"email": "   "}"#).into_identifiers(),
            Err(ValidationError::EmptyIdentifiers)
        );
    }

    #[test]
    fn test_numeric_phone_is_accepted() {
        let ids = parse(r#"{"phoneNumber": 123456}"#).into_identifiers().unwrap();
        assert_eq!(ids.phone_number(), Some("123456"));
        assert_eq!(ids.email(), None);
    }

    #[test]
    fn test_non_string_email_is_rejected() {
        assert!(serde_json::from_str::<IdentifyRequest>(r#"{"email": 42}"#).is_err());
        assert!(serde_json::from_str::<IdentifyRequest>(r#"{"phoneNumber": true}"#).is_err());
    }

    #[test]
    fn test_wrongly_typed_field_is_not_treated_as_absent() {
        let ids = parse(r#"{"email": "a@x.com", "phoneNumber": 123}"#)
            .into_identifiers()
            .unwrap();
        assert_eq!(ids.email(), Some("a@x.com"));
        assert_eq!(ids.phone_number(), Some("123"));

        assert!(
            serde_json::from_str::<IdentifyRequest>(r#"{"email": 42, "phoneNumber": "1"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_response_wire_shape() {
        let response = IdentifyResponse::from(ConsolidatedContact {
            primary_contact_id: reconcile_core::ContactId(1),
            emails: vec!["a@x.com".into()],
            phone_numbers: vec![],
            secondary_contact_ids: vec![],
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["contact"]["primaryContatctId"], 1);
        assert_eq!(json["contact"]["emails"][0], "a@x.com");
        assert!(json["contact"]["phoneNumbers"].as_array().unwrap().is_empty());
        assert!(json["contact"]["secondaryContactIds"].as_array().unwrap().is_empty());
    }
}
