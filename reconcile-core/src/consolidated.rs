//! Consolidated identity view returned to callers

use crate::ContactId;
use serde::{Deserialize, Serialize};

/// One identity cluster, flattened.
///
/// `primaryContatctId` is spelled the way existing clients expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConsolidatedContact {
    #[serde(rename = "primaryContatctId")]
    #[cfg_attr(feature = "openapi", schema(value_type = i64))]
    pub primary_contact_id: ContactId,
    /// Primary's email first, then every other distinct email in cluster order.
    pub emails: Vec<String>,
    /// Primary's phone first, then every other distinct phone in cluster order.
    #[serde(rename = "phoneNumbers")]
    pub phone_numbers: Vec<String>,
    /// Every non-primary cluster member, ascending.
    #[serde(rename = "secondaryContactIds")]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<i64>))]
    pub secondary_contact_ids: Vec<ContactId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let view = ConsolidatedContact {
            primary_contact_id: ContactId(1),
            emails: vec!["a@x.com".to_string()],
            phone_numbers: vec!["111".to_string()],
            secondary_contact_ids: vec![ContactId(2), ContactId(3)],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "primaryContatctId": 1,
                "emails": ["a@x.com"],
                "phoneNumbers": ["111"],
                "secondaryContactIds": [2, 3]
            })
        );
    }
}
