//! Contact row and its link precedence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a contact row (database `BIGSERIAL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct ContactId(pub i64);

impl ContactId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ContactId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// ============================================================================
// LINK PRECEDENCE
// ============================================================================

/// Whether a contact is the canonical record of its cluster or subsumed into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, LinkPrecedenceParseError> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(LinkPrecedence::Primary),
            "secondary" => Ok(LinkPrecedence::Secondary),
            _ => Err(LinkPrecedenceParseError(s.to_string())),
        }
    }
}

impl fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for LinkPrecedence {
    type Err = LinkPrecedenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid link precedence string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPrecedenceParseError(pub String);

impl fmt::Display for LinkPrecedenceParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid link precedence: {}", self.0)
    }
}

impl std::error::Error for LinkPrecedenceParseError {}

// ============================================================================
// CONTACT
// ============================================================================

/// A single contact row.
///
/// A live primary has `linked_id == None`; a live secondary has
/// `linked_id == Some(primary)` pointing directly at its cluster's primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The primary this row belongs to: itself for a primary, its link otherwise.
    ///
    /// Returns `None` only for a secondary with no link, which is corrupt data.
    pub fn cluster_root(&self) -> Option<ContactId> {
        match self.link_precedence {
            LinkPrecedence::Primary => Some(self.id),
            LinkPrecedence::Secondary => self.linked_id,
        }
    }

    /// Whether this row carries exactly the given (email, phone) pair.
    pub fn has_pair(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
        self.email.as_deref() == email && self.phone_number.as_deref() == phone_number
    }

    /// Whether this row shares at least one non-null identifier with the pair.
    pub fn shares_identifier(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
        let email_hit = email.is_some() && self.email.as_deref() == email;
        let phone_hit = phone_number.is_some() && self.phone_number.as_deref() == phone_number;
        email_hit || phone_hit
    }

    /// Age ordering: `created_at` ascending, id as the tie-break.
    pub fn age_cmp(&self, other: &Contact) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort contacts oldest first (`created_at`, then id).
pub fn oldest_first(contacts: &mut [Contact]) {
    contacts.sort_by(|a, b| a.age_cmp(b));
}

/// Insert payload for a new contact row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn contact(id: i64, secs: i64, precedence: LinkPrecedence, linked: Option<i64>) -> Contact {
        let ts = Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap();
        Contact {
            id: ContactId(id),
            email: Some(format!("c{}@x.com", id)),
            phone_number: None,
            linked_id: linked.map(ContactId),
            link_precedence: precedence,
            created_at: ts,
            updated_at: ts,
            deleted_at: None,
        }
    }

    #[test]
    fn test_link_precedence_db_roundtrip() {
        assert_eq!(LinkPrecedence::from_db_str("primary"), Ok(LinkPrecedence::Primary));
        assert_eq!(LinkPrecedence::from_db_str("Secondary"), Ok(LinkPrecedence::Secondary));
        assert!(LinkPrecedence::from_db_str("tertiary").is_err());
        assert_eq!(LinkPrecedence::Secondary.to_string(), "secondary");
    }

    #[test]
    fn test_cluster_root() {
        let p = contact(1, 0, LinkPrecedence::Primary, None);
        let s = contact(2, 1, LinkPrecedence::Secondary, Some(1));
        let broken = contact(3, 2, LinkPrecedence::Secondary, None);
        assert_eq!(p.cluster_root(), Some(ContactId(1)));
        assert_eq!(s.cluster_root(), Some(ContactId(1)));
        assert_eq!(broken.cluster_root(), None);
    }

    #[test]
    fn test_oldest_first_breaks_ties_by_id() {
        let mut rows = vec![
            contact(7, 5, LinkPrecedence::Primary, None),
            contact(3, 5, LinkPrecedence::Primary, None),
            contact(9, 1, LinkPrecedence::Primary, None),
        ];
        oldest_first(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![9, 3, 7]);
    }

    #[test]
    fn test_pair_and_shared_identifier() {
        let mut c = contact(1, 0, LinkPrecedence::Primary, None);
        c.phone_number = Some("111".to_string());
        assert!(c.has_pair(Some("c1@x.com"), Some("111")));
        assert!(!c.has_pair(Some("c1@x.com"), None));
        assert!(c.shares_identifier(None, Some("111")));
        assert!(!c.shares_identifier(None, None));
        assert!(!c.shares_identifier(Some("other@x.com"), Some("222")));
    }

    #[test]
    fn test_contact_serializes_camel_case() {
        let c = contact(4, 0, LinkPrecedence::Secondary, Some(1));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["linkPrecedence"], "secondary");
        assert_eq!(json["linkedId"], 1);
        assert_eq!(json["id"], 4);
    }
}
