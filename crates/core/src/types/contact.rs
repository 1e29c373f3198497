//! Customer contact and shipping snapshots.
//!
//! Orders copy the contact details and address given at checkout. They are
//! never a live reference to an account, so later profile edits do not
//! rewrite order history.

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing an [`Email`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("email is required")]
    Empty,
    #[error("email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("email must look like name@example.com")]
    Malformed,
}

/// A normalized email address.
///
/// Surrounding whitespace is trimmed and the address is lower-cased so the
/// same customer always maps to the same key (custom-order lookups, account
/// order history).
///
/// ```
/// use atelier_core::Email;
///
/// let email = Email::parse("  Maker@Example.COM ").unwrap();
/// assert_eq!(email.as_str(), "maker@example.com");
/// assert!(Email::parse("no-at-symbol").is_err());
/// assert!(Email::parse("user@localhost").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse and normalize an email address.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if the input is empty, too long, or lacks a
    /// non-empty local part and a dotted domain.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EmailError::Empty);
        }
        if trimmed.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        let (local, domain) = trimmed.rsplit_once('@').ok_or(EmailError::Malformed)?;
        let domain_ok = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains("..");
        if local.is_empty() || !domain_ok || trimmed.chars().any(char::is_whitespace) {
            return Err(EmailError::Malformed);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// Contact details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContact {
    pub email: Email,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerContact {
    /// Maximum length of the name and phone fields.
    pub const MAX_FIELD_LENGTH: usize = 120;

    /// Trim fields and check required ones are present.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn normalized(self) -> Result<Self, &'static str> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err("name is required");
        }
        if name.chars().count() > Self::MAX_FIELD_LENGTH {
            return Err("name is too long");
        }
        let phone = self
            .phone
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty());
        if phone
            .as_deref()
            .is_some_and(|p| p.chars().count() > Self::MAX_FIELD_LENGTH)
        {
            return Err("phone is too long");
        }
        Ok(Self {
            email: self.email,
            name,
            phone,
        })
    }
}

/// Shipping address as collected by the payment provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl ShippingAddress {
    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [
            &self.name,
            &self.line1,
            &self.line2,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .all(|field| field.is_none())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalizes() {
        let email = Email::parse(" Buyer@Shop.Example ").unwrap();
        assert_eq!(email.as_str(), "buyer@shop.example");
    }

    #[test]
    fn test_email_rejects_malformed() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("buyer"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("@shop.example"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("buyer@shop"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("buyer@.shop"), Err(EmailError::Malformed));
        assert_eq!(Email::parse("bu yer@shop.example"), Err(EmailError::Malformed));
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(Email::parse(&long), Err(EmailError::TooLong { .. })));
    }

    #[test]
    fn test_email_deserialize_validates() {
        let ok: Email = serde_json::from_str(r#""A@B.co""#).unwrap();
        assert_eq!(ok.as_str(), "a@b.co");
        assert!(serde_json::from_str::<Email>(r#""nope""#).is_err());
    }

    #[test]
    fn test_contact_normalized() {
        let contact = CustomerContact {
            email: Email::parse("a@b.co").unwrap(),
            name: "  Ada  ".to_owned(),
            phone: Some("   ".to_owned()),
        }
        .normalized()
        .unwrap();
        assert_eq!(contact.name, "Ada");
        assert!(contact.phone.is_none());

        let missing = CustomerContact {
            email: Email::parse("a@b.co").unwrap(),
            name: String::new(),
            phone: None,
        };
        assert!(missing.normalized().is_err());
    }

    #[test]
    fn test_shipping_address_is_empty() {
        assert!(ShippingAddress::default().is_empty());
        let address = ShippingAddress {
            city: Some("Lisbon".to_owned()),
            ..ShippingAddress::default()
        };
        assert!(!address.is_empty());
    }
}
