//! Payload validation helpers
//!
//! Checks for the two shapes request payloads carry most often: entity
//! UUIDs and email addresses.
//!
//! ```rust
//! use groundwork::validate::{is_uuid, valid_email};
//!
//! assert!(is_uuid(&["67e55044-10b1-426f-9247-bb680e5fe0c8"]));
//! assert!(!is_uuid(&["67e55044-10b1-426f-9247-bb680e5fe0c8", "42"]));
//! assert!(valid_email("Ada Lovelace <ada@example.com>"));
//! assert!(!valid_email("ada.example.com"));
//! ```

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

/// Characters allowed in an unquoted local part or domain atom
const ATOM: &str = r"[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+";

/// A bare `local@domain` address, or one wrapped in `<...>` after a display name
static ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let dot_atom = format!(r"{ATOM}(?:\.{ATOM})*");
    let quoted = r#""(?:[^"\\\r\n]|\\.)*""#;
    let addr = format!("(?:{dot_atom}|{quoted})@{dot_atom}");
    let display_name = format!(r#"(?:[^<>"@]|{quoted})*"#);
    Regex::new(&format!("^(?:{addr}|{display_name}<{addr}>)$")).expect("address regex is valid")
});

/// Whether every id is a hyphenated UUID (`8-4-4-4-12` hex digits, any case)
///
/// An empty slice is trivially valid. Simple, braced and URN forms are not
/// accepted.
pub fn is_uuid(ids: &[&str]) -> bool {
    ids.iter().all(|id| id.len() == 36 && Uuid::parse_str(id).is_ok())
}

/// Whether `email` parses as a single mailbox
///
/// Accepts `local@domain` and `Display Name <local@domain>`. The local part
/// may be quoted. The domain needs no top-level label, so `root@localhost`
/// is valid.
pub fn valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && ADDRESS_REGEX.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_uuid_requires_every_id() {
        let a = Uuid::new_v4().to_string();
        let b = Uuid::now_v7().to_string();

        let upper = a.to_uppercase();

        assert!(is_uuid(&[a.as_str()]));
        assert!(is_uuid(&[a.as_str(), b.as_str()]));
        assert!(is_uuid(&[upper.as_str()]));
        assert!(is_uuid(&[]));

        assert!(!is_uuid(&[a.as_str(), ""]));
        assert!(!is_uuid(&[a.as_str(), "usr_42"]));
    }

    #[test]
    fn test_is_uuid_rejects_other_spellings() {
        let id = Uuid::new_v4();

        for other in [
            id.simple().to_string(),
            id.braced().to_string(),
            id.urn().to_string(),
        ] {
            assert!(!is_uuid(&[other.as_str()]), "{other} should be rejected");
        }
        assert!(!is_uuid(&["67e55044-10b1-426f-9247-bb680e5fe0cz"]));
    }

    #[test]
    fn test_valid_email_forms() {
        for email in [
            "ada@example.com",
            "ada.lovelace+news@mail.example.co.uk",
            "root@localhost",
            "  padded@example.com  ",
            "<ada@example.com>",
            "Ada Lovelace <ada@example.com>",
            "\"Lovelace, Ada\" <ada@example.com>",
            "\"ada lovelace\"@example.com",
        ] {
            assert!(valid_email(email), "{email} should be valid");
        }
    }

    #[test]
    fn test_invalid_email_forms() {
        for email in [
            "",
            "   ",
            "ada",
            "ada@",
            "@example.com",
            "ada@@example.com",
            "ada@example..com",
            ".ada@example.com",
            "ada.@example.com",
            "ada lovelace@example.com",
            "Ada <ada@example.com",
            "Ada <ada@example.com> trailing",
            "a@b <ada@example.com>",
            "ada@example.com, bob@example.com",
        ] {
            assert!(!valid_email(email), "{email} should be invalid");
        }
    }
}
