use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[a-z0-9_.]{3,32}$").unwrap();
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Usernames are stored and compared in lowercase.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Returns true if the username is well-formed after normalization
pub fn is_valid_username(username: &str) -> bool {
    USERNAME.is_match(&normalize_username(username))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(&normalize_email(email))
}

/// The exclusive upper bound of a prefix range scan.
/// A username matches `query` when `query <= username < upper_bound`.
pub fn prefix_upper_bound(query: &str) -> String {
    format!("{query}\u{ffff}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn usernames_are_case_insensitive() {
        assert_eq!(normalize_username("  Alice_01 "), "alice_01");
        assert!(is_valid_username("Alice_01"));
    }

    #[test]
    fn rejects_malformed_usernames() {
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("emoji🙂"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email(" Someone@Example.com"));
        assert_eq!(normalize_email(" Someone@Example.com"), "someone@example.com");
        assert!(!is_valid_email("nobody"));
    }

    #[test]
    fn prefix_range() {
        let upper = prefix_upper_bound("jo");

        assert!("john".to_string() < upper);
        assert!("jo".to_string() < upper);
        assert!("jp".to_string() > upper);
    }
}
