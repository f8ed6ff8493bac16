//! Provider account username.

use serde::{Deserialize, Serialize};

/// A provider account username, normalized for comparison.
///
/// Providers treat usernames case-insensitively and staff routinely paste
/// them with stray whitespace, so two rows whose usernames differ only in
/// case or padding are the same account. The original spelling is kept for
/// display; equality and hashing use the normalized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AccountUsername {
    display: String,
    normalized: String,
}

impl AccountUsername {
    /// Create a username from raw input.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let display = raw.trim().to_string();
        let normalized = display.to_lowercase();
        Self {
            display,
            normalized,
        }
    }

    /// The trimmed username as entered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// The trimmed, lowercased form used for matching.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whether this username is empty after trimming.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Whether a raw stored username refers to this account.
    #[must_use]
    pub fn matches(&self, raw: &str) -> bool {
        raw.trim().to_lowercase() == self.normalized
    }
}

impl PartialEq for AccountUsername {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for AccountUsername {}

impl std::hash::Hash for AccountUsername {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl std::fmt::Display for AccountUsername {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<String> for AccountUsername {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for AccountUsername {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<AccountUsername> for String {
    fn from(username: AccountUsername) -> Self {
        username.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_normalization() {
        let username = AccountUsername::new("  Ali  ");
        assert_eq!(username.as_str(), "Ali");
        assert_eq!(username.normalized(), "ali");
    }

    #[test]
    fn test_usernames_compare_case_insensitively() {
        assert_eq!(AccountUsername::new("ALI"), AccountUsername::new(" ali"));
        assert_ne!(AccountUsername::new("ali"), AccountUsername::new("ali2"));
    }

    #[test]
    fn test_matches_raw_stored_value() {
        let username = AccountUsername::new("ali");
        assert!(username.matches(" Ali "));
        assert!(!username.matches("alia"));
    }

    #[test]
    fn test_blank_username_is_empty() {
        assert!(AccountUsername::new("   ").is_empty());
    }
}
