pub mod clock;

/// Canonical form of an email address as used for record keys: trimmed
/// and lowercased. Every lookup and every stored key goes through this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
