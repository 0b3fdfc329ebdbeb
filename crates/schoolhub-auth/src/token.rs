//! Opaque session tokens.

use rand::Rng;

/// Prefix that marks a SchoolHub session token.
pub const TOKEN_PREFIX: &str = "sh_";

/// Mints a new token: 256 random bits, hex-encoded, with [`TOKEN_PREFIX`].
///
/// `sh_{64 hex characters}`, 67 characters total.
pub fn mint_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

/// Cheap shape check, used to reject garbage before taking any lock.
pub fn is_well_formed(token: &str) -> bool {
    token
        .strip_prefix(TOKEN_PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_format() {
        let token = mint_token();
        assert_eq!(token.len(), 67);
        assert!(token.starts_with(TOKEN_PREFIX));
        assert!(is_well_formed(&token));
        assert_ne!(token, mint_token());
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("sh_abc"));
        assert!(!is_well_formed(&format!("xx_{}", "a".repeat(64))));
        assert!(!is_well_formed(&format!("sh_{}", "g".repeat(64))));
    }
}
