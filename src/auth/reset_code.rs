use rand::{rngs::OsRng, RngCore};
use tracing::error;

use crate::auth::error::AuthError;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const RESET_CODE_LEN: usize = 10;

// Largest multiple of 62 that fits in a byte; bytes at or above it are
// discarded so every symbol is equally likely.
const REJECT_FROM: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Generate a single-use password reset code from the OS entropy source.
pub fn generate() -> Result<String, AuthError> {
    let mut code = String::with_capacity(RESET_CODE_LEN);
    let mut buf = [0u8; 32];
    while code.len() < RESET_CODE_LEN {
        OsRng.try_fill_bytes(&mut buf).map_err(|e| {
            error!(error = %e, "entropy source unavailable");
            AuthError::Generation
        })?;
        for b in buf.iter().copied().filter(|b| *b < REJECT_FROM) {
            if code.len() == RESET_CODE_LEN {
                break;
            }
            code.push(ALPHABET[(b as usize) % ALPHABET.len()] as char);
        }
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn code_is_url_safe_and_fixed_length() {
        let code = generate().expect("generate");
        assert_eq!(code.len(), RESET_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn codes_do_not_repeat() {
        let codes: HashSet<String> = (0..500).map(|_| generate().unwrap()).collect();
        assert_eq!(codes.len(), 500);
    }

    #[test]
    fn rejection_bound_is_multiple_of_alphabet() {
        assert_eq!(REJECT_FROM, 248);
    }
}
