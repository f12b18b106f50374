//! Random material for one-time codes and state tokens.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};

/// Characters a one-time code is drawn from. Uppercase only so a code read
/// off a phone screen can be typed back without guessing at case.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const STATE_TOKEN_BYTES: usize = 32;

/// Generate a human-typeable one-time code of `length` characters.
pub fn generate_code(length: usize) -> String {
    let mut rng = thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generate an unguessable, URL-safe state token (256 bits).
pub fn generate_state_token() -> String {
    let mut rng = thread_rng();
    let bytes: Vec<u8> = (0..STATE_TOKEN_BYTES).map(|_| rng.r#gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}
