use rand::{distributions::Uniform, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Length of the code typed at the counter when scanning is unavailable.
pub const MANUAL_CODE_LEN: usize = 5;

/// Uppercase letters and digits without look-alikes (0/O, 1/I/L).
pub const MANUAL_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Bytes of randomness behind a claim token.
const TOKEN_BYTES: usize = 32;

/// Generates the bearer token carried by the QR code: 256 random bits,
/// hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates a short manual code, e.g. `K7MPX`.
pub fn generate_manual_code() -> String {
    let mut rng = rand::thread_rng();
    let pick = Uniform::from(0..MANUAL_CODE_ALPHABET.len());
    (0..MANUAL_CODE_LEN)
        .map(|_| MANUAL_CODE_ALPHABET[rng.sample(pick)] as char)
        .collect()
}

/// Hash stored in place of the token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn is_token(candidate: &str) -> bool {
    candidate.len() == TOKEN_BYTES * 2 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Normalizes what staff typed: trims, uppercases and checks the alphabet.
/// Returns `None` when the input cannot be a manual code.
pub fn normalize_manual_code(input: &str) -> Option<String> {
    let code: String = input
        .trim()
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if code.len() != MANUAL_CODE_LEN {
        return None;
    }
    if !code.bytes().all(|b| MANUAL_CODE_ALPHABET.contains(&b)) {
        return None;
    }
    Some(code)
}
