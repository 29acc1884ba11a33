//! HMAC fingerprints and CSPRNG-backed secrets.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore};
use ring::hmac;

/// RFC 7636 `unreserved` alphabet used for PKCE verifiers.
pub const UNRESERVED_CHARSET: &[u8] =
	b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Hex-encoded HMAC-SHA256 of `message` keyed by `secret`.
pub fn compute_fingerprint(secret: &[u8], message: &str) -> String {
	let key = hmac::Key::new(hmac::HMAC_SHA256, secret);

	hex::encode(hmac::sign(&key, message.as_bytes()).as_ref())
}

/// Checks a hex fingerprint against a fresh HMAC in constant time.
///
/// Returns `false` for anything that is not valid hex.
pub fn verify_fingerprint(secret: &[u8], message: &str, fingerprint: &str) -> bool {
	let Ok(tag) = hex::decode(fingerprint) else {
		return false;
	};
	let key = hmac::Key::new(hmac::HMAC_SHA256, secret);

	hmac::verify(&key, message.as_bytes(), &tag).is_ok()
}

/// Generates `num_bytes` of CSPRNG output encoded as URL-safe base64 without padding.
pub fn generate_secret_key(num_bytes: usize) -> String {
	let mut bytes = vec![0_u8; num_bytes];

	rand::rng().fill_bytes(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

/// Draws `len` characters uniformly from `charset`.
pub fn random_string(charset: &[u8], len: usize) -> String {
	let mut rng = rand::rng();

	(0..len).map(|_| charset[rng.random_range(0..charset.len())] as char).collect()
}
