//! Expiry-aware validity checks for cached tokens.

// self
use crate::{_prelude::*, token::record::TokenRecord};

/// Decides whether a cached [`TokenRecord`] may still be handed out.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenValidator;
impl TokenValidator {
	/// Returns `true` when `token` carries an access token and stays valid past `now + buffer`.
	///
	/// Tokens without computable expiry are never valid.
	pub fn is_valid(token: &TokenRecord, buffer: StdDuration, now: OffsetDateTime) -> bool {
		if token.access_token.is_empty() {
			return false;
		}

		let Some(expiry) = token.expiry() else {
			return false;
		};
		let Ok(buffer) = Duration::try_from(buffer) else {
			return false;
		};

		now.checked_add(buffer).is_some_and(|horizon| horizon < expiry)
	}

	/// [`TokenValidator::is_valid`] against the current UTC clock.
	pub fn is_valid_now(token: &TokenRecord, buffer: StdDuration) -> bool {
		Self::is_valid(token, buffer, OffsetDateTime::now_utc())
	}
}
