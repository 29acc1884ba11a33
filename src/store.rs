//! Concurrent token cache keyed by canonical authorize URLs.

// self
use crate::{
	_prelude::*,
	token::{TokenRecord, TokenValidator},
	url_key::UrlKey,
};

/// Expiry buffer applied by [`TokenRegistry::read_valid_token`] when none is configured.
pub const DEFAULT_BUFFER: StdDuration = StdDuration::from_secs(10);

type TokenMap = Arc<RwLock<HashMap<UrlKey, TokenRecord>>>;

/// Thread-safe map from canonical authorize-URL identity to the last exchanged token.
///
/// Entries are only replaced, never evicted; stale records simply fail validation.
#[derive(Clone, Debug, Default)]
pub struct TokenRegistry(TokenMap);
impl TokenRegistry {
	/// Cached record for `key` regardless of expiry.
	pub fn get(&self, key: &UrlKey) -> Option<TokenRecord> {
		self.0.read().get(key).cloned()
	}

	/// Stores or replaces the record for `key`.
	pub fn set(&self, key: UrlKey, token: TokenRecord) {
		self.0.write().insert(key, token);
	}

	/// Cached record for `key` if it stays valid beyond `buffer`.
	pub fn read_valid_token(&self, key: &UrlKey, buffer: StdDuration) -> Option<TokenRecord> {
		self.read_valid_token_at(key, buffer, OffsetDateTime::now_utc())
	}

	/// [`TokenRegistry::read_valid_token`] evaluated at a fixed instant.
	pub fn read_valid_token_at(
		&self,
		key: &UrlKey,
		buffer: StdDuration,
		now: OffsetDateTime,
	) -> Option<TokenRecord> {
		let guard = self.0.read();
		let token = guard.get(key)?;

		TokenValidator::is_valid(token, buffer, now).then(|| token.clone())
	}

	/// Number of cached records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::url_key::UrlEqualityMode;

	fn authorize_key(raw: &str) -> UrlKey {
		UrlKey::parse(raw, UrlEqualityMode::authorize()).expect("Authorize URL fixture should parse.")
	}

	#[test]
	fn lookups_collapse_transient_params() {
		let registry = TokenRegistry::default();
		let now = datetime!(2025-06-01 12:00:00 UTC);
		let token = TokenRecord::new("at", "Bearer").with_issued_at(now).with_expires_in(3600);

		registry.set(authorize_key("https://idp.example/authorize?client_id=abc&state=1"), token);

		let same = authorize_key("https://idp.example/authorize?client_id=abc&state=2&nonce=n");
		let other = authorize_key("https://idp.example/authorize?client_id=xyz");

		assert!(registry.read_valid_token_at(&same, DEFAULT_BUFFER, now).is_some());
		assert!(registry.read_valid_token_at(&other, DEFAULT_BUFFER, now).is_none());
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn stale_records_stay_cached_but_are_not_served() {
		let registry = TokenRegistry::default();
		let key = authorize_key("https://idp.example/authorize?client_id=abc");
		let now = datetime!(2025-06-01 12:00:00 UTC);

		registry.set(key.clone(), TokenRecord::new("old", "Bearer").with_expires_at(now));

		assert!(registry.read_valid_token_at(&key, DEFAULT_BUFFER, now).is_none());
		assert!(registry.get(&key).is_some());

		registry.set(
			key.clone(),
			TokenRecord::new("new", "Bearer").with_expires_at(now + Duration::hours(1)),
		);

		let served = registry
			.read_valid_token_at(&key, DEFAULT_BUFFER, now)
			.expect("Replacement token should be served.");

		assert_eq!(served.access_token.expose(), "new");
	}
}
