//! Provider token responses as cached by the proxy.

// crates.io
use serde_json::{Map, Number, Value};
use time::format_description::well_known::Rfc3339;
// self
use crate::{_prelude::*, token::secret::TokenSecret};

/// Lifetime assumed for tokens that report `issued_at` without `expires_in`.
pub const DEFAULT_EXPIRES_IN: i64 = 1500;

/// Timing field as reported by a provider, kept verbatim.
///
/// Epoch seconds (integer, float, or digits in a string) and RFC 3339 strings are understood.
/// Anything else is retained but yields no instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenTimestamp(Value);
impl TokenTimestamp {
	/// Current UTC instant rendered as RFC 3339.
	pub fn now() -> Self {
		Self::at(OffsetDateTime::now_utc())
	}

	/// Renders `instant` as RFC 3339, falling back to epoch seconds.
	pub fn at(instant: OffsetDateTime) -> Self {
		match instant.format(&Rfc3339) {
			Ok(text) => Self(Value::String(text)),
			Err(_) => Self(Value::from(instant.unix_timestamp())),
		}
	}

	/// Value exactly as the provider sent it.
	pub fn raw(&self) -> &Value {
		&self.0
	}

	/// Parsed instant; `None` when the value cannot be interpreted.
	pub fn instant(&self) -> Option<OffsetDateTime> {
		let secs = match &self.0 {
			Value::Number(number) => number_secs(number)?,
			Value::String(text) => {
				let text = text.trim();

				match text_secs(text) {
					Some(secs) => secs,
					None => return OffsetDateTime::parse(text, &Rfc3339).ok(),
				}
			},
			_ => return None,
		};

		OffsetDateTime::from_unix_timestamp(secs).ok()
	}
}
impl From<OffsetDateTime> for TokenTimestamp {
	fn from(instant: OffsetDateTime) -> Self {
		Self::at(instant)
	}
}
impl From<i64> for TokenTimestamp {
	fn from(secs: i64) -> Self {
		Self(Value::from(secs))
	}
}
impl From<&str> for TokenTimestamp {
	fn from(text: &str) -> Self {
		Self(Value::from(text))
	}
}

/// `expires_in` as reported by a provider, kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenLifetime(Value);
impl TokenLifetime {
	/// Value exactly as the provider sent it.
	pub fn raw(&self) -> &Value {
		&self.0
	}

	/// Lifetime in whole seconds; `None` when the value is not numeric.
	pub fn seconds(&self) -> Option<i64> {
		match &self.0 {
			Value::Number(number) => number_secs(number),
			Value::String(text) => text_secs(text.trim()),
			_ => None,
		}
	}
}
impl From<i64> for TokenLifetime {
	fn from(secs: i64) -> Self {
		Self(Value::from(secs))
	}
}
impl From<&str> for TokenLifetime {
	fn from(text: &str) -> Self {
		Self(Value::from(text))
	}
}

/// Token response returned by the identity provider's token endpoint.
///
/// Fields the proxy does not interpret are preserved in [`TokenRecord::extra`] and serialized back
/// unchanged.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the provider (usually `Bearer`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Lifetime relative to `issued_at`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<TokenLifetime>,
	/// Absolute expiry instant.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<TokenTimestamp>,
	/// Instant the provider issued the token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub issued_at: Option<TokenTimestamp>,
	/// Refresh token secret, if issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// OpenID Connect ID token, if issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<TokenSecret>,
	/// Space-delimited granted scope.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Every other field of the provider response.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl TokenRecord {
	/// Creates a record holding only an access token.
	pub fn new(access_token: impl Into<TokenSecret>, token_type: impl Into<String>) -> Self {
		Self {
			access_token: access_token.into(),
			token_type: Some(token_type.into()),
			expires_in: None,
			expires_at: None,
			issued_at: None,
			refresh_token: None,
			id_token: None,
			scope: None,
			extra: Map::new(),
		}
	}

	/// Sets `expires_in` in seconds.
	pub fn with_expires_in(mut self, secs: i64) -> Self {
		self.expires_in = Some(TokenLifetime::from(secs));

		self
	}

	/// Sets `issued_at`.
	pub fn with_issued_at(mut self, issued_at: impl Into<TokenTimestamp>) -> Self {
		self.issued_at = Some(issued_at.into());

		self
	}

	/// Sets `expires_at`.
	pub fn with_expires_at(mut self, expires_at: impl Into<TokenTimestamp>) -> Self {
		self.expires_at = Some(expires_at.into());

		self
	}

	/// `expires_in` in seconds, when present and numeric.
	pub fn expires_in_secs(&self) -> Option<i64> {
		self.expires_in.as_ref()?.seconds()
	}

	/// Fills in the missing half of a relative expiry.
	///
	/// Without `expires_at`, exactly one of `expires_in` / `issued_at` causes the other one to be
	/// synthesized ([`DEFAULT_EXPIRES_IN`] seconds, or `now`). Anything else is left untouched.
	pub fn normalized(mut self, now: OffsetDateTime) -> Self {
		if self.expires_at.is_some() {
			return self;
		}

		match (self.expires_in.is_some(), self.issued_at.is_some()) {
			(true, false) => self.issued_at = Some(TokenTimestamp::at(now)),
			(false, true) => self.expires_in = Some(TokenLifetime::from(DEFAULT_EXPIRES_IN)),
			_ => (),
		}

		self
	}

	/// Absolute expiry derived from `expires_at`, else `issued_at + expires_in`.
	///
	/// `None` when no timing information is available or a field fails to parse.
	pub fn expiry(&self) -> Option<OffsetDateTime> {
		if let Some(expires_at) = &self.expires_at {
			return expires_at.instant();
		}

		let issued_at = self.issued_at.as_ref()?.instant()?;

		issued_at.checked_add(Duration::seconds(self.expires_in_secs()?))
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("expires_at", &self.expires_at)
			.field("issued_at", &self.issued_at)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("scope", &self.scope)
			.field("extra", &self.extra.keys().collect::<Vec<_>>())
			.finish()
	}
}

fn number_secs(number: &Number) -> Option<i64> {
	number.as_i64().or_else(|| float_secs(number.as_f64()?))
}

fn text_secs(text: &str) -> Option<i64> {
	text.parse::<i64>().ok().or_else(|| float_secs(text.parse::<f64>().ok()?))
}

fn float_secs(value: f64) -> Option<i64> {
	value.is_finite().then(|| value.floor() as i64)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn timestamps_accept_epoch_and_rfc3339() {
		let instant = datetime!(2025-01-02 03:04:05 UTC);
		let epoch = instant.unix_timestamp();

		assert_eq!(TokenTimestamp::from(epoch).instant(), Some(instant));
		assert_eq!(TokenTimestamp::from("2025-01-02T03:04:05Z").instant(), Some(instant));
		assert_eq!(TokenTimestamp::from(epoch.to_string().as_str()).instant(), Some(instant));
		assert_eq!(TokenTimestamp::from("yesterday").instant(), None);
		assert_eq!(TokenTimestamp::at(instant).instant(), Some(instant));
	}

	#[test]
	fn fractional_epoch_timestamps_are_floored() {
		let instant = datetime!(2023-11-14 22:13:20 UTC);
		let float: TokenTimestamp =
			serde_json::from_str("1700000000.5").expect("Float timestamp should deserialize.");
		let text = TokenTimestamp::from("1700000000.5");

		assert_eq!(float.instant(), Some(instant));
		assert_eq!(text.instant(), Some(instant));
		assert_eq!(float.raw(), &serde_json::json!(1_700_000_000.5));
	}

	#[test]
	fn lifetimes_accept_numbers_and_numeric_text() {
		let float: TokenLifetime =
			serde_json::from_str("3600.0").expect("Float lifetime should deserialize.");

		assert_eq!(TokenLifetime::from(3600_i64).seconds(), Some(3600));
		assert_eq!(TokenLifetime::from(" 3600 ").seconds(), Some(3600));
		assert_eq!(float.seconds(), Some(3600));
		assert_eq!(TokenLifetime::from("an hour").seconds(), None);
	}

	#[test]
	fn normalization_synthesizes_missing_timing_half() {
		let now = datetime!(2025-01-02 03:04:05 UTC);
		let only_expires_in = TokenRecord::new("a", "Bearer").with_expires_in(60).normalized(now);
		let only_issued_at = TokenRecord::new("a", "Bearer").with_issued_at(now).normalized(now);
		let neither = TokenRecord::new("a", "Bearer").normalized(now);

		assert_eq!(only_expires_in.issued_at.and_then(|t| t.instant()), Some(now));
		assert_eq!(only_issued_at.expires_in_secs(), Some(DEFAULT_EXPIRES_IN));
		assert!(neither.expires_in.is_none() && neither.issued_at.is_none());
	}

	#[test]
	fn normalization_leaves_absolute_expiry_alone() {
		let now = datetime!(2025-01-02 03:04:05 UTC);
		let record =
			TokenRecord::new("a", "Bearer").with_expires_at(now).with_expires_in(5).normalized(now);

		assert!(record.issued_at.is_none());
		assert_eq!(record.expiry(), Some(now));
	}

	#[test]
	fn garbled_lifetime_never_yields_an_expiry() {
		let now = datetime!(2025-01-02 03:04:05 UTC);
		let mut record = TokenRecord::new("a", "Bearer");

		record.expires_in = Some(TokenLifetime::from("soon"));

		let record = record.normalized(now);

		assert!(record.issued_at.is_some());
		assert_eq!(record.expiry(), None);
	}

	#[test]
	fn record_debug_redacts_secrets() {
		let mut record = TokenRecord::new("access-secret", "Bearer");

		record.refresh_token = Some(TokenSecret::new("refresh-secret"));
		record.extra.insert("session_state".into(), "session-secret".into());

		let rendered = format!("{record:?}");

		assert!(!rendered.contains("access-secret"));
		assert!(!rendered.contains("refresh-secret"));
		assert!(!rendered.contains("session-secret"));
	}

	#[test]
	fn record_deserializes_provider_payload() {
		let record: TokenRecord = serde_json::from_str(
			r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,"issued_at":1700000000,"scope":"openid"}"#,
		)
		.expect("Provider payload should deserialize.");

		assert_eq!(record.access_token.expose(), "at");
		assert_eq!(record.expires_in_secs(), Some(3600));
		assert_eq!(record.issued_at, Some(TokenTimestamp::from(1_700_000_000_i64)));
		assert!(record.extra.is_empty());
	}

	#[test]
	fn unusual_payloads_still_deserialize() {
		let record: TokenRecord = serde_json::from_str(
			r#"{"access_token":"at","expires_in":"3600","issued_at":1700000000.5}"#,
		)
		.expect("Loosely typed payload should deserialize.");

		assert!(record.token_type.is_none());
		assert_eq!(record.expires_in_secs(), Some(3600));
		assert_eq!(record.expiry(), Some(datetime!(2023-11-14 23:13:20 UTC)));
	}

	#[test]
	fn unknown_fields_round_trip() {
		let raw = serde_json::json!({
			"access_token": "at",
			"token_type": "Bearer",
			"expires_in": 3599,
			"ext_expires_in": 3599,
			"not-before-policy": 0,
			"session_state": "abc",
		});
		let record: TokenRecord =
			serde_json::from_value(raw.clone()).expect("Provider payload should deserialize.");

		assert_eq!(record.extra.len(), 3);
		assert_eq!(serde_json::to_value(&record).expect("Record should serialize."), raw);
	}
}
