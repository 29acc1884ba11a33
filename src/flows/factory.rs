//! Canonical authorize URLs, request parameters, and signed state payloads.

// crates.io
use base64::{
	Engine as _, alphabet,
	engine::{
		DecodePaddingMode,
		general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD},
	},
};
// self
use crate::{
	_prelude::*,
	crypto,
	flows::params::{AuthorizeRequestParams, NON_TRANSIENT_PARAMS, TRANSIENT_PARAMS},
	url_key::{UrlEqualityMode, UrlKey},
};

const STATE_DECODER: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Payload carried inside the opaque `state` value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequestState {
	/// Canonical authorize URL.
	pub authorize_url: String,
	/// Canonical callback URL.
	pub callback_url: String,
	/// Hex HMAC-SHA256 over `"{authorize_url}|{callback_url}"`.
	pub fingerprint: String,
}
impl TokenRequestState {
	/// Encodes the payload as URL-safe base64 JSON.
	pub fn encode(&self) -> Result<String> {
		let raw = serde_json::to_vec(self).map_err(|e| Error::malformed(format!("state: {e}")))?;

		Ok(URL_SAFE_NO_PAD.encode(raw))
	}

	/// Decodes a `state` value; any decoding or parsing failure is a [`Error::BadCallback`].
	pub fn decode(raw: &str) -> Result<Self> {
		let bytes = STATE_DECODER
			.decode(raw.trim())
			.map_err(|e| Error::bad_callback(format!("state is not valid base64: {e}")))?;
		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| Error::bad_callback(format!("state payload is malformed: {e}")))
	}
}

/// Stateless helpers turning untrusted URLs into canonical flow material.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthorizationFlowFactory;
impl AuthorizationFlowFactory {
	/// Splits the canonical authorize URL into named parameters and extras, replacing every
	/// transient parameter with `state`.
	pub fn create_params(authorize_url: &UrlKey, state: &str) -> Result<AuthorizeRequestParams> {
		let mut named = BTreeMap::new();
		let mut extra = BTreeMap::new();

		for (name, values) in authorize_url.params() {
			let Some(first) = values.into_iter().next() else {
				continue;
			};

			if TRANSIENT_PARAMS.contains(&name.as_str()) {
				continue;
			}
			if NON_TRANSIENT_PARAMS.contains(&name.as_str()) {
				named.insert(name, first);
			} else {
				extra.insert(name, first);
			}
		}

		let mut field = |name: &str| named.remove(name).unwrap_or_default();
		let mut builder = AuthorizeRequestParams::builder(
			field("client_id"),
			field("scope"),
			field("redirect_uri"),
			field("response_type"),
		)
		.state(state);

		if let Some(mode) = named.remove("response_mode") {
			builder = builder.response_mode(Some(mode));
		}
		if let Some(method) = named.remove("code_challenge_method") {
			builder = builder.challenge_method(method);
		}
		for (name, value) in extra {
			builder = builder.extra(name, value);
		}

		builder.build()
	}

	/// Parses `raw` under the authorize equality mode and strips transient parameters.
	pub fn create_authorize_url(raw: &str) -> Result<UrlKey> {
		Ok(UrlKey::parse(raw, UrlEqualityMode::authorize())?.without_params(&TRANSIENT_PARAMS))
	}

	/// Hex HMAC-SHA256 of `"{authorize_url}|{callback_url}"`.
	pub fn compute_fingerprint(
		authorize_url: &UrlKey,
		callback_url: &UrlKey,
		secret: &str,
	) -> String {
		crypto::compute_fingerprint(
			secret.as_bytes(),
			&fingerprint_message(authorize_url, callback_url),
		)
	}

	/// Constant-time check of `fingerprint` against the pair.
	pub fn verify_fingerprint(
		authorize_url: &UrlKey,
		callback_url: &UrlKey,
		secret: &str,
		fingerprint: &str,
	) -> bool {
		crypto::verify_fingerprint(
			secret.as_bytes(),
			&fingerprint_message(authorize_url, callback_url),
			fingerprint,
		)
	}

	/// Builds the opaque `state` for the pair.
	pub fn create_state(
		authorize_url: &UrlKey,
		callback_url: &UrlKey,
		secret: &str,
	) -> Result<String> {
		TokenRequestState {
			authorize_url: authorize_url.to_string(),
			callback_url: callback_url.to_string(),
			fingerprint: Self::compute_fingerprint(authorize_url, callback_url, secret),
		}
		.encode()
	}
}

fn fingerprint_message(authorize_url: &UrlKey, callback_url: &UrlKey) -> String {
	format!("{authorize_url}|{callback_url}")
}
