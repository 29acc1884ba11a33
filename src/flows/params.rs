//! Authorization request parameters and PKCE material.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, crypto, token::TokenSecret};

/// Parameters regenerated for every attempt; they never contribute to flow or token identity.
pub const TRANSIENT_PARAMS: [&str; 3] = ["state", "code_verifier", "code_challenge"];

/// Stable parameters mapped onto named [`AuthorizeRequestParams`] fields.
pub const NON_TRANSIENT_PARAMS: [&str; 6] =
	["client_id", "scope", "redirect_uri", "response_type", "response_mode", "code_challenge_method"];

const PKCE_VERIFIER_LEN: std::ops::RangeInclusive<usize> = 43..=128;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
	/// Challenge equals the verifier.
	Plain,
}
impl PkceMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub const fn as_str(self) -> &'static str {
		match self {
			PkceMethod::S256 => "S256",
			PkceMethod::Plain => "plain",
		}
	}
}
impl FromStr for PkceMethod {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"S256" => Ok(Self::S256),
			"plain" => Ok(Self::Plain),
			other => Err(Error::UnsupportedChallengeMethod { method: other.to_owned() }),
		}
	}
}
impl Display for PkceMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Verifier + challenge generated together so neither half can be missing.
#[derive(Clone)]
pub struct PkcePair {
	verifier: TokenSecret,
	challenge: String,
	method: PkceMethod,
}
impl PkcePair {
	/// Draws a fresh verifier of random length and derives its challenge.
	pub fn generate(method: PkceMethod) -> Self {
		let len = rand::rng().random_range(PKCE_VERIFIER_LEN);
		let verifier = crypto::random_string(crypto::UNRESERVED_CHARSET, len);

		Self::from_verifier(verifier, method)
	}

	/// Derives the challenge for a known verifier.
	pub fn from_verifier(verifier: impl Into<String>, method: PkceMethod) -> Self {
		let verifier = verifier.into();
		let challenge = match method {
			PkceMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
			PkceMethod::Plain => verifier.clone(),
		};

		Self { verifier: TokenSecret::new(verifier), challenge, method }
	}

	/// Secret verifier sent with the code exchange.
	pub fn verifier(&self) -> &TokenSecret {
		&self.verifier
	}

	/// Challenge sent with the authorize request.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method.
	pub fn method(&self) -> PkceMethod {
		self.method
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &self.verifier)
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

/// Parameters of one authorization attempt.
#[derive(Clone, Debug)]
pub struct AuthorizeRequestParams {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Requested scope.
	pub scope: String,
	/// Redirect URI registered with the identity provider.
	pub redirect_uri: String,
	/// Requested response type.
	pub response_type: String,
	/// Response mode, `query` unless overridden.
	pub response_mode: Option<String>,
	/// Opaque state round-tripped through the browser.
	pub state: String,
	/// PKCE material, when a challenge method was requested.
	pub pkce: Option<PkcePair>,
	/// Provider-specific parameters passed through untouched.
	pub extra: BTreeMap<String, String>,
}
impl AuthorizeRequestParams {
	/// Starts a builder seeded with the four required fields.
	pub fn builder(
		client_id: impl Into<String>,
		scope: impl Into<String>,
		redirect_uri: impl Into<String>,
		response_type: impl Into<String>,
	) -> AuthorizeRequestParamsBuilder {
		AuthorizeRequestParamsBuilder {
			client_id: client_id.into(),
			scope: scope.into(),
			redirect_uri: redirect_uri.into(),
			response_type: response_type.into(),
			response_mode: Some("query".into()),
			state: String::new(),
			challenge_method: None,
			extra: BTreeMap::new(),
		}
	}

	/// Returns `true` when the attempt proves possession through PKCE.
	pub fn uses_pkce(&self) -> bool {
		self.pkce.is_some()
	}

	/// Query parameters for the authorize request, in a stable order.
	pub fn to_query_params(&self) -> Vec<(String, Vec<String>)> {
		let mut params = vec![
			("client_id".to_owned(), vec![self.client_id.clone()]),
			("scope".to_owned(), vec![self.scope.clone()]),
			("redirect_uri".to_owned(), vec![self.redirect_uri.clone()]),
			("response_type".to_owned(), vec![self.response_type.clone()]),
		];

		if let Some(mode) = &self.response_mode {
			params.push(("response_mode".into(), vec![mode.clone()]));
		}
		if !self.state.is_empty() {
			params.push(("state".into(), vec![self.state.clone()]));
		}
		if let Some(pkce) = &self.pkce {
			params.push(("code_challenge".into(), vec![pkce.challenge.clone()]));
			params.push(("code_challenge_method".into(), vec![pkce.method.as_str().to_owned()]));
		}

		params.extend(self.extra.iter().map(|(name, value)| (name.clone(), vec![value.clone()])));

		params
	}
}

/// Builder for [`AuthorizeRequestParams`].
#[derive(Clone, Debug)]
pub struct AuthorizeRequestParamsBuilder {
	client_id: String,
	scope: String,
	redirect_uri: String,
	response_type: String,
	response_mode: Option<String>,
	state: String,
	challenge_method: Option<String>,
	extra: BTreeMap<String, String>,
}
impl AuthorizeRequestParamsBuilder {
	/// Overrides the response mode; `None` omits it from the authorize request.
	pub fn response_mode(mut self, mode: Option<String>) -> Self {
		self.response_mode = mode;

		self
	}

	/// Sets the attempt's opaque state.
	pub fn state(mut self, state: impl Into<String>) -> Self {
		self.state = state.into();

		self
	}

	/// Requests PKCE with the named challenge method.
	pub fn challenge_method(mut self, method: impl Into<String>) -> Self {
		self.challenge_method = Some(method.into());

		self
	}

	/// Adds a provider-specific parameter.
	pub fn extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra.insert(name.into(), value.into());

		self
	}

	/// Validates required fields and generates PKCE material when requested.
	pub fn build(self) -> Result<AuthorizeRequestParams> {
		for (name, value) in [
			("client_id", &self.client_id),
			("scope", &self.scope),
			("redirect_uri", &self.redirect_uri),
			("response_type", &self.response_type),
		] {
			if value.trim().is_empty() {
				return Err(Error::malformed(format!("authorize request is missing `{name}`")));
			}
		}

		let pkce = self
			.challenge_method
			.as_deref()
			.map(|method| method.parse().map(PkcePair::generate))
			.transpose()?;

		Ok(AuthorizeRequestParams {
			client_id: self.client_id,
			scope: self.scope,
			redirect_uri: self.redirect_uri,
			response_type: self.response_type,
			response_mode: self.response_mode,
			state: self.state,
			pkce,
			extra: self.extra,
		})
	}
}
