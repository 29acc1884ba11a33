//! One authorization-code attempt: open the browser, then redeem the returned code.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	flows::params::AuthorizeRequestParams,
	http::ReqwestHttpClient,
	oauth::{self, CodeExchange},
	provider::IdentityProvider,
	system::SystemCapabilities,
	token::{TokenRecord, TokenSecret},
	url_key::UrlKey,
};

/// Lifecycle of an [`AuthorizationFlow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowPhase {
	/// Built, browser not opened yet.
	Constructed,
	/// Browser opened; waiting for the callback.
	Commenced,
	/// A callback claimed the flow and the code exchange is in flight.
	Exchanging,
	/// Token exchanged.
	Exchanged,
	/// Terminal failure.
	Failed,
}
impl FlowPhase {
	/// Returns a stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowPhase::Constructed => "constructed",
			FlowPhase::Commenced => "commenced",
			FlowPhase::Exchanging => "exchanging",
			FlowPhase::Exchanged => "exchanged",
			FlowPhase::Failed => "failed",
		}
	}
}

/// Drives the browser leg and the code exchange of a single attempt.
pub struct AuthorizationFlow {
	provider: Arc<dyn IdentityProvider>,
	params: AuthorizeRequestParams,
	client_secret: Option<TokenSecret>,
	system: Arc<dyn SystemCapabilities>,
	http_client: ReqwestHttpClient,
	phase: Mutex<FlowPhase>,
}
impl AuthorizationFlow {
	/// Builds a flow; public clients (no secret) must use PKCE.
	pub fn new(
		provider: Arc<dyn IdentityProvider>,
		params: AuthorizeRequestParams,
		client_secret: Option<TokenSecret>,
		system: Arc<dyn SystemCapabilities>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let client_secret = client_secret.filter(|secret| !secret.is_empty());

		if !params.uses_pkce() && client_secret.is_none() {
			return Err(ConfigError::PublicClientWithoutPkce.into());
		}

		Ok(Self {
			provider,
			params,
			client_secret,
			system,
			http_client,
			phase: Mutex::new(FlowPhase::Constructed),
		})
	}

	/// Request parameters of this attempt.
	pub fn params(&self) -> &AuthorizeRequestParams {
		&self.params
	}

	/// Current lifecycle phase.
	pub fn phase(&self) -> FlowPhase {
		*self.phase.lock()
	}

	/// Provider authorize endpoint carrying this attempt's query parameters.
	pub fn authorize_request_url(&self) -> UrlKey {
		self.provider.authorize_url().with_params(self.params.to_query_params())
	}

	/// Opens the authorize request URL in the browser.
	pub async fn commence(&self) -> Result<()> {
		self.transition(FlowPhase::Constructed, FlowPhase::Commenced)?;

		let url = self.authorize_request_url().to_string();
		let system = Arc::clone(&self.system);
		let opened = tokio::task::spawn_blocking(move || system.open_browser(&url))
			.await
			.map_err(|e| Error::inconsistency(format!("browser task failed: {e}")))
			.and_then(|opened| opened.map_err(Error::from));

		if opened.is_err() {
			self.set_phase(FlowPhase::Failed);
		}

		opened
	}

	/// Redeems `code` at the provider's token endpoint and returns the normalized token.
	///
	/// `state` must equal the value issued with this attempt.
	pub async fn exchange_code(&self, code: &str, state: &str) -> Result<TokenRecord> {
		self.transition(FlowPhase::Commenced, FlowPhase::Exchanging)?;

		if state != self.params.state {
			self.set_phase(FlowPhase::Failed);

			return Err(Error::bad_callback("state does not match the pending authorization flow"));
		}

		let exchanged = oauth::exchange_authorization_code(
			&self.http_client,
			CodeExchange {
				token_url: self.provider.token_url(),
				client_id: &self.params.client_id,
				client_secret: self.client_secret.as_ref(),
				redirect_uri: &self.params.redirect_uri,
				code,
				code_verifier: self.params.pkce.as_ref().map(|pkce| pkce.verifier()),
			},
		)
		.await;

		match exchanged {
			Ok(token) => {
				self.set_phase(FlowPhase::Exchanged);

				Ok(token.normalized(OffsetDateTime::now_utc()))
			},
			Err(e) => {
				self.set_phase(FlowPhase::Failed);

				Err(e)
			},
		}
	}

	fn transition(&self, from: FlowPhase, to: FlowPhase) -> Result<()> {
		let mut phase = self.phase.lock();

		if *phase != from {
			return Err(match (*phase, to) {
				(FlowPhase::Exchanging | FlowPhase::Exchanged, FlowPhase::Exchanging) =>
					Error::bad_callback("authorization code was already redeemed for this flow"),
				(current, _) => Error::inconsistency(format!(
					"flow cannot move from {} to {}",
					current.as_str(),
					to.as_str()
				)),
			});
		}

		*phase = to;

		Ok(())
	}

	fn set_phase(&self, phase: FlowPhase) {
		*self.phase.lock() = phase;
	}
}
impl Debug for AuthorizationFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationFlow")
			.field("authorize_url", self.provider.authorize_url())
			.field("token_url", self.provider.token_url())
			.field("params", &self.params)
			.field("confidential", &self.client_secret.is_some())
			.field("phase", &self.phase())
			.finish()
	}
}
