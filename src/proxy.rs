//! The orchestrator behind `POST /token` and the redirect callback.
//!
//! A token request either returns a cached token or joins the single pending attempt for its
//! canonical authorize URL. The first caller for a key becomes the initiator and spawns a flow
//! task that opens the browser; the callback redeems the code, fills the cache, and wakes every
//! waiter.

mod tasks;

pub use tasks::*;

// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	config::ProxyConfig,
	flows::{
		AuthorizationFlow, AuthorizationFlowFactory, FlowEntry, FlowPhase, FlowRegistry, FlowState,
		FlowStatus, TokenRequestState, WaitOutcome,
	},
	http::ReqwestHttpClient,
	obs::{self, FlowOutcome, FlowSpan, ProxyOperation},
	provider::{IdentityProviderResolver, OidcDiscovery},
	store::TokenRegistry,
	system::{HostSystem, SystemCapabilities, SystemError},
	token::{TokenRecord, TokenSecret},
	url_key::{UrlEqualityMode, UrlKey},
};

/// Body of `POST /token`.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenRequest {
	/// Authorize URL as the client tool would send it to the identity provider.
	pub authorize_url: String,
	/// Redirect target the proxy intercepts.
	pub callback_url: String,
	/// Client secret for confidential clients.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
}
impl TokenRequest {
	/// Request for a public client.
	pub fn new(authorize_url: impl Into<String>, callback_url: impl Into<String>) -> Self {
		Self {
			authorize_url: authorize_url.into(),
			callback_url: callback_url.into(),
			client_secret: None,
		}
	}

	/// Attaches a client secret.
	pub fn with_client_secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}
}

/// An intercepted redirect.
#[derive(Clone, Debug, Default)]
pub struct CallbackRequest {
	/// `Host` header, port included when present.
	pub host: Option<String>,
	/// Request path.
	pub path: String,
	/// Decoded query parameters in arrival order.
	pub params: Vec<(String, String)>,
}
impl CallbackRequest {
	/// Reconstructs the request a browser would send for `url`.
	pub fn from_url(url: &Url) -> Self {
		let host = url.host_str().map(|host| match url.port() {
			Some(port) => format!("{host}:{port}"),
			None => host.to_owned(),
		});

		Self {
			host,
			path: url.path().to_owned(),
			params: url.query_pairs().into_owned().collect(),
		}
	}

	/// First value of `name`.
	pub fn param(&self, name: &str) -> Option<&str> {
		self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}
}

/// Cloneable handle to the proxy's registries and collaborators.
#[derive(Clone)]
pub struct LocalProxy(Arc<ProxyInner>);
impl LocalProxy {
	/// Starts a builder around `config`.
	pub fn builder(config: ProxyConfig) -> LocalProxyBuilder {
		LocalProxyBuilder { config, system: None, providers: None, http_client: None, tokens: None }
	}

	/// Active settings.
	pub fn config(&self) -> &ProxyConfig {
		&self.0.config
	}

	/// Token cache.
	pub fn tokens(&self) -> &TokenRegistry {
		&self.0.tokens
	}

	/// Pending attempts.
	pub fn flows(&self) -> &FlowRegistry {
		&self.0.flows
	}

	/// Background flow tasks.
	pub fn tasks(&self) -> &FlowTasks {
		&self.0.tasks
	}

	/// Cancels pending flow tasks and waits for them.
	pub async fn shutdown(&self) {
		self.0.tasks.shutdown().await;
	}

	/// Returns a valid token for the request, running or joining a browser flow when needed.
	pub async fn handle_token_request(&self, request: TokenRequest) -> Result<TokenRecord> {
		const KIND: ProxyOperation = ProxyOperation::TokenRequest;

		let span = FlowSpan::new(KIND, "handle_token_request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.token_request(request)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	/// Validates a redirect, redeems its code, and resolves the matching flow.
	pub async fn handle_callback(&self, request: CallbackRequest) -> Result<()> {
		const KIND: ProxyOperation = ProxyOperation::Callback;

		let span = FlowSpan::new(KIND, "handle_callback");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.callback(&request)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn token_request(&self, request: TokenRequest) -> Result<TokenRecord> {
		let authorize_url = AuthorizationFlowFactory::create_authorize_url(&request.authorize_url)?;
		let callback_url = UrlKey::parse(&request.callback_url, UrlEqualityMode::new())?;

		ensure_web_url(&authorize_url, "authorize_url")?;
		ensure_web_url(&callback_url, "callback_url")?;

		let buffer = self.0.config.token_expiry_buffer;

		if let Some(token) = self.0.tokens.read_valid_token(&authorize_url, buffer) {
			tracing::debug!(authorize_url = %authorize_url, "Serving cached token.");

			return Ok(token);
		}

		let state = match self.0.flows.get_or_create(&authorize_url) {
			FlowEntry::Initiator(state) => {
				// Another attempt may have stored a token between the cache check and registration.
				if let Some(token) = self.0.tokens.read_valid_token(&authorize_url, buffer) {
					self.0.flows.resolve_attempt(&authorize_url, &state, FlowStatus::Done);

					return Ok(token);
				}

				tracing::info!(
					attempt = state.attempt(),
					authorize_url = %authorize_url,
					"Starting authorization flow."
				);

				self.spawn_flow(
					authorize_url.clone(),
					callback_url,
					request.client_secret,
					Arc::clone(&state),
				);

				state
			},
			FlowEntry::Waiter(state) => {
				tracing::debug!(attempt = state.attempt(), "Joining pending authorization flow.");

				state
			},
		};
		let timeout = self.0.config.authorize_flow_timeout;

		match state.wait_for_flow(timeout).await {
			WaitOutcome::Done => self.0.tokens.get(&authorize_url).ok_or_else(|| {
				tracing::error!(attempt = state.attempt(), "Flow completed without storing a token.");

				Error::inconsistency("authorization flow completed but no token was stored")
			}),
			WaitOutcome::Failed(e) => Err(e),
			WaitOutcome::TimedOut => Err(Error::Timeout { after: timeout }),
		}
	}

	fn spawn_flow(
		&self,
		authorize_url: UrlKey,
		callback_url: UrlKey,
		client_secret: Option<TokenSecret>,
		state: Arc<FlowState>,
	) {
		let proxy = self.clone();
		let span = FlowSpan::new(ProxyOperation::FlowTask, "run_flow");

		self.0.tasks.spawn(span.instrument(async move {
			proxy.run_flow(authorize_url, callback_url, client_secret, state).await;
		}));
	}

	async fn run_flow(
		self,
		authorize_url: UrlKey,
		callback_url: UrlKey,
		client_secret: Option<TokenSecret>,
		state: Arc<FlowState>,
	) {
		const KIND: ProxyOperation = ProxyOperation::FlowTask;

		let guard = ResolveOnDrop { flows: &self.0.flows, key: &authorize_url, state: &state };

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		if let Err(e) = self.start_flow(&authorize_url, &callback_url, client_secret, &state).await {
			tracing::warn!(attempt = state.attempt(), error = %e, "Authorization flow failed to start.");
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			guard.resolve(FlowStatus::Failed(e));

			return;
		}

		let ttl = self.0.config.flow_ttl;

		if let WaitOutcome::TimedOut = state.wait_for_flow(ttl).await {
			if guard.resolve(FlowStatus::Failed(Error::Timeout { after: ttl })) {
				tracing::warn!(
					attempt = state.attempt(),
					"Authorization flow expired before its callback."
				);
			}
		}

		let outcome = if state.in_error() { FlowOutcome::Failure } else { FlowOutcome::Success };

		obs::record_flow_outcome(KIND, outcome);
	}

	async fn start_flow(
		&self,
		authorize_url: &UrlKey,
		callback_url: &UrlKey,
		client_secret: Option<TokenSecret>,
		state: &FlowState,
	) -> Result<()> {
		let config = &self.0.config;

		if config.autoconfigure_system {
			self.autoconfigure_system(callback_url).await?;
		}

		let opaque_state = AuthorizationFlowFactory::create_state(
			authorize_url,
			callback_url,
			config.fingerprint_secret.expose(),
		)?;
		let params = AuthorizationFlowFactory::create_params(authorize_url, &opaque_state)?;
		let provider = self.0.providers.resolve(authorize_url).await?;
		let flow = Arc::new(AuthorizationFlow::new(
			provider,
			params,
			client_secret,
			Arc::clone(&self.0.system),
			self.0.http_client.clone(),
		)?);

		state.set_flow(Arc::clone(&flow))?;
		flow.commence().await?;

		tracing::info!(attempt = state.attempt(), "Opened the browser for authorization.");

		Ok(())
	}

	async fn autoconfigure_system(&self, callback_url: &UrlKey) -> Result<()> {
		let system = Arc::clone(&self.0.system);
		let hostname = match callback_url.url().host() {
			Some(Host::Domain(domain)) => Some(domain.to_owned()),
			_ => None,
		};
		let dst_port = self.0.config.port;
		let src_port = callback_url.port().filter(|port| *port != dst_port);

		tokio::task::spawn_blocking(move || -> Result<(), SystemError> {
			if let Some(hostname) = hostname {
				system.ensure_hostname_resolves_to_loopback(&hostname)?;
			}
			if let Some(src_port) = src_port {
				system.ensure_port_forward(src_port, dst_port)?;
			}

			Ok(())
		})
		.await
		.map_err(|e| Error::inconsistency(format!("system configuration task failed: {e}")))??;

		Ok(())
	}

	async fn callback(&self, request: &CallbackRequest) -> Result<()> {
		let mut recovered = None;
		let result = self.redeem_callback(request, &mut recovered).await;

		if let Err(e) = &result {
			tracing::warn!(path = %request.path, error = %e, "Rejected authorization callback.");

			if let Some(authorize_url) = recovered {
				if self.0.flows.mark_error(&authorize_url, e.clone()) {
					tracing::debug!(authorize_url = %authorize_url, "Failed the pending flow.");
				}
			}
		}

		result
	}

	async fn redeem_callback(
		&self,
		request: &CallbackRequest,
		recovered: &mut Option<UrlKey>,
	) -> Result<()> {
		let code = required_param(request, "code")?;
		let raw_state = required_param(request, "state")?;
		let payload = TokenRequestState::decode(raw_state)?;
		let authorize_url = AuthorizationFlowFactory::create_authorize_url(&payload.authorize_url)
			.map_err(|e| Error::bad_callback(format!("state carries an unusable authorize URL: {e}")))?;

		*recovered = Some(authorize_url.clone());

		let callback_url = UrlKey::parse(&payload.callback_url, UrlEqualityMode::new())
			.map_err(|e| Error::bad_callback(format!("state carries an unusable callback URL: {e}")))?;

		verify_target(request, &callback_url)?;

		if !AuthorizationFlowFactory::verify_fingerprint(
			&authorize_url,
			&callback_url,
			self.0.config.fingerprint_secret.expose(),
			&payload.fingerprint,
		) {
			return Err(Error::TamperedState);
		}

		let state = self.0.flows.get(&authorize_url).ok_or(Error::UnknownFlow)?;
		let flow = state.flow().ok_or_else(|| {
			tracing::error!(attempt = state.attempt(), "Pending flow has no authorization flow.");

			Error::inconsistency("pending flow has no authorization flow attached")
		})?;

		if flow.params().response_type != "code" {
			return Err(Error::UnsupportedResponseType {
				response_type: flow.params().response_type.clone(),
			});
		}

		let token = match flow.exchange_code(code, raw_state).await {
			Ok(token) => token,
			Err(e) => {
				// A duplicate callback must not fail the attempt another callback is redeeming.
				if matches!(flow.phase(), FlowPhase::Exchanging | FlowPhase::Exchanged) {
					recovered.take();
				}

				return Err(e);
			},
		};

		self.0.tokens.set(authorize_url.clone(), token);

		tracing::info!(
			attempt = state.attempt(),
			authorize_url = %authorize_url,
			"Stored exchanged token."
		);

		self.0.flows.resolve_attempt(&authorize_url, &state, FlowStatus::Done);

		Ok(())
	}
}
impl Debug for LocalProxy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LocalProxy")
			.field("config", &self.0.config)
			.field("cached_tokens", &self.0.tokens.len())
			.field("pending_flows", &self.0.flows.len())
			.finish()
	}
}

/// Builder for [`LocalProxy`].
pub struct LocalProxyBuilder {
	config: ProxyConfig,
	system: Option<Arc<dyn SystemCapabilities>>,
	providers: Option<Arc<dyn IdentityProviderResolver>>,
	http_client: Option<ReqwestHttpClient>,
	tokens: Option<TokenRegistry>,
}
impl LocalProxyBuilder {
	/// Overrides the host capabilities (defaults to [`HostSystem::detect`]).
	pub fn system(mut self, system: Arc<dyn SystemCapabilities>) -> Self {
		self.system = Some(system);

		self
	}

	/// Overrides provider resolution (defaults to [`OidcDiscovery`]).
	pub fn providers(mut self, providers: Arc<dyn IdentityProviderResolver>) -> Self {
		self.providers = Some(providers);

		self
	}

	/// Overrides the HTTP client used for discovery and code exchange.
	pub fn http_client(mut self, http_client: ReqwestHttpClient) -> Self {
		self.http_client = Some(http_client);

		self
	}

	/// Shares an existing token cache.
	pub fn tokens(mut self, tokens: TokenRegistry) -> Self {
		self.tokens = Some(tokens);

		self
	}

	/// Validates the configuration and assembles the proxy.
	pub fn build(self) -> Result<LocalProxy> {
		self.config.validate()?;

		let http_client = match self.http_client {
			Some(http_client) => http_client,
			None => ReqwestHttpClient::new()?,
		};
		let providers = self
			.providers
			.unwrap_or_else(|| Arc::new(OidcDiscovery::new(http_client.clone())));
		let system = self.system.unwrap_or_else(|| Arc::new(HostSystem::detect()));

		Ok(LocalProxy(Arc::new(ProxyInner {
			config: self.config,
			system,
			providers,
			http_client,
			tokens: self.tokens.unwrap_or_default(),
			flows: FlowRegistry::default(),
			tasks: FlowTasks::default(),
		})))
	}
}

struct ProxyInner {
	config: ProxyConfig,
	system: Arc<dyn SystemCapabilities>,
	providers: Arc<dyn IdentityProviderResolver>,
	http_client: ReqwestHttpClient,
	tokens: TokenRegistry,
	flows: FlowRegistry,
	tasks: FlowTasks,
}

/// Resolves the attempt with [`Error::InternalInconsistency`] if its task ends while it is pending.
struct ResolveOnDrop<'a> {
	flows: &'a FlowRegistry,
	key: &'a UrlKey,
	state: &'a Arc<FlowState>,
}
impl ResolveOnDrop<'_> {
	fn resolve(&self, status: FlowStatus) -> bool {
		self.flows.resolve_attempt(self.key, self.state, status)
	}
}
impl Drop for ResolveOnDrop<'_> {
	fn drop(&mut self) {
		if self.state.is_resolved() {
			return;
		}

		tracing::error!(attempt = self.state.attempt(), "Flow task ended before the flow resolved.");

		self.resolve(FlowStatus::Failed(Error::inconsistency(
			"authorization flow task ended before the flow resolved",
		)));
	}
}

fn ensure_web_url(url: &UrlKey, name: &str) -> Result<()> {
	if !matches!(url.url().scheme(), "http" | "https") || url.hostname().is_empty() {
		return Err(Error::malformed(format!("`{name}` must be an absolute http(s) URL")));
	}

	Ok(())
}

fn required_param<'a>(request: &'a CallbackRequest, name: &str) -> Result<&'a str> {
	if let Some(value) = request.param(name).filter(|value| !value.is_empty()) {
		return Ok(value);
	}

	Err(match request.param("error") {
		Some(error) => Error::bad_callback(format!(
			"identity provider returned `{error}` without `{name}`{}",
			request.param("error_description").map(|d| format!(": {d}")).unwrap_or_default()
		)),
		None => Error::bad_callback(format!("missing `{name}` parameter")),
	})
}

fn verify_target(request: &CallbackRequest, callback_url: &UrlKey) -> Result<()> {
	let host = request
		.host
		.as_deref()
		.map(strip_port)
		.ok_or_else(|| Error::bad_callback("request carries no Host header"))?;

	if !host.eq_ignore_ascii_case(callback_url.hostname()) {
		return Err(Error::bad_callback(format!(
			"callback host `{host}` does not match `{}`",
			callback_url.hostname()
		)));
	}
	if request.path != callback_url.path() {
		return Err(Error::bad_callback(format!(
			"callback path `{}` does not match `{}`",
			request.path,
			callback_url.path()
		)));
	}

	Ok(())
}

fn strip_port(host: &str) -> &str {
	if host.starts_with('[') {
		return match host.find(']') {
			Some(end) => &host[..=end],
			None => host,
		};
	}

	match host.rsplit_once(':') {
		Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
		_ => host,
	}
}
