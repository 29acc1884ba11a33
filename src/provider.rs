//! Identity-provider endpoints and their resolution through OIDC discovery.

// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::ReqwestHttpClient,
	url_key::{UrlEqualityMode, UrlKey},
};

/// Boxed future returned by [`IdentityProviderResolver::resolve`].
pub type ProviderFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Arc<dyn IdentityProvider>>> + 'a + Send>>;

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";
const DISCOVERY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Authorization and token endpoints of one identity provider.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Endpoint the browser is sent to.
	fn authorize_url(&self) -> &UrlKey;

	/// Endpoint receiving the code exchange.
	fn token_url(&self) -> &UrlKey;
}

/// Finds the identity provider behind a canonical authorize URL.
pub trait IdentityProviderResolver
where
	Self: Send + Sync,
{
	/// Resolves the provider serving `authorize_url`.
	fn resolve<'a>(&'a self, authorize_url: &'a UrlKey) -> ProviderFuture<'a>;
}

/// Provider with fixed endpoints.
#[derive(Clone, Debug)]
pub struct StaticIdentityProvider {
	authorize_url: UrlKey,
	token_url: UrlKey,
}
impl StaticIdentityProvider {
	/// Wraps known endpoints.
	pub fn new(authorize_url: UrlKey, token_url: UrlKey) -> Self {
		Self { authorize_url, token_url }
	}

	/// Parses both endpoints.
	pub fn parse(authorize_url: &str, token_url: &str) -> Result<Self> {
		Ok(Self::new(
			UrlKey::parse(authorize_url, UrlEqualityMode::new())?,
			UrlKey::parse(token_url, UrlEqualityMode::new())?,
		))
	}
}
impl IdentityProvider for StaticIdentityProvider {
	fn authorize_url(&self) -> &UrlKey {
		&self.authorize_url
	}

	fn token_url(&self) -> &UrlKey {
		&self.token_url
	}
}
impl IdentityProviderResolver for StaticIdentityProvider {
	fn resolve<'a>(&'a self, _: &'a UrlKey) -> ProviderFuture<'a> {
		let provider: Arc<dyn IdentityProvider> = Arc::new(self.clone());

		Box::pin(async move { Ok(provider) })
	}
}

#[derive(Deserialize)]
struct DiscoveryDocument {
	authorization_endpoint: String,
	token_endpoint: String,
}

/// Resolves providers by fetching `{root}/.well-known/openid-configuration`.
///
/// The root is the authorize URL with path, query, and fragment removed. Documents are cached per
/// root for the lifetime of the resolver.
#[derive(Clone, Debug)]
pub struct OidcDiscovery {
	http_client: ReqwestHttpClient,
	timeout: StdDuration,
	cache: Arc<Mutex<HashMap<String, Arc<StaticIdentityProvider>>>>,
}
impl OidcDiscovery {
	/// Creates a resolver backed by `http_client`.
	pub fn new(http_client: ReqwestHttpClient) -> Self {
		Self { http_client, timeout: DISCOVERY_TIMEOUT, cache: Default::default() }
	}

	/// Overrides the per-request timeout (defaults to five seconds).
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Discovery document URL for `authorize_url`.
	pub fn discovery_url(authorize_url: &UrlKey) -> Result<UrlKey> {
		authorize_url.base(false).with_mode(UrlEqualityMode::new()).join(DISCOVERY_PATH)
	}

	async fn fetch(&self, authorize_url: &UrlKey) -> Result<Arc<StaticIdentityProvider>> {
		let url = Self::discovery_url(authorize_url)?;

		if let Some(cached) = self.cache.lock().get(url.as_str()) {
			return Ok(Arc::clone(cached));
		}

		tracing::debug!(url = %url, "Fetching OIDC discovery document.");

		let response = self
			.http_client
			.get(url.as_str())
			.timeout(self.timeout)
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();

		if !status.is_success() {
			return Err(Error::Discovery { reason: format!("{url} returned HTTP {status}") });
		}

		let body = response.bytes().await.map_err(TransportError::from)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let document: DiscoveryDocument = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| Error::Discovery { reason: format!("{url} is not a discovery document: {e}") })?;
		let endpoint = |raw: &str, name: &str| {
			UrlKey::parse(raw, UrlEqualityMode::new())
				.map_err(|e| Error::Discovery { reason: format!("{name} is unusable: {e}") })
		};
		let provider = Arc::new(StaticIdentityProvider::new(
			endpoint(&document.authorization_endpoint, "authorization_endpoint")?,
			endpoint(&document.token_endpoint, "token_endpoint")?,
		));

		self.cache.lock().insert(url.as_str().to_owned(), Arc::clone(&provider));

		Ok(provider)
	}
}
impl IdentityProviderResolver for OidcDiscovery {
	fn resolve<'a>(&'a self, authorize_url: &'a UrlKey) -> ProviderFuture<'a> {
		Box::pin(async move {
			let provider: Arc<dyn IdentityProvider> = self.fetch(authorize_url).await?;

			Ok(provider)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn discovery_url_sits_at_the_provider_root() {
		let authorize = UrlKey::parse(
			"https://idp.example/oauth2/authorize?client_id=abc#frag",
			UrlEqualityMode::authorize(),
		)
		.expect("Authorize fixture should parse.");
		let url = OidcDiscovery::discovery_url(&authorize).expect("Discovery URL should resolve.");

		assert_eq!(url.as_str(), "https://idp.example/.well-known/openid-configuration");
	}

	#[tokio::test]
	async fn static_provider_resolves_to_itself() {
		let provider =
			StaticIdentityProvider::parse("https://idp.example/authorize", "https://idp.example/token")
				.expect("Static provider fixture should parse.");
		let key = provider.authorize_url().clone();
		let resolved = provider.resolve(&key).await.expect("Static provider always resolves.");

		assert_eq!(resolved.token_url().as_str(), "https://idp.example/token");
	}
}
