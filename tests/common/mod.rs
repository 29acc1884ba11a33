//! Shared fixtures: a recording host-system fake, an `httpmock` identity provider, and proxy
//! builders.

#![allow(dead_code)]

// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
use oauth2_local_proxy::{
	config::ProxyConfig,
	flows::AuthorizationFlowFactory,
	provider::StaticIdentityProvider,
	proxy::{CallbackRequest, LocalProxy},
	system::{SystemCapabilities, SystemError},
	url_key::UrlKey,
};
use parking_lot::Mutex;
use url::Url;

pub const CALLBACK_URL: &str = "https://localhost:8443/cb";
pub const CALLBACK_HOST: &str = "localhost:8443";
pub const SECRET: &str = "s3cr3t";
pub const CLIENT_SECRET: &str = "client-secret";

/// Authorize URL for `client_id` with the identity parameters the proxy keys on.
pub fn authorize_url(client_id: &str) -> String {
	format!(
		"https://idp.example/authorize?client_id={client_id}&scope=openid&redirect_uri={CALLBACK_URL}&response_type=code"
	)
}

/// Canonical key the proxy derives from `raw`.
pub fn canonical(raw: &str) -> UrlKey {
	AuthorizationFlowFactory::create_authorize_url(raw).expect("Authorize fixture should parse.")
}

/// Host-system fake that records every call.
#[derive(Debug, Default)]
pub struct RecordingSystem {
	pub opened: Mutex<Vec<String>>,
	pub hostnames: Mutex<Vec<String>>,
	pub forwards: Mutex<Vec<(u16, u16)>>,
	pub fail_browser: bool,
}
impl RecordingSystem {
	pub fn failing_browser() -> Self {
		Self { fail_browser: true, ..Default::default() }
	}

	pub fn open_count(&self) -> usize {
		self.opened.lock().len()
	}

	/// Waits until at least `count` browser opens were recorded and returns the latest URL.
	pub async fn wait_for_open(&self, count: usize) -> Url {
		for _ in 0..500 {
			if let Some(url) = self.opened.lock().get(count - 1) {
				return Url::parse(url).expect("Opened URL should parse.");
			}

			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		panic!("Browser was not opened {count} time(s).");
	}
}
impl SystemCapabilities for RecordingSystem {
	fn open_browser(&self, url: &str) -> Result<(), SystemError> {
		if self.fail_browser {
			return Err(SystemError::Unsupported { capability: "browser", platform: "test" });
		}

		self.opened.lock().push(url.to_owned());

		Ok(())
	}

	fn ensure_hostname_resolves_to_loopback(&self, hostname: &str) -> Result<(), SystemError> {
		self.hostnames.lock().push(hostname.to_owned());

		Ok(())
	}

	fn ensure_port_forward(&self, src_port: u16, dst_port: u16) -> Result<(), SystemError> {
		self.forwards.lock().push((src_port, dst_port));

		Ok(())
	}
}

/// Mocks a successful token endpoint at `/token`.
pub async fn mock_token_success(server: &MockServer, access_token: &str) {
	mock_token_body(
		server,
		&format!(r#"{{"access_token":"{access_token}","token_type":"bearer","expires_in":3600}}"#),
	)
	.await;
}

/// Mocks a token endpoint at `/token` answering 200 with `body`.
pub async fn mock_token_body(server: &MockServer, body: &str) {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await;
}

/// Mocks a rejecting token endpoint at `/token`.
pub async fn mock_token_rejection(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant","error_description":"code expired"}"#);
		})
		.await;
}

/// Proxy wired to `server`'s `/authorize` and `/token` endpoints.
pub fn build_proxy(
	server: &MockServer,
	system: Arc<RecordingSystem>,
	config: ProxyConfig,
) -> LocalProxy {
	let provider =
		StaticIdentityProvider::parse(&server.url("/authorize"), &server.url("/token"))
			.expect("Mock provider endpoints should parse.");

	LocalProxy::builder(config.with_fingerprint_secret(SECRET))
		.system(system)
		.providers(Arc::new(provider))
		.build()
		.expect("Proxy should build.")
}

/// Default configuration with short waits.
pub fn test_config() -> ProxyConfig {
	ProxyConfig::default()
		.with_authorize_flow_timeout(Duration::from_secs(10))
		.with_flow_ttl(Duration::from_secs(30))
}

/// The redirect the identity provider would send back for the opened authorize URL.
pub fn redirect_for(opened: &Url, code: &str) -> CallbackRequest {
	let state = opened
		.query_pairs()
		.find(|(name, _)| name == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Opened URL should carry a state.");

	CallbackRequest {
		host: Some(CALLBACK_HOST.into()),
		path: "/cb".into(),
		params: vec![("code".into(), code.into()), ("state".into(), state)],
	}
}
