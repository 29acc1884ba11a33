//! Proxy settings shared by the orchestrator and the HTTP surface.

// self
use crate::{_prelude::*, crypto, error::ConfigError, token::TokenSecret};

/// Default listener port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default wait of each token request for its flow.
pub const DEFAULT_AUTHORIZE_FLOW_TIMEOUT: StdDuration = StdDuration::from_secs(60);
/// Default lifetime of an initiated flow waiting for its callback.
pub const DEFAULT_FLOW_TTL: StdDuration = StdDuration::from_secs(300);
/// Default safety margin subtracted from token expiry.
pub const DEFAULT_TOKEN_EXPIRY_BUFFER: StdDuration = StdDuration::from_secs(10);

const FINGERPRINT_SECRET_BYTES: usize = 32;

/// Orchestrator settings.
///
/// [`ProxyConfig::default`] generates a fresh fingerprint secret, so states issued by one process
/// are rejected by the next.
#[derive(Clone)]
pub struct ProxyConfig {
	/// Local listener port; destination of port forwarding.
	pub port: u16,
	/// How long each token request waits for its flow.
	pub authorize_flow_timeout: StdDuration,
	/// How long an initiated flow stays live before it expires with [`Error::Timeout`].
	pub flow_ttl: StdDuration,
	/// Run DNS and port-forwarding setup before opening the browser.
	pub autoconfigure_system: bool,
	/// HMAC key for state fingerprints.
	pub fingerprint_secret: TokenSecret,
	/// Margin applied when judging cached tokens.
	pub token_expiry_buffer: StdDuration,
}
impl ProxyConfig {
	/// Overrides the listener port.
	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;

		self
	}

	/// Overrides the per-request flow wait.
	pub fn with_authorize_flow_timeout(mut self, timeout: StdDuration) -> Self {
		self.authorize_flow_timeout = timeout;

		self
	}

	/// Overrides the flow lifetime.
	pub fn with_flow_ttl(mut self, ttl: StdDuration) -> Self {
		self.flow_ttl = ttl;

		self
	}

	/// Enables or disables host autoconfiguration.
	pub fn with_autoconfigure_system(mut self, enabled: bool) -> Self {
		self.autoconfigure_system = enabled;

		self
	}

	/// Replaces the fingerprint secret.
	pub fn with_fingerprint_secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.fingerprint_secret = secret.into();

		self
	}

	/// Overrides the token expiry buffer.
	pub fn with_token_expiry_buffer(mut self, buffer: StdDuration) -> Self {
		self.token_expiry_buffer = buffer;

		self
	}

	/// Rejects settings the orchestrator cannot honor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.port == 0 {
			return Err(invalid("port", "must be non-zero"));
		}
		if self.authorize_flow_timeout.is_zero() {
			return Err(invalid("authorize_flow_timeout", "must be non-zero"));
		}
		if self.flow_ttl.is_zero() {
			return Err(invalid("flow_ttl", "must be non-zero"));
		}
		if self.flow_ttl < self.authorize_flow_timeout {
			return Err(invalid("flow_ttl", "must not be shorter than authorize_flow_timeout"));
		}
		if self.fingerprint_secret.expose().trim().is_empty() {
			return Err(invalid("fingerprint_secret", "must not be empty"));
		}

		Ok(())
	}
}
impl Default for ProxyConfig {
	fn default() -> Self {
		Self {
			port: DEFAULT_PORT,
			authorize_flow_timeout: DEFAULT_AUTHORIZE_FLOW_TIMEOUT,
			flow_ttl: DEFAULT_FLOW_TTL,
			autoconfigure_system: false,
			fingerprint_secret: crypto::generate_secret_key(FINGERPRINT_SECRET_BYTES).into(),
			token_expiry_buffer: DEFAULT_TOKEN_EXPIRY_BUFFER,
		}
	}
}
impl Debug for ProxyConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProxyConfig")
			.field("port", &self.port)
			.field("authorize_flow_timeout", &self.authorize_flow_timeout)
			.field("flow_ttl", &self.flow_ttl)
			.field("autoconfigure_system", &self.autoconfigure_system)
			.field("fingerprint_secret", &self.fingerprint_secret)
			.field("token_expiry_buffer", &self.token_expiry_buffer)
			.finish()
	}
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
	ConfigError::InvalidSetting { name, reason: reason.to_owned() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_validate_with_a_fresh_secret() {
		let first = ProxyConfig::default();
		let second = ProxyConfig::default();

		first.validate().expect("Defaults should validate.");

		assert_eq!(first.port, 8080);
		assert_eq!(first.authorize_flow_timeout, StdDuration::from_secs(60));
		assert!(!first.autoconfigure_system);
		assert_ne!(first.fingerprint_secret.expose(), second.fingerprint_secret.expose());
		assert_eq!(format!("{first:?}").matches("<redacted>").count(), 1);
	}

	#[test]
	fn out_of_range_settings_are_named() {
		let cases = [
			(ProxyConfig::default().with_port(0), "port"),
			(
				ProxyConfig::default().with_authorize_flow_timeout(StdDuration::ZERO),
				"authorize_flow_timeout",
			),
			(ProxyConfig::default().with_flow_ttl(StdDuration::from_secs(30)), "flow_ttl"),
			(ProxyConfig::default().with_fingerprint_secret(" "), "fingerprint_secret"),
		];

		for (config, expected) in cases {
			let err = config.validate().expect_err("Setting should be rejected.");

			assert!(
				matches!(err, ConfigError::InvalidSetting { name, .. } if name == expected),
				"unexpected error for {expected}: {err:?}"
			);
		}
	}
}
