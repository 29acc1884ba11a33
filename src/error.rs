//! Proxy-level error types shared across flows, registries, and the HTTP surface.

// self
use crate::{_prelude::*, system::SystemError};

/// Proxy-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical proxy error exposed by public APIs.
///
/// Every source is reference-counted so one failure can be cloned into each waiter of a flow.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token endpoint refused or garbled the code exchange.
	#[error(transparent)]
	TokenExchange(#[from] TokenExchangeError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// DNS or port-forwarding setup failed.
	#[error("System configuration failed: {0}")]
	SystemConfiguration(#[from] SystemError),

	/// A URL or encoded value could not be parsed.
	#[error("Malformed input: {reason}.")]
	MalformedInput {
		/// Human-readable parsing failure.
		reason: String,
	},
	/// Callback is missing parameters or does not match the issued state.
	#[error("Bad callback: {reason}.")]
	BadCallback {
		/// Human-readable validation failure.
		reason: String,
	},
	/// State fingerprint does not match the server-side recomputation.
	#[error("Callback fingerprint mismatch, the state parameter was tampered with.")]
	TamperedState,
	/// No pending authorization flow matches the callback.
	#[error("Authorization flow not found for the given state.")]
	UnknownFlow,
	/// The flow asked for a response type the proxy cannot complete.
	#[error("Unsupported response_type `{response_type}`.")]
	UnsupportedResponseType {
		/// Requested response type.
		response_type: String,
	},
	/// PKCE challenge method outside `S256` and `plain`.
	#[error("Unsupported PKCE code_challenge_method `{method}`.")]
	UnsupportedChallengeMethod {
		/// Requested challenge method.
		method: String,
	},
	/// Proxy bookkeeping disagrees with itself (e.g., a resolved flow without a token).
	#[error("Internal inconsistency: {reason}.")]
	InternalInconsistency {
		/// Human-readable description of the broken expectation.
		reason: String,
	},
	/// OIDC discovery did not yield usable endpoints.
	#[error("Identity provider discovery failed: {reason}.")]
	Discovery {
		/// Human-readable discovery failure.
		reason: String,
	},
	/// Waiting for an authorization flow exceeded its deadline.
	#[error("Authorization flow did not complete within {}s.", .after.as_secs())]
	Timeout {
		/// Deadline that elapsed.
		after: StdDuration,
	},
}
impl Error {
	/// Builds an [`Error::MalformedInput`] from any displayable reason.
	pub fn malformed(reason: impl Display) -> Self {
		Self::MalformedInput { reason: reason.to_string() }
	}

	/// Builds an [`Error::BadCallback`] from any displayable reason.
	pub fn bad_callback(reason: impl Display) -> Self {
		Self::BadCallback { reason: reason.to_string() }
	}

	/// Builds an [`Error::InternalInconsistency`] from any displayable reason.
	pub fn inconsistency(reason: impl Display) -> Self {
		Self::InternalInconsistency { reason: reason.to_string() }
	}

	/// Returns `true` when the request itself caused the failure (HTTP 400 family).
	pub fn is_caller_fault(&self) -> bool {
		matches!(
			self,
			Self::Config(ConfigError::PublicClientWithoutPkce)
				| Self::MalformedInput { .. }
				| Self::BadCallback { .. }
				| Self::TamperedState
				| Self::UnknownFlow
				| Self::UnsupportedChallengeMethod { .. }
		)
	}

	/// Returns `true` for [`Error::Timeout`].
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}

	/// Stable snake_case label suitable for JSON bodies and metric fields.
	pub const fn label(&self) -> &'static str {
		match self {
			Self::Config(_) => "configuration_error",
			Self::TokenExchange(_) => "token_exchange_error",
			Self::Transport(_) => "transport_error",
			Self::SystemConfiguration(_) => "system_configuration_error",
			Self::MalformedInput { .. } => "malformed_input",
			Self::BadCallback { .. } => "bad_callback",
			Self::TamperedState => "tampered_state",
			Self::UnknownFlow => "unknown_flow",
			Self::UnsupportedResponseType { .. } => "unsupported_response_type",
			Self::UnsupportedChallengeMethod { .. } => "unsupported_challenge_method",
			Self::InternalInconsistency { .. } => "internal_inconsistency",
			Self::Discovery { .. } => "discovery_error",
			Self::Timeout { .. } => "timeout",
		}
	}
}

/// Configuration and validation failures raised by the proxy.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest(#[source] Arc<oauth2::http::Error>),
	/// Identity provider endpoint cannot be used by the OAuth client.
	#[error("The {endpoint} endpoint is invalid.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Public clients must prove possession through PKCE.
	#[error("Flow uses neither PKCE nor a client secret; public clients must use PKCE.")]
	PublicClientWithoutPkce,
	/// A proxy setting is out of range.
	#[error("Setting `{name}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest(Arc::new(e))
	}
}

/// Failures reported by the identity provider's token endpoint.
#[derive(Clone, Debug, ThisError)]
pub enum TokenExchangeError {
	/// Token endpoint answered with a non-2xx status.
	#[error("Token endpoint rejected the code exchange: {message}.")]
	Rejected {
		/// Provider- or proxy-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned something the OAuth client could not classify.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Unexpected {
		/// Description of the unexpected response.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl TokenExchangeError {
	/// HTTP status reported by the token endpoint, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::MalformedResponse { status, .. }
			| Self::Unexpected { status, .. } => *status,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn caller_faults_are_classified_apart_from_internal_failures() {
		assert!(Error::TamperedState.is_caller_fault());
		assert!(Error::UnknownFlow.is_caller_fault());
		assert!(Error::bad_callback("missing code").is_caller_fault());
		assert!(Error::from(ConfigError::PublicClientWithoutPkce).is_caller_fault());
		assert!(!Error::inconsistency("no token").is_caller_fault());
		assert!(
			!Error::UnsupportedResponseType { response_type: "token".into() }.is_caller_fault()
		);
		assert!(!Error::Timeout { after: StdDuration::from_secs(1) }.is_caller_fault());
	}

	#[test]
	fn cloned_errors_keep_their_source_chain() {
		let io = std::io::Error::other("socket closed");
		let error: Error = TransportError::from(io).into();
		let cloned = error.clone();

		assert_eq!(error.to_string(), cloned.to_string());
		assert_eq!(cloned.label(), "transport_error");

		let source =
			StdError::source(&cloned).expect("Cloned transport error should keep the I/O source.");

		assert_eq!(source.to_string(), "socket closed");
	}

	#[test]
	fn timeout_display_reports_seconds() {
		let error = Error::Timeout { after: StdDuration::from_secs(60) };

		assert!(error.is_timeout());
		assert_eq!(error.to_string(), "Authorization flow did not complete within 60s.");
	}
}
