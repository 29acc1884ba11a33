//! Authorization-code exchange through the `oauth2` crate client.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RequestTokenError, StandardRevocableToken,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenResponse,
	},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TokenExchangeError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	token::{TokenRecord, TokenSecret},
	url_key::UrlKey,
};

type CodeExchangeClient = Client<
	BasicErrorResponse,
	BasicTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type ExchangeRequestError =
	RequestTokenError<HttpClientError<ReqwestError>, BasicErrorResponse>;

/// Inputs of one `grant_type=authorization_code` request.
#[derive(Debug)]
pub struct CodeExchange<'a> {
	/// Token endpoint.
	pub token_url: &'a UrlKey,
	/// Client identifier sent in the form body.
	pub client_id: &'a str,
	/// Client secret sent in the form body, when confidential.
	pub client_secret: Option<&'a TokenSecret>,
	/// Redirect URI used during authorization.
	pub redirect_uri: &'a str,
	/// Authorization code returned to the callback.
	pub code: &'a str,
	/// PKCE verifier matching the challenge sent earlier.
	pub code_verifier: Option<&'a TokenSecret>,
}

/// Exchanges an authorization code and returns the provider's token response, un-normalized.
///
/// The record is read from the raw 2xx body, so fields `oauth2` does not model (or models more
/// strictly than providers honor) reach the cache unchanged.
pub async fn exchange_authorization_code(
	http_client: &ReqwestHttpClient,
	exchange: CodeExchange<'_>,
) -> Result<TokenRecord> {
	let redirect_url = RedirectUrl::new(exchange.redirect_uri.to_owned())
		.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "redirect_uri", source })?;
	let mut client: CodeExchangeClient = Client::new(ClientId::new(exchange.client_id.to_owned()))
		.set_token_uri(TokenUrl::from_url(exchange.token_url.url().clone()))
		.set_auth_type(AuthType::RequestBody);

	if let Some(secret) = exchange.client_secret {
		client = client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
	}

	let meta = ResponseMetadataSlot::default();
	let instrumented = http_client.instrumented(meta.clone());
	let mut request = client
		.exchange_code(AuthorizationCode::new(exchange.code.to_owned()))
		.set_redirect_uri(Cow::Owned(redirect_url));

	if let Some(verifier) = exchange.code_verifier {
		request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_owned()));
	}

	let response = request.request_async(&instrumented).await;
	let mut meta = meta.take().unwrap_or_default();

	match (response, meta.body.take()) {
		(Ok(_), Some(body))
		| (Err(RequestTokenError::Parse(..) | RequestTokenError::Other(_)), Some(body)) =>
			parse_record(body.expose().as_bytes(), meta.status),
		(Ok(response), None) => {
			let body = serde_json::to_vec(&response).map_err(|e| TokenExchangeError::Unexpected {
				message: e.to_string(),
				status: meta.status,
			})?;

			parse_record(&body, meta.status)
		},
		(Err(err), _) => Err(map_request_error(meta, err)),
	}
}

fn parse_record(body: &[u8], status: Option<u16>) -> Result<TokenRecord> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		TokenExchangeError::MalformedResponse { source: Arc::new(source), status }.into()
	})
}

fn map_request_error(meta: ResponseMetadata, err: ExchangeRequestError) -> Error {
	let status = meta.status;

	match err {
		RequestTokenError::ServerResponse(response) => {
			let message = match response.error_description() {
				Some(description) => format!("{}: {description}", response.error().as_ref()),
				None => response.error().as_ref().to_owned(),
			};

			TokenExchangeError::Rejected { message, status }.into()
		},
		RequestTokenError::Request(error) => map_transport_error(error),
		RequestTokenError::Parse(_, _) if meta.is_failure() => TokenExchangeError::Rejected {
			message: format!("HTTP status {}", status.unwrap_or_default()),
			status,
		}
		.into(),
		RequestTokenError::Parse(source, _body) =>
			TokenExchangeError::MalformedResponse { source: Arc::new(source), status }.into(),
		RequestTokenError::Other(message) if meta.is_failure() =>
			TokenExchangeError::Rejected { message, status }.into(),
		RequestTokenError::Other(message) => TokenExchangeError::Unexpected { message, status }.into(),
	}
}

fn map_transport_error(err: HttpClientError<ReqwestError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) if inner.is_builder() =>
			ConfigError::http_client_build(*inner).into(),
		HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::from(inner).into(),
		HttpClientError::Other(message) =>
			TokenExchangeError::Unexpected { message, status: None }.into(),
		_ => TokenExchangeError::Unexpected {
			message: "HTTP client error occurred while calling the token endpoint".into(),
			status: None,
		}
		.into(),
	}
}
