//! HTTP surface: health probe, token endpoint, and the catch-all redirect callback.

// std
use std::io;
// crates.io
use axum::{
	Form, Json, Router,
	extract::{State, rejection::FormRejection},
	http::{HeaderMap, StatusCode, Uri, header},
	response::{Html, IntoResponse, Response},
	routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	proxy::{CallbackRequest, LocalProxy, TokenRequest},
};

/// Routes served by the proxy.
///
/// Any `GET` outside `/health` and `/token` is treated as a redirect callback.
pub fn router(proxy: LocalProxy) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/token", post(token))
		.route("/", get(callback))
		.route("/{*path}", get(callback))
		.with_state(proxy)
}

/// Serves [`router`] on `listener` until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, proxy: LocalProxy, shutdown: F) -> io::Result<()>
where
	F: 'static + Send + Future<Output = ()>,
{
	axum::serve(listener, router(proxy)).with_graceful_shutdown(shutdown).await
}

async fn health() -> Json<serde_json::Value> {
	Json(json!({ "status": "ok" }))
}

async fn token(
	State(proxy): State<LocalProxy>,
	form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
	let request = match form {
		Ok(Form(request)) => request,
		Err(rejection) => {
			tracing::debug!(error = %rejection, "Rejected malformed token request.");

			return error_body(StatusCode::BAD_REQUEST, "malformed_input", rejection.body_text());
		},
	};

	match proxy.handle_token_request(request).await {
		Ok(token) => Json(token).into_response(),
		Err(e) => error_body(token_status(&e), e.label(), e.to_string()),
	}
}

async fn callback(State(proxy): State<LocalProxy>, headers: HeaderMap, uri: Uri) -> Response {
	let host = headers
		.get(header::HOST)
		.and_then(|value| value.to_str().ok())
		.map(str::to_owned)
		.or_else(|| uri.authority().map(ToString::to_string));
	let params = uri
		.query()
		.map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
		.unwrap_or_default();
	let request = CallbackRequest { host, path: uri.path().to_owned(), params };

	match proxy.handle_callback(request).await {
		Ok(()) => Html(page(
			"Authorization complete",
			"You can close this window and return to your terminal.",
		))
		.into_response(),
		Err(e) => (callback_status(&e), Html(page("Authorization failed", &e.to_string())))
			.into_response(),
	}
}

fn token_status(error: &Error) -> StatusCode {
	if error.is_caller_fault() {
		StatusCode::BAD_REQUEST
	} else if error.is_timeout() {
		StatusCode::GATEWAY_TIMEOUT
	} else {
		StatusCode::INTERNAL_SERVER_ERROR
	}
}

fn callback_status(error: &Error) -> StatusCode {
	if error.is_caller_fault() { StatusCode::BAD_REQUEST } else { StatusCode::INTERNAL_SERVER_ERROR }
}

fn error_body(status: StatusCode, label: &str, message: String) -> Response {
	(status, Json(json!({ "error": label, "message": message }))).into_response()
}

fn page(title: &str, message: &str) -> String {
	let (title, message) = (escape_html(title), escape_html(message));

	format!(
		"<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
		 <body><h1>{title}</h1><p>{message}</p></body></html>\n"
	)
}

fn escape_html(raw: &str) -> String {
	let mut escaped = String::with_capacity(raw.len());

	for c in raw.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			'\'' => escaped.push_str("&#39;"),
			c => escaped.push(c),
		}
	}

	escaped
}
