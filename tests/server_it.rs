#![cfg(feature = "server")]

mod common;

// std
use std::sync::Arc;
// crates.io
use axum::{
	Router,
	body::Body,
	http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use oauth2_local_proxy::server;
use serde_json::Value;
use tower::ServiceExt;
// self
use common::*;

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
	let response =
		router.clone().oneshot(request).await.expect("Router should always produce a response.");
	let status = response.status();
	let body = response.into_body().collect().await.expect("Body should be readable.").to_bytes();

	(status, String::from_utf8(body.to_vec()).expect("Body should be UTF-8."))
}

fn token_request(fields: &[(&str, &str)]) -> Request<Body> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(fields).finish();

	Request::post("/token")
		.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
		.body(Body::from(body))
		.expect("Token request should build.")
}

fn json(body: &str) -> Value {
	serde_json::from_str(body).expect("Body should be JSON.")
}

#[tokio::test]
async fn health_reports_ok() {
	let server = MockServer::start_async().await;
	let router =
		server::router(build_proxy(&server, Arc::new(RecordingSystem::default()), test_config()));
	let (status, body) = send(
		&router,
		Request::get("/health").body(Body::empty()).expect("Health request should build."),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json(&body), serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn malformed_token_requests_are_rejected() {
	let server = MockServer::start_async().await;
	let router =
		server::router(build_proxy(&server, Arc::new(RecordingSystem::default()), test_config()));
	let (status, body) = send(&router, token_request(&[("callback_url", CALLBACK_URL)])).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json(&body)["error"], "malformed_input");

	let (status, body) = send(
		&router,
		token_request(&[("authorize_url", "not a url"), ("callback_url", CALLBACK_URL)]),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json(&body)["error"], "malformed_input");
}

#[tokio::test]
async fn bad_callbacks_render_an_error_page() {
	let server = MockServer::start_async().await;
	let router =
		server::router(build_proxy(&server, Arc::new(RecordingSystem::default()), test_config()));
	let (status, body) = send(
		&router,
		Request::get("/cb?code=abc&state=%3Cscript%3E")
			.header(header::HOST, CALLBACK_HOST)
			.body(Body::empty())
			.expect("Callback request should build."),
	)
	.await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body.contains("Authorization failed"));
	assert!(!body.contains("<script>"));
}

async fn redeem_over_http(server: &MockServer) -> (StatusCode, Value) {
	let system = Arc::new(RecordingSystem::default());
	let router = server::router(build_proxy(server, system.clone(), test_config()));
	let authorize = authorize_url("abc");
	let pending = {
		let router = router.clone();
		let request = token_request(&[
			("authorize_url", authorize.as_str()),
			("callback_url", CALLBACK_URL),
			("client_secret", CLIENT_SECRET),
		]);

		tokio::spawn(async move { send(&router, request).await })
	};
	let opened = system.wait_for_open(1).await;
	let query = url::form_urlencoded::Serializer::new(String::new())
		.extend_pairs(&redirect_for(&opened, "the-code").params)
		.finish();
	let (status, page) = send(
		&router,
		Request::get(format!("/cb?{query}"))
			.header(header::HOST, CALLBACK_HOST)
			.body(Body::empty())
			.expect("Callback request should build."),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert!(page.contains("Authorization complete"));

	let (status, body) = pending.await.expect("Token request task should not panic.");

	(status, json(&body))
}

#[tokio::test]
async fn token_endpoint_passes_provider_fields_through() {
	let server = MockServer::start_async().await;

	mock_token_body(
		&server,
		r#"{"access_token":"access-raw","token_type":"Bearer","expires_in":"3600","ext_expires_in":3600,"session_state":"abc","not-before-policy":0}"#,
	)
	.await;

	let (status, token) = redeem_over_http(&server).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(token["access_token"], "access-raw");
	assert_eq!(token["token_type"], "Bearer");
	assert_eq!(token["expires_in"], "3600");
	assert_eq!(token["ext_expires_in"], 3600);
	assert_eq!(token["session_state"], "abc");
	assert_eq!(token["not-before-policy"], 0);
}

#[tokio::test]
async fn token_endpoint_returns_the_token_after_the_callback() {
	let server = MockServer::start_async().await;

	mock_token_success(&server, "access-http").await;

	let (status, token) = redeem_over_http(&server).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(token["access_token"], "access-http");
	assert_eq!(token["expires_in"], 3600);
	assert!(token.get("issued_at").is_some());
}
