#![cfg(feature = "reqwest")]

// std
use std::sync::atomic::Ordering;
// crates.io
use httpmock::prelude::*;
// self
use gcip_iap_relay::{
	_preludet::*,
	auth::Credential,
	flows::FlowConclusion,
	handler::ProviderSession,
	protocol::Continuation,
};

const GCIP_CONFIG: &str = "{\"projectId\":\"demo-project\",\"projectNumber\":\"12345\",\"apiKey\":\"key-1\",\"authDomain\":\"demo.firebaseapp.com\",\"authorizedDomains\":[\"app.example.com\"]}";
const UI_CONFIG_DOUBLE: &str = "{\"key-1\":{\"authDomain\":\"demo.firebaseapp.com\",\"tenants\":{\"tenant-a\":{\"displayName\":\"Tenant A\"},\"tenant-b\":{\"displayName\":\"Tenant B\"}}}}";

async fn mock_gcip_config(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(GET).path("/gcipConfig");
			then.status(200).header("content-type", "application/json").body(GCIP_CONFIG);
		})
		.await;
}

fn credential(token: &str) -> Option<Credential> {
	Some(Credential::new(token))
}

#[tokio::test]
async fn single_tenant_sign_out_leaves_other_sessions_alone() {
	let server = MockServer::start_async().await;

	mock_gcip_config(&server).await;

	let token = Continuation::new("https://app.example.com/doc")
		.encode()
		.expect("Continuation should encode.");
	let handler = Arc::new(
		ScriptedHandler::default()
			.with_session(Some("tenant-a"), credential("token-a"))
			.with_session(Some("tenant-b"), credential("token-b")),
	);
	let orchestrator = build_test_orchestrator(
		&format!("https://auth.example.com/?mode=signout&apiKey=key-1&tenantId=tenant-a&state={token}"),
		handler.clone(),
		&server.base_url(),
	);
	let conclusion = orchestrator.start().await.expect("Single sign-out should succeed.");

	match conclusion {
		FlowConclusion::Redirect(directive) => {
			assert_eq!(directive.url, "https://app.example.com/doc");
		},
		other => panic!("Expected a redirect conclusion, got {other:?}."),
	}

	let tenant_a = handler.session(Some("tenant-a")).expect("Session fixture should exist.");
	let tenant_b = handler.session(Some("tenant-b")).expect("Session fixture should exist.");

	assert!(tenant_a.current_credential().is_none(), "the named tenant must be signed out");
	assert!(tenant_b.current_credential().is_some(), "other tenants must keep their sessions");
	assert_eq!(
		handler.completion_calls.load(Ordering::SeqCst),
		0,
		"the completion hook belongs to the multi-tenant flow only"
	);
}

#[tokio::test]
async fn multi_tenant_sign_out_visits_every_session_and_completes_in_place() {
	let server = MockServer::start_async().await;

	mock_gcip_config(&server).await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/config");
			then.status(200).header("content-type", "application/json").body(UI_CONFIG_DOUBLE);
		})
		.await;

	let handler = Arc::new(
		ScriptedHandler::default()
			.with_session(Some("tenant-a"), credential("token-a"))
			.with_session(Some("tenant-b"), credential("token-b")),
	);
	let orchestrator = build_test_orchestrator(
		"https://auth.example.com/?mode=signout&apiKey=key-1",
		handler.clone(),
		&server.base_url(),
	);
	let conclusion = orchestrator.start().await.expect("Multi sign-out should succeed.");

	assert_eq!(conclusion, FlowConclusion::Completed);

	for tenant in ["tenant-a", "tenant-b"] {
		let session = handler.session(Some(tenant)).expect("Session fixture should exist.");

		assert!(session.current_credential().is_none(), "{tenant} must be signed out");
	}

	assert_eq!(handler.completion_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn multi_tenant_sign_out_includes_the_agent_session() {
	let server = MockServer::start_async().await;

	mock_gcip_config(&server).await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/config");
			then.status(200).header("content-type", "application/json").body(
				"{\"key-1\":{\"authDomain\":\"demo.firebaseapp.com\",\"tenants\":{\"_12345\":{},\"tenant-a\":{}}}}",
			);
		})
		.await;

	let handler = Arc::new(
		ScriptedHandler::default()
			.with_session(None, credential("agent-token"))
			.with_session(Some("tenant-a"), credential("token-a")),
	);
	let orchestrator = build_test_orchestrator(
		"https://auth.example.com/?mode=signout&apiKey=key-1",
		handler.clone(),
		&server.base_url(),
	);

	orchestrator.start().await.expect("Multi sign-out should succeed.");

	let agent = handler.session(None).expect("Agent session fixture should exist.");
	let tenant_a = handler.session(Some("tenant-a")).expect("Session fixture should exist.");

	assert!(agent.current_credential().is_none(), "the sentinel must map to the agent session");
	assert!(tenant_a.current_credential().is_none());
}

#[tokio::test]
async fn sign_out_redirects_require_an_authorized_domain() {
	let server = MockServer::start_async().await;

	mock_gcip_config(&server).await;

	let token = Continuation::new("https://evil.example.org/landing")
		.encode()
		.expect("Continuation should encode.");
	let handler = Arc::new(
		ScriptedHandler::default().with_session(Some("tenant-a"), credential("token-a")),
	);
	let orchestrator = build_test_orchestrator(
		&format!("https://auth.example.com/?mode=signout&apiKey=key-1&tenantId=tenant-a&state={token}"),
		handler,
		&server.base_url(),
	);
	let err =
		orchestrator.start().await.expect_err("Unauthorized redirect must be rejected.");

	assert_eq!(err.code, ErrorCode::PermissionDenied);
}
