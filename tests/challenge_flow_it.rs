// crates.io
use httpmock::prelude::*;
// self
use registry_auth_broker::{
	_preludet::*,
	auth::AuthScheme,
	authorizer::AttemptResponse,
	reqwest::{Method, Request, StatusCode},
	session::{StaticSessionGroup, TokenAuthority},
};

const HOST: &str = "registry.example.com";
const MANIFEST_URL: &str = "https://registry.example.com/v2/library/alpine/manifests/latest";
const PULL_SCOPE: &str = "repository:library/alpine:pull";
const PULL_PUSH_SCOPE: &str = "repository:library/alpine:pull,push";

fn challenge_response(url: &str, header: &str) -> AttemptResponse {
	AttemptResponse {
		method: Method::GET,
		url: Url::parse(url).expect("Challenge URL should parse."),
		status: StatusCode::UNAUTHORIZED,
		www_authenticate: vec![header.to_owned()],
	}
}

fn bare_attempt(url: &str) -> AttemptResponse {
	AttemptResponse {
		method: Method::GET,
		url: Url::parse(url).expect("Attempt URL should parse."),
		status: StatusCode::UNAUTHORIZED,
		www_authenticate: Vec::new(),
	}
}

fn registry_request(url: &str) -> Request {
	Request::new(Method::GET, Url::parse(url).expect("Request URL should parse."))
}

fn authorization_of(request: &Request) -> String {
	request
		.headers()
		.get("authorization")
		.expect("The request should carry an Authorization header.")
		.to_str()
		.expect("The Authorization header should be visible ASCII.")
		.to_owned()
}

#[tokio::test]
async fn scope_widening_evicts_and_unions() {
	let server = MockServer::start_async().await;
	let provider =
		Arc::new(TestCredentialProvider::default().with_credentials(HOST, "s1", "alice", "s3cret"));
	let (authorizer, registry) = build_test_authorizer(provider, &["s1"]);
	let realm = server.url("/token");

	authorizer
		.add_responses(&[challenge_response(
			MANIFEST_URL,
			&format!(r#"Bearer realm="{realm}",service="{HOST}",scope="{PULL_SCOPE}""#),
		)])
		.await
		.expect("The initial challenge should install a pull-scoped handler.");

	let original = registry
		.get(HOST, &StaticSessionGroup::new(["s1"]))
		.await
		.expect("The pull-scoped handler should be installed.");

	// the widened challenge answers the same request a second time
	authorizer
		.add_responses(&[
			bare_attempt(MANIFEST_URL),
			challenge_response(
				MANIFEST_URL,
				&format!(
					r#"Bearer realm="{realm}",service="{HOST}",error="insufficient_scope",scope="{PULL_PUSH_SCOPE}""#,
				),
			),
		])
		.await
		.expect("Scope widening should install a replacement handler.");

	let widened = registry
		.get(HOST, &StaticSessionGroup::new(["s1"]))
		.await
		.expect("The widened handler should be installed.");

	assert!(!Arc::ptr_eq(&original, &widened));
	assert_eq!(widened.common().scopes, vec![PULL_PUSH_SCOPE.to_owned()]);

	// the next fetch asks for both actions in one scope parameter
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/token").query_param("scope", PULL_PUSH_SCOPE);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"token":"wide","expires_in":3600}"#);
		})
		.await;
	let mut request = registry_request(MANIFEST_URL);

	authorizer
		.authorize(&mut request, &[])
		.await
		.expect("The widened handler should fetch with the unioned scopes.");

	assert_eq!(authorization_of(&request), "Bearer wide");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn insufficient_scope_over_held_scopes_is_fatal() {
	let provider =
		Arc::new(TestCredentialProvider::default().with_credentials(HOST, "s1", "alice", "s3cret"));
	let (authorizer, registry) = build_test_authorizer(provider, &["s1"]);

	authorizer
		.add_responses(&[challenge_response(
			MANIFEST_URL,
			&format!(r#"Bearer realm="https://auth.example.com/token",service="{HOST}",scope="{PULL_PUSH_SCOPE}""#),
		)])
		.await
		.expect("The initial challenge should install a pull+push handler.");

	let err = authorizer
		.add_responses(&[
			bare_attempt(MANIFEST_URL),
			challenge_response(
				MANIFEST_URL,
				&format!(
					r#"Bearer realm="https://auth.example.com/token",service="{HOST}",error="insufficient_scope",scope="{PULL_PUSH_SCOPE}""#,
				),
			),
		])
		.await
		.expect_err("Demanding scopes that were already held must be fatal.");

	assert!(matches!(err, Error::InsufficientScope { .. }));
	assert!(registry.get(HOST, &StaticSessionGroup::new(["s1"])).await.is_none());
	assert!(registry.is_empty());
}

#[tokio::test]
async fn surviving_handlers_are_reused_on_fresh_challenges() {
	let provider =
		Arc::new(TestCredentialProvider::default().with_credentials(HOST, "s1", "alice", "s3cret"));
	let (authorizer, registry) = build_test_authorizer(provider, &["s1"]);
	let challenge = format!(r#"Bearer realm="https://auth.example.com/token",service="{HOST}""#);

	authorizer
		.add_responses(&[challenge_response(MANIFEST_URL, &challenge)])
		.await
		.expect("The initial challenge should install a handler.");

	let original = registry
		.get(HOST, &StaticSessionGroup::new(["s1"]))
		.await
		.expect("The handler should be installed.");

	// an errorless re-challenge keeps the existing handler
	authorizer
		.add_responses(&[bare_attempt(MANIFEST_URL), challenge_response(MANIFEST_URL, &challenge)])
		.await
		.expect("An errorless re-challenge should succeed.");

	let reused = registry
		.get(HOST, &StaticSessionGroup::new(["s1"]))
		.await
		.expect("The handler should still be installed.");

	assert!(Arc::ptr_eq(&original, &reused));
}

#[tokio::test]
async fn sessions_with_matching_credentials_share_one_handler() {
	let server = MockServer::start_async().await;
	let provider = Arc::new(
		TestCredentialProvider::default()
			.with_credentials(HOST, "s-a", "alice", "s3cret")
			.with_credentials(HOST, "s-b", "alice", "s3cret"),
	);
	let (authorizer_a, registry) = build_test_authorizer(provider, &["s-a"]);
	let authorizer_b = join_test_registry(registry.clone(), &["s-b"]);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"token":"shared","expires_in":3600}"#);
		})
		.await;

	authorizer_a
		.add_responses(&[challenge_response(
			MANIFEST_URL,
			&format!(r#"Bearer realm="{}",service="{HOST}""#, server.url("/token")),
		)])
		.await
		.expect("Client A's challenge should install a handler.");

	let scopes = vec![PULL_SCOPE.to_owned()];
	let mut request_a = registry_request(MANIFEST_URL);

	authorizer_a
		.authorize(&mut request_a, &scopes)
		.await
		.expect("Client A should fetch a token.");

	// client B proves the same credentials and reuses A's cache without a fetch
	let mut request_b = registry_request(MANIFEST_URL);

	authorizer_b
		.authorize(&mut request_b, &scopes)
		.await
		.expect("Client B should be linked to A's handler.");

	assert_eq!(authorization_of(&request_a), "Bearer shared");
	assert_eq!(authorization_of(&request_b), "Bearer shared");
	assert_eq!(registry.len(), 2);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn sessions_with_different_credentials_stay_isolated() {
	let server = MockServer::start_async().await;
	let provider = Arc::new(
		TestCredentialProvider::default()
			.with_credentials(HOST, "s-a", "alice", "s3cret")
			.with_credentials(HOST, "s-b", "mallory", "other"),
	);
	let (authorizer_a, registry) = build_test_authorizer(provider, &["s-a"]);
	let authorizer_b = join_test_registry(registry.clone(), &["s-b"]);

	authorizer_a
		.add_responses(&[challenge_response(
			MANIFEST_URL,
			&format!(r#"Bearer realm="{}",service="{HOST}""#, server.url("/token")),
		)])
		.await
		.expect("Client A's challenge should install a handler.");

	let mut request_b = registry_request(MANIFEST_URL);

	authorizer_b
		.authorize(&mut request_b, &[])
		.await
		.expect("Client B without a handler should be a no-op.");

	assert!(request_b.headers().get("authorization").is_none());
	assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn delegated_authorities_mint_without_touching_the_registry() {
	let backend = Arc::new(
		TestCredentialProvider::default()
			.with_authority(HOST, "s1", TokenAuthority::new([7; 32]))
			.with_delegated_token("minted", 3600, 0),
	);
	let (authorizer, _registry) = build_test_authorizer(backend.clone(), &["s1"]);

	authorizer
		.add_responses(&[challenge_response(
			MANIFEST_URL,
			&format!(r#"Bearer realm="https://auth.example.com/token",service="{HOST}""#),
		)])
		.await
		.expect("The challenge should install a delegated handler.");

	let mut request = registry_request(MANIFEST_URL);

	authorizer
		.authorize(&mut request, &[PULL_SCOPE.to_owned()])
		.await
		.expect("The delegated mint should produce a token.");

	assert_eq!(authorization_of(&request), "Bearer minted");

	let minted = backend
		.last_delegated_request()
		.expect("The delegated signer should have been called.");

	assert_eq!(minted.client_id, "buildkit-client");
	assert_eq!(minted.host, HOST);
	assert_eq!(minted.realm, "https://auth.example.com/token");
	assert_eq!(minted.service, HOST);
	assert_eq!(minted.scopes, vec![PULL_SCOPE.to_owned()]);
}

#[tokio::test]
async fn basic_challenges_install_basic_handlers() {
	let provider =
		Arc::new(TestCredentialProvider::default().with_credentials(HOST, "s1", "alice", "s3cret"));
	let (authorizer, registry) = build_test_authorizer(provider, &["s1"]);

	authorizer
		.add_responses(&[challenge_response(MANIFEST_URL, r#"Basic realm="registry""#)])
		.await
		.expect("A basic challenge with credentials should install a handler.");

	let handler = registry
		.get(HOST, &StaticSessionGroup::new(["s1"]))
		.await
		.expect("The basic handler should be installed.");

	assert_eq!(*handler.scheme(), AuthScheme::Basic);

	let mut request = registry_request(MANIFEST_URL);

	authorizer
		.authorize(&mut request, &[])
		.await
		.expect("Basic authorization should succeed.");

	assert_eq!(authorization_of(&request), "Basic YWxpY2U6czNjcmV0");
}

#[tokio::test]
async fn unsupported_or_unsatisfiable_challenges_fail() {
	let provider =
		Arc::new(TestCredentialProvider::default().with_credentials(HOST, "s1", "", ""));
	let (authorizer, _registry) = build_test_authorizer(provider, &["s1"]);

	// an unknown scheme alone cannot install anything
	let err = authorizer
		.add_responses(&[challenge_response(MANIFEST_URL, "Negotiate")])
		.await
		.expect_err("An unknown scheme must be rejected.");

	assert!(matches!(err, Error::NoSupportedScheme));

	// a basic challenge with empty credentials keeps scanning and comes up empty
	let err = authorizer
		.add_responses(&[challenge_response(MANIFEST_URL, r#"Basic realm="registry""#)])
		.await
		.expect_err("Basic without credentials must be rejected.");

	assert!(matches!(err, Error::NoSupportedScheme));
}

#[tokio::test]
async fn missing_credentials_surface_from_the_challenge_path() {
	let provider = Arc::new(TestCredentialProvider::default());
	let (authorizer, _registry) = build_test_authorizer(provider, &["s1"]);
	let err = authorizer
		.add_responses(&[challenge_response(
			MANIFEST_URL,
			&format!(r#"Bearer realm="https://auth.example.com/token",service="{HOST}""#),
		)])
		.await
		.expect_err("A bearer challenge without any credential source must fail.");

	assert!(matches!(err, Error::Credential(_)));
}
