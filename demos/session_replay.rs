//! Demonstrates a full session against a mock API: login, a burst of requests that all hit an
//! expired token, one shared refresh, transparent replay, and finally a refresh failure that ends
//! the session.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use session_broker::{
	client::ApiClient,
	config::{ClientConfig, Environment},
	http::ReqwestTransport,
	session::SessionExpired,
	store::{CookieJarStore, CredentialStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let config = ClientConfig::builder(Url::parse(&server.base_url())?)
		.environment(Environment::Development)
		.build()?;
	let jar = Arc::new(CookieJarStore::ephemeral(config.cookie_policy.clone()));
	let client = <ApiClient<ReqwestTransport>>::new(config, jar.clone())?.with_listener(Arc::new(
		|notice: &SessionExpired| {
			println!("session ended: {} (redirect to {})", notice.message, notice.redirect_to);
		},
	));
	let mut login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/token/");
			then.status(200).header("content-type", "application/json").body(
				"{\"access\":\"stale-access\",\"refresh\":\"refresh-1\",\"user\":{\"id\":1,\"name\":\"Demo\"}}",
			);
		})
		.await;

	client.login(&serde_json::json!({ "email": "demo@example.com", "password": "demo" })).await?;
	login.delete_async().await;

	println!("logged in; cookies: {:?}", jar.cookie_names());

	let user: serde_json::Value = client.check_auth().await?;

	println!("session user: {user} (authenticated: {})", client.is_authenticated());

	let expired = server
		.mock_async(|when, then| {
			when.method(GET).header("authorization", "Bearer stale-access");
			then.status(401);
		})
		.await;
	let mut refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/token/refresh/");
			then.status(200)
				.delay(Duration::from_millis(200))
				.body("{\"access\":\"fresh-access\",\"refresh\":\"refresh-2\"}");
		})
		.await;
	let mut fresh = server
		.mock_async(|when, then| {
			when.method(GET).header("authorization", "Bearer fresh-access");
			then.status(200).body("{\"ok\":true}");
		})
		.await;
	let (events, surveys) =
		tokio::join!(client.get("/api/events/"), client.get("/api/surveys/"));

	println!("events: {}", events?.text());
	println!("surveys: {}", surveys?.text());
	println!(
		"401s: {}, refreshes: {}, replays: {}",
		expired.calls_async().await,
		refresh.calls_async().await,
		fresh.calls_async().await
	);

	refresh.delete_async().await;
	fresh.delete_async().await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/profile/");
			then.status(401);
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/token/refresh/");
			then.status(401).body("{\"detail\":\"Token is blacklisted\"}");
		})
		.await;

	match client.get("/api/profile/").await {
		Ok(response) => println!("profile unexpectedly succeeded: {}", response.text()),
		Err(err) => println!("profile failed: {err} (re-authenticate: {})", err.is_auth_expired()),
	}

	println!("credentials after failure: {:?}", jar.get());

	Ok(())
}
