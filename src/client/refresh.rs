//! Single-flight access-token refresh with FIFO fan-out to parked callers.
//!
//! [`RefreshCoordinator`] is a two-state machine (`IDLE`, `REFRESHING`). The first caller that
//! needs a new token while idle becomes the driver and runs the exchange; every caller that
//! arrives while the exchange is in flight parks on a oneshot channel. When the exchange settles
//! the flag is reset and the queue drained under one lock acquisition, then every parked caller
//! is resolved in arrival order with the same outcome. Callers arriving after that point see
//! `IDLE` and start a fresh exchange instead of reusing a settled one.
//!
//! [`ApiClient::refresh_access_token`] drives the exchange against the configured refresh
//! endpoint, persists the rotated pair before anyone is resumed, and on failure clears the
//! credential store and raises the session-expired signal before parked callers are rejected.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::collections::VecDeque;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	client::ApiClient,
	error::RefreshError,
	http::{ApiRequest, HttpTransport},
	obs::{self, CallKind, CallOutcome, CallSpan},
	session,
};

type RefreshOutcome = Result<TokenSecret, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Debug, Default)]
struct RefreshState {
	refreshing: bool,
	queue: VecDeque<Waiter>,
}

enum Role {
	Driver,
	Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Coordinates concurrent callers so at most one refresh exchange is in flight.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
	state: Mutex<RefreshState>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Creates a coordinator that reports into `metrics`.
	pub fn new(metrics: Arc<RefreshMetrics>) -> Self {
		Self { state: Default::default(), metrics }
	}

	/// Counters shared with this coordinator.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns `true` while an exchange is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().refreshing
	}

	/// Number of callers currently parked behind the in-flight exchange.
	pub fn pending(&self) -> usize {
		self.state.lock().queue.len()
	}

	/// Runs `exchange` unless one is already in flight, in which case waits for that one.
	///
	/// Only the driver ever calls `exchange`. If the driver's future is dropped before the
	/// exchange settles, every parked caller is rejected with [`RefreshError::Abandoned`] and the
	/// coordinator returns to idle.
	pub async fn run<F, Fut>(&self, exchange: F) -> RefreshOutcome
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = RefreshOutcome>,
	{
		let role = {
			let mut state = self.state.lock();

			if state.refreshing {
				let (tx, rx) = oneshot::channel();

				state.queue.push_back(tx);

				Role::Waiter(rx)
			} else {
				state.refreshing = true;

				Role::Driver
			}
		};

		if let Role::Waiter(rx) = role {
			self.metrics.record_queued();

			#[cfg(feature = "tracing")]
			tracing::debug!("refresh already in flight; parking caller");

			return rx.await.unwrap_or(Err(RefreshError::Abandoned));
		}

		self.metrics.record_attempt();

		let guard = SettleGuard { coordinator: self, settled: false };
		let outcome = exchange().await;

		match &outcome {
			Ok(_) => self.metrics.record_success(),
			Err(_) => self.metrics.record_failure(),
		}

		guard.settle(&outcome);

		outcome
	}

	fn settle(&self, outcome: &RefreshOutcome) {
		let waiters = {
			let mut state = self.state.lock();

			state.refreshing = false;

			std::mem::take(&mut state.queue)
		};

		obs::record_refresh_waiters(waiters.len());

		for waiter in waiters {
			// A receiver that went away has nothing left to resume.
			let _ = waiter.send(outcome.clone());
		}
	}
}

struct SettleGuard<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl SettleGuard<'_> {
	fn settle(mut self, outcome: &RefreshOutcome) {
		self.settled = true;
		self.coordinator.settle(outcome);
	}
}
impl Drop for SettleGuard<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.coordinator.settle(&Err(RefreshError::Abandoned));
		}
	}
}

#[derive(Deserialize)]
struct RefreshResponse {
	access: TokenSecret,
	#[serde(default)]
	refresh: Option<TokenSecret>,
}

impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Obtains a new access token, joining the in-flight exchange if there is one.
	///
	/// On success the rotated pair is already stored when this returns. On failure the
	/// credential store is empty and the session listener has been notified exactly once for
	/// the failed exchange, regardless of how many callers were parked behind it.
	pub async fn refresh_access_token(&self) -> Result<TokenSecret, RefreshError> {
		self.coordinator.run(|| self.drive_refresh()).await
	}

	async fn drive_refresh(&self) -> RefreshOutcome {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "drive_refresh");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let current = self.credentials.get();
				let pair = self.exchange_refresh(current.as_ref()).await?;
				let access = pair.access.clone();

				self.credentials
					.set(pair)
					.map_err(|e| RefreshError::Storage { message: e.to_string() })?;

				#[cfg(feature = "tracing")]
				tracing::debug!("refresh exchange succeeded; rotated pair stored");

				Ok(access)
			})
			.await;

		if let Err(_err) = &result {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %_err, "refresh exchange failed; ending session");

			session::escalate(
				self.credentials.as_ref(),
				self.listener.as_ref(),
				&self.config.session_expired(),
			);
		}

		obs::record_call_outcome(KIND, CallOutcome::of(&result));

		result
	}

	async fn exchange_refresh(
		&self,
		current: Option<&TokenPair>,
	) -> Result<TokenPair, RefreshError> {
		let refresh = current.and_then(|pair| pair.refresh.as_ref());
		// Without a stored refresh token the credential travels as a transport cookie.
		let body = match refresh {
			Some(token) => serde_json::json!({ "refresh": token.expose() }),
			None => serde_json::json!({}),
		};
		let path = &self.config.endpoints.refresh;
		let url = self
			.config
			.resolve(path)
			.map_err(|e| RefreshError::Transport { message: e.to_string() })?;
		let outbound = ApiRequest::post(path.as_str())
			.json(&body)
			.and_then(|request| request.to_outbound(url, None))
			.map_err(|e| RefreshError::Transport { message: e.to_string() })?;
		let response = self
			.transport
			.execute(outbound)
			.await
			.map_err(|e| RefreshError::Transport { message: e.to_string() })?;

		self.observe_rotation(&response);

		if !response.is_success() {
			return Err(RefreshError::Rejected { status: response.status.as_u16() });
		}

		let mut de = serde_json::Deserializer::from_slice(&response.body);
		let decoded: RefreshResponse = serde_path_to_error::deserialize(&mut de)
			.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;

		if decoded.access.expose().is_empty() {
			return Err(RefreshError::MalformedResponse { message: "access token is empty".into() });
		}

		Ok(TokenPair { access: decoded.access, refresh: decoded.refresh.or_else(|| refresh.cloned()) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::task;
	// self
	use super::*;

	async fn wait_for_pending(coordinator: &RefreshCoordinator, expected: usize) {
		while coordinator.pending() < expected {
			task::yield_now().await;
		}
	}

	async fn wait_for_refreshing(coordinator: &RefreshCoordinator) {
		while !coordinator.is_refreshing() {
			task::yield_now().await;
		}
	}

	async fn exchange_never_called() -> RefreshOutcome {
		panic!("Only the driver may run the exchange.")
	}

	fn spawn_waiter(coordinator: &Arc<RefreshCoordinator>) -> task::JoinHandle<RefreshOutcome> {
		let coordinator = coordinator.clone();

		tokio::spawn(async move { coordinator.run(exchange_never_called).await })
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let coordinator = Arc::new(RefreshCoordinator::default());
		let calls = Arc::new(AtomicUsize::new(0));
		let (release, gate) = oneshot::channel::<()>();
		let driver = {
			let coordinator = coordinator.clone();
			let calls = calls.clone();

			tokio::spawn(async move {
				coordinator
					.run(|| async move {
						calls.fetch_add(1, Ordering::SeqCst);
						gate.await.expect("Test gate should be released.");

						Ok::<_, RefreshError>(TokenSecret::new("t2"))
					})
					.await
			})
		};

		wait_for_refreshing(&coordinator).await;

		let waiters = [spawn_waiter(&coordinator), spawn_waiter(&coordinator)];

		wait_for_pending(&coordinator, 2).await;
		release.send(()).expect("Driver should still be waiting on the gate.");

		let driven = driver.await.expect("Driver task should not panic.");

		assert_eq!(driven.expect("Driver should succeed.").expose(), "t2");

		for waiter in waiters {
			let token = waiter
				.await
				.expect("Waiter task should not panic.")
				.expect("Waiter should receive the driver's token.");

			assert_eq!(token.expose(), "t2");
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert_eq!(coordinator.metrics().queued(), 2);
		assert!(!coordinator.is_refreshing());
		assert_eq!(coordinator.pending(), 0);
	}

	#[tokio::test]
	async fn failure_fans_out_to_every_waiter() {
		let coordinator = Arc::new(RefreshCoordinator::default());
		let (release, gate) = oneshot::channel::<()>();
		let driver = {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator
					.run(|| async move {
						gate.await.expect("Test gate should be released.");

						Err::<TokenSecret, _>(RefreshError::Rejected { status: 401 })
					})
					.await
			})
		};

		wait_for_refreshing(&coordinator).await;

		let waiters = [spawn_waiter(&coordinator), spawn_waiter(&coordinator)];

		wait_for_pending(&coordinator, 2).await;
		release.send(()).expect("Driver should still be waiting on the gate.");

		assert_eq!(
			driver.await.expect("Driver task should not panic."),
			Err(RefreshError::Rejected { status: 401 })
		);

		for waiter in waiters {
			assert_eq!(
				waiter.await.expect("Waiter task should not panic."),
				Err(RefreshError::Rejected { status: 401 })
			);
		}

		assert_eq!(coordinator.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn waiters_resolve_in_arrival_order() {
		let coordinator = Arc::new(RefreshCoordinator::default());
		let order = Arc::new(Mutex::new(Vec::new()));
		let (release, gate) = oneshot::channel::<()>();
		let driver = {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator
					.run(|| async move {
						gate.await.expect("Test gate should be released.");

						Ok::<_, RefreshError>(TokenSecret::new("t2"))
					})
					.await
			})
		};

		wait_for_refreshing(&coordinator).await;

		let mut waiters = Vec::new();

		for id in 0..3 {
			let coordinator_for_task = coordinator.clone();
			let order = order.clone();

			waiters.push(tokio::spawn(async move {
				let outcome = coordinator_for_task.run(exchange_never_called).await;

				order.lock().push(id);

				outcome
			}));

			wait_for_pending(&coordinator, id + 1).await;
		}

		release.send(()).expect("Driver should still be waiting on the gate.");
		driver.await.expect("Driver task should not panic.").expect("Driver should succeed.");

		for waiter in waiters {
			waiter.await.expect("Waiter task should not panic.").expect("Waiter should succeed.");
		}

		assert_eq!(order.lock().as_slice(), [0, 1, 2]);
	}

	#[tokio::test]
	async fn abandoned_driver_releases_waiters() {
		let coordinator = Arc::new(RefreshCoordinator::default());
		let driver = {
			let coordinator = coordinator.clone();

			tokio::spawn(async move {
				coordinator.run(|| std::future::pending::<RefreshOutcome>()).await
			})
		};

		wait_for_refreshing(&coordinator).await;

		let waiter = spawn_waiter(&coordinator);

		wait_for_pending(&coordinator, 1).await;
		driver.abort();

		assert_eq!(
			waiter.await.expect("Waiter task should not panic."),
			Err(RefreshError::Abandoned)
		);
		assert!(!coordinator.is_refreshing());
	}

	#[tokio::test]
	async fn settled_refresh_is_not_reused() {
		let coordinator = RefreshCoordinator::default();
		let first = coordinator.run(|| async { Ok::<_, RefreshError>(TokenSecret::new("t2")) }).await;
		let second = coordinator.run(|| async { Ok::<_, RefreshError>(TokenSecret::new("t3")) }).await;

		assert_eq!(first.map(|t| t.expose().to_owned()), Ok("t2".into()));
		assert_eq!(second.map(|t| t.expose().to_owned()), Ok("t3".into()));
		assert_eq!(coordinator.metrics().attempts(), 2);
	}
}
