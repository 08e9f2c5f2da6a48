// crates.io
use http::Method;
// self
use crate::{_prelude::*, obs::CallKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by client operations.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided call kind + stage.
	pub fn new(kind: CallKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.call", call = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Creates a span for one API request, tagged with its method and path.
	///
	/// Query strings are dropped from the recorded path so credentials passed as parameters never
	/// reach the logs.
	pub fn request(kind: CallKind, stage: &'static str, method: &Method, path: &str) -> Self {
		let path = redacted_path(path);

		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"session_broker.call",
				call = kind.as_str(),
				stage,
				http.method = %method,
				http.path = path,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, method, path);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

fn redacted_path(path: &str) -> &str {
	path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn request_path_drops_query_and_fragment() {
		assert_eq!(redacted_path("/api/events/?token=secret"), "/api/events/");
		assert_eq!(redacted_path("/api/events/#top"), "/api/events/");
		assert_eq!(redacted_path("https://api.example.com/api/me/"), "https://api.example.com/api/me/");
	}

	#[tokio::test]
	async fn request_span_is_transparent() {
		let span = CallSpan::request(CallKind::Dispatch, "send", &Method::GET, "/api/events/?page=2");
		let value = span.instrument(async { "ok" }).await;

		assert_eq!(value, "ok");
	}

	#[tokio::test]
	async fn instrument_is_transparent() {
		let span = CallSpan::new(CallKind::Refresh, "instrument_is_transparent");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
