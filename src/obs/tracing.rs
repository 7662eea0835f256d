// self
use crate::{_prelude::*, obs::FetchKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFetch<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFetch<F> = F;

/// A span builder used around token exchanges.
#[derive(Clone, Debug)]
pub struct FetchSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FetchSpan {
	/// Creates a new span tagged with the exchange kind and target host.
	pub fn new(kind: FetchKind, host: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("registry_auth.fetch", kind = kind.as_str(), host);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, host);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFetch<Fut>
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

/// Emits the registry's error payload at debug level when a token exchange is rejected.
pub(crate) fn record_endpoint_rejection(status: u16, body: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(status, body, "token request failed");
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (status, body);
	}
}
