//! High-level handshake orchestration.
//!
//! The [`Orchestrator`] is the top-level state machine: it decodes the protocol intent
//! from the page URL exactly once, drives the handler and the HTTP layer through
//! per-step retry caches, and terminates each page load either with a redirect
//! directive or a locally completed flow. Terminal failures are surfaced to the
//! handler as typed error events; retry is always an explicit handler-triggered
//! re-entry (calling [`Orchestrator::start`] again), which reuses cached prefix steps.

pub mod common;
pub mod sign_in;
pub mod sign_out;

pub use common::*;

// self
use crate::{
	_prelude::*,
	backend::BackendRoutes,
	handler::{FlowEvent, FlowHandler},
	http::HttpTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	protocol::{ProtocolState, RedirectDirective},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Orchestrator specialized for the crate's default reqwest transport.
pub type ReqwestOrchestrator = Orchestrator<ReqwestTransport>;

/// How a flow terminated on this page load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowConclusion {
	/// The hosting page must perform this navigation.
	Redirect(RedirectDirective),
	/// The flow finished without leaving the page.
	Completed,
}

/// Coordinates the redirect-driven handshake for one page load.
///
/// The orchestrator owns the transport, the backend route declarations, the handler
/// reference, and the per-instance retry caches. Protocol state is decoded once at
/// construction and never mutated; a full-page navigation destroys the instance and
/// everything cached in it.
pub struct Orchestrator<C>
where
	C: ?Sized + HttpTransport,
{
	/// HTTP transport used for every outbound backend request.
	pub transport: Arc<C>,
	/// Capability set provided by the hosting application.
	pub handler: Arc<dyn FlowHandler>,
	/// Declared backend endpoints.
	pub routes: BackendRoutes,
	pub(crate) caches: StepCaches,
	pub(crate) page_url: Url,
	pub(crate) state: ProtocolState,
	pub(crate) progress_delay: StdDuration,
	pub(crate) resolved_tenant: Mutex<Option<crate::auth::TenantContext>>,
}
impl<C> Orchestrator<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates an orchestrator that reuses the caller-provided transport and routes.
	///
	/// The protocol state is decoded from `page_url` here, exactly once.
	pub fn with_transport(
		page_url: Url,
		handler: Arc<dyn FlowHandler>,
		transport: impl Into<Arc<C>>,
		routes: BackendRoutes,
	) -> Self {
		let state = ProtocolState::decode(&page_url);

		Self {
			transport: transport.into(),
			handler,
			routes,
			caches: StepCaches::default(),
			page_url,
			state,
			progress_delay: DEFAULT_PROGRESS_DELAY,
			resolved_tenant: Mutex::new(None),
		}
	}

	/// Overrides the settle delay before a progress event is shown.
	pub fn with_progress_delay(mut self, delay: StdDuration) -> Self {
		self.progress_delay = delay;

		self
	}

	/// The protocol state decoded for this page load.
	pub fn state(&self) -> &ProtocolState {
		&self.state
	}

	/// Explicit session reset: empties every step cache and the resolved tenant.
	pub fn reset(&self) {
		self.caches.clear_all();
		*self.resolved_tenant.lock() = None;
	}

	/// Runs the protocol step for the current page load.
	///
	/// Terminal errors are also delivered to the handler as [`FlowEvent::Error`] with a
	/// `retryable` flag; calling `start()` again re-enters the failed step while the
	/// caches keep the already-succeeded prefix free.
	pub async fn start(&self) -> Result<FlowConclusion> {
		let result = self.dispatch().await;

		if let Err(err) = &result {
			let retryable =
				!matches!(err.code, ErrorCode::InvalidArgument | ErrorCode::FailedPrecondition);

			self.handler.on_event(FlowEvent::Error { error: err.clone(), retryable });
		}

		result
	}

	async fn dispatch(&self) -> Result<FlowConclusion> {
		let kind = match &self.state {
			ProtocolState::SignIn { .. } => FlowKind::SignIn,
			ProtocolState::SignInCallback { .. } => FlowKind::SignInCallback,
			ProtocolState::SignOutSingle { .. } => FlowKind::SignOutSingle,
			ProtocolState::SignOutMulti { .. } => FlowKind::SignOutMulti,
			ProtocolState::Unknown =>
				return Err(TypedError::invalid_argument(
					"Page URL is missing or carries malformed protocol markers.",
				)),
		};
		let span = FlowSpan::new(kind, "start");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				match &self.state {
					ProtocolState::SignIn { api_key, tenant, continuation } =>
						self.run_sign_in_flow(api_key, tenant.as_ref(), continuation.as_deref())
							.await,
					ProtocolState::SignInCallback { api_key, tenant, continuation } =>
						self.run_sign_in_callback(api_key, tenant.as_ref(), continuation.as_deref())
							.await,
					ProtocolState::SignOutSingle { api_key, tenant, continuation } =>
						self.run_sign_out_single(api_key, tenant, continuation.as_deref()).await,
					ProtocolState::SignOutMulti { api_key, continuation } =>
						self.run_sign_out_multi(api_key, continuation.as_deref()).await,
					ProtocolState::Unknown => Err(TypedError::invalid_argument(
						"Page URL is missing or carries malformed protocol markers.",
					)),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}
}
#[cfg(feature = "reqwest")]
impl Orchestrator<ReqwestTransport> {
	/// Creates an orchestrator with a default reqwest transport and routes declared
	/// against the page's own origin.
	///
	/// Fails with `invalid-argument` when the page URL has no usable origin.
	pub fn new(page_url: Url, handler: Arc<dyn FlowHandler>) -> Result<Self> {
		let origin = page_url.origin();

		if !matches!(origin, url::Origin::Tuple(..)) {
			return Err(TypedError::invalid_argument("Page URL has an opaque origin."));
		}

		let origin = Url::parse(&origin.ascii_serialization()).map_err(|err| {
			TypedError::invalid_argument("Page URL origin is not a valid base URL.")
				.with_reason(err)
		})?;
		let routes = BackendRoutes::new(&origin, None);

		Ok(Self::with_transport(page_url, handler, ReqwestTransport::default(), routes))
	}
}
impl<C> Debug for Orchestrator<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Orchestrator")
			.field("page_url", &self.page_url.as_str())
			.field("state", &self.state)
			.finish()
	}
}
