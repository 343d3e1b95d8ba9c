//! The capability contract a hosting application implements.
//!
//! The orchestrator is polymorphic over [`FlowHandler`] and never touches any UI
//! directly. Two capabilities are required (provider sessions and the sign-in UI);
//! everything else is optional and modeled as present/absent return values, never as
//! runtime existence probing. UI transitions (progress, errors) are delivered as typed
//! [`FlowEvent`] messages so a swappable presentation layer can subscribe and render.

// self
use crate::{
	_prelude::*,
	auth::{ApiKey, Credential, TenantContext, TenantId},
	backend::ProjectConfig,
};

/// Boxed future returned by handler capabilities.
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// A provider-backed session handle for one `(api_key, tenant)` pair.
///
/// Obtained from [`FlowHandler::provider_session`]; wraps whatever the identity
/// provider SDK exposes for the tenant (or the project-level agent flow when the
/// tenant is absent).
pub trait ProviderSession
where
	Self: Send + Sync,
{
	/// The currently signed-in credential, when one exists.
	fn current_credential(&self) -> Option<Credential>;

	/// Invalidates this tenant's session.
	fn sign_out(&self) -> HandlerFuture<'_, ()>;
}

/// A tenant the user may authenticate against, as advertised by the UI config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantCandidate {
	/// Tenant identifier; the synthetic top-level sentinel denotes the agent flow.
	pub tenant_id: TenantId,
	/// Display name for selection UIs.
	pub display_name: Option<String>,
	/// Identity providers enabled for the tenant.
	pub provider_ids: Vec<String>,
}

/// Typed UI transition emitted by the orchestrator.
///
/// Delivery is advisory; a handler that ignores events simply renders nothing.
#[derive(Clone, Debug)]
pub enum FlowEvent {
	/// A visible network wait started and outlived the settle delay.
	ShowProgress,
	/// The wait that previously showed progress has ended.
	HideProgress,
	/// The flow terminated in its absorbing error state.
	Error {
		/// The terminal error.
		error: TypedError,
		/// Whether re-entering the flow (calling `start()` again) is safe; cached
		/// prefix steps are reused on re-entry.
		retryable: bool,
	},
}

/// Capability set the hosting application provides to the orchestrator.
pub trait FlowHandler
where
	Self: Send + Sync,
{
	/// Required: obtains the provider session for the tenant (or the agent flow when
	/// `tenant` is `None`).
	fn provider_session<'a>(
		&'a self,
		api_key: &'a ApiKey,
		tenant: Option<&'a TenantId>,
	) -> HandlerFuture<'a, Arc<dyn ProviderSession>>;

	/// Required: runs the sign-in UI flow and resolves a credential.
	///
	/// May suspend across a full-page redirect boundary; the orchestrator treats the
	/// wait as uncancellable.
	fn run_sign_in<'a>(
		&'a self,
		api_key: &'a ApiKey,
		context: &'a TenantContext,
	) -> HandlerFuture<'a, Credential>;

	/// Optional: asks the user to pick a tenant among the candidates.
	///
	/// Returning `None` means the capability is absent; unresolved ambiguity then
	/// terminates the flow with `failed-precondition`.
	fn select_tenant<'a>(
		&'a self,
		project: &'a ProjectConfig,
		candidates: &'a [TenantCandidate],
	) -> Option<HandlerFuture<'a, TenantId>> {
		let _ = (project, candidates);

		None
	}

	/// Optional: runs the "all tenants signed out" completion UI.
	///
	/// Only invoked by the multi-tenant sign-out flow; absence is a no-op.
	fn sign_out_complete(&self) -> Option<HandlerFuture<'_, ()>> {
		None
	}

	/// Receives typed UI transitions. Default is a no-op sink.
	fn on_event(&self, event: FlowEvent) {
		let _ = event;
	}
}
