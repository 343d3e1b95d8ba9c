//! Sign-out flows: single-tenant and all-tenants.

// self
use crate::{
	_prelude::*,
	auth::{ApiKey, TenantId},
	backend::ProjectConfig,
	flows::{FlowConclusion, Orchestrator, with_progress},
	http::HttpTransport,
	protocol::RedirectDirective,
};

impl<C> Orchestrator<C>
where
	C: ?Sized + HttpTransport,
{
	/// Signs out the single tenant named in the URL, then redirects.
	///
	/// The completion hook is never invoked here; it belongs to the multi-tenant flow
	/// only.
	pub(crate) async fn run_sign_out_single(
		&self,
		api_key: &ApiKey,
		tenant: &TenantId,
		continuation: Option<&str>,
	) -> Result<FlowConclusion> {
		let project =
			with_progress(&self.handler, self.progress_delay, self.project_config()).await?;
		let sentinel = project.top_level_sentinel();
		// The sentinel names the project-level session, not a real tenant.
		let target =
			if sentinel.as_deref() == Some(tenant.as_ref()) { None } else { Some(tenant) };
		let session = self.handler.provider_session(api_key, target).await?;

		with_progress(&self.handler, self.progress_delay, session.sign_out()).await?;

		self.sign_out_conclusion(&project, continuation)
	}

	/// Signs out every tenant currently holding a session, strictly sequentially, then
	/// runs the completion hook (when present) and redirects.
	pub(crate) async fn run_sign_out_multi(
		&self,
		api_key: &ApiKey,
		continuation: Option<&str>,
	) -> Result<FlowConclusion> {
		let project =
			with_progress(&self.handler, self.progress_delay, self.project_config()).await?;
		let ui_config =
			with_progress(&self.handler, self.progress_delay, self.ui_config()).await?;
		let sentinel = project.top_level_sentinel();
		let candidates = self.tenant_candidates(&ui_config, api_key);

		// Sequential on purpose: provider sessions share per-tenant storage, so
		// concurrent sign-outs would race it.
		for candidate in &candidates {
			let target = if sentinel.as_deref() == Some(candidate.tenant_id.as_ref()) {
				None
			} else {
				Some(&candidate.tenant_id)
			};
			let session = self.handler.provider_session(api_key, target).await?;

			if session.current_credential().is_some() {
				with_progress(&self.handler, self.progress_delay, session.sign_out()).await?;
			}
		}

		if let Some(completion) = self.handler.sign_out_complete() {
			completion.await?;
		}

		self.sign_out_conclusion(&project, continuation)
	}

	/// Redirects to the continuation's original resource when one decodes, otherwise
	/// the flow completes in place.
	fn sign_out_conclusion(
		&self,
		project: &ProjectConfig,
		continuation: Option<&str>,
	) -> Result<FlowConclusion> {
		let Some(decoded) = super::sign_in::decode_continuation(continuation) else {
			return Ok(FlowConclusion::Completed);
		};
		let directive = RedirectDirective::navigate(decoded.original_uri);

		self.authorize_redirect(project, &directive)?;

		Ok(FlowConclusion::Redirect(directive))
	}
}
