//! Shared flow machinery: step caches, the deferred progress helper, and tenant
//! resolution.

// self
use crate::{
	_prelude::*,
	auth::{ApiKey, SessionExchangeResult, TenantContext, TenantId},
	backend::{ProjectConfig, UiConfig},
	cache::RetryCache,
	flows::Orchestrator,
	handler::{FlowEvent, FlowHandler, TenantCandidate},
	http::HttpTransport,
};

/// TTL for the configuration steps (project + UI config).
pub(crate) const CONFIG_TTL: Duration = Duration::minutes(30);
/// TTL for the session exchange step.
pub(crate) const EXCHANGE_TTL: Duration = Duration::minutes(5);
/// Settle delay before a network wait surfaces a progress event.
pub const DEFAULT_PROGRESS_DELAY: StdDuration = StdDuration::from_millis(500);

/// Per-orchestrator retry caches, one per step family.
pub(crate) struct StepCaches {
	pub project_config: RetryCache<ProjectConfig>,
	pub ui_config: RetryCache<UiConfig>,
	pub exchange: RetryCache<SessionExchangeResult>,
}
impl StepCaches {
	pub fn clear_all(&self) {
		self.project_config.clear();
		self.ui_config.clear();
		self.exchange.clear();
	}
}
impl Default for StepCaches {
	fn default() -> Self {
		Self {
			project_config: RetryCache::new("project_config"),
			ui_config: RetryCache::new("ui_config"),
			exchange: RetryCache::new("session_exchange"),
		}
	}
}

/// Runs a step future, surfacing progress events only when the wait outlives the
/// settle delay.
///
/// Short waits complete silently. Once [`FlowEvent::ShowProgress`] has been emitted a
/// matching [`FlowEvent::HideProgress`] always follows, success or failure.
pub(crate) async fn with_progress<T, Fut>(
	handler: &Arc<dyn FlowHandler>,
	delay: StdDuration,
	fut: Fut,
) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	tokio::pin!(fut);

	tokio::select! {
		result = &mut fut => return result,
		_ = tokio::time::sleep(delay) => {},
	}

	handler.on_event(FlowEvent::ShowProgress);

	let result = fut.await;

	handler.on_event(FlowEvent::HideProgress);

	result
}

impl<C> Orchestrator<C>
where
	C: ?Sized + HttpTransport,
{
	/// Project configuration, served from the step cache after the first call.
	pub(crate) async fn project_config(&self) -> Result<ProjectConfig> {
		let args = serde_json::json!({});

		self.caches
			.project_config
			.cache_and_return(&args, CONFIG_TTL, || self.routes.gcip_config(&*self.transport))
			.await
	}

	/// UI/tenant configuration, served from the step cache after the first call.
	pub(crate) async fn ui_config(&self) -> Result<UiConfig> {
		let args = serde_json::json!({});

		self.caches
			.ui_config
			.cache_and_return(&args, CONFIG_TTL, || self.routes.ui_config(&*self.transport))
			.await
	}

	/// Tenants advertised for the API key, in stable (sorted) order.
	pub(crate) fn tenant_candidates(
		&self,
		ui_config: &UiConfig,
		api_key: &ApiKey,
	) -> Vec<TenantCandidate> {
		let Some(block) = ui_config.for_api_key(api_key) else {
			return Vec::new();
		};

		block
			.tenants
			.iter()
			.filter_map(|(id, tenant)| {
				Some(TenantCandidate {
					tenant_id: TenantId::new(id).ok()?,
					display_name: tenant.display_name.clone(),
					provider_ids: tenant.provider_ids.clone(),
				})
			})
			.collect()
	}

	/// Resolves the tenant context for this page load, at most once.
	///
	/// Precedence: an explicit tenant (URL marker or continuation payload) wins; with
	/// exactly one advertised candidate it is auto-selected; otherwise the handler's
	/// selection capability decides, and its absence terminates the flow with
	/// `failed-precondition`. The top-level sentinel always maps to the agent flow
	/// (`tenant_id = None`).
	pub(crate) async fn resolve_tenant(
		&self,
		api_key: &ApiKey,
		explicit: Option<&TenantId>,
		project: &ProjectConfig,
	) -> Result<TenantContext> {
		if let Some(context) = self.resolved_tenant.lock().clone() {
			return Ok(context);
		}

		let ui_config =
			with_progress(&self.handler, self.progress_delay, self.ui_config()).await?;
		let sentinel = project.top_level_sentinel();
		let context = if let Some(tenant) = explicit {
			self.context_for(tenant, api_key, &ui_config, sentinel.as_deref())
		} else {
			let candidates = self.tenant_candidates(&ui_config, api_key);

			match candidates.as_slice() {
				[] => TenantContext::agent(Vec::new()),
				[only] => self.context_for(
					&only.tenant_id,
					api_key,
					&ui_config,
					sentinel.as_deref(),
				),
				_ => {
					let Some(selection) = self.handler.select_tenant(project, &candidates)
					else {
						return Err(TypedError::failed_precondition(
							"Multiple tenants are available and the handler offers no tenant selection.",
						));
					};
					let selected = selection.await?;

					self.context_for(&selected, api_key, &ui_config, sentinel.as_deref())
				},
			}
		};

		*self.resolved_tenant.lock() = Some(context.clone());

		Ok(context)
	}

	fn context_for(
		&self,
		tenant: &TenantId,
		api_key: &ApiKey,
		ui_config: &UiConfig,
		sentinel: Option<&str>,
	) -> TenantContext {
		let provider_ids = ui_config
			.for_api_key(api_key)
			.and_then(|block| block.tenants.get(tenant.as_ref()))
			.map(|tenant| tenant.provider_ids.clone())
			.unwrap_or_default();

		if sentinel == Some(tenant.as_ref()) {
			TenantContext::agent(provider_ids)
		} else {
			TenantContext::tenant(tenant.clone(), provider_ids)
		}
	}
}
