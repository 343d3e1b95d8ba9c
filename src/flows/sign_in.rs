//! Sign-in flows: the fresh sign-in entry and the post-redirect callback.

// self
use crate::{
	_prelude::*,
	auth::{ApiKey, Credential, TenantContext, TenantId},
	flows::{EXCHANGE_TTL, FlowConclusion, Orchestrator, with_progress},
	http::{HttpMethod, HttpTransport},
	protocol::{Continuation, RedirectDirective},
};

impl<C> Orchestrator<C>
where
	C: ?Sized + HttpTransport,
{
	/// Fresh sign-in: resolve the tenant, reuse an existing session or run the sign-in
	/// UI, then exchange and redirect.
	pub(crate) async fn run_sign_in_flow(
		&self,
		api_key: &ApiKey,
		url_tenant: Option<&TenantId>,
		continuation: Option<&str>,
	) -> Result<FlowConclusion> {
		let decoded = decode_continuation(continuation);
		let explicit = url_tenant.or_else(|| decoded.as_ref().and_then(|c| c.tenant.as_ref()));
		let project =
			with_progress(&self.handler, self.progress_delay, self.project_config()).await?;
		let context = self.resolve_tenant(api_key, explicit, &project).await?;
		let session = self.handler.provider_session(api_key, context.tenant_id.as_ref()).await?;
		let credential = match session.current_credential() {
			Some(credential) => credential,
			None => self.handler.run_sign_in(api_key, &context).await?,
		};

		self.complete_sign_in(api_key, &context, &credential, continuation, decoded).await
	}

	/// Sign-in callback: the federated redirect returned, so a credential must already
	/// exist; anything else is an `unauthenticated` terminal error.
	pub(crate) async fn run_sign_in_callback(
		&self,
		api_key: &ApiKey,
		url_tenant: Option<&TenantId>,
		continuation: Option<&str>,
	) -> Result<FlowConclusion> {
		let decoded = decode_continuation(continuation);
		let explicit = url_tenant.or_else(|| decoded.as_ref().and_then(|c| c.tenant.as_ref()));
		let project =
			with_progress(&self.handler, self.progress_delay, self.project_config()).await?;
		let context = self.resolve_tenant(api_key, explicit, &project).await?;
		let session = self.handler.provider_session(api_key, context.tenant_id.as_ref()).await?;
		let credential = session.current_credential().ok_or_else(|| {
			TypedError::new(ErrorCode::Unauthenticated)
				.with_message("Sign-in callback reached without a signed-in credential.")
		})?;

		self.complete_sign_in(api_key, &context, &credential, continuation, decoded).await
	}

	/// Exchanges the credential for a proxy session and builds the final redirect.
	///
	/// The exchange is cached so that a handler-triggered retry of a failed redirect
	/// never re-runs it for the same credential. The cookie-setting submission uses the
	/// method and fields verbatim from the exchange payload; a plain GET with no fields
	/// collapses into a direct navigation to the original resource when one is known.
	async fn complete_sign_in(
		&self,
		api_key: &ApiKey,
		context: &TenantContext,
		credential: &Credential,
		continuation: Option<&str>,
		decoded: Option<Continuation>,
	) -> Result<FlowConclusion> {
		let project = self.project_config().await?;
		let args = serde_json::json!({
			"apiKey": api_key.as_ref(),
			"tenantId": context.tenant_id.as_deref(),
			"idToken": credential.id_token.expose(),
			"state": continuation,
		});
		let exchange = with_progress(
			&self.handler,
			self.progress_delay,
			self.caches.exchange.cache_and_return(&args, EXCHANGE_TTL, || {
				self.routes.exchange_session(&*self.transport, api_key, credential, continuation)
			}),
		)
		.await?;
		// The continuation minted at flow start wins over whatever the backend echoed.
		let original = decoded
			.map(|c| c.original_uri)
			.or_else(|| exchange.original_url.clone());
		let directive =
			if exchange.redirect_method == HttpMethod::Get && exchange.redirect_fields.is_empty() {
				RedirectDirective::navigate(original.unwrap_or_else(|| exchange.target_url.clone()))
			} else {
				RedirectDirective {
					method: exchange.redirect_method,
					url: exchange.target_url.clone(),
					fields: exchange.redirect_fields.clone(),
				}
			};

		self.authorize_redirect(&project, &directive)?;

		Ok(FlowConclusion::Redirect(directive))
	}

	/// Rejects redirect targets outside the project's authorized domains.
	pub(crate) fn authorize_redirect(
		&self,
		project: &crate::backend::ProjectConfig,
		directive: &RedirectDirective,
	) -> Result<()> {
		let target = Url::parse(&directive.url).map_err(|err| {
			TypedError::invalid_argument("Redirect target is not a valid URL.").with_reason(err)
		})?;

		if project.authorized_domains.is_empty() || project.authorizes(&target) {
			Ok(())
		} else {
			Err(TypedError::new(ErrorCode::PermissionDenied)
				.with_message("Redirect target is not an authorized domain."))
		}
	}
}

/// Best-effort decode of the opaque continuation token.
///
/// Hosting applications may mint tokens in other formats; an undecodable token is
/// simply passed through untouched rather than failing the flow.
pub(crate) fn decode_continuation(token: Option<&str>) -> Option<Continuation> {
	token.and_then(|token| Continuation::decode(token).ok())
}
