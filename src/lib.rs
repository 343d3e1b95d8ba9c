//! Redirect-driven GCIP/IAP sign-in relay—decode protocol markers from the page URL, drive
//! tenant-aware handshake flows, and exchange credentials for proxy sessions with retry-safe
//! step caches.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod backend;
pub mod cache;
pub mod descriptor;
pub mod error;
pub mod flows;
pub mod handler;
pub mod http;
pub mod obs;
pub mod protocol;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use crate::{
		auth::{ApiKey, Credential, TenantContext, TenantId},
		backend::{BackendRoutes, ProjectConfig},
		flows::Orchestrator,
		handler::{FlowEvent, FlowHandler, HandlerFuture, ProviderSession, TenantCandidate},
		http::ReqwestTransport,
	};

	/// Orchestrator type alias used by reqwest-backed integration tests.
	pub type ReqwestTestOrchestrator = Orchestrator<ReqwestTransport>;

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport(client)
	}

	/// Constructs an [`Orchestrator`] whose backend routes point at a mock server origin
	/// and whose transport tolerates its certificates.
	pub fn build_test_orchestrator(
		page_url: &str,
		handler: Arc<dyn FlowHandler>,
		backend_origin: &str,
	) -> ReqwestTestOrchestrator {
		let page_url = Url::parse(page_url).expect("Failed to parse test page URL.");
		let origin = Url::parse(backend_origin).expect("Failed to parse test backend origin.");
		let routes = BackendRoutes::new(&origin, None);

		Orchestrator::with_transport(page_url, handler, test_reqwest_transport(), routes)
			.with_progress_delay(StdDuration::from_millis(0))
	}

	/// Provider session with a swappable in-memory credential.
	#[derive(Debug, Default)]
	pub struct StaticSession {
		credential: Mutex<Option<Credential>>,
	}
	impl StaticSession {
		/// Creates a session holding the provided credential.
		pub fn new(credential: Option<Credential>) -> Self {
			Self { credential: Mutex::new(credential) }
		}
	}
	impl ProviderSession for StaticSession {
		fn current_credential(&self) -> Option<Credential> {
			self.credential.lock().clone()
		}

		fn sign_out(&self) -> HandlerFuture<'_, ()> {
			Box::pin(async move {
				*self.credential.lock() = None;

				Ok(())
			})
		}
	}

	/// Scripted [`FlowHandler`] that records every interaction for assertions.
	///
	/// Sessions are keyed by tenant id (`None` is the agent flow) and created on demand;
	/// seed them with [`ScriptedHandler::with_session`].
	#[derive(Default)]
	pub struct ScriptedHandler {
		sessions: Mutex<HashMap<Option<String>, Arc<StaticSession>>>,
		sign_in_credential: Mutex<Option<Credential>>,
		tenant_choice: Mutex<Option<TenantId>>,
		/// Every event delivered via [`FlowHandler::on_event`], in order.
		pub events: Mutex<Vec<FlowEvent>>,
		/// Number of [`FlowHandler::run_sign_in`] invocations.
		pub sign_in_calls: AtomicUsize,
		/// Number of tenant selection invocations.
		pub select_calls: AtomicUsize,
		/// Number of sign-out completion invocations.
		pub completion_calls: AtomicUsize,
	}
	impl ScriptedHandler {
		/// Seeds the session for a tenant (`None` is the agent flow).
		pub fn with_session(self, tenant: Option<&str>, credential: Option<Credential>) -> Self {
			self.sessions
				.lock()
				.insert(tenant.map(ToOwned::to_owned), Arc::new(StaticSession::new(credential)));

			self
		}

		/// Scripts the credential the sign-in UI resolves.
		pub fn with_sign_in_credential(self, credential: Credential) -> Self {
			*self.sign_in_credential.lock() = Some(credential);

			self
		}

		/// Scripts the tenant returned by the selection capability.
		///
		/// Without a scripted choice the capability reports itself absent.
		pub fn with_tenant_choice(self, tenant: TenantId) -> Self {
			*self.tenant_choice.lock() = Some(tenant);

			self
		}

		/// The session currently registered for a tenant, when one exists.
		pub fn session(&self, tenant: Option<&str>) -> Option<Arc<StaticSession>> {
			self.sessions.lock().get(&tenant.map(ToOwned::to_owned)).cloned()
		}

		fn session_for(&self, tenant: Option<&TenantId>) -> Arc<StaticSession> {
			self.sessions
				.lock()
				.entry(tenant.map(|tenant| tenant.as_ref().to_owned()))
				.or_default()
				.clone()
		}
	}
	impl FlowHandler for ScriptedHandler {
		fn provider_session<'a>(
			&'a self,
			_api_key: &'a ApiKey,
			tenant: Option<&'a TenantId>,
		) -> HandlerFuture<'a, Arc<dyn ProviderSession>> {
			let session = self.session_for(tenant);

			Box::pin(async move { Ok(session as Arc<dyn ProviderSession>) })
		}

		fn run_sign_in<'a>(
			&'a self,
			_api_key: &'a ApiKey,
			context: &'a TenantContext,
		) -> HandlerFuture<'a, Credential> {
			self.sign_in_calls.fetch_add(1, Ordering::SeqCst);

			let scripted = self.sign_in_credential.lock().clone();
			let session = self.session_for(context.tenant_id.as_ref());

			Box::pin(async move {
				let credential = scripted.ok_or_else(|| {
					TypedError::new(ErrorCode::Unauthenticated)
						.with_message("No scripted sign-in credential.")
				})?;

				*session.credential.lock() = Some(credential.clone());

				Ok(credential)
			})
		}

		fn select_tenant<'a>(
			&'a self,
			_project: &'a ProjectConfig,
			_candidates: &'a [TenantCandidate],
		) -> Option<HandlerFuture<'a, TenantId>> {
			let choice = self.tenant_choice.lock().clone()?;

			self.select_calls.fetch_add(1, Ordering::SeqCst);

			Some(Box::pin(async move { Ok(choice) }))
		}

		fn sign_out_complete(&self) -> Option<HandlerFuture<'_, ()>> {
			self.completion_calls.fetch_add(1, Ordering::SeqCst);

			Some(Box::pin(async move { Ok(()) }))
		}

		fn on_event(&self, event: FlowEvent) {
			self.events.lock().push(event);
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as JsonValue;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{ErrorCode, Result, TypedError};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
