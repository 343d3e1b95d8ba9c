//! Credential and session exchange models consumed by the handshake flows.

// self
use crate::{
	_prelude::*,
	auth::{CredentialSecret, TenantId},
	http::HttpMethod,
};

/// Opaque provider-issued sign-in result.
///
/// The orchestrator never inspects the token contents; it only forwards the identity
/// token to the backend exchange endpoint and keeps the refresh artifact for handler
/// use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Identity token presented to the exchange endpoint.
	pub id_token: CredentialSecret,
	/// Refresh artifact, when the provider issued one.
	pub refresh_token: Option<CredentialSecret>,
}
impl Credential {
	/// Wraps a provider-issued identity token.
	pub fn new(id_token: impl Into<String>) -> Self {
		Self { id_token: CredentialSecret::new(id_token), refresh_token: None }
	}

	/// Attaches the refresh artifact.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(CredentialSecret::new(refresh_token));

		self
	}
}

/// The tenant (or project-level agent flow) a navigation is authenticating against.
///
/// Resolved once per page load and never re-resolved; `tenant_id = None` denotes the
/// top-level project ("agent") flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantContext {
	/// Tenant identifier; `None` for the project-level flow.
	pub tenant_id: Option<TenantId>,
	/// Identity providers enabled for this tenant.
	pub provider_ids: Vec<String>,
}
impl TenantContext {
	/// Context for the project-level agent flow.
	pub fn agent(provider_ids: Vec<String>) -> Self {
		Self { tenant_id: None, provider_ids }
	}

	/// Context for a real tenant.
	pub fn tenant(tenant_id: TenantId, provider_ids: Vec<String>) -> Self {
		Self { tenant_id: Some(tenant_id), provider_ids }
	}
}

/// Result of exchanging a credential for a proxy session.
///
/// Consumed to build the final redirect; the method and fields of the redirect are
/// taken verbatim from this payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExchangeResult {
	/// The resource URL originally requested, when the backend echoed it.
	#[serde(default)]
	pub original_url: Option<String>,
	/// The URL the browser must navigate to next.
	pub target_url: String,
	/// Method of the cookie-setting form submission.
	#[serde(default)]
	pub redirect_method: HttpMethod,
	/// Hidden form fields submitted alongside the redirect.
	#[serde(default)]
	pub redirect_fields: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn exchange_result_deserializes_with_defaults() {
		let parsed: SessionExchangeResult =
			serde_json::from_str("{\"targetUrl\":\"https://app.example.com/\"}")
				.expect("Minimal exchange payload should deserialize.");

		assert_eq!(parsed.target_url, "https://app.example.com/");
		assert!(parsed.original_url.is_none());
		assert_eq!(parsed.redirect_method, HttpMethod::Get);
		assert!(parsed.redirect_fields.is_empty());

		let full: SessionExchangeResult = serde_json::from_str(
			"{\"originalUrl\":\"https://app.example.com/doc\",\"targetUrl\":\"https://app.example.com/_gcp_iap/cb\",\"redirectMethod\":\"POST\",\"redirectFields\":{\"state\":\"abc\"}}",
		)
		.expect("Full exchange payload should deserialize.");

		assert_eq!(full.original_url.as_deref(), Some("https://app.example.com/doc"));
		assert_eq!(full.redirect_method, HttpMethod::Post);
		assert_eq!(full.redirect_fields.get("state").map(String::as_str), Some("abc"));
	}

	#[test]
	fn credential_debug_redacts_tokens() {
		let credential = Credential::new("id-token").with_refresh_token("refresh");
		let rendered = format!("{credential:?}");

		assert!(!rendered.contains("id-token"));
		assert!(!rendered.contains("refresh"));
	}
}
