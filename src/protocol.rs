//! URL protocol markers, the continuation token codec, and redirect directives.
//!
//! The handshake spans multiple page loads, so all protocol intent travels in the URL:
//! a mode indicator, an opaque continuation token preserving the originally requested
//! resource, and (for tenant flows) a tenant id. [`ProtocolState`] is decoded exactly
//! once per navigation and never mutated afterwards.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{ApiKey, TenantId},
	http::HttpMethod,
};

/// Query parameter carrying the protocol mode.
pub const MODE_PARAM: &str = "mode";
/// Query parameter carrying the API key.
pub const API_KEY_PARAM: &str = "apiKey";
/// Query parameter carrying the opaque continuation token.
pub const STATE_PARAM: &str = "state";
/// Query parameter carrying the tenant id.
pub const TENANT_PARAM: &str = "tenantId";

/// The decoded intent of the current page load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolState {
	/// Start a sign-in flow.
	SignIn {
		/// Project API key.
		api_key: ApiKey,
		/// Tenant named in the URL, when present.
		tenant: Option<TenantId>,
		/// Opaque continuation token, when present.
		continuation: Option<String>,
	},
	/// Resume a sign-in flow after the federated redirect returned.
	SignInCallback {
		/// Project API key.
		api_key: ApiKey,
		/// Tenant named in the URL, when present.
		tenant: Option<TenantId>,
		/// Opaque continuation token, when present.
		continuation: Option<String>,
	},
	/// Sign out the single tenant named in the URL.
	SignOutSingle {
		/// Project API key.
		api_key: ApiKey,
		/// Tenant to sign out.
		tenant: TenantId,
		/// Opaque continuation token, when present.
		continuation: Option<String>,
	},
	/// Sign out every tenant currently holding a session.
	SignOutMulti {
		/// Project API key.
		api_key: ApiKey,
		/// Opaque continuation token, when present.
		continuation: Option<String>,
	},
	/// Markers absent or malformed; the flow terminates with `invalid-argument`.
	Unknown,
}
impl ProtocolState {
	/// Decodes the protocol markers from a page URL.
	///
	/// Missing required markers (mode, API key) decode as [`ProtocolState::Unknown`],
	/// and so does any marker that is present but fails validation; a malformed tenant
	/// id never silently widens into "no tenant". The orchestrator turns `Unknown` into
	/// an `invalid-argument` terminal error.
	pub fn decode(url: &Url) -> Self {
		let mut mode = None;
		let mut api_key = None;
		let mut continuation = None;
		let mut tenant = None;

		for (name, value) in url.query_pairs() {
			match name.as_ref() {
				MODE_PARAM => mode = Some(value.into_owned()),
				API_KEY_PARAM => match ApiKey::new(value.as_ref()) {
					Ok(key) => api_key = Some(key),
					Err(_) => return Self::Unknown,
				},
				STATE_PARAM => continuation = Some(value.into_owned()),
				TENANT_PARAM => match TenantId::new(value.as_ref()) {
					Ok(id) => tenant = Some(id),
					Err(_) => return Self::Unknown,
				},
				_ => {},
			}
		}

		let (Some(mode), Some(api_key)) = (mode, api_key) else {
			return Self::Unknown;
		};

		match mode.as_str() {
			"login" => Self::SignIn { api_key, tenant, continuation },
			"callback" => Self::SignInCallback { api_key, tenant, continuation },
			"signout" => match tenant {
				Some(tenant) => Self::SignOutSingle { api_key, tenant, continuation },
				None => Self::SignOutMulti { api_key, continuation },
			},
			_ => Self::Unknown,
		}
	}

	/// The API key named by the markers, when decoded.
	pub fn api_key(&self) -> Option<&ApiKey> {
		match self {
			Self::SignIn { api_key, .. }
			| Self::SignInCallback { api_key, .. }
			| Self::SignOutSingle { api_key, .. }
			| Self::SignOutMulti { api_key, .. } => Some(api_key),
			Self::Unknown => None,
		}
	}

	/// The opaque continuation token, when present.
	pub fn continuation(&self) -> Option<&str> {
		match self {
			Self::SignIn { continuation, .. }
			| Self::SignInCallback { continuation, .. }
			| Self::SignOutSingle { continuation, .. }
			| Self::SignOutMulti { continuation, .. } => continuation.as_deref(),
			Self::Unknown => None,
		}
	}
}

/// Decoded continuation payload carried through the handshake's redirects.
///
/// The token is opaque to the wire protocol; this codec is a convenience for hosting
/// applications that mint their own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
	/// The resource URL originally requested, restored on the final redirect.
	pub original_uri: String,
	/// Tenant the flow started under, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tenant: Option<TenantId>,
}
impl Continuation {
	/// Creates a continuation for the originally requested resource.
	pub fn new(original_uri: impl Into<String>) -> Self {
		Self { original_uri: original_uri.into(), tenant: None }
	}

	/// Attaches the tenant the flow started under.
	pub fn with_tenant(mut self, tenant: TenantId) -> Self {
		self.tenant = Some(tenant);

		self
	}

	/// Encodes as URL-safe base64 (no padding) over canonical JSON.
	pub fn encode(&self) -> Result<String> {
		let json = serde_json::to_string(self).map_err(|err| {
			TypedError::new(ErrorCode::Internal)
				.with_message("Continuation is not serializable.")
				.with_reason(err)
		})?;

		Ok(URL_SAFE_NO_PAD.encode(json))
	}

	/// Decodes a token produced by [`Continuation::encode`].
	pub fn decode(token: &str) -> Result<Self> {
		let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|err| {
			TypedError::invalid_argument("Continuation token is not valid base64.")
				.with_reason(err)
		})?;
		let text = String::from_utf8(bytes).map_err(|err| {
			TypedError::invalid_argument("Continuation token is not valid UTF-8.")
				.with_reason(err)
		})?;
		let mut deserializer = serde_json::Deserializer::from_str(&text);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
			TypedError::invalid_argument("Continuation token payload is malformed.")
				.with_reason(err)
		})
	}
}

/// The terminal navigation the hosting page must perform.
///
/// No DOM is touched here; the hosting application submits the hidden form (or plain
/// navigation, for GET with no fields) described by this directive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectDirective {
	/// Submission method, taken verbatim from the protocol configuration.
	pub method: HttpMethod,
	/// Navigation target.
	pub url: String,
	/// Hidden form fields, taken verbatim from the protocol configuration.
	pub fields: BTreeMap<String, String>,
}
impl RedirectDirective {
	/// Plain GET navigation with no fields.
	pub fn navigate(url: impl Into<String>) -> Self {
		Self { method: HttpMethod::Get, url: url.into(), fields: BTreeMap::new() }
	}

	/// Whether the directive targets the same origin as the provided page URL.
	pub fn is_same_origin(&self, page: &Url) -> bool {
		Url::parse(&self.url).is_ok_and(|target| same_origin(&target, page))
	}
}

/// Compares scheme, host, and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
	a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse test URL.")
	}

	#[test]
	fn markers_decode_into_protocol_states() {
		let state = ProtocolState::decode(&url(
			"https://auth.example.com/?mode=login&apiKey=key-1&state=tok&tenantId=tenant-a",
		));

		assert!(matches!(
			state,
			ProtocolState::SignIn { ref tenant, ref continuation, .. }
				if tenant.as_deref() == Some("tenant-a") && continuation.as_deref() == Some("tok")
		));

		let callback =
			ProtocolState::decode(&url("https://auth.example.com/?mode=callback&apiKey=key-1"));

		assert!(matches!(callback, ProtocolState::SignInCallback { tenant: None, .. }));

		let single = ProtocolState::decode(&url(
			"https://auth.example.com/?mode=signout&apiKey=key-1&tenantId=tenant-a",
		));

		assert!(matches!(single, ProtocolState::SignOutSingle { .. }));

		let multi =
			ProtocolState::decode(&url("https://auth.example.com/?mode=signout&apiKey=key-1"));

		assert!(matches!(multi, ProtocolState::SignOutMulti { .. }));
	}

	#[test]
	fn missing_or_malformed_markers_decode_as_unknown() {
		assert_eq!(
			ProtocolState::decode(&url("https://auth.example.com/?apiKey=key-1")),
			ProtocolState::Unknown
		);
		assert_eq!(
			ProtocolState::decode(&url("https://auth.example.com/?mode=login")),
			ProtocolState::Unknown
		);
		assert_eq!(
			ProtocolState::decode(&url("https://auth.example.com/?mode=dance&apiKey=key-1")),
			ProtocolState::Unknown
		);
	}

	#[test]
	fn present_but_malformed_tenant_never_widens_the_flow() {
		// An empty tenant must not decode as "sign out everything".
		assert_eq!(
			ProtocolState::decode(&url(
				"https://auth.example.com/?mode=signout&apiKey=key-1&tenantId="
			)),
			ProtocolState::Unknown
		);
		// Nor may it fall through to tenant selection or the agent flow.
		assert_eq!(
			ProtocolState::decode(&url(
				"https://auth.example.com/?mode=login&apiKey=key-1&tenantId=bad%20tenant"
			)),
			ProtocolState::Unknown
		);
		assert_eq!(
			ProtocolState::decode(&url(
				"https://auth.example.com/?mode=callback&apiKey=key-1&tenantId="
			)),
			ProtocolState::Unknown
		);
		// A malformed API key is rejected the same way.
		assert_eq!(
			ProtocolState::decode(&url("https://auth.example.com/?mode=login&apiKey=")),
			ProtocolState::Unknown
		);
	}

	#[test]
	fn continuation_round_trips_and_rejects_garbage() {
		let continuation = Continuation::new("https://app.example.com/doc?page=2")
			.with_tenant(TenantId::new("tenant-a").expect("Tenant fixture should be valid."));
		let token = continuation.encode().expect("Continuation should encode.");
		let decoded = Continuation::decode(&token).expect("Continuation should decode.");

		assert_eq!(decoded, continuation);

		let err = Continuation::decode("!!!not-base64!!!")
			.expect_err("Garbage token must be rejected.");

		assert_eq!(err.code, ErrorCode::InvalidArgument);
	}

	#[test]
	fn same_origin_compares_scheme_host_port() {
		let page = url("https://app.example.com/doc");

		assert!(RedirectDirective::navigate("https://app.example.com/other").is_same_origin(&page));
		assert!(!RedirectDirective::navigate("http://app.example.com/other").is_same_origin(&page));
		assert!(!RedirectDirective::navigate("https://evil.example.com/").is_same_origin(&page));
		assert!(RedirectDirective::navigate("https://app.example.com:443/x").is_same_origin(&page));
	}
}
