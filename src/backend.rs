//! Backend HTTP surface consumed by the handshake.
//!
//! Every endpoint is declared once as a [`RequestDescriptor`] (path names are part of
//! the compatibility contract) and exposed as a typed operation. The configuration and
//! admin endpoints live on the hosting origin; the session exchange endpoints are
//! templated with `{version}`/`{apiKey}` placeholders and POST form-encoded bodies.

// self
use crate::{
	_prelude::*,
	auth::{ApiKey, Credential, ProjectId, SessionExchangeResult},
	descriptor::{CallParams, RequestDescriptor},
	http::{FORM_CONTENT_TYPE, HttpMethod, HttpReply, HttpTransport},
};

/// Protocol version substituted into templated endpoints.
pub const API_VERSION: &str = "v1";
/// Default per-request timeout applied to every backend call.
pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Project-level identity configuration fetched from `/gcipConfig`.
///
/// Identical for the whole page lifetime; the orchestrator caches it for the process
/// lifetime (a full-page reload invalidates it).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
	/// Identity project identifier.
	pub project_id: ProjectId,
	/// Numeric project identifier, when the backend exposes it.
	#[serde(default)]
	pub project_number: Option<String>,
	/// Browser API key for the project.
	pub api_key: ApiKey,
	/// Domain hosting the centralized sign-in UI.
	pub auth_domain: String,
	/// Domains redirects are allowed to target.
	#[serde(default)]
	pub authorized_domains: Vec<String>,
}
impl ProjectConfig {
	/// The synthetic tenant id denoting the top-level project ("agent") flow.
	///
	/// A handler resolving this sentinel during tenant selection means "no tenant".
	pub fn top_level_sentinel(&self) -> Option<String> {
		self.project_number.as_ref().map(|number| format!("_{number}"))
	}

	/// Whether redirects may target the URL's host.
	///
	/// A host is authorized when it equals an authorized domain or is a subdomain of
	/// one.
	pub fn authorizes(&self, url: &Url) -> bool {
		let Some(host) = url.host_str() else {
			return false;
		};

		self.authorized_domains
			.iter()
			.any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
	}
}

/// Per-tenant UI configuration advertised by `/config`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUiConfig {
	/// Display name for selection UIs.
	#[serde(default)]
	pub display_name: Option<String>,
	/// Identity providers enabled for the tenant.
	#[serde(default)]
	pub provider_ids: Vec<String>,
}

/// Per-apiKey UI configuration advertised by `/config`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyUiConfig {
	/// Sign-in UI domain override, when configured.
	#[serde(default)]
	pub auth_domain: Option<String>,
	/// Tenant map keyed by tenant id (the top-level sentinel included).
	#[serde(default)]
	pub tenants: BTreeMap<String, TenantUiConfig>,
}

/// The full per-apiKey UI/tenant configuration map served by `/config`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig(pub BTreeMap<String, ApiKeyUiConfig>);
impl UiConfig {
	/// Configuration block for one API key, when present.
	pub fn for_api_key(&self, api_key: &ApiKey) -> Option<&ApiKeyUiConfig> {
		self.0.get(api_key.as_ref())
	}
}

/// Reply of the templated credential refresh endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshReply {
	id_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
}

/// Declared backend endpoints bound to a hosting origin.
#[derive(Clone, Debug)]
pub struct BackendRoutes {
	gcip_config: RequestDescriptor,
	ui_config: RequestDescriptor,
	get_admin_config: RequestDescriptor,
	set_admin_config: RequestDescriptor,
	session_exchange: RequestDescriptor,
	session_refresh: RequestDescriptor,
}
impl BackendRoutes {
	/// Declares every endpoint against the hosting origin.
	///
	/// `exchange_origin` overrides where the templated session endpoints live;
	/// it defaults to the hosting origin.
	pub fn new(origin: &Url, exchange_origin: Option<&Url>) -> Self {
		let base = trimmed(origin);
		let exchange_base = exchange_origin.map(trimmed).unwrap_or_else(|| base.clone());
		let gcip_config = RequestDescriptor::new(HttpMethod::Get, format!("{base}/gcipConfig"))
			.with_timeout(DEFAULT_TIMEOUT)
			.with_response_validator(|reply| require_field(reply, "projectId"));
		let ui_config = RequestDescriptor::new(HttpMethod::Get, format!("{base}/config"))
			.with_timeout(DEFAULT_TIMEOUT)
			.with_response_validator(require_object);
		let get_admin_config =
			RequestDescriptor::new(HttpMethod::Get, format!("{base}/get_admin_config"))
				.with_timeout(DEFAULT_TIMEOUT)
				.with_response_validator(require_object);
		let set_admin_config =
			RequestDescriptor::new(HttpMethod::Post, format!("{base}/set_admin_config"))
				.with_timeout(DEFAULT_TIMEOUT)
				.with_request_validator(|config| match &config.data {
					Some(JsonValue::Object(_)) => Ok(()),
					_ => Err(TypedError::invalid_argument(
						"Admin configuration must be a plain object.",
					)),
				});
		let session_exchange = RequestDescriptor::new(
			HttpMethod::Post,
			format!("{exchange_base}/{{version}}/token:exchange?key={{apiKey}}"),
		)
		.with_header("Content-Type", FORM_CONTENT_TYPE)
		.with_timeout(DEFAULT_TIMEOUT)
		.with_response_validator(|reply| require_field(reply, "targetUrl"));
		let session_refresh = RequestDescriptor::new(
			HttpMethod::Post,
			format!("{exchange_base}/{{version}}/token?key={{apiKey}}"),
		)
		.with_header("Content-Type", FORM_CONTENT_TYPE)
		.with_data(serde_json::json!({"grant_type": "refresh_token"}))
		.with_timeout(DEFAULT_TIMEOUT)
		.with_response_validator(|reply| require_field(reply, "idToken"));

		Self {
			gcip_config,
			ui_config,
			get_admin_config,
			set_admin_config,
			session_exchange,
			session_refresh,
		}
	}

	/// Fetches the project-level identity configuration.
	pub async fn gcip_config(
		&self,
		transport: &(impl HttpTransport + ?Sized),
	) -> Result<ProjectConfig> {
		let reply = self.gcip_config.process(transport, CallParams::new()).await?;

		parse_reply(&reply, "project configuration")
	}

	/// Fetches the per-apiKey UI/tenant configuration map.
	pub async fn ui_config(&self, transport: &(impl HttpTransport + ?Sized)) -> Result<UiConfig> {
		let reply = self.ui_config.process(transport, CallParams::new()).await?;

		parse_reply(&reply, "UI configuration")
	}

	/// Retrieves the raw admin configuration for the admin editor.
	pub async fn admin_config(
		&self,
		transport: &(impl HttpTransport + ?Sized),
	) -> Result<JsonValue> {
		let reply = self.get_admin_config.process(transport, CallParams::new()).await?;

		reply.data.ok_or_else(|| {
			TypedError::new(ErrorCode::Internal)
				.with_message("Admin configuration reply carried no data.")
		})
	}

	/// Replaces the admin configuration.
	pub async fn set_admin_config(
		&self,
		transport: &(impl HttpTransport + ?Sized),
		config: &JsonValue,
	) -> Result<()> {
		self.set_admin_config
			.process(transport, CallParams::new().with_data(config.clone()))
			.await
			.map(|_| ())
	}

	/// Exchanges a signed-in credential for a proxy session.
	pub async fn exchange_session(
		&self,
		transport: &(impl HttpTransport + ?Sized),
		api_key: &ApiKey,
		credential: &Credential,
		continuation: Option<&str>,
	) -> Result<SessionExchangeResult> {
		let mut data = serde_json::json!({"id_token": credential.id_token.expose()});

		if let (Some(token), Some(map)) = (continuation, data.as_object_mut()) {
			map.insert("state".into(), JsonValue::String(token.to_owned()));
		}

		let params = CallParams::new()
			.with_url_param("version", API_VERSION)
			.with_url_param("apiKey", api_key.as_ref())
			.with_data(data);
		let reply = self.session_exchange.process(transport, params).await?;

		parse_reply(&reply, "session exchange result")
	}

	/// Refreshes a credential using its refresh artifact.
	pub async fn refresh_credential(
		&self,
		transport: &(impl HttpTransport + ?Sized),
		api_key: &ApiKey,
		refresh_token: &str,
	) -> Result<Credential> {
		let params = CallParams::new()
			.with_url_param("version", API_VERSION)
			.with_url_param("apiKey", api_key.as_ref())
			.with_data(serde_json::json!({"refresh_token": refresh_token}));
		let reply = self.session_refresh.process(transport, params).await?;
		let parsed: RefreshReply = parse_reply(&reply, "credential refresh result")?;
		let mut credential = Credential::new(parsed.id_token);

		if let Some(refresh) = parsed.refresh_token {
			credential = credential.with_refresh_token(refresh);
		}

		Ok(credential)
	}
}

fn trimmed(origin: &Url) -> String {
	origin.as_str().trim_end_matches('/').to_owned()
}

fn require_object(reply: &HttpReply) -> Result<()> {
	match &reply.data {
		Some(JsonValue::Object(_)) => Ok(()),
		_ => Err(TypedError::new(ErrorCode::Internal)
			.with_message("Backend reply is not a JSON object.")),
	}
}

fn require_field(reply: &HttpReply, field: &str) -> Result<()> {
	require_object(reply)?;

	if reply.data.as_ref().is_some_and(|data| data.get(field).is_some()) {
		Ok(())
	} else {
		Err(TypedError::new(ErrorCode::Internal)
			.with_message(format!("Backend reply is missing {field}.")))
	}
}

fn parse_reply<T>(reply: &HttpReply, what: &str) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_str(&reply.text);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
		TypedError::new(ErrorCode::Internal)
			.with_message(format!("Backend returned a malformed {what}."))
			.with_reason(err)
	})
}
