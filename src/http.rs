//! Transport primitives for the sign-in handshake.
//!
//! The module exposes [`HttpTransport`] as the relay's only dependency on an HTTP
//! stack, plus the request preparation and response classification shared by every
//! implementation. Preparation enforces the method/body policy (query data travels in
//! the URL, request data in the body) before any network I/O; classification converts
//! every non-2xx response into a [`TypedError`] so no raw transport failure crosses
//! into flow logic.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

/// Content type used for form-encoded request bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
/// Content type used for structured (JSON) request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP methods supported by the relay transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	/// HTTP GET.
	#[default]
	Get,
	/// HTTP HEAD.
	Head,
	/// HTTP POST.
	Post,
	/// HTTP PUT.
	Put,
	/// HTTP PATCH.
	Patch,
	/// HTTP DELETE.
	Delete,
}
impl HttpMethod {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Head => "HEAD",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}

	/// Whether the method may carry a request body.
	///
	/// GET/HEAD calls must pre-encode their data into the URL instead.
	pub const fn allows_body(self) -> bool {
		!matches!(self, Self::Get | Self::Head)
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for HttpMethod {
	type Err = TypedError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(Self::Get),
			"HEAD" => Ok(Self::Head),
			"POST" => Ok(Self::Post),
			"PUT" => Ok(Self::Put),
			"PATCH" => Ok(Self::Patch),
			"DELETE" => Ok(Self::Delete),
			other => Err(TypedError::invalid_argument(format!("Unsupported HTTP method: {other}."))),
		}
	}
}

/// One outbound HTTP call as specified by a caller or a request descriptor.
#[derive(Clone, Debug)]
pub struct RequestConfig {
	/// HTTP method.
	pub method: HttpMethod,
	/// Fully resolved target URL.
	pub url: Url,
	/// Header map; keys are matched case-insensitively during preparation.
	pub headers: BTreeMap<String, String>,
	/// Optional structured request data.
	pub data: Option<JsonValue>,
	/// Per-request timeout; expiry abandons the call with `deadline-exceeded`.
	pub timeout: Option<StdDuration>,
}
impl RequestConfig {
	/// Creates a config with no headers, data, or timeout.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), data: None, timeout: None }
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Sets the structured request data.
	pub fn with_data(mut self, data: JsonValue) -> Self {
		self.data = Some(data);

		self
	}

	/// Sets the per-request timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	fn content_type(&self) -> Option<&str> {
		self.headers
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
			.map(|(_, value)| value.as_str())
	}
}

/// A validated, encoded request ready for dispatch by an [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct PreparedRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Target URL.
	pub url: Url,
	/// Final header map, including the effective content type for body requests.
	pub headers: BTreeMap<String, String>,
	/// Encoded request body.
	pub body: Option<String>,
	/// Per-request timeout.
	pub timeout: Option<StdDuration>,
}

/// Raw response handed back by a transport before classification.
#[derive(Clone, Debug)]
pub struct RawReply {
	/// HTTP status code.
	pub status: u16,
	/// Declared content type, when present.
	pub content_type: Option<String>,
	/// Response body as text.
	pub text: String,
}

/// Classified 2xx response.
///
/// The body is exposed both as raw text and, when the content type indicates
/// structured data, as parsed JSON.
#[derive(Clone, Debug)]
pub struct HttpReply {
	/// HTTP status code (always in the 2xx band).
	pub status: u16,
	/// Raw body text.
	pub text: String,
	/// Parsed body, present when the content type declared JSON.
	pub data: Option<JsonValue>,
}

/// Boxed future returned by [`HttpTransport::dispatch`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<RawReply>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing relay requests.
///
/// Implementations only perform raw I/O plus the timeout contract: a configured
/// timeout that expires must abandon the in-flight operation and reject with
/// `deadline-exceeded`, never with the underlying transport error. Network failures
/// map to `unavailable` with the cause chained as `reason`. Status-code
/// classification is shared and happens in [`send`].
pub trait HttpTransport
where
	Self: Send + Sync,
{
	/// Executes one prepared request.
	fn dispatch(&self, request: PreparedRequest) -> TransportFuture<'_>;
}

/// Validates, encodes, sends, and classifies one HTTP call.
pub async fn send(transport: &(impl HttpTransport + ?Sized), config: RequestConfig) -> Result<HttpReply> {
	let prepared = prepare(&config)?;
	let raw = transport.dispatch(prepared).await?;

	classify(raw)
}

/// Applies the method/body policy and encodes the request body.
///
/// GET/HEAD calls carrying structured data fail with `invalid-argument` before any
/// network I/O. For other methods a form-encoded content type serializes the data as
/// `key=value` pairs joined by `&`; anything else serializes as JSON.
pub fn prepare(config: &RequestConfig) -> Result<PreparedRequest> {
	let mut headers = config.headers.clone();
	let body = match &config.data {
		None => None,
		Some(data) => {
			if !config.method.allows_body() {
				return Err(TypedError::invalid_argument(format!(
					"{} requests cannot carry request data; encode it into the URL instead.",
					config.method
				)));
			}

			let content_type = config.content_type().unwrap_or(JSON_CONTENT_TYPE).to_owned();

			if !config.headers.keys().any(|name| name.eq_ignore_ascii_case("content-type")) {
				headers.insert("Content-Type".into(), content_type.clone());
			}

			if content_type.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE) {
				Some(encode_form_body(data)?)
			} else {
				Some(serde_json::to_string(data).map_err(|err| {
					TypedError::invalid_argument("Request data is not serializable.")
						.with_reason(err)
				})?)
			}
		},
	};

	Ok(PreparedRequest {
		method: config.method,
		url: config.url.clone(),
		headers,
		body,
		timeout: config.timeout,
	})
}

/// Classifies a raw response into a 2xx [`HttpReply`] or a [`TypedError`].
pub fn classify(raw: RawReply) -> Result<HttpReply> {
	if !(200..300).contains(&raw.status) {
		return Err(classify_failure(&raw));
	}

	let declared_json = raw
		.content_type
		.as_deref()
		.is_some_and(|value| value.to_ascii_lowercase().starts_with(JSON_CONTENT_TYPE));
	let data = if declared_json && !raw.text.is_empty() {
		let mut deserializer = serde_json::Deserializer::from_str(&raw.text);
		let value: JsonValue =
			serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
				TypedError::new(ErrorCode::Internal)
					.with_message("Response declared JSON but the body is malformed.")
					.with_reason(err)
			})?;

		Some(value)
	} else {
		None
	};

	Ok(HttpReply { status: raw.status, text: raw.text, data })
}

fn classify_failure(raw: &RawReply) -> TypedError {
	let (cloud_compliant, server_status, message) = parse_error_envelope(&raw.text);

	TypedError::from_http_response(raw.status, server_status.as_deref(), message)
		.with_body(raw.text.clone(), cloud_compliant)
}

/// Extracts status/message hints from an error body.
///
/// A body matching the `{error:{code,message,..}}` envelope is flagged cloud-compliant;
/// anything else is carried as an arbitrary error string. The flag records observed
/// shape only.
fn parse_error_envelope(text: &str) -> (bool, Option<String>, Option<String>) {
	if let Ok(JsonValue::Object(root)) = serde_json::from_str::<JsonValue>(text)
		&& let Some(JsonValue::Object(error)) = root.get("error")
		&& (error.contains_key("code") || error.contains_key("message"))
	{
		let status = error
			.get("status")
			.or_else(|| error.get("code"))
			.and_then(JsonValue::as_str)
			.map(ToOwned::to_owned);
		let message =
			error.get("message").and_then(JsonValue::as_str).map(ToOwned::to_owned);

		return (true, status, message);
	}

	let trimmed = text.trim();
	let message = if trimmed.is_empty() { None } else { Some(trimmed.to_owned()) };

	(false, None, message)
}

fn encode_form_body(data: &JsonValue) -> Result<String> {
	let JsonValue::Object(map) = data else {
		return Err(TypedError::invalid_argument(
			"Form-encoded request data must be a plain object.",
		));
	};
	let mut serializer = url::form_urlencoded::Serializer::new(String::new());

	for (key, value) in map {
		let text = match value {
			JsonValue::String(s) => s.clone(),
			other => other.to_string(),
		};

		serializer.append_pair(key, &text);
	}

	Ok(serializer.finish())
}

/// Thin wrapper around [`ReqwestClient`] implementing [`HttpTransport`].
///
/// Relay calls never follow redirects themselves; the handshake's redirects are
/// performed by the hosting page, so configure any custom [`ReqwestClient`]
/// accordingly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn dispatch(&self, request: PreparedRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
				.map_err(|err| {
					TypedError::invalid_argument("Unsupported HTTP method.").with_reason(err)
				})?;
			let mut builder = client.request(method, request.url.clone());

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}
			if let Some(timeout) = request.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await.map_err(map_reqwest_error)?;
			let status = response.status().as_u16();
			let content_type = response
				.headers()
				.get(reqwest::header::CONTENT_TYPE)
				.and_then(|value| value.to_str().ok())
				.map(ToOwned::to_owned);
			let text = response.text().await.map_err(map_reqwest_error)?;

			Ok(RawReply { status, content_type, text })
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: ReqwestError) -> TypedError {
	if err.is_timeout() {
		TypedError::new(ErrorCode::DeadlineExceeded).with_reason(err)
	} else {
		TypedError::new(ErrorCode::Unavailable)
			.with_message("Network error occurred while calling the backend.")
			.with_reason(err)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse test URL.")
	}

	#[test]
	fn get_with_data_is_rejected_before_any_network_call() {
		let config = RequestConfig::new(HttpMethod::Get, url("https://example.com/config"))
			.with_data(serde_json::json!("not-an-object"));
		let err = prepare(&config).expect_err("GET with data should be rejected.");

		assert_eq!(err.code, ErrorCode::InvalidArgument);

		let head = RequestConfig::new(HttpMethod::Head, url("https://example.com/config"))
			.with_data(serde_json::json!({"k": "v"}));

		assert!(prepare(&head).is_err());
	}

	#[test]
	fn post_encodes_form_bodies_as_pairs() {
		let config = RequestConfig::new(HttpMethod::Post, url("https://example.com/token"))
			.with_header("Content-Type", FORM_CONTENT_TYPE)
			.with_data(serde_json::json!({"grant_type": "refresh_token", "n": 7}));
		let prepared = prepare(&config).expect("Form POST should prepare successfully.");
		let body = prepared.body.expect("Form POST should carry a body.");

		assert_eq!(body, "grant_type=refresh_token&n=7");
	}

	#[test]
	fn post_defaults_to_json_bodies() {
		let config = RequestConfig::new(HttpMethod::Post, url("https://example.com/admin"))
			.with_data(serde_json::json!({"a": 1}));
		let prepared = prepare(&config).expect("JSON POST should prepare successfully.");

		assert_eq!(prepared.body.as_deref(), Some("{\"a\":1}"));
		assert_eq!(prepared.headers.get("Content-Type").map(String::as_str), Some(JSON_CONTENT_TYPE));
	}

	#[test]
	fn form_bodies_require_plain_objects() {
		let config = RequestConfig::new(HttpMethod::Post, url("https://example.com/token"))
			.with_header("content-type", FORM_CONTENT_TYPE)
			.with_data(serde_json::json!(["a", "b"]));

		assert!(prepare(&config).is_err());
	}

	#[test]
	fn success_replies_expose_text_and_parsed_data() {
		let raw = RawReply {
			status: 200,
			content_type: Some("application/json; charset=utf-8".into()),
			text: "{\"projectId\":\"demo\"}".into(),
		};
		let reply = classify(raw).expect("2xx JSON reply should classify successfully.");

		assert_eq!(reply.text, "{\"projectId\":\"demo\"}");
		assert_eq!(reply.data.expect("JSON body should be parsed.")["projectId"], "demo");

		let plain = RawReply { status: 204, content_type: None, text: String::new() };
		let reply = classify(plain).expect("2xx empty reply should classify successfully.");

		assert!(reply.data.is_none());
	}

	#[test]
	fn cloud_compliant_failures_carry_the_envelope_status() {
		let raw = RawReply {
			status: 400,
			content_type: Some(JSON_CONTENT_TYPE.into()),
			text: "{\"error\":{\"code\":401,\"status\":\"UNAUTHENTICATED\",\"message\":\"Bad token.\"}}"
				.into(),
		};
		let err = classify(raw).expect_err("Non-2xx reply should classify as an error.");

		assert_eq!(err.code, ErrorCode::Unauthenticated);
		assert_eq!(err.message, "Bad token.");
		assert_eq!(err.http_status, Some(400));
		assert_eq!(err.cloud_compliant, Some(true));
	}

	#[test]
	fn arbitrary_failure_bodies_are_flagged_non_compliant() {
		let raw =
			RawReply { status: 503, content_type: None, text: "upstream exploded".into() };
		let err = classify(raw).expect_err("Non-2xx reply should classify as an error.");

		assert_eq!(err.code, ErrorCode::Unavailable);
		assert_eq!(err.message, "upstream exploded");
		assert_eq!(err.cloud_compliant, Some(false));
		assert_eq!(err.body.as_deref(), Some("upstream exploded"));
	}
}
