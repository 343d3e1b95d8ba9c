//! Reusable, parameterized HTTP call templates.
//!
//! Each backend endpoint is declared once as a [`RequestDescriptor`]: a method, a URL
//! pattern with `{placeholder}` tokens, default headers/data, and two pluggable
//! validation hooks. Call sites bind runtime parameters through
//! [`RequestDescriptor::process`], which merges them over the template defaults and
//! delegates to the shared transport path.

// self
use crate::{
	_prelude::*,
	http::{self, HttpMethod, HttpReply, HttpTransport, RequestConfig},
};

/// Hook run against the resolved request before any network call.
///
/// Returning an error short-circuits the call, e.g. to reject malformed arguments.
pub type RequestValidator = Arc<dyn Fn(&RequestConfig) -> Result<()> + Send + Sync>;
/// Hook run against a successful reply.
///
/// Returning an error converts an otherwise-successful response into a domain error,
/// e.g. when a required field is missing.
pub type ResponseValidator = Arc<dyn Fn(&HttpReply) -> Result<()> + Send + Sync>;

/// Runtime parameters bound to a descriptor for one call.
#[derive(Clone, Debug, Default)]
pub struct CallParams {
	/// Values substituted into the URL template's `{placeholder}` tokens.
	pub url_params: BTreeMap<String, String>,
	/// Structured data merged (shallow, per key) over the template's default data.
	pub data: Option<JsonValue>,
	/// Headers merged (shallow, per key) over the template's default headers.
	pub headers: BTreeMap<String, String>,
	/// Timeout override for this call.
	pub timeout: Option<StdDuration>,
}
impl CallParams {
	/// Creates an empty parameter set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds a URL placeholder value.
	pub fn with_url_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.url_params.insert(name.into(), value.into());

		self
	}

	/// Sets the call data merged over the template defaults.
	pub fn with_data(mut self, data: JsonValue) -> Self {
		self.data = Some(data);

		self
	}

	/// Adds a call header merged over the template defaults.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Overrides the template timeout for this call.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// A reusable HTTP call template.
#[derive(Clone)]
pub struct RequestDescriptor {
	method: HttpMethod,
	url_template: String,
	default_headers: BTreeMap<String, String>,
	default_data: Option<JsonValue>,
	default_timeout: Option<StdDuration>,
	request_validator: Option<RequestValidator>,
	response_validator: Option<ResponseValidator>,
}
impl RequestDescriptor {
	/// Creates a template for the provided method and URL pattern.
	pub fn new(method: HttpMethod, url_template: impl Into<String>) -> Self {
		Self {
			method,
			url_template: url_template.into(),
			default_headers: BTreeMap::new(),
			default_data: None,
			default_timeout: None,
			request_validator: None,
			response_validator: None,
		}
	}

	/// Adds a default header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name.into(), value.into());

		self
	}

	/// Sets the default data merged under every call's data.
	pub fn with_data(mut self, data: JsonValue) -> Self {
		self.default_data = Some(data);

		self
	}

	/// Sets the default timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.default_timeout = Some(timeout);

		self
	}

	/// Installs the request validation hook.
	pub fn with_request_validator(
		mut self,
		validator: impl Fn(&RequestConfig) -> Result<()> + Send + Sync + 'static,
	) -> Self {
		self.request_validator = Some(Arc::new(validator));

		self
	}

	/// Installs the response validation hook.
	pub fn with_response_validator(
		mut self,
		validator: impl Fn(&HttpReply) -> Result<()> + Send + Sync + 'static,
	) -> Self {
		self.response_validator = Some(Arc::new(validator));

		self
	}

	/// The URL pattern this descriptor was declared with.
	pub fn url_template(&self) -> &str {
		&self.url_template
	}

	/// Resolves the template against runtime parameters without sending.
	pub fn resolve(&self, params: &CallParams) -> Result<RequestConfig> {
		let resolved = format_string(&self.url_template, &params.url_params);
		let url = Url::parse(&resolved).map_err(|err| {
			TypedError::invalid_argument(format!("Descriptor URL is invalid: {resolved}."))
				.with_reason(err)
		})?;
		let mut headers = self.default_headers.clone();

		for (name, value) in &params.headers {
			headers.insert(name.clone(), value.clone());
		}

		let data = merge_data(self.default_data.as_ref(), params.data.as_ref());
		let timeout = params.timeout.or(self.default_timeout);

		Ok(RequestConfig { method: self.method, url, headers, data, timeout })
	}

	/// Binds runtime parameters, validates, sends, and validates the reply.
	pub async fn process(
		&self,
		transport: &(impl HttpTransport + ?Sized),
		params: CallParams,
	) -> Result<HttpReply> {
		let config = self.resolve(&params)?;

		if let Some(validator) = &self.request_validator {
			validator(&config)?;
		}

		let reply = http::send(transport, config).await?;

		if let Some(validator) = &self.response_validator {
			validator(&reply)?;
		}

		Ok(reply)
	}
}
impl Debug for RequestDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDescriptor")
			.field("method", &self.method)
			.field("url_template", &self.url_template)
			.field("has_request_validator", &self.request_validator.is_some())
			.field("has_response_validator", &self.response_validator.is_some())
			.finish()
	}
}

/// Substitutes `{name}` tokens into a template, each exactly once.
///
/// Braces that do not form a bound placeholder are left untouched.
pub fn format_string(template: &str, params: &BTreeMap<String, String>) -> String {
	let mut resolved = template.to_owned();

	for (name, value) in params {
		resolved = resolved.replacen(&format!("{{{name}}}"), value, 1);
	}

	resolved
}

/// Shallow per-key merge of call data over template defaults.
///
/// Template defaults survive unless explicitly replaced by a key collision; non-object
/// call data replaces the defaults wholesale.
fn merge_data(defaults: Option<&JsonValue>, call: Option<&JsonValue>) -> Option<JsonValue> {
	match (defaults, call) {
		(None, None) => None,
		(Some(base), None) => Some(base.clone()),
		(None, Some(data)) => Some(data.clone()),
		(Some(JsonValue::Object(base)), Some(JsonValue::Object(overlay))) => {
			let mut merged = base.clone();

			for (key, value) in overlay {
				merged.insert(key.clone(), value.clone());
			}

			Some(JsonValue::Object(merged))
		},
		(Some(_), Some(data)) => Some(data.clone()),
	}
}
