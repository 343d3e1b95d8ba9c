//! Closed error taxonomy shared across the transport, descriptor, and flow layers.
//!
//! Every failure that crosses a module boundary is a [`TypedError`] carrying a code from
//! the closed [`ErrorCode`] vocabulary. No raw transport error ever reaches a handler;
//! the transport converts at its boundary and attaches the original cause as `reason`.

// self
use crate::_prelude::*;

/// Relay-wide result type alias returning [`TypedError`] by default.
pub type Result<T, E = TypedError> = std::result::Result<T, E>;

/// Shared cause attached to a [`TypedError`] for diagnostic chaining.
pub type ErrorReason = Arc<dyn StdError + Send + Sync>;

/// Canonical status identifiers recognized by the relay.
///
/// The set is closed; statuses reported by a server outside the set are carried through
/// [`ErrorCode::Custom`] after reformatting (lower-cased, underscores replaced with
/// dashes). Resolution never invents new identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	/// Client specified an invalid argument.
	InvalidArgument,
	/// Request cannot be executed in the current system state.
	FailedPrecondition,
	/// Client specified an invalid range.
	OutOfRange,
	/// Request not authenticated due to missing, invalid, or expired credentials.
	Unauthenticated,
	/// Client does not have sufficient permission.
	PermissionDenied,
	/// A specified resource is not found.
	NotFound,
	/// Concurrency conflict, such as a read-modify-write conflict.
	Aborted,
	/// The resource a client tried to create already exists.
	AlreadyExists,
	/// Out of resource quota or rate limited.
	ResourceExhausted,
	/// Request cancelled by the client.
	Cancelled,
	/// Unrecoverable data loss or data corruption.
	DataLoss,
	/// Unknown server error.
	Unknown,
	/// Internal server error.
	Internal,
	/// API method not implemented by the server.
	NotImplemented,
	/// Service unavailable.
	Unavailable,
	/// Request deadline exceeded.
	DeadlineExceeded,
	/// Server-reported status outside the canonical set, reformatted.
	Custom(String),
}
impl ErrorCode {
	/// Every canonical identifier, in taxonomy order.
	pub const CANONICAL: [Self; 16] = [
		Self::InvalidArgument,
		Self::FailedPrecondition,
		Self::OutOfRange,
		Self::Unauthenticated,
		Self::PermissionDenied,
		Self::NotFound,
		Self::Aborted,
		Self::AlreadyExists,
		Self::ResourceExhausted,
		Self::Cancelled,
		Self::DataLoss,
		Self::Unknown,
		Self::Internal,
		Self::NotImplemented,
		Self::Unavailable,
		Self::DeadlineExceeded,
	];

	/// Returns the stable machine-readable identifier.
	pub fn as_str(&self) -> &str {
		match self {
			Self::InvalidArgument => "invalid-argument",
			Self::FailedPrecondition => "failed-precondition",
			Self::OutOfRange => "out-of-range",
			Self::Unauthenticated => "unauthenticated",
			Self::PermissionDenied => "permission-denied",
			Self::NotFound => "not-found",
			Self::Aborted => "aborted",
			Self::AlreadyExists => "already-exists",
			Self::ResourceExhausted => "resource-exhausted",
			Self::Cancelled => "cancelled",
			Self::DataLoss => "data-loss",
			Self::Unknown => "unknown",
			Self::Internal => "internal",
			Self::NotImplemented => "not-implemented",
			Self::Unavailable => "unavailable",
			Self::DeadlineExceeded => "deadline-exceeded",
			Self::Custom(code) => code,
		}
	}

	/// Returns true for members of the closed canonical set.
	pub fn is_canonical(&self) -> bool {
		!matches!(self, Self::Custom(_))
	}

	/// Default HTTP status associated with the identifier.
	pub fn default_http_status(&self) -> u16 {
		match self {
			Self::InvalidArgument | Self::FailedPrecondition | Self::OutOfRange => 400,
			Self::Unauthenticated => 401,
			Self::PermissionDenied => 403,
			Self::NotFound => 404,
			Self::Aborted | Self::AlreadyExists => 409,
			Self::ResourceExhausted => 429,
			Self::Cancelled => 499,
			Self::DataLoss | Self::Unknown | Self::Internal | Self::Custom(_) => 500,
			Self::NotImplemented => 501,
			Self::Unavailable => 503,
			Self::DeadlineExceeded => 504,
		}
	}

	/// Default user-presentable message associated with the identifier.
	pub fn default_message(&self) -> &'static str {
		match self {
			Self::InvalidArgument => "Client specified an invalid argument.",
			Self::FailedPrecondition =>
				"Request can not be executed in the current system state.",
			Self::OutOfRange => "Client specified an invalid range.",
			Self::Unauthenticated =>
				"Request not authenticated due to missing, invalid, or expired credentials.",
			Self::PermissionDenied => "Client does not have sufficient permission.",
			Self::NotFound => "A specified resource is not found.",
			Self::Aborted => "Concurrency conflict.",
			Self::AlreadyExists => "The resource that a client tried to create already exists.",
			Self::ResourceExhausted => "Either out of resource quota or reaching rate limiting.",
			Self::Cancelled => "Request cancelled by the client.",
			Self::DataLoss => "Unrecoverable data loss or data corruption.",
			Self::Unknown | Self::Custom(_) => "Unknown server error.",
			Self::Internal => "Internal server error.",
			Self::NotImplemented => "API method not implemented by the server.",
			Self::Unavailable => "Service unavailable.",
			Self::DeadlineExceeded => "Request deadline exceeded.",
		}
	}

	/// Reformats a server-reported status string and matches it against the canonical
	/// set; statuses outside the set come back as [`ErrorCode::Custom`].
	///
	/// Servers typically report `UPPER_SNAKE` statuses, so the input is lower-cased and
	/// underscores become dashes before matching.
	pub fn from_server_status(raw: &str) -> Self {
		let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");

		Self::from_identifier(&normalized).unwrap_or(Self::Custom(normalized))
	}

	/// Matches an already-normalized identifier against the canonical set.
	pub fn from_identifier(identifier: &str) -> Option<Self> {
		Self::CANONICAL.iter().find(|code| code.as_str() == identifier).cloned()
	}

	/// Maps an HTTP status code to its canonical identifier, when one exists.
	pub fn from_http_status(status: u16) -> Option<Self> {
		match status {
			400 => Some(Self::InvalidArgument),
			401 => Some(Self::Unauthenticated),
			403 => Some(Self::PermissionDenied),
			404 => Some(Self::NotFound),
			409 => Some(Self::Aborted),
			429 => Some(Self::ResourceExhausted),
			499 => Some(Self::Cancelled),
			500 => Some(Self::Internal),
			501 => Some(Self::NotImplemented),
			503 => Some(Self::Unavailable),
			504 => Some(Self::DeadlineExceeded),
			_ => None,
		}
	}

	/// Resolves the canonical identifier for a server response.
	///
	/// Precedence: a recognized server status string wins; otherwise a recognized HTTP
	/// status code; otherwise [`ErrorCode::Unknown`]. An unrecognized pair never
	/// produces an ad-hoc identifier.
	pub fn resolve(http_status: Option<u16>, server_status: Option<&str>) -> Self {
		if let Some(raw) = server_status {
			let candidate = Self::from_server_status(raw);

			if candidate.is_canonical() {
				return candidate;
			}
		}
		if let Some(status) = http_status
			&& let Some(code) = Self::from_http_status(status)
		{
			return code;
		}

		Self::Unknown
	}
}
impl Display for ErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl Serialize for ErrorCode {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

/// Canonical relay error exposed by public APIs.
///
/// Immutable once constructed. Serializes to a plain `{code, message, reason?}` object
/// where `reason` is the `Display` form of the cause, keeping serialized errors
/// JSON-safe.
#[derive(Clone)]
pub struct TypedError {
	/// Machine-readable identifier from the closed vocabulary.
	pub code: ErrorCode,
	/// User-presentable message.
	pub message: String,
	/// HTTP status the error was observed with, when it crossed the transport.
	pub http_status: Option<u16>,
	/// Original response body for non-2xx transport failures.
	pub body: Option<String>,
	/// Whether the error body matched the `{error:{code,message,..}}` envelope.
	///
	/// Observed shape only; implies nothing about severity.
	pub cloud_compliant: Option<bool>,
	/// Underlying cause for diagnostic chaining.
	pub reason: Option<ErrorReason>,
}
impl TypedError {
	/// Creates an error with the code's default message and status.
	pub fn new(code: ErrorCode) -> Self {
		let message = code.default_message().to_owned();
		let http_status = Some(code.default_http_status());

		Self { code, message, http_status, body: None, cloud_compliant: None, reason: None }
	}

	/// Shorthand for an `invalid-argument` error with an explicit message.
	pub fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::InvalidArgument).with_message(message)
	}

	/// Shorthand for a `failed-precondition` error with an explicit message.
	pub fn failed_precondition(message: impl Into<String>) -> Self {
		Self::new(ErrorCode::FailedPrecondition).with_message(message)
	}

	/// Classifies a non-2xx transport response.
	///
	/// The server status string, when recognized, wins over the HTTP status code; both
	/// unrecognized falls back to `unknown`. An explicit message overrides the resolved
	/// default.
	pub fn from_http_response(
		http_status: u16,
		server_status: Option<&str>,
		message: Option<String>,
	) -> Self {
		let code = ErrorCode::resolve(Some(http_status), server_status);
		let message = message.unwrap_or_else(|| code.default_message().to_owned());

		Self {
			code,
			message,
			http_status: Some(http_status),
			body: None,
			cloud_compliant: None,
			reason: None,
		}
	}

	/// Overrides the message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = message.into();

		self
	}

	/// Attaches the original response body and its envelope-compliance flag.
	pub fn with_body(mut self, body: impl Into<String>, cloud_compliant: bool) -> Self {
		self.body = Some(body.into());
		self.cloud_compliant = Some(cloud_compliant);

		self
	}

	/// Attaches the underlying cause.
	pub fn with_reason(mut self, reason: impl 'static + Send + Sync + StdError) -> Self {
		self.reason = Some(Arc::new(reason));

		self
	}
}
impl Debug for TypedError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TypedError")
			.field("code", &self.code.as_str())
			.field("message", &self.message)
			.field("http_status", &self.http_status)
			.field("cloud_compliant", &self.cloud_compliant)
			.field("reason", &self.reason.as_ref().map(ToString::to_string))
			.finish()
	}
}
impl Display for TypedError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}: {}", self.code, self.message)
	}
}
impl StdError for TypedError {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		self.reason.as_deref().map(|reason| reason as &(dyn StdError + 'static))
	}
}
impl Serialize for TypedError {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		use serde::ser::SerializeStruct;

		let fields = if self.reason.is_some() { 3 } else { 2 };
		let mut state = serializer.serialize_struct("TypedError", fields)?;

		state.serialize_field("code", self.code.as_str())?;
		state.serialize_field("message", &self.message)?;

		if let Some(reason) = &self.reason {
			state.serialize_field("reason", &reason.to_string())?;
		}

		state.end()
	}
}
