//! Optional observability helpers for handshake flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `gcip_iap_relay.flow` with the
//!   `flow` (protocol state) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `gcip_iap_relay_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Handshake flow kinds observed by the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Fresh sign-in flow.
	SignIn,
	/// Sign-in resumed after the federated redirect.
	SignInCallback,
	/// Single-tenant sign-out.
	SignOutSingle,
	/// Multi-tenant sign-out.
	SignOutMulti,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::SignIn => "sign_in",
			FlowKind::SignInCallback => "sign_in_callback",
			FlowKind::SignOutSingle => "sign_out_single",
			FlowKind::SignOutMulti => "sign_out_multi",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated to the handler.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
