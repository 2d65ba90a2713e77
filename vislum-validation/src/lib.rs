//! Call validation for Vulkan.
//!
//! The [`Validator`] sits between an application and the driver. Every
//! intercepted entry point is described by a [`Call`], checked in
//! [`Validator::pre_call`] against the tracked object, subresource and
//! command buffer state, and then registered in [`Validator::post_call`]
//! once the driver's result is known. Violations are reported as
//! [`Finding`]s through a [`DiagnosticSink`]; the call itself is never
//! blocked or altered.

pub mod call;
pub mod command;
pub mod diagnostic;
pub mod extent;
pub mod finding;
pub mod format;
pub mod handle;
pub mod registry;
pub mod settings;
pub mod tracker;
pub mod validate;

mod macros;

pub use call::Call;
pub use diagnostic::{ChannelSink, DiagnosticSink, LogSink};
pub use finding::{Finding, FindingCode, Severity, ViolationKind};
pub use handle::{Handle, ObjectKey, ObjectType};
pub use settings::{RuleCategory, RuleFilter, ValidationSettings};
pub use validate::{Report, Validator};
