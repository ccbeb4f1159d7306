// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed cause of a failure inside an invoked member.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The error returned when invoking a member fails.
///
/// None of these failures goes away by trying again: they describe a wrong registration, a
/// wrong call, or a failure of the member itself. [`is_retryable`](Self::is_retryable) is
/// therefore always `false`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvocationError {
    /// The member exists but is not accessible.
    #[error("access to `{type_name}::{member}` is denied")]
    AccessDenied {
        /// The type owning the member.
        type_name: &'static str,
        /// The member name.
        member: String,
    },

    /// The member itself failed.
    #[error("`{type_name}::{member}` failed")]
    TargetFailed {
        /// The type owning the member.
        type_name: &'static str,
        /// The member name.
        member: String,
        /// What the member reported.
        #[source]
        source: BoxError,
    },

    /// More than one member was registered under the same name.
    #[error("`{type_name}::{member}` is ambiguous, it was registered more than once")]
    Ambiguous {
        /// The type owning the member.
        type_name: &'static str,
        /// The member name.
        member: String,
    },

    /// No member of the requested kind was registered under this name.
    #[error("`{type_name}` has no member `{member}`")]
    NoSuchMember {
        /// The type that was searched.
        type_name: &'static str,
        /// The member name.
        member: String,
    },

    /// The target value was not of the type the member belongs to.
    #[error("target is not a `{expected}`")]
    TargetMismatch {
        /// The type the member belongs to.
        expected: &'static str,
    },

    /// An argument was missing or of the wrong type.
    #[error("argument {position} of `{member}` must be a `{expected}`")]
    ArgumentMismatch {
        /// The member name.
        member: String,
        /// Zero-based argument position.
        position: usize,
        /// The expected argument type.
        expected: &'static str,
    },

    /// The member returned a value of a different type than the caller asked for.
    #[error("`{member}` returns `{actual}`, not `{requested}`")]
    ReturnMismatch {
        /// The member name.
        member: String,
        /// The declared return type.
        actual: &'static str,
        /// The type the caller asked for.
        requested: &'static str,
    },
}

impl InvocationError {
    /// Returns `false`. Invocation failures are never transient.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns the member name, for every variant that has one.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        match self {
            Self::AccessDenied { member, .. }
            | Self::TargetFailed { member, .. }
            | Self::Ambiguous { member, .. }
            | Self::NoSuchMember { member, .. }
            | Self::ArgumentMismatch { member, .. }
            | Self::ReturnMismatch { member, .. } => Some(member),
            Self::TargetMismatch { .. } => None,
        }
    }
}
