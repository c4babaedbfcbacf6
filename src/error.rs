//! Error and warning types surfaced to callers of the frame core.

use serde::Serialize;
use thiserror::Error;

use crate::frame::{Frame, FrameId};
use crate::geometry::BasisIssue;

/// Errors from frame mutations. These block the operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// A field received a value that is not a finite number.
    #[error("invalid value for '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown frame {0}")]
    UnknownFrame(FrameId),

    #[error("unknown parent frame {0}")]
    UnknownParent(FrameId),

    /// Reparenting would make a frame its own ancestor.
    #[error("making {parent} the parent of {frame} would create a cycle")]
    Cycle { frame: FrameId, parent: FrameId },

    /// Removal with `RemovePolicy::Reject` on a frame that still has children.
    #[error("{0} still has children")]
    HasChildren(FrameId),
}

impl FrameError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FrameError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Non-blocking warning about collapsed frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeometryWarning {
    pub frame: FrameId,
    pub issue: BasisIssue,
}

impl std::fmt::Display for GeometryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.frame, self.issue)
    }
}

impl GeometryWarning {
    /// Warning for `frame` if its basis is degenerate.
    pub fn for_frame(frame: &Frame) -> Option<Self> {
        frame.basis_issue().map(|issue| GeometryWarning { frame: frame.id, issue })
    }
}

/// Degenerate-geometry warnings for a frame. Empty for an invertible basis.
pub fn basis_warnings(frame: &Frame) -> Vec<GeometryWarning> {
    GeometryWarning::for_frame(frame).into_iter().collect()
}
