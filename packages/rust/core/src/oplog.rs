//! Operation log: one structured event per import or export.
//!
//! Events go to the `contentbridge::oplog` target so a subscriber can route
//! them separately from diagnostic logs.

use std::fmt;

use tracing::{info, warn};

/// Direction of a content transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Import,
    Export,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record a completed operation.
pub fn success(operation: Operation, original: &str, parsed: &str) {
    info!(
        target: "contentbridge::oplog",
        operation = operation.as_str(),
        original_len = original.len(),
        parsed_len = parsed.len(),
        result = "success",
        "content {operation}ed"
    );
}

/// Record a failed operation.
pub fn failure(operation: Operation, original: &str, error: &dyn fmt::Display) {
    warn!(
        target: "contentbridge::oplog",
        operation = operation.as_str(),
        original_len = original.len(),
        parsed_len = 0usize,
        result = "failure",
        error = %error,
        "content {operation} failed"
    );
}
