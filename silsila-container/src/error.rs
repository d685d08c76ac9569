//! Error types for container operations.
//!
//! Resolution failures carry the resolution path captured at throw time,
//! so the message shows not just what failed but where in the dependency
//! graph it happened.

use std::fmt;

use crate::identifier::ServiceIdentifier;
use crate::provider::BoxError;
use crate::record::{RecordEntry, ResolveRecord};

use silsila_support::rendering::{render_chain, render_tree};

/// Convenient Result type for container operations.
pub type Result<T> = std::result::Result<T, SilsilaError>;

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum SilsilaError {
    /// Requested identifier has no registration in the container or any
    /// ancestor, and the request was not optional.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// The dependency graph loops through only eager edges.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A factory or constructor failed during resolution.
    #[error("Failed to construct {identifier}: {source}\n{trace}")]
    FactoryFailed {
        identifier: ServiceIdentifier,
        #[source]
        source: BoxError,
        trace: ResolveTrace,
    },

    /// Operation invoked on a disposed container or manager.
    #[error("{subject} is disposed")]
    Disposed { subject: String },

    /// Rejected resolve option combination.
    #[error("Invalid resolve options: {0}")]
    InvalidOptions(String),

    /// The ambient resolver was called outside any resolve frame.
    #[error("resolve() called outside an active resolution")]
    NoActiveResolution,

    /// The active record's current node has no container above it.
    #[error("Resolution record has no current container")]
    NoContainerInRecord,

    /// The record's current pointer was restored more times than stashed.
    #[error("Resolution record stack restored without a matching stash")]
    UnbalancedRecordStack,

    /// A resolved instance was not of the requested type.
    #[error("Type mismatch resolving {identifier}: expected {expected}")]
    TypeMismatch {
        identifier: ServiceIdentifier,
        expected: &'static str,
    },
}

/// A snapshot of the resolution record, rendered at throw time.
///
/// Two parts: the chain of service identifiers from the root of the
/// resolution to the failure point, and the indented tree of every step
/// taken. Both are plain text; the record itself is not retained.
#[derive(Debug, Default)]
pub struct ResolveTrace {
    chain: String,
    tree: String,
}

impl ResolveTrace {
    /// Captures the record as rendered text.
    ///
    /// With `cycle` set, the last chain entry is marked as the node the
    /// chain loops back to.
    pub(crate) fn capture(record: &ResolveRecord, cycle: bool) -> Self {
        let entries: Vec<String> = record
            .path_from_root()
            .iter()
            .filter_map(|entry| entry.service_label())
            .collect();
        let cycle_index = if cycle && !entries.is_empty() {
            Some(entries.len() - 1)
        } else {
            None
        };
        let chain = render_chain(&entries, cycle_index);

        let mut lines = Vec::new();
        collect_steps(&record.root(), 0, &mut lines);
        let tree = render_tree(&lines);

        Self { chain, tree }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn tree(&self) -> &str {
        &self.tree
    }
}

fn collect_steps(entry: &std::sync::Arc<RecordEntry>, depth: usize, out: &mut Vec<(usize, String)>) {
    for child in entry.children() {
        if let Some(line) = child.step_line() {
            out.push((depth, line));
        }
        collect_steps(&child, depth + 1, out);
    }
}

impl fmt::Display for ResolveTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.chain.is_empty(), self.tree.is_empty()) {
            (false, false) => write!(f, "{}\n{}", self.chain, self.tree),
            (false, true) => write!(f, "{}", self.chain),
            (true, false) => write!(f, "{}", self.tree),
            (true, true) => Ok(()),
        }
    }
}

/// Error when an identifier has no registration anywhere in the chain.
#[derive(Debug)]
pub struct NotRegisteredError {
    /// The identifier that was requested.
    pub identifier: ServiceIdentifier,
    /// Name of the container the request was made on.
    pub container: String,
    /// The resolution path at the time of the failure.
    pub trace: ResolveTrace,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Service identifier not registered: {} (asked of container '{}')",
            self.identifier, self.container
        )?;
        write!(f, "\n{}", self.trace)?;
        write!(
            f,
            "\n  Hint: register a provider for \"{}\" or resolve it as optional",
            self.identifier
        )
    }
}

/// Error when resolution loops back onto an identifier already being
/// resolved through only eager edges.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// The resolution path; its chain line marks the repeated node.
    pub trace: ResolveTrace,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected")?;
        write!(f, "\n{}", self.trace)?;
        write!(
            f,
            "\n  Hint: break the cycle by resolving one edge as a lazy or dynamic reference"
        )
    }
}
