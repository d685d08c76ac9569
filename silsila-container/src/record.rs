//! The resolution record - a tree of every step a resolve call takes.
//!
//! Each resolve frame appends a node describing what is being resolved and
//! where; middleware may append free-form message nodes. The tree serves
//! two purposes: runtime cycle detection, and the path dump shown when a
//! resolution fails.
//!
//! The record keeps a `current` insertion pointer plus a stash stack so a
//! caller resolving sub-dependencies can park the pointer and put it back,
//! keeping sibling steps siblings rather than nesting them.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use silsila_support::rendering::render_identifier;

use crate::container::Container;
use crate::error::{Result, SilsilaError};
use crate::identifier::ServiceIdentifier;
use crate::resolve::ResolveOptions;

/// Payload of one record tree node.
#[derive(Debug, Clone)]
pub enum RecordNode {
    /// The tree root; remembers the container the resolution started on.
    Root { container: Container },
    /// One service resolution step.
    Service {
        container: Container,
        identifier: ServiceIdentifier,
        options: ResolveOptions,
    },
    /// A free-form annotation, e.g. "Resolve parameter #2 of X".
    Message(String),
}

/// A node in the record tree.
///
/// Children are ordered by insertion; the parent link is weak, the tree is
/// owned root-down.
pub struct RecordEntry {
    node: RecordNode,
    parent: Weak<RecordEntry>,
    children: Mutex<Vec<Arc<RecordEntry>>>,
}

impl RecordEntry {
    fn root(container: Container) -> Arc<Self> {
        Arc::new(Self {
            node: RecordNode::Root { container },
            parent: Weak::new(),
            children: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub fn node(&self) -> &RecordNode {
        &self.node
    }

    pub fn parent(&self) -> Option<Arc<RecordEntry>> {
        self.parent.upgrade()
    }

    pub fn children(&self) -> Vec<Arc<RecordEntry>> {
        self.children.lock().clone()
    }

    /// The rendered identifier for a service node, `None` otherwise.
    pub(crate) fn service_label(&self) -> Option<String> {
        match &self.node {
            RecordNode::Service {
                container,
                identifier,
                options,
            } => Some(render_identifier(
                &identifier.label(),
                container.name(),
                &options.flags(),
            )),
            _ => None,
        }
    }

    /// The line this node contributes to the resolution tree dump.
    pub(crate) fn step_line(&self) -> Option<String> {
        match &self.node {
            RecordNode::Root { .. } => None,
            RecordNode::Service { .. } => self.service_label().map(|label| format!("Resolve {label}")),
            RecordNode::Message(text) => Some(text.clone()),
        }
    }
}

impl fmt::Debug for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordEntry")
            .field("node", &self.node)
            .field("children", &self.children.lock().len())
            .finish()
    }
}

/// The record of one top-level resolve call.
pub struct ResolveRecord {
    root: Arc<RecordEntry>,
    current: Mutex<Arc<RecordEntry>>,
    stash: Mutex<Vec<Arc<RecordEntry>>>,
}

impl ResolveRecord {
    pub fn new(container: Container) -> Arc<Self> {
        let root = RecordEntry::root(container);
        Arc::new(Self {
            current: Mutex::new(root.clone()),
            root,
            stash: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> Arc<RecordEntry> {
        self.root.clone()
    }

    pub fn current(&self) -> Arc<RecordEntry> {
        self.current.lock().clone()
    }

    /// Appends `node` as a child of `current` and moves `current` to it.
    pub fn add_node(&self, node: RecordNode) -> Arc<RecordEntry> {
        let mut current = self.current.lock();
        let entry = Arc::new(RecordEntry {
            node,
            parent: Arc::downgrade(&*current),
            children: Mutex::new(Vec::new()),
        });
        current.children.lock().push(entry.clone());
        *current = entry.clone();
        entry
    }

    /// Appends a message node; see [`ResolveRecord::add_node`].
    pub fn add_message(&self, text: impl Into<String>) -> Arc<RecordEntry> {
        self.add_node(RecordNode::Message(text.into()))
    }

    /// Parks the current pointer on the stash stack.
    pub fn stash_current(&self) {
        let current = self.current.lock().clone();
        self.stash.lock().push(current);
    }

    /// Parks the current pointer and jumps to `node`.
    ///
    /// Used when re-entering the record at a previously captured position,
    /// e.g. when a lazy reference finally resolves.
    pub fn stash_current_at(&self, node: Arc<RecordEntry>) {
        let mut current = self.current.lock();
        self.stash.lock().push(current.clone());
        *current = node;
    }

    /// Pops the stash stack back into the current pointer.
    ///
    /// Stash and restore must stay balanced within a resolve frame; an
    /// excess restore is a programmer error.
    pub fn restore_current(&self) -> Result<()> {
        let Some(previous) = self.stash.lock().pop() else {
            return Err(SilsilaError::UnbalancedRecordStack);
        };
        *self.current.lock() = previous;
        Ok(())
    }

    /// Looks for an ancestor of `current` that resolution is about to
    /// repeat, which would mean the dependency graph loops.
    ///
    /// Two service nodes match when their containers and identifiers are
    /// identical and neither was reached through a lazy or dynamic
    /// reference; crossing such a reference ends the search, deferred
    /// edges are how cycles are legitimately broken.
    pub fn find_cycle(&self) -> Option<Arc<RecordEntry>> {
        let current = self.current();
        let RecordNode::Service {
            container,
            identifier,
            options,
        } = current.node()
        else {
            return None;
        };
        if options.lazy || options.dynamic {
            return None;
        }

        let mut cursor = current.parent();
        while let Some(entry) = cursor {
            match entry.node() {
                RecordNode::Root { .. } => return None,
                RecordNode::Message(_) => {}
                RecordNode::Service {
                    container: ancestor_container,
                    identifier: ancestor_identifier,
                    options: ancestor_options,
                } => {
                    if ancestor_options.lazy || ancestor_options.dynamic {
                        return None;
                    }
                    if ancestor_container == container && ancestor_identifier == identifier {
                        return Some(entry);
                    }
                }
            }
            cursor = entry.parent();
        }
        None
    }

    /// The container of the nearest service-or-root ancestor of `current`.
    pub fn current_container(&self) -> Result<Container> {
        let mut cursor = Some(self.current());
        while let Some(entry) = cursor {
            match entry.node() {
                RecordNode::Root { container } | RecordNode::Service { container, .. } => {
                    return Ok(container.clone());
                }
                RecordNode::Message(_) => {}
            }
            cursor = entry.parent();
        }
        Err(SilsilaError::NoContainerInRecord)
    }

    /// Ancestors of `current`, root-first, excluding the root itself.
    pub fn path_from_root(&self) -> Vec<Arc<RecordEntry>> {
        let mut path = Vec::new();
        let mut cursor = Some(self.current());
        while let Some(entry) = cursor {
            if matches!(entry.node(), RecordNode::Root { .. }) {
                break;
            }
            cursor = entry.parent();
            path.push(entry);
        }
        path.reverse();
        path
    }
}

impl fmt::Debug for ResolveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveRecord")
            .field("current", &self.current())
            .field("stashed", &self.stash.lock().len())
            .finish()
    }
}
