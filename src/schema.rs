//! Declarative schema description
//!
//! A [`SchemaNode`] describes the expected child structure of one element:
//! either a leaf with a semantic action, an ordered [`Sequence`] whose child
//! list may repeat as whole cycles, or an unordered [`Choice`]. Nodes are
//! immutable and stateless across calls; per-parse counters live in the
//! engine's stack frame, so one schema can drive any number of concurrently
//! parsed files (typically from a `LazyLock` static).
//!
//! [`Sequence`]: SchemaNode::Sequence
//! [`Choice`]: SchemaNode::Choice

use std::fmt;
use std::sync::Arc;

use crate::engine::ParseContext;
use crate::error::Result;

/// Inclusive occurrence bounds.
///
/// `max == Occurs::UNBOUNDED` means no upper limit; the sentinel is an
/// explicit maximum count, never a nullable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    pub min: u32,
    pub max: u32,
}

impl Occurs {
    /// Sentinel for "no upper bound".
    pub const UNBOUNDED: u32 = u32::MAX;

    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Exactly once.
    pub const fn once() -> Self {
        Self::new(1, 1)
    }

    /// Zero or one.
    pub const fn optional() -> Self {
        Self::new(0, 1)
    }

    /// Zero or more.
    pub const fn any() -> Self {
        Self::new(0, Self::UNBOUNDED)
    }

    /// `min` or more.
    pub const fn at_least(min: u32) -> Self {
        Self::new(min, Self::UNBOUNDED)
    }

    pub fn contains(&self, count: u32) -> bool {
        count >= self.min && count <= self.max
    }
}

/// Action invoked when a matching leaf element is entered.
///
/// Receives the parse context positioned on the element, with attribute
/// access and the importer-defined accumulator `S`.
pub type LeafAction<S> =
    Arc<dyn Fn(&mut ParseContext<'_, S>) -> Result<()> + Send + Sync>;

/// A named child slot inside a [`SchemaNode::Sequence`] or
/// [`SchemaNode::Choice`].
pub struct ChildRule<S> {
    pub name: String,
    pub node: SchemaNode<S>,
}

impl<S> ChildRule<S> {
    pub fn new(name: impl Into<String>, node: SchemaNode<S>) -> Self {
        Self {
            name: name.into(),
            node,
        }
    }
}

impl<S> fmt::Debug for ChildRule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildRule")
            .field("name", &self.name)
            .field("node", &self.node)
            .finish()
    }
}

/// Declarative description of one element's expected children.
pub enum SchemaNode<S> {
    /// Terminal element with a semantic action. `occurs` bounds how many
    /// times the element may appear within its parent slot.
    Leaf {
        occurs: Occurs,
        action: LeafAction<S>,
    },
    /// Ordered children that must appear in relative order; the whole list is
    /// cyclically repeatable and `occurs` bounds the number of full cycles.
    Sequence {
        occurs: Occurs,
        children: Vec<ChildRule<S>>,
    },
    /// Unordered children, each bounded by its own node's `occurs`; this
    /// node's `occurs` bounds the total child count.
    Choice {
        occurs: Occurs,
        children: Vec<ChildRule<S>>,
    },
}

impl<S> SchemaNode<S> {
    /// Leaf with a semantic action.
    pub fn leaf<F>(occurs: Occurs, action: F) -> Self
    where
        F: Fn(&mut ParseContext<'_, S>) -> Result<()> + Send + Sync + 'static,
    {
        SchemaNode::Leaf {
            occurs,
            action: Arc::new(action),
        }
    }

    /// Leaf that only participates in cardinality checking.
    pub fn leaf_noop(occurs: Occurs) -> Self {
        Self::leaf(occurs, |_| Ok(()))
    }

    pub fn sequence(occurs: Occurs, children: Vec<ChildRule<S>>) -> Self {
        SchemaNode::Sequence { occurs, children }
    }

    pub fn choice(occurs: Occurs, children: Vec<ChildRule<S>>) -> Self {
        SchemaNode::Choice { occurs, children }
    }

    pub fn occurs(&self) -> Occurs {
        match self {
            SchemaNode::Leaf { occurs, .. }
            | SchemaNode::Sequence { occurs, .. }
            | SchemaNode::Choice { occurs, .. } => *occurs,
        }
    }

    /// Child rules of a container node; empty for leaves.
    pub fn children(&self) -> &[ChildRule<S>] {
        match self {
            SchemaNode::Leaf { .. } => &[],
            SchemaNode::Sequence { children, .. }
            | SchemaNode::Choice { children, .. } => children,
        }
    }

    /// Whether a self-closing element satisfies this node: its own minimum
    /// and every child's minimum must be zero.
    pub(crate) fn admits_empty(&self) -> bool {
        self.occurs().min == 0
            && self
                .children()
                .iter()
                .all(|child| child.node.occurs().min == 0)
    }
}

impl<S> fmt::Debug for SchemaNode<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaNode::Leaf { occurs, .. } => f
                .debug_struct("Leaf")
                .field("occurs", occurs)
                .finish_non_exhaustive(),
            SchemaNode::Sequence { occurs, children } => f
                .debug_struct("Sequence")
                .field("occurs", occurs)
                .field("children", children)
                .finish(),
            SchemaNode::Choice { occurs, children } => f
                .debug_struct("Choice")
                .field("occurs", occurs)
                .field("children", children)
                .finish(),
        }
    }
}

/// Top-level schema: the required root element name and its node.
#[derive(Debug)]
pub struct DocumentSchema<S> {
    pub root: String,
    pub node: SchemaNode<S>,
}

impl<S> DocumentSchema<S> {
    pub fn new(root: impl Into<String>, node: SchemaNode<S>) -> Self {
        Self {
            root: root.into(),
            node,
        }
    }
}
