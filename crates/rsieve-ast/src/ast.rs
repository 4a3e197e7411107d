//! Abstract syntax tree.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]; there are
//! no owning back-pointers. The AST is immutable after parsing - the
//! validator records its annotations in side tables keyed by node id.

use crate::diag::Location;

/// Index of a node within its [`Ast`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Command or test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Command,
    Test,
}

/// Argument value attached to a command or test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    StringList(Vec<String>),
    Number(u64),
    Tag(String),
}

impl ArgValue {
    /// Human-readable type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::StringList(_) => "string list",
            Self::Number(_) => "number",
            Self::Tag(_) => "tag",
        }
    }

    /// A string, or a one-element string list (the two are interchangeable
    /// where the grammar permits either).
    #[must_use]
    pub fn as_single_string(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::StringList(items) if items.len() == 1 => Some(&items[0]),
            _ => None,
        }
    }

    /// String or string list, as a slice of items.
    #[must_use]
    pub fn as_string_list(&self) -> Option<Vec<&str>> {
        match self {
            Self::Str(s) => Some(vec![s.as_str()]),
            Self::StringList(items) => Some(items.iter().map(String::as_str).collect()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Argument {
    pub value: ArgValue,
    pub location: Location,
}

/// A command or test node.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    pub args: Vec<Argument>,
    /// Sub-tests (`if` condition, `allof`/`anyof` members, `not` operand).
    pub tests: Vec<NodeId>,
    /// Child commands of the attached `{ ... }` block.
    pub block: Vec<NodeId>,
    /// Whether a block was present at all (distinguishes `cmd;` from
    /// `cmd {}`).
    pub has_block: bool,
    pub parent: Option<NodeId>,
    pub location: Location,
}

/// Arena-allocated AST for one script.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Ast {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }

    pub fn push_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Top-level commands in script order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate all node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }
}
