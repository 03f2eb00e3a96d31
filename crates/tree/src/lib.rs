//! Lenta tree: flat comment lists to display trees.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A comment
//! whose parent is missing, or that sits on a parent cycle, becomes a
//! pseudo-root marked `orphaned`; nothing is ever dropped.

#![forbid(unsafe_code)]

use lenta_core::{Comment, CommentId};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub comment: Comment,
    /// Distance from the root; roots and pseudo-roots are 0.
    pub nest_level: u32,
    pub orphaned: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    pub fn id(&self) -> CommentId {
        self.comment.id
    }

    /// Body to show, or `None` when the comment is deleted or hidden and only
    /// its placeholder should be rendered.
    pub fn visible_body(&self) -> Option<&str> {
        if self.comment.is_deleted || self.comment.is_hidden {
            None
        } else {
            Some(&self.comment.body)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentTree {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
    index: FxHashMap<CommentId, NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Build the display tree. Input order is kept among roots and among siblings.
pub fn build(comments: Vec<Comment>) -> CommentTree {
    let n = comments.len();
    let mut index: FxHashMap<CommentId, NodeId> = FxHashMap::default();
    index.reserve(n);
    for (i, c) in comments.iter().enumerate() {
        if index.contains_key(&c.id) {
            warn!(comment = %c.id, position = i, "duplicate comment id; first occurrence owns it");
            continue;
        }
        index.insert(c.id, NodeId(i));
    }

    let mut link: Vec<Option<usize>> = Vec::with_capacity(n);
    let mut orphaned = vec![false; n];
    for (i, c) in comments.iter().enumerate() {
        match c.parent {
            None => link.push(None),
            Some(p) => match index.get(&p) {
                Some(NodeId(j)) => link.push(Some(*j)),
                None => {
                    debug!(comment = %c.id, parent = %p, "parent not in list");
                    orphaned[i] = true;
                    link.push(None);
                }
            },
        }
    }

    // Depth by walking up to the first node of known depth. Every node is
    // walked once; a node met twice on one walk closes a cycle, which is
    // broken there.
    let mut mark = vec![Mark::Unvisited; n];
    let mut depth = vec![0u32; n];
    let mut path: Vec<usize> = Vec::new();
    for start in 0..n {
        if mark[start] == Mark::Done {
            continue;
        }
        path.clear();
        let mut cur = start;
        loop {
            match mark[cur] {
                Mark::Done => break,
                Mark::OnPath => {
                    warn!(comment = %comments[cur].id, "parent cycle; detaching as orphan");
                    link[cur] = None;
                    orphaned[cur] = true;
                    depth[cur] = 0;
                    break;
                }
                Mark::Unvisited => {
                    mark[cur] = Mark::OnPath;
                    path.push(cur);
                    match link[cur] {
                        Some(p) => cur = p,
                        None => break,
                    }
                }
            }
        }
        for &i in path.iter().rev() {
            depth[i] = match link[i] {
                Some(p) => depth[p] + 1,
                None => 0,
            };
            mark[i] = Mark::Done;
        }
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for (i, l) in link.iter().enumerate() {
        match l {
            Some(p) => children[*p].push(NodeId(i)),
            None => roots.push(NodeId(i)),
        }
    }

    let nodes = comments
        .into_iter()
        .zip(children)
        .enumerate()
        .map(|(i, (comment, children))| TreeNode {
            comment,
            nest_level: depth[i],
            orphaned: orphaned[i],
            parent: link[i].map(NodeId),
            children,
        })
        .collect();

    CommentTree { nodes, roots, index }
}

impl CommentTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.roots.iter().map(|id| &self.nodes[id.0])
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    /// Node owning `id` (the first occurrence when ids repeat).
    pub fn find(&self, id: CommentId) -> Option<&TreeNode> {
        self.index.get(&id).and_then(|n| self.node(*n))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &TreeNode> + '_ {
        self.node(id).into_iter().flat_map(move |n| n.children.iter().map(move |c| &self.nodes[c.0]))
    }

    pub fn orphans(&self) -> impl Iterator<Item = &TreeNode> + '_ {
        self.nodes.iter().filter(|n| n.orphaned)
    }

    /// Display order: pre-order, roots and siblings in input order.
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst { tree: self, stack: self.roots.iter().rev().copied().collect() }
    }
}

pub struct DepthFirst<'a> {
    tree: &'a CommentTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.node(id)?;
        self.stack.extend(node.children.iter().rev().copied());
        Some(node)
    }
}
