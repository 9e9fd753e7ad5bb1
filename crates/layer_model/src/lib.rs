//! Immutable layer tree with path-based addressing.
//!
//! Every edit is copy-on-write: ancestors along the edited path are rebuilt,
//! untouched subtrees are shared through `Arc`. A `SelectionPath` is a plain
//! index sequence from the root, never a live pointer into the tree, so a
//! stale path simply fails to resolve instead of dangling.

use std::sync::Arc;

use smallvec::SmallVec;

mod split;

pub use split::{CollectedLayer, SplitDiff, SplitLayers, diff, split};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

/// A node of the layer tree. `children` are ordered topmost-first: index 0
/// renders nearest the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerNode {
    Leaf {
        id: LayerId,
        name: String,
        opacity: f32,
        hidden: bool,
    },
    Group {
        id: LayerId,
        name: String,
        opacity: f32,
        hidden: bool,
        children: Vec<Arc<LayerNode>>,
    },
}

impl LayerNode {
    pub fn id(&self) -> LayerId {
        match self {
            LayerNode::Leaf { id, .. } | LayerNode::Group { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LayerNode::Leaf { name, .. } | LayerNode::Group { name, .. } => name,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            LayerNode::Leaf { opacity, .. } | LayerNode::Group { opacity, .. } => *opacity,
        }
    }

    pub fn hidden(&self) -> bool {
        match self {
            LayerNode::Leaf { hidden, .. } | LayerNode::Group { hidden, .. } => *hidden,
        }
    }

    pub fn leaf(id: LayerId, name: impl Into<String>) -> Self {
        LayerNode::Leaf {
            id,
            name: name.into(),
            opacity: 1.0,
            hidden: false,
        }
    }

    pub fn group(id: LayerId, name: impl Into<String>, children: Vec<LayerNode>) -> Self {
        LayerNode::Group {
            id,
            name: name.into(),
            opacity: 1.0,
            hidden: false,
            children: children.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Non-empty sequence of child indices from the root group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPath(SmallVec<[usize; 8]>);

impl SelectionPath {
    pub fn new(indices: &[usize]) -> Self {
        assert!(!indices.is_empty(), "selection path must not be empty");
        Self(SmallVec::from_slice(indices))
    }

    pub fn root(index: usize) -> Self {
        Self(SmallVec::from_slice(&[index]))
    }

    /// Index into the root group's children.
    pub fn head(&self) -> usize {
        self.0[0]
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }
}

/// A flattened leaf view: the leaf identity plus the product of opacities
/// along its ancestor chain, forced to zero by any hidden ancestor.
pub fn collect_leaves(node: &LayerNode, inherited_opacity: f32, into: &mut Vec<CollectedLayer>) {
    let next_opacity = if node.hidden() {
        0.0
    } else {
        inherited_opacity * node.opacity()
    };
    match node {
        LayerNode::Leaf { id, name, .. } => {
            into.push(CollectedLayer {
                id: *id,
                name: name.clone(),
                effective_opacity: next_opacity,
            });
        }
        LayerNode::Group { children, .. } => {
            for child in children {
                collect_leaves(child, next_opacity, into);
            }
        }
    }
}

/// The document's layer stack. The root is always a Group and acts as a plain
/// container: its own opacity and hidden flag do not participate in effective
/// opacity.
#[derive(Debug, Clone)]
pub struct LayerTree {
    root: Arc<LayerNode>,
}

impl LayerTree {
    pub fn new(root: LayerNode) -> Self {
        assert!(
            matches!(root, LayerNode::Group { .. }),
            "layer tree root must be a group"
        );
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &LayerNode {
        &self.root
    }

    pub fn root_children(&self) -> &[Arc<LayerNode>] {
        group_children(&self.root)
    }

    /// Walks `path` and returns the addressed node. Panics when the path
    /// addresses a missing child or descends through a Leaf: both indicate a
    /// desynchronized caller, not a runtime condition.
    pub fn resolve(&self, path: &SelectionPath) -> &LayerNode {
        let mut node: &LayerNode = &self.root;
        for &index in path.indices() {
            let children = group_children(node);
            assert!(
                index < children.len(),
                "selection path index {index} out of bounds for group {:?} with {} children",
                node.id(),
                children.len()
            );
            node = &children[index];
        }
        node
    }

    /// Like `resolve`, but also returns the effective opacity of the
    /// addressed node: the product of opacities along the path, zeroed by any
    /// hidden node on it.
    pub fn resolve_with_opacity(&self, path: &SelectionPath) -> (&LayerNode, f32) {
        let mut node: &LayerNode = &self.root;
        let mut effective_opacity = 1.0_f32;
        for &index in path.indices() {
            let children = group_children(node);
            assert!(
                index < children.len(),
                "selection path index {index} out of bounds for group {:?} with {} children",
                node.id(),
                children.len()
            );
            node = &children[index];
            effective_opacity = if node.hidden() {
                0.0
            } else {
                effective_opacity * node.opacity()
            };
        }
        (node, effective_opacity)
    }

    /// Pre-order search over the whole tree, first match wins.
    pub fn find_path(&self, id: LayerId) -> Option<SelectionPath> {
        let mut indices = SmallVec::new();
        if find_in_children(group_children(&self.root), id, &mut indices) {
            Some(SelectionPath(indices))
        } else {
            None
        }
    }

    /// Inserts `new_node` at the slot addressed by `path`'s final component,
    /// shifting the current occupant and all following siblings down by one.
    /// `path` continues to address `new_node` in the returned tree.
    pub fn insert(&self, path: &SelectionPath, new_node: LayerNode) -> LayerTree {
        let indices = path.indices();
        let (parent_indices, insert_index) = (
            &indices[..indices.len() - 1],
            indices[indices.len() - 1],
        );
        let mut pending = Some(new_node);
        let new_root = rebuild_along(&self.root, parent_indices, &mut |parent| {
            let mut children = group_children(parent).to_vec();
            assert!(
                insert_index <= children.len(),
                "insert index {insert_index} out of bounds for group {:?} with {} children",
                parent.id(),
                children.len()
            );
            let node = pending.take().expect("insert edit applied twice");
            children.insert(insert_index, Arc::new(node));
            with_children(parent, children)
        });
        LayerTree {
            root: Arc::new(new_root),
        }
    }

    /// Removes the addressed node. Ancestor groups emptied by the removal are
    /// removed as well (the root is never removed and may legally end up with
    /// zero children). Returns the new tree and the adjusted selection: the
    /// previous index where it still exists, otherwise `index - 1`.
    ///
    /// Precondition for the surrounding application: never remove the last
    /// leaf of the document, or the returned selection will not resolve.
    pub fn remove(&self, path: &SelectionPath) -> (LayerTree, SelectionPath) {
        match remove_in_group(&self.root, path.indices()) {
            RemovalOutcome::Replaced {
                node,
                selection,
            } => (
                LayerTree {
                    root: Arc::new(node),
                },
                SelectionPath(selection),
            ),
            RemovalOutcome::Emptied => (
                LayerTree {
                    root: Arc::new(with_children(&self.root, Vec::new())),
                },
                SelectionPath::root(0),
            ),
        }
    }

    /// Applies a pure transform to the addressed node, rebuilding every
    /// ancestor along `path` immutably.
    pub fn update(
        &self,
        path: &SelectionPath,
        transform: impl FnOnce(&LayerNode) -> LayerNode,
    ) -> LayerTree {
        let mut pending = Some(transform);
        let new_root = rebuild_along(&self.root, path.indices(), &mut |node| {
            let transform = pending.take().expect("update transform applied twice");
            transform(node)
        });
        LayerTree {
            root: Arc::new(new_root),
        }
    }

    pub fn set_opacity(&self, path: &SelectionPath, opacity: f32) -> LayerTree {
        self.update(path, |node| match node.clone() {
            LayerNode::Leaf { id, name, hidden, .. } => LayerNode::Leaf {
                id,
                name,
                opacity,
                hidden,
            },
            LayerNode::Group {
                id,
                name,
                hidden,
                children,
                ..
            } => LayerNode::Group {
                id,
                name,
                opacity,
                hidden,
                children,
            },
        })
    }

    pub fn set_hidden(&self, path: &SelectionPath, hidden: bool) -> LayerTree {
        self.update(path, |node| match node.clone() {
            LayerNode::Leaf {
                id, name, opacity, ..
            } => LayerNode::Leaf {
                id,
                name,
                opacity,
                hidden,
            },
            LayerNode::Group {
                id,
                name,
                opacity,
                children,
                ..
            } => LayerNode::Group {
                id,
                name,
                opacity,
                hidden,
                children,
            },
        })
    }

    pub fn rename(&self, path: &SelectionPath, name: impl Into<String>) -> LayerTree {
        let name = name.into();
        self.update(path, move |node| match node.clone() {
            LayerNode::Leaf {
                id, opacity, hidden, ..
            } => LayerNode::Leaf {
                id,
                name,
                opacity,
                hidden,
            },
            LayerNode::Group {
                id,
                opacity,
                hidden,
                children,
                ..
            } => LayerNode::Group {
                id,
                name,
                opacity,
                hidden,
                children,
            },
        })
    }
}

fn group_children(node: &LayerNode) -> &[Arc<LayerNode>] {
    match node {
        LayerNode::Group { children, .. } => children,
        LayerNode::Leaf { id, .. } => {
            panic!("selection path descends through leaf layer {id:?}")
        }
    }
}

fn with_children(node: &LayerNode, children: Vec<Arc<LayerNode>>) -> LayerNode {
    match node {
        LayerNode::Group {
            id,
            name,
            opacity,
            hidden,
            ..
        } => LayerNode::Group {
            id: *id,
            name: name.clone(),
            opacity: *opacity,
            hidden: *hidden,
            children,
        },
        LayerNode::Leaf { id, .. } => {
            panic!("cannot rebuild children of leaf layer {id:?}")
        }
    }
}

fn rebuild_along(
    node: &LayerNode,
    indices: &[usize],
    edit: &mut dyn FnMut(&LayerNode) -> LayerNode,
) -> LayerNode {
    let Some((&index, rest)) = indices.split_first() else {
        return edit(node);
    };
    let children = group_children(node);
    assert!(
        index < children.len(),
        "selection path index {index} out of bounds for group {:?} with {} children",
        node.id(),
        children.len()
    );
    let mut new_children = children.to_vec();
    new_children[index] = Arc::new(rebuild_along(&children[index], rest, edit));
    with_children(node, new_children)
}

enum RemovalOutcome {
    Replaced {
        node: LayerNode,
        selection: SmallVec<[usize; 8]>,
    },
    Emptied,
}

fn remove_in_group(node: &LayerNode, indices: &[usize]) -> RemovalOutcome {
    let children = group_children(node);
    let (&index, rest) = indices
        .split_first()
        .expect("removal path must not be empty");
    assert!(
        index < children.len(),
        "selection path index {index} out of bounds for group {:?} with {} children",
        node.id(),
        children.len()
    );

    if rest.is_empty() {
        return drop_child(node, children, index);
    }

    match remove_in_group(&children[index], rest) {
        RemovalOutcome::Replaced {
            node: new_child,
            selection: mut child_selection,
        } => {
            let mut new_children = children.to_vec();
            new_children[index] = Arc::new(new_child);
            child_selection.insert(0, index);
            RemovalOutcome::Replaced {
                node: with_children(node, new_children),
                selection: child_selection,
            }
        }
        RemovalOutcome::Emptied => drop_child(node, children, index),
    }
}

fn drop_child(node: &LayerNode, children: &[Arc<LayerNode>], index: usize) -> RemovalOutcome {
    let mut new_children = children.to_vec();
    new_children.remove(index);
    if new_children.is_empty() {
        return RemovalOutcome::Emptied;
    }
    let selected_index = index.min(new_children.len() - 1);
    RemovalOutcome::Replaced {
        node: with_children(node, new_children),
        selection: SmallVec::from_slice(&[selected_index]),
    }
}

fn find_in_children(
    children: &[Arc<LayerNode>],
    id: LayerId,
    indices: &mut SmallVec<[usize; 8]>,
) -> bool {
    for (index, child) in children.iter().enumerate() {
        indices.push(index);
        if child.id() == id {
            return true;
        }
        if let LayerNode::Group {
            children: grandchildren,
            ..
        } = &**child
        {
            if find_in_children(grandchildren, id, indices) {
                return true;
            }
        }
        indices.pop();
    }
    false
}
