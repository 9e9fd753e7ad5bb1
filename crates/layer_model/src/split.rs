//! Projection of the layer tree into the three paint groups used by the
//! compositor, and the frame-to-frame diff over that projection.

use crate::{LayerId, LayerNode, LayerTree, SelectionPath, collect_leaves};

#[derive(Debug, Clone, PartialEq)]
pub struct CollectedLayer {
    pub id: LayerId,
    pub name: String,
    pub effective_opacity: f32,
}

/// The per-frame projection of tree + selection: layers visually above the
/// selection, the selected leaf itself, layers visually below. `current` is
/// `None` whenever the selection is, or is nested inside, a Group, in which
/// case brush strokes have no destination.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitLayers {
    pub above: Vec<CollectedLayer>,
    pub current: Option<CollectedLayer>,
    pub below: Vec<CollectedLayer>,
    /// Resolved top-level child index of the selection; feeds structural
    /// change detection.
    pub selected_root_index: usize,
}

pub fn split(tree: &LayerTree, path: &SelectionPath) -> SplitLayers {
    let children = tree.root_children();
    let selected_root_index = path.head();
    assert!(
        selected_root_index < children.len(),
        "selection path index {selected_root_index} out of bounds for root with {} children",
        children.len()
    );

    let mut above = Vec::new();
    for child in &children[..selected_root_index] {
        collect_leaves(child, 1.0, &mut above);
    }

    let mut below = Vec::new();
    let selected = &children[selected_root_index];
    let current = match (path.len(), &**selected) {
        (
            1,
            LayerNode::Leaf {
                id,
                name,
                opacity,
                hidden,
            },
        ) => Some(CollectedLayer {
            id: *id,
            name: name.clone(),
            effective_opacity: if *hidden { 0.0 } else { *opacity },
        }),
        _ => {
            // Selection sits on (or inside) a group: the whole subtree keeps
            // rendering, below everything above it.
            collect_leaves(selected, 1.0, &mut below);
            None
        }
    };
    for child in &children[selected_root_index + 1..] {
        collect_leaves(child, 1.0, &mut below);
    }

    SplitLayers {
        above,
        current,
        below,
        selected_root_index,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitDiff {
    /// The above composite must be regenerated.
    pub above_dirty: bool,
    /// The below composite must be regenerated.
    pub below_dirty: bool,
    /// The selection moved to a different top-level slot; block-local dirty
    /// tracking cannot express this, so the whole canvas must be invalidated.
    pub structural_change: bool,
}

/// Compares two projections by leaf identity. Opacity-only edits do not mark
/// a group dirty; its composite is reused as-is.
pub fn diff(prev: &SplitLayers, next: &SplitLayers) -> SplitDiff {
    SplitDiff {
        above_dirty: identities_differ(&prev.above, &next.above),
        below_dirty: identities_differ(&prev.below, &next.below),
        structural_change: prev.selected_root_index != next.selected_root_index,
    }
}

fn identities_differ(prev: &[CollectedLayer], next: &[CollectedLayer]) -> bool {
    prev.len() != next.len()
        || prev
            .iter()
            .zip(next.iter())
            .any(|(previous, current)| previous.id != current.id)
}
