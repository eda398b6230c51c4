//! Depth-first traversal over ordered forests.
//!
//! All walks share one pre-order numbering and path scheme, so building,
//! clearing, running and reporting address nodes with the same coordinates.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A node that optionally owns an ordered sequence of children.
pub trait TreeNode: Sized {
    /// `None` for leaves. A branch without children returns an empty slice.
    fn children(&self) -> Option<&[Self]>;
}

/// A mapping target whose branch shape is decided by the value itself.
pub trait Branch: Sized {
    /// `Some` when the value can hold children; the walker fills the vector.
    fn children_mut(&mut self) -> Option<&mut Vec<Self>>;
}

/// One-shot request to not descend into the node currently being visited.
#[derive(Debug, Clone, Default)]
pub struct SkipChildren(Arc<AtomicBool>);

impl SkipChildren {
    pub fn skip_children(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

/// Everything a visitor gets to know about the node it is looking at.
#[derive(Debug, Clone)]
pub struct Visit<'a, N> {
    pub node: &'a N,
    pub parent: Option<&'a N>,
    /// Global 0-based pre-order counter across the whole walk.
    pub sequence: usize,
    /// 1 for root nodes.
    pub depth: usize,
    /// Child indices from a root down to this node.
    pub path: Vec<usize>,
    skip: SkipChildren,
}

impl<'a, N> Visit<'a, N> {
    /// Suppress descent into this node's children. Siblings and ancestors are unaffected.
    pub fn skip_children(&self) {
        self.skip.skip_children();
    }

    pub fn skip_handle(&self) -> SkipChildren {
        self.skip.clone()
    }
}

struct Frame<'a, N> {
    node: &'a N,
    parent: Option<&'a N>,
    path: Vec<usize>,
}

/// Pre-order cursor. Children of the node handed out last are pushed lazily on
/// the next step, after the visitor had its chance to skip them.
struct PreOrder<'a, N> {
    stack: Vec<Frame<'a, N>>,
    current: Option<Frame<'a, N>>,
    sequence: usize,
    skip: SkipChildren,
}

impl<'a, N: TreeNode> PreOrder<'a, N> {
    fn new(forest: &'a [N]) -> Self {
        let stack = forest
            .iter()
            .enumerate()
            .rev()
            .map(|(index, node)| Frame {
                node,
                parent: None,
                path: vec![index],
            })
            .collect();

        Self {
            stack,
            current: None,
            sequence: 0,
            skip: SkipChildren::default(),
        }
    }

    fn next_visit(&mut self) -> Option<Visit<'a, N>> {
        self.descend();

        let frame = self.stack.pop()?;
        let visit = Visit {
            node: frame.node,
            parent: frame.parent,
            sequence: self.sequence,
            depth: frame.path.len(),
            path: frame.path.clone(),
            skip: self.skip.clone(),
        };

        self.sequence += 1;
        self.current = Some(frame);
        Some(visit)
    }

    fn descend(&mut self) {
        let Some(frame) = self.current.take() else {
            return;
        };

        if self.skip.take() {
            return;
        }

        if let Some(children) = frame.node.children() {
            for (index, child) in children.iter().enumerate().rev() {
                let mut path = frame.path.clone();
                path.push(index);
                self.stack.push(Frame {
                    node: child,
                    parent: Some(frame.node),
                    path,
                });
            }
        }
    }
}

/// Visit every node pre-order, parents strictly before their children.
pub fn depth_first<'a, N, F>(forest: &'a [N], mut visit: F)
where
    N: TreeNode,
    F: FnMut(&Visit<'a, N>),
{
    let mut walk = PreOrder::new(forest);
    while let Some(current) = walk.next_visit() {
        visit(&current);
    }
}

/// Sequential asynchronous counterpart of [`depth_first`].
///
/// Each visit is awaited before the walk descends into or advances past the
/// node, so exactly one visit is in flight at any time. The first error stops
/// the walk; no later node is visited.
pub async fn depth_first_async<'a, N, F, Fut, E>(forest: &'a [N], mut visit: F) -> Result<(), E>
where
    N: TreeNode,
    F: FnMut(Visit<'a, N>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut walk = PreOrder::new(forest);
    while let Some(current) = walk.next_visit() {
        visit(current).await?;
    }
    Ok(())
}

/// Structure-preserving transform of a forest into a new tree shape.
///
/// Branch-shaped replacements get their children freshly mapped from the
/// original node's children. A leaf replacement for an original branch drops
/// that subtree from the walk. Calling `skip_children` leaves a branch
/// replacement empty.
pub fn map_depth_first<'a, N, M, F>(forest: &'a [N], mut transform: F) -> Vec<M>
where
    N: TreeNode,
    M: Branch,
    F: FnMut(&Visit<'a, N>) -> M,
{
    let skip = SkipChildren::default();
    let mut sequence = 0;

    forest
        .iter()
        .enumerate()
        .map(|(index, root)| {
            map_node(root, None, vec![index], &mut sequence, &skip, &mut transform)
        })
        .collect()
}

fn map_node<'a, N, M, F>(
    node: &'a N,
    parent: Option<&'a N>,
    path: Vec<usize>,
    sequence: &mut usize,
    skip: &SkipChildren,
    transform: &mut F,
) -> M
where
    N: TreeNode,
    M: Branch,
    F: FnMut(&Visit<'a, N>) -> M,
{
    let visit = Visit {
        node,
        parent,
        sequence: *sequence,
        depth: path.len(),
        path,
        skip: skip.clone(),
    };
    *sequence += 1;

    let mut replacement = transform(&visit);
    let skipped = skip.take();

    if replacement.children_mut().is_none() {
        return replacement;
    }

    let children = match node.children() {
        Some(children) if !skipped => children
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let mut child_path = visit.path.clone();
                child_path.push(index);
                map_node(child, Some(node), child_path, sequence, skip, transform)
            })
            .collect(),
        _ => Vec::new(),
    };

    if let Some(slot) = replacement.children_mut() {
        *slot = children;
    }

    replacement
}
