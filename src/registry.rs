//! Flat frame registry with parent/child links.
//!
//! Frames are stored by id and link to each other by id. Every mutation
//! keeps the forest invariant: parent links and child lists agree, and no
//! frame is its own ancestor.

use std::collections::HashMap;

use crate::error::FrameError;
use crate::frame::{Frame, FrameId};

/// What `remove` does with the children of the removed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovePolicy {
    /// Refuse to remove a frame that has children.
    Reject,
    /// Children become root frames, keeping their own geometry.
    OrphanToRoot,
    /// Remove the whole subtree.
    Cascade,
}

/// The frame forest.
#[derive(Debug, Default, Clone)]
pub struct FrameRegistry {
    frames: HashMap<FrameId, Frame>,
    /// Root frames in insertion (paint) order.
    roots: Vec<FrameId>,
    next_id: u64,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            roots: Vec::new(),
            next_id: 1,
        }
    }

    fn new_id(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.frames.contains_key(&id)
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&id)
    }

    /// Root frames in paint order.
    pub fn roots(&self) -> &[FrameId] {
        &self.roots
    }

    /// Ordered children of `id` (empty for unknown ids).
    pub fn children(&self, id: FrameId) -> &[FrameId] {
        self.frames
            .get(&id)
            .map(|f| f.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.frames.get(&id).and_then(|f| f.parent)
    }

    /// Ancestors of `id`, root first, not including `id` itself.
    ///
    /// The walk is bounded by the registry size, so a corrupted link can
    /// not loop forever.
    pub fn ancestors(&self, id: FrameId) -> Vec<FrameId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            if chain.len() > self.frames.len() || chain.contains(&p) {
                log::error!("Parent chain of {} is cyclic; truncating", id);
                break;
            }
            chain.push(p);
            current = self.parent(p);
        }
        chain.reverse();
        chain
    }

    /// Nesting depth: 0 for roots.
    pub fn depth(&self, id: FrameId) -> usize {
        self.ancestors(id).len()
    }

    /// True when `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: FrameId, id: FrameId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Insert a new frame under `parent` (or as a root) and return its id.
    ///
    /// The frame's id, parent and child list are assigned by the registry.
    pub fn insert(&mut self, mut frame: Frame, parent: Option<FrameId>) -> Result<FrameId, FrameError> {
        if let Some(p) = parent {
            if !self.frames.contains_key(&p) {
                return Err(FrameError::UnknownParent(p));
            }
        }
        let id = self.new_id();
        frame.id = id;
        frame.parent = parent;
        frame.children.clear();
        self.frames.insert(id, frame);
        match parent {
            Some(p) => {
                if let Some(parent_frame) = self.frames.get_mut(&p) {
                    parent_frame.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Move `id` under `new_parent` (or to the root list).
    pub fn reparent(&mut self, id: FrameId, new_parent: Option<FrameId>) -> Result<(), FrameError> {
        if !self.frames.contains_key(&id) {
            return Err(FrameError::UnknownFrame(id));
        }
        if let Some(p) = new_parent {
            if !self.frames.contains_key(&p) {
                return Err(FrameError::UnknownParent(p));
            }
            if p == id || self.is_ancestor(id, p) {
                return Err(FrameError::Cycle { frame: id, parent: p });
            }
        }
        self.detach(id);
        self.attach(id, new_parent);
        Ok(())
    }

    /// Remove `id` according to `policy` and return the removed frames.
    pub fn remove(&mut self, id: FrameId, policy: RemovePolicy) -> Result<Vec<Frame>, FrameError> {
        let children = match self.frames.get(&id) {
            Some(frame) => frame.children.clone(),
            None => return Err(FrameError::UnknownFrame(id)),
        };

        match policy {
            RemovePolicy::Reject if !children.is_empty() => Err(FrameError::HasChildren(id)),
            RemovePolicy::Reject => {
                self.detach(id);
                Ok(self.frames.remove(&id).into_iter().collect())
            }
            RemovePolicy::OrphanToRoot => {
                for child in children {
                    self.detach(child);
                    self.attach(child, None);
                }
                self.detach(id);
                Ok(self.frames.remove(&id).into_iter().collect())
            }
            RemovePolicy::Cascade => {
                let subtree = self.subtree(id);
                self.detach(id);
                Ok(subtree
                    .into_iter()
                    .filter_map(|fid| self.frames.remove(&fid))
                    .collect())
            }
        }
    }

    /// `id` and all of its descendants in depth-first pre-order.
    pub fn subtree(&self, id: FrameId) -> Vec<FrameId> {
        let mut out = Vec::new();
        if !self.frames.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if out.contains(&current) {
                continue;
            }
            out.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// All frames in paint order: roots in insertion order, each followed by
    /// its subtree (children in list order).
    pub fn iter_render_order(&self) -> Vec<FrameId> {
        self.roots.iter().flat_map(|r| self.subtree(*r)).collect()
    }

    fn detach(&mut self, id: FrameId) {
        let parent = self.parent(id);
        match parent {
            Some(p) => {
                if let Some(parent_frame) = self.frames.get_mut(&p) {
                    parent_frame.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
        if let Some(frame) = self.frames.get_mut(&id) {
            frame.parent = None;
        }
    }

    fn attach(&mut self, id: FrameId, parent: Option<FrameId>) {
        if let Some(frame) = self.frames.get_mut(&id) {
            frame.parent = parent;
        }
        match parent {
            Some(p) => {
                if let Some(parent_frame) = self.frames.get_mut(&p) {
                    parent_frame.children.push(id);
                }
            }
            None => self.roots.push(id),
        }
    }

    /// Verify the forest invariants. Returns a description of the first
    /// violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (id, frame) in &self.frames {
            if frame.id != *id {
                return Err(format!("{} stored under key {}", frame.id, id));
            }
            match frame.parent {
                Some(p) => {
                    let parent = self
                        .frames
                        .get(&p)
                        .ok_or_else(|| format!("{} has dangling parent {}", id, p))?;
                    if !parent.children.contains(id) {
                        return Err(format!("{} missing from children of {}", id, p));
                    }
                }
                None => {
                    if !self.roots.contains(id) {
                        return Err(format!("root {} missing from root list", id));
                    }
                }
            }
            for child in &frame.children {
                let c = self
                    .frames
                    .get(child)
                    .ok_or_else(|| format!("{} lists unknown child {}", id, child))?;
                if c.parent != Some(*id) {
                    return Err(format!("{} lists {} whose parent is {:?}", id, child, c.parent));
                }
            }
            let chain = self.ancestors(*id);
            if chain.contains(id) {
                return Err(format!("{} is its own ancestor", id));
            }
        }
        Ok(())
    }
}
