//! Arena allocator for quadtree nodes with texture-gated eviction.
//!
//! Nodes live in a growable slot array backed by a freelist. A [`NodeId`]
//! stays valid while its node is live; freeing a slot bumps its generation so
//! outdated ids resolve to `None` instead of to the slot's next occupant.

use tracing::{trace, warn};

use crate::error::TileError;
use crate::node::{NodeId, TextureSlot, TileNode};

struct Slot {
    generation: u32,
    node: Option<TileNode>,
}

/// Pool of [`TileNode`]s addressed by [`NodeId`].
pub struct TilePool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    max_nodes: usize,
}

impl TilePool {
    /// Create an empty pool that holds at most `max_nodes` live nodes.
    pub fn new(max_nodes: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            max_nodes,
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Configured node cap.
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Store `node` in a free slot, growing the arena if none is available.
    pub fn allocate(&mut self, node: TileNode) -> Result<NodeId, TileError> {
        if self.live >= self.max_nodes {
            return Err(TileError::PoolExhausted {
                capacity: self.max_nodes,
            });
        }

        let id = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).map_err(|_| TileError::PoolExhausted {
                capacity: self.max_nodes,
            })?;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        };
        self.live += 1;
        Ok(id)
    }

    /// Allocate a pinned node. Pinned nodes are never evicted.
    pub fn allocate_root(&mut self, mut node: TileNode) -> Result<NodeId, TileError> {
        node.pinned = true;
        self.allocate(node)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&TileNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TileNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Child of `parent` in `quadrant` (0..4), if it exists.
    pub fn child(&self, parent: NodeId, quadrant: usize) -> Option<NodeId> {
        self.get(parent)
            .and_then(|node| node.children.get(quadrant).copied().flatten())
    }

    /// Allocate a bare child one level below `parent` and link it.
    ///
    /// The child has no textures of its own; it renders with its parent's
    /// texture until something loads data for it. An existing child is
    /// returned unchanged.
    pub fn create_child(&mut self, parent: NodeId, quadrant: usize) -> Result<NodeId, TileError> {
        if let Some(existing) = self.child(parent, quadrant) {
            return Ok(existing);
        }
        let Some(level) = self.get(parent).map(|node| node.level) else {
            return Err(TileError::UnknownNode(parent));
        };
        self.insert_child(parent, quadrant, TileNode::new(level.saturating_add(1)))
    }

    /// Allocate `node` and link it as child `quadrant` of `parent`.
    ///
    /// Any previous link in that quadrant is overwritten, so callers check
    /// [`child`](Self::child) first.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        quadrant: usize,
        node: TileNode,
    ) -> Result<NodeId, TileError> {
        if !self.contains(parent) {
            return Err(TileError::UnknownNode(parent));
        }
        let child = self.allocate(node)?;
        self.set_child(parent, quadrant, child);
        trace!(?parent, ?child, quadrant, "created tile node");
        Ok(child)
    }

    /// Link an existing node as a child of `parent`.
    pub fn set_child(&mut self, parent: NodeId, quadrant: usize, child: NodeId) {
        if let Some(node) = self.get_mut(parent) {
            node.children[quadrant] = Some(child);
        }
    }

    /// Evict `id` and its descendants bottom-up.
    ///
    /// Children are processed first. The node itself is freed only when it
    /// holds no texture state, is not pinned, and every child was freed.
    /// Returns `true` if the node was freed.
    pub fn evict_subtree(&mut self, id: NodeId) -> bool {
        let all_children_freed = self.evict_children(id);
        let Some(node) = self.get(id) else {
            return false;
        };
        if !all_children_freed || node.pinned || node.holds_texture() {
            return false;
        }
        self.free(id);
        true
    }

    /// Evict every descendant of `id`, clearing the links of freed children.
    ///
    /// Returns `true` when the node is left without children.
    pub fn evict_children(&mut self, id: NodeId) -> bool {
        self.evict_children_with(id, Self::evict_subtree)
    }

    /// Evict the descendants of `id` like [`evict_children`](Self::evict_children),
    /// first releasing the textures of every descendant the tile table can
    /// rebuild.
    ///
    /// Used for subtrees that left the view: their resident textures are
    /// dropped and the nodes come back from the table when needed again.
    pub fn reclaim_children(&mut self, id: NodeId) -> bool {
        self.evict_children_with(id, Self::reclaim_subtree)
    }

    fn reclaim_subtree(&mut self, id: NodeId) -> bool {
        if !self.reclaim_children(id) {
            return false;
        }
        if self.get(id).is_some_and(TileNode::is_rebuildable) {
            self.release_textures(id);
        }
        self.evict_subtree(id)
    }

    fn evict_children_with(&mut self, id: NodeId, evict: fn(&mut Self, NodeId) -> bool) -> bool {
        let Some(children) = self.get(id).map(|node| node.children) else {
            return false;
        };
        let mut all_freed = true;
        for (quadrant, child) in children.into_iter().enumerate() {
            let Some(child) = child else { continue };
            if evict(self, child) {
                if let Some(node) = self.get_mut(id) {
                    node.children[quadrant] = None;
                }
            } else {
                all_freed = false;
            }
        }
        all_freed
    }

    /// Drop the node's texture handles so it becomes evictable.
    ///
    /// Slots still waiting on the loader are left alone. Returns `true` if
    /// any texture was released.
    pub fn release_textures(&mut self, id: NodeId) -> bool {
        let Some(node) = self.get_mut(id) else {
            return false;
        };
        let mut released = false;
        for slot in [&mut node.surface, &mut node.mask] {
            if slot.is_loaded() {
                *slot = TextureSlot::Absent;
                released = true;
            }
        }
        released
    }

    /// Free `id` and its whole subtree unconditionally, pinned or not.
    ///
    /// Loaded textures are released with their nodes. Returns the number of
    /// nodes freed.
    pub fn remove_tree(&mut self, id: NodeId) -> usize {
        let Some(children) = self.get(id).map(|node| node.children) else {
            return 0;
        };
        let mut removed = 0;
        for child in children.into_iter().flatten() {
            removed += self.remove_tree(child);
        }
        self.free(id);
        removed + 1
    }

    /// Iterate over every live node id.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node.as_ref().map(|_| NodeId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    fn free(&mut self, id: NodeId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation || slot.node.take().is_none() {
            warn!(?id, "attempted to free a dead tile node");
            return;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
    }
}
