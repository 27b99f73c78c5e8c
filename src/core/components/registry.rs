use crate::core::components::component::Component;
use crate::core::components::ownership::{Owner, OwnershipTree};
use crate::core::errors::SimError;
use crate::core::types::ComponentId;

/// Id-indexed table of live components plus the ownership tree linking them.
///
/// Ids start at 1 and grow monotonically; a slot freed by deletion stays
/// empty for the rest of the run. The table grows geometrically and never
/// shrinks until it is reset.
pub struct ComponentRegistry {
    slots: Vec<Option<Component>>,
    last_id: u32,
    root: Option<ComponentId>,
    live: usize,
    pub(crate) tree: OwnershipTree,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new(allow_stealing: bool) -> Self {
        Self {
            slots: Vec::new(),
            last_id: 0,
            root: None,
            live: 0,
            tree: OwnershipTree::new(allow_stealing),
        }
    }

    /// Id the next registered component will receive
    pub fn peek_next_id(&self) -> ComponentId {
        ComponentId(self.last_id + 1)
    }

    /// Store a component under the next id and make `owner` its owner
    pub(crate) fn register(
        &mut self,
        owner: Owner,
        build: impl FnOnce(ComponentId) -> Component,
    ) -> Result<ComponentId, SimError> {
        let raw = self
            .last_id
            .checked_add(1)
            .ok_or_else(|| SimError::Registry("component id space exhausted".to_string()))?;
        let id = ComponentId(raw);
        let idx = raw as usize;
        if idx >= self.slots.len() {
            let new_len = (self.slots.len() * 2).max(idx + 1).max(16);
            self.slots.resize_with(new_len, || None);
        }
        self.tree.take(owner, id)?;
        self.slots[idx] = Some(build(id));
        self.last_id = raw;
        self.live += 1;
        Ok(id)
    }

    /// Remove a component from the table and the ownership tree.
    /// Deregistering the root clears the root reference.
    pub(crate) fn deregister(&mut self, id: ComponentId) -> Option<Component> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let component = slot.take()?;
        self.live -= 1;
        self.tree.remove(id);
        if self.root == Some(id) {
            self.root = None;
        }
        Some(component)
    }

    pub(crate) fn set_root(&mut self, id: ComponentId) -> Result<(), SimError> {
        if let Some(existing) = self.root {
            return Err(SimError::Registry(format!(
                "cannot make {} the root: {} is already the root",
                id, existing
            )));
        }
        if self.by_id(id).is_none() {
            return Err(SimError::Registry(format!("{} is not registered", id)));
        }
        self.root = Some(id);
        Ok(())
    }

    pub fn root(&self) -> Option<ComponentId> {
        self.root
    }

    /// Look up a live component; `None` for unknown or deleted ids
    pub fn by_id(&self, id: ComponentId) -> Option<&Component> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn by_id_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub(crate) fn get(&self, id: ComponentId) -> Result<&Component, SimError> {
        self.by_id(id)
            .ok_or_else(|| SimError::Registry(format!("component {} does not exist", id)))
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Result<&mut Component, SimError> {
        self.by_id_mut(id)
            .ok_or_else(|| SimError::Registry(format!("component {} does not exist", id)))
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.by_id(id).is_some()
    }

    pub fn last_id(&self) -> u32 {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.tree.parent(id)
    }

    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        self.tree.children(id)
    }

    pub fn owner(&self, id: ComponentId) -> Option<Owner> {
        self.tree.owner(id)
    }

    /// Live components in id order
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        self.iter().map(|c| c.id).collect()
    }

    /// Dotted path from the root, e.g. `net.host[2].queue`
    pub fn full_path(&self, id: ComponentId) -> Option<String> {
        let mut parts = vec![self.by_id(id)?.full_name()];
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            parts.push(self.by_id(p)?.full_name());
            cur = self.parent(p);
        }
        parts.reverse();
        Some(parts.join("."))
    }

    /// Resolve a dotted path starting at the root
    pub fn find_by_path(&self, path: &str) -> Option<ComponentId> {
        let mut segments = path.split('.');
        let root = self.root?;
        if self.by_id(root)?.full_name() != segments.next()? {
            return None;
        }
        let mut cur = root;
        for seg in segments {
            cur = self
                .children(cur)
                .iter()
                .copied()
                .find(|&c| self.by_id(c).map_or(false, |comp| comp.full_name() == seg))?;
        }
        Some(cur)
    }

    /// Drop everything and restart numbering at 1
    pub(crate) fn reset(&mut self) {
        self.slots.clear();
        self.last_id = 0;
        self.root = None;
        self.live = 0;
        self.tree.clear();
    }
}
