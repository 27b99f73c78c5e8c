//! Single-owner bookkeeping for components.
//!
//! Every registered component has exactly one owner at a time. Taking an
//! object that belongs to someone else is refused unless stealing is
//! enabled; dropping it moves it to the unassigned pool, from where it can
//! be taken again or is deleted together with the network.

use crate::core::errors::SimError;
use crate::core::types::ComponentId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The simulation itself (root module, kernel-held objects)
    Kernel,
    Component(ComponentId),
    /// Messages sitting in the future event set
    FutureEvents,
    Unassigned,
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Kernel => write!(f, "the simulation"),
            Owner::Component(id) => write!(f, "component {}", id),
            Owner::FutureEvents => write!(f, "the future event set"),
            Owner::Unassigned => write!(f, "nobody"),
        }
    }
}

/// Check whether `taker` may take an object currently owned by `current`
pub fn check_take(
    current: Owner,
    taker: Owner,
    allow_stealing: bool,
    what: &str,
) -> Result<(), SimError> {
    if current == taker || current == Owner::Unassigned || allow_stealing {
        return Ok(());
    }
    Err(SimError::Ownership(format!(
        "{} is currently owned by {}, {} cannot take it",
        what, current, taker
    )))
}

#[derive(Debug, Default)]
pub struct OwnershipTree {
    owner_of: HashMap<ComponentId, Owner>,
    owned: HashMap<Owner, Vec<ComponentId>>,
    allow_stealing: bool,
}

impl OwnershipTree {
    pub fn new(allow_stealing: bool) -> Self {
        Self {
            allow_stealing,
            ..Default::default()
        }
    }

    pub fn set_allow_stealing(&mut self, allow: bool) {
        self.allow_stealing = allow;
    }

    pub fn owner(&self, obj: ComponentId) -> Option<Owner> {
        self.owner_of.get(&obj).copied()
    }

    /// Parent component, if the owner is a component
    pub fn parent(&self, obj: ComponentId) -> Option<ComponentId> {
        match self.owner(obj) {
            Some(Owner::Component(p)) => Some(p),
            _ => None,
        }
    }

    /// Objects owned by `owner`, in the order they were taken
    pub fn owned_by(&self, owner: Owner) -> &[ComponentId] {
        self.owned.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, parent: ComponentId) -> &[ComponentId] {
        self.owned_by(Owner::Component(parent))
    }

    /// Make `new_owner` the owner of `obj`
    pub fn take(&mut self, new_owner: Owner, obj: ComponentId) -> Result<(), SimError> {
        if let Owner::Component(p) = new_owner {
            if p == obj || self.is_ancestor(obj, p) {
                return Err(SimError::Ownership(format!(
                    "{} cannot own its own ancestor {}",
                    p, obj
                )));
            }
        }
        match self.owner(obj) {
            Some(current) if current == new_owner => return Ok(()),
            Some(current) => {
                check_take(current, new_owner, self.allow_stealing, &obj.to_string())?;
                self.detach(current, obj);
            }
            None => {}
        }
        self.attach(new_owner, obj);
        Ok(())
    }

    /// Release `obj` from `owner` into the unassigned pool
    pub fn drop_object(&mut self, owner: Owner, obj: ComponentId) -> Result<(), SimError> {
        match self.owner(obj) {
            Some(current) if current == owner => {
                self.detach(current, obj);
                self.attach(Owner::Unassigned, obj);
                Ok(())
            }
            Some(current) => Err(SimError::Ownership(format!(
                "{} cannot drop {}: it is owned by {}",
                owner, obj, current
            ))),
            None => Err(SimError::Ownership(format!("{} is not tracked", obj))),
        }
    }

    /// Forget `obj` entirely. Objects it owned become unassigned.
    pub fn remove(&mut self, obj: ComponentId) {
        if let Some(current) = self.owner_of.remove(&obj) {
            self.unlink(current, obj);
        }
        if let Some(orphans) = self.owned.remove(&Owner::Component(obj)) {
            for o in orphans {
                self.attach(Owner::Unassigned, o);
            }
        }
    }

    pub fn clear(&mut self) {
        self.owner_of.clear();
        self.owned.clear();
    }

    /// True if `ancestor` is `obj`'s parent, grandparent, ...
    pub fn is_ancestor(&self, ancestor: ComponentId, obj: ComponentId) -> bool {
        let mut cur = self.parent(obj);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// `root` and everything below it, children before their parent
    pub fn subtree_post_order(&self, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        self.post_order(root, &mut out);
        out
    }

    fn post_order(&self, id: ComponentId, out: &mut Vec<ComponentId>) {
        for &child in self.children(id) {
            self.post_order(child, out);
        }
        out.push(id);
    }

    /// `root` and everything below it, parents before their children
    pub fn subtree_pre_order(&self, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    fn attach(&mut self, owner: Owner, obj: ComponentId) {
        self.owner_of.insert(obj, owner);
        self.owned.entry(owner).or_default().push(obj);
    }

    fn detach(&mut self, owner: Owner, obj: ComponentId) {
        self.owner_of.remove(&obj);
        self.unlink(owner, obj);
    }

    fn unlink(&mut self, owner: Owner, obj: ComponentId) {
        if let Some(list) = self.owned.get_mut(&owner) {
            list.retain(|&o| o != obj);
            if list.is_empty() {
                self.owned.remove(&owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ComponentId {
        ComponentId::new(n)
    }

    #[test]
    fn test_take_from_other_owner_is_refused() {
        let mut tree = OwnershipTree::new(false);
        tree.take(Owner::Component(id(1)), id(3)).unwrap();
        let err = tree.take(Owner::Component(id(2)), id(3)).unwrap_err();
        assert!(matches!(err, SimError::Ownership(_)));
        assert_eq!(tree.parent(id(3)), Some(id(1)));
    }

    #[test]
    fn test_stealing_when_allowed() {
        let mut tree = OwnershipTree::new(true);
        tree.take(Owner::Component(id(1)), id(3)).unwrap();
        tree.take(Owner::Component(id(2)), id(3)).unwrap();
        assert_eq!(tree.parent(id(3)), Some(id(2)));
        assert!(tree.children(id(1)).is_empty());
    }

    #[test]
    fn test_drop_then_retake() {
        let mut tree = OwnershipTree::new(false);
        tree.take(Owner::Component(id(1)), id(3)).unwrap();
        assert!(tree.drop_object(Owner::Component(id(2)), id(3)).is_err());
        tree.drop_object(Owner::Component(id(1)), id(3)).unwrap();
        assert_eq!(tree.owner(id(3)), Some(Owner::Unassigned));
        tree.take(Owner::Component(id(2)), id(3)).unwrap();
        assert_eq!(tree.owned_by(Owner::Unassigned), &[] as &[ComponentId]);
    }

    #[test]
    fn test_cycles_are_refused() {
        let mut tree = OwnershipTree::new(true);
        tree.take(Owner::Kernel, id(1)).unwrap();
        tree.take(Owner::Component(id(1)), id(2)).unwrap();
        assert!(tree.take(Owner::Component(id(2)), id(1)).is_err());
        assert!(tree.take(Owner::Component(id(2)), id(2)).is_err());
    }

    #[test]
    fn test_traversal_orders() {
        let mut tree = OwnershipTree::new(false);
        tree.take(Owner::Kernel, id(1)).unwrap();
        tree.take(Owner::Component(id(1)), id(2)).unwrap();
        tree.take(Owner::Component(id(2)), id(4)).unwrap();
        tree.take(Owner::Component(id(1)), id(3)).unwrap();
        assert_eq!(tree.subtree_pre_order(id(1)), vec![id(1), id(2), id(4), id(3)]);
        assert_eq!(tree.subtree_post_order(id(1)), vec![id(4), id(2), id(3), id(1)]);
        assert!(tree.is_ancestor(id(1), id(4)));
        assert!(!tree.is_ancestor(id(3), id(4)));
    }

    #[test]
    fn test_remove_orphans_children() {
        let mut tree = OwnershipTree::new(false);
        tree.take(Owner::Kernel, id(1)).unwrap();
        tree.take(Owner::Component(id(1)), id(2)).unwrap();
        tree.remove(id(1));
        assert_eq!(tree.owner(id(1)), None);
        assert_eq!(tree.owner(id(2)), Some(Owner::Unassigned));
    }
}
