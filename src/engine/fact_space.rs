use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{Result, RuleEngineError};
use crate::types::TypeSlot;

/// Maximum number of simultaneously active selectors in one session, per the engine's
/// stated capacity invariant.
pub const MAX_ACTIVE_SELECTORS: usize = u16::MAX as usize;

/// A dense, never-reused integer assigned to a fact for the lifetime of a session.
///
/// Identity survives `modify`/`retract`: a retracted fact's identity stays valid for
/// correlation even though its selector is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(u32);

impl Identity {
    /// The raw identity value, useful as a fire-once bookkeeping key.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// A dense integer assigned to one *binding* of a fact. A `modify` or `retract`
/// invalidates the current selector; `modify` assigns a fresh one for the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selector(u32);

impl Selector {
    /// The raw selector value, used as a lane in a [`crate::types::SelectorEncoding`].
    ///
    /// `next_selector` climbs for the life of the session and is never reused, so the
    /// full `u32` is kept rather than narrowed: [`MAX_ACTIVE_SELECTORS`] bounds how many
    /// selectors may be *simultaneously active*, not the range of values a live selector
    /// can take once churn (`modify`/`retract`/`add` cycles) has pushed the counter past
    /// a smaller width.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// A live reference to an inserted fact, handed to rule `evaluate`/`fire` callbacks as
/// part of a [`crate::engine::tuple::Tuple`].
#[derive(Clone)]
pub struct FactRef {
    selector: Selector,
    identity: Identity,
    type_id: TypeId,
    value: Arc<dyn Any + Send + Sync>,
}

impl FactRef {
    /// This binding's selector. Invalidated by a subsequent `modify`/`retract` of the
    /// underlying fact.
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// This fact's stable identity, unaffected by `modify`.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// The concrete type of the underlying fact.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Downcast to the concrete fact type `T`, if it matches.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Reference equality against a caller-supplied fact, used by
    /// [`crate::engine::context::EvaluationContext`] to map a consequence's fact argument
    /// back to its selector within the currently firing tuple.
    pub fn points_to<T: Any>(&self, candidate: &T) -> bool {
        self.value
            .downcast_ref::<T>()
            .map(|v| std::ptr::eq(v as *const T, candidate as *const T))
            .unwrap_or(false)
    }
}

struct FactSlot {
    type_id: TypeId,
    value: Arc<dyn Any + Send + Sync>,
    /// `None` once retracted; the identity-keyed entry itself is never removed.
    current_selector: Option<Selector>,
}

/// The working memory of a session: holds inserted facts, assigns stable identities,
/// and indexes live selectors by type.
///
/// `FactSpace` is owned by exactly one session and must not be shared across sessions.
pub struct FactSpace {
    /// Indexed by `Identity`.
    facts: Vec<FactSlot>,
    /// selector -> identity, the only place "is this binding still live" is answered.
    selector_to_identity: HashMap<Selector, Identity>,
    /// type -> dense type-slot, assigned the first time a type is seen.
    type_slots: HashMap<TypeId, TypeSlot>,
    /// type-slot -> ordered active selectors currently of that type.
    type_index: Vec<Vec<Selector>>,
    /// type-slot -> TypeId, the reverse of `type_slots`, indexed by `TypeSlot.0`.
    slot_types: Vec<TypeId>,
    next_identity: u32,
    next_selector: u32,
    active_selector_count: usize,
}

impl Default for FactSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl FactSpace {
    /// Create an empty fact space.
    pub fn new() -> Self {
        Self {
            facts: Vec::new(),
            selector_to_identity: HashMap::new(),
            type_slots: HashMap::new(),
            type_index: Vec::new(),
            slot_types: Vec::new(),
            next_identity: 0,
            next_selector: 1, // 0 is reserved as "no selector" in SelectorEncoding lanes
            active_selector_count: 0,
        }
    }

    fn slot_for(&mut self, type_id: TypeId) -> TypeSlot {
        if let Some(slot) = self.type_slots.get(&type_id) {
            return *slot;
        }
        let slot = TypeSlot(self.type_slots.len() as u8);
        self.type_slots.insert(type_id, slot);
        self.type_index.push(Vec::new());
        self.slot_types.push(type_id);
        slot
    }

    /// Insert a fact into working memory, assigning it a fresh identity and selector.
    ///
    /// Fails with [`RuleEngineError::CapacityExceeded`] once [`MAX_ACTIVE_SELECTORS`]
    /// selectors are simultaneously active.
    pub fn add<T: Any + Send + Sync>(&mut self, fact: T) -> Result<(Identity, Selector)> {
        if self.active_selector_count >= MAX_ACTIVE_SELECTORS {
            return Err(RuleEngineError::CapacityExceeded {
                limit: MAX_ACTIVE_SELECTORS,
            });
        }

        let type_id = TypeId::of::<T>();
        let slot = self.slot_for(type_id);

        let identity = Identity(self.next_identity);
        self.next_identity += 1;
        let selector = Selector(self.next_selector);
        self.next_selector += 1;

        self.facts.push(FactSlot {
            type_id,
            value: Arc::new(fact),
            current_selector: Some(selector),
        });
        self.selector_to_identity.insert(selector, identity);
        self.type_index[slot.0 as usize].push(selector);
        self.active_selector_count += 1;

        log::debug!(
            "fact_space: inserted identity={} selector={} type_slot={}",
            identity.0,
            selector.0,
            slot.0
        );

        Ok((identity, selector))
    }

    /// Invalidate `selector` and assign a fresh selector for the same identity, signaling
    /// that re-planning must occur. Returns the new selector, or `None` if `selector` was
    /// already invalid.
    pub fn modify(&mut self, selector: Selector) -> Option<Selector> {
        let identity = *self.selector_to_identity.get(&selector)?;
        self.selector_to_identity.remove(&selector);

        let new_selector = Selector(self.next_selector);
        self.next_selector += 1;
        self.selector_to_identity.insert(new_selector, identity);

        let slot_index = self.facts[identity.0 as usize].type_id;
        let slot = *self
            .type_slots
            .get(&slot_index)
            .expect("type slot exists for a live fact");
        let bucket = &mut self.type_index[slot.0 as usize];
        if let Some(pos) = bucket.iter().position(|s| *s == selector) {
            bucket[pos] = new_selector;
        }

        self.facts[identity.0 as usize].current_selector = Some(new_selector);

        log::debug!(
            "fact_space: modified identity={} selector {} -> {}",
            identity.0,
            selector.0,
            new_selector.0
        );

        Some(new_selector)
    }

    /// Remove `selector` from the live map. The identity-indexed slot remains so the
    /// fact's identity stays stable for later correlation.
    pub fn retract(&mut self, selector: Selector) -> bool {
        let Some(identity) = self.selector_to_identity.remove(&selector) else {
            return false;
        };

        let type_id = self.facts[identity.0 as usize].type_id;
        let slot = *self
            .type_slots
            .get(&type_id)
            .expect("type slot exists for a live fact");
        self.type_index[slot.0 as usize].retain(|s| *s != selector);
        self.facts[identity.0 as usize].current_selector = None;
        self.active_selector_count = self.active_selector_count.saturating_sub(1);

        log::debug!(
            "fact_space: retracted identity={} selector={}",
            identity.0,
            selector.0
        );

        true
    }

    /// Resolve a sequence of selectors to their bound facts. Returns `None` — the
    /// engine's "empty tuple" sentinel — if any selector has since been invalidated.
    pub fn resolve(&self, selectors: &[Selector]) -> Option<Vec<FactRef>> {
        let mut refs = Vec::with_capacity(selectors.len());
        for &selector in selectors {
            let identity = *self.selector_to_identity.get(&selector)?;
            let slot = &self.facts[identity.0 as usize];
            if slot.current_selector != Some(selector) {
                return None;
            }
            refs.push(FactRef {
                selector,
                identity,
                type_id: slot.type_id,
                value: Arc::clone(&slot.value),
            });
        }
        Some(refs)
    }

    /// The type-slots currently holding at least one active selector, in assignment order.
    pub fn active_type_slots(&self) -> impl Iterator<Item = TypeSlot> + '_ {
        self.type_index
            .iter()
            .enumerate()
            .filter(|(_, selectors)| !selectors.is_empty())
            .map(|(i, _)| TypeSlot(i as u8))
    }

    /// The active selectors currently bound to `slot`, in insertion order.
    pub fn selectors_for_slot(&self, slot: TypeSlot) -> &[Selector] {
        self.type_index
            .get(slot.0 as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The dense type-slot assigned to `T`, if any fact of that type has ever been seen.
    pub fn slot_of<T: Any>(&self) -> Option<TypeSlot> {
        self.type_slots.get(&TypeId::of::<T>()).copied()
    }

    /// The dense type-slot for a raw `TypeId`, if seen.
    pub fn slot_of_type_id(&self, type_id: TypeId) -> Option<TypeSlot> {
        self.type_slots.get(&type_id).copied()
    }

    /// The `TypeId` a type-slot was assigned to, the reverse of [`Self::slot_of_type_id`].
    pub fn type_id_for_slot(&self, slot: TypeSlot) -> Option<TypeId> {
        self.slot_types.get(slot.0 as usize).copied()
    }

    /// Number of currently active selectors.
    pub fn active_count(&self) -> usize {
        self.active_selector_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Order {
        total: f64,
    }

    #[test]
    fn add_assigns_stable_identity_and_selector() {
        let mut fs = FactSpace::new();
        let (id, sel) = fs.add(Order { total: 10.0 }).unwrap();
        let resolved = fs.resolve(&[sel]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].identity(), id);
        assert_eq!(resolved[0].selector(), sel);
    }

    #[test]
    fn modify_invalidates_old_selector_but_keeps_identity() {
        let mut fs = FactSpace::new();
        let (id, sel) = fs.add(Order { total: 10.0 }).unwrap();
        let new_sel = fs.modify(sel).unwrap();
        assert_ne!(sel, new_sel);
        assert!(fs.resolve(&[sel]).is_none());
        let resolved = fs.resolve(&[new_sel]).unwrap();
        assert_eq!(resolved[0].identity(), id);
    }

    #[test]
    fn retract_removes_selector_but_not_identity_slot() {
        let mut fs = FactSpace::new();
        let (_, sel) = fs.add(Order { total: 10.0 }).unwrap();
        assert!(fs.retract(sel));
        assert!(fs.resolve(&[sel]).is_none());
        assert!(!fs.retract(sel), "double retract must be a no-op, not a panic");
    }

    #[test]
    fn type_index_tracks_only_active_selectors() {
        let mut fs = FactSpace::new();
        let (_, s1) = fs.add(Order { total: 1.0 }).unwrap();
        let (_, s2) = fs.add(Order { total: 2.0 }).unwrap();
        let slot = fs.slot_of::<Order>().unwrap();
        assert_eq!(fs.selectors_for_slot(slot), &[s1, s2]);

        fs.retract(s1);
        assert_eq!(fs.selectors_for_slot(slot), &[s2]);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut fs = FactSpace::new();
        fs.active_selector_count = MAX_ACTIVE_SELECTORS;
        let err = fs.add(Order { total: 1.0 }).unwrap_err();
        assert!(matches!(err, RuleEngineError::CapacityExceeded { .. }));
    }
}
