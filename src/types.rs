use serde::{Deserialize, Serialize};

/// Category of a [`crate::engine::results::RuleEvent`] recorded by a rule consequence.
///
/// Validation is a specialization of ordinary evaluation: a validation rule is just a
/// high-salience rule whose consequence emits [`EventCategory::Violation`] events instead
/// of mutating facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Informational event, no error semantics.
    Info,
    /// A soft warning; does not affect `is_valid`.
    Warning,
    /// A hard violation; counted in `violation_count` and groupable by [`ValidationResult`](crate::session::ValidationResult).
    Violation,
}

/// Arity of a rule, i.e. how many facts its tuple binds (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Arity {
    /// A rule over a single fact.
    One = 1,
    /// A rule over a pair of facts.
    Two = 2,
    /// A rule over a triple of facts.
    Three = 3,
    /// A rule over a quadruple of facts.
    Four = 4,
}

impl Arity {
    /// The numeric arity as a `usize`.
    pub fn as_usize(self) -> usize {
        self as u8 as usize
    }

    /// Construct an `Arity` from a tuple length, rejecting anything outside 1..=4.
    pub fn from_usize(n: usize) -> Option<Self> {
        match n {
            1 => Some(Arity::One),
            2 => Some(Arity::Two),
            3 => Some(Arity::Three),
            4 => Some(Arity::Four),
            _ => None,
        }
    }

    /// All arities from 1 up to and including `max`, in ascending order.
    pub fn up_to(max: Arity) -> impl Iterator<Item = Arity> {
        (1..=max.as_usize()).filter_map(Arity::from_usize)
    }
}

/// A dense type-slot (0..255) assigned by the `TypeIndex` the first time a fact type is seen.
///
/// Slots appear in [`Signature`]s so that a rule set for a given tuple shape is looked up
/// once per contiguous run of same-shape tuples, per the engine's caching contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeSlot(pub u8);

/// A packed sequence of type-slots identifying the shape of a tuple, e.g. `[Order, Customer]`.
///
/// Arity is bounded at 4, so a `Signature` never holds more than four slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<TypeSlot>);

impl Signature {
    /// Build a signature from an ordered sequence of type-slots. Panics if `slots.len()` is
    /// not in 1..=4; the caller (the plan/rule base) is expected to have already validated
    /// arity before constructing a signature.
    pub fn new(slots: Vec<TypeSlot>) -> Self {
        debug_assert!(
            (1..=4).contains(&slots.len()),
            "signature arity must be 1..=4, got {}",
            slots.len()
        );
        Signature(slots)
    }

    /// The type-slots making up this signature, in tuple position order.
    pub fn slots(&self) -> &[TypeSlot] {
        &self.0
    }

    /// The arity implied by this signature's length.
    pub fn arity(&self) -> Arity {
        Arity::from_usize(self.0.len()).expect("signature constructed with valid arity")
    }
}

/// A 128-bit packing of up to four 32-bit selectors, used as a set key to deduplicate
/// candidate tuples issued by the evaluation plan and to identify a specific tuple
/// instance for fire-once bookkeeping.
///
/// Selectors are packed low-to-high in tuple position order; unused lanes (for arity < 4)
/// are zero, which is safe because selector `0` is never assigned (selectors start at 1).
/// Each lane holds the full, unbounded selector value rather than a narrowed width, since
/// a session's selector counter is never reused and keeps climbing for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorEncoding(u128);

impl SelectorEncoding {
    /// Pack up to four selectors (as `u32`s) into one key.
    pub fn pack(selectors: &[u32]) -> Self {
        debug_assert!(selectors.len() <= 4, "at most four selectors can be packed");
        let mut bits: u128 = 0;
        for (i, s) in selectors.iter().enumerate() {
            bits |= (*s as u128) << (i * 32);
        }
        SelectorEncoding(bits)
    }

    /// The raw packed value, useful as a hash-map key or log field.
    pub fn raw(self) -> u128 {
        self.0
    }
}
