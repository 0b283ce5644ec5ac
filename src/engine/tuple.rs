use crate::engine::fact_space::{FactRef, Selector};
use crate::types::{Arity, SelectorEncoding};

/// An ordered binding of facts matching a rule's declared arity, modeled as a tagged
/// variant with one arm per arity rather than a generic `Vec`.
#[derive(Clone)]
pub enum Tuple {
    /// A tuple binding a single fact.
    One(FactRef),
    /// A tuple binding two facts.
    Two(FactRef, FactRef),
    /// A tuple binding three facts.
    Three(FactRef, FactRef, FactRef),
    /// A tuple binding four facts.
    Four(FactRef, FactRef, FactRef, FactRef),
}

impl Tuple {
    /// Build a tuple from a slice of resolved fact references. Returns `None` if `refs`
    /// is empty or holds more than four elements.
    pub fn from_refs(refs: Vec<FactRef>) -> Option<Self> {
        match refs.len() {
            1 => {
                let mut it = refs.into_iter();
                Some(Tuple::One(it.next().unwrap()))
            }
            2 => {
                let mut it = refs.into_iter();
                Some(Tuple::Two(it.next().unwrap(), it.next().unwrap()))
            }
            3 => {
                let mut it = refs.into_iter();
                Some(Tuple::Three(
                    it.next().unwrap(),
                    it.next().unwrap(),
                    it.next().unwrap(),
                ))
            }
            4 => {
                let mut it = refs.into_iter();
                Some(Tuple::Four(
                    it.next().unwrap(),
                    it.next().unwrap(),
                    it.next().unwrap(),
                    it.next().unwrap(),
                ))
            }
            _ => None,
        }
    }

    /// This tuple's facts, in position order.
    pub fn facts(&self) -> Vec<&FactRef> {
        match self {
            Tuple::One(a) => vec![a],
            Tuple::Two(a, b) => vec![a, b],
            Tuple::Three(a, b, c) => vec![a, b, c],
            Tuple::Four(a, b, c, d) => vec![a, b, c, d],
        }
    }

    /// The arity of this tuple.
    pub fn arity(&self) -> Arity {
        match self {
            Tuple::One(..) => Arity::One,
            Tuple::Two(..) => Arity::Two,
            Tuple::Three(..) => Arity::Three,
            Tuple::Four(..) => Arity::Four,
        }
    }

    /// The selectors bound in this tuple, in position order.
    pub fn selectors(&self) -> Vec<Selector> {
        self.facts().into_iter().map(|f| f.selector()).collect()
    }

    /// The packed selector-encoding identifying this exact tuple instance.
    pub fn encoding(&self) -> SelectorEncoding {
        let lanes: Vec<u32> = self.selectors().iter().map(|s| s.as_u32()).collect();
        SelectorEncoding::pack(&lanes)
    }
}
