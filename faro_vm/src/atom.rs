//! Atom table (C1): interns property keys and identifiers into small,
//! cheaply comparable handles.
//!
//! Grown from Nova's `Sym`/`Interner` pair in the abandoned `context.rs`
//! prototype (a `string_interner::StringInterner` wrapped in a newtype),
//! generalized to also intern the engine's fixed well-known-symbol range so
//! atom comparisons never have to branch on "is this a string or a symbol".

use ahash::AHashMap;
use std::sync::Arc;

/// An interned property key / identifier handle. Cheap to copy and compare;
/// reverse lookup goes through `AtomTable::name_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

/// The sixteen spec-defined well-known symbols occupy the bottom of the
/// atom space so `Atom::is_well_known_symbol` is a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WellKnownSymbol {
    AsyncIterator,
    HasInstance,
    IsConcatSpreadable,
    Iterator,
    Match,
    MatchAll,
    Replace,
    Search,
    Species,
    Split,
    ToPrimitive,
    ToStringTag,
    Unscopables,
}

const WELL_KNOWN_COUNT: u32 = 13;

#[derive(Debug, Clone)]
enum AtomPayload {
    String(Arc<str>),
    Symbol {
        description: Option<Arc<str>>,
        /// Monotonic id distinguishing user-created symbols with the same
        /// (or no) description; two symbols are never atom-equal unless
        /// they are the literal same `Symbol(...)` value.
        unique_id: u64,
    },
    /// A string key that is also a canonical array index (no leading
    /// zeros, fits in u32, not `"-0"`). Stored distinctly so `is_index`
    /// is O(1) instead of re-parsing the string on every call.
    Index(u32),
}

#[derive(Debug, Default)]
pub struct AtomTable {
    payloads: Vec<AtomPayload>,
    string_lookup: AHashMap<Arc<str>, Atom>,
    index_lookup: AHashMap<u32, Atom>,
    next_symbol_id: u64,
}

impl AtomTable {
    pub fn new() -> Self {
        let mut table = Self {
            payloads: Vec::new(),
            string_lookup: AHashMap::new(),
            index_lookup: AHashMap::new(),
            next_symbol_id: 0,
        };
        for _ in 0..WELL_KNOWN_COUNT {
            let id = table.next_symbol_id;
            table.next_symbol_id += 1;
            table.payloads.push(AtomPayload::Symbol {
                description: None,
                unique_id: id,
            });
        }
        table
    }

    pub fn well_known(&self, symbol: WellKnownSymbol) -> Atom {
        Atom(symbol as u32)
    }

    /// Interns `s`, returning the same `Atom` for equal strings. Canonical
    /// array-index strings (`"0"`, `"41"`, but not `"01"` or `"-0"`) are
    /// recognized and stored as index atoms so `is_index` is free.
    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(index) = canonical_index(s) {
            return self.intern_index(index);
        }
        if let Some(atom) = self.string_lookup.get(s) {
            return *atom;
        }
        let arc: Arc<str> = Arc::from(s);
        let atom = Atom(self.payloads.len() as u32);
        self.payloads.push(AtomPayload::String(arc.clone()));
        self.string_lookup.insert(arc, atom);
        atom
    }

    pub fn intern_index(&mut self, index: u32) -> Atom {
        if let Some(atom) = self.index_lookup.get(&index) {
            return *atom;
        }
        let atom = Atom(self.payloads.len() as u32);
        self.payloads.push(AtomPayload::Index(index));
        self.index_lookup.insert(index, atom);
        atom
    }

    /// Creates a fresh, never-before-seen symbol atom. Two calls with the
    /// same description produce distinct atoms, matching `Symbol("x") !==
    /// Symbol("x")`.
    pub fn new_symbol(&mut self, description: Option<&str>) -> Atom {
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        let atom = Atom(self.payloads.len() as u32);
        self.payloads.push(AtomPayload::Symbol {
            description: description.map(Arc::from),
            unique_id: id,
        });
        atom
    }

    pub fn name_of(&self, atom: Atom) -> AtomName<'_> {
        match &self.payloads[atom.0 as usize] {
            AtomPayload::String(s) => AtomName::String(s),
            AtomPayload::Index(i) => AtomName::Index(*i),
            AtomPayload::Symbol { description, .. } => {
                AtomName::Symbol(description.as_deref())
            }
        }
    }

    pub fn is_index(&self, atom: Atom) -> Option<u32> {
        match self.payloads.get(atom.0 as usize) {
            Some(AtomPayload::Index(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn is_symbol(&self, atom: Atom) -> bool {
        matches!(self.payloads.get(atom.0 as usize), Some(AtomPayload::Symbol { .. }))
    }
}

pub enum AtomName<'a> {
    String(&'a str),
    /// Materialized on demand by the caller via `index.to_string()`; kept
    /// separate so hot paths (property access on arrays) never allocate.
    Index(u32),
    Symbol(Option<&'a str>),
}

/// A string is a "canonical index" iff it is exactly the decimal rendering
/// of some `u32` with no leading zeros (except the literal `"0"`) and no
/// sign. `"008"`/`"-1"`/`"4294967296"` are not indices.
fn canonical_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().filter(|n| *n != u32::MAX)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interns_equal_strings_to_the_same_atom() {
        let mut table = AtomTable::new();
        let a = table.intern("hello");
        let b = table.intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn recognizes_canonical_indices() {
        let mut table = AtomTable::new();
        let atom = table.intern("41");
        assert_eq!(table.is_index(atom), Some(41));
        let not_index = table.intern("041");
        assert_eq!(table.is_index(not_index), None);
    }

    #[test]
    fn symbols_with_same_description_are_distinct() {
        let mut table = AtomTable::new();
        let a = table.new_symbol(Some("x"));
        let b = table.new_symbol(Some("x"));
        assert_ne!(a, b);
    }
}
