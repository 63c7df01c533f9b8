//! Shape + Object (C3): mutable per-object shape with property offsets,
//! in-place tombstoning + compaction, a sparse fallback for holey/high
//! integer indices, and the prototype link.
//!
//! Grown from Nova's own split between a shared `ElementsVector` and an
//! `ObjectHeapData` — but where Nova shares shapes across objects behind a
//! transition map, Faro gives each object its own `Shape` (§9's "mutable
//! shape graph" design note): simpler to reclaim, at the cost of shape
//! sharing between same-shaped objects. `own_keys`' three-bucket ordering
//! (indices, then strings, then symbols) and the compaction threshold are
//! both load-bearing invariants from §8, tested below.

use crate::function::FunctionData;
use crate::value::{PropertyKey, Value};
use generational_arena::Arena;

pub type ObjectId = generational_arena::Index;

/// Compaction fires once a shape has accumulated at least this many
/// tombstones *and* they outnumber the live entries at least 1:1 (§3/§8:
/// `deleted_count >= 8 && deleted_count >= live_count / 2`).
const COMPACTION_MIN_TOMBSTONES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyFlags {
    pub const fn enumerable_writable_configurable() -> Self {
        Self { writable: true, enumerable: true, configurable: true }
    }

    /// The flags `length`/`name`/class-field initializers etc. get: visible
    /// to reads but absent from `for-in`/`Object.keys`.
    pub const fn non_enumerable() -> Self {
        Self { writable: true, enumerable: false, configurable: true }
    }
}

/// A property's value storage: either a data slot (an index into the
/// owning object's `values[]`) or a pair of accessor functions. The two
/// shapes are mutually exclusive per §3.
#[derive(Debug, Clone)]
pub enum PropertySlot {
    Data { index: u32 },
    Accessor { getter: Option<Value>, setter: Option<Value> },
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    pub flags: PropertyFlags,
    pub slot: PropertySlot,
}

impl Descriptor {
    pub fn is_accessor(&self) -> bool {
        matches!(self.slot, PropertySlot::Accessor { .. })
    }
}

/// Resolved view of an own property, handed back by `get_own`/`define_own`
/// callers who don't need to know whether the backing slot was a shape
/// entry or the sparse-index fallback.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub flags: PropertyFlags,
    pub value: Option<Value>,
    pub getter: Option<Value>,
    pub setter: Option<Value>,
}

impl PropertyDescriptor {
    pub fn data(value: Value, flags: PropertyFlags) -> Self {
        Self { flags, value: Some(value), getter: None, setter: None }
    }

    pub fn is_accessor(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

/// Per-object mutable shape. `keys[i]` and `descriptors[i]` are parallel;
/// a `None` key entry is a tombstone left by `delete` prior to compaction.
#[derive(Debug, Default, Clone)]
pub struct Shape {
    keys: Vec<Option<PropertyKey>>,
    descriptors: Vec<Descriptor>,
    deleted_count: usize,
}

impl Shape {
    pub fn find(&self, key: PropertyKey) -> Option<usize> {
        self.keys.iter().position(|k| *k == Some(key))
    }

    pub fn live_count(&self) -> usize {
        self.keys.len() - self.deleted_count
    }

    fn insert(&mut self, key: PropertyKey, descriptor: Descriptor) -> usize {
        let offset = self.keys.len();
        self.keys.push(Some(key));
        self.descriptors.push(descriptor);
        offset
    }

    fn tombstone(&mut self, offset: usize) {
        self.keys[offset] = None;
        self.deleted_count += 1;
    }

    fn should_compact(&self) -> bool {
        self.deleted_count >= COMPACTION_MIN_TOMBSTONES
            && self.deleted_count >= self.live_count().max(1)
    }

    /// Key order per §4.3/§8: ascending integer indices, then string keys
    /// in insertion order, then symbol keys in insertion order. Tombstoned
    /// entries are skipped. Indices never live in the shape itself (they
    /// go through the object's sparse map), so this only orders
    /// strings-then-symbols; the caller prepends indices.
    fn live_keys_in_order(&self) -> Vec<PropertyKey> {
        self.keys.iter().flatten().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassId {
    Ordinary,
    Array,
    Arguments,
    Error,
    BooleanWrapper,
    NumberWrapper,
    StringWrapper,
    SymbolWrapper,
    BigIntWrapper,
    Function,
    Promise,
    Generator,
    AsyncGenerator,
    Map,
    Set,
    Date,
    RegExp,
}

/// Backing storage for object kinds whose internal slots don't fit the
/// generic property model (`[[FunctionData]]`, `[[PromiseState]]`, a boxed
/// primitive's `[[PrimitiveValue]]`, ...). Ordinary objects carry `None`.
#[derive(Debug, Clone)]
pub enum Exotic {
    None,
    Function(FunctionData),
    Primitive(Value),
    ArrayLength { writable: bool },
    /// `[[PromiseState]]` + reaction lists (§4.10), shared via `Rc` so every
    /// handle to the same promise instance observes one settlement.
    Promise(std::rc::Rc<std::cell::RefCell<crate::promise::PromiseData>>),
    /// A suspended generator/async-generator activation (§4.6, §9's
    /// "persist the Frame on the heap" resolution for suspension).
    Generator(std::rc::Rc<std::cell::RefCell<crate::generator::GeneratorState>>),
}

#[derive(Debug, Clone)]
pub struct ObjectData {
    shape: Shape,
    values: Vec<Value>,
    /// Holey/high-index array slots (index beyond a dense prefix, or an
    /// array with gaps). Keyed directly by `u32` index; dense small
    /// arrays still prefer shape-allocated slots is not attempted here —
    /// every indexed property lives here, which keeps `get`/`set`/`delete`
    /// uniform at the cost of hashing for array access (documented as a
    /// simplification in DESIGN.md; semantics are unaffected).
    indices: hashbrown::HashMap<u32, Value>,
    pub prototype: Option<ObjectId>,
    pub extensible: bool,
    pub class_id: ClassId,
    pub exotic: Exotic,
    /// Private-field brand symbols this instance carries (one per class in
    /// its chain that declared at least one `#field`/`#method`).
    pub brands: Vec<crate::atom::Atom>,
}

impl ObjectData {
    pub fn new(class_id: ClassId, prototype: Option<ObjectId>) -> Self {
        Self {
            shape: Shape::default(),
            values: Vec::new(),
            indices: hashbrown::HashMap::new(),
            prototype,
            extensible: true,
            class_id,
            exotic: Exotic::None,
            brands: Vec::new(),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.exotic, Exotic::Function(_))
    }

    pub fn function_data(&self) -> Option<&FunctionData> {
        match &self.exotic {
            Exotic::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_data_mut(&mut self) -> Option<&mut FunctionData> {
        match &mut self.exotic {
            Exotic::Function(f) => Some(f),
            _ => None,
        }
    }

    /// `get_own(obj, key)` — §4.3. Skips tombstones; consults the sparse
    /// index map for integer keys.
    pub fn get_own(&self, key: PropertyKey) -> Option<PropertyDescriptor> {
        match key {
            PropertyKey::Index(i) => self.indices.get(&i).map(|v| {
                PropertyDescriptor::data(v.clone(), PropertyFlags::enumerable_writable_configurable())
            }),
            PropertyKey::Atom(_) => {
                let offset = self.shape.find(key)?;
                let d = &self.shape.descriptors[offset];
                Some(match &d.slot {
                    PropertySlot::Data { index } => PropertyDescriptor {
                        flags: d.flags,
                        value: Some(self.values[*index as usize].clone()),
                        getter: None,
                        setter: None,
                    },
                    PropertySlot::Accessor { getter, setter } => PropertyDescriptor {
                        flags: d.flags,
                        value: None,
                        getter: getter.clone(),
                        setter: setter.clone(),
                    },
                })
            }
        }
    }

    pub fn has_own(&self, key: PropertyKey) -> bool {
        match key {
            PropertyKey::Index(i) => self.indices.contains_key(&i),
            PropertyKey::Atom(_) => self.shape.find(key).is_some(),
        }
    }

    /// Raw write to an existing own data slot (bypasses accessor/prototype
    /// walking — callers that already resolved `set`'s target use this).
    pub fn write_own_data(&mut self, key: PropertyKey, value: Value) -> bool {
        match key {
            PropertyKey::Index(i) => {
                self.indices.insert(i, value);
                true
            }
            PropertyKey::Atom(_) => {
                let Some(offset) = self.shape.find(key) else { return false };
                let d = &self.shape.descriptors[offset];
                if !d.flags.writable {
                    return false;
                }
                match d.slot {
                    PropertySlot::Data { index } => {
                        self.values[index as usize] = value;
                        true
                    }
                    PropertySlot::Accessor { .. } => false,
                }
            }
        }
    }

    /// `define_own(obj, key, descriptor)` — a simplified but
    /// spec-faithful subset of ECMAScript 9.1.6's transition table: an
    /// existing non-configurable property only accepts a define that
    /// matches its current value/flags exactly.
    pub fn define_own(&mut self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        if let PropertyKey::Index(i) = key {
            if let Some(existing) = self.indices.get(&i) {
                if let Some(new_val) = &desc.value {
                    if crate::value::equality::same_value(existing, new_val) {
                        return true;
                    }
                }
            }
            if let Some(v) = desc.value {
                self.indices.insert(i, v);
            }
            return true;
        }

        if let Some(offset) = self.shape.find(key) {
            let existing_flags = self.shape.descriptors[offset].flags;
            if !existing_flags.configurable {
                // A non-configurable property may only have its value
                // changed (if writable), never its writable/accessor shape.
                if !existing_flags.writable && desc.flags.writable {
                    return false;
                }
                if desc.is_accessor() != self.shape.descriptors[offset].is_accessor() {
                    return false;
                }
            }
            if desc.is_accessor() {
                self.shape.descriptors[offset] = Descriptor {
                    flags: desc.flags,
                    slot: PropertySlot::Accessor { getter: desc.getter, setter: desc.setter },
                };
            } else {
                let value = desc.value.unwrap_or(Value::Undefined);
                match self.shape.descriptors[offset].slot {
                    PropertySlot::Data { index } => {
                        self.values[index as usize] = value;
                        self.shape.descriptors[offset].flags = desc.flags;
                    }
                    PropertySlot::Accessor { .. } => {
                        let index = self.values.len() as u32;
                        self.values.push(value);
                        self.shape.descriptors[offset] =
                            Descriptor { flags: desc.flags, slot: PropertySlot::Data { index } };
                    }
                }
            }
            return true;
        }

        if !self.extensible {
            return false;
        }
        let slot = if desc.is_accessor() {
            PropertySlot::Accessor { getter: desc.getter, setter: desc.setter }
        } else {
            let index = self.values.len() as u32;
            self.values.push(desc.value.unwrap_or(Value::Undefined));
            PropertySlot::Data { index }
        };
        self.shape.insert(key, Descriptor { flags: desc.flags, slot });
        true
    }

    /// `delete(obj, key)` — refuses non-configurable properties; tombstones
    /// the shape slot and triggers compaction once the threshold in §3/§8
    /// is crossed.
    pub fn delete(&mut self, key: PropertyKey) -> bool {
        match key {
            PropertyKey::Index(i) => {
                self.indices.remove(&i);
                true
            }
            PropertyKey::Atom(_) => {
                let Some(offset) = self.shape.find(key) else { return true };
                if !self.shape.descriptors[offset].flags.configurable {
                    return false;
                }
                self.shape.tombstone(offset);
                if self.shape.should_compact() {
                    self.compact();
                }
                true
            }
        }
    }

    /// Rebuilds `values`/`shape` with tombstones removed, preserving
    /// relative order and remapping every live data slot's index. After
    /// this call `deleted_count == 0` and `values.len() == live_count`
    /// (§8's compaction invariant).
    fn compact(&mut self) {
        let mut new_keys = Vec::with_capacity(self.shape.live_count());
        let mut new_descriptors = Vec::with_capacity(self.shape.live_count());
        let mut new_values = Vec::new();

        for (key, descriptor) in self.shape.keys.iter().zip(self.shape.descriptors.iter()) {
            let Some(key) = key else { continue };
            let new_descriptor = match &descriptor.slot {
                PropertySlot::Data { index } => {
                    let new_index = new_values.len() as u32;
                    new_values.push(self.values[*index as usize].clone());
                    Descriptor { flags: descriptor.flags, slot: PropertySlot::Data { index: new_index } }
                }
                PropertySlot::Accessor { getter, setter } => Descriptor {
                    flags: descriptor.flags,
                    slot: PropertySlot::Accessor { getter: getter.clone(), setter: setter.clone() },
                },
            };
            new_keys.push(Some(*key));
            new_descriptors.push(new_descriptor);
        }

        self.shape.keys = new_keys;
        self.shape.descriptors = new_descriptors;
        self.shape.deleted_count = 0;
        self.values = new_values;
    }

    /// `own_keys(obj)` — §4.3's key-order rule: ascending integer indices,
    /// then string keys in insertion order, then symbol keys in insertion
    /// order.
    pub fn own_keys(&self, atoms: &crate::atom::AtomTable) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = self.indices.keys().copied().collect();
        indices.sort_unstable();

        let mut strings = Vec::new();
        let mut symbols = Vec::new();
        for key in self.shape.live_keys_in_order() {
            match key {
                PropertyKey::Atom(atom) => {
                    if atoms.is_symbol(atom) {
                        symbols.push(key);
                    } else {
                        strings.push(key);
                    }
                }
                PropertyKey::Index(_) => unreachable!("indices never live in the shape"),
            }
        }

        indices
            .into_iter()
            .map(PropertyKey::Index)
            .chain(strings)
            .chain(symbols)
            .collect()
    }

    pub fn has_brand(&self, brand: crate::atom::Atom) -> bool {
        self.brands.contains(&brand)
    }
}

/// The heap: an append-only arena of objects, indexed by a generational
/// `ObjectId` so a stale handle (kept alive past an explicit, embedder-level
/// free — the core itself never frees) fails loudly instead of aliasing a
/// reused slot. §3: "Shapes and Objects live until the host GC reclaims
/// them"; Faro's GC is "never, within one `Context`'s lifetime" (see
/// SPEC_FULL.md's heap-model note), so the generation check never actually
/// trips today but keeps the door open for a future collector.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Arena<ObjectData>,
}

impl Heap {
    pub fn new() -> Self {
        Self { objects: Arena::new() }
    }

    pub fn allocate(&mut self, data: ObjectData) -> ObjectId {
        self.objects.insert(data)
    }

    pub fn get(&self, id: ObjectId) -> &ObjectData {
        &self.objects[id]
    }

    pub fn get_mut(&mut self, id: ObjectId) -> &mut ObjectData {
        &mut self.objects[id]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::atom::AtomTable;

    fn key(atoms: &mut AtomTable, s: &str) -> PropertyKey {
        PropertyKey::from_atom(atoms.intern(s), atoms)
    }

    #[test]
    fn own_keys_orders_indices_then_strings_then_symbols() {
        let mut atoms = AtomTable::new();
        let mut obj = ObjectData::new(ClassId::Ordinary, None);
        let b = key(&mut atoms, "b");
        let a = key(&mut atoms, "a");
        let sym_atom = atoms.new_symbol(Some("s"));
        let sym = PropertyKey::Atom(sym_atom);
        let flags = PropertyFlags::enumerable_writable_configurable();

        obj.define_own(b, PropertyDescriptor::data(Value::Number(1.0), flags));
        obj.define_own(PropertyKey::Index(5), PropertyDescriptor::data(Value::Number(2.0), flags));
        obj.define_own(sym, PropertyDescriptor::data(Value::Number(3.0), flags));
        obj.define_own(a, PropertyDescriptor::data(Value::Number(4.0), flags));
        obj.define_own(PropertyKey::Index(1), PropertyDescriptor::data(Value::Number(5.0), flags));

        let keys = obj.own_keys(&atoms);
        assert_eq!(
            keys,
            vec![PropertyKey::Index(1), PropertyKey::Index(5), b, a, sym]
        );
    }

    #[test]
    fn delete_tombstones_until_compaction_threshold() {
        let mut atoms = AtomTable::new();
        let mut obj = ObjectData::new(ClassId::Ordinary, None);
        let flags = PropertyFlags::enumerable_writable_configurable();
        let mut keys = Vec::new();
        for i in 0..10 {
            let k = key(&mut atoms, &format!("p{i}"));
            keys.push(k);
            obj.define_own(k, PropertyDescriptor::data(Value::Number(i as f64), flags));
        }
        for k in &keys[0..8] {
            assert!(obj.delete(*k));
        }
        assert_eq!(obj.shape.deleted_count, 0, "compaction should have fired already");
        let remaining = obj.own_keys(&atoms);
        assert_eq!(remaining, vec![keys[8], keys[9]]);
        assert_eq!(obj.get_own(keys[8]).unwrap().value, Some(Value::Number(8.0)));
        assert_eq!(obj.get_own(keys[9]).unwrap().value, Some(Value::Number(9.0)));
    }
}
