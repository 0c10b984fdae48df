//! The list (set-of-named-flags) table.
//!
//! Every authored Ink list declares a set of named flags; all flags across
//! every declared list share one dense global numbering assigned at load
//! time. A list *value* is a bitset over that global universe plus a record
//! of which declaring lists it "belongs to" — the information `LIST_ALL`
//! needs to recover every flag of a list from a value that currently holds
//! none of them.
//!
//! Two distinct [`ListHandle`]s may denote structurally equal lists:
//! handle identity is an implementation detail of the arena, not part of
//! the value's identity. Callers that need Ink's `==` semantics must go
//! through [`ListTable::eq`], not Rust's derived equality on the handle.
//!
//! List values are GC-managed exactly like [`crate::string_table::StringTable`]
//! interns strings: handles key a `HashMap`, not a position in a `Vec`, so a
//! sweep can drop unreachable entries without shifting the handle any live
//! reference still holds.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// A single named flag, identified by its declaring list and its dense
/// index within that list's flag run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ListFlag {
    pub list_id: i16,
    pub flag: i16,
}

/// Sentinel denoting "no flag" (an unset `list_flag` value).
pub const NULL_FLAG: ListFlag = ListFlag {
    list_id: -1,
    flag: -1,
};

/// Opaque handle into a [`ListTable`]'s value arena. Stable across a GC
/// sweep except for the entry it names, which is only ever invalidated by
/// that entry's own collection — the same guarantee
/// [`crate::string_table::StringId`] makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ListHandle(pub u32);

struct ListDef {
    name: String,
    flag_names: Vec<String>,
    begin: u32,
}

struct ListValue {
    /// Bitset over the global flag universe, one `u64` word per 64 flags.
    bits: Vec<u64>,
    /// Which declaring lists contributed at least one flag, or were
    /// recorded as the value's origin even while empty (e.g. `list x = ()`
    /// typed against a specific declared list).
    origins: Vec<i16>,
    used: bool,
}

impl ListValue {
    fn empty(words: usize) -> Self {
        Self {
            bits: vec![0; words],
            origins: Vec::new(),
            used: true,
        }
    }
}

/// Owns every declared list's flag-name metadata and every list value
/// allocated at runtime.
pub struct ListTable {
    defs: Vec<ListDef>,
    total_flags: u32,
    values: HashMap<u32, ListValue>,
    next_id: u32,
    capacity: Option<usize>,
}

impl ListTable {
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            total_flags: 0,
            values: HashMap::new(),
            next_id: 0,
            capacity: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defs: Vec::new(),
            total_flags: 0,
            values: HashMap::with_capacity(capacity),
            next_id: 0,
            capacity: Some(capacity),
        }
    }

    /// Register a list declaration read from the story image's list
    /// metadata section. Returns the dense `list_id` assigned to it.
    pub fn declare_list(&mut self, name: impl Into<String>, flag_names: Vec<String>) -> i16 {
        let list_id = self.defs.len() as i16;
        let begin = self.total_flags;
        self.total_flags += flag_names.len() as u32;
        self.defs.push(ListDef {
            name: name.into(),
            flag_names,
            begin,
        });
        list_id
    }

    fn words(&self) -> usize {
        (self.total_flags as usize).div_ceil(64).max(1)
    }

    fn global_index(&self, flag: ListFlag) -> Option<u32> {
        if flag.list_id < 0 || flag.flag < 0 {
            return None;
        }
        let def = self.defs.get(flag.list_id as usize)?;
        if flag.flag as usize >= def.flag_names.len() {
            return None;
        }
        Some(def.begin + flag.flag as u32)
    }

    fn alloc(&mut self, value: ListValue) -> Result<ListHandle> {
        if let Some(cap) = self.capacity
            && self.values.len() >= cap
        {
            return Err(Error::Bounds {
                what: "list table",
                limit: cap,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        self.values.insert(id, value);
        Ok(ListHandle(id))
    }

    /// The empty list, with no recorded origin.
    pub fn empty(&mut self) -> Result<ListHandle> {
        self.alloc(ListValue::empty(self.words()))
    }

    /// A list containing exactly one flag.
    pub fn singleton(&mut self, flag: ListFlag) -> Result<ListHandle> {
        let mut value = ListValue::empty(self.words());
        if let Some(idx) = self.global_index(flag) {
            set_bit(&mut value.bits, idx);
            value.origins.push(flag.list_id);
        }
        self.alloc(value)
    }

    /// Resolve `"ListName.FlagName"` or a bare `"FlagName"` (searched across
    /// every declared list) to its dense id.
    pub fn to_flag(&self, list_name: Option<&str>, flag_name: &str) -> Option<ListFlag> {
        for (list_id, def) in self.defs.iter().enumerate() {
            if let Some(name) = list_name
                && def.name != name
            {
                continue;
            }
            if let Some(flag) = def.flag_names.iter().position(|f| f == flag_name) {
                return Some(ListFlag {
                    list_id: list_id as i16,
                    flag: flag as i16,
                });
            }
        }
        None
    }

    pub fn list_name(&self, list_id: i16) -> Option<&str> {
        self.defs.get(list_id as usize).map(|d| d.name.as_str())
    }

    pub fn flag_name(&self, flag: ListFlag) -> Option<&str> {
        let def = self.defs.get(flag.list_id as usize)?;
        def.flag_names.get(flag.flag as usize).map(|s| s.as_str())
    }

    pub fn has(&self, handle: ListHandle, flag: ListFlag) -> bool {
        let Some(value) = self.values.get(&handle.0) else {
            return false;
        };
        match self.global_index(flag) {
            Some(idx) => get_bit(&value.bits, idx),
            None => false,
        }
    }

    /// `(L + flag)`: add one flag, recording its list as an origin.
    pub fn add(&mut self, handle: ListHandle, flag: ListFlag) -> Result<ListHandle> {
        let mut value = self.clone_value(handle);
        if let Some(idx) = self.global_index(flag) {
            set_bit(&mut value.bits, idx);
            if !value.origins.contains(&flag.list_id) {
                value.origins.push(flag.list_id);
            }
        }
        self.alloc(value)
    }

    /// `(L - flag)`: remove one flag. The origin record is left untouched
    /// (an emptied-out list still remembers what it was typed as).
    pub fn sub(&mut self, handle: ListHandle, flag: ListFlag) -> Result<ListHandle> {
        let mut value = self.clone_value(handle);
        if let Some(idx) = self.global_index(flag) {
            clear_bit(&mut value.bits, idx);
        }
        self.alloc(value)
    }

    pub fn union(&mut self, a: ListHandle, b: ListHandle) -> Result<ListHandle> {
        self.combine(a, b, |x, y| x | y)
    }

    pub fn intersect(&mut self, a: ListHandle, b: ListHandle) -> Result<ListHandle> {
        self.combine(a, b, |x, y| x & y)
    }

    /// `(a - b)`: every flag in `a` not present in `b`.
    pub fn difference(&mut self, a: ListHandle, b: ListHandle) -> Result<ListHandle> {
        self.combine(a, b, |x, y| x & !y)
    }

    fn combine(
        &mut self,
        a: ListHandle,
        b: ListHandle,
        op: impl Fn(u64, u64) -> u64,
    ) -> Result<ListHandle> {
        let va = self.clone_value(a);
        let vb = self.clone_value(b);
        let bits = va
            .bits
            .iter()
            .zip(vb.bits.iter())
            .map(|(x, y)| op(*x, *y))
            .collect();
        let mut origins = va.origins.clone();
        for o in &vb.origins {
            if !origins.contains(o) {
                origins.push(*o);
            }
        }
        self.alloc(ListValue { bits, origins, used: true })
    }

    /// Invert within the union of `handle`'s declaring (origin) lists: every
    /// flag declared by an origin list that is *not* currently set.
    pub fn invert(&mut self, handle: ListHandle) -> Result<ListHandle> {
        let value = self.clone_value(handle);
        let mut bits = vec![0u64; self.words()];
        for &list_id in &value.origins {
            let def = &self.defs[list_id as usize];
            for flag in 0..def.flag_names.len() as i16 {
                let idx = def.begin + flag as u32;
                if !get_bit(&value.bits, idx) {
                    set_bit(&mut bits, idx);
                }
            }
        }
        self.alloc(ListValue {
            bits,
            origins: value.origins,
            used: true,
        })
    }

    /// `LIST_ALL`: every flag declared by every list `handle` originates
    /// from, regardless of which are currently set.
    pub fn all_origin(&mut self, handle: ListHandle) -> Result<ListHandle> {
        let value = self.clone_value(handle);
        let mut bits = vec![0u64; self.words()];
        for &list_id in &value.origins {
            let def = &self.defs[list_id as usize];
            for flag in 0..def.flag_names.len() as u32 {
                set_bit(&mut bits, def.begin + flag);
            }
        }
        self.alloc(ListValue {
            bits,
            origins: value.origins,
            used: true,
        })
    }

    /// Contiguous subrange `[lo, hi]` by flag index, restricted to a single
    /// declaring list.
    pub fn range(&mut self, handle: ListHandle, list_id: i16, lo: i16, hi: i16) -> Result<ListHandle> {
        let value = self.clone_value(handle);
        let mut bits = vec![0u64; self.words()];
        if let Some(def) = self.defs.get(list_id as usize) {
            for flag in lo.max(0)..=hi.min(def.flag_names.len() as i16 - 1) {
                let idx = def.begin + flag as u32;
                if get_bit(&value.bits, idx) {
                    set_bit(&mut bits, idx);
                }
            }
        }
        self.alloc(ListValue {
            bits,
            origins: value.origins,
            used: true,
        })
    }

    pub fn count(&self, handle: ListHandle) -> usize {
        self.values
            .get(&handle.0)
            .map(|v| v.bits.iter().map(|w| w.count_ones() as usize).sum())
            .unwrap_or(0)
    }

    /// Flags set in `handle`, ascending by `(list_id, flag_index)`.
    pub fn flags(&self, handle: ListHandle) -> Vec<ListFlag> {
        let Some(value) = self.values.get(&handle.0) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (list_id, def) in self.defs.iter().enumerate() {
            for flag in 0..def.flag_names.len() as i16 {
                let idx = def.begin + flag as u32;
                if get_bit(&value.bits, idx) {
                    out.push(ListFlag {
                        list_id: list_id as i16,
                        flag,
                    });
                }
            }
        }
        out
    }

    pub fn min(&self, handle: ListHandle) -> Option<ListFlag> {
        self.flags(handle).into_iter().next()
    }

    pub fn max(&self, handle: ListHandle) -> Option<ListFlag> {
        self.flags(handle).into_iter().next_back()
    }

    /// Bitset identity: two handles compare equal iff they hold the same
    /// flags, regardless of arena position or recorded origins.
    pub fn eq(&self, a: ListHandle, b: ListHandle) -> bool {
        match (self.values.get(&a.0), self.values.get(&b.0)) {
            (Some(va), Some(vb)) => va.bits == vb.bits,
            _ => false,
        }
    }

    /// Lexicographic ordering by minimum element; an empty list sorts
    /// before any non-empty one.
    pub fn cmp(&self, a: ListHandle, b: ListHandle) -> Ordering {
        match (self.min(a), self.min(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(fa), Some(fb)) => (fa.list_id, fa.flag).cmp(&(fb.list_id, fb.flag)),
        }
    }

    /// Ascending `(list_id, flag_index)`, joined with `", "`, using each
    /// flag's bare name (not list-qualified), matching the story's own
    /// stringification rule.
    pub fn stringify(&self, handle: ListHandle) -> String {
        self.flags(handle)
            .into_iter()
            .filter_map(|f| self.flag_name(f))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn clone_value(&self, handle: ListHandle) -> ListValue {
        match self.values.get(&handle.0) {
            Some(v) => ListValue {
                bits: v.bits.clone(),
                origins: v.origins.clone(),
                used: true,
            },
            None => ListValue::empty(self.words()),
        }
    }

    /// Clear every entry's "used" flag. First step of a mark/sweep pass.
    pub fn clear_usage(&mut self) {
        for value in self.values.values_mut() {
            value.used = false;
        }
    }

    /// Mark one entry reachable. Second step of a mark/sweep pass, called
    /// once per list handle found while walking globals, the output
    /// stream, the eval stack, and the callstack.
    pub fn mark_used(&mut self, handle: ListHandle) {
        if let Some(value) = self.values.get_mut(&handle.0) {
            value.used = true;
        }
    }

    /// Free every entry that wasn't marked since the last `clear_usage`.
    /// Final step of a mark/sweep pass. Declared list metadata (`defs`) is
    /// untouched — only allocated values are ever collected.
    pub fn gc(&mut self) {
        self.values.retain(|_, value| value.used);
    }

    /// Number of live list values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ListTable {
    /// Declared lists in declaration order, as `(name, flag_names)` — the
    /// shape the snapshot writer needs to reconstruct `defs` on load.
    pub fn declared_lists(&self) -> Vec<(&str, &[String])> {
        self.defs.iter().map(|d| (d.name.as_str(), d.flag_names.as_slice())).collect()
    }

    /// Every allocated list value's id, raw bitset words, and recorded
    /// origins, ascending by id. Unlike a dense arena, ids may have gaps
    /// after a GC sweep, so the id travels with each entry rather than
    /// being implied by position.
    pub fn raw_values(&self) -> Vec<(u32, &[u64], &[i16])> {
        let mut ids: Vec<u32> = self.values.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| {
                let v = &self.values[&id];
                (id, v.bits.as_slice(), v.origins.as_slice())
            })
            .collect()
    }

    /// Rebuild a table from its declared lists and raw value arena, as
    /// written by [`ListTable::declared_lists`] and [`ListTable::raw_values`].
    /// Used only by the snapshot loader.
    pub fn from_snapshot(defs: Vec<(String, Vec<String>)>, values: Vec<(u32, Vec<u64>, Vec<i16>)>) -> Self {
        let mut table = ListTable::new();
        for (name, flag_names) in defs {
            table.declare_list(name, flag_names);
        }
        let mut next_id = 0;
        let mut map = HashMap::with_capacity(values.len());
        for (id, bits, origins) in values {
            next_id = next_id.max(id + 1);
            map.insert(id, ListValue { bits, origins, used: true });
        }
        table.values = map;
        table.next_id = next_id;
        table
    }
}

impl Default for ListTable {
    fn default() -> Self {
        Self::new()
    }
}

fn set_bit(bits: &mut [u64], idx: u32) {
    let (word, bit) = (idx as usize / 64, idx as usize % 64);
    if let Some(w) = bits.get_mut(word) {
        *w |= 1u64 << bit;
    }
}

fn clear_bit(bits: &mut [u64], idx: u32) {
    let (word, bit) = (idx as usize / 64, idx as usize % 64);
    if let Some(w) = bits.get_mut(word) {
        *w &= !(1u64 << bit);
    }
}

fn get_bit(bits: &[u64], idx: u32) -> bool {
    let (word, bit) = (idx as usize / 64, idx as usize % 64);
    bits.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ListTable {
        let mut table = ListTable::new();
        table.declare_list(
            "Colors",
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
        );
        table
    }

    #[test]
    fn add_then_remove_flag_round_trips() {
        let mut table = sample_table();
        let a = table.to_flag(None, "A").unwrap();
        let b = table.to_flag(None, "B").unwrap();

        let l = table.singleton(a).unwrap();
        let l_plus_b = table.add(l, b).unwrap();
        assert_eq!(table.stringify(l_plus_b), "A, B");

        let back = table.sub(l_plus_b, b).unwrap();
        assert!(table.eq(back, l));
        assert_eq!(table.count(back), 1);
    }

    #[test]
    fn sub_then_add_yields_union_with_flag() {
        let mut table = sample_table();
        let a = table.to_flag(None, "A").unwrap();
        let l = table.singleton(a).unwrap();

        // (L - f) + f == L U {f} even when f was already absent.
        let c = table.to_flag(None, "C").unwrap();
        let removed = table.sub(l, c).unwrap();
        let added_back = table.add(removed, c).unwrap();
        let expected = table.add(l, c).unwrap();
        assert!(table.eq(added_back, expected));
    }

    #[test]
    fn stringify_is_ascending_by_flag_index() {
        let mut table = sample_table();
        let a = table.to_flag(None, "A").unwrap();
        let b = table.to_flag(None, "B").unwrap();
        let l = table.singleton(b).unwrap();
        let l = table.add(l, a).unwrap();
        assert_eq!(table.stringify(l), "A, B");
    }

    #[test]
    fn distinct_handles_can_be_structurally_equal() {
        let mut table = sample_table();
        let a = table.to_flag(None, "A").unwrap();
        let l1 = table.singleton(a).unwrap();
        let l2 = table.singleton(a).unwrap();
        assert_ne!(l1, l2);
        assert!(table.eq(l1, l2));
    }

    #[test]
    fn gc_sweeps_only_unmarked_entries() {
        let mut table = sample_table();
        let a = table.to_flag(None, "A").unwrap();
        let keep = table.singleton(a).unwrap();
        let drop_handle = table.singleton(a).unwrap();

        table.clear_usage();
        table.mark_used(keep);
        table.gc();

        assert_eq!(table.count(keep), 1);
        assert_eq!(table.count(drop_handle), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn gc_does_not_shift_surviving_handles() {
        let mut table = sample_table();
        let a = table.to_flag(None, "A").unwrap();
        let first = table.singleton(a).unwrap();
        let second = table.singleton(a).unwrap();

        table.clear_usage();
        table.mark_used(second);
        table.gc();

        // `second`'s handle must still resolve to the same value after the
        // sweep removed `first` — no reindexing.
        assert_eq!(table.count(second), 1);
        assert_eq!(first.0 + 1, second.0);
    }
}
