//! Global variables, visit/turn bookkeeping, and the variable-observer
//! registry.
//!
//! This is the one piece of mutable state shared by every thread forked
//! off the callstack: a name-hash-keyed variable map, per-container visit
//! counters, the global turn counter, and observer callbacks notified on
//! assignment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::list_table::ListTable;
use crate::string_table::StringTable;
use crate::value::Value;

/// A variable-change observer. Receives the new value and, if this is not
/// the observer's first notification, the value it is replacing.
pub type Observer = Arc<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

/// Global runtime state shared across the whole story run.
///
/// Owns the string and list tables as well as the variable map: per the
/// resource model, runners borrow these rather than owning their own
/// copies, so garbage collection and list arithmetic stay consistent
/// across every thread forked off a runner's callstack.
pub struct Globals {
    vars: HashMap<u64, Value>,
    visits: HashMap<u64, u32>,
    last_visit_turn: HashMap<u64, u32>,
    turn_counter: u32,
    observers: HashMap<u64, Vec<Observer>>,
    /// Tracks whether a name has ever been observed, so the first
    /// notification after `observe()` can pass `None` for the old value.
    observed_once: std::collections::HashSet<u64>,
    pub strings: StringTable,
    pub lists: ListTable,
}

impl Globals {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            visits: HashMap::new(),
            last_visit_turn: HashMap::new(),
            turn_counter: 0,
            observers: HashMap::new(),
            observed_once: std::collections::HashSet::new(),
            strings: StringTable::new(),
            lists: ListTable::new(),
        }
    }

    /// Read a global, `none` semantics for an absent name handled by the
    /// caller (the executioner maps a miss to `Value::None`).
    pub fn get(&self, name_hash: u64) -> Option<&Value> {
        self.vars.get(&name_hash)
    }

    /// Assign a global, notifying any registered observers with the new
    /// value and (after the first notification) the value being replaced.
    pub fn set(&mut self, name_hash: u64, value: Value) {
        let old = self.vars.insert(name_hash, value.clone());
        if let Some(observers) = self.observers.get(&name_hash) {
            let old_ref = if self.observed_once.contains(&name_hash) {
                old.as_ref()
            } else {
                None
            };
            for observer in observers {
                observer(&value, old_ref);
            }
        }
        self.observed_once.insert(name_hash);
    }

    /// Register an observer for a variable name. Multiple observers on
    /// the same name all fire, in registration order.
    pub fn observe(&mut self, name_hash: u64, observer: Observer) {
        self.observers.entry(name_hash).or_default().push(observer);
    }

    /// Record one visit to a "visits-tracked" container.
    pub fn record_visit(&mut self, container_id: u64) {
        *self.visits.entry(container_id).or_insert(0) += 1;
        self.last_visit_turn.insert(container_id, self.turn_counter);
    }

    pub fn visit_count(&self, container_id: u64) -> u32 {
        self.visits.get(&container_id).copied().unwrap_or(0)
    }

    /// Turns elapsed since the container was last visited, or `-1` if it
    /// has never been visited (matching Ink's `TURNS_SINCE` sentinel).
    pub fn turns_since_last_visit(&self, container_id: u64) -> i32 {
        match self.last_visit_turn.get(&container_id) {
            Some(&last) => (self.turn_counter - last) as i32,
            None => -1,
        }
    }

    pub fn turn_counter(&self) -> u32 {
        self.turn_counter
    }

    /// Advance the turn counter. Called once per `choose()`.
    pub fn advance_turn(&mut self) {
        self.turn_counter += 1;
    }

    pub fn iter_vars(&self) -> impl Iterator<Item = (u64, &Value)> {
        self.vars.iter().map(|(&k, v)| (k, v))
    }

    /// Mark every global variable reachable in the string/list tables.
    /// One of the GC roots walked by a mark/sweep pass, alongside the eval
    /// stack, callstack scope locals, and the output stream.
    pub fn mark_used_roots(&mut self) {
        let Globals { vars, strings, lists, .. } = self;
        for value in vars.values() {
            crate::value::mark_reachable(value, strings, lists);
        }
    }

    /// `(container_id, visit_count)` pairs. Used by the snapshot writer.
    pub fn iter_visits(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.visits.iter().map(|(&k, &v)| (k, v))
    }

    /// `(container_id, turn_last_visited)` pairs. Used by the snapshot writer.
    pub fn iter_last_visit_turn(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.last_visit_turn.iter().map(|(&k, &v)| (k, v))
    }

    /// Rebuild the variable map, visit/turn bookkeeping, and turn counter
    /// from a snapshot. Observers are not part of the snapshot format — the
    /// host re-registers them after load, per the resource model's
    /// "observer registration is by name and is stable across snapshots"
    /// rule. `strings`/`lists` are assigned directly by the loader since
    /// they are public fields.
    pub fn restore_bookkeeping(
        &mut self,
        vars: HashMap<u64, Value>,
        visits: HashMap<u64, u32>,
        last_visit_turn: HashMap<u64, u32>,
        turn_counter: u32,
    ) {
        self.vars = vars;
        self.visits = visits;
        self.last_visit_turn = last_visit_turn;
        self.turn_counter = turn_counter;
    }
}

impl Default for Globals {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time, human-readable snapshot of the variable map and
/// visit/turn bookkeeping, for host-side inspection (e.g. a debugger
/// panel). This is not the save/load wire format — see
/// [`crate::snapshot`] for that — and carries no stability guarantee
/// across versions.
#[cfg(feature = "serde")]
#[derive(serde::Serialize)]
pub struct GlobalsDump {
    pub vars: HashMap<u64, Value>,
    pub visits: HashMap<u64, u32>,
    pub turn_counter: u32,
}

#[cfg(feature = "serde")]
impl Globals {
    /// Render the current variable map and visit/turn bookkeeping as a
    /// JSON string. Observers and the string/list tables are not included.
    pub fn debug_dump_json(&self) -> serde_json::Result<String> {
        let dump = GlobalsDump {
            vars: self.vars.clone(),
            visits: self.visits.clone(),
            turn_counter: self.turn_counter,
        };
        serde_json::to_string_pretty(&dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn first_observation_has_no_old_value() {
        let mut globals = Globals::new();
        let seen: Arc<Mutex<Vec<(Value, Option<Value>)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        globals.observe(
            1,
            Arc::new(move |new, old| seen_clone.lock().unwrap().push((new.clone(), old.cloned()))),
        );
        globals.set(1, Value::Int(1));
        globals.set(1, Value::Int(2));

        let events = seen.lock().unwrap();
        assert_eq!(events[0], (Value::Int(1), None));
        assert_eq!(events[1], (Value::Int(2), Some(Value::Int(1))));
    }

    #[test]
    fn unvisited_container_has_negative_turns_since() {
        let globals = Globals::new();
        assert_eq!(globals.turns_since_last_visit(42), -1);
    }

    #[test]
    fn visit_count_increments_per_call() {
        let mut globals = Globals::new();
        globals.record_visit(7);
        globals.advance_turn();
        globals.record_visit(7);
        assert_eq!(globals.visit_count(7), 2);
        assert_eq!(globals.turns_since_last_visit(7), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn debug_dump_includes_vars_and_visits() {
        let mut globals = Globals::new();
        globals.set(1, Value::Int(5));
        globals.record_visit(2);
        let json = globals.debug_dump_json().unwrap();
        assert!(json.contains("\"vars\""));
        assert!(json.contains("\"visits\""));
    }
}
