//! The bytecode dispatch loop: fetches one [`Command`] at a time from a
//! loaded [`Image`] and applies it to the evaluation stack, output stream,
//! callstack, and globals.
//!
//! Grounded in the teacher's `run`/`dispatch_op` split (`vm.rs`): a thin
//! outer loop that fetches, advances the instruction pointer, and checks
//! the instruction budget, delegating the actual per-opcode work to a
//! dispatch function that can be tested opcode-by-opcode.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::bytecode::{BinOp, Command, FrameKind, Image, ListOp};
use crate::callstack::CallStack;
use crate::error::{Error, Result};
use crate::globals::Globals;
use crate::operators;
use crate::stream::OutputStream;
use crate::value::{StringRef, Value};

/// A host-bound external function: takes the call's arguments, returns a
/// single value. `lookahead_safe` functions may be invoked during
/// speculative choice-text lookahead; others are skipped there and a
/// `Value::None` substituted, with the real call deferred to the
/// committed path.
pub type ExternalFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

struct ExternalBinding {
    func: ExternalFn,
    lookahead_safe: bool,
}

/// One recorded choice, gathered from the stream text assembled since the
/// last marker plus the opcode's own flags.
#[derive(Debug, Clone)]
pub struct ChoiceRecord {
    pub text: String,
    pub target_ip: u32,
    pub is_invisible_default: bool,
    pub is_once_only: bool,
}

/// Why [`Executioner::run_until_stop`] returned control to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Stop {
    /// A line of text is ready; call [`Executioner::take_line`] to collect it.
    Line,
    /// One or more choices have been gathered.
    Choices,
    /// The story has diverted to nowhere or exhausted its root content.
    End,
}

/// Per-runner execution state: the evaluation stack, the callstack, the
/// output stream, and the instruction pointer. [`Globals`] (variables,
/// string/list tables) lives outside and is passed in by reference so
/// multiple runners can eventually share one.
pub struct Executioner {
    image: Arc<Image>,
    eval_stack: Vec<Value>,
    callstack: CallStack,
    stream: OutputStream,
    ip: u32,
    instruction_count: u64,
    max_instructions: Option<u64>,
    max_eval_stack: Option<usize>,
    max_recursion_depth: Option<usize>,
    externals: HashMap<u64, ExternalBinding>,
    in_lookahead: bool,
    /// Name hash of the container most recently diverted into, surfaced
    /// to the runner for knot-change detection.
    current_container: u64,
    pending_choices: Vec<ChoiceRecord>,
    rng_seed: u64,
    /// Tags attached to authored content, bucketed by scope. Knot tags sit
    /// at the top of a knot's body, before any content; global tags sit
    /// before the story's first divert; anything else is a line tag.
    global_tags: Vec<String>,
    knot_tags: HashMap<u64, Vec<String>>,
    current_line_tags: Vec<String>,
    at_knot_start: bool,
    seen_first_divert: bool,
}

impl Executioner {
    pub fn new(
        image: Arc<Image>,
        max_instructions: Option<u64>,
        max_eval_stack: Option<usize>,
        max_recursion_depth: Option<usize>,
        rng_seed: u64,
    ) -> Self {
        Self::with_stream_capacity(image, max_instructions, max_eval_stack, max_recursion_depth, None, rng_seed)
    }

    /// Like [`Executioner::new`], but with the output stream's fixed
    /// capacity per the resource model's "host may configure fixed
    /// capacities: output stream size" clause.
    pub fn with_stream_capacity(
        image: Arc<Image>,
        max_instructions: Option<u64>,
        max_eval_stack: Option<usize>,
        max_recursion_depth: Option<usize>,
        max_output_stream: Option<usize>,
        rng_seed: u64,
    ) -> Self {
        let ip = image.root_ip;
        let stream = match max_output_stream {
            Some(cap) => OutputStream::with_capacity(cap),
            None => OutputStream::new(),
        };
        Self {
            image,
            eval_stack: Vec::new(),
            callstack: CallStack::new(),
            stream,
            ip,
            instruction_count: 0,
            max_instructions,
            max_eval_stack,
            max_recursion_depth,
            externals: HashMap::new(),
            in_lookahead: false,
            current_container: 0,
            pending_choices: Vec::new(),
            rng_seed,
            global_tags: Vec::new(),
            knot_tags: HashMap::new(),
            current_line_tags: Vec::new(),
            at_knot_start: true,
            seen_first_divert: false,
        }
    }

    pub fn bind_external(&mut self, name_hash: u64, func: ExternalFn, lookahead_safe: bool) {
        self.externals.insert(name_hash, ExternalBinding { func, lookahead_safe });
    }

    pub fn current_container(&self) -> u64 {
        self.current_container
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn eval_stack(&self) -> &[Value] {
        &self.eval_stack
    }

    pub fn callstack(&self) -> &CallStack {
        &self.callstack
    }

    pub fn stream(&self) -> &OutputStream {
        &self.stream
    }

    pub fn rng_seed(&self) -> u64 {
        self.rng_seed
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn at_knot_start(&self) -> bool {
        self.at_knot_start
    }

    pub fn seen_first_divert(&self) -> bool {
        self.seen_first_divert
    }

    /// Every `(container_id, tags)` pair with at least one knot tag
    /// recorded so far. Used by the snapshot writer, which has no other
    /// way to enumerate the knot-tag map's keys.
    pub fn all_knot_tags(&self) -> impl Iterator<Item = (u64, &[String])> {
        self.knot_tags.iter().map(|(&id, tags)| (id, tags.as_slice()))
    }

    /// Rebuild the mutable execution state written by the `ip`/
    /// `eval_stack`/`callstack`/`stream` accessors above, plus the tag
    /// bookkeeping and rng seed. Used only by the snapshot loader; the
    /// image, limits, and external bindings come from the constructor the
    /// caller already used to build `self`.
    #[allow(clippy::too_many_arguments)]
    pub fn restore_from_snapshot(
        &mut self,
        ip: u32,
        eval_stack: Vec<Value>,
        callstack: CallStack,
        stream: OutputStream,
        current_container: u64,
        rng_seed: u64,
        instruction_count: u64,
        global_tags: Vec<String>,
        knot_tags: HashMap<u64, Vec<String>>,
        current_line_tags: Vec<String>,
        at_knot_start: bool,
        seen_first_divert: bool,
    ) {
        self.ip = ip;
        self.eval_stack = eval_stack;
        self.callstack = callstack;
        let capacity = self.stream.capacity();
        self.stream = stream;
        self.stream.set_capacity(capacity);
        self.current_container = current_container;
        self.rng_seed = rng_seed;
        self.instruction_count = instruction_count;
        self.global_tags = global_tags;
        self.knot_tags = knot_tags;
        self.current_line_tags = current_line_tags;
        self.at_knot_start = at_knot_start;
        self.seen_first_divert = seen_first_divert;
    }

    pub fn global_tags(&self) -> &[String] {
        &self.global_tags
    }

    pub fn knot_tags(&self, container_id: u64) -> &[String] {
        self.knot_tags.get(&container_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drain the tags attached to the line most recently completed.
    pub fn take_line_tags(&mut self) -> Vec<String> {
        std::mem::take(&mut self.current_line_tags)
    }

    pub fn can_continue(&self) -> bool {
        self.ip < self.image.instructions.len() as u32 || !self.callstack.is_empty()
    }

    /// Diverts execution directly to a container's entry point, as if the
    /// host had chosen a path explicitly (`move_to`).
    pub fn move_to(&mut self, entry_ip: u32, container_id: u64) {
        self.ip = entry_ip;
        self.current_container = container_id;
    }

    /// Drain the choices gathered since the last call.
    pub fn take_choices(&mut self) -> Vec<ChoiceRecord> {
        std::mem::take(&mut self.pending_choices)
    }

    /// Run a mark/sweep pass over the string and list tables, walking every
    /// root a runtime value can be reached from: global variables, the
    /// evaluation stack, every callstack frame's lexical scopes, and the
    /// output stream. Only ever called from a safe point between lines.
    pub fn collect_garbage(&mut self, globals: &mut Globals) {
        globals.strings.clear_usage();
        globals.lists.clear_usage();
        globals.mark_used_roots();
        for value in &self.eval_stack {
            crate::value::mark_reachable(value, &mut globals.strings, &mut globals.lists);
        }
        self.callstack.mark_used(&mut globals.strings, &mut globals.lists);
        self.stream.mark_used(&mut globals.strings, &mut globals.lists);
        globals.strings.gc();
        globals.lists.gc();
    }

    /// Pop the line just completed off the stream (cleaned, trailing
    /// space stripped).
    pub fn take_line(&mut self, globals: &mut Globals) -> Result<String> {
        self.stream.get_line(true, &globals.lists, &globals.strings)
    }

    /// Run a speculative lookahead fork (e.g. to compose a choice's visible
    /// text) without committing its side effects to globals beyond what the
    /// caller explicitly keeps. Non-lookahead-safe externals are skipped.
    pub fn run_lookahead<T>(&mut self, globals: &mut Globals, body: impl FnOnce(&mut Self, &mut Globals) -> Result<T>) -> Result<T> {
        let was_in_lookahead = self.in_lookahead;
        self.in_lookahead = true;
        let result = body(self, globals);
        self.in_lookahead = was_in_lookahead;
        result
    }

    /// Advance execution until a line is ready, a choice block has been
    /// gathered, or the story ends.
    pub fn run_until_stop(&mut self, globals: &mut Globals) -> Result<Stop> {
        loop {
            if !self.can_continue() {
                return Ok(Stop::End);
            }

            let stream_len_before = self.stream.len();
            let op = self
                .image
                .instruction(self.ip)
                .cloned()
                .ok_or_else(|| Error::Runtime(format!("ip {} out of bounds", self.ip)))?;
            self.ip += 1;

            self.instruction_count += 1;
            if let Some(limit) = self.max_instructions
                && self.instruction_count > limit
            {
                return Err(Error::InstructionLimitExceeded(limit));
            }

            let gathered_choice = self.dispatch(&op, globals)?;

            if matches!(op, Command::PushStreamMarker(Value::Newline)) && self.stream.len() > stream_len_before {
                return Ok(Stop::Line);
            }

            if gathered_choice {
                let next_is_choice = self
                    .image
                    .instruction(self.ip)
                    .map(|next| matches!(next, Command::Choice { .. }))
                    .unwrap_or(false);
                if !next_is_choice && !self.pending_choices.is_empty() {
                    return Ok(Stop::Choices);
                }
            }
        }
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if let Some(max) = self.max_eval_stack
            && self.eval_stack.len() >= max
        {
            return Err(Error::Bounds {
                what: "evaluation stack",
                limit: max,
            });
        }
        self.eval_stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        self.eval_stack
            .pop()
            .ok_or_else(|| Error::Runtime("evaluation stack underflow".into()))
    }

    fn resolve_const(&self, id: u32) -> Value {
        Value::Str(StringRef::Constant(id))
    }

    /// Dispatch a single opcode. Returns whether a choice was just
    /// gathered (used by the caller to decide whether to keep draining a
    /// choice block).
    fn dispatch(&mut self, op: &Command, globals: &mut Globals) -> Result<bool> {
        if !matches!(op, Command::Tag(_) | Command::Divert(_)) {
            self.at_knot_start = false;
        }
        match op {
            Command::Tag(id) => {
                let text = self.image.constant(*id).unwrap_or("").to_string();
                if !self.seen_first_divert {
                    self.global_tags.push(text);
                } else if self.at_knot_start {
                    self.knot_tags.entry(self.current_container).or_default().push(text);
                } else {
                    self.current_line_tags.push(text);
                }
            }
            Command::LoadConst(id) => self.push(self.resolve_const(*id))?,
            Command::LoadImmediate(value) => self.push(value.clone())?,
            Command::Pop => {
                self.pop()?;
            }
            Command::Dup => {
                let top = self.eval_stack.last().cloned().unwrap_or(Value::None);
                self.push(top)?;
            }
            Command::LoadVar(name) => {
                let hash = name_hash(name);
                let value = self
                    .callstack
                    .get_local(name)
                    .cloned()
                    .or_else(|| globals.get(hash).cloned())
                    .unwrap_or(Value::None);
                self.push(value)?;
            }
            Command::StoreVar(name) => {
                let value = self.pop()?;
                if self.callstack.get_local(name).is_some() {
                    self.callstack.set_local(name.clone(), value)?;
                } else {
                    globals.set(name_hash(name), value);
                }
            }
            Command::BinaryOp(binop) => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = operators::apply_binop(binop, &left, &right, &mut globals.lists, &mut globals.strings)?;
                self.push(result)?;
            }
            Command::CompareOp(cmpop) => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = operators::apply_cmpop(cmpop, &left, &right, &globals.lists, &globals.strings)?;
                self.push(Value::Bool(result))?;
            }
            Command::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()))?;
            }
            Command::ListOp(list_op) => self.dispatch_list_op(list_op, globals)?,
            Command::BuildList(count) => self.dispatch_build_list(*count, globals)?,
            Command::ListRange => self.dispatch_list_range(globals)?,
            Command::Jump(target) => self.ip = *target,
            Command::JumpIfFalse(target) => {
                let cond = self.pop()?;
                if !cond.is_truthy() {
                    self.ip = *target;
                }
            }
            Command::LoadDivertTarget(target) => {
                self.push(Value::Divert(crate::value::DivertTarget(*target)))?;
            }
            Command::Divert(target) => {
                self.ip = *target;
                self.current_container = self
                    .image
                    .containers
                    .iter()
                    .find(|c| c.entry_ip == *target)
                    .map(|c| c.name_hash)
                    .unwrap_or(self.current_container);
                self.maybe_record_visit(globals);
                self.seen_first_divert = true;
                self.at_knot_start = true;
            }
            Command::PushFrame { target, kind } => self.dispatch_push_frame(*target, *kind, globals)?,
            Command::Return => self.dispatch_return(globals)?,
            Command::PushStreamMarker(marker) => self.stream.append(marker.clone(), &globals.strings)?,
            Command::AppendToStream => {
                let value = self.pop()?;
                self.stream.append(value, &globals.strings)?;
            }
            Command::Choice { is_invisible_default, is_once_only } => {
                return self.dispatch_choice(*is_invisible_default, *is_once_only, globals);
            }
            Command::Sequence { count, shuffle } => self.dispatch_sequence(*count, *shuffle, globals)?,
            Command::Nop => {}
        }
        Ok(false)
    }

    fn maybe_record_visit(&mut self, globals: &mut Globals) {
        if let Some(container) = self.image.containers.iter().find(|c| c.name_hash == self.current_container)
            && container.visits_tracked
        {
            globals.record_visit(self.current_container);
        }
    }

    fn dispatch_list_op(&mut self, op: &ListOp, globals: &mut Globals) -> Result<()> {
        let value = self.pop()?;
        let handle = match value {
            Value::List(h) => h,
            other => {
                return Err(Error::Type {
                    op: "list_op",
                    left: other.type_name(),
                    right: "list",
                })
            }
        };
        let result = match op {
            ListOp::Count => Value::Int(globals.lists.count(handle) as i32),
            ListOp::Min => globals
                .lists
                .min(handle)
                .map(|flag| Value::ListFlag { list_id: flag.list_id, flag: flag.flag })
                .unwrap_or(Value::None),
            ListOp::Max => globals
                .lists
                .max(handle)
                .map(|flag| Value::ListFlag { list_id: flag.list_id, flag: flag.flag })
                .unwrap_or(Value::None),
            ListOp::Invert => Value::List(globals.lists.invert(handle)?),
            ListOp::AllOrigin => Value::List(globals.lists.all_origin(handle)?),
            ListOp::Random => {
                let flags = globals.lists.flags(handle);
                if flags.is_empty() {
                    Value::None
                } else {
                    let mut rng = self.seeded_rng(globals.turn_counter() as u64);
                    let pick = flags[rng.gen_range(0..flags.len())];
                    Value::ListFlag { list_id: pick.list_id, flag: pick.flag }
                }
            }
        };
        self.push(result)
    }

    fn dispatch_build_list(&mut self, count: u32, globals: &mut Globals) -> Result<()> {
        let mut handle = globals.lists.empty()?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(self.pop()?);
        }
        for value in names.into_iter().rev() {
            if let Value::ListFlag { list_id, flag } = value {
                handle = globals.lists.add(handle, crate::list_table::ListFlag { list_id, flag })?;
            }
        }
        self.push(Value::List(handle))
    }

    fn dispatch_list_range(&mut self, globals: &mut Globals) -> Result<()> {
        let hi = self.pop()?.as_int().ok_or_else(|| Error::Runtime("list range high bound must be numeric".into()))?;
        let lo = self.pop()?.as_int().ok_or_else(|| Error::Runtime("list range low bound must be numeric".into()))?;
        let list_id = self.pop()?.as_int().ok_or_else(|| Error::Runtime("list range list id must be numeric".into()))?;
        let base = self.pop()?;
        let handle = match base {
            Value::List(h) => h,
            other => {
                return Err(Error::Type {
                    op: "list_range",
                    left: other.type_name(),
                    right: "list",
                })
            }
        };
        let result = globals.lists.range(handle, list_id as i16, lo as i16, hi as i16)?;
        self.push(Value::List(result))
    }

    fn dispatch_push_frame(&mut self, target: u32, kind: FrameKind, globals: &mut Globals) -> Result<()> {
        let container_id = self
            .image
            .containers
            .iter()
            .find(|c| c.entry_ip == target)
            .map(|c| c.name_hash)
            .unwrap_or(0);
        self.callstack.push(self.ip, kind, container_id, self.stream.len(), self.eval_stack.len(), self.max_recursion_depth)?;
        if kind == FrameKind::Function {
            self.stream.append(Value::FuncStart, &globals.strings)?;
        }
        self.ip = target;
        Ok(())
    }

    fn dispatch_return(&mut self, globals: &mut Globals) -> Result<()> {
        let frame = self.callstack.pop()?;
        self.ip = frame.return_ip;
        match frame.kind {
            FrameKind::Function => {
                let id = self.stream.collect_suffix_as_string(frame.stream_baseline, &globals.lists, &mut globals.strings)?;
                self.eval_stack.truncate(frame.eval_stack_baseline);
                self.push(Value::Str(StringRef::Interned(id)))?;
            }
            FrameKind::Tunnel | FrameKind::Container => {
                self.eval_stack.truncate(frame.eval_stack_baseline.min(self.eval_stack.len()));
            }
            FrameKind::Thread => unreachable!("CallStack::pop refuses to pop a thread frame"),
        }
        Ok(())
    }

    fn dispatch_choice(&mut self, is_invisible_default: bool, is_once_only: bool, globals: &mut Globals) -> Result<bool> {
        let target = match self.pop()? {
            Value::Divert(t) => t.0,
            other => {
                return Err(Error::Type {
                    op: "choice",
                    left: other.type_name(),
                    right: "divert",
                })
            }
        };
        let condition = self.pop()?;
        if !condition.is_truthy() {
            return Ok(false);
        }
        let text = self.stream.get_line(true, &globals.lists, &globals.strings)?;
        self.pending_choices.push(ChoiceRecord {
            text,
            target_ip: target,
            is_invisible_default,
            is_once_only,
        });
        Ok(true)
    }

    fn dispatch_sequence(&mut self, count: u32, shuffle: bool, globals: &mut Globals) -> Result<()> {
        if count == 0 {
            self.push(Value::UInt(0))?;
            return Ok(());
        }
        let visits = globals.visit_count(self.current_container) as u64;
        let index = if shuffle {
            let mut rng = self.seeded_rng(visits);
            rng.gen_range(0..count)
        } else {
            (visits % count as u64) as u32
        };
        self.push(Value::UInt(index))
    }

    fn seeded_rng(&self, salt: u64) -> StdRng {
        StdRng::seed_from_u64(self.rng_seed ^ salt)
    }

    /// Invoke a host-bound external function by name hash. Non-lookahead-safe
    /// bindings are skipped during speculative lookahead, substituting
    /// `Value::None` and leaving the real call for the committed path.
    pub fn call_external(&self, name_hash: u64, args: &[Value]) -> Result<Value> {
        let binding = self
            .externals
            .get(&name_hash)
            .ok_or_else(|| Error::UnknownFunction(format!("{name_hash:#x}")))?;
        if self.in_lookahead && !binding.lookahead_safe {
            return Ok(Value::None);
        }
        (binding.func)(args)
    }
}

/// FNV-1a over the name's bytes — a stable, dependency-free way to turn a
/// variable name into the `u64` key [`Globals`] and the container table
/// both index by.
pub fn name_hash(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in name.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ContainerMeta;
    use crate::value::DivertTarget;

    fn image_with(instructions: Vec<Command>) -> Arc<Image> {
        Arc::new(Image::new(instructions, Vec::new(), Vec::new(), Vec::new(), 0))
    }

    #[test]
    fn arithmetic_roundtrip_pushes_result() {
        let image = image_with(vec![
            Command::LoadImmediate(Value::Int(2)),
            Command::LoadImmediate(Value::Int(3)),
            Command::BinaryOp(BinOp::Add),
        ]);
        let mut exec = Executioner::new(image, None, None, None, 0);
        let mut globals = Globals::new();
        for _ in 0..3 {
            let op = exec.image.instruction(exec.ip).cloned().unwrap();
            exec.ip += 1;
            exec.dispatch(&op, &mut globals).unwrap();
        }
        assert_eq!(exec.eval_stack.last(), Some(&Value::Int(5)));
    }

    #[test]
    fn store_and_load_roundtrip_through_globals() {
        let image = image_with(vec![]);
        let mut exec = Executioner::new(image, None, None, None, 0);
        let mut globals = Globals::new();
        exec.dispatch(&Command::LoadImmediate(Value::Int(9)), &mut globals).unwrap();
        exec.dispatch(&Command::StoreVar("score".into()), &mut globals).unwrap();
        exec.dispatch(&Command::LoadVar("score".into()), &mut globals).unwrap();
        assert_eq!(exec.eval_stack.last(), Some(&Value::Int(9)));
    }

    #[test]
    fn choice_with_false_condition_is_not_recorded() {
        let image = image_with(vec![]);
        let mut exec = Executioner::new(image, None, None, None, 0);
        let mut globals = Globals::new();
        exec.dispatch(&Command::LoadImmediate(Value::Bool(false)), &mut globals).unwrap();
        exec.dispatch(&Command::LoadImmediate(Value::Divert(DivertTarget(4))), &mut globals).unwrap();
        let gathered = exec
            .dispatch(&Command::Choice { is_invisible_default: false, is_once_only: false }, &mut globals)
            .unwrap();
        assert!(!gathered);
        assert!(exec.pending_choices.is_empty());
    }

    #[test]
    fn function_return_collects_output_as_string() {
        let image = Arc::new(Image::new(
            Vec::new(),
            Vec::new(),
            vec![ContainerMeta { name_hash: 1, entry_ip: 0, visits_tracked: false, turns_tracked: false }],
            Vec::new(),
            0,
        ));
        let mut exec = Executioner::new(image, None, None, None, 0);
        let mut globals = Globals::new();
        exec.dispatch_push_frame(0, FrameKind::Function, &mut globals).unwrap();
        let hi = globals.strings.create("hi".into()).unwrap();
        exec.stream.append(Value::Str(StringRef::Interned(hi)), &globals.strings).unwrap();
        exec.dispatch_return(&mut globals).unwrap();
        match exec.eval_stack.last() {
            Some(Value::Str(StringRef::Interned(id))) => {
                assert_eq!(globals.strings.get(*id), Some("hi"));
            }
            other => panic!("expected an interned string, got {other:?}"),
        }
    }

    #[test]
    fn instruction_limit_is_enforced() {
        let image = image_with(vec![Command::Nop, Command::Nop, Command::Nop]);
        let mut exec = Executioner::new(image, Some(1), None, None, 0);
        let mut globals = Globals::new();
        let err = exec.run_until_stop(&mut globals).unwrap_err();
        assert!(matches!(err, Error::InstructionLimitExceeded(1)));
    }
}
