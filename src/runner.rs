//! The top-level driver applications embed: [`Runner`] pumps the
//! executioner until a line, a choice block, or the end of the story, and
//! exposes the state machine the data model calls for.
//!
//! A small struct wrapping the interpreter, constructed with sane defaults
//! and configured through a handful of chained setters before the first
//! call that actually runs anything.

use std::sync::Arc;

use crate::bytecode::Image;
use crate::error::{Error, Result};
use crate::executioner::{ChoiceRecord, ExternalFn, Stop};
use crate::executioner::{Executioner, name_hash};
use crate::globals::{Globals, Observer};
use crate::value::Value;

/// Construction-time capacity bounds, per the resource model's "host may
/// configure fixed capacities" clause. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    pub max_instructions: Option<u64>,
    pub max_eval_stack: Option<usize>,
    pub max_callstack_depth: Option<usize>,
    pub max_output_stream: Option<usize>,
}

impl Limits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_instructions(mut self, n: u64) -> Self {
        self.max_instructions = Some(n);
        self
    }

    pub fn max_eval_stack(mut self, n: usize) -> Self {
        self.max_eval_stack = Some(n);
        self
    }

    pub fn max_callstack_depth(mut self, n: usize) -> Self {
        self.max_callstack_depth = Some(n);
        self
    }

    pub fn max_output_stream(mut self, n: usize) -> Self {
        self.max_output_stream = Some(n);
        self
    }
}

/// One fully composed line, with the tags attached to it and the knot it
/// was emitted from.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub tags: Vec<String>,
    pub knot: u64,
}

/// A choice offered to the player, with its composed visible text.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub text: String,
    pub is_invisible_default: bool,
}

/// The Runner's state machine, driven by [`Executioner::run_until_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    Running,
    AtChoice,
    AtEnd,
    Errored,
}

/// Drives one story image forward: advances the executioner, exposes lines
/// and choices, and owns the [`Globals`] this runner's variables and
/// tables live in.
///
/// # Example
///
/// ```no_run
/// use inkrt::{Story, Limits};
///
/// let bytes = std::fs::read("story.inkb").unwrap();
/// let story = Story::from_bytes(&bytes).unwrap();
/// let mut runner = story.new_runner(Limits::new());
///
/// while runner.can_continue() {
///     let line = runner.getline().unwrap();
///     println!("{}", line.text);
/// }
/// ```
pub struct Runner {
    exec: Executioner,
    globals: Globals,
    state: State,
    pending_choices: Vec<ChoiceRecord>,
    /// Tags attached to the line most recently returned by `getline`.
    last_line_tags: Vec<String>,
}

impl Runner {
    pub fn new(image: Arc<Image>, limits: Limits) -> Self {
        Self::seeded(image, limits, 0)
    }

    /// Construct a runner that shares an existing [`Globals`] with other
    /// runners attached to the same story, per the resource model's
    /// multi-runner sharing clause. The caller must not drive two runners
    /// sharing one `Globals` concurrently from different OS threads.
    pub fn with_globals(image: Arc<Image>, limits: Limits, globals: Globals) -> Self {
        let exec = Executioner::with_stream_capacity(
            image,
            limits.max_instructions,
            limits.max_eval_stack,
            limits.max_callstack_depth,
            limits.max_output_stream,
            0,
        );
        Self {
            exec,
            globals,
            state: State::Ready,
            pending_choices: Vec::new(),
            last_line_tags: Vec::new(),
        }
    }

    /// Like [`Runner::new`], but with an explicit seed for the
    /// deterministic pseudo-randomness behind `Sequence{shuffle:true}` and
    /// `ListOp::Random`, for reproducible playthroughs.
    pub fn seeded(image: Arc<Image>, limits: Limits, rng_seed: u64) -> Self {
        let exec = Executioner::with_stream_capacity(
            image,
            limits.max_instructions,
            limits.max_eval_stack,
            limits.max_callstack_depth,
            limits.max_output_stream,
            rng_seed,
        );
        Self {
            exec,
            globals: Globals::new(),
            state: State::Ready,
            pending_choices: Vec::new(),
            last_line_tags: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    pub fn executioner(&self) -> &Executioner {
        &self.exec
    }

    pub fn executioner_mut(&mut self) -> &mut Executioner {
        &mut self.exec
    }

    /// Raw pending choices, kept across a snapshot so `num_choices`/
    /// `get_choice` are correct immediately after load without re-running
    /// the story up to the choice point.
    pub fn pending_choices(&self) -> &[ChoiceRecord] {
        &self.pending_choices
    }

    /// Tags attached to the line most recently returned by `getline`.
    pub fn last_line_tags(&self) -> &[String] {
        &self.last_line_tags
    }

    /// Used only by the snapshot loader to restore the state machine,
    /// pending-choice set, and last-line tags a save captured.
    pub fn restore_control_state(&mut self, state: State, pending_choices: Vec<ChoiceRecord>, last_line_tags: Vec<String>) {
        self.state = state;
        self.pending_choices = pending_choices;
        self.last_line_tags = last_line_tags;
    }

    pub fn can_continue(&self) -> bool {
        matches!(self.state, State::Ready | State::Running) && self.exec.can_continue()
    }

    pub fn num_choices(&self) -> usize {
        self.pending_choices.len()
    }

    pub fn get_choice(&self, i: usize) -> Option<Choice> {
        self.pending_choices.get(i).map(|c| Choice {
            text: c.text.clone(),
            is_invisible_default: c.is_invisible_default,
        })
    }

    /// Select choice `i`, diverting to its target and advancing the turn
    /// counter, per the sequence/shuffle seeding rule that salts off visit
    /// and turn bookkeeping.
    pub fn choose(&mut self, i: usize) -> Result<()> {
        let choice = self
            .pending_choices
            .get(i)
            .ok_or_else(|| Error::Runtime(format!("no choice at index {i}")))?
            .clone();
        self.globals.advance_turn();
        self.exec.move_to(choice.target_ip, self.exec.current_container());
        self.pending_choices.clear();
        self.state = State::Running;
        Ok(())
    }

    /// Divert directly to a named knot, bypassing choice selection.
    pub fn move_to(&mut self, knot_hash: u64, entry_ip: u32) {
        self.exec.move_to(entry_ip, knot_hash);
        self.state = State::Running;
    }

    pub fn bind_delegate(&mut self, name: &str, func: ExternalFn, lookahead_safe: bool) {
        self.exec.bind_external(name_hash(name), func, lookahead_safe);
    }

    pub fn observe(&mut self, name: &str, observer: Observer) {
        self.globals.observe(name_hash(name), observer);
    }

    pub fn get_var(&self, name: &str) -> Value {
        self.globals.get(name_hash(name)).cloned().unwrap_or(Value::None)
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.globals.set(name_hash(name), value);
    }

    /// Number of tags attached to the line most recently returned by
    /// `getline`.
    pub fn num_tags(&self) -> usize {
        self.last_line_tags.len()
    }

    pub fn get_tag(&self, i: usize) -> Option<&str> {
        self.last_line_tags.get(i).map(String::as_str)
    }

    pub fn num_global_tags(&self) -> usize {
        self.exec.global_tags().len()
    }

    pub fn get_global_tag(&self, i: usize) -> Option<&str> {
        self.exec.global_tags().get(i).map(String::as_str)
    }

    pub fn num_knot_tags(&self, knot_hash: u64) -> usize {
        self.exec.knot_tags(knot_hash).len()
    }

    pub fn get_knot_tag(&self, knot_hash: u64, i: usize) -> Option<&str> {
        self.exec.knot_tags(knot_hash).get(i).map(String::as_str)
    }

    /// Advance until a line is ready, returning it with its tags and knot
    /// identity; transitions the state machine as it goes. On a choice
    /// block or end of story, returns `Error::Runtime` — callers should
    /// check `state()` before calling `getline` again, matching the
    /// state table's `Running` row ("next transitions" only ever go
    /// forward, never re-emit the same stop).
    pub fn getline(&mut self) -> Result<Line> {
        if !self.can_continue() {
            return Err(Error::Runtime("getline called while runner cannot continue".into()));
        }
        self.state = State::Running;
        match self.pump() {
            Ok(line) => line,
            Err(err) => {
                self.state = State::Errored;
                Err(err)
            }
        }
    }

    fn pump(&mut self) -> Result<Result<Line>> {
        loop {
            match self.exec.run_until_stop(&mut self.globals)? {
                Stop::Line => {
                    let text = self.exec.take_line(&mut self.globals)?;
                    let tags = self.exec.take_line_tags();
                    self.last_line_tags = tags.clone();
                    let knot = self.exec.current_container();
                    self.state = State::Ready;
                    self.exec.collect_garbage(&mut self.globals);
                    return Ok(Ok(Line { text, tags, knot }));
                }
                Stop::Choices => {
                    self.pending_choices = self.exec.take_choices();
                    self.state = State::AtChoice;
                    return Ok(Err(Error::Runtime("story stopped at a choice block".into())));
                }
                Stop::End => {
                    self.state = State::AtEnd;
                    return Ok(Err(Error::Runtime("story has ended".into())));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Command, ContainerMeta};
    use crate::value::DivertTarget;

    fn hello_image() -> Arc<Image> {
        Arc::new(Image::new(
            vec![
                Command::LoadConst(0),
                Command::AppendToStream,
                Command::PushStreamMarker(Value::Newline),
            ],
            vec!["hello".to_string()],
            vec![ContainerMeta {
                name_hash: 1,
                entry_ip: 0,
                visits_tracked: false,
                turns_tracked: false,
            }],
            Vec::new(),
            0,
        ))
    }

    #[test]
    fn runner_starts_ready_and_emits_one_line() {
        let mut runner = Runner::new(hello_image(), Limits::new());
        assert_eq!(runner.state(), State::Ready);
        assert!(runner.can_continue());
        let line = runner.getline().unwrap();
        assert_eq!(line.text, "hello");
    }

    #[test]
    fn choosing_an_index_out_of_range_is_an_error() {
        let mut runner = Runner::new(hello_image(), Limits::new());
        let err = runner.choose(0).unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
    }

    #[test]
    fn set_and_get_var_round_trip() {
        let mut runner = Runner::new(hello_image(), Limits::new());
        runner.set_var("score", Value::Int(7));
        assert_eq!(runner.get_var("score"), Value::Int(7));
        assert_eq!(runner.get_var("missing"), Value::None);
    }

    #[test]
    fn choice_block_transitions_state_to_at_choice() {
        let image = Arc::new(Image::new(
            vec![
                Command::LoadImmediate(Value::Bool(true)),
                Command::LoadImmediate(Value::Divert(DivertTarget(0))),
                Command::Choice {
                    is_invisible_default: false,
                    is_once_only: false,
                },
            ],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            0,
        ));
        let mut runner = Runner::new(image, Limits::new());
        let err = runner.getline().unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(runner.state(), State::AtChoice);
        assert_eq!(runner.num_choices(), 1);
    }
}
