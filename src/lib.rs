//! inkrt - An embeddable runtime for executing compiled Ink interactive-
//! fiction stories.
//!
//! inkrt loads a compiled story image (produced by a separate, out-of-scope
//! compiler) and drives it forward: a bytecode dispatcher interprets the
//! image's instructions against an evaluation stack, an output stream with
//! glue/whitespace composition rules, a callstack of container/function/
//! tunnel/thread frames, and a globals store of variables, visit/turn
//! counters, and list (set-of-flags) values.
//!
//! # Quick Start
//!
//! ```no_run
//! use inkrt::{Story, Limits};
//!
//! let bytes = std::fs::read("story.inkb").unwrap();
//! let story = Story::from_bytes(&bytes).unwrap();
//! let mut runner = story.new_runner(Limits::new());
//!
//! while runner.can_continue() {
//!     let line = runner.getline().unwrap();
//!     println!("{}", line.text);
//!     if runner.num_choices() > 0 {
//!         runner.choose(0).unwrap();
//!     }
//! }
//! ```
//!
//! # Scope
//!
//! This crate covers the runtime virtual machine only: the bytecode
//! dispatcher, evaluation stack, output stream, callstack/thread model,
//! list table, string interning table, and snapshot serializer. The
//! offline compiler that turns authored Ink source into a binary story
//! image, language-binding shims, and UI front-ends are out of scope.
//!
//! # Resource Limits
//!
//! [`Limits`] bounds the instruction count, evaluation stack depth, and
//! callstack depth a [`Runner`] will tolerate before returning
//! [`Error::InstructionLimitExceeded`] or [`Error::Bounds`].
//!
//! # Snapshots
//!
//! [`snapshot::save`] and [`snapshot::load`] serialize and restore a
//! runner's full state (including its globals, string table, and list
//! table) to a byte-exact blob, per the fixed section order: strings,
//! globals, then per-runner callstack/eval-stack/output-stream state.

mod bytecode;
mod callstack;
mod codec;
mod error;
mod executioner;
mod globals;
mod list_table;
mod operators;
mod runner;
pub mod snapshot;
mod story;
mod stream;
mod string_table;
mod value;

pub use bytecode::{BinOp, CmpOp, Command, ContainerMeta, FrameKind, Image, ListMeta, ListOp};
pub use callstack::{CallStack, Frame, ThreadFork};
pub use error::{Error, Result};
pub use executioner::{ChoiceRecord, Executioner, ExternalFn, Stop, name_hash};
pub use globals::{Globals, Observer};
#[cfg(feature = "serde")]
pub use globals::GlobalsDump;
pub use list_table::{ListFlag, ListHandle, ListTable};
pub use runner::{Choice, Limits, Line, Runner, State};
pub use story::{Story, StoryBuilder};
pub use string_table::{StringId, StringTable};
pub use value::{DivertTarget, StringRef, Value, VariablePointer};
