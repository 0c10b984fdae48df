//! The runtime's tagged value type.
//!
//! A [`Value`] is the unit the evaluation stack, output stream, globals map,
//! and callstack variable scopes all traffic in. Every variant corresponds to
//! one of the tags enumerated in the data model: scalars, the three interned
//! handle types (string, list, list flag), and the stream control markers
//! that never appear inside an expression but do appear inside the output
//! stream and eval stack alike.

use std::fmt;

use crate::list_table::{ListHandle, ListTable};
use crate::string_table::{StringId, StringTable};

/// A reference to a container entry point, used by diverts and tunnels.
///
/// Stored as a plain offset into the image's instruction stream; resolving it
/// to an actual jump target is the image's job, not the value's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DivertTarget(pub u32);

/// A pointer to a named variable, either global or local to some depth of the
/// callstack. `context` of `-1` means "global"; otherwise it names the
/// callstack depth the variable was captured at, matching the original's
/// `variable_pointer` encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VariablePointer {
    /// Name of the referenced variable.
    pub name: String,
    /// `-1` for a global; otherwise the callstack depth at capture time.
    pub context: i32,
}

/// One of the two ways a runtime string can be stored: freshly interned by
/// the VM (and therefore subject to mark/sweep GC), or borrowed straight out
/// of the story image's read-only constant pool (never freed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum StringRef {
    /// Lives in the GC-managed [`crate::string_table::StringTable`].
    Interned(StringId),
    /// Borrowed from the image's constant string pool; `0`-based ordinal
    /// into that pool.
    Constant(u32),
}

/// The runtime's tagged value.
///
/// `None` is Ink's own "no value" literal (the result of an expression that
/// evaluates to nothing); `Null` is an internal sentinel the VM uses for
/// uninitialized slots and is never produced by evaluating story content.
/// Keeping them distinct mirrors the source format's own `none`/`null` tag
/// split rather than collapsing them into one "empty" case.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Value {
    /// Ink's `None` literal.
    None,
    /// Internal "no value yet" sentinel; distinct from `None`.
    Null,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    /// A string, either interned at runtime or borrowed from the constant
    /// pool. Content equality is resolved through a string table, not by
    /// comparing this variant directly — see [`crate::string_table`].
    Str(StringRef),
    /// A list (set-of-flags) value.
    List(ListHandle),
    /// A single named flag belonging to one declared list.
    ListFlag {
        /// Id of the declaring list.
        list_id: i16,
        /// Dense index of the flag within the global flag universe.
        flag: i16,
    },
    Divert(DivertTarget),
    VariablePointer(VariablePointer),
    /// Stream control marker: suppressible newline.
    Newline,
    /// Stream control marker: suppresses a following newline.
    Glue,
    /// Stream control marker: start of a function's output region.
    FuncStart,
    /// Stream control marker: end of a function's output region.
    FuncEnd,
    /// Stream control marker: boundary pushed when a tunnel/thread forks.
    TunnelFrame,
    /// Stream control marker: delimits a completed line.
    Marker,
}

impl Value {
    /// Name of this value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::ListFlag { .. } => "list_flag",
            Value::Divert(_) => "divert",
            Value::VariablePointer(_) => "variable_pointer",
            Value::Newline => "newline",
            Value::Glue => "glue",
            Value::FuncStart => "func_start",
            Value::FuncEnd => "func_end",
            Value::TunnelFrame => "tunnel_frame",
            Value::Marker => "marker",
        }
    }

    /// Whether this value is one of the stream-only control markers rather
    /// than an expression-evaluable value.
    pub fn is_control_marker(&self) -> bool {
        matches!(
            self,
            Value::Newline
                | Value::Glue
                | Value::FuncStart
                | Value::FuncEnd
                | Value::TunnelFrame
                | Value::Marker
        )
    }

    /// Truthiness for `and`/`or`/`not` and conditional diverts. Control
    /// markers are never evaluated for truthiness; callers must not ask.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::UInt(u) => *u != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(_) => true,
            Value::List(_) => true,
            Value::ListFlag { .. } => true,
            Value::Divert(_) | Value::VariablePointer(_) => true,
            _ => false,
        }
    }

    /// Extract an `i32` if this value carries one, promoting `Bool`/`UInt`.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => Some(*u as i32),
            Value::Bool(b) => Some(*b as i32),
            _ => None,
        }
    }

    /// Extract an `f32`, promoting `Int`/`UInt`/`Bool`.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f32),
            Value::UInt(u) => Some(*u as f32),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// `true` if this value's tag carries a number (int, uint, float, bool).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::UInt(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Whether this value contributes visible (or structurally meaningful,
    /// in the case of `newline`) content when the output stream is
    /// assembled into a line. `Null` tombstones left behind by glue
    /// trimming and pure stack-bookkeeping markers are not printable.
    pub fn is_printable(&self) -> bool {
        matches!(
            self,
            Value::Int(_)
                | Value::UInt(_)
                | Value::Float(_)
                | Value::Bool(_)
                | Value::Str(_)
                | Value::List(_)
                | Value::ListFlag { .. }
                | Value::Newline
        )
    }
}

/// Marks `value` reachable in whichever GC-managed table it references, if
/// any. Shared by every root the mark phase walks: globals, the eval stack,
/// callstack scope locals, and the output stream.
pub fn mark_reachable(value: &Value, strings: &mut StringTable, lists: &mut ListTable) {
    match value {
        Value::Str(StringRef::Interned(id)) => strings.mark_used(*id),
        Value::List(handle) => lists.mark_used(*handle),
        _ => {}
    }
}

impl fmt::Display for Value {
    /// A debug-oriented rendering used only outside the story-facing
    /// stringification path (see `operators::stringify`, which needs the
    /// string/list tables and so cannot live on `Value` itself).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Str(StringRef::Interned(id)) => write!(f, "<str#{}>", id.0),
            Value::Str(StringRef::Constant(ord)) => write!(f, "<const_str#{ord}>"),
            Value::List(handle) => write!(f, "<list#{}>", handle.0),
            Value::ListFlag { list_id, flag } => write!(f, "<flag {list_id}.{flag}>"),
            Value::Divert(t) => write!(f, "<divert -> {}>", t.0),
            Value::VariablePointer(p) => write!(f, "<var_ptr {}@{}>", p.name, p.context),
            Value::Newline => write!(f, "<newline>"),
            Value::Glue => write!(f, "<glue>"),
            Value::FuncStart => write!(f, "<func_start>"),
            Value::FuncEnd => write!(f, "<func_end>"),
            Value::TunnelFrame => write!(f, "<tunnel_frame>"),
            Value::Marker => write!(f, "<marker>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_promotion_accessors() {
        assert_eq!(Value::Int(4).as_float(), Some(4.0));
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::UInt(7).as_int(), Some(7));
    }

    #[test]
    fn truthiness_matches_none_and_null() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::Int(0).is_truthy() == false);
        assert!(Value::Int(1).is_truthy());
    }

    #[test]
    fn control_markers_are_never_numeric() {
        assert!(!Value::Newline.is_numeric());
        assert!(Value::Newline.is_control_marker());
        assert!(!Value::Int(1).is_control_marker());
    }

    #[test]
    fn type_names_are_stable() {
        assert_eq!(Value::None.type_name(), "none");
        assert_eq!(Value::List(ListHandle(0)).type_name(), "list");
        assert_eq!(
            Value::ListFlag { list_id: 0, flag: 1 }.type_name(),
            "list_flag"
        );
    }
}
