//! The output stream: an editable, retroactively-trimmable log of values
//! that gets assembled into user-visible lines.
//!
//! Unlike a plain string buffer, pushing one value can rewrite entries
//! already in the stream — `glue` and a function's closing marker both walk
//! backwards nullifying trailing whitespace and newlines. [`OutputStream`]
//! keeps those rewrite rules and the save/restore checkpoint discipline
//! together, since both operate on the same dense value log.

use crate::error::{Error, Result};
use crate::list_table::ListTable;
use crate::operators::stringify;
use crate::string_table::StringTable;
use crate::value::Value;

/// RAII checkpoint guard for [`OutputStream::save`]/[`OutputStream::restore`].
///
/// Holding one open and dropping it without calling [`Self::commit`] restores
/// the stream to the size recorded at construction — the scope-guard pattern
/// called for in the design notes, so a lookahead fork that bails out early
/// via `?` can never leave a dangling save point.
pub struct StreamCheckpoint<'a> {
    stream: &'a mut OutputStream,
    committed: bool,
}

impl<'a> StreamCheckpoint<'a> {
    /// Keep the stream as it is and discard the checkpoint (`forget()`).
    pub fn commit(mut self) {
        self.stream.forget();
        self.committed = true;
    }

    /// Whether anything other than whitespace-only strings has been
    /// appended since this checkpoint was taken.
    pub fn text_past_save(&self, strings: &StringTable) -> bool {
        self.stream.text_past_save(strings)
    }
}

impl Drop for StreamCheckpoint<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.stream.restore();
        }
    }
}

/// Dense, append-only-except-for-trimming log of stream values.
pub struct OutputStream {
    data: Vec<Value>,
    /// `None` means no save point is active (the original's `sentinel`).
    save: Option<usize>,
    last_char: Option<char>,
    capacity: Option<usize>,
}

impl OutputStream {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            save: None,
            last_char: None,
            capacity: None,
        }
    }

    /// A stream that turns overflow into a fatal [`Error::Bounds`] instead
    /// of growing. See §4.2's resolved overflow policy: growable by
    /// default, fixed capacity opt-in.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            save: None,
            last_char: None,
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one value, applying the newline-suppression and
    /// glue/function-end trimming rules. String content is resolved
    /// through `strings` only to test for whitespace-only runs; the value
    /// itself is stored as handed in.
    pub fn append(&mut self, value: Value, strings: &StringTable) -> Result<()> {
        if matches!(value, Value::Newline) {
            if self.data.is_empty() {
                return Ok(());
            }
            if self.suppress_newline(strings) {
                return Ok(());
            }
        }

        if let Some(cap) = self.capacity
            && self.data.len() >= cap
        {
            return Err(Error::Bounds {
                what: "output stream",
                limit: cap,
            });
        }
        self.data.push(value);

        let just_pushed = self.data.last().unwrap();
        if matches!(just_pushed, Value::Glue | Value::FuncEnd) {
            self.trim_trailing_whitespace(strings);
        }
        Ok(())
    }

    /// Walks backwards from the tail: drop the newline outright if the
    /// preceding run is newlines/glue, or whitespace-only strings bounded
    /// by function markers, or if the tail is a `func_start` (function
    /// start trimming).
    fn suppress_newline(&self, strings: &StringTable) -> bool {
        if matches!(self.data.last(), Some(Value::FuncStart)) {
            return true;
        }
        for v in self.data.iter().rev() {
            match v {
                Value::Newline | Value::Glue => return true,
                Value::Str(_) if is_blank_string(v, strings) => {}
                Value::FuncStart | Value::FuncEnd => {}
                _ => return false,
            }
        }
        false
    }

    /// Nullifies (replaces with `Value::Null`) trailing newlines and
    /// whitespace-only strings behind the just-appended glue/func_end,
    /// stopping at the first non-trimmable entry. Balances nested
    /// `func_end`/`func_start` pairs so a function's own trimming doesn't
    /// reach past its start.
    fn trim_trailing_whitespace(&mut self, strings: &StringTable) {
        if self.data.len() < 2 {
            return;
        }
        let mut i = self.data.len() - 2;
        let mut func_end_depth = 0i32;
        loop {
            match &self.data[i] {
                Value::Newline => self.data[i] = Value::Null,
                Value::Str(_) if is_blank_string(&self.data[i], strings) => {
                    self.data[i] = Value::Null;
                }
                Value::FuncEnd => func_end_depth += 1,
                Value::FuncStart if func_end_depth > 0 => func_end_depth -= 1,
                _ => break,
            }
            if i == 0 {
                break;
            }
            i -= 1;
        }
    }

    /// Index of the most recent `marker`, or `0` if none. Bounds-checks
    /// against an active save point rather than asserting, turning the
    /// original's fatal "start below save" assertion into a typed error
    /// (Open Question 2, resolved).
    fn find_start(&self) -> Result<usize> {
        let mut start = self.data.len();
        while start > 0 {
            start -= 1;
            if matches!(self.data[start], Value::Marker) {
                break;
            }
        }
        if let Some(save) = self.save
            && start < save
        {
            return Err(Error::StreamMisuse(
                "output stream read crossed below an active save point",
            ));
        }
        Ok(start)
    }

    /// Assemble the stream from its most recent marker into a cleaned
    /// line, truncating the stream back to that marker. `remove_tail`
    /// strips a single trailing space (the original's `RemoveTail`
    /// template parameter).
    pub fn get_line(
        &mut self,
        remove_tail: bool,
        lists: &ListTable,
        strings: &StringTable,
    ) -> Result<String> {
        let start = self.find_start()?;
        let mut raw = String::new();
        let mut has_glue = false;
        let mut last_newline = false;
        for i in start..self.data.len() {
            if should_skip(&self.data[i], &mut has_glue, &mut last_newline, strings) {
                continue;
            }
            if self.data[i].is_printable() {
                raw.push_str(&stringify(&self.data[i], lists, strings));
            }
        }
        self.data.truncate(start);

        let cleaned = clean_string(&raw);
        if cleaned.is_empty() {
            self.last_char = None;
            return Ok(cleaned);
        }
        let last = cleaned.chars().last().unwrap();
        self.last_char = Some(last);
        if remove_tail && last == ' ' {
            Ok(cleaned[..cleaned.len() - 1].to_string())
        } else {
            Ok(cleaned)
        }
    }

    /// Assemble everything from `from` to the tail into a cleaned string,
    /// intern it, and truncate the stream back to `from`. Used when a
    /// `function` frame returns: its accumulated output becomes a single
    /// string value pushed onto the evaluation stack rather than staying
    /// on the stream.
    pub fn collect_suffix_as_string(
        &mut self,
        from: usize,
        lists: &ListTable,
        strings: &mut StringTable,
    ) -> Result<crate::string_table::StringId> {
        let mut raw = String::new();
        let mut has_glue = false;
        let mut last_newline = false;
        for i in from..self.data.len() {
            if should_skip(&self.data[i], &mut has_glue, &mut last_newline, strings) {
                continue;
            }
            if self.data[i].is_printable() {
                raw.push_str(&stringify(&self.data[i], lists, strings));
            }
        }
        self.data.truncate(from);
        strings.create(clean_string(&raw))
    }

    /// The character the last [`Self::get_line`] call ended on, used to
    /// decide whether two consecutive lines need a separating space
    /// inserted between them when both end/begin on word characters.
    pub fn last_char(&self) -> Option<char> {
        self.last_char
    }

    /// Open a save checkpoint. Only one may be active at a time; a second
    /// `save` while one is active is a misuse error, matching §4.2.
    pub fn save(&mut self) -> Result<StreamCheckpoint<'_>> {
        if self.save.is_some() {
            return Err(Error::StreamMisuse("save() called while a save point is already active"));
        }
        self.save = Some(self.data.len());
        Ok(StreamCheckpoint {
            stream: self,
            committed: false,
        })
    }

    fn restore(&mut self) {
        if let Some(save) = self.save {
            self.data.truncate(save);
        }
        self.save = None;
    }

    fn forget(&mut self) {
        self.save = None;
    }

    /// Whether any printable, non-whitespace content has been appended
    /// since the active save point.
    pub fn text_past_save(&self, strings: &StringTable) -> bool {
        let Some(save) = self.save else { return false };
        self.data[save..].iter().any(|v| match v {
            Value::Str(_) => !is_blank_string(v, strings),
            Value::Null => false,
            other => other.is_printable(),
        })
    }

    /// Mark every interned string and list handle reachable from this
    /// stream. One of the GC roots walked by a mark/sweep pass, alongside
    /// globals, the eval stack, and callstack scope locals.
    pub fn mark_used(&self, strings: &mut StringTable, lists: &mut ListTable) {
        for v in &self.data {
            crate::value::mark_reachable(v, strings, lists);
        }
    }

    /// Raw values currently buffered, in order. Used by the snapshot
    /// writer and by tests.
    pub fn values(&self) -> &[Value] {
        &self.data
    }

    /// Offset of the active save point, or `None` if no save is active.
    /// Used by the snapshot writer.
    pub fn save_offset(&self) -> Option<usize> {
        self.save
    }

    /// Rebuild a stream from its raw parts, as written by
    /// [`OutputStream::values`], [`OutputStream::last_char`], and
    /// [`OutputStream::save_offset`]. Used only by the snapshot loader.
    /// Built by the snapshot loader with no capacity of its own; the
    /// executioner reapplies whatever capacity its own construction set
    /// via [`OutputStream::set_capacity`] right after.
    pub fn from_snapshot(data: Vec<Value>, last_char: Option<char>, save: Option<usize>) -> Self {
        Self {
            data,
            save,
            last_char,
            capacity: None,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }
}

impl Default for OutputStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a value is a string whose resolved content is empty or made up
/// entirely of whitespace. Non-string values are never blank in this sense.
fn is_blank_string(v: &Value, strings: &StringTable) -> bool {
    match v {
        Value::Str(crate::value::StringRef::Interned(id)) => strings
            .get(*id)
            .map(|s| s.chars().all(char::is_whitespace))
            .unwrap_or(false),
        // Constant-pool strings come from story content and are never
        // whitespace-only in practice; trimming only ever needs to reach
        // through runtime-interned strings (e.g. an inserted variable that
        // evaluated to an empty string).
        Value::Str(crate::value::StringRef::Constant(_)) => false,
        _ => false,
    }
}

/// Maintains `has_glue`/`last_newline` across a forward scan: collapses
/// runs of newlines, drops a newline following glue, and treats
/// whitespace-only strings as non-glue-breaking (matching the original's
/// `should_skip`). Non-string/non-newline printable values always clear
/// both flags.
fn should_skip(
    value: &Value,
    has_glue: &mut bool,
    last_newline: &mut bool,
    strings: &StringTable,
) -> bool {
    match value {
        Value::Newline => {
            if *last_newline || *has_glue {
                return true;
            }
            *last_newline = true;
            false
        }
        Value::Glue => {
            *has_glue = true;
            false
        }
        Value::Str(_) => {
            if !is_blank_string(value, strings) {
                *last_newline = false;
                *has_glue = false;
            }
            false
        }
        other if other.is_printable() => {
            *last_newline = false;
            *has_glue = false;
            false
        }
        _ => false,
    }
}

/// Collapse internal runs of spaces to one, strip leading whitespace.
/// Trailing-space removal is the caller's job (`remove_tail`).
fn clean_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = true; // treat the start as "after a space" to strip leading whitespace
    for c in raw.chars() {
        if c == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
            out.push(' ');
        } else {
            last_was_space = false;
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StringRef;

    fn interned(strings: &mut StringTable, text: &str) -> Value {
        Value::Str(StringRef::Interned(strings.create(text.to_string()).unwrap()))
    }

    #[test]
    fn repeated_newlines_collapse_to_one() {
        let mut stream = OutputStream::new();
        let lists = ListTable::new();
        let mut strings = StringTable::new();
        let hi = interned(&mut strings, "hi");
        let there = interned(&mut strings, "there");

        stream.append(Value::Marker, &strings).unwrap();
        stream.append(hi, &strings).unwrap();
        stream.append(Value::Newline, &strings).unwrap();
        stream.append(Value::Newline, &strings).unwrap();
        stream.append(Value::Newline, &strings).unwrap();
        stream.append(there, &strings).unwrap();

        let line = stream.get_line(true, &lists, &strings).unwrap();
        assert_eq!(line, "hi\nthere");
    }

    #[test]
    fn glue_suppresses_the_newline_it_straddles() {
        let mut stream = OutputStream::new();
        let lists = ListTable::new();
        let mut strings = StringTable::new();
        let hi = interned(&mut strings, "hi");
        let there = interned(&mut strings, "there");

        stream.append(Value::Marker, &strings).unwrap();
        stream.append(hi, &strings).unwrap();
        stream.append(Value::Newline, &strings).unwrap();
        stream.append(Value::Glue, &strings).unwrap();
        stream.append(there, &strings).unwrap();

        let line = stream.get_line(true, &lists, &strings).unwrap();
        assert_eq!(line, "hithere");
    }

    #[test]
    fn save_restore_round_trips_to_prior_state() {
        let mut stream = OutputStream::new();
        let strings = StringTable::new();
        stream.append(Value::Marker, &strings).unwrap();
        let before = stream.len();
        {
            let _checkpoint = stream.save().unwrap();
            stream.append(Value::Newline, &strings).unwrap();
        }
        assert_eq!(stream.len(), before);
    }

    #[test]
    fn text_past_save_tracks_nonblank_content() {
        let mut stream = OutputStream::new();
        let mut strings = StringTable::new();
        stream.append(Value::Marker, &strings).unwrap();
        let checkpoint = stream.save().unwrap();
        assert!(!checkpoint.text_past_save(&strings));
        let word = interned(&mut strings, "word");
        checkpoint.stream.append(word, &strings).unwrap();
        assert!(checkpoint.text_past_save(&strings));
    }

    #[test]
    fn double_save_is_misuse() {
        let mut stream = OutputStream::new();
        let _first = stream.save().unwrap();
        let err = stream.save().unwrap_err();
        assert!(matches!(err, Error::StreamMisuse(_)));
    }

    #[test]
    fn clean_string_collapses_internal_spaces() {
        assert_eq!(clean_string("  a   b  "), " a b ");
    }
}
