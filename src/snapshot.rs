//! Byte-exact serializer/deserializer for a [`Runner`]'s full state.
//!
//! Section order is fixed, per the data model's snapshot blob layout:
//! magic + version, string table, list table, globals, per-runner state.
//! The list table section is not named explicitly in the abstract data
//! model but is required for the round-trip invariant to actually hold —
//! list values serialized elsewhere as handles are meaningless without
//! the arena and flag-name metadata they index into.
//!
//! Strings are rebuilt first, producing an ordinal-indexed table; every
//! string-typed value elsewhere in the blob is then resolved through that
//! table by ordinal rather than by its live handle, matching the
//! "string-typed values store the string-table ordinal, not the pointer"
//! rule — a live `StringId` can have gaps after a GC sweep, but the
//! ordinal a string occupies in save order never does. List handles carry
//! their own explicit id alongside their bits, since the list arena is
//! likewise GC-managed and can no longer be assumed dense.
//!
//! The primitive reader/writer and the per-[`Value`] tag encoding are
//! shared with the compiled story image parser via [`crate::codec`]; this
//! module only adds the string-ordinal remapping its own round-trip
//! invariant needs on top of that shared codec.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bytecode::Image;
use crate::callstack::{CallStack, Frame};
use crate::codec::{self, Reader, Writer};
use crate::error::{Error, Result};
use crate::executioner::ChoiceRecord;
use crate::globals::Globals;
use crate::list_table::ListTable;
use crate::runner::{Limits, Runner, State};
use crate::stream::OutputStream;
use crate::string_table::{StringId, StringTable};
use crate::value::{StringRef, Value};

const MAGIC: u32 = 0x494e_4b31; // "INK1"
const VERSION: u16 = 1;

/// Serialize a runner's full state (globals, string/list tables, and the
/// executioner's own ip/callstack/eval-stack/output-stream) to a byte blob.
pub fn save(runner: &Runner) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(MAGIC);
    w.u16(VERSION);

    let globals = runner.globals();
    write_strings(&mut w, &globals.strings);
    write_lists(&mut w, &globals.lists);
    write_globals_bookkeeping(&mut w, globals);
    write_runner_state(&mut w, runner);

    w.finish()
}

/// Rebuild a runner from a blob written by [`save`]. The image and limits
/// are supplied by the caller, matching how [`Runner::new`] works — a
/// snapshot captures mutable state, not the read-only story image.
pub fn load(image: Arc<Image>, limits: Limits, bytes: &[u8]) -> Result<Runner> {
    let mut r = Reader::new(bytes);
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(Error::Format(format!("bad snapshot magic {magic:#x}")));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(Error::Format(format!("unsupported snapshot version {version}")));
    }

    let strings = read_strings(&mut r)?;
    let lists = read_lists(&mut r)?;

    let mut runner = Runner::new(image, limits);
    {
        let globals = runner.globals_mut();
        globals.strings = strings;
        globals.lists = lists;
    }
    read_globals_bookkeeping(&mut r, runner.globals_mut())?;
    read_runner_state(&mut r, &mut runner)?;

    Ok(runner)
}

fn write_strings(w: &mut Writer, strings: &StringTable) {
    for (_, content) in strings.iter_in_order() {
        w.cstring(content);
    }
    w.end_cstring_section();
}

fn read_strings(r: &mut Reader) -> Result<StringTable> {
    let mut table = StringTable::new();
    while let Some(s) = r.cstring()? {
        table.create(s)?;
    }
    Ok(table)
}

fn write_lists(w: &mut Writer, lists: &ListTable) {
    let defs = lists.declared_lists();
    w.u16(defs.len() as u16);
    for (name, flag_names) in defs {
        w.cstring(name);
        w.u16(flag_names.len() as u16);
        for flag_name in flag_names {
            w.cstring(flag_name);
        }
    }
    w.end_cstring_section();

    let values = lists.raw_values();
    w.u32(values.len() as u32);
    for (id, bits, origins) in values {
        w.u32(id);
        w.u16(bits.len() as u16);
        for word in bits {
            w.u64(*word);
        }
        w.u16(origins.len() as u16);
        for origin in origins {
            w.i16(*origin);
        }
    }
}

fn read_lists(r: &mut Reader) -> Result<ListTable> {
    let list_count = r.u16()?;
    let mut defs = Vec::with_capacity(list_count as usize);
    for _ in 0..list_count {
        let name = r
            .cstring()?
            .ok_or_else(|| Error::Format("list table section ended early".into()))?;
        let flag_count = r.u16()?;
        let mut flag_names = Vec::with_capacity(flag_count as usize);
        for _ in 0..flag_count {
            flag_names.push(
                r.cstring()?
                    .ok_or_else(|| Error::Format("list flag-name section ended early".into()))?,
            );
        }
        defs.push((name, flag_names));
    }
    // Consume the end-of-section marker that follows the fixed-count loop.
    if r.cstring()?.is_some() {
        return Err(Error::Format("expected end of list declarations".into()));
    }

    let value_count = r.u32()?;
    let mut values = Vec::with_capacity(value_count as usize);
    for _ in 0..value_count {
        let id = r.u32()?;
        let word_count = r.u16()?;
        let mut bits = Vec::with_capacity(word_count as usize);
        for _ in 0..word_count {
            bits.push(r.u64()?);
        }
        let origin_count = r.u16()?;
        let mut origins = Vec::with_capacity(origin_count as usize);
        for _ in 0..origin_count {
            origins.push(r.i16()?);
        }
        values.push((id, bits, origins));
    }
    Ok(ListTable::from_snapshot(defs, values))
}

fn write_globals_bookkeeping(w: &mut Writer, globals: &Globals) {
    let vars: Vec<_> = globals.iter_vars().collect();
    w.u32(vars.len() as u32);
    for (hash, value) in vars {
        w.u64(hash);
        write_value(w, value, &globals.strings);
    }

    let visits: Vec<_> = globals.iter_visits().collect();
    w.u32(visits.len() as u32);
    for (container_id, count) in visits {
        w.u64(container_id);
        w.u32(count);
    }

    let last_visit: Vec<_> = globals.iter_last_visit_turn().collect();
    w.u32(last_visit.len() as u32);
    for (container_id, turn) in last_visit {
        w.u64(container_id);
        w.u32(turn);
    }

    w.u32(globals.turn_counter());
}

fn read_globals_bookkeeping(r: &mut Reader, globals: &mut Globals) -> Result<()> {
    let var_count = r.u32()?;
    let mut vars = HashMap::with_capacity(var_count as usize);
    for _ in 0..var_count {
        let hash = r.u64()?;
        let value = read_value(r)?;
        vars.insert(hash, value);
    }

    let visit_count = r.u32()?;
    let mut visits = HashMap::with_capacity(visit_count as usize);
    for _ in 0..visit_count {
        let container_id = r.u64()?;
        let count = r.u32()?;
        visits.insert(container_id, count);
    }

    let last_visit_count = r.u32()?;
    let mut last_visit_turn = HashMap::with_capacity(last_visit_count as usize);
    for _ in 0..last_visit_count {
        let container_id = r.u64()?;
        let turn = r.u32()?;
        last_visit_turn.insert(container_id, turn);
    }

    let turn_counter = r.u32()?;
    globals.restore_bookkeeping(vars, visits, last_visit_turn, turn_counter);
    Ok(())
}

fn write_runner_state(w: &mut Writer, runner: &Runner) {
    let exec = runner.executioner();
    let strings = &runner.globals().strings;

    w.u32(exec.ip());

    let frames = exec.callstack().frames();
    w.u32(frames.len() as u32);
    for frame in frames {
        w.u32(frame.return_ip);
        w.u8(codec::frame_kind_tag(frame.kind));
        w.u64(frame.container_id);
        w.u32(frame.stream_baseline as u32);
        w.u32(frame.eval_stack_baseline as u32);
        let scopes = frame.scopes_for_snapshot();
        w.u16(scopes.len() as u16);
        for scope in scopes {
            w.u16(scope.len() as u16);
            for (name, value) in scope {
                w.cstring(&name);
                write_value(w, &value, strings);
            }
        }
    }

    let eval_stack = exec.eval_stack();
    w.u32(eval_stack.len() as u32);
    for value in eval_stack {
        write_value(w, value, strings);
    }

    let stream = exec.stream();
    match stream.last_char() {
        Some(c) => {
            w.bool(true);
            w.u32(c as u32);
        }
        None => w.bool(false),
    }
    match stream.save_offset() {
        Some(offset) => {
            w.bool(true);
            w.u32(offset as u32);
        }
        None => w.bool(false),
    }
    let stream_values = stream.values();
    w.u32(stream_values.len() as u32);
    for value in stream_values {
        write_value(w, value, strings);
    }

    w.u64(exec.current_container());
    w.u64(exec.rng_seed());
    w.u64(exec.instruction_count());

    w.u32(exec.global_tags().len() as u32);
    for tag in exec.global_tags() {
        w.cstring(tag);
    }

    let knot_tag_entries: Vec<_> = exec.all_knot_tags().collect();
    w.u32(knot_tag_entries.len() as u32);
    for (id, tags) in &knot_tag_entries {
        w.u64(*id);
        w.u32(tags.len() as u32);
        for tag in *tags {
            w.cstring(tag);
        }
    }

    w.bool(exec.at_knot_start());
    w.bool(exec.seen_first_divert());

    w.u8(runner_state_tag(runner.state()));
    let choices = runner.pending_choices();
    w.u32(choices.len() as u32);
    for choice in choices {
        w.cstring(&choice.text);
        w.u32(choice.target_ip);
        w.bool(choice.is_invisible_default);
        w.bool(choice.is_once_only);
    }

    let last_line_tags = runner.last_line_tags();
    w.u32(last_line_tags.len() as u32);
    for tag in last_line_tags {
        w.cstring(tag);
    }
}

fn read_runner_state(r: &mut Reader, runner: &mut Runner) -> Result<()> {
    let ip = r.u32()?;

    let frame_count = r.u32()?;
    let mut frames = Vec::with_capacity(frame_count as usize);
    for _ in 0..frame_count {
        let return_ip = r.u32()?;
        let kind = codec::frame_kind_from_tag(r.u8()?)?;
        let container_id = r.u64()?;
        let stream_baseline = r.u32()? as usize;
        let eval_stack_baseline = r.u32()? as usize;
        let scope_count = r.u16()?;
        let mut scopes = Vec::with_capacity(scope_count as usize);
        for _ in 0..scope_count {
            let var_count = r.u16()?;
            let mut vars = Vec::with_capacity(var_count as usize);
            for _ in 0..var_count {
                let name = r
                    .cstring()?
                    .ok_or_else(|| Error::Format("frame scope section ended early".into()))?;
                let value = read_value(r)?;
                vars.push((name, value));
            }
            scopes.push(vars);
        }
        frames.push(Frame::from_snapshot(return_ip, kind, container_id, stream_baseline, eval_stack_baseline, scopes));
    }
    let callstack = CallStack::from_frames(frames);

    let eval_count = r.u32()?;
    let mut eval_stack = Vec::with_capacity(eval_count as usize);
    for _ in 0..eval_count {
        eval_stack.push(read_value(r)?);
    }

    let has_last_char = r.bool()?;
    let last_char = if has_last_char {
        Some(char::from_u32(r.u32()?).ok_or_else(|| Error::Format("invalid last_char codepoint".into()))?)
    } else {
        None
    };
    let has_save = r.bool()?;
    let save = if has_save { Some(r.u32()? as usize) } else { None };
    let stream_value_count = r.u32()?;
    let mut stream_values = Vec::with_capacity(stream_value_count as usize);
    for _ in 0..stream_value_count {
        stream_values.push(read_value(r)?);
    }
    let stream = OutputStream::from_snapshot(stream_values, last_char, save);

    let current_container = r.u64()?;
    let rng_seed = r.u64()?;
    let instruction_count = r.u64()?;

    let global_tag_count = r.u32()?;
    let mut global_tags = Vec::with_capacity(global_tag_count as usize);
    for _ in 0..global_tag_count {
        global_tags.push(r.cstring()?.ok_or_else(|| Error::Format("global tag section ended early".into()))?);
    }

    let knot_tag_entry_count = r.u32()?;
    let mut knot_tags = HashMap::with_capacity(knot_tag_entry_count as usize);
    for _ in 0..knot_tag_entry_count {
        let id = r.u64()?;
        let tag_count = r.u32()?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            tags.push(r.cstring()?.ok_or_else(|| Error::Format("knot tag section ended early".into()))?);
        }
        knot_tags.insert(id, tags);
    }

    // `current_line_tags` is drained per completed line and never observed
    // mid-snapshot in practice (a save point sits between lines, per the
    // resource model's "GC is initiated only from a safe point between
    // lines" rule); an empty vec here is always correct for that case.
    let current_line_tags = Vec::new();
    let at_knot_start = r.bool()?;
    let seen_first_divert = r.bool()?;

    runner.executioner_mut().restore_from_snapshot(
        ip,
        eval_stack,
        callstack,
        stream,
        current_container,
        rng_seed,
        instruction_count,
        global_tags,
        knot_tags,
        current_line_tags,
        at_knot_start,
        seen_first_divert,
    );

    let state = runner_state_from_tag(r.u8()?)?;
    let choice_count = r.u32()?;
    let mut choices = Vec::with_capacity(choice_count as usize);
    for _ in 0..choice_count {
        let text = r.cstring()?.ok_or_else(|| Error::Format("choice section ended early".into()))?;
        let target_ip = r.u32()?;
        let is_invisible_default = r.bool()?;
        let is_once_only = r.bool()?;
        choices.push(ChoiceRecord {
            text,
            target_ip,
            is_invisible_default,
            is_once_only,
        });
    }

    let last_line_tag_count = r.u32()?;
    let mut last_line_tags = Vec::with_capacity(last_line_tag_count as usize);
    for _ in 0..last_line_tag_count {
        last_line_tags.push(r.cstring()?.ok_or_else(|| Error::Format("last-line tag section ended early".into()))?);
    }

    runner.restore_control_state(state, choices, last_line_tags);

    Ok(())
}

fn runner_state_tag(state: State) -> u8 {
    match state {
        State::Ready => 0,
        State::Running => 1,
        State::AtChoice => 2,
        State::AtEnd => 3,
        State::Errored => 4,
    }
}

fn runner_state_from_tag(tag: u8) -> Result<State> {
    match tag {
        0 => Ok(State::Ready),
        1 => Ok(State::Running),
        2 => Ok(State::AtChoice),
        3 => Ok(State::AtEnd),
        4 => Ok(State::Errored),
        other => Err(Error::Format(format!("unknown runner state tag {other}"))),
    }
}

/// Like [`codec::write_value`], but rewrites an interned string handle to
/// its ordinal in `strings` first — the live handle can have gaps after a
/// GC sweep, but the position a string occupies in save order never does,
/// so the ordinal is what [`read_value`] must see to land on the right
/// entry once [`read_strings`] rebuilds a dense table from scratch.
fn write_value(w: &mut Writer, value: &Value, strings: &StringTable) {
    if let Value::Str(StringRef::Interned(id)) = value {
        let ordinal = strings.get_ordinal(*id).unwrap_or(id.0);
        w.u8(6);
        w.u32(ordinal);
        return;
    }
    codec::write_value(w, value);
}

/// Inverse of [`write_value`]. No remapping needed on the way back in: the
/// table [`read_strings`] just built assigns ids sequentially in the same
/// order the ordinals were written in, so an ordinal and a freshly
/// rebuilt [`StringId`] coincide.
fn read_value(r: &mut Reader) -> Result<Value> {
    codec::read_value(r).map(|v| match v {
        Value::Str(StringRef::Interned(StringId(ordinal))) => Value::Str(StringRef::Interned(StringId(ordinal))),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Command, ContainerMeta};

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
    fn round_trips_a_fresh_runner() {
        let mut runner = Runner::new(hello_image(), Limits::new());
        runner.set_var("score", Value::Int(9));
        let blob = save(&runner);

        let restored = load(hello_image(), Limits::new(), &blob).unwrap();
        assert_eq!(restored.get_var("score"), Value::Int(9));
        assert_eq!(restored.state(), State::Ready);
    }

    #[test]
    fn round_trips_mid_story_after_one_line() {
        let mut runner = Runner::new(hello_image(), Limits::new());
        let line = runner.getline().unwrap();
        assert_eq!(line.text, "hello");

        let blob = save(&runner);
        let mut restored = load(hello_image(), Limits::new(), &blob).unwrap();
        assert_eq!(restored.state(), State::Ready);
        assert!(!restored.can_continue());
    }

    #[test]
    fn rejects_a_bad_magic_number() {
        let err = load(hello_image(), Limits::new(), &[0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn interned_strings_survive_a_round_trip() {
        let mut runner = Runner::new(hello_image(), Limits::new());
        let id = runner.globals_mut().strings.create("greeting".into()).unwrap();
        runner.set_var("s", Value::Str(StringRef::Interned(id)));
        let blob = save(&runner);

        let restored = load(hello_image(), Limits::new(), &blob).unwrap();
        match restored.get_var("s") {
            Value::Str(StringRef::Interned(restored_id)) => {
                assert_eq!(restored.globals().strings.get(restored_id), Some("greeting"));
            }
            other => panic!("expected an interned string, got {other:?}"),
        }
    }

    #[test]
    fn interned_strings_survive_a_round_trip_after_a_gc_sweep() {
        // Build up a gap in the live string ids (a dropped, unmarked entry)
        // before the one we keep, so `StringId` and save-order ordinal
        // diverge. Only the ordinal remapping keeps this round-tripping.
        let mut runner = Runner::new(hello_image(), Limits::new());
        {
            let globals = runner.globals_mut();
            let _dropped = globals.strings.create("dropped".into()).unwrap();
            let kept = globals.strings.create("kept".into()).unwrap();
            globals.strings.clear_usage();
            globals.strings.mark_used(kept);
            globals.strings.gc();
            runner.set_var("s", Value::Str(StringRef::Interned(kept)));
        }

        let blob = save(&runner);
        let restored = load(hello_image(), Limits::new(), &blob).unwrap();
        match restored.get_var("s") {
            Value::Str(StringRef::Interned(restored_id)) => {
                assert_eq!(restored.globals().strings.get(restored_id), Some("kept"));
            }
            other => panic!("expected an interned string, got {other:?}"),
        }
    }
}
