//! End-to-end snapshot round-trips: save a runner mid-playthrough (at a
//! pending choice, with globals and tags populated) and confirm the
//! restored runner behaves identically to the original from that point on.

use std::sync::Arc;

use inkrt::{Choice, Command, ContainerMeta, DivertTarget, Image, Limits, Runner, State, Value, name_hash, snapshot};

fn branching_story() -> Arc<Image> {
    let knot_a_hash = name_hash("knot_a");
    Arc::new(Image::new(
        vec![
            Command::Tag(0),
            Command::Divert(2),
            Command::Tag(1),
            Command::LoadConst(2),
            Command::AppendToStream,
            Command::PushStreamMarker(Value::Newline),
            Command::LoadConst(3),
            Command::AppendToStream,
            Command::LoadImmediate(Value::Bool(true)),
            Command::LoadImmediate(Value::Divert(DivertTarget(12))),
            Command::Choice {
                is_invisible_default: false,
                is_once_only: false,
            },
            Command::Nop,
            Command::LoadConst(4),
            Command::AppendToStream,
            Command::PushStreamMarker(Value::Newline),
            Command::Nop, // runs after the last line so end-of-story can be discovered on the next call
        ],
        vec![
            "intro".to_string(),
            "knot-tag".to_string(),
            "hello from knot a".to_string(),
            "go on".to_string(),
            "the end".to_string(),
        ],
        vec![ContainerMeta {
            name_hash: knot_a_hash,
            entry_ip: 2,
            visits_tracked: true,
            turns_tracked: false,
        }],
        Vec::new(),
        0,
    ))
}

#[test]
fn a_choice_in_flight_survives_a_save_and_load() {
    let mut runner = Runner::new(branching_story(), Limits::new());
    runner.set_var("score", Value::Int(3));
    let line = runner.getline().unwrap();
    assert_eq!(line.text, "hello from knot a");
    // No further line sits between the knot's line and the choice block.
    assert!(runner.getline().is_err());
    assert_eq!(runner.state(), State::AtChoice);

    let blob = snapshot::save(&runner);
    let mut restored = snapshot::load(branching_story(), Limits::new(), &blob).unwrap();

    assert_eq!(restored.state(), State::AtChoice);
    assert_eq!(restored.get_var("score"), Value::Int(3));
    assert_eq!(restored.num_choices(), 1);
    assert_eq!(
        restored.get_choice(0),
        Some(Choice {
            text: "go on".to_string(),
            is_invisible_default: false,
        })
    );
    assert_eq!(restored.num_knot_tags(line.knot), 1);
    assert_eq!(restored.get_knot_tag(line.knot, 0), Some("knot-tag"));
    assert_eq!(restored.globals().visit_count(line.knot), 1);

    // The restored runner can keep playing exactly like the original would.
    restored.choose(0).unwrap();
    let closing = restored.getline().unwrap();
    assert_eq!(closing.text, "the end");
    assert_eq!(restored.state(), State::Ready);
    assert!(restored.getline().is_err());
    assert_eq!(restored.state(), State::AtEnd);
}

/// A fixed-capacity output stream one line long, followed by three more
/// appends that would overflow a 3-slot stream.
fn overflow_prone_story() -> Arc<Image> {
    Arc::new(Image::new(
        vec![
            Command::LoadConst(0),
            Command::AppendToStream,
            Command::LoadConst(1),
            Command::AppendToStream,
            Command::PushStreamMarker(Value::Newline), // Stop::Line here; stream drains to empty
            Command::LoadConst(2),
            Command::AppendToStream,
            Command::LoadConst(3),
            Command::AppendToStream,
            Command::LoadConst(4),
            Command::AppendToStream, // 3rd post-line append: fills the cap
            Command::LoadConst(5),
            Command::AppendToStream, // 4th: overflows a capacity-3 stream
        ],
        vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into()],
        Vec::new(),
        Vec::new(),
        0,
    ))
}

#[test]
fn a_reloaded_runner_still_enforces_its_output_stream_capacity() {
    let limits = Limits::new().max_output_stream(3);
    let mut runner = Runner::new(overflow_prone_story(), limits);
    let line = runner.getline().unwrap();
    assert_eq!(line.text, "ab");
    assert_eq!(runner.state(), State::Ready);

    let blob = snapshot::save(&runner);
    let mut restored = snapshot::load(overflow_prone_story(), Limits::new().max_output_stream(3), &blob).unwrap();

    let err = restored.getline().unwrap_err();
    assert!(matches!(err, inkrt::Error::Bounds { what: "output stream", limit: 3 }));
}
