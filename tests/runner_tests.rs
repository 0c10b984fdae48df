//! End-to-end coverage of the public `Runner` surface: a tiny multi-knot
//! story exercised the way a host embedding this crate actually would,
//! rather than through any one module's white-box tests.

use std::sync::Arc;

use inkrt::{Choice, Command, ContainerMeta, DivertTarget, Image, Limits, Runner, State, Value, name_hash};

/// intro tag (global) -> divert into `knot_a` (knot tag + one line) -> a
/// choice -> divert to a second knot's closing line.
fn branching_story() -> Arc<Image> {
    let knot_a_hash = name_hash("knot_a");
    Arc::new(Image::new(
        vec![
            Command::Tag(0),                                  // 0: global tag, no divert seen yet
            Command::Divert(2),                                // 1: enter knot_a
            Command::Tag(1),                                   // 2: knot_a's own knot-start tag
            Command::LoadConst(2),                             // 3
            Command::AppendToStream,                           // 4
            Command::PushStreamMarker(Value::Newline),         // 5: emits "hello from knot a"
            Command::LoadConst(3),                             // 6
            Command::AppendToStream,                           // 7
            Command::LoadImmediate(Value::Bool(true)),         // 8
            Command::LoadImmediate(Value::Divert(DivertTarget(12))), // 9
            Command::Choice {
                is_invisible_default: false,
                is_once_only: false,
            }, // 10
            Command::Nop, // 11: landing pad so the choice-gather lookahead sees a non-choice
            Command::LoadConst(4), // 12
            Command::AppendToStream, // 13
            Command::PushStreamMarker(Value::Newline), // 14: emits "the end"
            Command::Nop, // 15: runs after the last line so the next `getline` call can discover end-of-story
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
fn a_full_playthrough_surfaces_lines_tags_and_a_choice() {
    let mut runner = Runner::new(branching_story(), Limits::new());
    assert_eq!(runner.state(), State::Ready);

    let line = runner.getline().unwrap();
    assert_eq!(line.text, "hello from knot a");
    // The tag before the divert is global, not attached to this line.
    assert_eq!(runner.num_tags(), 0);
    assert_eq!(runner.num_global_tags(), 1);
    assert_eq!(runner.get_global_tag(0), Some("intro"));
    assert_eq!(runner.num_knot_tags(line.knot), 1);
    assert_eq!(runner.get_knot_tag(line.knot, 0), Some("knot-tag"));

    assert_eq!(runner.globals().visit_count(line.knot), 1);

    // No further line sits between "hello from knot a" and the choice block,
    // so the next `getline` call surfaces the choice stop as an error rather
    // than a line.
    assert!(runner.getline().is_err());
    assert_eq!(runner.state(), State::AtChoice);
    assert_eq!(runner.num_choices(), 1);
    assert_eq!(
        runner.get_choice(0),
        Some(Choice {
            text: "go on".to_string(),
            is_invisible_default: false,
        })
    );

    runner.choose(0).unwrap();
    assert_eq!(runner.globals().turn_counter(), 1);

    let closing = runner.getline().unwrap();
    assert_eq!(closing.text, "the end");
    assert_eq!(runner.state(), State::Ready);

    // One more call runs the trailing no-op and discovers the ip has run off
    // the end of the image, transitioning into the terminal `AtEnd` state.
    assert!(runner.getline().is_err());
    assert_eq!(runner.state(), State::AtEnd);
    assert!(!runner.can_continue());
}

#[test]
fn variable_observers_fire_on_assignment() {
    let mut runner = Runner::new(branching_story(), Limits::new());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    runner.observe("score", Arc::new(move |new, old| seen_clone.lock().unwrap().push((new.clone(), old.cloned()))));

    runner.set_var("score", Value::Int(1));
    runner.set_var("score", Value::Int(2));

    let events = seen.lock().unwrap();
    assert_eq!(*events, vec![(Value::Int(1), None), (Value::Int(2), Some(Value::Int(1)))]);
}

#[test]
fn instruction_limit_is_enforced() {
    let limits = Limits::new().max_instructions(2);
    let mut runner = Runner::new(branching_story(), limits);
    let err = runner.getline().unwrap_err();
    assert_eq!(runner.state(), State::Errored);
    assert!(matches!(err, inkrt::Error::InstructionLimitExceeded(2)));
}
