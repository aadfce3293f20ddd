use std::time::Duration;

use calcsheet_document::{
    apply_query_overrides, DocumentError, EditOp, GraphDocument, HistoryError,
};
use calcsheet_model::{
    Connection, Field, Node, NodeBody, NodeId, Port, Position, Rect, SheetId, SocketKind,
    VersionId, VersionSnapshot,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn constant(id: &str, value: &str, x: f64) -> Node {
    Node::with_id(
        id,
        id,
        Position::new(x, 0.0),
        NodeBody::Constant {
            value: value.into(),
        },
    )
}

fn input(id: &str, label: &str) -> Node {
    Node::with_id(
        id,
        label,
        Position::new(0.0, 100.0),
        NodeBody::Input {
            value: "1".into(),
            override_value: None,
            socket: SocketKind::Number,
        },
    )
}

fn output(id: &str, x: f64) -> Node {
    Node::with_id(
        id,
        id,
        Position::new(x, 200.0),
        NodeBody::Output {
            socket: SocketKind::Any,
        },
    )
}

fn function(id: &str) -> Node {
    Node::with_id(
        id,
        id,
        Position::new(300.0, 0.0),
        NodeBody::Function {
            code: "y = x * 2".into(),
        },
    )
    .with_ports(vec![Port::any("x")], vec![Port::any("y")])
}

fn wire(source: &str, out: &str, target: &str, input: &str) -> Connection {
    Connection::new(source, out, target, input)
}

fn sample() -> GraphDocument {
    let mut doc = GraphDocument::new();
    doc.load(
        SheetId::new("sheet"),
        vec![
            constant("c1", "2", 0.0),
            input("i1", "x"),
            function("f1"),
            output("o1", 0.0),
            output("o2", 100.0),
        ],
        vec![
            wire("c1", "value", "f1", "x"),
            wire("f1", "y", "o1", "value"),
            wire("i1", "value", "o2", "value"),
        ],
    )
    .unwrap();
    doc
}

fn id(s: &str) -> NodeId {
    NodeId::new(s)
}

#[test]
fn drag_with_many_frames_is_one_history_entry() {
    let mut doc = sample();
    let before = doc.change_generation();

    doc.begin_drag(&id("c1")).unwrap();
    for step in 1..=40 {
        doc.drag_to(step as f64, step as f64 / 2.0).unwrap();
    }
    assert!(doc.end_drag().unwrap());

    assert_eq!(doc.history().undo_len(), 1);
    assert_eq!(doc.change_generation(), before + 1);
    assert_eq!(doc.node(&id("c1")).unwrap().position, Position::new(40.0, 20.0));

    doc.undo().unwrap();
    assert_eq!(doc.node(&id("c1")).unwrap().position, Position::new(0.0, 0.0));
}

#[test]
fn drag_ending_where_it_started_records_nothing() {
    let mut doc = sample();
    doc.begin_drag(&id("c1")).unwrap();
    doc.drag_to(15.0, 15.0).unwrap();
    doc.drag_to(0.0, 0.0).unwrap();
    assert!(!doc.end_drag().unwrap());
    assert!(!doc.history().can_undo());
    assert_eq!(doc.end_drag(), Err(DocumentError::NoDragInProgress));
}

#[test]
fn dragging_a_selected_node_moves_the_whole_selection() {
    let mut doc = sample();
    doc.select(id("o1"), false);
    doc.select(id("o2"), true);

    doc.begin_drag(&id("o2")).unwrap();
    doc.drag_to(10.0, -10.0).unwrap();
    doc.end_drag().unwrap();

    assert_eq!(doc.node(&id("o1")).unwrap().position, Position::new(10.0, 190.0));
    assert_eq!(doc.node(&id("o2")).unwrap().position, Position::new(110.0, 190.0));
    assert_eq!(doc.history().undo_len(), 1);
}

#[test]
fn no_op_value_commit_records_nothing_and_does_not_signal() {
    let mut doc = sample();
    let generation = doc.change_generation();

    let mut draft = doc.begin_value_edit(&id("c1"), Field::Value).unwrap();
    draft.set_text("23");
    draft.set_text("2");
    assert!(!doc.commit_value_edit(draft).unwrap());

    assert!(!doc.history().can_undo());
    assert_eq!(doc.change_generation(), generation);
    assert!(!doc.is_dirty());
}

#[test]
fn value_draft_commits_once_per_edit() {
    let mut doc = sample();
    let mut draft = doc.begin_value_edit(&id("c1"), Field::Value).unwrap();
    for text in ["1", "12", "123"] {
        draft.set_text(text);
    }
    assert_eq!(doc.node(&id("c1")).unwrap().field(Field::Value).unwrap(), "2");

    assert!(doc.commit_value_edit(draft).unwrap());
    assert_eq!(doc.history().undo_len(), 1);
    assert_eq!(doc.node(&id("c1")).unwrap().field(Field::Value).unwrap(), "123");
    assert!(doc.is_dirty());
}

#[test]
fn read_only_rejects_edits_and_history_steps() {
    let mut doc = sample();
    doc.set_label(&id("c1"), "renamed").unwrap();
    doc.set_read_only(true);

    assert_eq!(doc.set_label(&id("c1"), "again"), Err(DocumentError::ReadOnly));
    assert_eq!(doc.add_node(constant("c2", "0", 0.0)), Err(DocumentError::ReadOnly));
    assert_eq!(doc.remove_node(&id("c1")), Err(DocumentError::ReadOnly));
    assert_eq!(doc.begin_drag(&id("c1")), Err(DocumentError::ReadOnly));
    assert_eq!(doc.undo(), Err(DocumentError::ReadOnly));
    assert_eq!(doc.node(&id("c1")).unwrap().label, "renamed");

    // Suppressed mutations are how a read-only view receives content.
    let changed = doc.suppressed(|d| d.set_value(&id("i1"), Field::Override, "9"));
    assert_eq!(changed, Ok(true));
    assert_eq!(doc.history().undo_len(), 1);
}

#[test]
fn entering_read_only_cancels_a_drag() {
    let mut doc = sample();
    doc.begin_drag(&id("c1")).unwrap();
    doc.drag_to(50.0, 50.0).unwrap();
    doc.set_read_only(true);
    assert!(!doc.is_dragging());
    assert_eq!(doc.node(&id("c1")).unwrap().position, Position::new(0.0, 0.0));
}

#[test]
fn query_override_lands_before_first_recompute() {
    let mut doc = sample();
    let changed = apply_query_overrides(&mut doc, "?x=123");
    assert_eq!(changed, vec![id("i1")]);
    assert_eq!(doc.node(&id("i1")).unwrap().effective_input_value(), Some("123"));
    assert_eq!(doc.input_overrides().get("x").map(String::as_str), Some("123"));
    assert!(!doc.history().can_undo());
}

#[test]
fn translating_a_multi_selection_is_one_entry() {
    let mut doc = sample();
    let rect = Rect::from_corners(Position::new(-10.0, 190.0), Position::new(200.0, 260.0));
    doc.select_in_rect(rect, false, |n| Rect::from_origin_size(n.position, 50.0, 30.0));
    assert_eq!(doc.selection().len(), 2);

    assert!(doc.translate_selection(5.0, 5.0).unwrap());
    assert_eq!(doc.history().undo_len(), 1);
    assert!(matches!(doc.history().last(), Some(EditOp::Move { moves }) if moves.len() == 2));

    doc.undo().unwrap();
    assert_eq!(doc.node(&id("o1")).unwrap().position, Position::new(0.0, 200.0));
    assert_eq!(doc.node(&id("o2")).unwrap().position, Position::new(100.0, 200.0));
}

#[test]
fn removing_a_node_and_undoing_restores_connections_in_order() {
    let mut doc = sample();
    let nodes = doc.nodes().to_vec();
    let connections = doc.connections().to_vec();

    doc.remove_node(&id("f1")).unwrap();
    assert_eq!(doc.nodes().len(), 4);
    assert_eq!(doc.connections(), &[wire("i1", "value", "o2", "value")]);
    assert_eq!(doc.history().undo_len(), 1);

    doc.undo().unwrap();
    assert_eq!(doc.nodes(), nodes.as_slice());
    assert_eq!(doc.connections(), connections.as_slice());

    doc.redo().unwrap();
    assert!(doc.node(&id("f1")).is_none());
}

#[test]
fn removing_the_selection_clears_it() {
    let mut doc = sample();
    doc.select(id("c1"), false);
    doc.select(id("o1"), true);
    assert_eq!(doc.remove_selected().unwrap(), 2);
    assert!(doc.selection().is_empty());
    assert_eq!(doc.connections(), &[wire("i1", "value", "o2", "value")]);

    doc.undo().unwrap();
    assert_eq!(doc.connections().len(), 3);
}

#[test]
fn connecting_an_occupied_input_replaces_it_in_one_entry() {
    let mut doc = sample();
    assert!(doc.connect(wire("c1", "value", "o2", "value")).unwrap());
    assert_eq!(doc.connections()[2], wire("c1", "value", "o2", "value"));
    assert_eq!(doc.connections().len(), 3);
    assert_eq!(doc.history().undo_len(), 1);

    assert!(!doc.connect(wire("c1", "value", "o2", "value")).unwrap());

    doc.undo().unwrap();
    assert_eq!(doc.connections()[2], wire("i1", "value", "o2", "value"));
}

#[test]
fn renaming_a_port_rewrites_attached_connections() {
    let mut doc = sample();
    assert!(doc
        .rename_port(&id("f1"), calcsheet_model::PortSide::Input, "x", "base")
        .unwrap());
    assert_eq!(doc.connections()[0], wire("c1", "value", "f1", "base"));
    doc.undo().unwrap();
    assert_eq!(doc.connections()[0], wire("c1", "value", "f1", "x"));
}

#[test]
fn undo_past_a_removed_node_prunes_the_selection() {
    let mut doc = sample();
    let added = doc.add_node(constant("c9", "5", 500.0)).unwrap();
    doc.select(added.clone(), false);
    doc.undo().unwrap();
    assert!(!doc.selection().contains(&added));
}

#[test]
fn restoring_a_version_drops_dangling_connections_and_history() {
    let mut doc = sample();
    doc.set_label(&id("c1"), "edited").unwrap();

    let snapshot = VersionSnapshot {
        id: VersionId::new("v1"),
        sheet_id: SheetId::new("sheet"),
        tag: "v1".into(),
        description: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        nodes: vec![constant("c1", "2", 0.0), function("f1")],
    };
    doc.restore_version(&snapshot);

    assert_eq!(doc.nodes().len(), 2);
    assert_eq!(doc.connections(), &[wire("c1", "value", "f1", "x")]);
    assert!(!doc.history().can_undo());
    assert!(!doc.is_dirty());
}

#[test]
fn undo_and_redo_each_signal_a_change_and_dirty_the_document() {
    let mut doc = sample();
    doc.set_label(&id("c1"), "edited").unwrap();
    doc.mark_clean();

    let before_undo = doc.change_generation();
    doc.undo().unwrap();
    assert!(doc.change_generation() > before_undo);
    assert!(doc.is_dirty());

    doc.mark_clean();
    let before_redo = doc.change_generation();
    doc.redo().unwrap();
    assert!(doc.change_generation() > before_redo);
    assert!(doc.is_dirty());
    assert_eq!(doc.node(&id("c1")).unwrap().label, "edited");
}

#[test]
fn removing_a_node_mid_drag_records_its_original_position() {
    let mut doc = sample();
    doc.begin_drag(&id("c1")).unwrap();
    doc.drag_to(50.0, 50.0).unwrap();

    doc.remove_node(&id("c1")).unwrap();
    assert!(!doc.is_dragging());
    assert_eq!(doc.history().undo_len(), 1);

    doc.undo().unwrap();
    assert_eq!(doc.node(&id("c1")).unwrap().position, Position::new(0.0, 0.0));
}

#[test]
fn removing_the_selection_mid_drag_cancels_the_gesture() {
    let mut doc = sample();
    doc.select(id("o1"), false);
    doc.select(id("o2"), true);
    doc.begin_drag(&id("o1")).unwrap();
    doc.drag_to(-30.0, 5.0).unwrap();

    assert_eq!(doc.remove_selected().unwrap(), 2);
    assert!(!doc.is_dragging());

    doc.undo().unwrap();
    assert_eq!(doc.node(&id("o1")).unwrap().position, Position::new(0.0, 200.0));
    assert_eq!(doc.node(&id("o2")).unwrap().position, Position::new(100.0, 200.0));
}

#[test]
fn empty_history_reports_errors() {
    let mut doc = sample();
    assert_eq!(
        doc.undo(),
        Err(DocumentError::History(HistoryError::NoUndoHistory))
    );
    assert_eq!(
        doc.redo(),
        Err(DocumentError::History(HistoryError::NoRedoHistory))
    );
}

#[tokio::test(start_paused = true)]
async fn edit_burst_settles_into_one_change_notification() {
    let mut doc = sample();
    let mut changes = doc.subscribe(Duration::from_millis(250));

    doc.set_label(&id("c1"), "a").unwrap();
    doc.set_label(&id("c1"), "b").unwrap();
    doc.set_value(&id("c1"), Field::Value, "7").unwrap();

    assert_eq!(changes.next_settled().await, Some(3));
    assert!(!changes.has_pending());
}

#[derive(Clone, Debug)]
enum Action {
    Move(usize, i8, i8),
    Label(usize, String),
    Value(String),
    Connect(usize, usize),
    Remove(usize),
    Add,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..8usize, -20i8..20, -20i8..20).prop_map(|(i, dx, dy)| Action::Move(i, dx, dy)),
        (0..8usize, "[a-z]{0,4}").prop_map(|(i, s)| Action::Label(i, s)),
        "[0-9]{1,3}".prop_map(Action::Value),
        (0..3usize, 0..3usize).prop_map(|(s, t)| Action::Connect(s, t)),
        (0..8usize).prop_map(Action::Remove),
        Just(Action::Add),
    ]
}

const SOURCES: [(&str, &str); 3] = [("c1", "value"), ("i1", "value"), ("f1", "y")];
const TARGETS: [(&str, &str); 3] = [("o1", "value"), ("o2", "value"), ("f1", "x")];

fn perform(doc: &mut GraphDocument, step: usize, action: &Action) {
    let pick = |doc: &GraphDocument, i: usize| -> Option<NodeId> {
        let nodes = doc.nodes();
        (!nodes.is_empty()).then(|| nodes[i % nodes.len()].id.clone())
    };
    // Failed edits record nothing; only the resulting state matters here.
    let _ = match action {
        Action::Move(i, dx, dy) => match pick(doc, *i) {
            Some(node) => {
                doc.select(node, false);
                doc.translate_selection(f64::from(*dx), f64::from(*dy))
                    .map(|_| ())
            }
            None => Ok(()),
        },
        Action::Label(i, label) => match pick(doc, *i) {
            Some(node) => doc.set_label(&node, label.clone()).map(|_| ()),
            None => Ok(()),
        },
        Action::Value(value) => doc.set_value(&id("c1"), Field::Value, value.clone()).map(|_| ()),
        Action::Connect(s, t) => {
            let (source, out) = SOURCES[*s];
            let (target, input) = TARGETS[*t];
            doc.connect(wire(source, out, target, input)).map(|_| ())
        }
        Action::Remove(i) => match pick(doc, *i) {
            Some(node) => doc.remove_node(&node),
            None => Ok(()),
        },
        Action::Add => doc
            .add_node(constant(&format!("added{step}"), "0", step as f64))
            .map(|_| ()),
    };
}

proptest! {
    #[test]
    fn undo_all_then_redo_all_round_trips(actions in prop::collection::vec(action(), 1..25)) {
        let mut doc = sample();
        let original_nodes = doc.nodes().to_vec();
        let original_connections = doc.connections().to_vec();

        for (step, action) in actions.iter().enumerate() {
            perform(&mut doc, step, action);
        }
        let final_nodes = doc.nodes().to_vec();
        let final_connections = doc.connections().to_vec();

        let recorded = doc.history().undo_len();
        for _ in 0..recorded {
            doc.undo().unwrap();
        }
        prop_assert_eq!(doc.nodes(), original_nodes.as_slice());
        prop_assert_eq!(doc.connections(), original_connections.as_slice());

        for _ in 0..recorded {
            doc.redo().unwrap();
        }
        prop_assert_eq!(doc.nodes(), final_nodes.as_slice());
        prop_assert_eq!(doc.connections(), final_connections.as_slice());
    }
}
