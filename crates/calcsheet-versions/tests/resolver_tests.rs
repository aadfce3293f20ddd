use calcsheet_document::{EditOp, GraphDocument};
use calcsheet_model::{
    Connection, Node, NodeBody, NodeId, Port, PortSet, Position, SheetDefinition, SheetId,
    SocketKind, VersionId, VersionSnapshot,
};
use calcsheet_versions::{
    InMemorySheetSource, Recording, ResolveError, SourceError, VersionPortResolver,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

fn input(label: &str) -> Node {
    Node::new(
        label,
        Position::default(),
        NodeBody::Input {
            value: "0".into(),
            override_value: None,
            socket: SocketKind::Number,
        },
    )
}

fn output(label: &str) -> Node {
    Node::new(
        label,
        Position::default(),
        NodeBody::Output {
            socket: SocketKind::Number,
        },
    )
}

fn constant(id: &str) -> Node {
    Node::with_id(
        id,
        id,
        Position::default(),
        NodeBody::Constant { value: "1".into() },
    )
}

fn snapshot(id: &str, nodes: Vec<Node>) -> VersionSnapshot {
    VersionSnapshot {
        id: VersionId::new(id),
        sheet_id: SheetId::new("child"),
        tag: id.into(),
        description: None,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        nodes,
    }
}

fn number_ports(inputs: &[&str], outputs: &[&str]) -> (Vec<Port>, Vec<Port>) {
    (
        inputs.iter().map(|k| Port::new(*k, SocketKind::Number)).collect(),
        outputs.iter().map(|k| Port::new(*k, SocketKind::Number)).collect(),
    )
}

fn reference(version: Option<&str>, inputs: &[&str], outputs: &[&str]) -> Node {
    let (ins, outs) = number_ports(inputs, outputs);
    Node::with_id(
        "ref",
        "child",
        Position::default(),
        NodeBody::Sheet {
            sheet_id: SheetId::new("child"),
            version_id: version.map(VersionId::new),
        },
    )
    .with_ports(ins, outs)
}

fn sink() -> Node {
    Node::with_id(
        "sink",
        "sink",
        Position::default(),
        NodeBody::Output {
            socket: SocketKind::Any,
        },
    )
}

fn source() -> InMemorySheetSource {
    let source = InMemorySheetSource::new();
    source.put_sheet(SheetDefinition {
        id: SheetId::new("child"),
        name: "child".into(),
        nodes: vec![input("a"), input("c"), output("total")],
        connections: vec![],
    });
    source.put_version(snapshot("v1", vec![input("a"), input("b"), output("total")]));
    source.put_version(snapshot("v2", vec![input("a"), output("total")]));
    source
}

fn wired_doc(version: Option<&str>) -> GraphDocument {
    let mut doc = GraphDocument::new();
    doc.load(
        SheetId::new("parent"),
        vec![
            constant("c1"),
            constant("c2"),
            reference(version, &["a", "b"], &["total"]),
            sink(),
        ],
        vec![
            Connection::new("c1", "value", "ref", "a"),
            Connection::new("c2", "value", "ref", "b"),
            Connection::new("ref", "total", "sink", "value"),
        ],
    )
    .unwrap();
    doc
}

fn ref_id() -> NodeId {
    NodeId::new("ref")
}

fn ports(doc: &GraphDocument) -> PortSet {
    PortSet::of(doc.node(&ref_id()).unwrap())
}

#[tokio::test]
async fn pinned_resolution_is_idempotent_and_keeps_wiring() {
    let mut doc = wired_doc(Some("v1"));
    let mut resolver = VersionPortResolver::new(source(), 8);
    let connections = doc.connections().to_vec();
    let before = ports(&doc);

    for _ in 0..3 {
        let changed = resolver
            .resolve(&mut doc, &ref_id(), Recording::Recorded)
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(ports(&doc), before);
        assert_eq!(doc.connections(), connections.as_slice());
    }
    assert!(!doc.history().can_undo());
}

#[tokio::test]
async fn fresh_reference_receives_ports_in_node_order() {
    let mut doc = GraphDocument::new();
    doc.load(SheetId::new("parent"), vec![reference(Some("v1"), &[], &[])], vec![])
        .unwrap();
    let mut resolver = VersionPortResolver::new(source(), 8);

    assert!(resolver
        .resolve(&mut doc, &ref_id(), Recording::Recorded)
        .await
        .unwrap());
    let (inputs, outputs) = number_ports(&["a", "b"], &["total"]);
    assert_eq!(ports(&doc), PortSet { inputs, outputs });

    let first = ports(&doc);
    resolver
        .resolve(&mut doc, &ref_id(), Recording::Recorded)
        .await
        .unwrap();
    assert_eq!(ports(&doc), first);
}

#[tokio::test]
async fn switching_to_a_version_without_a_wired_port_removes_exactly_that_connection() {
    let mut doc = wired_doc(Some("v1"));
    let mut resolver = VersionPortResolver::new(source(), 8);

    assert!(resolver
        .set_target(&mut doc, &ref_id(), Some(VersionId::new("v2")))
        .await
        .unwrap());

    assert_eq!(
        doc.connections(),
        &[
            Connection::new("c1", "value", "ref", "a"),
            Connection::new("ref", "total", "sink", "value"),
        ]
    );
    let (inputs, outputs) = number_ports(&["a"], &["total"]);
    assert_eq!(ports(&doc), PortSet { inputs, outputs });
    assert_eq!(
        doc.node(&ref_id()).unwrap().sheet_target(),
        Some((&SheetId::new("child"), Some(&VersionId::new("v2"))))
    );

    // Target switch and reconciliation are a single entry.
    assert_eq!(doc.history().undo_len(), 1);
    assert!(matches!(doc.history().last(), Some(EditOp::Batch { .. })));
    doc.undo().unwrap();
    assert_eq!(doc.connections().len(), 3);
    assert_eq!(
        doc.node(&ref_id()).unwrap().sheet_target(),
        Some((&SheetId::new("child"), Some(&VersionId::new("v1"))))
    );
}

#[tokio::test]
async fn switching_to_the_live_draft_runs_the_full_diff() {
    let mut doc = wired_doc(Some("v1"));
    let mut resolver = VersionPortResolver::new(source(), 8);

    resolver.set_target(&mut doc, &ref_id(), None).await.unwrap();

    let (inputs, outputs) = number_ports(&["a", "c"], &["total"]);
    assert_eq!(ports(&doc), PortSet { inputs, outputs });
    assert_eq!(doc.connections().len(), 2);
    assert!(!doc
        .connections()
        .contains(&Connection::new("c2", "value", "ref", "b")));
}

#[tokio::test]
async fn fetch_failure_keeps_last_known_ports_and_reports_inline() {
    let src = source();
    let mut doc = wired_doc(None);
    let mut resolver = VersionPortResolver::new(src.clone(), 8);
    let before = ports(&doc);

    src.set_reachable(false);
    let err = resolver
        .resolve(&mut doc, &ref_id(), Recording::Recorded)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::PortResolution { .. }));
    assert_eq!(ports(&doc), before);
    assert_eq!(doc.connections().len(), 3);
    assert!(matches!(
        resolver.inline_error(&ref_id()),
        Some(SourceError::Network(_))
    ));

    // A failed switch leaves the target untouched.
    assert!(resolver
        .set_target(&mut doc, &ref_id(), Some(VersionId::new("v2")))
        .await
        .is_err());
    assert_eq!(
        doc.node(&ref_id()).unwrap().sheet_target(),
        Some((&SheetId::new("child"), None))
    );
    assert!(!doc.history().can_undo());

    src.set_reachable(true);
    resolver
        .resolve(&mut doc, &ref_id(), Recording::Recorded)
        .await
        .unwrap();
    assert_eq!(resolver.inline_error(&ref_id()), None);
}

#[tokio::test]
async fn snapshots_are_served_from_cache() {
    let src = source();
    let mut doc = wired_doc(Some("v1"));
    let mut resolver = VersionPortResolver::new(src.clone(), 8);

    resolver
        .resolve(&mut doc, &ref_id(), Recording::Recorded)
        .await
        .unwrap();
    let fetches = src.fetch_count();

    src.set_reachable(false);
    resolver
        .resolve(&mut doc, &ref_id(), Recording::Recorded)
        .await
        .unwrap();
    assert_eq!(src.fetch_count(), fetches);
    assert_eq!(resolver.cached_snapshots(), 1);
}

#[tokio::test]
async fn load_time_resolution_is_suppressed_and_ignores_the_default_version() {
    let src = source();
    src.set_default_version(&SheetId::new("child"), &VersionId::new("v2"));
    let mut doc = GraphDocument::new();
    doc.load(
        SheetId::new("parent"),
        vec![reference(Some("v1"), &[], &[]), constant("plain")],
        vec![],
    )
    .unwrap();
    let mut resolver = VersionPortResolver::new(src, 8);

    let failures = resolver.resolve_all(&mut doc).await;
    assert!(failures.is_empty());
    assert!(!doc.history().can_undo());
    assert_eq!(doc.change_generation(), 0);
    assert!(!doc.is_dirty());
    assert_eq!(
        doc.node(&ref_id()).unwrap().sheet_target(),
        Some((&SheetId::new("child"), Some(&VersionId::new("v1"))))
    );

    let default = resolver
        .default_version(&SheetId::new("child"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(default.id, VersionId::new("v2"));
    assert_eq!(ports(&doc).inputs.len(), 2);
}

#[tokio::test]
async fn resolve_all_reports_missing_versions_and_continues() {
    let mut doc = GraphDocument::new();
    let mut broken = reference(Some("gone"), &[], &[]);
    broken.id = NodeId::new("broken");
    doc.load(
        SheetId::new("parent"),
        vec![broken, reference(Some("v2"), &[], &[])],
        vec![],
    )
    .unwrap();
    let mut resolver = VersionPortResolver::new(source(), 8);

    let failures = resolver.resolve_all(&mut doc).await;
    assert_eq!(failures.len(), 1);
    assert!(resolver.inline_error(&NodeId::new("broken")).is_some());
    assert_eq!(ports(&doc).inputs.len(), 1);
}

#[tokio::test]
async fn created_versions_are_listed_and_cached() {
    let src = source();
    let mut resolver = VersionPortResolver::new(src.clone(), 8);
    let created = resolver
        .create_version(&SheetId::new("child"), "release", Some("first cut"))
        .await
        .unwrap();
    assert_eq!(created.nodes.len(), 3);
    assert_eq!(resolver.cached_snapshots(), 1);

    let listed = resolver.list_versions(&SheetId::new("child")).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().any(|v| v.id == created.id && v.tag == "release"));
}

#[tokio::test]
async fn non_sheet_nodes_are_rejected() {
    let mut doc = wired_doc(Some("v1"));
    let mut resolver = VersionPortResolver::new(source(), 8);
    assert_eq!(
        resolver
            .resolve(&mut doc, &NodeId::new("c1"), Recording::Recorded)
            .await,
        Err(ResolveError::NotASheetNode(NodeId::new("c1")))
    );
}
