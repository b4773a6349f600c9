// Structural editing through the control surface

use posepipe_core::ErrorKind;
use posepipe_pipeline::*;
use std::sync::Arc;

fn editor_with(stages: Vec<StageSpec>) -> PipelineEditor {
    let mut editor = PipelineEditor::new(
        Arc::new(TransformerRegistry::with_builtins().unwrap()),
        BuildContext::default(),
    );
    editor.build(&PipelineSpec::new(stages)).unwrap();
    editor
}

#[test]
fn test_nesting_pipeline_into_itself_is_rejected() {
    let mut editor = editor_with(vec![StageSpec::nested(vec![StageSpec::new("mirror")])]);
    let inner = editor.describe().members[0].id.clone();
    let before = editor.describe();

    let err = editor.nest(&inner, &inner, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(editor.describe(), before);
}

#[test]
fn test_nesting_into_own_descendant_is_rejected() {
    let mut editor = editor_with(vec![StageSpec::nested(vec![
        StageSpec::new("mirror"),
        StageSpec::nested(vec![StageSpec::new("scaler")]).named("Innermost"),
    ])
    .named("Outer")]);
    let snapshot = editor.describe();
    let outer = snapshot.members[0].id.clone();
    let innermost = snapshot.members[0].members[1].id.clone();

    let err = editor.nest(&outer, &innermost, Some(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(editor.describe(), snapshot);
}

#[test]
fn test_root_cannot_be_nested() {
    let mut editor = editor_with(vec![StageSpec::nested(Vec::new())]);
    let root = editor.root_id();
    let inner = editor.describe().members[0].id.clone();
    assert_eq!(
        editor.nest(&root, &inner, None).unwrap_err().kind(),
        ErrorKind::Configuration
    );
}

#[test]
fn test_nest_moves_member_between_pipelines() {
    let mut editor = editor_with(vec![
        StageSpec::new("mirror"),
        StageSpec::nested(vec![StageSpec::new("scaler")]),
    ]);
    let snapshot = editor.describe();
    let mirror = snapshot.members[0].id.clone();
    let inner = snapshot.members[1].id.clone();

    editor.nest(&mirror, &inner, Some(0)).unwrap();
    let after = editor.describe();
    assert_eq!(after.members.len(), 1);
    assert_eq!(after.members[0].members[0].id, mirror);
    assert_eq!(after.members[0].members[1].kind, "scaler");
    assert_eq!(after.count(), snapshot.count());
}

#[test]
fn test_add_unknown_kind_leaves_pipeline_unchanged() {
    let mut editor = editor_with(vec![StageSpec::new("mirror")]);
    let root = editor.root_id();
    let before = editor.describe();

    let err = editor.add_transformer(&root, "teleporter", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(editor.describe(), before);
}

#[test]
fn test_reorder_and_remove() {
    let mut editor = editor_with(vec![
        StageSpec::new("mirror"),
        StageSpec::new("scaler"),
        StageSpec::new("metric_extractor"),
    ]);
    let root = editor.root_id();

    editor.move_transformer(&root, 2, 0).unwrap();
    let kinds: Vec<_> = editor.describe().members.into_iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec!["metric_extractor", "mirror", "scaler"]);

    let removed = editor.remove_transformer(&root, 1).unwrap();
    assert_eq!(removed.kind(), "mirror");
    assert_eq!(editor.describe().members.len(), 2);
    assert!(editor.move_transformer(&root, 0, 5).is_err());
}

#[test]
fn test_invalid_parameter_keeps_previous_value() {
    let mut editor = editor_with(vec![StageSpec::new("sliding_average").param("window", 4)]);
    let id = editor.describe().members[0].id.clone();

    assert!(editor
        .set_parameter(&id, "window", ParamValue::Int(0))
        .is_err());
    assert!(editor
        .set_parameter(&id, "window", ParamValue::Text("wide".into()))
        .is_err());
    assert_eq!(
        editor.describe().members[0].parameters["window"],
        ParamValue::Int(4)
    );
}

#[test]
fn test_snapshot_round_trips_through_toml() {
    let editor = editor_with(vec![
        StageSpec::new("video_source").param("frames", 3),
        StageSpec::nested(vec![StageSpec::new("landmark_drawer").param("radius", 6)])
            .named("Overlay")
            .disabled(),
    ]);
    let spec = editor.describe().to_spec();
    let text = toml::to_string(&spec).unwrap();
    let parsed: PipelineSpec = toml::from_str(&text).unwrap();

    let rebuilt = editor_with(parsed.stages);
    let (a, b) = (editor.describe(), rebuilt.describe());
    assert_eq!(a.count(), b.count());
    assert_eq!(b.members[1].name, "Overlay");
    assert!(!b.members[1].enabled);
    assert_eq!(
        b.members[1].members[0].parameters["radius"],
        ParamValue::Int(6)
    );
    assert_eq!(a.members[0].parameters, b.members[0].parameters);
}
