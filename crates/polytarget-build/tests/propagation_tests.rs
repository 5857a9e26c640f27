//! Dependency propagation tests

use polytarget_build::{
    DependencyRecord, InMemoryPackageLookup, LazyContext, LoaderEntry, MultiTargetOptions,
    PluginFactoryRegistry, ProfileClass, PropagationEngine, ResolveData, TargetOptions,
    TargetingError, TargetingState, RECOGNIZED_TRANSFORM_ID,
};
use polytarget_package::PackageManifest;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn options() -> MultiTargetOptions {
    MultiTargetOptions::with_targets(vec![
        TargetOptions::new(ProfileClass::Legacy)
            .with_transform(json!({ "presets": [["env", { "targets": "> 0.5%, ie 11" }]] })),
        TargetOptions::new(ProfileClass::Modern)
            .with_transform(json!({ "presets": [["env", { "targets": { "esmodules": true } }]] })),
    ])
}

fn engine_with(options: MultiTargetOptions, lookup: InMemoryPackageLookup) -> PropagationEngine {
    let config = options.validate(&PluginFactoryRegistry::new()).unwrap();
    PropagationEngine::new(&config, Arc::new(lookup)).unwrap()
}

fn engine() -> PropagationEngine {
    engine_with(options(), InMemoryPackageLookup::new())
}

fn app_module(request: &str) -> ResolveData {
    ResolveData::new(request).with_resource("/project/src/app.js")
}

#[test]
fn test_blind_assignment_scenario() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();

    let mut first = app_module("./app.js");
    engine.module_created(&mut cycle, &mut first).unwrap();
    assert_eq!(first.request, "./app.js?babelTarget=legacy");
    assert_eq!(first.resource.as_deref(), Some("/project/src/app.js?babelTarget=legacy"));
    assert_eq!(first.state, TargetingState::Targeted);

    let mut second = app_module("./app.js");
    engine.module_created(&mut cycle, &mut second).unwrap();
    assert_eq!(second.request, "./app.js?babelTarget=modern");

    let mut third = app_module("./app.js");
    let err = engine.module_created(&mut cycle, &mut third).unwrap_err();
    assert!(matches!(
        err,
        TargetingError::BlindAssignmentExhausted { ref request, .. } if request == "./app.js"
    ));
    assert!(err.to_string().contains("./app.js"));
}

#[test]
fn test_new_cycle_resets_ledger() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    for _ in 0..2 {
        engine.module_created(&mut cycle, &mut app_module("./app.js")).unwrap();
    }
    drop(cycle);

    let mut cycle = engine.begin_cycle();
    let mut data = app_module("./app.js");
    engine.module_created(&mut cycle, &mut data).unwrap();
    assert_eq!(data.request, "./app.js?babelTarget=legacy");
}

#[test]
fn test_tagged_request_keeps_its_target() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut data = app_module("./app.js?babelTarget=modern");
    engine.module_created(&mut cycle, &mut data).unwrap();

    assert_eq!(data.request, "./app.js?babelTarget=modern");
    assert_eq!(data.target.as_ref().map(|t| t.key()), Some("modern"));
    assert_eq!(cycle.ledger().len(), 0);
}

#[test]
fn test_unregistered_tag_replaced_per_target() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let module = || ResolveData::new("./a.js?babelTarget=es3").with_resource("/project/src/a.js");

    let mut first = module();
    engine.module_created(&mut cycle, &mut first).unwrap();
    let mut second = module();
    engine.module_created(&mut cycle, &mut second).unwrap();

    assert_eq!(first.request, "./a.js?babelTarget=legacy");
    assert_eq!(first.resource.as_deref(), Some("/project/src/a.js?babelTarget=legacy"));
    assert_eq!(second.request, "./a.js?babelTarget=modern");
    assert_ne!(first.request, second.request);
    assert_eq!(
        cycle.target_of(&second.request).map(|t| t.key()),
        Some("modern")
    );
}

#[test]
fn test_unregistered_tag_on_dependency_replaced() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut module = app_module("./app.js?babelTarget=legacy");
    engine.module_created(&mut cycle, &mut module).unwrap();

    let mut dep = DependencyRecord::new("./b.js?x=1&babelTarget=es3");
    assert!(engine.dependency_added(&cycle, &module, &mut dep));
    assert_eq!(dep.request, "./b.js?x=1&babelTarget=legacy");
    assert_eq!(dep.target.as_ref().map(|t| t.key()), Some("legacy"));
}

#[test]
fn test_dependencies_inherit_module_target() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut module = app_module("./app.js?babelTarget=legacy");
    engine.module_created(&mut cycle, &mut module).unwrap();

    let mut deps = vec![
        DependencyRecord::new("./util.js"),
        DependencyRecord::new("lodash/map"),
        DependencyRecord::new("./already.js?babelTarget=modern"),
    ];
    let tagged: Vec<bool> = deps
        .iter_mut()
        .map(|dep| engine.dependency_added(&cycle, &module, dep))
        .collect();

    assert_eq!(tagged, vec![true, true, false]);
    assert_eq!(deps[0].request, "./util.js?babelTarget=legacy");
    assert_eq!(deps[0].origin_module.as_deref(), Some("./app.js?babelTarget=legacy"));
    assert_eq!(deps[1].request, "lodash/map?babelTarget=legacy");
    // never re-tagged
    assert_eq!(deps[2].request, "./already.js?babelTarget=modern");
    assert_eq!(deps[2].target.as_ref().map(|t| t.key()), Some("modern"));
}

#[test]
fn test_propagation_is_transitive() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut root = app_module("./app.js?babelTarget=modern");
    engine.module_created(&mut cycle, &mut root).unwrap();

    let mut dep = DependencyRecord::new("./a.js");
    assert!(engine.dependency_added(&cycle, &root, &mut dep));

    // the dependency becomes a module of its own and adds its own dependency
    let mut child = ResolveData::new(dep.request.clone())
        .with_issuer(root.request.clone())
        .with_resource("/project/src/a.js");
    engine.module_created(&mut cycle, &mut child).unwrap();
    let mut grandchild = DependencyRecord::new("./b.js");
    assert!(engine.dependency_added(&cycle, &child, &mut grandchild));

    assert_eq!(child.request, "./a.js?babelTarget=modern");
    assert_eq!(grandchild.request, "./b.js?babelTarget=modern");
}

#[test]
fn test_untargeted_module_tags_nothing() {
    let engine = engine();
    let cycle = engine.begin_cycle();
    let module = app_module("./app.js");
    let mut dep = DependencyRecord::new("./util.js");
    assert!(!engine.dependency_added(&cycle, &module, &mut dep));
    assert_eq!(dep.request, "./util.js");
}

#[test]
fn test_do_not_target_and_externals_skipped() {
    let mut options = options();
    options.do_not_target = vec![r"^zone\.js".to_string()];
    options.externals = Some(serde_json::from_value(json!({ "jquery": "jQuery" })).unwrap());
    let engine = engine_with(options, InMemoryPackageLookup::new());
    let mut cycle = engine.begin_cycle();

    let mut module = app_module("./app.js?babelTarget=legacy");
    engine.module_created(&mut cycle, &mut module).unwrap();

    let mut zone = DependencyRecord::new("zone.js");
    let mut jquery = DependencyRecord::new("jquery");
    assert!(!engine.dependency_added(&cycle, &module, &mut zone));
    assert!(!engine.dependency_added(&cycle, &module, &mut jquery));
    assert_eq!(zone.request, "zone.js");
    assert_eq!(jquery.request, "jquery");

    let mut zone_module = ResolveData::new("zone.js").with_resource("/project/node_modules/zone.js/dist/zone.js");
    engine.module_created(&mut cycle, &mut zone_module).unwrap();
    assert_eq!(zone_module.request, "zone.js");
    assert_eq!(zone_module.state, TargetingState::Untagged);
}

#[test]
fn test_after_resolve_suffixes_chunk_and_rewrites_loaders() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut data = app_module("./main.js?babelTarget=modern")
        .with_chunk_name("main")
        .with_loaders(vec![
            LoaderEntry::marker(LoaderEntry::new(RECOGNIZED_TRANSFORM_ID, json!({}))),
            LoaderEntry::new("source-map-loader", json!({})),
        ]);
    engine.after_resolve(&mut cycle, &mut data).unwrap();

    assert_eq!(data.chunk_name.as_deref(), Some("main.modern"));
    assert_eq!(data.state, TargetingState::Chained);
    assert_eq!(data.loaders.len(), 2);
    assert_eq!(data.loaders[0].identity.as_deref(), Some("multi-target-loader-modern"));
    assert_eq!(
        data.loaders[0].options,
        json!({ "presets": [["env", { "targets": { "esmodules": true } }]] })
    );
}

#[test]
fn test_after_resolve_inherits_from_dependencies() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();

    let mut owner = app_module("./owner.js?babelTarget=legacy");
    engine.module_created(&mut cycle, &mut owner).unwrap();

    let mut data = ResolveData::new("./lazy-route.js")
        .with_resource("/project/src/lazy-route.js")
        .with_dependencies(vec![DependencyRecord::new("./x.js").with_origin(owner.request.clone())]);
    engine.after_resolve(&mut cycle, &mut data).unwrap();

    assert_eq!(data.request, "./lazy-route.js?babelTarget=legacy");
    assert_eq!(data.resource.as_deref(), Some("/project/src/lazy-route.js?babelTarget=legacy"));
    assert_eq!(cycle.ledger().len(), 0);
}

#[test]
fn test_after_resolve_falls_back_to_blind_assignment() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut data = ResolveData::new("./orphan.js")
        .with_issuer("/project/src/index.js")
        .with_resource("/project/src/orphan.js");
    engine.after_resolve(&mut cycle, &mut data).unwrap();

    assert_eq!(data.request, "./orphan.js?babelTarget=legacy");
    assert_eq!(cycle.ledger().remaining("/project/src/index.js", "./orphan.js"), 1);
}

#[test]
fn test_excluded_module_collapses_to_one_node() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut data = ResolveData::new("core-js/modules/es.array.map?babelTarget=modern")
        .with_resource("/project/node_modules/core-js/modules/es.array.map.js")
        .with_loaders(vec![LoaderEntry::marker(LoaderEntry::new(RECOGNIZED_TRANSFORM_ID, json!({})))]);

    engine.before_resolve(&mut cycle, &mut data).unwrap();
    assert!(data.target.is_some());
    engine.after_resolve(&mut cycle, &mut data).unwrap();

    assert_eq!(data.request, "core-js/modules/es.array.map");
    assert_eq!(
        data.resource.as_deref(),
        Some("/project/node_modules/core-js/modules/es.array.map.js")
    );
    assert!(data.target.is_none());
    assert!(data.loaders.is_empty());
    assert!(cycle.target_of("core-js/modules/es.array.map?babelTarget=modern").is_none());
}

#[test]
fn test_package_main_is_excluded() {
    let lookup = InMemoryPackageLookup::new().with_package(
        "/project/node_modules/left-pad",
        PackageManifest {
            main: Some("dist/index".to_string()),
            ..PackageManifest::default()
        },
    );
    let engine = engine_with(options(), lookup);
    let mut cycle = engine.begin_cycle();

    let mut main = ResolveData::new("left-pad").with_resource("/project/node_modules/left-pad/dist/index.js");
    engine.module_created(&mut cycle, &mut main).unwrap();
    assert_eq!(main.request, "left-pad");

    let mut other = ResolveData::new("left-pad/src/pad")
        .with_resource("/project/node_modules/left-pad/src/pad.js");
    engine.module_created(&mut cycle, &mut other).unwrap();
    assert_eq!(other.request, "left-pad/src/pad?babelTarget=legacy");
}

#[test]
fn test_lazy_context_tags_fragment_and_dependencies() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut lazy = LazyContext::new("/project/src/routes", "./lazy").with_chunk_name("lazy");

    let deps = engine
        .lazy_context_resolved(&mut cycle, &mut lazy, |ctx| {
            assert_eq!(ctx.request, "./lazy?babelTarget=legacy");
            Ok::<_, TargetingError>(vec![
                DependencyRecord::new("./admin.module"),
                DependencyRecord::new("./users.module"),
            ])
        })
        .unwrap();

    assert_eq!(lazy.chunk_name.as_deref(), Some("lazy.legacy"));
    let requests: Vec<_> = deps.iter().map(|d| d.request.as_str()).collect();
    assert_eq!(
        requests,
        vec![
            "./admin.module?babelTarget=legacy",
            "./users.module?babelTarget=legacy"
        ]
    );

    let mut again = LazyContext::new("/project/src/routes", "./lazy");
    engine
        .lazy_context_resolved(&mut cycle, &mut again, |_| Ok::<_, TargetingError>(Vec::new()))
        .unwrap();
    assert_eq!(again.request, "./lazy?babelTarget=modern");

    let mut third = LazyContext::new("/project/src/routes", "./lazy");
    let result = engine.lazy_context_resolved(&mut cycle, &mut third, |_| Ok::<_, TargetingError>(Vec::new()));
    assert!(matches!(result, Err(TargetingError::BlindAssignmentExhausted { .. })));
}

#[test]
fn test_invalid_context_rejected_at_boundary() {
    let engine = engine();
    let mut cycle = engine.begin_cycle();
    let mut data = app_module("./app.js");
    data.version = 7;
    assert!(matches!(
        engine.module_created(&mut cycle, &mut data),
        Err(TargetingError::UnsupportedContextVersion { found: 7, .. })
    ));
}
