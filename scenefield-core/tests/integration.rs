//! Integration Tests for the Field Graph
//!
//! These tests drive routing, lazy evaluation, display-list caching and the
//! scene loop together through the public API.

use std::cell::Cell;
use std::rc::Rc;

use scenefield_core::{
    AccessType, Caller, CacheState, FieldBuilder, FieldGraph, FieldId, FieldRef, FieldType,
    FieldValue, FixedDelay, InputSpec, NodeId, RecordingBackend, RenderBackend, RenderRoot, Result,
    Scene, SceneConfig, TimeStamp, TypeConstraint, UpdateContext,
};

/// A field that adds one to its single input and counts its updates.
fn increment(graph: &mut FieldGraph, count: Rc<Cell<u32>>) -> FieldRef<i32> {
    graph
        .add_typed::<i32>(
            FieldBuilder::of(0i32)
                .inputs(InputSpec::none().slot("in", TypeConstraint::Exact(FieldType::SFInt32)))
                .update(move |ctx: &mut UpdateContext<'_>| {
                    count.set(count.get() + 1);
                    let v = ctx.input::<i32>(0)?;
                    ctx.set(v + 1)
                }),
        )
        .unwrap()
}

/// Test that pulling a field twice without a new event updates it once.
#[test]
fn repeated_pulls_update_once() {
    let mut graph = FieldGraph::new();
    let source = graph.add_typed::<i32>(FieldBuilder::of(1i32)).unwrap();
    let count = Rc::new(Cell::new(0));
    let target = increment(&mut graph, count.clone());
    graph.route(source.id(), target.id()).unwrap();

    for _ in 0..5 {
        graph.up_to_date(target.id()).unwrap();
        assert_eq!(graph.get(target).unwrap(), 2);
    }
    assert_eq!(count.get(), 1);

    graph.set(source, 7).unwrap();
    for _ in 0..3 {
        graph.up_to_date(target.id()).unwrap();
    }
    assert_eq!(count.get(), 2);
    assert_eq!(graph.get(target).unwrap(), 8);
}

/// Test that a write at the head of a chain reaches its tail at any depth.
#[test]
fn chains_propagate_at_every_depth() {
    for depth in [1usize, 2, 5, 20] {
        let mut graph = FieldGraph::new();
        let head = graph.add_typed::<i32>(FieldBuilder::of(0i32)).unwrap();
        let count = Rc::new(Cell::new(0));

        let mut tail = head;
        for _ in 0..depth {
            let next = increment(&mut graph, count.clone());
            graph.route(tail.id(), next.id()).unwrap();
            tail = next;
        }

        graph.set(head, 10).unwrap();
        assert_eq!(count.get(), 0, "writes must not evaluate");
        assert_eq!(graph.get(tail).unwrap(), 10 + depth as i32);
        assert_eq!(count.get(), depth as u32);
    }
}

/// Test that very long chains neither overflow the stack on a write nor on
/// the pull at the tail.
#[test]
fn deep_chains_push_and_pull() {
    const DEPTH: usize = 10_000;
    let mut graph = FieldGraph::new();
    let head = graph.add_typed::<i32>(FieldBuilder::of(0i32)).unwrap();
    let count = Rc::new(Cell::new(0));

    let mut tail = head;
    for _ in 0..DEPTH {
        let next = increment(&mut graph, count.clone());
        graph.route_no_event(tail.id(), next.id()).unwrap();
        tail = next;
    }

    graph.set(head, 1).unwrap();
    assert!(!graph.is_up_to_date(tail.id()).unwrap());
    assert_eq!(graph.get(tail).unwrap(), 1 + DEPTH as i32);
    assert_eq!(count.get(), DEPTH as u32);

    // Copying fields take the same iterative path.
    let mut copy_tail = head;
    for _ in 0..DEPTH {
        let next = graph.add_typed::<i32>(FieldBuilder::of(0i32)).unwrap();
        graph.route_no_event(copy_tail.id(), next.id()).unwrap();
        copy_tail = next;
    }
    graph.set(head, 5).unwrap();
    assert_eq!(graph.get(copy_tail).unwrap(), 5);
    assert_eq!(graph.get(tail).unwrap(), 5 + DEPTH as i32);
}

/// Test that a two-field cycle terminates and settles after one pull.
#[test]
fn route_cycle_terminates() {
    let mut graph = FieldGraph::new();
    let a = graph.add_typed::<f32>(FieldBuilder::of(0.0f32).named("a")).unwrap();
    let b = graph.add_typed::<f32>(FieldBuilder::of(0.0f32).named("b")).unwrap();
    graph.route(a.id(), b.id()).unwrap();
    graph.route(b.id(), a.id()).unwrap();

    graph.set(a, 3.5).unwrap();
    graph.up_to_date(b.id()).unwrap();
    graph.up_to_date(a.id()).unwrap();

    assert!(graph.is_up_to_date(a.id()).unwrap());
    assert!(graph.is_up_to_date(b.id()).unwrap());
    assert_eq!(graph.get(b).unwrap(), 3.5);
    assert_eq!(graph.get(a).unwrap(), 3.5);
}

/// Test that output-only fields reject writes from anyone but their owner.
#[test]
fn output_only_fields_reject_external_writes() {
    let mut graph = FieldGraph::new();
    let node = graph.add_node("clock", "TimeSensor");
    let fraction = graph
        .add_typed::<f32>(
            FieldBuilder::of(0.0f32)
                .named("fraction_changed")
                .owned_by(node)
                .access(AccessType::OutputOnly),
        )
        .unwrap();
    graph.initialize_node(node).unwrap();

    let err = graph.set(fraction, 0.5).unwrap_err();
    assert!(err.is_access_error());
    assert!(err.to_string().contains("clock.fraction_changed"));
    assert_eq!(graph.get(fraction).unwrap(), 0.0);

    graph.set_as(fraction, 0.5, Caller::Node(node)).unwrap();
    assert_eq!(graph.get(fraction).unwrap(), 0.5);

    graph.set_access_check(fraction.id(), false).unwrap();
    graph.set(fraction, 0.75).unwrap();
}

/// Test that initialize-only fields accept writes until their node is
/// initialized and reject them from everyone afterwards.
#[test]
fn initialize_only_freezes_on_initialize() {
    let mut graph = FieldGraph::new();
    let node = graph.add_node("box", "Box");
    let size = graph
        .add_typed::<f32>(
            FieldBuilder::of(1.0f32)
                .named("size")
                .owned_by(node)
                .access(AccessType::InitializeOnly)
                .access_check(true),
        )
        .unwrap();

    graph.set_value_as(size.id(), FieldValue::Float(2.0), Caller::External).unwrap();
    graph.initialize_node(node).unwrap();

    for caller in [Caller::External, Caller::Node(node)] {
        let err = graph
            .set_value_as(size.id(), FieldValue::Float(3.0), caller)
            .unwrap_err();
        assert!(err.is_access_error());
    }
    assert_eq!(graph.get(size).unwrap(), 2.0);
}

/// Test that routes are visible from both ends until removed.
#[test]
fn routes_are_symmetric() {
    let mut graph = FieldGraph::new();
    let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
    let b = graph.add_field(FieldBuilder::of(2i32)).unwrap();

    graph.route(a, b).unwrap();
    assert!(graph.routes_out(a).unwrap().contains(&b));
    assert!(graph.routes_in(b).unwrap().contains(&a));
    assert!(graph.routes_to(a, b));
    assert!(graph.has_route_from(b, a));

    assert!(graph.unroute(a, b));
    assert!(!graph.routes_out(a).unwrap().contains(&b));
    assert!(!graph.routes_in(b).unwrap().contains(&a));
    assert!(!graph.unroute(a, b));
}

/// Test that removing a field cuts every route touching it.
#[test]
fn removed_fields_leave_no_routes() {
    let mut graph = FieldGraph::new();
    let a = graph.add_field(FieldBuilder::of(1i32)).unwrap();
    let b = graph.add_field(FieldBuilder::of(2i32)).unwrap();
    let c = graph.add_field(FieldBuilder::of(3i32)).unwrap();
    graph.route(a, b).unwrap();
    graph.route(b, c).unwrap();

    graph.remove_field(b).unwrap();
    assert!(graph.routes_out(a).unwrap().is_empty());
    assert!(graph.routes_in(c).unwrap().is_empty());
    assert!(graph.get_value(b).is_err());
}

fn renderable(graph: &mut FieldGraph, draws: Rc<Cell<u32>>) -> (NodeId, FieldId, FieldId) {
    let node = graph.add_node("shape", "Shape");
    let radius = graph
        .add_field(FieldBuilder::of(1.0f32).named("radius").owned_by(node))
        .unwrap();
    graph
        .set_renderer(
            node,
            move |g: &mut FieldGraph, n: NodeId, backend: &mut dyn RenderBackend| -> Result<()> {
                draws.set(draws.get() + 1);
                let radius = g.get_field(n, "radius")?;
                let r = g.get_value(radius)?;
                backend.emit(&format!("sphere {r:?}"));
                Ok(())
            },
        )
        .unwrap();
    let dl = graph.add_display_list(node).unwrap();
    graph.route(radius, dl).unwrap();
    (node, radius, dl)
}

/// Test that changing an input of a cached node rebuilds its list.
#[test]
fn changed_input_rebuilds_cache() {
    let mut graph = FieldGraph::new();
    graph.set_delay_policy(FixedDelay(0));
    let draws = Rc::new(Cell::new(0));
    let (_, radius, dl) = renderable(&mut graph, draws.clone());
    let mut backend = RecordingBackend::new();

    graph.call_list(dl, &mut backend, true).unwrap();
    assert_eq!(graph.rebuild_count(dl).unwrap(), 1);
    assert_eq!(graph.cache_state(dl).unwrap(), CacheState::Valid);

    // A valid list is replayed without running the render hook.
    graph.call_list(dl, &mut backend, true).unwrap();
    assert_eq!(draws.get(), 1);
    assert_eq!(graph.rebuild_count(dl).unwrap(), 1);

    graph.set_value(radius, FieldValue::Float(2.0)).unwrap();
    assert_eq!(graph.cache_state(dl).unwrap(), CacheState::Invalid);

    graph.call_list(dl, &mut backend, true).unwrap();
    assert_eq!(graph.rebuild_count(dl).unwrap(), 2);
    assert_eq!(draws.get(), 2);
    assert_eq!(backend.live_lists(), 1);
}

/// Test that the default delay renders uncached until inputs are quiet.
#[test]
fn default_delay_waits_before_caching() {
    let mut graph = FieldGraph::new();
    let draws = Rc::new(Cell::new(0));
    let (_, radius, dl) = renderable(&mut graph, draws.clone());
    let mut backend = RecordingBackend::new();

    for frame in 0..6 {
        graph.set_value(radius, FieldValue::Float(frame as f32)).unwrap();
        graph.call_list(dl, &mut backend, true).unwrap();
    }
    assert_eq!(graph.rebuild_count(dl).unwrap(), 0);
    assert_eq!(draws.get(), 6);

    for _ in 0..4 {
        graph.call_list(dl, &mut backend, true).unwrap();
    }
    assert_eq!(graph.rebuild_count(dl).unwrap(), 1);
    assert!(graph.have_valid_display_list(dl).unwrap());
}

fn product(graph: &mut FieldGraph, seen_p: Rc<Cell<f32>>) -> FieldRef<f32> {
    let spec = InputSpec::none()
        .slot("p", TypeConstraint::Exact(FieldType::SFFloat))
        .slot("q", TypeConstraint::Exact(FieldType::SFFloat));
    graph
        .add_typed::<f32>(FieldBuilder::of(0.0f32).inputs(spec).update(
            move |ctx: &mut UpdateContext<'_>| {
                let p = ctx.input_by_role::<f32>("p")?;
                let q = ctx.input_by_role::<f32>("q")?;
                seen_p.set(p);
                ctx.set(p * q)
            },
        ))
        .unwrap()
}

/// Test that the order routes are installed decides the input slots.
#[test]
fn route_order_assigns_input_slots() {
    let mut graph = FieldGraph::new();
    let p = graph.add_field(FieldBuilder::of(2.0f32).named("p")).unwrap();
    let q = graph.add_field(FieldBuilder::of(5.0f32).named("q")).unwrap();

    let seen = Rc::new(Cell::new(0.0));
    let pq = product(&mut graph, seen.clone());
    graph.route(p, pq.id()).unwrap();
    graph.route(q, pq.id()).unwrap();
    assert_eq!(graph.routes_in(pq.id()).unwrap(), &[p, q]);
    assert_eq!(graph.get(pq).unwrap(), 10.0);
    assert_eq!(seen.get(), 2.0);

    let qp = product(&mut graph, seen.clone());
    graph.route(q, qp.id()).unwrap();
    graph.route(p, qp.id()).unwrap();
    assert_eq!(graph.routes_in(qp.id()).unwrap(), &[q, p]);
    assert_eq!(graph.get(qp).unwrap(), 10.0);
    assert_eq!(seen.get(), 5.0);
}

/// Test that a third input is refused by a two-slot field.
#[test]
fn extra_input_is_rejected() {
    let mut graph = FieldGraph::new();
    let seen = Rc::new(Cell::new(0.0));
    let pq = product(&mut graph, seen);
    for _ in 0..2 {
        let f = graph.add_field(FieldBuilder::of(1.0f32)).unwrap();
        graph.route(f, pq.id()).unwrap();
    }
    let extra = graph.add_field(FieldBuilder::of(1.0f32)).unwrap();
    assert!(graph.route(extra, pq.id()).is_err());
    assert_eq!(graph.routes_in(pq.id()).unwrap().len(), 2);
}

/// Test that routing without an event copies the value silently.
#[test]
fn route_no_event_seeds_without_event() {
    let mut graph = FieldGraph::new();
    let a = graph.add_typed::<i32>(FieldBuilder::of(9i32)).unwrap();
    let b = graph.add_typed::<i32>(FieldBuilder::of(0i32)).unwrap();
    let c = graph.add_typed::<i32>(FieldBuilder::of(0i32)).unwrap();

    graph.route_no_event(a.id(), b.id()).unwrap();
    assert!(graph.is_up_to_date(b.id()).unwrap());
    assert_eq!(graph.get(b).unwrap(), 9);

    graph.route(a.id(), c.id()).unwrap();
    assert!(!graph.is_up_to_date(c.id()).unwrap());
    assert_eq!(graph.get(c).unwrap(), 9);

    // Later writes still flow through the silent route.
    graph.set(a, 4).unwrap();
    assert_eq!(graph.get(b).unwrap(), 4);
}

/// Test a few frames of a scene rendering a cached root node.
#[test]
fn scene_caches_root_across_frames() {
    let config = SceneConfig::from_json(r#"{"caching": {"cache_delay": 1}}"#).unwrap();
    let mut scene = Scene::with_config(config).unwrap();
    let draws = Rc::new(Cell::new(0));
    let (node, radius, dl) = renderable(scene.graph_mut(), draws.clone());
    scene.set_scene_root(Some(node)).unwrap();
    scene.add_stage("render", RenderRoot);
    let mut backend = RecordingBackend::new();

    let mut t = 0.0;
    for _ in 0..4 {
        t += 0.02;
        scene.idle_at(TimeStamp(t), &mut backend).unwrap();
    }
    // Frame one renders with the event pending, frame two counts the delay
    // down, frame three compiles and frame four replays.
    assert_eq!(scene.graph().rebuild_count(dl).unwrap(), 1);
    assert_eq!(draws.get(), 3);
    assert!(scene.graph_mut().is_active(dl).unwrap());

    scene
        .graph_mut()
        .set_value(radius, FieldValue::Float(3.0))
        .unwrap();
    scene.idle_at(TimeStamp(t + 0.02), &mut backend).unwrap();
    scene.release_resources(&mut backend);
    assert_eq!(backend.live_lists(), 0);

    for step in [0.04, 0.06] {
        scene.idle_at(TimeStamp(t + step), &mut backend).unwrap();
    }
    assert_eq!(scene.graph().rebuild_count(dl).unwrap(), 2);
    assert_eq!(backend.live_lists(), 1);
    assert_eq!(scene.frame_count(), 7);
}
