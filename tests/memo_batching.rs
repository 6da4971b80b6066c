use std::cell::Cell;
use std::rc::Rc;

use arbor::{Child, Component, InstancePath, Map, Node, Runtime, Value};

fn path(s: &str) -> InstancePath {
    s.parse().unwrap()
}

fn n_of(state: &Map) -> f64 {
    state.get("n").and_then(Value::as_f64).unwrap_or(0.0)
}

fn delta(n: f64) -> Map {
    Map::from([("n".to_string(), Value::from(n))])
}

/// Renders its `n` state as text and counts render calls.
fn counter(name: &str, calls: &Rc<Cell<u32>>) -> Component {
    let calls = Rc::clone(calls);
    Component::new(name, move |ctx| {
        calls.set(calls.get() + 1);
        Ok(vec![Child::from(Value::from(n_of(ctx.state())))])
    })
    .initial_state(|_| delta(0.0))
}

#[test]
fn rerender_skips_memo_children_with_unchanged_props() {
    let label_calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&label_calls);
    let label = Component::new("Label", move |ctx| {
        seen.set(seen.get() + 1);
        Ok(vec![Child::from(ctx.prop("text").cloned().unwrap_or(Value::Null))])
    })
    .memo()
    .build();

    let app = Component::new("App", move |_| {
        Ok(vec![Node::new(&label).with_prop("text", "hi").into()])
    })
    .build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&app)).unwrap();
    let first = rt.output(h).cloned().unwrap();

    rt.rerender(h).unwrap();
    rt.rerender(h).unwrap();

    assert_eq!(rt.render_count(h, &path("App#0")), Some(3));
    assert_eq!(rt.render_count(h, &path("App#0/Label#0")), Some(1));
    assert_eq!(label_calls.get(), 1);
    assert_eq!(rt.output(h), Some(&first));
    assert_eq!(first.text(), "hi");
}

#[test]
fn memo_compares_objects_by_reference() {
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let avatar = Component::new("Avatar", move |_| {
        seen.set(seen.get() + 1);
        Ok(Vec::new())
    })
    .memo()
    .build();

    let shared = Value::object([("fullName", Value::from("Ada"))]);
    let fresh_each_time = Rc::new(Cell::new(false));
    let toggle = Rc::clone(&fresh_each_time);
    let app = Component::new("App", move |_| {
        let user = if toggle.get() {
            Value::object([("fullName", Value::from("Ada"))])
        } else {
            shared.clone()
        };
        Ok(vec![Node::new(&avatar).with_prop("user", user).into()])
    })
    .build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&app)).unwrap();
    rt.rerender(h).unwrap();
    assert_eq!(calls.get(), 1);

    // Deep-equal but newly allocated: not the same value.
    fresh_each_time.set(true);
    rt.rerender(h).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn non_memo_children_rerender_with_parent() {
    let calls = Rc::new(Cell::new(0));
    let child = counter("Child", &calls).build();
    let app = Component::new("App", move |_| Ok(vec![Node::new(&child).into()])).build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&app)).unwrap();
    rt.rerender(h).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn batched_updates_render_once() {
    let calls = Rc::new(Cell::new(0));
    let c = counter("Counter", &calls).build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&c)).unwrap();
    let p = path("Counter#0");
    assert_eq!(calls.get(), 1);

    rt.batch(|rt| {
        assert!(rt.update(h, &p, delta(1.0)).unwrap());
        assert!(
            rt.update_with(h, &p, |s| delta(n_of(s) + 1.0))
                .unwrap()
        );
        assert!(rt.update_with(h, &p, |s| delta(n_of(s) * 10.0)).unwrap());
        assert!(rt.is_batching());
        // Nothing applied yet.
        assert_eq!(rt.state(h, &p).map(n_of), Some(0.0));
    })
    .unwrap();

    assert_eq!(calls.get(), 2);
    assert_eq!(rt.state(h, &p).map(n_of), Some(20.0));
    assert_eq!(rt.output(h).map(|o| o.text()), Some("20".to_string()));
}

#[test]
fn unbatched_updates_render_each_time() {
    let calls = Rc::new(Cell::new(0));
    let c = counter("Counter", &calls).build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&c)).unwrap();
    let p = path("Counter#0");
    rt.update(h, &p, delta(1.0)).unwrap();
    rt.update(h, &p, delta(2.0)).unwrap();
    assert_eq!(calls.get(), 3);
}

#[test]
fn updater_requests_wait_for_flush() {
    let calls = Rc::new(Cell::new(0));
    let c = counter("Counter", &calls).build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&c)).unwrap();
    let u = rt.updater(h, &path("Counter#0")).unwrap();
    assert!(u.set(delta(4.0)));
    assert!(u.set_with(|s| delta(n_of(s) + 1.0)));
    assert_eq!(calls.get(), 1);

    assert_eq!(rt.flush(h).unwrap(), 1);
    assert_eq!(calls.get(), 2);
    assert_eq!(rt.output(h).map(|o| o.text()), Some("5".to_string()));
}

#[test]
fn memo_ancestors_are_skipped_when_only_a_descendant_changes() {
    let inner_calls = Rc::new(Cell::new(0));
    let inner = counter("Inner", &inner_calls).build();

    let outer_calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&outer_calls);
    let outer = Component::new("Outer", move |_| {
        seen.set(seen.get() + 1);
        Ok(vec![Node::new(&inner).into(), Child::from("!")])
    })
    .memo()
    .build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&outer)).unwrap();
    rt.update(h, &path("Outer#0/Inner#0"), delta(7.0)).unwrap();

    assert_eq!(outer_calls.get(), 1);
    assert_eq!(inner_calls.get(), 2);
    assert_eq!(rt.output(h).map(|o| o.text()), Some("7!".to_string()));
}

#[test]
fn updates_after_unmount_are_dropped() {
    let calls = Rc::new(Cell::new(0));
    let child = counter("Child", &calls).build();
    let parent = Component::new("Parent", move |ctx| {
        let show = ctx.state_value("show").and_then(Value::as_bool).unwrap_or(true);
        Ok(if show {
            vec![Node::new(&child).into()]
        } else {
            Vec::new()
        })
    })
    .build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&parent)).unwrap();
    let child_path = path("Parent#0/Child#0");
    let u = rt.updater(h, &child_path).unwrap();
    let scope = u.scope().clone();
    assert!(u.is_live());

    // Lands in the same pass that unmounts the child, so it is never rendered.
    assert!(u.set(delta(9.0)));
    rt.update(
        h,
        &path("Parent#0"),
        Map::from([("show".to_string(), Value::from(false))]),
    )
    .unwrap();

    assert!(!rt.is_mounted(h, &child_path));
    assert!(scope.is_cancelled());
    assert!(!u.is_live());
    assert!(!u.set(delta(10.0)));
    assert!(!rt.update(h, &child_path, delta(11.0)).unwrap());
    assert_eq!(rt.flush(h).unwrap(), 0);
    assert_eq!(calls.get(), 1);
}

#[test]
fn unmount_cancels_every_instance() {
    let calls = Rc::new(Cell::new(0));
    let c = counter("Counter", &calls).build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&c)).unwrap();
    let u = rt.updater(h, &path("Counter#0")).unwrap();
    assert!(rt.unmount(h));
    assert!(!u.is_live());
    assert!(!u.set(delta(1.0)));
    assert!(rt.output(h).is_none());
}

#[test]
fn keyed_children_keep_state_across_reorder() {
    let item = Component::new("Item", |ctx| {
        Ok(vec![Child::from(Value::from(n_of(ctx.state())))])
    })
    .build();
    let list = Component::new("List", move |ctx| {
        let reversed = ctx
            .state_value("reversed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let mut keys = vec!["a", "b"];
        if reversed {
            keys.reverse();
        }
        Ok(keys
            .into_iter()
            .map(|k| Node::new(&item).with_key(k).into())
            .collect())
    })
    .build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&list)).unwrap();
    rt.update(h, &path("List#0/Item:a"), delta(1.0)).unwrap();
    rt.update(h, &path("List#0/Item:b"), delta(2.0)).unwrap();
    assert_eq!(rt.output(h).map(|o| o.text()), Some("12".to_string()));

    rt.update(
        h,
        &path("List#0"),
        Map::from([("reversed".to_string(), Value::from(true))]),
    )
    .unwrap();
    assert_eq!(rt.output(h).map(|o| o.text()), Some("21".to_string()));
}

#[test]
fn replacing_the_root_keeps_state_when_identity_matches() {
    let calls = Rc::new(Cell::new(0));
    let c = counter("Counter", &calls).build();

    let mut rt = Runtime::default();
    let h = rt.mount(Node::new(&c)).unwrap();
    rt.update(h, &path("Counter#0"), delta(3.0)).unwrap();

    rt.render(h, Node::new(&c).with_prop("label", "x")).unwrap();
    assert_eq!(rt.state(h, &path("Counter#0")).map(n_of), Some(3.0));

    // Same position, different component type: fresh instance.
    let other = counter("Counter", &calls).build();
    rt.render(h, Node::new(&other)).unwrap();
    assert_eq!(rt.state(h, &path("Counter#0")).map(n_of), Some(0.0));
}
