// SPDX-License-Identifier: Apache-2.0
//! Component lifecycle: callbacks, rerenders, slots, error isolation, and
//! scoped background tasks.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use umbra_core::{
    Component, ComponentMeta, ComponentResolver, Descriptor, Engine, EngineConfig, EventPayload,
    ListenerId, Patch, PatchSet, PropValue, Props, RenderFault, Scope,
};

/// Shared observation channel between the test body and component
/// instances created inside the engine.
#[derive(Default)]
struct Probe {
    scope: RefCell<Option<Scope>>,
    mounted: RefCell<Vec<String>>,
    unmounted: RefCell<Vec<String>>,
    task_dropped: Arc<AtomicBool>,
}

struct Counter {
    scope: Scope,
    count: i64,
    probe: Rc<Probe>,
}

impl Component for Counter {
    fn render(&self) -> Result<Descriptor, RenderFault> {
        Ok(Descriptor::tag("button")
            .with_prop("onclick", self.scope.callback("increment"))
            .with_child(self.count.to_string())
            .into())
    }

    fn mount(&mut self, scope: &Scope) {
        *self.probe.scope.borrow_mut() = Some(scope.clone());
        self.probe.mounted.borrow_mut().push("Counter".to_string());
    }

    fn unmount(&mut self) {
        self.probe
            .unmounted
            .borrow_mut()
            .push("Counter".to_string());
    }

    fn handle_event(&mut self, method: &str, _payload: EventPayload) -> Result<(), RenderFault> {
        match method {
            "increment" => {
                self.count += 1;
                self.scope.rerender();
                Ok(())
            }
            other => Err(RenderFault::UnknownMethod {
                method: other.to_string(),
            }),
        }
    }
}

struct Broken;

impl Component for Broken {
    fn render(&self) -> Result<Descriptor, RenderFault> {
        Err(RenderFault::msg("template exploded"))
    }
}

struct Card;

impl Component for Card {
    fn render(&self) -> Result<Descriptor, RenderFault> {
        Ok(Descriptor::tag("div")
            .with_prop("class", "card")
            .with_child(Descriptor::slot())
            .with_child(Descriptor::tag("footer").with_child(Descriptor::named_slot("footer")))
            .into())
    }
}

struct Greeter {
    name: String,
}

impl Component for Greeter {
    fn render(&self) -> Result<Descriptor, RenderFault> {
        Ok(Descriptor::tag("p")
            .with_child(format!("Hello, {}", self.name))
            .into())
    }

    fn set_props(&mut self, props: Props) {
        if let Some(PropValue::Text(name)) = props.get("name") {
            self.name = name.to_string();
        }
    }
}

struct Sleeper {
    probe: Rc<Probe>,
}

impl Component for Sleeper {
    fn render(&self) -> Result<Descriptor, RenderFault> {
        Ok(Descriptor::tag("div").with_child("sleeping").into())
    }

    fn mount(&mut self, scope: &Scope) {
        struct SetOnDrop(Arc<AtomicBool>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let guard = SetOnDrop(Arc::clone(&self.probe.task_dropped));
        scope.spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
    }
}

struct Registry {
    probe: Rc<Probe>,
}

impl ComponentResolver for Registry {
    fn resolve(
        &self,
        type_name: &str,
        props: &Props,
        scope: &Scope,
    ) -> Result<Box<dyn Component>, RenderFault> {
        match type_name {
            "Counter" => Ok(Box::new(Counter {
                scope: scope.clone(),
                count: 0,
                probe: Rc::clone(&self.probe),
            })),
            "Broken" => Ok(Box::new(Broken)),
            "Card" => Ok(Box::new(Card)),
            "Greeter" => Ok(Box::new(Greeter {
                name: match props.get("name") {
                    Some(PropValue::Text(name)) => name.to_string(),
                    _ => "stranger".to_string(),
                },
            })),
            "Sleeper" => Ok(Box::new(Sleeper {
                probe: Rc::clone(&self.probe),
            })),
            other => Err(RenderFault::UnknownComponent {
                type_name: other.to_string(),
            }),
        }
    }

    fn component_meta(&self, type_name: &str) -> Option<ComponentMeta> {
        (type_name == "Broken").then(|| ComponentMeta {
            file: Some("app/broken.haml".to_string()),
            source: Some("%div= boom!".to_string()),
        })
    }
}

fn engine_with_probe() -> (Engine, Rc<Probe>) {
    let probe = Rc::new(Probe::default());
    let engine = Engine::new(
        EngineConfig::default(),
        Registry {
            probe: Rc::clone(&probe),
        },
    );
    (engine, probe)
}

fn onclick_token(set: &PatchSet) -> Option<ListenerId> {
    set.iter().find_map(|p| match p {
        Patch::SetAttribute { name, value, .. } if name == "onclick" => {
            let token = value.split('\'').nth(1)?;
            Some(ListenerId(token.to_string()))
        }
        _ => None,
    })
}

#[test]
fn callback_routes_to_the_component_and_rerenders() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(Descriptor::component("Counter"));
    let initial = engine.try_dequeue().expect("initial batch");
    let token = onclick_token(&initial).expect("listener attribute");
    assert!(engine.to_html().contains(">0</button>"));

    engine.callback(&token, EventPayload::Null);
    assert!(engine.to_html().contains(">1</button>"));
    let set = engine.try_dequeue().expect("rerender batch");
    assert!(set
        .iter()
        .any(|p| matches!(p, Patch::SetTextContent { content, .. } if content == "1")));
}

#[test]
fn unchanged_listener_binding_keeps_its_token() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(Descriptor::component("Counter"));
    let initial = engine.try_dequeue().expect("initial batch");
    let token = onclick_token(&initial).expect("listener attribute");

    engine.callback(&token, EventPayload::Null);
    let set = engine.try_dequeue().expect("rerender batch");
    assert!(
        !set.iter().any(|p| matches!(
            p,
            Patch::SetAttribute { name, .. } if name == "onclick"
        )),
        "unchanged (scope, method) binding must not re-emit its attribute"
    );
}

#[test]
fn pending_rerender_signals_coalesce() {
    let (mut engine, probe) = engine_with_probe();
    engine.render(Descriptor::component("Counter"));
    let _ = engine.try_dequeue();

    let scope = probe.scope.borrow().clone().expect("mounted scope");
    scope.rerender();
    scope.rerender();
    scope.rerender();
    engine.flush();

    // Idempotent render: coalesced wakes with unchanged state commit
    // nothing at all.
    assert_eq!(engine.try_dequeue(), None);
}

#[test]
fn emitted_events_reach_the_patch_stream() {
    let (mut engine, probe) = engine_with_probe();
    engine.render(Descriptor::component("Counter"));
    let _ = engine.try_dequeue();

    let scope = probe.scope.borrow().clone().expect("mounted scope");
    scope.emit("toast", EventPayload::Text("saved".to_string()));
    engine.flush();

    let set = engine.try_dequeue().expect("emit batch");
    assert!(set.iter().any(|p| matches!(
        p,
        Patch::Event { name, payload } if name == "toast"
            && payload == &EventPayload::Text("saved".to_string())
    )));
}

#[test]
fn new_props_force_a_rerender() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(Descriptor::component("Greeter").with_prop("name", "Ada"));
    let _ = engine.try_dequeue();
    assert_eq!(engine.to_html(), "<p>Hello, Ada</p>");

    engine.render(Descriptor::component("Greeter").with_prop("name", "Grace"));
    let set = engine.try_dequeue().expect("props batch");
    assert!(set
        .iter()
        .any(|p| matches!(p, Patch::SetTextContent { content, .. } if content == "Hello, Grace")));
    assert_eq!(engine.to_html(), "<p>Hello, Grace</p>");
}

#[test]
fn slot_projection_routes_children_by_slot_prop() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(
        Descriptor::component("Card")
            .with_child(Descriptor::tag("p").with_child("body"))
            .with_child(
                Descriptor::tag("span")
                    .with_slot("footer")
                    .with_child("fine print"),
            ),
    );
    assert_eq!(
        engine.to_html(),
        "<div class=\"card\"><p>body</p><footer><span>fine print</span></footer></div>"
    );
}

#[test]
fn slot_content_follows_owner_updates() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(
        Descriptor::component("Card")
            .with_child(Descriptor::tag("p").with_child("one"))
            .with_child(Descriptor::tag("b").with_slot("footer").with_child("f1")),
    );
    let _ = engine.try_dequeue();

    engine.render(
        Descriptor::component("Card")
            .with_child(Descriptor::tag("p").with_child("two"))
            .with_child(Descriptor::tag("b").with_slot("footer").with_child("f2")),
    );
    let set = engine.try_dequeue().expect("update batch");
    for expected in ["two", "f2"] {
        assert!(
            set.iter()
                .any(|p| matches!(p, Patch::SetTextContent { content, .. } if content == expected)),
            "projected {expected:?} must reach the slot on the owner's update"
        );
    }
    assert_eq!(
        engine.to_html(),
        "<div class=\"card\"><p>two</p><footer><b>f2</b></footer></div>"
    );
}

#[test]
fn render_errors_are_isolated_to_the_failing_component() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(
        Descriptor::tag("main")
            .with_child(Descriptor::component("Broken"))
            .with_child(Descriptor::tag("p").with_child("still here")),
    );

    let set = engine.try_dequeue().expect("initial batch");
    let error = set
        .iter()
        .find_map(|p| match p {
            Patch::RenderError(e) => Some(e),
            _ => None,
        })
        .expect("diagnostic patch");
    assert_eq!(error.kind, "render");
    assert_eq!(error.message, "template exploded");
    assert_eq!(error.file.as_deref(), Some("app/broken.haml"));
    assert_eq!(error.tree_path, vec!["Broken".to_string()]);

    let html = engine.to_html();
    assert!(html.contains("umbra-render-error"));
    assert!(html.contains("component failed to render"));
    assert!(html.contains("<p>still here</p>"));
}

#[test]
fn unknown_component_types_fail_like_render_errors() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(Descriptor::tag("div").with_child(Descriptor::component("Nope")));
    let set = engine.try_dequeue().expect("initial batch");
    assert!(set.iter().any(|p| matches!(
        p,
        Patch::RenderError(e) if e.kind == "unknown_component"
    )));
    assert!(engine.to_html().contains("umbra-render-error"));
}

#[test]
fn mount_and_unmount_hooks_run_once() {
    let (mut engine, probe) = engine_with_probe();
    engine.render(Descriptor::tag("div").with_child(Descriptor::component("Counter")));
    assert_eq!(probe.mounted.borrow().len(), 1);
    assert_eq!(probe.unmounted.borrow().len(), 0);

    engine.render(Descriptor::tag("div"));
    assert_eq!(probe.mounted.borrow().len(), 1);
    assert_eq!(probe.unmounted.borrow().len(), 1);
}

#[test]
fn stale_listener_tokens_are_ignored() {
    let (mut engine, _probe) = engine_with_probe();
    engine.render(Descriptor::component("Counter"));
    let initial = engine.try_dequeue().expect("initial batch");
    let token = onclick_token(&initial).expect("listener attribute");

    engine.render(Descriptor::tag("div"));
    let _ = engine.try_dequeue();

    // The client raced the unmount; nothing happens.
    engine.callback(&token, EventPayload::Null);
    assert_eq!(engine.try_dequeue(), None);
}

#[tokio::test]
async fn unmount_cancels_scope_spawned_tasks() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (mut engine, probe) = engine_with_probe();
            engine.render(Descriptor::tag("div").with_child(Descriptor::component("Sleeper")));
            tokio::task::yield_now().await;
            assert!(!probe.task_dropped.load(Ordering::SeqCst));

            engine.render(Descriptor::tag("div"));
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            assert!(
                probe.task_dropped.load(Ordering::SeqCst),
                "cancellation must reach the component's background task"
            );
        })
        .await;
}

#[tokio::test]
async fn run_loop_drives_rerenders_until_shutdown() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (mut engine, probe) = engine_with_probe();
            engine.render(Descriptor::component("Counter"));
            let initial = engine.try_dequeue().expect("initial batch");
            let token = onclick_token(&initial).expect("listener attribute");

            engine.callback(&token, EventPayload::Null);
            let _ = engine.try_dequeue();

            let scope = probe.scope.borrow().clone().expect("mounted scope");
            scope.rerender();
            // One loop turn processes the pending wake; the timeout then
            // interrupts the idle wait.
            let _ = tokio::time::timeout(Duration::from_millis(20), engine.run()).await;
            assert!(engine.to_html().contains(">1</button>"));
        })
        .await;
}
