// SPDX-License-Identifier: Apache-2.0
//! Head aggregation: out-of-band contributions, deduplication, stylesheet
//! assets.

use umbra_core::{
    Component, ComponentResolver, Descriptor, Engine, EngineConfig, Patch, Props, RenderFault,
    Scope,
};

fn title(text: &str) -> Descriptor {
    Descriptor::head()
        .with_child(Descriptor::tag("title").with_child(text))
        .into()
}

#[test]
fn contributions_render_into_one_synthetic_head() {
    let mut engine = Engine::new(EngineConfig::default(), umbra_core::NoComponents);
    engine.render(
        Descriptor::tag("div")
            .with_child(title("Hello"))
            .with_child("body"),
    );
    assert_eq!(
        engine.to_html(),
        "<head><title>Hello</title></head><div>body</div>"
    );
}

#[test]
fn head_occupies_no_tree_position() {
    let mut engine = Engine::new(EngineConfig::default(), umbra_core::NoComponents);
    engine.render(
        Descriptor::tag("div")
            .with_child(Descriptor::tag("p").with_child("a"))
            .with_child(title("T"))
            .with_child(Descriptor::tag("p").with_child("b")),
    );
    assert_eq!(
        engine.to_html(),
        "<head><title>T</title></head><div><p>a</p><p>b</p></div>"
    );
}

#[test]
fn identical_contributions_appear_exactly_once() {
    let mut engine = Engine::new(EngineConfig::default(), umbra_core::NoComponents);
    let meta = || -> Descriptor {
        Descriptor::head()
            .with_child(Descriptor::tag("meta").with_prop("charset", "utf-8"))
            .into()
    };
    engine.render(
        Descriptor::tag("div")
            .with_child(meta())
            .with_child(meta()),
    );
    assert_eq!(
        engine.to_html(),
        "<head><meta charset=\"utf-8\"></head><div></div>"
    );
}

#[test]
fn removed_then_readded_contribution_is_not_duplicated() {
    let mut engine = Engine::new(EngineConfig::default(), umbra_core::NoComponents);
    let with_title = Descriptor::tag("div")
        .with_key("root")
        .with_child(title("Page"));
    let without_title = Descriptor::tag("div").with_key("root");

    engine.render(with_title.clone());
    assert_eq!(
        engine.to_html(),
        "<head><title>Page</title></head><div></div>"
    );

    engine.render(without_title);
    assert_eq!(engine.to_html(), "<div></div>");

    engine.render(with_title);
    assert_eq!(
        engine.to_html(),
        "<head><title>Page</title></head><div></div>"
    );
}

#[test]
fn contribution_updates_rerender_the_head_in_place() {
    let mut engine = Engine::new(EngineConfig::default(), umbra_core::NoComponents);
    engine.render(Descriptor::tag("div").with_child(title("One")));
    let _ = engine.try_dequeue();

    engine.render(Descriptor::tag("div").with_child(title("Two")));
    let set = engine.try_dequeue().expect("update batch");
    assert!(set
        .iter()
        .any(|p| matches!(p, Patch::SetTextContent { content, .. } if content == "Two")));
    assert_eq!(
        engine.to_html(),
        "<head><title>Two</title></head><div></div>"
    );
}

// A styled component type whose module resolution carries a stylesheet
// asset.
struct Styled;

impl Component for Styled {
    fn render(&self) -> Result<Descriptor, RenderFault> {
        Ok(Descriptor::tag("section").with_child("styled").into())
    }
}

struct StyledResolver;

impl ComponentResolver for StyledResolver {
    fn resolve(
        &self,
        type_name: &str,
        _props: &Props,
        _scope: &Scope,
    ) -> Result<Box<dyn Component>, RenderFault> {
        match type_name {
            "Styled" => Ok(Box::new(Styled)),
            other => Err(RenderFault::UnknownComponent {
                type_name: other.to_string(),
            }),
        }
    }

    fn assets_for(&self, type_name: &str) -> Vec<String> {
        match type_name {
            "Styled" => vec!["styled.abc123.css".to_string()],
            _ => Vec::new(),
        }
    }
}

#[test]
fn stylesheet_assets_surface_exactly_once() {
    let mut engine = Engine::new(EngineConfig::default(), StyledResolver);
    engine.render(Descriptor::tag("div").with_child(Descriptor::component("Styled")));
    let set = engine.try_dequeue().expect("initial batch");
    assert_eq!(
        set.iter()
            .filter(|p| matches!(p, Patch::AddStyleSheet { .. }))
            .count(),
        1
    );
    assert!(engine
        .to_html()
        .starts_with("<head><link href=\"styled.abc123.css\" rel=\"stylesheet\"></head>"));

    // A second instance of the same type adds nothing.
    engine.render(
        Descriptor::tag("div")
            .with_child(Descriptor::component("Styled"))
            .with_child(Descriptor::component("Styled")),
    );
    let set = engine.try_dequeue().expect("second batch");
    assert_eq!(
        set.iter()
            .filter(|p| matches!(p, Patch::AddStyleSheet { .. }))
            .count(),
        0
    );
}
