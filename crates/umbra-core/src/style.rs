// SPDX-License-Identifier: Apache-2.0
//! Inline style model and per-property diffing.
//!
//! The `style` prop is a map diffed property by property so that touching one
//! declaration never rewrites the whole attribute. Numeric values pick up a
//! `px` suffix unless the property is unitless by default or is a custom
//! property.

use std::collections::BTreeMap;
use std::sync::Arc;

use umbra_proto::{DomId, Patch, PatchSet};

use crate::descriptor::fmt_number;

/// Inline style declarations, keyed by snake_case property name.
pub type StyleMap = BTreeMap<Arc<str>, StyleValue>;

/// One inline style declaration value.
#[derive(Clone, PartialEq, Debug)]
pub enum StyleValue {
    /// Numeric value; formatted with a `px` suffix unless the property is
    /// unitless by default.
    Number(f64),
    /// Literal value, written through unchanged.
    Text(Arc<str>),
}

impl From<f64> for StyleValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for StyleValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for StyleValue {
    fn from(v: &str) -> Self {
        Self::Text(Arc::from(v))
    }
}

/// Properties whose bare numbers are valid CSS without a unit.
const UNITLESS_PROPERTIES: &[&str] = &[
    "animation_iteration_count",
    "aspect_ratio",
    "column_count",
    "columns",
    "flex",
    "flex_grow",
    "flex_shrink",
    "font_weight",
    "grid_column",
    "grid_column_end",
    "grid_column_start",
    "grid_row",
    "grid_row_end",
    "grid_row_start",
    "line_clamp",
    "line_height",
    "opacity",
    "order",
    "orphans",
    "scale",
    "tab_size",
    "widows",
    "z_index",
    "zoom",
    "fill_opacity",
    "flood_opacity",
    "stop_opacity",
    "stroke_dasharray",
    "stroke_dashoffset",
    "stroke_miterlimit",
    "stroke_opacity",
    "stroke_width",
];

/// Renders a snake_case property name as its CSS form. A `__` prefix (or a
/// literal `--`) marks a custom property and suppresses unit handling.
pub(crate) fn css_property_name(name: &str) -> String {
    if name.starts_with("--") {
        name.to_string()
    } else if let Some(rest) = name.strip_prefix("__") {
        format!("--{}", rest.replace('_', "-"))
    } else {
        name.replace('_', "-")
    }
}

fn is_unitless(name: &str) -> bool {
    name.starts_with("__") || name.starts_with("--") || UNITLESS_PROPERTIES.contains(&name)
}

/// Formats one declaration value, applying the `px` default unit.
pub(crate) fn css_value(name: &str, value: &StyleValue) -> String {
    match value {
        StyleValue::Text(text) => text.to_string(),
        StyleValue::Number(n) => {
            let body = fmt_number(*n);
            if *n != 0.0 && !is_unitless(name) {
                format!("{body}px")
            } else {
                body
            }
        }
    }
}

/// Serializes a whole style map as an inline `style` attribute body.
pub(crate) fn style_to_css(map: &StyleMap) -> String {
    let mut out = String::new();
    for (name, value) in map {
        out.push_str(&css_property_name(name));
        out.push(':');
        out.push_str(&css_value(name, value));
        out.push(';');
    }
    out
}

/// Diffs two style maps, emitting one patch per changed declaration.
pub(crate) fn diff_style(
    id: DomId,
    old: Option<&StyleMap>,
    new: Option<&StyleMap>,
    patches: &mut PatchSet,
) {
    static EMPTY: StyleMap = StyleMap::new();
    let old = old.unwrap_or(&EMPTY);
    let new = new.unwrap_or(&EMPTY);

    for name in old.keys() {
        if !new.contains_key(name) {
            patches.push(Patch::RemoveCssProperty {
                id,
                name: css_property_name(name),
            });
        }
    }
    for (name, value) in new {
        if old.get(name) != Some(value) {
            patches.push(Patch::SetCssProperty {
                id,
                name: css_property_name(name),
                value: css_value(name, value),
            });
        }
    }
}
