// SPDX-License-Identifier: Apache-2.0
//! HTML serialization primitives: escaping, attribute names, void elements.

/// Elements that render self-closing and never carry children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// True for tags in the HTML void-element set.
pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Escapes character data for a text position.
pub(crate) fn escape_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

/// Escapes an attribute value for a double-quoted position.
pub(crate) fn escape_attribute(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

/// Escapes a comment body; `--` is not representable inside a comment.
pub(crate) fn escape_comment(input: &str) -> String {
    input.replace("--", "&#45;&#45;")
}

/// Renders a snake_case prop name as its attribute form (`data_id` →
/// `data-id`); a `__` prefix escapes the mapping for literal names.
pub(crate) fn attribute_name(name: &str) -> String {
    name.strip_prefix("__")
        .map_or_else(|| name.replace('_', "-"), ToString::to_string)
}
