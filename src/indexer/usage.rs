//! Call and markup-tag usage detection.

use tree_sitter::Node;

use crate::index::models::Span;
use crate::indexer::classifier::is_component_name;
use crate::indexer::parser::{first_named_child, last_named_child};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageKind {
    /// `<Name/>` or `<Name>...</Name>`; always references a component.
    Tag,
    /// `name(...)` or `obj.name(...)`.
    Call,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Tag => "tag",
            UsageKind::Call => "call",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageEvent<'tree> {
    /// The right-most identifier segment at the use site.
    pub node: Node<'tree>,
    pub text: String,
    pub span: Span,
    pub kind: UsageKind,
    /// Member-access object when it is a plain identifier, as in `UI.Button`.
    pub qualifier: Option<String>,
    /// Set for any `a.b` form, including ones without a plain qualifier.
    pub member_access: bool,
}

/// Node kinds that may produce a usage event.
pub fn is_usage_kind(kind: &str) -> bool {
    matches!(
        kind,
        "call_expression" | "jsx_element" | "jsx_self_closing_element"
    )
}

/// Inspects a single node and returns the usage it represents, if any.
pub fn detect_usage<'tree>(node: &Node<'tree>, source: &[u8]) -> Option<UsageEvent<'tree>> {
    match node.kind() {
        "jsx_element" => {
            let open_tag = node
                .child_by_field_name("open_tag")
                .or_else(|| first_named_child(node))
                .filter(|n| n.kind() == "jsx_opening_element")?;
            tag_usage(&open_tag, source)
        }
        "jsx_self_closing_element" => tag_usage(node, source),
        "call_expression" => call_usage(node, source),
        _ => None,
    }
}

fn tag_usage<'tree>(element: &Node<'tree>, source: &[u8]) -> Option<UsageEvent<'tree>> {
    // Fragments have no name.
    let name = element.child_by_field_name("name")?;
    let (ident, qualifier) = rightmost_segment(&name)?;
    let text = ident.utf8_text(source).ok()?;

    if !is_component_name(text) {
        return None;
    }

    Some(UsageEvent {
        node: ident,
        text: text.to_string(),
        span: Span::of(&ident),
        kind: UsageKind::Tag,
        qualifier: qualifier.and_then(|q| q.utf8_text(source).ok().map(str::to_string)),
        member_access: ident.id() != name.id(),
    })
}

fn call_usage<'tree>(call: &Node<'tree>, source: &[u8]) -> Option<UsageEvent<'tree>> {
    let callee = call.child_by_field_name("function")?;
    let (ident, qualifier, member_access) = match callee.kind() {
        "identifier" => (callee, None, false),
        "member_expression" => {
            let property = callee.child_by_field_name("property")?;
            if property.kind() != "property_identifier" {
                return None;
            }
            (property, plain_object(&callee), true)
        }
        _ => return None,
    };

    let text = ident.utf8_text(source).ok()?;
    Some(UsageEvent {
        node: ident,
        text: text.to_string(),
        span: Span::of(&ident),
        kind: UsageKind::Call,
        qualifier: qualifier.and_then(|q| q.utf8_text(source).ok().map(str::to_string)),
        member_access,
    })
}

/// Splits a tag name into its right-most identifier and, for a two-segment
/// access, the plain-identifier object.
fn rightmost_segment<'tree>(name: &Node<'tree>) -> Option<(Node<'tree>, Option<Node<'tree>>)> {
    match name.kind() {
        "identifier" | "jsx_identifier" => Some((*name, None)),
        "member_expression" | "nested_identifier" => {
            let property = name
                .child_by_field_name("property")
                .or_else(|| last_named_child(name))?;
            Some((property, plain_object(name)))
        }
        _ => None,
    }
}

fn plain_object<'tree>(access: &Node<'tree>) -> Option<Node<'tree>> {
    access
        .child_by_field_name("object")
        .or_else(|| first_named_child(access))
        .filter(|object| object.kind() == "identifier")
}
