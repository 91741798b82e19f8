//! Declaration classification.
//!
//! Decides whether a declaration node introduces a function, a UI component,
//! a constant, a component candidate whose kind is left to later markup
//! usage, or nothing worth tracking. Classification looks at syntax only.

use tree_sitter::Node;

use crate::index::models::RefKind;
use crate::indexer::parser::first_named_child;

/// Node kinds that are function-shaped and carry a `body` field.
pub const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "arrow_function",
    "generator_function",
];

/// UI markup constructs. Fragments parse as `jsx_element`.
pub const MARKUP_KINDS: &[&str] = &["jsx_element", "jsx_self_closing_element"];

const PRIMITIVE_LITERAL_KINDS: &[&str] = &["string", "number", "null", "true", "false"];

const DATA_LITERAL_KINDS: &[&str] = &["object", "array"];

/// Wrappers that do not change what an initializer is.
const TRANSPARENT_WRAPPERS: &[&str] = &[
    "parenthesized_expression",
    "as_expression",
    "satisfies_expression",
    "non_null_expression",
];

/// Outcome for a tracked declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Kind(RefKind),
    /// Capitalized binding with an opaque initializer. Its kind stays unset
    /// until markup usage promotes it.
    Candidate,
}

impl Classification {
    pub fn kind(self) -> Option<RefKind> {
        match self {
            Classification::Kind(kind) => Some(kind),
            Classification::Candidate => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Kind(kind) => kind.as_str(),
            Classification::Candidate => "component candidate",
        }
    }
}

/// Declaration node kinds the classifier accepts.
pub fn is_declaration_kind(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "function_signature"
            | "variable_declarator"
    )
}

/// Returns the name node a declaration binds, if it binds a plain identifier.
pub fn declaration_name<'a>(node: &Node<'a>) -> Option<Node<'a>> {
    if !is_declaration_kind(node.kind()) {
        return None;
    }
    node.child_by_field_name("name")
        .filter(|name| name.kind() == "identifier")
}

/// Classifies a declaration node. `None` means the declaration is not tracked
/// on its own; markup usage may still promote its name later.
pub fn classify(node: &Node, source: &[u8]) -> Option<Classification> {
    match node.kind() {
        "function_signature" => Some(Classification::Kind(RefKind::Function)),
        kind if FUNCTION_KINDS.contains(&kind) => {
            Some(Classification::Kind(classify_function(node)))
        }
        "variable_declarator" => classify_variable(node, source),
        _ => None,
    }
}

fn classify_function(node: &Node) -> RefKind {
    let body = node.child_by_field_name("body").unwrap_or(*node);
    if contains_markup(&body) {
        RefKind::Component
    } else {
        RefKind::Function
    }
}

fn classify_variable(node: &Node, source: &[u8]) -> Option<Classification> {
    let name = declaration_name(node)?;
    let init = unwrap_transparent(node.child_by_field_name("value")?);

    if FUNCTION_KINDS.contains(&init.kind()) {
        return Some(Classification::Kind(classify_function(&init)));
    }

    if PRIMITIVE_LITERAL_KINDS.contains(&init.kind())
        || DATA_LITERAL_KINDS.contains(&init.kind())
    {
        return Some(Classification::Kind(RefKind::Constant));
    }

    let name = name.utf8_text(source).unwrap_or("");
    if is_component_name(name) {
        return Some(Classification::Candidate);
    }

    None
}

fn unwrap_transparent(mut node: Node) -> Node {
    while TRANSPARENT_WRAPPERS.contains(&node.kind()) {
        match first_named_child(&node) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// True if any node in the subtree is a UI markup construct.
pub fn contains_markup(node: &Node) -> bool {
    let mut cursor = node.walk();
    let mut stack = vec![*node];

    while let Some(current) = stack.pop() {
        if MARKUP_KINDS.contains(&current.kind()) {
            return true;
        }
        stack.extend(current.named_children(&mut cursor));
    }

    false
}

/// UI component naming convention: first character is an ASCII uppercase letter.
pub fn is_component_name(name: &str) -> bool {
    name.chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
}
