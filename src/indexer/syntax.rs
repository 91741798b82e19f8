//! Node kind tables shared by the binder and the traversal.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Subtrees never entered: comments, string contents and type-level syntax.
pub static SKIP_KINDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "comment",
        "string",
        "regex",
        "jsx_text",
        "html_entity",
        "html_character_reference",
        "hash_bang_line",
        // type-level syntax
        "type_annotation",
        "opting_type_annotation",
        "adding_type_annotation",
        "omitting_type_annotation",
        "asserts_annotation",
        "type_predicate_annotation",
        "interface_declaration",
        "type_alias_declaration",
        "type_arguments",
        "type_parameters",
        "type_parameter",
        "implements_clause",
        "index_signature",
        "abstract_method_signature",
        "method_signature",
        "property_signature",
        "call_signature",
        "construct_signature",
        "type_identifier",
        "nested_type_identifier",
        "predefined_type",
        "generic_type",
        "union_type",
        "intersection_type",
        "function_type",
        "constructor_type",
        "object_type",
        "array_type",
        "tuple_type",
        "literal_type",
        "lookup_type",
        "index_type_query",
        "conditional_type",
        "infer_type",
        "parenthesized_type",
        "readonly_type",
        "template_literal_type",
        "type_query",
        "this_type",
        "existential_type",
        "optional_type",
        "rest_type",
        "type_predicate",
        "asserts",
    ]
    .into_iter()
    .collect()
});

/// Statement and expression kinds walked through without any action of their own.
pub static PASS_THROUGH_KINDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // statements
        "program",
        "expression_statement",
        "lexical_declaration",
        "variable_declaration",
        "statement_block",
        "if_statement",
        "else_clause",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "try_statement",
        "catch_clause",
        "finally_clause",
        "return_statement",
        "throw_statement",
        "switch_statement",
        "switch_body",
        "switch_case",
        "switch_default",
        "break_statement",
        "continue_statement",
        "labeled_statement",
        "empty_statement",
        "debugger_statement",
        "with_statement",
        // modules
        "import_statement",
        "import_clause",
        "named_imports",
        "import_specifier",
        "namespace_import",
        "import_require_clause",
        "import_alias",
        "import_attribute",
        "export_statement",
        "export_clause",
        "export_specifier",
        "namespace_export",
        "ambient_declaration",
        "module",
        "internal_module",
        // classes and enums
        "class_declaration",
        "abstract_class_declaration",
        "class",
        "class_body",
        "class_heritage",
        "extends_clause",
        "method_definition",
        "public_field_definition",
        "field_definition",
        "class_static_block",
        "decorator",
        "decorator_member_expression",
        "decorator_call_expression",
        "enum_declaration",
        "enum_body",
        "enum_assignment",
        // expressions
        "parenthesized_expression",
        "sequence_expression",
        "member_expression",
        "subscript_expression",
        "new_expression",
        "assignment_expression",
        "augmented_assignment_expression",
        "binary_expression",
        "unary_expression",
        "update_expression",
        "ternary_expression",
        "await_expression",
        "yield_expression",
        "spread_element",
        "arguments",
        "object",
        "array",
        "pair",
        "computed_property_name",
        "template_string",
        "template_substitution",
        "arrow_function",
        "function_expression",
        "function",
        "generator_function",
        "as_expression",
        "satisfies_expression",
        "non_null_expression",
        "type_assertion",
        "instantiation_expression",
        "optional_chain",
        // parameters and patterns
        "formal_parameters",
        "required_parameter",
        "optional_parameter",
        "rest_pattern",
        "object_pattern",
        "array_pattern",
        "pair_pattern",
        "assignment_pattern",
        "object_assignment_pattern",
        // markup
        "jsx_opening_element",
        "jsx_closing_element",
        "jsx_attribute",
        "jsx_expression",
        "jsx_namespace_name",
        "jsx_identifier",
        "nested_identifier",
        // leaves
        "identifier",
        "property_identifier",
        "private_property_identifier",
        "shorthand_property_identifier",
        "shorthand_property_identifier_pattern",
        "statement_identifier",
        "this",
        "super",
        "number",
        "true",
        "false",
        "null",
        "undefined",
        "import",
        "meta_property",
        "accessibility_modifier",
        "override_modifier",
        "escape_sequence",
        "string_fragment",
    ]
    .into_iter()
    .collect()
});

/// Nodes that open a lexical container for bindings.
pub static CONTAINER_KINDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "program",
        "function_declaration",
        "generator_function_declaration",
        "function_expression",
        "function",
        "arrow_function",
        "generator_function",
        "method_definition",
    ]
    .into_iter()
    .collect()
});

pub fn is_skipped(kind: &str) -> bool {
    SKIP_KINDS.contains(kind)
}

pub fn is_pass_through(kind: &str) -> bool {
    PASS_THROUGH_KINDS.contains(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tables_are_disjoint() {
        for kind in SKIP_KINDS.iter() {
            assert!(!PASS_THROUGH_KINDS.contains(kind), "{} in both tables", kind);
        }
    }

    #[test]
    fn test_markup_and_calls_are_not_pass_through() {
        assert!(!is_pass_through("call_expression"));
        assert!(!is_pass_through("jsx_element"));
        assert!(!is_pass_through("variable_declarator"));
        assert!(is_skipped("interface_declaration"));
    }
}
