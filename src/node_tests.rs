//! Node arena, operator table and serialization tests.

#[cfg(test)]
mod tests {
    use crate::ast::Ast;
    use crate::error::FormatError;
    use crate::node::{NodeId, NodeKind};
    use crate::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
    use crate::parse::parse;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ast(source: &str) -> Ast {
        Ast::from_serialized(&parse(source).unwrap()).unwrap()
    }

    fn first_statement(ast: &Ast) -> NodeId {
        ast.nodes.body(ast.root()).unwrap()[0]
    }

    fn returned(ast: &Ast) -> NodeId {
        match ast.kind(first_statement(ast)) {
            NodeKind::Return { arguments } => arguments[0],
            other => panic!("expected a return, got {}", other.type_name()),
        }
    }

    fn names(ast: &Ast, ids: Vec<NodeId>) -> Vec<String> {
        ids.into_iter()
            .map(|id| ast.nodes.name(id).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_operator_tables_are_total() {
        for op in BinaryOperator::ALL {
            assert_eq!(BinaryOperator::from_token(op.token()).unwrap(), op);
        }
        for op in UnaryOperator::ALL {
            assert_eq!(UnaryOperator::from_token(op.token()).unwrap(), op);
        }
        for op in LogicalOperator::ALL {
            assert_eq!(LogicalOperator::from_token(op.token()).unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = BinaryOperator::from_token("===").unwrap_err();
        assert!(matches!(err, FormatError::InvalidOperator(ref op) if op == "==="));
        assert!(UnaryOperator::from_token("!").is_err());
        assert!(LogicalOperator::from_token("&&").is_err());
    }

    #[test]
    fn test_unknown_operator_in_tree() {
        let value = json!({
            "type": "Chunk",
            "body": [{
                "type": "ReturnStatement",
                "arguments": [{
                    "type": "BinaryExpression",
                    "operator": "**",
                    "left": { "type": "Identifier", "name": "a" },
                    "right": { "type": "Identifier", "name": "b" }
                }]
            }]
        });
        let err = Ast::from_serialized(&value).unwrap_err();
        assert!(matches!(err, FormatError::InvalidOperator(_)));
    }

    #[test]
    fn test_invalid_ast() {
        let unknown = json!({ "type": "Chunk", "body": [{ "type": "Bogus" }] });
        match Ast::from_serialized(&unknown).unwrap_err() {
            FormatError::InvalidAst { message } => assert!(message.contains("Bogus")),
            other => panic!("expected InvalidAst, got {other:?}"),
        }

        let missing_child = json!({
            "type": "Chunk",
            "body": [{ "type": "CallStatement" }]
        });
        assert!(matches!(
            Ast::from_serialized(&missing_child).unwrap_err(),
            FormatError::InvalidAst { .. }
        ));

        let not_a_chunk = json!({ "type": "Identifier", "name": "x" });
        assert!(matches!(
            Ast::from_serialized(&not_a_chunk).unwrap_err(),
            FormatError::InvalidAst { .. }
        ));

        assert!(matches!(
            Ast::from_serialized(&json!({ "type": "Chunk" })).unwrap_err(),
            FormatError::InvalidAst { .. }
        ));
    }

    #[test]
    fn test_empty_slot_is_invalid_node() {
        let mut tree = ast("return 1 + 2");
        let binary = returned(&tree);
        if let NodeKind::Binary { left, .. } = tree.nodes.kind_mut(binary) {
            *left = None;
        }

        match tree.to_lua(2).unwrap_err() {
            FormatError::InvalidNode { kind, .. } => assert_eq!(kind, "BinaryExpression"),
            other => panic!("expected InvalidNode, got {other:?}"),
        }
        assert!(matches!(
            tree.to_serialized().unwrap_err(),
            FormatError::InvalidNode { .. }
        ));
    }

    #[test]
    fn test_references_compose() {
        let tree = ast("return a + f(b, c.d)");
        let binary = returned(&tree);
        assert_eq!(names(&tree, tree.nodes.references(binary)), vec!["a", "f", "b", "c"]);

        let NodeKind::Binary {
            left: Some(left),
            right: Some(right),
            ..
        } = *tree.kind(binary)
        else {
            panic!("expected a binary expression");
        };
        let mut joined = tree.nodes.references(left);
        joined.extend(tree.nodes.references(right));
        assert_eq!(tree.nodes.references(binary), joined);
    }

    #[test]
    fn test_declarations_are_not_references() {
        let tree = ast("local x = y");
        let local = first_statement(&tree);
        assert_eq!(names(&tree, tree.nodes.references(local)), vec!["y"]);
        assert!(tree.nodes.mentions(local, "x"));
        assert!(!tree.nodes.has_reference(local, "x"));
    }

    #[test]
    fn test_side_effects() {
        let tree = ast("return f(), {a = 1}, function() g() end, t.x");
        let NodeKind::Return { arguments } = tree.kind(first_statement(&tree)).clone() else {
            panic!("expected a return");
        };
        let effects: Vec<bool> = arguments
            .iter()
            .map(|&arg| tree.nodes.has_side_effects(arg))
            .collect();
        assert_eq!(effects, vec![true, false, false, false]);
    }

    #[test]
    fn test_serialize_round_trip_prints_the_same() {
        let source = "local t = {1, x = 2}\nfor i = 1, #t do\n  t[i] = -t[i]\nend\nreturn function(...)\n  return ...\nend";
        let tree = ast(source);
        let reloaded = Ast::from_serialized(&tree.to_serialized().unwrap()).unwrap();
        assert_eq!(reloaded.to_lua(2).unwrap(), tree.to_lua(2).unwrap());
        assert_eq!(reloaded.to_lua(2).unwrap(), source);
    }

    #[test]
    fn test_clone_node_is_deep() {
        let mut tree = ast("return a + 1");
        let binary = returned(&tree);
        let scope = tree.root_scope();
        let copy = tree.clone_node(binary, scope).unwrap();

        assert_ne!(copy, binary);
        assert_eq!(tree.node_to_lua(copy, 2).unwrap(), "a + 1");
        let NodeKind::Binary { left: Some(left), .. } = *tree.kind(copy) else {
            panic!("expected a binary expression");
        };
        let NodeKind::Binary {
            left: Some(original), ..
        } = *tree.kind(binary)
        else {
            panic!("expected a binary expression");
        };
        assert_ne!(left, original);
    }
}
