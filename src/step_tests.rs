//! Rewrite pass tests, one pass at a time.

#[cfg(test)]
mod tests {
    use crate::ast::Ast;
    use crate::error::Result;
    use crate::node::{NodeId, NodeKind};
    use crate::parse::parse;
    use crate::state::LuaState;
    use crate::step::{
        FixupFunctionNameStep, InlineStep, Pass, Step, StepContext, StripDeadCodeStep, TableConstructorStep,
        MIN_ITERATIONS,
    };
    use pretty_assertions::assert_eq;

    fn ast(source: &str) -> Ast {
        Ast::from_serialized(&parse(source).unwrap()).unwrap()
    }

    /// Applies `pass` once to `source`: printed result and the changed flag.
    fn run<P: Pass>(pass: P, source: &str) -> (String, bool) {
        let mut tree = ast(source);
        let changed = Step::new(pass).apply(&mut tree, 0).unwrap();
        (tree.to_lua(2).unwrap(), changed)
    }

    fn assert_untouched<P: Pass>(pass: P, source: &str) {
        assert_eq!(run(pass, source), (source.to_string(), false));
    }

    fn body(tree: &Ast, block: NodeId) -> Vec<NodeId> {
        tree.nodes.body(block).cloned().unwrap_or_default()
    }

    /// Re-arms on every iteration and never changes the tree.
    struct Restless;

    impl Pass for Restless {
        const NAME: &'static str = "Restless";

        fn begin_iteration(&mut self, ctx: &mut StepContext) {
            ctx.rearm();
        }
    }

    /// Removes `targets` when visiting `trigger`; records every statement seen.
    #[derive(Default)]
    struct Remover {
        trigger: Option<NodeId>,
        targets: Vec<NodeId>,
        seen: Vec<NodeId>,
    }

    impl Pass for Remover {
        const NAME: &'static str = "Remover";

        fn pre_visit(
            &mut self,
            ctx: &mut StepContext,
            ast: &mut Ast,
            node: NodeId,
            _state: &mut LuaState,
        ) -> Result<Option<NodeId>> {
            if matches!(ast.kind(node), NodeKind::CallStatement { .. }) {
                self.seen.push(node);
            }
            if Some(node) == self.trigger {
                for &target in &self.targets {
                    ctx.remove_node(ast, target);
                }
            }
            Ok(None)
        }
    }

    /// Drops every clause of every `if` statement.
    struct DropClauses;

    impl Pass for DropClauses {
        const NAME: &'static str = "DropClauses";

        fn pre_visit(
            &mut self,
            ctx: &mut StepContext,
            ast: &mut Ast,
            node: NodeId,
            _state: &mut LuaState,
        ) -> Result<Option<NodeId>> {
            let clause = matches!(
                ast.kind(node),
                NodeKind::IfClause { .. } | NodeKind::ElseifClause { .. } | NodeKind::ElseClause { .. }
            );
            if clause && !ctx.is_pending(node) {
                ctx.remove_node(ast, node);
                ctx.rearm();
            }
            Ok(None)
        }
    }

    /// Counts `repeat` conditions handed to the pass.
    #[derive(Default)]
    struct UntilCounter {
        calls: usize,
    }

    impl Pass for UntilCounter {
        const NAME: &'static str = "UntilCounter";

        fn visit_until(
            &mut self,
            _ctx: &mut StepContext,
            _ast: &mut Ast,
            _repeat: NodeId,
            _state: &mut LuaState,
        ) -> Result<()> {
            self.calls += 1;
            Ok(())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DRIVER
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_idle_pass_runs_one_iteration() {
        let mut tree = ast("return 1");
        let mut step = Step::new(InlineStep::new());
        assert!(!step.apply(&mut tree, 0).unwrap());
        assert_eq!(step.iterations(), 1);
    }

    #[test]
    fn test_second_apply_finds_nothing() {
        let mut tree = ast("local a = 1\nreturn a");
        let mut step = Step::new(InlineStep::new());
        assert!(step.apply(&mut tree, MIN_ITERATIONS).unwrap());
        assert!(step.iterations() > 1);
        assert!(!step.apply(&mut tree, MIN_ITERATIONS).unwrap());
        assert_eq!(tree.to_lua(2).unwrap(), "return 1");
    }

    #[test]
    fn test_iteration_cap_stops_a_restless_pass() {
        let mut tree = ast("return 1");
        let mut step = Step::new(Restless);
        assert!(!step.apply(&mut tree, 0).unwrap());
        assert_eq!(step.iterations(), MIN_ITERATIONS);

        assert!(!step.apply(&mut tree, MIN_ITERATIONS + 8).unwrap());
        assert_eq!(step.iterations(), MIN_ITERATIONS + 8);
        assert_eq!(tree.to_lua(2).unwrap(), "return 1");
    }

    #[test]
    fn test_walk_resumes_after_removed_neighbours() {
        let mut tree = ast("a()\nb()\nc()\nd()");
        let stmts = body(&tree, tree.root());
        let pass = Remover {
            trigger: Some(stmts[1]),
            targets: vec![stmts[0], stmts[1], stmts[2]],
            ..Remover::default()
        };
        let mut step = Step::new(pass);
        assert!(step.apply(&mut tree, 0).unwrap());
        assert_eq!(step.pass().seen, vec![stmts[0], stmts[1], stmts[3]]);
        assert_eq!(tree.to_lua(2).unwrap(), "d()");
    }

    #[test]
    fn test_unlocated_removal_waits_for_its_block() {
        let mut tree = ast("do\n  f()\n  g()\nend\ndo\n  h()\nend");
        let blocks = body(&tree, tree.root());
        let late = body(&tree, blocks[0])[1];
        // Recorded in the other block, so the scope chain never reaches it.
        let elsewhere = tree.nodes.scope(body(&tree, blocks[1])[0]);
        tree.nodes.get_mut(late).scope = elsewhere;

        let mut ctx = StepContext::default();
        ctx.remove_node(&mut tree, late);
        assert!(ctx.is_pending(late));
        assert!(!ctx.is_changed());

        let pass = Remover {
            trigger: Some(late),
            targets: vec![late],
            ..Remover::default()
        };
        let mut step = Step::new(pass);
        assert!(step.apply(&mut tree, 0).unwrap());
        assert_eq!(tree.to_lua(2).unwrap(), "do\n  f()\nend\ndo\n  h()\nend");
    }

    #[test]
    fn test_if_without_clauses_is_removed() {
        let (out, changed) = run(DropClauses, "if a then\n  f()\nelseif b then\n  g()\nelse\n  h()\nend\nreturn 1");
        assert!(changed);
        assert_eq!(out, "return 1");
    }

    #[test]
    fn test_repeat_condition_reaches_the_pass() {
        let mut tree = ast("repeat\n  f()\nuntil g()\nrepeat\n  h()\nuntil true");
        let mut step = Step::new(UntilCounter::default());
        assert!(!step.apply(&mut tree, 0).unwrap());
        assert_eq!(step.pass().calls, 2);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INLINE
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_inline_chain() {
        assert_eq!(
            run(InlineStep::new(), "local a = 1\nlocal b = a + 2\nreturn b"),
            ("return 1 + 2".to_string(), true)
        );
    }

    #[test]
    fn test_inline_into_call() {
        let (out, _) = run(InlineStep::new(), "local s = 'hello'\nlocal p = print\np(s)");
        assert_eq!(out, "print('hello')");
    }

    #[test]
    fn test_inline_reassignment() {
        let (out, _) = run(InlineStep::new(), "local x = 1\nx = x + 2\nprint(x)");
        assert_eq!(out, "local x\nprint(1 + 2)");
    }

    #[test]
    fn test_inline_keeps_first_value_of_tail_call() {
        let (out, _) = run(InlineStep::new(), "local a = f()\nreturn 1, a");
        assert_eq!(out, "return 1, (f())");
    }

    #[test]
    fn test_literal_moves_into_loop_bound() {
        let (out, _) = run(InlineStep::new(), "local n = 5\nfor i = 1, n do\n  print(i)\nend");
        assert_eq!(out, "for i = 1, 5 do\n  print(i)\nend");
    }

    #[test]
    fn test_loop_counter_is_left_alone() {
        assert_untouched(
            InlineStep::new(),
            "local i = 0\nwhile i < 10 do\n  i = i + 1\nend\nreturn i",
        );
    }

    #[test]
    fn test_call_result_stays_out_of_loop() {
        assert_untouched(InlineStep::new(), "local t = f()\nwhile true do\n  print(t)\nend");
    }

    #[test]
    fn test_twice_read_value_is_kept() {
        assert_untouched(InlineStep::new(), "local a = f()\nprint(a, a)");
    }

    #[test]
    fn test_globals_are_not_inlined() {
        assert_untouched(InlineStep::new(), "x = 1\nprint(x)");
    }

    #[test]
    fn test_literal_moves_into_until() {
        assert_eq!(
            run(InlineStep::new(), "repeat\n  local b = 2\nuntil b"),
            ("repeat until 2".to_string(), true)
        );
    }

    #[test]
    fn test_call_result_stays_out_of_until() {
        assert_untouched(InlineStep::new(), "local a = f()\nrepeat\n  g()\nuntil a");
    }

    #[test]
    fn test_literal_moves_into_closure() {
        let (out, _) = run(InlineStep::new(), "local x = 1\nprint(function()\n  return x\nend)");
        assert_eq!(out, "print(function()\n  return 1\nend)");
    }

    #[test]
    fn test_values_stay_out_of_closures() {
        // Each call of `g` would build a fresh table or call `f` again.
        assert_untouched(
            InlineStep::new(),
            "local x = {}\nlocal function g()\n  return x\nend\nprint(g() == g())",
        );
        assert_untouched(
            InlineStep::new(),
            "local x = f()\nlocal function g()\n  return x\nend\nprint(g(), g())",
        );
    }

    #[test]
    fn test_goto_loop_keeps_its_state() {
        assert_untouched(
            InlineStep::new(),
            "local x = 1\n::top::\nprint(x)\nx = x + 1\nif x < 3 then\n  goto top\nend",
        );
    }

    #[test]
    fn test_mutated_table_is_read_first() {
        // `#t` must be taken before the store into `t`.
        assert_untouched(InlineStep::new(), "local t = {}\nlocal n = #t\nt[1] = 5\nprint(n)");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TABLE CONSTRUCTOR
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_fields_fold_into_constructor() {
        assert_eq!(
            run(TableConstructorStep::new(), "local t = {}\nt.x = 1\nt.y = 2"),
            ("local t = {x = 1, y = 2}".to_string(), true)
        );
    }

    #[test]
    fn test_literal_keys_fold_into_constructor() {
        let (out, _) = run(TableConstructorStep::new(), "local t = {}\nt[2] = 'b'");
        assert_eq!(out, "local t = {[2] = 'b'}");
    }

    #[test]
    fn test_fold_stops_at_read() {
        let (out, _) = run(TableConstructorStep::new(), "local t = {}\nt.x = 1\nprint(t)\nt.y = 2");
        assert_eq!(out, "local t = {x = 1}\nprint(t)\nt.y = 2");
    }

    #[test]
    fn test_global_tables_are_not_folded() {
        assert_untouched(TableConstructorStep::new(), "t = {}\nt.x = 1");
    }

    #[test]
    fn test_many_fields_fold_in_place() {
        let mut source = String::from("local t = {}");
        let mut fields = Vec::new();
        for i in 0..200 {
            source.push_str(&format!("\nt.f{i} = {i}"));
            fields.push(format!("  f{i} = {i}"));
        }
        let mut tree = ast(&source);
        let before = tree.nodes.len();

        let mut step = Step::new(TableConstructorStep::new());
        assert!(step.apply(&mut tree, 0).unwrap());
        assert_eq!(tree.to_lua(2).unwrap(), format!("local t = {{\n{}\n}}", fields.join(",\n")));
        // One new field node per assignment; the declaration itself moves.
        assert!(tree.nodes.len() <= before + fields.len());

        assert!(!step.apply(&mut tree, 0).unwrap());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FUNCTION NAMES
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_local_function_name() {
        let mut tree = ast("local f = function() end");
        let mut step = Step::new(FixupFunctionNameStep::new());
        assert!(step.apply(&mut tree, 0).unwrap());
        assert_eq!(tree.to_lua(2).unwrap(), "local function f() end");
        assert!(!step.apply(&mut tree, 0).unwrap());
    }

    #[test]
    fn test_member_function_name() {
        let (out, changed) = run(FixupFunctionNameStep::new(), "t.f = function(a)\n  return a\nend");
        assert!(changed);
        assert_eq!(out, "function t.f(a)\n  return a\nend");
    }

    #[test]
    fn test_self_reference_keeps_anonymous_function() {
        assert_untouched(FixupFunctionNameStep::new(), "local f = function()\n  return f()\nend");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEAD CODE
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_dead_writes_are_removed() {
        assert_eq!(
            run(StripDeadCodeStep::new(), "local x = 1\nlocal y = f()\nreturn 2"),
            ("f()\nreturn 2".to_string(), true)
        );
    }

    #[test]
    fn test_superseded_write_is_dropped() {
        let (out, changed) = run(StripDeadCodeStep::new(), "local x = 1\nx = 2\nreturn x");
        assert!(changed);
        assert_eq!(out, "local x = 2\nreturn x");
    }

    #[test]
    fn test_unread_name_leaves_multi_local() {
        let (out, _) = run(StripDeadCodeStep::new(), "local a, b = 1, 2\nreturn a");
        assert_eq!(out, "local a = 1\nreturn a");
    }

    #[test]
    fn test_live_and_impure_writes_survive() {
        assert_untouched(StripDeadCodeStep::new(), "local x = 1\nreturn x");
        assert_untouched(StripDeadCodeStep::new(), "local x = 1 + f()");
        assert_untouched(
            StripDeadCodeStep::new(),
            "local x = 0\nfor i = 1, 3 do\n  x = i\nend",
        );
    }

    #[test]
    fn test_write_read_by_closure_survives() {
        assert_untouched(
            StripDeadCodeStep::new(),
            "local x = 1\nlocal g = function()\n  return x\nend\nx = 5\nprint(g())",
        );
    }

    #[test]
    fn test_stripped_tree_is_a_fixed_point() {
        let mut tree = ast("local x = 1\nx = 2\nlocal y = f()\nreturn x");
        let mut step = Step::new(StripDeadCodeStep::new());
        assert!(step.apply(&mut tree, 0).unwrap());
        let stripped = tree.to_lua(2).unwrap();
        assert!(!step.apply(&mut tree, 0).unwrap());
        assert_eq!(tree.to_lua(2).unwrap(), stripped);
    }
}
