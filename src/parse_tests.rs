//! Parser tests: tree shape, errors and parse-then-print stability.

#[cfg(test)]
mod tests {
    use crate::ast::Ast;
    use crate::error::FormatError;
    use crate::config::FormatOptions;
    use crate::parse::parse;
    use crate::transform::{deobfuscate_source, format_source, Mode};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn reprint(source: &str) -> String {
        Ast::from_serialized(&parse(source).unwrap())
            .unwrap()
            .to_lua(2)
            .unwrap()
    }

    fn returned(source: &str) -> Value {
        let chunk = parse(source).unwrap();
        chunk["body"][0]["arguments"][0].clone()
    }

    fn syntax_position(source: &str) -> (u32, u32, String) {
        match parse(source).unwrap_err() {
            FormatError::Syntax { line, column, message } => (line, column, message),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_formatted_program_is_stable() {
        let source = "\
local t = {1, 'two', x = 3, [4] = 5}
local function add(a, b)
  return a + b
end
function t.m(self, ...)
  return ...
end
for i = 1, 10, 2 do
  if i > 5 then
    break
  elseif i == 3 then
    print(i)
  else
    t[i] = not i
  end
end
while #t > 0 do
  t[#t] = nil
end
repeat
  local x = 2 ^ -1
until x
for k, v in pairs(t) do
  print(k .. '=' .. v)
end
print((1 + 2) * 3)
return (f())";
        assert_eq!(reprint(source), source);
    }

    #[test]
    fn test_layout_is_normalized() {
        let source = "local   x=1;local y = \"a\"  if x then y=x end\nwhile true do end";
        assert_eq!(
            reprint(source),
            "local x = 1\nlocal y = 'a'\nif x then\n  y = x\nend\nwhile true do end"
        );
    }

    #[test]
    fn test_call_forms() {
        assert_eq!(reprint("f{1}\nf'x'\nobj:m(1)"), "f{1}\nf'x'\nobj:m(1)");
        assert_eq!(reprint("local v = (g)()"), "local v = g()");
    }

    #[test]
    fn test_precedence_shape() {
        let sum = returned("return 1 + 2 * 3");
        assert_eq!(sum["operator"], "+");
        assert_eq!(sum["right"]["operator"], "*");

        let power = returned("return 2 ^ 3 ^ 2");
        assert_eq!(power["left"]["type"], "NumericLiteral");
        assert_eq!(power["right"]["operator"], "^");

        let concat = returned("return a .. b .. c");
        assert_eq!(concat["right"]["operator"], "..");

        let not = returned("return not a == b");
        assert_eq!(not["operator"], "==");
        assert_eq!(not["left"]["type"], "UnaryExpression");

        let logical = returned("return a or b and c");
        assert_eq!(logical["type"], "LogicalExpression");
        assert_eq!(logical["operator"], "or");
        assert_eq!(logical["right"]["operator"], "and");
    }

    #[test]
    fn test_parentheses_are_recorded() {
        let wrapped = returned("return (f())");
        assert_eq!(wrapped["type"], "CallExpression");
        assert_eq!(wrapped["inParens"], true);
        assert_eq!(returned("return f()").get("inParens"), None);
    }

    #[test]
    fn test_locations() {
        let chunk = parse("local x = 1\nreturn x").unwrap();
        let ret = &chunk["body"][1];
        assert_eq!(ret["loc"]["start"]["line"], 2);
        assert_eq!(ret["loc"]["start"]["column"], 0);
        assert_eq!(ret["arguments"][0]["loc"]["start"]["column"], 7);
    }

    #[test]
    fn test_comments_are_collected() {
        let chunk = parse("-- head\nlocal x = 1 --[[ tail ]]").unwrap();
        assert_eq!(chunk["comments"].as_array().map(Vec::len), Some(2));
        assert_eq!(chunk["body"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_syntax_errors_carry_position() {
        let (line, column, message) = syntax_position("local = 1");
        assert_eq!((line, column), (1, 6));
        assert!(message.contains("<name>"), "{message}");

        let (line, column, message) = syntax_position("x = 1\nif x then");
        assert_eq!((line, column), (2, 9));
        assert!(message.contains("'end' expected"), "{message}");

        let (line, _, _) = syntax_position("x = 1\n\nf() = 2");
        assert_eq!(line, 3);
    }

    #[test]
    fn test_long_operator_chains() {
        let sum = format!("return {}1", "1 + ".repeat(3000));
        assert_eq!(format_source(&sum, Mode::Obfuscate, &FormatOptions::default()).unwrap(), sum);

        let concat = format!("return {}'z'", "'a' .. ".repeat(3000));
        assert_eq!(deobfuscate_source(&concat).unwrap(), concat);
    }
}
