//! Stack safety for recursion over deeply nested trees.
//!
//! Obfuscated chunks routinely carry operator chains thousands of terms long.
//! Every recursive descent (parsing, loading, serializing, printing, walking)
//! goes through [`ensure_sufficient_stack`], which grows the stack on demand.

use serde_json::Value;

/// If less than this remains, the stack is grown.
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// Drops a serialized tree without recursing on its depth.
pub fn dismantle(value: Value) {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.into_iter().map(|(_, child)| child)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_recursion_does_not_overflow() {
        fn depth(n: usize) -> usize {
            ensure_sufficient_stack(|| if n == 0 { 0 } else { depth(n - 1) + 1 })
        }
        assert_eq!(depth(200_000), 200_000);
    }

    #[test]
    fn test_dismantle_deep_value() {
        let mut value = json!(0);
        for _ in 0..100_000 {
            let mut map = serde_json::Map::new();
            map.insert("left".into(), value);
            value = Value::Array(vec![Value::Object(map)]);
        }
        dismantle(value);
    }
}
