//! Template resolution: `{{name}}` and `{{step.path.to.field}}` placeholders.
//!
//! Substitution is textual and single-pass: the template is scanned once and
//! every placeholder is replaced by the string form of its value. Text that
//! comes out of a substituted value is never scanned again, so a value that
//! itself contains `{{…}}` or `$1` is emitted verbatim.
//!
//! Lookup order for a key is builtin values, user inputs, step outputs. A
//! dotted key whose head names a step output walks into that output. Anything
//! that does not resolve becomes the empty string.

use serde_json::Value;

use crate::context::ExecutionContext;

/// Resolve every placeholder inside `template`, recursing through arrays and
/// objects. Object keys and non-string scalars are returned unchanged.
pub fn resolve(template: &Value, ctx: &ExecutionContext) -> Value {
    match template {
        Value::String(s) => Value::String(resolve_str(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve the placeholders of a single string.
pub fn resolve_str(template: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after[..end];
        if is_placeholder_key(key) {
            out.push_str(&lookup(key, ctx));
            rest = &after[end + 2..];
        } else {
            // Not a placeholder (e.g. "{{{x}}"): emit one brace and rescan.
            out.push('{');
            rest = &rest[start + 1..];
        }
    }

    out.push_str(rest);
    out
}

fn is_placeholder_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with('.')
        && !key.chars().any(|c| c.is_whitespace() || c == '{' || c == '}')
}

fn lookup(key: &str, ctx: &ExecutionContext) -> String {
    if let Some(v) = ctx.builtin_values.get(key) {
        return v.clone();
    }
    if let Some(v) = ctx.user_inputs.get(key) {
        return stringify(v);
    }
    if let Some(v) = ctx.step_outputs.get(key) {
        return stringify(v);
    }
    if let Some((head, path)) = key.split_once('.') {
        if let Some(output) = ctx.step_outputs.get(head) {
            return get_path(output, path).map(stringify).unwrap_or_default();
        }
    }
    String::new()
}

/// Walk a dotted path into `value`. Numeric segments index arrays.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Strings are inserted raw; every other value as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::default();
        ctx.builtin_values.insert("currentDate".into(), "2024-01-02".into());
        ctx.user_inputs.insert("url".into(), json!("https://x.test"));
        ctx.user_inputs.insert("count".into(), json!(3));
        ctx.user_inputs.insert("tags".into(), json!(["a", "b"]));
        ctx.user_inputs.insert("price".into(), json!("costs $1 or $&"));
        ctx.step_outputs.insert(
            "fetch".into(),
            json!({ "success": true, "data": { "title": "Hi", "items": [{ "n": 1 }], "none": null } }),
        );
        ctx
    }

    #[test]
    fn substitutes_each_namespace() {
        let ctx = ctx();
        assert_eq!(resolve_str("{{currentDate}}: {{url}}", &ctx), "2024-01-02: https://x.test");
        assert_eq!(resolve_str("n={{count}}", &ctx), "n=3");
        assert_eq!(resolve_str("{{tags}}", &ctx), r#"["a","b"]"#);
    }

    #[test]
    fn whole_value_placeholder_yields_a_string() {
        let resolved = resolve(&json!({ "n": "{{count}}" }), &ctx());
        assert_eq!(resolved["n"], json!("3"));
    }

    #[test]
    fn builtin_wins_over_user_input() {
        let mut ctx = ctx();
        ctx.user_inputs.insert("currentDate".into(), json!("user value"));
        assert_eq!(resolve_str("{{currentDate}}", &ctx), "2024-01-02");
    }

    #[test]
    fn whole_step_output_is_serialized() {
        let ctx = ctx();
        let out = resolve_str("{{fetch}}", &ctx);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["data"]["title"], "Hi");
    }

    #[test]
    fn dotted_paths_walk_into_step_output() {
        let ctx = ctx();
        assert_eq!(resolve_str("{{fetch.data.title}}", &ctx), "Hi");
        assert_eq!(resolve_str("{{fetch.data.items.0.n}}", &ctx), "1");
        assert_eq!(resolve_str("{{fetch.success}}", &ctx), "true");
        assert_eq!(resolve_str("{{fetch.data.none}}", &ctx), "null");
    }

    #[test]
    fn missing_values_become_empty() {
        let ctx = ctx();
        assert_eq!(resolve_str("[{{fetch.data.missing.deep}}]", &ctx), "[]");
        assert_eq!(resolve_str("[{{nobody}}]", &ctx), "[]");
        assert_eq!(resolve_str("[{{later.data}}]", &ctx), "[]");
    }

    #[test]
    fn replacement_metacharacters_are_literal() {
        let ctx = ctx();
        assert_eq!(resolve_str("{{price}}", &ctx), "costs $1 or $&");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let mut ctx = ctx();
        ctx.user_inputs.insert("sneaky".into(), json!("{{url}}"));
        assert_eq!(resolve_str("{{sneaky}}", &ctx), "{{url}}");
    }

    #[test]
    fn malformed_braces_are_left_alone() {
        let ctx = ctx();
        assert_eq!(resolve_str("{{ url }}", &ctx), "{{ url }}");
        assert_eq!(resolve_str("open {{url", &ctx), "open {{url");
        assert_eq!(resolve_str("{{{url}}}", &ctx), "{https://x.test}");
    }

    #[test]
    fn nested_structures_are_deep_substituted() {
        let ctx = ctx();
        let template = json!({
            "messages": [{ "role": "user", "content": "Summarize {{fetch.data.title}}" }],
            "stream": false,
            "limit": 10,
            "{{url}}": "keys stay"
        });
        let resolved = resolve(&template, &ctx);
        assert_eq!(resolved["messages"][0]["content"], "Summarize Hi");
        assert_eq!(resolved["stream"], false);
        assert_eq!(resolved["limit"], 10);
        assert_eq!(resolved["{{url}}"], "keys stay");
    }

    #[test]
    fn resolution_is_deterministic() {
        let ctx = ctx();
        let template = json!({ "a": "{{url}}/{{fetch.data.title}}", "b": ["{{count}}"] });
        assert_eq!(resolve(&template, &ctx), resolve(&template, &ctx));
    }
}
