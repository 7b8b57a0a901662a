// autofix-orchestrator-rs/src/extract.rs
// Tolerant extraction of JSON and file paths from free-form model replies and logs

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").ok());

static SOURCE_PATH: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r#"(?:^|[\s'"`(\[])((?:\.{0,2}/)?(?:[\w.-]+/)*[\w-][\w.-]*\.(?:rs|go|py|js|jsx|ts|tsx|java|kt|kts|rb|php|cs|c|cc|cpp|h|hpp|swift|scala|toml|json|ya?ml|xml|gradle|mod|sum|lock|cfg|ini))(?::\d+)*"#,
    )
    .ok()
});

const MAX_SCANNED_PATHS: usize = 20;

/// Finds the first JSON value in a model reply: a fenced block if there is
/// one, otherwise the first `{` or `[` that starts a complete document.
/// Leading prose and trailing commentary are ignored.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(re) = FENCED_BLOCK.as_ref() {
        for caps in re.captures_iter(text) {
            if let Some(value) = first_document(&caps[1]) {
                return Some(value);
            }
        }
    }
    first_document(text)
}

fn first_document(text: &str) -> Option<Value> {
    for (start, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Some(value);
        }
    }
    None
}

/// Source file paths mentioned in `text`, in order of first appearance.
pub fn scan_paths(text: &str) -> Vec<String> {
    let Some(re) = SOURCE_PATH.as_ref() else {
        return Vec::new();
    };
    let mut paths: Vec<String> = Vec::new();
    for caps in re.captures_iter(text) {
        let path = caps[1].trim_start_matches("./").to_string();
        if path.contains("://") || paths.contains(&path) {
            continue;
        }
        paths.push(path);
        if paths.len() == MAX_SCANNED_PATHS {
            break;
        }
    }
    paths
}

/// A string field, trimmed; `None` when absent, empty or not a string.
pub fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A list of strings, accepting a single string in place of the list.
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_json_is_preferred() {
        let reply = "Here is the analysis:\n```json\n{\"root_cause\": \"missing import\"}\n```\nHope it helps {not json}";
        assert_eq!(extract_json(reply), Some(json!({"root_cause": "missing import"})));
    }

    #[test]
    fn leading_prose_is_skipped() {
        let reply = "Sure, here you go: {\"fixes\": []} and {nothing else}";
        assert_eq!(extract_json(reply), Some(json!({"fixes": []})));
    }

    #[test]
    fn plain_text_has_no_json() {
        assert_eq!(extract_json("The build broke because of a typo."), None);
    }

    #[test]
    fn paths_are_deduplicated_in_order() {
        let log = "error[E0425]: cannot find value `x`\n --> src/lib.rs:10:5\n\
                   ./cmd/main.go:3:1: undefined: Foo\n src/lib.rs:12:1 again\n\
                   see https://example.com/docs/page.html";
        assert_eq!(scan_paths(log), vec!["src/lib.rs", "cmd/main.go"]);
    }

    #[test]
    fn string_fields() {
        let v = json!({"a": "  x ", "b": "", "list": ["one", " ", "two"], "single": "solo"});
        assert_eq!(str_field(&v, "a"), Some("x"));
        assert_eq!(str_field(&v, "b"), None);
        assert_eq!(string_list(&v, "list"), vec!["one", "two"]);
        assert_eq!(string_list(&v, "single"), vec!["solo"]);
        assert!(string_list(&v, "missing").is_empty());
    }
}
