//! Blueprint template rendering.
//!
//! Templates are parsed strictly and rendered leniently: a syntax error is
//! fatal, while a reference to a variable that does not exist renders as
//! [`NO_VALUE`]. Both the native `{{ User.username }}` form and the
//! dot-prefixed `{{.User.username}}` form are accepted.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tera::{Context, Tera};

use crate::error::TemplateError;

/// Rendered in place of a variable that is absent from the context.
pub const NO_VALUE: &str = "<no value>";

const TEMPLATE_NAME: &str = "blueprint";

/// Upper bound on distinct missing variables patched per render.
const MAX_MISSING: usize = 64;

#[allow(clippy::expect_used)]
static DOT_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(-?)\s*\.").expect("dot action regex is valid"));

#[allow(clippy::expect_used)]
static MISSING_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Variable `([^`]+)` not found in context").expect("missing variable regex is valid")
});

/// `{#` anywhere, or `{%` with the word after it.
#[allow(clippy::expect_used)]
static BRACE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{#|\{%(-?\s*)(\w*)").expect("brace marker regex is valid"));

/// Tag names that open a template block.
const TAGS: &[&str] = &[
    "if", "elif", "else", "endif", "for", "endfor", "break", "continue", "set", "set_global",
    "raw", "endraw", "filter", "endfilter", "macro", "endmacro", "block", "endblock",
    "include", "import", "extends",
];

/// Wrap `marker` so the engine emits it verbatim.
fn literal(marker: &str) -> String {
    format!("{{% raw %}}{marker}{{% endraw %}}")
}

/// Rewrite `{{.X.y}}` actions to `{{ X.y}}` and make shell text such as
/// `${#arr[@]}` literal.
///
/// Only `{{ }}` actions and `{% %}` tags naming a known block are template
/// syntax; any other `{#` or `{%` is plain text.
fn normalize(text: &str) -> String {
    let text = DOT_ACTION.replace_all(text, "{{$1 ");
    BRACE_MARKER
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let Some(word) = caps.get(2) else {
                return literal("{#");
            };
            let gap = caps.get(1).map_or("", |m| m.as_str());
            let word = word.as_str();
            if TAGS.contains(&word) {
                format!("{{%{gap}{word}")
            } else {
                format!("{}{gap}{word}", literal("{%"))
            }
        })
        .into_owned()
}

/// Flatten an error and its sources into one message.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Insert [`NO_VALUE`] at a dotted path, creating intermediate objects.
///
/// Returns `false` when the path cannot be created (it crosses a
/// non-object value, uses index syntax, or already exists).
fn insert_placeholder(root: &mut Value, path: &str) -> bool {
    if path.contains('[') {
        return false;
    }
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut current = root;
    for segment in parents {
        let Value::Object(map) = current else {
            return false;
        };
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    match current {
        Value::Object(map) if !map.contains_key(*last) => {
            map.insert((*last).to_string(), Value::String(NO_VALUE.to_string()));
            true
        }
        _ => false,
    }
}

/// Render `text` against a JSON object of variables.
///
/// # Errors
///
/// Returns [`TemplateError::Parse`] when the text is not a valid template
/// and [`TemplateError::Render`] when rendering fails for a reason other
/// than a missing variable.
pub fn render(text: &str, variables: &Value) -> Result<String, TemplateError> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_template(TEMPLATE_NAME, &normalize(text))
        .map_err(|e| TemplateError::Parse(error_chain(&e)))?;

    let mut data = match variables {
        Value::Object(_) => variables.clone(),
        Value::Null => Value::Object(Map::new()),
        _ => {
            return Err(TemplateError::Render(
                "template variables must be an object".to_string(),
            ));
        }
    };

    for _ in 0..=MAX_MISSING {
        let context =
            Context::from_value(data.clone()).map_err(|e| TemplateError::Render(error_chain(&e)))?;
        match tera.render(TEMPLATE_NAME, &context) {
            Ok(rendered) => return Ok(rendered),
            Err(err) => {
                let message = error_chain(&err);
                let patched = MISSING_VARIABLE
                    .captures(&message)
                    .and_then(|caps| caps.get(1))
                    .is_some_and(|path| insert_placeholder(&mut data, path.as_str()));
                if !patched {
                    return Err(TemplateError::Render(message));
                }
            }
        }
    }
    Err(TemplateError::Render(format!(
        "more than {MAX_MISSING} missing variables"
    )))
}
