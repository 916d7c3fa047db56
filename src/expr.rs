use crate::error::Result;
use crate::event::EventSink;
use regex::Regex;
use serde_json::{json, Value};

/// Structured expression value spliced into a template document.
///
/// Placeholders in include text parse into `Ref`/`Att`/`Base64` nodes; the
/// surrounding text stays literal. Rendered into CloudFormation intrinsic
/// function JSON by [`Expr::to_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(String),
    Ref(String),
    Att { resource: String, attribute: String },
    Base64(Box<Expr>),
    Concat(Vec<Expr>),
}

impl Expr {
    /// Renders the expression as CloudFormation JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Expr::Literal(text) => Value::String(text.clone()),
            Expr::Ref(name) => json!({ "Ref": name }),
            Expr::Att {
                resource,
                attribute,
            } => json!({ "Fn::GetAtt": [resource, attribute] }),
            Expr::Base64(inner) => json!({ "Fn::Base64": inner.to_value() }),
            Expr::Concat(parts) => {
                let rendered: Vec<Value> = parts.iter().map(Expr::to_value).collect();
                json!({ "Fn::Join": ["", rendered] })
            }
        }
    }

    /// Number of structured (non-literal) parts in the expression.
    pub fn placeholder_count(&self) -> usize {
        match self {
            Expr::Literal(_) => 0,
            Expr::Ref(_) | Expr::Att { .. } => 1,
            Expr::Base64(inner) => inner.placeholder_count(),
            Expr::Concat(parts) => parts.iter().map(Expr::placeholder_count).sum(),
        }
    }
}

/// Appends literal text, merging into a trailing literal part if one exists.
fn push_literal(parts: &mut Vec<Expr>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Expr::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(Expr::Literal(text.to_string()));
    }
}

/// Parses include text into an [`Expr`], recognizing `{{ref NAME}}`,
/// `{{b64ref NAME}}` and `{{att RESOURCE ATTR}}` placeholders.
///
/// The scan runs left-to-right over the original string with absolute match
/// offsets, so zero-width or overlapping matches cannot stall it. Anything
/// that is not one of the three placeholder forms stays literal text.
/// A single-part result is returned unwrapped; two or more parts become a
/// `Concat`; no two adjacent parts are ever both literals.
///
/// Every recognized placeholder is reported to `sink` with its literal text
/// and parsed form (diagnostics only).
///
/// # Errors
///
/// Returns `CfnppError::Regex` if the placeholder pattern fails to compile.
pub fn parse(text: &str, sink: &dyn EventSink) -> Result<Expr> {
    let pattern =
        Regex::new(r"\{\{(ref|b64ref) ([\w.:]+)\}\}|\{\{(att) (\w+) ([\w.]+)\}\}")?;

    let mut parts: Vec<Expr> = Vec::new();
    let mut cursor = 0;

    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_literal(&mut parts, &text[cursor..whole.start()]);

        let part = if let (Some(kind), Some(name)) = (caps.get(1), caps.get(2)) {
            let reference = Expr::Ref(name.as_str().to_string());
            if kind.as_str() == "b64ref" {
                Expr::Base64(Box::new(reference))
            } else {
                reference
            }
        } else if let (Some(resource), Some(attribute)) = (caps.get(4), caps.get(5)) {
            Expr::Att {
                resource: resource.as_str().to_string(),
                attribute: attribute.as_str().to_string(),
            }
        } else {
            push_literal(&mut parts, whole.as_str());
            cursor = whole.end();
            continue;
        };

        sink.emit(
            "Variable found",
            &json!({ "string": whole.as_str(), "object": part.to_value() }),
        );
        parts.push(part);
        cursor = whole.end();
    }

    push_literal(&mut parts, &text[cursor..]);

    Ok(match parts.len() {
        0 => Expr::Literal(String::new()),
        1 => parts.remove(0),
        _ => Expr::Concat(parts),
    })
}
