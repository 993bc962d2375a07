// ============================================================
// Layer 0 — Interpolation
// ============================================================
// String values may reference other keys of the same tree:
//
//   paths:
//     root_dir: .
//     log_dir: ${paths.root_dir}/logs
//
// A value that is exactly one `${...}` takes the referenced value
// with its type (numbers stay numbers, mappings stay mappings).
// Embedded references are spliced into the surrounding string.
//
// `${oc.env:VAR}` reads an environment variable;
// `${oc.env:VAR,default}` falls back to `default` when unset.

use serde_yaml::{Mapping, Value};

use super::tree::lookup;
use super::ConfigError;

const ENV_RESOLVER: &str = "oc.env:";

/// Resolve every interpolation in `root`, returning a new tree.
pub fn resolve(root: &Value) -> Result<Value, ConfigError> {
    let mut visiting = Vec::new();
    resolve_value(root, root, &mut visiting)
}

fn resolve_value(root: &Value, value: &Value, visiting: &mut Vec<String>) -> Result<Value, ConfigError> {
    match value {
        Value::String(s) if s.contains("${") => resolve_string(root, s, visiting),
        Value::Mapping(m) => {
            let mut out = Mapping::with_capacity(m.len());
            for (k, v) in m {
                out.insert(k.clone(), resolve_value(root, v, visiting)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(items) => items
            .iter()
            .map(|v| resolve_value(root, v, visiting))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        other => Ok(other.clone()),
    }
}

fn resolve_string(root: &Value, text: &str, visiting: &mut Vec<String>) -> Result<Value, ConfigError> {
    let pieces = split_pieces(text)?;

    if let [Piece::Expr(expr)] = pieces.as_slice() {
        return resolve_expr(root, expr, visiting);
    }

    let mut out = String::with_capacity(text.len());
    for piece in pieces {
        match piece {
            Piece::Literal(lit) => out.push_str(lit),
            Piece::Expr(expr) => {
                let value = resolve_expr(root, expr, visiting)?;
                out.push_str(&scalar_to_string(expr, &value)?);
            }
        }
    }
    Ok(Value::String(out))
}

fn resolve_expr(root: &Value, expr: &str, visiting: &mut Vec<String>) -> Result<Value, ConfigError> {
    let expr = expr.trim();

    if let Some(spec) = expr.strip_prefix(ENV_RESOLVER) {
        let (var, default) = match spec.split_once(',') {
            Some((var, default)) => (var.trim(), Some(default.trim())),
            None => (spec.trim(), None),
        };
        return match (std::env::var(var), default) {
            (Ok(value), _) => Ok(Value::String(value)),
            (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
            (Err(_), None) => Err(ConfigError::Interpolation(expr.to_string())),
        };
    }

    if visiting.iter().any(|p| p == expr) {
        return Err(ConfigError::InterpolationCycle(expr.to_string()));
    }
    let target = lookup(root, expr).ok_or_else(|| ConfigError::Interpolation(expr.to_string()))?;

    visiting.push(expr.to_string());
    let resolved = resolve_value(root, target, visiting);
    visiting.pop();
    resolved
}

#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Literal(&'a str),
    Expr(&'a str),
}

fn split_pieces(text: &str) -> Result<Vec<Piece<'_>>, ConfigError> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        if start > 0 {
            pieces.push(Piece::Literal(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::Interpolation(text.to_string()))?;
        pieces.push(Piece::Expr(&after[..end]));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

fn scalar_to_string(expr: &str, value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        _ => Err(ConfigError::WrongType {
            key: expr.to_string(),
            expected: "a scalar to be embedded in a string",
        }),
    }
}
