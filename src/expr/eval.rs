//! Expression evaluation and `${...}` template substitution

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::ast::{BinaryOp, Expr, Params, UnaryOp, Value};
use super::grammar::parse_expression;
use crate::error::ExpressionError;

/// A read-only chain of parameter frames
///
/// Lookups walk from the innermost frame outward, so a loop iterator shadows
/// a module parameter, which in turn shadows an ancestor's parameter. Frames
/// are borrowed; nothing in the chain owns or mutates its parent.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    bindings: &'a Params,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Create a root scope
    pub fn new(bindings: &'a Params) -> Self {
        Self {
            bindings,
            parent: None,
        }
    }

    /// Push a frame whose bindings take precedence over this scope
    pub fn child(&'a self, bindings: &'a Params) -> Scope<'a> {
        Scope {
            bindings,
            parent: Some(self),
        }
    }

    /// Look up a name, innermost frame first
    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(value) = scope.bindings.get(name) {
                return Some(value);
            }
            frame = scope.parent;
        }
        None
    }
}

/// Content-equality cache key: template text plus the bindings it reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    expr: String,
    bindings: String,
}

/// A template split and parsed once
#[derive(Debug)]
struct Template {
    parts: Vec<Part>,
    /// Identifiers read by any span, sorted and deduplicated
    variables: Vec<String>,
}

#[derive(Debug)]
enum Part {
    Text(String),
    Expr { ast: Expr, offset: usize },
}

impl Template {
    fn parse(text: &str) -> Result<Self, ExpressionError> {
        let mut parts = Vec::new();
        let mut variables = Vec::new();
        for segment in split_template(text)? {
            match segment {
                Segment::Text(t) => parts.push(Part::Text(t.to_string())),
                Segment::Expr { body, offset } => {
                    let ast = parse_expression(body).map_err(|e| e.within(text, offset))?;
                    variables.extend(ast.variables().into_iter().map(str::to_string));
                    parts.push(Part::Expr { ast, offset });
                }
            }
        }
        variables.sort_unstable();
        variables.dedup();
        Ok(Self { parts, variables })
    }

    /// Cache key component for the bindings this template reads
    fn fingerprint(&self, scope: &Scope<'_>) -> String {
        let mut out = String::new();
        for name in &self.variables {
            out.push_str(name);
            out.push('=');
            match scope.lookup(name) {
                // Type tag keeps Int(2), Float(2.0) and Str("2") apart
                Some(value) => {
                    out.push_str(value.type_name());
                    out.push(':');
                    match value {
                        Value::Float(x) => out.push_str(&format!("{:?}", x)),
                        other => out.push_str(&other.to_string()),
                    }
                }
                None => out.push('?'),
            }
            out.push('\u{1f}');
        }
        out
    }

    fn evaluate(&self, text: &str, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
        let eval_part = |ast: &Expr, offset: usize| eval(ast, scope).map_err(|e| e.within(text, offset));
        if let [Part::Expr { ast, offset }] = self.parts.as_slice() {
            return eval_part(ast, *offset);
        }
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(t) => out.push_str(t),
                Part::Expr { ast, offset } => out.push_str(&eval_part(ast, *offset)?.to_string()),
            }
        }
        Ok(Value::Str(out))
    }
}

/// Expression evaluator with a template cache and a result cache
///
/// One evaluator belongs to one elaboration run. Caching never changes
/// results; identical `(expr, bindings)` pairs always evaluate identically.
#[derive(Debug, Default)]
pub struct Evaluator {
    templates: HashMap<String, Template>,
    results: HashMap<CacheKey, Value>,
    hits: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `expr` against `params` with `context` taking precedence
    ///
    /// Non-string values and strings without `${` are returned unchanged.
    pub fn evaluate(
        &mut self,
        expr: &Value,
        params: &Params,
        context: &Params,
    ) -> Result<Value, ExpressionError> {
        let base = Scope::new(params);
        let scope = base.child(context);
        self.evaluate_value(expr, &scope)
    }

    /// Evaluate any value within a scope chain
    pub fn evaluate_value(&mut self, value: &Value, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
        match value {
            Value::Str(s) => self.evaluate_str(s, scope),
            other => Ok(other.clone()),
        }
    }

    /// Evaluate a template string within a scope chain
    ///
    /// A string that is exactly one `${...}` span keeps the native type of
    /// its result; otherwise each span is substituted as text.
    pub fn evaluate_str(&mut self, text: &str, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
        if !text.contains("${") {
            return Ok(Value::Str(text.to_string()));
        }

        let template = match self.templates.entry(text.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(Template::parse(text)?),
        };
        let key = CacheKey {
            expr: text.to_string(),
            bindings: template.fingerprint(scope),
        };
        if let Some(hit) = self.results.get(&key) {
            self.hits += 1;
            tracing::trace!(expr = text, "expression cache hit");
            return Ok(hit.clone());
        }

        let value = template.evaluate(text, scope)?;
        self.results.insert(key, value.clone());
        Ok(value)
    }

    /// Identifiers a template string reads, sorted; empty for plain text
    pub fn variables(&mut self, text: &str) -> Result<&[String], ExpressionError> {
        if !text.contains("${") {
            return Ok(&[]);
        }
        let template = match self.templates.entry(text.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(Template::parse(text)?),
        };
        Ok(&template.variables)
    }

    /// Number of result-cache hits so far
    pub fn cache_hits(&self) -> usize {
        self.hits
    }
}

#[derive(Debug, PartialEq)]
enum Segment<'s> {
    Text(&'s str),
    Expr { body: &'s str, offset: usize },
}

/// Split a template into literal text and `${...}` bodies
///
/// Braces inside quoted string literals do not close a span.
fn split_template(text: &str) -> Result<Vec<Segment<'_>>, ExpressionError> {
    let mut segments = Vec::new();
    let mut rest_start = 0;

    while let Some(rel) = text[rest_start..].find("${") {
        let open = rest_start + rel;
        if open > rest_start {
            segments.push(Segment::Text(&text[rest_start..open]));
        }
        let body_start = open + 2;
        let close = find_closing_brace(&text[body_start..]).ok_or_else(|| {
            ExpressionError::new(text, "unterminated '${'").with_span(open..text.len())
        })?;
        segments.push(Segment::Expr {
            body: &text[body_start..body_start + close],
            offset: body_start,
        });
        rest_start = body_start + close + 1;
    }

    if rest_start < text.len() {
        segments.push(Segment::Text(&text[rest_start..]));
    }
    Ok(segments)
}

fn find_closing_brace(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '}' => return Some(i),
            None => {}
        }
    }
    None
}

/// Interpret an expression AST
pub fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var { name, span } => scope.lookup(name).cloned().ok_or_else(|| {
            ExpressionError::new(name.as_str(), format!("unknown identifier '{}'", name))
                .with_span(span.clone())
        }),
        Expr::Unary { op, operand } => {
            let v = eval(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(n) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| ExpressionError::new("-", "integer overflow")),
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(ExpressionError::new(
                        "-",
                        format!("cannot negate a {}", other.type_name()),
                    )),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            // Short-circuit before evaluating the right side
            match op {
                BinaryOp::And => {
                    let l = eval(lhs, scope)?;
                    if !l.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    return Ok(Value::Bool(eval(rhs, scope)?.is_truthy()));
                }
                BinaryOp::Or => {
                    let l = eval(lhs, scope)?;
                    if l.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    return Ok(Value::Bool(eval(rhs, scope)?.is_truthy()));
                }
                _ => {}
            }
            let l = eval(lhs, scope)?;
            let r = eval(rhs, scope)?;
            apply_binary(*op, l, r)
        }
        Expr::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            if eval(cond, scope)?.is_truthy() {
                eval(then_branch, scope)
            } else {
                eval(else_branch, scope)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
    let type_error = |l: &Value, r: &Value| {
        ExpressionError::new(
            op.symbol(),
            format!(
                "unsupported operands for '{}': {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ),
        )
    };

    match op {
        BinaryOp::Add => match (&l, &r) {
            (Value::Str(_), _) | (_, Value::Str(_)) => Ok(Value::Str(format!("{}{}", l, r))),
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| ExpressionError::new("+", "integer overflow")),
            _ => numeric(&l, &r, |a, b| a + b).ok_or_else(|| type_error(&l, &r)),
        },
        BinaryOp::Sub => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(*b)
                .map(Value::Int)
                .ok_or_else(|| ExpressionError::new("-", "integer overflow")),
            _ => numeric(&l, &r, |a, b| a - b).ok_or_else(|| type_error(&l, &r)),
        },
        BinaryOp::Mul => match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(*b)
                .map(Value::Int)
                .ok_or_else(|| ExpressionError::new("*", "integer overflow")),
            _ => numeric(&l, &r, |a, b| a * b).ok_or_else(|| type_error(&l, &r)),
        },
        BinaryOp::Div => {
            if r.as_f64() == Some(0.0) {
                return Err(ExpressionError::new("/", "division by zero"));
            }
            match (&l, &r) {
                // Exact integer quotients stay integers; `7/2` is 3.5
                (Value::Int(a), Value::Int(b)) if a.checked_rem(*b) == Some(0) => a
                    .checked_div(*b)
                    .map(Value::Int)
                    .ok_or_else(|| ExpressionError::new("/", "integer overflow")),
                _ => numeric(&l, &r, |a, b| a / b).ok_or_else(|| type_error(&l, &r)),
            }
        }
        BinaryOp::Rem => {
            if r.as_f64() == Some(0.0) {
                return Err(ExpressionError::new("%", "division by zero"));
            }
            match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_rem(*b)
                    .map(Value::Int)
                    .ok_or_else(|| ExpressionError::new("%", "integer overflow")),
                _ => numeric(&l, &r, |a, b| a % b).ok_or_else(|| type_error(&l, &r)),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(loosely_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!loosely_equal(&l, &r))),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => match (l.as_f64(), r.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(type_error(&l, &r)),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::And => Ok(Value::Bool(l.is_truthy() && r.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(l.is_truthy() || r.is_truthy())),
    }
}

fn numeric(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    Some(Value::Float(f(l.as_f64()?, r.as_f64()?)))
}

fn loosely_equal(l: &Value, r: &Value) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => l == r,
    }
}
