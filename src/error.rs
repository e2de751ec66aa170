//! Error types for expression evaluation and elaboration

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::expr::Span;

/// An unparseable or unevaluable `${...}` expression
///
/// Returned per call so the caller decides whether to keep the original
/// literal or abort.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("expression error in '{expr}': {reason}")]
pub struct ExpressionError {
    /// The expression text that failed
    pub expr: String,
    /// Why it failed
    pub reason: String,
    /// Offending byte range within `expr`, when known
    pub span: Option<Span>,
}

impl ExpressionError {
    pub fn new(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            reason: reason.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Re-anchor the error on the full template string it came from
    ///
    /// `offset` is where the `${...}` body starts inside `template`.
    pub fn within(mut self, template: &str, offset: usize) -> Self {
        self.span = self.span.map(|s| s.start + offset..s.end + offset);
        self.expr = template.to_string();
        self
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source_name: &str) -> String {
        let span = self.span.clone().unwrap_or(0..self.expr.len());
        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, source_name, span.start)
            .with_message("invalid expression")
            .with_label(
                Label::new((source_name, span))
                    .with_message(&self.reason)
                    .with_color(Color::Red),
            )
            .finish()
            .write((source_name, Source::from(self.expr.as_str())), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// Errors that abort elaboration of a module
///
/// Any of these aborts the whole enclosing module; no partially-built
/// instance graph is ever handed back.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ElabError {
    /// A component references a type the registry does not know
    #[error("definition not found: '{type_name}'{}", format_suggestions(.suggestions))]
    DefinitionNotFound {
        type_name: String,
        suggestions: Vec<String>,
    },

    /// Explicit or loop-generated id collision within one module scope
    #[error("duplicate component id '{id}' in module '{scope}'")]
    DuplicateId { scope: String, id: String },

    /// Malformed connection string, out-of-bounds index, or unknown target
    #[error("invalid reference '{reference}' in module '{scope}': {reason}")]
    InvalidReference {
        scope: String,
        reference: String,
        reason: String,
    },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// Dependency cycle among components, or a self-instantiating module type
    #[error("cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// Port size that does not resolve to a positive integer
    #[error("invalid size for port '{port}' of '{component}': {value}")]
    InvalidPortSize {
        component: String,
        port: String,
        value: String,
    },

    /// Vector input wired with the wrong element count
    #[error("port size mismatch on '{component}.{port}': expected {expected} element(s), found {found}")]
    PortSizeMismatch {
        component: String,
        port: String,
        expected: usize,
        found: usize,
    },
}

impl ElabError {
    pub fn not_found(type_name: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::DefinitionNotFound {
            type_name: type_name.into(),
            suggestions,
        }
    }

    pub fn duplicate(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            scope: scope.into(),
            id: id.into(),
        }
    }

    pub fn invalid_reference(
        scope: impl Into<String>,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidReference {
            scope: scope.into(),
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn cycle(path: Vec<String>) -> Self {
        Self::CycleDetected { path }
    }

    pub fn invalid_port_size(
        component: impl Into<String>,
        port: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self::InvalidPortSize {
            component: component.into(),
            port: port.into(),
            value: value.to_string(),
        }
    }

    pub fn size_mismatch(
        component: impl Into<String>,
        port: impl Into<String>,
        expected: usize,
        found: usize,
    ) -> Self {
        Self::PortSizeMismatch {
            component: component.into(),
            port: port.into(),
            expected,
            found,
        }
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean {}?)", suggestions.join(", "))
    }
}

/// Compute Levenshtein edit distance between two strings
pub(crate) fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Find known names within a maximum edit distance, closest first
pub(crate) fn find_similar<'a>(
    known: impl IntoIterator<Item = &'a str>,
    target: &str,
    max_distance: usize,
) -> Vec<String> {
    let mut candidates: Vec<(&str, usize)> = known
        .into_iter()
        .filter_map(|name| {
            let dist = levenshtein_distance(name, target);
            (dist <= max_distance && dist > 0).then_some((name, dist))
        })
        .collect();

    candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    candidates
        .into_iter()
        .map(|(name, _)| name.to_string())
        .take(3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_one_off() {
        assert_eq!(levenshtein_distance("reg", "rge"), 2);
        assert_eq!(levenshtein_distance("mul", "mux"), 1);
        assert_eq!(levenshtein_distance("", "add"), 3);
    }

    #[test]
    fn test_find_similar_sorted_by_distance() {
        let known = ["add", "mul", "reg", "relu2"];
        let suggestions = find_similar(known, "ad", 2);
        assert_eq!(suggestions.first().map(String::as_str), Some("add"));
        assert!(!suggestions.contains(&"relu2".to_string()));
    }

    #[test]
    fn test_not_found_display_with_suggestions() {
        let err = ElabError::not_found("mull", vec!["mul".to_string()]);
        assert_eq!(
            err.to_string(),
            "definition not found: 'mull' (did you mean mul?)"
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = ElabError::cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_expression_error_within_shifts_span() {
        let err = ExpressionError::new("N +", "unexpected end of expression")
            .with_span(3..3)
            .within("reg_${N +}", 6);
        assert_eq!(err.span, Some(9..9));
        assert_eq!(err.expr, "reg_${N +}");
    }

    #[test]
    fn test_expression_error_format_mentions_reason() {
        let err = ExpressionError::new("a + zz", "unknown identifier 'zz'").with_span(4..6);
        let report = err.format("expr");
        assert!(report.contains("unknown identifier 'zz'"));
    }
}
