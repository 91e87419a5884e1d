//! Turns raw model output into the statement that gets executed
//!
//! Two steps: strip markdown code fences, then rewrite an unqualified
//! `SELECT *` into a `SUM(qty_actual)` aggregate when the question asks for
//! a total. No SQL validation happens here; the warehouse is the judge.

use opsql_ir::ValueAlias;
use std::sync::Arc;

use crate::metrics::Metrics;

/// Question words that signal the user wants a summed quantity
pub const AGGREGATE_KEYWORDS: &[&str] = &["jumlah", "total", "qty_actual"];

pub struct SqlExtractor {
    source_table: String,
    fallback_companies: Vec<String>,
    metrics: Option<Arc<Metrics>>,
}

impl SqlExtractor {
    /// `source_table` is the rendered table reference used in rewrites
    pub fn new(source_table: impl Into<String>, fallback_companies: Vec<String>) -> Self {
        Self {
            source_table: source_table.into(),
            fallback_companies,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn extract(&self, raw_text: &str, question: &str, aliases: &[ValueAlias]) -> String {
        if raw_text.trim().is_empty() {
            return raw_text.to_string();
        }

        let candidate = strip_code_fence(raw_text);
        if !is_select_all(&candidate) || !has_aggregate_intent(question) {
            return candidate;
        }

        let company = resolve_company(question, aliases, &self.fallback_companies);
        let rewritten = aggregate_query(&self.source_table, company.as_deref());
        tracing::info!(
            company = company.as_deref().unwrap_or("<all>"),
            "Rewrote broad SELECT * into aggregate: {}",
            rewritten
        );
        if let Some(metrics) = &self.metrics {
            metrics.sql_rewrites.inc();
        }
        rewritten
    }
}

/// Remove a surrounding markdown fence (``` or ```sql) and whitespace
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let body = match body.split_once('\n') {
        // Opening line carries only a language tag
        Some((tag, rest)) if is_language_tag(tag) => rest,
        // Opening fence and nothing else
        None if is_language_tag(body) => "",
        _ => strip_inline_sql_tag(body),
    };
    // Anything after the closing fence is commentary
    let body = body.find("```").map_or(body, |end| &body[..end]);
    body.trim().to_string()
}

fn is_language_tag(tag: &str) -> bool {
    let tag = tag.trim();
    tag.is_empty()
        || tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
}

/// Handles a single-line fence such as "```sql SELECT 1```"
fn strip_inline_sql_tag(body: &str) -> &str {
    match body.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") && body[3..].starts_with(char::is_whitespace) => {
            &body[3..]
        }
        _ => body,
    }
}

/// Literal prefix check; `SELECT  *` or `SELECT a, *` do not count
pub fn is_select_all(sql: &str) -> bool {
    sql.trim().to_lowercase().starts_with("select *")
}

pub fn has_aggregate_intent(question: &str) -> bool {
    let question = question.to_lowercase();
    AGGREGATE_KEYWORDS.iter().any(|k| question.contains(k))
}

/// Company implied by the question: alias table first, then known names
pub fn resolve_company(
    question: &str,
    aliases: &[ValueAlias],
    fallback_companies: &[String],
) -> Option<String> {
    if let Some(alias) = aliases.iter().find(|a| a.appears_in(question)) {
        return Some(alias.canonical_value.clone());
    }

    let question = question.to_lowercase();
    fallback_companies
        .iter()
        .find(|name| !name.trim().is_empty() && question.contains(&name.to_lowercase()))
        .cloned()
}

/// Total actual quantity, optionally scoped to one company.
///
/// The company comes from the alias table or the configured fallback list,
/// never from the question text itself.
pub fn aggregate_query(source_table: &str, company: Option<&str>) -> String {
    let where_clause = company
        .map(|c| format!(" WHERE company LIKE '%{}%'", c))
        .unwrap_or_default();
    format!(
        "SELECT SUM(qty_actual) as total_qty_actual FROM {}{}",
        source_table, where_clause
    )
}
