//! SQL extraction from model output and the read-only safety check.
//!
//! `check` is an allow-list over the parsed AST: a single query whose body is
//! built only from SELECT, nested queries, set operations and VALUES. Anything
//! the parser produces that is not on the list is refused.

use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::debug;

use crate::error::SafetyViolation;

lazy_static! {
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```[ \t]*sql\b[ \t]*\r?\n?(.*?)```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```(.*?)```").unwrap();
    static ref LANG_TAG: Regex = Regex::new(r"^[A-Za-z0-9_+\-]*$").unwrap();
    static ref BARE_QUERY: Regex = Regex::new(r"(?im)^[ \t]*(?:SELECT|WITH)\b").unwrap();
}

/// Pulls the SQL text out of a model completion.
///
/// Tries a ```` ```sql ```` fence, then any fence (dropping a language tag
/// line), then the first line starting with `SELECT`/`WITH` through the end.
pub fn extract(raw: &str) -> Option<String> {
    let candidate = if let Some(caps) = SQL_FENCE.captures(raw) {
        caps.get(1).map(|m| m.as_str().to_string())
    } else if let Some(caps) = ANY_FENCE.captures(raw) {
        caps.get(1).map(|m| strip_language_tag(m.as_str()).to_string())
    } else {
        BARE_QUERY.find(raw).map(|m| raw[m.start()..].to_string())
    }?;

    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn strip_language_tag(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest)) => {
            let tag = first.trim();
            let looks_like_sql = tag.eq_ignore_ascii_case("select") || tag.eq_ignore_ascii_case("with");
            if LANG_TAG.is_match(tag) && !looks_like_sql {
                rest
            } else {
                body
            }
        }
        None => body,
    }
}

/// True when `sql` is a single read-only query.
pub fn validate(sql: &str) -> bool {
    check(sql).is_ok()
}

/// Same as [`validate`] but says which rule failed.
pub fn check(sql: &str) -> Result<(), SafetyViolation> {
    if sql.trim().is_empty() {
        return Err(SafetyViolation::Empty);
    }

    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|_| SafetyViolation::Unparseable)?;
    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .collect();
    let terminators = significant.iter().filter(|t| matches!(t, Token::SemiColon)).count();
    let ends_with_terminator = matches!(significant.last(), Some(Token::SemiColon));
    if terminators > 1 || (terminators == 1 && !ends_with_terminator) {
        return Err(SafetyViolation::MultipleStatements);
    }

    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| {
        debug!("SQL parse failed: {}", e);
        SafetyViolation::Unparseable
    })?;

    match statements.as_slice() {
        [Statement::Query(query)] => check_query(query),
        [other] => Err(SafetyViolation::NotAQuery(statement_keyword(other))),
        [] => Err(SafetyViolation::Empty),
        _ => Err(SafetyViolation::MultipleStatements),
    }
}

fn check_query(query: &Query) -> Result<(), SafetyViolation> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    if !query.locks.is_empty() {
        return Err(SafetyViolation::WriteClause("FOR UPDATE"));
    }
    check_set_expr(&query.body)
}

fn check_set_expr(body: &SetExpr) -> Result<(), SafetyViolation> {
    match body {
        SetExpr::Select(select) => {
            if select.into.is_some() {
                Err(SafetyViolation::WriteClause("SELECT INTO"))
            } else {
                Ok(())
            }
        }
        SetExpr::Query(inner) => check_query(inner),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) => Ok(()),
        other => Err(SafetyViolation::NotAQuery(leading_keyword(&other.to_string()))),
    }
}

fn statement_keyword(statement: &Statement) -> String {
    leading_keyword(&statement.to_string())
}

fn leading_keyword(rendered: &str) -> String {
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}
