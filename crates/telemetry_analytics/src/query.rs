use common_utils::{errors::CustomResult, fp_utils::when};
use error_stack::report;

use crate::{
    scope::ScopeDescriptor,
    types::{properties, PROPERTIES_COLUMN},
};

pub type QueryBuildResult<T> = CustomResult<T, QueryBuildingError>;

/// Table queried when a structured query names none.
pub const DEFAULT_TABLE: &str = "AppEvents";
/// Column holding the time an event was recorded.
pub const EVENT_TIME_COLUMN: &str = "TimeGenerated";
/// Column naming the deployment that emitted an event.
pub const APP_ROLE_COLUMN: &str = "AppRoleName";

const PIPE_SEPARATOR: &str = " | ";
const FILTER_KEYWORD: &str = "where";
const SERIALIZE_KEYWORD: &str = "serialize";
const SORT_KEYWORDS: [&str; 2] = ["order", "sort"];
// Operators that read rows from a source other than the piped input.
const CROSS_SOURCE_OPERATORS: [&str; 9] = [
    "union", "join", "lookup", "fork", "facet", "evaluate", "invoke", "find", "search",
];
// Functions that reach a table, database or workspace by name.
const CROSS_SOURCE_FUNCTIONS: [&str; 9] = [
    "table",
    "toscalar",
    "cluster",
    "database",
    "workspace",
    "app",
    "resource",
    "external_table",
    "materialized_view",
];
// Columns read by the scope filter.
const PROTECTED_COLUMNS: [&str; 2] = [PROPERTIES_COLUMN, APP_ROLE_COLUMN];

#[derive(thiserror::Error, Debug)]
pub enum QueryBuildingError {
    #[error("Query text must not be empty")]
    EmptyQueryText,
    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),
    #[error("Operator `{0}` is not allowed in a scoped query")]
    ForbiddenOperator(String),
    #[error("{0} are not allowed in a scoped query")]
    UnsupportedSyntax(&'static str),
    #[error("Column `{0}` must not be redefined ahead of the scope filter")]
    ProtectedColumn(String),
    #[error("Failed to build query: {0}")]
    InvalidQuery(&'static str),
}

/// One pipe-delimited operator of a query, borrowed from the query text.
///
/// `pipe_offset` is the byte offset of the pipe in front of the operator, `None` for
/// the leading tabular expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment<'a> {
    text: &'a str,
    pipe_offset: Option<usize>,
}

/// Lexical items of query text found outside string literals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    /// Quoted name directly inside brackets, as in `['Properties']`.
    BracketedName(&'a str),
    Pipe {
        offset: usize,
        nested: bool,
    },
    Open,
    Close,
    /// A lone `=`, never part of `==`, `=~`, `!=`, `<=` or `>=`.
    Assignment,
    Colon,
    StatementSeparator,
    LineComment,
    MultilineString,
    UnterminatedLiteral,
    Unbalanced,
}

/// Scans query text, skipping over string literals.
///
/// A backslash escapes the next character except in verbatim literals (`@"..."`).
fn lex(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut characters = text.char_indices().peekable();
    let mut depth = 0usize;
    let mut previous: Option<char> = None;
    let mut previous_significant: Option<char> = None;

    while let Some((index, character)) = characters.next() {
        match character {
            '"' | '\'' => {
                let verbatim = previous == Some('@');
                let mut escaped = false;
                let mut end = None;
                for (position, inner) in characters.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' && !verbatim {
                        escaped = true;
                    } else if inner == character {
                        end = Some(position);
                        break;
                    }
                }

                match end {
                    Some(end) if previous_significant == Some('[') => tokens.push(
                        Token::BracketedName(text.get(index + 1..end).unwrap_or_default()),
                    ),
                    Some(_) => {}
                    None => tokens.push(Token::UnterminatedLiteral),
                }
            }
            '`' => tokens.push(Token::MultilineString),
            '/' if characters.next_if(|&(_, next)| next == '/').is_some() => {
                tokens.push(Token::LineComment)
            }
            ';' => tokens.push(Token::StatementSeparator),
            ':' => tokens.push(Token::Colon),
            '=' => {
                let comparison = characters
                    .next_if(|&(_, next)| next == '=' || next == '~')
                    .is_some()
                    || matches!(previous, Some('!' | '<' | '>'));
                if !comparison {
                    tokens.push(Token::Assignment);
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                tokens.push(Token::Open);
            }
            ')' | ']' | '}' => match depth.checked_sub(1) {
                Some(outer) => {
                    depth = outer;
                    tokens.push(Token::Close);
                }
                None => tokens.push(Token::Unbalanced),
            },
            '|' => tokens.push(Token::Pipe {
                offset: index,
                nested: depth > 0,
            }),
            _ if character.is_alphanumeric() || character == '_' => {
                let mut end = text.len();
                while let Some(&(position, next)) = characters.peek() {
                    if !(next.is_alphanumeric() || next == '_') {
                        end = position;
                        break;
                    }
                    characters.next();
                }
                tokens.push(Token::Word(text.get(index..end).unwrap_or_default()));
            }
            _ => {}
        }

        previous = Some(character);
        if !character.is_whitespace() {
            previous_significant = Some(character);
        }
    }

    if depth > 0 {
        tokens.push(Token::Unbalanced);
    }
    tokens
}

/// Splits query text on the pipes that separate operators.
///
/// Pipes inside string literals or inside `()`, `[]` and `{}` belong to the operator
/// they appear in.
fn split_pipeline(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut pipe_offset = None;

    for token in lex(text) {
        if let Token::Pipe {
            offset,
            nested: false,
        } = token
        {
            segments.push(Segment {
                text: text.get(start..offset).unwrap_or_default(),
                pipe_offset,
            });
            pipe_offset = Some(offset);
            start = offset + 1;
        }
    }

    segments.push(Segment {
        text: text.get(start..).unwrap_or_default(),
        pipe_offset,
    });
    segments
}

/// Individual operators of `text` with surrounding pipes and whitespace removed.
fn tokenize(text: &str) -> Vec<String> {
    split_pipeline(text)
        .into_iter()
        .map(|segment| segment.text.trim())
        .filter(|clause| !clause.is_empty())
        .map(str::to_owned)
        .collect()
}

fn operator_keyword(clause: &str) -> &str {
    clause
        .trim_start()
        .split(|character: char| character.is_whitespace() || character == '(')
        .next()
        .unwrap_or_default()
}

fn is_operator(clause: &str, keyword: &str) -> bool {
    operator_keyword(clause).eq_ignore_ascii_case(keyword)
}

fn is_sort_clause(clause: &str) -> bool {
    let mut words = clause.split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(first), Some(second))
            if SORT_KEYWORDS.iter().any(|keyword| first.eq_ignore_ascii_case(keyword))
                && second.eq_ignore_ascii_case("by")
    )
}

fn is_protected_column(name: &str) -> bool {
    PROTECTED_COLUMNS
        .iter()
        .any(|column| name.eq_ignore_ascii_case(column))
}

fn escape_string_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn validate_table_name(table: &str) -> QueryBuildResult<()> {
    let mut characters = table.chars();
    let is_identifier = characters
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && characters.all(|character| character.is_ascii_alphanumeric() || character == '_');

    when(!is_identifier, || {
        Err(report!(QueryBuildingError::InvalidTableName(
            table.to_owned()
        )))
    })
}

/// Rejects an operator that reads another source, or whose text could carry the
/// scope filter into a comment, a literal, a subquery or a second statement.
fn ensure_single_source(clause: &str) -> QueryBuildResult<()> {
    let keyword = operator_keyword(clause);
    when(
        CROSS_SOURCE_OPERATORS
            .iter()
            .any(|operator| keyword.eq_ignore_ascii_case(operator)),
        || {
            Err(report!(QueryBuildingError::ForbiddenOperator(
                keyword.to_ascii_lowercase()
            )))
        },
    )?;

    let tokens = lex(clause);
    for (index, token) in tokens.iter().copied().enumerate() {
        let unsupported = match token {
            Token::LineComment => "Line comments",
            Token::StatementSeparator => "Statement separators",
            Token::MultilineString => "Multi-line string literals",
            Token::UnterminatedLiteral => "Unterminated string literals",
            Token::Unbalanced => "Unbalanced brackets",
            // Every top-level pipe was consumed by splitting, so this one is nested.
            Token::Pipe { .. } => "Nested pipelines",
            Token::Word(name)
                if matches!(tokens.get(index + 1), Some(Token::Open))
                    && CROSS_SOURCE_FUNCTIONS
                        .iter()
                        .any(|function| name.eq_ignore_ascii_case(function)) =>
            {
                return Err(report!(QueryBuildingError::ForbiddenOperator(
                    name.to_ascii_lowercase()
                )));
            }
            _ => continue,
        };
        return Err(report!(QueryBuildingError::UnsupportedSyntax(unsupported)));
    }
    Ok(())
}

/// Rejects an operator that assigns to a column the scope filter reads, as in
/// `extend Properties = ...`, `parse Name with AppRoleName:string` or the tuple target
/// `(Properties, x) = ...`.
fn ensure_protected_columns_kept(clause: &str) -> QueryBuildResult<()> {
    let tokens = lex(clause);
    // First protected name seen inside each open bracket group.
    let mut groups: Vec<Option<&str>> = Vec::new();

    for (index, token) in tokens.iter().copied().enumerate() {
        let assigned = matches!(
            tokens.get(index + 1),
            Some(Token::Assignment | Token::Colon)
        );
        let target = match token {
            Token::Word(name) | Token::BracketedName(name) if is_protected_column(name) => {
                if let Some(group) = groups.last_mut() {
                    group.get_or_insert(name);
                }
                assigned.then_some(name)
            }
            Token::Open => {
                groups.push(None);
                None
            }
            Token::Close => {
                let inner = groups.pop().flatten();
                if let (Some(name), Some(group)) = (inner, groups.last_mut()) {
                    group.get_or_insert(name);
                }
                inner.filter(|_| assigned)
            }
            _ => None,
        };

        if let Some(name) = target {
            return Err(report!(QueryBuildingError::ProtectedColumn(
                name.to_owned()
            )));
        }
    }
    Ok(())
}

/// The filter operator enforcing `scope`, or `None` when the scope restricts nothing.
pub fn build_scope_clause(scope: &ScopeDescriptor) -> Option<String> {
    let mut predicates = Vec::new();

    if scope.restrict_by_app_role {
        if let Some(app_role_name) = scope.app_role_name.as_deref() {
            predicates.push(format!(
                "{APP_ROLE_COLUMN} == \"{}\"",
                escape_string_literal(app_role_name)
            ));
        }
    }
    if scope.restrict_by_organisation {
        predicates.push(format!(
            "Properties.{} == {}",
            properties::ORGANISATION_ID,
            scope.organisation_id
        ));
    }
    if scope.restrict_by_domain {
        predicates.push(format!(
            "Properties.{} == {}",
            properties::DOMAIN_ID,
            scope.domain_id
        ));
    }
    if scope.restrict_by_user {
        predicates.push(format!(
            "Properties.{} == {}",
            properties::USER_ID,
            scope.user_id
        ));
    }

    (!predicates.is_empty()).then(|| format!("{FILTER_KEYWORD} {}", predicates.join(" and ")))
}

/// Index of the scope clause: right after the last filter operator, or before the
/// trailing sort operators when there is no filter.
fn scope_position(clauses: &[String]) -> usize {
    clauses
        .iter()
        .rposition(|clause| is_operator(clause, FILTER_KEYWORD))
        .map(|index| index + 1)
        .unwrap_or_else(|| {
            let trailing_sorts = clauses
                .iter()
                .skip(1)
                .rev()
                .take_while(|clause| is_sort_clause(clause))
                .count();
            clauses.len() - trailing_sorts
        })
}

/// Inserts `scope_clause` into `clauses` once nothing in the query can get around it.
///
/// `trailing` holds the operators that follow `clauses` in the final text.
fn confine(
    clauses: &mut Vec<String>,
    trailing: &[String],
    scope_clause: String,
) -> QueryBuildResult<()> {
    for clause in clauses.iter().chain(trailing) {
        ensure_single_source(clause)?;
    }

    let position = scope_position(clauses);
    for clause in clauses.iter().take(position).skip(1) {
        ensure_protected_columns_kept(clause)?;
    }

    clauses.insert(position, scope_clause);
    Ok(())
}

/// Composes the query text sent to the log analytics workspace.
#[derive(Clone, Debug)]
pub struct LogQueryComposer {
    default_table: String,
}

impl Default for LogQueryComposer {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl LogQueryComposer {
    pub fn new(default_table: impl Into<String>) -> Self {
        Self {
            default_table: default_table.into(),
        }
    }

    /// `table | search clauses (+ scope) | order by TimeGenerated desc`
    pub fn build_structured_query<S: AsRef<str>>(
        &self,
        table_name: Option<&str>,
        search_clauses: &[S],
        scope: &ScopeDescriptor,
    ) -> QueryBuildResult<String> {
        let table = table_name
            .map(str::trim)
            .filter(|table| !table.is_empty())
            .unwrap_or(self.default_table.as_str());
        validate_table_name(table)?;

        let mut clauses = vec![table.to_owned()];
        clauses.extend(
            search_clauses
                .iter()
                .flat_map(|clause| tokenize(clause.as_ref())),
        );

        if let Some(scope_clause) = build_scope_clause(scope) {
            confine(&mut clauses, &[], scope_clause)?;
        }

        clauses.push(format!("order by {EVENT_TIME_COLUMN} desc"));
        Ok(clauses.join(PIPE_SEPARATOR))
    }

    /// Injects the scope into caller supplied query text.
    ///
    /// Everything from the pipe in front of the first `serialize` operator onwards is
    /// kept byte for byte, so paging the caller set up survives the rewrite. An
    /// unrestricted scope returns `raw_query` unchanged.
    pub fn rewrite_raw_query(
        &self,
        raw_query: &str,
        scope: &ScopeDescriptor,
    ) -> QueryBuildResult<String> {
        when(raw_query.trim().is_empty(), || {
            Err(report!(QueryBuildingError::EmptyQueryText))
        })?;

        let Some(scope_clause) = build_scope_clause(scope) else {
            return Ok(raw_query.to_owned());
        };

        let segments = split_pipeline(raw_query);
        let (prefix, suffix) = match segments
            .iter()
            .find(|segment| is_operator(segment.text, SERIALIZE_KEYWORD))
        {
            Some(Segment {
                pipe_offset: Some(offset),
                ..
            }) => raw_query.split_at(*offset),
            Some(Segment {
                pipe_offset: None, ..
            }) => {
                return Err(report!(QueryBuildingError::InvalidQuery(
                    "query must start with a tabular expression"
                )))
            }
            None => (raw_query, ""),
        };

        let mut clauses = tokenize(prefix);
        when(clauses.is_empty(), || {
            Err(report!(QueryBuildingError::InvalidQuery(
                "query must start with a tabular expression"
            )))
        })?;

        confine(&mut clauses, &tokenize(suffix), scope_clause)?;

        let mut query = clauses.join(PIPE_SEPARATOR);
        if !suffix.is_empty() {
            query.push(' ');
            query.push_str(suffix);
        }
        Ok(query)
    }
}
