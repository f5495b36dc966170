//! Parameterized SPARQL query and update builder.
//!
//! Every value that reaches a query goes through [`Literal`] or [`Iri`], which
//! escape or validate it. Nothing is spliced into query text by hand, so a
//! username or product name cannot change the shape of a query.

use std::fmt::{self, Write as _};

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// XML Schema namespace used for literal datatypes.
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Errors raised while building a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SparqlError {
    /// IRI contains a character that cannot appear inside `<...>`.
    #[error("invalid IRI {iri:?}: forbidden character {found:?}")]
    InvalidIri { iri: String, found: char },

    /// IRI is empty.
    #[error("invalid IRI: empty")]
    EmptyIri,

    /// Not a `[a-zA-Z]+(-[a-zA-Z0-9]+)*` language tag.
    #[error("invalid language tag {0:?}")]
    InvalidLanguageTag(String),
}

// =============================================================================
// Terms
// =============================================================================

/// An absolute IRI, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iri(String);

impl Iri {
    /// Validate and wrap an IRI.
    ///
    /// # Errors
    ///
    /// Returns an error if the IRI is empty or contains whitespace, control
    /// characters, or any of `<>"{}|^`\`.
    pub fn new(iri: impl Into<String>) -> Result<Self, SparqlError> {
        let iri = iri.into();
        if iri.is_empty() {
            return Err(SparqlError::EmptyIri);
        }
        if let Some(found) = iri.chars().find(|c| is_forbidden_in_iri(*c)) {
            return Err(SparqlError::InvalidIri { iri, found });
        }
        Ok(Self(iri))
    }

    /// Append a local name to this IRI (used as a namespace).
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting IRI is invalid.
    pub fn join(&self, local: &str) -> Result<Self, SparqlError> {
        Self::new(format!("{}{local}", self.0))
    }

    /// Get the IRI as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after this namespace, if `other` lives under it.
    #[must_use]
    pub fn local_name<'a>(&self, other: &'a Self) -> Option<&'a str> {
        other.0.strip_prefix(self.0.as_str())
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

const fn is_forbidden_in_iri(c: char) -> bool {
    matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') || c <= ' '
}

/// A language tag such as `en` or `es-ES`, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LangTag(String);

impl LangTag {
    /// Validate a language tag.
    ///
    /// # Errors
    ///
    /// Returns an error unless the tag is alphabetic subtags-first, with
    /// alphanumeric subtags separated by `-`.
    pub fn new(tag: impl Into<String>) -> Result<Self, SparqlError> {
        let tag = tag.into();
        let mut subtags = tag.split('-');
        let primary_ok = subtags
            .next()
            .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphabetic()));
        let rest_ok =
            subtags.all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()));
        if primary_ok && rest_ok {
            Ok(Self(tag))
        } else {
            Err(SparqlError::InvalidLanguageTag(tag))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A typed literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    String(String),
    Integer(i64),
    /// Rendered with `xsd:double`, keeping the decimal's own scale.
    Double(Decimal),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// A literal exactly as the store returned it, so a condition matches the
    /// stored term even when its lexical form is not canonical.
    ///
    /// A language tag takes precedence over the datatype, which for tagged
    /// literals is always `rdf:langString`.
    Stored {
        lexical: String,
        datatype: Option<Iri>,
        lang: Option<LangTag>,
    },
}

impl Literal {
    /// Build a string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    const fn xsd_datatype(&self) -> &'static str {
        match self {
            Self::String(_) | Self::Stored { .. } => "string",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "dateTime",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lexical = match self {
            Self::String(s) => escape_string(s),
            Self::Integer(n) => n.to_string(),
            Self::Double(d) => d.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::DateTime(t) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
            Self::Stored {
                lexical,
                datatype,
                lang,
            } => {
                let lexical = escape_string(lexical);
                return match (lang, datatype) {
                    (Some(lang), _) => write!(f, "\"{lexical}\"@{}", lang.as_str()),
                    (None, Some(datatype)) => write!(f, "\"{lexical}\"^^{datatype}"),
                    (None, None) => write!(f, "\"{lexical}\""),
                };
            }
        };
        write!(f, "\"{lexical}\"^^xsd:{}", self.xsd_datatype())
    }
}

/// Escape a string for use inside a double-quoted SPARQL literal.
#[must_use]
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out
}

/// A query variable. Names are fixed by the code that builds the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(pub &'static str);

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Any term that can appear in a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(Var),
    Iri(Iri),
    Literal(Literal),
    /// The `rdf:type` shorthand `a`.
    Type,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(v) => v.fmt(f),
            Self::Iri(i) => i.fmt(f),
            Self::Literal(l) => l.fmt(f),
            Self::Type => f.write_str("a"),
        }
    }
}

impl From<Var> for Term {
    fn from(v: Var) -> Self {
        Self::Var(v)
    }
}

impl From<Iri> for Term {
    fn from(i: Iri) -> Self {
        Self::Iri(i)
    }
}

impl From<&Iri> for Term {
    fn from(i: &Iri) -> Self {
        Self::Iri(i.clone())
    }
}

impl From<Literal> for Term {
    fn from(l: Literal) -> Self {
        Self::Literal(l)
    }
}

/// A single triple (or triple pattern when it contains variables).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    /// Build a triple from anything convertible to terms.
    pub fn new(
        subject: impl Into<Term>,
        predicate: impl Into<Term>,
        object: impl Into<Term>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

fn write_block(out: &mut String, triples: &[Triple]) {
    out.push_str("{\n");
    for triple in triples {
        let _ = writeln!(out, "  {triple}");
    }
    out.push('}');
}

fn prologue() -> String {
    format!("PREFIX xsd: <{XSD}>\n")
}

// =============================================================================
// SELECT
// =============================================================================

/// A rendered, named SELECT query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    operation: &'static str,
    text: String,
}

impl SelectQuery {
    /// Start building a SELECT query with an operation name for logging.
    #[must_use]
    pub const fn builder(operation: &'static str) -> SelectBuilder {
        SelectBuilder {
            operation,
            vars: Vec::new(),
            patterns: Vec::new(),
            values: None,
        }
    }

    /// Operation name (e.g. `ProductStock`).
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Rendered query text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Builder for [`SelectQuery`].
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    operation: &'static str,
    vars: Vec<Var>,
    patterns: Vec<Triple>,
    values: Option<(Var, Vec<Term>)>,
}

impl SelectBuilder {
    /// Project a variable.
    #[must_use]
    pub fn var(mut self, var: Var) -> Self {
        self.vars.push(var);
        self
    }

    /// Add a triple pattern to the WHERE clause.
    #[must_use]
    pub fn pattern(mut self, triple: Triple) -> Self {
        self.patterns.push(triple);
        self
    }

    /// Restrict a variable to an inline set of values (`VALUES ?v { ... }`).
    #[must_use]
    pub fn values(mut self, var: Var, values: impl IntoIterator<Item = Term>) -> Self {
        self.values = Some((var, values.into_iter().collect()));
        self
    }

    /// Render the query.
    #[must_use]
    pub fn build(self) -> SelectQuery {
        let mut text = prologue();
        text.push_str("SELECT");
        if self.vars.is_empty() {
            text.push_str(" *");
        }
        for var in &self.vars {
            let _ = write!(text, " {var}");
        }
        text.push_str("\nWHERE {\n");
        if let Some((var, values)) = &self.values {
            let _ = write!(text, "  VALUES {var} {{");
            for value in values {
                let _ = write!(text, " {value}");
            }
            text.push_str(" }\n");
        }
        for triple in &self.patterns {
            let _ = writeln!(text, "  {triple}");
        }
        text.push('}');

        SelectQuery {
            operation: self.operation,
            text,
        }
    }
}

// =============================================================================
// UPDATE
// =============================================================================

/// One operation inside an update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOperation {
    /// `INSERT DATA { ... }`: unconditional creation of ground triples.
    InsertData(Vec<Triple>),
    /// `DELETE { ... } INSERT { ... } WHERE { ... }`: replacement conditioned on
    /// the WHERE block matching.
    DeleteInsert {
        delete: Vec<Triple>,
        insert: Vec<Triple>,
        condition: Vec<Triple>,
    },
}

impl UpdateOperation {
    fn render(&self, out: &mut String) {
        match self {
            Self::InsertData(triples) => {
                out.push_str("INSERT DATA ");
                write_block(out, triples);
            }
            Self::DeleteInsert {
                delete,
                insert,
                condition,
            } => {
                out.push_str("DELETE ");
                write_block(out, delete);
                out.push_str("\nINSERT ");
                write_block(out, insert);
                out.push_str("\nWHERE ");
                write_block(out, condition);
            }
        }
    }
}

/// A rendered, named update request. All operations travel in one request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    operation: &'static str,
    text: String,
}

impl UpdateRequest {
    /// Render a sequence of operations as one request, separated by `;`.
    #[must_use]
    pub fn new(operation: &'static str, operations: &[UpdateOperation]) -> Self {
        let mut text = prologue();
        for (i, op) in operations.iter().enumerate() {
            if i > 0 {
                text.push_str(" ;\n");
            }
            op.render(&mut text);
        }
        Self { operation, text }
    }

    /// Operation name (e.g. `PlaceOrder`).
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Rendered update text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}
