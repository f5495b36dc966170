//! SPARQL JSON results format (`application/sparql-results+json`).

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::StoreError;
use super::sparql::{Iri, LangTag, Literal};

/// Raw response body of a SELECT query.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectResponse {
    pub head: Head,
    pub results: Results,
}

/// Projected variable names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Head {
    #[serde(default)]
    pub vars: Vec<String>,
}

/// Solution rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Results {
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

/// Kind of an RDF term in a result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TermKind {
    Uri,
    Literal,
    /// Emitted by some older servers for datatyped literals.
    TypedLiteral,
    Bnode,
}

/// One bound value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RdfTerm {
    #[serde(rename = "type")]
    pub kind: TermKind,
    pub value: String,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default, rename = "xml:lang")]
    pub lang: Option<String>,
}

impl RdfTerm {
    /// The literal exactly as stored, for use in a later condition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the term is not a literal, its
    /// datatype is not a valid IRI, or its language tag is invalid.
    pub fn to_literal(&self) -> Result<Literal, StoreError> {
        if !matches!(self.kind, TermKind::Literal | TermKind::TypedLiteral) {
            return Err(StoreError::Malformed(format!(
                "{:?} is {:?}, expected a literal",
                self.value, self.kind
            )));
        }
        let datatype = self
            .datatype
            .as_deref()
            .map(Iri::new)
            .transpose()
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let lang = self
            .lang
            .as_deref()
            .map(LangTag::new)
            .transpose()
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Literal::Stored {
            lexical: self.value.clone(),
            datatype,
            lang,
        })
    }
}

/// One solution row: variable name to bound term. Unbound variables are absent.
pub type Binding = HashMap<String, RdfTerm>;

/// Query solutions with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Solutions {
    pub vars: Vec<String>,
    pub rows: Vec<Row>,
}

impl From<SelectResponse> for Solutions {
    fn from(response: SelectResponse) -> Self {
        Self {
            vars: response.head.vars,
            rows: response.results.bindings.into_iter().map(Row).collect(),
        }
    }
}

impl Solutions {
    /// Whether the query returned no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A solution row.
#[derive(Debug, Clone, Default)]
pub struct Row(pub Binding);

impl Row {
    /// Raw term bound to `var`.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&RdfTerm> {
        self.0.get(var)
    }

    /// Lexical value bound to `var`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the variable is unbound.
    pub fn value(&self, var: &str) -> Result<&str, StoreError> {
        self.get(var)
            .map(|t| t.value.as_str())
            .ok_or_else(|| StoreError::Malformed(format!("unbound variable ?{var}")))
    }

    /// IRI bound to `var`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the variable is unbound or not an IRI.
    pub fn iri(&self, var: &str) -> Result<Iri, StoreError> {
        let term = self
            .get(var)
            .ok_or_else(|| StoreError::Malformed(format!("unbound variable ?{var}")))?;
        if term.kind != TermKind::Uri {
            return Err(StoreError::Malformed(format!(
                "?{var} is {:?}, expected an IRI",
                term.kind
            )));
        }
        Iri::new(term.value.clone())
            .map_err(|e| StoreError::Malformed(format!("?{var}: {e}")))
    }

    /// Literal bound to `var`, as stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the variable is unbound or not a literal.
    pub fn literal(&self, var: &str) -> Result<Literal, StoreError> {
        self.get(var)
            .ok_or_else(|| StoreError::Malformed(format!("unbound variable ?{var}")))?
            .to_literal()
    }

    /// Parse the lexical value bound to `var`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if unbound or unparsable.
    pub fn parse<T>(&self, var: &str) -> Result<T, StoreError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.value(var)?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| StoreError::Malformed(format!("?{var} = {raw:?}: {e}")))
    }

    /// Integer bound to `var`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if unbound or not an integer.
    pub fn integer(&self, var: &str) -> Result<i64, StoreError> {
        self.parse(var)
    }

    /// Boolean bound to `var`. Accepts the XSD lexical forms `true/false/1/0`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if unbound or not a boolean.
    pub fn boolean(&self, var: &str) -> Result<bool, StoreError> {
        match self.value(var)?.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(StoreError::Malformed(format!(
                "?{var} = {other:?}: not a boolean"
            ))),
        }
    }

    /// Decimal bound to `var`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if unbound or not numeric.
    pub fn decimal(&self, var: &str) -> Result<Decimal, StoreError> {
        let raw = self.value(var)?.trim();
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map_err(|e| StoreError::Malformed(format!("?{var} = {raw:?}: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "head": { "vars": ["product", "productId", "stock", "available", "price"] },
        "results": { "bindings": [
            {
                "product": { "type": "uri", "value": "http://www.semanticweb.org/My_Super/Milk" },
                "productId": { "type": "literal", "value": "P1" },
                "stock": { "type": "literal", "datatype": "http://www.w3.org/2001/XMLSchema#integer", "value": "5" },
                "available": { "type": "literal", "datatype": "http://www.w3.org/2001/XMLSchema#boolean", "value": "true" },
                "price": { "type": "typed-literal", "datatype": "http://www.w3.org/2001/XMLSchema#double", "value": "2.5e0" }
            }
        ] }
    }"#;

    fn parse() -> Solutions {
        let response: SelectResponse = serde_json::from_str(BODY).unwrap();
        Solutions::from(response)
    }

    #[test]
    fn test_parses_typed_accessors() {
        let solutions = parse();
        assert_eq!(solutions.vars.len(), 5);
        let row = &solutions.rows[0];
        assert_eq!(
            row.iri("product").unwrap().as_str(),
            "http://www.semanticweb.org/My_Super/Milk"
        );
        assert_eq!(row.value("productId").unwrap(), "P1");
        assert_eq!(row.integer("stock").unwrap(), 5);
        assert!(row.boolean("available").unwrap());
        assert_eq!(row.decimal("price").unwrap(), Decimal::new(25, 1));
    }

    #[test]
    fn test_unbound_and_wrong_kind_are_malformed() {
        let solutions = parse();
        let row = &solutions.rows[0];
        assert!(matches!(row.value("missing"), Err(StoreError::Malformed(_))));
        assert!(matches!(row.iri("productId"), Err(StoreError::Malformed(_))));
        assert!(matches!(row.boolean("stock"), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_literal_keeps_stored_form() {
        let solutions = parse();
        let row = &solutions.rows[0];
        assert_eq!(
            row.literal("stock").unwrap().to_string(),
            "\"5\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
        assert_eq!(row.literal("productId").unwrap().to_string(), "\"P1\"");
        assert!(row.literal("product").is_err());
    }

    #[test]
    fn test_literal_keeps_language_tag() {
        let tagged = RdfTerm {
            kind: TermKind::Literal,
            value: "disponible".to_string(),
            datatype: None,
            lang: Some("es".to_string()),
        };
        assert_eq!(tagged.to_literal().unwrap().to_string(), "\"disponible\"@es");

        let hostile = RdfTerm {
            lang: Some("es} WHERE {".to_string()),
            ..tagged
        };
        assert!(matches!(hostile.to_literal(), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_empty_results() {
        let response: SelectResponse =
            serde_json::from_str(r#"{"head":{"vars":["x"]},"results":{"bindings":[]}}"#).unwrap();
        assert!(Solutions::from(response).is_empty());
    }
}
