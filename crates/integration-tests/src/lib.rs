//! Integration test support for the supermarket storefront.
//!
//! [`InMemoryStore`] is a [`KnowledgeStore`] backed by an in-memory triple set.
//! It evaluates the SPARQL subset the storefront renders: basic graph
//! patterns with an optional `VALUES` block, `INSERT DATA`, and
//! `DELETE/INSERT/WHERE`. Each update request is applied all-or-nothing.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p supermarket-integration-tests
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use rust_decimal::Decimal;

use supermarket_core::ProductId;
use supermarket_storefront::CatalogProduct;
use supermarket_storefront::store::results::{RdfTerm, TermKind};
use supermarket_storefront::store::sparql::XSD;
use supermarket_storefront::store::{
    KnowledgeStore, Row, SelectQuery, Solutions, StoreError, UpdateRequest, Vocabulary,
};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

// =============================================================================
// Graph
// =============================================================================

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Iri(String),
    Literal { lexical: String, datatype: String },
}

impl Node {
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    /// A literal typed `xsd:{xsd_type}`.
    pub fn typed(lexical: impl ToString, xsd_type: &str) -> Self {
        Self::Literal {
            lexical: lexical.to_string(),
            datatype: format!("{XSD}{xsd_type}"),
        }
    }

    /// IRI or lexical form.
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(iri) => iri,
            Self::Literal { lexical, .. } => lexical,
        }
    }

    fn to_term(&self) -> RdfTerm {
        match self {
            Self::Iri(iri) => RdfTerm {
                kind: TermKind::Uri,
                value: iri.clone(),
                datatype: None,
                lang: None,
            },
            Self::Literal { lexical, datatype } => RdfTerm {
                kind: TermKind::Literal,
                value: lexical.clone(),
                datatype: Some(datatype.clone()),
                lang: None,
            },
        }
    }
}

/// A set of triples.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    triples: BTreeSet<(Node, Node, Node)>,
}

impl Graph {
    pub fn insert(&mut self, subject: Node, predicate: Node, object: Node) {
        self.triples.insert((subject, predicate, object));
    }

    pub fn remove(&mut self, subject: &Node, predicate: &Node, object: &Node) {
        self.triples
            .retain(|(s, p, o)| !(s == subject && p == predicate && o == object));
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Objects of every `(subject, predicate, _)` triple.
    pub fn objects(&self, subject: &Node, predicate: &Node) -> Vec<Node> {
        self.triples
            .iter()
            .filter(|(s, p, _)| s == subject && p == predicate)
            .map(|(_, _, o)| o.clone())
            .collect()
    }

    /// Subjects of every `(_, predicate, object)` triple.
    pub fn subjects(&self, predicate: &Node, object: &Node) -> Vec<Node> {
        self.triples
            .iter()
            .filter(|(_, p, o)| p == predicate && o == object)
            .map(|(s, _, _)| s.clone())
            .collect()
    }

    /// Replace the stock facts of a product, as another shopper's checkout would.
    pub fn set_stock(&mut self, vocab: &Vocabulary, product_id: &str, stock: i64) {
        let product = product_node(vocab, product_id);
        let has_stock = Node::iri(vocab.has_stock.as_str());
        let is_available = Node::iri(vocab.is_available.as_str());
        for old in self.objects(&product, &has_stock) {
            self.remove(&product, &has_stock, &old);
        }
        for old in self.objects(&product, &is_available) {
            self.remove(&product, &is_available, &old);
        }
        self.insert(product.clone(), has_stock, Node::typed(stock, "integer"));
        self.insert(product, is_available, Node::typed(stock > 0, "boolean"));
    }
}

fn product_node(vocab: &Vocabulary, product_id: &str) -> Node {
    Node::iri(format!("{}{product_id}", vocab.base.as_str()))
}

// =============================================================================
// Store
// =============================================================================

type Hook = Box<dyn FnOnce(&mut Graph) + Send>;

/// In-memory [`KnowledgeStore`].
#[derive(Default)]
pub struct InMemoryStore {
    graph: Mutex<Graph>,
    select_log: Mutex<Vec<&'static str>>,
    update_log: Mutex<Vec<String>>,
    before_update: Mutex<Option<Hook>>,
    reject_update: Mutex<Option<u16>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with customers and products.
    pub fn supermarket(vocab: &Vocabulary, customers: &[&str], products: &[(&str, i64)]) -> Self {
        let store = Self::new();
        for username in customers {
            store.add_customer(vocab, username);
        }
        for (product_id, stock) in products {
            store.add_product(vocab, product_id, *stock);
        }
        store
    }

    /// Run `f` against the graph.
    pub fn with_graph<T>(&self, f: impl FnOnce(&mut Graph) -> T) -> T {
        f(&mut self.graph.lock().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    pub fn add_customer(&self, vocab: &Vocabulary, username: &str) {
        let user = Node::iri(format!("{}{username}", vocab.base.as_str()));
        self.with_graph(|g| {
            g.insert(user.clone(), Node::iri(RDF_TYPE), Node::iri(vocab.normal_user.as_str()));
            g.insert(user, Node::iri(vocab.has_username.as_str()), Node::typed(username, "string"));
        });
    }

    pub fn add_product(&self, vocab: &Vocabulary, product_id: &str, stock: i64) {
        let product = product_node(vocab, product_id);
        self.with_graph(|g| {
            g.insert(
                product,
                Node::iri(vocab.has_product_id.as_str()),
                Node::typed(product_id, "string"),
            );
            g.set_stock(vocab, product_id, stock);
        });
    }

    /// An order written before the test started, identified only by its code.
    pub fn add_order(&self, vocab: &Vocabulary, code: &str) {
        let order = Node::iri(format!("{}Legacy{code}", vocab.base.as_str()));
        self.with_graph(|g| {
            g.insert(order.clone(), Node::iri(RDF_TYPE), Node::iri(vocab.order.as_str()));
            g.insert(order, Node::iri(vocab.has_order_id.as_str()), Node::typed(code, "string"));
        });
    }

    /// An order item written before the test started.
    pub fn add_order_item(&self, vocab: &Vocabulary, id: &str) {
        let item = Node::iri(format!("{}{id}", vocab.base.as_str()));
        self.with_graph(|g| {
            g.insert(item.clone(), Node::iri(RDF_TYPE), Node::iri(vocab.order_item.as_str()));
            g.insert(item, Node::iri(vocab.has_order_item_id.as_str()), Node::typed(id, "string"));
        });
    }

    /// Stock count and availability of a product.
    pub fn stock_of(&self, vocab: &Vocabulary, product_id: &str) -> (Vec<i64>, Vec<bool>) {
        let product = product_node(vocab, product_id);
        self.with_graph(|g| {
            let stock = g
                .objects(&product, &Node::iri(vocab.has_stock.as_str()))
                .iter()
                .filter_map(|n| n.value().parse().ok())
                .collect();
            let available = g
                .objects(&product, &Node::iri(vocab.is_available.as_str()))
                .iter()
                .filter_map(|n| n.value().parse().ok())
                .collect();
            (stock, available)
        })
    }

    /// Every stored order code, sorted.
    pub fn order_codes(&self, vocab: &Vocabulary) -> Vec<String> {
        let has_order_id = Node::iri(vocab.has_order_id.as_str());
        let mut codes: Vec<String> = self.with_graph(|g| {
            g.triples
                .iter()
                .filter(|(_, p, _)| p == &has_order_id)
                .map(|(_, _, o)| o.value().to_string())
                .collect()
        });
        codes.sort();
        codes
    }

    /// Objects of `(entity, predicate, _)`.
    pub fn objects(&self, entity: &str, predicate: &str) -> Vec<Node> {
        self.with_graph(|g| g.objects(&Node::iri(entity), &Node::iri(predicate)))
    }

    /// Operation names of every SELECT answered, in order.
    pub fn selects(&self) -> Vec<&'static str> {
        self.select_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Text of every update request received, in order.
    pub fn updates(&self) -> Vec<String> {
        self.update_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Run `hook` against the graph just before the next update is applied.
    pub fn before_next_update(&self, hook: impl FnOnce(&mut Graph) + Send + 'static) {
        if let Ok(mut slot) = self.before_update.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    /// Answer the next update with `status` without applying it.
    pub fn reject_next_update(&self, status: u16) {
        if let Ok(mut slot) = self.reject_update.lock() {
            *slot = Some(status);
        }
    }
}

impl KnowledgeStore for InMemoryStore {
    async fn select(&self, query: &SelectQuery) -> Result<Solutions, StoreError> {
        if let Ok(mut log) = self.select_log.lock() {
            log.push(query.operation());
        }
        let select = Parser::new(query.as_str())
            .and_then(|mut p| p.select())
            .map_err(malformed)?;

        let bindings = self.with_graph(|g| evaluate(g, &select.group));
        let rows = bindings
            .into_iter()
            .map(|binding| {
                Row(binding
                    .into_iter()
                    .filter(|(var, _)| select.vars.is_empty() || select.vars.contains(var))
                    .map(|(var, node)| (var, node.to_term()))
                    .collect())
            })
            .collect();
        Ok(Solutions {
            vars: select.vars,
            rows,
        })
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), StoreError> {
        if let Ok(mut log) = self.update_log.lock() {
            log.push(request.as_str().to_string());
        }
        if let Some(status) = self.reject_update.lock().ok().and_then(|mut s| s.take()) {
            return Err(StoreError::Status {
                status,
                body: "Update rejected".to_string(),
            });
        }
        let hook = self.before_update.lock().ok().and_then(|mut h| h.take());

        let operations = Parser::new(request.as_str())
            .and_then(|mut p| p.update())
            .map_err(malformed)?;

        self.with_graph(|graph| {
            if let Some(hook) = hook {
                hook(graph);
            }
            let mut staged = graph.clone();
            for op in &operations {
                apply(&mut staged, op);
            }
            *graph = staged;
        });
        Ok(())
    }
}

fn malformed(message: String) -> StoreError {
    StoreError::Status {
        status: 400,
        body: format!("MALFORMED QUERY: {message}"),
    }
}

// =============================================================================
// Evaluation
// =============================================================================

type Binding = HashMap<String, Node>;

#[derive(Debug, Clone)]
enum PatternTerm {
    Node(Node),
    Var(String),
}

type Pattern = [PatternTerm; 3];

#[derive(Debug, Default)]
struct Group {
    values: Option<(String, Vec<Node>)>,
    patterns: Vec<Pattern>,
}

struct Select {
    vars: Vec<String>,
    group: Group,
}

enum Operation {
    InsertData(Vec<Pattern>),
    DeleteInsert {
        delete: Vec<Pattern>,
        insert: Vec<Pattern>,
        condition: Group,
    },
}

fn evaluate(graph: &Graph, group: &Group) -> Vec<Binding> {
    let mut solutions: Vec<Binding> = match &group.values {
        Some((var, nodes)) => nodes
            .iter()
            .map(|node| Binding::from([(var.clone(), node.clone())]))
            .collect(),
        None => vec![Binding::new()],
    };
    for pattern in &group.patterns {
        solutions = solutions
            .iter()
            .flat_map(|binding| {
                graph
                    .triples
                    .iter()
                    .filter_map(move |triple| unify(pattern, triple, binding))
            })
            .collect();
    }
    solutions
}

fn unify(pattern: &Pattern, (s, p, o): &(Node, Node, Node), binding: &Binding) -> Option<Binding> {
    let mut extended = binding.clone();
    for (term, node) in pattern.iter().zip([s, p, o]) {
        match term {
            PatternTerm::Node(expected) if expected != node => return None,
            PatternTerm::Node(_) => {}
            PatternTerm::Var(var) => match extended.get(var) {
                Some(bound) if bound != node => return None,
                Some(_) => {}
                None => {
                    extended.insert(var.clone(), node.clone());
                }
            },
        }
    }
    Some(extended)
}

fn instantiate(pattern: &Pattern, binding: &Binding) -> Option<(Node, Node, Node)> {
    let resolve = |term: &PatternTerm| match term {
        PatternTerm::Node(node) => Some(node.clone()),
        PatternTerm::Var(var) => binding.get(var).cloned(),
    };
    let [s, p, o] = pattern;
    Some((resolve(s)?, resolve(p)?, resolve(o)?))
}

fn apply(graph: &mut Graph, operation: &Operation) {
    match operation {
        Operation::InsertData(triples) => {
            for (s, p, o) in triples.iter().filter_map(|t| instantiate(t, &Binding::new())) {
                graph.insert(s, p, o);
            }
        }
        Operation::DeleteInsert {
            delete,
            insert,
            condition,
        } => {
            let solutions = evaluate(graph, condition);
            for binding in &solutions {
                for (s, p, o) in delete.iter().filter_map(|t| instantiate(t, binding)) {
                    graph.remove(&s, &p, &o);
                }
            }
            for binding in &solutions {
                for (s, p, o) in insert.iter().filter_map(|t| instantiate(t, binding)) {
                    graph.insert(s, p, o);
                }
            }
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Node(Node),
    Var(String),
    Word(String),
    Dot,
    Semicolon,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' | ';' | '{' | '}' => {
                chars.next();
                tokens.push(match c {
                    '.' => Token::Dot,
                    ';' => Token::Semicolon,
                    '{' => Token::Open,
                    _ => Token::Close,
                });
            }
            '<' => {
                chars.next();
                let iri: String = chars.by_ref().take_while(|c| *c != '>').collect();
                tokens.push(Token::Node(Node::Iri(iri)));
            }
            '?' => {
                chars.next();
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                tokens.push(Token::Var(name));
            }
            '"' => {
                chars.next();
                let mut lexical = String::new();
                loop {
                    match chars.next().ok_or("unterminated string")? {
                        '"' => break,
                        '\\' => lexical.push(unescape(&mut chars)?),
                        c => lexical.push(c),
                    }
                }
                let mut datatype = format!("{XSD}string");
                if chars.peek() == Some(&'^') {
                    chars.next();
                    if chars.next() != Some('^') {
                        return Err("expected ^^".to_string());
                    }
                    datatype = if chars.peek() == Some(&'<') {
                        chars.next();
                        chars.by_ref().take_while(|c| *c != '>').collect()
                    } else {
                        let word: String = chars
                            .by_ref()
                            .take_while(|c| !c.is_whitespace())
                            .collect();
                        let local = word
                            .strip_prefix("xsd:")
                            .ok_or_else(|| format!("unknown datatype {word}"))?;
                        format!("{XSD}{local}")
                    };
                }
                tokens.push(Token::Node(Node::Literal { lexical, datatype }));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '{' | '}') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(if word == "a" {
                    Token::Node(Node::iri(RDF_TYPE))
                } else {
                    Token::Word(word)
                });
            }
        }
    }
    Ok(tokens)
}

fn unescape(chars: &mut impl Iterator<Item = char>) -> Result<char, String> {
    Ok(match chars.next().ok_or("dangling escape")? {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'u' => {
            let hex: String = chars.take(4).collect();
            u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| format!("bad escape \\u{hex}"))?
        }
        c => c,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, String> {
        let mut parser = Self {
            tokens: tokenize(text)?,
            pos: 0,
        };
        parser.prologue();
        Ok(parser)
    }

    fn prologue(&mut self) {
        while self.peek() == Some(&Token::Word("PREFIX".to_string())) {
            self.pos += 3;
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Result<Token, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or("unexpected end of input")?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        let token = self.bump()?;
        if &token == expected {
            Ok(())
        } else {
            Err(format!("expected {expected:?}, found {token:?}"))
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), String> {
        self.expect(&Token::Word(keyword.to_string()))
    }

    fn select(&mut self) -> Result<Select, String> {
        self.keyword("SELECT")?;
        let mut vars = Vec::new();
        loop {
            match self.bump()? {
                Token::Var(var) => vars.push(var),
                Token::Word(w) if w == "*" => {}
                Token::Word(w) if w == "WHERE" => break,
                other => return Err(format!("unexpected {other:?} in projection")),
            }
        }
        let group = self.group()?;
        Ok(Select { vars, group })
    }

    fn update(&mut self) -> Result<Vec<Operation>, String> {
        let mut operations = Vec::new();
        while self.peek().is_some() {
            match self.bump()? {
                Token::Word(w) if w == "INSERT" => {
                    self.keyword("DATA")?;
                    operations.push(Operation::InsertData(self.template()?));
                }
                Token::Word(w) if w == "DELETE" => {
                    let delete = self.template()?;
                    self.keyword("INSERT")?;
                    let insert = self.template()?;
                    self.keyword("WHERE")?;
                    let condition = self.group()?;
                    operations.push(Operation::DeleteInsert {
                        delete,
                        insert,
                        condition,
                    });
                }
                other => return Err(format!("unexpected {other:?}")),
            }
            if self.peek() == Some(&Token::Semicolon) {
                self.pos += 1;
            }
        }
        Ok(operations)
    }

    fn term(&mut self) -> Result<PatternTerm, String> {
        match self.bump()? {
            Token::Node(node) => Ok(PatternTerm::Node(node)),
            Token::Var(var) => Ok(PatternTerm::Var(var)),
            other => Err(format!("expected a term, found {other:?}")),
        }
    }

    fn pattern(&mut self) -> Result<Pattern, String> {
        let pattern = [self.term()?, self.term()?, self.term()?];
        self.expect(&Token::Dot)?;
        Ok(pattern)
    }

    fn template(&mut self) -> Result<Vec<Pattern>, String> {
        self.expect(&Token::Open)?;
        let mut patterns = Vec::new();
        while self.peek() != Some(&Token::Close) {
            patterns.push(self.pattern()?);
        }
        self.expect(&Token::Close)?;
        Ok(patterns)
    }

    fn group(&mut self) -> Result<Group, String> {
        self.expect(&Token::Open)?;
        let mut group = Group::default();
        loop {
            match self.peek() {
                Some(Token::Close) => {
                    self.pos += 1;
                    return Ok(group);
                }
                Some(Token::Word(w)) if w == "VALUES" => {
                    self.pos += 1;
                    let Token::Var(var) = self.bump()? else {
                        return Err("expected a variable after VALUES".to_string());
                    };
                    self.expect(&Token::Open)?;
                    let mut nodes = Vec::new();
                    loop {
                        match self.bump()? {
                            Token::Node(node) => nodes.push(node),
                            Token::Close => break,
                            other => return Err(format!("unexpected {other:?} in VALUES")),
                        }
                    }
                    group.values = Some((var, nodes));
                }
                Some(_) => group.patterns.push(self.pattern()?),
                None => return Err("unterminated group".to_string()),
            }
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A catalog product priced in euros, e.g. `product("P1", "2.50")`.
pub fn product(id: &str, price: &str) -> CatalogProduct {
    CatalogProduct {
        product_id: ProductId::new(id),
        name: format!("Product {id}"),
        price: price.parse().unwrap_or(Decimal::ZERO),
        brand: "Acme".to_string(),
    }
}
