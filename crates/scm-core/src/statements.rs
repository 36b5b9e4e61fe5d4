//! A small block-structured statement language.
//!
//! ```text
//! program   := item*
//! item      := block | statement
//! block     := '{' item* '}'
//! statement := word+ ';'
//! word      := run of characters other than whitespace, ';', '{', '}'
//! ```
//!
//! It is rich enough to exercise hierarchical reduction (blocks contain
//! statements, statements contain words) while staying trivial to parse, and
//! it backs the engine's own tests and the CLI's default language.

use crate::error::ParseError;
use crate::language::Language;
use crate::tree::{NodeIndex, Span, Tree, TreeBuilder};

pub const PROGRAM: &str = "program";
pub const BLOCK: &str = "block";
pub const STATEMENT: &str = "statement";
pub const WORD: &str = "word";

const INDENT: &str = "  ";

/// The statement language. Stateless; share it freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementLanguage;

impl StatementLanguage {
    pub fn new() -> Self {
        Self
    }
}

impl Language for StatementLanguage {
    fn name(&self) -> &str {
        "statements"
    }

    fn parse(&self, text: &str) -> Result<Tree, ParseError> {
        let tokens = tokenize(text);
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            builder: TreeBuilder::new(),
        };
        parser.builder.start_node(PROGRAM, 0);
        parser.items(None, text.len())?;
        parser.builder.finish_node(text.len());
        parser.builder.finish()
    }

    /// Canonical layout: one item per line, blocks indented by two spaces.
    /// Text that does not parse is returned unchanged.
    fn reformat(&self, text: &str) -> String {
        match self.parse(text) {
            Ok(tree) => {
                let mut out = String::with_capacity(text.len());
                render(&tree, text, tree.root(), 0, &mut out);
                out
            }
            Err(_) => text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Open(usize),
    Close(usize),
    Semi(usize),
    Word(Span),
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    for (at, ch) in text.char_indices() {
        let delimiter = match ch {
            '{' => Some(Token::Open(at)),
            '}' => Some(Token::Close(at)),
            ';' => Some(Token::Semi(at)),
            c if c.is_whitespace() => None,
            _ => {
                word_start.get_or_insert(at);
                continue;
            }
        };
        if let Some(start) = word_start.take() {
            tokens.push(Token::Word(Span::new(start, at)));
        }
        tokens.extend(delimiter);
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(Span::new(start, text.len())));
    }
    tokens
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    builder: TreeBuilder,
}

impl Parser<'_> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    /// Parses items until end of input (`open == None`) or the `}` closing the
    /// block opened at `open`. Returns the end offset of what was consumed.
    fn items(&mut self, open: Option<usize>, len: usize) -> Result<usize, ParseError> {
        loop {
            match self.next() {
                None => {
                    return match open {
                        Some(at) => Err(ParseError::new("unclosed block", at)),
                        None => Ok(len),
                    }
                }
                Some(Token::Close(at)) => {
                    return match open {
                        Some(_) => Ok(at + 1),
                        None => Err(ParseError::new("unbalanced '}'", at)),
                    }
                }
                Some(Token::Open(at)) => {
                    self.builder.start_node(BLOCK, at);
                    let end = self.items(Some(at), len)?;
                    self.builder.finish_node(end);
                }
                Some(Token::Semi(at)) => return Err(ParseError::new("empty statement", at)),
                Some(Token::Word(first)) => self.statement(first)?,
            }
        }
    }

    fn statement(&mut self, first: Span) -> Result<(), ParseError> {
        self.builder.start_node(STATEMENT, first.start);
        self.builder.leaf(WORD, first.start, first.end);
        loop {
            match self.next() {
                Some(Token::Word(span)) => {
                    self.builder.leaf(WORD, span.start, span.end);
                }
                Some(Token::Semi(at)) => {
                    self.builder.finish_node(at + 1);
                    return Ok(());
                }
                Some(Token::Open(at)) | Some(Token::Close(at)) => {
                    return Err(ParseError::new("expected ';'", at))
                }
                None => return Err(ParseError::new("unterminated statement", first.start)),
            }
        }
    }
}

fn render(tree: &Tree, text: &str, index: NodeIndex, depth: usize, out: &mut String) {
    let node = &tree[index];
    match node.kind() {
        BLOCK => {
            push_indent(out, depth);
            out.push_str("{\n");
            for child in node.children() {
                render(tree, text, *child, depth + 1, out);
            }
            push_indent(out, depth);
            out.push_str("}\n");
        }
        STATEMENT => {
            push_indent(out, depth);
            let words: Vec<&str> = node
                .children()
                .iter()
                .filter_map(|child| tree.text(*child, text))
                .collect();
            out.push_str(&words.join(" "));
            out.push_str(";\n");
        }
        _ => {
            for child in node.children() {
                render(tree, text, *child, depth, out);
            }
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
