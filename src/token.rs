// ABOUTME: Tokenizer turning RPAL source lines into a line-tagged token stream

use serde::Serialize;
use std::fmt;

/// Keywords reclassified from `ID` at scan time.
const RESERVED_KEYWORDS: &[&str] = &[
    "let", "in", "within", "where", "fn", "aug", "and", "or", "not", "gr", "ge", "ls", "le", "eq",
    "ne", "true", "false", "nil", "dummy", "rec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Keyword,
    Id,
    Int,
    Str,
    Operator,
    LParen,
    RParen,
    Semicolon,
    Comma,
}

/// A single lexeme plus the 1-based source line it came from.
///
/// `lexeme` keeps the original text: for `Str` this includes the
/// enclosing single quotes, for `Int` it is the decimal digits (parsed
/// lazily by whoever consumes the token, not by the tokenizer itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            line,
        }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == word
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?}:{}>", self.kind, self.lexeme)
    }
}

/// A character scanned but not recognized by any token class; tokenization
/// continues past it rather than aborting (see `SPEC_FULL.md` §11).
#[derive(Debug, Clone)]
pub struct TokenizerWarning {
    pub character: char,
    pub line: usize,
}

impl fmt::Display for TokenizerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected character '{}' at line {}, skipped",
            self.character, self.line
        )
    }
}

const SINGLE_OPERATOR_CHARS: &str = "+-*/&@|><.=~$!#%^_[]{}\"`?";

fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_id_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Strips `//` line comments, then scans the line left to right, matching
/// in the precedence order fixed by `SPEC_FULL.md` §4.1: double operators,
/// identifiers/keywords, integers, strings, single operators, punctuation.
fn tokenize_line(line: &str, line_number: usize, warnings: &mut Vec<TokenizerWarning>) -> Vec<Token> {
    let code = match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    };
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Double-character operators.
        if i + 1 < chars.len() {
            let pair: String = chars[i..i + 2].iter().collect();
            if matches!(pair.as_str(), ">=" | "<=" | "->" | "**") {
                tokens.push(Token::new(TokenKind::Operator, pair, line_number));
                i += 2;
                continue;
            }
        }

        if is_id_start(c) {
            let start = i;
            while i < chars.len() && is_id_continue(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let kind = if RESERVED_KEYWORDS.contains(&word.as_str()) {
                TokenKind::Keyword
            } else {
                TokenKind::Id
            };
            tokens.push(Token::new(kind, word, line_number));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::Int, digits, line_number));
            continue;
        }

        if c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                    continue;
                }
                if chars[i] == '\'' {
                    i += 1;
                    break;
                }
                i += 1;
            }
            let lexeme: String = chars[start..i].iter().collect();
            tokens.push(Token::new(TokenKind::Str, lexeme, line_number));
            continue;
        }

        if SINGLE_OPERATOR_CHARS.contains(c) {
            tokens.push(Token::new(TokenKind::Operator, c.to_string(), line_number));
            i += 1;
            continue;
        }

        match c {
            '(' => tokens.push(Token::new(TokenKind::LParen, "(", line_number)),
            ')' => tokens.push(Token::new(TokenKind::RParen, ")", line_number)),
            ';' => tokens.push(Token::new(TokenKind::Semicolon, ";", line_number)),
            ',' => tokens.push(Token::new(TokenKind::Comma, ",", line_number)),
            other => {
                warnings.push(TokenizerWarning {
                    character: other,
                    line: line_number,
                });
                i += 1;
                continue;
            }
        }
        i += 1;
    }

    tokens
}

/// Tokenizes every line of `source`, returning the flattened token stream
/// plus any non-fatal warnings collected along the way.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<TokenizerWarning>) {
    let mut tokens = Vec::new();
    let mut warnings = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        tokens.extend(tokenize_line(line, idx + 1, &mut warnings));
    }
    (tokens, warnings)
}
