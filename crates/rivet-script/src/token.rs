//! Lexer for the embedded script language.
//!
//! Tokenization is driven by logos; the token set is deliberately small —
//! the language exists to exercise the bridge, not to be a general-purpose
//! scripting language.

use logos::Logos;

/// Byte span of a token in the source text.
pub type Span = std::ops::Range<usize>;

/// Script token.
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    // Whitespace and comments (skipped)
    #[regex(r"[ \t\r\n]+", logos::skip)]
    Whitespace,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    // Keywords (must come before identifiers)
    #[token("let")]
    Let,

    #[token("fn")]
    Fn,

    #[token("return")]
    Return,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("nil")]
    Nil,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    Str(String),

    // Identifiers
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("==")]
    EqEq,

    #[token("!=")]
    BangEq,

    #[token("<=")]
    LtEq,

    #[token(">=")]
    GtEq,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("&&")]
    AndAnd,

    #[token("||")]
    OrOr,

    #[token("!")]
    Bang,

    #[token("=")]
    Eq,

    // Delimiters
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token(";")]
    Semi,
}

/// Strip quotes and process escapes in a string literal.
fn lex_string(lex: &mut logos::Lexer<Token>) -> String {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// 1-based line number of a byte offset.
pub fn line_at(src: &str, offset: usize) -> usize {
    let end = offset.min(src.len());
    src.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Tokenize a source string into (token, span) pairs.
pub fn lex(src: &str) -> Result<Vec<(Token, Span)>, crate::error::ScriptError> {
    let mut lexer = Token::lexer(src);
    let mut out = Vec::new();
    while let Some(item) = lexer.next() {
        match item {
            Ok(tok) => out.push((tok, lexer.span())),
            Err(_) => {
                return Err(crate::error::ScriptError::Parse {
                    line: line_at(src, lexer.span().start),
                    message: format!("unexpected character {:?}", lexer.slice()),
                })
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("let letx fn"),
            vec![Token::Let, Token::Ident("letx".into()), Token::Fn]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5"),
            vec![Token::Int(1), Token::Float(2.5)]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n""#),
            vec![Token::Str("a\"b\n".into())]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("1 // comment\n2"),
            vec![Token::Int(1), Token::Int(2)]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== = <= < && !"),
            vec![
                Token::EqEq,
                Token::Eq,
                Token::LtEq,
                Token::Lt,
                Token::AndAnd,
                Token::Bang
            ]
        );
    }

    #[test]
    fn test_bad_character_errors() {
        assert!(lex("let @x = 1;").is_err());
    }

    #[test]
    fn test_line_numbers() {
        assert_eq!(line_at("a\nb\nc", 0), 1);
        assert_eq!(line_at("a\nb\nc", 2), 2);
        assert_eq!(line_at("a\nb\nc", 4), 3);
    }
}
