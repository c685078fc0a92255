//! Tokenizer and value parser for Doxygen `searchData` scripts.

use logos::Logos;

use crate::error::BuildError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|//[^\n]*")]
pub(crate) enum Token<'s> {
    #[token("var")]
    Var,

    #[token("=")]
    Assign,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice())]
    Ident(&'s str),

    #[regex(r"-?[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r"'([^'\\]|\\.)*'", |lex| lex.slice())]
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    Str(&'s str),
}

/// A literal from the script: strings, numbers and nested arrays only.
/// Numbers carry Doxygen flags the importer never reads, so their value is dropped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JsValue {
    Str(String),
    Number,
    Array(Vec<JsValue>),
}

impl JsValue {
    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn as_array(&self) -> Option<&[JsValue]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct ScriptParser<'s> {
    tokens: Vec<(Token<'s>, usize)>,
    index: usize,
    end: usize,
}

/// Parses `var <name> = <array>;` and returns the variable name and value.
pub(crate) fn parse_script(source: &str) -> Result<(String, JsValue), BuildError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(source).spanned() {
        match token {
            Ok(token) => tokens.push((token, span.start)),
            Err(()) => {
                return Err(BuildError::Import(format!(
                    "unexpected character near byte {}",
                    span.start
                )))
            }
        }
    }

    let mut parser = ScriptParser {
        tokens,
        index: 0,
        end: source.len(),
    };
    parser.expect(Token::Var)?;
    let name = match parser.next() {
        Some(Token::Ident(name)) => name.to_string(),
        _ => return Err(parser.error("expected variable name")),
    };
    parser.expect(Token::Assign)?;
    let value = parser.parse_value()?;
    if parser.peek() == Some(Token::Semicolon) {
        parser.index += 1;
    }
    if parser.peek().is_some() {
        return Err(parser.error("unexpected token after value"));
    }
    Ok((name, value))
}

impl<'s> ScriptParser<'s> {
    fn peek(&self) -> Option<Token<'s>> {
        self.tokens.get(self.index).map(|(token, _)| *token)
    }

    fn next(&mut self) -> Option<Token<'s>> {
        let token = self.peek()?;
        self.index += 1;
        Some(token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|(_, position)| *position)
            .unwrap_or(self.end)
    }

    fn error(&self, message: &str) -> BuildError {
        BuildError::Import(format!("{message} near byte {}", self.position()))
    }

    fn expect(&mut self, expected: Token<'s>) -> Result<(), BuildError> {
        if self.peek() == Some(expected) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}")))
        }
    }

    fn parse_value(&mut self) -> Result<JsValue, BuildError> {
        let position = self.position();
        match self.next() {
            Some(Token::LBracket) => self.parse_array(),
            Some(Token::Str(raw)) => Ok(JsValue::Str(unquote(raw))),
            Some(Token::Number) => Ok(JsValue::Number),
            _ => Err(BuildError::Import(format!(
                "expected a value near byte {position}"
            ))),
        }
    }

    fn parse_array(&mut self) -> Result<JsValue, BuildError> {
        let mut values = Vec::new();
        loop {
            if self.peek() == Some(Token::RBracket) {
                self.index += 1;
                return Ok(JsValue::Array(values));
            }
            values.push(self.parse_value()?);
            match self.peek() {
                Some(Token::Comma) => self.index += 1,
                Some(Token::RBracket) => {
                    self.index += 1;
                    return Ok(JsValue::Array(values));
                }
                _ => return Err(self.error("expected `,` or `]`")),
            }
        }
    }
}

/// Strips the quotes of a string literal and resolves backslash escapes.
fn unquote(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    if !inner.contains('\\') {
        return inner.to_string();
    }

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
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_single_and_double_quoted_strings() {
        let tokens: Vec<_> = Token::lexer(r#"['a\'b', "c", 1]"#)
            .collect::<Result<_, _>>()
            .expect("lex");
        assert_eq!(
            tokens,
            vec![
                Token::LBracket,
                Token::Str(r"'a\'b'"),
                Token::Comma,
                Token::Str(r#""c""#),
                Token::Comma,
                Token::Number,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn parses_nested_arrays_with_trailing_comma() {
        let (name, value) =
            parse_script("var searchData=\n[\n  ['a',['A',['../x.html#f',1,'S::A']]],\n];")
                .expect("parse");
        assert_eq!(name, "searchData");
        let records = value.as_array().expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_array().expect("record")[0].as_str(), Some("a"));
    }

    #[test]
    fn unquote_resolves_escapes() {
        assert_eq!(unquote(r"'it\'s'"), "it's");
        assert_eq!(unquote(r#""A\\""#), "A\\");
    }

    #[test]
    fn reports_positions_of_errors() {
        let error = parse_script("var searchData=[['a' 'b']];").expect_err("missing comma");
        assert!(error.to_string().contains("expected `,` or `]`"));

        assert!(parse_script("searchData=[];").is_err());
        assert!(parse_script("var searchData=[] extra").is_err());
        assert!(parse_script("var searchData=[#];").is_err());
    }
}
