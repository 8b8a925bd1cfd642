//! Tokens of the path-query language.

use crate::errors::QueryError;
use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum QueryToken {
    #[token("//")]
    DoubleSlash,
    #[token("/")]
    Slash,
    #[token("::")]
    Axis,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("*")]
    Star,
    #[token("@")]
    At,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("|")]
    Pipe,
    #[token("=")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    /// Names may contain hyphens: `starts-with`, `descendant-or-self`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(-[A-Za-z_][A-Za-z0-9_]*)*")]
    Name,
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,
    #[regex(r#""[^"]*""#)]
    #[regex(r"'[^']*'")]
    String,

    Eof,
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QueryToken::DoubleSlash => "'//'",
            QueryToken::Slash => "'/'",
            QueryToken::Axis => "'::'",
            QueryToken::DotDot => "'..'",
            QueryToken::Dot => "'.'",
            QueryToken::Star => "'*'",
            QueryToken::At => "'@'",
            QueryToken::LBracket => "'['",
            QueryToken::RBracket => "']'",
            QueryToken::LParen => "'('",
            QueryToken::RParen => "')'",
            QueryToken::Comma => "','",
            QueryToken::Pipe => "'|'",
            QueryToken::Eq => "'='",
            QueryToken::NotEq => "'!='",
            QueryToken::Lt => "'<'",
            QueryToken::LtEq => "'<='",
            QueryToken::Gt => "'>'",
            QueryToken::GtEq => "'>='",
            QueryToken::Name => "name",
            QueryToken::Number => "number",
            QueryToken::String => "string",
            QueryToken::Eof => "end of query",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme<'q> {
    pub token: QueryToken,
    pub text: &'q str,
    pub offset: usize,
}

/// Split a query into lexemes, terminated by an `Eof` lexeme.
pub fn tokenize(query: &str) -> Result<Vec<Lexeme<'_>>, QueryError> {
    let mut lexer = QueryToken::lexer(query);
    let mut lexemes = Vec::new();
    while let Some(result) = lexer.next() {
        let offset = lexer.span().start;
        match result {
            Ok(token) => lexemes.push(Lexeme {
                token,
                text: lexer.slice(),
                offset,
            }),
            Err(()) => {
                let rest = &query[offset..];
                return Err(match rest.chars().next() {
                    Some('\'' | '"') => QueryError::UnterminatedString,
                    Some(c) => QueryError::UnexpectedCharacter(c, offset),
                    None => QueryError::UnterminatedString,
                });
            }
        }
    }
    lexemes.push(Lexeme {
        token: QueryToken::Eof,
        text: "",
        offset: query.len(),
    });
    Ok(lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(query: &str) -> Vec<QueryToken> {
        tokenize(query).unwrap().into_iter().map(|l| l.token).collect()
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            tokens("//Call[@name = 'Free']/.."),
            vec![
                QueryToken::DoubleSlash,
                QueryToken::Name,
                QueryToken::LBracket,
                QueryToken::At,
                QueryToken::Name,
                QueryToken::Eq,
                QueryToken::String,
                QueryToken::RBracket,
                QueryToken::Slash,
                QueryToken::DotDot,
                QueryToken::Eof,
            ]
        );
    }

    #[test]
    fn test_hyphenated_names_and_axes() {
        let lexemes = tokenize("descendant-or-self::Name[starts-with(@name, \"F\")]").unwrap();
        assert_eq!(lexemes[0].text, "descendant-or-self");
        assert_eq!(lexemes[1].token, QueryToken::Axis);
        assert_eq!(lexemes[4].text, "starts-with");
        assert_eq!(lexemes[9].text, "\"F\"");
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("//Call[@name = 'Free]"), Err(QueryError::UnterminatedString));
        assert_eq!(tokenize("//Call#"), Err(QueryError::UnexpectedCharacter('#', 6)));
    }
}
