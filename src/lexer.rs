//! Tokenizer for the lexical structure of R5RS §7.1.1.
//!
//! Each lexical rule is a small `nom` parser. At every position the rules are tried in
//! a fixed priority order and the first one that matches wins, so for example `-5`
//! lexes as the identifier `-` followed by the number `5`, and `123abc` as a number
//! followed by an identifier.
//!
//! The [`Tokenizer`] is a lazy iterator. When no rule matches it yields a single
//! [`Error::LexError`] carrying the byte offset and then stops.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, one_of, satisfy},
    combinator::{opt, recognize, value},
    sequence::{pair, preceded},
};

use crate::Error;

/// Token categories, in the order the rules are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Boolean,
    Number,
    Identifier,
    LeftParen,
    RightParen,
    Quote,
    String,
}

/// A token borrowed from the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Exact source text, including a radix prefix or string quotes
    pub text: &'a str,
    /// Byte offset of the first character
    pub offset: usize,
}

/// Characters that may start an identifier besides ASCII letters
const SPECIAL_INITIAL: &str = "!$%&*.:<=>?^_~";

/// Characters that may continue an identifier besides initials and digits
const SPECIAL_SUBSEQUENT: &str = "+-.@";

fn is_initial(c: char) -> bool {
    c.is_ascii_alphabetic() || SPECIAL_INITIAL.contains(c)
}

fn is_subsequent(c: char) -> bool {
    is_initial(c) || c.is_ascii_digit() || SPECIAL_SUBSEQUENT.contains(c)
}

/// `;` up to (not including) the end of the line
fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_till(|c: char| c == '\n'))).parse(input)
}

fn boolean(input: &str) -> IResult<&str, TokenKind> {
    value(TokenKind::Boolean, alt((tag("#t"), tag("#f")))).parse(input)
}

/// An integer with an optional radix prefix
fn number(input: &str) -> IResult<&str, TokenKind> {
    value(
        TokenKind::Number,
        alt((
            preceded(tag("#b"), take_while1(|c: char| c == '0' || c == '1')),
            preceded(tag("#o"), take_while1(|c: char| c.is_digit(8))),
            preceded(opt(tag("#d")), digit1),
            preceded(tag("#x"), hex_digit1),
        )),
    )
    .parse(input)
}

fn identifier(input: &str) -> IResult<&str, TokenKind> {
    value(
        TokenKind::Identifier,
        alt((
            // `.` and `...` are covered here since `.` is an initial
            recognize(pair(satisfy(is_initial), take_while(is_subsequent))),
            recognize(one_of("+-")),
        )),
    )
    .parse(input)
}

/// A naive string: no escapes, and it may span neither `"` nor a line break
fn string(input: &str) -> IResult<&str, TokenKind> {
    value(
        TokenKind::String,
        recognize((char('"'), take_till(|c: char| c == '"' || c == '\n'), char('"'))),
    )
    .parse(input)
}

fn token_kind(input: &str) -> IResult<&str, TokenKind> {
    alt((
        boolean,
        number,
        identifier,
        value(TokenKind::LeftParen, char('(')),
        value(TokenKind::RightParen, char(')')),
        value(TokenKind::Quote, char('\'')),
        string,
    ))
    .parse(input)
}

/// Lazy, non-restartable iterator over the tokens of a source text
pub struct Tokenizer<'a> {
    input: &'a str,
    offset: usize,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer {
            input,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset just past the last consumed token
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            let rest = &self.input[self.offset..];
            let trimmed = rest.trim_start();
            self.offset += rest.len() - trimmed.len();
            match comment(trimmed) {
                Ok((after, _)) => self.offset += trimmed.len() - after.len(),
                Err(_) => return,
            }
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_whitespace_and_comments();

        let rest = &self.input[self.offset..];
        if rest.is_empty() {
            return None;
        }

        match token_kind(rest) {
            Ok((after, kind)) => {
                let len = rest.len() - after.len();
                let token = Token {
                    kind,
                    text: &rest[..len],
                    offset: self.offset,
                };
                self.offset += len;
                Some(Ok(token))
            }
            Err(_) => {
                self.failed = true;
                Some(Err(Error::LexError {
                    offset: self.offset,
                }))
            }
        }
    }
}

/// Tokenize a source text
pub fn tokenize(input: &str) -> Tokenizer<'_> {
    Tokenizer::new(input)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use TokenKind::*;

    /// Collect `(kind, text)` pairs, panicking on a lex error
    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        tokenize(input)
            .map(|t| {
                let t = t.unwrap();
                (t.kind, t.text)
            })
            .collect()
    }

    #[test]
    fn test_single_tokens_data_driven() {
        let test_cases = vec![
            ("#t", vec![(Boolean, "#t")]),
            ("#f", vec![(Boolean, "#f")]),
            ("42", vec![(Number, "42")]),
            ("#d42", vec![(Number, "#d42")]),
            ("#b1011", vec![(Number, "#b1011")]),
            ("#o777", vec![(Number, "#o777")]),
            ("#xFf", vec![(Number, "#xFf")]),
            ("foo", vec![(Identifier, "foo")]),
            ("set-car!", vec![(Identifier, "set-car!")]),
            ("<=", vec![(Identifier, "<=")]),
            ("a.b@c+d", vec![(Identifier, "a.b@c+d")]),
            ("+", vec![(Identifier, "+")]),
            ("-", vec![(Identifier, "-")]),
            (".", vec![(Identifier, ".")]),
            ("...", vec![(Identifier, "...")]),
            ("(", vec![(LeftParen, "(")]),
            (")", vec![(RightParen, ")")]),
            ("'", vec![(Quote, "'")]),
            ("\"hi there\"", vec![(String, "\"hi there\"")]),
            ("\"\"", vec![(String, "\"\"")]),
        ];

        for (input, expected) in test_cases {
            assert_eq!(kinds(input), expected, "tokenizing {input:?}");
        }
    }

    #[test]
    fn test_rule_priority_splits_tokens() {
        assert_eq!(kinds("-5"), vec![(Identifier, "-"), (Number, "5")]);
        assert_eq!(kinds("123abc"), vec![(Number, "123"), (Identifier, "abc")]);
        assert_eq!(kinds("#b012"), vec![(Number, "#b01"), (Number, "2")]);
        assert_eq!(kinds("+x"), vec![(Identifier, "+"), (Identifier, "x")]);
    }

    #[test]
    fn test_whitespace_and_comments_are_skipped() {
        let source = "(define x ; the answer\n  42)\n; trailing comment";
        assert_eq!(
            kinds(source),
            vec![
                (LeftParen, "("),
                (Identifier, "define"),
                (Identifier, "x"),
                (Number, "42"),
                (RightParen, ")"),
            ]
        );
        assert!(kinds("   \n\t ; only a comment").is_empty());
    }

    #[test]
    fn test_offsets() {
        let tokens: Vec<Token> = tokenize("(a\n  bc)").map(Result::unwrap).collect();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![0, 1, 5, 7]);
    }

    #[test]
    fn test_lex_error_stops_iteration() {
        let mut tokens = tokenize("(a #q b)");
        assert_eq!(tokens.next().unwrap().unwrap().kind, LeftParen);
        assert_eq!(tokens.next().unwrap().unwrap().kind, Identifier);
        assert_eq!(
            tokens.next().unwrap().unwrap_err(),
            Error::LexError { offset: 3 }
        );
        assert!(tokens.next().is_none());
    }

    #[test]
    fn test_lex_errors_data_driven() {
        let test_cases = vec![
            ("\"unterminated", 0),
            ("\"across\nlines\"", 0),
            ("x #", 2),
            ("[1]", 0),
            ("#T", 0),
            ("a {", 2),
        ];

        for (input, offset) in test_cases {
            let err = tokenize(input)
                .find_map(Result::err)
                .unwrap_or_else(|| panic!("expected lex error for {input:?}"));
            assert_eq!(err, Error::LexError { offset }, "lexing {input:?}");
        }
    }
}
