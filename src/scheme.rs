//! Recursive-descent parser from tokens to S-expression data.
//!
//! Since Scheme code is also data, the parser plays the role of `read`: it turns
//! source text into [`Value`]s built from cons cells, following R5RS §7.1.2.
//!
//! ```text
//! program      := datum*
//! datum        := list | abbreviation | simple_datum
//! abbreviation := "'" datum
//! list         := "(" datum* [ "." datum ] ")"
//! ```
//!
//! Every [`ParseError`] raised here carries a `[line, column]` coordinate.

use std::num::IntErrorKind;

use crate::ast::{NumberType, Value, sym};
use crate::lexer::{Token, TokenKind, Tokenizer};
use crate::{Coordinate, Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Parser limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Maximum nesting of lists and quotes
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Convert a byte offset into a coordinate. The line counts the line breaks before
/// `offset`; the column is the distance from the last of them (or from the start of
/// the text on the first line).
pub fn position_to_coordinate(text: &str, offset: usize) -> Coordinate {
    let prefix = &text.as_bytes()[..offset.min(text.len())];
    let newlines = prefix.iter().filter(|&&b| b == b'\n').count();
    let column = match prefix.iter().rposition(|&b| b == b'\n') {
        Some(newline) => offset - newline,
        None => offset,
    };
    Coordinate {
        line: newlines + 1,
        column,
    }
}

/// Parser state: the token stream plus one token of lookahead
struct SchemeParser<'a> {
    text: &'a str,
    tokens: Tokenizer<'a>,
    current: Option<Token<'a>>,
    config: ParseConfig,
}

impl<'a> SchemeParser<'a> {
    fn new(text: &'a str, config: ParseConfig) -> Result<Self, Error> {
        let mut parser = SchemeParser {
            text,
            tokens: Tokenizer::new(text),
            current: None,
            config,
        };
        parser.advance()?;
        Ok(parser)
    }

    fn advance(&mut self) -> Result<(), Error> {
        self.current = self.tokens.next().transpose()?;
        Ok(())
    }

    fn error_at(&self, kind: ParseErrorKind, message: &str, offset: usize) -> Error {
        ParseError::at(kind, message, self.text, offset).into()
    }

    fn end_of_input(&self, kind: ParseErrorKind, message: &str) -> Error {
        self.error_at(kind, message, self.text.len())
    }

    fn program(&mut self) -> Result<Vec<Value>, Error> {
        let mut data = Vec::new();
        while self.current.is_some() {
            data.push(self.datum(0)?);
        }
        Ok(data)
    }

    fn datum(&mut self, depth: usize) -> Result<Value, Error> {
        let Some(token) = self.current else {
            return Err(self.end_of_input(
                ParseErrorKind::UnexpectedToken,
                "Unexpected end of input",
            ));
        };
        if depth >= self.config.max_depth {
            let message = format!(
                "Expression too deeply nested (max depth: {})",
                self.config.max_depth
            );
            return Err(self.error_at(ParseErrorKind::TooDeeplyNested, &message, token.offset));
        }

        match token.kind {
            TokenKind::LeftParen => self.list(depth),
            TokenKind::Quote => self.abbreviation(depth),
            _ => self.simple_datum(token),
        }
    }

    fn simple_datum(&mut self, token: Token<'a>) -> Result<Value, Error> {
        let value = match token.kind {
            TokenKind::Boolean => Value::Boolean(token.text == "#t"),
            TokenKind::Number => self.number(token)?,
            TokenKind::Identifier => Value::Symbol(token.text.to_owned()),
            TokenKind::String => Value::String(token.text.trim_matches('"').to_owned()),
            TokenKind::LeftParen | TokenKind::RightParen | TokenKind::Quote => {
                let message = format!("Unexpected token '{}'", token.text);
                let err = ParseError::at(
                    ParseErrorKind::UnexpectedToken,
                    message,
                    self.text,
                    token.offset,
                )
                .with_found(token.text);
                return Err(err.into());
            }
        };
        self.advance()?;
        Ok(value)
    }

    /// Strip the radix prefix and read the digits in that base
    fn number(&self, token: Token<'a>) -> Result<Value, Error> {
        let (radix, digits) = match token.text.strip_prefix('#') {
            Some(rest) => {
                let radix = match rest.as_bytes().first() {
                    Some(b'b') => 2,
                    Some(b'o') => 8,
                    Some(b'x') => 16,
                    _ => 10,
                };
                (radix, rest.get(1..).unwrap_or_default())
            }
            None => (10, token.text),
        };

        NumberType::from_str_radix(digits, radix)
            .map(Value::Number)
            .map_err(|err| {
                let message = match err.kind() {
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                        "Invalid number: too large for a 64-bit integer"
                    }
                    _ => "Invalid number",
                };
                ParseError::at(ParseErrorKind::InvalidNumber, message, self.text, token.offset)
                    .with_found(token.text)
                    .into()
            })
    }

    fn abbreviation(&mut self, depth: usize) -> Result<Value, Error> {
        self.advance()?;
        let quoted = self.datum(depth + 1)?;
        Ok(Value::list([sym("quote"), quoted]))
    }

    fn list(&mut self, depth: usize) -> Result<Value, Error> {
        self.advance()?;
        let mut items = Vec::new();
        let mut dot_index: Option<usize> = None;

        let closing = loop {
            let Some(token) = self.current else {
                return Err(self.end_of_input(
                    ParseErrorKind::UnmatchedParentheses,
                    "Unmatched parentheses at end of input",
                ));
            };
            match token.kind {
                TokenKind::RightParen => break token,
                TokenKind::Identifier if token.text == "." => {
                    if dot_index.is_some() {
                        let err = ParseError::at(
                            ParseErrorKind::InvalidDot,
                            "Invalid usage of '.'",
                            self.text,
                            token.offset,
                        )
                        .with_found(".");
                        return Err(err.into());
                    }
                    dot_index = Some(items.len());
                    self.advance()?;
                }
                _ => items.push(self.datum(depth + 1)?),
            }
        };

        // The dot must follow at least one element and precede exactly one
        let dotted = match dot_index {
            Some(index) if index == 0 || index + 1 != items.len() => {
                return Err(self.error_at(
                    ParseErrorKind::InvalidDot,
                    "Invalid location for '.' in list",
                    closing.offset,
                ));
            }
            Some(_) => true,
            None => false,
        };
        self.advance()?;

        let tail = if dotted {
            items.pop().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        };
        Ok(Value::list_with_tail(items, tail))
    }
}

/// Parse a complete source text into its top-level expressions.
pub fn parse_scheme(text: &str) -> Result<Vec<Value>, Error> {
    parse_scheme_with_config(text, ParseConfig::default())
}

/// Parse a complete source text with explicit limits.
pub fn parse_scheme_with_config(text: &str, config: ParseConfig) -> Result<Vec<Value>, Error> {
    SchemeParser::new(text, config)?.program()
}

/// Parse exactly one datum; anything after it is an error.
pub fn parse_datum(text: &str) -> Result<Value, Error> {
    let mut parser = SchemeParser::new(text, ParseConfig::default())?;
    let datum = parser.datum(0)?;
    if let Some(token) = parser.current {
        let err = ParseError::at(
            ParseErrorKind::UnexpectedToken,
            "Unexpected remaining input",
            text,
            token.offset,
        )
        .with_found(token.text);
        return Err(err.into());
    }
    Ok(datum)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};

    /// Test result variants for parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),                // Parsing should succeed with this value
        SpecificError(ParseErrorKind), // Parsing should fail with this kind
        LexFailure(usize),             // Tokenizing should fail at this offset
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    /// Run single-datum parse tests with round-trip validation
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            match (parse_datum(input), expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    // display -> parse -> display should be identical
                    let displayed = format!("{actual}");
                    if matches!(actual, Value::String(_)) {
                        continue; // strings display without their quotes
                    }
                    let reparsed = parse_datum(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(
                        displayed,
                        format!("{reparsed}"),
                        "{test_id}: round-trip display mismatch"
                    );
                }
                (Err(Error::ParseError(err)), SpecificError(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: wrong error kind ({err:?})");
                    assert!(err.coordinate.is_some(), "{test_id}: missing coordinate");
                }
                (Err(Error::LexError { offset }), LexFailure(expected_offset)) => {
                    assert_eq!(offset, *expected_offset, "{test_id}: wrong lex offset");
                }
                (result, expected) => {
                    panic!("{test_id}: expected {expected:?}, got {result:?}");
                }
            }
        }
    }

    #[test]
    fn test_parser_data_driven() {
        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("0", success(0)),
            ("#d17", success(17)),
            ("#b101", success(5)),
            ("#o17", success(15)),
            ("#x1F", success(31)),
            ("#xff", success(255)),
            ("9223372036854775807", success(i64::MAX)),
            ("#x7fffffffffffffff", success(i64::MAX)),
            ("9223372036854775808", SpecificError(ParseErrorKind::InvalidNumber)),
            ("99999999999999999999", SpecificError(ParseErrorKind::InvalidNumber)),
            // ===== BOOLEANS, SYMBOLS, STRINGS =====
            ("#t", success(true)),
            ("#f", success(false)),
            ("foo", success(sym("foo"))),
            ("set-cdr!", success(sym("set-cdr!"))),
            ("...", success(sym("..."))),
            ("+", success(sym("+"))),
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            ("\"back\\slash\"", success("back\\slash")),
            // ===== LISTS =====
            ("()", success(nil())),
            ("(  )", success(nil())),
            ("(1 2 3)", success([1, 2, 3])),
            ("(1 (2 3) 4)", success(vec![val(1), val([2, 3]), val(4)])),
            ("(1 . 2)", success(Value::cons(val(1), val(2)))),
            (
                "(1 2 . 3)",
                success(Value::list_with_tail([val(1), val(2)], val(3))),
            ),
            ("(1 . (2 3))", success([1, 2, 3])),
            ("(a . ())", success(vec![sym("a")])),
            (
                "(define (f x) x)",
                success(vec![
                    sym("define"),
                    val(vec![sym("f"), sym("x")]),
                    sym("x"),
                ]),
            ),
            // ===== QUOTE =====
            ("'a", success(vec![sym("quote"), sym("a")])),
            (
                "'(1 2)",
                success(vec![sym("quote"), val([1, 2])]),
            ),
            (
                "''a",
                success(vec![sym("quote"), val(vec![sym("quote"), sym("a")])]),
            ),
            ("'()", success(vec![sym("quote"), nil()])),
            // ===== COMMENTS =====
            ("; leading\n(1 ; inner\n 2)", success([1, 2])),
            // ===== ERRORS =====
            (")", SpecificError(ParseErrorKind::UnexpectedToken)),
            ("(1 2", SpecificError(ParseErrorKind::UnmatchedParentheses)),
            ("((1)", SpecificError(ParseErrorKind::UnmatchedParentheses)),
            ("'", SpecificError(ParseErrorKind::UnexpectedToken)),
            ("", SpecificError(ParseErrorKind::UnexpectedToken)),
            ("(1 . 2 3)", SpecificError(ParseErrorKind::InvalidDot)),
            ("(1 . . 2)", SpecificError(ParseErrorKind::InvalidDot)),
            ("(. 1)", SpecificError(ParseErrorKind::InvalidDot)),
            ("(1 .)", SpecificError(ParseErrorKind::InvalidDot)),
            ("(.)", SpecificError(ParseErrorKind::InvalidDot)),
            ("1 2", SpecificError(ParseErrorKind::UnexpectedToken)),
            ("(1 #z)", LexFailure(3)),
            ("\"open", LexFailure(0)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_parse_program() {
        let program = parse_scheme("(define x 1)\n(write x) 'done").unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program[2], val(vec![sym("quote"), sym("done")]));
        assert!(parse_scheme("").unwrap().is_empty());
        assert!(parse_scheme("  ; nothing here\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_error_aborts_whole_program() {
        let err = parse_scheme("(write 1)\n(write 2").unwrap_err();
        assert!(err.is_syntax_error());
        assert!(matches!(
            err,
            Error::ParseError(ParseError {
                kind: ParseErrorKind::UnmatchedParentheses,
                ..
            })
        ));
    }

    #[test]
    fn test_error_coordinates() {
        let test_cases = vec![
            // (input, line, column)
            (")", 1, 0),
            ("(a b)\n  )", 2, 3),
            ("(1\n2\n (3 . 4 5))", 3, 10),
            ("(1 2", 1, 4),
        ];

        for (input, line, column) in test_cases {
            let Err(Error::ParseError(err)) = parse_scheme(input) else {
                panic!("expected a parse error for {input:?}");
            };
            assert_eq!(
                err.coordinate,
                Some(Coordinate { line, column }),
                "coordinate for {input:?}"
            );
        }

        let err = parse_scheme("\n\n )").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ParseError: Unexpected token ')' [line 3, column 2]\nFound: )"
        );
    }

    #[test]
    fn test_position_to_coordinate() {
        let text = "ab\ncd\n\nef";
        assert_eq!(position_to_coordinate(text, 0), Coordinate { line: 1, column: 0 });
        assert_eq!(position_to_coordinate(text, 1), Coordinate { line: 1, column: 1 });
        assert_eq!(position_to_coordinate(text, 3), Coordinate { line: 2, column: 1 });
        assert_eq!(position_to_coordinate(text, 7), Coordinate { line: 4, column: 1 });
        assert_eq!(
            position_to_coordinate(text, text.len()),
            Coordinate { line: 4, column: 3 }
        );
    }

    #[test]
    fn test_nesting_limit() {
        let config = ParseConfig { max_depth: 8 };
        let shallow = format!("{}{}", "(".repeat(8), ")".repeat(8));
        assert!(parse_scheme_with_config(&shallow, config).is_ok());

        let deep = format!("{}{}", "(".repeat(9), ")".repeat(9));
        let err = parse_scheme_with_config(&deep, config).unwrap_err();
        assert!(matches!(
            err,
            Error::ParseError(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            })
        ));

        let quotes = format!("{}a", "'".repeat(9));
        assert!(parse_scheme_with_config(&quotes, config).is_err());
    }
}
