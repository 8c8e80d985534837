//! Line parser for the binding language.
//!
//! Every non-blank line is `let NAME = TERM (+ TERM)*`, where a term is an
//! integer literal or a name. `#` starts a comment that runs to the end of
//! the line.

/// One operand of a binding's sum.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// An integer literal.
    Number(i64),
    /// A reference to another binding.
    Name {
        /// The referenced name.
        text: String,
        /// 1-based column of the reference.
        column: u32,
    },
}

/// A successfully parsed line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLine {
    /// Bound name.
    pub name: String,
    /// 1-based column of the bound name.
    pub column: u32,
    /// Operands, in source order.
    pub terms: Vec<Term>,
}

/// Why a line was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    /// 1-based column where parsing stopped.
    pub column: u32,
    /// Human-readable message.
    pub message: String,
}

impl SyntaxError {
    fn at(cursor: &Cursor<'_>, message: impl Into<String>) -> Self {
        Self {
            column: cursor.column(),
            message: message.into(),
        }
    }
}

struct Cursor<'src> {
    text: &'src str,
    pos: usize,
}

impl<'src> Cursor<'src> {
    /// 1-based column of the cursor, counted in characters.
    fn column(&self) -> u32 {
        let consumed = self.text.get(..self.pos).map_or(0, |done| done.chars().count());
        u32::try_from(consumed).map_or(u32::MAX, |count| count.saturating_add(1))
    }

    fn rest(&self) -> &'src str {
        self.text.get(self.pos..).unwrap_or_default()
    }

    fn at_end(&self) -> bool {
        self.rest().is_empty()
    }

    fn skip_spaces(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len_utf8();
            return true;
        }
        false
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> &'src str {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, ch)| !accept(*ch))
            .map_or(rest.len(), |(index, _)| index);
        self.pos += len;
        rest.get(..len).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn identifier(&mut self) -> Option<&'src str> {
        let first = self.peek()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        Some(self.take_while(|ch| ch.is_ascii_alphanumeric() || ch == '_'))
    }
}

/// Parse one source line. Blank and comment-only lines give `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ParsedLine>, SyntaxError> {
    let code = line.find('#').map_or(line, |start| &line[..start]);
    let mut cursor = Cursor { text: code, pos: 0 };

    cursor.skip_spaces();
    if cursor.at_end() {
        return Ok(None);
    }
    let start = cursor.column();
    if cursor.identifier() != Some("let") {
        return Err(SyntaxError {
            column: start,
            message: "expected `let`".to_owned(),
        });
    }

    cursor.skip_spaces();
    let column = cursor.column();
    let name = cursor
        .identifier()
        .ok_or_else(|| SyntaxError::at(&cursor, "expected a name after `let`"))?
        .to_owned();

    cursor.skip_spaces();
    if !cursor.eat('=') {
        return Err(SyntaxError::at(&cursor, format!("expected `=` after `{name}`")));
    }

    let mut terms = Vec::new();
    loop {
        cursor.skip_spaces();
        terms.push(parse_term(&mut cursor)?);
        cursor.skip_spaces();
        if cursor.at_end() {
            break;
        }
        if !cursor.eat('+') {
            return Err(SyntaxError::at(&cursor, "expected `+` or end of line"));
        }
    }

    Ok(Some(ParsedLine {
        name,
        column,
        terms,
    }))
}

fn parse_term(cursor: &mut Cursor<'_>) -> Result<Term, SyntaxError> {
    let column = cursor.column();
    match cursor.peek() {
        Some(ch) if ch.is_ascii_digit() => {
            let digits = cursor.take_while(|digit| digit.is_ascii_digit());
            digits.parse::<i64>().map(Term::Number).map_err(|_| SyntaxError {
                column,
                message: format!("integer literal `{digits}` is out of range"),
            })
        }
        _ => cursor
            .identifier()
            .map(|text| Term::Name {
                text: text.to_owned(),
                column,
            })
            .ok_or_else(|| SyntaxError::at(cursor, "expected a number or a name")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sums_of_numbers_and_names() {
        let parsed = parse_line("let total = 1 + width+ 22 # trailing").unwrap().unwrap();
        assert_eq!(parsed.name, "total");
        assert_eq!(parsed.column, 5);
        assert_eq!(
            parsed.terms,
            vec![
                Term::Number(1),
                Term::Name {
                    text: "width".to_owned(),
                    column: 17,
                },
                Term::Number(22),
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   # nothing here"), Ok(None));
    }

    #[test]
    fn errors_point_at_the_offending_column() {
        let missing_let = parse_line("  x = 1").unwrap_err();
        assert_eq!(missing_let.column, 3);

        let missing_eq = parse_line("let x 1").unwrap_err();
        assert_eq!(missing_eq.column, 7);
        assert_eq!(missing_eq.message, "expected `=` after `x`");

        let dangling_plus = parse_line("let x = 1 +").unwrap_err();
        assert_eq!(dangling_plus.column, 12);
        assert_eq!(dangling_plus.message, "expected a number or a name");

        let missing_plus = parse_line("let x = 1 2").unwrap_err();
        assert_eq!(missing_plus.column, 11);
    }

    #[test]
    fn columns_count_characters() {
        let missing_let = parse_line("\u{3000}x = 1").unwrap_err();
        assert_eq!(missing_let.column, 2);

        let missing_name = parse_line("let\u{3000}é = 1").unwrap_err();
        assert_eq!(missing_name.column, 5);

        let missing_term = parse_line("let x = \u{3000}+").unwrap_err();
        assert_eq!(missing_term.column, 10);
    }

    #[test]
    fn oversized_literals_are_rejected() {
        let error = parse_line("let big = 99999999999999999999").unwrap_err();
        assert_eq!(error.column, 11);
        assert!(error.message.contains("out of range"));
    }
}
