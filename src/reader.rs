use crate::error::{Position, SchemeError, SchemeResult};
use crate::heap::Heap;
use crate::symbol::{sym, SymbolTable};
use crate::value::Value;

/// Reader: parses source text into heap-allocated values.
///
/// The reader builds the same pair/atom representation the evaluator
/// consumes, so parsed source is indistinguishable from runtime data.
pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
}

/// Characters allowed anywhere in an identifier. The initial character
/// additionally must not be a digit.
fn is_identifier_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || b"+-*/<>=!?._:".contains(&ch)
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, heap: &'a mut Heap, symbols: &'a mut SymbolTable) -> Self {
        Reader {
            input: input.as_bytes(),
            pos: 0,
            heap,
            symbols,
        }
    }

    /// Read one datum. Returns None when only whitespace and comments remain.
    pub fn read(&mut self) -> SchemeResult<Option<Value>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return Ok(None);
        }
        let val = self.read_expr()?;
        Ok(Some(val))
    }

    /// Read all datums from the input.
    pub fn read_all(&mut self) -> SchemeResult<Vec<Value>> {
        let mut results = Vec::new();
        while let Some(val) = self.read()? {
            results.push(val);
        }
        Ok(results)
    }

    /// Current byte offset into the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Line/column of a byte offset, for diagnostics (1-based).
    fn position_at(&self, byte: usize) -> Position {
        let mut line = 1;
        let mut column = 1;
        for &ch in &self.input[..byte.min(self.input.len())] {
            if ch == b'\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Position { line, column }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_ascii_whitespace() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if self.peek() == Some(b';') {
                while let Some(ch) = self.peek() {
                    self.pos += 1;
                    if ch == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn is_delimiter(ch: u8) -> bool {
        ch.is_ascii_whitespace()
            || ch == b'('
            || ch == b')'
            || ch == b'\''
            || ch == b'"'
            || ch == b';'
    }

    fn read_expr(&mut self) -> SchemeResult<Value> {
        self.skip_whitespace_and_comments();

        let here = self.pos;
        let ch = self
            .peek()
            .ok_or_else(|| SchemeError::SyntaxError("unexpected end of input".into()))?;

        match ch {
            b'(' => self.read_list(),
            b')' => Err(SchemeError::UnexpectedRightParen(self.position_at(here))),
            b'\'' => self.read_quote(),
            b'"' => self.read_string(),
            _ => self.read_word(),
        }
    }

    /// Read a list: (a b c) or (a . b) or (a b . c).
    fn read_list(&mut self) -> SchemeResult<Value> {
        let open = self.pos;
        self.advance(); // consume '('

        let mut elements = Vec::new();
        let mut dot_tail = None;

        loop {
            self.skip_whitespace_and_comments();

            match self.peek() {
                None => return Err(SchemeError::UnclosedList(self.position_at(open))),
                Some(b')') => {
                    self.advance();
                    break;
                }
                Some(b'.') if self.dot_is_separator() => {
                    let dot = self.pos;
                    if elements.is_empty() {
                        return Err(SchemeError::MalformedDot(self.position_at(dot)));
                    }
                    self.advance(); // consume '.'
                    self.skip_whitespace_and_comments();
                    if matches!(self.peek(), None | Some(b')')) {
                        return Err(SchemeError::MalformedDot(self.position_at(dot)));
                    }
                    dot_tail = Some(self.read_expr()?);
                    self.skip_whitespace_and_comments();
                    match self.peek() {
                        None => return Err(SchemeError::UnclosedList(self.position_at(open))),
                        Some(b')') => {
                            self.advance();
                            break;
                        }
                        Some(_) => return Err(SchemeError::MalformedDot(self.position_at(dot))),
                    }
                }
                Some(_) => elements.push(self.read_expr()?),
            }
        }

        // Cons the elements up in reverse onto the tail.
        let mut result = dot_tail.unwrap_or(Value::Nil);
        for val in elements.into_iter().rev() {
            let pair = self.heap.alloc_pair(val, result)?;
            result = Value::Pair(pair);
        }
        Ok(result)
    }

    /// A '.' is the dot separator when followed by a delimiter or EOF;
    /// otherwise it belongs to a token such as `.5` or `...`.
    fn dot_is_separator(&self) -> bool {
        match self.input.get(self.pos + 1) {
            None => true,
            Some(&next) => Self::is_delimiter(next),
        }
    }

    /// Read quote sugar: 'x becomes the list (quote x).
    fn read_quote(&mut self) -> SchemeResult<Value> {
        self.advance(); // consume '\''
        let expr = self.read_expr()?;
        let inner = self.heap.alloc_pair(expr, Value::Nil)?;
        let outer = self
            .heap
            .alloc_pair(Value::Symbol(sym::QUOTE), Value::Pair(inner))?;
        Ok(Value::Pair(outer))
    }

    /// Read a string literal. Recognized escapes are \\ and \"; any other
    /// escaped character is kept verbatim.
    fn read_string(&mut self) -> SchemeResult<Value> {
        let open = self.pos;
        self.advance(); // consume '"'
        let mut text = String::new();

        loop {
            let ch = self
                .advance()
                .ok_or_else(|| SchemeError::UnterminatedString(self.position_at(open)))?;
            match ch {
                b'"' => break,
                b'\\' => {
                    let escaped = self
                        .advance()
                        .ok_or_else(|| SchemeError::UnterminatedString(self.position_at(open)))?;
                    text.push(escaped as char);
                }
                _ => text.push(ch as char),
            }
        }

        let id = self.heap.alloc_str(&text)?;
        Ok(Value::Str(id))
    }

    /// Read a word token: a boolean literal, a number, or an identifier.
    fn read_word(&mut self) -> SchemeResult<Value> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if Self::is_delimiter(ch) {
                break;
            }
            self.pos += 1;
        }

        let word = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| SchemeError::SyntaxError("invalid UTF-8 in source".into()))?;

        match word {
            "#t" => return Ok(Value::Bool(true)),
            "#f" => return Ok(Value::Bool(false)),
            "." => return Err(SchemeError::MalformedDot(self.position_at(start))),
            _ => {}
        }

        if Self::looks_numeric(word) {
            return match Self::parse_number(word) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(SchemeError::InvalidNumber(self.position_at(start))),
            };
        }

        let bytes = word.as_bytes();
        let valid_identifier = !bytes.is_empty()
            && !bytes[0].is_ascii_digit()
            && bytes.iter().all(|&ch| is_identifier_char(ch));
        if !valid_identifier {
            return Err(SchemeError::SyntaxError(format!("invalid token '{}'", word)));
        }

        let id = self.symbols.intern(word);
        Ok(Value::Symbol(id))
    }

    /// A word is treated as a numeric literal when it starts with a digit,
    /// or with a sign or dot immediately followed by a digit. `+` and `-`
    /// alone remain identifiers.
    fn looks_numeric(word: &str) -> bool {
        let bytes = word.as_bytes();
        match bytes[0] {
            b'0'..=b'9' => true,
            b'+' | b'-' => match bytes.get(1) {
                Some(next) => next.is_ascii_digit() || (*next == b'.' && bytes.len() > 2),
                None => false,
            },
            b'.' => bytes.get(1).is_some_and(|next| next.is_ascii_digit()),
            _ => false,
        }
    }

    /// Parse sign, digits, optional fraction, optional decimal exponent.
    /// No radix prefixes.
    fn parse_number(word: &str) -> Option<f64> {
        let mut rest = word.as_bytes();
        if let [b'+' | b'-', tail @ ..] = rest {
            rest = tail;
        }
        let mut seen_digit = false;
        let mut seen_dot = false;
        let mut seen_exponent = false;
        let mut index = 0;
        while index < rest.len() {
            match rest[index] {
                b'0'..=b'9' => seen_digit = true,
                b'.' if !seen_dot && !seen_exponent => seen_dot = true,
                b'e' | b'E' if seen_digit && !seen_exponent => {
                    seen_exponent = true;
                    seen_digit = false;
                    if matches!(rest.get(index + 1), Some(b'+' | b'-')) {
                        index += 1;
                    }
                }
                _ => return None,
            }
            index += 1;
        }
        if !seen_digit {
            return None;
        }
        word.parse().ok()
    }
}

/// Read a single datum from a string.
pub fn read_str(input: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> SchemeResult<Value> {
    let mut reader = Reader::new(input, heap, symbols);
    reader
        .read()?
        .ok_or_else(|| SchemeError::SyntaxError("empty input".into()))
}

/// Read all datums from a string.
pub fn read_all(
    input: &str,
    heap: &mut Heap,
    symbols: &mut SymbolTable,
) -> SchemeResult<Vec<Value>> {
    let mut reader = Reader::new(input, heap, symbols);
    reader.read_all()
}

/// Read one datum starting at byte offset `pos`. Returns the datum and the
/// offset just past it, or None if only whitespace and comments remain.
/// Drivers use this to evaluate a program one datum at a time, so source
/// that hasn't been read yet never sits unrooted across a collection.
pub fn read_one_at(
    input: &str,
    pos: usize,
    heap: &mut Heap,
    symbols: &mut SymbolTable,
) -> SchemeResult<Option<(Value, usize)>> {
    let mut reader = Reader {
        input: input.as_bytes(),
        pos,
        heap,
        symbols,
    };
    match reader.read()? {
        Some(val) => {
            let next = reader.position();
            Ok(Some((val, next)))
        }
        None => Ok(None),
    }
}
