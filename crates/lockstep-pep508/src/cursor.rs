use std::str::Chars;

use crate::Pep508Error;

/// A cursor over the text of a requirement or marker, tracking the byte offset for error
/// reporting.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    input: &'a str,
    chars: Chars<'a>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars(),
            pos: 0,
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    /// The unconsumed rest of the input.
    pub(crate) fn rest(&self) -> &'a str {
        self.chars.as_str()
    }

    pub(crate) fn next(&mut self) -> Option<char> {
        let char = self.chars.next()?;
        self.pos += char.len_utf8();
        Some(char)
    }

    pub(crate) fn eat_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    /// Consume `token` if it comes next.
    pub(crate) fn eat_char(&mut self, token: char) -> bool {
        if self.peek() == Some(token) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consume `keyword` if the input continues with it as a whole word.
    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix(keyword) else {
            return false;
        };
        if after
            .chars()
            .next()
            .is_some_and(|char| char.is_alphanumeric() || char == '_')
        {
            return false;
        }
        for _ in 0..keyword.chars().count() {
            self.next();
        }
        true
    }

    /// Consume characters while `predicate` holds, returning the consumed text.
    pub(crate) fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&mut predicate) {
            self.next();
        }
        &self.input[start..self.pos]
    }

    /// Consume `token`, or fail with an error pointing at the current character.
    pub(crate) fn expect(&mut self, token: char) -> Result<(), Pep508Error> {
        match self.peek() {
            Some(char) if char == token => {
                self.next();
                Ok(())
            }
            Some(other) => Err(self.error(
                format!("Expected `{token}`, found `{other}`"),
                self.pos,
                other.len_utf8(),
            )),
            None => Err(self.error(
                format!("Expected `{token}`, found end of input"),
                self.pos,
                1,
            )),
        }
    }

    pub(crate) fn error(&self, message: String, start: usize, len: usize) -> Pep508Error {
        Pep508Error::new(message, self.input, start, len)
    }
}
