//! Line-addressed source text with a single step of pushback.

use crate::error::Position;

/// Holds the whole input, one `\n`-terminated line per entry.
///
/// Every line keeps (or is given) a trailing `\n`, so the last character the
/// lexer sees before running out is always whitespace.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    lines: Vec<Box<[u8]>>,
    cursor: Position,
}

impl SourceBuffer {
    pub fn new(source: impl AsRef<[u8]>) -> Self {
        let lines = source
            .as_ref()
            .split_inclusive(|&b| b == b'\n')
            .map(|line| {
                let mut line = line.to_vec();
                if line.last() != Some(&b'\n') {
                    line.push(b'\n');
                }
                line.into_boxed_slice()
            })
            .collect();

        Self {
            lines,
            cursor: Position::default(),
        }
    }

    /// Position of the next character to be read.
    pub fn position(&self) -> Position {
        self.cursor
    }

    /// Position of the character returned by the last [`Self::next_char`].
    pub fn previous_position(&self) -> Position {
        let Position { line, column } = self.cursor;
        match (line, column) {
            (0, 0) => panic!("source buffer has no character before the beginning"),
            (line, 0) => Position::new(line - 1, self.lines[line - 1].len() - 1),
            (line, column) => Position::new(line, column - 1),
        }
    }

    pub fn next_char(&mut self) -> Option<u8> {
        let line = self.lines.get(self.cursor.line)?;
        let ch = line[self.cursor.column];
        self.cursor = if self.cursor.column + 1 == line.len() {
            Position::new(self.cursor.line + 1, 0)
        } else {
            Position::new(self.cursor.line, self.cursor.column + 1)
        };
        Some(ch)
    }

    /// Steps back over the last character read.
    ///
    /// # Panics
    /// When nothing has been read yet.
    pub fn unread(&mut self) {
        self.cursor = self.previous_position();
    }
}

#[cfg(test)]
mod tests {
    use super::SourceBuffer;
    use crate::error::Position;
    use assert2::check;

    #[test]
    fn appends_missing_newline() {
        let mut src = SourceBuffer::new("ab");
        check!(src.next_char() == Some(b'a'));
        check!(src.next_char() == Some(b'b'));
        check!(src.next_char() == Some(b'\n'));
        check!(src.next_char() == None);
        check!(src.position() == Position::new(1, 0));
    }

    #[test]
    fn empty_input_has_no_lines() {
        let mut src = SourceBuffer::new("");
        check!(src.next_char() == None);
        check!(src.position() == Position::new(0, 0));
    }

    #[test]
    fn positions_cross_lines() {
        let mut src = SourceBuffer::new("a\nbc\n");
        src.next_char();
        src.next_char();
        check!(src.position() == Position::new(1, 0));
        check!(src.previous_position() == Position::new(0, 1));
        check!(src.next_char() == Some(b'b'));
        check!(src.previous_position() == Position::new(1, 0));
    }

    #[test]
    fn unread_rereads_the_same_character() {
        let mut src = SourceBuffer::new("x\ny");
        src.next_char();
        src.next_char();
        src.unread();
        check!(src.next_char() == Some(b'\n'));
        check!(src.next_char() == Some(b'y'));
    }

    #[test]
    #[should_panic(expected = "before the beginning")]
    fn unread_at_start_is_fatal() {
        SourceBuffer::new("abc").unread();
    }
}
