//! Byte-level line editor.
//!
//! Turns a stream of raw client bytes into committed lines using
//! server-side echo: printable bytes are stored and echoed, backspace
//! erases, carriage return commits. The editor does no I/O; it reports
//! what the caller should write back through [`Edit`].

use bytes::BytesMut;

/// Capacity of the in-progress line buffer.
pub const INPUT_CAPACITY: usize = 80;

/// Carriage return; the only commit signal.
pub const CR: u8 = 0x0D;

/// Backspace.
pub const BACKSPACE: u8 = 0x08;

const LF: u8 = 0x0A;
const NUL: u8 = 0x00;

/// Outcome of feeding one byte to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Byte was stored and should be echoed back.
    Echo(u8),
    /// Last stored byte was erased; echo a backspace.
    Erase,
    /// A complete, trimmed, non-empty line.
    Commit(String),
    /// Nothing to store and nothing to echo.
    ///
    /// Returned for backspace on an empty line, input past capacity, an
    /// empty or whitespace-only commit, and an LF or NUL that directly
    /// follows CR.
    Ignore,
    /// Control byte that ends the session.
    Disconnect,
}

/// Per-session line editing state.
pub struct LineEditor {
    /// Raw bytes of the line currently being typed.
    buffer: [u8; INPUT_CAPACITY],
    /// Number of valid bytes in `buffer`; never exceeds `INPUT_CAPACITY - 1`.
    cursor: usize,
    /// Committed line content, split off on dispatch.
    line: BytesMut,
    /// Previous byte was CR, so a telnet end-of-line LF/NUL is expected.
    after_cr: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            buffer: [0u8; INPUT_CAPACITY],
            cursor: 0,
            line: BytesMut::with_capacity(INPUT_CAPACITY),
            after_cr: false,
        }
    }

    /// Number of bytes in the in-progress line.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes typed so far on the current line.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[..self.cursor]
    }

    /// Classify one input byte and update the editing state.
    ///
    /// CR commits the line. An LF or NUL immediately after CR completes
    /// the telnet end-of-line pair and yields [`Edit::Ignore`] instead of
    /// [`Edit::Disconnect`]; anywhere else both are control bytes and end
    /// the session.
    pub fn feed(&mut self, byte: u8) -> Edit {
        let after_cr = std::mem::replace(&mut self.after_cr, false);

        match byte {
            CR => {
                self.after_cr = true;
                self.commit()
            }
            BACKSPACE => {
                if self.cursor == 0 {
                    return Edit::Ignore;
                }
                self.cursor -= 1;
                self.buffer[self.cursor] = 0;
                Edit::Erase
            }
            // Telnet clients encode Enter as CR LF or CR NUL
            LF | NUL if after_cr => Edit::Ignore,
            _ if (byte as char).is_control() => Edit::Disconnect,
            _ if self.cursor + 1 < INPUT_CAPACITY => {
                self.buffer[self.cursor] = byte;
                self.cursor += 1;
                Edit::Echo(byte)
            }
            // Buffer full: drop until CR or backspace frees room
            _ => Edit::Ignore,
        }
    }

    /// Clear all line state, zeroing the bytes that were in use.
    pub fn reset(&mut self) {
        self.buffer[..self.cursor].fill(0);
        self.cursor = 0;
        self.line.clear();
        self.after_cr = false;
    }

    fn commit(&mut self) -> Edit {
        if self.cursor == 0 {
            return Edit::Ignore;
        }

        self.line.extend_from_slice(self.buffer[..self.cursor].trim_ascii());
        self.buffer[..self.cursor].fill(0);
        self.cursor = 0;

        if self.line.is_empty() {
            return Edit::Ignore;
        }

        // Bytes map one-to-one onto Latin-1, matching the control classification above
        let line = self.line.split();
        Edit::Commit(line.iter().map(|&b| b as char).collect())
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(editor: &mut LineEditor, input: &[u8]) -> Vec<Edit> {
        input.iter().map(|&b| editor.feed(b)).collect()
    }

    fn commits(edits: &[Edit]) -> Vec<String> {
        edits
            .iter()
            .filter_map(|e| match e {
                Edit::Commit(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_commit_simple_line() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"hi\r");
        assert_eq!(
            edits,
            vec![
                Edit::Echo(b'h'),
                Edit::Echo(b'i'),
                Edit::Commit("hi".to_string())
            ]
        );
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_no_commit_without_cr() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"look around");
        assert!(commits(&edits).is_empty());
        assert_eq!(editor.pending(), b"look around");
    }

    #[test]
    fn test_commit_is_trimmed() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"  say hello  \r");
        assert_eq!(commits(&edits), vec!["say hello"]);
    }

    #[test]
    fn test_whitespace_only_line_is_discarded() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"   \r");
        assert_eq!(edits.last(), Some(&Edit::Ignore));
        assert!(commits(&edits).is_empty());
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_empty_cr_is_ignored() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(CR), Edit::Ignore);
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_backspace_at_start_is_noop() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(BACKSPACE), Edit::Ignore);
        assert_eq!(editor.cursor(), 0);
        assert_eq!(editor.pending(), b"");
    }

    #[test]
    fn test_backspace_then_cr_does_not_commit() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(b'h'), Edit::Echo(b'h'));
        assert_eq!(editor.feed(BACKSPACE), Edit::Erase);
        assert_eq!(editor.cursor(), 0);
        assert_eq!(editor.feed(CR), Edit::Ignore);
    }

    #[test]
    fn test_backspace_edits_line() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"helo\x08lo\r");
        assert_eq!(commits(&edits), vec!["hello"]);
    }

    #[test]
    fn test_full_buffer_drops_input() {
        let mut editor = LineEditor::new();
        for _ in 0..INPUT_CAPACITY - 1 {
            assert!(matches!(editor.feed(b'a'), Edit::Echo(b'a')));
        }
        assert_eq!(editor.cursor(), INPUT_CAPACITY - 1);

        for _ in 0..10 {
            assert_eq!(editor.feed(b'b'), Edit::Ignore);
        }
        assert_eq!(editor.cursor(), INPUT_CAPACITY - 1);

        // Backspace frees room for one more byte
        assert_eq!(editor.feed(BACKSPACE), Edit::Erase);
        assert_eq!(editor.feed(b'c'), Edit::Echo(b'c'));

        let edits = feed_all(&mut editor, b"\r");
        let expected = format!("{}c", "a".repeat(INPUT_CAPACITY - 2));
        assert_eq!(commits(&edits), vec![expected]);
    }

    #[test]
    fn test_control_byte_disconnects() {
        let mut editor = LineEditor::new();
        editor.feed(b'x');
        assert_eq!(editor.feed(0x03), Edit::Disconnect);
        assert_eq!(editor.feed(0x1B), Edit::Disconnect);
        assert_eq!(editor.feed(0x7F), Edit::Disconnect);
    }

    #[test]
    fn test_telnet_end_of_line_pairs() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"north\r\nsouth\r\0");
        assert_eq!(commits(&edits), vec!["north", "south"]);
        assert!(!edits.contains(&Edit::Disconnect));

        assert_eq!(editor.feed(CR), Edit::Ignore);
        assert_eq!(editor.feed(LF), Edit::Ignore);

        // A stray LF or NUL not following CR is an ordinary control byte
        assert_eq!(editor.feed(b'x'), Edit::Echo(b'x'));
        assert_eq!(editor.feed(LF), Edit::Disconnect);
        assert_eq!(editor.feed(NUL), Edit::Disconnect);
    }

    #[test]
    fn test_line_spanning_feeds() {
        let mut editor = LineEditor::new();
        let first = feed_all(&mut editor, b"get ");
        let second = feed_all(&mut editor, b"sword\r");
        assert!(commits(&first).is_empty());
        assert_eq!(commits(&second), vec!["get sword"]);
    }

    #[test]
    fn test_printable_lines_round_trip() {
        let mut editor = LineEditor::new();
        for len in 1..INPUT_CAPACITY - 1 {
            let input: Vec<u8> = (0..len).map(|i| b'!' + (i % 94) as u8).collect();
            let mut bytes = input.clone();
            bytes.push(CR);

            let committed = commits(&feed_all(&mut editor, &bytes));
            let expected = String::from_utf8(input).unwrap();
            assert_eq!(committed, vec![expected.trim().to_string()]);
        }
    }

    #[test]
    fn test_reset_zeroes_buffer() {
        let mut editor = LineEditor::new();
        feed_all(&mut editor, b"abc");
        editor.reset();
        assert_eq!(editor.cursor(), 0);
        assert!(editor.buffer.iter().all(|&b| b == 0));
    }
}
