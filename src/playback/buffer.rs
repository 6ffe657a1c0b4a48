use anyhow::{anyhow, Result};

use super::InputInjector;

/// In-memory injector: applies keystrokes to a text buffer.
///
/// Backs the `dry-run` backend and the simulator tests. Characters listed
/// with [`BufferInjector::failing_on`] are rejected to exercise per-character
/// error recovery.
#[derive(Debug, Default, Clone)]
pub struct BufferInjector {
    buf: Vec<char>,
    fail_on: Vec<char>,
    keystrokes: usize,
}

impl BufferInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(chars: &[char]) -> Self {
        Self {
            fail_on: chars.to_vec(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.buf.iter().collect()
    }

    /// Successful `type_char` and `backspace` calls.
    pub fn keystrokes(&self) -> usize {
        self.keystrokes
    }
}

impl InputInjector for BufferInjector {
    fn type_char(&mut self, c: char) -> Result<()> {
        if self.fail_on.contains(&c) {
            return Err(anyhow!("injection rejected for {c:?}"));
        }
        self.buf.push(c);
        self.keystrokes += 1;
        Ok(())
    }

    fn backspace(&mut self) -> Result<()> {
        self.buf.pop();
        self.keystrokes += 1;
        Ok(())
    }
}
