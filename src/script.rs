use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub const GLOBAL_PREFIX: &str = "GLOBAL:";
pub const COMMENT_PREFIX: char = '#';
pub const CONTINUATION_MARKER: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Ready,
    Accumulating,
}

/// A complete command assembled from one or more physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Position of the physical line that completed this command, counting
    /// comments, blanks and `GLOBAL:` lines.
    pub index: usize,
    pub text: String,
    /// The `GLOBAL:` options in force when the line was completed.
    pub global_options: String,
}

#[derive(Debug, Clone)]
pub struct ScriptInterpreter {
    state: InterpreterState,
    buffer: String,
    global_options: String,
}

impl Default for ScriptInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptInterpreter {
    pub fn new() -> Self {
        Self {
            state: InterpreterState::Ready,
            buffer: String::new(),
            global_options: String::new(),
        }
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    pub fn global_options(&self) -> &str {
        &self.global_options
    }

    /// Consumes one physical line and returns a logical line when it
    /// completes one.
    pub fn feed(&mut self, index: usize, raw: &str) -> Option<LogicalLine> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            return None;
        }

        if let Some(options) = line.strip_prefix(GLOBAL_PREFIX) {
            options.trim().clone_into(&mut self.global_options);
            return None;
        }

        if let Some(fragment) = line.strip_suffix(CONTINUATION_MARKER) {
            self.buffer.push_str(fragment);
            self.buffer.push(' ');
            self.state = InterpreterState::Accumulating;
            return None;
        }

        self.buffer.push_str(line);
        let text = std::mem::take(&mut self.buffer).trim().to_owned();
        self.state = InterpreterState::Ready;
        Some(LogicalLine {
            index,
            text,
            global_options: self.global_options.clone(),
        })
    }

    /// Ends the script. Returns the unfinished fragment, if a continuation
    /// was never closed.
    pub fn finish(self) -> Option<String> {
        match self.state {
            InterpreterState::Ready => None,
            InterpreterState::Accumulating => Some(self.buffer.trim().to_owned()),
        }
    }
}

/// Runs the interpreter over a whole script.
pub fn logical_lines(script: &str) -> Vec<LogicalLine> {
    let mut interpreter = ScriptInterpreter::new();
    let lines = script
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| interpreter.feed(index, raw))
        .collect::<Vec<_>>();
    if let Some(dangling) = interpreter.finish() {
        tracing::warn!(
            fragment = %dangling,
            "script ends inside a line continuation; dropping the unfinished command"
        );
    }
    lines
}

pub fn load_script(path: &Path) -> Result<Vec<LogicalLine>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    Ok(logical_lines(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_blanks_and_globals_produce_no_lines() {
        let lines = logical_lines("# intro\n\n   \nGLOBAL: -cd cuda:1\n");
        assert!(lines.is_empty());
    }

    #[test]
    fn indices_count_every_physical_line() {
        let lines = logical_lines("5 foo\nGLOBAL: --bar\n3 baz\n");
        assert_eq!(
            lines,
            vec![
                LogicalLine {
                    index: 0,
                    text: String::from("5 foo"),
                    global_options: String::new(),
                },
                LogicalLine {
                    index: 2,
                    text: String::from("3 baz"),
                    global_options: String::from("--bar"),
                },
            ]
        );
    }

    #[test]
    fn continuation_joins_lines_and_takes_last_index() {
        let lines = logical_lines("# header\n4 -p \"a slow \\\n  pan\" \\\n  -lr 0.2\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].index, 3);
        assert_eq!(lines[0].text, "4 -p \"a slow  pan\"  -lr 0.2");
    }

    #[test]
    fn comments_inside_continuation_keep_accumulating() {
        let mut interpreter = ScriptInterpreter::new();
        assert_eq!(interpreter.feed(0, "6 -p cats \\"), None);
        assert_eq!(interpreter.state(), InterpreterState::Accumulating);
        assert_eq!(interpreter.feed(1, "# skipped"), None);
        assert_eq!(interpreter.state(), InterpreterState::Accumulating);

        let line = interpreter.feed(2, "-lr 0.1").expect("completed line");
        assert_eq!(line.text, "6 -p cats  -lr 0.1");
        assert_eq!(interpreter.state(), InterpreterState::Ready);
        assert_eq!(interpreter.finish(), None);
    }

    #[test]
    fn global_is_replaced_not_merged() {
        let script = "\
1 a
2 b
GLOBAL: --first
3 c
4 d
GLOBAL: --second
5 e
";
        let lines = logical_lines(script);
        let globals = lines
            .iter()
            .map(|line| (line.text.as_str(), line.global_options.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            globals,
            vec![
                ("1 a", ""),
                ("2 b", ""),
                ("3 c", "--first"),
                ("4 d", "--first"),
                ("5 e", "--second"),
            ]
        );
    }

    #[test]
    fn empty_global_clears_options() {
        let lines = logical_lines("GLOBAL: --bar\n1 a\nGLOBAL:\n2 b\n");
        assert_eq!(lines[0].global_options, "--bar");
        assert_eq!(lines[1].global_options, "");
    }

    #[test]
    fn dangling_continuation_is_dropped() {
        let lines = logical_lines("1 a\n2 b \\\n");
        assert_eq!(lines.len(), 1);

        let mut interpreter = ScriptInterpreter::new();
        interpreter.feed(0, "2 b \\");
        assert_eq!(interpreter.finish(), Some(String::from("2 b")));
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        let lines = logical_lines("2 cats\r\n# note\r\n3 dogs\r\n");
        assert_eq!(lines[0].text, "2 cats");
        assert_eq!(lines[1].text, "3 dogs");
        assert_eq!(lines[1].index, 2);
    }

    #[test]
    fn load_script_reads_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("dream.txt");
        fs::write(&path, "5 foo\n").expect("write script");
        let lines = load_script(&path).expect("load");
        assert_eq!(lines.len(), 1);
        assert!(load_script(&temp.path().join("missing.txt")).is_err());
    }
}
