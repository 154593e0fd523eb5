use std::fmt;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};

/// A program plus its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The value following `flag`, if the flag is present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&display_word(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", display_word(arg))?;
        }
        Ok(())
    }
}

fn display_word(word: &str) -> String {
    if !word.is_empty()
        && !word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\'))
    {
        return word.to_owned();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

pub trait CommandRunner {
    /// Runs the invocation to completion in `cwd` and returns its exit code.
    fn run(&mut self, invocation: &Invocation, cwd: &Path) -> Result<i32>;
}

/// Spawns real processes and streams their output line by line as it arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation, cwd: &Path) -> Result<i32> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(
                    "executable not found: '{}' (is it installed and on PATH?)",
                    invocation.program
                )
            } else {
                anyhow!("failed to spawn '{}': {error}", invocation)
            }
        })?;

        let stdout_handle = child
            .stdout
            .take()
            .map(|pipe| thread::spawn(move || forward_lines(pipe, io::stdout())));
        let stderr_handle = child
            .stderr
            .take()
            .map(|pipe| thread::spawn(move || forward_lines(pipe, io::stderr())));

        let status = child
            .wait()
            .with_context(|| format!("failed while waiting for '{}'", invocation.program))?;

        for (stream, handle) in [("stdout", stdout_handle), ("stderr", stderr_handle)] {
            let Some(handle) = handle else {
                continue;
            };
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!(
                    program = %invocation.program,
                    stream,
                    %error,
                    "failed to forward child output"
                ),
                Err(_) => tracing::warn!(
                    program = %invocation.program,
                    stream,
                    "child output forwarder panicked"
                ),
            }
        }

        Ok(status.code().unwrap_or(1))
    }
}

/// Copies `pipe` to `sink` one line at a time, bytes untouched. Once the sink
/// fails the pipe is still drained so the child never blocks on a full pipe.
fn forward_lines<R: Read, W: Write>(pipe: R, mut sink: W) -> io::Result<()> {
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    let mut sink_error = None;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if sink_error.is_none() {
            if let Err(error) = sink.write_all(&line).and_then(|()| sink.flush()) {
                sink_error = Some(error);
            }
        }
    }
    sink_error.map_or(Ok(()), Err)
}
