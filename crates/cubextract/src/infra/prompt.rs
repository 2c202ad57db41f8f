//! Interactive prompting.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};

/// Source of answers for values that were not given up front.
pub trait Prompter {
    /// Ask a free-form question and return the trimmed answer.
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Present numbered options (starting at 1) and return the raw answer.
    fn choose(&mut self, question: &str, options: &[String]) -> Result<String>;
}

/// Line editor prompter used when stdin is a terminal.
pub struct EditorPrompter {
    editor: Reedline,
}

impl EditorPrompter {
    pub fn new() -> Self {
        Self {
            editor: Reedline::create(),
        }
    }
}

impl Default for EditorPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for EditorPrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(question.to_owned()),
            DefaultPromptSegment::Empty,
        );
        match self.editor.read_line(&prompt).context("failed to read input")? {
            Signal::Success(line) => Ok(line.trim().to_owned()),
            _ => bail!("input cancelled"),
        }
    }

    fn choose(&mut self, question: &str, options: &[String]) -> Result<String> {
        println!("{}", numbered(options));
        self.ask(question)
    }
}

/// Plain line-based prompter over any reader/writer pair.
pub struct LinePrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}: ")?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read input")?;
        if read == 0 {
            bail!("input closed while waiting for: {question}");
        }
        Ok(line.trim().to_owned())
    }

    fn choose(&mut self, question: &str, options: &[String]) -> Result<String> {
        writeln!(self.output, "{}", numbered(options))?;
        self.ask(question)
    }
}

/// Prompter for the current process: a line editor on a terminal, plain lines otherwise.
pub fn stdio_prompter() -> Box<dyn Prompter> {
    if io::stdin().is_terminal() {
        Box::new(EditorPrompter::new())
    } else {
        Box::new(LinePrompter::new(io::stdin().lock(), io::stdout()))
    }
}

fn numbered(options: &[String]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(index, option)| format!("{}. {option}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
