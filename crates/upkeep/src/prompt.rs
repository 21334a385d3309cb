//! Interactive period prompt

use std::io::{BufRead, Write};

use upkeep_core::{CoreError, Period, PeriodSource};

/// Asks for the period on a line-oriented terminal
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> PeriodSource for LinePrompt<R, W> {
    fn period(&mut self) -> Result<Period, CoreError> {
        let choices: Vec<_> = Period::ALL.iter().map(|p| p.as_str()).collect();
        write!(
            self.output,
            "How often should updates run? [{}]: ",
            choices.join("/")
        )
        .and_then(|()| self.output.flush())
        .map_err(|e| CoreError::Prompt(e.to_string()))?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| CoreError::Prompt(e.to_string()))?;
        if read == 0 {
            return Err(CoreError::Prompt("no input".to_string()));
        }

        line.parse()
    }
}
