//! Interactive operation menu for terminal use.

use std::io::{BufRead, Write};
use tracing::debug;

use crate::core::{OperationKind, ParameterPrompt, PipelineBuilder, PipelineSpec};
use crate::utils::{PipelineError, PipelineResult};

const DEFAULT_ROTATE_ANGLE: i32 = 90;
const DEFAULT_FLIP_CODE: i32 = 1;

/// Line-oriented prompt over any reader/writer pair.
pub struct MenuPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> MenuPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn say(&mut self, text: &str) {
        // a closed terminal is not worth failing the selection over
        let _ = writeln!(self.output, "{}", text);
        let _ = self.output.flush();
    }

    /// Next trimmed line, or `None` at end of input.
    fn read_line(&mut self) -> PipelineResult<Option<String>> {
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        Ok((read > 0).then(|| line.trim().to_string()))
    }

    fn read_number(&mut self, question: &str, fallback: i32) -> i32 {
        loop {
            self.say(question);
            match self.read_line() {
                Ok(Some(line)) => match line.parse() {
                    Ok(n) => return n,
                    Err(_) => self.say(&format!("'{}' is not a whole number", line)),
                },
                _ => return fallback,
            }
        }
    }

    fn print_menu(&mut self) {
        self.say("Select operations in order, one per line. Empty line or 'done' to finish.");
        for kind in OperationKind::ALL {
            self.say(&format!("  {:>3}  {}", kind.short_token(), kind.name()));
        }
    }

    /// Reads selections until the user finishes, re-prompting on rejects.
    pub fn select_pipeline(&mut self) -> PipelineResult<PipelineSpec> {
        self.print_menu();
        let mut builder = PipelineBuilder::new();

        while builder.len() < OperationKind::ALL.len() {
            let Some(token) = self.read_line()? else { break };
            if token.is_empty() || token.eq_ignore_ascii_case("done") {
                break;
            }
            match builder.select(&token, &mut *self) {
                Ok(op) => debug!("Selected {}", op),
                Err(e) => self.rejected(&token, &e),
            }
        }

        Ok(builder.finish())
    }
}

impl<R: BufRead, W: Write> ParameterPrompt for MenuPrompt<R, W> {
    fn rotate_angle(&mut self) -> i32 {
        self.read_number("Rotation angle in degrees (anticlockwise):", DEFAULT_ROTATE_ANGLE)
    }

    fn flip_code(&mut self) -> i32 {
        self.read_number("Flip code (0 vertical, 1 horizontal, -1 both):", DEFAULT_FLIP_CODE)
    }

    fn rejected(&mut self, _token: &str, reason: &PipelineError) {
        self.say(&format!("{}; choose another", reason));
    }
}
