use console::{Style, Term};
use scubes_core::error::{Result, ScubesError};
use scubes_core::mask::{MaskSession, RefinePrompt};

/// Interactive refinement on the terminal.
pub struct ConsolePrompt {
    term: Term,
    /// Answers can only be read from a terminal; `read_line` returns an
    /// empty line otherwise.
    interactive: bool,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        let term = Term::stdout();
        let interactive = term.is_term();
        Self { term, interactive }
    }

    fn ask(&self, question: &str) -> Result<String> {
        if !self.interactive {
            return Err(ScubesError::InvalidUserInput(
                "mask refinement needs a terminal; rerun with --accept-mask".into(),
            ));
        }
        self.term.write_str(question)?;
        Ok(self.term.read_line()?)
    }
}

impl RefinePrompt for ConsolePrompt {
    fn show(&mut self, session: &MaskSession) -> Result<()> {
        let title = Style::new().cyan().bold();
        let label = Style::new().dim();
        let kept = Style::new().dim().yellow();

        self.term.write_line("")?;
        self.term.write_line(&format!(
            "  {}",
            title.apply_to(format!("Mask of {}", session.object()))
        ))?;
        if let Some(path) = session.refresh_preview()? {
            self.term.write_line(&format!("  {:<10}{}", label.apply_to("Preview"), path.display()))?;
        }
        let keep = session.keep_list();
        for c in session.circles() {
            let line = format!("  {:>4}  x={:>8.2} y={:>8.2} r={:>6.2}", c.index, c.x, c.y, c.radius);
            if keep.contains(&c.index) {
                self.term.write_line(&format!("{} {}", kept.apply_to(line), kept.apply_to("(kept)")))?;
            } else {
                self.term.write_line(&line)?;
            }
        }
        self.term.write_line(&format!(
            "  {:<10}{}",
            label.apply_to("Masked"),
            session.masked_pixel_count()
        ))?;
        if !keep.is_empty() {
            self.term.write_line(&format!("  {:<10}{:?}", label.apply_to("Keeping"), keep))?;
        }
        Ok(())
    }

    fn ask_action(&mut self) -> Result<String> {
        self.ask("do you want to (UN)mask stars? [y|r|n|q]: ")
    }

    fn ask_keep_list(&mut self) -> Result<String> {
        self.ask("type (space separated) the star numbers you WANT TO KEEP: ")
    }
}

/// Accepts every proposal unchanged (`--accept-mask`).
pub struct AcceptPrompt;

impl RefinePrompt for AcceptPrompt {
    fn ask_action(&mut self) -> Result<String> {
        Ok("n".into())
    }

    fn ask_keep_list(&mut self) -> Result<String> {
        Ok(String::new())
    }
}

/// Prompt selected by the command-line flags.
pub fn make_prompt(accept: bool) -> Box<dyn RefinePrompt> {
    if accept {
        Box::new(AcceptPrompt)
    } else {
        Box::new(ConsolePrompt::new())
    }
}
