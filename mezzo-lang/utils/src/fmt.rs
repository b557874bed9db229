/// Layout state threaded through the printers: the current indentation and
/// the width of one step.
#[derive(Clone, Copy)]
pub struct Args {
    indent_unit: usize,
    indent: usize,
}

impl Args {
    pub fn indent(&self) -> Self {
        Self { indent: self.indent + self.indent_unit, ..self.clone() }
    }
    pub fn br_indent(&self) -> String {
        format!("\n{}", " ".repeat(self.indent))
    }
}

/// Indentation-aware printing; the surface printers emit re-parseable text
/// through this.
pub trait FmtArgs {
    fn fmt_args(&self, fargs: Args) -> String;
    fn fmt(&self) -> String {
        self.fmt_args(Args { indent_unit: 2, indent: 0 })
    }
}
