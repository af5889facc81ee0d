/// Indented line writer for generated GLSL.
#[derive(Debug, Default)]
pub struct GlslWriter {
    out: String,
    indent: usize,
}

impl GlslWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&mut self) {
        self.indent += 4;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(4);
    }

    pub fn line(&mut self, s: &str) {
        if s.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.out.push(' ');
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Appends already formatted text, re-indented to the current level.
    pub fn block(&mut self, text: &str) {
        for l in text.lines() {
            self.line(l);
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}
