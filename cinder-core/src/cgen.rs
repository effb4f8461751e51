//! C output accumulation.
//!
//! `CGen` holds an append-only sequence of committed lines plus one mutable
//! current-line accumulator. The parser emits as it walks the grammar, so
//! three escape hatches cover the cases where a decision cannot be made at
//! the point of emission:
//!
//! * placeholders record a byte offset in the not-yet-committed accumulator
//!   so an operator emitted speculatively can be rewritten into call form
//!   once the operand's type is known;
//! * temporary redirection captures the text of a sub-expression so it can
//!   be inspected (and its statements hoisted) before splicing it into the
//!   real output;
//! * `insert_before` commits a full line above the pending accumulator, for
//!   declarations that are only discovered mid-statement.

#[derive(Debug, Default)]
pub struct CGen {
    lines: Vec<String>,
    cur: String,
    /// Stack of temporary capture buffers; captures nest when an expression
    /// that needs capturing contains another one.
    tmps: Vec<String>,
    /// When set, `genln` prefixes flushed lines with `#line` directives so
    /// the C compiler's diagnostics point back at Cinder source.
    pub line_directives: bool,
    pub cur_line: u32,
    pub cur_file: String,
}

impl CGen {
    pub fn new() -> CGen {
        CGen::default()
    }

    /// Appends text to the current line (or the innermost temporary buffer
    /// while redirected).
    pub fn gen(&mut self, text: &str) {
        if let Some(tmp) = self.tmps.last_mut() {
            tmp.push_str(text);
        } else {
            self.cur.push_str(text);
        }
    }

    /// Appends text, then commits the current line.
    pub fn genln(&mut self, text: &str) {
        if let Some(tmp) = self.tmps.last_mut() {
            tmp.push_str(text);
            tmp.push('\n');
            return;
        }
        self.cur.push_str(text);
        if self.line_directives && !self.cur_file.is_empty() {
            self.lines
                .push(format!("#line {} \"{}\"", self.cur_line, self.cur_file));
        }
        self.lines.push(std::mem::take(&mut self.cur));
    }

    /// Discards the current accumulator and replaces it with `text`.
    pub fn resetln(&mut self, text: &str) {
        if let Some(tmp) = self.tmps.last_mut() {
            tmp.clear();
            tmp.push_str(text);
        } else {
            self.cur.clear();
            self.cur.push_str(text);
        }
    }

    /// Redirects subsequent `gen` calls into a fresh side buffer.
    pub fn start_tmp(&mut self) {
        self.tmps.push(String::new());
    }

    /// Ends the innermost redirection and returns the captured text.
    pub fn end_tmp(&mut self) -> String {
        self.tmps.pop().unwrap_or_default()
    }

    pub fn in_tmp(&self) -> bool {
        !self.tmps.is_empty()
    }

    /// Records the current byte offset in the pending accumulator. Text can
    /// later be spliced at exactly this offset with [`CGen::set_placeholder`].
    pub fn add_placeholder(&mut self) -> usize {
        match self.tmps.last() {
            Some(tmp) => tmp.len(),
            None => self.cur.len(),
        }
    }

    /// Splices `text` at a previously recorded offset in the pending
    /// accumulator, shifting what was emitted after it.
    pub fn set_placeholder(&mut self, offset: usize, text: &str) {
        match self.tmps.last_mut() {
            Some(tmp) => tmp.insert_str(offset, text),
            None => self.cur.insert_str(offset, text),
        }
    }

    /// Commits `text` as a full line above the pending accumulator, hoisting
    /// a declaration above the statement that needed it.
    pub fn insert_before(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    /// Current accumulator contents, for callers that need to inspect what
    /// has been emitted so far on this line.
    pub fn cur_text(&self) -> &str {
        match self.tmps.last() {
            Some(tmp) => tmp,
            None => &self.cur,
        }
    }

    /// All committed output. The pending accumulator, if non-empty, is
    /// flushed first.
    pub fn output(mut self) -> String {
        if !self.cur.is_empty() {
            let cur = std::mem::take(&mut self.cur);
            self.lines.push(cur);
        }
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.cur.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_round_trip() {
        let mut cgen = CGen::new();
        let p = cgen.add_placeholder();
        cgen.gen("X");
        cgen.set_placeholder(p, "PRE");
        cgen.genln("");
        assert_eq!(cgen.output(), "PREX\n");
    }

    #[test]
    fn placeholder_wraps_already_emitted_operand() {
        // `a == b` on strings: the left operand is already emitted when the
        // operator form is decided, so the call head is spliced before it.
        let mut cgen = CGen::new();
        cgen.gen("bool eq = ");
        let p = cgen.add_placeholder();
        cgen.gen("a");
        cgen.set_placeholder(p, "string_eq(");
        cgen.gen(", b)");
        cgen.genln(";");
        assert_eq!(cgen.output(), "bool eq = string_eq(a, b);\n");
    }

    #[test]
    fn tmp_redirection_captures_text() {
        let mut cgen = CGen::new();
        cgen.gen("int x = ");
        cgen.start_tmp();
        cgen.gen("f(1, 2)");
        let captured = cgen.end_tmp();
        assert_eq!(captured, "f(1, 2)");
        cgen.gen(&captured);
        cgen.genln(";");
        assert_eq!(cgen.output(), "int x = f(1, 2);\n");
    }

    #[test]
    fn tmp_captures_nest() {
        let mut cgen = CGen::new();
        cgen.start_tmp();
        cgen.gen("outer ");
        cgen.start_tmp();
        cgen.gen("inner");
        let inner = cgen.end_tmp();
        cgen.gen(&inner);
        assert_eq!(cgen.end_tmp(), "outer inner");
        assert!(!cgen.in_tmp());
    }

    #[test]
    fn placeholders_inside_tmp_are_independent() {
        let mut cgen = CGen::new();
        cgen.gen("left");
        cgen.start_tmp();
        let p = cgen.add_placeholder();
        cgen.gen("inner");
        cgen.set_placeholder(p, "(");
        cgen.gen(")");
        assert_eq!(cgen.end_tmp(), "(inner)");
        assert_eq!(cgen.cur_text(), "left");
    }

    #[test]
    fn resetln_discards_current_line() {
        let mut cgen = CGen::new();
        cgen.gen("wrong start");
        cgen.resetln("int y");
        cgen.genln(" = 2;");
        assert_eq!(cgen.output(), "int y = 2;\n");
    }

    #[test]
    fn insert_before_hoists_above_pending_line() {
        let mut cgen = CGen::new();
        cgen.genln("int a = 1;");
        cgen.gen("int b = tmp1;");
        cgen.insert_before("int tmp1 = f();");
        cgen.genln("");
        assert_eq!(cgen.output(), "int a = 1;\nint tmp1 = f();\nint b = tmp1;\n");
    }

    #[test]
    fn line_directives_point_back_at_source() {
        let mut cgen = CGen::new();
        cgen.line_directives = true;
        cgen.cur_file = "main.cdr".into();
        cgen.cur_line = 3;
        cgen.genln("int x = 1;");
        assert_eq!(cgen.output(), "#line 3 \"main.cdr\"\nint x = 1;\n");
    }
}
