//! The recursive-descent parser.
//!
//! Parsing, checking and emission happen in a single walk over the token
//! array: each grammar production checks types as it goes and writes C text
//! into the shared [`CGen`]. The same parser runs twice per file. The
//! declaration pass registers every type, function and constant in the
//! [`Table`] while suppressing type errors (forward references are expected
//! to be unresolved) and discarding its output. The main pass re-parses with
//! the table fully populated, reports errors through the [`Sink`], and
//! produces the real output.
//!
//! The grammar walk is split across three submodules: `decl` for top-level
//! declarations, `stmt` for statements and blocks, `expr` for the
//! precedence-climbing expression layers.

mod decl;
mod expr;
mod stmt;

use crate::cgen::CGen;
use crate::diag::{Diagnostic, Severity, Sink};
use crate::error::CoreError;
use crate::scanner::{TokKind, Token};
use crate::table::{Pass, Table, Var};
use crate::typeexpr::{Primitive, TypeExpr};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: &'a str,
    source: &'a str,
    pub mod_name: String,
    table: &'a mut Table,
    cgen: &'a mut CGen,
    sink: &'a mut dyn Sink,
    pass: Pass,

    // Current-function context.
    cur_fn_ret: TypeExpr,
    cur_fn_opt: bool,
    locals: Vec<Var>,
    scope_level: usize,
    defers: Vec<String>,
    loop_depth: usize,

    // Expression context. `no_block_init` is set while parsing an `if`,
    // `for` or `match` condition, where `{` opens the block rather than a
    // struct literal.
    no_block_init: bool,
    cur_generic_type: Option<TypeExpr>,
    tmp_count: u32,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Token],
        file: &'a str,
        source: &'a str,
        table: &'a mut Table,
        cgen: &'a mut CGen,
        sink: &'a mut dyn Sink,
        pass: Pass,
    ) -> Parser<'a> {
        Parser {
            tokens,
            pos: 0,
            file,
            source,
            mod_name: "main".to_string(),
            table,
            cgen,
            sink,
            pass,
            cur_fn_ret: TypeExpr::void(),
            cur_fn_opt: false,
            locals: Vec::new(),
            scope_level: 0,
            defers: Vec::new(),
            loop_depth: 0,
            no_block_init: false,
            cur_generic_type: None,
            tmp_count: 0,
        }
    }

    /// Parses the whole file: module clause, imports, then declarations
    /// until end of input.
    pub fn parse(&mut self) -> Result<(), CoreError> {
        if self.kind() == TokKind::KeyModule {
            self.next();
            let mut name = self.check_name()?;
            while self.kind() == TokKind::Dot {
                self.next();
                name.push_str("__");
                name.push_str(&self.check_name()?);
            }
            self.mod_name = name;
        }
        while self.kind() == TokKind::KeyImport {
            self.next();
            let mut module = self.check_name()?;
            let mut alias = module.clone();
            while self.kind() == TokKind::Dot {
                self.next();
                let seg = self.check_name()?;
                module = format!("{module}__{seg}");
                alias = seg;
            }
            if self.kind() == TokKind::KeyAs {
                self.next();
                alias = self.check_name()?;
            }
            self.table
                .file_imports_mut(self.file)
                .register(&alias, &module);
        }
        loop {
            match self.kind() {
                TokKind::Eof => return Ok(()),
                TokKind::Hash => {
                    let lit = self.tok().lit.clone();
                    self.cgen.genln(&lit);
                    self.next();
                }
                TokKind::KeyPub => {
                    self.next();
                    self.top_decl(true)?;
                }
                _ => self.top_decl(false)?,
            }
        }
    }

    fn top_decl(&mut self, is_pub: bool) -> Result<(), CoreError> {
        match self.kind() {
            TokKind::KeyFn => self.fn_decl(is_pub),
            TokKind::KeyStruct => self.struct_decl(is_pub),
            TokKind::KeyEnum => self.enum_decl(is_pub),
            TokKind::KeyInterface => self.interface_decl(is_pub),
            TokKind::KeyConst => self.const_decl(is_pub),
            TokKind::KeyType => self.type_alias_decl(is_pub),
            _ => Err(self.parse_error(format!(
                "unexpected {} at top level",
                self.tok_str()
            ))),
        }
    }

    // ---- token cursor -------------------------------------------------

    pub(super) fn tok(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(super) fn kind(&self) -> TokKind {
        self.tok().kind
    }

    pub(super) fn peek(&self) -> &Token {
        let i = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    pub(super) fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    pub(super) fn next(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub(super) fn goto(&mut self, index: usize) {
        self.pos = index.min(self.tokens.len() - 1);
    }

    /// Human spelling of the current token, for error messages.
    pub(super) fn tok_str(&self) -> String {
        let tok = self.tok();
        if tok.kind == TokKind::Eof {
            "end of file".to_string()
        } else {
            format!("`{}`", tok.lit)
        }
    }

    /// Consumes the current token if it matches, errors otherwise.
    pub(super) fn check(&mut self, kind: TokKind) -> Result<(), CoreError> {
        if self.kind() == kind {
            self.next();
            Ok(())
        } else {
            Err(self.parse_error(format!(
                "expected {}, found {}",
                kind_str(kind),
                self.tok_str()
            )))
        }
    }

    /// Consumes and returns an identifier.
    pub(super) fn check_name(&mut self) -> Result<String, CoreError> {
        if self.kind() == TokKind::Name {
            let lit = self.tok().lit.clone();
            self.next();
            Ok(lit)
        } else {
            Err(self.parse_error(format!("expected identifier, found {}", self.tok_str())))
        }
    }

    /// Skips a balanced `{ ... }` block starting at the current token.
    pub(super) fn skip_block(&mut self) -> Result<(), CoreError> {
        self.check(TokKind::LCbr)?;
        let mut depth = 1usize;
        loop {
            match self.kind() {
                TokKind::LCbr => depth += 1,
                TokKind::RCbr => {
                    depth -= 1;
                    if depth == 0 {
                        self.next();
                        return Ok(());
                    }
                }
                TokKind::Eof => {
                    return Err(self.parse_error("unexpected end of file inside block"));
                }
                _ => {}
            }
            self.next();
        }
    }

    // ---- diagnostics --------------------------------------------------

    /// A syntax error at the current token. Always fatal.
    pub(super) fn parse_error(&self, message: impl Into<String>) -> CoreError {
        let tok = self.tok();
        let diag = Diagnostic::new(
            Severity::Parse,
            message,
            self.file,
            self.source,
            tok.line,
            tok.col,
        );
        CoreError::Parse {
            message: diag.rendered(),
        }
    }

    /// A semantic error at the current token. Suppressed during the
    /// declaration pass; fatal through the sink during the main pass.
    pub(super) fn type_error(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        self.type_error_at(message, line, col)
    }

    pub(super) fn type_error_at(
        &mut self,
        message: impl Into<String>,
        line: u32,
        col: u32,
    ) -> Result<(), CoreError> {
        if self.pass == Pass::Decl {
            return Ok(());
        }
        self.sink.report(Diagnostic::new(
            Severity::Type,
            message,
            self.file,
            self.source,
            line,
            col,
        ))
    }

    /// A semantic error that is fatal in both passes. Redefinitions are
    /// caught during the declaration pass and must not be suppressed there.
    pub(super) fn hard_type_error_at(
        &mut self,
        message: impl Into<String>,
        line: u32,
        col: u32,
    ) -> Result<(), CoreError> {
        self.sink.report(Diagnostic::new(
            Severity::Type,
            message,
            self.file,
            self.source,
            line,
            col,
        ))
    }

    /// A warning at the current token. Reported in the main pass only so
    /// the two passes do not double-report.
    pub(super) fn warn(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        if self.pass == Pass::Decl {
            return Ok(());
        }
        let tok = self.tok();
        let diag = Diagnostic::new(
            Severity::Warning,
            message,
            self.file,
            self.source,
            tok.line,
            tok.col,
        );
        self.sink.report(diag)
    }

    // ---- names and helpers --------------------------------------------

    /// Mangles a top-level name with the current module. The `main` module
    /// is the root namespace and adds no prefix.
    pub(super) fn prepend_mod(&self, name: &str) -> String {
        if self.mod_name == "main" {
            name.to_string()
        } else {
            format!("{}__{}", self.mod_name, name)
        }
    }

    pub(super) fn next_tmp(&mut self) -> String {
        self.tmp_count += 1;
        format!("_t{}", self.tmp_count)
    }

    /// Cuts the text emitted since `offset` out of the pending accumulator
    /// and returns it, leaving the accumulator as it was at `offset`.
    pub(super) fn take_since(&mut self, offset: usize) -> String {
        let text = self.cgen.cur_text();
        let out = text[offset..].to_string();
        let prefix = text[..offset].to_string();
        self.cgen.resetln(&prefix);
        out
    }

    // ---- types --------------------------------------------------------

    pub(super) fn is_type_start(&self) -> bool {
        matches!(
            self.kind(),
            TokKind::Question | TokKind::Amp | TokKind::LSbr | TokKind::Name
        )
    }

    /// Parses a type expression. The generic placeholder `T` resolves to
    /// the ambient concrete type during monomorphization replay.
    pub(super) fn parse_type(&mut self) -> Result<TypeExpr, CoreError> {
        match self.kind() {
            TokKind::Question => {
                self.next();
                let inner = self.parse_type()?;
                if let Err(msg) = self.table.register_option(&inner) {
                    self.type_error(msg)?;
                }
                Ok(TypeExpr::option_of(inner))
            }
            TokKind::Amp => {
                self.next();
                Ok(TypeExpr::pointer(self.parse_type()?))
            }
            TokKind::LSbr => {
                self.next();
                self.check(TokKind::RSbr)?;
                Ok(TypeExpr::array_of(self.parse_type()?))
            }
            TokKind::Name if self.tok().lit == "map" && self.peek().kind == TokKind::LSbr => {
                self.next();
                self.next();
                let key = self.parse_type()?;
                self.check(TokKind::RSbr)?;
                let val = self.parse_type()?;
                if !key.is_string() {
                    self.type_error("map keys must be strings")?;
                }
                Ok(TypeExpr::Map(Box::new(key), Box::new(val)))
            }
            TokKind::KeyFn => {
                self.next();
                self.check(TokKind::LPar)?;
                let mut params = Vec::new();
                while self.kind() != TokKind::RPar {
                    params.push(self.parse_type()?);
                    if self.kind() == TokKind::Comma {
                        self.next();
                    }
                }
                self.check(TokKind::RPar)?;
                let ret = if self.is_type_start() {
                    self.parse_type()?
                } else {
                    TypeExpr::void()
                };
                Ok(TypeExpr::Fn {
                    params,
                    ret: Box::new(ret),
                })
            }
            TokKind::Name => {
                let (line, col) = (self.tok().line, self.tok().col);
                let mut name = self.tok().lit.clone();
                self.next();
                if name == "T" {
                    if let Some(g) = &self.cur_generic_type {
                        return Ok(g.clone());
                    }
                    return Ok(TypeExpr::Named("T".into()));
                }
                if let Some(p) = Primitive::from_name(&name) {
                    return Ok(TypeExpr::Primitive(p));
                }
                if matches!(name.as_str(), "string" | "voidptr" | "array" | "map") {
                    return Ok(TypeExpr::named(name));
                }
                let qualified = self.kind() == TokKind::Dot
                    && self
                        .table
                        .file_imports(self.file)
                        .is_some_and(|t| t.known(&name));
                if qualified {
                    let module = self
                        .table
                        .file_imports(self.file)
                        .and_then(|t| t.resolve(&name).map(str::to_string))
                        .unwrap_or_default();
                    self.table.file_imports_mut(self.file).mark_used(&name);
                    self.next();
                    let tn = self.check_name()?;
                    name = format!("{module}__{tn}");
                } else {
                    name = self.prepend_mod(&name);
                }
                self.table.register_type(&name);
                if self.pass == Pass::Main && !self.table.known_type(&name) {
                    self.type_error_at(format!("unknown type `{name}`"), line, col)?;
                }
                Ok(TypeExpr::Named(name))
            }
            _ => Err(self.parse_error(format!("expected a type, found {}", self.tok_str()))),
        }
    }

    // ---- locals and scopes --------------------------------------------

    pub(super) fn find_local(&self, name: &str) -> Option<&Var> {
        self.locals.iter().rev().find(|v| v.name == name)
    }

    pub(super) fn find_local_mut(&mut self, name: &str) -> Option<&mut Var> {
        self.locals.iter_mut().rev().find(|v| v.name == name)
    }

    pub(super) fn register_local(&mut self, mut var: Var) -> Result<(), CoreError> {
        if self.find_local(&var.name).is_some() {
            let msg = format!("redefinition of `{}`", var.name);
            self.type_error_at(msg, var.line, var.col)?;
        }
        var.scope_level = self.scope_level;
        self.locals.push(var);
        Ok(())
    }

    pub(super) fn open_scope(&mut self) {
        self.scope_level += 1;
    }

    /// Closes the innermost scope: flags unused locals, emits frees for
    /// owned allocations, and drops the scope's variables.
    pub(super) fn close_scope(&mut self) -> Result<(), CoreError> {
        let level = self.scope_level;
        let mut leaving = Vec::new();
        while let Some(v) = self.locals.last() {
            if v.scope_level < level {
                break;
            }
            leaving.push(self.locals.pop().unwrap_or_else(|| unreachable!()));
        }
        for var in &leaving {
            if self.pass == Pass::Main
                && !var.is_used
                && !var.is_arg
                && !var.name.starts_with('_')
            {
                self.type_error_at(
                    format!("`{}` declared and not used", var.name),
                    var.line,
                    var.col,
                )?;
            }
            if var.needs_free() {
                match &var.typ {
                    TypeExpr::Array(_) => self.cgen.genln(&format!("array_free({});", var.name)),
                    TypeExpr::Map(_, _) => self.cgen.genln(&format!("map_free({});", var.name)),
                    TypeExpr::Pointer(_) => self.cgen.genln(&format!("free({});", var.name)),
                    TypeExpr::Named(n) if n == "voidptr" => {
                        self.cgen.genln(&format!("free({});", var.name))
                    }
                    // Strings are reference counted by the runtime.
                    _ => {}
                }
            }
        }
        self.scope_level -= 1;
        Ok(())
    }

    /// Emits all pending defers, most recent first.
    pub(super) fn emit_defers(&mut self) {
        let texts: Vec<String> = self.defers.iter().rev().cloned().collect();
        for text in texts {
            for line in text.lines() {
                self.cgen.genln(line);
            }
        }
    }
}

fn kind_str(kind: TokKind) -> &'static str {
    match kind {
        TokKind::LPar => "`(`",
        TokKind::RPar => "`)`",
        TokKind::LCbr => "`{`",
        TokKind::RCbr => "`}`",
        TokKind::LSbr => "`[`",
        TokKind::RSbr => "`]`",
        TokKind::Comma => "`,`",
        TokKind::Colon => "`:`",
        TokKind::Dot => "`.`",
        TokKind::Assign => "`=`",
        TokKind::DeclAssign => "`:=`",
        TokKind::Gt => "`>`",
        TokKind::Lt => "`<`",
        TokKind::Name => "identifier",
        TokKind::KeyIn => "`in`",
        TokKind::KeyElse => "`else`",
        TokKind::KeyFn => "`fn`",
        _ => "token",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::FailFast;
    use crate::scanner::tokenize;

    /// Runs both passes over one source file and returns the emitted body
    /// text. Mirrors the driver's two-pass protocol without module
    /// resolution or output assembly.
    fn emit(src: &str) -> Result<String, CoreError> {
        emit_with(src, false)
    }

    fn emit_with(src: &str, prod: bool) -> Result<String, CoreError> {
        let tokens = tokenize("main.cdr", src)?;
        let mut table = Table::new();
        crate::compiler::register_builtins(&mut table);
        let mut sink = FailFast::new(prod);
        let mut scratch = CGen::new();
        Parser::new(
            &tokens,
            "main.cdr",
            src,
            &mut table,
            &mut scratch,
            &mut sink,
            Pass::Decl,
        )
        .parse()?;
        let mut cgen = CGen::new();
        Parser::new(
            &tokens,
            "main.cdr",
            src,
            &mut table,
            &mut cgen,
            &mut sink,
            Pass::Main,
        )
        .parse()?;
        Ok(cgen.output())
    }

    #[test]
    fn emits_integer_declaration() {
        let out = emit("fn main() { x := 1 + 2 println('$x') }").unwrap();
        assert!(out.contains("int x = 1 + 2;"), "{out}");
    }

    #[test]
    fn unused_variable_is_an_error() {
        let err = emit("fn main() { x := 1 + 2 }").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("`x` declared and not used"), "{msg}");
    }

    #[test]
    fn underscore_names_are_exempt_from_unused_check() {
        emit("fn main() { _res := 3 }").unwrap();
    }

    #[test]
    fn type_mismatch_is_reported() {
        let err = emit("fn main() { x := 'a' y := 1 y = x println('$y') }").unwrap_err();
        assert!(err.to_string().contains("cannot assign"), "{err}");
    }

    #[test]
    fn immutable_assignment_is_an_error() {
        let err = emit("fn main() { x := 1 x = 2 println('$x') }").unwrap_err();
        assert!(err.to_string().contains("immutable"), "{err}");
    }

    #[test]
    fn mutable_assignment_is_allowed() {
        let out = emit("fn main() { mut x := 1 x = 2 println('$x') }").unwrap();
        assert!(out.contains("x = 2;"), "{out}");
    }

    #[test]
    fn string_equality_becomes_call() {
        let out =
            emit("fn main() { a := 'x' if a == 'y' { println(a) } }").unwrap();
        assert!(out.contains("string_eq("), "{out}");
    }

    #[test]
    fn string_concat_becomes_call() {
        let out = emit("fn main() { a := 'x' + 'y' println(a) }").unwrap();
        assert!(out.contains("string_add("), "{out}");
    }

    #[test]
    fn interpolation_lowers_to_str_call() {
        let out = emit("fn main() { n := 3 println('n is $n!') }").unwrap();
        assert!(out.contains("_STR(\"n is %d!\", n)"), "{out}");
    }

    #[test]
    fn interpolated_string_value_passes_length() {
        let out = emit("fn main() { s := 'hi' println('v=${s}') }").unwrap();
        assert!(out.contains("_STR(\"v=%.*s\", s.len, s.str)"), "{out}");
    }

    #[test]
    fn method_call_mangles_receiver() {
        let src = "struct Point { x int y int }\n\
                   fn (p Point) norm() int { return p.x + p.y }\n\
                   fn main() { p := Point{x: 1, y: 2} println('${p.norm()}') }";
        let out = emit(src).unwrap();
        assert!(out.contains("int Point_norm(Point* p) {"), "{out}");
        assert!(out.contains("Point_norm(&p)"), "{out}");
    }

    #[test]
    fn struct_literal_uses_designators() {
        let src = "struct User { name string age int }\n\
                   fn main() { u := User{name: 'ann', age: 30} println(u.name) }";
        let out = emit(src).unwrap();
        assert!(out.contains("(User){.name = "), "{out}");
        assert!(out.contains(".age = 30"), "{out}");
    }

    #[test]
    fn unknown_field_is_reported() {
        let src = "struct User { age int }\n\
                   fn main() { u := User{age: 1} println('${u.height}') }";
        let err = emit(src).unwrap_err();
        assert!(err.to_string().contains("no field `height`"), "{err}");
    }

    #[test]
    fn for_in_lowers_to_index_loop() {
        let src = "fn main() { for x in [1, 2, 3] { println('$x') } }";
        let out = emit(src).unwrap();
        assert!(out.contains("new_array_from(3, sizeof(int)"), "{out}");
        assert!(out.contains("array_get("), "{out}");
    }

    #[test]
    fn array_slice_lowers_to_runtime_call() {
        let src = "fn main() { a := [1, 2, 3] b := a[1..3] println('${b.len}') }";
        let out = emit(src).unwrap();
        assert!(out.contains("array b = array_slice(a, 1, 3);"), "{out}");
        // The slice owns fresh backing storage, so it is released with the
        // scope like any other allocation.
        assert!(out.contains("array_free(b);"), "{out}");
    }

    #[test]
    fn open_slice_bounds_use_length_sentinel() {
        let src = "fn main() { s := 'hello' t := s[1..] u := s[..2] println(t + u) }";
        let out = emit(src).unwrap();
        assert!(out.contains("string_substr(s, 1, -1)"), "{out}");
        assert!(out.contains("string_substr(s, 0, 2)"), "{out}");
    }

    #[test]
    fn slice_bound_must_be_an_integer() {
        let err = emit("fn main() { a := [1, 2] b := a[0..'x'] println('${b.len}') }").unwrap_err();
        assert!(err.to_string().contains("slice bound"), "{err}");
    }

    #[test]
    fn for_in_range_lowers_to_counting_loop() {
        let src = "fn main() { for i in 0 .. 5 { println('$i') } }";
        let out = emit(src).unwrap();
        assert!(out.contains("for (int i = 0; i < 5; i++) {"), "{out}");
    }

    #[test]
    fn range_bounds_must_be_integers() {
        let err = emit("fn main() { for i in 'a' .. 'b' { println('$i') } }").unwrap_err();
        assert!(err.to_string().contains("range bounds"), "{err}");
    }

    #[test]
    fn match_lowers_to_if_chain() {
        let src = "fn main() { x := 2 match x { 1 { println('one') } 2, 3 { println('few') } else { println('many') } } }";
        let out = emit(src).unwrap();
        assert!(out.contains("if (_t1 == 1) {"), "{out}");
        assert!(out.contains("else if (_t1 == 2 || _t1 == 3) {"), "{out}");
        assert!(out.contains("else {"), "{out}");
    }

    #[test]
    fn switch_is_deprecated_but_accepted() {
        let src = "fn main() { x := 1 switch x { 1 { println('one') } else { println('other') } } }";
        let out = emit(src).unwrap();
        assert!(out.contains("if (_t1 == 1)"), "{out}");
        // Production mode promotes the deprecation warning to an error.
        let err = emit_with(src, true).unwrap_err();
        assert!(err.to_string().contains("deprecated"), "{err}");
    }

    #[test]
    fn optional_must_be_handled() {
        let src = "fn find() ?int { return 5 }\n\
                   fn main() { x := find() println('$x') }";
        let err = emit(src).unwrap_err();
        assert!(err.to_string().contains("or"), "{err}");
    }

    #[test]
    fn or_block_unwraps_optional() {
        let src = "fn find() ?int { return 5 }\n\
                   fn main() { x := find() or { return } println('$x') }";
        let out = emit(src).unwrap();
        assert!(out.contains("CdrOption _t1 = find();"), "{out}");
        assert!(out.contains("if (!_t1.ok) {"), "{out}");
        assert!(out.contains("int x = *(int*) _t1.data;"), "{out}");
    }

    #[test]
    fn optional_return_wraps_value() {
        let src = "fn find(k int) ?int { if k > 0 { return k } return error('negative') }\n\
                   fn main() { x := find(1) or { return } println('$x') }";
        let out = emit(src).unwrap();
        assert!(out.contains("return opt_ok(&(int){ k }, sizeof(int));"), "{out}");
        assert!(out.contains("return opt_err("), "{out}");
    }

    #[test]
    fn generic_fn_monomorphizes_per_type() {
        let src = "fn id<T>(x T) T { return x }\n\
                   fn main() { a := id<int>(1) b := id<string>('s') c := id<int>(2) println('$a ${b} $c') }";
        let out = emit(src).unwrap();
        assert!(out.contains("int id_int(int x) {"), "{out}");
        assert!(out.contains("string id_string(string x) {"), "{out}");
        // Two int call sites must still produce exactly one instantiation.
        assert_eq!(out.matches("int id_int(int x) {").count(), 1, "{out}");
    }

    #[test]
    fn multi_value_return_destructures_positionally() {
        let src = "fn pair() (int, string) { return 1, 'a' }\n\
                   fn main() { n, s := pair() println('$n $s') }";
        let out = emit(src).unwrap();
        assert!(out.contains("multi_int_string _t1 = pair();"), "{out}");
        assert!(out.contains("int n = _t1.f0;"), "{out}");
        assert!(out.contains("string s = _t1.f1;"), "{out}");
        assert!(out.contains("return (multi_int_string){.f0 = 1, .f1 = "), "{out}");
    }

    #[test]
    fn defer_runs_before_return_and_scope_end() {
        let src = "fn main() { mut x := 0 defer { x = 9 } x = 1 println('$x') }";
        let out = emit(src).unwrap();
        let defer_pos = out.rfind("x = 9;").unwrap();
        let close = out.rfind('}').unwrap();
        assert!(defer_pos < close, "{out}");
    }

    #[test]
    fn array_literal_hoists_backing_storage() {
        let out = emit("fn main() { a := [10, 20] println('${a[0]}') }").unwrap();
        assert!(out.contains("int _t1[] = {10, 20};"), "{out}");
        assert!(out.contains("array a = new_array_from(2, sizeof(int), _t1);"), "{out}");
        assert!(out.contains("*(int*) array_get(a, 0)"), "{out}");
        // Owned allocation is released on scope close.
        assert!(out.contains("array_free(a);"), "{out}");
    }

    #[test]
    fn array_push_operator() {
        let out = emit("fn main() { mut a := [1] a << 2 println('${a[0]}') }").unwrap();
        assert!(out.contains("array_push(&a, &(int){2})"), "{out}");
    }

    #[test]
    fn map_literal_and_index() {
        let src = "fn main() { mut m := map[string]int{} m['k'] = 3 println('${m[\"k\"]}') }";
        let out = emit(src).unwrap();
        assert!(out.contains("map m = new_map(sizeof(int));"), "{out}");
        assert!(out.contains("map_set(&m,"), "{out}");
        assert!(out.contains("*(int*) map_get(m,"), "{out}");
    }

    #[test]
    fn enum_values_are_prefixed() {
        let src = "enum Color { red green blue }\n\
                   fn main() { c := Color.green match c { .red { println('r') } else { println('o') } } }";
        let out = emit(src).unwrap();
        assert!(out.contains("Color_green"), "{out}");
        assert!(out.contains("Color_red"), "{out}");
    }

    #[test]
    fn if_expression_lowers_to_ternary() {
        let out = emit("fn main() { n := 5 x := if n > 3 { 1 } else { 2 } println('$x') }").unwrap();
        assert!(out.contains("int x = ((n > 3) ? (1) : (2));"), "{out}");
    }

    #[test]
    fn c_interop_calls_are_unmangled() {
        let src = "fn C.sqrt(x f64) f64\nfn main() { y := C.sqrt(2.0) println('$y') }";
        let out = emit(src).unwrap();
        assert!(out.contains("f64 y = sqrt(2.0);"), "{out}");
    }

    #[test]
    fn unknown_function_is_reported() {
        let err = emit("fn main() { frob(1) }").unwrap_err();
        assert!(err.to_string().contains("unknown function `frob`"), "{err}");
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let src = "fn add(a int, b int) int { return a + b }\nfn main() { x := add(1) println('$x') }";
        let err = emit(src).unwrap_err();
        assert!(err.to_string().contains("expects 2 argument"), "{err}");
    }

    #[test]
    fn module_prefixes_mangle_declarations() {
        let src = "module math\npub fn abs(x int) int { return if x < 0 { -x } else { x } }";
        let out = emit(src).unwrap();
        assert!(out.contains("int math__abs(int x) {"), "{out}");
    }

    #[test]
    fn c_style_for_loop_lowers_to_while() {
        let src = "fn main() { for mut i := 0; i < 3; i = i + 1 { println('$i') } }";
        let out = emit(src).unwrap();
        assert!(out.contains("while (i < 3) {"), "{out}");
        assert!(out.contains("i = i + 1;"), "{out}");
    }

    #[test]
    fn bare_and_conditional_loops() {
        let out = emit("fn main() { mut n := 0 for { n = n + 1 if n > 2 { break } } for n > 0 { n = n - 1 } println('$n') }").unwrap();
        assert!(out.contains("while (1) {"), "{out}");
        assert!(out.contains("while (n > 0) {"), "{out}");
        assert!(out.contains("break;"), "{out}");
    }

    #[test]
    fn break_outside_loop_is_reported() {
        let err = emit("fn main() { break }").unwrap_err();
        assert!(err.to_string().contains("outside of a loop"), "{err}");
    }

    #[test]
    fn interface_param_accepts_conforming_struct() {
        let src = "interface Speaker { speak() string }\n\
                   struct Cat { hunger int }\n\
                   fn (c Cat) speak() string { return 'meow' }\n\
                   fn greet(s Speaker) { println(s.speak()) }\n\
                   fn main() { c := Cat{hunger: 0} greet(c) }";
        let out = emit(src).unwrap();
        assert!(out.contains("._obj = (void*)&c"), "{out}");
        assert!(out.contains("Cat_speak"), "{out}");
    }

    #[test]
    fn nonconforming_interface_argument_is_reported() {
        let src = "interface Speaker { speak() string }\n\
                   struct Rock { mass int }\n\
                   fn greet(s Speaker) { println(s.speak()) }\n\
                   fn main() { r := Rock{mass: 3} greet(r) }";
        let err = emit(src).unwrap_err();
        assert!(err.to_string().contains("does not implement"), "{err}");
    }

    #[test]
    fn consts_become_defines() {
        let src = "const max_users = 10\nfn main() { println('$max_users') }";
        let tokens = tokenize("main.cdr", src).unwrap();
        let mut table = Table::new();
        crate::compiler::register_builtins(&mut table);
        let mut sink = FailFast::new(false);
        let mut scratch = CGen::new();
        Parser::new(&tokens, "main.cdr", src, &mut table, &mut scratch, &mut sink, Pass::Decl)
            .parse()
            .unwrap();
        assert_eq!(table.const_defs(), ["#define max_users (10)"]);
    }

    #[test]
    fn struct_redefinition_is_reported() {
        let err = emit("struct A { x int }\nstruct A { y int }\nfn main() { }").unwrap_err();
        assert!(err.to_string().contains("redefined"), "{err}");
    }

    #[test]
    fn forward_reference_resolves_via_two_passes() {
        let src = "fn main() { x := later() println('$x') }\nfn later() int { return 7 }";
        let out = emit(src).unwrap();
        assert!(out.contains("int x = later();"), "{out}");
    }
}
