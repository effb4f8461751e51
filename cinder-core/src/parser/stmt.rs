//! Statements and blocks.
//!
//! Everything here emits as it parses. Constructs with no direct C
//! counterpart are lowered structurally: `match` becomes an if-else chain
//! over a captured subject, `for x in` becomes an index loop, the C-style
//! `for` becomes a scoped `while` with the post statement re-emitted at the
//! bottom, and an `or` block becomes an option-struct check around the
//! unwrapped payload.

use crate::error::CoreError;
use crate::scanner::TokKind;
use crate::table::{Pass, TypeCat, Var};
use crate::typeexpr::TypeExpr;

use super::Parser;

impl Parser<'_> {
    pub(super) fn statement(&mut self) -> Result<(), CoreError> {
        self.cgen.cur_line = self.tok().line;
        match self.kind() {
            TokKind::Hash => {
                let lit = self.tok().lit.clone();
                self.cgen.genln(&lit);
                self.next();
                Ok(())
            }
            TokKind::LCbr => {
                self.next();
                self.cgen.genln("{");
                self.open_scope();
                while self.kind() != TokKind::RCbr {
                    self.statement()?;
                }
                self.next();
                self.close_scope()?;
                self.cgen.genln("}");
                Ok(())
            }
            TokKind::KeyIf => self.if_stmt(),
            TokKind::KeyFor => self.for_stmt(),
            TokKind::KeyMatch | TokKind::KeySwitch => self.match_stmt(),
            TokKind::KeyReturn => self.return_stmt(),
            TokKind::KeyBreak | TokKind::KeyContinue => {
                let word = if self.kind() == TokKind::KeyBreak {
                    "break"
                } else {
                    "continue"
                };
                if self.loop_depth == 0 {
                    self.type_error(format!("`{word}` outside of a loop"))?;
                }
                self.next();
                self.cgen.genln(&format!("{word};"));
                Ok(())
            }
            TokKind::KeyDefer => self.defer_stmt(),
            TokKind::KeyMut => {
                self.next();
                self.decl_assign(true)
            }
            TokKind::Name => self.name_statement(),
            TokKind::Eof => Err(self.parse_error("unexpected end of file")),
            _ => {
                self.bool_expression()?;
                self.cgen.genln(";");
                Ok(())
            }
        }
    }

    /// A statement starting with an identifier: declaration, multi-value
    /// destructure, assignment, or a plain expression.
    fn name_statement(&mut self) -> Result<(), CoreError> {
        if self.peek().kind == TokKind::DeclAssign {
            return self.decl_assign(false);
        }
        // `a, b := f()` lookahead.
        if self.peek().kind == TokKind::Comma {
            let mut i = 2;
            loop {
                if self.peek_at(i).kind != TokKind::Name {
                    break;
                }
                match self.peek_at(i + 1).kind {
                    TokKind::Comma => i += 2,
                    TokKind::DeclAssign => return self.destructure(),
                    _ => break,
                }
            }
        }
        // Map writes go through the runtime, not through an lvalue.
        if self.peek().kind == TokKind::LSbr {
            let is_map = self
                .find_local(&self.tok().lit)
                .is_some_and(|v| matches!(v.typ, TypeExpr::Map(_, _)));
            if is_map && self.index_assign_ahead() {
                return self.map_set_stmt();
            }
        }

        let base = self.tok().lit.clone();
        let ltyp = self.expression()?;
        if self.kind().is_assign_op() {
            let op = self.kind();
            let (line, col) = (self.tok().line, self.tok().col);
            let mut immutable = false;
            if let Some(v) = self.find_local_mut(&base) {
                if !v.is_mut {
                    immutable = true;
                }
                v.is_changed = true;
                v.is_used = true;
            }
            if immutable {
                self.type_error_at(
                    format!("cannot assign to immutable `{base}`, declare it with `mut`"),
                    line,
                    col,
                )?;
            }
            self.next();
            self.cgen.gen(&format!(" {} ", op.c_op()));
            let rtyp = self.bool_expression()?;
            if self.pass == Pass::Main && !self.table.check_types(&ltyp, &rtyp) {
                self.type_error_at(format!("cannot assign `{rtyp}` to `{ltyp}`"), line, col)?;
            }
        }
        self.cgen.genln(";");
        Ok(())
    }

    fn index_assign_ahead(&self) -> bool {
        let mut i = 1;
        let mut depth = 0usize;
        loop {
            match self.peek_at(i).kind {
                TokKind::LSbr => depth += 1,
                TokKind::RSbr => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_at(i + 1).kind == TokKind::Assign;
                    }
                }
                TokKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }

    fn map_set_stmt(&mut self) -> Result<(), CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        let name = self.check_name()?;
        let (ktyp, vtyp) = match self.find_local(&name).map(|v| v.typ.clone()) {
            Some(TypeExpr::Map(k, v)) => (*k, *v),
            _ => (TypeExpr::string(), TypeExpr::int()),
        };
        let mut immutable = false;
        if let Some(v) = self.find_local_mut(&name) {
            if !v.is_mut {
                immutable = true;
            }
            v.is_changed = true;
            v.is_used = true;
        }
        if immutable {
            self.type_error_at(
                format!("cannot assign to immutable `{name}`, declare it with `mut`"),
                line,
                col,
            )?;
        }
        self.check(TokKind::LSbr)?;
        self.cgen.start_tmp();
        let kt = self.bool_expression()?;
        let key = self.cgen.end_tmp();
        if self.pass == Pass::Main && !self.table.check_types(&ktyp, &kt) {
            self.type_error_at(format!("map key must be `{ktyp}`, got `{kt}`"), line, col)?;
        }
        self.check(TokKind::RSbr)?;
        self.check(TokKind::Assign)?;
        self.cgen.start_tmp();
        let vt = self.bool_expression()?;
        let val = self.cgen.end_tmp();
        if self.pass == Pass::Main && !self.table.check_types(&vtyp, &vt) {
            self.type_error_at(format!("cannot assign `{vt}` to `{vtyp}`"), line, col)?;
        }
        self.cgen.genln(&format!(
            "map_set(&{name}, {key}, &({}){{{val}}});",
            vtyp.cname()
        ));
        Ok(())
    }

    /// `name := expr`, with the C type spliced in front once the right-hand
    /// side's type is known.
    pub(super) fn decl_assign(&mut self, is_mut: bool) -> Result<(), CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        let name = self.check_name()?;
        self.check(TokKind::DeclAssign)?;
        let p = self.cgen.add_placeholder();
        let typ = self.bool_expression()?;
        if self.kind() == TokKind::KeyOr {
            return self.or_block(name, typ, p, is_mut, line, col);
        }
        let rhs_allocates = {
            let text = &self.cgen.cur_text()[p..];
            text.starts_with("new_array")
                || text.starts_with("new_map")
                || text.starts_with("malloc(")
                || text.starts_with("array_slice(")
        };
        if typ.is_option() {
            self.type_error_at(
                format!("`{name}` is optional and must be unwrapped with an `or` block"),
                line,
                col,
            )?;
        }
        if typ.is_void() {
            self.type_error_at(format!("cannot assign a void value to `{name}`"), line, col)?;
        }
        let emit_name = if name == "_" {
            self.next_tmp()
        } else {
            name.clone()
        };
        self.cgen
            .set_placeholder(p, &format!("{} {} = ", typ.cname(), emit_name));
        self.cgen.genln(";");
        if name != "_" {
            let mut v = Var::new(name, typ);
            v.is_mut = is_mut;
            v.is_alloc = rhs_allocates;
            v.line = line;
            v.col = col;
            self.register_local(v)?;
        }
        Ok(())
    }

    /// Lowers `x := f() or { ... }`: the option struct is checked, the
    /// recovery block runs with `err` bound, and the payload is unwrapped.
    fn or_block(
        &mut self,
        name: String,
        typ: TypeExpr,
        p: usize,
        is_mut: bool,
        line: u32,
        col: u32,
    ) -> Result<(), CoreError> {
        let inner = match typ {
            TypeExpr::Option(inner) => *inner,
            other => {
                self.type_error_at(
                    format!("`or` block on non-optional value of type `{other}`"),
                    line,
                    col,
                )?;
                TypeExpr::int()
            }
        };
        let rhs = self.take_since(p);
        self.check(TokKind::KeyOr)?;
        let tmp = self.next_tmp();
        self.cgen.genln(&format!("CdrOption {tmp} = {rhs};"));
        self.cgen.genln(&format!("if (!{tmp}.ok) {{"));
        self.open_scope();
        let mut err = Var::new("err", TypeExpr::string());
        err.is_used = true;
        err.line = line;
        err.col = col;
        self.register_local(err)?;
        self.cgen.genln(&format!("string err = {tmp}.error;"));
        self.check(TokKind::LCbr)?;
        while self.kind() != TokKind::RCbr {
            self.statement()?;
        }
        self.next();
        self.close_scope()?;
        self.cgen.genln("}");
        let c = inner.cname();
        self.cgen
            .genln(&format!("{c} {name} = *({c}*) {tmp}.data;"));
        let mut v = Var::new(name, inner);
        v.is_mut = is_mut;
        v.line = line;
        v.col = col;
        self.register_local(v)?;
        Ok(())
    }

    /// `a, b := f()` where `f` returns a multi-value aggregate.
    fn destructure(&mut self) -> Result<(), CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        let mut names = vec![self.check_name()?];
        while self.kind() == TokKind::Comma {
            self.next();
            names.push(self.check_name()?);
        }
        self.check(TokKind::DeclAssign)?;
        self.cgen.start_tmp();
        let typ = self.bool_expression()?;
        let rhs = self.cgen.end_tmp();
        let parts = match typ {
            TypeExpr::Multi(parts) => parts,
            other => {
                self.type_error_at(
                    format!("expected a multi-value expression, got `{other}`"),
                    line,
                    col,
                )?;
                vec![TypeExpr::int(); names.len()]
            }
        };
        if self.pass == Pass::Main && parts.len() != names.len() {
            self.type_error_at(
                format!(
                    "expression has {} values, but {} names are declared",
                    parts.len(),
                    names.len()
                ),
                line,
                col,
            )?;
        }
        let tmp = self.next_tmp();
        let mname = TypeExpr::Multi(parts.clone()).mangled();
        self.cgen.genln(&format!("{mname} {tmp} = {rhs};"));
        for (i, name) in names.iter().enumerate() {
            let t = parts.get(i).cloned().unwrap_or_else(TypeExpr::int);
            self.cgen
                .genln(&format!("{} {} = {}.f{};", t.cname(), name, tmp, i));
            let mut v = Var::new(name.clone(), t);
            v.line = line;
            v.col = col;
            self.register_local(v)?;
        }
        Ok(())
    }

    fn if_stmt(&mut self) -> Result<(), CoreError> {
        self.check(TokKind::KeyIf)?;
        self.cgen.gen("if (");
        let (line, col) = (self.tok().line, self.tok().col);
        let saved = self.no_block_init;
        self.no_block_init = true;
        let ct = self.bool_expression()?;
        self.no_block_init = saved;
        if self.pass == Pass::Main && !ct.is_bool() {
            self.type_error_at(format!("`if` condition must be `bool`, got `{ct}`"), line, col)?;
        }
        self.cgen.genln(") {");
        self.check(TokKind::LCbr)?;
        self.open_scope();
        while self.kind() != TokKind::RCbr {
            self.statement()?;
        }
        self.next();
        self.close_scope()?;
        self.cgen.genln("}");
        if self.kind() == TokKind::KeyElse {
            self.next();
            if self.kind() == TokKind::KeyIf {
                self.cgen.gen("else ");
                return self.if_stmt();
            }
            self.cgen.genln("else {");
            self.check(TokKind::LCbr)?;
            self.open_scope();
            while self.kind() != TokKind::RCbr {
                self.statement()?;
            }
            self.next();
            self.close_scope()?;
            self.cgen.genln("}");
        }
        Ok(())
    }

    fn for_stmt(&mut self) -> Result<(), CoreError> {
        self.check(TokKind::KeyFor)?;
        if self.kind() == TokKind::LCbr {
            self.cgen.genln("while (1) {");
            return self.loop_body();
        }
        // Classify the header by scanning to the body `{`.
        let mut i = 0;
        let mut depth = 0usize;
        let (mut has_semi, mut has_in) = (false, false);
        loop {
            match self.peek_at(i).kind {
                TokKind::LPar | TokKind::LSbr => depth += 1,
                TokKind::RPar | TokKind::RSbr => depth = depth.saturating_sub(1),
                TokKind::LCbr if depth == 0 => break,
                TokKind::Semicolon if depth == 0 => has_semi = true,
                TokKind::KeyIn if depth == 0 => has_in = true,
                TokKind::Eof => break,
                _ => {}
            }
            i += 1;
        }
        if has_in {
            return self.for_in_stmt();
        }
        if has_semi {
            return self.for_c_style();
        }
        self.cgen.gen("while (");
        let (line, col) = (self.tok().line, self.tok().col);
        let saved = self.no_block_init;
        self.no_block_init = true;
        let ct = self.bool_expression()?;
        self.no_block_init = saved;
        if self.pass == Pass::Main && !ct.is_bool() {
            self.type_error_at(format!("loop condition must be `bool`, got `{ct}`"), line, col)?;
        }
        self.cgen.genln(") {");
        self.loop_body()
    }

    fn loop_body(&mut self) -> Result<(), CoreError> {
        self.check(TokKind::LCbr)?;
        self.open_scope();
        self.loop_depth += 1;
        while self.kind() != TokKind::RCbr {
            self.statement()?;
        }
        self.next();
        self.loop_depth -= 1;
        self.close_scope()?;
        self.cgen.genln("}");
        Ok(())
    }

    /// `for init; cond; post { ... }`, lowered to a scoped `while` with the
    /// post statement at the bottom of the body.
    fn for_c_style(&mut self) -> Result<(), CoreError> {
        self.cgen.genln("{");
        self.open_scope();
        if self.kind() != TokKind::Semicolon {
            self.statement()?;
        }
        self.check(TokKind::Semicolon)?;
        let cond = if self.kind() == TokKind::Semicolon {
            "1".to_string()
        } else {
            self.cgen.start_tmp();
            let saved = self.no_block_init;
            self.no_block_init = true;
            let ct = self.bool_expression()?;
            self.no_block_init = saved;
            if self.pass == Pass::Main && !ct.is_bool() {
                self.type_error(format!("loop condition must be `bool`, got `{ct}`"))?;
            }
            self.cgen.end_tmp()
        };
        self.check(TokKind::Semicolon)?;
        let post = if self.kind() == TokKind::LCbr {
            String::new()
        } else {
            self.cgen.start_tmp();
            let saved = self.no_block_init;
            self.no_block_init = true;
            self.statement()?;
            self.no_block_init = saved;
            self.cgen.end_tmp()
        };
        self.cgen.genln(&format!("while ({cond}) {{"));
        self.check(TokKind::LCbr)?;
        self.open_scope();
        self.loop_depth += 1;
        while self.kind() != TokKind::RCbr {
            self.statement()?;
        }
        self.next();
        self.loop_depth -= 1;
        self.close_scope()?;
        for line in post.lines() {
            self.cgen.genln(line);
        }
        self.cgen.genln("}");
        self.close_scope()?;
        self.cgen.genln("}");
        Ok(())
    }

    /// `for x in c` and `for i, x in c` over arrays and strings, and
    /// `for x in lo .. hi` over integer ranges.
    fn for_in_stmt(&mut self) -> Result<(), CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        let first = self.check_name()?;
        let (idx_name, val_name) = if self.kind() == TokKind::Comma {
            self.next();
            (Some(first), self.check_name()?)
        } else {
            (None, first)
        };
        self.check(TokKind::KeyIn)?;
        self.cgen.start_tmp();
        let saved = self.no_block_init;
        self.no_block_init = true;
        let ctyp = self.bool_expression()?;
        if self.kind() == TokKind::DotDot {
            let start = self.cgen.end_tmp();
            let int_like = |t: &TypeExpr| matches!(t, TypeExpr::Primitive(p) if p.is_integer());
            if self.pass == Pass::Main && !int_like(&ctyp) {
                self.type_error_at(format!("range bounds must be integers, got `{ctyp}`"), line, col)?;
            }
            self.next();
            self.cgen.start_tmp();
            let etyp = self.bool_expression()?;
            let end = self.cgen.end_tmp();
            self.no_block_init = saved;
            if self.pass == Pass::Main && !int_like(&etyp) {
                self.type_error(format!("range bounds must be integers, got `{etyp}`"))?;
            }
            if idx_name.is_some() {
                self.type_error_at("a range loop binds a single variable".to_string(), line, col)?;
            }
            self.cgen.genln("{");
            self.open_scope();
            self.cgen.genln(&format!(
                "for (int {val_name} = {start}; {val_name} < {end}; {val_name}++) {{"
            ));
            let mut v = Var::new(val_name, TypeExpr::int());
            v.line = line;
            v.col = col;
            self.register_local(v)?;
            self.check(TokKind::LCbr)?;
            self.loop_depth += 1;
            while self.kind() != TokKind::RCbr {
                self.statement()?;
            }
            self.next();
            self.loop_depth -= 1;
            self.close_scope()?;
            self.cgen.genln("}");
            self.cgen.genln("}");
            return Ok(());
        }
        self.no_block_init = saved;
        let container = self.cgen.end_tmp();

        self.cgen.genln("{");
        self.open_scope();
        let ctmp = self.next_tmp();
        let idx = match &idx_name {
            Some(n) => n.clone(),
            None => self.next_tmp(),
        };
        let elem = match &ctyp {
            TypeExpr::Array(elem) => {
                let e = elem.cname();
                self.cgen.genln(&format!("array {ctmp} = {container};"));
                self.cgen.genln(&format!(
                    "for (int {idx} = 0; {idx} < {ctmp}.len; {idx}++) {{"
                ));
                self.cgen
                    .genln(&format!("{e} {val_name} = *({e}*) array_get({ctmp}, {idx});"));
                (**elem).clone()
            }
            t if t.is_string() => {
                self.cgen.genln(&format!("string {ctmp} = {container};"));
                self.cgen.genln(&format!(
                    "for (int {idx} = 0; {idx} < {ctmp}.len; {idx}++) {{"
                ));
                self.cgen
                    .genln(&format!("byte {val_name} = {ctmp}.str[{idx}];"));
                TypeExpr::Primitive(crate::typeexpr::Primitive::Byte)
            }
            other => {
                self.type_error_at(format!("cannot iterate over `{other}`"), line, col)?;
                self.cgen.genln(&format!("array {ctmp} = {container};"));
                self.cgen.genln(&format!(
                    "for (int {idx} = 0; {idx} < {ctmp}.len; {idx}++) {{"
                ));
                TypeExpr::int()
            }
        };
        if let Some(n) = idx_name {
            let mut v = Var::new(n, TypeExpr::int());
            v.line = line;
            v.col = col;
            self.register_local(v)?;
        }
        let mut v = Var::new(val_name, elem);
        v.line = line;
        v.col = col;
        self.register_local(v)?;

        self.check(TokKind::LCbr)?;
        self.loop_depth += 1;
        while self.kind() != TokKind::RCbr {
            self.statement()?;
        }
        self.next();
        self.loop_depth -= 1;
        self.close_scope()?;
        self.cgen.genln("}");
        self.cgen.genln("}");
        Ok(())
    }

    /// `match` (and the deprecated `switch` spelling) lowered to an if-else
    /// chain over a captured subject.
    fn match_stmt(&mut self) -> Result<(), CoreError> {
        if self.kind() == TokKind::KeySwitch {
            self.warn("`switch` is deprecated, use `match` instead")?;
        }
        self.next();
        self.cgen.start_tmp();
        let saved = self.no_block_init;
        self.no_block_init = true;
        let styp = self.bool_expression()?;
        self.no_block_init = saved;
        let subject = self.cgen.end_tmp();
        self.check(TokKind::LCbr)?;
        let tmp = self.next_tmp();
        self.cgen.genln("{");
        self.cgen
            .genln(&format!("{} {} = {};", styp.cname(), tmp, subject));
        let enum_name = match &styp {
            TypeExpr::Named(n)
                if self
                    .table
                    .find_type(n)
                    .is_some_and(|t| t.cat == TypeCat::Enum) =>
            {
                Some(n.clone())
            }
            _ => None,
        };
        let mut first = true;
        let mut saw_else = false;
        while self.kind() != TokKind::RCbr {
            if self.kind() == TokKind::KeyElse {
                self.next();
                saw_else = true;
                self.cgen.genln("else {");
                self.check(TokKind::LCbr)?;
                self.open_scope();
                while self.kind() != TokKind::RCbr {
                    self.statement()?;
                }
                self.next();
                self.close_scope()?;
                self.cgen.genln("}");
                continue;
            }
            self.cgen
                .gen(if first { "if (" } else { "else if (" });
            first = false;
            loop {
                let (vline, vcol) = (self.tok().line, self.tok().col);
                self.cgen.start_tmp();
                let vtyp = if self.kind() == TokKind::Dot && enum_name.is_some() {
                    // `.red` shorthand for the subject's enum.
                    self.next();
                    let val = self.check_name()?;
                    let name = enum_name.clone().unwrap_or_default();
                    self.cgen.gen(&format!("{name}_{val}"));
                    styp.clone()
                } else {
                    self.expression()?
                };
                let value = self.cgen.end_tmp();
                if self.pass == Pass::Main && !self.table.check_types(&styp, &vtyp) {
                    self.type_error_at(
                        format!("match case has type `{vtyp}`, subject is `{styp}`"),
                        vline,
                        vcol,
                    )?;
                }
                if styp.is_string() {
                    self.cgen.gen(&format!("string_eq({tmp}, {value})"));
                } else {
                    self.cgen.gen(&format!("{tmp} == {value}"));
                }
                if self.kind() == TokKind::Comma {
                    self.next();
                    self.cgen.gen(" || ");
                } else {
                    break;
                }
            }
            self.cgen.genln(") {");
            self.check(TokKind::LCbr)?;
            self.open_scope();
            while self.kind() != TokKind::RCbr {
                self.statement()?;
            }
            self.next();
            self.close_scope()?;
            self.cgen.genln("}");
        }
        self.next();
        self.cgen.genln("}");
        if first && !saw_else {
            self.type_error("`match` must have at least one case")?;
        }
        Ok(())
    }

    fn return_stmt(&mut self) -> Result<(), CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        self.check(TokKind::KeyReturn)?;

        if self.cur_fn_ret.is_void() && !self.cur_fn_opt {
            self.emit_defers();
            self.cgen.genln("return;");
            return Ok(());
        }

        if self.cur_fn_opt {
            if self.kind() == TokKind::KeyNone {
                self.next();
                self.emit_defers();
                self.cgen.genln("return opt_none();");
                return Ok(());
            }
            if self.kind() == TokKind::Name
                && self.tok().lit == "error"
                && self.peek().kind == TokKind::LPar
            {
                self.next();
                self.next();
                self.cgen.start_tmp();
                let mt = self.bool_expression()?;
                let msg = self.cgen.end_tmp();
                if self.pass == Pass::Main && !mt.is_string() {
                    self.type_error_at(format!("error() takes a string, got `{mt}`"), line, col)?;
                }
                self.check(TokKind::RPar)?;
                self.emit_defers();
                self.cgen.genln(&format!("return opt_err({msg});"));
                return Ok(());
            }
            self.cgen.start_tmp();
            let vt = self.bool_expression()?;
            let val = self.cgen.end_tmp();
            if self.pass == Pass::Main && !self.table.check_types(&self.cur_fn_ret.clone(), &vt) {
                self.type_error_at(
                    format!("cannot return `{vt}` from a function returning `?{}`", self.cur_fn_ret),
                    line,
                    col,
                )?;
            }
            let c = self.cur_fn_ret.cname();
            self.emit_defers();
            self.cgen
                .genln(&format!("return opt_ok(&({c}){{ {val} }}, sizeof({c}));"));
            return Ok(());
        }

        if let TypeExpr::Multi(parts) = self.cur_fn_ret.clone() {
            let mut vals = Vec::new();
            loop {
                self.cgen.start_tmp();
                let t = self.bool_expression()?;
                vals.push((t, self.cgen.end_tmp()));
                if self.kind() == TokKind::Comma {
                    self.next();
                } else {
                    break;
                }
            }
            if self.pass == Pass::Main {
                if vals.len() != parts.len() {
                    self.type_error_at(
                        format!("expected {} return values, got {}", parts.len(), vals.len()),
                        line,
                        col,
                    )?;
                }
                for (i, (t, _)) in vals.iter().enumerate() {
                    if let Some(expected) = parts.get(i) {
                        if !self.table.check_types(expected, t) {
                            let msg = format!(
                                "return value {} has type `{t}`, expected `{expected}`",
                                i + 1
                            );
                            self.type_error_at(msg, line, col)?;
                        }
                    }
                }
            }
            let fields = vals
                .iter()
                .enumerate()
                .map(|(i, (_, text))| format!(".f{i} = {text}"))
                .collect::<Vec<_>>()
                .join(", ");
            self.emit_defers();
            self.cgen.genln(&format!(
                "return ({}){{{fields}}};",
                self.cur_fn_ret.mangled()
            ));
            return Ok(());
        }

        self.cgen.start_tmp();
        let vt = self.bool_expression()?;
        let val = self.cgen.end_tmp();
        if self.pass == Pass::Main && !self.table.check_types(&self.cur_fn_ret.clone(), &vt) {
            self.type_error_at(
                format!(
                    "cannot return `{vt}` from a function returning `{}`",
                    self.cur_fn_ret
                ),
                line,
                col,
            )?;
        }
        if let Some(v) = self.find_local_mut(&val) {
            v.is_returned = true;
            v.is_used = true;
        }
        self.emit_defers();
        self.cgen.genln(&format!("return {val};"));
        Ok(())
    }

    fn defer_stmt(&mut self) -> Result<(), CoreError> {
        self.check(TokKind::KeyDefer)?;
        self.check(TokKind::LCbr)?;
        self.cgen.start_tmp();
        while self.kind() != TokKind::RCbr {
            self.statement()?;
        }
        self.next();
        let text = self.cgen.end_tmp();
        self.defers.push(text);
        Ok(())
    }
}
