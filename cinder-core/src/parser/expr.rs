//! Expressions.
//!
//! A precedence-climbing chain: `bool_expression` (logical) over `bterm`
//! (comparison) over `expression` (additive and bitwise) over `term`
//! (multiplicative) over `unary` over `factor` (primary plus postfix).
//! Each layer emits C text as it parses; operators that change spelling on
//! string or array operands (`==` to `string_eq`, `+` to `string_add`,
//! `<<` to `array_push`) rewrite the already-emitted left operand through a
//! placeholder recorded at the start of the layer.

use crate::scanner::TokKind;
use crate::error::CoreError;
use crate::table::{Pass, Type, TypeCat};
use crate::typeexpr::{Primitive, TypeExpr};

use super::Parser;

/// Replaces the generic placeholder `T` with the concrete type argument.
fn subst_generic(typ: &TypeExpr, g: &TypeExpr) -> TypeExpr {
    match typ {
        TypeExpr::Named(n) if n == "T" => g.clone(),
        TypeExpr::Pointer(inner) => TypeExpr::pointer(subst_generic(inner, g)),
        TypeExpr::Array(elem) => TypeExpr::array_of(subst_generic(elem, g)),
        TypeExpr::Option(inner) => TypeExpr::option_of(subst_generic(inner, g)),
        other => other.clone(),
    }
}

impl Parser<'_> {
    pub(super) fn bool_expression(&mut self) -> Result<TypeExpr, CoreError> {
        let mut typ = self.bterm()?;
        while matches!(self.kind(), TokKind::AndAnd | TokKind::OrOr) {
            let op = self.kind();
            let (line, col) = (self.tok().line, self.tok().col);
            if self.pass == Pass::Main && !typ.is_bool() {
                self.type_error_at(
                    format!("operand of `{}` must be `bool`, got `{typ}`", op.c_op()),
                    line,
                    col,
                )?;
            }
            self.next();
            self.cgen.gen(&format!(" {} ", op.c_op()));
            let rt = self.bterm()?;
            if self.pass == Pass::Main && !rt.is_bool() {
                self.type_error_at(
                    format!("operand of `{}` must be `bool`, got `{rt}`", op.c_op()),
                    line,
                    col,
                )?;
            }
            typ = TypeExpr::bool();
        }
        Ok(typ)
    }

    /// One comparison layer; comparisons do not chain.
    fn bterm(&mut self) -> Result<TypeExpr, CoreError> {
        let p = self.cgen.add_placeholder();
        let lt = self.expression()?;
        let op = self.kind();
        if !matches!(
            op,
            TokKind::Eq | TokKind::Ne | TokKind::Lt | TokKind::Gt | TokKind::Le | TokKind::Ge
        ) {
            return Ok(lt);
        }
        let (line, col) = (self.tok().line, self.tok().col);
        self.next();
        let string_cmp = lt.is_string() && matches!(op, TokKind::Eq | TokKind::Ne);
        if string_cmp {
            let head = if op == TokKind::Ne {
                "!string_eq("
            } else {
                "string_eq("
            };
            self.cgen.set_placeholder(p, head);
            self.cgen.gen(", ");
        } else {
            self.cgen.gen(&format!(" {} ", op.c_op()));
        }
        let rt = self.expression()?;
        if string_cmp {
            self.cgen.gen(")");
        }
        if self.pass == Pass::Main && !self.table.check_types(&lt, &rt) {
            self.type_error_at(format!("cannot compare `{lt}` and `{rt}`"), line, col)?;
        }
        Ok(TypeExpr::bool())
    }

    /// Additive and bitwise operators, plus the string and array rewrites.
    pub(super) fn expression(&mut self) -> Result<TypeExpr, CoreError> {
        let p = self.cgen.add_placeholder();
        let mut typ = self.term()?;
        loop {
            let op = self.kind();
            match op {
                TokKind::Plus if typ.is_string() => {
                    let (line, col) = (self.tok().line, self.tok().col);
                    self.next();
                    self.cgen.set_placeholder(p, "string_add(");
                    self.cgen.gen(", ");
                    let rt = self.term()?;
                    self.cgen.gen(")");
                    if self.pass == Pass::Main && !rt.is_string() {
                        self.type_error_at(
                            format!("cannot concatenate `string` and `{rt}`"),
                            line,
                            col,
                        )?;
                    }
                }
                TokKind::Lsh if matches!(typ, TypeExpr::Array(_)) => {
                    return self.array_push(p, typ);
                }
                TokKind::Plus
                | TokKind::Minus
                | TokKind::Pipe
                | TokKind::Xor
                | TokKind::Amp
                | TokKind::Lsh
                | TokKind::Rsh => {
                    let (line, col) = (self.tok().line, self.tok().col);
                    self.next();
                    self.cgen.gen(&format!(" {} ", op.c_op()));
                    let rt = self.term()?;
                    if self.pass == Pass::Main && !self.table.check_types(&typ, &rt) {
                        self.type_error_at(
                            format!("mismatched operands `{typ}` and `{rt}`"),
                            line,
                            col,
                        )?;
                    }
                }
                _ => return Ok(typ),
            }
        }
    }

    /// `arr << value`, rewritten to a runtime push through the left
    /// operand's placeholder.
    fn array_push(&mut self, p: usize, typ: TypeExpr) -> Result<TypeExpr, CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        let elem = match &typ {
            TypeExpr::Array(elem) => (**elem).clone(),
            _ => TypeExpr::int(),
        };
        let lhs = self.cgen.cur_text()[p..].to_string();
        let mut immutable = false;
        if let Some(v) = self.find_local_mut(&lhs) {
            if !v.is_mut {
                immutable = true;
            }
            v.is_used = true;
            v.is_changed = true;
        }
        if immutable {
            self.type_error_at(
                format!("cannot assign to immutable `{lhs}`, declare it with `mut`"),
                line,
                col,
            )?;
        }
        self.next();
        self.cgen.set_placeholder(p, "array_push(&");
        self.cgen.gen(&format!(", &({}){{", elem.cname()));
        let rt = self.term()?;
        self.cgen.gen("})");
        if self.pass == Pass::Main && !self.table.check_types(&elem, &rt) {
            self.type_error_at(
                format!("cannot push `{rt}` onto `{typ}`"),
                line,
                col,
            )?;
        }
        Ok(TypeExpr::void())
    }

    fn term(&mut self) -> Result<TypeExpr, CoreError> {
        let typ = self.unary()?;
        let mut out = typ;
        while matches!(self.kind(), TokKind::Mul | TokKind::Div | TokKind::Mod) {
            let op = self.kind();
            let (line, col) = (self.tok().line, self.tok().col);
            self.next();
            self.cgen.gen(&format!(" {} ", op.c_op()));
            let rt = self.unary()?;
            if self.pass == Pass::Main && (!out.is_numeric() || !rt.is_numeric()) {
                self.type_error_at(
                    format!("operator `{}` needs numeric operands", op.c_op()),
                    line,
                    col,
                )?;
            }
            out = if out.is_numeric() { out } else { rt };
        }
        Ok(out)
    }

    fn unary(&mut self) -> Result<TypeExpr, CoreError> {
        match self.kind() {
            TokKind::Not => {
                let (line, col) = (self.tok().line, self.tok().col);
                self.next();
                self.cgen.gen("!");
                let t = self.unary()?;
                if self.pass == Pass::Main && !t.is_bool() {
                    self.type_error_at(format!("`!` needs a `bool`, got `{t}`"), line, col)?;
                }
                Ok(TypeExpr::bool())
            }
            TokKind::Minus => {
                self.next();
                self.cgen.gen("-");
                self.unary()
            }
            TokKind::BitNot => {
                self.next();
                self.cgen.gen("~");
                self.unary()
            }
            TokKind::Amp => {
                self.next();
                self.cgen.gen("&");
                Ok(TypeExpr::pointer(self.unary()?))
            }
            TokKind::Mul => {
                let (line, col) = (self.tok().line, self.tok().col);
                self.next();
                self.cgen.gen("*");
                match self.unary()? {
                    TypeExpr::Pointer(inner) => Ok(*inner),
                    other => {
                        self.type_error_at(
                            format!("cannot dereference `{other}`"),
                            line,
                            col,
                        )?;
                        Ok(other)
                    }
                }
            }
            _ => self.factor(),
        }
    }

    /// A primary expression followed by any chain of `.member` and `[index]`
    /// accesses. The placeholder marks where the primary began, so a postfix
    /// form that must wrap its base (method calls, array reads) can rewrite
    /// the emitted text.
    fn factor(&mut self) -> Result<TypeExpr, CoreError> {
        let p_start = self.cgen.add_placeholder();
        let mut typ = self.primary()?;
        loop {
            match self.kind() {
                TokKind::Dot => typ = self.member_access(typ, p_start)?,
                TokKind::LSbr => typ = self.index_access(typ, p_start)?,
                _ => return Ok(typ),
            }
        }
    }

    fn primary(&mut self) -> Result<TypeExpr, CoreError> {
        match self.kind() {
            TokKind::Number => {
                let lit = self.tok().lit.clone();
                self.next();
                let lower = lit.to_ascii_lowercase();
                if let Some(digits) = lower.strip_prefix("0b") {
                    let val = i64::from_str_radix(digits, 2).unwrap_or(0);
                    self.cgen.gen(&val.to_string());
                    Ok(TypeExpr::int())
                } else if let Some(digits) = lower.strip_prefix("0o") {
                    self.cgen.gen(&format!("0{digits}"));
                    Ok(TypeExpr::int())
                } else if lower.starts_with("0x") {
                    self.cgen.gen(&lit);
                    Ok(TypeExpr::int())
                } else if lit.contains('.') || lower.contains('e') {
                    self.cgen.gen(&lit);
                    Ok(TypeExpr::Primitive(Primitive::F64))
                } else {
                    self.cgen.gen(&lit);
                    Ok(TypeExpr::int())
                }
            }
            TokKind::KeyTrue => {
                self.next();
                self.cgen.gen("true");
                Ok(TypeExpr::bool())
            }
            TokKind::KeyFalse => {
                self.next();
                self.cgen.gen("false");
                Ok(TypeExpr::bool())
            }
            TokKind::CharLit => {
                let lit = self.tok().lit.clone();
                self.next();
                self.cgen.gen(&format!("'{lit}'"));
                Ok(TypeExpr::Primitive(Primitive::Rune))
            }
            TokKind::Str => {
                let lit = self.tok().lit.clone();
                self.next();
                self.cgen.gen(&format!("_S(\"{lit}\")"));
                Ok(TypeExpr::string())
            }
            TokKind::StrInter => self.interpolated_string(),
            TokKind::KeyNone => {
                self.type_error("`none` is only valid as an optional return value")?;
                self.next();
                self.cgen.gen("opt_none()");
                Ok(TypeExpr::option_of(TypeExpr::int()))
            }
            TokKind::LPar => {
                self.next();
                self.cgen.gen("(");
                let saved = self.no_block_init;
                self.no_block_init = false;
                let typ = self.bool_expression()?;
                self.no_block_init = saved;
                self.check(TokKind::RPar)?;
                self.cgen.gen(")");
                Ok(typ)
            }
            TokKind::LSbr => self.array_literal(),
            TokKind::KeyIf => self.if_expression(),
            TokKind::Name => self.primary_name(),
            _ => Err(self.parse_error(format!(
                "expected an expression, found {}",
                self.tok_str()
            ))),
        }
    }

    /// Interpolated string: pieces become the format string, each embedded
    /// expression becomes a `_STR` argument.
    fn interpolated_string(&mut self) -> Result<TypeExpr, CoreError> {
        let mut fmt = String::new();
        let mut args: Vec<String> = Vec::new();
        loop {
            fmt.push_str(&self.tok().lit.replace('%', "%%"));
            let last = self.kind() == TokKind::Str;
            self.next();
            if last {
                break;
            }
            self.cgen.start_tmp();
            let t = self.bool_expression()?;
            let text = self.cgen.end_tmp();
            fmt.push_str(t.format_spec());
            if t.is_string() {
                args.push(format!("{text}.len, {text}.str"));
            } else {
                args.push(text);
            }
        }
        self.cgen.gen(&format!("_STR(\"{fmt}\", {})", args.join(", ")));
        Ok(TypeExpr::string())
    }

    /// `[a, b, c]`: the backing C array is hoisted above the current
    /// statement and handed to the runtime. `[]T{}` spells an empty array.
    fn array_literal(&mut self) -> Result<TypeExpr, CoreError> {
        if self.peek().kind == TokKind::RSbr {
            self.next();
            self.next();
            let elem = self.parse_type()?;
            self.check(TokKind::LCbr)?;
            self.check(TokKind::RCbr)?;
            self.cgen
                .gen(&format!("new_array(sizeof({}))", elem.cname()));
            return Ok(TypeExpr::array_of(elem));
        }
        self.next();
        let mut elem = TypeExpr::int();
        let mut texts = Vec::new();
        while self.kind() != TokKind::RSbr {
            let (line, col) = (self.tok().line, self.tok().col);
            self.cgen.start_tmp();
            let t = self.bool_expression()?;
            let text = self.cgen.end_tmp();
            if texts.is_empty() {
                elem = t;
            } else if self.pass == Pass::Main && !self.table.check_types(&elem, &t) {
                self.type_error_at(
                    format!("array elements must all be `{elem}`, got `{t}`"),
                    line,
                    col,
                )?;
            }
            texts.push(text);
            if self.kind() == TokKind::Comma {
                self.next();
            }
        }
        self.next();
        let tmp = self.next_tmp();
        let c = elem.cname();
        self.cgen
            .insert_before(&format!("{c} {tmp}[] = {{{}}};", texts.join(", ")));
        self.cgen.gen(&format!(
            "new_array_from({}, sizeof({c}), {tmp})",
            texts.len()
        ));
        Ok(TypeExpr::array_of(elem))
    }

    /// `if cond { a } else { b }` in value position, lowered to a ternary.
    fn if_expression(&mut self) -> Result<TypeExpr, CoreError> {
        self.check(TokKind::KeyIf)?;
        self.cgen.gen("((");
        let (line, col) = (self.tok().line, self.tok().col);
        let saved = self.no_block_init;
        self.no_block_init = true;
        let ct = self.bool_expression()?;
        self.no_block_init = saved;
        if self.pass == Pass::Main && !ct.is_bool() {
            self.type_error_at(format!("`if` condition must be `bool`, got `{ct}`"), line, col)?;
        }
        self.cgen.gen(") ? (");
        self.check(TokKind::LCbr)?;
        let then_t = self.bool_expression()?;
        self.check(TokKind::RCbr)?;
        self.cgen.gen(") : (");
        self.check(TokKind::KeyElse)?;
        self.check(TokKind::LCbr)?;
        let (eline, ecol) = (self.tok().line, self.tok().col);
        let else_t = self.bool_expression()?;
        self.check(TokKind::RCbr)?;
        self.cgen.gen("))");
        if self.pass == Pass::Main && !self.table.check_types(&then_t, &else_t) {
            self.type_error_at(
                format!("if expression branches disagree: `{then_t}` and `{else_t}`"),
                eline,
                ecol,
            )?;
        }
        Ok(then_t)
    }

    fn primary_name(&mut self) -> Result<TypeExpr, CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        let name = self.tok().lit.clone();

        // C interop: `C.name(...)` calls straight through, unmangled.
        if name == "C" && self.peek().kind == TokKind::Dot {
            self.next();
            self.next();
            let member = self.check_name()?;
            return self.fn_call(&format!("C.{member}"), &[member], line, col);
        }

        // Empty map literal `map[string]T{}`.
        if name == "map" && self.peek().kind == TokKind::LSbr {
            let typ = self.parse_type()?;
            self.check(TokKind::LCbr)?;
            self.check(TokKind::RCbr)?;
            if let TypeExpr::Map(_, val) = &typ {
                self.cgen.gen(&format!("new_map(sizeof({}))", val.cname()));
            }
            return Ok(typ);
        }

        // Locals shadow functions, consts and types.
        if self.find_local(&name).is_some() {
            self.next();
            if let Some(v) = self.find_local_mut(&name) {
                v.is_used = true;
            }
            let typ = self
                .find_local(&name)
                .map(|v| v.typ.clone())
                .unwrap_or_else(TypeExpr::int);
            if let TypeExpr::Fn { params, ret } = &typ {
                if self.kind() == TokKind::LPar {
                    return self.fn_value_call(&name, params.clone(), (**ret).clone());
                }
            }
            self.cgen.gen(&name);
            return Ok(typ);
        }

        // Module-qualified member through an import alias.
        let imported = self.peek().kind == TokKind::Dot
            && self
                .table
                .file_imports(self.file)
                .is_some_and(|t| t.known(&name));
        if imported {
            self.table.file_imports_mut(self.file).mark_used(&name);
            let module = self
                .table
                .file_imports(self.file)
                .and_then(|t| t.resolve(&name).map(str::to_string))
                .unwrap_or_default();
            self.next();
            self.next();
            let member = self.check_name()?;
            let full = format!("{module}__{member}");
            if self.kind() == TokKind::LPar
                || (self.kind() == TokKind::Lt && self.table.is_generic_fn(&full))
            {
                return self.fn_call(&format!("{name}.{member}"), &[full], line, col);
            }
            if let Some(c) = self.table.find_const(&full) {
                let typ = c.typ.clone();
                self.cgen.gen(&full);
                return Ok(typ);
            }
            if self.table.known_type(&full) {
                return self.known_type_ref(&full, line, col);
            }
            self.type_error_at(format!("unknown identifier `{name}.{member}`"), line, col)?;
            self.cgen.gen(&full);
            return Ok(TypeExpr::int());
        }

        // Primitive-name cast: `f64(x)`.
        if let Some(p) = Primitive::from_name(&name) {
            if self.peek().kind == TokKind::LPar {
                self.next();
                self.next();
                self.cgen.gen(&format!("({name})("));
                self.bool_expression()?;
                self.check(TokKind::RPar)?;
                self.cgen.gen(")");
                return Ok(TypeExpr::Primitive(p));
            }
        }

        let mangled = self.prepend_mod(&name);
        if self.kind() == TokKind::Name {
            // Still on the name token; calls consume it here.
            if self.peek().kind == TokKind::Lt && self.table.is_generic_fn(&mangled) {
                self.next();
                return self.fn_call(&name, &[mangled], line, col);
            }
            if self.peek().kind == TokKind::LPar {
                self.next();
                return self.fn_call(&name, &[mangled, name.clone()], line, col);
            }
        }
        if let Some(c) = self.table.find_const(&mangled) {
            let typ = c.typ.clone();
            self.next();
            self.cgen.gen(&mangled);
            return Ok(typ);
        }
        if self
            .table
            .find_type(&mangled)
            .is_some_and(|t| !matches!(t.cat, TypeCat::Placeholder | TypeCat::Builtin))
        {
            self.next();
            return self.known_type_ref(&mangled, line, col);
        }
        self.next();
        self.type_error_at(format!("unknown identifier `{name}`"), line, col)?;
        self.cgen.gen(&name);
        Ok(TypeExpr::int())
    }

    /// A reference to a declared type in value position: an enum value or a
    /// struct literal.
    fn known_type_ref(&mut self, name: &str, line: u32, col: u32) -> Result<TypeExpr, CoreError> {
        let cat = self
            .table
            .find_type(name)
            .map(|t| t.cat)
            .unwrap_or(TypeCat::Placeholder);
        if cat == TypeCat::Enum {
            self.check(TokKind::Dot)?;
            let val = self.check_name()?;
            let known = self
                .table
                .find_type(name)
                .is_some_and(|t| t.enum_vals.iter().any(|v| v == &val));
            if !known {
                self.type_error_at(format!("enum `{name}` has no value `{val}`"), line, col)?;
            }
            self.cgen.gen(&format!("{name}_{val}"));
            return Ok(TypeExpr::Named(name.to_string()));
        }
        if cat == TypeCat::Struct && self.kind() == TokKind::LCbr && !self.no_block_init {
            return self.struct_literal(name);
        }
        self.type_error_at(format!("`{name}` is a type, not a value"), line, col)?;
        self.cgen.gen(name);
        Ok(TypeExpr::Named(name.to_string()))
    }

    /// `User{name: 'ann', age: 30}` with C designated initializers.
    fn struct_literal(&mut self, name: &str) -> Result<TypeExpr, CoreError> {
        self.check(TokKind::LCbr)?;
        self.cgen.gen(&format!("({name}){{"));
        let mut first = true;
        while self.kind() != TokKind::RCbr {
            let (line, col) = (self.tok().line, self.tok().col);
            let fname = self.check_name()?;
            self.check(TokKind::Colon)?;
            let field = self
                .table
                .find_type(name)
                .and_then(|t| self.table.find_field(t, &fname))
                .cloned();
            if field.is_none() {
                self.type_error_at(format!("no field `{fname}` on `{name}`"), line, col)?;
            }
            if !first {
                self.cgen.gen(", ");
            }
            first = false;
            self.cgen.gen(&format!(".{fname} = "));
            let saved = self.no_block_init;
            self.no_block_init = false;
            let vt = self.bool_expression()?;
            self.no_block_init = saved;
            if let Some(f) = &field {
                if self.pass == Pass::Main && !self.table.check_types(&f.typ, &vt) {
                    self.type_error_at(
                        format!("field `{fname}` of `{name}` expects `{}`, got `{vt}`", f.typ),
                        line,
                        col,
                    )?;
                }
            }
            if self.kind() == TokKind::Comma {
                self.next();
            }
        }
        self.next();
        self.cgen.gen("}");
        Ok(TypeExpr::Named(name.to_string()))
    }

    /// A call through a function-typed local; the stored `voidptr` is cast
    /// back to its concrete signature.
    fn fn_value_call(
        &mut self,
        name: &str,
        params: Vec<TypeExpr>,
        ret: TypeExpr,
    ) -> Result<TypeExpr, CoreError> {
        let sig = if params.is_empty() {
            "void".to_string()
        } else {
            params
                .iter()
                .map(TypeExpr::cname)
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.cgen
            .gen(&format!("(({} (*)({sig})){name})(", ret.cname()));
        self.check(TokKind::LPar)?;
        let mut i = 0;
        while self.kind() != TokKind::RPar {
            if i > 0 {
                self.cgen.gen(", ");
            }
            let (line, col) = (self.tok().line, self.tok().col);
            let at = self.bool_expression()?;
            if let Some(want) = params.get(i) {
                if self.pass == Pass::Main && !self.table.check_types(want, &at) {
                    self.type_error_at(
                        format!("argument {} to `{name}` expects `{want}`, got `{at}`", i + 1),
                        line,
                        col,
                    )?;
                }
            }
            if self.kind() == TokKind::Comma {
                self.next();
            }
            i += 1;
        }
        self.next();
        self.cgen.gen(")");
        Ok(ret)
    }

    /// A free-function call. The name token is already consumed; the cursor
    /// sits on `<` for a generic instantiation or on `(`.
    pub(super) fn fn_call(
        &mut self,
        display: &str,
        candidates: &[impl AsRef<str>],
        line: u32,
        col: u32,
    ) -> Result<TypeExpr, CoreError> {
        let base = candidates[0].as_ref().to_string();
        let mut generic_arg: Option<TypeExpr> = None;
        let mut target: Option<String> = None;
        if self.kind() == TokKind::Lt && self.table.is_generic_fn(&base) {
            self.next();
            let g = self.parse_type()?;
            self.check(TokKind::Gt)?;
            self.table.register_generic_fn_type(&base, g.clone());
            target = Some(format!("{}_{}", base, g.mangled()));
            generic_arg = Some(g);
        }

        let mut resolved: Option<crate::table::Fn> = None;
        if let Some(t) = &target {
            resolved = self.table.find_fn(t).cloned();
        }
        if resolved.is_none() {
            for c in candidates {
                if let Some(f) = self.table.find_fn(c.as_ref()) {
                    resolved = Some(f.clone());
                    break;
                }
            }
        }
        if resolved.is_none() {
            self.type_error_at(format!("unknown function `{display}`"), line, col)?;
        }
        let emit_name = target
            .or_else(|| resolved.as_ref().map(|f| f.name.clone()))
            .unwrap_or(base);

        let (expected, ret, returns_option, is_c) = match &resolved {
            Some(f) => {
                let mut args = f.args.clone();
                let mut ret = f.ret.clone();
                if let Some(g) = &generic_arg {
                    for a in &mut args {
                        a.typ = subst_generic(&a.typ, g);
                    }
                    ret = subst_generic(&ret, g);
                }
                (args, ret, f.returns_option, f.is_c)
            }
            None => (Vec::new(), TypeExpr::int(), false, false),
        };

        self.check(TokKind::LPar)?;
        self.cgen.gen(&format!("{emit_name}("));
        let mut i = 0;
        while self.kind() != TokKind::RPar {
            if i > 0 {
                self.cgen.gen(", ");
            }
            let (aline, acol) = (self.tok().line, self.tok().col);
            self.cgen.start_tmp();
            let saved = self.no_block_init;
            self.no_block_init = false;
            let at = self.bool_expression()?;
            self.no_block_init = saved;
            let mut text = self.cgen.end_tmp();
            if let Some(want) = expected.get(i).map(|v| v.typ.clone()) {
                let iface = match &want {
                    TypeExpr::Named(n) => self
                        .table
                        .find_type(n)
                        .filter(|t| t.cat == TypeCat::Interface)
                        .cloned(),
                    _ => None,
                };
                if let Some(iface) = iface {
                    if at != want {
                        text = self.adapt_interface(&iface, &text, &at, aline, acol)?;
                    }
                } else if is_c && at.is_string() {
                    text.push_str(".str");
                } else if self.pass == Pass::Main && !self.table.check_types(&want, &at) {
                    self.type_error_at(
                        format!(
                            "argument {} to `{display}` expects `{want}`, got `{at}`",
                            i + 1
                        ),
                        aline,
                        acol,
                    )?;
                }
            }
            if let Some(v) = self.find_local_mut(&text) {
                v.is_used = true;
                // Passing a container by value hands over ownership.
                if matches!(v.typ, TypeExpr::Array(_) | TypeExpr::Map(_, _)) {
                    v.is_moved = true;
                }
            }
            self.cgen.gen(&text);
            if self.kind() == TokKind::Comma {
                self.next();
            }
            i += 1;
        }
        self.next();
        self.cgen.gen(")");
        if resolved.is_some() && self.pass == Pass::Main && i != expected.len() {
            let s = if expected.len() == 1 { "" } else { "s" };
            self.type_error_at(
                format!("`{display}` expects {} argument{s}, got {i}", expected.len()),
                line,
                col,
            )?;
        }
        if returns_option {
            return Ok(TypeExpr::option_of(ret));
        }
        Ok(ret)
    }

    /// Wraps a concrete value in the interface's fat struct: the object
    /// pointer plus one function pointer per method.
    fn adapt_interface(
        &mut self,
        iface: &Type,
        text: &str,
        got: &TypeExpr,
        line: u32,
        col: u32,
    ) -> Result<String, CoreError> {
        let concrete = match got {
            TypeExpr::Named(n) => self.table.find_type(n).cloned(),
            _ => None,
        };
        let Some(concrete) = concrete else {
            self.type_error_at(
                format!("`{got}` does not implement `{}`", iface.name),
                line,
                col,
            )?;
            return Ok(text.to_string());
        };
        if self.find_local(text).is_none() {
            self.type_error_at(
                format!("interface argument for `{}` must be a plain variable", iface.name),
                line,
                col,
            )?;
            return Ok(text.to_string());
        }
        let mut fields = vec![format!("._obj = (void*)&{text}")];
        for m in &iface.methods {
            if self.table.find_method(&concrete, &m.name).is_none() {
                self.type_error_at(
                    format!(
                        "`{got}` does not implement `{}` (missing `{}`)",
                        iface.name, m.name
                    ),
                    line,
                    col,
                )?;
                return Ok(text.to_string());
            }
            fields.push(format!(".{} = (void*){}_{}", m.name, concrete.name, m.name));
        }
        Ok(format!("({}){{ {} }}", iface.name, fields.join(", ")))
    }

    /// `.member` after any base: runtime fields on strings and arrays,
    /// interface dispatch, concrete method calls, struct fields.
    fn member_access(&mut self, base: TypeExpr, p_start: usize) -> Result<TypeExpr, CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        self.check(TokKind::Dot)?;
        let member = self.check_name()?;

        if base.is_string() {
            match member.as_str() {
                "len" => {
                    self.cgen.gen(".len");
                    return Ok(TypeExpr::int());
                }
                "str" => {
                    self.cgen.gen(".str");
                    return Ok(TypeExpr::named("voidptr"));
                }
                _ => {}
            }
        }
        if matches!(base, TypeExpr::Array(_)) && member == "len" {
            self.cgen.gen(".len");
            return Ok(TypeExpr::int());
        }
        if let TypeExpr::Multi(parts) = &base {
            if let Some(t) = member
                .strip_prefix('f')
                .and_then(|i| i.parse::<usize>().ok())
                .and_then(|i| parts.get(i))
            {
                self.cgen.gen(&format!(".{member}"));
                return Ok(t.clone());
            }
        }

        let (type_name, through_ptr) = match &base {
            TypeExpr::Named(n) => (n.clone(), false),
            TypeExpr::Pointer(inner) => match inner.as_ref() {
                TypeExpr::Named(n) => (n.clone(), true),
                _ => {
                    self.type_error_at(
                        format!("no field `{member}` on `{base}`"),
                        line,
                        col,
                    )?;
                    return Ok(TypeExpr::int());
                }
            },
            _ => {
                self.type_error_at(format!("no field `{member}` on `{base}`"), line, col)?;
                return Ok(TypeExpr::int());
            }
        };
        let Some(info) = self.table.find_type(&type_name).cloned() else {
            self.type_error_at(format!("no field `{member}` on `{base}`"), line, col)?;
            return Ok(TypeExpr::int());
        };

        if info.cat == TypeCat::Interface {
            if let Some(m) = info.methods.iter().find(|m| m.name == member).cloned() {
                return self.interface_dispatch(&m, &member, p_start);
            }
        }
        if self.kind() == TokKind::LPar {
            if let Some(m) = self.table.find_method(&info, &member).cloned() {
                return self.method_call(&m, &member, through_ptr, p_start, line, col);
            }
        }
        if let Some(f) = self.table.find_field(&info, &member).cloned() {
            if self.pass == Pass::Main
                && !f.is_pub
                && info.module != self.mod_name
                && info.module != "builtin"
            {
                self.type_error_at(
                    format!(
                        "field `{member}` of `{}` is private",
                        info.name.replace("__", ".")
                    ),
                    line,
                    col,
                )?;
            }
            let sep = if through_ptr { "->" } else { "." };
            self.cgen.gen(&format!("{sep}{member}"));
            return Ok(f.typ);
        }
        self.type_error_at(format!("no field `{member}` on `{base}`"), line, col)?;
        Ok(TypeExpr::int())
    }

    /// A call through an interface value: cast the stored function pointer
    /// back to its signature and pass the stored object pointer first.
    fn interface_dispatch(
        &mut self,
        m: &crate::table::Fn,
        member: &str,
        p_start: usize,
    ) -> Result<TypeExpr, CoreError> {
        self.check(TokKind::LPar)?;
        let recv = self.take_since(p_start);
        let mut sig = vec!["void*".to_string()];
        for a in &m.args {
            sig.push(a.typ.cname());
        }
        self.cgen.gen(&format!(
            "(({} (*)({}))({recv}.{member}))({recv}._obj",
            m.c_ret(),
            sig.join(", ")
        ));
        let mut i = 0;
        while self.kind() != TokKind::RPar {
            self.cgen.gen(", ");
            let (line, col) = (self.tok().line, self.tok().col);
            let at = self.bool_expression()?;
            if let Some(want) = m.args.get(i).map(|v| v.typ.clone()) {
                if self.pass == Pass::Main && !self.table.check_types(&want, &at) {
                    self.type_error_at(
                        format!("argument {} to `{member}` expects `{want}`, got `{at}`", i + 1),
                        line,
                        col,
                    )?;
                }
            }
            if self.kind() == TokKind::Comma {
                self.next();
            }
            i += 1;
        }
        self.next();
        self.cgen.gen(")");
        if self.pass == Pass::Main && i != m.args.len() {
            let s = if m.args.len() == 1 { "" } else { "s" };
            self.type_error(format!(
                "`{member}` expects {} argument{s}, got {i}",
                m.args.len()
            ))?;
        }
        if m.returns_option {
            return Ok(TypeExpr::option_of(m.ret.clone()));
        }
        Ok(m.ret.clone())
    }

    /// A concrete method call; the receiver text is rewritten into the
    /// leading pointer argument.
    fn method_call(
        &mut self,
        m: &crate::table::Fn,
        member: &str,
        through_ptr: bool,
        p_start: usize,
        line: u32,
        col: u32,
    ) -> Result<TypeExpr, CoreError> {
        self.check(TokKind::LPar)?;
        let recv = self.take_since(p_start);
        if let Some(v) = self.find_local_mut(&recv) {
            v.is_used = true;
        }
        let amp = if through_ptr { "" } else { "&" };
        self.cgen.gen(&format!("{}({amp}{recv}", m.name));
        let expected: Vec<crate::table::Var> = m.args.get(1..).unwrap_or(&[]).to_vec();
        let mut i = 0;
        while self.kind() != TokKind::RPar {
            self.cgen.gen(", ");
            let (aline, acol) = (self.tok().line, self.tok().col);
            let at = self.bool_expression()?;
            if let Some(want) = expected.get(i).map(|v| v.typ.clone()) {
                if self.pass == Pass::Main && !self.table.check_types(&want, &at) {
                    self.type_error_at(
                        format!("argument {} to `{member}` expects `{want}`, got `{at}`", i + 1),
                        aline,
                        acol,
                    )?;
                }
            }
            if self.kind() == TokKind::Comma {
                self.next();
            }
            i += 1;
        }
        self.next();
        self.cgen.gen(")");
        if self.pass == Pass::Main && i != expected.len() {
            let s = if expected.len() == 1 { "" } else { "s" };
            self.type_error_at(
                format!("`{member}` expects {} argument{s}, got {i}", expected.len()),
                line,
                col,
            )?;
        }
        if m.returns_option {
            return Ok(TypeExpr::option_of(m.ret.clone()));
        }
        Ok(m.ret.clone())
    }

    /// `[index]` and `[lo..hi]` after arrays, maps, strings and pointers.
    /// Slice bounds may be omitted on either side; the runtime treats a
    /// negative upper bound as the container length.
    fn index_access(&mut self, base: TypeExpr, p_start: usize) -> Result<TypeExpr, CoreError> {
        let (line, col) = (self.tok().line, self.tok().col);
        self.check(TokKind::LSbr)?;
        match base {
            TypeExpr::Array(elem) => {
                self.cgen.gen(", ");
                let mut is_slice = false;
                if self.kind() == TokKind::DotDot {
                    self.cgen.gen("0");
                    is_slice = true;
                    self.next();
                } else {
                    let it = self.bool_expression()?;
                    if self.pass == Pass::Main && !it.is_numeric() {
                        self.type_error_at(
                            format!("array index must be an integer, got `{it}`"),
                            line,
                            col,
                        )?;
                    }
                    if self.kind() == TokKind::DotDot {
                        is_slice = true;
                        self.next();
                    }
                }
                if is_slice {
                    self.cgen.set_placeholder(p_start, "array_slice(");
                    self.cgen.gen(", ");
                    if self.kind() == TokKind::RSbr {
                        self.cgen.gen("-1");
                    } else {
                        let ht = self.bool_expression()?;
                        if self.pass == Pass::Main && !ht.is_numeric() {
                            self.type_error_at(
                                format!("slice bound must be an integer, got `{ht}`"),
                                line,
                                col,
                            )?;
                        }
                    }
                    self.check(TokKind::RSbr)?;
                    self.cgen.gen(")");
                    return Ok(TypeExpr::array_of(*elem));
                }
                self.cgen
                    .set_placeholder(p_start, &format!("*({}*) array_get(", elem.cname()));
                self.check(TokKind::RSbr)?;
                self.cgen.gen(")");
                Ok(*elem)
            }
            TypeExpr::Map(key, val) => {
                self.cgen
                    .set_placeholder(p_start, &format!("*({}*) map_get(", val.cname()));
                self.cgen.gen(", ");
                let kt = self.bool_expression()?;
                if self.pass == Pass::Main && !self.table.check_types(&key, &kt) {
                    self.type_error_at(
                        format!("map key must be `{key}`, got `{kt}`"),
                        line,
                        col,
                    )?;
                }
                self.check(TokKind::RSbr)?;
                self.cgen.gen(")");
                Ok(*val)
            }
            ref t if t.is_string() => {
                let mut lo = String::from("0");
                let mut is_slice = false;
                if self.kind() == TokKind::DotDot {
                    is_slice = true;
                    self.next();
                } else {
                    self.cgen.start_tmp();
                    let it = self.bool_expression()?;
                    lo = self.cgen.end_tmp();
                    if self.pass == Pass::Main && !it.is_numeric() {
                        self.type_error_at(
                            format!("string index must be an integer, got `{it}`"),
                            line,
                            col,
                        )?;
                    }
                    if self.kind() == TokKind::DotDot {
                        is_slice = true;
                        self.next();
                    }
                }
                if is_slice {
                    self.cgen.set_placeholder(p_start, "string_substr(");
                    self.cgen.gen(&format!(", {lo}, "));
                    if self.kind() == TokKind::RSbr {
                        self.cgen.gen("-1");
                    } else {
                        let ht = self.bool_expression()?;
                        if self.pass == Pass::Main && !ht.is_numeric() {
                            self.type_error_at(
                                format!("slice bound must be an integer, got `{ht}`"),
                                line,
                                col,
                            )?;
                        }
                    }
                    self.check(TokKind::RSbr)?;
                    self.cgen.gen(")");
                    return Ok(TypeExpr::string());
                }
                self.cgen.gen(&format!(".str[{lo}"));
                self.check(TokKind::RSbr)?;
                self.cgen.gen("]");
                Ok(TypeExpr::Primitive(Primitive::Byte))
            }
            TypeExpr::Pointer(elem) => {
                self.cgen.gen("[");
                self.bool_expression()?;
                self.check(TokKind::RSbr)?;
                self.cgen.gen("]");
                Ok(*elem)
            }
            other => {
                self.type_error_at(format!("cannot index `{other}`"), line, col)?;
                self.bool_expression()?;
                self.check(TokKind::RSbr)?;
                Ok(TypeExpr::int())
            }
        }
    }
}
