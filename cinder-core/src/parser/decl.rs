//! Top-level declarations: functions, structs, enums, interfaces, consts
//! and type aliases.
//!
//! The generic monomorphization driver also lives here: a generic function
//! is parsed normally during the declaration pass, and during the main pass
//! its token span is replayed once per concrete type recorded at call
//! sites, with the ambient generic type bound so `T` resolves concretely.

use crate::error::CoreError;
use crate::scanner::TokKind;
use crate::table::{Field, Fn, Pass, Type, TypeCat, Var};
use crate::typeexpr::TypeExpr;

use super::Parser;

impl Parser<'_> {
    pub(super) fn fn_decl(&mut self, is_pub: bool) -> Result<(), CoreError> {
        let decl_start = self.pos;
        self.check(TokKind::KeyFn)?;

        // Optional receiver: `fn (p Point) translate(...)`.
        let mut receiver: Option<(String, TypeExpr, bool)> = None;
        if self.kind() == TokKind::LPar {
            self.next();
            let mut rec_mut = false;
            if self.kind() == TokKind::KeyMut {
                self.next();
                rec_mut = true;
            }
            let rname = self.check_name()?;
            let rtyp = self.parse_type()?;
            self.check(TokKind::RPar)?;
            receiver = Some((rname, rtyp, rec_mut));
        }

        let (line, col) = (self.tok().line, self.tok().col);
        let mut is_c = false;
        let raw_name = if self.kind() == TokKind::Name
            && self.tok().lit == "C"
            && self.peek().kind == TokKind::Dot
        {
            self.next();
            self.next();
            is_c = true;
            self.check_name()?
        } else {
            self.check_name()?
        };

        let mut is_generic = false;
        if self.kind() == TokKind::Lt {
            self.next();
            let tp = self.check_name()?;
            if tp != "T" {
                return Err(self.parse_error("generic type parameter must be named `T`"));
            }
            self.check(TokKind::Gt)?;
            is_generic = true;
        }

        let receiver_type = receiver.as_ref().map(|(_, t, _)| t.mangled());
        let base_name = if let Some(rt) = &receiver_type {
            format!("{rt}_{raw_name}")
        } else if is_c {
            raw_name.clone()
        } else if raw_name == "main" && self.mod_name == "main" {
            // The user entry point; the wrapper `main` is emitted by the
            // driver.
            "cdr_main".to_string()
        } else {
            self.prepend_mod(&raw_name)
        };
        let cname = match (&is_generic, &self.cur_generic_type) {
            (true, Some(g)) => format!("{}_{}", base_name, g.mangled()),
            _ => base_name.clone(),
        };

        // Arguments, with the receiver lowered to a leading pointer.
        self.check(TokKind::LPar)?;
        let mut args: Vec<Var> = Vec::new();
        if let Some((rname, rtyp, rmut)) = &receiver {
            let mut v = Var::new(rname.clone(), TypeExpr::pointer(rtyp.clone()));
            v.is_arg = true;
            v.is_mut = *rmut;
            v.is_used = true;
            args.push(v);
        }
        while self.kind() != TokKind::RPar {
            let mut arg_mut = false;
            if self.kind() == TokKind::KeyMut {
                self.next();
                arg_mut = true;
            }
            // `a, b int` declares both names with the shared type.
            let mut names = vec![self.check_name()?];
            while self.kind() == TokKind::Comma {
                self.next();
                names.push(self.check_name()?);
            }
            let typ = self.parse_type()?;
            for n in names {
                let mut v = Var::new(n, typ.clone());
                v.is_arg = true;
                v.is_mut = arg_mut;
                args.push(v);
            }
            if self.kind() == TokKind::Comma {
                self.next();
            }
        }
        self.check(TokKind::RPar)?;

        // Return type: none, `?T`, a single type, or `(a, b)` multi-value.
        let mut returns_option = false;
        let mut ret = TypeExpr::void();
        if self.kind() == TokKind::LPar {
            self.next();
            let mut parts = vec![self.parse_type()?];
            while self.kind() == TokKind::Comma {
                self.next();
                parts.push(self.parse_type()?);
            }
            self.check(TokKind::RPar)?;
            ret = TypeExpr::Multi(parts);
            self.register_multi(&ret);
        } else if self.kind() == TokKind::Question {
            match self.parse_type()? {
                TypeExpr::Option(inner) => {
                    returns_option = true;
                    ret = *inner;
                }
                other => ret = other,
            }
        } else if self.is_type_start() {
            ret = self.parse_type()?;
        }

        let rec = Fn {
            name: cname.clone(),
            module: self.mod_name.clone(),
            args: args.clone(),
            ret: ret.clone(),
            is_method: receiver.is_some(),
            receiver: receiver.as_ref().map(|(_, t, _)| TypeExpr::pointer(t.clone())),
            is_c,
            is_interface: false,
            is_public: is_pub,
            returns_option,
            is_generic: is_generic && self.cur_generic_type.is_none(),
        };
        if self.pass == Pass::Decl {
            if !is_c && self.table.find_fn(&cname).is_some() {
                self.hard_type_error_at(format!("function `{raw_name}` redefined"), line, col)?;
            }
            self.table.register_fn(rec.clone());
            if is_generic {
                self.table.register_generic_fn(&base_name);
            }
        } else {
            self.table.register_fn(rec.clone());
        }
        if let Some(rt) = &receiver_type {
            self.table.add_method(rt, rec);
        }

        if is_c {
            // Declaration only; the definition comes from a C header.
            return Ok(());
        }

        // Monomorphization driver: on the main pass, replay the whole
        // declaration once per concrete type discovered at call sites.
        if is_generic && self.cur_generic_type.is_none() {
            if self.pass == Pass::Main {
                let insts = self.table.generic_fn_types(&base_name).to_vec();
                if insts.is_empty() {
                    return self.skip_block();
                }
                for g in insts {
                    self.cur_generic_type = Some(g);
                    self.goto(decl_start);
                    self.fn_decl(is_pub)?;
                }
                self.cur_generic_type = None;
                return Ok(());
            }
            // Declaration pass falls through: walking the body once finds
            // instantiations of other generics made from inside this one.
        }

        let ret_c = if returns_option {
            "CdrOption".to_string()
        } else {
            ret.cname()
        };
        let params = if args.is_empty() {
            "void".to_string()
        } else {
            args.iter()
                .map(|a| format!("{} {}", a.typ.cname(), a.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.cgen.cur_file = self.file.to_string();
        self.cgen.cur_line = self.tok().line;
        self.cgen.genln(&format!("{ret_c} {cname}({params}) {{"));

        self.cur_fn_ret = ret;
        self.cur_fn_opt = returns_option;
        self.defers.clear();
        self.loop_depth = 0;
        self.open_scope();
        for arg in args {
            self.register_local(arg)?;
        }
        self.check(TokKind::LCbr)?;
        while self.kind() != TokKind::RCbr {
            if self.kind() == TokKind::Eof {
                return Err(self.parse_error("unexpected end of file in function body"));
            }
            self.statement()?;
        }
        self.next();
        self.emit_defers();
        self.defers.clear();
        self.close_scope()?;
        self.cgen.genln("}");
        Ok(())
    }

    /// Registers the synthesized aggregate for a multi-value return.
    fn register_multi(&mut self, multi: &TypeExpr) {
        let TypeExpr::Multi(parts) = multi else {
            return;
        };
        let name = multi.mangled();
        if self.table.known_type(&name) {
            return;
        }
        let mut t = Type::placeholder(&name);
        t.cat = TypeCat::Struct;
        t.module = "builtin".to_string();
        for (i, part) in parts.iter().enumerate() {
            t.fields.push(Field {
                name: format!("f{i}"),
                typ: part.clone(),
                is_mut: false,
                is_pub: true,
            });
        }
        let _ = self.table.rewrite_type(t);
    }

    pub(super) fn struct_decl(&mut self, is_pub: bool) -> Result<(), CoreError> {
        self.check(TokKind::KeyStruct)?;
        let (line, col) = (self.tok().line, self.tok().col);
        let raw = self.check_name()?;
        let name = self.prepend_mod(&raw);
        let mut parent = None;
        if self.kind() == TokKind::Colon {
            self.next();
            parent = Some(self.parse_type()?.mangled());
        }
        self.check(TokKind::LCbr)?;
        let mut fields = Vec::new();
        while self.kind() != TokKind::RCbr {
            // Fields are module-private unless marked `pub` themselves.
            let mut is_field_pub = false;
            let mut is_field_mut = false;
            if self.kind() == TokKind::KeyPub {
                self.next();
                is_field_pub = true;
            }
            if self.kind() == TokKind::KeyMut {
                self.next();
                is_field_mut = true;
            }
            let mut names = vec![self.check_name()?];
            while self.kind() == TokKind::Comma {
                self.next();
                names.push(self.check_name()?);
            }
            let typ = self.parse_type()?;
            for n in names {
                fields.push(Field {
                    name: n,
                    typ: typ.clone(),
                    is_mut: is_field_mut,
                    is_pub: is_field_pub,
                });
            }
        }
        self.next();
        if self.pass == Pass::Decl {
            let mut t = Type::placeholder(&name);
            t.cat = TypeCat::Struct;
            t.module = self.mod_name.clone();
            t.parent = parent;
            t.is_public = is_pub;
            if let Err(msg) = self.table.rewrite_type(t) {
                self.hard_type_error_at(msg, line, col)?;
            }
            for f in fields {
                if let Err(msg) = self.table.add_field(&name, f) {
                    self.hard_type_error_at(msg, line, col)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn enum_decl(&mut self, is_pub: bool) -> Result<(), CoreError> {
        self.check(TokKind::KeyEnum)?;
        let (line, col) = (self.tok().line, self.tok().col);
        let raw = self.check_name()?;
        let name = self.prepend_mod(&raw);
        self.check(TokKind::LCbr)?;
        let mut vals = Vec::new();
        while self.kind() != TokKind::RCbr {
            vals.push(self.check_name()?);
            if self.kind() == TokKind::Comma {
                self.next();
            }
        }
        self.next();
        if self.pass == Pass::Decl {
            let mut t = Type::placeholder(&name);
            t.cat = TypeCat::Enum;
            t.module = self.mod_name.clone();
            t.is_public = is_pub;
            t.enum_vals = vals;
            if let Err(msg) = self.table.rewrite_type(t) {
                self.hard_type_error_at(msg, line, col)?;
            }
        }
        Ok(())
    }

    pub(super) fn interface_decl(&mut self, is_pub: bool) -> Result<(), CoreError> {
        self.check(TokKind::KeyInterface)?;
        let (line, col) = (self.tok().line, self.tok().col);
        let raw = self.check_name()?;
        let name = self.prepend_mod(&raw);
        self.check(TokKind::LCbr)?;
        let mut methods = Vec::new();
        while self.kind() != TokKind::RCbr {
            // Method signatures keep their raw names; conformance lookup
            // mangles them per concrete type.
            let mname = self.check_name()?;
            self.check(TokKind::LPar)?;
            let mut margs = Vec::new();
            while self.kind() != TokKind::RPar {
                let pname = self.check_name()?;
                let ptyp = self.parse_type()?;
                let mut v = Var::new(pname, ptyp);
                v.is_arg = true;
                margs.push(v);
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
            let mut m = Fn::new(mname, self.mod_name.clone(), ret);
            m.args = margs;
            m.is_interface = true;
            m.is_public = is_pub;
            methods.push(m);
        }
        self.next();
        if self.pass == Pass::Decl {
            let mut t = Type::placeholder(&name);
            t.cat = TypeCat::Interface;
            t.module = self.mod_name.clone();
            t.is_public = is_pub;
            t.methods = methods;
            if let Err(msg) = self.table.rewrite_type(t) {
                self.hard_type_error_at(msg, line, col)?;
            }
        }
        Ok(())
    }

    pub(super) fn const_decl(&mut self, _is_pub: bool) -> Result<(), CoreError> {
        self.check(TokKind::KeyConst)?;
        let grouped = self.kind() == TokKind::LPar;
        if grouped {
            self.next();
        }
        loop {
            let (line, col) = (self.tok().line, self.tok().col);
            let raw = self.check_name()?;
            let name = self.prepend_mod(&raw);
            self.check(TokKind::Assign)?;
            self.cgen.start_tmp();
            let typ = self.bool_expression()?;
            let text = self.cgen.end_tmp();
            if self.pass == Pass::Decl {
                let mut v = Var::new(name.clone(), typ);
                v.is_const = true;
                v.is_global = true;
                v.line = line;
                v.col = col;
                if let Err(msg) = self.table.register_const(v) {
                    self.hard_type_error_at(msg, line, col)?;
                }
                self.table.add_const_def(format!("#define {name} ({text})"));
            }
            if !grouped {
                break;
            }
            if self.kind() == TokKind::RPar {
                self.next();
                break;
            }
        }
        Ok(())
    }

    pub(super) fn type_alias_decl(&mut self, is_pub: bool) -> Result<(), CoreError> {
        self.check(TokKind::KeyType)?;
        let (line, col) = (self.tok().line, self.tok().col);
        let raw = self.check_name()?;
        let name = self.prepend_mod(&raw);
        let base = self.parse_type()?;
        if !matches!(base, TypeExpr::Primitive(_) | TypeExpr::Named(_)) {
            self.type_error_at("type alias base must be a named type", line, col)?;
        }
        if self.pass == Pass::Decl {
            let mut t = Type::placeholder(&name);
            t.cat = TypeCat::Alias;
            t.module = self.mod_name.clone();
            t.is_public = is_pub;
            t.parent = Some(base.mangled());
            if let Err(msg) = self.table.rewrite_type(t) {
                self.hard_type_error_at(msg, line, col)?;
            }
        }
        Ok(())
    }
}
