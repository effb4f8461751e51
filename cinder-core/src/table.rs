//! The shared symbol and type database.
//!
//! One `Table` lives for a whole compiler invocation. The declaration pass
//! fills it with types, functions, consts and import tables; the main pass
//! reads it back while checking and emitting. It is never reset between
//! passes; that accumulation is how forward references across files and
//! functions resolve without a separate linking step. The table is passed as
//! `&mut` context into every parsing function; there is no global state.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::typeexpr::{Primitive, TypeExpr};

/// Which traversal of the file set is running. Type errors are suppressed
/// during `Decl` because forward references are expected to be unresolved;
/// that leniency is a load-bearing invariant, not a shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Decl,
    Main,
}

/// Hard cap on the payload of an optional value, in bytes. Oversized
/// payloads are a fatal error, never a truncation.
pub const MAX_OPTION_PAYLOAD: usize = 255;

/// A local variable, function argument, constant, or global.
#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub typ: TypeExpr,
    pub is_mut: bool,
    pub scope_level: usize,
    pub is_arg: bool,
    pub is_const: bool,
    /// Owns a heap allocation that must be released on scope close.
    pub is_alloc: bool,
    pub is_returned: bool,
    pub is_changed: bool,
    /// Ownership was transferred (assigned into a structure, passed on).
    pub is_moved: bool,
    pub is_global: bool,
    pub is_used: bool,
    pub line: u32,
    pub col: u32,
}

impl Var {
    pub fn new(name: impl Into<String>, typ: TypeExpr) -> Var {
        Var {
            name: name.into(),
            typ,
            is_mut: false,
            scope_level: 0,
            is_arg: false,
            is_const: false,
            is_alloc: false,
            is_returned: false,
            is_changed: false,
            is_moved: false,
            is_global: false,
            is_used: false,
            line: 0,
            col: 0,
        }
    }

    /// The one place the scope-close liveness rule lives: a local needs an
    /// explicit free exactly when it owns an allocation that was neither
    /// returned nor moved out, and is not storage we do not own.
    pub fn needs_free(&self) -> bool {
        self.is_alloc && !self.is_returned && !self.is_moved && !self.is_arg && !self.is_global
    }
}

/// A struct or interface field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub typ: TypeExpr,
    pub is_mut: bool,
    pub is_pub: bool,
}

/// A function or method. `name` is already mangled: methods embed their
/// receiver type (`Point_translate`), generic instantiations embed the
/// concrete type argument (`id_int`), and non-main modules their module
/// (`math__abs`).
#[derive(Debug, Clone)]
pub struct Fn {
    pub name: String,
    pub module: String,
    pub args: Vec<Var>,
    pub ret: TypeExpr,
    pub is_method: bool,
    pub receiver: Option<TypeExpr>,
    pub is_c: bool,
    pub is_interface: bool,
    pub is_public: bool,
    /// Returns `?T`: the C signature returns the fixed-capacity option
    /// struct instead of the payload type.
    pub returns_option: bool,
    pub is_generic: bool,
}

impl Fn {
    pub fn new(name: impl Into<String>, module: impl Into<String>, ret: TypeExpr) -> Fn {
        Fn {
            name: name.into(),
            module: module.into(),
            args: Vec::new(),
            ret,
            is_method: false,
            receiver: None,
            is_c: false,
            is_interface: false,
            is_public: false,
            returns_option: false,
            is_generic: false,
        }
    }

    /// The C return type spelling.
    pub fn c_ret(&self) -> String {
        if self.returns_option {
            "CdrOption".to_string()
        } else {
            self.ret.cname()
        }
    }

    /// Renders the C parameter list, receiver first for methods.
    pub fn c_params(&self) -> String {
        let mut parts = Vec::new();
        for arg in &self.args {
            parts.push(format!("{} {}", arg.typ.cname(), arg.name));
        }
        if parts.is_empty() {
            "void".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Category of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCat {
    /// Name seen (as a field type, parent, or forward use) but not yet
    /// declared. A later declaration rewrites it in place.
    Placeholder,
    Builtin,
    Struct,
    Union,
    Enum,
    Interface,
    Fn,
    CStruct,
    CTypedef,
    Array,
    Alias,
}

/// A registered type. Mutated in place as fields and methods are discovered
/// during the declaration pass.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub module: String,
    pub cat: TypeCat,
    pub fields: Vec<Field>,
    pub methods: Vec<Fn>,
    /// Alias base, or the single embedded parent whose fields and methods
    /// are visible. Lookup falls back exactly one level, never a chain.
    pub parent: Option<String>,
    pub is_public: bool,
    pub enum_vals: Vec<String>,
}

impl Type {
    pub fn placeholder(name: impl Into<String>) -> Type {
        Type {
            name: name.into(),
            module: String::new(),
            cat: TypeCat::Placeholder,
            fields: Vec::new(),
            methods: Vec::new(),
            parent: None,
            is_public: false,
            enum_vals: Vec::new(),
        }
    }
}

/// Per-source-file import aliases, plus usage tracking for the
/// unused-import diagnostic.
#[derive(Debug, Default)]
pub struct FileImportTable {
    imports: FxHashMap<String, String>,
    used: FxHashSet<String>,
}

impl FileImportTable {
    pub fn register(&mut self, alias: &str, module: &str) {
        self.imports.insert(alias.to_string(), module.to_string());
    }

    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.imports.get(alias).map(String::as_str)
    }

    pub fn known(&self, alias: &str) -> bool {
        self.imports.contains_key(alias)
    }

    pub fn mark_used(&mut self, alias: &str) {
        self.used.insert(alias.to_string());
    }

    /// Aliases that were imported and never referenced, in name order.
    pub fn unused(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .imports
            .iter()
            .filter(|(alias, _)| !self.used.contains(*alias))
            .map(|(a, m)| (a.as_str(), m.as_str()))
            .collect();
        out.sort();
        out
    }

    pub fn modules(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.imports.values().map(String::as_str).collect();
        out.sort();
        out.dedup();
        out
    }
}

/// The root aggregate: every registry the passes share.
#[derive(Debug, Default)]
pub struct Table {
    types: FxHashMap<String, Type>,
    fns: FxHashMap<String, Fn>,
    consts: FxHashMap<String, Var>,
    imports: FxHashMap<String, FileImportTable>,
    /// Generic function name -> concrete type arguments discovered at call
    /// sites, in first-seen order, deduplicated.
    generic_fns: FxHashMap<String, Vec<TypeExpr>>,
    /// Rendered C lines for constant definitions, in declaration order.
    const_defs: Vec<String>,
}

impl Table {
    /// A table pre-seeded with the built-in types the runtime provides.
    pub fn new() -> Table {
        let mut table = Table::default();
        for prim in [
            "i8", "i16", "int", "i64", "u8", "u16", "u32", "u64", "f32", "f64", "bool", "byte",
            "rune", "void",
        ] {
            table.seed_builtin(prim);
        }
        for runtime in ["string", "array", "map", "voidptr", "CdrOption"] {
            table.seed_builtin(runtime);
        }
        table
    }

    fn seed_builtin(&mut self, name: &str) {
        let mut t = Type::placeholder(name);
        t.cat = TypeCat::Builtin;
        t.module = "builtin".to_string();
        self.types.insert(name.to_string(), t);
    }

    /// Idempotent upsert: an unknown name becomes a placeholder that a
    /// later declaration fills in.
    pub fn register_type(&mut self, name: &str) {
        self.types
            .entry(name.to_string())
            .or_insert_with(|| Type::placeholder(name));
    }

    pub fn register_type_with_parent(&mut self, name: &str, parent: &str) {
        self.register_type(parent);
        let t = self
            .types
            .entry(name.to_string())
            .or_insert_with(|| Type::placeholder(name));
        t.parent = Some(parent.to_string());
    }

    /// Fills in a placeholder with a full declaration. Declaring a name that
    /// already has a non-placeholder category is a redefinition.
    pub fn rewrite_type(&mut self, mut typ: Type) -> Result<(), String> {
        if let Some(existing) = self.types.get(&typ.name) {
            if existing.cat != TypeCat::Placeholder {
                return Err(format!("type `{}` redefined", typ.name));
            }
            // Methods may already have attached to the placeholder.
            let mut methods = existing.methods.clone();
            methods.extend(typ.methods);
            typ.methods = methods;
            if typ.parent.is_none() {
                typ.parent = existing.parent.clone();
            }
        }
        self.types.insert(typ.name.clone(), typ);
        Ok(())
    }

    /// Looks a type up by name, stripping a single trailing pointer marker
    /// first so `Foo*` resolves to `Foo`.
    pub fn find_type(&self, name: &str) -> Option<&Type> {
        let name = name.strip_suffix('*').unwrap_or(name);
        self.types.get(name)
    }

    /// True when the name resolved to a real declaration, not a forward
    /// placeholder.
    pub fn known_type(&self, name: &str) -> bool {
        self.find_type(name)
            .is_some_and(|t| t.cat != TypeCat::Placeholder)
    }

    pub fn add_field(&mut self, type_name: &str, field: Field) -> Result<(), String> {
        self.register_type(type_name);
        let t = self.types.get_mut(type_name).expect("just registered");
        if t.fields.iter().any(|f| f.name == field.name) {
            return Err(format!(
                "field `{}` redefined in type `{}`",
                field.name, type_name
            ));
        }
        t.fields.push(field);
        Ok(())
    }

    /// Field lookup with exactly one level of parent fallback. This is a
    /// deliberate design point: embedding is single-level, so a grandparent
    /// field is out of reach.
    pub fn find_field<'a>(&'a self, typ: &'a Type, name: &str) -> Option<&'a Field> {
        if let Some(field) = typ.fields.iter().find(|f| f.name == name) {
            return Some(field);
        }
        let parent = self.types.get(typ.parent.as_deref()?)?;
        parent.fields.iter().find(|f| f.name == name)
    }

    pub fn add_method(&mut self, type_name: &str, method: Fn) {
        self.register_type(type_name);
        let t = self.types.get_mut(type_name).expect("just registered");
        t.methods.retain(|m| m.name != method.name);
        t.methods.push(method);
    }

    /// Method lookup mirrors `find_field`: one level of parent fallback.
    pub fn find_method<'a>(&'a self, typ: &'a Type, name: &str) -> Option<&'a Fn> {
        let mangled = format!("{}_{}", typ.name, name);
        if let Some(m) = typ.methods.iter().find(|m| m.name == mangled) {
            return Some(m);
        }
        let parent = self.types.get(typ.parent.as_deref()?)?;
        let parent_mangled = format!("{}_{}", parent.name, name);
        parent.methods.iter().find(|m| m.name == parent_mangled)
    }

    /// Registers (or on the main pass, re-registers) a function under its
    /// mangled name. Redefinition detection happens in the declaration pass
    /// before calling this.
    pub fn register_fn(&mut self, f: Fn) {
        self.fns.insert(f.name.clone(), f);
    }

    pub fn find_fn(&self, name: &str) -> Option<&Fn> {
        self.fns.get(name)
    }

    pub fn fns_in_decl_order(&self) -> Vec<&Fn> {
        let mut all: Vec<&Fn> = self.fns.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn register_const(&mut self, var: Var) -> Result<(), String> {
        if self.consts.contains_key(&var.name) {
            return Err(format!("constant `{}` redefined", var.name));
        }
        self.consts.insert(var.name.clone(), var);
        Ok(())
    }

    pub fn find_const(&self, name: &str) -> Option<&Var> {
        self.consts.get(name)
    }

    pub fn add_const_def(&mut self, line: String) {
        self.const_defs.push(line);
    }

    pub fn const_defs(&self) -> &[String] {
        &self.const_defs
    }

    /// Marks a function as generic during the declaration pass.
    pub fn register_generic_fn(&mut self, name: &str) {
        self.generic_fns.entry(name.to_string()).or_default();
    }

    pub fn is_generic_fn(&self, name: &str) -> bool {
        self.generic_fns.contains_key(name)
    }

    /// Records a concrete type argument discovered at a call site. Repeated
    /// identical instantiations do not duplicate the entry.
    pub fn register_generic_fn_type(&mut self, name: &str, typ: TypeExpr) {
        let entry = self.generic_fns.entry(name.to_string()).or_default();
        if !entry.contains(&typ) {
            entry.push(typ);
        }
    }

    pub fn generic_fn_types(&self, name: &str) -> &[TypeExpr] {
        self.generic_fns
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn file_imports_mut(&mut self, file: &str) -> &mut FileImportTable {
        self.imports.entry(file.to_string()).or_default()
    }

    pub fn file_imports(&self, file: &str) -> Option<&FileImportTable> {
        self.imports.get(file)
    }

    /// Registers the lazy `Option_T` wrapper the first time `T` appears in
    /// an optional position. The payload must fit the fixed buffer.
    pub fn register_option(&mut self, payload: &TypeExpr) -> Result<(), String> {
        let size = self.type_size(payload);
        if size > MAX_OPTION_PAYLOAD {
            return Err(format!(
                "type `{payload}` is too large for an optional payload ({size} bytes, limit {MAX_OPTION_PAYLOAD})"
            ));
        }
        let name = TypeExpr::option_of(payload.clone()).mangled();
        let base = payload.mangled();
        if !self.types.contains_key(&name) {
            let mut t = Type::placeholder(&name);
            t.cat = TypeCat::Alias;
            t.parent = Some(base);
            self.types.insert(name, t);
        }
        Ok(())
    }

    /// Whether a value of type `got` is acceptable where `expected` is
    /// required. Numeric types widen freely among themselves; `voidptr`
    /// unifies with any pointer; an alias matches its base; everything else
    /// must match structurally.
    pub fn check_types(&self, expected: &TypeExpr, got: &TypeExpr) -> bool {
        if expected == got {
            return true;
        }
        if expected.is_numeric() && got.is_numeric() {
            return true;
        }
        if (expected.is_voidptr() && got.is_pointer()) || (got.is_voidptr() && expected.is_pointer())
        {
            return true;
        }
        if self.alias_base(expected) == Some(got.mangled())
            || self.alias_base(got) == Some(expected.mangled())
        {
            return true;
        }
        false
    }

    fn alias_base(&self, typ: &TypeExpr) -> Option<String> {
        if let TypeExpr::Named(name) = typ {
            let t = self.types.get(name)?;
            if t.cat == TypeCat::Alias {
                return t.parent.clone();
            }
        }
        None
    }

    /// Estimated byte size of a value of this type in the C output, used
    /// for the optional-payload cap.
    pub fn type_size(&self, typ: &TypeExpr) -> usize {
        self.type_size_depth(typ, 0)
    }

    fn type_size_depth(&self, typ: &TypeExpr, depth: usize) -> usize {
        if depth > 8 {
            // Deep by-value nesting; the struct-cycle check rejects true
            // cycles, so just stop estimating.
            return MAX_OPTION_PAYLOAD + 1;
        }
        match typ {
            TypeExpr::Primitive(p) => p.size(),
            TypeExpr::Pointer(_) | TypeExpr::Fn { .. } => 8,
            TypeExpr::Array(_) | TypeExpr::Map(_, _) => 24,
            TypeExpr::Option(inner) => self.type_size_depth(inner, depth + 1) + 24,
            TypeExpr::Multi(parts) => parts
                .iter()
                .map(|p| self.type_size_depth(p, depth + 1))
                .sum(),
            TypeExpr::Named(name) => match self.types.get(name) {
                Some(t) => match t.cat {
                    TypeCat::Enum => 4,
                    TypeCat::Builtin if name == "string" => 16,
                    TypeCat::Builtin if name == "voidptr" => 8,
                    TypeCat::Builtin if name == "array" || name == "map" => 24,
                    TypeCat::Builtin if name == "CdrOption" => MAX_OPTION_PAYLOAD + 24,
                    _ => t
                        .fields
                        .iter()
                        .map(|f| self.type_size_depth(&f.typ, depth + 1))
                        .sum::<usize>()
                        .max(1),
                },
                None => 8,
            },
        }
    }

    /// All declared struct-category types, for emission.
    pub fn struct_types(&self) -> Vec<&Type> {
        let mut out: Vec<&Type> = self
            .types
            .values()
            .filter(|t| matches!(t.cat, TypeCat::Struct | TypeCat::Union | TypeCat::Interface))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn enum_types(&self) -> Vec<&Type> {
        let mut out: Vec<&Type> = self
            .types
            .values()
            .filter(|t| t.cat == TypeCat::Enum)
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn alias_types(&self) -> Vec<&Type> {
        let mut out: Vec<&Type> = self
            .types
            .values()
            .filter(|t| t.cat == TypeCat::Alias && !t.name.starts_with("Option_"))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn consts_in_order(&self) -> Vec<&Var> {
        let mut out: Vec<&Var> = self.consts.values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_type_miss_is_detectable() {
        let table = Table::new();
        assert!(table.find_type("Foo").is_none());
    }

    #[test]
    fn register_then_find_round_trip() {
        let mut table = Table::new();
        table.register_type("Foo");
        assert_eq!(table.find_type("Foo").unwrap().name, "Foo");
        // A single trailing pointer marker is stripped before lookup.
        assert_eq!(table.find_type("Foo*").unwrap().name, "Foo");
    }

    #[test]
    fn placeholder_is_rewritten_by_declaration() {
        let mut table = Table::new();
        table.register_type("User");
        assert!(!table.known_type("User"));

        let mut decl = Type::placeholder("User");
        decl.cat = TypeCat::Struct;
        table.rewrite_type(decl).unwrap();
        assert!(table.known_type("User"));
    }

    #[test]
    fn redeclaring_a_full_type_is_an_error() {
        let mut table = Table::new();
        let mut decl = Type::placeholder("User");
        decl.cat = TypeCat::Struct;
        table.rewrite_type(decl.clone()).unwrap();
        assert!(table.rewrite_type(decl).is_err());
    }

    #[test]
    fn field_lookup_falls_back_one_level_only() {
        let mut table = Table::new();
        let mut grandparent = Type::placeholder("A");
        grandparent.cat = TypeCat::Struct;
        table.rewrite_type(grandparent).unwrap();
        table
            .add_field("A", Field {
                name: "deep".into(),
                typ: TypeExpr::int(),
                is_mut: false,
                is_pub: false,
            })
            .unwrap();

        let mut parent = Type::placeholder("B");
        parent.cat = TypeCat::Struct;
        parent.parent = Some("A".into());
        table.rewrite_type(parent).unwrap();
        table
            .add_field("B", Field {
                name: "mid".into(),
                typ: TypeExpr::int(),
                is_mut: false,
                is_pub: false,
            })
            .unwrap();

        let mut child = Type::placeholder("C");
        child.cat = TypeCat::Struct;
        child.parent = Some("B".into());
        table.rewrite_type(child).unwrap();

        let c = table.find_type("C").unwrap();
        assert!(table.find_field(c, "mid").is_some(), "parent field visible");
        assert!(
            table.find_field(c, "deep").is_none(),
            "grandparent field must not be visible"
        );
    }

    #[test]
    fn duplicate_field_is_an_error() {
        let mut table = Table::new();
        let field = Field {
            name: "x".into(),
            typ: TypeExpr::int(),
            is_mut: false,
            is_pub: false,
        };
        table.add_field("P", field.clone()).unwrap();
        assert!(table.add_field("P", field).is_err());
    }

    #[test]
    fn method_lookup_uses_mangled_names() {
        let mut table = Table::new();
        let mut t = Type::placeholder("Point");
        t.cat = TypeCat::Struct;
        table.rewrite_type(t).unwrap();
        let m = Fn::new("Point_translate", "main", TypeExpr::void());
        table.add_method("Point", m);

        let point = table.find_type("Point").unwrap();
        let found = table.find_method(point, "translate").unwrap();
        assert_eq!(found.name, "Point_translate");
        assert!(table.find_method(point, "missing").is_none());
    }

    #[test]
    fn numeric_widening_acceptance() {
        let table = Table::new();
        let int = TypeExpr::int();
        let f32t = TypeExpr::Primitive(Primitive::F32);
        let f64t = TypeExpr::Primitive(Primitive::F64);
        assert!(table.check_types(&int, &f32t));
        assert!(table.check_types(&f64t, &f32t));
        assert!(!table.check_types(&TypeExpr::string(), &int));
    }

    #[test]
    fn voidptr_unifies_with_pointers() {
        let table = Table::new();
        let vp = TypeExpr::named("voidptr");
        let ip = TypeExpr::pointer(TypeExpr::int());
        assert!(table.check_types(&vp, &ip));
        assert!(table.check_types(&ip, &vp));
        assert!(!table.check_types(&ip, &TypeExpr::int()));
    }

    #[test]
    fn alias_matches_its_base() {
        let mut table = Table::new();
        let mut alias = Type::placeholder("Fd");
        alias.cat = TypeCat::Alias;
        alias.parent = Some("int".into());
        table.rewrite_type(alias).unwrap();
        assert!(table.check_types(&TypeExpr::named("Fd"), &TypeExpr::int()));
        assert!(table.check_types(&TypeExpr::int(), &TypeExpr::named("Fd")));
    }

    #[test]
    fn generic_type_args_deduplicate() {
        let mut table = Table::new();
        table.register_generic_fn("id");
        table.register_generic_fn_type("id", TypeExpr::int());
        table.register_generic_fn_type("id", TypeExpr::string());
        table.register_generic_fn_type("id", TypeExpr::int());
        let types = table.generic_fn_types("id");
        assert_eq!(types.len(), 2);
        assert_eq!(types[0], TypeExpr::int());
        assert_eq!(types[1], TypeExpr::string());
    }

    #[test]
    fn option_registration_is_lazy_and_capped() {
        let mut table = Table::new();
        table.register_option(&TypeExpr::int()).unwrap();
        assert!(table.find_type("Option_int").is_some());

        // A struct estimated past the cap is rejected.
        let mut big = Type::placeholder("Big");
        big.cat = TypeCat::Struct;
        table.rewrite_type(big).unwrap();
        for i in 0..40 {
            table
                .add_field("Big", Field {
                    name: format!("f{i}"),
                    typ: TypeExpr::Primitive(Primitive::F64),
                    is_mut: false,
                    is_pub: false,
                })
                .unwrap();
        }
        let err = table.register_option(&TypeExpr::named("Big")).unwrap_err();
        assert!(err.contains("too large"), "unexpected error: {err}");
    }

    #[test]
    fn unused_imports_are_reported() {
        let mut table = Table::new();
        let imports = table.file_imports_mut("main.cdr");
        imports.register("math", "math");
        imports.register("term", "term");
        imports.mark_used("math");
        let unused = table.file_imports("main.cdr").unwrap().unused();
        assert_eq!(unused, vec![("term", "term")]);
    }

    #[test]
    fn needs_free_per_flag_combination() {
        let base = {
            let mut v = Var::new("x", TypeExpr::array_of(TypeExpr::int()));
            v.is_alloc = true;
            v
        };
        assert!(base.needs_free());

        let mut returned = base.clone();
        returned.is_returned = true;
        assert!(!returned.needs_free());

        let mut moved = base.clone();
        moved.is_moved = true;
        assert!(!moved.needs_free());

        let mut arg = base.clone();
        arg.is_arg = true;
        assert!(!arg.needs_free());

        let mut global = base.clone();
        global.is_global = true;
        assert!(!global.needs_free());

        let mut not_alloc = base.clone();
        not_alloc.is_alloc = false;
        assert!(!not_alloc.needs_free());
    }
}
