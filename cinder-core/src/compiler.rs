//! The compilation driver.
//!
//! Orchestrates a whole invocation: reads and tokenizes sources, pulls in
//! imported modules from the search paths, orders modules topologically,
//! runs the declaration pass and then the main pass over every file with one
//! shared [`Table`], and assembles the final C translation unit (runtime
//! preamble, type definitions in dependency order, constants, prototypes,
//! emitted bodies, `main` wrapper).

use std::path::PathBuf;

use rustc_hash::{FxHashMap, FxHashSet};
use walkdir::WalkDir;

use crate::cgen::CGen;
use crate::depgraph::DepGraph;
use crate::diag::{Diagnostic, FailFast, Severity, Sink};
use crate::error::CoreError;
use crate::parser::Parser;
use crate::scanner::{tokenize, TokKind, Token};
use crate::table::{Fn, Pass, Table, TypeCat, Var};
use crate::typeexpr::TypeExpr;

/// The C prelude every emitted program starts with: scalar typedefs, the
/// runtime value structs, and the helpers the emitted code calls into.
const RUNTIME: &str = r#"#include <stdio.h>
#include <stdlib.h>
#include <string.h>
#include <stdint.h>
#include <stdbool.h>
#include <stdarg.h>

typedef int8_t i8;
typedef int16_t i16;
typedef int64_t i64;
typedef uint8_t u8;
typedef uint16_t u16;
typedef uint32_t u32;
typedef uint64_t u64;
typedef float f32;
typedef double f64;
typedef unsigned char byte;
typedef int32_t rune;
typedef void* voidptr;

typedef struct string { int len; char* str; } string;
typedef struct array { int len; int cap; int esize; char* data; } array;
typedef struct map { int len; int cap; int esize; string* keys; char* vals; } map;
typedef struct CdrOption { bool ok; bool is_none; string error; unsigned char data[255]; } CdrOption;

static string _S(const char* s) {
	string out;
	out.len = (int)strlen(s);
	out.str = (char*)s;
	return out;
}

static string _STR(const char* fmt, ...) {
	va_list ap;
	va_start(ap, fmt);
	int n = vsnprintf(NULL, 0, fmt, ap);
	va_end(ap);
	char* buf = (char*)malloc((size_t)n + 1);
	va_start(ap, fmt);
	vsnprintf(buf, (size_t)n + 1, fmt, ap);
	va_end(ap);
	string out;
	out.len = n;
	out.str = buf;
	return out;
}

static bool string_eq(string a, string b) {
	if (a.len != b.len) return false;
	return memcmp(a.str, b.str, (size_t)a.len) == 0;
}

static string string_add(string a, string b) {
	char* buf = (char*)malloc((size_t)a.len + (size_t)b.len + 1);
	memcpy(buf, a.str, (size_t)a.len);
	memcpy(buf + a.len, b.str, (size_t)b.len);
	buf[a.len + b.len] = 0;
	string out;
	out.len = a.len + b.len;
	out.str = buf;
	return out;
}

static array new_array(int esize) {
	array out;
	out.len = 0;
	out.cap = 0;
	out.esize = esize;
	out.data = NULL;
	return out;
}

static array new_array_from(int n, int esize, void* data) {
	array out;
	out.len = n;
	out.cap = n;
	out.esize = esize;
	out.data = (char*)malloc((size_t)n * (size_t)esize);
	memcpy(out.data, data, (size_t)n * (size_t)esize);
	return out;
}

static void* array_get(array a, int i) {
	if (i < 0 || i >= a.len) {
		fprintf(stderr, "array index %d out of range (len %d)\n", i, a.len);
		exit(1);
	}
	return a.data + (size_t)i * (size_t)a.esize;
}

static void array_push(array* a, void* elem) {
	if (a->len == a->cap) {
		a->cap = a->cap == 0 ? 8 : a->cap * 2;
		a->data = (char*)realloc(a->data, (size_t)a->cap * (size_t)a->esize);
	}
	memcpy(a->data + (size_t)a->len * (size_t)a->esize, elem, (size_t)a->esize);
	a->len++;
}

static void array_free(array a) {
	free(a.data);
}

static array array_slice(array a, int lo, int hi) {
	if (hi < 0 || hi > a.len) hi = a.len;
	if (lo < 0) lo = 0;
	if (lo > hi) lo = hi;
	array out;
	out.len = hi - lo;
	out.cap = out.len;
	out.esize = a.esize;
	out.data = (char*)malloc((size_t)out.len * (size_t)a.esize);
	memcpy(out.data, a.data + (size_t)lo * (size_t)a.esize, (size_t)out.len * (size_t)a.esize);
	return out;
}

static string string_substr(string s, int lo, int hi) {
	if (hi < 0 || hi > s.len) hi = s.len;
	if (lo < 0) lo = 0;
	if (lo > hi) lo = hi;
	string out;
	out.len = hi - lo;
	out.str = s.str + lo;
	return out;
}

static map new_map(int esize) {
	map out;
	out.len = 0;
	out.cap = 0;
	out.esize = esize;
	out.keys = NULL;
	out.vals = NULL;
	return out;
}

static void* map_get(map m, string key) {
	for (int i = 0; i < m.len; i++) {
		if (string_eq(m.keys[i], key)) {
			return m.vals + (size_t)i * (size_t)m.esize;
		}
	}
	fprintf(stderr, "map key not found: %.*s\n", key.len, key.str);
	exit(1);
}

static void map_set(map* m, string key, void* val) {
	for (int i = 0; i < m->len; i++) {
		if (string_eq(m->keys[i], key)) {
			memcpy(m->vals + (size_t)i * (size_t)m->esize, val, (size_t)m->esize);
			return;
		}
	}
	if (m->len == m->cap) {
		m->cap = m->cap == 0 ? 8 : m->cap * 2;
		m->keys = (string*)realloc(m->keys, (size_t)m->cap * sizeof(string));
		m->vals = (char*)realloc(m->vals, (size_t)m->cap * (size_t)m->esize);
	}
	m->keys[m->len] = key;
	memcpy(m->vals + (size_t)m->len * (size_t)m->esize, val, (size_t)m->esize);
	m->len++;
}

static void map_free(map m) {
	free(m.keys);
	free(m.vals);
}

static CdrOption opt_ok(void* v, int size) {
	CdrOption o;
	memset(&o, 0, sizeof(o));
	o.ok = true;
	memcpy(o.data, v, (size_t)size);
	return o;
}

static CdrOption opt_none(void) {
	CdrOption o;
	memset(&o, 0, sizeof(o));
	o.is_none = true;
	o.error = _S("none");
	return o;
}

static CdrOption opt_err(string msg) {
	CdrOption o;
	memset(&o, 0, sizeof(o));
	o.error = msg;
	return o;
}

static void println(string s) {
	printf("%.*s\n", s.len, s.str);
}

static void print(string s) {
	printf("%.*s", s.len, s.str);
}

static void eprintln(string s) {
	fprintf(stderr, "%.*s\n", s.len, s.str);
}

static void panic(string s) {
	fprintf(stderr, "panic: %.*s\n", s.len, s.str);
	exit(1);
}
"#;

/// Options for one compiler invocation.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Production mode: warnings are promoted to errors.
    pub prod: bool,
    /// Emit `#line` directives so C diagnostics point at Cinder source.
    pub line_directives: bool,
    /// Roots searched for imported modules.
    pub mod_search_paths: Vec<PathBuf>,
    /// Whether a `main` function must exist (off for library builds).
    pub require_main: bool,
}

impl Default for Opts {
    fn default() -> Opts {
        Opts {
            prod: false,
            line_directives: false,
            mod_search_paths: Vec::new(),
            require_main: true,
        }
    }
}

/// The result of a successful compilation.
#[derive(Debug)]
pub struct CompilationArtifact {
    /// The complete C translation unit.
    pub c_source: String,
    /// Rendered warnings that were reported and not promoted.
    pub warnings: Vec<String>,
}

/// Seeds the table with the functions the runtime preamble provides.
pub fn register_builtins(table: &mut Table) {
    for name in ["println", "print", "eprintln", "panic"] {
        let mut f = Fn::new(name, "builtin", TypeExpr::void());
        let mut arg = Var::new("s", TypeExpr::string());
        arg.is_arg = true;
        f.args.push(arg);
        table.register_fn(f);
    }
    let mut exit_fn = Fn::new("exit", "builtin", TypeExpr::void());
    let mut code = Var::new("code", TypeExpr::int());
    code.is_arg = true;
    exit_fn.args.push(code);
    exit_fn.is_c = true;
    table.register_fn(exit_fn);

    let mut malloc_fn = Fn::new("malloc", "builtin", TypeExpr::named("voidptr"));
    let mut size = Var::new("size", TypeExpr::int());
    size.is_arg = true;
    malloc_fn.args.push(size);
    malloc_fn.is_c = true;
    table.register_fn(malloc_fn);

    let mut free_fn = Fn::new("free", "builtin", TypeExpr::void());
    let mut ptr = Var::new("ptr", TypeExpr::named("voidptr"));
    ptr.is_arg = true;
    free_fn.args.push(ptr);
    free_fn.is_c = true;
    table.register_fn(free_fn);
}

#[derive(Debug, Clone)]
struct Import {
    alias: String,
    module: String,
    line: u32,
    col: u32,
}

struct Unit {
    name: String,
    source: String,
    module: String,
    imports: Vec<Import>,
    tokens: Vec<Token>,
}

/// Reads the module clause and import list off the front of a token stream
/// without a full parse, for module resolution and ordering.
fn scan_header(tokens: &[Token]) -> (String, Vec<Import>) {
    let kind = |i: usize| tokens.get(i).map(|t| t.kind).unwrap_or(TokKind::Eof);
    let mut i = 0;
    let mut module = "main".to_string();
    if kind(i) == TokKind::KeyModule {
        i += 1;
        let mut name = String::new();
        while kind(i) == TokKind::Name {
            if !name.is_empty() {
                name.push_str("__");
            }
            name.push_str(&tokens[i].lit);
            i += 1;
            if kind(i) == TokKind::Dot {
                i += 1;
            } else {
                break;
            }
        }
        if !name.is_empty() {
            module = name;
        }
    }
    let mut imports = Vec::new();
    while kind(i) == TokKind::KeyImport {
        let (line, col) = (tokens[i].line, tokens[i].col);
        i += 1;
        let mut m = String::new();
        let mut alias = String::new();
        while kind(i) == TokKind::Name {
            alias = tokens[i].lit.clone();
            if !m.is_empty() {
                m.push_str("__");
            }
            m.push_str(&tokens[i].lit);
            i += 1;
            if kind(i) == TokKind::Dot {
                i += 1;
            } else {
                break;
            }
        }
        if kind(i) == TokKind::KeyAs {
            i += 1;
            if kind(i) == TokKind::Name {
                alias = tokens[i].lit.clone();
                i += 1;
            }
        }
        if !m.is_empty() {
            imports.push(Import {
                alias,
                module: m,
                line,
                col,
            });
        }
    }
    (module, imports)
}

/// Locates the source files of a module: `a.b` maps to `a/b.cdr` or the
/// directory `a/b/` under one of the search roots.
fn find_module_files(module: &str, roots: &[PathBuf]) -> Result<Vec<PathBuf>, CoreError> {
    let rel: PathBuf = module.split("__").collect();
    for root in roots {
        let file = root.join(&rel).with_extension("cdr");
        if file.is_file() {
            return Ok(vec![file]);
        }
        let dir = root.join(&rel);
        if dir.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| p.extension().is_some_and(|x| x == "cdr"))
                .collect();
            found.sort();
            if !found.is_empty() {
                return Ok(found);
            }
        }
    }
    Err(CoreError::MissingModule {
        module: module.replace("__", "."),
        searched: roots.to_vec(),
    })
}

/// Compiles a single in-memory source.
pub fn compile_str(name: &str, source: &str, opts: &Opts) -> Result<CompilationArtifact, CoreError> {
    compile_sources(vec![(name.to_string(), source.to_string())], opts)
}

/// Compiles a set of source files, pulling imported modules from the search
/// paths.
pub fn compile_files(paths: &[PathBuf], opts: &Opts) -> Result<CompilationArtifact, CoreError> {
    let mut sources = Vec::new();
    for p in paths {
        if p.extension().map(|e| e != "cdr").unwrap_or(true) {
            return Err(CoreError::UnsupportedFormat(p.display().to_string()));
        }
        let text = std::fs::read_to_string(p)?;
        sources.push((p.display().to_string(), text));
    }
    compile_sources(sources, opts)
}

fn compile_sources(
    sources: Vec<(String, String)>,
    opts: &Opts,
) -> Result<CompilationArtifact, CoreError> {
    let mut units = Vec::new();
    for (name, source) in sources {
        let tokens = tokenize(&name, &source)?;
        let (module, imports) = scan_header(&tokens);
        units.push(Unit {
            name,
            source,
            module,
            imports,
            tokens,
        });
    }

    // Chase imports until every named module has at least one loaded file.
    loop {
        let have: FxHashSet<String> = units.iter().map(|u| u.module.clone()).collect();
        let mut missing: Vec<String> = units
            .iter()
            .flat_map(|u| u.imports.iter())
            .map(|im| im.module.clone())
            .filter(|m| !have.contains(m))
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            break;
        }
        for m in missing {
            let files = find_module_files(&m, &opts.mod_search_paths)?;
            let mut declared = false;
            for path in files {
                let name = path.display().to_string();
                if units.iter().any(|u| u.name == name) {
                    continue;
                }
                let source = std::fs::read_to_string(&path)?;
                let tokens = tokenize(&name, &source)?;
                let (module, imports) = scan_header(&tokens);
                declared |= module == m;
                units.push(Unit {
                    name,
                    source,
                    module,
                    imports,
                    tokens,
                });
            }
            if !declared {
                return Err(CoreError::MissingModule {
                    module: m.replace("__", "."),
                    searched: opts.mod_search_paths.clone(),
                });
            }
        }
    }

    // Modules parse in dependency order so the declaration pass sees every
    // imported symbol before its importers.
    let mut modules: Vec<String> = units.iter().map(|u| u.module.clone()).collect();
    modules.sort();
    modules.dedup();
    let mut graph = DepGraph::new();
    for m in &modules {
        let deps: Vec<String> = units
            .iter()
            .filter(|u| &u.module == m)
            .flat_map(|u| u.imports.iter().map(|im| im.module.clone()))
            .collect();
        graph.add(m, &deps);
    }
    let resolved = graph.resolve();
    if !resolved.acyclic {
        return Err(CoreError::ImportCycle {
            message: resolved.display_cycle(),
        });
    }
    let pos: FxHashMap<&str, usize> = resolved
        .order()
        .iter()
        .enumerate()
        .map(|(i, n)| (*n, i))
        .collect();
    units.sort_by(|a, b| {
        pos.get(a.module.as_str())
            .cmp(&pos.get(b.module.as_str()))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut table = Table::new();
    register_builtins(&mut table);
    let mut sink = FailFast::new(opts.prod);

    // Declaration pass: populate the table, discard the output.
    let mut scratch = CGen::new();
    for u in &units {
        Parser::new(
            &u.tokens, &u.name, &u.source, &mut table, &mut scratch, &mut sink, Pass::Decl,
        )
        .parse()?;
    }

    // Main pass: full checking and the real output.
    let mut cgen = CGen::new();
    cgen.line_directives = opts.line_directives;
    for u in &units {
        Parser::new(
            &u.tokens, &u.name, &u.source, &mut table, &mut cgen, &mut sink, Pass::Main,
        )
        .parse()?;
    }

    for u in &units {
        let unused: Vec<String> = table
            .file_imports(&u.name)
            .map(|t| t.unused().iter().map(|(a, _)| a.to_string()).collect())
            .unwrap_or_default();
        for alias in unused {
            let (line, col) = u
                .imports
                .iter()
                .find(|im| im.alias == alias)
                .map(|im| (im.line, im.col))
                .unwrap_or((1, 1));
            sink.report(Diagnostic::new(
                Severity::Type,
                format!("unused import `{alias}`"),
                &u.name,
                &u.source,
                line,
                col,
            ))?;
        }
    }

    if opts.require_main && table.find_fn("cdr_main").is_none() {
        return Err(CoreError::Type {
            message: "no `main` function declared".to_string(),
        });
    }

    // Struct definitions must precede their by-value uses.
    let mut graph = DepGraph::new();
    for t in table.struct_types() {
        if t.cat == TypeCat::Interface {
            graph.add(&t.name, &[]);
            continue;
        }
        let mut deps = Vec::new();
        if let Some(p) = &t.parent {
            if p == &t.name {
                return Err(CoreError::StructCycle {
                    message: format!("`{}` embeds itself", t.name),
                });
            }
            deps.push(p.clone());
        }
        for f in &t.fields {
            if let TypeExpr::Named(n) = &f.typ {
                let is_value_struct = table
                    .find_type(n)
                    .is_some_and(|ft| matches!(ft.cat, TypeCat::Struct | TypeCat::Union));
                if is_value_struct {
                    // A self edge would be dropped by the resolver, but a
                    // by-value self field is a layout cycle all on its own.
                    if n == &t.name {
                        return Err(CoreError::StructCycle {
                            message: format!("`{}` contains itself by value", t.name),
                        });
                    }
                    deps.push(n.clone());
                }
            }
        }
        graph.add(&t.name, &deps);
    }
    let struct_order = graph.resolve();
    if !struct_order.acyclic {
        return Err(CoreError::StructCycle {
            message: struct_order.display_cycle(),
        });
    }
    let order: Vec<String> = struct_order.order().iter().map(|s| s.to_string()).collect();

    let c_source = assemble(&table, cgen.output(), &order);
    let warnings = sink.warnings().iter().map(|d| d.rendered()).collect();
    Ok(CompilationArtifact { c_source, warnings })
}

/// Stitches the final translation unit together.
fn assemble(table: &Table, body: String, struct_order: &[String]) -> String {
    let mut out = String::with_capacity(RUNTIME.len() + body.len() + 4096);
    out.push_str(RUNTIME);
    out.push('\n');

    for t in table.struct_types() {
        out.push_str(&format!("typedef struct {0} {0};\n", t.name));
    }
    for t in table.enum_types() {
        let vals: Vec<String> = t
            .enum_vals
            .iter()
            .map(|v| format!("{}_{}", t.name, v))
            .collect();
        out.push_str(&format!(
            "typedef enum {{ {} }} {};\n",
            vals.join(", "),
            t.name
        ));
    }
    for t in table.alias_types() {
        if let Some(base) = &t.parent {
            out.push_str(&format!("typedef {} {};\n", base, t.name));
        }
    }
    for name in struct_order {
        let Some(t) = table.find_type(name) else {
            continue;
        };
        match t.cat {
            TypeCat::Interface => {
                out.push_str(&format!("struct {} {{\n\tvoid* _obj;\n", t.name));
                for m in &t.methods {
                    out.push_str(&format!("\tvoid* {};\n", m.name));
                }
                out.push_str("};\n");
            }
            TypeCat::Struct | TypeCat::Union => {
                out.push_str(&format!("struct {} {{\n", t.name));
                let mut emitted = 0;
                let parent = t.parent.as_deref().and_then(|p| table.find_type(p));
                if let Some(parent) = parent {
                    for f in &parent.fields {
                        out.push_str(&format!("\t{} {};\n", f.typ.cname(), f.name));
                        emitted += 1;
                    }
                }
                for f in &t.fields {
                    out.push_str(&format!("\t{} {};\n", f.typ.cname(), f.name));
                    emitted += 1;
                }
                if emitted == 0 {
                    out.push_str("\tchar _;\n");
                }
                out.push_str("};\n");
            }
            _ => {}
        }
    }
    for def in table.const_defs() {
        out.push_str(def);
        out.push('\n');
    }
    for f in table.fns_in_decl_order() {
        if f.is_c || f.is_generic || f.is_interface || f.module == "builtin" {
            continue;
        }
        out.push_str(&format!("{} {}({});\n", f.c_ret(), f.name, f.c_params()));
    }
    out.push('\n');
    out.push_str(&body);

    if let Some(m) = table.find_fn("cdr_main") {
        out.push_str("\nint main(int argc, char** argv) {\n\t(void)argc;\n\t(void)argv;\n");
        if m.ret.is_void() {
            out.push_str("\tcdr_main();\n\treturn 0;\n");
        } else {
            out.push_str("\treturn cdr_main();\n");
        }
        out.push_str("}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn opts() -> Opts {
        Opts::default()
    }

    #[test]
    fn end_to_end_single_file() {
        let art = compile_str(
            "main.cdr",
            "fn main() { x := 1 + 2 println('$x') }",
            &opts(),
        )
        .unwrap();
        assert!(art.c_source.contains("int x = 1 + 2;"), "{}", art.c_source);
        assert!(art.c_source.contains("void cdr_main(void) {"), "{}", art.c_source);
        assert!(
            art.c_source.contains("int main(int argc, char** argv)"),
            "{}",
            art.c_source
        );
        assert!(art.c_source.contains("cdr_main();"), "{}", art.c_source);
    }

    #[test]
    fn unused_variable_fails_compilation() {
        let err = compile_str("main.cdr", "fn main() { x := 1 + 2 }", &opts()).unwrap_err();
        assert!(err.to_string().contains("declared and not used"), "{err}");
    }

    #[test]
    fn missing_main_is_reported_unless_library() {
        let src = "pub fn helper() int { return 1 }";
        let err = compile_str("lib.cdr", src, &opts()).unwrap_err();
        assert!(err.to_string().contains("main"), "{err}");

        let mut lib = opts();
        lib.require_main = false;
        compile_str("lib.cdr", src, &lib).unwrap();
    }

    #[test]
    fn struct_definitions_emit_in_dependency_order() {
        let src = "struct Outer { inner Inner n int }\n\
                   struct Inner { v int }\n\
                   fn main() { o := Outer{inner: Inner{v: 1}, n: 2} println('${o.n}') }";
        let art = compile_str("main.cdr", src, &opts()).unwrap();
        let inner = art.c_source.find("struct Inner {").unwrap();
        let outer = art.c_source.find("struct Outer {").unwrap();
        assert!(inner < outer, "{}", art.c_source);
    }

    #[test]
    fn struct_value_cycles_are_rejected() {
        let src = "struct A { b B }\nstruct B { a A }\nfn main() { }";
        let err = compile_str("main.cdr", src, &opts()).unwrap_err();
        assert!(matches!(err, CoreError::StructCycle { .. }), "{err}");
    }

    #[test]
    fn self_containing_struct_is_rejected() {
        let src = "struct A { x A n int }\nfn main() { }";
        let err = compile_str("main.cdr", src, &opts()).unwrap_err();
        assert!(matches!(err, CoreError::StructCycle { .. }), "{err}");
        assert!(err.to_string().contains("itself"), "{err}");
    }

    #[test]
    fn pointer_fields_break_cycles() {
        let src = "struct Node { next &Node val int }\nfn main() { }";
        let art = compile_str("main.cdr", src, &opts()).unwrap();
        assert!(art.c_source.contains("Node* next;"), "{}", art.c_source);
    }

    #[test]
    fn modules_resolve_from_search_path() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.cdr"),
            "import math\nfn main() { println('${math.add(1, 2)}') }",
        )
        .unwrap();
        fs::write(
            dir.path().join("math.cdr"),
            "module math\npub fn add(a, b int) int { return a + b }",
        )
        .unwrap();
        let mut o = opts();
        o.mod_search_paths = vec![dir.path().to_path_buf()];
        let art = compile_files(&[dir.path().join("main.cdr")], &o).unwrap();
        assert!(
            art.c_source.contains("int math__add(int a, int b) {"),
            "{}",
            art.c_source
        );
        assert!(art.c_source.contains("math__add(1, 2)"), "{}", art.c_source);
    }

    #[test]
    fn missing_module_names_search_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cdr"), "import nope\nfn main() { }").unwrap();
        let mut o = opts();
        o.mod_search_paths = vec![dir.path().to_path_buf()];
        let err = compile_files(&[dir.path().join("main.cdr")], &o).unwrap_err();
        assert!(matches!(err, CoreError::MissingModule { .. }), "{err}");
        assert!(err.to_string().contains("nope"), "{err}");
    }

    #[test]
    fn private_fields_are_module_scoped() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("util.cdr"),
            "module util\n\
             pub struct Counter { pub val int secret int }\n\
             pub fn make() Counter { return Counter{val: 1, secret: 2} }",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.cdr"),
            "import util\nfn main() { c := util.make() println('${c.val}') }",
        )
        .unwrap();
        let mut o = opts();
        o.mod_search_paths = vec![dir.path().to_path_buf()];
        compile_files(&[dir.path().join("main.cdr")], &o).unwrap();

        fs::write(
            dir.path().join("main.cdr"),
            "import util\nfn main() { c := util.make() println('${c.secret}') }",
        )
        .unwrap();
        let err = compile_files(&[dir.path().join("main.cdr")], &o).unwrap_err();
        assert!(err.to_string().contains("`secret` of `util.Counter` is private"), "{err}");
    }

    #[test]
    fn unused_import_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.cdr"),
            "import math\nfn main() { println('hi') }",
        )
        .unwrap();
        fs::write(
            dir.path().join("math.cdr"),
            "module math\npub fn add(a, b int) int { return a + b }",
        )
        .unwrap();
        let mut o = opts();
        o.mod_search_paths = vec![dir.path().to_path_buf()];
        let err = compile_files(&[dir.path().join("main.cdr")], &o).unwrap_err();
        assert!(err.to_string().contains("unused import `math`"), "{err}");
    }

    #[test]
    fn import_cycles_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.cdr"),
            "import a\nfn main() { println('${a.fa()}') }",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.cdr"),
            "module a\nimport b\npub fn fa() int { return b.fb() }",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.cdr"),
            "module b\nimport a\npub fn fb() int { return a.fa() }",
        )
        .unwrap();
        let mut o = opts();
        o.mod_search_paths = vec![dir.path().to_path_buf()];
        let err = compile_files(&[dir.path().join("main.cdr")], &o).unwrap_err();
        assert!(matches!(err, CoreError::ImportCycle { .. }), "{err}");
    }

    #[test]
    fn non_cdr_input_is_rejected() {
        let err = compile_files(&[PathBuf::from("prog.txt")], &opts()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFormat(_)), "{err}");
    }

    #[test]
    fn line_directives_are_optional() {
        let src = "fn main() { x := 1 println('$x') }";
        let plain = compile_str("main.cdr", src, &opts()).unwrap();
        assert!(!plain.c_source.contains("#line"), "{}", plain.c_source);

        let mut o = opts();
        o.line_directives = true;
        let traced = compile_str("main.cdr", src, &o).unwrap();
        assert!(traced.c_source.contains("#line"), "{}", traced.c_source);
        assert!(traced.c_source.contains("main.cdr"), "{}", traced.c_source);
    }

    #[test]
    fn deprecated_switch_survives_as_warning() {
        let src = "fn main() { x := 1 switch x { 1 { println('one') } else { println('o') } } }";
        let art = compile_str("main.cdr", src, &opts()).unwrap();
        assert_eq!(art.warnings.len(), 1, "{:?}", art.warnings);
        assert!(art.warnings[0].contains("deprecated"), "{:?}", art.warnings);
    }
}
