//! The Cinder type representation.
//!
//! Types are a closed tagged variant rather than mangled strings; the
//! mangled C spelling (`array_int`, `Option_string`, `int*`) exists only at
//! the emission boundary, produced by [`TypeExpr::cname`]. Structural
//! questions (pointer-ness, array-ness, optionality, numeric-ness) are
//! answered by matching on the variant, never by string surgery.

use std::fmt::{self, Display, Formatter};

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    I8,
    I16,
    /// The default 32-bit integer.
    Int,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    /// A single byte; distinct from `u8` at the language level.
    Byte,
    /// A unicode code point.
    Rune,
    Void,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "i8" => Primitive::I8,
            "i16" => Primitive::I16,
            "int" => Primitive::Int,
            "i64" => Primitive::I64,
            "u8" => Primitive::U8,
            "u16" => Primitive::U16,
            "u32" => Primitive::U32,
            "u64" => Primitive::U64,
            "f32" => Primitive::F32,
            "f64" => Primitive::F64,
            "bool" => Primitive::Bool,
            "byte" => Primitive::Byte,
            "rune" => Primitive::Rune,
            "void" => Primitive::Void,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::Int => "int",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "bool",
            Primitive::Byte => "byte",
            Primitive::Rune => "rune",
            Primitive::Void => "void",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::Int
                | Primitive::I64
                | Primitive::U8
                | Primitive::U16
                | Primitive::U32
                | Primitive::U64
                | Primitive::Byte
                | Primitive::Rune
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    /// Estimated size in bytes, for the optional-payload cap.
    pub fn size(self) -> usize {
        match self {
            Primitive::I8 | Primitive::U8 | Primitive::Byte | Primitive::Bool => 1,
            Primitive::I16 | Primitive::U16 => 2,
            Primitive::Int | Primitive::U32 | Primitive::F32 | Primitive::Rune => 4,
            Primitive::I64 | Primitive::U64 | Primitive::F64 => 8,
            Primitive::Void => 0,
        }
    }
}

/// A Cinder type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Primitive(Primitive),
    /// A named, user-defined or runtime-provided type (`string`, structs,
    /// enums, interfaces, aliases). The name is already module-mangled.
    Named(String),
    /// `&T` in source, `T*` in the output.
    Pointer(Box<TypeExpr>),
    /// `[]T`, lowered to the runtime's growable `array`.
    Array(Box<TypeExpr>),
    /// `map[string]T`, lowered to the runtime's tree map.
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// `?T`: a fallible value with a fixed-capacity payload.
    Option(Box<TypeExpr>),
    /// A function type, used for interface members and callbacks.
    Fn {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
    /// The synthesized aggregate for a multi-value return.
    Multi(Vec<TypeExpr>),
}

impl TypeExpr {
    pub fn void() -> TypeExpr {
        TypeExpr::Primitive(Primitive::Void)
    }

    pub fn int() -> TypeExpr {
        TypeExpr::Primitive(Primitive::Int)
    }

    pub fn bool() -> TypeExpr {
        TypeExpr::Primitive(Primitive::Bool)
    }

    pub fn string() -> TypeExpr {
        TypeExpr::Named("string".into())
    }

    pub fn named(name: impl Into<String>) -> TypeExpr {
        TypeExpr::Named(name.into())
    }

    pub fn pointer(inner: TypeExpr) -> TypeExpr {
        TypeExpr::Pointer(Box::new(inner))
    }

    pub fn array_of(elem: TypeExpr) -> TypeExpr {
        TypeExpr::Array(Box::new(elem))
    }

    pub fn option_of(inner: TypeExpr) -> TypeExpr {
        TypeExpr::Option(Box::new(inner))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeExpr::Primitive(Primitive::Void))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, TypeExpr::Primitive(Primitive::Bool))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, TypeExpr::Named(name) if name == "string")
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeExpr::Primitive(p) if p.is_integer() || p.is_float())
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeExpr::Pointer(_)) || self.is_voidptr()
    }

    pub fn is_voidptr(&self) -> bool {
        matches!(self, TypeExpr::Named(name) if name == "voidptr")
    }

    pub fn is_option(&self) -> bool {
        matches!(self, TypeExpr::Option(_))
    }

    /// The mangled identifier used in emitted C for this type; doubles as
    /// the key for registering synthesized aggregate types.
    pub fn mangled(&self) -> String {
        match self {
            TypeExpr::Primitive(p) => p.name().to_string(),
            TypeExpr::Named(name) => name.clone(),
            TypeExpr::Pointer(inner) => format!("{}_ptr", inner.mangled()),
            TypeExpr::Array(elem) => format!("array_{}", elem.mangled()),
            TypeExpr::Map(key, val) => format!("map_{}_{}", key.mangled(), val.mangled()),
            TypeExpr::Option(inner) => format!("Option_{}", inner.mangled()),
            TypeExpr::Fn { params, ret } => {
                let mut name = String::from("fn");
                for p in params {
                    name.push('_');
                    name.push_str(&p.mangled());
                }
                name.push_str("_to_");
                name.push_str(&ret.mangled());
                name
            }
            TypeExpr::Multi(parts) => {
                let mut name = String::from("multi");
                for p in parts {
                    name.push('_');
                    name.push_str(&p.mangled());
                }
                name
            }
        }
    }

    /// The C spelling of this type as used in declarations and casts.
    pub fn cname(&self) -> String {
        match self {
            TypeExpr::Primitive(Primitive::Void) => "void".to_string(),
            TypeExpr::Primitive(p) => p.name().to_string(),
            TypeExpr::Named(name) => name.clone(),
            TypeExpr::Pointer(inner) => format!("{}*", inner.cname()),
            TypeExpr::Array(_) => "array".to_string(),
            TypeExpr::Map(_, _) => "map".to_string(),
            TypeExpr::Option(_) => "CdrOption".to_string(),
            TypeExpr::Fn { .. } => "voidptr".to_string(),
            TypeExpr::Multi(_) => self.mangled(),
        }
    }

    /// Format directive for string interpolation of a value of this type.
    pub fn format_spec(&self) -> &'static str {
        match self {
            TypeExpr::Primitive(p) if p.is_float() => "%f",
            TypeExpr::Primitive(Primitive::I64) | TypeExpr::Primitive(Primitive::U64) => "%lld",
            TypeExpr::Primitive(p) if p.is_integer() => "%d",
            TypeExpr::Primitive(Primitive::Bool) => "%d",
            TypeExpr::Named(name) if name == "string" => "%.*s",
            TypeExpr::Pointer(_) => "%p",
            _ => "%d",
        }
    }
}

impl Display for TypeExpr {
    /// Source-level spelling, for error messages.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => f.write_str(p.name()),
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Pointer(inner) => write!(f, "&{inner}"),
            TypeExpr::Array(elem) => write!(f, "[]{elem}"),
            TypeExpr::Map(key, val) => write!(f, "map[{key}]{val}"),
            TypeExpr::Option(inner) => write!(f, "?{inner}"),
            TypeExpr::Fn { params, ret } => {
                f.write_str("fn (")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") {ret}")
            }
            TypeExpr::Multi(parts) => {
                f.write_str("(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_compound_types() {
        assert_eq!(TypeExpr::array_of(TypeExpr::int()).mangled(), "array_int");
        assert_eq!(
            TypeExpr::option_of(TypeExpr::string()).mangled(),
            "Option_string"
        );
        assert_eq!(
            TypeExpr::Map(Box::new(TypeExpr::string()), Box::new(TypeExpr::int())).mangled(),
            "map_string_int"
        );
        assert_eq!(
            TypeExpr::Multi(vec![TypeExpr::int(), TypeExpr::string()]).mangled(),
            "multi_int_string"
        );
    }

    #[test]
    fn cname_of_pointer_appends_star() {
        assert_eq!(TypeExpr::pointer(TypeExpr::int()).cname(), "int*");
        assert_eq!(
            TypeExpr::pointer(TypeExpr::named("Node")).cname(),
            "Node*"
        );
    }

    #[test]
    fn arrays_and_options_lower_to_runtime_structs() {
        assert_eq!(TypeExpr::array_of(TypeExpr::int()).cname(), "array");
        assert_eq!(TypeExpr::option_of(TypeExpr::int()).cname(), "CdrOption");
    }

    #[test]
    fn display_uses_source_spelling() {
        let t = TypeExpr::array_of(TypeExpr::option_of(TypeExpr::named("User")));
        assert_eq!(t.to_string(), "[]?User");
        assert_eq!(TypeExpr::pointer(TypeExpr::int()).to_string(), "&int");
    }

    #[test]
    fn numeric_predicates() {
        assert!(TypeExpr::int().is_numeric());
        assert!(TypeExpr::Primitive(Primitive::F32).is_numeric());
        assert!(!TypeExpr::string().is_numeric());
        assert!(TypeExpr::named("voidptr").is_pointer());
    }

    #[test]
    fn format_specs_follow_value_type() {
        assert_eq!(TypeExpr::int().format_spec(), "%d");
        assert_eq!(TypeExpr::string().format_spec(), "%.*s");
        assert_eq!(TypeExpr::Primitive(Primitive::F64).format_spec(), "%f");
    }
}
