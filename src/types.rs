//! Type model for the core (C1)
//!
//! Primitives, pointers, arrays, structs, unions, tagged enums, function
//! pointers, refined wrappers, and the zero-width linear marker. Recursive
//! shapes (an enum variant that embeds its own enum, a struct with a pointer
//! to itself) are represented through a [`TypeId`] handle into a [`TypeArena`]
//! rather than by direct embedding, so a Rust value for the type itself never
//! needs to be infinitely sized.

use std::collections::HashSet;
use std::fmt;

/// A reference to a predicate function usable in a [`Type::Refined`] wrapper.
///
/// Stored as a name rather than a resolved function pointer: predicate
/// identity for refined-to-refined conversion (§4.4) is structural (by name),
/// not by call target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncRef(pub String);

/// Signedness + bit width of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntType {
    pub signed: bool,
    pub width: u32,
}

impl IntType {
    pub const VALID_WIDTHS: [u32; 4] = [8, 16, 32, 64];

    pub fn new(signed: bool, width: u32) -> Result<Self, String> {
        if !Self::VALID_WIDTHS.contains(&width) {
            return Err(format!(
                "invalid integer width {width}; must be one of {:?}",
                Self::VALID_WIDTHS
            ));
        }
        Ok(IntType { signed, width })
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.signed { "i" } else { "u" }, self.width)
    }
}

/// Floating-point kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F16,
    Bf16,
    F32,
    F64,
    F128,
}

impl fmt::Display for FloatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FloatKind::F16 => "f16",
            FloatKind::Bf16 => "bf16",
            FloatKind::F32 => "f32",
            FloatKind::F64 => "f64",
            FloatKind::F128 => "f128",
        };
        write!(f, "{s}")
    }
}

/// A stable handle into a [`TypeArena`]. Used wherever a type shape would
/// otherwise need to embed itself (recursive enum payloads, self-referential
/// struct pointers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// A named or anonymous field in a struct/union.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: Option<String>,
    pub ty: Type,
}

/// One variant of a tagged enum: a name, its discriminant value, and an
/// optional payload type (`None` for a bare marker variant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant {
    pub name: String,
    pub tag_value: i64,
    pub payload: Option<Type>,
}

/// The core type model (C1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int(IntType),
    Float(FloatKind),
    Bool,
    Void,
    Ptr(Box<Type>),
    /// A nonempty list of positive dimensions, e.g. `Array(Int, [4, 4])`.
    Array(Box<Type>, Vec<u64>),
    Struct(Vec<Field>),
    Union(Vec<Field>),
    Enum {
        tag_type: IntType,
        variants: Vec<Variant>,
    },
    Func {
        params: Vec<Type>,
        result: Box<Type>,
        variadic: bool,
    },
    /// Zero-width linear marker; see §3 and [`crate::linear`].
    Linear,
    Refined {
        base: Box<Type>,
        predicates: Vec<FuncRef>,
        tags: HashSet<String>,
    },
    /// A recursive reference resolved through a [`TypeArena`].
    Recursive(TypeId),
}

impl Type {
    /// Whether this type (including nested fields/payloads) contains a
    /// `Linear` marker anywhere in its structure. Used by the linear checker
    /// to decide whether a variable needs ownership tracking at all.
    pub fn contains_linear(&self) -> bool {
        match self {
            Type::Linear => true,
            Type::Ptr(inner) | Type::Array(inner, _) => inner.contains_linear(),
            Type::Struct(fields) | Type::Union(fields) => {
                fields.iter().any(|f| f.ty.contains_linear())
            }
            Type::Enum { variants, .. } => variants
                .iter()
                .any(|v| v.payload.as_ref().is_some_and(Type::contains_linear)),
            Type::Refined { base, .. } => base.contains_linear(),
            Type::Func { .. } | Type::Recursive(_) => false,
            Type::Int(_) | Type::Float(_) | Type::Bool | Type::Void => false,
        }
    }

    /// The arity a refinement predicate over this type's "shape" must have:
    /// 1 for anything that isn't already a multi-field refined struct, or the
    /// field count for a refined type built from several values at once.
    pub fn refinement_shape_arity(&self) -> usize {
        match self {
            Type::Refined { base, .. } => base.refinement_shape_arity(),
            _ => 1,
        }
    }

    pub fn is_refined(&self) -> bool {
        matches!(self, Type::Refined { .. })
    }
}

/// Shape validation invariants for enums: unique variant names, unique tag
/// values. Called once after a `class`+`enum(...)` declaration is lowered
/// into a [`Type::Enum`].
pub fn validate_enum_shape(tag_type: IntType, variants: &[Variant]) -> Result<(), String> {
    let mut names = HashSet::new();
    let mut tags = HashSet::new();
    for v in variants {
        if !names.insert(v.name.as_str()) {
            return Err(format!("duplicate enum variant name '{}'", v.name));
        }
        if !tags.insert(v.tag_value) {
            return Err(format!(
                "duplicate enum tag value {} (variant '{}')",
                v.tag_value, v.name
            ));
        }
    }
    let _ = tag_type;
    Ok(())
}

/// Validates that every predicate in a `Refined` wrapper matches the
/// declared shape arity, per §3's invariant that "refined predicates all
/// take arity matching the refined shape".
pub fn validate_refined_shape(
    base: &Type,
    predicates: &[FuncRef],
    predicate_arities: &dyn Fn(&FuncRef) -> Option<usize>,
) -> Result<(), String> {
    let expected = base.refinement_shape_arity();
    for pred in predicates {
        match predicate_arities(pred) {
            Some(found) if found == expected => {}
            Some(found) => {
                return Err(format!(
                    "predicate '{}' has arity {found}, but refined shape expects arity {expected}",
                    pred.0
                ));
            }
            None => return Err(format!("unknown predicate '{}'", pred.0)),
        }
    }
    Ok(())
}

/// An arena of type records keyed by a stable [`TypeId`], used to break
/// cycles in recursive definitions (§9, "Cyclic references").
#[derive(Debug, Default)]
pub struct TypeArena {
    records: Vec<Type>,
}

impl TypeArena {
    pub fn new() -> Self {
        TypeArena::default()
    }

    /// Reserve a slot for a type that is still being constructed (so that
    /// its own body can reference it via `Type::Recursive(id)` before the
    /// real definition is known).
    pub fn reserve(&mut self) -> TypeId {
        let id = TypeId(self.records.len() as u32);
        self.records.push(Type::Void);
        id
    }

    pub fn define(&mut self, id: TypeId, ty: Type) {
        self.records[id.0 as usize] = ty;
    }

    pub fn insert(&mut self, ty: Type) -> TypeId {
        let id = self.reserve();
        self.define(id, ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.records[id.0 as usize]
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(i) => write!(f, "{i}"),
            Type::Float(k) => write!(f, "{k}"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Ptr(inner) => write!(f, "ptr[{inner}]"),
            Type::Array(inner, dims) => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "array[{inner}, {}]", dims.join(", "))
            }
            Type::Struct(fields) => write!(f, "struct{{{}}}", format_fields(fields)),
            Type::Union(fields) => write!(f, "union{{{}}}", format_fields(fields)),
            Type::Enum { variants, .. } => {
                let names: Vec<&str> = variants.iter().map(|v| v.name.as_str()).collect();
                write!(f, "enum{{{}}}", names.join(" | "))
            }
            Type::Func {
                params,
                result,
                variadic,
            } => {
                let mut parts: Vec<String> = params.iter().map(|t| t.to_string()).collect();
                if *variadic {
                    parts.push("...".to_string());
                }
                write!(f, "fn({}) -> {result}", parts.join(", "))
            }
            Type::Linear => write!(f, "linear"),
            Type::Refined {
                base,
                predicates,
                tags,
            } => {
                let preds: Vec<&str> = predicates.iter().map(|p| p.0.as_str()).collect();
                let mut tag_list: Vec<&str> = tags.iter().map(String::as_str).collect();
                tag_list.sort_unstable();
                write!(
                    f,
                    "refined[{base}, ({}), ({})]",
                    preds.join(", "),
                    tag_list.join(", ")
                )
            }
            Type::Recursive(id) => write!(f, "<rec {}>", id.0),
        }
    }
}

fn format_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|field| match &field.name {
            Some(name) => format!("{name}: {}", field.ty),
            None => field.ty.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_ty() -> Type {
        Type::Int(IntType::new(true, 32).unwrap())
    }

    #[test]
    fn linear_is_zero_width_and_detected_transitively() {
        assert!(Type::Linear.contains_linear());
        let s = Type::Struct(vec![
            Field {
                name: Some("a".into()),
                ty: i32_ty(),
            },
            Field {
                name: Some("tok".into()),
                ty: Type::Linear,
            },
        ]);
        assert!(s.contains_linear());
        assert!(!i32_ty().contains_linear());
    }

    #[test]
    fn enum_shape_rejects_duplicate_names_and_tags() {
        let tag_type = IntType::new(false, 8).unwrap();
        let dup_name = vec![
            Variant {
                name: "A".into(),
                tag_value: 0,
                payload: None,
            },
            Variant {
                name: "A".into(),
                tag_value: 1,
                payload: None,
            },
        ];
        assert!(validate_enum_shape(tag_type, &dup_name).is_err());

        let dup_tag = vec![
            Variant {
                name: "A".into(),
                tag_value: 0,
                payload: None,
            },
            Variant {
                name: "B".into(),
                tag_value: 0,
                payload: None,
            },
        ];
        assert!(validate_enum_shape(tag_type, &dup_tag).is_err());

        let ok = vec![
            Variant {
                name: "A".into(),
                tag_value: 0,
                payload: None,
            },
            Variant {
                name: "B".into(),
                tag_value: 1,
                payload: Some(i32_ty()),
            },
        ];
        assert!(validate_enum_shape(tag_type, &ok).is_ok());
    }

    #[test]
    fn refined_arity_must_match_shape() {
        let base = i32_ty();
        let preds = vec![FuncRef("is_positive".into())];
        let arity_of = |_: &FuncRef| Some(1usize);
        assert!(validate_refined_shape(&base, &preds, &arity_of).is_ok());

        let wrong_arity = |_: &FuncRef| Some(2usize);
        assert!(validate_refined_shape(&base, &preds, &wrong_arity).is_err());
    }

    #[test]
    fn type_arena_supports_self_reference() {
        let mut arena = TypeArena::new();
        let id = arena.reserve();
        let list_node = Type::Struct(vec![
            Field {
                name: Some("value".into()),
                ty: i32_ty(),
            },
            Field {
                name: Some("next".into()),
                ty: Type::Ptr(Box::new(Type::Recursive(id))),
            },
        ]);
        arena.define(id, list_node.clone());
        assert_eq!(arena.get(id), &list_node);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(i32_ty().to_string(), "i32");
        assert_eq!(Type::Ptr(Box::new(i32_ty())).to_string(), "ptr[i32]");
    }
}
