//! Schema derivation: turns a tool's declared parameter list into an
//! immutable [`InvocationSchema`].
//!
//! Tools declare their parameters at registration time through a
//! [`Signature`]. Each parameter carries a [`TypeAnnotation`], usually
//! produced from a Rust type via [`Annotated`]:
//!
//! ```
//! use bareagent_core::schema::{derive, Signature};
//!
//! let sig = Signature::new()
//!     .arg::<String>("city")
//!     .arg::<Option<i64>>("days");
//! let schema = derive("get_forecast", &sig, "Get forecast").unwrap();
//! assert_eq!(schema.required(), vec!["city"]);
//! assert_eq!(schema.optional(), vec!["days"]);
//! ```
//!
//! Derivation is pure: the same signature and description always yield a
//! structurally identical schema.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::SchemaError;

/// Reserved parameter name satisfied by context propagation instead of the model.
pub const CONTEXT_PARAM: &str = "ctx";

/// The declared type of one tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    String,
    Integer,
    Float,
    Boolean,
    /// `T | None`
    Optional(Box<TypeAnnotation>),
    /// A fixed set of literal values.
    Literal(Vec<Value>),
    /// A list; `None` when the item type was not given.
    List(Option<Box<TypeAnnotation>>),
    Map,
    Union(Vec<TypeAnnotation>),
    /// The unit/none type, only meaningful inside a union.
    None,
    Custom(String),
    Any,
    /// Parameter declared without any annotation.
    Missing,
    /// The ambient tool context.
    Context,
}

impl fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeAnnotation::String => write!(f, "string"),
            TypeAnnotation::Integer => write!(f, "integer"),
            TypeAnnotation::Float => write!(f, "float"),
            TypeAnnotation::Boolean => write!(f, "boolean"),
            TypeAnnotation::Optional(inner) => write!(f, "{inner} | none"),
            TypeAnnotation::Literal(values) => {
                let values: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "literal[{}]", values.join(", "))
            }
            TypeAnnotation::List(Some(inner)) => write!(f, "list<{inner}>"),
            TypeAnnotation::List(None) => write!(f, "list"),
            TypeAnnotation::Map => write!(f, "map"),
            TypeAnnotation::Union(members) => {
                let members: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "{}", members.join(" | "))
            }
            TypeAnnotation::None => write!(f, "none"),
            TypeAnnotation::Custom(name) => write!(f, "{name}"),
            TypeAnnotation::Any => write!(f, "any"),
            TypeAnnotation::Missing => write!(f, "<missing>"),
            TypeAnnotation::Context => write!(f, "context"),
        }
    }
}

/// Rust types that map onto a [`TypeAnnotation`].
pub trait Annotated {
    fn annotation() -> TypeAnnotation;
}

macro_rules! annotated {
    ($ann:expr => $($t:ty),+ $(,)?) => {
        $(
            impl Annotated for $t {
                fn annotation() -> TypeAnnotation {
                    $ann
                }
            }
        )+
    };
}

annotated!(TypeAnnotation::String => String, &str, PathBuf, char);
annotated!(TypeAnnotation::Integer => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
annotated!(TypeAnnotation::Float => f32, f64);
annotated!(TypeAnnotation::Boolean => bool);
annotated!(TypeAnnotation::Any => Value);
annotated!(TypeAnnotation::Map => serde_json::Map<String, Value>);
annotated!(TypeAnnotation::None => ());

impl<T: Annotated> Annotated for Option<T> {
    fn annotation() -> TypeAnnotation {
        TypeAnnotation::Optional(Box::new(T::annotation()))
    }
}

impl<T: Annotated> Annotated for Vec<T> {
    fn annotation() -> TypeAnnotation {
        TypeAnnotation::List(Some(Box::new(T::annotation())))
    }
}

impl<K, V, S> Annotated for HashMap<K, V, S> {
    fn annotation() -> TypeAnnotation {
        TypeAnnotation::Map
    }
}

impl<K, V> Annotated for BTreeMap<K, V> {
    fn annotation() -> TypeAnnotation {
        TypeAnnotation::Map
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureParam {
    pub name: String,
    pub annotation: TypeAnnotation,
    pub default: Option<Value>,
}

/// The ordered parameter list a tool declares at registration time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<SignatureParam>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter typed as `T`.
    pub fn arg<T: Annotated>(self, name: impl Into<String>) -> Self {
        self.arg_annotated(name, T::annotation())
    }

    /// Declare a parameter typed as the default's type; it is not required.
    pub fn arg_with_default<T>(self, name: impl Into<String>, default: T) -> Self
    where
        T: Annotated + Into<Value>,
    {
        self.push(name.into(), T::annotation(), Some(default.into()))
    }

    /// Declare a parameter with an explicit annotation.
    pub fn arg_annotated(self, name: impl Into<String>, annotation: TypeAnnotation) -> Self {
        self.push(name.into(), annotation, None)
    }

    /// Declare a parameter with an explicit annotation and a default value.
    pub fn arg_annotated_with_default(
        self,
        name: impl Into<String>,
        annotation: TypeAnnotation,
        default: Value,
    ) -> Self {
        self.push(name.into(), annotation, Some(default))
    }

    /// Declare the reserved context slot.
    pub fn context(self) -> Self {
        self.push(CONTEXT_PARAM.to_string(), TypeAnnotation::Context, None)
    }

    pub fn params(&self) -> &[SignatureParam] {
        &self.params
    }

    fn push(mut self, name: String, annotation: TypeAnnotation, default: Option<Value>) -> Self {
        self.params.push(SignatureParam {
            name,
            annotation,
            default,
        });
        self
    }
}

/// A primitive JSON-schema kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    String,
    Integer,
    Float,
    Boolean,
}

impl Primitive {
    pub fn json_type(self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Float => "number",
            Primitive::Boolean => "boolean",
        }
    }

    fn from_annotation(annotation: &TypeAnnotation) -> Option<Self> {
        match annotation {
            TypeAnnotation::String => Some(Primitive::String),
            TypeAnnotation::Integer => Some(Primitive::Integer),
            TypeAnnotation::Float => Some(Primitive::Float),
            TypeAnnotation::Boolean => Some(Primitive::Boolean),
            _ => None,
        }
    }

    fn of_literal(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Primitive::String),
            Value::Bool(_) => Some(Primitive::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Primitive::Integer),
            Value::Number(_) => Some(Primitive::Float),
            _ => None,
        }
    }
}

/// The accepted shape of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Primitive(Primitive),
    Enum { base: Primitive, values: Vec<Value> },
    Array(Primitive),
}

impl ParamKind {
    /// JSON-schema fragment for this kind.
    pub fn to_json(&self) -> Value {
        match self {
            ParamKind::Primitive(p) => json!({ "type": p.json_type() }),
            ParamKind::Enum { base, values } => json!({ "type": base.json_type(), "enum": values }),
            ParamKind::Array(item) => json!({
                "type": "array",
                "items": { "type": item.json_type() }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSchema {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

/// The invocation contract of a tool: ordered parameters plus whether the
/// tool wants the ambient context injected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvocationSchema {
    params: Vec<ParamSchema>,
    context_slot: bool,
}

impl InvocationSchema {
    pub fn params(&self) -> &[ParamSchema] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ParamSchema> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn required(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn optional(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| !p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn has_context_slot(&self) -> bool {
        self.context_slot
    }

    /// Render as a strict JSON-schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &self.params {
            let mut property = param.kind.to_json();
            if let (Some(default), Value::Object(map)) = (&param.default, &mut property) {
                map.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), property);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required(),
            "additionalProperties": false,
        })
    }
}

/// Derive the invocation schema of a tool.
pub fn derive(
    tool: &str,
    signature: &Signature,
    description: &str,
) -> Result<InvocationSchema, SchemaError> {
    if description.trim().is_empty() {
        return Err(SchemaError::MissingDescription { tool: tool.into() });
    }

    let mut seen = HashSet::new();
    let mut schema = InvocationSchema::default();

    for param in signature.params() {
        if !seen.insert(param.name.as_str()) {
            return Err(SchemaError::DuplicateParameter {
                tool: tool.into(),
                param: param.name.clone(),
            });
        }

        if param.name == CONTEXT_PARAM {
            schema.context_slot = true;
            continue;
        }

        let resolver = Resolver {
            tool,
            param: &param.name,
        };
        let (kind, optional) = resolver.resolve(&param.annotation)?;

        schema.params.push(ParamSchema {
            name: param.name.clone(),
            kind,
            required: !optional && param.default.is_none(),
            default: param.default.clone(),
        });
    }

    Ok(schema)
}

struct Resolver<'a> {
    tool: &'a str,
    param: &'a str,
}

impl Resolver<'_> {
    /// Returns the kind and whether the annotation itself marks it optional.
    fn resolve(&self, annotation: &TypeAnnotation) -> Result<(ParamKind, bool), SchemaError> {
        match annotation {
            TypeAnnotation::Missing => Err(SchemaError::MissingAnnotation {
                tool: self.tool.into(),
                param: self.param.into(),
            }),
            TypeAnnotation::Optional(inner) => match inner.as_ref() {
                TypeAnnotation::Optional(_) | TypeAnnotation::None => Err(self.unsupported(annotation)),
                inner => self.resolve(inner).map(|(kind, _)| (kind, true)),
            },
            TypeAnnotation::Union(members) => {
                let non_null: Vec<&TypeAnnotation> = members
                    .iter()
                    .filter(|m| !matches!(m, TypeAnnotation::None))
                    .collect();
                let has_null = non_null.len() < members.len();
                match (non_null.as_slice(), has_null) {
                    ([single], true) => self.resolve(&TypeAnnotation::Optional(Box::new((*single).clone()))),
                    ([single], false) => self.resolve(single),
                    _ => Err(SchemaError::NonOptionalUnion {
                        tool: self.tool.into(),
                        param: self.param.into(),
                    }),
                }
            }
            TypeAnnotation::Literal(values) => self.literal(annotation, values).map(|k| (k, false)),
            TypeAnnotation::List(None) => Err(SchemaError::BareList {
                tool: self.tool.into(),
                param: self.param.into(),
            }),
            TypeAnnotation::List(Some(item)) => Primitive::from_annotation(item)
                .map(|p| (ParamKind::Array(p), false))
                .ok_or_else(|| self.unsupported(annotation)),
            other => Primitive::from_annotation(other)
                .map(|p| (ParamKind::Primitive(p), false))
                .ok_or_else(|| self.unsupported(other)),
        }
    }

    fn literal(&self, annotation: &TypeAnnotation, values: &[Value]) -> Result<ParamKind, SchemaError> {
        let Some(first) = values.first() else {
            return Err(SchemaError::EmptyLiteral {
                tool: self.tool.into(),
                param: self.param.into(),
            });
        };
        let base = Primitive::of_literal(first).ok_or_else(|| self.unsupported(annotation))?;
        if values.iter().any(|v| Primitive::of_literal(v) != Some(base)) {
            return Err(SchemaError::MixedLiteral {
                tool: self.tool.into(),
                param: self.param.into(),
            });
        }
        Ok(ParamKind::Enum {
            base,
            values: values.to_vec(),
        })
    }

    fn unsupported(&self, annotation: &TypeAnnotation) -> SchemaError {
        SchemaError::UnsupportedType {
            tool: self.tool.into(),
            param: self.param.into(),
            found: annotation.to_string(),
        }
    }
}
