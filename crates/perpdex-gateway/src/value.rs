//! Typed contract values and their wire form.
//!
//! On the wire every value is a `{"type": ..., "value": ...}` object. 64- and
//! 128-bit integers travel as decimal strings so JSON number precision never
//! truncates them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Argument or return type named in an interface descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArgType {
    Address,
    Bool,
    U32,
    U64,
    U128,
    I128,
    String,
    Void,
    Vec(Box<ArgType>),
    /// Named struct defined in the descriptor's `types` table.
    Struct(String),
}

impl FromStr for ArgType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let ty = match s {
            "address" => Self::Address,
            "bool" => Self::Bool,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "u128" => Self::U128,
            "i128" => Self::I128,
            "string" => Self::String,
            "void" => Self::Void,
            _ => {
                if let Some(inner) = s.strip_prefix("vec<").and_then(|r| r.strip_suffix('>')) {
                    Self::Vec(Box::new(inner.parse()?))
                } else if s.starts_with(|c: char| c.is_ascii_uppercase())
                    && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    Self::Struct(s.to_string())
                } else {
                    return Err(format!("unknown type '{s}'"));
                }
            }
        };
        Ok(ty)
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => f.write_str("address"),
            Self::Bool => f.write_str("bool"),
            Self::U32 => f.write_str("u32"),
            Self::U64 => f.write_str("u64"),
            Self::U128 => f.write_str("u128"),
            Self::I128 => f.write_str("i128"),
            Self::String => f.write_str("string"),
            Self::Void => f.write_str("void"),
            Self::Vec(inner) => write!(f, "vec<{inner}>"),
            Self::Struct(name) => f.write_str(name),
        }
    }
}

impl TryFrom<String> for ArgType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArgType> for String {
    fn from(ty: ArgType) -> Self {
        ty.to_string()
    }
}

/// A contract argument or result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractValue {
    Address(String),
    Bool(bool),
    U32(u32),
    U64(u64),
    U128(u128),
    I128(i128),
    String(String),
    Void,
    Vec(Vec<ContractValue>),
    /// Struct value, fields by name.
    Map(BTreeMap<String, ContractValue>),
}

impl ContractValue {
    /// Wire tag of this value.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Address(_) => "address",
            Self::Bool(_) => "bool",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::U128(_) => "u128",
            Self::I128(_) => "i128",
            Self::String(_) => "string",
            Self::Void => "void",
            Self::Vec(_) => "vec",
            Self::Map(_) => "map",
        }
    }

    pub fn to_wire(&self) -> Value {
        let value = match self {
            Self::Address(s) | Self::String(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::U32(n) => json!(n),
            Self::U64(n) => Value::String(n.to_string()),
            Self::U128(n) => Value::String(n.to_string()),
            Self::I128(n) => Value::String(n.to_string()),
            Self::Void => Value::Null,
            Self::Vec(items) => Value::Array(items.iter().map(Self::to_wire).collect()),
            Self::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_wire()))
                    .collect::<Map<String, Value>>(),
            ),
        };
        json!({ "type": self.type_tag(), "value": value })
    }

    pub fn from_wire(wire: &Value) -> Result<Self, String> {
        let tag = wire
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing 'type' in {wire}"))?;
        let value = wire.get("value").unwrap_or(&Value::Null);

        let parsed = match tag {
            "address" => Self::Address(expect_str(value, tag)?.to_string()),
            "string" => Self::String(expect_str(value, tag)?.to_string()),
            "bool" => Self::Bool(
                value
                    .as_bool()
                    .ok_or_else(|| format!("bool value expected, got {value}"))?,
            ),
            "u32" => Self::U32(parse_int(value, tag)?),
            "u64" => Self::U64(parse_int(value, tag)?),
            "u128" => Self::U128(parse_int(value, tag)?),
            "i128" => Self::I128(parse_int(value, tag)?),
            "void" => Self::Void,
            "vec" => Self::Vec(
                value
                    .as_array()
                    .ok_or_else(|| format!("vec value expected, got {value}"))?
                    .iter()
                    .map(Self::from_wire)
                    .collect::<Result<_, _>>()?,
            ),
            "map" => Self::Map(
                value
                    .as_object()
                    .ok_or_else(|| format!("map value expected, got {value}"))?
                    .iter()
                    .map(|(name, field)| Ok((name.clone(), Self::from_wire(field)?)))
                    .collect::<Result<_, String>>()?,
            ),
            other => return Err(format!("unknown value type '{other}'")),
        };
        Ok(parsed)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Self::U128(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::I128(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&str> {
        match self {
            Self::Address(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_void(&self) -> Option<()> {
        matches!(self, Self::Void).then_some(())
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vec(&self) -> Option<&[ContractValue]> {
        match self {
            Self::Vec(items) => Some(items),
            _ => None,
        }
    }

    /// Struct field by name.
    pub fn field(&self, name: &str) -> Option<&ContractValue> {
        match self {
            Self::Map(fields) => fields.get(name),
            _ => None,
        }
    }
}

/// Account (`G...`) or contract (`C...`) strkey shape.
pub fn is_strkey_address(raw: &str) -> bool {
    raw.len() == 56
        && (raw.starts_with('G') || raw.starts_with('C'))
        && raw.chars().all(|c| matches!(c, 'A'..='Z' | '2'..='7'))
}

fn expect_str<'a>(value: &'a Value, tag: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{tag} value expected as string, got {value}"))
}

fn parse_int<T: FromStr>(value: &Value, tag: &str) -> Result<T, String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(format!("{tag} value expected, got {other}")),
    };
    text.parse()
        .map_err(|_| format!("'{text}' is not a valid {tag}"))
}
