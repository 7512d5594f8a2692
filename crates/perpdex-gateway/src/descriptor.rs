//! Contract interface descriptors.
//!
//! A descriptor lists a contract's methods with typed arguments and return
//! types, plus the struct types they reference. It is distributed as
//! base64-encoded JSON and is the only source of method names and shapes:
//! call payloads are built exclusively by [`InterfaceDescriptor::encode_call`],
//! which rejects unknown methods, wrong arity and mistyped arguments.

use crate::error::{ContractError, ContractResult};
use crate::value::{is_strkey_address, ArgType, ContractValue};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const POSITION_MANAGER_JSON: &str = include_str!("../descriptors/position_manager.json");
const LIQUIDITY_POOL_JSON: &str = include_str!("../descriptors/liquidity_pool.json");

/// Named, typed slot (method argument or struct field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<FieldSpec>,
    #[serde(default = "void_type")]
    pub returns: ArgType,
}

fn void_type() -> ArgType {
    ArgType::Void
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub contract: String,
    #[serde(default)]
    pub version: u32,
    pub methods: Vec<MethodSpec>,
    #[serde(default)]
    pub types: BTreeMap<String, Vec<FieldSpec>>,
}

/// JSON-RPC `invokeContract` params for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedCall {
    pub contract_id: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl InterfaceDescriptor {
    /// Decode a base64-encoded JSON descriptor.
    pub fn from_base64(encoded: &str) -> ContractResult<Self> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| ContractError::Descriptor(format!("base64: {e}")))?;
        let descriptor: Self = serde_json::from_slice(&bytes)
            .map_err(|e| ContractError::Descriptor(format!("json: {e}")))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn from_json(json: &str) -> ContractResult<Self> {
        let descriptor: Self = serde_json::from_str(json)
            .map_err(|e| ContractError::Descriptor(format!("json: {e}")))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn to_base64(&self) -> ContractResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ContractError::Descriptor(format!("json: {e}")))?;
        Ok(general_purpose::STANDARD.encode(json))
    }

    /// Descriptor shipped with the client for the position manager.
    pub fn position_manager() -> ContractResult<Self> {
        Self::from_json(POSITION_MANAGER_JSON)
    }

    /// Descriptor shipped with the client for the liquidity pool.
    pub fn liquidity_pool() -> ContractResult<Self> {
        Self::from_json(LIQUIDITY_POOL_JSON)
    }

    /// Method names must be unique and every struct reference must resolve.
    fn validate(&self) -> ContractResult<()> {
        let mut seen = HashSet::new();
        for method in &self.methods {
            if !seen.insert(method.name.as_str()) {
                return Err(ContractError::Descriptor(format!(
                    "duplicate method '{}'",
                    method.name
                )));
            }
            for slot in &method.args {
                self.check_type_defined(&slot.ty)?;
            }
            self.check_type_defined(&method.returns)?;
        }
        for fields in self.types.values() {
            for field in fields {
                self.check_type_defined(&field.ty)?;
            }
        }
        Ok(())
    }

    fn check_type_defined(&self, ty: &ArgType) -> ContractResult<()> {
        match ty {
            ArgType::Vec(inner) => self.check_type_defined(inner),
            ArgType::Struct(name) if !self.types.contains_key(name) => Err(
                ContractError::Descriptor(format!("undefined type '{name}'")),
            ),
            _ => Ok(()),
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }

    /// Validate `args` against `method` and build the call payload.
    pub fn encode_call(
        &self,
        contract_id: &str,
        method: &str,
        args: &[ContractValue],
    ) -> ContractResult<EncodedCall> {
        let spec = self
            .method(method)
            .ok_or_else(|| ContractError::UnknownMethod(method.to_string()))?;

        if args.len() != spec.args.len() {
            return Err(ContractError::invalid_arguments(
                method,
                format!("expected {} arguments, got {}", spec.args.len(), args.len()),
            ));
        }

        for (slot, value) in spec.args.iter().zip(args) {
            self.conforms(value, &slot.ty)
                .map_err(|reason| ContractError::invalid_arguments(method, format!("{}: {reason}", slot.name)))?;
        }

        Ok(EncodedCall {
            contract_id: contract_id.to_string(),
            method: method.to_string(),
            args: args.iter().map(ContractValue::to_wire).collect(),
        })
    }

    /// Decode a raw `{type, value}` result and check it against the return type.
    pub fn decode_result(&self, method: &str, raw: &Value) -> ContractResult<ContractValue> {
        let spec = self
            .method(method)
            .ok_or_else(|| ContractError::UnknownMethod(method.to_string()))?;
        let value = ContractValue::from_wire(raw)
            .map_err(|e| ContractError::Decode(format!("{method} result: {e}")))?;
        self.conforms(&value, &spec.returns)
            .map_err(|e| ContractError::Decode(format!("{method} result: {e}")))?;
        Ok(value)
    }

    fn conforms(&self, value: &ContractValue, ty: &ArgType) -> Result<(), String> {
        match (ty, value) {
            (ArgType::Address, ContractValue::Address(raw)) => {
                if is_strkey_address(raw) {
                    Ok(())
                } else {
                    Err(format!("'{raw}' is not a valid address"))
                }
            }
            (ArgType::Bool, ContractValue::Bool(_))
            | (ArgType::U32, ContractValue::U32(_))
            | (ArgType::U64, ContractValue::U64(_))
            | (ArgType::U128, ContractValue::U128(_))
            | (ArgType::I128, ContractValue::I128(_))
            | (ArgType::String, ContractValue::String(_))
            | (ArgType::Void, ContractValue::Void) => Ok(()),
            (ArgType::Vec(inner), ContractValue::Vec(items)) => {
                for (idx, item) in items.iter().enumerate() {
                    self.conforms(item, inner)
                        .map_err(|e| format!("[{idx}]: {e}"))?;
                }
                Ok(())
            }
            (ArgType::Struct(name), ContractValue::Map(fields)) => {
                let spec = self
                    .types
                    .get(name)
                    .ok_or_else(|| format!("undefined type '{name}'"))?;
                for slot in spec {
                    let field = fields
                        .get(&slot.name)
                        .ok_or_else(|| format!("{name}.{} missing", slot.name))?;
                    self.conforms(field, &slot.ty)
                        .map_err(|e| format!("{name}.{}: {e}", slot.name))?;
                }
                if let Some(extra) = fields.keys().find(|k| !spec.iter().any(|s| &s.name == *k)) {
                    return Err(format!("{name} has no field '{extra}'"));
                }
                Ok(())
            }
            (expected, actual) => Err(format!("expected {expected}, got {}", actual.type_tag())),
        }
    }
}
