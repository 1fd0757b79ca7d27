//! Parameter descriptors declared by links and the argument maps bound against them.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ChainError;

/// Chain-scoped arguments: parameter name → value.
pub type Args = BTreeMap<String, Value>;

/// Type tag of a parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Int,
    Bool,
    StringList,
}

impl ParamKind {
    pub fn describe(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Int => "integer",
            ParamKind::Bool => "boolean",
            ParamKind::StringList => "list of strings",
        }
    }

    /// Accept `value` as this kind, converting the loose forms a CLI or config file produces
    /// ("8" for an int, "a,b" for a list). Returns `None` when the value cannot be read.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (ParamKind::String, v @ Value::String(_)) => Some(v),
            (ParamKind::Int, v @ Value::Number(_)) if v.is_i64() => Some(v),
            (ParamKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParamKind::Bool, v @ Value::Bool(_)) => Some(v),
            (ParamKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (ParamKind::StringList, Value::Array(items)) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Some(Value::String(s)),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            (ParamKind::StringList, Value::String(s)) => Some(Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// A parameter a link accepts: name, type, optional default, required flag and help text.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    name: String,
    kind: ParamKind,
    help: String,
    default: Option<Value>,
    required: bool,
    shortcode: Option<String>,
}

impl Param {
    fn new(name: &str, kind: ParamKind, help: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            help: help.to_string(),
            default: None,
            required: false,
            shortcode: None,
        }
    }

    pub fn string(name: &str, help: &str) -> Self {
        Self::new(name, ParamKind::String, help)
    }

    pub fn int(name: &str, help: &str) -> Self {
        Self::new(name, ParamKind::Int, help)
    }

    pub fn bool(name: &str, help: &str) -> Self {
        Self::new(name, ParamKind::Bool, help)
    }

    pub fn string_list(name: &str, help: &str) -> Self {
        Self::new(name, ParamKind::StringList, help)
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn as_required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_shortcode(mut self, code: &str) -> Self {
        self.shortcode = Some(code.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn shortcode(&self) -> Option<&str> {
        self.shortcode.as_deref()
    }

    /// Resolve this parameter against the chain's args: supplied value (coerced), then default,
    /// then `MissingParam` if required. `Ok(None)` means "not set".
    pub fn resolve(&self, args: &Args) -> Result<Option<Value>, ChainError> {
        match args.get(&self.name) {
            Some(v) => self
                .kind
                .coerce(v.clone())
                .map(Some)
                .ok_or_else(|| ChainError::InvalidParam {
                    name: self.name.clone(),
                    expected: self.kind.describe(),
                }),
            None if self.default.is_some() => Ok(self.default.clone()),
            None if self.required => Err(ChainError::MissingParam(self.name.clone())),
            None => Ok(None),
        }
    }
}

/// Arguments bound to one link: only the parameters it declared, already type-checked.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundArgs {
    values: Args,
}

impl BoundArgs {
    /// Bind `args` against `params`.
    pub fn bind(params: &[Param], args: &Args) -> Result<Self, ChainError> {
        let mut values = Args::new();
        for param in params {
            if let Some(v) = param.resolve(args)? {
                values.insert(param.name().to_string(), v);
            }
        }
        Ok(Self { values })
    }

    /// Typed read of a bound argument. Missing → `MissingParam`; wrong shape → `InvalidParam`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ChainError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ChainError::MissingParam(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|_| ChainError::InvalidParam {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Like [`get`](Self::get) but `None` when the argument is unset.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ChainError> {
        match self.values.contains_key(name) {
            true => self.get(name).map(Some),
            false => Ok(None),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn all(&self) -> &Args {
        &self.values
    }
}
