//! Declaration and resolution of the named options that govern a consumer run.
//!
//! The [`Consumer`](crate::Consumer) declares its built-in options on an [`OptionsResolver`],
//! processors add their own through [`Processor::configure`](crate::Processor::configure),
//! and the caller's [`Overrides`] are then resolved into an immutable [`Options`] value.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Built-in option: pause between two polling rounds, in microseconds.
pub const POLL_INTERVAL: &str = "poll_interval";
/// Built-in option: name of the consumed queue.
pub const QUEUE: &str = "queue";
/// Built-in option: consumption method, `consume` (push) or `get` (pull).
pub const METHOD: &str = "method";

/// Default pause between two polling rounds (50ms).
pub const DEFAULT_POLL_INTERVAL_MICROS: u64 = 50_000;

/// The JSON-ish type an option value may be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Null,
    Bool,
    Integer,
    UnsignedInteger,
    Float,
    String,
    Array,
    Object,
}

impl OptionType {
    /// Whether `value` is of this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            OptionType::Null => value.is_null(),
            OptionType::Bool => value.is_boolean(),
            OptionType::Integer => value.is_i64() || value.is_u64(),
            OptionType::UnsignedInteger => value.is_u64(),
            OptionType::Float => value.is_number(),
            OptionType::String => value.is_string(),
            OptionType::Array => value.is_array(),
            OptionType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionType::Null => "null",
            OptionType::Bool => "bool",
            OptionType::Integer => "integer",
            OptionType::UnsignedInteger => "unsigned integer",
            OptionType::Float => "float",
            OptionType::String => "string",
            OptionType::Array => "array",
            OptionType::Object => "object",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct OptionSpec {
    default: Value,
    allowed_types: Option<Vec<OptionType>>,
    allowed_values: Option<Vec<Value>>,
}

/// Schema of recognized options: defaults plus type and value constraints.
///
/// Declaring a default is what makes an option known; constraints set on an undeclared
/// key declare it with a `null` default.
#[derive(Debug, Clone, Default)]
pub struct OptionsResolver {
    specs: BTreeMap<String, OptionSpec>,
}

impl OptionsResolver {
    /// Create a resolver with no declared options
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `key` with a default value, replacing any previous default.
    pub fn set_default(&mut self, key: impl Into<String>, default: impl Into<Value>) -> &mut Self {
        let default = default.into();
        self.specs
            .entry(key.into())
            .and_modify(|spec| spec.default = default.clone())
            .or_insert_with(|| OptionSpec {
                default,
                allowed_types: None,
                allowed_values: None,
            });
        self
    }

    /// Declare several defaults at once.
    pub fn set_defaults<K, V>(&mut self, defaults: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, default) in defaults {
            self.set_default(key, default);
        }
        self
    }

    /// Restrict `key` to values of the given types.
    pub fn set_allowed_types(&mut self, key: impl Into<String>, types: &[OptionType]) -> &mut Self {
        self.spec_mut(key.into()).allowed_types = Some(types.to_vec());
        self
    }

    /// Restrict `key` to one of the given values.
    pub fn set_allowed_values<V>(
        &mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self
    where
        V: Into<Value>,
    {
        self.spec_mut(key.into()).allowed_values =
            Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether `key` has been declared
    pub fn is_defined(&self, key: &str) -> bool {
        self.specs.contains_key(key)
    }

    /// Names of every declared option, sorted.
    pub fn defined_options(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    /// Merge `overrides` onto the declared defaults and validate the result.
    ///
    /// Fails on unknown keys, and on any value (override or default) that violates the
    /// allowed types or allowed values of its option.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Options, ConfigError> {
        if let Some(key) = overrides.keys().find(|key| !self.specs.contains_key(*key)) {
            return Err(ConfigError::UndefinedOption {
                key: key.clone(),
                known: self.defined_options(),
            });
        }

        let mut values = BTreeMap::new();
        for (key, spec) in &self.specs {
            let value = overrides
                .get(key)
                .cloned()
                .unwrap_or_else(|| spec.default.clone());

            if let Some(types) = &spec.allowed_types {
                if !types.iter().any(|ty| ty.matches(&value)) {
                    return Err(ConfigError::InvalidType {
                        key: key.clone(),
                        expected: types.clone(),
                        actual: value,
                    });
                }
            }

            if let Some(allowed) = &spec.allowed_values {
                if !allowed.contains(&value) {
                    return Err(ConfigError::InvalidValue {
                        key: key.clone(),
                        value,
                        allowed: allowed.clone(),
                    });
                }
            }

            values.insert(key.clone(), value);
        }

        Ok(Options { values })
    }

    fn spec_mut(&mut self, key: String) -> &mut OptionSpec {
        self.specs.entry(key).or_insert_with(|| OptionSpec {
            default: Value::Null,
            allowed_types: None,
            allowed_values: None,
        })
    }
}

/// Caller-supplied option values for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    values: Map<String, Value>,
}

impl Overrides {
    /// Create an empty set of overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an override (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set an override
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// The override for `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The overridden keys
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    /// Whether nothing is overridden
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for Overrides {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// How the consumer receives messages from its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeMethod {
    /// Push mode: a blocking subscription delivers messages to a handler.
    #[default]
    Consume,
    /// Pull mode: messages are fetched one at a time, with pauses in between.
    Get,
}

impl ConsumeMethod {
    /// The option value for this method
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumeMethod::Consume => "consume",
            ConsumeMethod::Get => "get",
        }
    }
}

impl fmt::Display for ConsumeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consume" => Ok(ConsumeMethod::Consume),
            "get" => Ok(ConsumeMethod::Get),
            other => Err(format!("unknown consume method: {other}")),
        }
    }
}

impl From<ConsumeMethod> for Value {
    fn from(method: ConsumeMethod) -> Self {
        Value::String(method.as_str().to_string())
    }
}

/// The resolved, immutable options of a single consumer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    values: BTreeMap<String, Value>,
}

impl Options {
    /// The raw value of `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value of `key` as an unsigned integer, `None` when absent or null.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// The value of `key` as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The value of `key` as a boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Whether `key` was resolved
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Every resolved option, sorted by key
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Pause between two polling rounds in pull mode.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(
            self.get_u64(POLL_INTERVAL)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MICROS),
        )
    }

    /// Name of the consumed queue.
    pub fn queue(&self) -> &str {
        self.get_str(QUEUE).unwrap_or_default()
    }

    /// The consumption method; push mode unless `method` resolved to `get`.
    pub fn method(&self) -> ConsumeMethod {
        self.get_str(METHOD)
            .and_then(|method| method.parse().ok())
            .unwrap_or_default()
    }
}
