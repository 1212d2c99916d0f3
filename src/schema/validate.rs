//! Value validators attached to schema leaves.
//!
//! Validators run against the final merged value of a key. A failure is
//! reported as a diagnostic; it never aborts the rest of the resolution.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// JSON-level value types a leaf can be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Any,
}

impl ValueType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" | "str" => Some(ValueType::String),
            "number" | "float" => Some(ValueType::Number),
            "integer" | "int" => Some(ValueType::Integer),
            "boolean" | "bool" => Some(ValueType::Boolean),
            "array" | "list" => Some(ValueType::Array),
            "object" | "map" => Some(ValueType::Object),
            "any" => Some(ValueType::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Any => "any",
        }
    }

    /// Whether `value` is of this type. `Null` only matches `Any`.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
            ValueType::Any => true,
        }
    }

    /// Name of the JSON type of `value`, for messages.
    pub fn name_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "number",
            Value::Number(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type CheckFn = dyn Fn(&Value) -> Result<(), String> + Send + Sync;

/// A check run against a resolved leaf value.
#[derive(Clone)]
pub enum Validator {
    /// Value must be of the given JSON type.
    Type(ValueType),
    /// String value must match the regular expression.
    Pattern(regex_lite::Regex),
    /// Value must equal one of the listed values.
    OneOf(Vec<Value>),
    /// Numeric value must fall within the inclusive bounds.
    Range { min: Option<f64>, max: Option<f64> },
    /// String (in chars) or array length must fall within the inclusive bounds.
    Length { min: Option<usize>, max: Option<usize> },
    /// Arbitrary check supplied from Rust code.
    Custom { name: String, check: Arc<CheckFn> },
}

impl Validator {
    /// Build a custom validator from a closure returning a failure reason.
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Validator::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn pattern(re: &str) -> Result<Self, String> {
        regex_lite::Regex::new(re)
            .map(Validator::Pattern)
            .map_err(|e| format!("invalid pattern {:?}: {}", re, e))
    }

    /// Run the check. `Err` carries a human readable reason.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Validator::Type(ty) => {
                if ty.matches(value) {
                    Ok(())
                } else {
                    Err(format!("expected {}, got {}", ty, ValueType::name_of(value)))
                }
            }
            Validator::Pattern(re) => match value.as_str() {
                Some(s) if re.is_match(s) => Ok(()),
                Some(s) => Err(format!("{:?} does not match /{}/", s, re.as_str())),
                None => Err(format!(
                    "pattern needs a string, got {}",
                    ValueType::name_of(value)
                )),
            },
            Validator::OneOf(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    let options: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                    Err(format!("{} is not one of [{}]", value, options.join(", ")))
                }
            }
            Validator::Range { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Err(format!(
                        "range needs a number, got {}",
                        ValueType::name_of(value)
                    ));
                };
                if let Some(min) = min
                    && n < *min
                {
                    return Err(format!("{} is below the minimum {}", n, min));
                }
                if let Some(max) = max
                    && n > *max
                {
                    return Err(format!("{} is above the maximum {}", n, max));
                }
                Ok(())
            }
            Validator::Length { min, max } => {
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    other => {
                        return Err(format!(
                            "length needs a string or array, got {}",
                            ValueType::name_of(other)
                        ));
                    }
                };
                if let Some(min) = min
                    && len < *min
                {
                    return Err(format!("length {} is below the minimum {}", len, min));
                }
                if let Some(max) = max
                    && len > *max
                {
                    return Err(format!("length {} is above the maximum {}", len, max));
                }
                Ok(())
            }
            Validator::Custom { name, check } => check(value).map_err(|reason| {
                if reason.is_empty() {
                    format!("failed {}", name)
                } else {
                    reason
                }
            }),
        }
    }

    /// Parse a validator from a schema document entry.
    ///
    /// Accepted shapes: `{type: T}`, `{pattern: "re"}`, `{one_of: [..]}`,
    /// `{min: n, max: n}`, `{min_length: n, max_length: n}`.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let Some(obj) = value.as_object() else {
            return Err(format!(
                "validator must be an object, got {}",
                ValueType::name_of(value)
            ));
        };

        if let Some(ty) = obj.get("type") {
            let name = ty.as_str().ok_or("validator type must be a string")?;
            return ValueType::from_str(name)
                .map(Validator::Type)
                .ok_or_else(|| format!("unknown type {:?}", name));
        }
        if let Some(re) = obj.get("pattern") {
            let re = re.as_str().ok_or("pattern must be a string")?;
            return Validator::pattern(re);
        }
        if let Some(options) = obj.get("one_of") {
            let options = options.as_array().ok_or("one_of must be an array")?;
            return Ok(Validator::OneOf(options.clone()));
        }
        if obj.contains_key("min_length") || obj.contains_key("max_length") {
            let bound = |k: &str| -> Result<Option<usize>, String> {
                match obj.get(k) {
                    None => Ok(None),
                    Some(v) => v
                        .as_u64()
                        .map(|n| Some(n as usize))
                        .ok_or_else(|| format!("{} must be a non-negative integer", k)),
                }
            };
            return Ok(Validator::Length {
                min: bound("min_length")?,
                max: bound("max_length")?,
            });
        }
        if obj.contains_key("min") || obj.contains_key("max") {
            let bound = |k: &str| -> Result<Option<f64>, String> {
                match obj.get(k) {
                    None => Ok(None),
                    Some(v) => v
                        .as_f64()
                        .map(Some)
                        .ok_or_else(|| format!("{} must be a number", k)),
                }
            };
            return Ok(Validator::Range {
                min: bound("min")?,
                max: bound("max")?,
            });
        }

        let keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
        Err(format!("unrecognised validator with keys [{}]", keys.join(", ")))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Type(ty) => f.debug_tuple("Type").field(ty).finish(),
            Validator::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Validator::OneOf(options) => f.debug_tuple("OneOf").field(options).finish(),
            Validator::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Validator::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            Validator::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}
