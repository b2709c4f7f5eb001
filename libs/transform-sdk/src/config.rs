use std::collections::HashMap;

use crate::error::TransformError;
use crate::logging::LOG_ENV;

/// Prefix for environment-sourced parameters: `max_outputs_per_record`
/// is read from `TRANSFORM_MAX_OUTPUTS_PER_RECORD`.
pub const ENV_PREFIX: &str = "TRANSFORM_";

pub const DEFAULT_MAX_OUTPUTS_PER_RECORD: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    U64,
    Str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    U64(u64),
    Str(String),
}

/// Declaration of one transform parameter. Raw values are checked
/// against these before the runtime is built.
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: Option<ParamValue>,
    /// Shown to the operator when the value is rejected.
    pub description: &'static str,
}

impl ConfigParam {
    fn parse(&self, text: &str) -> Result<ParamValue, TransformError> {
        let text = text.trim();
        match self.param_type {
            ParamType::U64 => text
                .parse()
                .map(ParamValue::U64)
                .map_err(|_| self.invalid(format!("expected non-negative integer, got '{text}'"))),
            ParamType::Str => Ok(ParamValue::Str(text.to_string())),
        }
    }

    fn invalid(&self, reason: impl std::fmt::Display) -> TransformError {
        TransformError::config(format!(
            "parameter '{}' ({}): {reason}",
            self.name, self.description
        ))
    }
}

/// Typed values keyed by parameter name, defaults already applied.
#[derive(Debug, Clone, Default)]
pub struct ConfigValues {
    values: HashMap<&'static str, ParamValue>,
}

impl ConfigValues {
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.values.get(name)? {
            ParamValue::U64(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ParamValue::Str(v) => Some(v),
            ParamValue::U64(_) => None,
        }
    }
}

/// Parse raw strings against `params` and fill in defaults.
///
/// Names without a declaration are rejected, with the declared names in
/// the message.
pub fn validate_and_build(
    raw: &HashMap<String, String>,
    params: &[ConfigParam],
) -> Result<ConfigValues, TransformError> {
    if let Some(unknown) = raw.keys().find(|k| !params.iter().any(|p| p.name == k.as_str())) {
        let known: Vec<_> = params.iter().map(|p| p.name).collect();
        return Err(TransformError::config(format!(
            "unknown parameter '{unknown}', expected one of: {}",
            known.join(", ")
        )));
    }

    let mut values = HashMap::new();
    for param in params {
        let value = match raw.get(param.name) {
            Some(text) => Some(param.parse(text)?),
            None => param.default.clone(),
        };
        if let Some(value) = value {
            values.insert(param.name, value);
        }
    }
    Ok(ConfigValues { values })
}

/// Runtime settings for one transform instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformConfig {
    /// Upper bound on records a callback may emit for one input record.
    pub max_outputs_per_record: usize,
    /// Informational; the host owns topic routing.
    pub input_topic: Option<String>,
    pub output_topic: Option<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_outputs_per_record: DEFAULT_MAX_OUTPUTS_PER_RECORD as usize,
            input_topic: None,
            output_topic: None,
        }
    }
}

impl TransformConfig {
    pub fn config_params() -> Vec<ConfigParam> {
        vec![
            ConfigParam {
                name: "max_outputs_per_record",
                param_type: ParamType::U64,
                default: Some(ParamValue::U64(DEFAULT_MAX_OUTPUTS_PER_RECORD)),
                description: "maximum records emitted per input record, at least 1",
            },
            ConfigParam {
                name: "input_topic",
                param_type: ParamType::Str,
                default: None,
                description: "topic the host reads from",
            },
            ConfigParam {
                name: "output_topic",
                param_type: ParamType::Str,
                default: None,
                description: "topic the host writes emitted records to",
            },
        ]
    }

    pub fn from_values(values: &ConfigValues) -> Result<Self, TransformError> {
        let limit = values
            .get_u64("max_outputs_per_record")
            .unwrap_or(DEFAULT_MAX_OUTPUTS_PER_RECORD);
        if limit == 0 {
            return Err(TransformError::config(
                "max_outputs_per_record must be at least 1",
            ));
        }
        let max_outputs_per_record = usize::try_from(limit).map_err(|_| {
            TransformError::config(format!("max_outputs_per_record {limit} is too large"))
        })?;

        Ok(Self {
            max_outputs_per_record,
            input_topic: values.get_str("input_topic").map(str::to_string),
            output_topic: values.get_str("output_topic").map(str::to_string),
        })
    }

    /// Build from any name → string source. Only declared names are looked up.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TransformError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let params = Self::config_params();
        let raw: HashMap<String, String> = params
            .iter()
            .filter_map(|p| lookup(p.name).map(|v| (p.name.to_string(), v)))
            .collect();
        Self::from_values(&validate_and_build(&raw, &params)?)
    }

    /// Build from `TRANSFORM_<NAME>` variables. Any other `TRANSFORM_`
    /// variable except the log filter is a configuration error.
    pub fn from_vars<I>(vars: I) -> Result<Self, TransformError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: HashMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key != LOG_ENV)
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_ascii_lowercase(), value))
            })
            .collect();
        Self::from_values(&validate_and_build(&raw, &Self::config_params())?)
    }

    pub fn from_env() -> Result<Self, TransformError> {
        Self::from_vars(std::env::vars())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = TransformConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, TransformConfig::default());
        assert_eq!(config.max_outputs_per_record, 64);
    }

    #[test]
    fn env_style_variables() {
        let config = TransformConfig::from_vars(vars(&[
            ("TRANSFORM_MAX_OUTPUTS_PER_RECORD", " 3 "),
            ("TRANSFORM_INPUT_TOPIC", "orders"),
            ("TRANSFORM_OUTPUT_TOPIC", "orders-upper"),
            ("TRANSFORM_LOG", "debug"),
            ("HOME", "/"),
        ]))
        .unwrap();
        assert_eq!(config.max_outputs_per_record, 3);
        assert_eq!(config.input_topic.as_deref(), Some("orders"));
        assert_eq!(config.output_topic.as_deref(), Some("orders-upper"));
    }

    #[test]
    fn unknown_prefixed_variable_is_rejected() {
        let err = TransformConfig::from_vars(vars(&[("TRANSFORM_MAX_OUTPUTS", "3")])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let msg = err.to_string();
        assert!(msg.contains("unknown parameter 'max_outputs'"), "{msg}");
        assert!(msg.contains("max_outputs_per_record, input_topic, output_topic"), "{msg}");
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = TransformConfig::from_lookup(|name| {
            (name == "max_outputs_per_record").then(|| "0".to_string())
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn bad_value_names_the_parameter_and_its_purpose() {
        let err = TransformConfig::from_vars(vars(&[("TRANSFORM_MAX_OUTPUTS_PER_RECORD", "-2")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "config error: parameter 'max_outputs_per_record' (maximum records emitted per \
             input record, at least 1): expected non-negative integer, got '-2'"
        );
    }
}
