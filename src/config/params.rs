use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Runtime parameters passed to a job file.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
    use_env: bool,
}

impl Params {
    /// Create empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also resolve `${VAR}` from the process environment when no explicit
    /// value was set.
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Set a parameter value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Get a parameter value (explicit values first, then the environment).
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(v) = self.values.get(key) {
            return Some(v.clone());
        }
        if self.use_env {
            return std::env::var(key).ok();
        }
        None
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse from CLI args like "key=value".
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            params.values.insert(key.to_string(), value.to_string());
        }
        Ok(params)
    }
}

/// Parameter definition in a job file.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    /// Whether this parameter is required.
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,

    /// Description for documentation.
    pub description: Option<String>,
}

/// Substitute `${var}` patterns in a string.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let var_start = start + var_start;
        let Some(var_end) = result[var_start..].find('}') else {
            break;
        };
        let var_end = var_start + var_end;

        let var_name = &result[var_start + 2..var_end];

        let value = if let Some(v) = params.get(var_name) {
            v
        } else if let Some(def) = defs.get(var_name) {
            if let Some(ref default) = def.default {
                default.clone()
            } else if def.required {
                return Err(Error::Config(format!(
                    "missing required parameter: {}",
                    var_name
                )));
            } else {
                String::new()
            }
        } else {
            // Unknown and unset: leave the placeholder in place
            start = var_end + 1;
            continue;
        };

        result.replace_range(var_start..=var_end, &value);
        start = var_start + value.len();
    }

    Ok(result)
}

/// Recursively substitute params in a serde_yaml::Value.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute(s, params, defs)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(required: bool, default: Option<&str>) -> ParamDef {
        ParamDef {
            required,
            default: default.map(String::from),
            description: None,
        }
    }

    #[test]
    fn test_substitute_simple() {
        let params = Params::new().set("key", "sk-test");
        let result = substitute("Bearer ${key}", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "Bearer sk-test");
    }

    #[test]
    fn test_substitute_default() {
        let mut defs = HashMap::new();
        defs.insert("model".to_string(), def(false, Some("gpt-4o-mini")));
        let result = substitute("${model}", &Params::new(), &defs).unwrap();
        assert_eq!(result, "gpt-4o-mini");
    }

    #[test]
    fn test_substitute_required_missing() {
        let mut defs = HashMap::new();
        defs.insert("OPENAI_API_KEY".to_string(), def(true, None));
        let err = substitute("${OPENAI_API_KEY}", &Params::new(), &defs).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_substitute_unknown_left_in_place() {
        let result = substitute("a ${nope} b", &Params::new(), &HashMap::new()).unwrap();
        assert_eq!(result, "a ${nope} b");
    }

    #[test]
    fn test_env_fallback() {
        std::env::set_var("MAILFILL_TEST_PARAM_ENV", "from-env");
        let params = Params::new().with_env();
        let result = substitute("${MAILFILL_TEST_PARAM_ENV}", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "from-env");

        let explicit = Params::new().with_env().set("MAILFILL_TEST_PARAM_ENV", "explicit");
        let result = substitute("${MAILFILL_TEST_PARAM_ENV}", &explicit, &HashMap::new()).unwrap();
        assert_eq!(result, "explicit");
    }

    #[test]
    fn test_env_ignored_without_opt_in() {
        std::env::set_var("MAILFILL_TEST_PARAM_NO_ENV", "from-env");
        let result =
            substitute("${MAILFILL_TEST_PARAM_NO_ENV}", &Params::new(), &HashMap::new()).unwrap();
        assert_eq!(result, "${MAILFILL_TEST_PARAM_NO_ENV}");
    }

    #[test]
    fn test_params_from_args() {
        let args = vec!["user=alice".to_string(), "url=https://a.test/?x=1".to_string()];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("user").as_deref(), Some("alice"));
        assert_eq!(params.get("url").as_deref(), Some("https://a.test/?x=1"));
        assert!(Params::from_args(&["novalue".to_string()]).is_err());
    }
}
