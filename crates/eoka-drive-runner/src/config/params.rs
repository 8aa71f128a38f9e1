use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Values bound to `${name}` placeholders in a scenario.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse CLI arguments of the form `key=value`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        args.iter().try_fold(Self::new(), |params, arg| {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::Config(format!("invalid param '{}', empty key", arg)));
            }
            Ok(params.set(key, value))
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A parameter declared in the scenario's `params` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,

    pub default: Option<String>,

    /// Shown by `--check`.
    pub description: Option<String>,
}

/// Replace every `${name}` in `template`.
///
/// Bound values win over declared defaults. A declared optional parameter
/// without a default becomes empty; an undeclared, unbound placeholder is
/// left untouched.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];

        match resolve(name, params, defs)? {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 1]),
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn resolve<'a>(
    name: &str,
    params: &'a Params,
    defs: &'a HashMap<String, ParamDef>,
) -> Result<Option<&'a str>> {
    if let Some(v) = params.get(name) {
        return Ok(Some(v));
    }
    let Some(def) = defs.get(name) else {
        return Ok(None);
    };
    match (&def.default, def.required) {
        (Some(default), _) => Ok(Some(default)),
        (None, true) => Err(Error::Config(format!(
            "missing required parameter: {}",
            name
        ))),
        (None, false) => Ok(Some("")),
    }
}

/// Substitute placeholders in every string of a YAML tree.
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
        serde_yaml::Value::Tagged(tagged) => {
            substitute_value(&mut tagged.value, params, defs)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(entries: &[(&str, ParamDef)]) -> HashMap<String, ParamDef> {
        entries
            .iter()
            .map(|(k, d)| (k.to_string(), d.clone()))
            .collect()
    }

    #[test]
    fn test_substitute_bound_values() {
        let params = Params::new().set("user", "ada").set("host", "app.test");
        let result = substitute("https://${host}/u/${user}", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "https://app.test/u/ada");
    }

    #[test]
    fn test_substitute_default_and_optional() {
        let defs = defs(&[
            (
                "query",
                ParamDef {
                    default: Some("rust".into()),
                    ..Default::default()
                },
            ),
            ("suffix", ParamDef::default()),
        ]);
        let result = substitute("q=${query}${suffix}", &Params::new(), &defs).unwrap();
        assert_eq!(result, "q=rust");
    }

    #[test]
    fn test_substitute_required_missing() {
        let defs = defs(&[(
            "password",
            ParamDef {
                required: true,
                ..Default::default()
            },
        )]);
        let err = substitute("${password}", &Params::new(), &defs).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_substitute_leaves_unknown_and_unterminated() {
        let params = Params::new().set("a", "1");
        let result = substitute("${a} ${HOME} ${a", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "1 ${HOME} ${a");
    }

    #[test]
    fn test_substitute_does_not_rescan_values() {
        let params = Params::new().set("a", "${b}").set("b", "x");
        let result = substitute("${a}", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "${b}");
    }

    #[test]
    fn test_params_from_args() {
        let args = vec!["user=alice".to_string(), "query=a=b".to_string()];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("user"), Some("alice"));
        assert_eq!(params.get("query"), Some("a=b"));

        assert!(Params::from_args(&["novalue".to_string()]).is_err());
        assert!(Params::from_args(&["=x".to_string()]).is_err());
    }
}
