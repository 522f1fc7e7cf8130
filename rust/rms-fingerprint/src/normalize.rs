//! Argument normalization (spec.md §4.1 rule 1): apply the Pipe's
//! [`ArgSchema`] so that a call made with positional arguments and an
//! equivalent call made with keyword arguments normalize to the same
//! [`BoundArgs`], and therefore fingerprint identically.

use std::collections::BTreeMap;

use rms_graph::{ArgSchema, BoundArgs, Error, Result, Value};

/// Normalize a raw call's positional/keyword arguments against `schema`.
///
/// The result always places every named parameter under its name in
/// `keyword` (including a variadic parameter, whose value becomes a
/// `Value::Seq` of the captured trailing positional arguments) and leaves
/// `positional` empty — there is exactly one canonical shape for a given
/// logical call, regardless of how the caller phrased it.
pub fn normalize_args(
    schema: &ArgSchema,
    positional: Vec<Value>,
    mut keyword: BTreeMap<String, Value>,
) -> Result<BoundArgs> {
    let mut positional = positional.into_iter();
    let mut out: BTreeMap<String, Value> = BTreeMap::new();

    for (index, param) in schema.params.iter().enumerate() {
        let is_last = index + 1 == schema.params.len();

        if param.variadic {
            if !is_last {
                return Err(Error::SchemaError(format!(
                    "variadic parameter '{}' must be the last declared parameter",
                    param.name
                )));
            }
            let rest: Vec<Value> = positional.by_ref().collect();
            if let Some(kw) = keyword.remove(&param.name) {
                if !rest.is_empty() {
                    return Err(Error::SchemaError(format!(
                        "'{}' bound both positionally and by keyword",
                        param.name
                    )));
                }
                out.insert(param.name.clone(), kw);
            } else {
                out.insert(param.name.clone(), Value::Seq(rest));
            }
            continue;
        }

        let from_positional = positional.next();
        let from_keyword = keyword.remove(&param.name);
        let value = match (from_positional, from_keyword) {
            (Some(_), Some(_)) => {
                return Err(Error::SchemaError(format!(
                    "'{}' bound both positionally and by keyword",
                    param.name
                )))
            }
            (Some(v), None) => v,
            (None, Some(v)) => v,
            (None, None) => param.default.clone().ok_or_else(|| {
                Error::SchemaError(format!("missing required parameter '{}'", param.name))
            })?,
        };
        out.insert(param.name.clone(), value);
    }

    if positional.next().is_some() {
        return Err(Error::SchemaError(
            "too many positional arguments".to_string(),
        ));
    }
    if let Some((name, _)) = keyword.into_iter().next() {
        return Err(Error::SchemaError(format!(
            "unexpected keyword argument '{name}'"
        )));
    }

    Ok(BoundArgs {
        positional: Vec::new(),
        keyword: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_graph::Param;

    fn schema() -> ArgSchema {
        ArgSchema {
            params: vec![
                Param {
                    name: "i".into(),
                    default: None,
                    variadic: false,
                },
                Param {
                    name: "j".into(),
                    default: Some(Value::Int(0)),
                    variadic: false,
                },
            ],
        }
    }

    #[test]
    fn positional_and_keyword_calls_normalize_identically() {
        let a = normalize_args(&schema(), vec![Value::Int(1), Value::Int(2)], BTreeMap::new())
            .unwrap();
        let mut kw = BTreeMap::new();
        kw.insert("i".to_string(), Value::Int(1));
        kw.insert("j".to_string(), Value::Int(2));
        let b = normalize_args(&schema(), vec![], kw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_optional_uses_default() {
        let bound = normalize_args(&schema(), vec![Value::Int(5)], BTreeMap::new()).unwrap();
        assert_eq!(bound.keyword.get("j"), Some(&Value::Int(0)));
    }

    #[test]
    fn variadic_captures_trailing_positional() {
        let schema = ArgSchema {
            params: vec![
                Param {
                    name: "first".into(),
                    default: None,
                    variadic: false,
                },
                Param {
                    name: "rest".into(),
                    default: None,
                    variadic: true,
                },
            ],
        };
        let bound = normalize_args(
            &schema,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(
            bound.keyword.get("rest"),
            Some(&Value::Seq(vec![Value::Int(2), Value::Int(3)]))
        );
    }
}
