//! Command-line parameters for `rhnapi call`.
//!
//! Each argument is a string unless prefixed with a type:
//! `int:42`, `bool:true`, `date:2024-05-01 02:00`, `json:{"a": 1}`, `str:int:x`.

use anyhow::{bail, Context, Result};
use rhnapi_core::{dates, Value};

pub fn parse_param(arg: &str) -> Result<Value> {
    let value = match arg.split_once(':') {
        Some(("int", v)) => v
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .with_context(|| format!("Invalid integer parameter {:?}", v))?,
        Some(("bool", v)) => match v.trim() {
            "true" | "1" => Value::Boolean(true),
            "false" | "0" => Value::Boolean(false),
            _ => bail!("Invalid boolean parameter {:?}", v),
        },
        Some(("date", v)) => dates::to_rpc(v)?,
        Some(("json", v)) => serde_json::from_str::<serde_json::Value>(v)
            .with_context(|| format!("Invalid JSON parameter {:?}", v))?
            .into(),
        Some(("str", v)) => Value::from(v),
        _ => Value::from(arg),
    };
    Ok(value)
}

pub fn parse_params(args: &[String]) -> Result<Vec<Value>> {
    args.iter().map(|a| parse_param(a)).collect()
}
