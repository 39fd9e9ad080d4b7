use flang_engine::Spec;

/// Flatten a TOML table into a spec. Nested tables become dotted keys and
/// scalars are taken as their textual value.
pub fn from_table(table: &toml::Table) -> Result<Spec, String> {
    let mut spec = Spec::new();
    flatten_into(&mut spec, None, table)?;
    Ok(spec)
}

pub fn from_str(source: &str) -> Result<Spec, String> {
    let table: toml::Table = toml::from_str(source).map_err(|e| e.to_string())?;
    from_table(&table)
}

fn flatten_into(spec: &mut Spec, prefix: Option<&str>, table: &toml::Table) -> Result<(), String> {
    for (key, value) in table {
        let key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        let text = match value {
            toml::Value::Table(nested) => {
                flatten_into(spec, Some(&key), nested)?;
                continue;
            }
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(n) => n.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Datetime(d) => d.to_string(),
            toml::Value::Array(_) => return Err(format!("'{}': arrays are not allowed in a spec", key)),
        };
        spec.insert(key, text);
    }
    Ok(())
}

/// Render a spec as a flat TOML table with quoted dotted keys.
pub fn to_toml(spec: &Spec) -> String {
    toml::to_string(spec).unwrap_or_else(|_| format!("{:?}", spec))
}

/// Parse a `key=value` command-line assignment.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}
