//! Declared descriptors: flat TOML tables of string values.

use std::path::Path;

use anyhow::{bail, Context, Result};
use warden_reconcile::Attributes;

pub fn from_toml_str(contents: &str) -> Result<Attributes> {
    let table: toml::Table = toml::from_str(contents).context("invalid descriptor TOML")?;

    let mut attributes = Attributes::new();
    for (name, value) in table {
        match value {
            toml::Value::String(s) => attributes.set(name, s),
            other => bail!(
                "attribute '{name}' must be a string, found {}",
                other.type_str()
            ),
        }
    }
    Ok(attributes)
}

pub fn from_path(path: &Path) -> Result<Attributes> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptor: {}", path.display()))?;
    from_toml_str(&contents).with_context(|| format!("in descriptor {}", path.display()))
}
