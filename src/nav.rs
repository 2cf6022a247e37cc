//! `quartodocs nav`: point mkdocs.yml navigation at rendered pages.

use anyhow::{Context, Result};
use serde_yaml::Value;

/// Rewrite every `*.qmd` string under `value` to `*.md`, through lists and maps.
pub fn convert_nav(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.strip_suffix(".qmd") {
            Some(stem) => Value::String(format!("{stem}.md")),
            None => value.clone(),
        },
        Value::Sequence(items) => Value::Sequence(items.iter().map(convert_nav).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), convert_nav(v)))
                .collect(),
        ),
        Value::Tagged(tagged) => Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
            tag: tagged.tag.clone(),
            value: convert_nav(&tagged.value),
        })),
        _ => value.clone(),
    }
}

/// Print the converted `nav` section of an mkdocs.yml file.
pub fn handle_nav(file: &str) -> Result<()> {
    let raw =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read '{file}'"))?;
    let output = nav_yaml(&raw).with_context(|| format!("Failed to convert '{file}'"))?;
    print!("{output}");
    Ok(())
}

fn nav_yaml(raw: &str) -> Result<String> {
    let config: Value = serde_yaml::from_str(raw).context("Invalid YAML")?;
    let nav = config
        .get("nav")
        .ok_or_else(|| anyhow::anyhow!("No 'nav' section"))?;

    let mut wrapped = serde_yaml::Mapping::new();
    wrapped.insert(Value::String("nav".to_string()), convert_nav(nav));
    Ok(serde_yaml::to_string(&Value::Mapping(wrapped))?)
}
