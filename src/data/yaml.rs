//! YAML processing utilities

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use yaml_rust_davvid::YamlEmitter;

/// Serialize data structure to block-style YAML
pub fn to_yaml<T: Serialize>(data: &T) -> Result<String> {
    // First convert to serde_yaml::Value, then to yaml-rust format
    let serde_value = serde_yaml::to_value(data).context("Failed to serialize to serde value")?;
    let yaml_rust_value = convert_serde_to_yaml_rust(&serde_value);

    let mut output = String::new();
    let mut emitter = YamlEmitter::new(&mut output);
    emitter
        .dump(&yaml_rust_value)
        .context("Failed to emit YAML")?;

    output.push('\n');
    Ok(output)
}

/// Convert serde_yaml::Value to yaml_rust_davvid::Yaml
fn convert_serde_to_yaml_rust(value: &serde_yaml::Value) -> yaml_rust_davvid::Yaml {
    use yaml_rust_davvid::Yaml;

    match value {
        serde_yaml::Value::Null => Yaml::Null,
        serde_yaml::Value::Bool(b) => Yaml::Boolean(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Yaml::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Yaml::Real(f.to_string())
            } else {
                Yaml::String(n.to_string())
            }
        }
        serde_yaml::Value::String(s) => Yaml::String(s.clone()),
        serde_yaml::Value::Sequence(seq) => {
            Yaml::Array(seq.iter().map(convert_serde_to_yaml_rust).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut yaml_map = yaml_rust_davvid::yaml::Hash::new();
            for (k, v) in map {
                yaml_map.insert(convert_serde_to_yaml_rust(k), convert_serde_to_yaml_rust(v));
            }
            Yaml::Hash(yaml_map)
        }
        // Handle tagged values by converting the inner value
        serde_yaml::Value::Tagged(tagged) => convert_serde_to_yaml_rust(&tagged.value),
    }
}

/// Deserializes an explicit `null` (a key left with no value) as `T::default()`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(text: &str) -> serde_yaml::Result<Sample> {
        serde_yaml::from_str(text)
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
        #[serde(default, deserialize_with = "null_as_default")]
        items: Vec<String>,
    }

    #[test]
    fn to_yaml_is_block_style() {
        let sample = Sample {
            name: "one".to_string(),
            items: vec!["a/b.rs".to_string(), "c.txt".to_string()],
        };
        let yaml = to_yaml(&sample).unwrap();
        assert!(yaml.contains("name: one"));
        assert!(yaml.contains("- a/b.rs"));
        assert!(yaml.ends_with('\n'));
    }

    #[test]
    fn to_yaml_then_from_yaml() {
        let sample = Sample {
            name: "true".to_string(),
            items: vec!["docs/readme.md".to_string()],
        };
        let yaml = to_yaml(&sample).unwrap();
        let back = from_yaml(&yaml).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn null_list_becomes_empty() {
        let sample = from_yaml("name: x\nitems:\n").unwrap();
        assert!(sample.items.is_empty());
    }

    #[test]
    fn missing_list_becomes_empty() {
        let sample = from_yaml("name: x\n").unwrap();
        assert!(sample.items.is_empty());
    }

    #[test]
    fn numeric_name_is_kept_as_text() {
        let sample = from_yaml("name: 2024\n").unwrap();
        assert_eq!(sample.name, "2024");
    }

    #[test]
    fn number_like_names_keep_their_spelling() {
        for name in ["007", "0o17", "0b101", "0x1F", "1e3", "true"] {
            let sample = from_yaml(&format!("name: {name}\n")).unwrap();
            assert_eq!(sample.name, name);
        }
    }

    #[test]
    fn null_name_becomes_empty() {
        assert_eq!(from_yaml("name:\n").unwrap().name, "");
    }

    #[test]
    fn number_like_names_survive_to_yaml() {
        for name in ["007", "0o17", "0b101", "12"] {
            let sample = Sample {
                name: name.to_string(),
                items: Vec::new(),
            };
            let back = from_yaml(&to_yaml(&sample).unwrap()).unwrap();
            assert_eq!(back.name, name);
        }
    }

    #[test]
    fn list_name_is_rejected() {
        assert!(from_yaml("name: [a, b]\n").is_err());
    }
}
