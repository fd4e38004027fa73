use crate::commands::{CmdMessage, CmdResult, VitrinePaths};
use crate::config::VitrineConfig;
use crate::error::Result;
use serde_json::Value;

pub fn run(config: &VitrineConfig, paths: &VitrinePaths, template: bool) -> Result<CmdResult> {
    let mut result = CmdResult::default();

    if template {
        let template = VitrineConfig::template();
        result.add_message(CmdMessage::info(template.trim_end()));
        return result.with_data(&serde_json::json!({ "template": template }));
    }

    let value = serde_json::to_value(config)?;
    let mut lines = Vec::new();
    flatten("", &value, &mut lines);
    for line in lines {
        result.add_message(CmdMessage::info(line));
    }
    for dir in &paths.config_dirs {
        result.add_message(CmdMessage::info(format!(
            "# searched {}",
            dir.join(crate::config::CONFIG_FILE).display()
        )));
    }

    result.with_data(config)
}

/// `key = value` lines with dotted keys for nested tables.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&key, value, out);
            }
        }
        Value::Null => out.push(format!("{} = (unset)", prefix)),
        other => out.push(format!("{} = {}", prefix, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths() -> VitrinePaths {
        VitrinePaths {
            uploads_root: PathBuf::from("uploads"),
            lock_file: PathBuf::from("uploads/.vitrine-reconcile.lock"),
            config_dirs: vec![PathBuf::from("/srv/shop")],
        }
    }

    #[test]
    fn shows_dotted_keys() {
        let result = run(&VitrineConfig::default(), &paths(), false).unwrap();
        let contents: Vec<&str> = result.messages.iter().map(|m| m.content.as_str()).collect();
        assert!(contents.contains(&"tie_break = \"newest-id\""));
        assert!(contents.contains(&"repair.dedupe = false"));
        assert!(contents.contains(&"placeholder.error_asset = (unset)"));
        assert!(contents.iter().any(|c| c.contains("/srv/shop")));
    }

    #[test]
    fn template_mode() {
        let result = run(&VitrineConfig::default(), &paths(), true).unwrap();
        assert!(result.data.unwrap()["template"]
            .as_str()
            .unwrap()
            .contains("uploads_root"));
    }
}
