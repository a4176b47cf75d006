use std::fs;
use std::io::BufWriter;
use std::path::Path;

use rules::Rule;

use crate::error::{AppError, Result};

/// Rules from `path` when it exists, otherwise the bundled defaults.
pub fn load_renewal_rules(path: Option<&Path>) -> Result<Vec<Rule>> {
    match path {
        Some(path) if path.exists() => {
            let raw = fs::read_to_string(path)?;
            Ok(rules::parse_rules(&raw)?)
        }
        _ => load_default_renewal_rules(),
    }
}

pub fn load_default_renewal_rules() -> Result<Vec<Rule>> {
    let data = include_str!("../default-renewal-rules.json");
    Ok(rules::parse_rules(data)?)
}

pub fn write_renewal_rules(path: &Path, rules: &[Rule]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, rules).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_rules_renew_valid_pending_sources() {
        let rules = load_default_renewal_rules().unwrap();
        assert_eq!(rules.len(), 1);
        let names: Vec<_> = rules[0]
            .conditions
            .all
            .iter()
            .map(|condition| condition.name.as_str())
            .collect();
        assert_eq!(names, vec!["is_valid", "is_pending_renewal"]);
        assert_eq!(rules[0].actions[0].name, "renew_allocation_source");
    }

    #[test]
    fn file_on_disk_overrides_bundled_rules() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        assert_eq!(load_renewal_rules(Some(&path)).unwrap().len(), 1);

        write_renewal_rules(&path, &[]).unwrap();
        assert!(load_renewal_rules(Some(&path)).unwrap().is_empty());
    }
}
