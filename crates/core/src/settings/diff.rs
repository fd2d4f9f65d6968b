use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TradingSettings;

/// One changed leaf between two settings objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    /// Dotted path, e.g. `strategies.cash_secured_put.max_dte`.
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// Structural diff between two settings objects, ordered by path.
///
/// Arrays are compared as whole values.
#[must_use]
pub fn calculate_settings_diff(old: &TradingSettings, new: &TradingSettings) -> Vec<SettingChange> {
    let (Ok(old), Ok(new)) = (serde_json::to_value(old), serde_json::to_value(new)) else {
        return Vec::new();
    };
    let mut changes = Vec::new();
    walk("", &old, &new, &mut changes);
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

fn walk(prefix: &str, old: &Value, new: &Value, out: &mut Vec<SettingChange>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let left = a.get(key).unwrap_or(&Value::Null);
                let right = b.get(key).unwrap_or(&Value::Null);
                walk(&path, left, right, out);
            }
        }
        (a, b) if a != b => out.push(SettingChange {
            path: prefix.to_string(),
            old: a.clone(),
            new: b.clone(),
        }),
        _ => {}
    }
}
