//! Settings-file validation: unknown-key detection with Levenshtein
//! suggestions, and value checks against the parameter registry.
//!
//! Two-pass approach: walk the raw `toml::Value` key tree and compare it
//! against the registry-derived key set, emitting warnings with "did you
//! mean?" suggestions. Then validate every known value. Unknown keys never
//! break a settings file; invalid values do.

use std::collections::HashSet;

use super::registry::{registry, ConfigGroup, ParamValue};

/// A non-fatal settings warning (typo, misplaced section).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Keys
// ============================================================================

/// Every valid dotted key path of a settings file, derived from the registry.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = ConfigGroup::ALL
        .iter()
        .map(|g| g.as_str().to_string())
        .collect();
    keys.extend(
        registry()
            .iter()
            .map(|s| format!("{}.{}", s.config_group.as_str(), s.name)),
    );
    keys
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect dotted key paths from a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3, ties broken alphabetically.
pub fn suggest_correction<'a, I>(unknown: &str, known: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    known
        .into_iter()
        .map(|k| (levenshtein(unknown, k), k))
        .filter(|(d, _)| *d <= 3)
        .min()
        .map(|(_, k)| k.clone())
}

/// Registry parameter names that are closest to `unknown`.
pub fn suggest_parameter(unknown: &str) -> Option<String> {
    let names: Vec<String> = registry().iter().map(|s| s.name.to_string()).collect();
    suggest_correction(unknown, &names)
}

// ============================================================================
// Entry points
// ============================================================================

/// Warnings for every unknown key in a settings document.
///
/// A registered parameter placed in the wrong section is reported with the
/// correct section as the suggestion.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by the loader
    };

    let known = known_config_keys();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        if known.contains(&key) {
            continue;
        }

        let leaf = key.rsplit('.').next().unwrap_or(&key);
        let misplaced = registry()
            .get(leaf)
            .filter(|_| key.contains('.'))
            .map(|spec| format!("{}.{}", spec.config_group.as_str(), spec.name));

        let (message, suggestion) = match misplaced {
            Some(correct) => (
                format!("Parameter '{key}' is in the wrong section"),
                Some(correct),
            ),
            None => (
                format!("Unknown config key '{key}'"),
                suggest_correction(&key, &known),
            ),
        };

        warnings.push(ValidationWarning {
            field: key,
            message,
            suggestion,
        });
    }

    warnings
}

/// Validate every registered value of a settings document.
///
/// Returns one message per invalid value; unknown keys are skipped here
/// because `validate_unknown_keys` already reports them.
pub fn validate_values(value: &toml::Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(root) = value.as_table() else {
        return errors;
    };

    for group in ConfigGroup::ALL {
        let Some(section) = root.get(group.as_str()) else {
            continue;
        };
        let Some(table) = section.as_table() else {
            errors.push(format!("[{group}] must be a table"));
            continue;
        };
        for (name, v) in table {
            let Some(spec) = registry().get(name) else {
                continue;
            };
            if spec.config_group != group {
                continue;
            }
            let result = ParamValue::from_toml(name, v).and_then(|pv| spec.validate(&pv));
            if let Err(e) = result {
                errors.push(format!("[{group}] {e}"));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("cutoff", "cutoff"), 0);
        assert_eq!(levenshtein("cutof", "cutoff"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [llm]
            word_limit = 100
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"llm".to_string()));
        assert!(keys.contains(&"llm.word_limit".to_string()));
    }

    #[test]
    fn test_typo_key_produces_suggestion() {
        let warnings = validate_unknown_keys("[interpretation]\ncutof = 0.4\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("interpretation.cutoff")
        );
    }

    #[test]
    fn test_misplaced_key_points_to_right_section() {
        let warnings = validate_unknown_keys("[llm]\ncutoff = 0.4\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("wrong section"));
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("interpretation.cutoff")
        );
    }

    #[test]
    fn test_validate_values_reports_range() {
        let value: toml::Value = "[output]\nheading_level = 9\n".parse().unwrap();
        let errors = validate_values(&value);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("heading_level"));
    }

    #[test]
    fn test_suggest_parameter_garbage() {
        assert!(suggest_parameter("completely_unrelated_garbage_xyz").is_none());
        assert_eq!(suggest_parameter("wordlimit").as_deref(), Some("word_limit"));
    }
}
