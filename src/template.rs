//! Maps questionnaire identifiers to template directory names.
//!
//! Template directories are named after the questionnaire with all
//! whitespace removed and every `:` replaced by `-`. The identifier itself
//! never reaches the builder command line; only the resolved name does.

use std::fmt;
use std::path::{Path, PathBuf};

/// A template directory name derived from a questionnaire identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateDirName(String);

impl TemplateDirName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is safe to hand to the builder: non-empty, not a
    /// relative path component, and made only of ASCII alphanumerics,
    /// `.`, `_` and `-`.
    pub fn is_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    }

    /// The template directory under `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for TemplateDirName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve a questionnaire identifier to its template directory name.
pub fn resolve(questionnaire_id: &str) -> TemplateDirName {
    let name = questionnaire_id
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ':' { '-' } else { c })
        .collect();
    TemplateDirName(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whitespace_and_colons() {
        assert_eq!(resolve("Q: Survey 1").as_str(), "Q-Survey1");
    }

    #[test]
    fn replaces_every_colon() {
        assert_eq!(resolve("a:b:c").as_str(), "a-b-c");
    }

    #[test]
    fn strips_tabs_and_newlines() {
        assert_eq!(resolve("  survey\t42\n").as_str(), "survey42");
    }

    #[test]
    fn strips_unicode_whitespace() {
        assert_eq!(resolve("survey\u{00a0}42").as_str(), "survey42");
    }

    #[test]
    fn leaves_other_characters_alone() {
        assert_eq!(resolve("a/b;c").as_str(), "a/b;c");
    }

    #[test]
    fn is_deterministic() {
        let inputs = ["Q: Survey 1", "survey:42", " : : ", "plain"];
        for input in inputs {
            assert_eq!(resolve(input), resolve(input));
        }
    }

    #[test]
    fn output_never_contains_whitespace_or_colons() {
        let inputs = ["a b", "a:b", " :\t:\n", "x : y : z", "\u{2003}q:1"];
        for input in inputs {
            let name = resolve(input);
            assert!(!name.as_str().contains(':'), "{input:?} -> {name}");
            assert!(!name.as_str().chars().any(char::is_whitespace), "{input:?} -> {name}");
        }
    }

    #[test]
    fn resolving_twice_is_stable() {
        let once = resolve("Q: Survey 1");
        assert_eq!(resolve(once.as_str()), once);
    }

    #[test]
    fn safe_names() {
        assert!(resolve("survey:42").is_safe());
        assert!(resolve("Q_1.v2").is_safe());
    }

    #[test]
    fn unsafe_names() {
        assert!(!resolve("").is_safe());
        assert!(!resolve("   ").is_safe());
        assert!(!resolve("..").is_safe());
        assert!(!resolve(".").is_safe());
        assert!(!resolve("../etc").is_safe());
        assert!(!resolve("a;rm -rf").is_safe());
        assert!(!resolve("$(id)").is_safe());
        assert!(!resolve("설문").is_safe());
    }

    #[test]
    fn under_joins_root() {
        let dir = resolve("survey:42").under(Path::new("template/"));
        assert_eq!(dir, PathBuf::from("template/survey-42"));
    }
}
