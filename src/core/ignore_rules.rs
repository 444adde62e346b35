/*
 * Ignore rules decide which directory entries never make it into the tree. A rule is
 * either a bare name (compared against the entry's base name), an extension pattern
 * (`.ext` or `*.ext`, compared against the lowercased extension), or a general glob
 * such as `test_*` matched against the base name. All matching is case-insensitive.
 * Dotfiles are excluded regardless of the configured rules.
 */
use glob::{MatchOptions, Pattern};

const GLOB_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum IgnoreRule {
    Name(String),
    // Stored lowercased with its leading dot, e.g. ".pyc" or ".tar.gz".
    Extension(String),
    // Also carries the lowercased rule text, compared as a literal name.
    Glob(Pattern, String),
}

impl IgnoreRule {
    fn parse(raw: &str) -> Option<IgnoreRule> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let lowered = trimmed.to_lowercase();
        if let Some(ext) = lowered.strip_prefix("*.") {
            if !ext.is_empty() && !has_glob_meta(ext) {
                return Some(IgnoreRule::Extension(format!(".{ext}")));
            }
        } else if lowered.starts_with('.') && lowered.len() > 1 && !has_glob_meta(&lowered) {
            return Some(IgnoreRule::Extension(lowered));
        }

        if has_glob_meta(trimmed) {
            match Pattern::new(trimmed) {
                Ok(pattern) => return Some(IgnoreRule::Glob(pattern, lowered)),
                Err(e) => {
                    log::warn!(
                        "IgnoreRules: Invalid glob pattern '{trimmed}': {e}. Treating it as a plain name."
                    );
                }
            }
        }
        Some(IgnoreRule::Name(lowered))
    }

    fn matches(&self, name: &str, name_lower: &str) -> bool {
        match self {
            IgnoreRule::Name(rule) => rule == name_lower,
            IgnoreRule::Extension(ext) => {
                // An extension rule also matches a dot-rule spelled as a full name (".git").
                name_lower == ext
                    || (name_lower.len() > ext.len() && name_lower.ends_with(ext.as_str()))
            }
            IgnoreRule::Glob(pattern, literal) => {
                literal == name_lower || pattern.matches_with(name, GLOB_MATCH_OPTIONS)
            }
        }
    }
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/*
 * Returns the rule list with blanks dropped, whitespace trimmed and duplicates removed
 * case-insensitively. The first spelling of a rule wins and the order is preserved.
 */
pub fn normalize_rule_list<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for pattern in patterns {
        let trimmed = pattern.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = normalize_rule_list(patterns);
        let rules = patterns.iter().filter_map(|p| IgnoreRule::parse(p)).collect();
        IgnoreRules { patterns, rules }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /*
     * Decides whether a directory entry with the given base name is filtered out.
     * Names starting with '.' are always ignored.
     */
    pub fn is_ignored(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return true;
        }
        let name_lower = name.to_lowercase();
        self.rules.iter().any(|rule| rule.matches(name, &name_lower))
    }
}
