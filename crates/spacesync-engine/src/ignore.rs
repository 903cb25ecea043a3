//! Skip rules shared by the watcher and the reconcile walk.
//!
//! Three names are always skipped: anything starting with a dot, anything
//! carrying the conflict marker (conflict copies are terminal artifacts, not
//! sync candidates), and the engine's own copy-staging suffix. On top of
//! that, an optional `.syncignore` file supplies one glob per line; a
//! trailing `/` restricts a pattern to directories.

use std::fs;
use std::path::Path;

use crate::fileops::{CONFLICT_MARKER, TMP_SUFFIX};

#[derive(Debug, Clone, PartialEq, Eq)]
struct IgnorePattern {
    pattern: String,
    dir_only: bool,
}

/// Patterns loaded from a `.syncignore` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreRules {
    /// Load rules from a file. A missing or unreadable file yields empty
    /// rules — nothing extra is ignored.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_lines(contents.lines()),
            Err(_) => Self::default(),
        }
    }

    /// Parse rules from lines: blank lines and `#` comments are skipped, a
    /// trailing `/` marks a directory-only pattern.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut patterns = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.strip_suffix('/') {
                Some(stripped) => patterns.push(IgnorePattern {
                    pattern: stripped.to_owned(),
                    dir_only: true,
                }),
                None => patterns.push(IgnorePattern {
                    pattern: line.to_owned(),
                    dir_only: false,
                }),
            }
        }
        Self { patterns }
    }

    /// Whether a name component matches any loaded pattern.
    #[must_use]
    pub fn is_ignored(&self, name: &str, is_dir: bool) -> bool {
        self.patterns.iter().any(|p| {
            if p.dir_only && !is_dir {
                return false;
            }
            glob_match(&p.pattern, name)
        })
    }

    /// Full skip decision for one name component: built-in rules plus the
    /// loaded patterns.
    #[must_use]
    pub fn should_skip(&self, name: &str, is_dir: bool) -> bool {
        name.starts_with('.')
            || name.contains(CONFLICT_MARKER)
            || name.ends_with(TMP_SUFFIX)
            || self.is_ignored(name, is_dir)
    }

    /// Skip decision over a whole relative path: a path is skipped when any
    /// of its components is. Non-leaf components are directories by
    /// construction.
    #[must_use]
    pub fn should_skip_path(&self, rel: &str, leaf_is_dir: bool) -> bool {
        let mut parts = rel.split('/').filter(|p| !p.is_empty()).peekable();
        while let Some(part) = parts.next() {
            let is_dir = parts.peek().is_some() || leaf_is_dir;
            if self.should_skip(part, is_dir) {
                return true;
            }
        }
        false
    }
}

/// Match a single-component glob against a name. Supports `*`, `?` and
/// `[...]` character classes (with `!`/`^` negation and `a-z` ranges).
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    match_inner(
        &pattern.chars().collect::<Vec<_>>(),
        &name.chars().collect::<Vec<_>>(),
    )
}

fn match_inner(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            // Greedy with backtracking: try every possible tail.
            (0..=name.len()).any(|skip| match_inner(&pattern[1..], &name[skip..]))
        }
        Some('?') => !name.is_empty() && match_inner(&pattern[1..], &name[1..]),
        Some('[') => {
            let Some(close) = pattern.iter().position(|&c| c == ']').filter(|&i| i > 1) else {
                // Unterminated class matches the literal '['.
                return name.first() == Some(&'[') && match_inner(&pattern[1..], &name[1..]);
            };
            let Some(&ch) = name.first() else {
                return false;
            };
            let class = &pattern[1..close];
            let (negated, class) = match class.first() {
                Some('!') | Some('^') => (true, &class[1..]),
                _ => (false, class),
            };
            class_contains(class, ch) != negated && match_inner(&pattern[close + 1..], &name[1..])
        }
        Some(&literal) => {
            name.first() == Some(&literal) && match_inner(&pattern[1..], &name[1..])
        }
    }
}

fn class_contains(class: &[char], ch: char) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            if class[i] <= ch && ch <= class[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if class[i] == ch {
                return true;
            }
            i += 1;
        }
    }
    false
}
