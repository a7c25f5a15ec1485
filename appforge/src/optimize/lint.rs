//! Line-oriented lint over generated source text.
//!
//! Rules: stray debug output, `debugger` statements, TODO/FIXME markers and
//! import bindings that are never referenced elsewhere in the file. Only
//! single-line `import` / `require` statements are understood.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::CodeBundle;

static ES_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*)import\s+(.+?)\s+(from\s+['"][^'"]+['"];?.*)$"#).expect("valid regex")
});
static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*)(const|let|var)\s+(.+?)\s*=\s*(require\(\s*['"][^'"]+['"]\s*\).*)$"#)
        .expect("valid regex")
});
static DEBUG_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bconsole\.(log|debug|trace)\s*\(").expect("valid regex"));
static DEBUGGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdebugger\s*;?").expect("valid regex"));
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(TODO|FIXME)\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub file: String,
    /// 1-based.
    pub line: usize,
    /// 1-based, in chars.
    pub column: usize,
    pub rule: String,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} {} [{}] {}",
            self.file, self.line, self.column, self.severity, self.rule, self.message
        )
    }
}

// ── Imports ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Es,
    Require,
}

/// A named import entry: the source text (`b as c`) and the local binding (`c`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedImport {
    pub text: String,
    pub binding: String,
}

/// One parsed single-line import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLine {
    pub kind: ImportKind,
    pub indent: String,
    /// `const` / `let` / `var` for requires.
    pub declarator: String,
    pub default: Option<String>,
    pub namespace: Option<String>,
    pub named: Vec<NamedImport>,
    /// Everything from `from '…'` or `require(…)` to end of line.
    pub tail: String,
}

impl ImportLine {
    pub fn bindings(&self) -> Vec<&str> {
        self.default
            .iter()
            .chain(self.namespace.iter())
            .map(String::as_str)
            .chain(self.named.iter().map(|n| n.binding.as_str()))
            .collect()
    }

    /// Re-render keeping only bindings for which `keep` is true.
    /// `None` when nothing would be left.
    pub fn render_keeping(&self, keep: impl Fn(&str) -> bool) -> Option<String> {
        let default = self.default.as_deref().filter(|b| keep(b));
        let namespace = self.namespace.as_deref().filter(|b| keep(b));
        let named: Vec<&str> = self
            .named
            .iter()
            .filter(|n| keep(&n.binding))
            .map(|n| n.text.as_str())
            .collect();

        match self.kind {
            ImportKind::Es => {
                let mut parts = Vec::new();
                if let Some(d) = default {
                    parts.push(d.to_string());
                }
                if let Some(ns) = namespace {
                    parts.push(format!("* as {ns}"));
                }
                if !named.is_empty() {
                    parts.push(format!("{{ {} }}", named.join(", ")));
                }
                if parts.is_empty() {
                    return None;
                }
                Some(format!("{}import {} {}", self.indent, parts.join(", "), self.tail))
            }
            ImportKind::Require => {
                let pattern = match default {
                    Some(d) => d.to_string(),
                    None if !named.is_empty() => format!("{{ {} }}", named.join(", ")),
                    None => return None,
                };
                Some(format!("{}{} {} = {}", self.indent, self.declarator, pattern, self.tail))
            }
        }
    }
}

fn split_named(list: &str, separator: &str) -> Vec<NamedImport> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let binding = match entry.split_once(separator) {
                Some((_, alias)) => alias.trim(),
                None => entry,
            };
            NamedImport {
                text: entry.to_string(),
                binding: binding.to_string(),
            }
        })
        .collect()
}

/// Parse a single-line `import … from` or `const … = require(…)`.
pub fn parse_import(line: &str) -> Option<ImportLine> {
    if let Some(caps) = ES_IMPORT.captures(line) {
        let clause = caps[2].trim();
        if clause.starts_with("type ") {
            return None;
        }
        let (head, braces) = match (clause.find('{'), clause.rfind('}')) {
            (Some(open), Some(close)) if close > open => {
                (clause[..open].trim(), Some(&clause[open + 1..close]))
            }
            _ => (clause, None),
        };
        let mut default = None;
        let mut namespace = None;
        for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some(ns) = part.strip_prefix("* as ") {
                namespace = Some(ns.trim().to_string());
            } else {
                default = Some(part.to_string());
            }
        }
        return Some(ImportLine {
            kind: ImportKind::Es,
            indent: caps[1].to_string(),
            declarator: String::new(),
            default,
            namespace,
            named: braces.map(|b| split_named(b, " as ")).unwrap_or_default(),
            tail: caps[3].to_string(),
        });
    }
    if let Some(caps) = REQUIRE.captures(line) {
        let pattern = caps[3].trim();
        let (default, named) = match pattern.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(inner) => (None, split_named(inner, ":")),
            None => (Some(pattern.to_string()), Vec::new()),
        };
        return Some(ImportLine {
            kind: ImportKind::Require,
            indent: caps[1].to_string(),
            declarator: caps[2].to_string(),
            default,
            namespace: None,
            named,
            tail: caps[4].to_string(),
        });
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Occurrences of `word` in `text` not embedded in a longer identifier.
pub fn count_word(text: &str, word: &str) -> usize {
    if word.is_empty() {
        return 0;
    }
    text.match_indices(word)
        .filter(|(i, _)| {
            let before = text[..*i].chars().next_back();
            let after = text[i + word.len()..].chars().next();
            !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
        })
        .count()
}

/// An import binding never referenced outside its own statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedImport {
    /// 0-based line index.
    pub line_index: usize,
    pub binding: String,
    /// 1-based char column of the binding on its line.
    pub column: usize,
}

pub fn unused_imports(text: &str) -> Vec<UnusedImport> {
    let lines: Vec<&str> = text.lines().collect();
    let mut unused = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let Some(import) = parse_import(line) else {
            continue;
        };
        for binding in import.bindings() {
            let elsewhere: usize = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, l)| count_word(l, binding))
                .sum();
            if elsewhere == 0 {
                let column = line
                    .find(binding)
                    .map(|byte| column_of(line, byte))
                    .unwrap_or(1);
                unused.push(UnusedImport {
                    line_index: idx,
                    binding: binding.to_string(),
                    column,
                });
            }
        }
    }
    unused
}

// ── Rules ──────────────────────────────────────────────────────────────

fn is_script(file: &str) -> bool {
    [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs"]
        .iter()
        .any(|ext| file.ends_with(ext))
}

fn column_of(line: &str, byte: usize) -> usize {
    line[..byte].chars().count() + 1
}

/// Lint one source file.
pub fn lint_source(file: &str, text: &str) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let script = is_script(file);
    let issue = |line: usize, column: usize, rule: &str, message: String, severity| LintIssue {
        file: file.to_string(),
        line,
        column,
        rule: rule.to_string(),
        message,
        severity,
    };

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if script {
            for m in DEBUG_CALL.find_iter(line) {
                issues.push(issue(
                    line_no,
                    column_of(line, m.start()),
                    "no-console",
                    format!("Unexpected debug statement `{}`", m.as_str().trim_end_matches('(').trim()),
                    Severity::Warning,
                ));
            }
            if let Some(m) = DEBUGGER.find(line) {
                issues.push(issue(
                    line_no,
                    column_of(line, m.start()),
                    "no-debugger",
                    "Unexpected `debugger` statement".to_string(),
                    Severity::Error,
                ));
            }
        }
        for m in MARKER.find_iter(line) {
            issues.push(issue(
                line_no,
                column_of(line, m.start()),
                "todo-marker",
                format!("Unresolved {} marker", m.as_str()),
                Severity::Info,
            ));
        }
    }

    if script {
        for u in unused_imports(text) {
            issues.push(issue(
                u.line_index + 1,
                u.column,
                "unused-import",
                format!("`{}` is imported but never used", u.binding),
                Severity::Warning,
            ));
        }
    }

    issues.sort_by_key(|i| (i.line, i.column));
    issues
}

/// Lint every source file in a bundle, keyed by its flattened path.
pub fn lint_bundle(bundle: &CodeBundle) -> Vec<LintIssue> {
    bundle
        .sources()
        .flat_map(|(section, name, text)| lint_source(&format!("{}/{name}", section.dir()), text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_es_import_forms() {
        let i = parse_import("import React, { useState, useMemo as memo } from 'react';").unwrap();
        assert_eq!(i.default.as_deref(), Some("React"));
        assert_eq!(i.bindings(), vec!["React", "useState", "memo"]);

        let ns = parse_import("import * as api from './api';").unwrap();
        assert_eq!(ns.namespace.as_deref(), Some("api"));

        assert!(parse_import("import './styles.css';").is_none());
        assert!(parse_import("const x = 1;").is_none());
    }

    #[test]
    fn parses_require_forms() {
        let r = parse_import("const express = require('express');").unwrap();
        assert_eq!(r.bindings(), vec!["express"]);
        let d = parse_import("const { Router, json: parseJson } = require('express');").unwrap();
        assert_eq!(d.bindings(), vec!["Router", "parseJson"]);
    }

    #[test]
    fn render_drops_unused_bindings() {
        let i = parse_import("import React, { useState, useEffect } from 'react';").unwrap();
        assert_eq!(
            i.render_keeping(|b| b == "useState").unwrap(),
            "import { useState } from 'react';"
        );
        assert!(i.render_keeping(|_| false).is_none());

        let r = parse_import("  const { a, b: c } = require('x');").unwrap();
        assert_eq!(r.render_keeping(|b| b == "c").unwrap(), "  const { b: c } = require('x');");
    }

    #[test]
    fn word_counting_respects_identifier_boundaries() {
        assert_eq!(count_word("useState(useStateful)", "useState"), 1);
        assert_eq!(count_word("$el.el el_", "el"), 1);
    }

    #[test]
    fn flags_debug_markers_and_unused_imports() {
        let src = "import React, { useState } from 'react';\n\
                   import lodash from 'lodash';\n\
                   function App() {\n\
                   \x20 const [a] = useState(0); // TODO: persist\n\
                   \x20 console.log(a);\n\
                   \x20 debugger;\n\
                   \x20 return a;\n\
                   }\n";
        let issues = lint_source("App.jsx", src);
        let rules: Vec<(&str, usize)> = issues.iter().map(|i| (i.rule.as_str(), i.line)).collect();
        assert_eq!(
            rules,
            vec![
                ("unused-import", 1),
                ("unused-import", 2),
                ("todo-marker", 4),
                ("no-console", 5),
                ("no-debugger", 6),
            ]
        );
        let react = &issues[0];
        assert!(react.message.contains("React"));
        assert_eq!(react.column, 8);
        assert_eq!(issues[4].severity, Severity::Error);
    }

    #[test]
    fn stylesheets_only_get_marker_checks() {
        let issues = lint_source("globals.css", "/* console.log( */\n/* FIXME colors */");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "todo-marker");
    }
}
