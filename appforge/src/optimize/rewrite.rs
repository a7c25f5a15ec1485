//! Structural text rewrites applied to generated sources.
//!
//! Every pass is idempotent: a pass checks for its own marker before
//! inserting anything, so `pass(pass(x)) == pass(x)`.

use std::sync::LazyLock;

use regex::Regex;

use super::lint::{ImportKind, NamedImport, parse_import, unused_imports};
use super::score::{BARE_DEFAULT_EXPORT, TYPE_DECL};
use crate::model::{CodeBundle, Section};

static ROUTER_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)(?:const|let|var)\s+(\w+)\s*=\s*(?:express\.)?Router\(\s*\)[ \t]*;?[ \t]*$")
        .expect("valid regex")
});
static INNER_HTML_ASSIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.innerHTML(\s*=)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Performance,
    Security,
    Maintainability,
}

impl Pass {
    pub const ALL: [Pass; 3] = [Pass::Performance, Pass::Security, Pass::Maintainability];

    /// Rewrite one source file; `None` when the pass has nothing to change.
    pub fn apply(self, section: Section, name: &str, text: &str) -> Option<(String, String)> {
        let rewritten = match self {
            Pass::Performance => performance(section, name, text),
            Pass::Security => security(section, name, text),
            Pass::Maintainability => maintainability(section, name, text),
        }?;
        (rewritten.0 != text).then_some(rewritten)
    }

    /// Apply the pass to every source in the bundle, collecting one
    /// improvement line per changed file.
    pub fn run(self, bundle: &CodeBundle) -> (CodeBundle, Vec<String>) {
        let mut improvements = Vec::new();
        let out = bundle.map_sources(|section, name, text| match self.apply(section, name, text) {
            Some((rewritten, note)) => {
                improvements.push(format!("{}/{name}: {note}", section.dir()));
                rewritten
            }
            None => text.to_string(),
        });
        (out, improvements)
    }
}

fn is_script(name: &str) -> bool {
    [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

fn stem(name: &str) -> &str {
    name.rsplit('/')
        .next()
        .and_then(|base| base.split('.').next())
        .unwrap_or(name)
}

fn join_lines(lines: &[String], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

/// Insert `block` after the router declaration, reusing its indentation and
/// variable name via `{router}`.
fn after_router(text: &str, block: &[&str]) -> Option<String> {
    let caps = ROUTER_DECL.captures(text)?;
    let decl = caps.get(0)?;
    let indent = &caps[1];
    let router = &caps[2];
    let inserted: String = block
        .iter()
        .map(|line| format!("\n{indent}{}", line.replace("{router}", router)))
        .collect();
    let end = decl.end();
    let mut out = String::with_capacity(text.len() + inserted.len());
    out.push_str(&text[..end]);
    out.push_str(&inserted);
    out.push_str(&text[end..]);
    Some(out)
}

// ── Performance ────────────────────────────────────────────────────────

fn is_react_source(tail: &str) -> bool {
    tail.contains("'react'") || tail.contains("\"react\"")
}

/// Wrap a bare `export default Name;` in `memo`, importing it if needed.
fn memoize(text: &str) -> Option<String> {
    let name = BARE_DEFAULT_EXPORT.captures(text)?.get(1)?.as_str().to_string();
    let trailing = text.ends_with('\n');
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

    let react = lines.iter().enumerate().find_map(|(idx, line)| {
        parse_import(line)
            .filter(|i| i.kind == ImportKind::Es && is_react_source(&i.tail))
            .map(|i| (idx, i))
    });
    let wrapper = match react {
        Some((_, import)) if import.default.is_some() => {
            format!("{}.memo", import.default.as_deref().unwrap_or("React"))
        }
        Some((_, import)) if import.named.iter().any(|n| n.binding == "memo") => "memo".to_string(),
        Some((idx, mut import)) => {
            import.named.push(NamedImport {
                text: "memo".to_string(),
                binding: "memo".to_string(),
            });
            lines[idx] = import.render_keeping(|_| true)?;
            "memo".to_string()
        }
        None => {
            lines.insert(0, "import { memo } from 'react';".to_string());
            "memo".to_string()
        }
    };

    let joined = join_lines(&lines, trailing);
    let replaced = BARE_DEFAULT_EXPORT.replace(&joined, format!("export default {wrapper}({name});"));
    Some(replaced.into_owned())
}

const CACHE_BLOCK: &[&str] = &[
    "const compression = require('compression');",
    "{router}.use(compression());",
    "{router}.use((req, res, next) => {",
    "  res.set('Cache-Control', 'public, max-age=60');",
    "  next();",
    "});",
];

fn performance(section: Section, name: &str, text: &str) -> Option<(String, String)> {
    if !is_script(name) {
        return None;
    }
    match section {
        Section::Component => memoize(text).map(|t| (t, "wrapped default export in memo".to_string())),
        Section::Route if !text.contains("compression(") => after_router(text, CACHE_BLOCK)
            .map(|t| (t, "added compression and cache-control middleware".to_string())),
        _ => None,
    }
}

// ── Security ───────────────────────────────────────────────────────────

const HELMET_BLOCK: &[&str] = &["const helmet = require('helmet');", "{router}.use(helmet());"];
const RATE_LIMIT_BLOCK: &[&str] = &[
    "const rateLimit = require('express-rate-limit');",
    "{router}.use(rateLimit({ windowMs: 15 * 60 * 1000, max: 100 }));",
];

fn security(section: Section, name: &str, text: &str) -> Option<(String, String)> {
    if !is_script(name) {
        return None;
    }
    let mut out = text.to_string();
    let mut notes = Vec::new();

    if INNER_HTML_ASSIGN.is_match(&out) {
        out = INNER_HTML_ASSIGN.replace_all(&out, ".textContent$1").into_owned();
        notes.push("replaced innerHTML assignment with textContent");
    }
    if section == Section::Route {
        if !out.contains("express-rate-limit")
            && let Some(t) = after_router(&out, RATE_LIMIT_BLOCK)
        {
            out = t;
            notes.push("added rate limiting");
        }
        if !out.contains("helmet(")
            && let Some(t) = after_router(&out, HELMET_BLOCK)
        {
            out = t;
            notes.push("added security headers");
        }
    }
    (!notes.is_empty()).then(|| (out, notes.join(", ")))
}

// ── Maintainability ────────────────────────────────────────────────────

fn strip_unused_imports(text: &str) -> Option<String> {
    let unused = unused_imports(text);
    if unused.is_empty() {
        return None;
    }
    let trailing = text.ends_with('\n');
    let mut lines: Vec<Option<String>> = text.lines().map(|l| Some(l.to_string())).collect();
    for (idx, slot) in lines.iter_mut().enumerate() {
        let dead: Vec<&str> = unused
            .iter()
            .filter(|u| u.line_index == idx)
            .map(|u| u.binding.as_str())
            .collect();
        if dead.is_empty() {
            continue;
        }
        let Some(import) = slot.as_deref().and_then(parse_import) else {
            continue;
        };
        *slot = import.render_keeping(|b| !dead.contains(&b));
    }
    let kept: Vec<String> = lines.into_iter().flatten().collect();
    Some(join_lines(&kept, trailing))
}

fn props_block(name: &str) -> Vec<String> {
    let props = format!("{}Props", stem(name));
    if name.ends_with(".ts") || name.ends_with(".tsx") {
        vec![
            format!("interface {props} {{"),
            "  [key: string]: unknown;".to_string(),
            "}".to_string(),
            String::new(),
        ]
    } else {
        vec![
            "/**".to_string(),
            format!(" * @typedef {{Object}} {props}"),
            " */".to_string(),
            String::new(),
        ]
    }
}

/// Insert a placeholder props type after the import block.
fn add_props_type(name: &str, text: &str) -> Option<String> {
    if TYPE_DECL.is_match(text) {
        return None;
    }
    let trailing = text.ends_with('\n');
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let after_imports = lines
        .iter()
        .rposition(|l| parse_import(l).is_some() || l.trim_start().starts_with("import "))
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut at = after_imports;
    if at > 0 && lines.get(at).is_some_and(|l| l.trim().is_empty()) {
        at += 1;
    }
    let mut block = props_block(name);
    if at > 0 && at == after_imports {
        block.insert(0, String::new());
    }
    lines.splice(at..at, block);
    Some(join_lines(&lines, trailing))
}

fn maintainability(section: Section, name: &str, text: &str) -> Option<(String, String)> {
    if !is_script(name) {
        return None;
    }
    let mut out = text.to_string();
    let mut notes = Vec::new();
    if let Some(t) = strip_unused_imports(&out) {
        out = t;
        notes.push("removed unused imports");
    }
    if section == Section::Component
        && let Some(t) = add_props_type(name, &out)
    {
        out = t;
        notes.push("added props type");
    }
    (!notes.is_empty()).then(|| (out, notes.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &str = "function Header({ title }) {\n  return <h1>{title}</h1>;\n}\n\nexport default Header;\n";
    const ROUTE: &str = "const express = require('express');\n\nconst router = express.Router();\n\nrouter.get('/', (req, res) => res.json([]));\n\nmodule.exports = router;\n";

    fn twice(pass: Pass, section: Section, name: &str, text: &str) -> (String, String) {
        let once = pass
            .apply(section, name, text)
            .map(|(t, _)| t)
            .unwrap_or_else(|| text.to_string());
        let again = pass
            .apply(section, name, &once)
            .map(|(t, _)| t)
            .unwrap_or_else(|| once.clone());
        (once, again)
    }

    #[test]
    fn memo_wrap_adds_import_once() {
        let (once, again) = twice(Pass::Performance, Section::Component, "Header.jsx", COMPONENT);
        assert!(once.starts_with("import { memo } from 'react';\n"));
        assert!(once.contains("export default memo(Header);"));
        assert_eq!(once, again);
    }

    #[test]
    fn memo_reuses_existing_react_import() {
        let with_default = format!("import React from 'react';\n{COMPONENT}");
        let (once, _) = twice(Pass::Performance, Section::Component, "Header.jsx", &with_default);
        assert!(once.contains("export default React.memo(Header);"));
        assert_eq!(once.matches("from 'react'").count(), 1);

        let with_named = format!("import {{ useState }} from 'react';\n{COMPONENT}");
        let (once, _) = twice(Pass::Performance, Section::Component, "Header.jsx", &with_named);
        assert!(once.starts_with("import { useState, memo } from 'react';"));
    }

    #[test]
    fn route_middleware_is_injected_once() {
        let (perf, perf_again) = twice(Pass::Performance, Section::Route, "items.js", ROUTE);
        assert_eq!(perf, perf_again);
        assert_eq!(perf.matches("router.use(compression());").count(), 1);
        let decl = perf.find("const router = express.Router();").unwrap();
        assert!(perf.find("compression()").unwrap() > decl);

        let (sec, sec_again) = twice(Pass::Security, Section::Route, "items.js", &perf);
        assert_eq!(sec, sec_again);
        assert!(sec.contains("router.use(rateLimit("));
        assert!(sec.contains("router.use(helmet());"));
        assert!(sec.contains("router.use(compression());"));
    }

    #[test]
    fn inner_html_becomes_text_content() {
        let text = "el.innerHTML = msg;\n";
        let (out, note) = Pass::Security
            .apply(Section::Page, "Home.jsx", text)
            .unwrap();
        assert_eq!(out, "el.textContent = msg;\n");
        assert!(note.contains("textContent"));
    }

    #[test]
    fn maintainability_strips_imports_and_adds_props() {
        let text = format!("import React, {{ useState }} from 'react';\nimport lodash from 'lodash';\n\n{COMPONENT}");
        let (once, again) = twice(Pass::Maintainability, Section::Component, "Header.jsx", &text);
        assert_eq!(once, again);
        assert!(!once.contains("lodash"));
        assert!(!once.contains("import"));
        assert!(once.starts_with("/**\n * @typedef {Object} HeaderProps\n */\n"));
        assert!(once.ends_with("export default Header;\n"));
    }

    #[test]
    fn typescript_gets_an_interface() {
        let text = "import { useState } from 'react';\n\nexport function Card() {\n  const [n] = useState(0);\n  return n;\n}\n";
        let (out, _) = Pass::Maintainability
            .apply(Section::Component, "ui/Card.tsx", text)
            .unwrap();
        assert_eq!(
            out,
            "import { useState } from 'react';\n\ninterface CardProps {\n  [key: string]: unknown;\n}\n\nexport function Card() {\n  const [n] = useState(0);\n  return n;\n}\n"
        );
    }

    #[test]
    fn non_script_sources_are_untouched() {
        for pass in Pass::ALL {
            assert!(pass.apply(Section::Style, "globals.css", "body {}").is_none());
        }
    }

    #[test]
    fn run_reports_changed_files() {
        let mut bundle = CodeBundle::default();
        bundle.frontend.components.insert("Header.jsx".into(), COMPONENT.into());
        bundle.backend.routes.insert("items.js".into(), ROUTE.into());
        let (out, notes) = Pass::Performance.run(&bundle);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].starts_with("src/components/Header.jsx"));
        let (_, notes_again) = Pass::Performance.run(&out);
        assert!(notes_again.is_empty());
    }
}
