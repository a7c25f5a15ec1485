//! Anti-pattern detection and the three 0–100 quality scores.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::lint::unused_imports;
use crate::config::OptimizeSettings;
use crate::model::{CodeBundle, Section};

const DEFAULT_LONG_FILE_LINES: usize = 300;

static UNSAFE_EVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\beval\s*\(|\bnew\s+Function\s*\(").expect("valid regex"));
static UNESCAPED_HTML: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.innerHTML\s*=|dangerouslySetInnerHTML|document\.write\s*\(").expect("valid regex")
});
static HARDCODED_SECRET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|secret|api[_-]?key|token)\b\s*[:=]\s*['"][^'"\s]{4,}['"]"#)
        .expect("valid regex")
});
static SQL_CONCAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(select|insert|update|delete)\b[^;\n]*['"`]\s*\+"#).expect("valid regex")
});
static SYNC_IO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(readFileSync|writeFileSync|appendFileSync|execSync|existsSync)\s*\(")
        .expect("valid regex")
});
static CONSOLE_LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bconsole\.log\s*\(").expect("valid regex"));
static SELECT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bselect\s+\*").expect("valid regex"));
static TODO_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(TODO|FIXME)\b").expect("valid regex"));
static ANY_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*any\b").expect("valid regex"));
pub(crate) static BARE_DEFAULT_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^export\s+default\s+([A-Z][A-Za-z0-9_]*)[ \t]*;?[ \t]*$").expect("valid regex")
});
static REQUEST_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\breq\.(body|query|params)\b").expect("valid regex"));
pub(crate) static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(export\s+)?(interface\s+\w+|type\s+\w+\s*=)|@typedef").expect("valid regex")
});

const VALIDATION_MARKERS: &[&str] = &[
    "validate", "typeof ", "schema", "joi", "zod", "yup", "status(400)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Performance,
    Security,
    Maintainability,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Performance => write!(f, "performance"),
            Category::Security => write!(f, "security"),
            Category::Maintainability => write!(f, "maintainability"),
        }
    }
}

/// One detected anti-pattern and what it cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: Category,
    pub file: String,
    pub message: String,
    pub penalty: u32,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {} (-{})", self.category, self.file, self.message, self.penalty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub performance: u8,
    pub security: u8,
    pub maintainability: u8,
    pub findings: Vec<Finding>,
}

fn is_script(file: &str) -> bool {
    [".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs"]
        .iter()
        .any(|ext| file.ends_with(ext))
}

fn is_typescript(file: &str) -> bool {
    file.ends_with(".ts") || file.ends_with(".tsx")
}

fn score_from(findings: &[Finding], category: Category) -> u8 {
    let penalty: u32 = findings
        .iter()
        .filter(|f| f.category == category)
        .map(|f| f.penalty)
        .sum();
    100u32.saturating_sub(penalty) as u8
}

struct Scanner<'a> {
    settings: &'a OptimizeSettings,
    findings: Vec<Finding>,
}

impl Scanner<'_> {
    fn hit(&mut self, category: Category, file: &str, weight: u32, count: usize, what: &str) {
        if count == 0 || weight == 0 {
            return;
        }
        let message = if count == 1 {
            what.to_string()
        } else {
            format!("{what} (x{count})")
        };
        self.findings.push(Finding {
            category,
            file: file.to_string(),
            message,
            penalty: weight.saturating_mul(count as u32),
        });
    }

    fn scan_source(&mut self, section: Section, file: &str, text: &str) {
        let settings = self.settings;
        let w = &settings.penalties;
        let script = is_script(file);

        self.hit(Category::Maintainability, file, w.todo_marker, TODO_MARKER.find_iter(text).count(), "Unresolved TODO/FIXME marker");
        let limit = settings.long_file_lines.unwrap_or(DEFAULT_LONG_FILE_LINES);
        let lines = text.lines().count();
        if lines > limit {
            self.hit(Category::Maintainability, file, w.long_file, 1, &format!("File has {lines} lines"));
        }
        if !script {
            return;
        }

        self.hit(Category::Security, file, w.unsafe_eval, UNSAFE_EVAL.find_iter(text).count(), "Dynamic code evaluation");
        self.hit(Category::Security, file, w.unescaped_html, UNESCAPED_HTML.find_iter(text).count(), "Unescaped HTML injection");
        self.hit(Category::Security, file, w.hardcoded_secret, HARDCODED_SECRET.find_iter(text).count(), "Hardcoded credential");
        self.hit(Category::Security, file, w.sql_concat, SQL_CONCAT.find_iter(text).count(), "SQL built by string concatenation");
        if section == Section::Route && REQUEST_INPUT.is_match(text) {
            let lower = text.to_lowercase();
            if !VALIDATION_MARKERS.iter().any(|m| lower.contains(m)) {
                self.hit(Category::Security, file, w.missing_validation, 1, "Request input used without validation");
            }
        }

        self.hit(Category::Performance, file, w.sync_io, SYNC_IO.find_iter(text).count(), "Blocking synchronous I/O");
        self.hit(Category::Performance, file, w.console_log, CONSOLE_LOG.find_iter(text).count(), "console.log left in code");
        self.hit(Category::Performance, file, w.select_star, SELECT_STAR.find_iter(text).count(), "SELECT * query");
        if section == Section::Component && BARE_DEFAULT_EXPORT.is_match(text) {
            self.hit(Category::Performance, file, w.missing_memo, 1, "Component exported without memoization");
        }

        self.hit(Category::Maintainability, file, w.unused_import, unused_imports(text).len(), "Unused import");
        if is_typescript(file) {
            self.hit(Category::Maintainability, file, w.any_type, ANY_TYPE.find_iter(text).count(), "Explicit `any` type");
        }
        if section == Section::Component && !TYPE_DECL.is_match(text) {
            self.hit(Category::Maintainability, file, w.missing_types, 1, "Component props are undocumented");
        }
    }

    fn scan_sql(&mut self, file: &str, text: &str) {
        let w = self.settings.penalties.select_star;
        self.hit(Category::Performance, file, w, SELECT_STAR.find_iter(text).count(), "SELECT * query");
    }
}

/// Score a bundle. Each score starts at 100, loses each finding's penalty,
/// and floors at 0.
pub fn score_bundle(bundle: &CodeBundle, settings: &OptimizeSettings) -> ScoreCard {
    let mut scanner = Scanner {
        settings,
        findings: Vec::new(),
    };
    for (section, name, text) in bundle.sources() {
        scanner.scan_source(section, &format!("{}/{name}", section.dir()), text);
    }
    scanner.scan_sql("database/schema.sql", &bundle.database.schema);
    for (i, migration) in bundle.database.migrations.iter().enumerate() {
        scanner.scan_sql(&format!("database/migrations/{:03}.sql", i + 1), migration);
    }

    let findings = scanner.findings;
    ScoreCard {
        performance: score_from(&findings, Category::Performance),
        security: score_from(&findings, Category::Security),
        maintainability: score_from(&findings, Category::Maintainability),
        findings,
    }
}
