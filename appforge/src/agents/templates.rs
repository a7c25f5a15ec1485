//! Source templates for the fallback code bundle.
//!
//! Placeholders are `__UPPER__` tokens substituted with `str::replace`.

use std::collections::BTreeMap;

use super::planner::{pascal_case, slug};
use crate::model::{AppPlan, Backend, CodeBundle, Database, Frontend, GenerationRequest};

const COMPONENT: &str = r#"function __NAME__({ children }) {
  return <div className="__CLASS__">{children}</div>;
}

export default __NAME__;
"#;

const HEADER: &str = r#"function Header({ title = '__APP__' }) {
  return (
    <header className="header">
      <h1>{title}</h1>
    </header>
  );
}

export default Header;
"#;

const FOOTER: &str = r#"function Footer() {
  return (
    <footer className="footer">
      <small>__APP__</small>
    </footer>
  );
}

export default Footer;
"#;

const LAYOUT: &str = r#"import Header from './Header';
import Footer from './Footer';

function Layout({ children }) {
  return (
    <div className="layout">
      <Header />
      <main>{children}</main>
      <Footer />
    </div>
  );
}

export default Layout;
"#;

const PAGE_WITH_LAYOUT: &str = r#"import Layout from '../components/Layout';

function __NAME__Page() {
  return (
    <Layout>
      <h2>__TITLE__</h2>
    </Layout>
  );
}

export default __NAME__Page;
"#;

const PAGE: &str = r#"function __NAME__Page() {
  return (
    <main>
      <h2>__TITLE__</h2>
    </main>
  );
}

export default __NAME__Page;
"#;

const HEALTH_ROUTE: &str = r#"const express = require('express');

const router = express.Router();

router.get('/', (req, res) => {
  res.json({ status: 'ok' });
});

module.exports = router;
"#;

const RESOURCE_ROUTE: &str = r#"const express = require('express');
const __MODEL__ = require('../models/__MODEL__');

const router = express.Router();
const store = [];

router.get('/', (req, res) => {
  res.json(store);
});

router.post('/', (req, res, next) => {
  try {
    if (!req.body || typeof req.body.name !== 'string') {
      return res.status(400).json({ error: 'name is required' });
    }
    const record = new __MODEL__({ id: store.length + 1, name: req.body.name });
    store.push(record);
    res.status(201).json(record);
  } catch (err) {
    next(err);
  }
});

module.exports = router;
"#;

const MODEL: &str = r#"class __MODEL__ {
  constructor({ id, name, createdAt = new Date() }) {
    if (typeof name !== 'string' || name.length === 0) {
      throw new Error('__MODEL__ requires a name');
    }
    this.id = id;
    this.name = name;
    this.createdAt = createdAt;
  }
}

module.exports = __MODEL__;
"#;

const ERROR_HANDLER: &str = r#"function errorHandler(err, req, res, next) {
  if (res.headersSent) {
    return next(err);
  }
  res.status(err.status || 500).json({ error: err.message || 'Internal Server Error' });
}

module.exports = errorHandler;
"#;

const TABLE: &str = "CREATE TABLE IF NOT EXISTS __TABLE__ (
  id SERIAL PRIMARY KEY,
  name TEXT NOT NULL,
  created_at TIMESTAMP NOT NULL DEFAULT NOW()
);
";

const DOCKERFILE: &str = "FROM node:20-alpine
WORKDIR /app
COPY package*.json ./
RUN npm ci --omit=dev
COPY . .
ENV NODE_ENV=production
EXPOSE 3000
CMD [\"npm\", \"start\"]
";

/// Background, foreground and accent colors for a style name.
fn palette(style: &str) -> (&'static str, &'static str, &'static str) {
    match style.trim().to_ascii_lowercase().as_str() {
        "dark" => ("#0f172a", "#e2e8f0", "#38bdf8"),
        "minimal" => ("#ffffff", "#111111", "#555555"),
        "playful" => ("#fff7ed", "#431407", "#f97316"),
        "corporate" => ("#f8fafc", "#0f172a", "#1d4ed8"),
        _ => ("#fafafa", "#1f2937", "#6366f1"),
    }
}

fn stylesheet(style: &str) -> String {
    let (background, foreground, accent) = palette(style);
    format!(
        ":root {{
  --background: {background};
  --foreground: {foreground};
  --accent: {accent};
}}

body {{
  margin: 0;
  font-family: system-ui, -apple-system, sans-serif;
  background: var(--background);
  color: var(--foreground);
}}

.header,
.footer {{
  padding: 1rem 2rem;
}}

main {{
  max-width: 960px;
  margin: 0 auto;
  padding: 2rem;
}}

a {{
  color: var(--accent);
}}
"
    )
}

fn component_source(name: &str, app: &str, has: impl Fn(&str) -> bool) -> String {
    match name {
        "Header" => HEADER.replace("__APP__", app),
        "Footer" => FOOTER.replace("__APP__", app),
        "Layout" if has("Header") && has("Footer") => LAYOUT.to_string(),
        _ => COMPONENT
            .replace("__NAME__", name)
            .replace("__CLASS__", &slug(name)),
    }
}

/// Resource names behind the plan's API routes, minus the health check.
fn resources(plan: &AppPlan) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for route in &plan.structure.api_routes {
        let last = route
            .trim_end_matches('/')
            .rsplit('/')
            .find(|seg| !seg.is_empty() && !seg.starts_with(':'))
            .unwrap_or_default();
        let resource = slug(last);
        if !resource.is_empty() && resource != "health" && resource != "api" && !out.contains(&resource) {
            out.push(resource);
        }
    }
    if out.is_empty() {
        out.push("items".to_string());
    }
    out
}

fn package_json(plan: &AppPlan) -> String {
    let name = slug(&plan.name);
    let manifest = serde_json::json!({
        "name": if name.is_empty() { "generated-app".to_string() } else { name },
        "version": "0.1.0",
        "private": true,
        "description": plan.description,
        "scripts": {
            "dev": "vite",
            "build": "vite build",
            "start": "node server/index.js",
            "test": "vitest run"
        },
        "dependencies": {
            "compression": "^1.7.4",
            "express": "^4.19.2",
            "express-rate-limit": "^7.2.0",
            "helmet": "^7.1.0",
            "react": "^18.3.1",
            "react-dom": "^18.3.1"
        },
        "devDependencies": {
            "@vitejs/plugin-react": "^4.3.0",
            "vite": "^5.2.0",
            "vitest": "^1.6.0"
        }
    });
    let mut text = serde_json::to_string_pretty(&manifest).unwrap_or_default();
    text.push('\n');
    text
}

fn vercel_json() -> String {
    let config = serde_json::json!({
        "version": 2,
        "buildCommand": "npm run build",
        "outputDirectory": "dist",
        "rewrites": [{ "source": "/api/(.*)", "destination": "/server/index.js" }]
    });
    let mut text = serde_json::to_string_pretty(&config).unwrap_or_default();
    text.push('\n');
    text
}

/// Plan names that are already identifiers (`TodoList`) are kept as-is;
/// anything else is PascalCased from its words.
fn component_name(name: &str) -> String {
    let ident = name.starts_with(|c: char| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_alphanumeric());
    if ident { name.to_string() } else { pascal_case(name) }
}

/// A complete, runnable bundle derived only from the plan and request.
pub fn fallback_bundle(plan: &AppPlan, request: &GenerationRequest) -> CodeBundle {
    let mut component_names: Vec<String> = plan
        .structure
        .components
        .iter()
        .map(|c| component_name(c))
        .filter(|c| !c.is_empty())
        .collect();
    if component_names.is_empty() {
        component_names = vec!["Header".into(), "Footer".into(), "Layout".into()];
    }
    let has = |name: &str| component_names.iter().any(|c| c == name);

    let components: BTreeMap<String, String> = component_names
        .iter()
        .map(|name| (format!("{name}.jsx"), component_source(name, &plan.name, has)))
        .collect();

    let page_template = if has("Layout") { PAGE_WITH_LAYOUT } else { PAGE };
    let mut page_names: Vec<String> = plan
        .structure
        .pages
        .iter()
        .map(|p| component_name(p))
        .filter(|p| !p.is_empty())
        .collect();
    if page_names.is_empty() {
        page_names.push("Home".into());
    }
    let pages = page_names
        .iter()
        .map(|name| {
            let title = if name == "Home" { plan.name.clone() } else { name.clone() };
            let source = page_template
                .replace("__NAME__", name)
                .replace("__TITLE__", &title);
            (format!("{name}.jsx"), source)
        })
        .collect();

    let resources = resources(plan);
    let mut routes = BTreeMap::from([("health.js".to_string(), HEALTH_ROUTE.to_string())]);
    let mut models = BTreeMap::new();
    let mut schema = String::new();
    let mut seeds = Vec::new();
    for resource in &resources {
        let model = pascal_case(resource);
        let table = resource.replace('-', "_");
        routes.insert(format!("{resource}.js"), RESOURCE_ROUTE.replace("__MODEL__", &model));
        models.insert(format!("{model}.js"), MODEL.replace("__MODEL__", &model));
        if !schema.is_empty() {
            schema.push('\n');
        }
        schema.push_str(&TABLE.replace("__TABLE__", &table));
        seeds.push(format!("INSERT INTO {table} (name) VALUES ('Sample {}');\n", resource.replace('-', " ")));
    }

    CodeBundle {
        frontend: Frontend {
            components,
            pages,
            styles: BTreeMap::from([("globals.css".to_string(), stylesheet(&request.style))]),
        },
        backend: Backend {
            routes,
            models,
            middleware: BTreeMap::from([("errorHandler.js".to_string(), ERROR_HANDLER.to_string())]),
        },
        database: Database {
            migrations: vec![schema.clone()],
            schema,
            seeds,
        },
        deployment: BTreeMap::from([
            ("Dockerfile".to_string(), DOCKERFILE.to_string()),
            ("package.json".to_string(), package_json(plan)),
            ("vercel.json".to_string(), vercel_json()),
        ]),
    }
}
