use anyhow::Result;
use std::path::Path;

use crate::config::resolve::CONFIG_FILENAME;

pub fn run() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = cwd.join(CONFIG_FILENAME);

    if config_path.exists() {
        anyhow::bail!("{} already exists in {}", CONFIG_FILENAME, cwd.display());
    }

    let project_name = cwd
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "my-cortex".to_string());
    let layout = detect_layout(&cwd);

    std::fs::write(&config_path, render_config(&project_name, &layout))?;
    println!("Created {} in {}", CONFIG_FILENAME, cwd.display());
    println!();
    println!("  Project:    {}", project_name);
    println!("  Deployment: local -> {}", layout.backend_path);
    if let Some(app) = &layout.app_path {
        println!("  App:        web -> {}", app);
    }
    println!();
    println!("Edit the file, then run `cortex dev` to begin.");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct Layout {
    backend_path: String,
    app_path: Option<String>,
    has_graph_compose: bool,
}

/// Guess where the backend functions and the web app live.
fn detect_layout(dir: &Path) -> Layout {
    let backend_path = ["backend", "packages/backend", "."]
        .into_iter()
        .find(|p| dir.join(p).join("convex").is_dir())
        .unwrap_or(".")
        .to_string();

    let app_path = ["web", "app", "apps/web", "frontend"]
        .into_iter()
        .find(|p| dir.join(p).join("package.json").is_file())
        .map(|p| format!("./{}", p));

    let has_graph_compose = dir
        .join(&backend_path)
        .join(crate::orchestrator::graph::COMPOSE_FILE)
        .is_file();

    Layout {
        backend_path: if backend_path == "." {
            ".".to_string()
        } else {
            format!("./{}", backend_path)
        },
        app_path,
        has_graph_compose,
    }
}

fn render_config(project_name: &str, layout: &Layout) -> String {
    let graph = if layout.has_graph_compose {
        "[deployments.local.graph]\nengine = \"neo4j\"            # or \"memgraph\"\n"
    } else {
        "# [deployments.local.graph]     # needs docker-compose.graph.yml in the path above\n# engine = \"neo4j\"              # or \"memgraph\"\n"
    };
    let app = match &layout.app_path {
        Some(path) => format!(
            "[apps.web]\npath = \"{path}\"\ncommand = \"npm run dev\"\nport = 3000\ndeployment = \"local\"\n"
        ),
        None => "# [apps.web]\n# path = \"./web\"\n# command = \"npm run dev\"\n# port = 3000\n# deployment = \"local\"\n".to_string(),
    };

    format!(
        r#"[project]
name = "{project_name}"
# backend_cli = "npx convex"

# -- Session tuning (all optional) --
# [session]
# log_capacity = 100
# grace_period = "500ms"
# graph_settle = "3s"
# probe_timeout = "5s"
# ready_warn_after = "60s"

# -- Deployments: one backend dev server each --
[deployments.local]
path = "{backend}"
url = "http://127.0.0.1:3210"
local = true
# ready_pattern = "Convex functions ready"
# env = {{ CONVEX_DEPLOYMENT = "local" }}

{graph}
# -- Companion apps --
{app}"#,
        backend = layout.backend_path,
    )
}
