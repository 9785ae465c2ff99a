use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use owo_colors::OwoColorize;

use crate::orchestrator::ports::PortInstance;
use crate::orchestrator::state::ServiceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Ready,
    Starting,
    Stopped,
    Failed(i32),
}

impl ServiceStatus {
    pub fn of(record: &ServiceRecord) -> Self {
        if record.ready {
            ServiceStatus::Ready
        } else if record.running {
            ServiceStatus::Starting
        } else {
            match record.last_exit {
                Some(code) if code != 0 => ServiceStatus::Failed(code),
                _ => ServiceStatus::Stopped,
            }
        }
    }

    fn label(&self) -> String {
        match self {
            ServiceStatus::Ready => "ready".to_string(),
            ServiceStatus::Starting => "starting".to_string(),
            ServiceStatus::Stopped => "stopped".to_string(),
            ServiceStatus::Failed(code) => format!("exited ({})", code),
        }
    }

    fn render(&self, use_color: bool) -> String {
        let label = self.label();
        if !use_color {
            return format!("\u{25cf} {}", label);
        }
        match self {
            ServiceStatus::Ready => format!("{} {}", "\u{25cf}".green(), label.green()),
            ServiceStatus::Starting => format!("{} {}", "\u{25cf}".yellow(), label.yellow()),
            ServiceStatus::Stopped => format!("{} {}", "\u{25cf}".dimmed(), label.dimmed()),
            ServiceStatus::Failed(_) => format!("{} {}", "\u{25cf}".red(), label.red()),
        }
    }
}

/// One dashboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRow {
    pub name: String,
    pub kind: &'static str,
    pub url: Option<String>,
    pub status: ServiceStatus,
}

impl ServiceRow {
    pub fn from_record(record: &ServiceRecord) -> Self {
        Self {
            name: record.name().to_string(),
            kind: record.kind().label(),
            url: record.kind().url(),
            status: ServiceStatus::of(record),
        }
    }
}

pub fn render_dashboard(project: &str, rows: &[ServiceRow], use_color: bool) -> String {
    let mut out = String::new();
    out.push('\n');
    if use_color {
        out.push_str(&format!("  {} {}\n\n", "cortex".bold(), project.cyan()));
    } else {
        out.push_str(&format!("  cortex {}\n\n", project));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Service").set_alignment(CellAlignment::Left),
        Cell::new("Kind").set_alignment(CellAlignment::Left),
        Cell::new("URL").set_alignment(CellAlignment::Left),
        Cell::new("Status").set_alignment(CellAlignment::Center),
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.name),
            Cell::new(row.kind),
            Cell::new(row.url.as_deref().unwrap_or("-")),
            Cell::new(row.status.render(use_color)),
        ]);
    }

    // Indent the table by 2 spaces
    for line in table.to_string().lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// One-line summary shown under the log view after a state change.
pub fn render_status_strip(rows: &[ServiceRow], interactive: bool, use_color: bool) -> String {
    let ready = rows
        .iter()
        .filter(|r| r.status == ServiceStatus::Ready)
        .count();
    let mut parts: Vec<String> = rows
        .iter()
        .map(|r| {
            let icon = match r.status {
                ServiceStatus::Ready => "\u{2713}",
                ServiceStatus::Starting => "\u{2026}",
                ServiceStatus::Stopped | ServiceStatus::Failed(_) => "\u{2717}",
            };
            let item = format!("{} {}", icon, r.name);
            if !use_color {
                return item;
            }
            match r.status {
                ServiceStatus::Ready => format!("{}", item.green()),
                ServiceStatus::Starting => format!("{}", item.yellow()),
                ServiceStatus::Stopped => format!("{}", item.dimmed()),
                ServiceStatus::Failed(_) => format!("{}", item.red()),
            }
        })
        .collect();
    parts.insert(0, format!("{}/{} ready", ready, rows.len()));

    let mut strip = parts.join("  ");
    if interactive {
        let hint = "? help  q quit";
        if use_color {
            strip.push_str(&format!("  {}", hint.dimmed()));
        } else {
            strip.push_str("  ");
            strip.push_str(hint);
        }
    }
    strip
}

pub fn render_help() -> String {
    [
        "",
        "  Keyboard shortcuts",
        "    c      clear logs",
        "    s      show status",
        "    r      restart all services",
        "    g      toggle graph database",
        "    k      kill processes on common dev ports",
        "    q      quit",
        "    Ctrl-C quit (press again to force)",
        "    ?, h   this help",
        "",
        "  Press any key to close.",
    ]
    .join("\n")
}

pub fn render_kill_menu(instances: &[PortInstance]) -> String {
    let mut lines = vec![String::new()];
    if instances.is_empty() {
        lines.push("  No processes listening on common dev ports.".to_string());
    } else {
        lines.push("  Processes on common dev ports:".to_string());
        for (i, inst) in instances.iter().enumerate() {
            lines.push(format!("    {}) {}", i + 1, inst));
        }
        lines.push("    a) kill all".to_string());
    }
    lines.push("    Esc) return".to_string());
    lines.join("\n")
}

pub fn render_graph_menu(deployments: &[String]) -> String {
    let mut lines = vec![String::new(), "  Toggle graph database for:".to_string()];
    for (i, name) in deployments.iter().enumerate() {
        lines.push(format!("    {}) {}", i + 1, name));
    }
    lines.push("    Esc) return".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, status: ServiceStatus) -> ServiceRow {
        ServiceRow {
            name: name.to_string(),
            kind: "app",
            url: Some("http://localhost:3000".to_string()),
            status,
        }
    }

    #[test]
    fn dashboard_lists_every_service() {
        let rows = vec![
            row("svc-a", ServiceStatus::Ready),
            row("svc-b", ServiceStatus::Starting),
            row("svc-c", ServiceStatus::Failed(1)),
        ];
        let out = render_dashboard("demo", &rows, false);
        assert!(out.contains("cortex demo"));
        assert!(out.contains("svc-a"));
        assert!(out.contains("\u{25cf} ready"));
        assert!(out.contains("\u{25cf} starting"));
        assert!(out.contains("exited (1)"));
        assert!(out.contains("http://localhost:3000"));
    }

    #[test]
    fn strip_counts_ready() {
        let rows = vec![
            row("svc-a", ServiceStatus::Ready),
            row("svc-b", ServiceStatus::Stopped),
        ];
        let strip = render_status_strip(&rows, false, false);
        assert!(strip.starts_with("1/2 ready"));
        assert!(strip.contains("\u{2713} svc-a"));
        assert!(strip.contains("\u{2717} svc-b"));
        assert!(!strip.contains("help"));
        assert!(render_status_strip(&rows, true, false).ends_with("? help  q quit"));
    }

    #[test]
    fn empty_kill_menu_offers_only_return() {
        let menu = render_kill_menu(&[]);
        assert!(menu.contains("Esc) return"));
        assert!(!menu.contains("1)"));
        assert!(!menu.contains("a)"));
    }

    #[test]
    fn kill_menu_numbers_entries() {
        let menu = render_kill_menu(&[PortInstance {
            port: 5173,
            pid: 4242,
            name: "node".to_string(),
        }]);
        assert!(menu.contains("1) :5173 node (pid 4242)"));
        assert!(menu.contains("a) kill all"));
    }

    #[test]
    fn graph_menu_is_one_based() {
        let menu = render_graph_menu(&["cloud".to_string(), "local".to_string()]);
        assert!(menu.contains("1) cloud"));
        assert!(menu.contains("2) local"));
    }
}
