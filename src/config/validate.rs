// The miette/thiserror derive macros generate code that triggers false
// positive unused_assignments warnings on enum variant fields.
#![allow(unused_assignments)]

use std::collections::BTreeMap;

use miette::{Diagnostic, NamedSource, SourceSpan};
use regex::Regex;
use thiserror::Error;

use crate::config::model::{CortexConfig, GraphEngine};

// ---------------------------------------------------------------------------
// ConfigError: miette-powered validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigDiagnostic {
    #[error("project.backend_cli is empty")]
    #[diagnostic(code(cortex::empty_backend_cli))]
    EmptyBackendCli {
        #[source_code]
        src: NamedSource<String>,
        #[label("backend CLI is empty")]
        span: SourceSpan,
    },

    #[error("app `{app}` has an empty command")]
    #[diagnostic(code(cortex::empty_command))]
    EmptyCommand {
        #[source_code]
        src: NamedSource<String>,
        #[label("command is empty")]
        span: SourceSpan,
        app: String,
    },

    #[error("unknown graph engine `{value}` for deployment `{deployment}`")]
    #[diagnostic(
        code(cortex::unknown_graph_engine),
        help("supported engines are: neo4j, memgraph")
    )]
    UnknownGraphEngine {
        #[source_code]
        src: NamedSource<String>,
        #[label("unknown engine")]
        span: SourceSpan,
        deployment: String,
        value: String,
    },

    #[error("port {port} is used by multiple resources: {resources:?}")]
    #[diagnostic(code(cortex::duplicate_port))]
    DuplicatePort {
        #[source_code]
        src: NamedSource<String>,
        #[label("duplicate port")]
        span: SourceSpan,
        port: u16,
        resources: Vec<String>,
    },

    #[error("app `{app}` has port 0")]
    #[diagnostic(code(cortex::zero_port), help("pick a concrete port such as 3000"))]
    ZeroPort {
        #[source_code]
        src: NamedSource<String>,
        #[label("port must be non-zero")]
        span: SourceSpan,
        app: String,
    },

    #[error("invalid ready_pattern for `{resource}`: {reason}")]
    #[diagnostic(code(cortex::invalid_ready_pattern))]
    InvalidReadyPattern {
        #[source_code]
        src: NamedSource<String>,
        #[label("not a valid regular expression")]
        span: SourceSpan,
        resource: String,
        reason: String,
    },

    #[error("invalid duration `{value}` for session.{field}")]
    #[diagnostic(
        code(cortex::invalid_duration),
        help("use a humantime duration such as \"500ms\" or \"3s\"")
    )]
    InvalidDuration {
        #[source_code]
        src: NamedSource<String>,
        #[label("invalid duration")]
        span: SourceSpan,
        field: String,
        value: String,
    },

    #[error("session.log_capacity must be at least 1")]
    #[diagnostic(code(cortex::zero_log_capacity))]
    ZeroLogCapacity {
        #[source_code]
        src: NamedSource<String>,
        #[label("capacity is zero")]
        span: SourceSpan,
    },

    #[error("name `{name}` is used by both a deployment and an app")]
    #[diagnostic(code(cortex::duplicate_name))]
    DuplicateName {
        #[source_code]
        src: NamedSource<String>,
        #[label("also defined under [deployments]")]
        span: SourceSpan,
        name: String,
    },

    #[error("app `{app}` references unknown deployment `{deployment}`")]
    #[diagnostic(code(cortex::unknown_deployment))]
    UnknownDeployment {
        #[source_code]
        src: NamedSource<String>,
        #[label("no such deployment")]
        span: SourceSpan,
        #[help]
        advice: String,
        app: String,
        deployment: String,
    },
}

// ---------------------------------------------------------------------------
// Source span helpers
// ---------------------------------------------------------------------------

/// Find the byte offset of a TOML table header like `[apps.web]`.
fn find_table_span(source: &str, section: &str, name: &str) -> SourceSpan {
    let patterns = [
        format!("[{}.{}]", section, name),
        format!("[{}.{}", section, name),
    ];

    for pat in &patterns {
        if let Some(pos) = source.find(pat) {
            let name_start = pos + 1 + section.len() + 1;
            return (name_start, name.len()).into();
        }
    }

    if let Some(pos) = source.find(name) {
        return (pos, name.len()).into();
    }

    (0, 0).into()
}

/// Find the value span of `field = ...` below the `[section.name]` header.
/// An empty `name` means the header is just `[section]`.
fn find_field_span(source: &str, section: &str, name: &str, field: &str) -> SourceSpan {
    let table_header = if name.is_empty() {
        format!("[{}]", section)
    } else {
        format!("[{}.{}]", section, name)
    };
    let search_start = source.find(&table_header).unwrap_or(0);
    let after_header = &source[search_start..];

    for prefix in [format!("{} =", field), format!("{}=", field)] {
        if let Some(rel_pos) = after_header.find(&prefix) {
            let abs_pos = search_start + rel_pos;
            if let Some(val_start) = source[abs_pos..].find('=').map(|p| abs_pos + p + 1) {
                let val_trimmed = source[val_start..].trim_start();
                let trim_offset = val_start + (source[val_start..].len() - val_trimmed.len());
                let val_end = val_trimmed.find('\n').unwrap_or(val_trimmed.len());
                return (trim_offset, val_end).into();
            }
        }
    }

    if name.is_empty() {
        return source
            .find(&table_header)
            .map(|p| (p, table_header.len()).into())
            .unwrap_or_else(|| (0, 0).into());
    }
    find_table_span(source, section, name)
}

// ---------------------------------------------------------------------------
// Similarity suggestions
// ---------------------------------------------------------------------------

pub fn find_closest_match<'a>(name: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::jaro_winkler(name, candidate);
        if score >= 0.8 && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate.as_str(), score));
        }
    }
    best.map(|(name, _)| name)
}

/// Port a deployment URL listens on, if it has one.
pub fn url_port(url: &str) -> Option<u16> {
    reqwest::Url::parse(url).ok()?.port_or_known_default()
}

// ---------------------------------------------------------------------------
// Main validation function
// ---------------------------------------------------------------------------

pub fn validate(
    config: &CortexConfig,
    source: &str,
    filename: &str,
) -> Result<(), Vec<ConfigDiagnostic>> {
    let mut errors = Vec::new();
    let src = NamedSource::new(filename, source.to_string());

    if config.project.backend_cli.trim().is_empty() {
        errors.push(ConfigDiagnostic::EmptyBackendCli {
            src: src.clone(),
            span: find_field_span(source, "project", "", "backend_cli"),
        });
    }

    if config.session.log_capacity == 0 {
        errors.push(ConfigDiagnostic::ZeroLogCapacity {
            src: src.clone(),
            span: find_field_span(source, "session", "", "log_capacity"),
        });
    }

    for (field, value) in config.session.duration_fields() {
        if humantime::parse_duration(value).is_err() {
            errors.push(ConfigDiagnostic::InvalidDuration {
                src: src.clone(),
                span: find_field_span(source, "session", "", field),
                field: field.to_string(),
                value: value.to_string(),
            });
        }
    }

    let mut ports: BTreeMap<u16, Vec<(String, String, String)>> = BTreeMap::new();

    for (name, deployment) in &config.deployments {
        if let Some(graph) = &deployment.graph {
            if GraphEngine::parse(&graph.engine).is_none() {
                errors.push(ConfigDiagnostic::UnknownGraphEngine {
                    src: src.clone(),
                    span: find_field_span(source, "deployments", &format!("{}.graph", name), "engine"),
                    deployment: name.clone(),
                    value: graph.engine.clone(),
                });
            }
        }

        if let Some(pattern) = &deployment.ready_pattern {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ConfigDiagnostic::InvalidReadyPattern {
                    src: src.clone(),
                    span: find_field_span(source, "deployments", name, "ready_pattern"),
                    resource: name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if deployment.enabled {
            if let Some(port) = deployment.url.as_deref().and_then(url_port) {
                ports.entry(port).or_default().push((
                    format!("deployment:{}", name),
                    "deployments".to_string(),
                    name.clone(),
                ));
            }
        }
    }

    let deployment_names: Vec<String> = config.deployments.keys().cloned().collect();

    for (name, app) in &config.apps {
        if app.command.trim().is_empty() {
            errors.push(ConfigDiagnostic::EmptyCommand {
                src: src.clone(),
                span: find_field_span(source, "apps", name, "command"),
                app: name.clone(),
            });
        }

        if app.port == 0 {
            errors.push(ConfigDiagnostic::ZeroPort {
                src: src.clone(),
                span: find_field_span(source, "apps", name, "port"),
                app: name.clone(),
            });
        } else if app.enabled {
            ports.entry(app.port).or_default().push((
                format!("app:{}", name),
                "apps".to_string(),
                name.clone(),
            ));
        }

        if let Some(pattern) = &app.ready_pattern {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ConfigDiagnostic::InvalidReadyPattern {
                    src: src.clone(),
                    span: find_field_span(source, "apps", name, "ready_pattern"),
                    resource: name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if let Some(deployment) = &app.deployment {
            if !config.deployments.contains_key(deployment) {
                let advice = match find_closest_match(deployment, &deployment_names) {
                    Some(suggestion) => format!("did you mean `{}`?", suggestion),
                    None if deployment_names.is_empty() => {
                        "no deployments are defined".to_string()
                    }
                    None => format!("available deployments: {}", deployment_names.join(", ")),
                };
                errors.push(ConfigDiagnostic::UnknownDeployment {
                    src: src.clone(),
                    span: find_field_span(source, "apps", name, "deployment"),
                    advice,
                    app: name.clone(),
                    deployment: deployment.clone(),
                });
            }
        }

        if config.deployments.contains_key(name) {
            errors.push(ConfigDiagnostic::DuplicateName {
                src: src.clone(),
                span: find_table_span(source, "apps", name),
                name: name.clone(),
            });
        }
    }

    for (port, owners) in ports {
        if owners.len() > 1 {
            let (_, section, name) = &owners[1];
            let field = if section == "apps" { "port" } else { "url" };
            errors.push(ConfigDiagnostic::DuplicatePort {
                src: src.clone(),
                span: find_field_span(source, section, name, field),
                port,
                resources: owners.iter().map(|(label, _, _)| label.clone()).collect(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
