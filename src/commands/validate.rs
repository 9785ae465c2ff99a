use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

use crate::config;
use crate::config::resolve::{resolve_config, CONFIG_FILENAME};
use crate::config::validate::validate;

pub fn run(config_file: Option<&Path>) -> Result<()> {
    let config_path = resolve_config(config_file)?;

    let (config, source) = config::load_config(&config_path)?;

    let filename = config_path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| CONFIG_FILENAME.to_string());

    match validate(&config, &source, &filename) {
        Ok(()) => {
            let graphs = config
                .deployments
                .values()
                .filter(|d| d.graph.as_ref().is_some_and(|g| g.enabled))
                .count();
            println!(
                "  {} {} is valid ({} deployments, {} graph, {} apps)",
                "\u{2713}".green(),
                filename,
                config.deployments.len(),
                graphs,
                config.apps.len(),
            );
            Ok(())
        }
        Err(errors) => {
            for err in errors {
                let report: miette::Report = err.into();
                eprintln!("{:?}", report);
            }
            std::process::exit(1);
        }
    }
}
