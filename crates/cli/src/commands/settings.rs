//! Local CLI settings

use anyhow::Result;
use colored::Colorize;

use crate::config::Config;
use crate::output::{print_json, print_success, OutputFormat};

/// Print the stored settings and where they live
pub fn show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(config)?,
        OutputFormat::Table => {
            let unset = || "(unset)".dimmed().to_string();
            println!("File:           {}", Config::config_path()?.display());
            println!(
                "API URL:        {}",
                config.api_url.clone().unwrap_or_else(unset)
            );
            println!(
                "Default format: {}",
                config
                    .default_format
                    .map(|f| format!("{:?}", f).to_lowercase())
                    .unwrap_or_else(unset)
            );
            println!(
                "Default preset: {}",
                config.default_preset.clone().unwrap_or_else(unset)
            );
        }
    }
    Ok(())
}

/// Update the given settings and save
pub fn set(
    mut config: Config,
    api_url: Option<String>,
    default_format: Option<OutputFormat>,
    default_preset: Option<String>,
) -> Result<()> {
    if let Some(url) = api_url {
        url::Url::parse(&url)?;
        config.api_url = Some(url);
    }
    if default_format.is_some() {
        config.default_format = default_format;
    }
    if default_preset.is_some() {
        config.default_preset = default_preset;
    }

    let path = config.save()?;
    print_success(&format!("Saved {}", path.display()));
    Ok(())
}
