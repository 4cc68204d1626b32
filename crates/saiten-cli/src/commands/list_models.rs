//! The `saiten list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use saiten_providers::create_provider;

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = saiten_providers::config::load_config_from(config_path.as_deref())?;

    if let Some(filter) = &provider_filter {
        anyhow::ensure!(
            config.providers.contains_key(filter),
            "unknown provider '{filter}'"
        );
    }

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    for name in names {
        if provider_filter.as_ref().is_some_and(|f| f != name) {
            continue;
        }

        let provider = create_provider(name, &config.providers[name])?;
        let marker = if *name == config.default_provider {
            " (default)"
        } else {
            ""
        };
        println!("Provider: {name}{marker}");

        // Local servers are often not running; report and move on.
        match provider.list_models().await {
            Ok(models) if models.is_empty() => println!("  no models served"),
            Ok(models) => {
                for model in &models {
                    println!("  {}", model.id);
                }
            }
            Err(e) => println!("  unavailable: {e:#}"),
        }
        println!();
    }

    Ok(())
}
