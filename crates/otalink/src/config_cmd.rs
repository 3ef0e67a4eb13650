// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `otalink config check`.

use otalink_config::OtalinkConfig;
use otalink_core::OtalinkError;

/// Prints the effective configuration as TOML. Reaching this point means
/// loading and validation already succeeded.
pub fn run_check(config: &OtalinkConfig) -> Result<(), OtalinkError> {
    let rendered = render(config)?;
    eprintln!("otalink: configuration is valid");
    println!("{rendered}");
    Ok(())
}

fn render(config: &OtalinkConfig) -> Result<String, OtalinkError> {
    toml::to_string_pretty(config)
        .map_err(|e| OtalinkError::Config(format!("failed to render configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_config_round_trips_through_loader() {
        let config = OtalinkConfig::default();
        let rendered = render(&config).unwrap();
        assert!(rendered.contains("[update]"));
        assert!(rendered.contains("default_chunk_size = 4096"));

        let reloaded = otalink_config::load_and_validate_str(&rendered).unwrap();
        assert_eq!(reloaded.queue.max_retries, config.queue.max_retries);
    }
}
