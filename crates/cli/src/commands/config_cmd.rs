//! `bareagent config`: show the effective configuration.

use bareagent_config::AppConfig;

pub fn run(path: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Config error: {e}"))?;
    if !config_path.exists() {
        eprintln!("  (no {} found, showing defaults)", config_path.display());
    }
    print!("{}", config.to_toml());
    Ok(())
}
