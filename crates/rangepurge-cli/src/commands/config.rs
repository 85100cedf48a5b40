//! Configuration management commands.

use rangepurge_core::config::IssueSeverity;
use rangepurge_core::Config;

use crate::ConfigAction;

pub fn handle(action: ConfigAction, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# Config directory: {}", Config::config_dir().display());
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Validate => {
            let result = config.validate();
            for issue in &result.issues {
                let marker = match issue.severity {
                    IssueSeverity::Error => "✗",
                    IssueSeverity::Warning => "!",
                };
                println!("  {marker} {issue}");
            }
            if !result.is_ok() {
                anyhow::bail!("configuration has {} error(s)", result.errors().count());
            }
            println!("✓ Configuration is valid");
        }
    }
    Ok(())
}
