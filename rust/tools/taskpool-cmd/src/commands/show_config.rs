//! Show-config command implementation

use anyhow::Result;

pub fn run(config: Option<String>) -> Result<()> {
    let config = super::load_config(config.as_deref(), None, None)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
