//! Configuration commands.

use crate::{AppContext, ConfigAction};

pub fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", ctx.config.to_toml()?);
        }
        ConfigAction::Path => {
            let user = toolwire_core::Config::config_dir().join("config.toml");
            println!("Settings (user):    {}", user.display());
            println!("Settings (project): .toolwire/config.toml");
            println!("MCP server list:    {}", ctx.mcp_config_path.display());
        }
    }
    Ok(())
}
