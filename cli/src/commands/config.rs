//! Config commands

use anyhow::bail;
use serde::Serialize;

use super::Context;
use crate::config::Profile;
use crate::ConfigCommands;

#[derive(Serialize)]
struct Effective<'a> {
    profile: &'a Profile,
    engine: sase_desk::EngineConfig,
}

pub fn handle(ctx: &Context, action: ConfigCommands) -> anyhow::Result<()> {
    let name = ctx.profile_name.as_deref();
    match action {
        ConfigCommands::Init { force } => {
            let path = Profile::path(name)?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let path = Profile::default().save(name)?;
            println!("Profile initialized at {}", path.display());
        }
        ConfigCommands::Set { key, value } => {
            let mut profile = Profile::load(name)?;
            profile.set(&key, value)?;
            profile.save(name)?;
            println!("Set {} successfully", key);
        }
        ConfigCommands::Show => {
            let engine = ctx.engine_config()?;
            if ctx.format.is_table() {
                println!("# profile {}", Profile::path(name)?.display());
                print!("{}", toml::to_string_pretty(&ctx.profile)?);
                println!("\n# engine");
                print!("{}", engine.to_toml_string()?);
            } else {
                ctx.format.print(&Effective {
                    profile: &ctx.profile,
                    engine,
                })?;
            }
        }
    }
    Ok(())
}
