//! Config subcommand handlers.

use zwjs_config::{self as config, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let rendered = output::render_single(global.format(), &cfg, |c| {
                toml::to_string_pretty(c).unwrap_or_default()
            })?;
            output::print_output(&rendered, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { server, force } => {
            let mut cfg = config::load_config()?;
            let name = cfg.active_profile_name(global.profile.as_deref());
            add_profile(&mut cfg, &name, &server, force)?;

            let path = config::save_config(&cfg)?;
            tracing::info!(profile = %name, path = %path.display(), "config written");
            output::print_output(
                &format!("profile '{name}' written to {}", path.display()),
                global.quiet,
            );
            Ok(())
        }
    }
}

/// Insert `name` pointing at `server`, refusing to clobber unless forced.
fn add_profile(cfg: &mut Config, name: &str, server: &str, force: bool) -> Result<(), CliError> {
    if cfg.profiles.contains_key(name) && !force {
        return Err(CliError::ProfileExists {
            profile: name.into(),
        });
    }

    // Validate before writing anything
    zwjs_api::ClientConfig::from_address(server)?;

    cfg.profiles.insert(
        name.into(),
        Profile {
            server: server.into(),
            ..Profile::default()
        },
    );
    if cfg.default_profile.is_none() {
        cfg.default_profile = Some(name.into());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn existing_profile_needs_force() {
        let mut cfg = Config::default();
        add_profile(&mut cfg, "default", "hub.local:3000", false).unwrap();

        let err = add_profile(&mut cfg, "default", "other:3000", false).unwrap_err();
        assert!(matches!(err, CliError::ProfileExists { .. }));
        assert_eq!(cfg.profiles["default"].server, "hub.local:3000");

        add_profile(&mut cfg, "default", "other:3000", true).unwrap();
        assert_eq!(cfg.profiles["default"].server, "other:3000");
    }

    #[test]
    fn bad_server_is_rejected() {
        let mut cfg = Config::default();
        let err = add_profile(&mut cfg, "default", "ws://", false).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
        assert!(cfg.profiles.is_empty());
    }
}
