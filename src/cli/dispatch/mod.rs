use crate::{
    cli::{actions::Action, globals::GlobalArgs},
    config::{EmulatorHosts, Locale},
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Read the global arguments shared by every subcommand.
pub fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let project_id = matches
        .get_one::<String>("project-id")
        .cloned()
        .context("missing required argument: --project-id")?;
    let api_key = matches
        .get_one::<String>("api-key")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --api-key")?;

    let mut globals = GlobalArgs::new(project_id, api_key);

    globals.emulator = match (
        matches.get_one::<String>("emulator-auth-host"),
        matches.get_one::<String>("emulator-firestore-host"),
    ) {
        (Some(auth), Some(firestore)) => Some(EmulatorHosts {
            auth: auth.clone(),
            firestore: firestore.clone(),
        }),
        _ => None,
    };
    globals.app_check_token = matches
        .get_one::<String>("app-check-token")
        .cloned()
        .map(SecretString::from);
    globals.locale = matches
        .get_one::<Locale>("locale")
        .copied()
        .unwrap_or_default();
    globals.daily_limit = matches.get_one::<u32>("daily-limit").copied();
    globals.email = matches.get_one::<String>("email").cloned();
    globals.password = matches
        .get_one::<String>("password")
        .cloned()
        .map(SecretString::from);
    globals.dev_auto_login = matches.get_flag("dev-auto-login");
    globals.sms_bypass = matches.get_flag("sms-bypass");

    Ok(globals)
}

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    // Closure to return subcommand matches
    let sub_m = |subcommand| -> Result<&clap::ArgMatches> {
        matches
            .subcommand_matches(subcommand)
            .context("arguments not found")
    };

    match matches.subcommand_name() {
        Some("stats") => Ok(Action::Stats),
        Some("users") => Ok(Action::Users),
        Some("ai-usage") => Ok(Action::AiUsage),
        Some("usage") => Ok(Action::Usage {
            uid: sub_m("usage")?.get_one::<String>("uid").cloned(),
        }),
        Some("reset-password") => Ok(Action::ResetPassword {
            target: sub_m("reset-password")?
                .get_one::<String>("target")
                .cloned()
                .context("missing required argument: --target")?,
        }),
        _ => anyhow::bail!("unknown subcommand"),
    }
}
