use crate::config::Locale;
use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn validator_locale() -> ValueParser {
    ValueParser::from(move |locale: &str| -> std::result::Result<Locale, String> {
        locale.parse::<Locale>()
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("portico")
        .about("Admin and development tool for the portico platform facades")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("project-id")
                .long("project-id")
                .help("Platform project id")
                .env("PORTICO_PROJECT_ID")
                .global(true)
                .required(true),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .help("Platform web API key")
                .env("PORTICO_API_KEY")
                .global(true)
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("emulator-auth-host")
                .long("emulator-auth-host")
                .help("Identity emulator host:port, example: localhost:9099")
                .env("PORTICO_EMULATOR_AUTH_HOST")
                .global(true)
                .requires("emulator-firestore-host"),
        )
        .arg(
            Arg::new("emulator-firestore-host")
                .long("emulator-firestore-host")
                .help("Document store emulator host:port, example: localhost:8080")
                .env("PORTICO_EMULATOR_FIRESTORE_HOST")
                .global(true)
                .requires("emulator-auth-host"),
        )
        .arg(
            Arg::new("app-check-token")
                .long("app-check-token")
                .help("App Check debug token sent with every request")
                .env("PORTICO_APP_CHECK_TOKEN")
                .global(true)
                .hide_env_values(true),
        )
        .arg(
            Arg::new("locale")
                .long("locale")
                .help("Language of error messages: ko, en")
                .default_value("ko")
                .env("PORTICO_LOCALE")
                .global(true)
                .value_parser(validator_locale()),
        )
        .arg(
            Arg::new("daily-limit")
                .long("daily-limit")
                .help("Default daily AI usage limit")
                .env("PORTICO_DAILY_LIMIT")
                .global(true)
                .value_parser(clap::value_parser!(u32).range(0..=1000)),
        )
        .arg(
            Arg::new("email")
                .long("email")
                .help("Email of the acting account")
                .env("PORTICO_EMAIL")
                .global(true),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Password of the acting account")
                .env("PORTICO_PASSWORD")
                .global(true)
                .hide_env_values(true)
                .requires("email"),
        )
        .arg(
            Arg::new("dev-auto-login")
                .long("dev-auto-login")
                .help("Sign in with --email/--password as development credentials")
                .env("PORTICO_DEV_AUTO_LOGIN")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sms-bypass")
                .long("sms-bypass")
                .help("Skip real SMS delivery (development only)")
                .env("PORTICO_SMS_BYPASS")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .help("Emit logs as JSON")
                .env("PORTICO_LOG_JSON")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PORTICO_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(Command::new("stats").about("System statistics (admin)"))
        .subcommand(Command::new("users").about("List every user profile (admin)"))
        .subcommand(Command::new("ai-usage").about("Today's AI usage statistics (admin)"))
        .subcommand(
            Command::new("usage")
                .about("AI usage quota of one user")
                .arg(
                    Arg::new("uid")
                        .long("uid")
                        .help("User id, defaults to the acting account"),
                ),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Send a password reset email")
                .arg(
                    Arg::new("target")
                        .long("target")
                        .help("Email address of the account")
                        .required(true),
                ),
        )
}
