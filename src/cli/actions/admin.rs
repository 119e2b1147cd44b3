use crate::{
    auth::AuthFacade,
    cli::{actions::Action, globals::GlobalArgs},
    clock::{Clock, SystemClock},
    config::Locale,
    error::{Error, ErrorKind},
    outcome::Outcome,
    platform::{rest, DocumentStore, IdentityProvider},
    usage::UsageFacade,
};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Print `result` as an [`Outcome`] envelope; returns whether it succeeded.
fn render<T: Serialize>(result: Result<T, Error>, locale: Locale) -> Result<bool> {
    let outcome = Outcome::from_result(result, locale);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.success)
}

/// Sign in as the acting account and return its uid.
async fn actor<I, D>(auth: &AuthFacade<I, D>, globals: &GlobalArgs) -> Result<String, Error>
where
    I: IdentityProvider,
    D: DocumentStore,
{
    let user = if globals.dev_auto_login {
        auth.dev_auto_login().await?
    } else {
        let credentials = globals
            .credentials()
            .ok_or(Error::Precondition(ErrorKind::NotAuthenticated))?;
        auth.sign_in_with_email(&credentials.email, &credentials.password)
            .await?
    };
    debug!("acting as {}", user.uid);
    Ok(user.uid)
}

/// Run `action` against the facades and print its outcome.
///
/// # Errors
/// Returns an error if the platform client cannot be built or the output
/// cannot be serialized. Facade failures are printed, not returned.
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<bool> {
    let config = Arc::new(globals.config());
    let (identity, store) = rest::connect(&config)?;
    let store = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let auth = AuthFacade::new(Arc::new(identity), store.clone(), config.clone(), clock.clone());
    let usage = UsageFacade::new(store, config.clone(), clock);

    run(action, globals, &auth, &usage, config.locale()).await
}

#[instrument(skip(globals, auth, usage))]
async fn run<I, D>(
    action: Action,
    globals: &GlobalArgs,
    auth: &AuthFacade<I, D>,
    usage: &UsageFacade<D>,
    locale: Locale,
) -> Result<bool>
where
    I: IdentityProvider,
    D: DocumentStore,
{
    match action {
        Action::ResetPassword { target } => render(auth.reset_password(&target).await, locale),
        Action::Stats => {
            let result = match actor(auth, globals).await {
                Ok(uid) => usage.get_system_stats(&uid).await,
                Err(err) => Err(err),
            };
            render(result, locale)
        }
        Action::Users => {
            let result = match actor(auth, globals).await {
                Ok(uid) => usage.get_all_users(&uid).await,
                Err(err) => Err(err),
            };
            render(result, locale)
        }
        Action::AiUsage => {
            let result = match actor(auth, globals).await {
                Ok(uid) => usage.get_ai_usage_stats(&uid).await,
                Err(err) => Err(err),
            };
            render(result, locale)
        }
        Action::Usage { uid } => {
            let result = match uid {
                Some(uid) => usage.check_ai_usage_limit(&uid).await,
                None => match actor(auth, globals).await {
                    Ok(uid) => usage.check_ai_usage_limit(&uid).await,
                    Err(err) => Err(err),
                },
            };
            render(result, locale)
        }
    }
}
