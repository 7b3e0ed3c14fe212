use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dialoguer::{Input, Password};
use reqwest::Method;
use std::sync::Arc;

use session_guard::auth::ConsoleRedirect;
use session_guard::config::{Command, Config};
use session_guard::error::ApiError;
use session_guard::models::auth::AuthPayload;
use session_guard::session::{Session, SessionStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        api = %config.api_base_url,
        db = %config.session_db_file.display(),
        leeway = config.token_expiry_leeway,
        "Configuration loaded"
    );

    let session = Session::from_config(&config, Arc::new(ConsoleRedirect))?;

    if let Err(e) = run(&session, command).await {
        // The redirect has already told the user to sign in again
        if e
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_session_ended)
        {
            std::process::exit(1);
        }
        return Err(e);
    }

    Ok(())
}

async fn run(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Password")
                    .interact()
                    .context("Failed to read password")?,
            };
            let payload = session.login(&email, &password).await?;
            report_auth(&payload);
        }

        Command::Register {
            email,
            first_name,
            password,
        } => {
            let first_name = match first_name {
                Some(name) => name,
                None => Input::<String>::new()
                    .with_prompt("First name")
                    .allow_empty(true)
                    .interact_text()
                    .context("Failed to read first name")?,
            };
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("Password")
                    .with_confirmation("Repeat password", "Passwords do not match")
                    .interact()
                    .context("Failed to read password")?,
            };
            let payload = session.register(&email, &password, &first_name).await?;
            report_auth(&payload);
        }

        Command::Logout => {
            session.logout().await?;
            println!("Logged out");
        }

        Command::Whoami { refresh } => {
            if !session.is_authenticated()? {
                println!("Not logged in");
                return Ok(());
            }
            let user = if refresh {
                session.fetch_user().await?
            } else {
                session.current_user().await?
            };
            println!("{} <{}>", user.display_name(), user.email);
        }

        Command::Status => print_status(&session.status(Utc::now())?),

        Command::Get { path } => {
            let request = session.api().request(Method::GET, &path).build()?;
            let response = session.api().execute(request).await?;
            let body = response.text().await.map_err(ApiError::from)?;
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", body),
            }
        }

        Command::VerifyEmail { uid, token } => {
            let payload = session.verify_email(&uid, &token).await?;
            report_auth(&payload);
        }

        Command::ResendVerification { email } => {
            let response = session.resend_verification(&email).await?;
            println!("{}", response.detail.unwrap_or_default());
            if let (Some(count), Some(max)) = (response.resend_count, response.max_resends) {
                println!("Sent {} of {} allowed emails", count, max);
            }
        }

        Command::ResetPassword { email } => {
            let response = session.request_password_reset(&email).await?;
            println!("{}", response.detail.unwrap_or_default());
        }

        Command::GoogleUrl => {
            let url = session.google_auth_url().await?;
            println!("{}", url.auth_url);
        }
    }

    Ok(())
}

fn report_auth(payload: &AuthPayload) {
    if let Some(ref detail) = payload.detail {
        println!("{}", detail);
    }
    match (&payload.user, payload.credentials()) {
        (Some(user), Some(_)) => println!("Logged in as {}", user.display_name()),
        (None, Some(_)) => println!("Logged in"),
        _ => {}
    }
}

fn print_status(status: &SessionStatus) {
    match status {
        SessionStatus::LoggedOut => println!("Not logged in"),
        SessionStatus::Active {
            access_expires_at,
            refresh_expires_at,
        } => {
            println!("Active");
            println!("  Access expires:  {}", fmt_instant(access_expires_at));
            println!("  Refresh expires: {}", fmt_instant(refresh_expires_at));
        }
        SessionStatus::Refreshable { refresh_expires_at } => {
            println!("Access token expired, will refresh on next request");
            println!("  Refresh expires: {}", fmt_instant(refresh_expires_at));
        }
        SessionStatus::Expired => println!("Session expired, log in again"),
    }
}

fn fmt_instant(instant: &Option<DateTime<Utc>>) -> String {
    match instant {
        Some(t) => {
            let remaining = *t - Utc::now();
            format!("{} ({}m)", t.to_rfc3339(), remaining.num_minutes())
        }
        None => "unknown".to_string(),
    }
}
