//! habitrack - a terminal client for the habit tracker API.
//!
//! Sessions persist between runs, so `habitrack login alice` once and the
//! other commands reuse (and silently renew) the stored tokens.

use std::io;

use anyhow::{bail, Context, Result};
use habitrack_core::api::auth::Registration;
use habitrack_core::api::{AnalyticsView, ApiError};
use habitrack_core::auth::SessionEvent;
use habitrack_core::{Client, Config};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable that supplies the password non-interactively
const PASSWORD_ENV: &str = "HABITRACK_PASSWORD";

const USAGE: &str = "\
Usage: habitrack <command>

Commands:
  login <username>                 Log in and store the session
  register <username> <email>      Create an account and log in
  logout                           End the session
  whoami                           Show the logged-in user
  habits [page]                    List habits
  habit <id>                       Show a habit with its statistics
  analytics [overview|weekly|monthly]
";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprint!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let client = Client::from_config(&config)?;
    let mut events = client.events().subscribe();
    info!(api_url = %config.api_url(), command = %command, "habitrack starting");

    let result = run(&client, &mut config, command, &args[1..]).await;

    if session_expired(&mut events) {
        eprintln!("Session expired. Please log in again.");
    }
    result
}

async fn run(client: &Client, config: &mut Config, command: &str, rest: &[String]) -> Result<()> {
    match command {
        "login" => {
            let username = match rest.first() {
                Some(name) => name.clone(),
                None => config
                    .last_username
                    .clone()
                    .context("Usage: habitrack login <username>")?,
            };
            let password = read_password()?;
            let user = client.session.login(&username, &password).await.map_err(report)?;
            println!("Logged in as {}", user.username().unwrap_or(&username));

            config.last_username = Some(username);
            config.save()?;
        }
        "register" => {
            let (Some(username), Some(email)) = (rest.first(), rest.get(1)) else {
                bail!("Usage: habitrack register <username> <email>");
            };
            let password = read_password()?;
            let confirmation = rpassword::prompt_password("Confirm password: ")?;
            let registration = Registration {
                username: username.clone(),
                email: email.clone(),
                password,
                password_confirmation: confirmation,
            };
            let user = client.session.register(&registration).await.map_err(report)?;
            println!("Welcome, {}", user.username().unwrap_or(username));
        }
        "logout" => {
            client.session.logout().await;
            println!("Logged out");
        }
        "whoami" => {
            require_session(client).await?;
            let user = client.session.user().context("No user loaded")?;
            println!("{}", serde_json::to_string_pretty(user.as_value())?);
        }
        "habits" => {
            require_session(client).await?;
            let page_number = match rest.first() {
                Some(n) => n.parse().context("Page must be a number")?,
                None => 1,
            };
            let page = client.habits.list(page_number).await.map_err(report)?;
            for habit in &page.results {
                println!(
                    "{:>5}  {:<30} {:<14} streak {}{}",
                    habit.id,
                    habit.name,
                    habit.category.display_name(),
                    habit.current_streak,
                    if habit.is_active { "" } else { "  (inactive)" }
                );
            }
            println!("{} habit(s) total", page.count);
        }
        "habit" => {
            require_session(client).await?;
            let id: i64 = rest
                .first()
                .context("Usage: habitrack habit <id>")?
                .parse()
                .context("Habit id must be a number")?;
            let (habit, stats) = client.habits.detail_with_stats(id).await.map_err(report)?;
            println!("{} ({})", habit.name, habit.category.display_name());
            if !habit.description.is_empty() {
                println!("{}", habit.description);
            }
            println!(
                "Current streak: {}  Longest: {}  Completion: {:.2}%",
                habit.current_streak, habit.longest_streak, habit.completion_rate
            );
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "analytics" => {
            require_session(client).await?;
            let view = match rest.first().map(String::as_str) {
                None | Some("overview") => AnalyticsView::Overview,
                Some("weekly") => AnalyticsView::Weekly,
                Some("monthly") => AnalyticsView::Monthly,
                Some(other) => bail!("Unknown analytics view: {}", other),
            };
            let data = client.habits.analytics(view).await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        _ => {
            eprint!("{}", USAGE);
            bail!("Unknown command: {}", command);
        }
    }
    Ok(())
}

async fn require_session(client: &Client) -> Result<()> {
    let session = client.session.bootstrap().await;
    if !session.is_authenticated() {
        bail!("Not logged in. Run `habitrack login <username>` first.");
    }
    Ok(())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

/// Prefer the server's own wording for errors shown to the user.
fn report(err: ApiError) -> anyhow::Error {
    anyhow::anyhow!(err.user_message(&err.to_string()))
}

fn session_expired(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> bool {
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Expired) => return true,
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return false,
        }
    }
}
