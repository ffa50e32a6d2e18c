//! Connecting and signing in as a Telegram user account.

use std::io::{self, Write};

use anyhow::{anyhow, Context};
use base64::Engine as _;
use grammers_client::{Client, Config as ClientConfig, InitParams, SignInError};
use grammers_session::Session;
use tracing::info;

use relay_core::config::Config;

/// Connect with the configured session, signing in interactively when it is not authorized.
pub async fn connect(cfg: &Config) -> anyhow::Result<Client> {
    let (api_id, api_hash) = cfg.user_credentials()?;

    let client = Client::connect(ClientConfig {
        session: load_session(cfg)?,
        api_id,
        api_hash: api_hash.to_string(),
        params: InitParams::default(),
    })
    .await
    .context("connecting to Telegram")?;

    if !client.is_authorized().await? {
        sign_in(&client, cfg).await?;
        persist(&client, cfg)?;
    }
    info!("user client connected");
    Ok(client)
}

fn load_session(cfg: &Config) -> anyhow::Result<Session> {
    match &cfg.session_string {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .context("SESSION_STRING is not valid base64")?;
            Session::load(&bytes).map_err(|e| anyhow!("SESSION_STRING is not a session: {e:?}"))
        }
        None => Session::load_file_or_create(&cfg.session_file)
            .with_context(|| format!("opening session file {}", cfg.session_file.display())),
    }
}

async fn sign_in(client: &Client, cfg: &Config) -> anyhow::Result<()> {
    let phone = match &cfg.phone_number {
        Some(p) => p.clone(),
        None => prompt("Phone number: ").await?,
    };

    let token = client
        .request_login_code(&phone)
        .await
        .context("requesting login code")?;
    let code = prompt("Login code: ").await?;

    match client.sign_in(&token, &code).await {
        Ok(_) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let password = prompt("Two-step verification password: ").await?;
            client
                .check_password(password_token, password.as_bytes())
                .await
                .context("checking two-step verification password")?;
        }
        Err(e) => return Err(e).context("signing in"),
    }
    info!("signed in");
    Ok(())
}

/// Save the new login where it came from and print it for `SESSION_STRING`.
fn persist(client: &Client, cfg: &Config) -> anyhow::Result<()> {
    if cfg.session_string.is_none() {
        client
            .session()
            .save_to_file(&cfg.session_file)
            .with_context(|| format!("saving session to {}", cfg.session_file.display()))?;
        info!(path = %cfg.session_file.display(), "session saved");
    }
    let exported = base64::engine::general_purpose::STANDARD.encode(client.session().save());
    println!("SESSION_STRING={exported}");
    Ok(())
}

async fn prompt(label: &str) -> anyhow::Result<String> {
    let label = label.to_string();
    let line = tokio::task::spawn_blocking(move || -> io::Result<String> {
        let mut out = io::stdout();
        write!(out, "{label}")?;
        out.flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await??;
    if line.is_empty() {
        return Err(anyhow!("no input given"));
    }
    Ok(line)
}
