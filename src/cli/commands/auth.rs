//! Auth command implementations.

use std::time::Duration;

use crate::auth::{login, OAuthClient, DEFAULT_LISTEN_TIMEOUT};
use crate::cli::AuthCommands;
use crate::config::{load_config, save_config};
use crate::error::Result;

use super::runtime;

/// Execute auth commands.
pub fn execute(command: &AuthCommands, json: bool) -> Result<()> {
    match command {
        AuthCommands::Login { timeout } => {
            let timeout = timeout.map_or(DEFAULT_LISTEN_TIMEOUT, Duration::from_secs);
            execute_login(timeout, json)
        }
    }
}

fn execute_login(timeout: Duration, json: bool) -> Result<()> {
    let mut config = load_config()?;
    let oauth = OAuthClient::from_config(&config)?;

    let rt = runtime()?;
    let token = rt.block_on(login(&oauth, timeout, |url| {
        // stdout carries only command output
        eprintln!("Open this URL in your browser to sign in:\n\n  {url}\n");
    }))?;

    config.access_token = Some(token.access_token);
    save_config(&config)?;

    if json {
        let output = serde_json::json!({
            "success": true,
            "expires_in": token.expires_in,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Signed in. Access token saved to ~/.cardsync/config.json");
    }
    Ok(())
}
