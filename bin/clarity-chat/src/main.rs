//! clarity-chat: talk to a Clarity server from the terminal.
//!
//! Messages go over the session WebSocket while it is connected and over
//! `POST /api/v1/chat` otherwise.

mod repl;

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use clarity_client::{ApiClient, ChatClient, ClientError, ReconnectPolicy};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::repl::Input;

const CONNECT_WAIT: Duration = Duration::from_secs(5);

/// Terminal chat client for the Clarity API.
#[derive(Debug, Parser)]
#[command(name = "clarity-chat", version, about = "Terminal chat client for the Clarity API")]
struct Cli {
    /// Server base URL. Defaults to CLARITY_API_URL, then VITE_API_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Session to join. A new one is created when omitted.
    #[arg(short, long)]
    session: Option<String>,

    /// Bearer token for an authenticated user.
    #[arg(long, env = "CLARITY_TOKEN")]
    token: Option<String>,

    /// Send everything over HTTP.
    #[arg(long)]
    no_socket: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let base = cli.api_url.unwrap_or_else(clarity_client::api_url_from_env);
    let mut api = ApiClient::new(&base);
    if let Some(token) = cli.token {
        api = api.with_token(token);
    }
    let session_id = cli.session.unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4()));

    match api.health().await {
        Ok(health) => tracing::info!(status = %health.status, "server reachable"),
        Err(e) => eprintln!("warning: health check failed for {base}: {e}"),
    }

    let mut client = ChatClient::new(api, session_id);
    if !cli.no_socket {
        client.open_socket(ReconnectPolicy::default())?;
        if !client.wait_until_connected(CONNECT_WAIT).await {
            eprintln!("(live connection unavailable; using http)");
        }
    }

    println!("Connected to {base} as session {}", client.session_id());
    println!("{}", repl::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match repl::parse(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{}", repl::HELP),
            Input::Unknown(cmd) => println!("unknown command {cmd}. {}", repl::HELP),
            Input::History => match client.api().history(client.session_id()).await {
                Ok(history) => println!("{}", repl::history(&history)),
                Err(e) => eprintln!("error: {e}"),
            },
            Input::Topics => match client.api().topics().await {
                Ok(topics) => println!("{}", repl::topics(&topics)),
                Err(e) => eprintln!("error: {e}"),
            },
            Input::Message(text) => {
                let result = client
                    .send(text, |ev| {
                        if let Some(status) = repl::event(ev) {
                            println!("{status}");
                        }
                    })
                    .await;
                match result {
                    Ok(resp) => println!("{}", repl::reply(&resp)),
                    Err(ClientError::ReplyLost) => {
                        eprintln!("error: connection dropped before the reply; check /history before resending")
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
    }

    client.close().await;
    Ok(())
}
