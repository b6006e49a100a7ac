//! troupectl - control and chat CLI for the Troupe server.
//!
//! Provides a server status probe, an agent listing, and an interactive chat
//! session against a running server.

use std::io::{self, Write};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use troupe_protocol::{AgentId, ServerFrame};

use troupe::client::{ChatClient, ClientError};
use troupe::persona;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Status => handle_status(&cli.server).await,
        Command::Agents => handle_agents(),
        Command::Chat { agent } => handle_chat(&cli.server, &agent).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "troupectl",
    author,
    version,
    about = "Control CLI for the Troupe server - check status and chat with agents."
)]
struct Cli {
    /// Troupe server URL
    #[arg(long, short = 's', default_value = DEFAULT_SERVER_URL, env = "TROUPE_SERVER_URL")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check server status
    Status,

    /// List available agents
    Agents,

    /// Start an interactive chat with an agent
    Chat {
        /// Agent to talk to (frontend, design, backend, fullstack)
        #[arg(long, short)]
        agent: String,
    },
}

async fn handle_status(server: &str) -> Result<()> {
    let url = format!("{}/api/status", server.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("requesting {url}"))?;

    if !response.status().is_success() {
        bail!("server returned {}", response.status());
    }

    let status: serde_json::Value = response.json().await.context("parsing status response")?;
    println!(
        "status: {}  version: {}  active connections: {}",
        status["status"].as_str().unwrap_or("?"),
        status["version"].as_str().unwrap_or("?"),
        status["active_connections"]
    );
    Ok(())
}

fn handle_agents() -> Result<()> {
    for (id, persona) in persona::all() {
        println!("{id:<10} {:<22} {}", persona.name, persona.description);
    }
    Ok(())
}

async fn handle_chat(server: &str, agent: &str) -> Result<()> {
    let agent = AgentId::from_str(agent)
        .map_err(|_| anyhow::anyhow!("unknown agent {agent:?} (try `troupectl agents`)"))?;
    let persona = persona::resolve(agent);

    let mut client = ChatClient::new(ws_url(server));
    client
        .connect()
        .await
        .context("connecting to the server")?;

    println!("Connected. Chatting with {} (ctrl-d to quit).", persona.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match client.send(agent, text).await {
            Ok(_) => {}
            Err(ClientError::NotConnected) => {
                eprintln!("Connection lost. Reconnecting...");
                client.connect().await.context("reconnecting")?;
                continue;
            }
            Err(err) => return Err(err).context("sending message"),
        }

        stream_answer(&mut client).await?;
    }

    Ok(())
}

/// Render one streamed answer, chunk by chunk, until its terminal frame.
async fn stream_answer(client: &mut ChatClient) -> Result<()> {
    loop {
        match client.recv().await {
            Ok(ServerFrame::StreamStart { .. }) => {}
            Ok(ServerFrame::StreamChunk { content, .. }) => {
                print!("{content}");
                io::stdout().flush().ok();
            }
            Ok(ServerFrame::StreamEnd { .. }) => {
                println!();
                return Ok(());
            }
            Ok(ServerFrame::Error { content }) => {
                println!();
                eprintln!("{content}");
                return Ok(());
            }
            Ok(ServerFrame::Connected { .. }) => {}
            Err(ClientError::Closed | ClientError::Transport(_)) => {
                eprintln!("Connection lost mid-answer. Reconnecting...");
                client.connect().await.context("reconnecting")?;
                return Ok(());
            }
            Err(err) => return Err(err).context("receiving answer"),
        }
    }
}

/// Derive the WebSocket endpoint from the server's HTTP URL.
fn ws_url(server: &str) -> String {
    let base = server.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws}/api/ws")
}
