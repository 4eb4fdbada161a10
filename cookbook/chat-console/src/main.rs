//! Terminal front end for the SoftSell chat engine.
//!
//! `chat-console [--config path]` runs an interactive session;
//! `chat-console serve [--config path]` starts the HTTP adapter instead.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use softsell_chat::{
    init_tracing, AppConfig, ChatError, ChatServer, ChatSession, Origin, Result,
    TelemetryCollector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut serve = false;
    let mut config_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "serve" => serve = true,
            "--config" => {
                config_path = Some(args.next().ok_or_else(|| {
                    ChatError::Config("--config expects a path".into())
                })?)
            }
            other => return Err(ChatError::Config(format!("unknown argument `{other}`"))),
        }
    }

    let config = match config_path {
        Some(path) => AppConfig::from_env_or_file(path)?,
        None => AppConfig::from_env()?,
    };
    init_tracing(&config.telemetry)?;

    let responder = Arc::new(config.rule_table()?);
    let telemetry = TelemetryCollector::default();

    if serve {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|err| ChatError::Config(format!("invalid listen address: {err}")))?;
        return ChatServer::new(config.session_settings(None), responder, telemetry)
            .with_idle_timeout(Duration::from_secs(config.server.session_idle_secs))
            .with_max_sessions(config.server.max_sessions)
            .serve(addr)
            .await;
    }

    let session = ChatSession::open(config.session_settings(Some(telemetry.clone())), responder);
    run_console(&session).await?;
    session.close();
    tracing::info!(hits = ?telemetry.rule_hits(), "console session finished");
    Ok(())
}

async fn run_console(session: &ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    loop {
        shown = print_new(session, shown);
        let suggestions = session.visible_suggestions();
        if !suggestions.is_empty() {
            println!("Suggested questions:");
            for (i, question) in suggestions.iter().enumerate() {
                println!("  [{}] {}", i + 1, question);
            }
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim() == "/quit" {
            break;
        }

        let picked = line
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| suggestions.get(i));
        let accepted = match picked {
            Some(question) => session.submit_suggested(question),
            None => session.submit(&line),
        };

        if accepted {
            shown = print_new(session, shown);
            println!("SoftSell is typing...");
            session.wait_idle().await;
        }
    }
    Ok(())
}

fn print_new(session: &ChatSession, shown: usize) -> usize {
    let transcript = session.transcript();
    for message in transcript.iter().skip(shown) {
        let who = match message.origin {
            Origin::User => "you",
            Origin::Assistant => "SoftSell",
        };
        println!("{who}> {}", message.text);
    }
    transcript.len()
}
