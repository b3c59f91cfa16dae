//! Subcommand implementations

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{info, warn};

use stream_conductor::{
    attach, CannedResponder, ChatConductor, ChatMessage, ConductorConfig, MessageId,
    ReplayBuffer, ResponseGenerator, SessionId, UserId, WordGenerator,
};

use crate::GeneratorKind;

/// Arguments of `chat`
#[derive(Debug)]
pub struct ChatRequest {
    pub session: String,
    pub message: String,
    pub user: Option<String>,
    pub generator: GeneratorKind,
    pub json: bool,
}

fn generator(kind: GeneratorKind) -> Arc<dyn ResponseGenerator> {
    match kind {
        GeneratorKind::Canned => Arc::new(CannedResponder::new()),
        GeneratorKind::Words => Arc::new(WordGenerator::new()),
    }
}

fn conductor(config: &ConductorConfig, kind: GeneratorKind) -> Result<ChatConductor> {
    ChatConductor::from_config(config, generator(kind)).context("Failed to open the store")
}

fn print_json(message: &ChatMessage) -> Result<()> {
    let line = serde_json::to_string(message)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

/// Submit a message, stream the reply to stdout, stop cleanly on Ctrl-C
pub async fn chat(
    config: &ConductorConfig,
    request: ChatRequest,
    shutdown_timeout: Duration,
) -> Result<()> {
    let conductor = conductor(config, request.generator)?;
    let session = SessionId::new(request.session);
    let user = request.user.map(UserId::new).unwrap_or_default();

    let mut live = conductor.publisher().subscribe(&session).await?;
    conductor
        .submit_user_message(&session, &user, &request.message)
        .await?;
    let reply = conductor
        .start_stream(&session, &user, &request.message)
        .await?;
    info!(session_id = %session, message_id = %reply, "Streaming reply");
    if !request.json {
        eprintln!("message id: {reply}");
    }

    let mut printed = 0usize;
    loop {
        tokio::select! {
            next = live.next() => {
                let Some(message) = next else {
                    warn!("Broadcast stream closed before the reply finished");
                    break;
                };
                if message.message_id != reply {
                    continue;
                }
                if request.json {
                    print_json(&message)?;
                } else {
                    print_delta(&message.content, &mut printed)?;
                }
                if message.is_complete {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; finalizing running streams");
                for outcome in conductor.shutdown(shutdown_timeout).await {
                    if request.json {
                        continue;
                    }
                    print_delta(&outcome.final_content, &mut printed)?;
                }
                break;
            }
        }
    }
    if !request.json {
        println!();
    }

    conductor.wait_idle().await;
    Ok(())
}

/// Print whatever part of `content` has not been printed yet
///
/// A final message can replace the content (error text), in which case it
/// is printed on a fresh line.
fn print_delta(content: &str, printed: &mut usize) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match content.get(*printed..) {
        Some(rest) => write!(stdout, "{rest}")?,
        None => write!(stdout, "\n{content}")?,
    }
    stdout.flush()?;
    *printed = content.len();
    Ok(())
}

/// Ask a running response to stop and report the outcome as JSON
pub async fn cancel(config: &ConductorConfig, session: &str, message_id: &str) -> Result<()> {
    let conductor = conductor(config, GeneratorKind::Words)?;
    let session = SessionId::new(session);
    let message_id = MessageId::from_string(message_id);

    let outcome = conductor.cancel_detailed(&session, &message_id).await?;
    let report = serde_json::json!({
        "session_id": session,
        "message_id": message_id,
        "accepted": outcome.accepted(),
        "outcome": format!("{outcome:?}"),
    });
    println!("{report}");
    Ok(())
}

/// Print history as JSON lines
pub async fn history(config: &ConductorConfig, session: &str) -> Result<()> {
    let conductor = conductor(config, GeneratorKind::Words)?;
    for message in conductor.get_history(&SessionId::new(session)).await? {
        print_json(&message)?;
    }
    Ok(())
}

/// Delete history
pub async fn clear(config: &ConductorConfig, session: &str) -> Result<()> {
    let conductor = conductor(config, GeneratorKind::Words)?;
    conductor.clear_history(&SessionId::new(session)).await?;
    eprintln!("history cleared for {session}");
    Ok(())
}

/// Print history, then live messages, until Ctrl-C
///
/// Duplicates between the snapshot and the live stream are suppressed.
pub async fn watch(config: &ConductorConfig, session: &str) -> Result<()> {
    let conductor = conductor(config, GeneratorKind::Words)?;
    let session = SessionId::new(session);
    let attached = attach(conductor.publisher(), conductor.history(), &session).await?;

    let mut buffer = ReplayBuffer::new();
    for message in attached.history {
        if buffer.apply(message.clone()) {
            print_json(&message)?;
        }
    }

    let mut live = attached.live;
    loop {
        tokio::select! {
            next = live.next() => {
                let Some(message) = next else {
                    warn!(session_id = %session, "Broadcast stream closed");
                    break;
                };
                if buffer.apply(message.clone()) {
                    print_json(&message)?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
