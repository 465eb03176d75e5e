use crate::api::ApiClient;
use crate::config::Config;
use crate::session::{ChatSession, IngestSession, IngestUpdate, StreamUpdate};
use crate::types::{normalize_reasoning, AgentEvent, FileAttachment};
use anyhow::{Context, Result};
use std::io::Write as _;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Interactive line-oriented frontend. Owns both sessions and the single
/// event loop that interleaves user input with stream updates.
pub struct App {
    client: ApiClient,
    chat: ChatSession,
    ingest: IngestSession,
    chat_rx: mpsc::UnboundedReceiver<StreamUpdate>,
    ingest_rx: mpsc::UnboundedReceiver<IngestUpdate>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let client = ApiClient::new(config)?;
        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        let (ingest_tx, ingest_rx) = mpsc::unbounded_channel();
        Ok(Self {
            chat: ChatSession::new(client.clone(), chat_tx),
            ingest: IngestSession::new(client.clone(), ingest_tx),
            client,
            chat_rx,
            ingest_rx,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("ragline. Type a message, or /help for commands.");
        let mut input_lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = input_lines.next_line() => {
                    let Some(line) = line.context("reading stdin")? else {
                        break;
                    };
                    if !self.handle_input(line.trim()).await? {
                        break;
                    }
                }
                Some(update) = self.chat_rx.recv() => {
                    if self.chat.apply_update(&update) {
                        render_chat_event(&update.event);
                    }
                }
                Some(update) = self.ingest_rx.recv() => {
                    if self.ingest.apply_update(&update) {
                        self.render_ingest_progress(&update);
                    }
                }
            }
        }

        self.chat.cancel();
        self.ingest.cancel();
        Ok(())
    }

    /// Returns false when the loop should exit.
    async fn handle_input(&mut self, line: &str) -> Result<bool> {
        if line.is_empty() {
            return Ok(true);
        }

        match line.split_once(' ') {
            _ if line == "/quit" || line == "/exit" => return Ok(false),
            _ if line == "/help" => {
                print_help();
            }
            _ if line == "/cancel" => {
                self.chat.cancel();
                self.ingest.cancel();
                println!("\n[cancelled]");
            }
            _ if line == "/health" => match self.client.health().await {
                Ok(()) => println!("[backend healthy]"),
                Err(error) => println!("[health check failed: {error}]"),
            },
            Some(("/upload", path)) => {
                let attachment = read_attachment(path.trim()).await?;
                let thread_id = self.chat.conversation.thread_id().to_string();
                match self.client.upload_session_file(attachment, &thread_id).await {
                    Ok(message) => println!("[{message}]"),
                    Err(error) => println!("[upload failed: {error}]"),
                }
            }
            Some(("/ingest", path)) => {
                let attachment = read_attachment(path.trim()).await?;
                println!("[ingesting {}]", attachment.filename);
                self.ingest.ingest(attachment).await?;
            }
            Some(("/attach", rest)) => {
                let Some((path, message)) = rest.trim().split_once(' ') else {
                    println!("usage: /attach <path> <message>");
                    return Ok(true);
                };
                let attachment = read_attachment(path).await?;
                self.chat.send(message.to_string(), vec![attachment]).await?;
            }
            _ if line.starts_with('/') => {
                println!("unknown command '{line}'; /help lists commands");
            }
            _ => {
                self.chat.send_text(line.to_string()).await?;
            }
        }
        Ok(true)
    }

    fn render_ingest_progress(&self, update: &IngestUpdate) {
        if let IngestUpdate::Event { event, .. } = update {
            match event {
                AgentEvent::Done => {
                    println!("\n[ingest complete]");
                    return;
                }
                AgentEvent::Error(_) => {
                    let message = self.ingest.last_error().unwrap_or("unknown error");
                    println!("\n[ingest failed: {message}]");
                    return;
                }
                _ => {}
            }
        }
        print!(
            "\rupload {:>3.0}% | processing {:>3.0}%",
            self.ingest.estimator.upload_pct(),
            self.ingest.estimator.processing_pct()
        );
        let _ = std::io::stdout().flush();
    }
}

fn render_chat_event(event: &AgentEvent) {
    match event {
        AgentEvent::Token(text) => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::Intent(payload) => {
            println!("[intent: {}]", payload.intent);
        }
        AgentEvent::Results(batch) => {
            println!("[{} candidate(s) evaluated]", batch.len());
            for candidate in batch {
                match (&candidate.evaluation, &candidate.error) {
                    (Some(evaluation), _) => {
                        let verdict = match evaluation.meets_requirements {
                            Some(true) => "meets requirements",
                            Some(false) => "does not meet requirements",
                            None => "inconclusive",
                        };
                        println!(
                            "  {}: {} - {}",
                            candidate.candidate_id,
                            verdict,
                            normalize_reasoning(&evaluation.reasoning)
                        );
                    }
                    (None, Some(error)) => {
                        println!("  {}: evaluation failed ({error})", candidate.candidate_id);
                    }
                    (None, None) => {
                        println!("  {}: no evaluation returned", candidate.candidate_id);
                    }
                }
            }
        }
        AgentEvent::Done => println!(),
        AgentEvent::Error(message) => {
            println!("\n\u{26a0}\u{fe0f} Error: {message}");
        }
        AgentEvent::Progress { .. } | AgentEvent::Unknown => {}
    }
}

async fn read_attachment(path: &str) -> Result<FileAttachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading '{path}'"))?;
    let filename = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Ok(FileAttachment::new(&filename, bytes))
}

fn print_help() {
    println!("  <message>                chat with the assistant");
    println!("  /attach <path> <message> send a message with a file attached");
    println!("  /upload <path>           add a document to this conversation's context");
    println!("  /ingest <path>           upload a document to the knowledge base (admin)");
    println!("  /health                  check backend reachability");
    println!("  /cancel                  stop the current stream");
    println!("  /quit                    exit");
}
