//! Terminal front end for the streaming chat client.

mod config;

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chat_stream_client::observability::init_observability;
use chat_stream_client::prelude::*;
use chat_stream_client::{LoginRequest, NoCredentials, StaticToken};
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "chat-stream", about = "Stream replies from the chat backend")]
struct Cli {
    /// Backend base URL (defaults to CHAT_API_BASE_URL or http://localhost:8080).
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Bearer token (defaults to CHAT_API_TOKEN).
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply to stdout.
    Chat {
        #[arg(long, default_value = "qwen")]
        model: ChatModel,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        /// Give up (as a cancellation) after this many seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Print pipeline step notices to stderr.
        #[arg(long)]
        show_steps: bool,
        message: String,
    },
    /// Single-response chat that reports token usage.
    Metric {
        #[arg(long, default_value = "qwen")]
        model: ChatModel,
        message: String,
    },
    /// List stored messages for a user.
    History {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Delete a stored conversation.
    Delete { session_id: String },
    /// Log in and print the issued token.
    Login { username: String, password: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    config::init();
    init_observability();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let mut client_config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        client_config = client_config.base_url(base_url);
    }
    let token = cli.token.or_else(|| config::get_env("CHAT_API_TOKEN"));
    let credentials: Arc<dyn CredentialProvider> = match token {
        Some(token) => Arc::new(StaticToken(token)),
        None => Arc::new(NoCredentials),
    };
    let client = ChatClient::builder()
        .config(client_config)
        .credentials(credentials)
        .build()?;

    match cli.command {
        Command::Chat {
            model,
            session_id,
            user_id,
            deadline_secs,
            show_steps,
            message,
        } => {
            let mut request = ChatRequest::new(message, model);
            request.session_id = session_id;
            request.user_id = user_id;
            stream_to_stdout(
                &client,
                &request,
                deadline_secs.map(Duration::from_secs),
                show_steps,
            )
            .await
        }
        Command::Metric { model, message } => {
            let metrics = client
                .chat_with_metric(&ChatRequest::new(message, model))
                .await?;
            println!("{}", metrics.content);
            eprintln!(
                "tokens: prompt={} completion={} total={}",
                metrics.prompt_tokens, metrics.completion_tokens, metrics.total_tokens
            );
            Ok(())
        }
        Command::History {
            user_id,
            session_id,
        } => {
            let records = match session_id {
                Some(session_id) => client.chat_history_by_session(&user_id, &session_id).await?,
                None => client.chat_history(&user_id).await?,
            };
            for record in records {
                let when = record
                    .create_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!("[{when}] {} {}: {}", record.session_id, record.role, record.content);
            }
            Ok(())
        }
        Command::Delete { session_id } => {
            client.delete_conversation(&session_id).await?;
            eprintln!("deleted conversation {session_id}");
            Ok(())
        }
        Command::Login { username, password } => {
            let session = client.login(LoginRequest::new(username, password)).await?;
            let out = serde_json::json!({
                "token": session.token,
                "userId": session.user_id,
                "username": session.username,
            });
            println!("{out}");
            Ok(())
        }
    }
}

async fn stream_to_stdout(
    client: &ChatClient,
    request: &ChatRequest,
    deadline: Option<Duration>,
    show_steps: bool,
) -> Result<(), ClientError> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c received, cancelling stream");
            on_ctrl_c.cancel();
        }
    });

    let mut printer = DeltaPrinter::new(std::io::stdout());
    let on_event = |event: StreamEvent| match event {
        StreamEvent::Token { content } => {
            if let Err(err) = printer.print(&content) {
                debug!(error = %err, "stdout closed, cancelling stream");
                cancel.cancel();
            }
        }
        StreamEvent::Step { .. } if show_steps => {
            if let Some(step) = event.step_info() {
                eprintln!("[{}] {}", step.node, step.message);
            }
        }
        StreamEvent::Step { .. } | StreamEvent::Done { .. } | StreamEvent::Error { .. } => {}
    };

    let result = match deadline {
        Some(deadline) => {
            client
                .stream_chat_with_deadline(request, on_event, &cancel, deadline)
                .await
        }
        None => client.stream_chat(request, on_event, &cancel).await,
    };
    if !printer.is_closed() {
        println!();
    }

    match result {
        Ok(_) => Ok(()),
        Err(err) if err.is_cancelled() => {
            eprintln!("(cancelled)");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes the new suffix of each cumulative token to `out`.
struct DeltaPrinter<W> {
    out: W,
    printed: usize,
    closed: bool,
}

impl<W: Write> DeltaPrinter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            closed: false,
        }
    }

    fn print(&mut self, content: &str) -> io::Result<()> {
        let delta = content.get(self.printed..).unwrap_or(content);
        let written = self
            .out
            .write_all(delta.as_bytes())
            .and_then(|()| self.out.flush());
        if written.is_err() {
            self.closed = true;
        }
        self.printed = content.len();
        written
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
