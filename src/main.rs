use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser};
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use devroom::analysis::{
    AnalysisBackend, AnalysisController, AnalysisView, FileType, HtmlAnalysisView,
    HttpAnalysisBackend, TerminalAnalysisView,
};
use devroom::chat::{ChatController, TerminalChatView, WsConnector};
use devroom::cli::{Cli, Command};
use devroom::config::ClientConfig;
use devroom::DevroomError;

/// Time the writer task gets to flush the leave frame before the runtime exits.
const UNLOAD_GRACE: Duration = Duration::from_millis(200);

fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "devroom", &mut io::stdout());
        return Ok(());
    }

    let config = ClientConfig::load_or_default(cli.config.as_deref())?
        .with_overrides(cli.chat_url, cli.api_url);
    init_tracing(&config.log_level);
    debug!(?config, "configuration loaded");

    let view_command = matches!(
        cli.command,
        Command::Chat { .. } | Command::Analyze { .. } | Command::Validate { .. }
    );
    let result = match cli.command {
        Command::Chat { name } => run_chat(&config, &name).await,
        Command::Analyze {
            path,
            file_type,
            no_execute,
            no_save_history,
            html,
        } => {
            let opts = AnalyzeOptions {
                file_type,
                execute: config.execute && !no_execute,
                save_history: config.save_history && !no_save_history,
                html,
                validate_only: false,
            };
            run_analyze(&config, &path, opts).await
        }
        Command::Validate { path } => {
            let opts = AnalyzeOptions {
                file_type: None,
                execute: false,
                save_history: false,
                html: None,
                validate_only: true,
            };
            run_analyze(&config, &path, opts).await
        }
        Command::Stats => run_stats(&config).await,
        Command::Health => run_health(&config).await,
        Command::Completions { .. } => Ok(()),
    };

    if let Err(e) = result {
        if !already_shown(&e, view_command) {
            eprintln!("{} {e}", "error:".bright_red().bold());
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Whether a view already put `err` in front of the user.
fn already_shown(err: &DevroomError, view_command: bool) -> bool {
    err.is_local()
        || (view_command
            && matches!(
                err,
                DevroomError::ServerReported(_)
                    | DevroomError::RequestFailure { .. }
                    | DevroomError::Channel(_)
            ))
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

/// A y/N question waiting for the next stdin line.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Prompt {
    Leave,
    Quit,
}

/// What a typed chat line asks for.
#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Leave,
    Join,
    Text(&'a str),
}

fn chat_input(line: &str) -> ChatInput<'_> {
    match line.trim() {
        "/leave" => ChatInput::Leave,
        "/join" => ChatInput::Join,
        text => ChatInput::Text(text),
    }
}

fn ask(question: &str) {
    print!("{question} [y/N] ");
    let _ = io::stdout().flush();
}

async fn run_chat(config: &ClientConfig, name: &str) -> Result<(), DevroomError> {
    let (connector, mut events) = WsConnector::new(&config.chat_url, config.connect_timeout());
    let mut chat = ChatController::new(connector, TerminalChatView::new(io::stdout()));
    chat.join(name).await?;

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut pending: Option<Prompt> = None;

    loop {
        tokio::select! {
            line = lines.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                    None => break,
                };

                if let Some(prompt) = pending.take() {
                    let yes = matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes");
                    chat.view_mut().queue_answer(yes);
                    let done = match prompt {
                        Prompt::Leave => chat.leave(),
                        Prompt::Quit => chat.confirm_unload(),
                    };
                    if done {
                        break;
                    }
                    continue;
                }

                match chat_input(&line) {
                    ChatInput::Leave => {
                        ask("Leave the chat room?");
                        pending = Some(Prompt::Leave);
                    }
                    ChatInput::Join if chat.is_connected() => {
                        println!("{}", "Already in the chat room.".dimmed());
                    }
                    ChatInput::Join => {
                        // Failures are already shown to the user.
                        let _ = chat.join(name).await;
                    }
                    ChatInput::Text(text) => {
                        if let Err(e) = chat.send(text) {
                            debug!(error = %e, "message not sent");
                        }
                    }
                }
            }
            Some(tagged) = events.recv() => chat.handle_tagged(tagged),
            _ = tokio::signal::ctrl_c() => {
                // A second Ctrl-C while the question is open quits without asking again.
                if pending == Some(Prompt::Quit) || !chat.before_unload() {
                    break;
                }
                println!();
                ask("You are still in the chat room. Leave and quit? (Ctrl-C again to quit)");
                pending = Some(Prompt::Quit);
            }
        }
    }

    chat.unload();
    tokio::time::sleep(UNLOAD_GRACE).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// analysis
// ---------------------------------------------------------------------------

struct AnalyzeOptions {
    file_type: Option<FileType>,
    execute: bool,
    save_history: bool,
    html: Option<PathBuf>,
    validate_only: bool,
}

fn backend(config: &ClientConfig) -> HttpAnalysisBackend {
    HttpAnalysisBackend::builder(&config.api_base_url)
        .connect_timeout(config.connect_timeout())
        .request_timeout(config.request_timeout())
        .build()
}

async fn load<B: AnalysisBackend, V: AnalysisView>(
    analysis: &mut AnalysisController<B, V>,
    path: &Path,
    file_type: Option<FileType>,
) -> Result<(), DevroomError> {
    match (FileType::from_path(path), file_type) {
        (None, Some(forced)) => {
            let code = tokio::fs::read_to_string(path).await?;
            analysis.set_code(code);
            analysis.set_file_type(forced);
        }
        (_, forced) => {
            analysis.load_file(path).await?;
            if let Some(forced) = forced {
                analysis.set_file_type(forced);
            }
        }
    }
    Ok(())
}

async fn run_analyze(
    config: &ClientConfig,
    path: &Path,
    opts: AnalyzeOptions,
) -> Result<(), DevroomError> {
    let view = (TerminalAnalysisView::new(io::stdout()), HtmlAnalysisView::new());
    let mut analysis =
        AnalysisController::new(backend(config), view).with_timeout(config.request_timeout());
    analysis.set_execute(opts.execute);
    analysis.set_save_history(opts.save_history);

    load(&mut analysis, path, opts.file_type).await?;
    analysis.refresh_statistics().await;

    let result = if opts.validate_only {
        analysis.validate().await
    } else {
        analysis.analyze().await
    };

    if let Some(out) = opts.html {
        let title = format!("Analysis of {}", path.display());
        let document = analysis.view().1.to_document(&title)?;
        tokio::fs::write(&out, document).await?;
        println!("{}", format!("HTML report written to {}", out.display()).dimmed());
    }

    result.map(|_| ())
}

async fn run_stats(config: &ClientConfig) -> Result<(), DevroomError> {
    let resp = backend(config).statistics().await?;
    let Some(stats) = resp.statistics.filter(|_| resp.success) else {
        return Err(DevroomError::ServerReported(
            resp.error.unwrap_or_else(|| "statistics unavailable".to_string()),
        ));
    };

    println!("{} {}", "Total recorded errors:".bold(), stats.total_errors);
    if !stats.error_by_type.is_empty() {
        println!("{}", "By type:".bold());
        let mut by_type: Vec<(&String, &u64)> = stats.error_by_type.iter().collect();
        by_type.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (error_type, count) in by_type {
            println!("  {error_type:<24} {count}");
        }
    }
    if !stats.most_common_patterns.is_empty() {
        println!("{}", "Most common patterns:".bold());
        for p in &stats.most_common_patterns {
            println!("  {:<24} {:<32} {}", p.error_type, p.pattern, p.count);
        }
    }
    Ok(())
}

async fn run_health(config: &ClientConfig) -> Result<(), DevroomError> {
    let backend = backend(config);
    let health = backend.health().await?;
    if !health.success {
        return Err(DevroomError::ServerReported(format!(
            "{} reports status {:?}",
            backend.base_url(),
            health.status
        )));
    }
    println!(
        "{} {} (version {}, rag {})",
        backend.base_url().bold(),
        health.status.bright_green(),
        health.version,
        if health.rag_enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_command_is_never_chat_text() {
        assert_eq!(chat_input("/join"), ChatInput::Join);
        assert_eq!(chat_input("  /join \n"), ChatInput::Join);
    }

    #[test]
    fn leave_and_text_lines() {
        assert_eq!(chat_input("/leave"), ChatInput::Leave);
        assert_eq!(chat_input(" hello "), ChatInput::Text("hello"));
        assert_eq!(chat_input("/joined"), ChatInput::Text("/joined"));
    }

    #[test]
    fn local_errors_are_not_printed_twice() {
        assert!(already_shown(&DevroomError::EmptyInput, false));
        assert!(already_shown(&DevroomError::ServerReported("x".into()), true));
        assert!(!already_shown(&DevroomError::ServerReported("x".into()), false));
    }
}
