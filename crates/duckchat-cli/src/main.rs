use std::io::{self, Write};

use clap::Parser;
use colored::Colorize;

use chat_core::{aliases, display_name, Config};
use chat_session::ChatSession;

mod commands;
mod logging;

use commands::{Command, HELP};
use logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "duckchat")]
#[command(about = "Terminal client for DuckDuckGo AI chat")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, env = "DUCKCHAT_DEBUG", default_value = "false")]
    debug: bool,

    /// Model alias or full upstream id
    #[arg(long, short)]
    model: Option<String>,

    /// Do not save conversations on /clear or exit
    #[arg(long)]
    no_history: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::new();
    if cli.model.is_some() {
        config.model = cli.model.clone();
    }
    if cli.no_history {
        config.save_history = false;
    }
    config.debug |= cli.debug;
    init_logging(config.debug);

    log::debug!("Using model {}", config.model_id());
    println!("{}", "Connecting...".dimmed());
    let mut session = ChatSession::open(config).await?;

    println!("{}", "🦆 duckchat".cyan().bold());
    println!(
        "{}",
        format!("Model: {} ({})", display_name(session.model()), session.model()).dimmed()
    );
    println!("{}", "Type /help for commands".dimmed());
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = Command::parse(input) {
            if !run_command(&mut session, command).await {
                break;
            }
            continue;
        }

        println!("{}", "Assistant:".green().bold());
        let result = session
            .ask(input, |chunk| {
                print!("{}", chunk);
                let _ = io::stdout().flush();
            })
            .await;
        println!();
        if let Err(e) = result {
            log::debug!("Turn failed: {:?}", e);
            println!("{}", format!("❌ Error: {}", e).red());
        }
        println!();
    }

    if let Err(e) = session.save().await {
        log::warn!("Failed to save session on exit: {}", e);
    }
    println!("{}", "👋 Goodbye!".cyan());
    Ok(())
}

/// Returns `false` when the loop should stop. Failures are printed and never end the loop.
async fn run_command(session: &mut ChatSession, command: Command) -> bool {
    match command {
        Command::Exit => return false,
        Command::Help => println!("{}", HELP),
        Command::Clear => match session.clear().await {
            Ok(()) => println!("{}", "Started a new conversation".green()),
            Err(e) => println!("{}", format!("❌ Could not start a new conversation: {}", e).red()),
        },
        Command::Model(None) => {
            println!("Current: {} ({})", display_name(session.model()), session.model());
            println!("Available: {}", aliases().collect::<Vec<_>>().join(", "));
        }
        Command::Model(Some(alias)) => {
            let id = session.change_model(&alias);
            println!("{}", format!("Model is now {}", id).green());
        }
        Command::Stats => {
            for line in session.analytics().await.summary_lines() {
                println!("{}", line);
            }
            let analysis = session.analysis();
            println!(
                "Context: {} messages, {} bytes, score {:.0}/100",
                analysis.total_messages, analysis.total_bytes, analysis.optimization_score
            );
            for recommendation in &analysis.recommendations {
                println!("  - {}", recommendation.yellow());
            }
        }
        Command::File(path) => match tokio::fs::read_to_string(&path).await {
            Ok(body) => {
                session.add_file_context(&path, &body);
                println!("{}", format!("Added {} ({} bytes)", path, body.len()).green());
            }
            Err(e) => println!("{}", format!("❌ Cannot read {}: {}", path, e).red()),
        },
        Command::History => match session.history() {
            None => println!("{}", "History is disabled".dimmed()),
            Some(history) => {
                let saved = match history.list_sessions().await {
                    Ok(saved) => saved,
                    Err(e) => {
                        println!("{}", format!("❌ Cannot read history: {}", e).red());
                        return true;
                    }
                };
                if saved.is_empty() {
                    println!("{}", "No saved conversations".dimmed());
                }
                for snapshot in saved.iter().take(20) {
                    println!(
                        "{}  {}  {}",
                        snapshot.saved_at.format("%Y-%m-%d %H:%M"),
                        snapshot.id.dimmed(),
                        snapshot.title(60)
                    );
                }
            }
        },
        Command::Unknown(message) => println!("{}", format!("{} (try /help)", message).yellow()),
    }
    true
}
