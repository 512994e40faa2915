use clap::{CommandFactory, Parser};
use colored::*;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use debate_chat::cli::{parse_line, Args, ReplCommand, HELP};
use debate_chat::config::{ChatConfig, ConfigOverrides};
use debate_chat::controller::ChatController;
use debate_chat::render::{render_conversation, StreamPrinter};
use debate_chat::{logging, ChatError, HttpBackend, StreamOutcome, TopicId};

type Controller = ChatController<HttpBackend>;

fn report(err: &ChatError) {
    if err.is_rejection() {
        eprintln!("{} {}", "!".bright_yellow(), err);
    } else {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
    }
}

fn report_outcome(result: debate_chat::Result<StreamOutcome>) {
    match result {
        Ok(StreamOutcome::Interrupted(e)) => eprintln!("{} reply interrupted: {}", "!".bright_yellow(), e),
        Ok(StreamOutcome::NoBody) => eprintln!("{} backend sent no reply", "!".bright_yellow()),
        Ok(_) => {}
        Err(e) => report(&e),
    }
}

/// Print streamed reply text as snapshots arrive.
fn spawn_printer(controller: &Controller) -> tokio::task::JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        let mut printer = StreamPrinter::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            let text = printer.feed(&snapshot);
            if !text.is_empty() {
                print!("{}", text);
                let _ = io::stdout().flush();
            }
        }
    })
}

async fn open_topic(controller: &Controller, id: &str) {
    match controller.select_topic(Some(TopicId::new(id))).await {
        Ok(()) => print!("{}", render_conversation(&controller.snapshot())),
        Err(e) => report(&e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "debate-chat", &mut io::stdout());
        return Ok(());
    }

    let overrides = ConfigOverrides { api_host: args.api_host.clone(), verbose: args.verbose };
    let config = ChatConfig::load(args.config.as_deref(), &overrides)?;
    if let Err(e) = logging::init(&config.log_filter) {
        eprintln!("{} {}", "warning:".bright_yellow(), e);
    }
    tracing::info!(api_host = %config.api_host, "starting debate-chat");

    let backend = Arc::new(HttpBackend::new(&config)?);
    let controller = ChatController::new(backend);
    let printer = spawn_printer(&controller);

    println!("{}", "DEBATE CHAT".bright_cyan().bold());
    println!("{}: {}", "Backend".bright_yellow(), config.api_host);
    println!("{}", "=".repeat(50).bright_blue());

    if let Some(topic) = args.topic.as_deref() {
        open_topic(&controller, topic).await;
    } else {
        println!("no topic selected; use /topic ID");
    }
    if let Some(preset) = args.preset {
        controller.apply_preset(preset);
        println!("{} {}", "input:".dimmed(), preset.prompt());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(msg) => {
                eprintln!("{} {}", "!".bright_yellow(), msg);
                continue;
            }
        };

        match command {
            ReplCommand::Empty => {
                if !controller.snapshot().input.is_empty() {
                    let c = controller.clone();
                    tokio::spawn(async move { report_outcome(c.submit_input().await) });
                }
            }
            ReplCommand::Send(text) => {
                controller.set_input(text);
                let c = controller.clone();
                tokio::spawn(async move { report_outcome(c.submit_input().await) });
            }
            ReplCommand::Regenerate => {
                let c = controller.clone();
                tokio::spawn(async move {
                    let topic = c.topic();
                    report_outcome(c.regenerate(topic.as_ref()).await)
                });
            }
            ReplCommand::Edit { index, text } => {
                let c = controller.clone();
                tokio::spawn(async move {
                    let topic = c.topic();
                    report_outcome(c.edit_and_resubmit(index, text, topic.as_ref()).await)
                });
            }
            ReplCommand::Stop => {
                controller.cancel();
                println!("{}", "stopped".dimmed());
            }
            ReplCommand::Topic(id) => open_topic(&controller, &id).await,
            ReplCommand::History => print!("{}", render_conversation(&controller.snapshot())),
            ReplCommand::Preset(preset) => {
                controller.apply_preset(preset);
                println!("{} {} {}", "input:".dimmed(), preset.prompt(), "(enter to send)".dimmed());
            }
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Quit => break,
        }
        io::stdout().flush()?;
    }

    controller.cancel();
    printer.abort();
    Ok(())
}
