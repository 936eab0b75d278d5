//! `pico chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;

use pico_agent::RunOutcome;
use pico_core::message::Message;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::runtime::{Runtime, load_config};

pub async fn run(config_path: Option<&Path>, message: Option<String>) -> anyhow::Result<()> {
    let runtime = Runtime::build(load_config(config_path)?)?;
    let agent = runtime.agent.clone();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = agent.run(vec![Message::user(msg)]).await;
        eprint!("\r              \r");
        let outcome = outcome?;
        println!("{}", outcome.response);
        print_actions(&outcome);
        return Ok(());
    }

    println!();
    println!("  Pico Interactive Mode");
    println!();
    println!("  Model:     {}", runtime.config.model.name);
    println!("  Tools:     {}", agent.tool_definitions().len());
    println!("  Data:      {}", runtime.config.storage.data_dir.display());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let mut turn = history.clone();
        turn.push(Message::user(line));

        eprint!("  ...");
        match agent.run(turn).await {
            Ok(outcome) => {
                eprint!("\r     \r");
                println!();
                for line in outcome.response.lines() {
                    println!("  Pico > {line}");
                }
                print_actions(&outcome);
                println!();
                history = outcome.messages;
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn print_actions(outcome: &RunOutcome) {
    if outcome.metadata.is_empty() {
        return;
    }
    if let Ok(actions) = serde_json::to_string(&outcome.metadata) {
        eprintln!("  [actions] {actions}");
    }
}
