//! `bareagent chat`: interactive session.
//!
//! Commands: `/clear`, `/model <id>`, `/exit`. Ctrl+C cancels the turn in
//! progress; at the prompt it exits.

use std::io::Write;

use bareagent_agent::{Session, TurnOutcome};
use bareagent_config::AppConfig;
use bareagent_providers::ModelRef;

use super::console::Console;
use super::setup;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let console = Console::stdin();
    let setup = setup::build(&console)?;
    setup::show_progress(&setup.events);

    let config = setup.config;
    let mut current = ModelRef::parse(&config.default_model, &config.default_provider);

    println!();
    println!("  bareagent: interactive mode");
    println!();
    println!("  Provider:  {}", current.provider);
    println!("  Model:     {}", current.model);
    println!("  Tools:     {}", setup.agent.tools().names().join(", "));
    println!("  Workdir:   {}", setup.ctx.working_dir().display());
    println!();
    println!("  /clear resets the conversation, /model <id> switches models, /exit quits.");
    println!("  Ctrl+C cancels a running turn.");
    println!();

    let mut session = Session::start(setup.agent, setup.ctx);

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = console.read_line() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let input = line.trim();

        match input {
            "" => continue,
            "/exit" | "exit" => break,
            "/clear" => {
                session.clear();
                println!("  (conversation cleared)");
                continue;
            }
            _ => {}
        }
        if let Some(id) = model_command(input) {
            switch_model(&session, &config, &mut current, id);
            continue;
        }

        session.submit(input)?;
        match wait_for_outcome(&mut session).await {
            Some(TurnOutcome { result: Ok(reply), .. }) => {
                println!();
                for line in reply.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Some(TurnOutcome { result: Err(e), .. }) if e.is_cancelled() => {
                eprintln!("  [Cancelled]");
            }
            Some(TurnOutcome { result: Err(e), .. }) => {
                eprintln!("  [Error] {e}");
            }
            None => break,
        }
    }

    session.close().await;
    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Wait for the next outcome, turning Ctrl+C into a cancel request.
pub async fn wait_for_outcome(session: &mut Session) -> Option<TurnOutcome> {
    loop {
        tokio::select! {
            outcome = session.next_outcome() => return outcome,
            _ = tokio::signal::ctrl_c() => {
                if session.request_cancel() {
                    eprintln!("  [Cancelling...]");
                }
            }
        }
    }
}

/// The argument of a `/model` command, empty when none was given.
fn model_command(input: &str) -> Option<&str> {
    match input.split_once(char::is_whitespace) {
        Some(("/model", id)) => Some(id.trim()),
        None if input == "/model" => Some(""),
        _ => None,
    }
}

fn switch_model(session: &Session, config: &AppConfig, current: &mut ModelRef, id: &str) {
    if id.is_empty() {
        println!("  Current model: {}:{}", current.provider, current.model);
        return;
    }

    let next = ModelRef::parse(id, &current.provider);
    if next.provider == current.provider {
        session.set_model(next.model.clone());
    } else {
        match bareagent_providers::resolve(&format!("{}:{}", next.provider, next.model), config) {
            Ok((adapter, options)) => session.set_backend(adapter, options),
            Err(e) => {
                eprintln!("  [Error] {e}");
                return;
            }
        }
    }
    println!("  Switched to {}:{}", next.provider, next.model);
    *current = next;
}
