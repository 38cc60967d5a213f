//! `bareagent run -m <message>`: one turn, reply on stdout.

use bareagent_agent::Session;

use super::console::Console;
use super::setup;

pub async fn run(message: String) -> Result<(), Box<dyn std::error::Error>> {
    let console = Console::stdin();
    let setup = setup::build(&console)?;
    setup::show_progress(&setup.events);

    let mut session = Session::start(setup.agent, setup.ctx);
    session.submit(message)?;

    let outcome = super::chat::wait_for_outcome(&mut session).await;
    session.close().await;

    match outcome {
        Some(outcome) => {
            let reply = outcome.result?;
            println!("{reply}");
            Ok(())
        }
        None => Err("Session ended without a reply".into()),
    }
}
