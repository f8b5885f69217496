//! Line-oriented terminal front-end for both games.

use anyhow::Result;
use chroma_games::adventure::{self, AdventureState, Author, LlmNarrator, StoryDriver, StoryEvent};
use chroma_games::tictactoe::{
    self, DriverSettings, FirstAvailable, LlmOpponent, MatchDriver, MatchEvent, MatchState, Mode,
    Opponent, Outcome, Phase, Position,
};
use chroma_games::{AppConfig, LlmClient};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

const XO_HELP: &str = "Commands: 0-8 or a square name, restart, mode, retry, quit";
const ADVENTURE_HELP: &str = "Type an action, a suggestion number, restart, or quit";

/// Runs Chroma XO until the player quits or stdin closes.
#[instrument(skip(config))]
pub async fn run_xo(config: &AppConfig, mode: Mode, offline: bool) -> Result<()> {
    let opponent = build_opponent(config, offline);
    let settings = DriverSettings::default()
        .with_timeout(config.opponent_timeout())
        .with_delay(config.opponent_delay());

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let driver = MatchDriver::new(MatchState::new(mode), opponent, settings, event_tx);
    let handle = tokio::spawn(driver.run(command_rx));

    println!("CHROMA XO ({})\n{}", mode, XO_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_xo_command(&line) {
                    Some(XoInput::Quit) => break,
                    Some(XoInput::Command(command)) => command_tx.send(command)?,
                    None => println!("{}", XO_HELP),
                }
            }
            event = event_rx.recv() => match event {
                Some(event) => render_match_event(&event),
                None => break,
            },
        }
    }

    drop(command_tx);
    let final_state = handle.await??;
    let scores = final_state.scores();
    println!("Final score  X {} : {} O", scores.x, scores.o);
    Ok(())
}

/// Runs the Aetheris adventure until the player quits or stdin closes.
#[instrument(skip(config))]
pub async fn run_adventure(config: &AppConfig) -> Result<()> {
    let client = LlmClient::new(config.create_llm_config()?);
    let narrator = Arc::new(LlmNarrator::new(client));

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let driver = StoryDriver::new(narrator, config.narrator_timeout(), event_tx);
    let handle = tokio::spawn(driver.run(command_rx));

    println!("AETHERIS\n{}", ADVENTURE_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_adventure_command(&line) {
                    Some(AdventureInput::Quit) => break,
                    Some(AdventureInput::Command(command)) => command_tx.send(command)?,
                    None => {}
                }
            }
            event = event_rx.recv() => match event {
                Some(StoryEvent::StateChanged(state)) => shown = render_story(&state, shown),
                Some(StoryEvent::NarratorThinking) => println!("..."),
                Some(StoryEvent::NarratorFailed(error)) => warn!(%error, "Narrator failed"),
                Some(StoryEvent::Rejected(rejection)) => println!("({})", rejection),
                Some(StoryEvent::NoSuchSuggestion(index)) => {
                    println!("(no suggestion {})", index + 1)
                }
                None => break,
            },
        }
    }

    drop(command_tx);
    let final_state = handle.await??;
    info!(turns = final_state.turn(), "Adventure finished");
    Ok(())
}

fn build_opponent(config: &AppConfig, offline: bool) -> Arc<dyn Opponent> {
    if !offline {
        match config.create_llm_config() {
            Ok(llm) => return Arc::new(LlmOpponent::new("AI O", LlmClient::new(llm))),
            Err(error) => {
                warn!(%error, "No LLM available; using offline opponent");
                println!("No LLM configured ({}); the offline opponent plays O.", error.message);
            }
        }
    }
    Arc::new(FirstAvailable::new("Bot O"))
}

#[derive(Debug, PartialEq, Eq)]
enum XoInput {
    Command(tictactoe::Command),
    Quit,
}

fn parse_xo_command(line: &str) -> Option<XoInput> {
    let word = line.trim().to_ascii_lowercase();
    let command = match word.as_str() {
        "quit" | "exit" | "q" => return Some(XoInput::Quit),
        "restart" | "r" => tictactoe::Command::Restart,
        "mode" | "m" => tictactoe::Command::ToggleMode,
        "retry" => tictactoe::Command::Retry,
        other => tictactoe::Command::Place(Position::from_label_or_number(other)?),
    };
    Some(XoInput::Command(command))
}

fn render_match_event(event: &MatchEvent) {
    match event {
        MatchEvent::StateChanged(state) => render_match(state),
        MatchEvent::OpponentThinking { opponent } => println!("{} is thinking...", opponent),
        MatchEvent::OpponentStalled(reason) => {
            println!("The opponent did not move ({}). Type retry, or place O yourself.", reason)
        }
        MatchEvent::Rejected(rejection) => println!("({})", rejection),
    }
}

fn render_match(state: &MatchState) {
    if state.is_awaiting_opponent() {
        // The board is unchanged until the opponent answers.
        return;
    }
    let scores = state.scores();
    println!("\n{}\n", state.board().display());
    let status = match state.phase() {
        Phase::Over(Outcome::Won { mark, line }) => {
            let squares: Vec<String> = line.iter().map(|p| p.to_index().to_string()).collect();
            format!("{} VICTORY! (line {})", mark, squares.join("-"))
        }
        Phase::Over(Outcome::Draw) => "It's a Stalemate!".to_string(),
        _ => format!("{} Turn", state.to_move()),
    };
    println!("{}    [X {} : {} O]  {}", status, scores.x, scores.o, state.mode());
}

#[derive(Debug, PartialEq, Eq)]
enum AdventureInput {
    Command(adventure::Command),
    Quit,
}

fn parse_adventure_command(line: &str) -> Option<AdventureInput> {
    let text = line.trim();
    if text.is_empty() {
        return None;
    }
    let command = match text.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return Some(AdventureInput::Quit),
        "restart" => adventure::Command::Restart,
        _ => match text.parse::<usize>() {
            Ok(n) if n >= 1 => adventure::Command::Choose(n - 1),
            _ => adventure::Command::Say(text.to_string()),
        },
    };
    Some(AdventureInput::Command(command))
}

/// Prints transcript entries after the first `shown`, returning the new count.
fn render_story(state: &AdventureState, shown: usize) -> usize {
    let transcript = state.transcript();
    // A shorter transcript means the story restarted.
    let start = if transcript.len() < shown { 0 } else { shown };
    let fresh = &transcript[start..];
    if fresh.is_empty() {
        return transcript.len();
    }

    for entry in fresh {
        match entry.author {
            Author::Player => println!("\n> {}", entry.text),
            Author::Narrator => println!("\n{}", entry.text),
        }
    }

    let gauges = state.resources();
    println!(
        "\n[{}] O2 {}%  HP {}%  PWR {}%  Items: {}",
        state.location(),
        gauges.oxygen,
        gauges.health,
        gauges.power,
        if state.inventory().is_empty() {
            "none".to_string()
        } else {
            state.inventory().join(", ")
        }
    );
    if let Some(ending) = state.ending() {
        println!("*** {} ***", ending);
    }
    for (i, action) in state.suggestions().iter().enumerate() {
        println!("  {}. {}", i + 1, action);
    }
    transcript.len()
}
