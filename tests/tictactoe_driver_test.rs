//! Tests for the match driver against scripted opponents.

use chroma_games::CollaboratorError;
use chroma_games::tictactoe::{
    Board, Command, DriverSettings, Mark, MatchDriver, MatchEvent, MatchState, Mode, Opponent,
    Phase, Position, Square,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Opponent that plays back a script, waiting `think` before each answer.
struct Scripted {
    replies: Mutex<VecDeque<Result<usize, CollaboratorError>>>,
    think: Duration,
}

impl Scripted {
    fn new(replies: Vec<Result<usize, CollaboratorError>>, think: Duration) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            think,
        }
    }
}

#[async_trait::async_trait]
impl Opponent for Scripted {
    async fn choose_move(&self, _board: &Board) -> Result<usize, CollaboratorError> {
        tokio::time::sleep(self.think).await;
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(CollaboratorError::Failed("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}

struct Harness {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<MatchEvent>,
    handle: tokio::task::JoinHandle<anyhow::Result<MatchState>>,
}

fn start(mode: Mode, opponent: Scripted, timeout: Duration) -> Harness {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let settings = DriverSettings::default()
        .with_timeout(timeout)
        .with_delay(Duration::ZERO);
    let driver = MatchDriver::new(MatchState::new(mode), Arc::new(opponent), settings, event_tx);
    Harness {
        commands,
        events,
        handle: tokio::spawn(driver.run(command_rx)),
    }
}

impl Harness {
    async fn next_event(&mut self) -> MatchEvent {
        self.events.recv().await.expect("driver stopped publishing")
    }

    /// Skips events until a state satisfying `pred` is published.
    async fn state_where(&mut self, pred: impl Fn(&MatchState) -> bool) -> MatchState {
        loop {
            if let MatchEvent::StateChanged(state) = self.next_event().await
                && pred(&state)
            {
                return state;
            }
        }
    }

    async fn finish(self) -> MatchState {
        drop(self.commands);
        self.handle.await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_opponent_move_is_applied() {
    let mut harness = start(
        Mode::PlayerVsAi,
        Scripted::new(vec![Ok(0)], Duration::ZERO),
        Duration::from_secs(5),
    );
    harness.commands.send(Command::Place(Position::Center)).unwrap();

    let state = harness.state_where(|s| s.board().filled() == 2).await;
    assert_eq!(state.board().get(Position::TopLeft), Square::Occupied(Mark::O));
    assert_eq!(state.to_move(), Mark::X);
    assert_eq!(state.phase(), Phase::Open);

    let final_state = harness.finish().await;
    assert_eq!(final_state.board().filled(), 2);
}

#[tokio::test]
async fn test_local_mode_never_consults_opponent() {
    let mut harness = start(
        Mode::PlayerVsPlayer,
        Scripted::new(vec![], Duration::ZERO),
        Duration::from_secs(5),
    );
    harness.commands.send(Command::Place(Position::Center)).unwrap();
    harness.commands.send(Command::Place(Position::TopLeft)).unwrap();

    let state = harness.state_where(|s| s.board().filled() == 2).await;
    assert_eq!(state.board().get(Position::TopLeft), Square::Occupied(Mark::O));

    harness.commands.send(Command::Retry).unwrap();
    loop {
        match harness.next_event().await {
            MatchEvent::Rejected(_) => break,
            MatchEvent::OpponentThinking { .. } => panic!("opponent consulted in local play"),
            _ => {}
        }
    }
    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_opponent_times_out() {
    let mut harness = start(
        Mode::PlayerVsAi,
        Scripted::new(vec![Ok(8)], Duration::from_secs(60)),
        Duration::from_secs(10),
    );
    harness.commands.send(Command::Place(Position::Center)).unwrap();

    loop {
        if let MatchEvent::OpponentStalled(reason) = harness.next_event().await {
            assert!(matches!(reason, CollaboratorError::TimedOut { .. }));
            break;
        }
    }
    let stalled = harness.state_where(|_| true).await;
    assert_eq!(stalled.phase(), Phase::Open);
    assert_eq!(stalled.to_move(), Mark::O);
    assert_eq!(stalled.board().filled(), 1);

    // O is free to be placed by hand.
    harness.commands.send(Command::Place(Position::BottomRight)).unwrap();
    let state = harness.state_where(|s| s.board().filled() == 2).await;
    assert_eq!(state.board().get(Position::BottomRight), Square::Occupied(Mark::O));
    harness.finish().await;
}

#[tokio::test]
async fn test_failed_opponent_can_be_retried() {
    let mut harness = start(
        Mode::PlayerVsAi,
        Scripted::new(
            vec![Err(CollaboratorError::Failed("offline".to_string())), Ok(1)],
            Duration::ZERO,
        ),
        Duration::from_secs(5),
    );
    harness.commands.send(Command::Place(Position::Center)).unwrap();

    loop {
        if let MatchEvent::OpponentStalled(reason) = harness.next_event().await {
            assert_eq!(reason, CollaboratorError::Failed("offline".to_string()));
            break;
        }
    }

    harness.commands.send(Command::Retry).unwrap();
    let state = harness.state_where(|s| s.board().filled() == 2).await;
    assert_eq!(state.board().get(Position::TopCenter), Square::Occupied(Mark::O));
    harness.finish().await;
}

#[tokio::test]
async fn test_illegal_opponent_move_stalls() {
    let mut harness = start(
        Mode::PlayerVsAi,
        Scripted::new(vec![Ok(4)], Duration::ZERO),
        Duration::from_secs(5),
    );
    harness.commands.send(Command::Place(Position::Center)).unwrap();

    loop {
        if let MatchEvent::OpponentStalled(reason) = harness.next_event().await {
            assert!(matches!(reason, CollaboratorError::Malformed(_)));
            break;
        }
    }
    let final_state = harness.finish().await;
    assert_eq!(final_state.board().filled(), 1);
    assert_eq!(final_state.to_move(), Mark::O);
}

#[tokio::test(start_paused = true)]
async fn test_restart_abandons_pending_request() {
    let mut harness = start(
        Mode::PlayerVsAi,
        Scripted::new(vec![Ok(0)], Duration::from_secs(5)),
        Duration::from_secs(60),
    );
    harness.commands.send(Command::Place(Position::Center)).unwrap();
    loop {
        if let MatchEvent::OpponentThinking { opponent } = harness.next_event().await {
            assert_eq!(opponent, "Scripted");
            break;
        }
    }

    harness.commands.send(Command::Restart).unwrap();
    let fresh = harness.state_where(|s| s.board().filled() == 0).await;
    assert_eq!(fresh.phase(), Phase::Open);
    assert_eq!(fresh.to_move(), Mark::X);

    // Long past the opponent's answer: nothing may land on the new board.
    tokio::time::sleep(Duration::from_secs(30)).await;
    let final_state = harness.finish().await;
    assert_eq!(final_state.board(), &Board::new());
}

#[tokio::test]
async fn test_toggle_mode_resets_scores() {
    let mut harness = start(
        Mode::PlayerVsPlayer,
        Scripted::new(vec![], Duration::ZERO),
        Duration::from_secs(5),
    );
    for index in [0, 3, 1, 4, 2] {
        let pos = Position::from_index(index).unwrap();
        harness.commands.send(Command::Place(pos)).unwrap();
    }
    let won = harness.state_where(|s| s.outcome().is_some()).await;
    assert_eq!(won.scores().x, 1);

    harness.commands.send(Command::ToggleMode).unwrap();
    let toggled = harness.state_where(|s| s.mode() == Mode::PlayerVsAi).await;
    assert_eq!(toggled.scores().x, 0);
    assert_eq!(toggled.board().filled(), 0);
    harness.finish().await;
}
