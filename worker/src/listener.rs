//! The coordinator signal listener.
//!
//! The listener is a finite state machine fed by the signal socket and by the round it
//! drives. `transition` decides, `Listener::run` executes. Everything runs in a single task:
//! the socket, the graph prewarm and the round in progress are polled together and nothing
//! is spawned.

use std::sync::Arc;

use comms::{Msg, SignalSource, SocketEvent, WsSource};
use futures::future::{BoxFuture, OptionFuture};
use log::{debug, info, warn};

use crate::{Result, pipeline::RoundHandler, report::RoundSummary, telemetry::Telemetry};

/// The listener's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Idle,
    RoundInProgress,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    Connected,
    Message(&'a str),
    RoundFinished,
    Closed,
}

/// What the event loop has to do about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Nothing,
    Prewarm,
    StartRound(String),
    /// A message that doesn't start a round, with its kind and the reason.
    Ignore {
        kind: &'static str,
        reason: &'static str,
    },
    Stop,
}

/// The listener's transition table.
///
/// A socket closing during a round doesn't stop the round: the listener is already
/// `Disconnected` but only stops once the round finishes.
pub fn transition(state: State, event: Event<'_>) -> (State, Action) {
    use Action::*;
    use State::*;

    match (state, event) {
        (Connecting | Disconnected, Event::Connected) => (Idle, Prewarm),

        (Idle, Event::Message(text)) => match Msg::parse(text) {
            Msg::TriggerRound(id) => (RoundInProgress, StartRound(id.to_string())),
            msg => (Idle, ignore(msg, "not a round trigger")),
        },
        (RoundInProgress, Event::Message(text)) => match Msg::parse(text) {
            msg @ Msg::TriggerRound(_) => {
                (RoundInProgress, ignore(msg, "a round is already in progress"))
            }
            msg => (RoundInProgress, ignore(msg, "not a round trigger")),
        },

        (RoundInProgress, Event::RoundFinished) => (Idle, Nothing),
        (Disconnected, Event::RoundFinished) => (Disconnected, Stop),

        (RoundInProgress, Event::Closed) => (Disconnected, Nothing),
        (_, Event::Closed) => (Disconnected, Stop),

        (state, Event::Message(text)) => (state, ignore(Msg::parse(text), "not listening")),
        (state, _) => (state, Nothing),
    }
}

fn ignore(msg: Msg<'_>, reason: &'static str) -> Action {
    Action::Ignore {
        kind: msg.kind(),
        reason,
    }
}

enum Wake {
    Socket(SocketEvent),
    Prewarmed(Result<()>),
    RoundDone(Result<RoundSummary>),
}

/// Listens for round triggers and runs one round at a time.
pub struct Listener<'h> {
    handler: &'h dyn RoundHandler,
    telemetry: Arc<Telemetry>,
    state: State,
    rounds: usize,
}

impl<'h> Listener<'h> {
    /// Creates a new, disconnected `Listener`.
    ///
    /// # Arguments
    /// * `handler` - Runs the prewarm and the rounds.
    /// * `telemetry` - Round failures are reported here.
    pub fn new(handler: &'h dyn RoundHandler, telemetry: Arc<Telemetry>) -> Self {
        Self {
            handler,
            telemetry,
            state: State::Disconnected,
            rounds: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The amount of rounds started so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Opens the signal socket.
    ///
    /// # Arguments
    /// * `ws_base` - The coordinator's websocket host.
    /// * `token` - The user's bearer token.
    ///
    /// # Returns
    /// The connected socket to `run` on, or the connection error. The listener stays
    /// `Disconnected` on failure, there are no reconnection attempts.
    pub async fn connect(&mut self, ws_base: &str, token: &str) -> comms::Result<WsSource> {
        self.state = State::Connecting;

        match comms::connect(ws_base, token).await {
            Ok(source) => Ok(source),
            Err(e) => {
                self.state = State::Disconnected;
                self.telemetry.error(format!("failed to connect to the coordinator: {e}"));
                Err(e)
            }
        }
    }

    /// Runs the listener over a connected `source` until it's `Disconnected` with no round
    /// left running.
    pub async fn run<S: SignalSource>(&mut self, mut source: S) {
        let mut prewarm: Option<BoxFuture<'h, Result<()>>> = None;
        let mut round: Option<BoxFuture<'h, Result<RoundSummary>>> = None;
        let mut socket_open = true;
        let handler = self.handler;

        let mut action = self.step(Event::Connected);

        loop {
            match action {
                Action::Nothing => {}
                Action::Prewarm => prewarm = Some(handler.prewarm()),
                Action::StartRound(round_id) => {
                    self.rounds += 1;
                    self.telemetry.status(format!("round {round_id} triggered"));
                    round = Some(handler.run_round(round_id));
                }
                Action::Ignore { kind, reason } => {
                    debug!(kind = kind; "ignoring socket message, {reason}")
                }
                Action::Stop => break,
            }

            let wake = tokio::select! {
                event = source.next_event(), if socket_open => Wake::Socket(event),
                Some(res) = OptionFuture::from(prewarm.as_mut()) => Wake::Prewarmed(res),
                Some(res) = OptionFuture::from(round.as_mut()) => Wake::RoundDone(res),
                else => break,
            };

            action = match wake {
                Wake::Socket(SocketEvent::Text(text)) => self.step(Event::Message(&text)),
                Wake::Socket(SocketEvent::Closed(reason)) => {
                    socket_open = false;
                    match reason {
                        Some(reason) => warn!("signal socket closed: {reason}"),
                        None => info!("signal socket closed"),
                    }
                    self.step(Event::Closed)
                }
                Wake::Prewarmed(res) => {
                    prewarm = None;
                    if let Err(e) = res {
                        self.telemetry.error(format!("failed to prewarm the graphs: {e}"));
                    }
                    Action::Nothing
                }
                Wake::RoundDone(res) => {
                    round = None;
                    self.report(res);
                    self.step(Event::RoundFinished)
                }
            };
        }

        self.telemetry.flush();
    }

    fn step(&mut self, event: Event<'_>) -> Action {
        let (next, action) = transition(self.state, event);
        if next != self.state {
            debug!("listener {:?} -> {next:?}", self.state);
        }

        self.state = next;
        action
    }

    fn report(&self, res: Result<RoundSummary>) {
        match res {
            Ok(summary) if summary.uploaded => self
                .telemetry
                .status(format!("round {} completed", summary.round_id)),
            Ok(summary) => self.telemetry.status(format!(
                "round {} completed without uploading",
                summary.round_id
            )),
            Err(e) => self.telemetry.error(format!("round failed: {e}")),
        }

        self.telemetry.flush();
    }
}
