//! Explicit audio player state machine for one guild.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::GuildId;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::debug;

use super::VoiceLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
    Stopped,
}

impl PlayerState {
    /// Buffering or Playing: a new submission must be refused.
    pub fn is_busy(self) -> bool {
        matches!(self, PlayerState::Buffering | PlayerState::Playing)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Inputs to the player state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A resource was handed to the transport.
    Submit,
    /// The transport began producing audio.
    Started,
    Pause,
    Resume,
    /// The resource ran out or failed.
    Finished,
    /// The submission was given up on before it started.
    Abandon,
    /// Playback was torn down with the connection.
    Stop,
    /// Unconditional return to Idle.
    Reset,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("player cannot handle {event:?} while {from}")]
    Illegal { from: PlayerState, event: PlayerEvent },

    #[error("{event:?} belongs to submission {submission}, player is on {current}")]
    Stale {
        submission: u64,
        current: u64,
        event: PlayerEvent,
    },
}

/// The transition table. `None` marks an illegal transition.
pub fn next_state(from: PlayerState, event: PlayerEvent) -> Option<PlayerState> {
    use PlayerEvent::*;
    use PlayerState::*;

    match (from, event) {
        (_, Reset) => Some(Idle),
        (Idle | Paused | Stopped, Submit) => Some(Buffering),
        (Buffering, Started) => Some(Playing),
        (Buffering, Abandon) => Some(Idle),
        (Playing, Pause) => Some(Paused),
        (Paused, Resume) => Some(Playing),
        (Buffering | Playing | Paused, Finished) => Some(Idle),
        (Buffering | Playing | Paused, Stop) => Some(Stopped),
        _ => None,
    }
}

/// Current state plus two counters: `submission` numbers every accepted
/// `Submit`, `starts` counts playbacks that reached Playing.
///
/// `starts` lets a waiter notice a playback that started and already finished
/// before it got to look; `submission` lets late transport events from an
/// older resource be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub submission: u64,
    pub starts: u64,
}

/// Outcome of waiting for a submitted resource to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartWait {
    Started,
    /// Left Buffering without ever playing.
    Abandoned(PlayerState),
    TimedOut,
}

/// Handle to one accepted submission. Transport callbacks report through it so
/// events from an older resource cannot move the player.
#[derive(Debug, Clone)]
pub struct PlaybackTicket {
    player: Arc<PlayerStateMachine>,
    submission: u64,
    starts_before: u64,
}

impl PlaybackTicket {
    pub fn submission(&self) -> u64 {
        self.submission
    }

    /// Whether this is still the player's latest submission.
    pub fn is_current(&self) -> bool {
        self.player.snapshot().submission == self.submission
    }

    pub fn report(&self, event: PlayerEvent) -> Result<PlayerSnapshot, TransitionError> {
        self.player.apply(event, Some(self.submission))
    }
}

pub struct PlayerStateMachine {
    guild_id: GuildId,
    snapshot: watch::Sender<PlayerSnapshot>,
    output: Mutex<Option<Arc<dyn VoiceLink>>>,
}

impl fmt::Debug for PlayerStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerStateMachine")
            .field("guild_id", &self.guild_id)
            .field("snapshot", &*self.snapshot.borrow())
            .finish_non_exhaustive()
    }
}

impl PlayerStateMachine {
    pub fn new(guild_id: GuildId) -> Self {
        let (snapshot, _rx) = watch::channel(PlayerSnapshot {
            state: PlayerState::Idle,
            submission: 0,
            starts: 0,
        });
        Self {
            guild_id,
            snapshot,
            output: Mutex::new(None),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> PlayerState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        *self.snapshot.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// Apply `event` atomically. Illegal transitions leave the state untouched.
    pub fn transition(&self, event: PlayerEvent) -> Result<PlayerSnapshot, TransitionError> {
        self.apply(event, None)
    }

    fn apply(
        &self,
        event: PlayerEvent,
        submission: Option<u64>,
    ) -> Result<PlayerSnapshot, TransitionError> {
        let mut outcome = None;
        self.snapshot.send_if_modified(|snapshot| {
            let from = snapshot.state;
            if let Some(submission) = submission.filter(|s| *s != snapshot.submission) {
                outcome = Some(Err(TransitionError::Stale {
                    submission,
                    current: snapshot.submission,
                    event,
                }));
                return false;
            }
            match next_state(from, event) {
                Some(to) => {
                    snapshot.state = to;
                    match event {
                        PlayerEvent::Submit => snapshot.submission += 1,
                        PlayerEvent::Started => snapshot.starts += 1,
                        _ => {}
                    }
                    outcome = Some(Ok(*snapshot));
                    true
                }
                None => {
                    outcome = Some(Err(TransitionError::Illegal { from, event }));
                    false
                }
            }
        });

        // send_if_modified always runs the closure
        let outcome = outcome.unwrap_or(Err(TransitionError::Illegal {
            from: self.state(),
            event,
        }));
        match &outcome {
            Ok(snapshot) => debug!(
                "Player for guild {} handled {:?}, now {}",
                self.guild_id, event, snapshot.state
            ),
            Err(e) => debug!("Player for guild {}: {}", self.guild_id, e),
        }
        outcome
    }

    /// Accept a new resource if the player is not busy.
    ///
    /// The check and the move to Buffering are one atomic step, so two
    /// concurrent submissions can never both succeed.
    pub fn submit(self: &Arc<Self>) -> Result<PlaybackTicket, TransitionError> {
        let snapshot = self.transition(PlayerEvent::Submit)?;
        Ok(PlaybackTicket {
            player: Arc::clone(self),
            submission: snapshot.submission,
            starts_before: snapshot.starts,
        })
    }

    /// Wait until the player reaches `target`.
    pub async fn await_state(&self, target: PlayerState, timeout: Duration) -> bool {
        let mut rx = self.snapshot.subscribe();
        tokio::time::timeout(timeout, async move {
            rx.wait_for(|snapshot| snapshot.state == target).await.is_ok()
        })
        .await
        .unwrap_or(false)
    }

    /// Wait for the playback behind `ticket` to reach Playing.
    pub async fn await_start(&self, ticket: &PlaybackTicket, timeout: Duration) -> StartWait {
        let since = ticket.starts_before;
        let mut rx = self.snapshot.subscribe();
        let waited = tokio::time::timeout(timeout, async move {
            rx.wait_for(|snapshot| {
                snapshot.starts > since || snapshot.state != PlayerState::Buffering
            })
            .await
            .map(|snapshot| *snapshot)
        })
        .await;

        match waited {
            Ok(Ok(snapshot)) if snapshot.starts > since => StartWait::Started,
            Ok(Ok(snapshot)) => StartWait::Abandoned(snapshot.state),
            Ok(Err(_)) => StartWait::Abandoned(self.state()),
            Err(_) => StartWait::TimedOut,
        }
    }

    /// Route this player's audio into `link`, replacing any previous output.
    pub async fn subscribe(&self, link: Arc<dyn VoiceLink>) {
        debug!(
            "Player for guild {} subscribed to channel {}",
            self.guild_id,
            link.channel_id()
        );
        *self.output.lock().await = Some(link);
    }

    /// Detach from the current output and stop whatever was in flight.
    pub async fn unsubscribe(&self) -> Option<Arc<dyn VoiceLink>> {
        let previous = self.output.lock().await.take();
        if self.state() != PlayerState::Idle && self.state() != PlayerState::Stopped {
            let _ = self.transition(PlayerEvent::Stop);
        }
        previous
    }

    pub async fn output(&self) -> Option<Arc<dyn VoiceLink>> {
        self.output.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn player() -> Arc<PlayerStateMachine> {
        Arc::new(PlayerStateMachine::new(GuildId::new(1)))
    }

    #[rstest]
    #[case(PlayerState::Idle, PlayerEvent::Submit, Some(PlayerState::Buffering))]
    #[case(PlayerState::Paused, PlayerEvent::Submit, Some(PlayerState::Buffering))]
    #[case(PlayerState::Stopped, PlayerEvent::Submit, Some(PlayerState::Buffering))]
    #[case(PlayerState::Buffering, PlayerEvent::Submit, None)]
    #[case(PlayerState::Playing, PlayerEvent::Submit, None)]
    #[case(PlayerState::Buffering, PlayerEvent::Started, Some(PlayerState::Playing))]
    #[case(PlayerState::Idle, PlayerEvent::Started, None)]
    #[case(PlayerState::Playing, PlayerEvent::Pause, Some(PlayerState::Paused))]
    #[case(PlayerState::Paused, PlayerEvent::Resume, Some(PlayerState::Playing))]
    #[case(PlayerState::Playing, PlayerEvent::Resume, None)]
    #[case(PlayerState::Playing, PlayerEvent::Finished, Some(PlayerState::Idle))]
    #[case(PlayerState::Paused, PlayerEvent::Finished, Some(PlayerState::Idle))]
    #[case(PlayerState::Idle, PlayerEvent::Finished, None)]
    #[case(PlayerState::Buffering, PlayerEvent::Abandon, Some(PlayerState::Idle))]
    #[case(PlayerState::Playing, PlayerEvent::Abandon, None)]
    #[case(PlayerState::Idle, PlayerEvent::Abandon, None)]
    #[case(PlayerState::Playing, PlayerEvent::Stop, Some(PlayerState::Stopped))]
    #[case(PlayerState::Idle, PlayerEvent::Stop, None)]
    #[case(PlayerState::Buffering, PlayerEvent::Reset, Some(PlayerState::Idle))]
    #[case(PlayerState::Stopped, PlayerEvent::Reset, Some(PlayerState::Idle))]
    fn test_transition_table(
        #[case] from: PlayerState,
        #[case] event: PlayerEvent,
        #[case] expected: Option<PlayerState>,
    ) {
        assert_eq!(next_state(from, event), expected);
    }

    #[test]
    fn test_starts_idle() {
        let player = player();
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(!player.is_busy());
        assert_eq!(player.snapshot().starts, 0);
    }

    #[test]
    fn test_full_cycle_counts_starts() {
        let player = player();
        player.transition(PlayerEvent::Submit).unwrap();
        assert!(player.is_busy());
        player.transition(PlayerEvent::Started).unwrap();
        player.transition(PlayerEvent::Pause).unwrap();
        assert!(!player.is_busy());
        player.transition(PlayerEvent::Resume).unwrap();
        let snapshot = player.transition(PlayerEvent::Finished).unwrap();

        assert_eq!(
            snapshot,
            PlayerSnapshot {
                state: PlayerState::Idle,
                submission: 1,
                starts: 1
            }
        );
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let player = player();
        player.transition(PlayerEvent::Submit).unwrap();

        let err = player.transition(PlayerEvent::Submit).unwrap_err();

        assert_eq!(
            err,
            TransitionError::Illegal {
                from: PlayerState::Buffering,
                event: PlayerEvent::Submit
            }
        );
        assert_eq!(player.state(), PlayerState::Buffering);
    }

    #[test]
    fn test_abandon_cannot_touch_newer_submission() {
        let player = player();
        let old = player.submit().unwrap();
        // a disconnect and a new request land between the timeout and the abandon
        player.transition(PlayerEvent::Stop).unwrap();
        let current = player.submit().unwrap();

        assert_eq!(
            old.report(PlayerEvent::Abandon).unwrap_err(),
            TransitionError::Stale {
                submission: 1,
                current: 2,
                event: PlayerEvent::Abandon
            }
        );
        assert_eq!(player.state(), PlayerState::Buffering);
        assert!(player.submit().is_err());

        current.report(PlayerEvent::Abandon).unwrap();
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_abandon_after_start_is_refused() {
        let player = player();
        let ticket = player.submit().unwrap();
        ticket.report(PlayerEvent::Started).unwrap();

        assert_eq!(
            ticket.report(PlayerEvent::Abandon).unwrap_err(),
            TransitionError::Illegal {
                from: PlayerState::Playing,
                event: PlayerEvent::Abandon
            }
        );
        assert_eq!(player.state(), PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_await_state_sees_later_transition() {
        let player = player();
        player.transition(PlayerEvent::Submit).unwrap();

        let remote = player.clone();
        tokio::spawn(async move {
            remote.transition(PlayerEvent::Started).unwrap();
        });

        assert!(player.await_state(PlayerState::Playing, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_start_times_out_while_buffering() {
        let player = player();
        let ticket = player.submit().unwrap();

        let outcome = player.await_start(&ticket, Duration::from_secs(10)).await;

        assert_eq!(outcome, StartWait::TimedOut);
        assert_eq!(player.state(), PlayerState::Buffering);
    }

    #[tokio::test]
    async fn test_await_start_catches_short_playback() {
        let player = player();
        let ticket = player.submit().unwrap();
        ticket.report(PlayerEvent::Started).unwrap();
        ticket.report(PlayerEvent::Finished).unwrap();

        let outcome = player.await_start(&ticket, Duration::from_secs(1)).await;

        assert_eq!(outcome, StartWait::Started);
    }

    #[tokio::test]
    async fn test_await_start_reports_abandoned_playback() {
        let player = player();
        let ticket = player.submit().unwrap();
        ticket.report(PlayerEvent::Finished).unwrap();

        let outcome = player.await_start(&ticket, Duration::from_secs(1)).await;

        assert_eq!(outcome, StartWait::Abandoned(PlayerState::Idle));
    }

    #[test]
    fn test_submit_is_single_flight() {
        let player = player();
        let ticket = player.submit().unwrap();

        assert_eq!(ticket.submission(), 1);
        assert!(player.submit().is_err());
        assert_eq!(player.state(), PlayerState::Buffering);
    }

    #[test]
    fn test_stale_ticket_cannot_move_player() {
        let player = player();
        let old = player.submit().unwrap();
        player.transition(PlayerEvent::Reset).unwrap();
        let current = player.submit().unwrap();

        let err = old.report(PlayerEvent::Finished).unwrap_err();

        assert_eq!(
            err,
            TransitionError::Stale {
                submission: 1,
                current: 2,
                event: PlayerEvent::Finished
            }
        );
        assert!(!old.is_current());
        assert!(current.is_current());
        assert_eq!(player.state(), PlayerState::Buffering);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_playback() {
        let player = player();
        player.transition(PlayerEvent::Submit).unwrap();
        player.transition(PlayerEvent::Started).unwrap();

        assert!(player.unsubscribe().await.is_none());
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(!player.is_busy());
    }
}
