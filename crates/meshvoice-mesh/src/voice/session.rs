//! Runs a `MeshCoordinator` on its own task behind a command handle.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::coordinator::MeshCoordinator;
use super::types::{MeshStatus, SessionError};
use crate::protocol::Participant;

/// Commands sent to the session task from the application layer.
#[derive(Debug)]
enum SessionCommand {
    Start {
        roster: Vec<Participant>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    UserJoined(Participant),
    UserLeft(String),
    ParticipantUpdated(Participant),
    ToggleMute {
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<MeshStatus>,
    },
    Shutdown,
}

/// Handle for a voice session running on a background task.
///
/// Cloning the handle yields another sender to the same session. The task
/// stops the session and exits on `shutdown` or when every handle is gone.
#[derive(Clone)]
pub struct VoiceSession {
    command_tx: mpsc::Sender<SessionCommand>,
}

impl VoiceSession {
    pub fn spawn(coordinator: MeshCoordinator) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        tokio::spawn(session_loop(coordinator, command_rx));
        Self { command_tx }
    }

    pub async fn start(&self, roster: Vec<Participant>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Start { roster, reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Stop { reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    pub async fn user_joined(&self, participant: Participant) -> Result<(), SessionError> {
        self.send(SessionCommand::UserJoined(participant)).await
    }

    pub async fn user_left(&self, peer_id: &str) -> Result<(), SessionError> {
        self.send(SessionCommand::UserLeft(peer_id.to_string())).await
    }

    pub async fn participant_updated(&self, participant: Participant) -> Result<(), SessionError> {
        self.send(SessionCommand::ParticipantUpdated(participant))
            .await
    }

    /// Returns the new mute state.
    pub async fn toggle_mute(&self) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ToggleMute { reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    pub async fn status(&self) -> Result<MeshStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Status { reply }).await?;
        rx.await.map_err(|_| SessionError::Stopped)
    }

    /// Stop the session and end the task.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }
}

async fn session_loop(
    mut coordinator: MeshCoordinator,
    mut command_rx: mpsc::Receiver<SessionCommand>,
) {
    debug!(self_id = %coordinator.self_id(), "Voice session task started");
    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(SessionCommand::Shutdown) | None => break,
                Some(command) => handle_command(&mut coordinator, command).await,
            },
            Some(input) = coordinator.next_input() => coordinator.dispatch(input).await,
        }
    }
    coordinator.stop_voice_chat().await;
    info!(self_id = %coordinator.self_id(), "Voice session task stopped");
}

async fn handle_command(coordinator: &mut MeshCoordinator, command: SessionCommand) {
    match command {
        SessionCommand::Start { roster, reply } => {
            let result = coordinator.start_voice_chat(&roster).await;
            let _ = reply.send(result);
        }
        SessionCommand::Stop { reply } => {
            coordinator.stop_voice_chat().await;
            let _ = reply.send(());
        }
        SessionCommand::UserJoined(participant) => coordinator.handle_user_joined(&participant),
        SessionCommand::UserLeft(peer_id) => coordinator.handle_user_left(&peer_id),
        SessionCommand::ParticipantUpdated(participant) => {
            coordinator.handle_participant_updated(&participant)
        }
        SessionCommand::ToggleMute { reply } => {
            let _ = reply.send(coordinator.toggle_mute());
        }
        SessionCommand::Status { reply } => {
            let _ = reply.send(coordinator.status());
        }
        SessionCommand::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn coordinator_can_run_on_a_spawned_task() {
        assert_send_sync::<MeshCoordinator>();
        assert_send_sync::<VoiceSession>();
    }
}
