//! Actor driving the simulated transfer engine.

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use super::commands::EngineCommand;
use super::handle::SimulatedEngine;
use super::simulated::SimulatedSwarm;
use crate::config::SimulationConfig;

const ALERT_CHANNEL_CAPACITY: usize = 1024;

/// Spawns the simulated engine actor and returns its handle.
///
/// The actor owns all swarm state. Commands are processed one at a time,
/// interleaved with simulation ticks every `tick_interval`.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use undertow_core::config::SimulationConfig;
/// use undertow_core::engine::spawn_simulated_engine;
///
/// let engine = spawn_simulated_engine(SimulationConfig::deterministic_testing());
/// # }
/// ```
pub fn spawn_simulated_engine(config: SimulationConfig) -> SimulatedEngine {
    let (sender, receiver) = mpsc::channel(100);
    let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
    let swarm = SimulatedSwarm::new(config.clone(), alerts.clone());

    tokio::spawn(async move {
        run_actor_loop(swarm, config, receiver).await;
    });

    SimulatedEngine::new(sender, alerts)
}

async fn run_actor_loop(
    mut swarm: SimulatedSwarm,
    config: SimulationConfig,
    mut receiver: mpsc::Receiver<EngineCommand>,
) {
    tracing::debug!("Simulated engine actor started");

    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = receiver.recv() => {
                let Some(command) = command else {
                    break;
                };
                if !handle_command(&mut swarm, command) {
                    break;
                }
            }
            _ = ticker.tick() => {
                // Fixed step rather than wall time keeps piece order reproducible.
                swarm.tick(config.tick_interval);
            }
        }
    }

    tracing::debug!("Simulated engine actor stopped");
}

/// Handles a single command. Returns false to stop the actor.
fn handle_command(swarm: &mut SimulatedSwarm, command: EngineCommand) -> bool {
    match command {
        EngineCommand::ApplySettings {
            settings,
            responder,
        } => {
            swarm.apply_settings(settings);
            let _ = responder.send(Ok(()));
        }

        EngineCommand::AddTorrent { params, responder } => {
            let _ = responder.send(swarm.add_torrent(params));
        }

        EngineCommand::RegisterMetadata { info, responder } => {
            swarm.register_metadata(info);
            let _ = responder.send(Ok(()));
        }

        EngineCommand::Torrents { responder } => {
            let _ = responder.send(Ok(swarm.torrents()));
        }

        EngineCommand::Status {
            info_hash,
            responder,
        } => {
            let _ = responder.send(swarm.status(info_hash));
        }

        EngineCommand::TorrentInfo {
            info_hash,
            responder,
        } => {
            let _ = responder.send(swarm.torrent_info(info_hash));
        }

        EngineCommand::RemoveTorrent {
            info_hash,
            delete_files,
            responder,
        } => {
            let _ = responder.send(swarm.remove_torrent(info_hash, delete_files));
        }

        EngineCommand::SetSequential {
            info_hash,
            sequential,
            responder,
        } => {
            let _ = responder.send(swarm.set_sequential(info_hash, sequential));
        }

        EngineCommand::PrioritizePieces {
            info_hash,
            priorities,
            responder,
        } => {
            let _ = responder.send(swarm.prioritize_pieces(info_hash, priorities));
        }

        EngineCommand::PiecePriorities {
            info_hash,
            responder,
        } => {
            let _ = responder.send(swarm.piece_priorities(info_hash));
        }

        EngineCommand::SetPieceDeadline {
            info_hash,
            piece,
            deadline,
            responder,
        } => {
            let _ = responder.send(swarm.set_piece_deadline(info_hash, piece, deadline));
        }

        EngineCommand::HavePiece {
            info_hash,
            piece,
            responder,
        } => {
            let _ = responder.send(swarm.have_piece(info_hash, piece));
        }

        EngineCommand::DownloadQueue {
            info_hash,
            responder,
        } => {
            let _ = responder.send(swarm.download_queue(info_hash));
        }

        EngineCommand::SetRateLimits {
            download,
            upload,
            responder,
        } => {
            swarm.set_rate_limits(download, upload);
            let _ = responder.send(Ok(()));
        }

        EngineCommand::ResumeData {
            info_hash,
            responder,
        } => {
            let _ = responder.send(swarm.resume_data(info_hash));
        }

        EngineCommand::Inspect { responder } => {
            let _ = responder.send(Ok(swarm.snapshot()));
        }

        EngineCommand::Shutdown { responder } => {
            tracing::debug!("Simulated engine actor shutting down");
            let _ = responder.send(());
            return false;
        }
    }

    true
}
