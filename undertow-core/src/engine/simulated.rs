//! Deterministic in-memory transfer engine state.
//!
//! Models what the streaming controller can observe from a real engine:
//! metadata arrival for magnets, fast-resume checking, piece priorities and
//! deadlines, block-level partial pieces and state alerts. Bytes are never
//! written to disk.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::EngineError;
use super::commands::EngineSnapshot;
use super::types::{
    AddTorrentParams, AlertKind, BlockProgress, EngineAlert, PartialPiece, PiecePriority,
    SessionSettings, TransferSource, TransferState, TransferStatus,
};
use crate::config::SimulationConfig;
use crate::torrent::{InfoHash, MagnetParser, TorrentInfo};

/// Engine block size
pub const BLOCK_SIZE: u64 = 16 * 1024;

/// Pieces downloaded concurrently per transfer
const MAX_IN_FLIGHT: usize = 4;

/// Piece length for metadata synthesized from unknown magnets
const SYNTHETIC_PIECE_LENGTH: u64 = 1024 * 1024;

/// Ticks spent verifying fast-resume data
const RESUME_CHECK_TICKS: u32 = 3;

const RESUME_MAGIC: &[u8; 4] = b"UTRS";

struct Transfer {
    info_hash: InfoHash,
    name: String,
    info: Option<TorrentInfo>,
    metadata_eta: Duration,
    state: TransferState,
    sequential: bool,
    priorities: Vec<PiecePriority>,
    deadlines: BTreeMap<u32, Duration>,
    piece_bytes: Vec<u64>,
    have: Vec<bool>,
    /// Random tie-break rank standing in for piece rarity
    rarity: Vec<u32>,
    resume_bitfield: Option<Vec<u8>>,
    checking_ticks_left: u32,
    num_seeds: u32,
    num_peers: u32,
    download_rate: u64,
    all_time_download: u64,
    active_time: Duration,
    finished_time: Duration,
}

impl Transfer {
    fn piece_size(&self, index: usize) -> u64 {
        let Some(info) = &self.info else {
            return 0;
        };
        let start = index as u64 * info.piece_length;
        info.total_size.saturating_sub(start).min(info.piece_length)
    }

    fn wanted(&self, index: usize) -> bool {
        self.priorities[index] != PiecePriority::Skip
    }

    fn all_wanted_done(&self) -> bool {
        (0..self.have.len()).all(|i| self.have[i] || !self.wanted(i))
    }

    fn total_wanted(&self) -> u64 {
        (0..self.have.len())
            .filter(|&i| self.wanted(i))
            .map(|i| self.piece_size(i))
            .sum()
    }

    fn total_done(&self) -> u64 {
        (0..self.have.len())
            .filter(|&i| self.have[i] && self.wanted(i))
            .map(|i| self.piece_size(i))
            .sum()
    }

    fn status(&self) -> TransferStatus {
        let total_wanted = self.total_wanted();
        let total_done = self.total_done();
        let progress = if self.state.is_checking() {
            1.0 - self.checking_ticks_left as f32 / RESUME_CHECK_TICKS as f32
        } else if total_wanted == 0 {
            0.0
        } else {
            total_done as f32 / total_wanted as f32
        };

        TransferStatus {
            info_hash: self.info_hash,
            name: self.name.clone(),
            progress,
            state: self.state,
            paused: false,
            has_metadata: self.info.is_some(),
            download_rate: self.download_rate,
            upload_rate: 0,
            num_seeds: self.num_seeds,
            num_peers: self.num_peers,
            total_done,
            total_wanted,
            all_time_download: self.all_time_download,
            all_time_upload: 0,
            active_time: self.active_time,
            finished_time: self.finished_time,
        }
    }
}

/// Simulated swarm state owned by the engine actor.
pub struct SimulatedSwarm {
    config: SimulationConfig,
    rng: StdRng,
    alerts: broadcast::Sender<EngineAlert>,
    transfers: Vec<Transfer>,
    known_metadata: HashMap<InfoHash, TorrentInfo>,
    settings: Option<SessionSettings>,
    download_limit: Option<u64>,
    upload_limit: Option<u64>,
    removals: Vec<(InfoHash, bool)>,
}

impl SimulatedSwarm {
    pub fn new(config: SimulationConfig, alerts: broadcast::Sender<EngineAlert>) -> Self {
        let seed = config.deterministic_seed.unwrap_or_else(rand::random);
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
            alerts,
            transfers: Vec::new(),
            known_metadata: HashMap::new(),
            settings: None,
            download_limit: None,
            upload_limit: None,
            removals: Vec::new(),
        }
    }

    /// Metadata served when a magnet for `info.info_hash` is added.
    pub fn register_metadata(&mut self, info: TorrentInfo) {
        self.known_metadata.insert(info.info_hash, info);
    }

    pub fn apply_settings(&mut self, settings: SessionSettings) {
        self.download_limit = settings.download_rate_limit;
        self.upload_limit = settings.upload_rate_limit;
        self.settings = Some(settings);
    }

    pub fn set_rate_limits(&mut self, download: Option<u64>, upload: Option<u64>) {
        self.download_limit = download;
        self.upload_limit = upload;
    }

    pub fn add_torrent(&mut self, params: AddTorrentParams) -> Result<InfoHash, EngineError> {
        let (info_hash, name, info) = match params.source {
            TransferSource::Magnet(uri) => {
                let link = MagnetParser::parse_magnet_link(&uri).map_err(|e| {
                    EngineError::AddFailed {
                        reason: e.to_string(),
                    }
                })?;
                let name = link
                    .display_name
                    .unwrap_or_else(|| link.info_hash.to_string());
                (link.info_hash, name, None)
            }
            TransferSource::Metadata(info) => (info.info_hash, info.name.clone(), Some(info)),
        };

        if self.transfers.iter().any(|t| t.info_hash == info_hash) {
            debug!("Transfer {} already present", info_hash);
            return Ok(info_hash);
        }

        let mut transfer = Transfer {
            info_hash,
            name,
            info: None,
            metadata_eta: self.config.metadata_delay,
            state: if info.is_some() {
                TransferState::CheckingFiles
            } else {
                TransferState::DownloadingMetadata
            },
            sequential: false,
            priorities: Vec::new(),
            deadlines: BTreeMap::new(),
            piece_bytes: Vec::new(),
            have: Vec::new(),
            rarity: Vec::new(),
            resume_bitfield: params.resume_data.as_deref().and_then(decode_resume),
            checking_ticks_left: 0,
            num_seeds: self.rng.random_range(5..200),
            num_peers: self.rng.random_range(1..50),
            download_rate: 0,
            all_time_download: 0,
            active_time: Duration::ZERO,
            finished_time: Duration::ZERO,
        };

        info!(
            "Added transfer {} ({}) saving to {}",
            transfer.name,
            info_hash,
            params.save_path.display()
        );

        let alerts = if let Some(info) = info {
            self.install_metadata(&mut transfer, info, false)
        } else {
            vec![]
        };

        self.transfers.push(transfer);
        for alert in alerts {
            self.emit(alert);
        }
        Ok(info_hash)
    }

    pub fn torrents(&self) -> Vec<TransferStatus> {
        self.transfers.iter().map(Transfer::status).collect()
    }

    pub fn status(&self, info_hash: InfoHash) -> Result<TransferStatus, EngineError> {
        Ok(self.transfer(info_hash)?.status())
    }

    pub fn torrent_info(&self, info_hash: InfoHash) -> Result<TorrentInfo, EngineError> {
        self.transfer(info_hash)?
            .info
            .clone()
            .ok_or(EngineError::MetadataUnavailable { info_hash })
    }

    pub fn remove_torrent(
        &mut self,
        info_hash: InfoHash,
        delete_files: bool,
    ) -> Result<(), EngineError> {
        let index = self
            .transfers
            .iter()
            .position(|t| t.info_hash == info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?;
        self.transfers.remove(index);
        self.removals.push((info_hash, delete_files));
        info!("Removed transfer {} (delete files: {})", info_hash, delete_files);
        self.emit(EngineAlert::new(info_hash, AlertKind::TorrentRemoved));
        Ok(())
    }

    pub fn set_sequential(&mut self, info_hash: InfoHash, sequential: bool) -> Result<(), EngineError> {
        self.transfer_mut(info_hash)?.sequential = sequential;
        Ok(())
    }

    pub fn prioritize_pieces(
        &mut self,
        info_hash: InfoHash,
        priorities: Vec<PiecePriority>,
    ) -> Result<(), EngineError> {
        let transfer = self.transfer_mut(info_hash)?;
        if transfer.info.is_none() {
            return Err(EngineError::MetadataUnavailable { info_hash });
        }
        if priorities.len() != transfer.have.len() {
            return Err(EngineError::InvalidPiece {
                info_hash,
                index: priorities.len() as u32,
            });
        }
        transfer.priorities = priorities;

        let transition = match transfer.state {
            TransferState::Finished if !transfer.all_wanted_done() => {
                Some(TransferState::Downloading)
            }
            TransferState::Downloading if transfer.all_wanted_done() => {
                Some(TransferState::Finished)
            }
            _ => None,
        };
        if let Some(next) = transition {
            let alerts = transition_to(transfer, next);
            for alert in alerts {
                self.emit(alert);
            }
        }
        Ok(())
    }

    pub fn piece_priorities(&self, info_hash: InfoHash) -> Result<Vec<PiecePriority>, EngineError> {
        Ok(self.transfer(info_hash)?.priorities.clone())
    }

    pub fn set_piece_deadline(
        &mut self,
        info_hash: InfoHash,
        piece: u32,
        deadline: Duration,
    ) -> Result<(), EngineError> {
        let transfer = self.transfer_mut(info_hash)?;
        let index = piece as usize;
        if index >= transfer.have.len() {
            return Err(EngineError::InvalidPiece {
                info_hash,
                index: piece,
            });
        }
        if !transfer.have[index] {
            transfer.deadlines.insert(piece, deadline);
        }
        Ok(())
    }

    pub fn have_piece(&self, info_hash: InfoHash, piece: u32) -> Result<bool, EngineError> {
        self.transfer(info_hash)?
            .have
            .get(piece as usize)
            .copied()
            .ok_or(EngineError::InvalidPiece {
                info_hash,
                index: piece,
            })
    }

    pub fn download_queue(&self, info_hash: InfoHash) -> Result<Vec<PartialPiece>, EngineError> {
        let transfer = self.transfer(info_hash)?;
        Ok((0..transfer.have.len())
            .filter(|&i| !transfer.have[i] && transfer.piece_bytes[i] > 0)
            .map(|i| {
                let size = transfer.piece_size(i);
                let done = transfer.piece_bytes[i];
                let blocks = (0..size.div_ceil(BLOCK_SIZE))
                    .map(|b| {
                        let start = b * BLOCK_SIZE;
                        let block_size = (size - start).min(BLOCK_SIZE);
                        BlockProgress {
                            bytes_downloaded: done.saturating_sub(start).min(block_size) as u32,
                            block_size: block_size as u32,
                        }
                    })
                    .collect();
                PartialPiece {
                    piece_index: i as u32,
                    blocks,
                }
            })
            .collect())
    }

    pub fn resume_data(&self, info_hash: InfoHash) -> Result<Vec<u8>, EngineError> {
        let transfer = self.transfer(info_hash)?;
        if transfer.info.is_none() {
            return Err(EngineError::MetadataUnavailable { info_hash });
        }
        Ok(encode_resume(&transfer.have))
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            settings: self.settings.clone(),
            download_rate_limit: self.download_limit,
            upload_rate_limit: self.upload_limit,
            removals: self.removals.clone(),
            sequential: self
                .transfers
                .iter()
                .filter(|t| t.sequential)
                .map(|t| t.info_hash)
                .collect(),
            deadlines: self
                .transfers
                .iter()
                .map(|t| (t.info_hash, t.deadlines.keys().copied().collect()))
                .collect(),
        }
    }

    /// Advances every transfer by `elapsed` of simulated time.
    pub fn tick(&mut self, elapsed: Duration) {
        let speed = match self.download_limit {
            Some(limit) => limit.min(self.config.simulated_download_speed),
            None => self.config.simulated_download_speed,
        };
        let budget = (speed as f64 * elapsed.as_secs_f64()) as u64;

        let mut alerts = Vec::new();
        let mut transfers = std::mem::take(&mut self.transfers);
        for transfer in &mut transfers {
            transfer.active_time += elapsed;
            match transfer.state {
                TransferState::DownloadingMetadata => {
                    transfer.metadata_eta = transfer.metadata_eta.saturating_sub(elapsed);
                    if transfer.metadata_eta.is_zero() {
                        let info = self.metadata_for(transfer);
                        alerts.extend(self.install_metadata(transfer, info, true));
                    }
                }
                TransferState::CheckingResumeData | TransferState::CheckingFiles => {
                    transfer.checking_ticks_left = transfer.checking_ticks_left.saturating_sub(1);
                    if transfer.checking_ticks_left == 0 {
                        let next = if transfer.all_wanted_done() {
                            TransferState::Finished
                        } else {
                            TransferState::Downloading
                        };
                        alerts.extend(transition_to(transfer, next));
                    }
                }
                TransferState::Downloading => {
                    let downloaded = download(transfer, budget);
                    transfer.all_time_download += downloaded;
                    transfer.download_rate =
                        (downloaded as f64 / elapsed.as_secs_f64().max(f64::EPSILON)) as u64;
                    if transfer.all_wanted_done() {
                        alerts.extend(transition_to(transfer, TransferState::Finished));
                    }
                }
                TransferState::Finished | TransferState::Seeding => {
                    transfer.download_rate = 0;
                    transfer.finished_time += elapsed;
                }
            }
        }
        self.transfers = transfers;

        for alert in alerts {
            self.emit(alert);
        }
    }

    fn metadata_for(&self, transfer: &Transfer) -> TorrentInfo {
        if let Some(info) = self.known_metadata.get(&transfer.info_hash) {
            return info.clone();
        }
        TorrentInfo::single_file(
            transfer.info_hash,
            &format!("{}.mkv", transfer.name),
            SYNTHETIC_PIECE_LENGTH,
            self.config.synthetic_payload_size,
        )
    }

    /// Installs metadata and returns the alerts it produces.
    fn install_metadata(
        &mut self,
        transfer: &mut Transfer,
        info: TorrentInfo,
        from_magnet: bool,
    ) -> Vec<EngineAlert> {
        let pieces = info.piece_count as usize;
        transfer.priorities = vec![PiecePriority::Normal; pieces];
        transfer.piece_bytes = vec![0; pieces];
        transfer.have = vec![false; pieces];
        transfer.rarity = (0..pieces as u32).collect();
        transfer.rarity.shuffle(&mut self.rng);
        transfer.info = Some(info);

        let mut alerts = Vec::new();
        if from_magnet {
            alerts.push(EngineAlert::new(transfer.info_hash, AlertKind::MetadataReceived));
        }

        let next = match transfer.resume_bitfield.take() {
            Some(bitfield) => {
                for i in 0..pieces {
                    if bitfield.get(i / 8).is_some_and(|byte| byte & (0x80 >> (i % 8)) != 0) {
                        transfer.have[i] = true;
                        transfer.piece_bytes[i] = transfer.piece_size(i);
                    }
                }
                transfer.checking_ticks_left = RESUME_CHECK_TICKS;
                TransferState::CheckingResumeData
            }
            None => TransferState::Downloading,
        };
        alerts.extend(transition_to(transfer, next));
        alerts
    }

    fn emit(&self, alert: EngineAlert) {
        // No subscribers is fine.
        let _ = self.alerts.send(alert);
    }

    fn transfer(&self, info_hash: InfoHash) -> Result<&Transfer, EngineError> {
        self.transfers
            .iter()
            .find(|t| t.info_hash == info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })
    }

    fn transfer_mut(&mut self, info_hash: InfoHash) -> Result<&mut Transfer, EngineError> {
        self.transfers
            .iter_mut()
            .find(|t| t.info_hash == info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })
    }
}

fn transition_to(transfer: &mut Transfer, next: TransferState) -> Vec<EngineAlert> {
    let previous = transfer.state;
    if previous == next {
        return Vec::new();
    }
    transfer.state = next;
    debug!("Transfer {} {:?} -> {:?}", transfer.info_hash, previous, next);

    let mut alerts = vec![EngineAlert::new(
        transfer.info_hash,
        AlertKind::StateChanged {
            previous,
            current: next,
        },
    )];
    if next == TransferState::Finished {
        alerts.push(EngineAlert::new(transfer.info_hash, AlertKind::TorrentFinished));
    }
    alerts
}

/// Spends `budget` bytes on the most urgent wanted pieces.
///
/// Deadline pieces are served one after another, earliest deadline first.
/// The rest of the budget is shared between up to `MAX_IN_FLIGHT` pieces
/// ordered by priority, then file order when sequential or rarity otherwise.
fn download(transfer: &mut Transfer, budget: u64) -> u64 {
    let mut remaining = budget;

    let mut urgent: Vec<(Duration, usize)> = transfer
        .deadlines
        .iter()
        .map(|(&piece, &deadline)| (deadline, piece as usize))
        .filter(|&(_, i)| !transfer.have[i] && transfer.wanted(i))
        .collect();
    urgent.sort();
    for (_, index) in urgent {
        if remaining == 0 {
            break;
        }
        remaining -= fill(transfer, index, remaining);
    }

    let mut order: Vec<usize> = (0..transfer.have.len())
        .filter(|&i| !transfer.have[i] && transfer.wanted(i))
        .collect();
    order.sort_by_key(|&i| {
        let secondary = if transfer.sequential {
            i as u32
        } else {
            transfer.rarity[i]
        };
        (std::cmp::Reverse(transfer.priorities[i]), secondary)
    });

    let mut cursor = 0;
    while remaining > 0 && cursor < order.len() {
        let active: Vec<usize> = order[cursor..]
            .iter()
            .copied()
            .filter(|&i| !transfer.have[i])
            .take(MAX_IN_FLIGHT)
            .collect();
        if active.is_empty() {
            break;
        }

        let share = (remaining / active.len() as u64).max(1);
        for index in active {
            remaining -= fill(transfer, index, share.min(remaining));
            if remaining == 0 {
                break;
            }
        }

        while cursor < order.len() && transfer.have[order[cursor]] {
            cursor += 1;
        }
    }
    budget - remaining
}

/// Adds up to `amount` bytes to a piece, returning the bytes used.
fn fill(transfer: &mut Transfer, index: usize, amount: u64) -> u64 {
    let size = transfer.piece_size(index);
    let take = amount.min(size - transfer.piece_bytes[index]);
    transfer.piece_bytes[index] += take;
    if transfer.piece_bytes[index] == size {
        transfer.have[index] = true;
        transfer.deadlines.remove(&(index as u32));
    }
    take
}

fn encode_resume(have: &[bool]) -> Vec<u8> {
    let mut data = RESUME_MAGIC.to_vec();
    let mut bitfield = vec![0u8; have.len().div_ceil(8)];
    for (i, _) in have.iter().enumerate().filter(|(_, have)| **have) {
        bitfield[i / 8] |= 0x80 >> (i % 8);
    }
    data.extend_from_slice(&bitfield);
    data
}

fn decode_resume(data: &[u8]) -> Option<Vec<u8>> {
    data.strip_prefix(RESUME_MAGIC.as_slice()).map(<[u8]>::to_vec)
}
