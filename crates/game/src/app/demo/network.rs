use std::f64::consts::TAU;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use iso_engine::Position;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RemotePlayer {
    pub(crate) name: String,
    pub(crate) x: f64,
    pub(crate) y: f64,
}

impl RemotePlayer {
    pub(crate) fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Full roster broadcast; players absent from it have left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct WorldSnapshot {
    pub(crate) tick: u64,
    pub(crate) players: Vec<RemotePlayer>,
}

pub(crate) fn decode_snapshot(
    raw: &str,
) -> Result<WorldSnapshot, serde_path_to_error::Error<serde_json::Error>> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FeedConfig {
    pub(crate) bots: usize,
    pub(crate) center: Position,
    pub(crate) radius: f64,
    pub(crate) period: Duration,
    /// Ticks per full lap.
    pub(crate) lap_ticks: u64,
    /// Every `presence_cycle` ticks one bot drops out for a while.
    pub(crate) presence_cycle: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            bots: 5,
            center: Position::default(),
            radius: 160.0,
            period: Duration::from_millis(100),
            lap_ticks: 240,
            presence_cycle: 60,
        }
    }
}

/// Roster at `tick`. Bots walk a circle each, phase shifted; bot `k` is away
/// during every cycle where `cycle % bots == k`.
pub(crate) fn bot_snapshot(config: &FeedConfig, tick: u64) -> WorldSnapshot {
    let bots = config.bots.max(1) as u64;
    let lap_ticks = config.lap_ticks.max(1);
    let away = (tick / config.presence_cycle.max(1)) % bots;
    let players = (0..bots)
        .filter(|&bot| bot != away)
        .map(|bot| {
            let phase = bot as f64 / bots as f64 + (tick % lap_ticks) as f64 / lap_ticks as f64;
            let angle = phase * TAU;
            let radius = config.radius * (0.6 + 0.4 * (bot % 2) as f64);
            RemotePlayer {
                name: format!("bot-{bot}"),
                x: (config.center.x + radius * angle.cos()).round(),
                y: (config.center.y + radius * angle.sin()).round(),
            }
        })
        .collect();
    WorldSnapshot { tick, players }
}

/// Stands in for a game server: a named thread that encodes rosters as JSON
/// lines into a channel.
pub(crate) struct SimulatedFeed {
    receiver: Receiver<String>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedFeed {
    pub(crate) fn spawn(config: FeedConfig) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("net_feed".to_string())
            .spawn(move || {
                let mut tick = 0u64;
                while !thread_stop.load(Ordering::Relaxed) {
                    let snapshot = bot_snapshot(&config, tick);
                    match serde_json::to_string(&snapshot) {
                        Ok(raw) => {
                            if sender.send(raw).is_err() {
                                break;
                            }
                        }
                        Err(error) => warn!(error = %error, "feed_encode_failed"),
                    }
                    tick = tick.wrapping_add(1);
                    thread::sleep(config.period);
                }
                debug!(tick, "feed_thread_exited");
            })?;
        info!(bots = config.bots, period_ms = config.period.as_millis() as u64, "feed_started");
        Ok(Self {
            receiver,
            stop,
            handle: Some(handle),
        })
    }

    /// Everything received since the last call, oldest first.
    pub(crate) fn drain(&self) -> Vec<String> {
        self.receiver.try_iter().collect()
    }

    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("feed_thread_panicked");
            }
        }
    }
}

impl Drop for SimulatedFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn one_bot_is_away_per_cycle() {
        let config = FeedConfig::default();
        let first = bot_snapshot(&config, 0);
        assert_eq!(first.players.len(), config.bots - 1);
        assert!(first.players.iter().all(|player| player.name != "bot-0"));

        let later = bot_snapshot(&config, config.presence_cycle);
        assert!(later.players.iter().any(|player| player.name == "bot-0"));
        assert!(later.players.iter().all(|player| player.name != "bot-1"));
    }

    #[test]
    fn bots_stay_on_their_circle() {
        let config = FeedConfig {
            center: Position::new(100.0, -50.0),
            ..FeedConfig::default()
        };
        for tick in [0, 17, 133] {
            for player in bot_snapshot(&config, tick).players {
                let distance = player.position().distance_to(config.center);
                assert!(distance <= config.radius + 1.0, "{distance}");
                assert!(distance >= config.radius * 0.6 - 1.0, "{distance}");
            }
        }
    }

    #[test]
    fn decode_reports_the_failing_field() {
        let error = decode_snapshot(r#"{"tick": 3, "players": [{"name": "a", "x": 1.0, "y": "up"}]}"#)
            .expect_err("bad y");
        assert_eq!(error.path().to_string(), "players[0].y");

        let snapshot = decode_snapshot(r#"{"tick": 3, "players": []}"#).expect("empty roster");
        assert_eq!(snapshot, WorldSnapshot { tick: 3, players: Vec::new() });
    }

    #[test]
    fn feed_delivers_snapshots_and_stops() {
        let mut feed = SimulatedFeed::spawn(FeedConfig {
            period: Duration::from_millis(1),
            ..FeedConfig::default()
        })
        .expect("spawn");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = Vec::new();
        while received.is_empty() && Instant::now() < deadline {
            received.extend(feed.drain());
            thread::sleep(Duration::from_millis(2));
        }
        feed.stop();

        let snapshot = decode_snapshot(&received[0]).expect("decode");
        assert_eq!(snapshot.tick, 0);
        assert_eq!(snapshot.players.len(), 4);
    }
}
