use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionTuning;

/// Server configuration; every knob is also settable via environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "playnine-server", version, about = "Play Nine realtime table server")]
pub struct Config {
    /// Interface to bind.
    #[arg(long, env = "PLAY9_LISTEN_ADDR", default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    #[arg(long, env = "PLAY9_LISTEN_PORT", default_value_t = 9999)]
    pub listen_port: u16,

    /// Directory for per-table JSON snapshots.
    #[arg(long, env = "PLAY9_DATA_DIR", default_value = "./play9-data")]
    pub data_dir: PathBuf,

    /// Directory holding the lobby/table/player pages.
    #[arg(long, env = "PLAY9_STATIC_DIR", default_value = "./static")]
    pub static_dir: PathBuf,

    /// Seconds before the current player's turn is played for them.
    #[arg(long, env = "PLAY9_IDLE_TURN_SECS", default_value_t = 60)]
    pub idle_turn_secs: u64,

    /// Seconds a restart vote stays open.
    #[arg(long, env = "PLAY9_RESTART_VOTE_SECS", default_value_t = 30)]
    pub restart_vote_secs: u64,

    /// Seconds of silence before a table nobody is seated at is torn down.
    #[arg(long, env = "PLAY9_SWEEP_SECS", default_value_t = 300)]
    pub sweep_secs: u64,
}

impl Config {
    pub fn session_tuning(&self) -> SessionTuning {
        SessionTuning {
            idle_turn: Duration::from_secs(self.idle_turn_secs),
            restart_vote: Duration::from_secs(self.restart_vote_secs),
            sweep: Duration::from_secs(self.sweep_secs),
        }
    }
}
