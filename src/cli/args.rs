use std::{
    net::{SocketAddr, SocketAddrV4},
    ops::RangeInclusive,
    path::PathBuf,
    time::Duration,
};

use clap::{ArgAction, Args};
use concolor_clap::ColorChoice;
use humantime::parse_duration;

use crate::{
    config::{
        DEFAULT_BACKUP_ATTEMPTS, DEFAULT_CAPACITY, DEFAULT_RESTORE_ATTEMPTS, DEFAULT_WORKER_COUNT,
    },
    message::{MAX_CHUNK_SIZE, MAX_REPLICATION_DEGREE},
    peer::PeerId,
};

use super::parse::{parse_nonzero_duration, parse_range_inclusive, parse_size};

const REPLICATION_DEGREE_RANGE: RangeInclusive<u8> = 1..=MAX_REPLICATION_DEGREE;
const DEFAULT_REPLICATION_DEGREE: u8 = 2;

const CHUNK_SIZE_RANGE: RangeInclusive<usize> = 1..=MAX_CHUNK_SIZE;

const TASK_COUNT_RANGE: RangeInclusive<usize> = 1..=1024;

const ATTEMPT_COUNT_RANGE: RangeInclusive<u32> = 1..=16;

fn parse_replication_degree(s: &str) -> Result<u8, String> {
    parse_range_inclusive(s, REPLICATION_DEGREE_RANGE)
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    parse_range_inclusive(s, CHUNK_SIZE_RANGE)
}

fn parse_task_count(s: &str) -> Result<usize, String> {
    parse_range_inclusive(s, TASK_COUNT_RANGE)
}

fn parse_attempt_count(s: &str) -> Result<u32, String> {
    parse_range_inclusive(s, ATTEMPT_COUNT_RANGE)
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Identifier of this peer within the group
    #[arg(short = 'i', long, value_name = "ID")]
    pub id: PeerId,

    /// Directory holding the state of every local peer (or `PEERSTASH_ROOT`)
    #[arg(short = 'd', long, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Address to accept client commands on
    #[arg(short = 'C', long, value_name = "ADDR")]
    pub control: SocketAddr,

    /// Speak the enhanced protocol (direct restore replies)
    #[arg(short = 'e', long, default_value_t = false)]
    pub enhanced: bool,

    /// Storage budget for chunks of other peers, on first run
    #[arg(
        short = 's',
        long,
        value_name = "SIZE",
        default_value_t = DEFAULT_CAPACITY,
        value_parser = parse_size,
    )]
    pub capacity: u64,

    /// Size of the chunks files are split into
    #[arg(
        short = 'b',
        long,
        value_name = "NUM",
        default_value_t = MAX_CHUNK_SIZE,
        value_parser = parse_chunk_size,
    )]
    pub chunk_size: usize,

    /// Number of concurrent protocol handlers
    #[arg(
        short = 'j',
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_WORKER_COUNT,
        value_parser = parse_task_count,
    )]
    pub tasks: usize,

    /// PUTCHUNK rounds per chunk before giving up
    #[arg(
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_BACKUP_ATTEMPTS,
        value_parser = parse_attempt_count,
    )]
    pub backup_attempts: u32,

    /// GETCHUNK rounds per restore before giving up
    #[arg(
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_RESTORE_ATTEMPTS,
        value_parser = parse_attempt_count,
    )]
    pub restore_attempts: u32,

    /// Wait after the first round of a protocol; doubles every round
    #[arg(long, value_name = "DURATION", value_parser = parse_nonzero_duration)]
    pub retry_interval: Option<Duration>,

    /// Longest random wait before re-sending an under-replicated chunk
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub repair_delay: Option<Duration>,

    /// Longest random wait before answering a chunk request on the group
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub reply_delay: Option<Duration>,

    /// How long chunks of a deleted file keep being refused
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub delete_grace: Option<Duration>,

    /// Period of ALIVE announcements
    #[arg(long, value_name = "DURATION", value_parser = parse_nonzero_duration)]
    pub alive_interval: Option<Duration>,

    /// Multicast group of the control channel
    #[arg(long, value_name = "ADDR")]
    pub control_group: Option<SocketAddrV4>,

    /// Multicast group of the backup channel
    #[arg(long, value_name = "ADDR")]
    pub backup_group: Option<SocketAddrV4>,

    /// Multicast group of the restore channel
    #[arg(long, value_name = "ADDR")]
    pub restore_group: Option<SocketAddrV4>,

    #[command(flatten)]
    pub logger: LoggerArgs,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// File to back up
    pub path: PathBuf,

    /// Number of peers that should hold each chunk (1-9)
    #[arg(
        short = 'r',
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_REPLICATION_DEGREE,
        value_parser = parse_replication_degree,
    )]
    pub replication_degree: u8,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backed-up file to restore
    pub path: PathBuf,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Backed-up file to delete from the group
    pub path: PathBuf,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct ReclaimArgs {
    /// New storage budget for chunks of other peers
    #[arg(value_name = "SIZE", value_parser = parse_size)]
    pub capacity: u64,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    /// Print the state as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Control address of the peer (or `PEERSTASH_PEER`)
    #[arg(short = 'p', long, value_name = "ADDR")]
    pub peer: Option<SocketAddr>,

    #[command(flatten)]
    pub logger: LoggerArgs,
}

#[derive(Args, Debug)]
pub struct LoggerArgs {
    /// When to use color in output
    #[arg(short, long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Print more output
    #[arg(short, long, action = ArgAction::Count, group = "verbosity")]
    pub verbose: u8,

    /// Print less output
    #[arg(short, long, action = ArgAction::Count, group = "verbosity")]
    pub quiet: u8,
}
