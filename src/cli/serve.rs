use std::{path::PathBuf, sync::Arc};

use log::info;
use tokio::{net::TcpListener, select, signal};

use crate::{
    config::PeerConfig,
    control,
    error::{Error, Result},
    message::{BASE_VERSION, ENHANCED_VERSION},
    peer::Peer,
    transport::{GroupAddrs, UdpTransport},
};

use super::{args::ServeArgs, get_env_var};

const ENV_VAR_ROOT: &str = "PEERSTASH_ROOT";

pub async fn main(args: ServeArgs) -> Result<()> {
    let root = match args.root {
        Some(root) => root,
        None => get_env_var(ENV_VAR_ROOT)?.map(PathBuf::from).ok_or_else(|| {
            Error::Cli(format!("Either `--root` or `{ENV_VAR_ROOT}` must be set"))
        })?,
    };

    let mut config = PeerConfig::new(args.id, &root);
    config.version = if args.enhanced {
        ENHANCED_VERSION
    } else {
        BASE_VERSION
    }
    .to_owned();
    config.capacity = args.capacity;
    config.chunk_size = args.chunk_size;
    config.workers = args.tasks;
    config.backup_attempts = args.backup_attempts;
    config.restore_attempts = args.restore_attempts;
    if let Some(interval) = args.retry_interval {
        config.retry_interval = interval;
    }
    if let Some(delay) = args.repair_delay {
        config.repair_delay = delay;
    }
    if let Some(delay) = args.reply_delay {
        config.reply_delay = delay;
    }
    if let Some(grace) = args.delete_grace {
        config.delete_grace = grace;
    }
    if let Some(interval) = args.alive_interval {
        config.alive_interval = Some(interval);
    }

    let defaults = GroupAddrs::default();
    let groups = GroupAddrs {
        control: args.control_group.unwrap_or(defaults.control),
        backup: args.backup_group.unwrap_or(defaults.backup),
        restore: args.restore_group.unwrap_or(defaults.restore),
    };

    let (transport, listener) = UdpTransport::bind(groups).await?;
    let peer = Arc::new(Peer::open(config, transport).await?);
    let receivers = listener.start(peer.intake());

    let control_listener = TcpListener::bind(args.control).await?;
    info!("accepting commands on {}", args.control);

    let result = select! {
        result = control::serve(peer.clone(), control_listener) => result,
        result = signal::ctrl_c() => {
            info!("shutting down");
            result.map_err(Error::from)
        }
    };

    for receiver in receivers {
        receiver.abort();
    }
    result
}
