use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use tokio::fs;

use crate::{
    control::{self, Request},
    error::{Error, Result},
};

use super::{
    args::{BackupArgs, ClientArgs, DeleteArgs, ReclaimArgs, RestoreArgs, StateArgs},
    get_env_var,
};

const ENV_VAR_PEER: &str = "PEERSTASH_PEER";

pub async fn backup(args: BackupArgs) -> Result<()> {
    let request = Request::Backup {
        path: absolute_path(&args.path).await?,
        replication_degree: args.replication_degree,
    };
    send(&args.client, &request).await
}

pub async fn restore(args: RestoreArgs) -> Result<()> {
    let request = Request::Restore {
        path: absolute_path(&args.path).await?,
    };
    send(&args.client, &request).await
}

pub async fn delete(args: DeleteArgs) -> Result<()> {
    let request = Request::Delete {
        path: absolute_path(&args.path).await?,
    };
    send(&args.client, &request).await
}

pub async fn reclaim(args: ReclaimArgs) -> Result<()> {
    let request = Request::Reclaim {
        capacity: args.capacity,
    };
    send(&args.client, &request).await
}

pub async fn state(args: StateArgs) -> Result<()> {
    let request = Request::State { json: args.json };
    send(&args.client, &request).await
}

async fn send(args: &ClientArgs, request: &Request) -> Result<()> {
    let addr = peer_addr(args)?;
    let output = control::request(addr, request).await?;
    println!("{output}");
    Ok(())
}

fn peer_addr(args: &ClientArgs) -> Result<SocketAddr> {
    if let Some(addr) = args.peer {
        return Ok(addr);
    }

    let value = get_env_var(ENV_VAR_PEER)?.ok_or_else(|| {
        Error::Cli(format!("Either `--peer` or `{ENV_VAR_PEER}` must be set"))
    })?;
    value
        .parse()
        .map_err(|_| Error::Cli(format!("`{ENV_VAR_PEER}` is not a socket address: {value}")))
}

/// The peer resolves paths relative to its own working directory, so
/// requests always carry absolute paths. Files deleted since their backup
/// are resolved against the current directory.
async fn absolute_path(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path).await {
        Ok(path) => Ok(path),
        Err(_) => Ok(env::current_dir()?.join(path)),
    }
}
