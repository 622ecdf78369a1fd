//! Line-delimited JSON requests from the command-line client to a running
//! peer. Each connection carries one request and one response.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    spawn,
};

use crate::{
    error::{Error, Result},
    format::{format_path, format_size},
    peer::Peer,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Backup {
        path: PathBuf,
        replication_degree: u8,
    },
    Restore {
        path: PathBuf,
    },
    Delete {
        path: PathBuf,
    },
    Reclaim {
        capacity: u64,
    },
    State {
        json: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok { output: String },
    Error { message: String },
}

pub async fn serve(peer: Arc<Peer>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let peer = peer.clone();
        spawn(async move {
            if let Err(err) = handle_connection(&peer, stream).await {
                warn!("control connection from {addr} failed: {err}");
            }
        });
    }
}

async fn handle_connection(peer: &Peer, stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;

    let response = match serde_json::from_str::<Request>(&line) {
        Ok(request) => {
            debug!("control request {request:?}");
            match execute(peer, request).await {
                Ok(output) => Response::Ok { output },
                Err(err) => Response::Error {
                    message: err.to_string(),
                },
            }
        }
        Err(err) => Response::Error {
            message: format!("invalid request: {err}"),
        },
    };

    let mut bytes = serde_json::to_vec(&response)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.shutdown().await?;
    Ok(())
}

async fn execute(peer: &Peer, request: Request) -> Result<String> {
    let output = match request {
        Request::Backup {
            path,
            replication_degree,
        } => {
            let report = peer.backup(&path, replication_degree).await?;
            let under_replicated = report.under_replicated().count();
            let mut output = format!(
                "backed up {} as {} ({} chunks)",
                format_path(&report.path),
                report.file_id,
                report.chunks.len()
            );
            if under_replicated > 0 {
                output.push_str(&format!(
                    "\n{under_replicated} chunks did not reach replication degree {replication_degree}"
                ));
            }
            output
        }
        Request::Restore { path } => {
            let restored = peer.restore(&path).await?;
            format!(
                "restored {} to {} ({})",
                format_path(&restored.path),
                format_path(&restored.output),
                format_size(restored.data.len() as u64)
            )
        }
        Request::Delete { path } => {
            peer.delete(&path).await?;
            format!("deleted {}", format_path(&path))
        }
        Request::Reclaim { capacity } => {
            let report = peer.reclaim(capacity).await?;
            format!(
                "evicted {} chunks ({}), capacity is now {}",
                report.evicted.len(),
                format_size(report.freed),
                format_size(report.capacity)
            )
        }
        Request::State { json } => {
            let snapshot = peer.state().await;
            if json {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                snapshot.to_string()
            }
        }
    };

    Ok(output)
}

pub async fn request(addr: SocketAddr, request: &Request) -> Result<String> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|err| Error::Control(format!("cannot reach peer at {addr}: {err}")))?;
    let (reader, mut writer) = stream.into_split();

    let mut bytes = serde_json::to_vec(request)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;

    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    match serde_json::from_str(&line)? {
        Response::Ok { output } => Ok(output),
        Response::Error { message } => Err(Error::Control(message)),
    }
}
