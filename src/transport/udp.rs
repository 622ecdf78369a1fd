use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    spawn,
    sync::Mutex,
    task::JoinHandle,
};

use crate::{
    error::{Error, Result},
    message::peek_sender,
    peer::PeerId,
};

use super::{Channel, Intake, Transport};

const MAX_DATAGRAM_SIZE: usize = 65_507;
const MAX_FRAME_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAddrs {
    pub control: SocketAddrV4,
    pub backup: SocketAddrV4,
    pub restore: SocketAddrV4,
}

impl GroupAddrs {
    pub fn get(&self, channel: Channel) -> SocketAddrV4 {
        match channel {
            Channel::Control => self.control,
            Channel::Backup => self.backup,
            Channel::Restore => self.restore,
        }
    }
}

impl Default for GroupAddrs {
    fn default() -> Self {
        GroupAddrs {
            control: SocketAddrV4::new(Ipv4Addr::new(239, 255, 7, 1), 7001),
            backup: SocketAddrV4::new(Ipv4Addr::new(239, 255, 7, 2), 7002),
            restore: SocketAddrV4::new(Ipv4Addr::new(239, 255, 7, 3), 7003),
        }
    }
}

type Directory = Arc<DashMap<PeerId, SocketAddr>>;

/// The multicast socket's port doubles as the direct TCP listener's port.
#[derive(Debug)]
pub struct UdpTransport {
    groups: GroupAddrs,
    outbound: UdpSocket,
    directory: Directory,
    streams: DashMap<PeerId, Arc<Mutex<TcpStream>>>,
}

#[derive(Debug)]
pub struct UdpListener {
    sockets: Vec<(Channel, UdpSocket)>,
    direct: TcpListener,
    directory: Directory,
}

impl UdpTransport {
    pub async fn bind(groups: GroupAddrs) -> Result<(Arc<UdpTransport>, UdpListener)> {
        let outbound = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        outbound.set_multicast_loop_v4(true)?;
        let port = outbound.local_addr()?.port();
        let direct = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;

        let sockets = Channel::ALL
            .into_iter()
            .map(|channel| Ok((channel, group_socket(groups.get(channel))?)))
            .collect::<Result<Vec<_>>>()?;

        let directory = Directory::default();
        let transport = Arc::new(UdpTransport {
            groups,
            outbound,
            directory: directory.clone(),
            streams: DashMap::new(),
        });
        let listener = UdpListener {
            sockets,
            direct,
            directory,
        };

        debug!("transport bound on port {port}");
        Ok((transport, listener))
    }

    async fn stream(&self, peer: PeerId) -> Result<Arc<Mutex<TcpStream>>> {
        if let Some(stream) = self.streams.get(&peer) {
            return Ok(stream.clone());
        }

        let addr = self
            .directory
            .get(&peer)
            .map(|entry| *entry.value())
            .ok_or(Error::UnknownPeer(peer))?;
        let stream = Arc::new(Mutex::new(TcpStream::connect(addr).await?));
        self.streams.insert(peer, stream.clone());
        Ok(stream)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, channel: Channel, bytes: Vec<u8>) -> Result<()> {
        self.outbound
            .send_to(&bytes, self.groups.get(channel))
            .await?;
        Ok(())
    }

    async fn send_to(&self, peer: PeerId, bytes: Vec<u8>) -> Result<()> {
        let stream = self.stream(peer).await?;
        let result = write_frame(&mut *stream.lock().await, &bytes).await;
        if result.is_err() {
            // Reconnect on the next send.
            self.streams.remove(&peer);
        }
        result
    }
}

impl UdpListener {
    pub fn start(self, intake: Intake) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![];
        for (channel, socket) in self.sockets {
            let intake = intake.clone();
            let directory = self.directory.clone();
            tasks.push(spawn(receive_datagrams(channel, socket, directory, intake)));
        }
        tasks.push(spawn(accept_streams(self.direct, intake)));
        tasks
    }
}

fn group_socket(group: SocketAddrV4) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, group.port()));
    socket.bind(&addr.into())?;
    socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

async fn receive_datagrams(
    channel: Channel,
    socket: UdpSocket,
    directory: Directory,
    intake: Intake,
) {
    let mut buffer = vec![0; MAX_DATAGRAM_SIZE];
    loop {
        match socket.recv_from(&mut buffer).await {
            Ok((len, source)) => {
                let bytes = buffer[..len].to_vec();
                if let Some(sender) = peek_sender(&bytes) {
                    directory.insert(sender, source);
                }
                if intake.send(bytes).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("receive on {channel} channel failed: {err}"),
        }
    }
}

async fn accept_streams(listener: TcpListener, intake: Intake) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("direct stream opened by {addr}");
                spawn(receive_frames(stream, intake.clone()));
            }
            Err(err) => warn!("direct accept failed: {err}"),
        }
    }
}

async fn receive_frames(mut stream: TcpStream, intake: Intake) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(bytes)) => {
                if intake.send(bytes).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("direct stream dropped: {err}");
                break;
            }
        }
    }
}

async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(Error::other)?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>> {
    let len = match stream.read_u32().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > MAX_FRAME_SIZE {
        return Err(Error::MalformedMessage(format!(
            "direct frame of {len} bytes is too large"
        )));
    }

    let mut bytes = vec![0; len];
    stream.read_exact(&mut bytes).await?;
    Ok(Some(bytes))
}
