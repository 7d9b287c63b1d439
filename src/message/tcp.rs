use std::collections::HashMap;
use std::io::{self, prelude::*};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use super::backoff::{ExponentialBackoff, Retry};
use super::comm::{Communicator, Mailbox};
use super::util;

const RETRY_WAIT: Duration = Duration::from_millis(10);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(1000);
const MAX_CONNECT_ATTEMPTS: usize = 40;

type Envelope = (usize, u32, Vec<u8>);
type Sender = crossbeam_channel::Sender<Envelope>;
type Receiver = crossbeam_channel::Receiver<Envelope>;

/// A communicator whose peers are reached over TCP. Every rank listens on its
/// own address; outbound connections are opened lazily, once per peer, by a
/// dedicated sender thread, so `send` never blocks. Each message travels in
/// a frame `[source: u64][tag: u32][length: u64][bytes]`, and since a pair
/// of ranks shares a single stream, messages between them arrive in the
/// order they were sent.
///
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    send_sink: Option<Sender>,
    send_thread: Option<JoinHandle<()>>,
    recv_sink: Sender,
    recv_src: Receiver,
    mailbox: Mailbox,
}

impl TcpCommunicator {
    /// Create a communicator for the given rank, which accepts connections on
    /// an already-bound listener. `peers[rank]` should be the address of that
    /// listener.
    ///
    pub fn bind(rank: usize, listener: TcpListener, peers: Vec<SocketAddr>) -> Self {
        assert!(rank < peers.len(), "rank {} is not among {} peers", rank, peers.len());

        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        let (send_sink, send_src) = crossbeam_channel::unbounded();

        Self::start_listener(listener, recv_sink.clone());

        Self {
            rank,
            num_peers: peers.len(),
            send_thread: Some(Self::start_sender(rank, peers, send_src)),
            send_sink: Some(send_sink),
            recv_sink,
            recv_src,
            mailbox: Mailbox::new(),
        }
    }

    /// Bind a listener to this rank's address and create the communicator.
    ///
    pub fn connect(rank: usize, peers: Vec<SocketAddr>) -> io::Result<Self> {
        let listener = TcpListener::bind(peers[rank])?;
        Ok(Self::bind(rank, listener, peers))
    }

    fn start_listener(listener: TcpListener, recv_sink: Sender) -> JoinHandle<()> {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        Self::handle_connection(stream, recv_sink.clone());
                    }
                    Err(e) => warn!("failed to accept connection: {}", e),
                }
            }
        })
    }

    fn handle_connection(mut stream: TcpStream, recv_sink: Sender) -> JoinHandle<()> {
        let remote = stream.peer_addr().ok();
        info!("receiving connection from {:?}", remote);

        thread::spawn(move || loop {
            let frame = util::read_u64(&mut stream).and_then(|source| {
                let tag = util::read_u32(&mut stream)?;
                let size = util::read_u64(&mut stream)?;
                let bytes = util::read_bytes_vec(&mut stream, size as usize)?;
                Ok((source as usize, tag, bytes))
            });
            match frame {
                Ok(envelope) => {
                    if recv_sink.send(envelope).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::UnexpectedEof {
                        error!("connection from {:?} failed: {}", remote, e);
                    }
                    return;
                }
            }
        })
    }

    fn start_sender(rank: usize, peers: Vec<SocketAddr>, send_src: Receiver) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut table: HashMap<usize, TcpStream> = HashMap::new();

            for (dest, tag, message) in send_src {
                loop {
                    let stream = table
                        .entry(dest)
                        .or_insert_with(|| Self::connect_with_retry(peers[dest]));
                    let mut frame = Vec::with_capacity(20 + message.len());
                    frame.extend((rank as u64).to_le_bytes());
                    frame.extend(tag.to_le_bytes());
                    frame.extend((message.len() as u64).to_le_bytes());
                    frame.extend(&message);

                    match stream.write_all(&frame) {
                        Ok(()) => break,
                        Err(e) => {
                            error!("failed to send message to {}: {}", peers[dest], e);
                            table.remove(&dest);
                        }
                    }
                }
            }
        })
    }

    fn connect_with_retry(addr: SocketAddr) -> TcpStream {
        let result = ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2)
            .take(MAX_CONNECT_ATTEMPTS)
            .retry(
                || TcpStream::connect(addr),
                |e, delay| {
                    warn!("connect to {} failed ({}); retrying in {:?}", addr, e, delay);
                    thread::sleep(delay)
                },
            );
        match result {
            Some(Ok(stream)) => {
                info!("connected to {}", addr);
                stream
            }
            Some(Err(e)) => panic!("giving up connecting to {}: {}", addr, e),
            None => panic!("no connection attempts were made to {}", addr),
        }
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    fn send(&self, rank: usize, tag: u32, message: Vec<u8>) {
        if rank == self.rank {
            self.recv_sink
                .send((rank, tag, message))
                .unwrap_or_else(|_| panic!("inbound channel of rank {} disconnected", self.rank))
        } else if let Some(sink) = &self.send_sink {
            sink.send((rank, tag, message))
                .unwrap_or_else(|_| panic!("sender thread of rank {} has stopped", self.rank))
        }
    }

    fn recv(&self, rank: usize, tag: u32) -> Vec<u8> {
        self.mailbox.recv(rank, tag, || {
            self.recv_src
                .recv()
                .unwrap_or_else(|_| panic!("inbound channel of rank {} disconnected", self.rank))
        })
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        self.send_sink.take();

        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                error!("sender thread of rank {} panicked", self.rank)
            }
        }
    }
}
