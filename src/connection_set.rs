// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! The process-wide-per-endpoint set of live peer sockets, with the
//! round-robin cursor shared by PUSH and REQ.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use mio::net::TcpStream;

use crate::config::Config;
use crate::global::BackOff;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub usize);

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A peer's socket, shared between the worker thread that reads frames off
/// it (registered with that worker's `mio::Poll`) and whichever thread is
/// currently sending to it. `mio::net::TcpStream` has no `try_clone`, so
/// the single handle is wrapped in a `Mutex` instead of duplicated; reads
/// and writes are both brief enough that this never becomes a bottleneck.
pub type PeerSocket = Mutex<TcpStream>;

struct Peer {
    id: PeerId,
    stream: Arc<PeerSocket>,
}

struct Inner {
    peers: Vec<Peer>,
    cursor: Option<usize>,
    next_id: usize,
}

/// Tracks every live peer socket owned by one endpoint's transport and
/// hands out round-robin picks. All mutation happens under one `Mutex`
/// (the design's "binary semaphore" over the connection set); the actual
/// socket write for broadcast/unicast sends locks only the one peer it
/// targets, so concurrent senders to different peers don't block on each
/// other.
pub struct ConnectionSet {
    inner: Mutex<Inner>,
    backoff_initial: std::time::Duration,
    backoff_multiplier: f64,
    backoff_cap: std::time::Duration,
    round_robin_wait_cap_hits: u32,
}

impl ConnectionSet {
    pub fn new(config: &Config) -> ConnectionSet {
        ConnectionSet {
            inner: Mutex::new(Inner {
                peers: Vec::new(),
                cursor: None,
                next_id: 0,
            }),
            backoff_initial: config.backoff_initial,
            backoff_multiplier: config.backoff_multiplier,
            backoff_cap: config.backoff_cap,
            round_robin_wait_cap_hits: config.round_robin_wait_cap_hits,
        }
    }

    pub fn add(&self, stream: TcpStream) -> (PeerId, Arc<PeerSocket>) {
        let mut inner = self.inner.lock().unwrap();
        let id = PeerId(inner.next_id);
        inner.next_id += 1;
        let socket = Arc::new(Mutex::new(stream));
        inner.peers.push(Peer {
            id,
            stream: socket.clone(),
        });
        (id, socket)
    }

    pub fn remove(&self, id: PeerId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.peers.iter().position(|p| p.id == id) {
            inner.peers.remove(pos);
            // Keep the cursor pointing at the same *un-visited* peer it
            // pointed at before the removal, so no live peer is skipped
            // more than once.
            if let Some(cursor) = inner.cursor {
                if pos <= cursor {
                    inner.cursor = Some(cursor.saturating_sub(1));
                }
            }
        }
    }

    pub fn get(&self, id: PeerId) -> Option<Arc<PeerSocket>> {
        let inner = self.inner.lock().unwrap();
        inner.peers.iter().find(|p| p.id == id).map(|p| p.stream.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks the first live peer strictly after the cursor, wrapping
    /// around, and advances the cursor to that peer.
    pub fn pick_round_robin(&self) -> Option<(PeerId, Arc<PeerSocket>)> {
        let mut inner = self.inner.lock().unwrap();
        if inner.peers.is_empty() {
            return None;
        }

        let len = inner.peers.len();
        let next_idx = match inner.cursor {
            Some(cursor) => (cursor + 1) % len,
            None => 0,
        };
        inner.cursor = Some(next_idx);

        let peer = &inner.peers[next_idx];
        Some((peer.id, peer.stream.clone()))
    }

    /// Picks a round-robin peer, waiting with the configured back-off if
    /// none is available. Returns `None` once the back-off has hit its
    /// cap `round_robin_wait_cap_hits` times.
    pub fn wait_for_round_robin_peer(&self) -> Option<(PeerId, Arc<PeerSocket>)> {
        if let Some(peer) = self.pick_round_robin() {
            return Some(peer);
        }

        log::debug!("no peer available for round-robin send, waiting");

        let mut backoff = BackOff::new(
            self.backoff_initial,
            self.backoff_multiplier,
            self.backoff_cap,
            self.round_robin_wait_cap_hits,
        );

        loop {
            let delay = match backoff.next_delay() {
                Some(delay) => delay,
                None => {
                    log::warn!("gave up waiting for a round-robin peer");
                    return None;
                }
            };
            thread::sleep(delay);

            if let Some(peer) = self.pick_round_robin() {
                return Some(peer);
            }
        }
    }

    /// Sends `buf` to every live peer. A send failure on one peer closes
    /// and drops it but does not abort the broadcast to the remaining
    /// peers. Returns the ids of peers that failed and were dropped.
    pub fn broadcast(&self, buf: &[u8]) -> Vec<PeerId> {
        let snapshot: Vec<(PeerId, Arc<PeerSocket>)> = {
            let inner = self.inner.lock().unwrap();
            inner.peers.iter().map(|p| (p.id, p.stream.clone())).collect()
        };

        let peer_count = snapshot.len();
        let mut failed = Vec::new();
        for (id, socket) in snapshot {
            if let Err(e) = write_all(&socket, buf) {
                log::warn!("broadcast to peer {id:?} failed, dropping it: {e}");
                failed.push(id);
            }
        }

        if !failed.is_empty() {
            log::debug!(
                "broadcast reached {}/{} peers",
                peer_count - failed.len(),
                peer_count
            );
        }

        for id in &failed {
            self.remove(*id);
        }

        failed
    }

    /// Sends `buf` to the named peer, dropping it on failure.
    pub fn unicast(&self, id: PeerId, buf: &[u8]) -> io::Result<()> {
        let socket = self.get(id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "peer no longer connected")
        })?;

        let result = write_all(&socket, buf);
        if let Err(ref e) = result {
            log::error!("unicast to peer {id:?} failed, dropping it: {e}");
            self.remove(id);
        }
        result
    }
}

/// Writes `buf` in full to a non-blocking socket, retrying on
/// `WouldBlock`. The library does not implement send back-pressure: a
/// peer whose receive window never drains will eventually be treated as
/// failed only via the surrounding operation's own error handling, not by
/// this loop giving up on its own.
fn write_all(socket: &PeerSocket, buf: &[u8]) -> io::Result<()> {
    let mut stream = socket.lock().unwrap();
    let mut written = 0;
    while written < buf.len() {
        match stream.write(&buf[written..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed")),
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                log::trace!("write would block, retrying: {e}");
                thread::sleep(std::time::Duration::from_millis(1));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads whatever is currently available from a peer into `buf`,
/// returning the number of bytes read, `Ok(0)` on a clean peer shutdown,
/// or `WouldBlock` if nothing is ready (the normal non-blocking case, not
/// an error worth surfacing).
pub fn read_available(socket: &PeerSocket, buf: &mut [u8]) -> io::Result<usize> {
    let mut stream = socket.lock().unwrap();
    stream.read(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};

    fn make_pair() -> (TcpStream, TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        client.set_nonblocking(true).unwrap();
        server.set_nonblocking(true).unwrap();
        (TcpStream::from_std(client), TcpStream::from_std(server))
    }

    #[test]
    fn round_robin_cursor_advances_and_wraps() {
        let config = Config::default();
        let set = ConnectionSet::new(&config);

        let (c1, _s1) = make_pair();
        let (c2, _s2) = make_pair();
        let (c3, _s3) = make_pair();

        let id1 = set.add(c1).0;
        let id2 = set.add(c2).0;
        let id3 = set.add(c3).0;

        let picks: Vec<PeerId> = (0..4)
            .map(|_| set.pick_round_robin().unwrap().0)
            .collect();

        assert_eq!(picks, vec![id1, id2, id3, id1]);
    }

    #[test]
    fn removing_a_peer_does_not_skip_the_next_one() {
        let config = Config::default();
        let set = ConnectionSet::new(&config);

        let (c1, _s1) = make_pair();
        let (c2, _s2) = make_pair();
        let (c3, _s3) = make_pair();

        let id1 = set.add(c1).0;
        let id2 = set.add(c2).0;
        let id3 = set.add(c3).0;

        // cursor is now at id1
        assert_eq!(set.pick_round_robin().unwrap().0, id1);
        // remove id2, which sits ahead of the cursor
        set.remove(id2);
        // the next pick should be id3, not skip past it
        assert_eq!(set.pick_round_robin().unwrap().0, id3);
        assert_eq!(set.pick_round_robin().unwrap().0, id1);
    }

    #[test]
    fn unicast_drops_peer_on_send_failure() {
        let config = Config::default();
        let set = ConnectionSet::new(&config);
        let (client, server) = make_pair();
        let id = set.add(client).0;
        drop(server);

        // Give the kernel a moment to tear the connection down so the
        // write observes the failure rather than buffering silently.
        thread::sleep(std::time::Duration::from_millis(50));
        for _ in 0..20 {
            if set.unicast(id, &[1, 2, 3]).is_err() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(20));
        }

        assert!(set.get(id).is_none());
    }
}
