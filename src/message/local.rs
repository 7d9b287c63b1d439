use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread;

use super::comm::{Communicator, Mailbox, TAG_ABORT};
use crate::context::Context;

type Envelope = (usize, u32, Vec<u8>);

/// A communicator connecting a group of ranks that live in the same
/// process, one thread per rank. Each rank owns an unbounded inbound channel;
/// sending pushes onto the recipient's channel and never blocks.
///
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbound: Receiver<Envelope>,
    mailbox: Mailbox,
}

impl LocalCommunicator {
    /// Create a fully connected group of `size` communicators. Element `r`
    /// of the result has rank `r`.
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator group needs at least one rank");

        let (sinks, sources): (Vec<_>, Vec<_>) = (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        sources
            .into_iter()
            .enumerate()
            .map(|(rank, inbound)| Self {
                rank,
                peers: sinks.clone(),
                inbound,
                mailbox: Mailbox::new(),
            })
            .collect()
    }

    fn abort_guard(&self) -> AbortGuard {
        AbortGuard {
            rank: self.rank,
            peers: self.peers.clone(),
        }
    }
}

/// Tells every peer that a rank has panicked, when dropped during the
/// unwind. Peers waiting on that rank panic instead of blocking forever.
///
struct AbortGuard {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            for peer in &self.peers {
                let _ = peer.send((self.rank, TAG_ABORT, Vec::new()));
            }
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, tag: u32, message: Vec<u8>) {
        self.peers[rank]
            .send((self.rank, tag, message))
            .unwrap_or_else(|_| panic!("rank {} has hung up; message from rank {} lost", rank, self.rank))
    }

    fn recv(&self, rank: usize, tag: u32) -> Vec<u8> {
        self.mailbox.recv(rank, tag, || {
            let envelope = self
                .inbound
                .recv()
                .unwrap_or_else(|_| panic!("inbound channel of rank {} disconnected", self.rank));
            if envelope.1 == TAG_ABORT {
                panic!("rank {} panicked while rank {} waited on it", envelope.0, self.rank)
            }
            envelope
        })
    }
}

/// Run `f` on `num_ranks` in-process ranks, one thread each, and return the
/// per-rank results in rank order. A panic on any rank propagates to the
/// caller, and makes peers waiting on it panic too.
///
pub fn run_ranks<F, R>(num_ranks: usize, f: F) -> Vec<R>
where
    F: Fn(Context) -> R + Sync,
    R: Send,
{
    let f = &f;

    thread::scope(|scope| {
        let handles: Vec<_> = LocalCommunicator::group(num_ranks)
            .into_iter()
            .map(|comm| {
                let guard = comm.abort_guard();
                let context = Context::new(Arc::new(comm));
                scope.spawn(move || {
                    let _guard = guard;
                    f(context)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

#[cfg(test)]
mod test {

    use super::{run_ranks, LocalCommunicator};
    use crate::message::comm::Communicator;

    #[test]
    fn ring_messages_arrive_from_the_right_peer() {
        let received = run_ranks(4, |context| {
            let r = context.rank();
            let p = context.size();
            context.send((r + 1) % p, 11, vec![r as u8]);
            context.recv((r + p - 1) % p, 11)
        });
        assert_eq!(received, vec![vec![3], vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn a_panicking_rank_releases_its_peers() {
        let outcome = std::panic::catch_unwind(|| {
            run_ranks(3, |context| {
                if context.rank() == 1 {
                    panic!("rank 1 gives up")
                }
                context.recv(1, 5)
            })
        });
        assert!(outcome.is_err());
    }

    #[test]
    fn group_ranks_are_consecutive() {
        let group = LocalCommunicator::group(3);
        assert_eq!(group.iter().map(|c| c.rank()).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(group.iter().all(|c| c.size() == 3));
    }
}
