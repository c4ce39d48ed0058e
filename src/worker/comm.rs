//! Collective primitives for the distributed model.
//!
//! Ranks share no item memory. They coordinate through two operations only:
//! a one-to-all broadcast of the pipeline before loading, and an all-to-all
//! barrier between loading and transforming. [`LocalCluster`] provides both
//! for ranks running as threads of one process; another transport only has
//! to implement [`Communicator`].

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, error};

use crate::core::PipelineSpec;
use crate::utils::{PipelineError, PipelineResult};
use crate::worker::{WorkerError, WorkerResult};

/// Rank that builds the pipeline and broadcasts it
pub const ROOT: usize = 0;

/// Point-to-point message between ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Number of operations that the following payload carries
    Count(usize),
    /// Serialized pipeline and its fingerprint
    Payload { bytes: Vec<u8>, fingerprint: u64 },
    /// Another rank hit a fatal error
    Abort(String),
}

impl Frame {
    fn name(&self) -> &'static str {
        match self {
            Self::Count(_) => "count",
            Self::Payload { .. } => "payload",
            Self::Abort(_) => "abort",
        }
    }
}

pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn send(&self, to: usize, frame: Frame) -> WorkerResult<()>;
    /// Blocks for the next frame addressed to this rank.
    fn recv(&self) -> WorkerResult<Frame>;
    /// Blocks until every rank has arrived, or fails if the run was aborted.
    fn barrier(&self) -> WorkerResult<()>;
    /// Releases every rank blocked in `recv` or `barrier` with an error.
    fn abort(&self, reason: &str);
}

/// Replicates the root's pipeline to every rank.
///
/// The root sends the operation count, then the payload. A receiver that
/// sees them out of order, cannot decode the payload, or decodes a pipeline
/// whose length or fingerprint disagrees with what was announced fails with
/// [`PipelineError::ReplicationMismatch`].
pub fn broadcast_pipeline<C>(
    comm: &C,
    root: usize,
    spec: Option<&PipelineSpec>,
) -> PipelineResult<PipelineSpec>
where
    C: Communicator + ?Sized,
{
    let rank = comm.rank();

    if rank == root {
        let spec =
            spec.ok_or_else(|| PipelineError::config("root rank has no pipeline to broadcast"))?;
        let bytes = spec.encode()?;
        let fingerprint = spec.fingerprint();
        for peer in (0..comm.size()).filter(|peer| *peer != root) {
            comm.send(peer, Frame::Count(spec.len()))?;
            comm.send(peer, Frame::Payload { bytes: bytes.clone(), fingerprint })?;
        }
        let peers = comm.size().saturating_sub(1);
        debug!("Rank {} broadcast pipeline {} to {} peers", rank, spec, peers);
        return Ok(spec.clone());
    }

    let announced = match comm.recv()? {
        Frame::Count(n) => n,
        Frame::Abort(reason) => return Err(WorkerError::Aborted(reason).into()),
        other => {
            return Err(PipelineError::replication(
                rank,
                format!("received {} without a preceding count", other.name()),
            ));
        }
    };

    let (bytes, fingerprint) = match comm.recv()? {
        Frame::Payload { bytes, fingerprint } => (bytes, fingerprint),
        Frame::Abort(reason) => return Err(WorkerError::Aborted(reason).into()),
        other => {
            return Err(PipelineError::replication(
                rank,
                format!("count of {} followed by {} instead of payload", announced, other.name()),
            ));
        }
    };

    let spec = PipelineSpec::decode(&bytes)
        .map_err(|e| PipelineError::replication(rank, format!("undecodable payload: {}", e)))?;

    if spec.len() != announced {
        return Err(PipelineError::replication(
            rank,
            format!("announced {} operations, payload holds {}", announced, spec.len()),
        ));
    }
    if spec.fingerprint() != fingerprint {
        return Err(PipelineError::replication(rank, "fingerprint differs from root"));
    }

    debug!("Rank {} received pipeline {}", rank, spec);
    Ok(spec)
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: Option<String>,
}

/// Reusable barrier that can be torn down by any party.
#[derive(Debug)]
struct ClusterBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl ClusterBarrier {
    fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    fn wait(&self) -> WorkerResult<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.aborted {
            return Err(WorkerError::Aborted(reason.clone()));
        }

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        while state.generation == generation && state.aborted.is_none() {
            self.released.wait(&mut state);
        }
        match &state.aborted {
            Some(reason) if state.generation == generation => {
                Err(WorkerError::Aborted(reason.clone()))
            }
            _ => Ok(()),
        }
    }

    fn abort(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.aborted.is_none() {
            state.aborted = Some(reason.to_string());
        }
        self.released.notify_all();
    }
}

/// In-process cluster: one mailbox per rank and a shared barrier.
pub struct LocalCluster;

impl LocalCluster {
    /// Creates `size` connected communicators, indexed by rank.
    pub fn new(size: usize) -> Vec<LocalCommunicator> {
        let (senders, receivers): (Vec<Sender<Frame>>, Vec<Receiver<Frame>>) =
            (0..size).map(|_| unbounded()).unzip();
        let peers = Arc::new(senders);
        let barrier = Arc::new(ClusterBarrier::new(size));

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalCommunicator {
                rank,
                inbox,
                peers: Arc::clone(&peers),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

pub struct LocalCommunicator {
    rank: usize,
    inbox: Receiver<Frame>,
    peers: Arc<Vec<Sender<Frame>>>,
    barrier: Arc<ClusterBarrier>,
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, to: usize, frame: Frame) -> WorkerResult<()> {
        self.peers
            .get(to)
            .ok_or(WorkerError::Disconnected(to))?
            .send(frame)
            .map_err(|_| WorkerError::Disconnected(to))
    }

    fn recv(&self) -> WorkerResult<Frame> {
        self.inbox.recv().map_err(|_| WorkerError::Disconnected(self.rank))
    }

    fn barrier(&self) -> WorkerResult<()> {
        self.barrier.wait()
    }

    fn abort(&self, reason: &str) {
        error!("Rank {} aborting run: {}", self.rank, reason);
        for (peer, sender) in self.peers.iter().enumerate() {
            if peer != self.rank {
                let _ = sender.send(Frame::Abort(reason.to_string()));
            }
        }
        self.barrier.abort(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Operation;

    fn sample_spec() -> PipelineSpec {
        let ops = vec![Operation::rotate(90), Operation::flip(1), Operation::Grayscale];
        PipelineSpec::from_operations(ops).unwrap()
    }

    #[test]
    fn every_rank_observes_the_root_pipeline() {
        let spec = sample_spec();
        let comms = LocalCluster::new(4);

        let received: Vec<PipelineSpec> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let spec = &spec;
                    s.spawn(move || {
                        let root_spec = (comm.rank() == ROOT).then_some(spec);
                        broadcast_pipeline(comm, ROOT, root_spec).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for got in received {
            assert_eq!(got, spec);
        }
    }

    fn payload(spec: &PipelineSpec, fingerprint: u64) -> Frame {
        Frame::Payload { bytes: spec.encode().unwrap(), fingerprint }
    }

    #[test]
    fn count_without_payload_is_a_mismatch() {
        let comms = LocalCluster::new(2);
        comms[0].send(1, Frame::Count(3)).unwrap();
        comms[0].send(1, Frame::Count(3)).unwrap();

        let err = broadcast_pipeline(&comms[1], ROOT, None).unwrap_err();
        assert!(matches!(err, PipelineError::ReplicationMismatch { worker: 1, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn payload_without_count_is_a_mismatch() {
        let spec = sample_spec();
        let comms = LocalCluster::new(2);
        comms[0].send(1, payload(&spec, spec.fingerprint())).unwrap();

        let err = broadcast_pipeline(&comms[1], ROOT, None).unwrap_err();
        assert!(matches!(err, PipelineError::ReplicationMismatch { .. }));
    }

    #[test]
    fn announced_count_must_match_payload() {
        let spec = sample_spec();
        let comms = LocalCluster::new(2);
        comms[0].send(1, Frame::Count(2)).unwrap();
        comms[0].send(1, payload(&spec, spec.fingerprint())).unwrap();

        let err = broadcast_pipeline(&comms[1], ROOT, None).unwrap_err();
        assert!(err.to_string().contains("announced 2 operations"));
    }

    #[test]
    fn corrupted_fingerprint_is_a_mismatch() {
        let spec = sample_spec();
        let comms = LocalCluster::new(2);
        comms[0].send(1, Frame::Count(spec.len())).unwrap();
        comms[0].send(1, payload(&spec, spec.fingerprint() ^ 1)).unwrap();

        assert!(broadcast_pipeline(&comms[1], ROOT, None).is_err());
    }

    #[test]
    fn barrier_releases_all_ranks_together() {
        let comms = LocalCluster::new(3);
        std::thread::scope(|s| {
            for comm in &comms {
                s.spawn(move || {
                    comm.barrier().unwrap();
                    comm.barrier().unwrap();
                });
            }
        });
    }

    #[test]
    fn abort_releases_waiting_ranks() {
        let comms = LocalCluster::new(3);
        std::thread::scope(|s| {
            let waiting: Vec<_> =
                comms[1..].iter().map(|comm| s.spawn(move || comm.barrier())).collect();
            comms[0].abort("capacity exceeded");
            for handle in waiting {
                let result = handle.join().unwrap();
                assert!(matches!(
                    result,
                    Err(WorkerError::Aborted(reason)) if reason == "capacity exceeded"
                ));
            }
        });
        assert!(matches!(comms[1].recv(), Ok(Frame::Abort(_))));
    }
}
