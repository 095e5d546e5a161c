//! Test utilities for slabtrace development.
//!
//! - [`run_ranks`] runs one closure per rank on scoped threads over a
//!   [`LocalCluster`] and collects the results in rank order.
//! - [`FailingTransport`] wraps an endpoint and fails after a set number
//!   of operations.
//! - [`fixtures`] builds analytic field samples for a rank's slab.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::panic;
use std::thread;

use slabtrace_comm::{ChannelTransport, Envelope, LocalCluster, Transport};
use slabtrace_core::{CommError, Rank};

/// Run `body` once per rank, each on its own thread with its own endpoint.
///
/// Results come back indexed by rank. A panic on any rank is re-raised
/// on the caller after every thread has finished; its dropped endpoint
/// turns the peers' pending receives into `Disconnected` errors rather
/// than a hang.
pub fn run_ranks<R, F>(size: usize, body: F) -> Vec<R>
where
    F: Fn(ChannelTransport) -> R + Sync,
    R: Send,
{
    let endpoints = LocalCluster::endpoints(size);
    thread::scope(|s| {
        let body = &body;
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|t| s.spawn(move || body(t)))
            .collect();
        let joined: Vec<thread::Result<R>> = handles.into_iter().map(|h| h.join()).collect();
        joined
            .into_iter()
            .map(|r| match r {
                Ok(v) => v,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    })
}

/// Transport that succeeds for `budget` operations, then reports the
/// first peer it talks to as disconnected.
///
/// Both sends and receives count against the budget.
pub struct FailingTransport<T> {
    inner: T,
    budget: usize,
}

impl<T: Transport> FailingTransport<T> {
    pub fn new(inner: T, budget: usize) -> Self {
        Self { inner, budget }
    }

    fn spend(&mut self, peer: Rank) -> Result<(), CommError> {
        if self.budget == 0 {
            return Err(CommError::Disconnected { peer });
        }
        self.budget -= 1;
        Ok(())
    }
}

impl<T: Transport> Transport for FailingTransport<T> {
    fn rank(&self) -> Rank {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn send(&mut self, envelope: Envelope, packet: Vec<u8>) -> Result<(), CommError> {
        self.spend(envelope.destination)?;
        self.inner.send(envelope, packet)
    }

    fn recv(&mut self, envelope: Envelope) -> Result<Vec<u8>, CommError> {
        self.spend(envelope.source)?;
        self.inner.recv(envelope)
    }
}
