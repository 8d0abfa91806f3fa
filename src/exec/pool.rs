// src/exec/pool.rs

//! Execution pool: the set of channels and the reuse policy over them.
//!
//! Any exited channel may be handed to any task; reuse is not keyed by task
//! identity. Channels leave the pool only when their surface is removed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::exec::channel::ExecutionChannel;
use crate::exec::surface::{ExecutorId, SurfaceFactory};

#[derive(Debug, Clone)]
pub struct Acquired {
    pub channel: ExecutionChannel,
    /// True if an exited channel was picked (and already reset).
    pub reused: bool,
}

pub struct ExecutionPool {
    channels: Vec<ExecutionChannel>,
    next_id: ExecutorId,
    factory: Arc<dyn SurfaceFactory>,
    kill_timeout: Duration,
    removed_tx: mpsc::UnboundedSender<ExecutorId>,
    removed_rx: mpsc::UnboundedReceiver<ExecutorId>,
}

impl std::fmt::Debug for ExecutionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPool")
            .field("channels", &self.channels)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl ExecutionPool {
    pub fn new(factory: Arc<dyn SurfaceFactory>, kill_timeout: Duration) -> Self {
        let (removed_tx, removed_rx) = mpsc::unbounded_channel();
        Self {
            channels: Vec::new(),
            next_id: 0,
            factory,
            kill_timeout,
            removed_tx,
            removed_rx,
        }
    }

    /// Pick an exited channel for reuse, or create a new one.
    ///
    /// A reused channel is reset inside this call, so two callers can never
    /// be handed the same channel.
    pub fn acquire(&mut self) -> Acquired {
        self.prune_removed();

        if let Some(channel) = self.channels.iter().find(|c| c.reset()) {
            debug!(executor = channel.id(), "reusing exited execution channel");
            return Acquired {
                channel: channel.clone(),
                reused: true,
            };
        }

        let id = self.next_id;
        self.next_id += 1;

        let channel = ExecutionChannel::spawn(
            id,
            Arc::clone(&self.factory),
            self.removed_tx.clone(),
            self.kill_timeout,
        );
        self.channels.push(channel.clone());
        info!(executor = id, pool_size = self.channels.len(), "created execution channel");

        Acquired {
            channel,
            reused: false,
        }
    }

    /// Drop channels whose surface has been removed.
    pub fn prune_removed(&mut self) {
        while let Ok(id) = self.removed_rx.try_recv() {
            self.channels.retain(|c| c.id() != id);
            debug!(executor = id, pool_size = self.channels.len(), "execution channel left the pool");
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ExecutionChannel] {
        &self.channels
    }
}
