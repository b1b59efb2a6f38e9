//! Worker lifecycle: a channel bound to a dedicated OS thread running a
//! blocking body, and cooperative shutdown through the channel's own
//! queue so a stop is never observed ahead of previously queued work.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use portbridge_term::PortId;

use crate::channel::Channel;
use crate::host::{HostRuntime, Target};
use crate::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Thread name, also used in diagnostics.
    pub name: String,
    /// Suggested stack size in bytes; platform default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
}

impl WorkerOptions {
    pub fn named(name: impl Into<String>) -> WorkerOptions {
        WorkerOptions {
            name: name.into(),
            stack_size: None,
        }
    }
}

/// A channel bound to a running worker thread. `T` is the body's exit
/// value, recovered by `stop`.
pub struct Worker<T = ()> {
    channel: Arc<Channel>,
    handle: thread::JoinHandle<T>,
}

impl<T: Send + 'static> Worker<T> {
    /// Creates the channel and spawns the worker thread. Any failure
    /// unwinds everything created so far; there is no partial worker.
    pub fn spawn<F>(
        host: &dyn HostRuntime,
        port: PortId,
        owner: Target,
        options: &WorkerOptions,
        body: F,
    ) -> Result<Worker<T>>
    where
        F: FnOnce(Arc<Channel>) -> T + Send + 'static,
    {
        let channel = Channel::new(host, port, owner)
            .with_context(|| format!("create channel for worker {:?}", options.name))?;

        let mut builder = thread::Builder::new().name(options.name.clone());
        if let Some(bytes) = options.stack_size {
            builder = builder.stack_size(bytes);
        }
        let thread_channel = Arc::clone(&channel);
        let handle = builder
            .spawn(move || body(thread_channel))
            .with_context(|| format!("spawn worker thread {:?}", options.name))?;

        Ok(Worker { channel, handle })
    }

    /// The worker's channel, for producers and for reply routing.
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Queues a stop message through the worker's own queue, so the worker
    /// observes every previously queued message first, then joins the
    /// thread and returns the body's exit value. A panicked body surfaces
    /// as an error.
    pub fn stop(self) -> Result<T> {
        let name = self.handle.thread().name().unwrap_or("worker").to_string();
        if let Err(err) = self.channel.send(None, Message::stop()) {
            // The message is queued even when the wakeup write fails; the
            // worker still observes it on its next drain.
            debug!("worker {name}: stop wakeup failed: {err}");
        }
        debug!("worker {name}: stop queued, joining");
        match self.handle.join() {
            Ok(value) => Ok(value),
            Err(_) => anyhow::bail!("worker thread {name} panicked"),
        }
    }
}
