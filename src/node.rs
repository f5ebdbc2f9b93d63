//! The generic node runtime: one logical dispatch loop per node, the
//! `Starting → Running → Stopping → Stopped` state machine, and periodic
//! `Timeout` firing.
//!
//! Grounded on `event.rs`'s `Session<M>`/`SessionSender<M>` (single
//! `UnboundedReceiver` event loop) and `worker.rs`'s three-way
//! `tokio::select!` shape, specialised to the closed `NodeMessage` set
//! instead of a generic event type `M` — a Skip+ node's dispatch surface
//! (`linearise`, `rs`) is fixed and known at compile time, unlike the
//! teacher's BFT protocols which parameterise over protocol-specific
//! events.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::error::{CallError, CallResult};
use crate::registry::{LocalNodes, MethodRegistry};
use crate::transport;

pub enum NodeMessage {
    Call {
        method: String,
        args: Vec<u8>,
        reply: oneshot::Sender<CallResult<Vec<u8>>>,
    },
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// The per-specialisation state a `NodeCore` hosts (composition, not
/// inheritance, per spec.md §9 Design Notes — this is the "SkipExtension"
/// half of the `NodeCore` + extension pair).
pub trait Extension: Send {
    fn on_timeout(&mut self) -> anyhow::Result<()>;

    /// Called once during `Shutdown`, before the node starts answering
    /// `Stopped`. Aborts or drains whatever background tasks the
    /// extension may have spawned (e.g. fire-and-forget delegated calls);
    /// a no-op by default since not every extension spawns any.
    fn shutdown(&mut self) {}
}

/// A bare node (spec.md §6's "plain factory for bare nodes") has nothing to
/// do on timeout.
impl Extension for () {
    fn on_timeout(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Owns a listening endpoint and multiplexes incoming calls onto a
/// registered method, per spec.md §4.3.
pub struct NodeCore<S> {
    addr: SocketAddr,
    state: NodeState,
    registry: MethodRegistry<S>,
    ext: S,
    receiver: mpsc::UnboundedReceiver<NodeMessage>,
    sender: mpsc::UnboundedSender<NodeMessage>,
    timeout_interval: Duration,
}

impl<S: Extension> NodeCore<S> {
    /// Registers the node's sender into `local` (for same-process
    /// short-circuit dispatch) and constructs its runtime. The
    /// registration is permanent — kept even past shutdown, see `run`.
    pub fn new(
        addr: SocketAddr,
        ext: S,
        registry: MethodRegistry<S>,
        timeout_interval: Duration,
        local: LocalNodes,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        local.insert(addr, sender.clone());
        Self {
            addr,
            state: NodeState::Starting,
            registry,
            ext,
            receiver,
            sender,
            timeout_interval,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<NodeMessage> {
        self.sender.clone()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn ext(&self) -> &S {
        &self.ext
    }

    pub fn ext_mut(&mut self) -> &mut S {
        &mut self.ext
    }

    /// Binds `listener` (must already be bound to `self.addr()`) and runs
    /// the dispatch loop.
    ///
    /// Calls queued before `Shutdown` are processed normally (they were
    /// accepted while `Running`); `Shutdown` itself aborts the accept task
    /// (closing the listening socket, per spec.md §4.4's "closes all
    /// listeners") and drains anything still queued with a `Stopped`
    /// reply. The `LocalNodes` registration is left in place, so a
    /// same-process reference still reaches this node's channel and
    /// observes `Stopped` (spec.md §4.2's short-circuit contract) rather
    /// than disappearing outright; a genuinely remote caller instead sees
    /// its connection refused, surfacing as `TransportError` per §7 — the
    /// same as any other lost edge.
    pub async fn run(mut self, listener: TcpListener) -> anyhow::Result<()> {
        self.state = NodeState::Running;
        let accept_task = tokio::spawn(transport::accept_loop(listener, self.sender.clone()));

        let mut ticker = tokio::time::interval(self.timeout_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately; consume it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.state == NodeState::Running {
                        if let Err(err) = self.ext.on_timeout() {
                            warn!(addr = %self.addr, %err, "timeout firing failed, continuing");
                        }
                    }
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(NodeMessage::Call { method, args, reply }) => {
                            let result = if self.state == NodeState::Running {
                                self.registry.dispatch(&method, &mut self.ext, args)
                            } else {
                                Err(CallError::Stopped)
                            };
                            let _ = reply.send(result);
                        }
                        Some(NodeMessage::Shutdown(done)) => {
                            self.state = NodeState::Stopping;
                            accept_task.abort();
                            self.ext.shutdown();
                            while let Ok(queued) = self.receiver.try_recv() {
                                match queued {
                                    NodeMessage::Call { reply, .. } => {
                                        let _ = reply.send(Err(CallError::Stopped));
                                    }
                                    NodeMessage::Shutdown(other_done) => {
                                        let _ = other_done.send(());
                                    }
                                }
                            }
                            self.state = NodeState::Stopped;
                            let _ = done.send(());
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}
