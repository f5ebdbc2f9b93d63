//! Node factories: bring up nodes on consecutive ports and coordinate
//! their shutdown.
//!
//! `NodeFactory` is the bare, specialisation-agnostic factory (spec.md
//! §6: "`NodeFactory(startPort)` — plain factory for bare nodes");
//! `SkipNodeFactory` builds on it with the Skip+-specific entry-node
//! bootstrap and chained introduction of spec.md §4.4. Grounded on the
//! Python `NodeFactory`/`SkipNodeFactory` pair (`vaud/skip.py`) and on
//! `net/session.rs`'s listener bring-up.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::bitstring::{random_bit_string, BitString, RS_BYTE_LENGTH};
use crate::node::{Extension, NodeCore, NodeMessage};
use crate::reference::{BareReference, SkipReference};
use crate::registry::{LocalNodes, MethodRegistry};
use crate::skip::{self, SkipState};
use crate::transport::Dispatcher;
use crate::wire;

const DEFAULT_TIMEOUT_INTERVAL: Duration = Duration::from_secs(1);

struct RunningNode {
    sender: UnboundedSender<NodeMessage>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningNode {
    /// Waits for the `Shutdown` round-trip to be acknowledged. By then
    /// `NodeCore::run` has already aborted its own accept task, so the
    /// listening socket is closed and a genuinely remote caller sees its
    /// connection refused; the dispatch task itself is left running so it
    /// keeps answering `Stopped` forever over the local short-circuit
    /// path, so its handle is dropped (detached) rather than joined or
    /// aborted: aborting would kill the very channel that keeps answering
    /// local callers after shutdown.
    async fn shutdown(self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(NodeMessage::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        drop(self.handle);
        Ok(())
    }
}

/// Brings up node runtimes on consecutive ports starting from `start_port`,
/// agnostic to the extension type `S` each node hosts.
pub struct NodeFactory {
    host: String,
    next_port: u16,
    local: LocalNodes,
    dispatcher: Dispatcher,
    timeout_interval: Duration,
    nodes: Vec<RunningNode>,
}

impl NodeFactory {
    pub fn new(host: impl Into<String>, start_port: u16) -> Self {
        let local = LocalNodes::new();
        Self {
            host: host.into(),
            next_port: start_port,
            dispatcher: Dispatcher::new(local.clone()),
            local,
            timeout_interval: DEFAULT_TIMEOUT_INTERVAL,
            nodes: Vec::new(),
        }
    }

    pub fn with_timeout_interval(mut self, interval: Duration) -> Self {
        self.timeout_interval = interval;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Binds the next port, builds the node's extension state and method
    /// registry via `build`, and starts its dispatch loop. Returns the
    /// bound address and a sender that can enqueue `Call`/`Shutdown`
    /// messages directly (used by `SkipNodeFactory` to introduce the
    /// freshly-created node to a peer without a real network round-trip).
    pub async fn new_node<S: Extension + 'static>(
        &mut self,
        build: impl FnOnce(SocketAddr, &Dispatcher) -> (S, MethodRegistry<S>),
    ) -> anyhow::Result<(SocketAddr, UnboundedSender<NodeMessage>)> {
        let port = self.next_port;
        self.next_port += 1;
        let requested: SocketAddr = format!("{}:{}", self.host, port).parse()?;
        let listener = TcpListener::bind(requested).await?;
        let addr = listener.local_addr()?;

        let (ext, registry) = build(addr, &self.dispatcher);
        let core = NodeCore::new(addr, ext, registry, self.timeout_interval, self.local.clone());
        let sender = core.sender();
        let handle = tokio::spawn(core.run(listener));
        self.nodes.push(RunningNode {
            sender: sender.clone(),
            handle,
        });
        Ok((addr, sender))
    }

    /// Closes every listener and waits for every node's dispatch loop to
    /// exit. Per spec.md §5, no outstanding remote call is required to
    /// complete first — `NodeCore::run`'s `Shutdown` handling drains and
    /// rejects rather than waiting.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        for node in self.nodes.drain(..) {
            node.shutdown().await?;
        }
        Ok(())
    }
}

async fn introduce(sender: &UnboundedSender<NodeMessage>, peer: SkipReference) {
    let Ok(args) = wire::encode(&peer) else {
        return;
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    if sender
        .send(NodeMessage::Call {
            method: "linearise".to_string(),
            args,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }
    let _ = reply_rx.await;
}

/// Skip+ specialisation of `NodeFactory` (spec.md §4.4): the first local
/// node is introduced to a configured entry node (once its `rs` has been
/// fetched), and every subsequent local node is introduced to the
/// previously-created one.
pub struct SkipNodeFactory {
    inner: NodeFactory,
    entry: Option<BareReference>,
    prev: Option<SkipReference>,
}

impl SkipNodeFactory {
    pub fn new(host: impl Into<String>, start_port: u16, entry: Option<BareReference>) -> Self {
        Self {
            inner: NodeFactory::new(host, start_port),
            entry,
            prev: None,
        }
    }

    pub fn with_timeout_interval(mut self, interval: Duration) -> Self {
        self.inner = self.inner.with_timeout_interval(interval);
        self
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.inner.dispatcher()
    }

    pub async fn new_node(&mut self) -> anyhow::Result<SkipReference> {
        let rs = random_bit_string(RS_BYTE_LENGTH);
        let rs_for_build = rs.clone();
        let (addr, sender) = self
            .inner
            .new_node(move |addr, dispatcher| {
                let reference =
                    SkipReference::new(addr.ip().to_string(), addr.port(), rs_for_build);
                (SkipState::new(reference, dispatcher.clone()), skip::registry())
            })
            .await?;
        let reference = SkipReference::new(addr.ip().to_string(), addr.port(), rs);

        if let Some(prev) = self.prev.clone() {
            introduce(&sender, prev).await;
        } else if let Some(entry) = self.entry.clone() {
            match self.fetch_entry_reference(&entry).await {
                Ok(entry_ref) => introduce(&sender, entry_ref).await,
                Err(err) => {
                    warn!(%err, "entry node unreachable, local host remains isolated but operational")
                }
            }
        }

        self.prev = Some(reference.clone());
        Ok(reference)
    }

    async fn fetch_entry_reference(&self, entry: &BareReference) -> anyhow::Result<SkipReference> {
        let addr = entry.addr()?;
        let rs: BitString = self.inner.dispatcher().call_remote(addr, "rs", ()).await?;
        Ok(SkipReference::new(entry.host.clone(), entry.port, rs))
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.inner.shutdown().await
    }
}
