use std::cmp::Ordering;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::bitstring::BitString;
use crate::error::{CallError, CallResult};

/// A bare, transport-only node handle: host and port, no Skip+ payload.
///
/// Mirrors `NodeReference` in the original source. Used only to bootstrap a
/// freshly-created node against a configured entry host before its `rs` is
/// known (see `factory::SkipNodeFactory`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BareReference {
    pub host: String,
    pub port: u16,
}

impl BareReference {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// A Skip+ node reference: host, port, and the node's random bit string.
///
/// Equality is `(host, port, rs)`, per spec.md §3. Ordering is by `rs`
/// alone — "tie-breaks do not occur because references are distinct"
/// (spec.md §4.1) — which is why `Ord` does not simply derive from the
/// struct's field order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipReference {
    pub host: String,
    pub port: u16,
    pub rs: BitString,
}

impl SkipReference {
    pub fn new(host: impl Into<String>, port: u16, rs: BitString) -> Self {
        Self {
            host: host.into(),
            port,
            rs,
        }
    }

    pub fn bare(&self) -> BareReference {
        BareReference::new(self.host.clone(), self.port)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    /// First `i` bits of this reference's `rs`.
    pub fn prefix(&self, i: usize) -> BitString {
        self.rs.prefix(i)
    }
}

impl PartialEq for SkipReference {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port && self.rs == other.rs
    }
}

impl Eq for SkipReference {}

impl std::hash::Hash for SkipReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.rs.hash(state);
    }
}

impl PartialOrd for SkipReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SkipReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rs.cmp(&other.rs)
    }
}

/// A value order-theoretically below/above every real `SkipReference`.
///
/// `LOWEST`/`HIGHEST` in spec.md §3–§4.1: sentinels used only as comparison
/// targets inside `pred`/`succ`. They are never inserted into `N`, never
/// serialised as a neighbour (`Bound` carries no wire format, on purpose).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound<T> {
    Lowest,
    Between(T),
    Highest,
}

impl<T: Ord> PartialOrd for Bound<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Bound<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        use Bound::*;
        match (self, other) {
            (Lowest, Lowest) => Ordering::Equal,
            (Lowest, _) => Ordering::Less,
            (_, Lowest) => Ordering::Greater,
            (Highest, Highest) => Ordering::Equal,
            (Highest, _) => Ordering::Greater,
            (_, Highest) => Ordering::Less,
            (Between(a), Between(b)) => a.cmp(b),
        }
    }
}

impl<T> Bound<T> {
    pub fn into_reference(self) -> Option<T> {
        match self {
            Bound::Between(reference) => Some(reference),
            Bound::Lowest | Bound::Highest => None,
        }
    }
}

/// The uniform "deferred result" of a remote invocation (spec.md §4.2).
///
/// Wraps a `oneshot::Receiver` rather than introducing a bespoke executor:
/// the crate already depends on `tokio` for its event loop and timers, so a
/// hand-rolled future type would only duplicate what `tokio::sync::oneshot`
/// already gives us.
pub struct RemoteCall<T> {
    receiver: oneshot::Receiver<CallResult<T>>,
    target: SocketAddr,
}

impl<T> RemoteCall<T> {
    pub fn new(receiver: oneshot::Receiver<CallResult<T>>, target: SocketAddr) -> Self {
        Self { receiver, target }
    }
}

impl<T> Future for RemoteCall<T> {
    type Output = CallResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // the sender side was dropped before replying: shutdown cancelled it, or the
            // connection died before a reply frame arrived. Both are `TransportError` per
            // spec.md §5 ("callers observing cancellation treat it identically to
            // TransportError").
            Poll::Ready(Err(_)) => Poll::Ready(Err(CallError::Transport(
                this.target,
                "call cancelled".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
