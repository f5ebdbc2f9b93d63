//! Wire frames and the length-prefixed codec they travel over.
//!
//! Framing is `u64` big-endian length prefix + `bincode`-encoded payload,
//! grounded on `net/session.rs`'s `TcpControl::{read_task,write_task}`
//! (`read_u64`/`write_u64`, `read_exact`/`write_all`).

use std::collections::HashSet;
use std::hash::Hash;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::bitstring::BitString;
use crate::error::CallError;
use crate::reference::{BareReference, SkipReference};

mod sealed {
    pub trait Sealed {}
}

/// The closed serialisable universe values may be drawn from (spec.md §6):
/// primitives, the two reference types, and the unit/`Vec`/`HashSet`
/// combinators over them. `call_remote`'s `Args`/`Ret` generics are bound
/// to this trait (see transport.rs), so a type outside the universe is
/// rejected at compile time rather than surfacing as a runtime
/// `UnknownType` — `UnknownType` is now reserved for `bincode` itself
/// failing on an otherwise well-typed value (e.g. version skew).
pub trait WireValue: sealed::Sealed + Serialize + DeserializeOwned {}

impl sealed::Sealed for bool {}
impl WireValue for bool {}
impl sealed::Sealed for i64 {}
impl WireValue for i64 {}
impl sealed::Sealed for String {}
impl WireValue for String {}
impl sealed::Sealed for BitString {}
impl WireValue for BitString {}
impl sealed::Sealed for BareReference {}
impl WireValue for BareReference {}
impl sealed::Sealed for SkipReference {}
impl WireValue for SkipReference {}
impl sealed::Sealed for () {}
impl WireValue for () {}
impl<T: WireValue> sealed::Sealed for Vec<T> {}
impl<T: WireValue> WireValue for Vec<T> {}
impl<T: WireValue + Eq + Hash> sealed::Sealed for HashSet<T> {}
impl<T: WireValue + Eq + Hash> WireValue for HashSet<T> {}

/// The maximum frame length accepted from a peer, guarding against a
/// corrupt or hostile length prefix driving an unbounded allocation.
const MAX_FRAME_LEN: u64 = 1 << 20;

pub const REQUEST_ID_BYTES: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    Call {
        request_id: u64,
        method: String,
        args: Vec<u8>,
    },
    Reply {
        request_id: u64,
        value: Vec<u8>,
    },
    Error {
        request_id: u64,
        kind: WireErrorKind,
        message: String,
    },
}

/// `CallError` without the bound `SocketAddr`/method payload that only make
/// sense locally — the wire only needs to say *which kind* of failure the
/// peer observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    Transport,
    RemoteMethod,
    UnknownMethod,
    UnknownType,
    Stopped,
    MissingRs,
}

impl Frame {
    pub fn error_for(request_id: u64, err: &CallError) -> Self {
        let (kind, message) = match err {
            CallError::Transport(_, message) => (WireErrorKind::Transport, message.clone()),
            CallError::RemoteMethod { message, .. } => {
                (WireErrorKind::RemoteMethod, message.clone())
            }
            CallError::UnknownMethod(name) => (WireErrorKind::UnknownMethod, name.clone()),
            CallError::UnknownType(message) => (WireErrorKind::UnknownType, message.clone()),
            CallError::Stopped => (WireErrorKind::Stopped, "node is not Running".to_string()),
            CallError::MissingRs => (WireErrorKind::MissingRs, "reference has no rs".to_string()),
        };
        Frame::Error {
            request_id,
            kind,
            message,
        }
    }
}

pub fn encode<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    Ok(bincode::options().serialize(value)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> anyhow::Result<T> {
    Ok(bincode::options().deserialize(bytes)?)
}

pub async fn write_frame(stream: &mut (impl AsyncWrite + Unpin), frame: &Frame) -> anyhow::Result<()> {
    let buf = encode(frame)?;
    stream.write_u64(buf.len() as u64).await?;
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame(stream: &mut (impl AsyncRead + Unpin)) -> anyhow::Result<Frame> {
    let len = stream.read_u64().await?;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame length {len} exceeds maximum {MAX_FRAME_LEN}")
    }
    let mut buf = vec![0; len as usize];
    stream.read_exact(&mut buf).await?;
    decode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstring::random_bit_string;

    #[tokio::test]
    async fn frame_round_trips_over_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let frame = Frame::Call {
            request_id: 7,
            method: "linearise".to_string(),
            args: encode(&SkipReference::new("127.0.0.1", 4001, random_bit_string(2))).unwrap(),
        };
        write_frame(&mut a, &frame).await.unwrap();
        let decoded = read_frame(&mut b).await.unwrap();
        match decoded {
            Frame::Call {
                request_id, method, ..
            } => {
                assert_eq!(request_id, 7);
                assert_eq!(method, "linearise");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u64(MAX_FRAME_LEN + 1).await.unwrap();
        drop(a);
        assert!(read_frame(&mut b).await.is_err());
    }
}
