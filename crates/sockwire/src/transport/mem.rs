//! In-process transport made of two bounded tokio channels.
//!
//! Both ends of a [`pair`] are [`Connection`]s, one is given to a [`Server`](crate::Server) and the
//! other to a [`Client`](crate::Client).
use sockwire_core::Frame;
use tokio::sync::mpsc;

use super::{Connection, FrameSink, FrameStream};
use crate::errors::TransportError;

/// One end of an in-process duplex pair. See [`pair`].
#[derive(Debug)]
pub struct MemConnection {
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
}

/// Create two connected ends.
///
/// Each direction buffers at most `capacity` frames (at least one). Once full, a writer waits
/// until the other end reads, so an end that never reads stalls its peer.
pub fn pair(capacity: usize) -> (MemConnection, MemConnection) {
    let (tx1, rx1) = mpsc::channel(capacity.max(1));
    let (tx2, rx2) = mpsc::channel(capacity.max(1));
    (
        MemConnection { tx: tx1, rx: rx2 },
        MemConnection { tx: tx2, rx: rx1 },
    )
}

impl Connection for MemConnection {
    type Sink = MemSink;
    type Stream = MemStream;

    fn split(self) -> (MemSink, MemStream) {
        (MemSink(Some(self.tx)), MemStream(self.rx))
    }
}

/// Writing half of a [`MemConnection`]
#[derive(Debug)]
pub struct MemSink(Option<mpsc::Sender<Frame>>);

/// Reading half of a [`MemConnection`]
#[derive(Debug)]
pub struct MemStream(mpsc::Receiver<Frame>);

impl FrameSink for MemSink {
    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.0.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The peer reads the remaining frames then sees the end of the stream
        self.0.take().map(drop).ok_or(TransportError::Closed)
    }
}

impl FrameStream for MemStream {
    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        self.0.recv().await.ok_or(TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_in_order() {
        let (a, b) = pair(4);
        let (mut a_tx, mut a_rx) = a.split();
        let (mut b_tx, mut b_rx) = b.split();
        a_tx.write_frame(Frame::from("2")).await.unwrap();
        a_tx.write_frame(Frame::from("3")).await.unwrap();
        b_tx.write_frame(Frame::from("1")).await.unwrap();
        assert_eq!(b_rx.read_frame().await.unwrap(), Frame::from("2"));
        assert_eq!(b_rx.read_frame().await.unwrap(), Frame::from("3"));
        assert_eq!(a_rx.read_frame().await.unwrap(), Frame::from("1"));
    }

    #[tokio::test]
    async fn close_ends_the_peer_stream() {
        let (a, b) = pair(1);
        let (mut a_tx, _a_rx) = a.split();
        let (_b_tx, mut b_rx) = b.split();
        a_tx.write_frame(Frame::from("4")).await.unwrap();
        a_tx.close().await.unwrap();
        assert!(matches!(a_tx.close().await, Err(TransportError::Closed)));
        assert!(matches!(a_tx.write_frame(Frame::from("2")).await, Err(TransportError::Closed)));
        assert_eq!(b_rx.read_frame().await.unwrap(), Frame::from("4"));
        assert!(matches!(b_rx.read_frame().await, Err(TransportError::Closed)));
    }
}
