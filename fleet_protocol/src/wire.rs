//! Datagram transmit abstraction.
//!
//! The send and receive engines only ever *transmit* through this trait, so
//! the retransmission logic can be exercised in tests against an in-memory
//! wire instead of a real socket.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

#[async_trait]
pub trait Wire: Send + Sync {
    async fn transmit(&self, datagram: &[u8], to: SocketAddr) -> io::Result<()>;
}

#[async_trait]
impl Wire for UdpSocket {
    async fn transmit(&self, datagram: &[u8], to: SocketAddr) -> io::Result<()> {
        self.send_to(datagram, to).await.map(|_| ())
    }
}

/// In-memory wire for tests: every transmitted datagram is pushed onto an
/// unbounded channel for the test to inspect.
pub mod testing {
    use super::*;
    use tokio::sync::mpsc;

    pub struct ChannelWire {
        tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    }

    impl ChannelWire {
        pub fn pair() -> (Self, mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { tx }, rx)
        }
    }

    #[async_trait]
    impl Wire for ChannelWire {
        async fn transmit(&self, datagram: &[u8], to: SocketAddr) -> io::Result<()> {
            self.tx
                .send((datagram.to_vec(), to))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "wire closed"))
        }
    }
}
