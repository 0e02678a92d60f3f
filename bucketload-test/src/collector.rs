//! A local UDP endpoint that captures telemetry datagrams.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

/// Receives datagrams on a random port on localhost.
#[derive(Debug)]
pub struct TestCollector {
    socket: UdpSocket,
}

impl TestCollector {
    pub async fn new() -> Self {
        let socket = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        Self { socket }
    }

    /// The host to send datagrams to.
    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    /// The port to send datagrams to.
    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Waits for the next datagram and returns it as text.
    ///
    /// Panics if nothing arrives within five seconds.
    pub async fn recv(&self) -> String {
        let mut buf = vec![0; 64 * 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), self.socket.recv_from(&mut buf))
            .await
            .expect("no datagram received")
            .unwrap();
        String::from_utf8(buf[..len].to_vec()).unwrap()
    }
}
