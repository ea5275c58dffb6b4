//! 데이터그램 소켓 추상화
//!
//! 전송 계층은 이 트레이트만 사용한다.
//! - `tokio::net::UdpSocket`: 실제 네트워크
//! - `MemorySocket`: 프로세스 내부 채널 (테스트/시뮬레이션)

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

/// 비신뢰 데이터그램 채널
pub trait DatagramSocket: Send + Sync + 'static {
    /// 데이터그램 하나 송신
    fn send_to<'a>(
        &'a self,
        buf: &'a [u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send + 'a;

    /// 데이터그램 하나 수신 (도착할 때까지 대기)
    ///
    /// 취소 안전해야 함: 완료 전에 drop된 future는 데이터그램을 소비하지 않는다.
    fn recv_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSocket for UdpSocket {
    fn send_to<'a>(
        &'a self,
        buf: &'a [u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send + 'a {
        UdpSocket::send_to(self, buf, target)
    }

    fn recv_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        UdpSocket::recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// 메모리 소켓 가상 포트 범위 시작
const MEMORY_PORT_BASE: u16 = 40000;

/// 메모리 소켓 가상 포트 할당기
static NEXT_MEMORY_PORT: AtomicU16 = AtomicU16::new(MEMORY_PORT_BASE);

/// 65535 다음은 0이 아니라 범위 시작으로 되돌아감
fn following_port(port: u16) -> u16 {
    match port.checked_add(1) {
        Some(next) => next,
        None => MEMORY_PORT_BASE,
    }
}

/// 프로세스 내부 점대점 데이터그램 소켓
///
/// `pair()`로 만든 두 소켓은 서로에게만 전달한다. 송신 대상 주소는 무시된다.
/// 상대 소켓이 drop되면 송신은 `BrokenPipe`, 수신은 `ConnectionAborted`로 실패한다.
pub struct MemorySocket {
    local: SocketAddr,
    tx: mpsc::UnboundedSender<(Bytes, SocketAddr)>,
    rx: Mutex<mpsc::UnboundedReceiver<(Bytes, SocketAddr)>>,
}

impl MemorySocket {
    /// 연결된 소켓 쌍 생성
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Self {
            local: Self::next_addr(),
            tx: a_tx,
            rx: Mutex::new(a_rx),
        };
        let b = Self {
            local: Self::next_addr(),
            tx: b_tx,
            rx: Mutex::new(b_rx),
        };
        (a, b)
    }

    fn next_addr() -> SocketAddr {
        let port = NEXT_MEMORY_PORT
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |port| {
                Some(following_port(port))
            })
            .unwrap_or_else(|port| port);
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    /// 원시 바이트 주입 (잘못된 데이터그램 테스트용)
    pub fn send_raw(&self, datagram: &[u8]) -> io::Result<()> {
        self.tx
            .send((Bytes::copy_from_slice(datagram), self.local))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer socket dropped"))
    }
}

impl DatagramSocket for MemorySocket {
    fn send_to<'a>(
        &'a self,
        buf: &'a [u8],
        _target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send + 'a {
        async move {
            self.send_raw(buf)?;
            Ok(buf.len())
        }
    }

    fn recv_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        async move {
            let mut rx = self.rx.lock().await;
            match rx.recv().await {
                Some((datagram, from)) => {
                    // UDP처럼 버퍼보다 긴 데이터그램은 잘림
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    Ok((len, from))
                }
                None => Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "peer socket dropped",
                )),
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_port_wraps_to_base() {
        assert_eq!(following_port(MEMORY_PORT_BASE), MEMORY_PORT_BASE + 1);
        assert_eq!(following_port(u16::MAX), MEMORY_PORT_BASE);
    }

    #[tokio::test]
    async fn test_memory_pair_delivers_both_ways() {
        let (a, b) = MemorySocket::pair();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        assert_ne!(a_addr, b_addr);

        a.send_to(b"ping", b_addr).await.unwrap();
        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a_addr);

        b.send_to(b"pong", a_addr).await.unwrap();
        let (len, from) = a.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"pong");
        assert_eq!(from, b_addr);
    }

    #[tokio::test]
    async fn test_memory_truncates_like_udp() {
        let (a, b) = MemorySocket::pair();
        a.send_raw(b"0123456789").unwrap();

        let mut buf = [0u8; 4];
        let (len, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 4);
        assert_eq!(&buf, b"0123");
    }

    #[tokio::test]
    async fn test_memory_peer_drop() {
        let (a, b) = MemorySocket::pair();
        drop(b);

        let err = a.send_to(b"x", a.local_addr().unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let mut buf = [0u8; 4];
        let err = a.recv_from(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[tokio::test]
    async fn test_udp_loopback() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = DatagramSocket::local_addr(&b).unwrap();

        DatagramSocket::send_to(&a, b"hello", b_addr).await.unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = DatagramSocket::recv_from(&b, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
    }
}
