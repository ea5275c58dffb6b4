//! 전송 어댑터
//!
//! - Packet <-> 데이터그램 직렬화
//! - 손실 시뮬레이션 (송신/수신 각각 독립적으로 드롭)
//! - 잘못된 데이터그램은 로그만 남기고 버림
//!
//! 순서 보장 없음. 재전송 없음.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{trace, warn};

use crate::error::ProtocolError;
use crate::packet::Packet;
use crate::socket::DatagramSocket;
use crate::{Config, Error, Result};

/// 확률적 패킷 드롭 (시뮬레이션 전용)
#[derive(Debug)]
pub struct LossSimulator {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl LossSimulator {
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0.0, Some(0))
    }

    /// 이번 패킷을 버릴지 결정
    pub fn should_drop(&self) -> bool {
        if self.probability <= 0.0 {
            return false;
        }
        if self.probability >= 1.0 {
            return true;
        }
        self.rng.lock().gen_bool(self.probability)
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

/// 송신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 소켓으로 나감 (전송 바이트)
    Sent(usize),

    /// 손실 시뮬레이션으로 버려짐
    Dropped,
}

/// 수신된 패킷과 송신자 주소
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub packet: Packet,
    pub from: SocketAddr,
}

/// 전송 카운터 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCounters {
    pub dropped_on_send: u64,
    pub dropped_on_receive: u64,
    pub malformed: u64,
}

/// 전송 어댑터
pub struct Transport<S> {
    /// 소켓 슬롯 (close 시 비움)
    socket: RwLock<Option<Arc<S>>>,

    /// 기본 송신 대상
    peer: Option<SocketAddr>,

    /// 데이터그램당 최대 페이로드
    max_payload: usize,

    loss: LossSimulator,

    dropped_on_send: AtomicU64,
    dropped_on_receive: AtomicU64,
    malformed: AtomicU64,
}

impl<S: DatagramSocket> Transport<S> {
    pub fn new(socket: S, peer: Option<SocketAddr>, config: &Config) -> Self {
        Self {
            socket: RwLock::new(Some(Arc::new(socket))),
            peer,
            max_payload: config.chunk_size,
            loss: LossSimulator::new(config.loss_probability, config.loss_seed),
            dropped_on_send: AtomicU64::new(0),
            dropped_on_receive: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    fn socket(&self) -> Result<Arc<S>> {
        self.socket.read().clone().ok_or(Error::ConnectionClosed)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket()?.local_addr().map_err(Error::Transport)
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// 기본 송신 대상으로 전송
    pub async fn send(&self, packet: &Packet) -> Result<Delivery> {
        let peer = self.peer.ok_or(Error::NoPeer)?;
        self.send_to(packet, peer).await
    }

    /// 지정 주소로 전송
    pub async fn send_to(&self, packet: &Packet, target: SocketAddr) -> Result<Delivery> {
        if packet.payload.len() > self.max_payload {
            return Err(ProtocolError::PayloadTooLarge {
                len: packet.payload.len(),
                max: self.max_payload,
            }
            .into());
        }

        let socket = self.socket()?;

        if self.loss.should_drop() {
            self.dropped_on_send.fetch_add(1, Ordering::Relaxed);
            trace!("송신 드롭 (시뮬레이션): seq={}", packet.sequence);
            return Ok(Delivery::Dropped);
        }

        let bytes = packet.to_bytes();
        let sent = socket
            .send_to(&bytes, target)
            .await
            .map_err(Error::Transport)?;

        trace!("송신: {:?} seq={} -> {}", packet.kind, packet.sequence, target);
        Ok(Delivery::Sent(sent))
    }

    /// 유효한 패킷이 도착할 때까지 대기
    pub async fn receive(&self) -> Result<Received> {
        let socket = self.socket()?;

        // 초과 페이로드 판별을 위해 1바이트 여유
        let mut buf = vec![0u8; crate::HEADER_LEN + self.max_payload + 1];

        loop {
            let (len, from) = socket.recv_from(&mut buf).await.map_err(Error::Transport)?;

            if self.loss.should_drop() {
                self.dropped_on_receive.fetch_add(1, Ordering::Relaxed);
                trace!("수신 드롭 (시뮬레이션): {} bytes from {}", len, from);
                continue;
            }

            match Packet::from_bytes(&buf[..len], self.max_payload) {
                Ok(packet) => {
                    trace!("수신: {:?} seq={} <- {}", packet.kind, packet.sequence, from);
                    return Ok(Received { packet, from });
                }
                Err(e) => {
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!("잘못된 데이터그램 드롭 ({}): {}", from, e);
                }
            }
        }
    }

    /// 소켓 해제 (멱등)
    ///
    /// 진행 중인 `receive()`가 잡고 있는 참조는 호출자가 취소할 때 해제된다.
    pub fn close(&self) -> bool {
        self.socket.write().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.socket.read().is_none()
    }

    pub fn counters(&self) -> TransportCounters {
        TransportCounters {
            dropped_on_send: self.dropped_on_send.load(Ordering::Relaxed),
            dropped_on_receive: self.dropped_on_receive.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::MemorySocket;
    use bytes::Bytes;
    use std::time::Duration;

    fn pair(config: &Config) -> (Transport<MemorySocket>, Transport<MemorySocket>) {
        let (a, b) = MemorySocket::pair();
        let b_addr = b.local_addr().unwrap();
        let a_addr = a.local_addr().unwrap();
        (
            Transport::new(a, Some(b_addr), config),
            Transport::new(b, Some(a_addr), config),
        )
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let config = Config::default();
        let (tx, rx) = pair(&config);

        let packet = Packet::data(7, Bytes::from_static(b"payload"));
        assert_eq!(tx.send(&packet).await.unwrap(), Delivery::Sent(packet.wire_len()));

        let received = rx.receive().await.unwrap();
        assert_eq!(received.packet, packet);
        assert_eq!(received.from, tx.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_skipped() {
        let config = Config::default();
        let (a, b) = MemorySocket::pair();
        let rx = Transport::new(b, None, &config);

        a.send_raw(&[0, 1, 2]).unwrap(); // 헤더 잘림
        a.send_raw(&[9, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap(); // 알 수 없는 종류
        a.send_raw(&Packet::end(4).to_bytes()).unwrap();

        let received = rx.receive().await.unwrap();
        assert!(received.packet.is_end());
        assert_eq!(received.packet.sequence, 4);
        assert_eq!(rx.counters().malformed, 2);
    }

    #[tokio::test]
    async fn test_oversized_payload() {
        let config = Config {
            chunk_size: 8,
            ..Config::default()
        };
        let (tx, rx) = pair(&config);

        let big = Packet::data(0, Bytes::from(vec![0u8; 9]));
        assert!(matches!(
            tx.send(&big).await,
            Err(Error::Protocol(ProtocolError::PayloadTooLarge { len: 9, max: 8 }))
        ));

        // 큰 설정의 송신자가 보낸 데이터그램은 수신측에서 드롭
        let wide = Config::default();
        let (a, b) = MemorySocket::pair();
        let wide_tx = Transport::new(a, Some(b.local_addr().unwrap()), &wide);
        let narrow_rx = Transport::new(b, None, &config);
        wide_tx.send(&big).await.unwrap();
        wide_tx.send(&Packet::end(1)).await.unwrap();

        let received = narrow_rx.receive().await.unwrap();
        assert!(received.packet.is_end());
        assert_eq!(narrow_rx.counters().malformed, 1);
        drop(rx);
    }

    #[tokio::test]
    async fn test_full_loss_on_send() {
        let config = Config::simulation(1.0);
        let (tx, rx) = pair(&config);

        for seq in 0..3 {
            let packet = Packet::data(seq, Bytes::from_static(b"x"));
            assert_eq!(tx.send(&packet).await.unwrap(), Delivery::Dropped);
        }
        assert_eq!(tx.send(&Packet::end(3)).await.unwrap(), Delivery::Dropped);
        assert_eq!(tx.counters().dropped_on_send, 4);

        let nothing = tokio::time::timeout(Duration::from_millis(50), rx.receive()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_full_loss_on_receive() {
        let (a, b) = MemorySocket::pair();
        let rx = Transport::new(b, None, &Config::simulation(1.0));

        a.send_raw(&Packet::end(0).to_bytes()).unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(50), rx.receive()).await;
        assert!(nothing.is_err());
        assert_eq!(rx.counters().dropped_on_receive, 1);
    }

    #[test]
    fn test_seeded_loss_is_deterministic() {
        let a = LossSimulator::new(0.5, Some(42));
        let b = LossSimulator::new(0.5, Some(42));
        let pattern_a: Vec<bool> = (0..64).map(|_| a.should_drop()).collect();
        let pattern_b: Vec<bool> = (0..64).map(|_| b.should_drop()).collect();
        assert_eq!(pattern_a, pattern_b);
        assert!(pattern_a.iter().any(|&d| d));
        assert!(pattern_a.iter().any(|&d| !d));

        assert!(!LossSimulator::disabled().should_drop());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let config = Config::default();
        let (tx, _rx) = pair(&config);

        assert!(tx.close());
        assert!(!tx.close());
        assert!(tx.is_closed());
        assert!(matches!(
            tx.send(&Packet::end(0)).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(tx.receive().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_socket_failure_is_transport_error() {
        let config = Config::default();
        let (tx, rx) = pair(&config);
        drop(rx);

        assert!(matches!(
            tx.send(&Packet::end(0)).await,
            Err(Error::Transport(_))
        ));
        assert!(matches!(tx.receive().await, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_send_without_peer() {
        let (a, _b) = MemorySocket::pair();
        let transport = Transport::new(a, None, &Config::default());
        assert!(matches!(transport.send(&Packet::end(0)).await, Err(Error::NoPeer)));
    }
}
