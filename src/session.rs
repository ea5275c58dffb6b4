//! 세션 (연결 수명 관리)
//!
//! - `Connection`: 소켓 하나와 종료 신호. close는 멱등
//! - `Sender`: 세그먼터 출력을 pacing하며 전송
//! - `Receiver`: 수신 태스크 하나, 피어 주소별 조립기

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::AsyncRead;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::assembler::{Assembler, CompletedStream};
use crate::packet::Packet;
use crate::pacing::Pacer;
use crate::segmenter::Segmenter;
use crate::socket::DatagramSocket;
use crate::stats::{SendStats, SharedStats, TransferStats};
use crate::transport::{Delivery, Received, Transport};
use crate::{Config, Error, Result};

/// 연결 (로컬 소켓 + 선택적 원격 주소)
pub struct Connection<S = UdpSocket> {
    transport: Transport<S>,
    local: SocketAddr,
    remote: Option<SocketAddr>,
    shutdown: watch::Sender<bool>,
}

impl Connection<UdpSocket> {
    /// UDP 소켓 바인딩
    pub async fn bind(
        local: SocketAddr,
        remote: Option<SocketAddr>,
        config: &Config,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(local).await.map_err(Error::Transport)?;
        Self::new(socket, remote, config)
    }
}

impl<S: DatagramSocket> Connection<S> {
    /// 기존 소켓으로 연결 생성
    pub fn new(socket: S, remote: Option<SocketAddr>, config: &Config) -> Result<Self> {
        config.validate()?;
        let local = socket.local_addr().map_err(Error::Transport)?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            transport: Transport::new(socket, remote, config),
            local,
            remote,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// 연결 종료 (멱등)
    ///
    /// 소켓을 해제하고 `receive()`/pacing 대기 중인 태스크를 깨운다.
    pub fn close(&self) {
        self.transport.close();
        let was_closed = self.shutdown.send_replace(true);
        if !was_closed {
            debug!("연결 종료: {}", self.local);
        }
    }

    /// 종료될 때까지 대기
    pub async fn closed(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|closed| *closed).await;
    }

    pub async fn send(&self, packet: &Packet) -> Result<Delivery> {
        self.transport.send(packet).await
    }

    /// 다음 패킷 수신 (close 시 `ConnectionClosed`)
    pub async fn receive(&self) -> Result<Received> {
        tokio::select! {
            biased;
            _ = self.closed() => Err(Error::ConnectionClosed),
            result = self.transport.receive() => result,
        }
    }

    /// pacing 대기 (close 시 `ConnectionClosed`)
    async fn pause(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.closed() => Err(Error::ConnectionClosed),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// 송신자
pub struct Sender {
    config: Config,
}

impl Sender {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `local_address`에 바인딩하고 `remote_address`로 향하는 연결 생성
    pub async fn open(&self) -> Result<Connection> {
        let connection = Connection::<UdpSocket>::bind(
            self.config.local_address,
            Some(self.config.remote_address),
            &self.config,
        )
        .await?;

        info!(
            "연결 수립: {} -> {}",
            connection.local_addr(),
            self.config.remote_address
        );
        Ok(connection)
    }

    /// 소스 전체를 전송 (DATA... + END)
    ///
    /// 소스/소켓 에러는 전송을 중단하고 반환된다. 소켓 에러는 연결도 닫는다.
    pub async fn transfer<S, R>(&self, connection: &Connection<S>, source: R) -> Result<SendStats>
    where
        S: DatagramSocket,
        R: AsyncRead + Unpin,
    {
        let result = self.drive(connection, source).await;
        if let Err(Error::Transport(e)) = &result {
            warn!("전송 실패, 연결 해제: {}", e);
            connection.close();
        }
        result
    }

    async fn drive<S, R>(&self, connection: &Connection<S>, source: R) -> Result<SendStats>
    where
        S: DatagramSocket,
        R: AsyncRead + Unpin,
    {
        if connection.remote_addr().is_none() {
            return Err(Error::NoPeer);
        }

        // 연결이 받아들이는 최대 페이로드를 넘지 않도록 청크 크기 제한
        let chunk_size = self
            .config
            .chunk_size
            .min(connection.transport().max_payload());
        if chunk_size < self.config.chunk_size {
            debug!(
                "청크 크기 {} -> {} (연결 최대 페이로드)",
                self.config.chunk_size, chunk_size
            );
        }

        let start = Instant::now();
        let mut segmenter = Segmenter::new(source, chunk_size)?;
        let mut pacer = Pacer::from_config(&self.config);
        let mut stats = SendStats::default();

        while let Some(packet) = segmenter.next_packet().await? {
            match connection.send(&packet).await? {
                Delivery::Sent(_) => {
                    stats.packets_sent += 1;
                    stats.bytes_sent += packet.payload.len() as u64;
                }
                Delivery::Dropped => stats.packets_dropped += 1,
            }

            if packet.is_end() {
                stats.end_sequence = packet.sequence;
                break;
            }

            connection.pause(pacer.delay_after(packet.wire_len())).await?;
        }

        stats.elapsed = start.elapsed();
        info!("전송 완료: {}", stats.summary());
        Ok(stats)
    }

    /// 파일 전송 (열기 실패는 `Error::Source`)
    pub async fn transfer_file<S: DatagramSocket>(
        &self,
        connection: &Connection<S>,
        path: impl AsRef<Path>,
    ) -> Result<SendStats> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(Error::Source)?;
        info!("전송 시작: {}", path.display());
        self.transfer(connection, file).await
    }
}

/// 피어 주소와 완료된 스트림
#[derive(Debug, Clone)]
pub struct CompletedFile {
    pub peer: SocketAddr,
    pub stream: CompletedStream,
}

/// 완료 스트림 채널 수신기 타입
pub type CompletedReceiver = mpsc::Receiver<CompletedFile>;

/// 수신자 핸들 (외부에서 제어용)
pub struct Receiver<S = UdpSocket> {
    connection: Arc<Connection<S>>,
    shared: Arc<SharedStats>,
    peers: Arc<DashMap<SocketAddr, TransferStats>>,
    task: JoinHandle<Result<()>>,
}

impl Receiver<UdpSocket> {
    /// `local_address`에 바인딩하고 수신 시작
    pub async fn serve(config: Config) -> Result<(Self, CompletedReceiver)> {
        config.validate()?;
        let socket = UdpSocket::bind(config.local_address)
            .await
            .map_err(Error::Transport)?;
        Self::serve_on(socket, config)
    }
}

impl<S: DatagramSocket> Receiver<S> {
    /// 기존 소켓으로 수신 시작
    pub fn serve_on(socket: S, config: Config) -> Result<(Self, CompletedReceiver)> {
        let connection = Arc::new(Connection::new(socket, None, &config)?);
        let (completed_tx, completed_rx) = mpsc::channel(config.completed_queue_size.max(1));
        let shared = Arc::new(SharedStats::new());
        let peers = Arc::new(DashMap::new());

        info!("DGFT 수신자 시작: {}", connection.local_addr());

        let task = tokio::spawn(receive_loop(
            connection.clone(),
            config.reassemble,
            config.peer_idle_timeout(),
            shared.clone(),
            peers.clone(),
            completed_tx,
        ));

        let receiver = Self {
            connection,
            shared,
            peers,
            task,
        };
        Ok((receiver, completed_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.connection.local_addr()
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.connection
    }

    /// 전체 피어 집계 통계
    pub fn stats(&self) -> TransferStats {
        self.shared.snapshot()
    }

    /// 피어별 통계 (유휴 제거된 피어는 `None`)
    pub fn peer_stats(&self, peer: SocketAddr) -> Option<TransferStats> {
        self.peers.get(&peer).map(|entry| *entry.value())
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.iter().map(|entry| *entry.key()).collect()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// 정지 후 최종 집계 반환
    ///
    /// 수신 태스크가 소켓 에러로 끝났다면 그 에러를 반환한다.
    pub async fn stop(self) -> Result<TransferStats> {
        self.connection.close();

        match self.task.await {
            Ok(Ok(())) => Ok(self.shared.snapshot()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(Error::TaskFailed(e.to_string())),
        }
    }
}

/// 피어별 수신 상태
struct PeerSlot {
    assembler: Assembler,
    last_seen: Instant,
}

async fn receive_loop<S: DatagramSocket>(
    connection: Arc<Connection<S>>,
    reassemble: bool,
    idle_timeout: Option<Duration>,
    shared: Arc<SharedStats>,
    peers: Arc<DashMap<SocketAddr, TransferStats>>,
    completed_tx: mpsc::Sender<CompletedFile>,
) -> Result<()> {
    let mut slots: HashMap<SocketAddr, PeerSlot> = HashMap::new();
    let mut sweep = idle_timeout.map(|timeout| {
        let mut interval = tokio::time::interval((timeout / 2).max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let received = tokio::select! {
            result = connection.receive() => result,
            _ = next_sweep(&mut sweep) => {
                if let Some(timeout) = idle_timeout {
                    evict_idle(&mut slots, &peers, timeout);
                }
                continue;
            }
        };

        let Received { packet, from } = match received {
            Ok(received) => received,
            Err(Error::ConnectionClosed) => {
                debug!("수신 루프 종료: {}", connection.local_addr());
                return Ok(());
            }
            Err(e) => {
                warn!("수신 에러, 연결 해제: {}", e);
                connection.close();
                return Err(e);
            }
        };

        // 종료 후 도착한 패킷은 처리하지 않음
        if connection.is_closed() {
            return Ok(());
        }

        let slot = slots.entry(from).or_insert_with(|| {
            info!("새 피어: {}", from);
            PeerSlot {
                assembler: Assembler::new(reassemble).with_shared(shared.clone()),
                last_seen: Instant::now(),
            }
        });
        slot.last_seen = Instant::now();

        let completed = slot.assembler.on_packet(packet);
        peers.insert(from, slot.assembler.stats());

        if let Some(stream) = completed {
            tokio::select! {
                biased;
                _ = connection.closed() => return Ok(()),
                sent = completed_tx.send(CompletedFile { peer: from, stream }) => {
                    if sent.is_err() {
                        debug!("완료 채널 닫힘, 결과 폐기");
                    }
                }
            }
        }
    }
}

/// 다음 유휴 검사 시점까지 대기 (비활성이면 영원히 대기)
async fn next_sweep(sweep: &mut Option<Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// `timeout` 동안 패킷이 없던 피어의 조립기와 통계 제거
fn evict_idle(
    slots: &mut HashMap<SocketAddr, PeerSlot>,
    peers: &DashMap<SocketAddr, TransferStats>,
    timeout: Duration,
) {
    let now = Instant::now();
    slots.retain(|peer, slot| {
        if now.duration_since(slot.last_seen) < timeout {
            return true;
        }

        let pending = slot.assembler.pending_packets();
        if pending > 0 {
            warn!("유휴 피어 제거: {} (미완료 스트림 {} 패킷 폐기)", peer, pending);
        } else {
            debug!("유휴 피어 제거: {}", peer);
        }
        peers.remove(peer);
        false
    });
}
