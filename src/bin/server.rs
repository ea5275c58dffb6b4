//! DGFT 서버 (수신자)
//!
//! 데이터그램을 받아 피어별로 파일을 조립하고 통계를 출력한다.
//!
//! 사용법:
//!   cargo run --release --bin dgft-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin dgft-server -- --bind 0.0.0.0:1234 --output received/

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dgft::config::DEFAULT_PORT;
use dgft::{CompletedFile, Config, Receiver};

/// 서버 설정
struct ServerArgs {
    output_dir: Option<PathBuf>,
    config: Config,
}

fn usage() -> &'static str {
    r#"DGFT Server - Datagram File Transfer 수신자

사용법:
  cargo run --release --bin dgft-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>         바인드 주소 (기본: 0.0.0.0:1234)
  -o, --output <DIR>        완료된 파일 저장 디렉터리
  --buffer-size <BYTES>     데이터그램당 최대 페이로드 (기본: 1024)
  --loss <P>                수신 손실 시뮬레이션 확률 (0.0 ~ 1.0)
  --seed <N>                손실 시뮬레이션 시드
  --no-reassemble           파일 재조립 없이 통계만 집계
  --idle-timeout-ms <MS>    유휴 피어 제거 시간 (기본: 30000, 0 = 제거 안 함)
  -h, --help                이 도움말 출력
"#
}

fn parse_args() -> Result<ServerArgs, String> {
    let mut args = ServerArgs {
        output_dir: None,
        config: Config {
            local_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            ..Config::default()
        },
    };

    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut value = |name: &str| iter.next().ok_or_else(|| format!("{} 값 필요", name));

        match flag.as_str() {
            "--bind" | "-b" => {
                args.config.local_address = value("--bind")?
                    .parse()
                    .map_err(|e| format!("유효한 주소 필요: {}", e))?;
            }
            "--output" | "-o" => {
                args.output_dir = Some(PathBuf::from(value("--output")?));
            }
            "--buffer-size" => {
                args.config.chunk_size = value("--buffer-size")?
                    .parse()
                    .map_err(|e| format!("유효한 숫자 필요: {}", e))?;
            }
            "--loss" => {
                args.config.loss_probability = value("--loss")?
                    .parse()
                    .map_err(|e| format!("유효한 확률 필요: {}", e))?;
            }
            "--seed" => {
                args.config.loss_seed = Some(
                    value("--seed")?
                        .parse()
                        .map_err(|e| format!("유효한 숫자 필요: {}", e))?,
                );
            }
            "--no-reassemble" => {
                args.config.reassemble = false;
            }
            "--idle-timeout-ms" => {
                args.config.peer_idle_timeout_ms = value("--idle-timeout-ms")?
                    .parse()
                    .map_err(|e| format!("유효한 숫자 필요: {}", e))?;
            }
            "--help" | "-h" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other)),
        }
    }

    Ok(args)
}

async fn save(output_dir: &Path, file: &CompletedFile) -> std::io::Result<Option<PathBuf>> {
    let Some(data) = &file.stream.data else {
        return Ok(None);
    };

    let name = format!(
        "{}_{}_{}.bin",
        file.peer.ip(),
        file.peer.port(),
        file.stream.stream_index
    );
    let path = output_dir.join(name);
    tokio::fs::write(&path, data).await?;
    Ok(Some(path))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, usage());
            std::process::exit(2);
        }
    };

    if let Some(dir) = &args.output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let (receiver, mut completed) = Receiver::<UdpSocket>::serve(args.config.clone()).await?;
    info!("수신 대기: {}", receiver.local_addr());

    loop {
        tokio::select! {
            next = completed.recv() => {
                let Some(file) = next else { break };

                if file.stream.is_intact() {
                    info!(
                        "파일 수신 완료: {} ({} bytes, {} 패킷)",
                        file.peer, file.stream.bytes, file.stream.packets
                    );
                } else {
                    warn!(
                        "파일 수신 완료 (손실): {} ({}/{} 패킷 누락)",
                        file.peer, file.stream.missing, file.stream.end_sequence
                    );
                }

                if let Some(dir) = &args.output_dir {
                    match save(dir, &file).await {
                        Ok(Some(path)) => info!("저장: {}", path.display()),
                        Ok(None) => warn!("재조립 데이터 없음, 저장 생략: {}", file.peer),
                        Err(e) => warn!("저장 실패: {}", e),
                    }
                }

                if let Some(peer) = receiver.peer_stats(file.peer) {
                    info!("{} | {}", file.peer, peer.summary());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("종료 중...");
                break;
            }
        }
    }

    let counters = receiver.connection().transport().counters();
    let total = receiver.stop().await?;
    info!("전체 | {}", total.summary());
    info!(
        "손실 시뮬레이션 드롭: {} | 잘못된 데이터그램: {}",
        counters.dropped_on_receive, counters.malformed
    );

    Ok(())
}
