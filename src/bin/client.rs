//! DGFT 클라이언트 (송신자)
//!
//! 파일을 청크로 나누어 서버로 흘려보내고 END 마커로 끝낸다.
//!
//! 사용법:
//!   cargo run --release --bin dgft-client -- [OPTIONS] [FILE]
//!
//! 예시:
//!   cargo run --release --bin dgft-client -- --server 127.0.0.1:1234 File.txt
//!
//!   # 2MB/s 토큰 버킷 + 10% 손실 시뮬레이션
//!   cargo run --release --bin dgft-client -- -s 127.0.0.1:1234 --rate 2097152 --loss 0.1 data.bin

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use dgft::{Config, Sender};

/// 클라이언트 설정
struct ClientArgs {
    file: PathBuf,
    config: Config,
}

fn usage() -> &'static str {
    r#"DGFT Client - Datagram File Transfer 송신자

사용법:
  cargo run --release --bin dgft-client -- [OPTIONS] [FILE]

옵션:
  -s, --server <ADDR>       서버 주소 (기본: 127.0.0.1:1234)
  -b, --bind <ADDR>         로컬 바인드 주소 (기본: 0.0.0.0:0 = 자동 할당)
  --chunk-size <BYTES>      청크 크기 (기본: 1024)
  --delay-ms <MS>           패킷 간 지연 (기본: 10, 0 = 최대 속도)
  --rate <BYTES/SEC>        토큰 버킷 송신 속도 (지정 시 --delay-ms 무시)
  --burst <BYTES>           토큰 버킷 버스트 크기
  --loss <P>                송신 손실 시뮬레이션 확률 (0.0 ~ 1.0)
  --seed <N>                손실 시뮬레이션 시드
  -h, --help                이 도움말 출력

FILE 기본값: File.txt
"#
}

fn parse_args() -> Result<ClientArgs, String> {
    let mut args = ClientArgs {
        file: PathBuf::from("File.txt"),
        config: Config::default(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        let mut value = |name: &str| iter.next().ok_or_else(|| format!("{} 값 필요", name));

        match flag.as_str() {
            "--server" | "-s" => {
                args.config.remote_address = value("--server")?
                    .parse()
                    .map_err(|e| format!("유효한 주소 필요: {}", e))?;
            }
            "--bind" | "-b" => {
                args.config.local_address = value("--bind")?
                    .parse()
                    .map_err(|e| format!("유효한 주소 필요: {}", e))?;
            }
            "--chunk-size" => {
                args.config.chunk_size = value("--chunk-size")?
                    .parse()
                    .map_err(|e| format!("유효한 숫자 필요: {}", e))?;
            }
            "--delay-ms" => {
                args.config.pacing_delay_ms = value("--delay-ms")?
                    .parse()
                    .map_err(|e| format!("유효한 숫자 필요: {}", e))?;
            }
            "--rate" => {
                args.config.pacing_rate = Some(
                    value("--rate")?
                        .parse()
                        .map_err(|e| format!("유효한 숫자 필요: {}", e))?,
                );
            }
            "--burst" => {
                args.config.pacing_burst = value("--burst")?
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
            "--help" | "-h" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                return Err(format!("알 수 없는 옵션: {}", other));
            }
            path => {
                args.file = PathBuf::from(path);
            }
        }
    }

    Ok(args)
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

    let sender = Sender::new(args.config)?;
    let connection = sender.open().await?;

    let result = sender.transfer_file(&connection, &args.file).await;
    connection.close();

    let stats = result?;
    info!("{}", stats.summary());
    info!("클라이언트 종료");

    Ok(())
}
