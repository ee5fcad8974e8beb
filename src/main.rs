use std::{process, sync::OnceLock, time::Duration};

use boothscan::{
    config::{Config, LOCAL_OFFSET},
    core::{
        publisher::ScanPublisher,
        scan_loop::{LoopEnd, ScanLoop},
    },
    logger::LoggerManager,
    print_error,
};
use boothscan_mqtt::MqttManager;
use once_cell::sync::Lazy;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

fn main() {
    // Resolve the local offset while the process is still single-threaded.
    Lazy::force(&LOCAL_OFFSET);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            print_error!("Failed to start async runtime: {}", e);
            process::exit(1);
        });

    let code = runtime.block_on(run());

    // The stdin reader thread may still be blocked on a read.
    runtime.shutdown_timeout(Duration::from_millis(100));
    process::exit(code);
}

async fn run() -> i32 {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting boothscan version {}...", env!("CARGO_PKG_VERSION"));
    debug!("{:#?}", cfg.transport);
    info!("Log level: {}", cfg.logger.level);
    info!("Booth id: {}", cfg.scanner.booth_id);

    let cancel = CancellationToken::new();

    let manager = MqttManager::from_config(cfg.transport.clone())
        .unwrap_or_else(|e| {
            error!("Failed to create MqttManager: {}", e);
            process::exit(1);
        })
        .with_cancel_token(cancel.clone());

    let instance = manager.build_and_start().unwrap_or_else(|e| {
        error!("Failed to build and start MQTT session: {}", e);
        process::exit(1);
    });

    tokio::select! {
        result = instance.ensure_connected() => {
            if let Err(e) = result {
                error!("Initial connection aborted: {}", e);
                instance.shutdown().await;
                return 0;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C before the first connection, shutting down...");
            instance.shutdown().await;
            return 0;
        }
    }
    info!("Ready to scan!");

    let publisher = ScanPublisher::new(instance.publisher(), cfg.scanner.booth_id);
    let scan_loop = ScanLoop::new(
        BufReader::new(tokio::io::stdin()),
        publisher,
        &cfg.scanner,
        cancel.clone(),
    );
    let scan_task = tokio::spawn(scan_loop.run());

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            cancel.cancel();
        });
    }

    let code = match scan_task.await {
        Ok(summary) => {
            info!(
                "Scanning finished: {} published, {} duplicates, {} rejected, {} failed",
                summary.published, summary.duplicates, summary.rejected, summary.failed
            );
            if summary.end == LoopEnd::InputError {
                error!("Scanner input failed");
                1
            } else {
                0
            }
        }
        Err(e) => {
            error!("Scan loop task failed: {}", e);
            1
        }
    };

    instance.shutdown().await;
    info!("Shutdown complete");
    code
}
