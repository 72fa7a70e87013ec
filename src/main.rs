use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use scheduler_config::{AppConfig, LogFormat};
use scheduler_infrastructure::{init_logging, init_metrics};
use tracing::{error, info, warn};

use flow_scheduler::app::Application;
use flow_scheduler::shutdown::{wait_for_shutdown_signal, ShutdownManager};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("flow-scheduler")
        .version("1.0.0")
        .about("工作流任务调度进程")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时按默认位置查找"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .value_name("N")
                .help("并发上限")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("poll")
                .long("poll")
                .value_name("SECONDS")
                .help("轮询间隔（秒）")
                .value_parser(clap::value_parser!(u64)),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .context("加载配置失败")?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format
            .parse::<LogFormat>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Some(limit) = matches.get_one::<usize>("concurrency") {
        config.scheduler.concurrency_limit = *limit;
    }
    if let Some(poll) = matches.get_one::<u64>("poll") {
        config.scheduler.poll_interval_seconds = *poll;
    }

    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;

    info!("启动工作流任务调度进程");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }
    info!(
        concurrency = config.scheduler.concurrency_limit,
        poll_interval_secs = config.scheduler.poll_interval_seconds,
        state_store = ?config.state_store.backend,
        "调度参数"
    );

    if let Some(bind) = &config.observability.metrics_bind_address {
        init_metrics(bind)?;
        info!("Prometheus 指标监听于 {bind}");
    }

    let app = Arc::new(Application::new(config).await?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("调度进程运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("调度进程已优雅关闭"),
        Ok(Err(e)) => error!("调度进程关闭时发生错误: {e}"),
        Err(_) => warn!("调度进程关闭超时，强制退出"),
    }

    Ok(())
}
