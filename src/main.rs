use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transcast::backends::BackendClient;
use transcast::cache::ResponseCache;
use transcast::config::TranscastConfig;
use transcast::logger::init_tracing;
use transcast::orchestrator::{EmitMode, Orchestrator, TranslationEvent};
use transcast::router::RoutingScorer;

#[derive(Parser, Debug)]
#[command(
    name = "transcast",
    version,
    about = "Translate text with several LLM backends at once"
)]
struct Cli {
    /// 配置文件，默认 ~/.transcast/config.yaml
    #[arg(long)]
    config: Option<PathBuf>,
    /// 覆盖配置中的激活服务
    #[arg(long)]
    active: Option<String>,
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,
    /// 原文；为空时从标准输入读取
    text: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Snapshot,
    Delta,
}

impl From<Mode> for EmitMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Snapshot => EmitMode::Snapshot,
            Mode::Delta => EmitMode::Delta,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = TranscastConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    init_tracing(&config.logging);
    debug!(?cli, "命令行参数");

    if let Some(mode) = cli.mode {
        config.orchestrator.emit_mode = mode.into();
    }
    if let Some(active) = cli.active.clone() {
        if !config.services.iter().any(|s| s.id == active) {
            bail!("未知的服务: {}", active);
        }
        config.active_service_id = Some(active);
    }

    let text = if cli.text.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("读取标准输入失败")?;
        buf
    } else {
        cli.text.join(" ")
    };

    let cache = Arc::new(ResponseCache::new(config.cache.capacity));
    let client = BackendClient::from_factory(
        &config.client.client_factory(),
        cache,
        config.client.options.clone(),
    )?;
    let scorer = Arc::new(RoutingScorer::new(
        config.routing.weights.clone(),
        config.routing.adaptive,
    ));
    let orchestrator = Orchestrator::new(Arc::new(client), scorer, config.orchestrator.clone());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl-C，取消翻译");
            ctrl_c.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel::<TranslationEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("事件序列化失败: {}", e),
            }
        }
    });

    let outcome = orchestrator
        .translate(config.request(text.trim()), tx, cancel)
        .await;
    printer.await.context("事件输出任务异常退出")?;

    info!(
        "翻译结束: done={} error={}",
        outcome.summary.done, outcome.summary.error
    );
    if let Some(error) = outcome.error {
        bail!(error);
    }
    Ok(())
}
