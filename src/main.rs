use async_delete::adapters::{load_snapshot, persist_run, save_snapshot};
use async_delete::domain::ports::{Clock, ConfigProvider};
use async_delete::utils::error::{DeleteError, ErrorSeverity};
use async_delete::utils::{logger, validation::Validate};
use async_delete::{
    CliConfig, DeletionEngine, EngineSettings, InMemoryRegistry, LocalStorage, LoggingDnsQueue,
    SystemClock, TomlConfig,
};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 讀取 TOML 設定（若有指定）
    let toml_config = match config.config.as_deref().map(TomlConfig::from_file).transpose() {
        Ok(toml_config) => toml_config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    // 初始化日誌
    let json_logs = config.json_logs || toml_config.as_ref().is_some_and(|t| t.json_logs());
    if json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting async-delete");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    let validation = match &toml_config {
        Some(toml_config) => toml_config.validate(),
        None => config.validate(),
    };
    if let Err(e) = validation {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }
    let provider: &dyn ConfigProvider = match &toml_config {
        Some(toml_config) => toml_config,
        None => &config,
    };

    let monitor_enabled =
        config.monitor || toml_config.as_ref().is_some_and(|t| t.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(e) = run(provider, monitor_enabled).await {
        exit_with(e);
    }
    Ok(())
}

async fn run(provider: &dyn ConfigProvider, monitor_enabled: bool) -> async_delete::Result<()> {
    let state_storage = LocalStorage::new(".");
    let snapshot = load_snapshot(&state_storage, provider.state_file()).await?;
    tracing::info!(
        "📂 Loaded {} resources and {} queued tasks from {}",
        snapshot.resources.len(),
        snapshot.tasks.len(),
        provider.state_file()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(InMemoryRegistry::from_snapshot(snapshot, Arc::clone(&clock)));
    let dns_queue = Arc::new(LoggingDnsQueue::new());

    let engine = DeletionEngine::new_with_monitoring(
        Arc::clone(&registry),
        Arc::clone(&registry),
        dns_queue,
        clock,
        EngineSettings::from_config(provider),
        monitor_enabled,
    );

    let outcomes = match engine.run().await? {
        Some(report) => {
            tracing::info!(
                "✅ Job {} decided {} requests ({} reduce failures)",
                report.job_id,
                report.outputs.len(),
                report.reduce_failures
            );
            report.outputs
        }
        None => {
            println!("✅ No pending deletions");
            Vec::new()
        }
    };

    // 寫回狀態檔與報表
    let snapshot = registry.snapshot().await;
    save_snapshot(&state_storage, provider.state_file(), &snapshot).await?;
    let output_storage = LocalStorage::new(provider.output_path());
    persist_run(&output_storage, &snapshot, &outcomes).await?;

    println!("✅ Async deletion pass completed!");
    println!("📁 Report saved to: {}", provider.output_path());
    Ok(())
}

fn exit_with(e: DeleteError) {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Async deletion failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 處理錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    };

    if exit_code > 0 {
        std::process::exit(exit_code);
    }
}
