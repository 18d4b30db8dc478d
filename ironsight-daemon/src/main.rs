use anyhow::Result;
use clap::Parser;

use ironsight_core::config::IronsightConfig;
use ironsight_daemon::cli::DaemonCli;
use ironsight_daemon::{logging, orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonCli::parse();

    // Load the config file when present; CLI-only invocations start from defaults.
    let mut config = if args.config.exists() {
        IronsightConfig::load(&args.config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?
    } else if args.domains.is_empty() {
        return Err(anyhow::anyhow!(
            "config file {} not found and no --domain given",
            args.config.display()
        ));
    } else {
        IronsightConfig::default()
    };

    // CLI overrides take precedence over the file.
    if !args.domains.is_empty() {
        config.scope.domains = args.domains.clone();
    }
    if let Some(output) = &args.output {
        config.general.output_file = output.clone();
    }
    if let Some(level) = &args.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.general.log_format = format.clone();
    }

    if args.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        println!("configuration OK");
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        domains = config.scope.domains.len(),
        "ironsight-daemon starting"
    );

    let mut orch = orchestrator::Orchestrator::build_from_config(config).await?;
    orch.run().await?;

    tracing::info!("ironsight-daemon shut down");
    Ok(())
}
