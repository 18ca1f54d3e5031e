//! protopackd - push-triggered packaging daemon
//!
//! Receives repository push webhooks and runs the configured packaging
//! pipeline (JVM jar, Ruby gem, npm package or source release) for each
//! push in its own task.

mod credentials;
mod server;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser as _;
use protopack_core::{
    init_tracing, CommandRunner, Config, GitClient, Language, LocalFs, LogSettings, Metrics,
    TokioCommandRunner,
};
use protopack_pipeline::{
    BundledTemplates, Dispatcher, NpmProcessor, Processor, ReleaseProcessor, RubyProcessor,
    ScalaProcessor, TemplateStore, Workspace,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::server::AppState;
use crate::webhook::Parser;

#[derive(clap::Parser)]
#[command(name = "protopackd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Push-triggered packaging of protobuf-generated sources", long_about = None)]
struct Cli {
    /// Path to a YAML config file; PF_* variables override it
    #[arg(short, long, env = "PROTOPACK_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("could not read in config")?;
    init_tracing(LogSettings::from_config(&config).force_json(cli.json));

    let language = config
        .language
        .context("language is not configured")?;
    info!(%language, name = %config.name, port = config.port, "protopackd starting");

    if language == Language::Ruby && config.ruby.publish {
        credentials::bootstrap(&config.ruby)
            .await
            .context("could not install gem credentials")?;
    }

    let metrics = Arc::new(Metrics::new(language, config.name.clone()));
    let processor = build_processor(&config, language, metrics.clone())?;
    let parser = if config.webhook.secret.is_empty() {
        warn!("webhook secret is empty; accepting unsigned deliveries");
        Parser::insecure()
    } else {
        Parser::secure(&config.webhook.secret)?
    };
    info!(secure = parser.is_secure(), "webhook parser ready");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let dispatcher = Dispatcher::new(processor, cancel.clone());
    let state = AppState {
        parser: Arc::new(parser),
        dispatcher: dispatcher.clone(),
        metrics: metrics.clone(),
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("could not bind port {}", config.port))?;
    info!(addr = %listener.local_addr()?, "listening");

    server::serve(listener, state, cancel).await?;

    dispatcher.shutdown().await;
    metrics.flush();
    info!("protopackd stopped");
    Ok(())
}

/// Wire the processor for the configured ecosystem to the real collaborators.
fn build_processor(
    config: &Config,
    language: Language,
    metrics: Arc<Metrics>,
) -> Result<Arc<dyn Processor>> {
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let fs = Arc::new(LocalFs::new());
    let git = Arc::new(
        GitClient::new(config.git.clone(), runner.clone())
            .context("could not create git client")?,
    );
    let templates: Arc<dyn TemplateStore> = Arc::new(BundledTemplates::new());
    let workspace = Workspace::new(
        config.scratch_root(),
        fs.clone(),
        metrics,
        config.main_branch.clone(),
    );

    let processor: Arc<dyn Processor> = match language {
        Language::Scala => Arc::new(ScalaProcessor::new(
            config.scala.clone(),
            workspace,
            fs,
            git,
            templates,
            runner,
        )),
        Language::Ruby => Arc::new(RubyProcessor::new(
            config.ruby.clone(),
            workspace,
            fs,
            git,
            templates,
            runner,
        )),
        Language::Npm => Arc::new(NpmProcessor::new(
            config.npm.clone(),
            workspace,
            fs,
            git,
            templates,
            runner,
        )),
        Language::Release => Arc::new(ReleaseProcessor::new(workspace, git.clone(), git)),
    };
    Ok(processor)
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, cancelling packaging runs");
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        Config::from_yaml_str(yaml).unwrap().validate().unwrap()
    }

    #[test]
    fn cli_reads_config_flag() {
        let cli = Cli::try_parse_from(["protopackd", "-c", "/etc/protopack.yaml", "--json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/protopack.yaml")));
        assert!(cli.json);
    }

    #[test]
    fn processor_is_built_for_every_language() {
        let scratch = tempfile::tempdir().unwrap();
        let root = scratch.path().display();
        let configs = [
            format!(
                "language: scala\nscratch_root: {root}\nscala:\n  jar_name: protos\n  maven_repo_publish_target: https://maven.acme.dev/releases\n"
            ),
            format!("language: ruby\nscratch_root: {root}\nruby:\n  gem_name: protos\n"),
            format!("language: npm\nscratch_root: {root}\nnpm:\n  package_name: \"@acme/protos\"\n"),
            format!("language: release\nscratch_root: {root}\n"),
        ];
        for yaml in configs {
            let config = config(&yaml);
            let language = config.language.unwrap();
            let metrics = Arc::new(Metrics::new(language, config.name.clone()));
            assert!(build_processor(&config, language, metrics).is_ok(), "{language}");
        }
    }
}
