//! rlm-sandbox - Lua execution sandbox for recursive language model hosts
//!
//! Reads one JSON-RPC request per line from stdin and writes one response
//! per line to stdout. Evaluated code may call back into the host
//! (`llm_query`, `rlm_query`, `batch_llm_query`); those requests are
//! written to stdout and their replies read from stdin in between.
//!
//! Logs go to stderr and, optionally, to a log file. Never to stdout.
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`RLM_*`)
//! 3. Project config (`.rlm/config.toml` in the project directory)
//! 4. Global config (`~/.rlm/config.toml`, or `--config`)
//! 5. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `RLM_DEBUG`: Enable debug logging (`true`/`false`)
//! - `RLM_BRIDGE_PREFIX`: Bridge correlation id prefix
//! - `RLM_LOG_FILE`: Log directory (enables file logging)
//! - `RLM_LOG_LEVEL`: File log level

mod tracing_writer;

use anyhow::{Context, Result};
use clap::Parser;
use rlm_runtime::config::{ConfigError, ConfigLoader, ConfigResolver, SandboxConfig};
use rlm_runtime::{LineTransport, Server};
use std::path::PathBuf;
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// rlm-sandbox - persistent Lua execution context over stdio
#[derive(Parser, Debug)]
#[command(name = "rlm-sandbox")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable info logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long)]
    project: Option<PathBuf>,

    /// Global config file (defaults to ~/.rlm/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log file directory; enables file logging (also: RLM_LOG_FILE)
    #[arg(long, value_name = "DIR")]
    log_file: Option<PathBuf>,

    /// File log level (also: RLM_LOG_LEVEL, default: debug)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// CLI-based configuration resolver.
///
/// Merges file/env config via [`ConfigLoader`] and applies CLI argument
/// overrides as the highest-priority layer.
struct CliConfigResolver {
    project_root: PathBuf,
    config_path: Option<PathBuf>,
    debug: bool,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        let project_root = args.project.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to get current directory, using '.'");
                PathBuf::from(".")
            })
        });

        Self {
            project_root,
            config_path: args.config.clone(),
            debug: args.debug,
            log_file: args.log_file.clone(),
            log_level: args.log_level.clone(),
        }
    }
}

impl ConfigResolver for CliConfigResolver {
    fn resolve(&self) -> Result<SandboxConfig, ConfigError> {
        let mut loader = ConfigLoader::new().with_project_root(&self.project_root);
        if let Some(ref path) = self.config_path {
            loader = loader.with_global_config(path);
        }

        let mut config = loader.load()?;

        // CLI args override (highest priority)
        if self.debug {
            config.debug = true;
        }
        if let Some(ref p) = self.log_file {
            config.logging.file = true;
            config.logging.file_path = Some(p.clone());
        }
        if let Some(ref level) = self.log_level {
            config.logging.file_level.clone_from(level);
        }

        Ok(config)
    }
}

/// Stderr filter: `--debug` > `--verbose` > `RUST_LOG` > `warn`.
fn stderr_filter(debug: bool, verbose: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn init_tracing(args: &Args, config: &SandboxConfig) {
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter(config.debug, args.verbose));

    let log_file = if config.logging.file {
        tracing_writer::open_log_file(&config.logging.resolved_file_path())
    } else {
        None
    };

    if let Some(file) = log_file {
        let file_filter = EnvFilter::new(config.logging.file_filter_directive());
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(tracing_writer::LogFileMakeWriter::new(file))
            .with_filter(file_filter);

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stderr_layer).init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = CliConfigResolver::from_args(&args);
    let config = resolver
        .resolve()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    init_tracing(&args, &config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        project = %resolver.project_root.display(),
        bridge_prefix = %config.bridge.id_prefix,
        "rlm-sandbox starting"
    );
    if config.logging.file {
        info!(path = %config.logging.resolved_file_path().display(), "File logging enabled");
    }

    let transport = Rc::new(LineTransport::stdio());
    let mut server =
        Server::with_config(transport, &config)
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("failed to create execution context")?;
    let stats = server.run().context("transport failure")?;

    info!(
        responses = stats.responses,
        errors = stats.errors,
        "rlm-sandbox exiting"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Resolver over an empty project dir and a missing global config.
    fn resolver_with(debug: bool, log_file: Option<PathBuf>) -> (TempDir, CliConfigResolver) {
        let tmp = TempDir::new().expect("temp project dir");
        let resolver = CliConfigResolver {
            project_root: tmp.path().to_path_buf(),
            config_path: Some(tmp.path().join("missing-global.toml")),
            debug,
            log_file,
            log_level: None,
        };
        (tmp, resolver)
    }

    #[test]
    fn resolve_defaults_no_overrides() {
        let (_tmp, resolver) = resolver_with(false, None);
        let config = resolver.resolve().expect("resolve should succeed");

        assert!(!config.debug);
        assert!(!config.logging.file);
    }

    #[test]
    fn resolve_debug_override() {
        let (_tmp, resolver) = resolver_with(true, None);
        let config = resolver.resolve().expect("resolve should succeed");
        assert!(config.debug);
    }

    #[test]
    fn resolve_log_file_enables_file_logging() {
        let path = PathBuf::from("/custom/logs");
        let (_tmp, mut resolver) = resolver_with(false, Some(path.clone()));
        resolver.log_level = Some("trace".into());
        let config = resolver.resolve().expect("resolve should succeed");

        assert!(config.logging.file);
        assert_eq!(config.logging.file_path, Some(path));
        assert_eq!(config.logging.file_level, "trace");
    }

    #[test]
    fn project_config_is_loaded() {
        let (tmp, resolver) = resolver_with(false, None);
        let dir = tmp.path().join(".rlm");
        std::fs::create_dir_all(&dir).expect("create .rlm");
        std::fs::write(dir.join("config.toml"), "[context]\nvariable = \"doc\"\n")
            .expect("write config");

        let config = resolver.resolve().expect("resolve should succeed");
        assert_eq!(config.context.variable, "doc");
    }

    /// CLI flag=false does not override file config values.
    #[test]
    fn false_flags_preserve_loader_values() {
        let (tmp, resolver) = resolver_with(false, None);
        std::fs::write(tmp.path().join("missing-global.toml"), "debug = true\n")
            .expect("write global config");

        let config = resolver.resolve().expect("resolve should succeed");
        assert!(config.debug);
    }

    #[test]
    fn from_args_defaults() {
        let args = Args::parse_from(["rlm-sandbox"]);
        let resolver = CliConfigResolver::from_args(&args);

        assert!(!resolver.debug);
        assert!(resolver.config_path.is_none());
        assert!(resolver.log_file.is_none());
        // project defaults to cwd
        assert!(resolver.project_root.exists());
    }

    #[test]
    fn from_args_with_all_flags() {
        let args = Args::parse_from([
            "rlm-sandbox",
            "-d",
            "-v",
            "-C",
            "/tmp",
            "--config",
            "/etc/rlm.toml",
            "--log-file",
            "/var/log/rlm",
            "--log-level",
            "info",
        ]);
        assert!(args.verbose);

        let resolver = CliConfigResolver::from_args(&args);
        assert!(resolver.debug);
        assert_eq!(resolver.project_root, PathBuf::from("/tmp"));
        assert_eq!(resolver.config_path, Some(PathBuf::from("/etc/rlm.toml")));
        assert_eq!(resolver.log_file, Some(PathBuf::from("/var/log/rlm")));
        assert_eq!(resolver.log_level.as_deref(), Some("info"));
    }
}
