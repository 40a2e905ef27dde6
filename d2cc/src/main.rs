//! d2cc - compiler wrapper
//!
//! Installed in place of a C/C++ compiler (or run as `d2cc <compiler> ...`).
//! Eligible translation units are preprocessed locally and handed to the d2cc
//! daemon; every other path, including every remote failure, ends in running
//! the real compiler with the original arguments.

#![forbid(unsafe_code)]

mod channel;
mod fallback;
mod invocation;
mod preprocess;
mod session;

use d2cc_common::config::{LoadedConfig, load_config};
use d2cc_common::types::D2ccConfig;
use d2cc_common::util::display_args;
use d2cc_common::{ErrorCode, classify};
use invocation::{Invocation, resolve_compiler};
use session::RemoteRequest;
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Variable holding a full `tracing` filter directive for the wrapper.
const LOG_ENV_VAR: &str = "D2CC_LOG";

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_level));
    // Compiler output owns stdout; diagnostics go to stderr only.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn load_or_default() -> (D2ccConfig, Option<String>) {
    match load_config() {
        Ok(LoadedConfig {
            config, env_errors, ..
        }) => {
            let warning = (!env_errors.is_empty()).then(|| {
                env_errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            });
            (config, warning)
        }
        Err(e) => (D2ccConfig::default(), Some(format!("[{}] {}", e.code(), e))),
    }
}

/// Try the remote path. Returns true only if the daemon built the object.
async fn try_remote(config: &D2ccConfig, compiler: &Path, argv: &[OsString]) -> bool {
    if !config.general.enabled {
        debug!("remote compilation disabled");
        return false;
    }

    let classified = classify(argv);
    if let Err(reason) = classified.admits(config.client.require_object_only) {
        debug!(%reason, "running locally");
        return false;
    }

    let mut request = RemoteRequest::new(
        &config.client,
        &config.general.socket_path,
        compiler,
        argv,
    );
    match request.run().await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                code = %e.code(),
                stage = e.stage(),
                state = ?request.state(),
                "{}, running locally",
                e
            );
            false
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let invocation = Invocation::from_args(std::env::args_os().collect());
    let (config, config_warning) = load_or_default();
    init_logging(&config.general.log_level);
    if let Some(warning) = config_warning {
        warn!("Failed to load config: {}, using defaults", warning);
    }

    let argv = invocation.argv;
    debug!(prefixed = invocation.prefixed, argv = %display_args(&argv), "invoked");

    let self_exe = std::env::current_exe().ok();
    let path_var = std::env::var_os("PATH");
    let compiler = match resolve_compiler(
        argv.first().map(OsString::as_os_str).unwrap_or_default(),
        config.client.compiler.as_deref(),
        self_exe.as_deref(),
        path_var.as_deref(),
    ) {
        Ok(compiler) => compiler,
        Err(e) => {
            error!(code = %e.code(), "Unable to spawn compiler: {}", e);
            std::process::exit(1);
        }
    };

    if try_remote(&config, &compiler, &argv).await {
        return;
    }

    let err = fallback::exec_local(&compiler, &argv);
    error!(
        code = %ErrorCode::LocalExecFailed,
        "Unable to spawn compiler {}: {}",
        compiler.display(),
        err
    );
    std::process::exit(1);
}
