mod common {
    use tracing_subscriber::{EnvFilter, fmt};

    pub fn init_test_logging() {
        let _ = fmt()
            .with_test_writer()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("test=info".parse().unwrap()),
            )
            .try_init();
    }

    #[macro_export]
    macro_rules! test_log {
        ($($arg:tt)*) => {
            tracing::info!(target: "test", $($arg)*);
        };
    }
}

mod daemon_tests;
