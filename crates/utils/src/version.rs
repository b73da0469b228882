use std::sync::LazyLock;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{}-{}",
        env!("IMAGE_VERSION"),
        option_env!("GIT_SHA").unwrap_or(env!("CARGO_PKG_VERSION"))
    )
});
