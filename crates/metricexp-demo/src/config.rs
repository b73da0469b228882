use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use metricexp::Config;
use utils::version;

#[derive(Parser, Clone, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct DemoArgs {
    #[arg(
        long,
        env = "METRICEXP_CONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML file with exporter settings; command line flags take precedence"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "UPTRACE_DSN",
        help = "Connection string, e.g. https://<token>@uptrace.dev/<project_id>"
    )]
    pub dsn: Option<String>,

    #[arg(long, help = "Collection period in seconds")]
    pub period_secs: Option<f64>,

    #[arg(long, help = "HTTP request timeout in seconds")]
    pub request_timeout_secs: Option<f64>,

    #[arg(
        long,
        default_value = "demo",
        help = "Value of the service.name resource label"
    )]
    pub service_name: String,

    #[arg(
        long,
        default_value = "200",
        help = "Synthetic requests recorded per second"
    )]
    pub requests_per_sec: u32,

    #[arg(
        long,
        env = "METRICEXP_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_file: Option<PathBuf>,
}

impl DemoArgs {
    /// Exporter config: the YAML file if any, then command line overrides.
    pub fn exporter_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config file {}", path.display()))?;
                serde_yaml::from_str::<Config>(&raw)
                    .with_context(|| format!("parse config file {}", path.display()))?
            }
            None => Config::default(),
        };

        if let Some(dsn) = &self.dsn {
            config.dsn = dsn.clone();
        }
        if let Some(secs) = self.period_secs {
            config.period = Duration::try_from_secs_f64(secs).context("invalid --period-secs")?;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout =
                Duration::try_from_secs_f64(secs).context("invalid --request-timeout-secs")?;
        }
        config
            .resource
            .entry("service.name".to_string())
            .or_insert_with(|| self.service_name.clone());

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "dsn: http://file@localhost:14318/1\nperiod: 30\nresource:\n  host.name: node-1"
        )
        .unwrap();

        let args = DemoArgs::parse_from([
            "metricexp-demo",
            "--config",
            file.path().to_str().unwrap(),
            "--dsn",
            "http://flag@localhost:14318/2",
        ]);
        let config = args.exporter_config().unwrap();

        assert_eq!(config.dsn, "http://flag@localhost:14318/2");
        assert_eq!(config.period, Duration::from_secs(30));
        assert_eq!(config.resource["host.name"], "node-1");
        assert_eq!(config.resource["service.name"], "demo");
    }

    #[test]
    fn negative_period_is_rejected() {
        let args = DemoArgs::parse_from(["metricexp-demo", "--period-secs=-1"]);
        assert!(args.exporter_config().is_err());
    }
}
