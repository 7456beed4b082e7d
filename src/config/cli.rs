//! Command-line arguments for the Varco binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use super::{LoadError, Settings};

#[derive(Debug, Parser)]
#[command(name = "varco", version, about = "Varco API gateway server")]
pub struct CliArgs {
    /// Path to the gateway configuration document.
    #[arg(long = "config-file", env = "VARCO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the gateway HTTP service.
    Serve(ServeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    /// Override the listen address.
    #[arg(long = "server-http", value_name = "ADDR")]
    pub server_http: Option<String>,

    /// Override the database connection DSN.
    #[arg(long = "database-dsn", value_name = "DSN")]
    pub database_dsn: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Resolve configuration using the supplied CLI arguments, returning
/// both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = super::load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["varco"]);
        assert!(args.command.is_none());
        assert!(args.config_file.is_none());
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "varco",
            "serve",
            "--server-http",
            "0.0.0.0:8080",
            "--database-dsn",
            "postgres://override",
            "--log-level",
            "debug",
            "--log-json",
            "true",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.server_http.as_deref(), Some("0.0.0.0:8080"));
                assert_eq!(serve.database_dsn.as_deref(), Some("postgres://override"));
                assert_eq!(serve.log_level.as_deref(), Some("debug"));
                assert_eq!(serve.log_json, Some(true));
            }
        }
    }

    #[test]
    fn parse_config_file_flag() {
        let args = CliArgs::parse_from(["varco", "--config-file", "/etc/varco/gateway.yaml"]);
        assert_eq!(
            args.config_file,
            Some(PathBuf::from("/etc/varco/gateway.yaml"))
        );
    }
}
