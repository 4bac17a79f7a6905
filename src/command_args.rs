// Copyright (c) 2019 Chaintope Inc.
// Distributed under the MIT software license, see the accompanying
// file COPYING or http://www.opensource.org/licenses/mit-license.php.

use crate::confirmation::{
    WaitOptions, DEFAULT_MAX_ROUNDS, DEFAULT_NODE_RETRIES, DEFAULT_RETRY_BACKOFF_MILLIS,
};
use crate::errors::Error;
use crate::workflow::DEFAULT_FUNDING_AMOUNT;
use clap::{App, Arg};
use serde::Deserialize;
use std::time::Duration;

pub const OPTION_NAME_CONFIG: &str = "config";

/// algod category params.
pub const OPTION_NAME_ALGOD_HOST: &str = "algod_host";
pub const OPTION_NAME_ALGOD_PORT: &str = "algod_port";
pub const OPTION_NAME_ALGOD_TOKEN: &str = "algod_token";

pub const OPTION_NAME_DISPENSER_MNEMONIC: &str = "dispenser_mnemonic";

/// workflow category params.
pub const OPTION_NAME_FUNDING_AMOUNT: &str = "funding_amount";
pub const OPTION_NAME_MAX_ROUNDS: &str = "max_rounds";
pub const OPTION_NAME_WAIT_TIMEOUT: &str = "wait_timeout_secs";
pub const OPTION_NAME_NODE_RETRIES: &str = "node_retries";
pub const OPTION_NAME_RETRY_BACKOFF: &str = "retry_backoff_millis";

/// log category params.
pub const OPTION_NAME_LOG_QUIET: &str = "log_quiet";
pub const OPTION_NAME_LOG_LEVEL: &str = "log_level";

pub const DEFAULT_ALGOD_HOST: &str = "http://localhost";
pub const DEFAULT_ALGOD_PORT: u32 = 4001;
/// API token of the local sandbox node.
pub const DEFAULT_ALGOD_TOKEN: &str =
    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// default config file name
pub const DEFAULT_CONFIG_FILENAME: &str = "rekey_sweep.toml";

#[derive(Debug, Deserialize, Default)]
struct AlgodToml {
    host: Option<String>,
    port: Option<u32>,
    token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DispenserToml {
    mnemonic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkflowToml {
    funding_amount: Option<u64>,
    max_rounds: Option<u64>,
    wait_timeout_secs: Option<u64>,
    node_retries: Option<u32>,
    retry_backoff_millis: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct GeneralToml {
    log_level: Option<String>,
    log_quiet: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigToml {
    algod: Option<AlgodToml>,
    dispenser: Option<DispenserToml>,
    workflow: Option<WorkflowToml>,
    general: Option<GeneralToml>,
}

pub struct CommandArgs<'a> {
    matches: clap::ArgMatches<'a>,
    config: Option<ConfigToml>,
}

pub struct AlgodCommandArgs<'a> {
    host: Option<&'a str>,
    port: Option<&'a str>,
    token: Option<&'a str>,
}

pub struct AlgodConfig<'a> {
    command_args: AlgodCommandArgs<'a>,
    toml_config: Option<&'a AlgodToml>,
}

impl<'a> AlgodConfig<'a> {
    pub fn host(&'a self) -> &'a str {
        let toml_value = self
            .toml_config
            .and_then(|config| config.host.as_ref())
            .map(|s| s as &str);
        self.command_args
            .host
            .or(toml_value)
            .unwrap_or(DEFAULT_ALGOD_HOST)
    }

    pub fn port(&'a self) -> u32 {
        let toml_value = self.toml_config.and_then(|config| config.port);
        self.command_args
            .port
            .and_then(|s| s.parse::<u32>().ok())
            .or(toml_value)
            .unwrap_or(DEFAULT_ALGOD_PORT)
    }

    pub fn token(&'a self) -> &'a str {
        let toml_value = self
            .toml_config
            .and_then(|config| config.token.as_ref())
            .map(|s| s as &str);
        self.command_args
            .token
            .or(toml_value)
            .unwrap_or(DEFAULT_ALGOD_TOKEN)
    }

    /// Base url of the node, e.g. `http://localhost:4001`.
    pub fn url(&'a self) -> String {
        format!("{}:{}", self.host().trim_end_matches('/'), self.port())
    }
}

pub struct DispenserConfig<'a> {
    mnemonic: Option<&'a str>,
    toml_config: Option<&'a DispenserToml>,
}

impl<'a> DispenserConfig<'a> {
    pub fn mnemonic(&'a self) -> Result<&'a str, Error> {
        let toml_value = self
            .toml_config
            .and_then(|config| config.mnemonic.as_ref())
            .map(|s| s as &str);
        self.mnemonic.or(toml_value).ok_or_else(|| {
            Error::InvalidArgs("Must be specified the dispenser mnemonic.".to_string())
        })
    }
}

pub struct WorkflowCommandArgs<'a> {
    funding_amount: Option<&'a str>,
    max_rounds: Option<&'a str>,
    wait_timeout_secs: Option<&'a str>,
    node_retries: Option<&'a str>,
    retry_backoff_millis: Option<&'a str>,
}

pub struct WorkflowConfig<'a> {
    command_args: WorkflowCommandArgs<'a>,
    toml_config: Option<&'a WorkflowToml>,
}

fn parse_arg<T: std::str::FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>, Error> {
    match value {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidArgs(format!("'{}' is invalid value for {}.", s, name))),
    }
}

impl<'a> WorkflowConfig<'a> {
    pub fn funding_amount(&'a self) -> Result<u64, Error> {
        let toml_value = self.toml_config.and_then(|config| config.funding_amount);
        Ok(
            parse_arg(OPTION_NAME_FUNDING_AMOUNT, self.command_args.funding_amount)?
                .or(toml_value)
                .unwrap_or(DEFAULT_FUNDING_AMOUNT),
        )
    }

    pub fn max_rounds(&'a self) -> Result<u64, Error> {
        let toml_value = self.toml_config.and_then(|config| config.max_rounds);
        Ok(parse_arg(OPTION_NAME_MAX_ROUNDS, self.command_args.max_rounds)?
            .or(toml_value)
            .unwrap_or(DEFAULT_MAX_ROUNDS))
    }

    pub fn wait_timeout(&'a self) -> Result<Option<Duration>, Error> {
        let toml_value = self.toml_config.and_then(|config| config.wait_timeout_secs);
        Ok(
            parse_arg(OPTION_NAME_WAIT_TIMEOUT, self.command_args.wait_timeout_secs)?
                .or(toml_value)
                .map(Duration::from_secs),
        )
    }

    pub fn node_retries(&'a self) -> Result<u32, Error> {
        let toml_value = self.toml_config.and_then(|config| config.node_retries);
        Ok(parse_arg(OPTION_NAME_NODE_RETRIES, self.command_args.node_retries)?
            .or(toml_value)
            .unwrap_or(DEFAULT_NODE_RETRIES))
    }

    pub fn retry_backoff(&'a self) -> Result<Duration, Error> {
        let toml_value = self
            .toml_config
            .and_then(|config| config.retry_backoff_millis);
        let millis = parse_arg(OPTION_NAME_RETRY_BACKOFF, self.command_args.retry_backoff_millis)?
            .or(toml_value)
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MILLIS);
        Ok(Duration::from_millis(millis))
    }

    /// `max_rounds = 0` drops the round limit. Without a wait timeout as well
    /// the waiter is unbounded.
    pub fn wait_options(&'a self) -> Result<WaitOptions, Error> {
        let mut options = WaitOptions::unbounded().retries(self.node_retries()?, self.retry_backoff()?);
        let max_rounds = self.max_rounds()?;
        if max_rounds > 0 {
            options = options.max_rounds(max_rounds);
        }
        if let Some(timeout) = self.wait_timeout()? {
            options = options.timeout(timeout);
        }
        Ok(options)
    }
}

pub struct GeneralCommandArgs<'a> {
    log_quiet: bool,
    log_level: Option<&'a str>,
}

pub struct GeneralConfig<'a> {
    command_args: GeneralCommandArgs<'a>,
    toml_config: Option<&'a GeneralToml>,
}

impl<'a> GeneralConfig<'a> {
    pub fn log_level(&'a self) -> &'a str {
        let toml_value = self
            .toml_config
            .and_then(|config| config.log_level.as_ref())
            .map(|s| s as &str);
        self.command_args
            .log_level
            .or(toml_value)
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_quiet(&'a self) -> bool {
        let toml_value = self
            .toml_config
            .and_then(|config| config.log_quiet)
            .unwrap_or_default();
        self.command_args.log_quiet || toml_value
    }
}

impl<'a> CommandArgs<'a> {
    pub fn load(matches: clap::ArgMatches<'a>) -> Result<CommandArgs<'a>, Error> {
        // load from config file if exists.
        let config_file = matches
            .value_of(OPTION_NAME_CONFIG)
            .unwrap_or(DEFAULT_CONFIG_FILENAME);
        match read_config(config_file) {
            Ok(c) => Ok(CommandArgs {
                matches,
                config: Some(c),
            }),
            Err(Error::ConfigFileIOError(ioerror)) => {
                log::warn!("config file read error: {:?}", ioerror);
                Ok(CommandArgs {
                    matches,
                    config: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn algod_config(&self) -> AlgodConfig {
        AlgodConfig {
            command_args: AlgodCommandArgs {
                host: self.matches.value_of(OPTION_NAME_ALGOD_HOST),
                port: self.matches.value_of(OPTION_NAME_ALGOD_PORT),
                token: self.matches.value_of(OPTION_NAME_ALGOD_TOKEN),
            },
            toml_config: self.config.as_ref().and_then(|c| c.algod.as_ref()),
        }
    }

    pub fn dispenser_config(&self) -> DispenserConfig {
        DispenserConfig {
            mnemonic: self.matches.value_of(OPTION_NAME_DISPENSER_MNEMONIC),
            toml_config: self.config.as_ref().and_then(|c| c.dispenser.as_ref()),
        }
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            command_args: WorkflowCommandArgs {
                funding_amount: self.matches.value_of(OPTION_NAME_FUNDING_AMOUNT),
                max_rounds: self.matches.value_of(OPTION_NAME_MAX_ROUNDS),
                wait_timeout_secs: self.matches.value_of(OPTION_NAME_WAIT_TIMEOUT),
                node_retries: self.matches.value_of(OPTION_NAME_NODE_RETRIES),
                retry_backoff_millis: self.matches.value_of(OPTION_NAME_RETRY_BACKOFF),
            },
            toml_config: self.config.as_ref().and_then(|c| c.workflow.as_ref()),
        }
    }

    pub fn general_config(&self) -> GeneralConfig {
        GeneralConfig {
            command_args: GeneralCommandArgs {
                log_level: self.matches.value_of(OPTION_NAME_LOG_LEVEL),
                log_quiet: self.matches.is_present(OPTION_NAME_LOG_QUIET),
            },
            toml_config: self.config.as_ref().and_then(|c| c.general.as_ref()),
        }
    }
}

fn read_config(file_path: &str) -> Result<ConfigToml, Error> {
    let contents = std::fs::read_to_string(file_path)?;
    let toml: ConfigToml = toml::from_str(&contents)?;
    Ok(toml)
}

/// command example:
/// ./target/debug/rekey-sweep -c=rekey_sweep.toml --algod-host=http://localhost --algod-port=4001 --max-rounds=20
pub fn get_options<'a, 'b>() -> clap::App<'a, 'b> {
    App::new("rekey-sweep")
        .about("Creates two accounts, rekeys the first to the second and sweeps its Algos.")
        .arg(Arg::with_name(OPTION_NAME_CONFIG)
            .short("c")
            .long("config")
            .value_name("CONFIG_FILE_PATH")
            .default_value(DEFAULT_CONFIG_FILENAME)
            .help("Load settings from this file. when defined both in file and command line args, then command line args take precedence."))
        .arg(Arg::with_name(OPTION_NAME_ALGOD_HOST)
            .long("algod-host")
            .value_name("URL")
            .help("algod REST endpoint host, including the scheme. default: http://localhost"))
        .arg(Arg::with_name(OPTION_NAME_ALGOD_PORT)
            .long("algod-port")
            .value_name("PORT")
            .help("algod REST endpoint port number. default: 4001"))
        .arg(Arg::with_name(OPTION_NAME_ALGOD_TOKEN)
            .long("algod-token")
            .value_name("TOKEN")
            .help("algod API token, sent as X-Algo-API-Token."))
        .arg(Arg::with_name(OPTION_NAME_DISPENSER_MNEMONIC)
            .long("dispenser-mnemonic")
            .value_name("25 WORDS")
            .help("Mnemonic of the funded account that pays for the new accounts."))
        .arg(Arg::with_name(OPTION_NAME_FUNDING_AMOUNT)
            .long("funding-amount")
            .value_name("MICROALGOS")
            .help("Amount sent to each new account. default: 10000000"))
        .arg(Arg::with_name(OPTION_NAME_MAX_ROUNDS)
            .long("max-rounds")
            .value_name("ROUNDS")
            .help("Give up waiting for a confirmation after this many rounds. 0 disables the limit. default: 1000"))
        .arg(Arg::with_name(OPTION_NAME_WAIT_TIMEOUT)
            .long("wait-timeout")
            .value_name("SECs")
            .help("Give up waiting for a confirmation after this many seconds."))
        .arg(Arg::with_name(OPTION_NAME_NODE_RETRIES)
            .long("node-retries")
            .value_name("NUM")
            .help("Retries for an unreachable node before giving up. default: 5"))
        .arg(Arg::with_name(OPTION_NAME_RETRY_BACKOFF)
            .long("retry-backoff")
            .value_name("MILLIs")
            .help("Delay before the first retry, doubled on every further one. default: 500"))
        .arg(Arg::with_name(OPTION_NAME_LOG_QUIET)
            .long("quiet")
            .short("q")
            .takes_value(false)
            .help("Silent mode. Do not output logs."))
        .arg(Arg::with_name(OPTION_NAME_LOG_LEVEL)
            .long("log")
            .short("l")
            .takes_value(true)
            .possible_values(&["error", "warn", "info", "debug", "trace"])
            .help("Set the log level."))
}

#[test]
fn test_load() {
    let matches =
        get_options().get_matches_from(vec!["rekey-sweep", "-c=tests/resources/rekey_sweep_sample.toml"]);
    let args = CommandArgs::load(matches);
    assert!(args.is_ok());
    assert!(args.unwrap().config.is_some());
}

#[test]
fn test_allow_no_exists_config_file() {
    let matches = get_options().get_matches_from(vec!["rekey-sweep", "-c=hoge.toml"]);
    let args = CommandArgs::load(matches);
    assert!(args.is_ok());
    assert!(args.unwrap().config.is_none());
}

#[test]
#[should_panic(expected = "InvalidTomlFormat")]
fn test_invalid_format_config_file() {
    let matches =
        get_options().get_matches_from(vec!["rekey-sweep", "-c=tests/resources/invalid_format.toml"]);
    let _args = CommandArgs::load(matches).unwrap();
}

#[test]
fn test_defaults() {
    let matches = get_options().get_matches_from(vec!["rekey-sweep"]);
    let args = CommandArgs {
        matches,
        config: Some(ConfigToml::default()),
    };

    assert_eq!(args.algod_config().url(), "http://localhost:4001");
    assert_eq!(args.algod_config().token(), DEFAULT_ALGOD_TOKEN);
    assert_eq!(args.algod_config().token().len(), 64);
    assert!(args.dispenser_config().mnemonic().is_err());

    let workflow = args.workflow_config();
    assert_eq!(workflow.funding_amount().unwrap(), 10_000_000);
    assert_eq!(workflow.wait_options().unwrap(), WaitOptions::default());

    assert_eq!(args.general_config().log_level(), "info");
    assert_eq!(args.general_config().log_quiet(), false);
}

#[test]
fn test_load_from_file() {
    let matches =
        get_options().get_matches_from(vec!["rekey-sweep", "-c=tests/resources/rekey_sweep_sample.toml"]);
    let args = CommandArgs::load(matches).unwrap();

    // algod parameters are loaded from toml data.
    assert_eq!(args.algod_config().host(), "http://algod.local");
    assert_eq!(args.algod_config().port(), 8080);
    assert_eq!(args.algod_config().token(), "sandbox-token");
    assert_eq!(args.algod_config().url(), "http://algod.local:8080");

    let mnemonic = args.dispenser_config().mnemonic().unwrap().to_string();
    assert_eq!(mnemonic.split_whitespace().count(), 25);

    let workflow = args.workflow_config();
    assert_eq!(workflow.funding_amount().unwrap(), 2_000_000);
    assert_eq!(
        workflow.wait_options().unwrap(),
        WaitOptions::default()
            .max_rounds(20)
            .timeout(Duration::from_secs(120))
            .retries(3, Duration::from_millis(250))
    );

    // general parameters are loaded from toml data.
    assert_eq!(args.general_config().log_level(), "debug");
    assert_eq!(args.general_config().log_quiet(), true);
}

#[test]
fn test_priority_commandline() {
    let matches = get_options().get_matches_from(vec![
        "rekey-sweep",
        "-c=tests/resources/rekey_sweep_sample.toml",
        "--algod-host=https://testnet.example.com/",
        "--algod-port=443",
        "--algod-token=override",
        "--funding-amount=500000",
        "--max-rounds=5",
        "--node-retries=0",
        "--log=trace",
    ]);
    let args = CommandArgs::load(matches).unwrap();

    assert_eq!(args.algod_config().url(), "https://testnet.example.com:443");
    assert_eq!(args.algod_config().token(), "override");

    let workflow = args.workflow_config();
    assert_eq!(workflow.funding_amount().unwrap(), 500_000);
    let options = workflow.wait_options().unwrap();
    assert_eq!(options.max_rounds, Some(5));
    assert_eq!(options.max_node_retries, 0);
    // not overridden
    assert_eq!(options.timeout, Some(Duration::from_secs(120)));

    assert_eq!(args.general_config().log_level(), "trace");
}

#[test]
fn test_zero_max_rounds_without_timeout_is_unbounded() {
    let matches = get_options().get_matches_from(vec!["rekey-sweep", "--max-rounds=0"]);
    let args = CommandArgs {
        matches,
        config: None,
    };
    let options = args.workflow_config().wait_options().unwrap();
    assert!(!options.is_bounded());

    let matches =
        get_options().get_matches_from(vec!["rekey-sweep", "--max-rounds=0", "--wait-timeout=30"]);
    let args = CommandArgs {
        matches,
        config: None,
    };
    let options = args.workflow_config().wait_options().unwrap();
    assert_eq!(options.max_rounds, None);
    assert_eq!(options.timeout, Some(Duration::from_secs(30)));
}

#[test]
fn test_invalid_number() {
    let matches = get_options().get_matches_from(vec!["rekey-sweep", "--max-rounds=many"]);
    let args = CommandArgs {
        matches,
        config: None,
    };
    match args.workflow_config().max_rounds() {
        Err(Error::InvalidArgs(msg)) => assert_eq!(msg, "'many' is invalid value for max_rounds."),
        other => panic!("unexpected result: {:?}", other),
    }
}
