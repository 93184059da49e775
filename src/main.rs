use clap::{Args, Parser, Subcommand};
use market_analyst::ai::{AnalysisError, ClientError, OpenAiClient, Orchestrator};
use market_analyst::analyzer::indicators::{self, latest};
use market_analyst::analyzer::{Frame, IndicatorSet, LevelDetector};
use market_analyst::config::{load_config, AppConfig, ConfigError};
use market_analyst::facts::FactCompactor;
use market_analyst::model::{Column, Horizon, IndicatorError, IntelBundle, ProviderError, Risk};
use market_analyst::provider::{load_bundle, BundleRequest, SnapshotProvider};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, error, info, Level};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("could not render output: {0}")]
    Render(#[from] serde_json::Error),
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Technical facts and model analysis over market snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Latest value of every indicator
    Indicators(Target),
    /// Latest value of a single indicator line
    Indicator {
        #[command(flatten)]
        target: Target,
        #[command(subcommand)]
        kind: IndicatorKind,
    },
    /// Support and resistance levels
    Levels(Target),
    /// The compact fact pack sent to the model
    Facts {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        outlook: Outlook,
    },
    /// Full model analysis
    Analyze {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        outlook: Outlook,
    },
}

#[derive(Debug, Args)]
struct Target {
    /// Snapshot file holding one bundle or an array of bundles
    snapshot: PathBuf,
    /// Ticker, matched case-insensitively
    symbol: String,
}

#[derive(Debug, Args)]
struct Outlook {
    /// intraday, swing or position
    #[arg(default_value = "swing")]
    horizon: Horizon,
    /// low, medium or high
    #[arg(default_value = "medium")]
    risk: Risk,
}

#[derive(Debug, Clone, Copy, PartialEq, Subcommand)]
enum IndicatorKind {
    /// Simple moving average of close
    Sma {
        #[arg(default_value_t = 20)]
        n: usize,
    },
    /// Exponential moving average of close
    Ema {
        #[arg(default_value_t = 20)]
        n: usize,
    },
    /// Bollinger bands around the close
    Bb {
        #[arg(default_value_t = 20)]
        n: usize,
        #[arg(default_value_t = 2.0)]
        k: f64,
    },
    /// Wilder RSI of close
    Rsi {
        #[arg(default_value_t = 14)]
        n: usize,
    },
    Macd {
        #[arg(default_value_t = 12)]
        fast: usize,
        #[arg(default_value_t = 26)]
        slow: usize,
        #[arg(default_value_t = 9)]
        signal: usize,
    },
    /// Wilder average true range
    Atr {
        #[arg(default_value_t = 14)]
        n: usize,
    },
    Vwap,
    /// Fast stochastic %K and %D
    Stoch {
        #[arg(default_value_t = 14)]
        k: usize,
        #[arg(default_value_t = 3)]
        d: usize,
    },
    Obv,
    /// Simple moving average of volume
    VolSma {
        #[arg(default_value_t = 20)]
        n: usize,
    },
}

impl IndicatorKind {
    /// Name, parameters and latest value(s) of the selected line.
    fn evaluate(self, frame: &Frame) -> Result<Value, IndicatorError> {
        let (name, params, value) = match self {
            IndicatorKind::Sma { n } => (
                "sma",
                json!({ "n": n }),
                json!(latest(&indicators::sma(frame, Column::Close, n)?)),
            ),
            IndicatorKind::Ema { n } => (
                "ema",
                json!({ "n": n }),
                json!(latest(&indicators::ema(frame, Column::Close, n)?)),
            ),
            IndicatorKind::Bb { n, k } => {
                let bands = indicators::bollinger_bands(frame, Column::Close, n, k)?;
                (
                    "bb",
                    json!({ "n": n, "k": k }),
                    json!({
                        "mid": latest(&bands.mid),
                        "upper": latest(&bands.upper),
                        "lower": latest(&bands.lower),
                    }),
                )
            }
            IndicatorKind::Rsi { n } => (
                "rsi",
                json!({ "n": n }),
                json!(latest(&indicators::rsi(frame, Column::Close, n)?)),
            ),
            IndicatorKind::Macd { fast, slow, signal } => {
                let m = indicators::macd(frame, Column::Close, fast, slow, signal)?;
                (
                    "macd",
                    json!({ "fast": fast, "slow": slow, "signal": signal }),
                    json!({
                        "line": latest(&m.line),
                        "signal": latest(&m.signal),
                        "hist": latest(&m.histogram),
                    }),
                )
            }
            IndicatorKind::Atr { n } => (
                "atr",
                json!({ "n": n }),
                json!(latest(&indicators::atr(frame, n)?)),
            ),
            IndicatorKind::Vwap => ("vwap", json!({}), json!(latest(&indicators::vwap(frame)?))),
            IndicatorKind::Stoch { k, d } => {
                let s = indicators::stochastic(frame, k, d)?;
                (
                    "stoch",
                    json!({ "k": k, "d": d }),
                    json!({ "k": latest(&s.k), "d": latest(&s.d) }),
                )
            }
            IndicatorKind::Obv => ("obv", json!({}), json!(latest(&indicators::obv(frame)?))),
            IndicatorKind::VolSma { n } => (
                "vol_sma",
                json!({ "n": n }),
                json!(latest(&indicators::vol_sma(frame, n)?)),
            ),
        };
        Ok(json!({ "indicator": name, "params": params, "latest": value }))
    }
}

impl Command {
    fn target(&self) -> &Target {
        match self {
            Command::Indicators(target) | Command::Levels(target) => target,
            Command::Indicator { target, .. }
            | Command::Facts { target, .. }
            | Command::Analyze { target, .. } => target,
        }
    }
}

/// DEBUG only when a config loaded and asked for it, so a load failure is
/// still logged at INFO and above.
fn log_level(config: &Result<AppConfig, ConfigError>) -> Level {
    match config {
        Ok(cfg) if cfg.ai.debug => Level::DEBUG,
        _ => Level::INFO,
    }
}

fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_file = dotenvy::dotenv();
    // Usage errors exit with status 2.
    let cli = Cli::parse();

    let config_path = std::env::var("ANALYST_CONFIG").unwrap_or_else(|_| "config.json".into());
    let config = load_config(&config_path);
    init_logging(log_level(&config));

    if let Ok(path) = &env_file {
        debug!("Loaded environment from {}", path.display());
    }
    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error ({}): {}", config_path, e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli.command, &config).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(CliError::Analysis(e)) => {
            error!("{}", e);
            eprintln!(
                "⚠️ Analysis unavailable for {}. Try again later.",
                cli.command.target().symbol
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn load(target: &Target, config: &AppConfig) -> Result<IntelBundle, CliError> {
    let provider = SnapshotProvider::from_file(&target.snapshot).await?;
    let request = BundleRequest {
        news_limit: config.facts.news_limit,
        ..BundleRequest::default()
    };
    let bundle = load_bundle(&provider, &target.symbol, &request).await?;
    info!("{}: {} bars loaded", bundle.symbol, bundle.bars.len());
    Ok(bundle)
}

async fn run(command: &Command, config: &AppConfig) -> Result<String, CliError> {
    let bundle = load(command.target(), config).await?;

    let output = match command {
        Command::Indicators(_) => {
            let frame = Frame::from_bars(&bundle.bars);
            serde_json::to_string_pretty(&IndicatorSet::latest(&frame)?)?
        }
        Command::Indicator { kind, .. } => {
            let frame = Frame::from_bars(&bundle.bars);
            serde_json::to_string_pretty(&kind.evaluate(&frame)?)?
        }
        Command::Levels(_) => {
            let frame = Frame::from_bars(&bundle.bars);
            let detector = LevelDetector::new(config.levels.clone());
            serde_json::to_string_pretty(&detector.detect(&frame)?)?
        }
        Command::Facts { outlook, .. } => {
            let compactor = FactCompactor::new(config.levels.clone(), &config.facts);
            let facts = compactor.build(&bundle, outlook.horizon, outlook.risk)?;
            serde_json::to_string_pretty(&facts)?
        }
        Command::Analyze { outlook, .. } => {
            let compactor = FactCompactor::new(config.levels.clone(), &config.facts);
            let facts = compactor.build(&bundle, outlook.horizon, outlook.risk)?;
            let client = OpenAiClient::new(&config.ai)?;
            let orchestrator = Orchestrator::new(client, config.ai.clone(), &config.facts);
            let result = orchestrator.analyze(&facts, outlook.horizon, outlook.risk).await?;
            serde_json::to_string_pretty(&result)?
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use market_analyst::model::Bar;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("market-analyst").chain(args.iter().copied()))
    }

    fn indicator(args: &[&str]) -> IndicatorKind {
        let mut full = vec!["indicator", "snap.json", "AAPL"];
        full.extend_from_slice(args);
        match parse(&full).unwrap().command {
            Command::Indicator { kind, .. } => kind,
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_for_horizon_and_risk() {
        let cli = parse(&["facts", "snap.json", "AAPL"]).unwrap();
        let Command::Facts { target, outlook } = cli.command else {
            panic!("expected facts");
        };
        assert_eq!(target.snapshot, PathBuf::from("snap.json"));
        assert_eq!(target.symbol, "AAPL");
        assert_eq!(outlook.horizon, Horizon::Swing);
        assert_eq!(outlook.risk, Risk::Medium);
    }

    #[test]
    fn horizon_and_risk_parse_case_insensitively() {
        let cli = parse(&["analyze", "s.json", "BTC-USD", "Position", "HIGH"]).unwrap();
        let Command::Analyze { outlook, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(outlook.horizon, Horizon::Position);
        assert_eq!(outlook.risk, Risk::High);
    }

    #[test]
    fn rejects_bad_input() {
        let kind = |args: &[&str]| parse(args).unwrap_err().kind();
        assert_eq!(kind(&["facts", "s.json"]), ErrorKind::MissingRequiredArgument);
        assert_eq!(kind(&["chart", "s.json", "AAPL"]), ErrorKind::InvalidSubcommand);
        assert_eq!(kind(&["facts", "s.json", "AAPL", "weekly"]), ErrorKind::ValueValidation);
        assert_eq!(
            kind(&["facts", "s.json", "AAPL", "swing", "medium", "x"]),
            ErrorKind::UnknownArgument
        );
        assert_eq!(kind(&["indicator", "s.json", "AAPL", "sma", "ten"]), ErrorKind::ValueValidation);
        // Usage errors map to exit status 2.
        assert_eq!(parse(&["levels"]).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn indicator_parameters_default_to_presets() {
        assert_eq!(indicator(&["sma"]), IndicatorKind::Sma { n: 20 });
        assert_eq!(indicator(&["rsi"]), IndicatorKind::Rsi { n: 14 });
        assert_eq!(indicator(&["bb"]), IndicatorKind::Bb { n: 20, k: 2.0 });
        assert_eq!(
            indicator(&["macd"]),
            IndicatorKind::Macd { fast: 12, slow: 26, signal: 9 }
        );
        assert_eq!(indicator(&["stoch"]), IndicatorKind::Stoch { k: 14, d: 3 });
        assert_eq!(indicator(&["vol-sma"]), IndicatorKind::VolSma { n: 20 });
        assert_eq!(indicator(&["obv"]), IndicatorKind::Obv);
    }

    #[test]
    fn indicator_parameters_are_positional() {
        assert_eq!(indicator(&["ema", "50"]), IndicatorKind::Ema { n: 50 });
        assert_eq!(indicator(&["bb", "10", "2.5"]), IndicatorKind::Bb { n: 10, k: 2.5 });
        assert_eq!(
            indicator(&["macd", "5", "35"]),
            IndicatorKind::Macd { fast: 5, slow: 35, signal: 9 }
        );
        assert_eq!(indicator(&["atr", "7"]), IndicatorKind::Atr { n: 7 });
    }

    fn rising(n: usize) -> Frame {
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let close = 10.0 + i as f64;
                Bar {
                    t: i as i64,
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 100.0,
                }
            })
            .collect();
        Frame::from_bars(&bars)
    }

    #[test]
    fn indicator_reports_latest_values() {
        let frame = rising(30);

        let sma = IndicatorKind::Sma { n: 3 }.evaluate(&frame).unwrap();
        assert_eq!(sma["indicator"], "sma");
        assert_eq!(sma["params"]["n"], 3);
        assert_eq!(sma["latest"], 38.0);

        let bb = IndicatorKind::Bb { n: 20, k: 2.0 }.evaluate(&frame).unwrap();
        assert_eq!(bb["latest"]["mid"], 29.5);
        assert!(bb["latest"]["upper"].as_f64().unwrap() > 29.5);

        let obv = IndicatorKind::Obv.evaluate(&frame).unwrap();
        assert_eq!(obv["latest"], 2_900.0);
    }

    #[test]
    fn short_series_leaves_the_value_empty() {
        let rsi = IndicatorKind::Rsi { n: 14 }.evaluate(&rising(5)).unwrap();
        assert!(rsi["latest"].is_null());
    }

    #[test]
    fn config_failure_still_gets_a_logger() {
        let broken: Result<AppConfig, ConfigError> =
            Err(serde_json::from_str::<AppConfig>("{").unwrap_err().into());
        assert_eq!(log_level(&broken), Level::INFO);

        let mut config = AppConfig::default();
        assert_eq!(log_level(&Ok(config.clone())), Level::INFO);
        config.ai.debug = true;
        assert_eq!(log_level(&Ok(config)), Level::DEBUG);
    }

    #[test]
    fn zero_window_is_an_indicator_error() {
        let err = IndicatorKind::Atr { n: 0 }.evaluate(&rising(5)).unwrap_err();
        assert!(matches!(err, IndicatorError::InvalidWindow { .. }));
    }
}
