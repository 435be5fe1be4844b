//! Contract transaction tool
//!
//! Usage:
//!   bsv-contract-tx check <tx_hex> <locking_script_hex> <satoshis> <input_index>
//!   bsv-contract-tx normalize <tx_hex> <locking_script_hex> <satoshis> <input_index>
//!   bsv-contract-tx txid <tx_hex>
//!   bsv-contract-tx demo <locking_script_hex> [satoshis]
//!   bsv-contract-tx deploy <wif> <utxos_json_file> <locking_script_hex> <amount>
//!   bsv-contract-tx keygen
//!
//! Exit codes: 2 when the sighash is high, 3 when the demo fee is too low.

use std::env;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bsv_contract_tx::blockchain::bsv::constants::{INPUT_SATOSHIS, MIN_FEE};
use bsv_contract_tx::blockchain::bsv::{
    builder, compute_preimage, script, Bip143Preimage, FeePolicy, LowSNormalizer, LowSOutcome,
    SighashType, Transaction, TxOutput, Utxo,
};
use bsv_contract_tx::config::AppConfig;
use bsv_contract_tx::crypto::PrivateKey;

const USAGE: &str = "usage: bsv-contract-tx <check|normalize|txid|demo|deploy|keygen> [args...]";

/// Exit code when the sighash digest is high and the contract would reject it
const EXIT_HIGH_SIGHASH: u8 = 2;

/// Exit code when the demo transaction pays less than the relay minimum
const EXIT_LOW_FEE: u8 = 3;

fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Keep the guard alive for the duration of the program
    let _log_guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&config, &args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Console plus size-rotated file output
fn init_logging(config: &AppConfig) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&config.log.dir)
        .with_context(|| format!("Failed to create log directory {}", config.log.dir))?;

    // File appender - rotates when > 50MB, keeps 5 backup files
    let log_path = std::path::Path::new(&config.log.dir).join("bsv-contract-tx.log");
    let file_appender = rolling_file::RollingFileAppender::new(
        log_path,
        rolling_file::RollingConditionBasic::new().max_size(50 * 1024 * 1024),
        5,
    )
    .context("Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::new(
        env::var("RUST_LOG").unwrap_or_else(|_| config.log.filter.clone()),
    );

    tracing_subscriber::registry()
        .with(env_filter)
        // Console output
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        // File output
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    Ok(guard)
}

fn run(config: &AppConfig, args: &[String]) -> anyhow::Result<ExitCode> {
    let command = args.first().map(|s| s.as_str()).ok_or_else(|| anyhow!(USAGE))?;
    let network = config.network.network()?;
    let normalizer =
        LowSNormalizer::<Bip143Preimage>::default().max_attempts(config.lows.max_attempts);

    tracing::debug!("Command {} on {}", command, network);

    match command {
        "check" => {
            let (tx, locking_script, satoshis, index) = input_context(&args[1..])?;
            let low = normalizer.check(&tx, &locking_script, satoshis, index)?;
            println!("{}", if low { "low" } else { "high" });
            Ok(ExitCode::from(status_code(low, true)))
        }
        "normalize" => {
            let (mut tx, locking_script, satoshis, index) = input_context(&args[1..])?;
            let outcome = normalizer.normalize(&mut tx, &locking_script, satoshis, index)?;
            report_outcome(&outcome);
            println!("{}", tx.to_hex());
            Ok(ExitCode::from(status_code(outcome.is_normalized(), true)))
        }
        "txid" => {
            let raw = args.get(1).ok_or_else(|| anyhow!("txid <tx_hex>"))?;
            println!("{}", Transaction::from_hex(raw)?.txid());
            Ok(ExitCode::SUCCESS)
        }
        "demo" => {
            let script_hex = args
                .get(1)
                .ok_or_else(|| anyhow!("demo <locking_script_hex> [satoshis]"))?;
            let locking_script = hex::decode(script_hex).context("Invalid locking script hex")?;
            let satoshis = match args.get(2) {
                Some(s) => s.parse().context("Invalid satoshis")?,
                None => INPUT_SATOSHIS,
            };
            if satoshis <= MIN_FEE {
                bail!("Contract value must exceed {} satoshis", MIN_FEE);
            }

            let receiver = PrivateKey::generate(network)?;

            // Spend a dummy contract output back to a fresh address
            let mut tx = builder::new_tx();
            tx.inputs[0].prev_output = Some(TxOutput::new(locking_script.clone(), satoshis));
            tx.add_output(TxOutput::new(
                script::p2pkh_locking_script(&receiver.pubkey_hash()),
                satoshis - MIN_FEE,
            ));

            let outcome = normalizer.normalize(&mut tx, &locking_script, satoshis, 0)?;
            report_outcome(&outcome);

            // OP_PUSH_TX style unlocking: the contract receives its own preimage
            builder::set_input_script_with(&mut tx, 0, |tx, prev_script, value| {
                let preimage =
                    compute_preimage(tx, prev_script, value, 0, SighashType::ALL_FORKID)?;
                let mut script_sig = Vec::new();
                script::push_data(&mut script_sig, &preimage);
                Ok(script_sig)
            })?;

            let fee_check = FeePolicy::new(config.fee.min_sat_per_byte).check(&tx);

            println!("receiver: {}", receiver.address());
            println!("txid:     {}", tx.txid());
            match &fee_check {
                Ok(fee) => println!("fee:      {}", fee),
                Err(e) => println!("fee:      {}", e),
            }
            println!("{}", tx.to_hex());

            Ok(ExitCode::from(status_code(
                outcome.is_normalized(),
                fee_check.is_ok(),
            )))
        }
        "deploy" => {
            let [wif, utxo_file, script_hex, amount] = &args[1..] else {
                bail!("deploy <wif> <utxos_json_file> <locking_script_hex> <amount>");
            };

            let key = PrivateKey::from_wif(wif)?;
            if key.network() != network {
                bail!("Key is for {}, configured network is {}", key.network(), network);
            }

            let utxo_json = std::fs::read_to_string(utxo_file)
                .with_context(|| format!("Failed to read {}", utxo_file))?;
            let utxos: Vec<Utxo> =
                serde_json::from_str(&utxo_json).context("Invalid UTXO list")?;
            let locking_script = hex::decode(script_hex).context("Invalid locking script hex")?;
            let amount = amount.parse().context("Invalid amount")?;

            let tx = builder::build_deploy_tx(
                &key,
                &utxos,
                locking_script,
                amount,
                config.fee.fee_per_kb,
            )?;
            FeePolicy::new(config.fee.min_sat_per_byte).check(&tx)?;

            println!("txid: {}", tx.txid());
            println!("{}", tx.to_hex());
            Ok(ExitCode::SUCCESS)
        }
        "keygen" => {
            let key = PrivateKey::generate(network)?;
            println!("network: {}", network);
            println!("address: {}", key.address());
            println!("wif:     {}", key.to_wif());
            Ok(ExitCode::SUCCESS)
        }
        other => bail!("Unknown command '{}'\n{}", other, USAGE),
    }
}

fn input_context(args: &[String]) -> anyhow::Result<(Transaction, Vec<u8>, u64, usize)> {
    let [tx_hex, script_hex, satoshis, index] = args else {
        bail!("expected <tx_hex> <locking_script_hex> <satoshis> <input_index>");
    };

    let tx = Transaction::from_hex(tx_hex)?;
    let locking_script = hex::decode(script_hex).context("Invalid locking script hex")?;
    let satoshis = satoshis.parse().context("Invalid satoshis")?;
    let index = index.parse().context("Invalid input index")?;

    Ok((tx, locking_script, satoshis, index))
}

fn report_outcome(outcome: &LowSOutcome) {
    match outcome {
        LowSOutcome::Normalized { increments } => {
            tracing::info!("Sighash is low-S safe after {} sequence increments", increments)
        }
        LowSOutcome::Exhausted { increments } => tracing::warn!(
            "Sighash still high after {} increments; do not broadcast this transaction",
            increments
        ),
    }
}

fn status_code(low_sighash: bool, fee_ok: bool) -> u8 {
    if !low_sighash {
        EXIT_HIGH_SIGHASH
    } else if !fee_ok {
        EXIT_LOW_FEE
    } else {
        0
    }
}
