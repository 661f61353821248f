use deposit_ledger::{
    config::Config,
    db::{maybe_create_db, DbConnection, SCHEMA_VERSION},
    ledger::LedgerState,
};

use std::{env, path::PathBuf, process};

use tokio::runtime::Builder as RuntimeBuilder;

// No need for complex argument parsing: we only ever accept one, "--conf".
fn parse_args(args: Vec<String>) -> Option<PathBuf> {
    if args.len() == 1 {
        return None;
    }

    if args.len() != 3 || args[1] != "--conf" {
        eprintln!("Unknown arguments '{:?}'.", args);
        eprintln!("Only '--conf <configuration file path>' is supported.");
        process::exit(1);
    }

    Some(PathBuf::from(args[2].to_owned()))
}

// This creates the log file automagically if it doesn't exist, and logs on stdout
// if None is given
fn setup_logger(
    log_file: Option<&str>,
    log_level: log::LevelFilter,
) -> Result<(), fern::InitError> {
    let dispatcher = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log_level);

    if let Some(log_file) = log_file {
        dispatcher.chain(fern::log_file(log_file)?).apply()?;
    } else {
        dispatcher.chain(std::io::stdout()).apply()?;
    }

    Ok(())
}

async fn tokio_main(state: LedgerState) -> Result<(), Box<dyn std::error::Error>> {
    maybe_create_db(&state.postgres_config).await?;
    log::info!("Database is ready (schema version {})", SCHEMA_VERSION);

    let db_conn = DbConnection::new(&state.postgres_config).await?;
    let counts = db_conn.counts().await?;
    log::debug!("Ledger content: {:?}", counts);

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "new_deposit_requests": counts.deposit_requests,
            "deposit_move_txs": counts.move_txs,
            "withdrawal_sigs": counts.withdrawal_sigs,
        }))?
    );

    Ok(())
}

fn main() {
    #[cfg(not(target_family = "unix"))]
    {
        eprintln!("Only Unix is supported for now.");
        process::exit(1);
    }

    let args = env::args().collect();
    let conf_file = parse_args(args);
    let config = Config::from_file(conf_file).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        process::exit(1);
    });
    let state = LedgerState::from_config(config).unwrap_or_else(|e| {
        eprintln!("Error creating global state: {}", e);
        process::exit(1);
    });

    let log_file = state.log_file();
    let log_output = if state.log_to_file {
        Some(log_file.to_str().unwrap_or_else(|| {
            eprintln!("Log file path '{:?}' is not valid unicode", log_file);
            process::exit(1);
        }))
    } else {
        None
    };
    setup_logger(log_output, state.log_level).unwrap_or_else(|e| {
        eprintln!("Error setting up logger: {}", e);
        process::exit(1);
    });

    let rt = RuntimeBuilder::new_multi_thread()
        .enable_all()
        .thread_name("deposit_ledger_worker")
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Creating tokio runtime: {}", e);
            process::exit(1);
        });

    log::debug!("Using data directory '{:?}'", state.data_dir);
    rt.block_on(tokio_main(state)).unwrap_or_else(|e| {
        log::error!("Error initializing the ledger: {}", e);
        eprintln!("Error initializing the ledger: {}", e);
        process::exit(1);
    });
}
