mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;
use commands::{ConfigCommand, DatabaseCommand, IndexCommand, Opts, ServiceCommand};
use config::generator::generate_toml_config;
use config::Config;
use ubrc20::db::migrate_db;
use ubrc20::service::Service;
use ubrc20::try_info;
use ubrc20::utils::Context;

pub fn main() {
    let logger = hiro_system_kit::log::setup_logger();
    let _guard = hiro_system_kit::log::setup_global_logger(logger.clone());
    let ctx = Context {
        logger: Some(logger),
        tracer: false,
    };

    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = hiro_system_kit::nestable_block_on(handle_command(opts, &ctx)) {
        error!(ctx.expect_logger(), "{e}");
        std::thread::sleep(std::time::Duration::from_millis(500));
        process::exit(1);
    }
}

fn check_maintenance_mode(ctx: &Context) {
    let maintenance_enabled = std::env::var("UBRC20_MAINTENANCE").unwrap_or("0".into());
    if maintenance_enabled.eq("1") {
        try_info!(
            ctx,
            "Entering maintenance mode. Unset UBRC20_MAINTENANCE and reboot to resume operations"
        );
        sleep(Duration::from_secs(u64::MAX))
    }
}

fn confirm_rollback(current_chain_tip: u64, blocks_to_rollback: u32) -> Result<(), String> {
    println!("Index chain tip is at #{current_chain_tip}");
    println!(
        "{} blocks will be dropped. New index chain tip will be at #{}. Confirm? [Y/n]",
        blocks_to_rollback,
        current_chain_tip - blocks_to_rollback as u64
    );
    let mut buffer = String::new();
    std::io::stdin().read_line(&mut buffer).unwrap();
    if buffer.starts_with('n') {
        return Err("Rollback aborted".to_string());
    }
    Ok(())
}

fn install_ctrlc_handler(service: &Service, ctx: &Context) {
    let stop_signal = service.stop_signal();
    let moved_ctx = ctx.clone();
    let _ = ctrlc::set_handler(move || {
        try_info!(
            moved_ctx,
            "Termination signal received, stopping after the current block"
        );
        stop_signal.store(true, Ordering::SeqCst);
    });
}

async fn handle_command(opts: Opts, ctx: &Context) -> Result<(), String> {
    match opts {
        Opts::Service(subcmd) => match subcmd {
            ServiceCommand::Start(cmd) => {
                check_maintenance_mode(ctx);
                let config = Config::from_file_path(&cmd.config_path)?;
                migrate_db(&config, ctx).await?;

                let service = Service::new(&config, ctx)?;
                install_ctrlc_handler(&service, ctx);
                let start_block = service.get_index_chain_tip().await?.unwrap_or(0);
                try_info!(ctx, "Index chain tip is at #{start_block}");

                service.run().await?;
            }
        },
        Opts::Index(subcmd) => match subcmd {
            IndexCommand::Sync(cmd) => {
                let config = Config::from_file_path(&cmd.config_path)?;
                migrate_db(&config, ctx).await?;
                let service = Service::new(&config, ctx)?;
                install_ctrlc_handler(&service, ctx);
                service.catch_up_to_bitcoin_chain_tip().await?;
            }
            IndexCommand::Rollback(cmd) => {
                let config = Config::from_file_path(&cmd.config_path)?;
                let service = Service::new(&config, ctx)?;
                let chain_tip = service
                    .get_index_chain_tip()
                    .await?
                    .ok_or("the index is empty, nothing to rollback".to_string())?;
                if chain_tip < cmd.blocks as u64 {
                    return Err(format!(
                        "cannot rollback {} blocks from tip #{chain_tip}",
                        cmd.blocks
                    ));
                }
                confirm_rollback(chain_tip, cmd.blocks)?;
                service.rollback_to(chain_tip - cmd.blocks as u64).await?;
                println!("{} blocks dropped", cmd.blocks);
            }
        },
        Opts::Database(subcmd) => match subcmd {
            DatabaseCommand::Migrate(cmd) => {
                let config = Config::from_file_path(&cmd.config_path)?;
                migrate_db(&config, ctx).await?;
            }
        },
        Opts::Config(subcmd) => match subcmd {
            ConfigCommand::New(cmd) => {
                use std::fs::OpenOptions;
                let network = if cmd.regtest {
                    "regtest"
                } else if cmd.testnet {
                    "testnet"
                } else {
                    "mainnet"
                };
                let config_content = generate_toml_config(network);
                let mut file_path = PathBuf::new();
                file_path.push("Ubrc20.toml");
                let mut file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&file_path)
                    .map_err(|e| format!("unable to open file {}: {e}", file_path.display()))?;
                file.write_all(config_content.as_bytes())
                    .map_err(|e| format!("unable to write file {}: {e}", file_path.display()))?;
                println!("Created file Ubrc20.toml");
            }
        },
    }
    Ok(())
}
