use clap::{Parser, Subcommand};
use std::path::PathBuf;

use collect_meeting_logs::config::ServerConfig;
use collect_meeting_logs::{db, legacy_log, queries, serve};

#[derive(Parser, Debug)]
#[command(author, version, about = "Collect and reconcile meeting activity logs uploaded by hubs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the collector HTTP server
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Rebuild position state from the stored legacy log files
    Recover {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Recover a single meeting instead of every meeting with cold state
        #[arg(short, long)]
        uuid: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Serve { config } => {
            let config = ServerConfig::load(&config)?;
            serve::serve_collector(config)
        }
        Command::Recover { config, uuid } => {
            let config = ServerConfig::load(&config)?;
            recover(config, uuid)
        }
    }
}

/// Re-seed `last_update_serial`/`last_update_time` from each meeting's log
/// tail. Used after restoring a database backup that predates the log files.
fn recover(config: ServerConfig, uuid: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let conn = db::open_database_connection(&config.database)?;
    db::init_database_schema(&conn)?;
    db::check_schema_version(&conn)?;

    let uuids: Vec<String> = match uuid {
        Some(uuid) => vec![uuid],
        None => {
            let mut stmt = conn.prepare(&queries::meetings::select_without_position())?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };

    if uuids.is_empty() {
        println!("Nothing to recover: every meeting has position state");
        return Ok(());
    }

    for meeting_uuid in &uuids {
        match legacy_log::recover_last_line(&config.data_dir, meeting_uuid) {
            Ok(Some(line)) => {
                conn.execute(
                    &queries::meetings::update_position(
                        meeting_uuid,
                        line.last_log_serial,
                        line.last_log_time,
                    ),
                    [],
                )?;
                println!(
                    "Recovered {}: serial {} at {}",
                    meeting_uuid, line.last_log_serial, line.last_log_time
                );
            }
            Ok(None) => {
                println!("Skipped {}: no log data", meeting_uuid);
            }
            Err(e) => {
                return Err(format!(
                    "Failed to recover meeting '{}': {}",
                    meeting_uuid, e
                )
                .into());
            }
        }
    }

    Ok(())
}
