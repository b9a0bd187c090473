//! Gridstore administrative tool
//!
//! Thin consumer of the inventory store façade: snapshot lifecycle,
//! restore, inspection and lock administration.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use gridstore::snapshot::{parse_tag, SnapshotClear, SnapshotSelector};
use gridstore::store::load_scoped;
use gridstore::{
    BlockId, DatasetStatus, InventoryStore, LoadFlags, NameFilter, StoreConfig,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "storectl")]
#[command(about = "Administrative interface to the grid inventory store")]
struct Args {
    /// Path to the store configuration (TOML)
    #[arg(short = 'c', long, default_value = "gridstore.toml")]
    config: PathBuf,

    /// Snapshot tag to operate on. With `clean`, prefix with '<' or '>' to
    /// remove all snapshots older or newer than the timestamp. With `list`
    /// and `show`, switches to the snapshot before reading.
    #[arg(short = 't', long, default_value = "")]
    tag: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a snapshot of the current inventory
    Snapshot {
        /// What to clear from the live store afterwards: replicas | all
        #[arg(value_name = "CLEAR", num_args = 0..=2)]
        clear: Vec<String>,
    },
    /// Wipe the live store contents
    Clear,
    /// Remove snapshots (by tag, by window, or everything up to now)
    Clean,
    /// Restore the live store from a snapshot (tag or "last")
    Restore,
    /// List datasets, groups, sites or snapshots
    List {
        #[arg(value_name = "WHAT")]
        what: String,
    },
    /// Show one dataset, block, site or replica
    Show {
        #[arg(value_name = "WHAT")]
        what: String,
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Set and persist a dataset status
    SetDatasetStatus {
        #[arg(value_name = "DATASET")]
        dataset: String,
        #[arg(value_name = "STATUS")]
        status: String,
    },
    /// Set the store's last-update timestamp
    SetLastUpdate {
        #[arg(value_name = "TIMESTAMP")]
        timestamp: i64,
    },
    /// Take the store-wide exclusive lock (add "block" to wait for it)
    Lock {
        #[arg(value_name = "MODE", default_value = "")]
        mode: String,
    },
    /// Force-release the store-wide exclusive lock
    Release,
}

/// Parse the clear argument of `snapshot clear <mode>`.
fn parse_clear_mode(args: &[String]) -> Result<SnapshotClear, String> {
    match args {
        [] => Ok(SnapshotClear::None),
        [kw, mode] if kw == "clear" => match mode.as_str() {
            "replicas" => Ok(SnapshotClear::Replicas),
            "all" => Ok(SnapshotClear::All),
            other => Err(format!(
                "Invalid clear mode '{}'. Valid options: replicas, all",
                other
            )),
        },
        _ => Err("Usage: snapshot [clear (replicas|all)]".to_string()),
    }
}

/// Turn the `clean` tag argument into a snapshot selector.
fn parse_clean_selector(tag: &str) -> Result<SnapshotSelector, String> {
    if tag.is_empty() {
        return Ok(SnapshotSelector::everything_before_now());
    }

    if let Some(stamp) = tag.strip_prefix('<') {
        let bound = parse_tag(stamp).ok_or_else(|| format!("Invalid timestamp '{}'", stamp))?;
        return Ok(SnapshotSelector::Window {
            newer_than: None,
            older_than: Some(bound),
        });
    }

    if let Some(stamp) = tag.strip_prefix('>') {
        let bound = parse_tag(stamp).ok_or_else(|| format!("Invalid timestamp '{}'", stamp))?;
        return Ok(SnapshotSelector::Window {
            newer_than: Some(bound),
            older_than: None,
        });
    }

    Ok(SnapshotSelector::Tag(tag.to_string()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = StoreConfig::from_path(&args.config)
        .with_context(|| format!("cannot read configuration at {:?}", args.config))?;
    let mut store = InventoryStore::open(&config)?;

    match args.command {
        Command::Snapshot { clear } => {
            let clear = parse_clear_mode(&clear).map_err(|e| anyhow!(e))?;
            let tag = if args.tag.is_empty() {
                None
            } else {
                Some(args.tag.as_str())
            };
            let tag = store.make_snapshot(clear, tag)?;
            info!("Snapshot {} taken", tag);
        }

        Command::Clear => {
            store.clear()?;
            info!("Store contents cleared");
        }

        Command::Clean => {
            let selector = parse_clean_selector(&args.tag).map_err(|e| anyhow!(e))?;
            store.remove_snapshot(Some(selector))?;
        }

        Command::Restore => {
            if args.tag.is_empty() {
                bail!("Specify a tag (can be \"last\").");
            }
            store.recover_from(&args.tag)?;
        }

        Command::List { what } => {
            if !args.tag.is_empty() {
                store.switch_snapshot(&args.tag)?;
            }

            if what == "snapshots" {
                for tag in store.list_snapshots(false)? {
                    println!("{}", tag);
                }
            } else {
                let inventory = store.load_data(
                    &NameFilter::all(),
                    &NameFilter::all(),
                    LoadFlags::default(),
                )?;
                match what.as_str() {
                    "datasets" => {
                        let mut names: Vec<&String> = inventory.datasets.keys().collect();
                        names.sort();
                        for name in names {
                            println!("{}", name);
                        }
                    }
                    "groups" => {
                        let mut names: Vec<&String> = inventory.groups.keys().collect();
                        names.sort();
                        for name in names {
                            println!("{}", name);
                        }
                    }
                    "sites" => {
                        for name in store.site_list(&NameFilter::all())? {
                            println!("{}", name);
                        }
                    }
                    other => bail!("Cannot list '{}'", other),
                }
            }
        }

        Command::Show { what, name } => {
            if !args.tag.is_empty() {
                store.switch_snapshot(&args.tag)?;
            }

            match what.as_str() {
                "dataset" => {
                    let inventory = load_scoped(&mut store, "*", &name)?;
                    let dataset = inventory
                        .datasets
                        .get(&name)
                        .ok_or_else(|| anyhow!("No dataset {} found.", name))?;
                    println!("{}", dataset);
                }

                "block" => {
                    let (dataset_name, block_name) = name
                        .split_once('#')
                        .ok_or_else(|| anyhow!("Block names look like DATASET#BLOCK"))?;
                    let inventory = load_scoped(&mut store, "*", dataset_name)?;
                    let dataset = inventory
                        .datasets
                        .get(dataset_name)
                        .ok_or_else(|| anyhow!("No dataset {} found.", dataset_name))?;
                    let id: BlockId = block_name.parse()?;
                    let block = dataset.find_block(id).ok_or_else(|| {
                        anyhow!("No block {} found in dataset {}.", block_name, dataset_name)
                    })?;
                    println!("{}", block);
                }

                "site" => {
                    let inventory = load_scoped(&mut store, &name, "*")?;
                    let site = inventory
                        .sites
                        .get(&name)
                        .ok_or_else(|| anyhow!("No site {} found.", name))?;
                    println!("{}", site);
                }

                "replica" => {
                    let (site_name, obj_name) = name
                        .split_once(':')
                        .ok_or_else(|| anyhow!("Replica names look like SITE:DATASET[#BLOCK]"))?;
                    let (dataset_name, block_name) = match obj_name.split_once('#') {
                        Some((d, b)) => (d, Some(b)),
                        None => (obj_name, None),
                    };

                    let inventory = load_scoped(&mut store, site_name, dataset_name)?;
                    let replica = inventory
                        .replica(dataset_name, site_name)
                        .ok_or_else(|| anyhow!("No replica {} found.", name))?;

                    match block_name {
                        None => println!("{}", replica),
                        Some(block_name) => {
                            let id: BlockId = block_name.parse()?;
                            let block_replica = replica
                                .find_block_replica(id)
                                .ok_or_else(|| anyhow!("No replica {} found.", name))?;
                            println!("{}", block_replica);
                        }
                    }
                }

                other => bail!("Cannot show '{}'", other),
            }
        }

        Command::SetDatasetStatus { dataset, status } => {
            let status: DatasetStatus = status.parse()?;
            store.set_dataset_status(&dataset, status)?;
        }

        Command::SetLastUpdate { timestamp } => {
            store.set_last_update(Some(timestamp))?;
        }

        Command::Lock { mode } => {
            let blocking = mode == "block";
            if store.acquire_lock(blocking)? {
                info!("Lock acquired");
            } else {
                info!("Lock is held elsewhere");
            }
        }

        Command::Release => {
            store.release_lock(true)?;
            info!("Lock released");
        }
    }

    Ok(())
}
