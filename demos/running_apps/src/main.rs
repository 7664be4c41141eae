use anyhow::Context;
use apptrack::{
    AppTracker, ChangeNotifier, Entry, JsonBehaviorStore, LogFormat, RegistryConfig,
    init_tracing, sort_by_display_name,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Print the applications currently running and the behavior assigned to each
#[derive(Parser, Debug)]
#[command(name = "running_apps")]
#[command(about, long_about = None)]
struct Args {
    /// Also list background processes and agents
    #[arg(long)]
    all: bool,

    /// Keep running and reprint whenever the registry changes
    #[arg(long)]
    watch: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Behavior rules file, defaults to `<config dir>/apptrack/behaviors.json`
    #[arg(long, env = "APPTRACK_RULES")]
    rules: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(if args.json {
        LogFormat::Json
    } else {
        LogFormat::Plain
    });

    let rules_path = args
        .rules
        .or_else(|| dirs::config_dir().map(|dir| dir.join("apptrack").join("behaviors.json")))
        .context("no configuration directory, pass --rules")?;

    let mut builder = RegistryConfig::builder();
    builder.origin("running-apps-demo");
    if args.all {
        builder.show_all(true);
    }
    let config = builder.build()?;

    let notifier = ChangeNotifier::default();
    let store = JsonBehaviorStore::open(&rules_path, Some(notifier.clone()))
        .with_context(|| format!("failed to open {}", rules_path.display()))?;
    info!(path = %rules_path.display(), "Using behavior rules");

    let tracker = AppTracker::start(config, Arc::new(store), notifier)?;
    print_entries(&tracker.sorted_entries());

    if args.watch {
        let mut snapshots = tracker.watch_snapshots();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let mut entries = snapshots.borrow_and_update().to_vec();
                    sort_by_display_name(&mut entries);
                    print_entries(&entries);
                }
            }
        }
    }

    tracker.shutdown().await?;
    Ok(())
}

fn print_entries(entries: &[Entry]) {
    println!("{} running application(s)", entries.len());
    for entry in entries {
        let pid = entry.pid.map(|pid| pid.to_string()).unwrap_or_default();
        println!(
            "{pid:>8}  {:<32} {:<10} {}",
            entry.display_name,
            format!("{:?}", entry.behavior),
            entry.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_line() {
        Args::command().debug_assert();

        let args =
            Args::try_parse_from(["running_apps", "--all", "--watch", "--rules", "rules.json"])
                .unwrap();
        assert!(args.all && args.watch && !args.json);
        assert_eq!(args.rules, Some(PathBuf::from("rules.json")));

        assert!(Args::try_parse_from(["running_apps", "--verbose"]).is_err());
    }
}
