use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flagsync_lib::scope::parse_scope;
use flagsync_lib::{
    Driver, DriverKind, FlagsyncConfig, FlagsyncError, FlagsyncResult, RequestContext,
    ScopeSerializer, StaticContext, ValueStore,
};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "Flagsync")]
#[command(version)]
#[command(about = "Inspect and change stored feature flag values", long_about = None)]
struct Args {
    /// Path to config file
    #[arg(
        short = 'c',
        long = "config",
        env = "FLAGSYNC_CONFIG",
        default_value = "flagsync.toml",
        global = true
    )]
    config: String,

    /// Store to use instead of the configured default
    #[arg(short = 's', long = "store", global = true)]
    store: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

// Scopes are written as `null`, `#42`, `User|1`, a bare string or a "quoted" string.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value of a feature, resolving and storing it when missing
    Get {
        feature: String,

        #[arg(default_value = "null")]
        scope: String,
    },
    /// Store a value (JSON, or a plain string) for a feature
    Set {
        feature: String,

        value: String,

        #[arg(default_value = "null")]
        scope: String,

        /// Overwrite the value for every scope already stored
        #[arg(short = 'a', long = "all")]
        all: bool,
    },
    /// Drop a stored value so it is resolved again on the next read
    Forget {
        feature: String,

        #[arg(default_value = "null")]
        scope: String,
    },
    /// Remove stored values of the given features, or of every feature
    Purge { features: Vec<String> },
    /// List stored values
    List {
        /// Only show features whose name matches this regex
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,
    },
    /// List features defined in the config, in definition order
    Defined,
}

/// JSON when it parses, a plain string otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn run_list(
    store: &dyn ValueStore,
    serializer: &ScopeSerializer,
    filter: Option<&str>,
) -> FlagsyncResult<()> {
    let filter = filter
        .map(Regex::new)
        .transpose()
        .map_err(|e| FlagsyncError::InvalidOperation(format!("invalid filter: {}", e)))?;

    let mut records = store.records()?;
    records.sort_by(|a, b| (&a.name, &a.scope).cmp(&(&b.name, &b.scope)));

    for record in records {
        if let Some(filter) = &filter {
            if !filter.is_match(&record.name) {
                continue;
            }
        }
        let scope = match serializer.deserialize(&record.scope) {
            Ok(scope) => scope.to_string(),
            Err(_) => record.scope.clone(),
        };
        println!(
            "{}  {}  {}  (updated {})",
            record.name, scope, record.value, record.updated_at
        );
    }
    Ok(())
}

/// A batch process has no session to keep in sync, so every scope, the null
/// scope included, is read from and written to the store.
fn open_driver(
    config: &FlagsyncConfig,
    store: Arc<dyn ValueStore>,
) -> FlagsyncResult<Arc<dyn Driver>> {
    let context: Arc<dyn RequestContext> = Arc::new(StaticContext::batch());
    config.build_driver_with_store(DriverKind::Database, store, None, context)
}

fn run(args: Args) -> FlagsyncResult<()> {
    let mut config = FlagsyncConfig::load(&args.config)?;
    config.apply_env_overrides();

    let store_config = config.store(args.store.as_deref())?;
    let store = store_config.open_store()?;
    if store_config.driver == DriverKind::SessionAndDatabase {
        debug!("no session outside a request, using the store directly");
    }
    let driver = open_driver(&config, store.clone())?;

    match args.cmd {
        Command::Get { feature, scope } => {
            let scope = parse_scope(&scope)?;
            println!("{}", driver.get(&feature, &scope)?);
        }
        Command::Set {
            feature,
            value,
            scope,
            all,
        } => {
            let value = parse_value(&value);
            if all {
                driver.set_for_all_scopes(&feature, value)?;
                info!(feature = %feature, "value set for every scope");
            } else {
                let scope = parse_scope(&scope)?;
                driver.set(&feature, &scope, value)?;
                info!(feature = %feature, scope = %scope, "value set");
            }
        }
        Command::Forget { feature, scope } => {
            let scope = parse_scope(&scope)?;
            driver.delete(&feature, &scope)?;
        }
        Command::Purge { features } => {
            if features.is_empty() {
                driver.purge(None)?;
            } else {
                driver.purge(Some(features.as_slice()))?;
            }
        }
        Command::List { filter } => {
            let serializer = ScopeSerializer::with_morph_map(config.morph_map.clone());
            run_list(store.as_ref(), &serializer, filter.as_deref())?;
        }
        Command::Defined => {
            for name in driver.defined() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagsync_lib::{MemoryStore, Scope};
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value(r#"{"plan":"pro"}"#), json!({"plan": "pro"}));
        assert_eq!(parse_value("summer"), json!("summer"));
        assert_eq!(parse_value(""), json!(""));
    }

    #[test]
    fn test_null_scope_values_outlive_the_process() {
        let config = FlagsyncConfig::from_toml("[features]\nbanner = \"summer\"\n").unwrap();
        let store: Arc<dyn ValueStore> = Arc::new(MemoryStore::new());

        let first = open_driver(&config, store.clone()).unwrap();
        first.set("foo", &parse_scope("null").unwrap(), json!(true)).unwrap();
        assert_eq!(first.get("banner", &Scope::Null).unwrap(), json!("summer"));

        let second = open_driver(&config, store.clone()).unwrap();
        assert_eq!(second.get("foo", &Scope::Null).unwrap(), json!(true));
        assert_eq!(second.get("banner", &Scope::Null).unwrap(), json!("summer"));
        assert_eq!(store.count().unwrap(), 2);

        second.delete("foo", &Scope::Null).unwrap();
        let third = open_driver(&config, store.clone()).unwrap();
        assert_eq!(third.get("foo", &Scope::Null).unwrap(), json!(false));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["fs", "set", "banner", "\"v2\"", "User|1"]).unwrap();
        match args.cmd {
            Command::Set {
                feature,
                value,
                scope,
                all,
            } => {
                assert_eq!(feature, "banner");
                assert_eq!(value, "\"v2\"");
                assert_eq!(scope, "User|1");
                assert!(!all);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.config, "flagsync.toml");
    }
}
