//! Minimal example binary wiring a config file to a running broker.
//! Not a production daemon: no signal handling, no reload-on-SIGHUP,
//! no metrics endpoint — just enough to prove the broker runs end to end
//! against a real config file.

use std::sync::Arc;
use std::time::Duration;

use hound::config::StaticSchemaSource;
use hound::Broker;

fn main() {
    hound_lib::logging::init();

    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: houndd <config-file> [schema-base]");
            std::process::exit(2);
        }
    };
    let schema_base = args.next().unwrap_or_else(|| ".".to_string());

    let schema_source = Arc::new(StaticSchemaSource::new());
    let broker = Broker::new(schema_source);

    if let Err(e) = broker.init_config(&config_path, &schema_base) {
        log::error!("houndd: failed to load {config_path}: {}", hound::strerror(&e));
        std::process::exit(1);
    }

    log::info!("houndd: {} driver(s) registered, running", broker.get_datadesc().len());
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
