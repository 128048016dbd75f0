use zcatalog::{Catalog, MemoryCatalog, PgCatalog, SqliteCatalog};

mod conf;
mod error;
mod server;
mod session;

#[cfg(test)]
mod tests;

use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn load_options() -> getopts::Matches {
    let mut ops = getopts::Options::new();

    ops.optflag("h", "help", "print this help text");
    ops.optopt("", "port", "listen port; overrides ZSERVER_PORT", "PORT");
    ops.optopt("", "bind", "bind address; overrides ZSERVER_BIND", "ADDR");

    let args: Vec<String> = std::env::args().collect();

    let params = match ops.parse(&args[1..]) {
        Ok(p) => p,
        Err(e) => panic!("Cannot parse options: {e}"),
    };

    if params.opt_present("help") {
        println!("{}", ops.usage("zgate-server"));
        std::process::exit(0);
    }

    params
}

fn open_catalog(conf: &conf::Config) -> Result<Arc<dyn Catalog>, String> {
    let Some(ref database) = conf.database else {
        log::info!("no database configured; using the built-in memory catalog");
        return Ok(Arc::new(
            MemoryCatalog::new(Vec::new()).with_profile(conf.default_profile),
        ));
    };

    if database.starts_with("postgres://") || database.starts_with("postgresql://") {
        let catalog = PgCatalog::connect(database)
            .map_err(|e| format!("cannot connect to {database}: {e}"))?
            .with_profile(conf.default_profile);
        return Ok(Arc::new(catalog));
    }

    let catalog = SqliteCatalog::open(database)
        .map_err(|e| format!("cannot open {database}: {e}"))?
        .with_profile(conf.default_profile);
    catalog.init_schema().map_err(|e| e.to_string())?;

    Ok(Arc::new(catalog))
}

fn main() {
    env_logger::init();

    let params = load_options();

    let mut conf = match conf::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Some(port) = params.opt_str("port") {
        conf.port = port.parse::<u16>().expect("Invalid port value");
    }
    if let Some(bind) = params.opt_str("bind") {
        conf.bind = bind;
    }

    let bind = conf.bind.clone();
    let port = conf.port;
    conf.apply();

    // Canned values for InitializeResponse messages.
    z3950::ImplementationPrefs {
        implementation_id: Some("ZGW".to_string()),
        implementation_name: Some("zgate".to_string()),
        implementation_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        init_options: z3950::prefs::InitOptions {
            search: true,
            present: true,
            del_set: true,
            scan: true,
            sort: true,
            named_result_sets: true,
            ..Default::default()
        },
        ..Default::default()
    }
    .apply();

    let catalog = match open_catalog(conf::global()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Exit 0 on SIGINT/SIGTERM via the shared shutdown flag.
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, shutdown.clone()) {
            eprintln!("Cannot register signal handler: {e}");
            std::process::exit(1);
        }
    }

    let tcp_listener = match TcpListener::bind((bind.as_str(), port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Cannot listen for connections at {bind}:{port}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::ZServer::new(tcp_listener, catalog, shutdown).run() {
        eprintln!("Server exited with error: {e}");
        std::process::exit(1);
    }
}
