use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use court_ledger::api::{self, AppState};
use court_ledger::config::Config;
use court_ledger::court::{CaseLedger, SharedLedger};

const DEFAULT_JUDGES: [(&str, &str); 3] = [
    ("María Rodríguez", "civil"),
    ("Carlos Mendoza", "penal"),
    ("Ana López", "laboral"),
];

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, err));
        }
    };

    let mut ledger = CaseLedger::new(config.difficulty);
    if config.seed_judges {
        for (name, specialty) in DEFAULT_JUDGES {
            ledger.register_judge(name, specialty);
        }
    }

    let state = web::Data::new(AppState {
        ledger: SharedLedger::new(ledger),
    });

    let (host, port) = config.bind_address();
    info!(
        "court ledger listening on {}:{} (difficulty {})",
        host, port, config.difficulty
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
