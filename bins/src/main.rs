use env::{Env, StoreKind};
use eyre::Context;
use ledger::{Ledger, LedgerConfig};
use log::{debug, info, warn, LevelFilter};
use model::{proto::TrainingProto, training::Training};
use storage::Storage;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let env = Env::load().context("Failed to read configuration")?;
    let mut logger = pretty_env_logger::formatted_builder();
    match env.rust_log() {
        Some(filters) => logger.parse_filters(filters),
        None => logger.filter_level(LevelFilter::Info),
    };
    logger.init();
    color_eyre::install()?;

    let storage = match env.store() {
        StoreKind::Mongo => {
            info!("connecting to mongo");
            Storage::new(env.mongo_url()?, env.db_name())
                .await
                .context("Failed to create storage")?
        }
        StoreKind::Memory => {
            info!("using in-memory store");
            Storage::in_memory()
        }
    };
    let config = LedgerConfig::from_env(&env)?;
    info!("creating ledger: {:?}", config);
    let ledger = Ledger::new(storage, config);

    let listener = ledger
        .listen(report)
        .await
        .context("Failed to listen to trainings")?;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    ledger.unlisten(listener);
    ledger.shutdown();
    Ok(())
}

fn report(trainings: Vec<Training>) {
    info!("{} trainings", trainings.len());
    for training in &trainings {
        let occupancy = training
            .sessions
            .iter()
            .map(|session| match session.free_places() {
                Some(free) => format!(
                    "{} {}/{} ({} free)",
                    session.id,
                    session.members.len(),
                    session.limit,
                    free
                ),
                None => format!("{} {}", session.id, session.members.len()),
            })
            .collect::<Vec<_>>()
            .join(", ");
        info!("{} ({}): {}", training.id, training.title, occupancy);

        match serde_json::to_string(&TrainingProto::from(training)) {
            Ok(json) => debug!("{}", json),
            Err(err) => warn!("Failed to dump training {}: {}", training.id, err),
        }
    }
}
