//-
// Copyright (c) 2026, The Mockmta Authors
//
// This file is part of Mockmta.
//
// Mockmta is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mockmta is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with Mockmta. If not, see <http://www.gnu.org/licenses/>.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use crate::http::server::HttpServer;
use crate::smtp::server::SmtpServer;
use crate::storage::engine::Engine;
use crate::storage::Storage;
use crate::support::error::Error;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[tokio::main]
pub(super) async fn serve(
    config: SystemConfig,
    test_data: Option<PathBuf>,
) {
    let engine = match Engine::new(&config.storages) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("failed to initialise storage: {}", e);
            EX_CONFIG.exit()
        },
    };

    if let Some(ref test_data_dir) = test_data {
        if let Err(e) = seed_test_data(&engine, test_data_dir) {
            error!(
                "cannot load test data directory {:?}: {}",
                test_data_dir, e
            );
            EX_DATAERR.exit()
        }
    }

    let smtp = SmtpServer::new(config.smtp.clone(), Arc::clone(&engine));
    let http = HttpServer::new(
        config.http.clone(),
        config.smtp.relays.clone(),
        Arc::clone(&engine),
    );

    tokio::spawn(supervise("smtp", move || Arc::clone(&smtp).run()));
    tokio::spawn(supervise("http", move || Arc::clone(&http).run()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, exiting"),
        Err(e) => error!("cannot wait for shutdown signal: {}", e),
    }
}

/// Run a server loop forever, restarting it after a bounded back-off when
/// it fails or panics. The storage core itself never panics in normal
/// paths; this guards the outer server loops.
async fn supervise<F, Fut>(name: &'static str, mut server: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match tokio::spawn(server()).await {
            Ok(Ok(())) => {
                info!("{} server exited", name);
                return;
            },
            Ok(Err(e)) => error!("{} server error: {}", name, e),
            Err(e) => error!("{} server panicked: {}", name, e),
        }

        info!("restarting {} server in {:?}", name, backoff);
        tokio::time::sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
    }
}

/// Load every `*.eml` / `*.txt` file of `dir` into an empty store.
fn seed_test_data(engine: &Engine, dir: &Path) -> Result<(), Error> {
    let (_, total) = engine.search_emails("", 1, -1)?;
    if total > 0 {
        return Err(Error::StorageNotEmpty);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("eml") | Some("txt")
                )
        })
        .collect();
    paths.sort();

    for path in paths {
        info!("loading file {:?}", path);
        let content = std::fs::read(&path)?;
        engine.set(&content)?;
    }
    Ok(())
}
