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

use std::path::PathBuf;

use structopt::StructOpt;

use crate::support::sysexits::*;
use crate::support::system_config::{
    self, FilesystemFormat, StorageLayerConfig, SystemConfig,
};

/// A mock Mail Transfer Agent: accepts SMTP deliveries, stores them for
/// inspection over HTTP, and optionally relays them upstream.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The TOML configuration file. Without it, a default configuration
    /// with a memory cache over a filesystem store is used.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Override the SMTP listen address.
    #[structopt(long)]
    smtp_addr: Option<String>,

    /// Override the HTTP listen address.
    #[structopt(long)]
    http_addr: Option<String>,

    /// Storage directory for the default configuration. Ignored when the
    /// configuration file declares its own storage layers.
    #[structopt(long, parse(from_os_str), default_value = "./mockmta-data")]
    storage: PathBuf,

    /// Seed an empty store with the message files (*.eml, *.txt) found in
    /// this directory.
    #[structopt(long, parse(from_os_str))]
    test_data: Option<PathBuf>,

    /// Override the log level (error, warn, info, debug, trace).
    #[structopt(long)]
    log_level: Option<String>,
}

pub fn main() {
    let options = Options::from_args();

    let mut config = match options.config {
        Some(ref path) => match system_config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Error in config file at '{}': {}",
                    path.display(),
                    e
                );
                EX_CONFIG.exit()
            },
        },
        None => SystemConfig::default(),
    };

    if let Some(smtp_addr) = options.smtp_addr {
        config.smtp.addr = smtp_addr;
    }
    if let Some(http_addr) = options.http_addr {
        config.http.addr = http_addr;
    }
    if let Some(log_level) = options.log_level {
        config.log.level = log_level;
    }
    if config.storages.is_empty() {
        config.storages = vec![
            StorageLayerConfig::Memory,
            StorageLayerConfig::Filesystem {
                folder: options.storage.clone(),
                format: FilesystemFormat::Eml,
            },
        ];
    }

    let level = match config.log.level.parse::<log::LevelFilter>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("Unknown log level: {}", config.log.level);
            EX_CONFIG.exit()
        },
    };
    crate::init_simple_log(level);

    super::serve::serve(config, options.test_data);
}
