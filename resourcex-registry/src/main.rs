// Copyright 2018 Alex Crawford
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use actix_web::{middleware::Logger, web, App, HttpServer};
use resourcex_registry::config::{ServerConfig, ServerConfigInput};
use resourcex_registry::{server, status, AppState, Metrics};
use std::path::PathBuf;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env().init();

    let config_path = PathBuf::from("config.json");
    let config = ServerConfig::load(Some(&config_path), ServerConfigInput::default())?;
    log::debug!("server configuration: {:#?}", &config);

    let state = web::Data::new(AppState::new(config.data_root.clone())?);
    let metrics = web::Data::new(Metrics::new()?);

    log::info!("resourcex-registryd listening on {}:{}", config.address, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics.clone())
            .wrap(Logger::default())
            .configure(server::configure)
            .route("/metrics", web::get().to(status::serve_metrics))
            .route("/livez", web::get().to(status::serve_livez))
            .route("/readyz", web::get().to(status::serve_readyz))
    })
    .bind((config.address.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
