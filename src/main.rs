mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod utils;

use actix_web::{web, App, HttpServer};
use chrono::Local;
use sqlx::postgres::PgPoolOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::routes::{api_v1_routes, public_routes};
use crate::services::{GatewayClient, OrderService, PayService};
use crate::state::AppState;
use crate::utils::CredentialStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    log_builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
                record.level(),
                record.args()
            )
        })
        .init();

    // 加载并校验配置
    let config = Config::from_env()?;
    config.validate()?;

    // 初始化数据库连接池
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .connect(&config.database.url)
        .await?;
    log::info!("database connection pool established");

    // 运行数据库迁移
    sqlx::migrate!().run(&db_pool).await?;
    log::info!("database migrations applied");

    // 启动时预解析支付凭证；失败不阻止启动，支付调用前会再次解析
    let credentials = Arc::new(CredentialStore::new(config.wechat.clone()));
    match credentials.reload() {
        Ok(bundle) => log::info!(
            "payment credentials resolved, merchant serial {}",
            bundle.mch_serial_no
        ),
        Err(e) => log::warn!("payment credentials not available at startup: {}", e),
    }

    // 组装业务服务
    let gateway_client = GatewayClient::new(Arc::clone(&credentials), config.wechat.timeout)?;
    let pay_service = Arc::new(PayService::new(
        gateway_client,
        Arc::clone(&credentials),
        config.wechat.clone(),
    ));
    let order_service = Arc::new(OrderService::new(db_pool.clone(), Arc::clone(&pay_service)));

    let bind_address = config.bind_address();
    let workers = config.server.workers;
    let app_state = web::Data::new(AppState::new(
        db_pool,
        config,
        credentials,
        pay_service,
        order_service,
    ));

    log::info!("starting server on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .service(api_v1_routes())
            .service(public_routes())
    })
    .bind(&bind_address)?;

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.run().await?;
    Ok(())
}
