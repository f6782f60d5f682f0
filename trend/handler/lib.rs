use std::collections::HashMap;

use actix_web::{get, http::StatusCode, web, HttpResponse, ResponseError};
use serde::Serialize;
use tracing::instrument;

mod query;

pub use query::{EnvChartsQuery, QueryError, TestChartsQuery, DEFAULT_TESTS_IN_TOP};

const ALLOW_ORIGIN: (&str, &str) = ("Access-Control-Allow-Origin", "*");

impl ResponseError for QueryError {
    fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        if !self.is_client_error() {
            tracing::error!("query failed: {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ALLOW_ORIGIN)
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

/// Registers the query endpoints. Expects `web::Data<state::Global>` in app
/// data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(summary)
        .service(env_charts)
        .service(test_charts)
        .service(tables)
        .service(metrics_handler);
}

fn json<T: Serialize>(v: &T) -> HttpResponse {
    HttpResponse::Ok().insert_header(ALLOW_ORIGIN).json(v)
}

#[get("/summary")]
#[instrument(skip(global))]
async fn summary(global: web::Data<state::Global>) -> Result<HttpResponse, QueryError> {
    let res = db::exec::run(global.db_manager.clone(), |db| db.get_overview()).await?;
    Ok(json(&res))
}

#[get("/env")]
#[instrument(skip(global))]
async fn env_charts(
    global: web::Data<state::Global>,
    params: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, QueryError> {
    let q = EnvChartsQuery::parse(&params)?;
    let res = db::exec::run(global.db_manager.clone(), move |db| {
        db.get_env_charts(&q.env, q.tests_in_top)
    })
    .await?;
    Ok(json(&res))
}

#[get("/test")]
#[instrument(skip(global))]
async fn test_charts(
    global: web::Data<state::Global>,
    params: web::Query<HashMap<String, String>>,
) -> Result<HttpResponse, QueryError> {
    let q = TestChartsQuery::parse(&params)?;
    let res = db::exec::run(global.db_manager.clone(), move |db| db.get_test_charts(&q.env, &q.test)).await?;
    Ok(json(&res))
}

#[get("/db")]
#[instrument(skip(global))]
async fn tables(global: web::Data<state::Global>) -> Result<HttpResponse, QueryError> {
    let res = db::exec::run(global.db_manager.clone(), |db| db.get_environment_tests_and_test_cases()).await?;
    Ok(json(&res))
}

#[get("/metrics")]
#[instrument]
async fn metrics_handler() -> Result<HttpResponse, QueryError> {
    let body = metrics::openmetrics_string()?;
    Ok(HttpResponse::Ok()
        .insert_header(ALLOW_ORIGIN)
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(body))
}
