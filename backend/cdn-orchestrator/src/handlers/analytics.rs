use crate::error::Result;
use crate::orchestrator::CdnOrchestrator;
use crate::services::TimeRange;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub range: Option<String>,
}

pub async fn get_analytics(
    orchestrator: web::Data<CdnOrchestrator>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse> {
    let range = query
        .range
        .as_deref()
        .map(str::parse::<TimeRange>)
        .transpose()?;
    Ok(HttpResponse::Ok().json(orchestrator.get_analytics(range).await))
}

pub async fn get_recommendations(orchestrator: web::Data<CdnOrchestrator>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(orchestrator.cost_recommendations()))
}
