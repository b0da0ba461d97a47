//! Request handlers for `/api/search` (GET query params and POST JSON body)
//! and `/api/health`, matching the external contract of spec §6.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::aggregator::{Aggregator, ResMode, SearchRequest, SrcFilter};
use crate::api::responses::{HealthResponse, SearchSuccessResponse};
use crate::error::AggregatorError;
use crate::model::ExtMap;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_res_mode(s: Option<&str>) -> ResMode {
    match s.unwrap_or("merge") {
        "all" => ResMode::All,
        "results" => ResMode::Results,
        _ => ResMode::Merge,
    }
}

fn parse_src_filter(s: Option<&str>) -> SrcFilter {
    match s.unwrap_or("all") {
        "tg" => SrcFilter::Tg,
        "plugin" => SrcFilter::Plugin,
        _ => SrcFilter::All,
    }
}

/// Raw `GET /api/search` query parameters, before conversion into a
/// [`SearchRequest`]. List-valued fields travel as comma-separated strings.
#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub kw: Option<String>,
    pub channels: Option<String>,
    pub conc: Option<usize>,
    #[serde(default)]
    pub refresh: bool,
    pub res: Option<String>,
    pub src: Option<String>,
    pub plugins: Option<String>,
    pub cloud_types: Option<String>,
}

impl SearchQueryParams {
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            keyword: self.kw.unwrap_or_default(),
            channels: self.channels.as_deref().map(split_csv).unwrap_or_default(),
            concurrency: self.conc,
            refresh: self.refresh,
            res: parse_res_mode(self.res.as_deref()),
            src: parse_src_filter(self.src.as_deref()),
            plugins: self.plugins.as_deref().map(split_csv).unwrap_or_default(),
            cloud_types: self.cloud_types.as_deref().map(split_csv).unwrap_or_default(),
            ext: ExtMap::new(),
        }
    }
}

/// Raw `POST /api/search` JSON body.
#[derive(Debug, Deserialize)]
pub struct SearchRequestBody {
    pub kw: String,
    #[serde(default)]
    pub channels: Vec<String>,
    pub conc: Option<usize>,
    #[serde(default)]
    pub refresh: bool,
    pub res: Option<String>,
    pub src: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub cloud_types: Vec<String>,
    #[serde(default)]
    pub ext: ExtMap,
}

impl SearchRequestBody {
    fn into_request(self) -> SearchRequest {
        SearchRequest {
            keyword: self.kw,
            channels: self.channels,
            concurrency: self.conc,
            refresh: self.refresh,
            res: parse_res_mode(self.res.as_deref()),
            src: parse_src_filter(self.src.as_deref()),
            plugins: self.plugins,
            cloud_types: self.cloud_types,
            ext: self.ext,
        }
    }
}

pub async fn search_get(
    State(state): State<AppState>,
    Query(params): Query<SearchQueryParams>,
) -> Result<SearchSuccessResponse, AggregatorError> {
    let req = params.into_request();
    let resp = state.aggregator.search(req).await?;
    Ok(resp.into())
}

pub async fn search_post(
    State(state): State<AppState>,
    Json(body): Json<SearchRequestBody>,
) -> Result<SearchSuccessResponse, AggregatorError> {
    let req = body.into_request();
    let resp = state.aggregator.search(req).await?;
    Ok(resp.into())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.aggregator.source_registry();
    let plugins = registry.plugin_names();
    Json(HealthResponse {
        status: "ok",
        channels: registry.channel_names(),
        plugin_count: plugins.len(),
        plugins_enabled: !plugins.is_empty(),
        plugins,
        active_background_tasks: state.aggregator.active_background_tasks(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_split_trims_and_drops_empties() {
        assert_eq!(split_csv(" a, b ,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn res_mode_defaults_to_merge() {
        assert_eq!(parse_res_mode(None), ResMode::Merge);
        assert_eq!(parse_res_mode(Some("bogus")), ResMode::Merge);
        assert_eq!(parse_res_mode(Some("all")), ResMode::All);
    }

    #[test]
    fn src_filter_defaults_to_all() {
        assert_eq!(parse_src_filter(None), SrcFilter::All);
        assert_eq!(parse_src_filter(Some("tg")), SrcFilter::Tg);
    }
}
