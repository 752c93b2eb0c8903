//! HTTP request handlers for the web adapter.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::domain::request::{
    parse_timeframe, validate_bars, RangeRequest, DEFAULT_BARS, DEFAULT_SCAN_BARS,
    DEFAULT_SYMBOL, DEFAULT_TIMEFRAME_MINUTES,
};

use super::{AppState, WebError};

/// Symbols accepted by one quick scan.
pub const MAX_SCAN_SYMBOLS: usize = 20;

/// Parse an optional JSON body; an empty body yields the default value.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, WebError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| WebError::bad_request(format!("invalid JSON body: {e}")))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "instruments": state.service.registry().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchParams {
    pub symbol: Option<String>,
    pub tf: Option<u32>,
    pub candles: Option<usize>,
    pub lookback: Option<usize>,
    pub force_refresh: Option<bool>,
}

pub async fn fetch_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FetchParams>,
) -> Result<Response, WebError> {
    let request = RangeRequest::new(
        params.symbol.as_deref().unwrap_or(DEFAULT_SYMBOL),
        params.tf.unwrap_or(DEFAULT_TIMEFRAME_MINUTES),
        params.candles.unwrap_or(DEFAULT_BARS),
        params.lookback.unwrap_or(state.service.settings().lookback),
        params.force_refresh.unwrap_or(false),
    )?;

    let service = state.service.clone();
    let response =
        tokio::task::spawn_blocking(move || service.fetch_and_calculate_ranges(&request)).await?;

    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(response)).into_response())
}

pub async fn symbols(State(state): State<Arc<AppState>>) -> Json<Value> {
    let instruments = state.service.registry().instruments();
    Json(json!({
        "success": true,
        "count": instruments.len(),
        "symbols": instruments,
    }))
}

pub async fn cache_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, WebError> {
    let service = state.service.clone();
    let status = tokio::task::spawn_blocking(move || service.cache_status()).await?;
    Ok(Json(json!({
        "success": true,
        "cache": status,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearBody {
    pub symbol: Option<String>,
}

pub async fn cache_clear(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, WebError> {
    let body: ClearBody = optional_body(&body)?;
    let service = state.service.clone();
    let symbol = body.symbol.clone();
    let removed =
        tokio::task::spawn_blocking(move || service.clear_cache(symbol.as_deref())).await?;

    let message = match &body.symbol {
        Some(symbol) => format!("cache cleared for {symbol}"),
        None => "cache cleared".to_string(),
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "removed": removed,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CachedParams {
    pub tf: Option<u32>,
    pub candles: Option<usize>,
}

pub async fn cached_ranges(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<CachedParams>,
) -> Result<Response, WebError> {
    let timeframe = parse_timeframe(params.tf.unwrap_or(DEFAULT_TIMEFRAME_MINUTES))?;
    let bars = params.candles.unwrap_or(DEFAULT_BARS);
    validate_bars(bars)?;

    let service = state.service.clone();
    let response =
        tokio::task::spawn_blocking(move || service.get_cached(&symbol, timeframe, bars))
            .await??;
    Ok(Json(response).into_response())
}

#[derive(Debug, Deserialize)]
pub struct QuickScanBody {
    pub symbols: Vec<String>,
    pub tf: Option<u32>,
    pub candles: Option<usize>,
    pub lookback: Option<usize>,
}

pub async fn quick_scan(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, WebError> {
    let body: QuickScanBody = serde_json::from_slice(&body)
        .map_err(|e| WebError::bad_request(format!("invalid JSON body: {e}")))?;
    if body.symbols.is_empty() {
        return Err(WebError::bad_request("symbols must be a non-empty list"));
    }
    if body.symbols.len() > MAX_SCAN_SYMBOLS {
        return Err(WebError::bad_request(format!(
            "at most {MAX_SCAN_SYMBOLS} symbols per scan"
        )));
    }

    let timeframe = body.tf.unwrap_or(DEFAULT_TIMEFRAME_MINUTES);
    parse_timeframe(timeframe)?;
    let bars = body.candles.unwrap_or(DEFAULT_SCAN_BARS);
    validate_bars(bars)?;
    let lookback = body.lookback.unwrap_or(state.service.settings().lookback);

    let service = state.service.clone();
    let symbols = body.symbols;
    let results = tokio::task::spawn_blocking(move || {
        service.quick_scan(&symbols, timeframe, bars, lookback)
    })
    .await?;

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(Json(json!({
        "success": true,
        "timeframe": timeframe,
        "bars": bars,
        "lookback": lookback,
        "scanned": results.len(),
        "succeeded": succeeded,
        "results": results,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SymbolParam {
    pub symbol: Option<String>,
}

pub async fn calculated_ranges(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolParam>,
) -> Result<Json<Value>, WebError> {
    let ranges = state
        .service
        .get_calculated_ranges(params.symbol.as_deref())?;
    Ok(Json(json!({
        "success": true,
        "ranges": ranges,
    })))
}

pub async fn merged_ranges(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolParam>,
) -> Result<Json<Value>, WebError> {
    let ranges = state.service.get_merged_ranges(params.symbol.as_deref())?;
    Ok(Json(json!({
        "success": true,
        "ranges": ranges,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepBody {
    pub tf: Option<u32>,
    pub candles: Option<usize>,
}

pub async fn sweep(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, WebError> {
    let body: SweepBody = optional_body(&body)?;
    let timeframe = match body.tf {
        Some(tf) => parse_timeframe(tf)?,
        None => state.sweep_timeframe,
    };
    let bars = body.candles.unwrap_or(state.sweep_bars);
    validate_bars(bars)?;

    let service = state.service.clone();
    let counts =
        tokio::task::spawn_blocking(move || service.fetch_all_symbols_data(timeframe, bars))
            .await?;
    Ok(Json(json!({
        "success": true,
        "timeframe": timeframe.minutes(),
        "bars": bars,
        "symbols": counts,
    })))
}

pub async fn not_found() -> WebError {
    WebError::not_found("no such endpoint")
}
