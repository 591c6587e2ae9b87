// src/server.rs
//! JSON HTTP routes over [`Engine`], mirroring the dashboard's API paths.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, future::Future, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use warp::{
    http::StatusCode,
    reply::{self, Reply, Response},
    Filter, Rejection,
};

use crate::{
    config::Config,
    entries::{Entry, EntryLog},
    error::EngineError,
    filter::Filters,
    query::{Engine, Granularity, DEFAULT_PAGE_SIZE, DEFAULT_TOP_N},
    report,
};

const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Engine,
    pub entries: Arc<EntryLog>,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let entries = Arc::new(EntryLog::new(config.entries_path.clone()));
        let timeout = config.request_timeout();
        Self {
            engine: Engine::new(config),
            entries,
            timeout,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopRequest {
    column: String,
    n: Option<usize>,
    #[serde(default)]
    filters: Filters,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    dataset_present: bool,
}

#[derive(Serialize)]
struct NarrativeResponse {
    text: String,
}

fn error_reply(status: StatusCode, error: &str, details: Option<String>) -> Response {
    reply::with_status(
        reply::json(&ErrorResponse {
            error: error.to_string(),
            details,
        }),
        status,
    )
    .into_response()
}

/// Run one engine call under the request timeout and turn the outcome into a reply.
async fn respond<T, F>(timeout: Duration, work: F) -> Result<Response, Rejection>
where
    T: Serialize,
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(body)) => Ok(reply::json(&body).into_response()),
        Ok(Err(e)) if e.is_client_error() => {
            warn!("rejected query: {}", e);
            Ok(error_reply(
                StatusCode::BAD_REQUEST,
                "Invalid query",
                Some(e.to_string()),
            ))
        }
        Ok(Err(e)) => {
            error!("query failed: {:?}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error reading CSV file",
                Some(e.to_string()),
            ))
        }
        Err(_) => {
            warn!(?timeout, "query timed out");
            Ok(error_reply(StatusCode::GATEWAY_TIMEOUT, "Request timed out", None))
        }
    }
}

/// Percent-decode one path segment. Invalid escapes are kept literally.
fn decode_segment(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

async fn health_check(state: AppState) -> Result<impl Reply, Rejection> {
    Ok(reply::json(&HealthResponse {
        status: "healthy",
        service: "crimestats",
        dataset_present: state.engine.config().dataset_path.is_file(),
    }))
}

async fn districts(state: AppState) -> Result<Response, Rejection> {
    let column = state.engine.columns().district.clone();
    respond(
        state.timeout,
        state
            .engine
            .list_distinct_values(&column, &Filters::default()),
    )
    .await
}

async fn units(district: String, state: AppState) -> Result<Response, Rejection> {
    let column = state.engine.columns().unit.clone();
    let filters = Filters::default().district(decode_segment(&district));
    respond(
        state.timeout,
        state.engine.list_distinct_values(&column, &filters),
    )
    .await
}

async fn beats(unit: String, state: AppState) -> Result<Response, Rejection> {
    let column = state.engine.columns().beat.clone();
    let filters = Filters::default().unit(decode_segment(&unit));
    respond(
        state.timeout,
        state.engine.list_distinct_values(&column, &filters),
    )
    .await
}

async fn data_by_beat(beat: String, state: AppState) -> Result<Response, Rejection> {
    let filters = Filters::default().beat(decode_segment(&beat));
    respond(state.timeout, state.engine.matching_rows(&filters)).await
}

async fn series(
    granularity: Granularity,
    district: String,
    unit: String,
    state: AppState,
) -> Result<Response, Rejection> {
    let filters = Filters::default()
        .district(decode_segment(&district))
        .unit(decode_segment(&unit));
    respond(
        state.timeout,
        state.engine.bucketed_counts(granularity, &filters),
    )
    .await
}

async fn heatmap_page(query: PageQuery, state: AppState) -> Result<Response, Rejection> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PAGE_SIZE);
    respond(
        state.timeout,
        state.engine.page_rows(page, per_page, &Filters::default()),
    )
    .await
}

async fn details(filters: Filters, state: AppState) -> Result<Response, Rejection> {
    respond(state.timeout, state.engine.detail_summary(&filters)).await
}

async fn data_frequency(filters: Filters, state: AppState) -> Result<Response, Rejection> {
    respond(state.timeout, state.engine.full_frequency(&filters)).await
}

async fn top(req: TopRequest, state: AppState) -> Result<Response, Rejection> {
    let n = req.n.unwrap_or(DEFAULT_TOP_N);
    respond(
        state.timeout,
        state.engine.rank_top_n(&req.column, n, &req.filters),
    )
    .await
}

async fn narrative(filters: Filters, state: AppState) -> Result<Response, Rejection> {
    let engine = state.engine.clone();
    respond(state.timeout, async move {
        let table = engine.full_frequency(&filters).await?;
        let text = report::narrative(
            &table,
            engine.columns(),
            filters.district.as_deref().unwrap_or(""),
            filters.unit.as_deref(),
        );
        Ok::<_, EngineError>(NarrativeResponse { text })
    })
    .await
}

async fn add_entry(entry: Entry, state: AppState) -> Result<Response, Rejection> {
    let log = Arc::clone(&state.entries);
    let written = tokio::task::spawn_blocking(move || log.append(&entry)).await;
    match written {
        Ok(Ok(())) => {
            info!(path = %state.entries.path().display(), "saved entry");
            Ok(reply::with_status("Entry saved to CSV", StatusCode::CREATED).into_response())
        }
        Ok(Err(e)) => {
            error!("entry append failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error saving entry",
                Some(e.to_string()),
            ))
        }
        Err(e) => {
            error!("entry writer task failed: {}", e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error saving entry",
                None,
            ))
        }
    }
}

/// Unmatched paths and malformed requests get the same JSON error body as
/// engine failures instead of warp's plain-text rejection.
async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "Not found", None));
    }
    if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        warn!("rejected body: {}", e);
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "Invalid request body",
            Some(e.to_string()),
        ));
    }
    if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "Invalid query string",
            Some(e.to_string()),
        ));
    }
    if err.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(error_reply(
            StatusCode::LENGTH_REQUIRED,
            "Content-Length required",
            None,
        ));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
            None,
        ));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            None,
        ));
    }
    error!("unhandled rejection: {:?}", err);
    Ok(error_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Unhandled rejection",
        Some(format!("{:?}", err)),
    ))
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn series_route(
    name: &'static str,
    granularity: Granularity,
    state: AppState,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("api")
        .and(warp::path(name))
        .and(warp::path::param::<String>())
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .and_then(move |district: String, unit: String, state: AppState| {
            series(granularity, district, unit, state)
        })
}

/// Every API route. Listing endpoints are GET, query bodies are POSTed JSON.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health_check);
    let heatmap = warp::path!("data")
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and(with_state(state.clone()))
        .and_then(heatmap_page);

    let districts = warp::path!("api" / "districts")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(districts);
    let units = warp::path!("api" / "units" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(units);
    let beats = warp::path!("api" / "beats" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(beats);
    let data_by_beat = warp::path!("api" / "data-by-beat" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(data_by_beat);

    let by_time = series_route("crime-by-time", Granularity::Hour, state.clone());
    let by_month = series_route("crime-by-month", Granularity::Month, state.clone());
    let by_week = series_route("crime-by-week", Granularity::Week, state.clone());
    let by_year = series_route("crime-by-year", Granularity::Year, state.clone());
    let by_season = series_route("crime-by-season", Granularity::Season, state.clone());

    let details = warp::path!("api" / "details")
        .and(warp::post())
        .and(json_body::<Filters>())
        .and(with_state(state.clone()))
        .and_then(details);
    let data_frequency = warp::path!("api" / "data-frequency")
        .and(warp::post())
        .and(json_body::<Filters>())
        .and(with_state(state.clone()))
        .and_then(data_frequency);
    let top = warp::path!("api" / "top")
        .and(warp::post())
        .and(json_body::<TopRequest>())
        .and(with_state(state.clone()))
        .and_then(top);
    let narrative = warp::path!("api" / "narrative")
        .and(warp::post())
        .and(json_body::<Filters>())
        .and(with_state(state.clone()))
        .and_then(narrative);
    let entries = warp::path!("api" / "entries")
        .and(warp::post())
        .and(json_body::<Entry>())
        .and(with_state(state))
        .and_then(add_entry);

    health
        .or(heatmap)
        .or(districts)
        .or(units)
        .or(beats)
        .or(data_by_beat)
        .or(by_time)
        .or(by_month)
        .or(by_week)
        .or(by_year)
        .or(by_season)
        .or(details)
        .or(data_frequency)
        .or(top)
        .or(narrative)
        .or(entries)
        .recover(handle_rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const DATASET: &str = "\
district_name,unitname,beat_name,Offence_From_Time_only,Offence_From_Date_only,Crime_Type,latitude,longitude
Bengaluru City,U1,B1,10:15:00,2021-03-04,Theft,12.9,77.5
Bengaluru City,U1,B2,10:45:00,2021-03-20,Theft,12.9,77.6
Mysuru,U2,B3,11:00:00,2022-07-01,Assault,,
Mysuru,U2,B4,12:00:00,2022-07-02,Theft,0,0
";

    fn state() -> (TempDir, AppState) {
        let tmp = tempdir().unwrap();
        let data = tmp.path().join("data.csv");
        fs::write(&data, DATASET).unwrap();
        let cfg = Config {
            dataset_path: data,
            entries_path: tmp.path().join("entries.csv"),
            ..Config::default()
        };
        (tmp, AppState::new(cfg))
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("Bengaluru%20City"), "Bengaluru City");
        assert_eq!(decode_segment("100%"), "100%");
        assert_eq!(decode_segment("a%zzb"), "a%zzb");
        assert_eq!(decode_segment("plain"), "plain");
    }

    #[tokio::test]
    async fn test_health_reports_dataset() {
        let (tmp, state) = state();
        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(state))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["dataset_present"], true);

        let missing = AppState::new(Config {
            dataset_path: tmp.path().join("absent.csv"),
            ..Config::default()
        });
        let res = warp::test::request()
            .path("/health")
            .reply(&routes(missing))
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["dataset_present"], false);
    }

    #[tokio::test]
    async fn test_heatmap_pages() {
        let (_tmp, state) = state();
        let api = routes(state);

        let res = warp::test::request()
            .path("/data?page=1&per_page=1")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["beat_name"], "B1");

        // the origin row is dropped, so three rows make two pages of two
        let res = warp::test::request()
            .path("/data?page=2&per_page=2")
            .reply(&api)
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["beat_name"], "B3");

        let res = warp::test::request().path("/data?page=9").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, serde_json::json!([]));

        let res = warp::test::request().path("/data").reply(&api).await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 3);

        let res = warp::test::request()
            .path("/data?page=first")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Invalid query string");
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let (_tmp, state) = state();
        let api = routes(state);
        let res = warp::test::request()
            .method("POST")
            .path("/api/details")
            .json(&serde_json::json!({"startMonth": [3], "endMonth": 5}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Invalid request body");
        assert!(body["details"].is_string());

        let res = warp::test::request()
            .method("POST")
            .path("/api/details")
            .json(&serde_json::json!({"startMonth": 3.0, "endMonth": 3}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request().path("/api/nowhere").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_listing_routes() {
        let (_tmp, state) = state();
        let api = routes(state);

        let res = warp::test::request()
            .method("GET")
            .path("/api/districts")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Vec<String> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, vec!["Bengaluru City", "Mysuru"]);

        let res = warp::test::request()
            .method("GET")
            .path("/api/units/Bengaluru%20City")
            .reply(&api)
            .await;
        let body: Vec<String> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, vec!["U1"]);
    }

    #[tokio::test]
    async fn test_crime_by_time_route() {
        let (_tmp, state) = state();
        let api = routes(state);

        let res = warp::test::request()
            .method("GET")
            .path("/api/crime-by-time/Bengaluru%20City/U1")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 24);
        assert_eq!(
            body[10],
            serde_json::json!({"hour": "10:00", "count": 2, "topCrimes": "Theft (2)"})
        );
    }

    #[tokio::test]
    async fn test_details_and_bad_month() {
        let (_tmp, state) = state();
        let api = routes(state);

        let res = warp::test::request()
            .method("POST")
            .path("/api/details")
            .json(&serde_json::json!({"district": "Bengaluru City", "startMonth": 3, "endMonth": 3}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["allLatLong"].as_array().unwrap().len(), 2);
        assert_eq!(body["topCrimes"][0], serde_json::json!({"value": "Theft", "freq": 2}));

        let res = warp::test::request()
            .method("POST")
            .path("/api/details")
            .json(&serde_json::json!({"startMonth": "March", "endMonth": 5}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_500() {
        let tmp = tempdir().unwrap();
        let api = routes(AppState::new(Config {
            dataset_path: tmp.path().join("absent.csv"),
            ..Config::default()
        }));
        let res = warp::test::request()
            .method("POST")
            .path("/api/data-frequency")
            .json(&serde_json::json!({}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_add_entry_route() {
        let (tmp, state) = state();
        let api = routes(state);
        let res = warp::test::request()
            .method("POST")
            .path("/api/entries")
            .json(&serde_json::json!({"crime": "Theft", "latitude": "12.9"}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let text = fs::read_to_string(tmp.path().join("entries.csv")).unwrap();
        assert_eq!(text, "crime,latitude\nTheft,12.9\n");
    }
}
