use lambda_http::{
    Body, Request, Response,
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
        },
    },
};
use log::{error, info, warn};
use serde_json::{Value, json};
use stack_string::format_sstr;
use std::collections::HashMap;
use url::form_urlencoded;

use htsget_elsa_lib::{
    PresignObject, ResolversFromElsa,
    config::Config,
    resolver::{Class, Query, Resolution, Resolver, Storage, resolve_query},
};

use crate::{
    errors::ServiceError,
    routes::{Endpoint, Route, parse_query},
};

const ALLOWED_METHODS: &str = "GET, OPTIONS";

/// Handle a single API gateway request. Errors are rendered as htsget error
/// bodies, so this never fails.
pub async fn handle_request<E, P>(
    config: &Config,
    elsa: &E,
    presign: &P,
    event: &Request,
) -> Response<Body>
where
    E: ResolversFromElsa + Sync,
    P: PresignObject + Sync,
{
    info!("{} {}", event.method(), event.uri());

    let mut response = if event.method() == Method::OPTIONS {
        let mut response = Response::new(Body::Empty);
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
        response
    } else {
        match route_request(config, elsa, presign, event).await {
            Ok(body) => json_response(&body),
            Err(e) => {
                if e.status_code().is_server_error() {
                    error!("{} failed: {e}", event.uri());
                } else {
                    info!("{} rejected: {e}", event.uri());
                }
                e.into_response()
            }
        }
    };
    add_cors_headers(config, response.headers_mut());
    response
}

async fn route_request<E, P>(
    config: &Config,
    elsa: &E,
    presign: &P,
    event: &Request,
) -> Result<Value, ServiceError>
where
    E: ResolversFromElsa + Sync,
    P: PresignObject + Sync,
{
    if event.method() != Method::GET {
        return Err(ServiceError::MethodNotAllowed(format_sstr!(
            "method {} is not supported",
            event.method()
        )));
    }
    match Route::parse(event.uri().path())? {
        Route::ServiceInfo(endpoint) => Ok(service_info(config, endpoint)),
        Route::Ticket { endpoint, id } => {
            let params: HashMap<String, String> = event
                .uri()
                .query()
                .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
                .unwrap_or_default();
            let query = parse_query(endpoint, &id, |k| params.get(k).map(String::as_str))?;
            let resolvers = get_resolvers(config, elsa, &id).await;
            ticket(presign, &resolvers, &query).await
        }
    }
}

/// Resolvers for the release named by the first segment of `id`, followed by
/// the statically configured ones. Falls back to the configured resolvers
/// alone when the Elsa lookup fails.
pub async fn get_resolvers<E>(config: &Config, elsa: &E, id: &str) -> Vec<Resolver>
where
    E: ResolversFromElsa + Sync,
{
    let release_key = id.split('/').next().unwrap_or(id);
    match elsa.try_get(release_key).await {
        Ok(mut resolvers) => {
            resolvers.extend(config.resolvers.iter().cloned());
            resolvers
        }
        Err(e) => {
            warn!(
                "failed to get resolvers from elsa for {release_key}, using configured resolvers only: {e}"
            );
            config.resolvers.clone()
        }
    }
}

async fn ticket<P>(presign: &P, resolvers: &[Resolver], query: &Query) -> Result<Value, ServiceError>
where
    P: PresignObject + Sync,
{
    let resolved = match resolve_query(resolvers, query) {
        Resolution::Resolved(resolved) => resolved,
        Resolution::Denied => {
            return Err(ServiceError::PermissionDenied(format_sstr!(
                "access to {} is not allowed for this query",
                query.id()
            )));
        }
        Resolution::NotFound => {
            return Err(ServiceError::NotFound(format_sstr!(
                "no resolver matches {}",
                query.id()
            )));
        }
    };
    let Storage::S3 { bucket } = &resolved.storage;
    let url = presign
        .presign_object(bucket, &resolved.object_key())
        .await?;

    let mut ticket_url = json!({"url": url.as_str()});
    if query.class() == Class::Header {
        ticket_url["class"] = json!("header");
    }
    Ok(json!({
        "htsget": {
            "format": query.format().to_string(),
            "urls": [ticket_url],
        }
    }))
}

fn service_info(config: &Config, endpoint: Endpoint) -> Value {
    let datatype = endpoint.datatype();
    let formats: Vec<String> = endpoint
        .formats()
        .iter()
        .map(ToString::to_string)
        .collect();
    json!({
        "id": format_sstr!("{}.{datatype}", config.service_id).as_str(),
        "name": config.service_name.as_str(),
        "type": {
            "group": "org.ga4gh",
            "artifact": "htsget",
            "version": "1.3.0",
        },
        "version": env!("CARGO_PKG_VERSION"),
        "htsget": {
            "datatype": datatype,
            "formats": formats,
            "fieldsParametersEffective": false,
            "tagsParametersEffective": false,
        },
    })
}

fn json_response(body: &Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn add_cors_headers(config: &Config, headers: &mut HeaderMap) {
    match HeaderValue::from_str(&config.cors_allow_origin) {
        Ok(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        Err(e) => warn!("invalid CORS_ALLOW_ORIGIN {}: {e}", config.cors_allow_origin),
    }
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(config.cors_max_age));
}
