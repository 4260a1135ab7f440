use axum::http::{HeaderValue, Method, header};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// 根据配置构建 CORS 中间件
///
/// 配置无效（启用但来源列表为空）时跳过启用，并记录 warn 日志。
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let (any_origin, origins) = parse_origins(&cors.allowed_origins);
    if !any_origin && origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }

    let mut layer = CorsLayer::new();

    if any_origin {
        layer = layer.allow_origin(Any);
    } else {
        layer = layer.allow_origin(origins);
    }

    let methods = parse_methods(&cors.allowed_methods);
    if !methods.is_empty() {
        layer = layer.allow_methods(methods);
    }

    let headers = parse_headers(&cors.allowed_headers);
    if !headers.is_empty() {
        layer = layer.allow_headers(headers);
    }

    if let Some(secs) = cors.max_age_secs
        && secs > 0
    {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}

fn parse_origins(values: &[String]) -> (bool, Vec<HeaderValue>) {
    let mut any = false;
    let mut origins = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value == "*" {
            any = true;
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => origins.push(v),
            Err(_) => tracing::warn!("CORS allowed_origins 含无效值: {}", value),
        }
    }
    (any, origins)
}

fn parse_methods(values: &[String]) -> Vec<Method> {
    values
        .iter()
        .filter_map(|raw| {
            let value = raw.trim();
            if value.is_empty() {
                return None;
            }
            match Method::from_bytes(value.to_ascii_uppercase().as_bytes()) {
                Ok(m) => Some(m),
                Err(_) => {
                    tracing::warn!("CORS allowed_methods 含无效值: {}", value);
                    None
                }
            }
        })
        .collect()
}

fn parse_headers(values: &[String]) -> Vec<header::HeaderName> {
    values
        .iter()
        .filter_map(|raw| {
            let value = raw.trim();
            if value.is_empty() {
                return None;
            }
            match header::HeaderName::from_bytes(value.to_ascii_lowercase().as_bytes()) {
                Ok(h) => Some(h),
                Err(_) => {
                    tracing::warn!("CORS allowed_headers 含无效值: {}", value);
                    None
                }
            }
        })
        .collect()
}
