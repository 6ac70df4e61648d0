use config::{AnyOrAsciiStringArray, AnyOrHttpMethodArray, AnyOrUrlArray, CorsConfig};
use http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use url::{Origin, Url};

/// Builds the CORS layer for browser clients of the translation endpoint.
pub(super) fn generate(
    CorsConfig {
        allow_origins,
        max_age,
        allow_methods,
        allow_headers,
        allow_private_network,
    }: &CorsConfig,
) -> CorsLayer {
    let mut cors_layer = CorsLayer::new().allow_private_network(*allow_private_network);

    if let Some(allow_origins) = allow_origins {
        cors_layer = cors_layer.allow_origin(match allow_origins {
            AnyOrUrlArray::Any => AllowOrigin::any(),
            AnyOrUrlArray::Explicit(origins) => {
                let origins = origins.iter().filter_map(|origin| {
                    let origin = origin_header(origin);

                    HeaderValue::from_str(&origin)
                        .inspect_err(|_| log::warn!("Ignoring CORS origin that is not a valid header value: {origin}"))
                        .ok()
                });

                AllowOrigin::list(origins)
            }
        });
    }

    if let Some(max_age) = max_age {
        cors_layer = cors_layer.max_age(*max_age);
    }

    if let Some(allow_methods) = allow_methods {
        cors_layer = cors_layer.allow_methods(match allow_methods {
            AnyOrHttpMethodArray::Any => AllowMethods::any(),
            AnyOrHttpMethodArray::Explicit(methods) => {
                let mut methods: Vec<Method> = methods.iter().map(|method| Method::from(*method)).collect();

                // Preflight requests must always pass.
                if !methods.contains(&Method::OPTIONS) {
                    methods.push(Method::OPTIONS);
                }

                AllowMethods::list(methods)
            }
        });
    }

    if let Some(allow_headers) = allow_headers {
        cors_layer = cors_layer.allow_headers(match allow_headers {
            AnyOrAsciiStringArray::Any => AllowHeaders::any(),
            AnyOrAsciiStringArray::Explicit(headers) => {
                AllowHeaders::list(headers.iter().filter_map(|header| {
                    HeaderName::from_bytes(header.as_bytes())
                        .inspect_err(|_| log::warn!("Ignoring invalid CORS header name: {header}"))
                        .ok()
                }))
            }
        });
    }

    cors_layer
}

/// The `Origin` header value a browser sends for pages and extensions under this URL.
fn origin_header(url: &Url) -> String {
    match url.origin() {
        origin @ Origin::Tuple(..) => origin.ascii_serialization(),
        // Extension schemes have opaque origins, browsers still send scheme and host.
        Origin::Opaque(_) => format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default()),
    }
}
