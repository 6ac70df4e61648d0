use ascii::AsciiString;
use duration_str::deserialize_option_duration;
use std::time::Duration;
use url::Url;

/// Configuration for CORS (Cross-Origin Resource Sharing)
#[derive(Clone, Default, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins from which we allow requests
    pub allow_origins: Option<AnyOrUrlArray>,
    /// Maximum time between OPTIONS and the next request
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub max_age: Option<Duration>,
    /// HTTP methods allowed to the endpoint.
    pub allow_methods: Option<AnyOrHttpMethodArray>,
    /// Headers allowed in incoming requests
    pub allow_headers: Option<AnyOrAsciiStringArray>,
    /// If set, allows browsers from private network to connect
    pub allow_private_network: bool,
}

/// The HTTP methods a translation client can use against the server.
#[derive(Debug, PartialEq, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Used by the health endpoint.
    Get,
    /// Used by the translation endpoint.
    Post,
    /// Used by browsers for preflight requests.
    Options,
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(format!("Unsupported HTTP method: {s}")),
        }
    }
}

impl From<HttpMethod> for http::Method {
    fn from(value: HttpMethod) -> Self {
        match value {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// A type alias for `AnyOrArray` specifically for `Url` types.
pub type AnyOrUrlArray = AnyOrArray<Url>;

/// A type alias for `AnyOrArray` specifically for `HttpMethod` types.
pub type AnyOrHttpMethodArray = AnyOrArray<HttpMethod>;

/// A type alias for `AnyOrArray` specifically for `AsciiString` types.
pub type AnyOrAsciiStringArray = AnyOrArray<AsciiString>;

/// Either "any value" (written as the string `*`) or an explicit list of values.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyOrArray<T> {
    /// Indicates that any value is allowed (e.g., `*`).
    Any,
    /// A specific, explicit list of allowed values.
    Explicit(Vec<T>),
}

impl<T> Default for AnyOrArray<T> {
    fn default() -> Self {
        Self::Explicit(Vec::new())
    }
}

impl<'de, T> serde::Deserialize<'de> for AnyOrArray<T>
where
    T: serde::Deserialize<'de> + std::str::FromStr<Err: std::fmt::Display>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct AnyOrArrayVisitor<T> {
            _marker: std::marker::PhantomData<T>,
        }

        impl<'de, T> serde::de::Visitor<'de> for AnyOrArrayVisitor<T>
        where
            T: serde::Deserialize<'de> + std::str::FromStr<Err: std::fmt::Display>,
        {
            type Value = AnyOrArray<T>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("expecting string \"*\", or an array of values")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value == "*" {
                    Ok(AnyOrArray::Any)
                } else {
                    value
                        .parse::<T>()
                        .map_err(|err| E::custom(err))
                        .map(|value| AnyOrArray::Explicit(vec![value]))
                }
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut array = Vec::new();
                while let Some(value) = seq.next_element()? {
                    array.push(value);
                }
                Ok(AnyOrArray::Explicit(array))
            }
        }

        deserializer.deserialize_any(AnyOrArrayVisitor {
            _marker: std::marker::PhantomData,
        })
    }
}
