//! Best-effort IP geolocation for visitor analytics.
//!
//! Wraps the free ip-api.com JSON endpoint. Every failure mode (timeout,
//! non-success status, unparseable body, local address) resolves to `None`;
//! analytics never block or fail a request over geolocation.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    city: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Addresses that can't meaningfully be geolocated.
pub(crate) fn should_lookup(ip: &str) -> bool {
    !ip.is_empty() && ip != "127.0.0.1" && ip != "::1"
}

#[derive(Clone)]
pub struct GeoClient {
    http: reqwest::Client,
    base_url: String,
}

impl GeoClient {
    pub fn new() -> Self {
        Self::with_base_url("http://ip-api.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, base_url }
    }

    /// Look up an IP, returning `None` on any failure.
    pub async fn lookup(&self, ip: &str) -> Option<GeoLocation> {
        if !should_lookup(ip) {
            return None;
        }

        let url = format!(
            "{}/json/{}?fields=status,city,regionName,country,lat,lon",
            self.base_url, ip
        );

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "Geo lookup request failed");
                return None;
            }
        };

        let body: IpApiResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "Geo lookup response unparseable");
                return None;
            }
        };

        if body.status.as_deref() != Some("success") {
            return None;
        }

        Some(GeoLocation {
            lat: body.lat?,
            lng: body.lon?,
            city: body.city,
            state: body.region_name,
            country: body.country,
        })
    }
}

impl Default for GeoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_addresses_skipped() {
        assert!(!should_lookup("127.0.0.1"));
        assert!(!should_lookup("::1"));
        assert!(!should_lookup(""));
        assert!(should_lookup("8.8.8.8"));
    }

    #[tokio::test]
    async fn successful_lookup() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/json/8.8.8.8")
            .match_query(mockito::Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","city":"Mountain View","regionName":"California",
                   "country":"United States","lat":37.386,"lon":-122.0838}"#,
            )
            .create_async()
            .await;

        let client = GeoClient::with_base_url(server.url());
        let location = client.lookup("8.8.8.8").await.unwrap();

        assert_eq!(location.city.as_deref(), Some("Mountain View"));
        assert_eq!(location.state.as_deref(), Some("California"));
        assert!((location.lat - 37.386).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failure_status_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/json/10.0.0.1")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"status":"fail","message":"private range"}"#)
            .create_async()
            .await;

        let client = GeoClient::with_base_url(server.url());
        assert!(client.lookup("10.0.0.1").await.is_none());
    }

    #[tokio::test]
    async fn server_error_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/json/8.8.4.4")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = GeoClient::with_base_url(server.url());
        assert!(client.lookup("8.8.4.4").await.is_none());
    }

    #[tokio::test]
    async fn localhost_never_queried() {
        // No mock server at all: a lookup attempt would error, a skip returns
        // None without any request.
        let client = GeoClient::with_base_url("http://127.0.0.1:1".to_string());
        assert!(client.lookup("127.0.0.1").await.is_none());
    }
}
