use crate::config::AppConfig;
use crate::database::models::GeocodedPlace;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Geocoder quota exceeded (HTTP {status})")]
    Quota { status: u16 },

    #[error("Geocoder answered HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed geocoder response: {0}")]
    Malformed(String),

    #[error("No place found for {latitude}, {longitude}")]
    NotFound { latitude: f64, longitude: f64 },
}

/// External reverse geocoding collaborator.
pub trait ReverseGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<GeocodedPlace, GeocodeError>;
}

/// Nominatim `reverse` endpoint over blocking HTTP, throttled to one request
/// per `min_interval`.
pub struct NominatimGeocoder {
    client: Client,
    url: String,
    email: Option<String>,
    language: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(config: &AppConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(config.geocoder_user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: config.geocoder_url.clone(),
            email: config.geocoder_email.clone(),
            language: config.geocoder_language.clone(),
            min_interval: Duration::from_millis(config.geocoder_min_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    fn query(&self, latitude: f64, longitude: f64) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("format", "jsonv2".to_string()),
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("addressdetails", "1".to_string()),
            ("accept-language", self.language.clone()),
        ];
        if let Some(email) = &self.email {
            query.push(("email", email.clone()));
        }
        query
    }

    fn throttle(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn reverse(&self, latitude: f64, longitude: f64) -> Result<GeocodedPlace, GeocodeError> {
        self.throttle();
        log::debug!("Reverse geocoding {}, {}", latitude, longitude);

        let response = self
            .client
            .get(&self.url)
            .query(&self.query(latitude, longitude))
            .send()?;
        classify_status(response.status())?;

        let body = response.text()?;
        parse_response(&body, latitude, longitude)
    }
}

fn classify_status(status: StatusCode) -> Result<(), GeocodeError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::SERVICE_UNAVAILABLE
    {
        return Err(GeocodeError::Quota {
            status: status.as_u16(),
        });
    }
    Err(GeocodeError::Status {
        status: status.as_u16(),
    })
}

/// Turn a Nominatim body into a place. Non-text address parts are dropped.
pub fn parse_response(body: &str, latitude: f64, longitude: f64) -> Result<GeocodedPlace, GeocodeError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| GeocodeError::Malformed("expected a JSON object".to_string()))?;

    if object.contains_key("error") {
        return Err(GeocodeError::NotFound { latitude, longitude });
    }

    let address: BTreeMap<String, String> = match object.get("address") {
        Some(serde_json::Value::Object(parts)) => parts
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        Some(_) => return Err(GeocodeError::Malformed("address is not an object".to_string())),
        None => BTreeMap::new(),
    };
    let display_name = object
        .get("display_name")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if address.is_empty() && display_name.is_none() {
        return Err(GeocodeError::Malformed("no address in response".to_string()));
    }

    Ok(GeocodedPlace {
        display_name,
        address,
    })
}
