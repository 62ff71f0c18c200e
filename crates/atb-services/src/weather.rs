//! OpenWeatherMap current-weather adapter (metric units).

use std::time::Duration;

use serde::Deserialize;

use atb_core::{errors::Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Clone, Debug, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub country: String,
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: f64,
    pub description: String,
    pub wind_speed: f64,
    pub cloudiness: f64,
}

#[derive(Deserialize)]
struct OwmResponse {
    name: String,
    #[serde(default)]
    sys: OwmSys,
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmCondition>,
    #[serde(default)]
    wind: OwmWind,
    #[serde(default)]
    clouds: OwmClouds,
}

#[derive(Default, Deserialize)]
struct OwmSys {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: f64,
}

#[derive(Deserialize)]
struct OwmCondition {
    description: String,
}

#[derive(Default, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Default, Deserialize)]
struct OwmClouds {
    #[serde(default)]
    all: f64,
}

/// Parse an OpenWeatherMap `weather` response body.
pub fn parse_report(body: &str) -> Result<WeatherReport> {
    let r: OwmResponse = serde_json::from_str(body)
        .map_err(|e| Error::External(format!("weather json error: {e}")))?;

    Ok(WeatherReport {
        city: r.name,
        country: r.sys.country.unwrap_or_default(),
        temp: r.main.temp,
        feels_like: r.main.feels_like,
        temp_min: r.main.temp_min,
        temp_max: r.main.temp_max,
        humidity: r.main.humidity,
        description: r
            .weather
            .first()
            .map(|w| title_case(&w.description))
            .unwrap_or_else(|| "Unknown".to_string()),
        wind_speed: r.wind.speed,
        cloudiness: r.clouds.all,
    })
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Debug)]
pub struct WeatherClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl WeatherClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: crate::http_client(Duration::from_secs(10))?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn current(&self, city: &str) -> Result<WeatherReport> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await
            .map_err(|e| Error::External(format!("weather request error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("City '{city}' not found")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, "weather api error: {}", crate::snippet(&body, 200));
            return Err(Error::External("Failed to fetch weather data".to_string()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("weather read error: {e}")))?;
        parse_report(&body)
    }
}
