//! api.openweathermap.org One Call: one response feeding four tables.
//!
//! The current-conditions table reads fixed array indices
//! (`root.current.weather[0].*`); the minutely and hourly tables explode
//! wildcard arrays, all keyed by location plus observation time.

use sluice_error::ConfigError;

use crate::model::{DataModel, FieldDef, FieldType};
use crate::settings::Settings;
use crate::source::{ApiConfig, ApiEndpointConfig, TableConfig, TransportKind};

pub fn config(settings: &Settings) -> Result<ApiConfig, ConfigError> {
    let current = DataModel::new(
        "OpenWeatherCurrent",
        vec![
            FieldDef::new("latitude", FieldType::Double, "root.lat").primary_key(),
            FieldDef::new("longitude", FieldType::Double, "root.lon").primary_key(),
            FieldDef::new("current_dt", FieldType::BigInt, "root.current.dt").primary_key(),
            FieldDef::new("timezone", FieldType::Text, "root.timezone").nullable(),
            FieldDef::new("timezone_offset", FieldType::BigInt, "root.timezone_offset").nullable(),
            FieldDef::new("current_sunrise", FieldType::BigInt, "root.current.sunrise").nullable(),
            FieldDef::new("current_sunset", FieldType::BigInt, "root.current.sunset").nullable(),
            FieldDef::new("current_temp", FieldType::Double, "root.current.temp").nullable(),
            FieldDef::new("current_feels_like", FieldType::Double, "root.current.feels_like")
                .nullable(),
            FieldDef::new("current_pressure", FieldType::BigInt, "root.current.pressure")
                .nullable(),
            FieldDef::new("current_humidity", FieldType::BigInt, "root.current.humidity")
                .nullable(),
            FieldDef::new("current_uvi", FieldType::Double, "root.current.uvi").nullable(),
            FieldDef::new("current_clouds", FieldType::BigInt, "root.current.clouds").nullable(),
            FieldDef::new("current_wind_speed", FieldType::Double, "root.current.wind_speed")
                .nullable(),
            FieldDef::new("current_wind_deg", FieldType::BigInt, "root.current.wind_deg")
                .nullable(),
            FieldDef::new("current_weather_main", FieldType::Text, "root.current.weather[0].main")
                .nullable(),
            FieldDef::new(
                "current_weather_description",
                FieldType::Text,
                "root.current.weather[0].description",
            )
            .nullable(),
        ],
    )?;

    let minutely = DataModel::new(
        "OpenWeatherMinute",
        vec![
            FieldDef::new("latitude", FieldType::Double, "root.lat").primary_key(),
            FieldDef::new("longitude", FieldType::Double, "root.lon").primary_key(),
            FieldDef::new("minute_dt", FieldType::BigInt, "root.minutely[*].dt").primary_key(),
            FieldDef::new("precipitation", FieldType::Double, "root.minutely[*].precipitation")
                .nullable(),
        ],
    )?;

    let hourly = DataModel::new(
        "OpenWeatherHourly",
        vec![
            FieldDef::new("latitude", FieldType::Double, "root.lat").primary_key(),
            FieldDef::new("longitude", FieldType::Double, "root.lon").primary_key(),
            FieldDef::new("hour_dt", FieldType::BigInt, "root.hourly[*].dt").primary_key(),
            FieldDef::new("temp", FieldType::Double, "root.hourly[*].temp").nullable(),
            FieldDef::new("feels_like", FieldType::Double, "root.hourly[*].feels_like").nullable(),
            FieldDef::new("pressure", FieldType::BigInt, "root.hourly[*].pressure").nullable(),
            FieldDef::new("humidity", FieldType::BigInt, "root.hourly[*].humidity").nullable(),
            FieldDef::new("wind_speed", FieldType::Double, "root.hourly[*].wind_speed").nullable(),
            FieldDef::new("pop", FieldType::Double, "root.hourly[*].pop").nullable(),
        ],
    )?;

    let daily = DataModel::new(
        "OpenWeatherDaily",
        vec![
            FieldDef::new("latitude", FieldType::Double, "root.lat").primary_key(),
            FieldDef::new("longitude", FieldType::Double, "root.lon").primary_key(),
            FieldDef::new("day_dt", FieldType::BigInt, "root.daily[*].dt").primary_key(),
            FieldDef::new("summary", FieldType::Text, "root.daily[*].summary").nullable(),
            FieldDef::new("temp_min", FieldType::Double, "root.daily[*].temp.min").nullable(),
            FieldDef::new("temp_max", FieldType::Double, "root.daily[*].temp.max").nullable(),
            FieldDef::new("sunrise", FieldType::BigInt, "root.daily[*].sunrise").nullable(),
            FieldDef::new("sunset", FieldType::BigInt, "root.daily[*].sunset").nullable(),
            FieldDef::new("pop", FieldType::Double, "root.daily[*].pop").nullable(),
        ],
    )?;

    let appid = settings.openweather_api_key.clone().unwrap_or_default();

    Ok(
        ApiConfig::new("openweather", "https://api.openweathermap.org/data/3.0", TransportKind::Rest)
            .param("lat", "37.774929")
            .param("lon", "-122.419416")
            .param("units", "imperial")
            .param("appid", &appid)
            .endpoint(
                "onecall",
                ApiEndpointConfig::new()
                    .table(TableConfig::new(current))
                    .table(TableConfig::new(minutely))
                    .table(TableConfig::new(hourly))
                    .table(TableConfig::new(daily)),
            ),
    )
}
