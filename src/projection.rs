//! Map projections and great-circle geometry.
//!
//! Areas carry their projection as a proj-string; it is rehydrated here into
//! a live [`Projection`] whenever coordinates need transforming. Only the
//! spherical forms of the projections used by radar composites are
//! supported: `longlat`, `merc` and `aeqd`.

use crate::constants::EARTH_RADIUS;
use crate::{Error, Result};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Semi-major axis used when a Mercator definition names no radius
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Projection rehydrated from a proj-string
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Plain geographic coordinates, x = longitude, y = latitude (degrees)
    LongLat,
    /// Spherical Mercator
    Mercator { lon_0: f64, k: f64, radius: f64 },
    /// Spherical azimuthal equidistant, centred on (lon_0, lat_0)
    AzimuthalEquidistant { lon_0: f64, lat_0: f64, radius: f64 },
}

impl Projection {
    /// Parse a proj-string such as `+proj=merc +lat_ts=0 +lon_0=0 +R=6378137`
    pub fn parse(definition: &str) -> Result<Self> {
        let params = parse_parameters(definition);
        let number = |key: &str, default: f64| -> Result<f64> {
            match params.get(key) {
                Some(value) => value.parse::<f64>().map_err(|_| {
                    Error::projection(definition, format!("+{}={} is not a number", key, value))
                }),
                None => Ok(default),
            }
        };

        match params.get("proj").map(String::as_str) {
            Some("longlat") | Some("latlong") | Some("lonlat") | Some("latlon") => {
                Ok(Self::LongLat)
            }
            Some("merc") => {
                let radius = number("R", number("a", MERCATOR_RADIUS)?)?;
                let lat_ts = number("lat_ts", 0.0)?.to_radians();
                let k = if params.contains_key("lat_ts") {
                    lat_ts.cos()
                } else {
                    number("k", number("k_0", 1.0)?)?
                };
                Ok(Self::Mercator {
                    lon_0: number("lon_0", 0.0)?.to_radians(),
                    k,
                    radius,
                })
            }
            Some("aeqd") => Ok(Self::AzimuthalEquidistant {
                lon_0: number("lon_0", 0.0)?.to_radians(),
                lat_0: number("lat_0", 0.0)?.to_radians(),
                radius: number("R", number("a", EARTH_RADIUS)?)?,
            }),
            Some(other) => Err(Error::projection(
                definition,
                format!("unsupported projection '{}'", other),
            )),
            None => Err(Error::projection(definition, "missing +proj")),
        }
    }

    /// Geographic (degrees) to projected coordinates
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match *self {
            Self::LongLat => (lon, lat),
            Self::Mercator { lon_0, k, radius } => {
                let lam = lon.to_radians() - lon_0;
                let phi = lat.to_radians();
                (
                    radius * k * lam,
                    radius * k * (FRAC_PI_4 + phi / 2.0).tan().ln(),
                )
            }
            Self::AzimuthalEquidistant {
                lon_0,
                lat_0,
                radius,
            } => {
                let phi = lat.to_radians();
                let dlam = lon.to_radians() - lon_0;
                let cos_c = lat_0.sin() * phi.sin() + lat_0.cos() * phi.cos() * dlam.cos();
                let c = cos_c.clamp(-1.0, 1.0).acos();
                let kp = if c.abs() < 1e-12 { 1.0 } else { c / c.sin() };
                (
                    radius * kp * phi.cos() * dlam.sin(),
                    radius * kp * (lat_0.cos() * phi.sin() - lat_0.sin() * phi.cos() * dlam.cos()),
                )
            }
        }
    }

    /// Projected coordinates to geographic (degrees)
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::LongLat => (x, y),
            Self::Mercator { lon_0, k, radius } => {
                let lam = x / (radius * k) + lon_0;
                let phi = 2.0 * (y / (radius * k)).exp().atan() - FRAC_PI_2;
                (lam.to_degrees(), phi.to_degrees())
            }
            Self::AzimuthalEquidistant {
                lon_0,
                lat_0,
                radius,
            } => {
                let rho = x.hypot(y);
                if rho < 1e-9 {
                    return (lon_0.to_degrees(), lat_0.to_degrees());
                }
                let c = rho / radius;
                let phi = (c.cos() * lat_0.sin() + y * c.sin() * lat_0.cos() / rho)
                    .clamp(-1.0, 1.0)
                    .asin();
                let lam = lon_0
                    + (x * c.sin()).atan2(rho * lat_0.cos() * c.cos() - y * lat_0.sin() * c.sin());
                (lam.to_degrees(), phi.to_degrees())
            }
        }
    }
}

fn parse_parameters(definition: &str) -> HashMap<String, String> {
    definition
        .split_whitespace()
        .filter_map(|token| {
            let token = token.trim_start_matches('+');
            if token.is_empty() {
                return None;
            }
            match token.split_once('=') {
                Some((key, value)) => Some((key.to_string(), value.to_string())),
                None => Some((token.to_string(), String::new())),
            }
        })
        .collect()
}

/// Point reached travelling `distance` metres from (lon, lat) along `bearing` (radians)
pub fn destination(lon: f64, lat: f64, bearing: f64, distance: f64) -> (f64, f64) {
    let phi1 = lat.to_radians();
    let lam1 = lon.to_radians();
    let delta = distance / EARTH_RADIUS;

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * bearing.cos()).asin();
    let lam2 = lam1
        + (bearing.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
    (lam2.to_degrees(), phi2.to_degrees())
}

/// Great-circle distance (m) and initial bearing (radians, 0..2π) from the first point to the second
pub fn distance_and_bearing(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> (f64, f64) {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = phi2 - phi1;
    let dlam = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlam / 2.0).sin().powi(2);
    let distance = 2.0 * EARTH_RADIUS * a.sqrt().min(1.0).asin();

    let bearing = (dlam.sin() * phi2.cos())
        .atan2(phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlam.cos());
    (distance, bearing.rem_euclid(std::f64::consts::TAU))
}
