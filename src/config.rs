use crate::qr::codec::QrConfig;
use crate::qr::geofence;
use crate::service::attendance_flow::GeofencePolicy;
use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // QR token signing
    pub qr_hmac_secret: String,
    pub qr_token_ttl: i64, // seconds

    // Geofencing (optional)
    pub library_lat: Option<f64>,
    pub library_lon: Option<f64>,
    pub geofence_radius_m: f64,
    pub auto_verify_without_geofence: bool,

    // Rate limiting
    pub rate_redeem_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),

            qr_hmac_secret: env::var("QR_HMAC_SECRET").expect("QR_HMAC_SECRET must be set"),
            qr_token_ttl: env::var("QR_TOKEN_TTL")
                .unwrap_or_else(|_| "30".to_string()) // short enough to be single-use-by-time
                .parse()
                .unwrap(),

            library_lat: env::var("LIBRARY_LAT").ok().and_then(|v| v.parse().ok()),
            library_lon: env::var("LIBRARY_LON").ok().and_then(|v| v.parse().ok()),
            geofence_radius_m: env::var("GEOFENCE_RADIUS_M")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap(),
            auto_verify_without_geofence: env::var("AUTO_VERIFY_WITHOUT_GEOFENCE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap(),

            rate_redeem_per_min: env::var("RATE_REDEEM_PER_MIN")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap(),
            rate_protected_per_min: env::var("RATE_PROTECTED_PER_MIN")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap(),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
        }
    }

    pub fn qr_config(&self) -> QrConfig {
        QrConfig {
            hmac_secret: self.qr_hmac_secret.clone(),
            default_ttl_secs: self.qr_token_ttl,
        }
    }

    pub fn geofence_policy(&self) -> GeofencePolicy {
        GeofencePolicy {
            reference: match (self.library_lat, self.library_lon) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            },
            radius_m: if self.geofence_radius_m > 0.0 {
                self.geofence_radius_m
            } else {
                geofence::DEFAULT_RADIUS_M
            },
            auto_verify_without_geofence: self.auto_verify_without_geofence,
        }
    }
}
