//! Public configuration views handed to the diagnostic viewer.
//!
//! Only options marked public are exposed; nothing here carries secrets.

use serde::Serialize;

use crate::config::Config;
use crate::routes::{Route, RouteRegistry};

/// Config the viewer receives once it is running.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_id: String,
    pub base_url: String,
    pub dump_path: String,
    pub permanent: bool,
    pub routes: Vec<Route>,
    pub dump_header: String,
    pub halt_header: String,
    pub store_prefix: String,
    pub hosting_api: HostingApi,
}

impl ClientConfig {
    pub fn new(config: &Config, routes: &RouteRegistry) -> Self {
        Self {
            api_id: config.api_id.clone(),
            base_url: config.base_url.clone(),
            dump_path: config.dump_path.clone(),
            permanent: config.permanent,
            routes: routes.routes().to_vec(),
            dump_header: config.dump_header.clone(),
            halt_header: config.halt_header.clone(),
            store_prefix: config.store_prefix.clone(),
            hosting_api: HostingApi::current(),
        }
    }
}

/// Minimal config the viewer needs before login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootConfig {
    pub api_id: String,
    pub permanent: bool,
    pub jwt_cookie_key: String,
    pub store_prefix: String,
}

impl BootConfig {
    pub fn new(config: &Config) -> Self {
        Self {
            api_id: config.api_id.clone(),
            permanent: config.permanent,
            jwt_cookie_key: jwt_cookie_key(config),
            store_prefix: config.store_prefix.clone(),
        }
    }
}

/// Cookie the viewer stores its session under.
pub fn jwt_cookie_key(config: &Config) -> String {
    format!("{}{}.jwt", config.store_prefix, config.api_id)
}

/// Describes the process hosting the traced API.
#[derive(Debug, Clone, Serialize)]
pub struct HostingApi {
    pub language: NameVersion,
    pub apixt: Package,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize)]
pub struct NameVersion {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Platform {
    pub name: String,
    pub family: String,
    pub arch: String,
}

impl HostingApi {
    pub fn current() -> Self {
        Self {
            language: NameVersion {
                name: "rust".to_string(),
                version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            },
            apixt: Package {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                link: env!("CARGO_PKG_REPOSITORY").to_string(),
            },
            platform: Platform {
                name: std::env::consts::OS.to_string(),
                family: std::env::consts::FAMILY.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            },
        }
    }
}
