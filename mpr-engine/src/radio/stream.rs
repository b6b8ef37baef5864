//! HTTP connection to an internet radio station

use crate::config::RadioConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info};

/// Open connection: captured response headers plus the body reader
pub struct RadioConnection {
    pub headers: HashMap<String, String>,
    pub reader: Box<dyn Read + Send>,
}

/// GET `url` asking for in-band ICY metadata
pub fn connect(url: &str, config: &RadioConfig) -> Result<RadioConnection> {
    info!("Connecting to radio stream {}", url);
    let client = reqwest::blocking::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout())
        .timeout(config.read_timeout())
        .build()?;

    let response = client.get(url).header("Icy-MetaData", "1").send()?;
    if !response.status().is_success() {
        return Err(Error::RadioStream(format!("HTTP {} from {}", response.status(), url)));
    }

    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    debug!("Radio response headers: {:?}", headers);

    Ok(RadioConnection {
        headers,
        reader: Box::new(response),
    })
}
