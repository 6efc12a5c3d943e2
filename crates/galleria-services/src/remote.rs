//! Remote image download for URL-sourced uploads.
//!
//! Targets are checked before any request is made: http(s) only, optional host
//! allowlist, and no private or internal addresses (resolved addresses are
//! checked too, so a public name pointing at a private IP is refused).
//! Redirects are not followed.

use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use galleria_core::{AppError, IngestConfig};
use tokio::net::lookup_host;

/// Validate a remote URL and return it parsed.
pub async fn validate_remote_url(
    url: &str,
    allow_private_ips: bool,
    allowlist: Option<&[String]>,
) -> Result<reqwest::Url, AppError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let parsed = reqwest::Url::parse(url)
        .map_err(|e| AppError::Validation(format!("Invalid URL format: {}", e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Validation("URL must have a host".to_string()))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    if let Some(allowed_domains) = allowlist {
        let is_allowed = allowed_domains.iter().any(|allowed| {
            let allowed = allowed.to_lowercase();
            host == allowed || host.ends_with(&format!(".{}", allowed))
        });
        if !is_allowed {
            return Err(AppError::Validation(format!(
                "URL hostname '{}' is not in the allowed list",
                host
            )));
        }
    }

    if allow_private_ips {
        return Ok(parsed);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(AppError::Validation(
                "Private/internal IP addresses are not allowed".to_string(),
            ));
        }
    }

    if host == "localhost"
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
        || host.starts_with("0.")
    {
        return Err(AppError::Validation(
            "Localhost and internal hostnames are not allowed".to_string(),
        ));
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let resolved = lookup_host((host.as_str(), port)).await.map_err(|e| {
        tracing::warn!(host = %host, error = %e, "DNS resolution failed for remote URL");
        AppError::Validation(format!("Hostname could not be resolved: {}", e))
    })?;

    for addr in resolved {
        if is_private_ip(&addr.ip()) {
            return Err(AppError::Validation(format!(
                "Hostname resolves to private/internal IP address: {}",
                addr.ip()
            )));
        }
    }

    Ok(parsed)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
                || octets[0] == 127
                || (octets[0] == 169 && octets[1] == 254)
                || (224..=239).contains(&octets[0])
                || octets[0] == 0
        }
        IpAddr::V6(ipv6) => {
            // IPv4-mapped addresses (::ffff:a.b.c.d) get the v4 rules.
            if let Some(ipv4) = ipv6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(ipv4));
            }
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || is_ipv6_link_local(ipv6)
                || is_ipv6_unique_local(ipv6)
        }
    }
}

fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}

fn is_ipv6_unique_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xfe00 == 0xfc00
}

#[derive(Debug, Clone)]
pub struct RemoteResource {
    pub bytes: Bytes,
    /// `Content-Type` reported by the remote server.
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    allowlist: Option<Vec<String>>,
    allow_private_ips: bool,
    max_bytes: usize,
}

impl RemoteFetcher {
    pub fn from_config(config: &IngestConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.remote_fetch_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            allowlist: config.url_upload_allowlist.clone(),
            allow_private_ips: false,
            max_bytes: config.max_file_size_bytes,
        })
    }

    /// Permit private addresses (local development only).
    pub fn with_private_ips_allowed(mut self, allow: bool) -> Self {
        self.allow_private_ips = allow;
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<RemoteResource, AppError> {
        let target =
            validate_remote_url(url, self.allow_private_ips, self.allowlist.as_deref()).await?;

        let mut response = self.client.get(target).send().await.map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Validation(format!(
                "Remote resource returned HTTP {}",
                status.as_u16()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(self.too_large(length as usize));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(size_bytes = body.len(), "Fetched remote image");
        Ok(RemoteResource {
            bytes: body.freeze(),
            content_type,
        })
    }

    fn too_large(&self, size: usize) -> AppError {
        AppError::Validation(format!(
            "File too large: {} bytes (max: {} bytes)",
            size, self.max_bytes
        ))
    }
}

fn fetch_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Timeout(format!("Remote fetch timed out: {}", err))
    } else {
        AppError::dependency("remote-fetch", err.to_string())
    }
}
