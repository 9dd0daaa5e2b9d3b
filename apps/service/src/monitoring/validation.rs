//! Validation for target URLs, profile emails and timing settings.

use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL is required")]
    EmptyUrl,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme {0:?}, only http and https can be monitored")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("private/local addresses are not allowed: {0}")]
    PrivateHost(String),

    #[error("port 0 is not valid")]
    InvalidPort,

    #[error("email is required")]
    EmptyEmail,

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange { name: &'static str, value: u64, min: u64, max: u64 },
}

/// Validate a URL before registering it as a target.
///
/// Returns the normalised URL string on success.
pub fn validate_target_url(target: &str, allow_private: bool) -> Result<String, ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::EmptyUrl);
    }

    let url = Url::parse(target).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    let host = url.host().ok_or(ValidationError::MissingHost)?;
    if !allow_private && is_private_or_local(&host) {
        return Err(ValidationError::PrivateHost(host.to_string()));
    }

    if url.port() == Some(0) {
        return Err(ValidationError::InvalidPort);
    }

    Ok(url.to_string())
}

/// Check if a host is loopback, private or otherwise not publicly routable
fn is_private_or_local(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv4(ipv4) => is_private_ip(IpAddr::V4(*ipv4)),
        Host::Ipv6(ipv6) => is_private_ip(IpAddr::V6(*ipv6)),
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
        }
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_documentation()
                || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || ipv6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

/// Validate a profile email, returning it trimmed and lowercased
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmptyEmail);
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email.to_ascii_lowercase())
        }
        _ => Err(ValidationError::InvalidEmail(email.to_string())),
    }
}

/// Validate that a numeric setting lies within `min..=max`
pub fn validate_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { name, value, min, max });
    }
    Ok(())
}
