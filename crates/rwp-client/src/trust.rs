//! Transport trust classification.
//!
//! Decides whether the connection to the backend is already protected
//! well enough that the application-layer encrypted channel is redundant:
//! TLS schemes, loopback, and private-network hosts qualify. Everything
//! else gets the encrypted channel.

use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use url::{Host, Url};

/// Pure classification of an origin URL.
pub fn is_transport_trusted(origin: &Url) -> bool {
    if matches!(origin.scheme(), "https" | "wss") {
        return true;
    }

    match origin.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_private(),
        Some(Host::Ipv6(ip)) => ip.is_loopback() || is_unique_local(&ip) || is_link_local(&ip),
        None => false,
    }
}

// fc00::/7
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

// fe80::/10
fn is_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// The session-cached trust decision.
///
/// Classification runs once at construction; the origin cannot change
/// without a full restart. The one permitted transition is a downgrade:
/// when the server declares the connection insecure, [`force_untrusted`]
/// pins the session to the encrypted channel. The flag is session-wide, so
/// every later request through the same agent also uses the channel.
///
/// [`force_untrusted`]: TransportTrust::force_untrusted
pub struct TransportTrust {
    trusted: AtomicBool,
}

impl TransportTrust {
    pub fn classify(origin: &Url) -> Self {
        Self {
            trusted: AtomicBool::new(is_transport_trusted(origin)),
        }
    }

    /// A trust state that always requires the encrypted channel. Used when
    /// the origin cannot be parsed, and by tests.
    pub fn untrusted() -> Self {
        Self {
            trusted: AtomicBool::new(false),
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::Relaxed)
    }

    /// Downgrade for the rest of the session. Never reversed.
    pub fn force_untrusted(&self) {
        self.trusted.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trusted(origin: &str) -> bool {
        is_transport_trusted(&Url::parse(origin).unwrap())
    }

    #[test]
    fn tls_always_trusted() {
        assert!(trusted("https://example.com"));
        assert!(trusted("https://10.20.30.40"));
        assert!(trusted("wss://example.com/socket"));
    }

    #[test]
    fn loopback_trusted() {
        assert!(trusted("http://localhost"));
        assert!(trusted("http://LOCALHOST:8080"));
        assert!(trusted("http://127.0.0.1"));
        assert!(trusted("http://[::1]"));
    }

    #[test]
    fn private_ipv4_ranges_trusted() {
        assert!(trusted("http://10.0.0.1"));
        assert!(trusted("http://172.16.0.1"));
        assert!(trusted("http://172.31.255.254"));
        assert!(trusted("http://192.168.1.5"));
    }

    #[test]
    fn private_ipv6_ranges_trusted() {
        assert!(trusted("http://[fc00::1]"));
        assert!(trusted("http://[fd12:3456::1]"));
        assert!(trusted("http://[fe80::1]"));
    }

    #[test]
    fn public_hosts_untrusted() {
        assert!(!trusted("http://example.com"));
        assert!(!trusted("http://8.8.8.8"));
        assert!(!trusted("http://172.32.0.1"));
        assert!(!trusted("http://[2001:db8::1]"));
    }

    #[test]
    fn forced_downgrade_sticks() {
        let trust = TransportTrust::classify(&Url::parse("https://example.com").unwrap());
        assert!(trust.is_trusted());

        trust.force_untrusted();
        assert!(!trust.is_trusted());
    }
}
