//! Device-fingerprint canonicalization and hashing.
//!
//! A fingerprint is the SHA-256 digest (base64url) of a canonical
//! newline-joined `key=value` string over the device seed and a small set
//! of privacy-bucketed environment attributes. The field order is part of
//! the protocol: changing it changes every deployed fingerprint, so it
//! MUST NOT be reordered without a protocol version bump.
//!
//! Canonical field order:
//! `appId, appVersion, seed, lang, tz, sw, sh, cd, dpr, hc, mem, touch`

use sha2::{Digest, Sha256};

use crate::constants::FINGERPRINT_CORES_CAP;
use crate::utils::base64_url_encode;

/// One snapshot of everything that feeds the fingerprint hash.
///
/// Readings the environment could not provide carry their documented
/// sentinels (`"na"`, `-1`, `1.0`, `0`) rather than being omitted, so the
/// canonical string always has all twelve lines.
#[derive(Debug, Clone)]
pub struct FingerprintInput<'a> {
    /// Build-time application id, embedded verbatim.
    pub app_id: &'a str,
    /// Build-time application version, embedded verbatim.
    pub app_version: &'a str,
    /// The persisted (or ephemeral) device seed, base64url.
    pub seed: &'a str,
    /// Primary language tag (`"na"` when unavailable).
    pub language: &'a str,
    /// IANA timezone name (`"na"` when unavailable).
    pub timezone: &'a str,
    /// Screen width in pixels (`-1` when unavailable).
    pub screen_width: i32,
    /// Screen height in pixels (`-1` when unavailable).
    pub screen_height: i32,
    /// Color depth in bits (`-1` when unavailable).
    pub color_depth: i32,
    /// Device pixel ratio (`1.0` when unavailable); rounded to 2 decimals.
    pub device_pixel_ratio: f64,
    /// Reported CPU core count (`0` when unavailable); capped at 16.
    pub cpu_cores: u32,
    /// Total device memory in GiB (`0.0` when unavailable); bucketed.
    pub memory_gb: f64,
    /// Maximum simultaneous touch points (`0` when unavailable); bucketed.
    pub touch_points: u32,
}

impl FingerprintInput<'_> {
    /// Build the canonical newline-joined `key=value` string.
    pub fn canonical(&self) -> String {
        [
            format!("appId={}", self.app_id),
            format!("appVersion={}", self.app_version),
            format!("seed={}", self.seed),
            format!("lang={}", self.language),
            format!("tz={}", self.timezone),
            format!("sw={}", self.screen_width),
            format!("sh={}", self.screen_height),
            format!("cd={}", self.color_depth),
            format!("dpr={}", format_dpr(self.device_pixel_ratio)),
            format!("hc={}", self.cpu_cores.min(FINGERPRINT_CORES_CAP)),
            format!("mem={}", memory_bucket(self.memory_gb)),
            format!("touch={}", touch_bucket(self.touch_points)),
        ]
        .join("\n")
    }

    /// Hash the canonical string: SHA-256 → base64url.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        base64_url_encode(&hasher.finalize())
    }
}

/// Bucket total memory into the four coarse ranges used by the hash.
///
/// The bucket labels are hash input: exact strings, Unicode included.
pub fn memory_bucket(gb: f64) -> &'static str {
    if gb <= 4.0 {
        "≤4"
    } else if gb <= 8.0 {
        "6–8"
    } else if gb <= 16.0 {
        "12–16"
    } else {
        ">16"
    }
}

/// Bucket the touch-point count: `0`, `1`, or `2+`.
pub fn touch_bucket(points: u32) -> &'static str {
    match points {
        0 => "0",
        1 => "1",
        _ => "2+",
    }
}

/// Round the device pixel ratio to 2 decimals and format it the way a
/// JSON number prints: no trailing zeros, no decimal point for integers.
pub fn format_dpr(dpr: f64) -> String {
    let rounded = (dpr * 100.0).round() / 100.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(seed: &'static str) -> FingerprintInput<'static> {
        FingerprintInput {
            app_id: "rwp",
            app_version: "1.4.0",
            seed,
            language: "en-US",
            timezone: "America/New_York",
            screen_width: 1920,
            screen_height: 1080,
            color_depth: 24,
            device_pixel_ratio: 1.25,
            cpu_cores: 8,
            memory_gb: 16.0,
            touch_points: 0,
        }
    }

    #[test]
    fn test_canonical_field_order() {
        let canonical = sample_input("c2VlZA").canonical();
        let keys: Vec<&str> = canonical
            .lines()
            .map(|l| l.split('=').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            [
                "appId",
                "appVersion",
                "seed",
                "lang",
                "tz",
                "sw",
                "sh",
                "cd",
                "dpr",
                "hc",
                "mem",
                "touch"
            ]
        );
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = sample_input("c2VlZA").digest();
        let b = sample_input("c2VlZA").digest();
        assert_eq!(a, b);
        // base64url SHA-256, no padding: 43 chars
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_digest_changes_with_seed() {
        assert_ne!(sample_input("c2VlZA").digest(), sample_input("b3RoZXI").digest());
    }

    #[test]
    fn test_sentinel_values_still_hash() {
        let input = FingerprintInput {
            app_id: "rwp",
            app_version: "1.4.0",
            seed: "c2VlZA",
            language: "na",
            timezone: "na",
            screen_width: -1,
            screen_height: -1,
            color_depth: -1,
            device_pixel_ratio: 1.0,
            cpu_cores: 0,
            memory_gb: 0.0,
            touch_points: 0,
        };
        let digest = input.digest();
        assert_eq!(digest.len(), 43);
        assert!(input.canonical().contains("lang=na"));
        assert!(input.canonical().contains("sw=-1"));
    }

    #[test]
    fn test_cores_are_capped() {
        let mut input = sample_input("c2VlZA");
        input.cpu_cores = 64;
        assert!(input.canonical().contains("hc=16"));
    }

    #[test]
    fn test_memory_buckets() {
        assert_eq!(memory_bucket(0.0), "≤4");
        assert_eq!(memory_bucket(4.0), "≤4");
        assert_eq!(memory_bucket(6.0), "6–8");
        assert_eq!(memory_bucket(8.0), "6–8");
        assert_eq!(memory_bucket(12.0), "12–16");
        assert_eq!(memory_bucket(16.0), "12–16");
        assert_eq!(memory_bucket(32.0), ">16");
    }

    #[test]
    fn test_touch_buckets() {
        assert_eq!(touch_bucket(0), "0");
        assert_eq!(touch_bucket(1), "1");
        assert_eq!(touch_bucket(2), "2+");
        assert_eq!(touch_bucket(10), "2+");
    }

    #[test]
    fn test_dpr_formatting() {
        assert_eq!(format_dpr(1.0), "1");
        assert_eq!(format_dpr(2.0), "2");
        assert_eq!(format_dpr(1.25), "1.25");
        assert_eq!(format_dpr(1.5), "1.5");
        // Rounded to 2 decimals
        assert_eq!(format_dpr(1.3333333), "1.33");
        assert_eq!(format_dpr(0.999), "1");
    }
}
