//! Device identity: the persisted random seed and the environment snapshot
//! that together produce the device fingerprint.
//!
//! Every environment reading is individually fault-tolerant: a reading
//! that cannot be taken substitutes its sentinel instead of aborting the
//! snapshot, so a fingerprint can always be computed.

use std::sync::Arc;

use rwp_crypto::constants::DEVICE_SEED_SIZE;
use rwp_crypto::{base64_url_encode, generate_random_bytes, FingerprintInput};

use crate::infra::store::{context_keys, KvStore, Partition};

/// Display characteristics of the embedding shell.
///
/// The agent itself has no window; whoever hosts it reports these. Absent
/// metrics fall back to the sentinels the fingerprint documents.
#[derive(Debug, Clone)]
pub struct DisplayMetrics {
    pub screen_width: i32,
    pub screen_height: i32,
    pub color_depth: i32,
    pub device_pixel_ratio: f64,
    pub max_touch_points: u32,
}

/// One snapshot of the fingerprint-relevant environment.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    pub language: String,
    pub timezone: String,
    pub screen_width: i32,
    pub screen_height: i32,
    pub color_depth: i32,
    pub device_pixel_ratio: f64,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    pub touch_points: u32,
}

impl EnvSnapshot {
    /// Probe the host environment. Each reading has its own fallback.
    pub fn collect(display: Option<&DisplayMetrics>) -> Self {
        let language = read_language().unwrap_or_else(|| "na".to_string());
        let timezone = read_timezone().unwrap_or_else(|| "na".to_string());

        let sys = sysinfo::System::new_all();
        let cpu_cores = sys.cpus().len() as u32;
        let memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        let (screen_width, screen_height, color_depth, device_pixel_ratio, touch_points) =
            match display {
                Some(d) => (
                    d.screen_width,
                    d.screen_height,
                    d.color_depth,
                    d.device_pixel_ratio,
                    d.max_touch_points,
                ),
                None => (-1, -1, -1, 1.0, 0),
            };

        Self {
            language,
            timezone,
            screen_width,
            screen_height,
            color_depth,
            device_pixel_ratio,
            cpu_cores,
            memory_gb,
            touch_points,
        }
    }
}

/// `en_US.UTF-8` → `en-US`; `C`/`POSIX`/empty read as unavailable.
fn read_language() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|raw| {
            let tag = raw.split('.').next().unwrap_or("").replace('_', "-");
            if tag.is_empty() || tag == "C" || tag == "POSIX" {
                None
            } else {
                Some(tag)
            }
        })
}

fn read_timezone() -> Option<String> {
    if let Ok(tz) = std::env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim().to_string();
        if !tz.is_empty() {
            return Some(tz);
        }
    }
    std::fs::read_to_string("/etc/timezone")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Produces and persists the device seed, and derives fingerprints.
pub struct DeviceIdentity {
    app_id: String,
    app_version: String,
    store: Arc<KvStore>,
    display: Option<DisplayMetrics>,
}

impl DeviceIdentity {
    pub fn new(
        app_id: impl Into<String>,
        app_version: impl Into<String>,
        store: Arc<KvStore>,
        display: Option<DisplayMetrics>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_version: app_version.into(),
            store,
            display,
        }
    }

    /// Read the persisted seed, generating and persisting one if absent.
    ///
    /// Always returns a usable seed: when the store cannot commit, the
    /// freshly generated value is returned ephemeral with a warning. Once
    /// a seed has been persisted it is never regenerated.
    pub fn get_or_create_seed(&self) -> String {
        let created = self.store.transaction(|txn| {
            if let Some(seed) =
                txn.get_json::<String>(Partition::Context, context_keys::DEVICE_SEED)
            {
                return Ok(seed);
            }
            let seed = base64_url_encode(&generate_random_bytes::<DEVICE_SEED_SIZE>());
            txn.put_json(Partition::Context, context_keys::DEVICE_SEED, &seed)?;
            Ok(seed)
        });

        match created {
            Ok(seed) => seed,
            Err(e) => {
                tracing::warn!(error = %e, "device seed not persisted, using ephemeral seed");
                base64_url_encode(&generate_random_bytes::<DEVICE_SEED_SIZE>())
            }
        }
    }

    /// Compute the device fingerprint from the seed and a fresh
    /// environment snapshot. Never persisted, recomputed on demand.
    pub fn fingerprint(&self) -> String {
        let seed = self.get_or_create_seed();
        let env = EnvSnapshot::collect(self.display.as_ref());

        FingerprintInput {
            app_id: &self.app_id,
            app_version: &self.app_version,
            seed: &seed,
            language: &env.language,
            timezone: &env.timezone,
            screen_width: env.screen_width,
            screen_height: env.screen_height,
            color_depth: env.color_depth,
            device_pixel_ratio: env.device_pixel_ratio,
            cpu_cores: env.cpu_cores,
            memory_gb: env.memory_gb,
            touch_points: env.touch_points,
        }
        .digest()
    }
}
