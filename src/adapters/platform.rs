//! Platform adapters: reboot, recovery boot.

use log::info;

use crate::app::PlatformPort;

// ───────────────────────────────────────────────────────────────
// Host twin
// ───────────────────────────────────────────────────────────────

/// Host stand-in: logs the requests instead of acting on them.
#[derive(Default)]
pub struct SimPlatform;

impl PlatformPort for SimPlatform {
    fn reboot(&self) {
        info!("reboot requested (simulation: ignored)");
    }

    fn boot_into_recovery(&self) -> Result<String, String> {
        info!("recovery boot requested (simulation: ignored)");
        Ok("Device is booting into recovery hold on!".to_string())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_impl::EspPlatform;

#[cfg(target_os = "espidf")]
mod esp_impl {
    use std::thread;
    use std::time::Duration;

    use esp_idf_svc::sys::*;
    use log::error;

    use crate::app::PlatformPort;

    /// Real restarts and boot-partition switching. Recovery is the
    /// factory app partition.
    pub struct EspPlatform;

    impl PlatformPort for EspPlatform {
        fn reboot(&self) {
            // Give the HTTP layer time to flush the reply first.
            thread::Builder::new()
                .name("reboot".to_string())
                .spawn(|| {
                    thread::sleep(Duration::from_secs(2));
                    // SAFETY: esp_restart never returns.
                    unsafe { esp_restart() };
                })
                .map_err(|e| error!("failed to spawn reboot task: {e}"))
                .ok();
        }

        fn boot_into_recovery(&self) -> Result<String, String> {
            // SAFETY: read-only partition table walk plus a boot
            // pointer update, both plain IDF calls.
            unsafe {
                let factory = esp_partition_find_first(
                    esp_partition_type_t_ESP_PARTITION_TYPE_APP,
                    esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_APP_FACTORY,
                    core::ptr::null(),
                );
                if factory.is_null() {
                    return Err("Error: Factory Partition not found!".to_string());
                }
                if esp_ota_set_boot_partition(factory) != ESP_OK {
                    return Err("Error: Unable to change boot Partition!".to_string());
                }
            }
            Ok("Device is booting into recovery hold on!".to_string())
        }
    }
}
