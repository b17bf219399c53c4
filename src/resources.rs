//! Live system resource snapshots for engine selection.
//!
//! A snapshot is read-only and taken at selection time; nothing here
//! reserves memory. Under heavy parallel load an engine that appeared to
//! fit may still fail at runtime — that surfaces as an ordinary engine
//! failure eligible for fallback.

/// Point-in-time view of the resources relevant to engine selection.
#[derive(Debug, Clone, Copy)]
pub struct SystemResources {
    /// Free RAM in GB at snapshot time.
    pub available_ram_gb: f64,
}

impl SystemResources {
    /// Take a live snapshot of available memory.
    pub fn detect() -> Self {
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        Self {
            available_ram_gb: sys.available_memory() as f64 / 1_000_000_000.0,
        }
    }

    /// Fixed snapshot, for tests and simulations.
    pub fn with_available_gb(gb: f64) -> Self {
        Self {
            available_ram_gb: gb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_reports_positive_memory() {
        let resources = SystemResources::detect();
        assert!(resources.available_ram_gb > 0.0);
    }
}
