use crate::error::{Result, VectorStoreError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const HNSW_M_MIN: u32 = 2;
pub const HNSW_M_MAX: u32 = 128;
pub const HNSW_EF_CONSTRUCT_MIN: u32 = 10;
pub const HNSW_EF_CONSTRUCT_MAX: u32 = 1000;
pub const QUANTIZATION_BITS_MIN: u32 = 1;
pub const QUANTIZATION_BITS_MAX: u32 = 16;

/// Vector storage sizing mode persisted in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorStorageMode {
    #[default]
    Auto,
    Tiny,
    Small,
    Medium,
    Large,
    Custom,
}

impl VectorStorageMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Custom => "custom",
        }
    }
}

/// Point-count boundaries for `auto` bucketing. Strictly "less than": a size
/// equal to a boundary falls into the next bucket up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeThresholds {
    pub tiny: u64,
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            tiny: 10_000,
            small: 100_000,
            medium: 1_000_000,
            large: 10_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: u32,
    pub ef_construct: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationKind {
    Scalar,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationConfig {
    pub enabled: bool,
    pub kind: QuantizationKind,
    pub bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalConfig {
    pub capacity_mb: u64,
    pub segments: u64,
}

/// Concrete storage tuning applied when a collection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStorageConfig {
    pub hnsw: HnswConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationConfig>,
    pub wal: WalConfig,
    /// Vectors always live on disk; in-memory-only storage is not supported.
    pub vectors_on_disk: bool,
}

static TINY_PRESET: Lazy<CustomStorageConfig> = Lazy::new(|| CustomStorageConfig {
    hnsw: HnswConfig {
        m: 8,
        ef_construct: 64,
    },
    quantization: None,
    wal: WalConfig {
        capacity_mb: 16,
        segments: 2,
    },
    vectors_on_disk: true,
});

static SMALL_PRESET: Lazy<CustomStorageConfig> = Lazy::new(|| CustomStorageConfig {
    hnsw: HnswConfig {
        m: 16,
        ef_construct: 128,
    },
    quantization: Some(QuantizationConfig {
        enabled: true,
        kind: QuantizationKind::Scalar,
        bits: 8,
    }),
    wal: WalConfig {
        capacity_mb: 32,
        segments: 4,
    },
    vectors_on_disk: true,
});

static MEDIUM_PRESET: Lazy<CustomStorageConfig> = Lazy::new(|| CustomStorageConfig {
    hnsw: HnswConfig {
        m: 32,
        ef_construct: 256,
    },
    quantization: Some(QuantizationConfig {
        enabled: true,
        kind: QuantizationKind::Scalar,
        bits: 8,
    }),
    wal: WalConfig {
        capacity_mb: 64,
        segments: 8,
    },
    vectors_on_disk: true,
});

static LARGE_PRESET: Lazy<CustomStorageConfig> = Lazy::new(|| CustomStorageConfig {
    hnsw: HnswConfig {
        m: 64,
        ef_construct: 512,
    },
    quantization: Some(QuantizationConfig {
        enabled: true,
        kind: QuantizationKind::Product,
        bits: 8,
    }),
    wal: WalConfig {
        capacity_mb: 128,
        segments: 16,
    },
    vectors_on_disk: true,
});

/// Size signal fed into `auto` bucketing: either the live point count of an
/// existing collection, or a pre-index estimate for a brand-new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSignal {
    LivePointCount(u64),
    EstimatedVectorCount(u64),
}

impl SizeSignal {
    #[must_use]
    pub const fn points(self) -> u64 {
        match self {
            Self::LivePointCount(n) | Self::EstimatedVectorCount(n) => n,
        }
    }
}

/// Maps a storage mode and a corpus-size signal to a concrete storage config.
#[derive(Debug, Clone)]
pub struct StorageTuner {
    thresholds: SizeThresholds,
    custom: Option<CustomStorageConfig>,
}

impl Default for StorageTuner {
    fn default() -> Self {
        Self::new(SizeThresholds::default(), None)
    }
}

impl StorageTuner {
    #[must_use]
    pub const fn new(thresholds: SizeThresholds, custom: Option<CustomStorageConfig>) -> Self {
        Self { thresholds, custom }
    }

    #[must_use]
    pub const fn thresholds(&self) -> &SizeThresholds {
        &self.thresholds
    }

    /// Resolve the storage config for `mode`.
    ///
    /// `custom` returns the caller-supplied config verbatim and is an error
    /// when none was supplied; named presets ignore the size signal; `auto`
    /// buckets `signal` against ascending thresholds.
    pub fn config_for(
        &self,
        mode: VectorStorageMode,
        signal: SizeSignal,
    ) -> Result<CustomStorageConfig> {
        Ok(match mode {
            VectorStorageMode::Tiny => *TINY_PRESET,
            VectorStorageMode::Small => *SMALL_PRESET,
            VectorStorageMode::Medium => *MEDIUM_PRESET,
            VectorStorageMode::Large => *LARGE_PRESET,
            VectorStorageMode::Custom => self.custom.ok_or_else(|| {
                VectorStoreError::InvalidStorageConfig(
                    "custom storage mode selected but no custom config was provided".to_string(),
                )
            })?,
            VectorStorageMode::Auto => {
                let points = signal.points();
                let picked = if points < self.thresholds.tiny {
                    *TINY_PRESET
                } else if points < self.thresholds.small {
                    *SMALL_PRESET
                } else if points < self.thresholds.medium {
                    *MEDIUM_PRESET
                } else {
                    *LARGE_PRESET
                };
                log::debug!(
                    "auto storage tuning: {points} points -> m={} ef_construct={}",
                    picked.hnsw.m,
                    picked.hnsw.ef_construct
                );
                picked
            }
        })
    }
}

/// Validate a storage config, returning every violation as a human-readable
/// string so callers can surface all problems at once.
#[must_use]
pub fn validate_storage_config(config: &CustomStorageConfig) -> Vec<String> {
    let mut violations = Vec::new();

    if config.hnsw.m < HNSW_M_MIN || config.hnsw.m > HNSW_M_MAX {
        violations.push(format!(
            "hnsw.m must be between {HNSW_M_MIN} and {HNSW_M_MAX}, got {}",
            config.hnsw.m
        ));
    }
    if config.hnsw.ef_construct < HNSW_EF_CONSTRUCT_MIN
        || config.hnsw.ef_construct > HNSW_EF_CONSTRUCT_MAX
    {
        violations.push(format!(
            "hnsw.ef_construct must be between {HNSW_EF_CONSTRUCT_MIN} and \
             {HNSW_EF_CONSTRUCT_MAX}, got {}",
            config.hnsw.ef_construct
        ));
    }
    if !config.vectors_on_disk {
        violations.push("vectors.on_disk must be true; in-memory-only storage is not supported".to_string());
    }
    if let Some(quant) = &config.quantization {
        if quant.enabled && (quant.bits < QUANTIZATION_BITS_MIN || quant.bits > QUANTIZATION_BITS_MAX)
        {
            violations.push(format!(
                "quantization.bits must be between {QUANTIZATION_BITS_MIN} and \
                 {QUANTIZATION_BITS_MAX}, got {}",
                quant.bits
            ));
        }
    }
    if config.wal.capacity_mb < 1 {
        violations.push(format!(
            "wal.capacity_mb must be at least 1, got {}",
            config.wal.capacity_mb
        ));
    }
    if config.wal.segments < 1 {
        violations.push(format!(
            "wal.segments must be at least 1, got {}",
            config.wal.segments
        ));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn auto(points: u64) -> CustomStorageConfig {
        StorageTuner::default()
            .config_for(VectorStorageMode::Auto, SizeSignal::LivePointCount(points))
            .unwrap()
    }

    #[test]
    fn auto_buckets_below_tiny_threshold() {
        assert_eq!(auto(0), *TINY_PRESET);
        assert_eq!(auto(9_999), *TINY_PRESET);
    }

    #[test]
    fn auto_boundary_falls_into_next_bucket_up() {
        // Boundaries are strict "<": a size equal to a threshold is the
        // next bucket, not the one the threshold names.
        assert_eq!(auto(10_000), *SMALL_PRESET);
        assert_eq!(auto(100_000), *MEDIUM_PRESET);
        assert_eq!(auto(1_000_000), *LARGE_PRESET);
    }

    #[test]
    fn auto_buckets_interior_sizes() {
        assert_eq!(auto(50_000), *SMALL_PRESET);
        assert_eq!(auto(500_000), *MEDIUM_PRESET);
        assert_eq!(auto(50_000_000), *LARGE_PRESET);
    }

    #[test]
    fn estimate_signal_buckets_like_live_counts() {
        let tuner = StorageTuner::default();
        assert_eq!(
            tuner
                .config_for(VectorStorageMode::Auto, SizeSignal::EstimatedVectorCount(42))
                .unwrap(),
            *TINY_PRESET
        );
    }

    #[test]
    fn named_presets_ignore_size_signal() {
        let tuner = StorageTuner::default();
        assert_eq!(
            tuner
                .config_for(VectorStorageMode::Large, SizeSignal::LivePointCount(1))
                .unwrap(),
            *LARGE_PRESET
        );
        assert_eq!(
            tuner
                .config_for(VectorStorageMode::Tiny, SizeSignal::LivePointCount(u64::MAX))
                .unwrap(),
            *TINY_PRESET
        );
    }

    #[test]
    fn custom_mode_returns_caller_config_verbatim() {
        let custom = CustomStorageConfig {
            hnsw: HnswConfig {
                m: 24,
                ef_construct: 200,
            },
            quantization: None,
            wal: WalConfig {
                capacity_mb: 48,
                segments: 3,
            },
            vectors_on_disk: true,
        };
        let tuner = StorageTuner::new(SizeThresholds::default(), Some(custom));
        assert_eq!(
            tuner
                .config_for(VectorStorageMode::Custom, SizeSignal::LivePointCount(0))
                .unwrap(),
            custom
        );
    }

    #[test]
    fn custom_mode_without_config_is_rejected() {
        let tuner = StorageTuner::default();
        let err = tuner
            .config_for(VectorStorageMode::Custom, SizeSignal::LivePointCount(0))
            .unwrap_err();
        assert!(err.to_string().contains("no custom config"));
    }

    #[test]
    fn presets_pass_validation() {
        for preset in [&*TINY_PRESET, &*SMALL_PRESET, &*MEDIUM_PRESET, &*LARGE_PRESET] {
            assert_eq!(validate_storage_config(preset), Vec::<String>::new());
        }
    }

    #[test]
    fn validation_reports_all_violations_at_once() {
        let bad = CustomStorageConfig {
            hnsw: HnswConfig {
                m: 1,
                ef_construct: 5,
            },
            quantization: Some(QuantizationConfig {
                enabled: true,
                kind: QuantizationKind::Scalar,
                bits: 32,
            }),
            wal: WalConfig {
                capacity_mb: 0,
                segments: 0,
            },
            vectors_on_disk: false,
        };
        let violations = validate_storage_config(&bad);
        assert_eq!(violations.len(), 6);
    }

    #[test]
    fn disabled_quantization_skips_bits_check() {
        let config = CustomStorageConfig {
            quantization: Some(QuantizationConfig {
                enabled: false,
                kind: QuantizationKind::Scalar,
                bits: 0,
            }),
            ..*TINY_PRESET
        };
        assert_eq!(validate_storage_config(&config), Vec::<String>::new());
    }
}
