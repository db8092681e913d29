//! Application constants for the radar compositor
//!
//! Default generation parameters, well-known ODIM attribute names and
//! quality-field task names, and the provenance wire-format tokens.

// =============================================================================
// Composite Generation Defaults
// =============================================================================

/// Default quantity to composite
pub const DEFAULT_QUANTITY: &str = "DBZH";

/// Default output gain and offset (uint8 style dBZ encoding)
pub const DEFAULT_GAIN: f64 = 0.4;
pub const DEFAULT_OFFSET: f64 = -30.0;

/// Minimum value representable in the composite
pub const DEFAULT_MINVALUE: f64 = -30.0;

/// CAPPI/PCAPPI/PMAX height above sea level (m)
pub const DEFAULT_HEIGHT: f64 = 1000.0;

/// PPI elevation angle (radians)
pub const DEFAULT_ELANGLE: f64 = 0.0;

/// PMAX range (m)
pub const DEFAULT_RANGE: f64 = 200_000.0;

/// Pixel scale used for best-fit areas (m)
pub const DEFAULT_SCALE: f64 = 2000.0;

/// Projection id used for best-fit areas
pub const DEFAULT_PCSID: &str = "gmaps";

/// Definition of the default projection when the registry does not carry it
pub const GMAPS_PROJECTION: &str =
    "+proj=merc +lat_ts=0 +lon_0=0 +k=1.0 +R=6378137.0 +nadgrids=@null +no_defs";

/// Originating centre written into the composite source
pub const DEFAULT_CENTER_ID: &str = "ORG:82";

/// Nodata and undetect markers of composite rasters
pub const COMPOSITE_NODATA: f64 = 255.0;
pub const COMPOSITE_UNDETECT: f64 = 0.0;

// =============================================================================
// GRA Constants
// =============================================================================

/// Z-R relationship defaults
pub const DEFAULT_ZR_A: f64 = 200.0;
pub const DEFAULT_ZR_B: f64 = 1.6;

/// Climatologic GRA coefficients (neutral correction)
pub mod gra {
    pub const DEFAULT_A: f64 = 0.0;
    pub const DEFAULT_B: f64 = 0.0;
    pub const DEFAULT_C: f64 = 0.0;

    /// Coefficient lookup offset before nominal time (hours)
    pub const LOOKBACK_HOURS: i64 = 12;

    /// Oldest coefficient accepted as a fallback (hours)
    pub const MAX_AGE_HOURS: i64 = 48;

    /// Suffix of the corrected parameter
    pub const CORRECTED_SUFFIX: &str = "_CORR";
}

// =============================================================================
// Attribute Names
// =============================================================================

/// ODIM attribute names read and written by the compositor
pub mod attributes {
    pub const HOW_TASK: &str = "how/task";
    pub const HOW_TASK_ARGS: &str = "how/task_args";
    pub const HOW_NODES: &str = "how/nodes";
    pub const HOW_MALFUNC: &str = "how/malfunc";
    pub const WHAT_SOURCE: &str = "what/source";
}

/// Quality-field task names produced by the generator itself
pub mod quality_fields {
    pub const DISTANCE: &str = "se.smhi.composite.distance.radar";
    pub const HEIGHT: &str = "se.smhi.composite.height.radar";
    pub const RADAR_INDEX: &str = "se.smhi.composite.index.radar";
    pub const THRESHOLD: &str = "se.smhi.detector.threshold";
    pub const SATFILTER: &str = "fr.mf.satfilter";
    pub const CTFILTER: &str = "se.smhi.quality.ctfilter";
}

/// Parameter marking pixels where the contributing radar changes
pub const BORDER_QUANTITY: &str = "BRDR";

// =============================================================================
// Quality Control Markers
// =============================================================================

/// Detector list tokens and provenance markers for prequalified volumes
pub mod markers {
    /// Leading `how/task` token of a volume qualified upstream
    pub const PREQUALIFIED: &str = "nimbus-qc";
    pub const PREQUALIFIED_SATFILTER: &str = "nimbus-qc-satfilter";
    pub const PREQUALIFIED_NO_SATFILTER: &str = "nimbus-qc-no-satfilter";

    /// Detector list entries steering per-radar detector selection
    pub const CONFIGURED_QC: &str = "nimbus-configured-qc";
    pub const SATFILTER_APPLY_ALL: &str = "nimbus-satfilter-apply-all";
    pub const SATFILTER_SKIP: &str = "nimbus-satfilter-skip";

    /// Detector name of the satellite filter
    pub const SATFILTER_DETECTOR: &str = "satfilter";

    /// Key of the satellite filter input file in `how/task_args`
    pub const SATFILTER_FILE_KEY: &str = "satfilter_file";

    /// Fallback key in the per-radar detector table
    pub const DEFAULT_SELECTION: &str = "default";
}

// =============================================================================
// Processing Constants
// =============================================================================

/// Default maximum number of quality-control pre-stage workers
pub const DEFAULT_QC_WORKERS: usize = 4;

/// Default threshold of the built-in threshold detector (dBZ)
pub const DEFAULT_THRESHOLD_DBZ: f64 = 10.0;

/// Default capacity of the caching object store
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Prefix of scratch directories and temporary files
pub const SCRATCH_PREFIX: &str = "radar-compositor-";

/// File extension of radar object files
pub const OBJECT_FILE_EXTENSION: &str = "json";

/// Mean earth radius (m)
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Compact date/time formats used in ODIM attributes and log context
pub const DATE_FORMAT: &str = "%Y%m%d";
pub const TIME_FORMAT: &str = "%H%M%S";

/// Log level for different operation types
pub const LOG_LEVEL_INFO: &str = "info";
pub const LOG_LEVEL_DEBUG: &str = "debug";
pub const LOG_LEVEL_WARN: &str = "warn";

/// Whether a quality-field name is computed by the generator rather than a detector
pub fn is_generator_quality_field(name: &str) -> bool {
    matches!(
        name,
        quality_fields::DISTANCE | quality_fields::HEIGHT | quality_fields::RADAR_INDEX
    )
}

/// Whether a `how/task` token marks a volume qualified upstream
pub fn is_prequalified_marker(token: &str) -> bool {
    token.starts_with(markers::PREQUALIFIED)
}
