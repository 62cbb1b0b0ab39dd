//! Application-wide constants
//!
//! File names, config keys and command-line tokens shared by the config
//! layer, the validator and the command builder.

/// Names of the configuration files managed by the registry
pub mod files {
    /// Machine-local settings (memory, hash databases, temp dirs)
    pub const LOCAL_CONFIG: &str = "LocalConfig.txt";

    /// Main processing switches, lives next to the tool jar
    pub const MAIN_CONFIG: &str = "IPEDConfig.txt";

    pub const HASH_CONFIG: &str = "HashTaskConfig.txt";
    pub const OCR_CONFIG: &str = "OCRConfig.txt";
    pub const AUDIO_CONFIG: &str = "AudioTranscriptConfig.txt";
    pub const VIDEO_CONFIG: &str = "VideoThumbsConfig.txt";
    pub const IMAGE_CONFIG: &str = "ImageThumbsConfig.txt";
    pub const ELASTIC_CONFIG: &str = "ElasticSearchConfig.txt";
    pub const MINIO_CONFIG: &str = "MinIOConfig.txt";
    pub const FACE_CONFIG: &str = "FaceRecognitionConfig.txt";
    pub const PHOTODNA_CONFIG: &str = "PhotoDNAConfig.txt";
    pub const HTML_REPORT_CONFIG: &str = "HTMLReportConfig.txt";

    /// Plain list files (one entry per line, `#` comments)
    pub const CATEGORIES_TO_EXPORT: &str = "CategoriesToExport.txt";
    pub const KEYWORDS_TO_EXPORT: &str = "KeywordsToExport.txt";

    /// The external tool itself
    pub const TOOL_JAR: &str = "iped.jar";

    /// Short names for the managed config files
    pub const ALIASES: &[(&str, &str)] = &[
        ("main", MAIN_CONFIG),
        ("local", LOCAL_CONFIG),
        ("hash", HASH_CONFIG),
        ("ocr", OCR_CONFIG),
        ("audio", AUDIO_CONFIG),
        ("video", VIDEO_CONFIG),
        ("image", IMAGE_CONFIG),
        ("elastic", ELASTIC_CONFIG),
        ("minio", MINIO_CONFIG),
        ("face", FACE_CONFIG),
        ("photodna", PHOTODNA_CONFIG),
        ("html-report", HTML_REPORT_CONFIG),
    ];
}

/// Directory layout of a tool installation
pub mod layout {
    pub const CONF_DIR: &str = "conf";
    pub const PROFILES_DIR: &str = "profiles";

    /// Bundled runtime directory next to the tool jar
    pub const RUNTIME_DIR: &str = "jre";

    #[cfg(windows)]
    pub const RUNTIME_EXE: &str = "bin/java.exe";
    #[cfg(not(windows))]
    pub const RUNTIME_EXE: &str = "bin/java";

    /// Runtime looked up on PATH when nothing is bundled
    pub const SYSTEM_RUNTIME: &str = "java";

    /// Only files with this extension are merged from a profile's conf/
    pub const CONFIG_EXTENSION: &str = "txt";

    pub const BACKUP_SUFFIX: &str = ".bak";
}

/// Keys read by the validator and the CLI
pub mod keys {
    pub const ENABLE_AUTOMATIC_EXPORT: &str = "enableAutomaticExportFiles";
    pub const ENABLE_IMAGE_SIMILARITY: &str = "enableImageSimilarity";
    pub const ENABLE_IMAGE_THUMBS: &str = "enableImageThumbs";
    pub const ENABLE_ELASTIC: &str = "enableIndexToElasticSearch";
    pub const ENABLE_MINIO: &str = "enableMinIO";
    pub const ENABLE_HASH_DB_LOOKUP: &str = "enableHashDBLookup";
    pub const ENABLE_PHOTODNA_LOOKUP: &str = "enablePhotoDNALookup";

    pub const HOST: &str = "host";
    pub const HASHES_DB: &str = "hashesDB";
    pub const MAX_MEMORY_GB: &str = "maxMemoryGB";
}

/// Profile names with special meaning
pub mod profile {
    /// Tool's built-in profile, never passed explicitly
    pub const DEFAULT: &str = "default";

    /// "Use the current custom settings" - never emitted as `-profile`
    pub const CUSTOM: &str = "custom";

    /// Shown in merge reports for keys that had no previous value
    pub const ABSENT: &str = "(absent)";

    /// Characters replaced by `_` in profile directory names
    pub const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
}

/// Tokens understood by the external tool
pub mod flags {
    pub const JAR: &str = "-jar";
    pub const EVIDENCE: &str = "-d";
    pub const DISPLAY_NAME: &str = "-dname";
    pub const PASSWORD: &str = "-p";
    pub const TIMEZONE: &str = "-tz";
    pub const OUTPUT: &str = "-o";
    pub const PROFILE: &str = "-profile";
    pub const SPLASH: &str = "-splash";

    pub const CONTINUE: &str = "--continue";
    pub const RESTART: &str = "--restart";
    pub const APPEND: &str = "--append";
    pub const NO_GUI: &str = "--nogui";
    pub const NO_LOG: &str = "--nologfile";
    pub const PORTABLE: &str = "--portable";
    pub const ADD_OWNER: &str = "--addowner";
    pub const NO_PST_ATTACHMENTS: &str = "--nopstattachs";
    pub const DOWNLOAD_INTERNET_DATA: &str = "--downloadInternetData";
}

/// Evidence format tags
pub mod evidence {
    /// Format reported for directory evidence
    pub const FOLDER_FORMAT: &str = "FOLDER";

    /// Format reported when a file has no extension
    pub const UNKNOWN_FORMAT: &str = "UNKNOWN";

    pub const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
}

/// Process runner timing
pub mod runner {
    /// How often the output loop checks the cancel flag (milliseconds)
    pub const CANCEL_POLL_MS: u64 = 100;

    /// Time a terminated process gets before a hard kill (milliseconds)
    pub const TERMINATE_GRACE_MS: u64 = 5_000;
}

/// Persisted manager preferences
pub mod config {
    pub const APP_DIR: &str = "iped-manager";
    pub const FILENAME: &str = "preferences.json";
}

pub mod defaults {
    /// Memory limit used when LocalConfig has no `maxMemoryGB`
    pub const MAX_MEMORY_GB: i32 = 8;
}
