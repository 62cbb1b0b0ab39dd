//! Cross-file consistency checks run before launching the tool
//!
//! Each rule reads as: if a switch is on in the main config, something
//! else (in the same or another file) must hold. Every applicable rule is
//! evaluated so the caller sees all problems at once.

use std::fmt;
use std::fs;
use tracing::{debug, warn};

use crate::config::{ConfigDocument, ConfigRegistry};
use crate::constants::{files, keys};

/// Which check produced an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    MainConfigMissing,
    AutomaticExport,
    ImageSimilarity,
    SearchIndex,
    ObjectStorage,
    HashDatabase,
}

/// One unmet dependency, with a remediation hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub rule: RuleKind,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Main-config switches the rules look at, read once
#[derive(Debug, Clone, Copy, Default)]
struct MainFlags {
    automatic_export: bool,
    image_similarity: bool,
    image_thumbs: bool,
    search_index: bool,
    object_storage: bool,
    hash_db_lookup: bool,
    photodna_lookup: bool,
}

impl MainFlags {
    fn read(main: &ConfigDocument) -> Self {
        Self {
            automatic_export: main.get_bool(keys::ENABLE_AUTOMATIC_EXPORT, false),
            image_similarity: main.get_bool(keys::ENABLE_IMAGE_SIMILARITY, false),
            image_thumbs: main.get_bool(keys::ENABLE_IMAGE_THUMBS, false),
            search_index: main.get_bool(keys::ENABLE_ELASTIC, false),
            object_storage: main.get_bool(keys::ENABLE_MINIO, false),
            hash_db_lookup: main.get_bool(keys::ENABLE_HASH_DB_LOOKUP, false),
            photodna_lookup: main.get_bool(keys::ENABLE_PHOTODNA_LOOKUP, false),
        }
    }
}

struct Rule {
    kind: RuleKind,
    triggered: fn(&MainFlags) -> bool,
    satisfied: fn(&MainFlags, &mut ConfigRegistry) -> bool,
    message: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        kind: RuleKind::AutomaticExport,
        triggered: |f| f.automatic_export,
        satisfied: |_, r| has_categories_to_export(r) || has_keywords_to_export(r),
        message: "Automatic file export is enabled but nothing is selected for export: \
                  no category in conf/CategoriesToExport.txt and no keyword in conf/KeywordsToExport.txt. \
                  Uncomment at least one category or keyword, or disable automatic export in IPEDConfig.",
    },
    Rule {
        kind: RuleKind::ImageSimilarity,
        triggered: |f| f.image_similarity,
        satisfied: |f, _| f.image_thumbs,
        message: "Image similarity search requires image thumbnails. \
                  Enable image thumbnail creation (enableImageThumbs).",
    },
    Rule {
        kind: RuleKind::SearchIndex,
        triggered: |f| f.search_index,
        satisfied: |_, r| is_search_index_configured(r),
        message: "Indexing to ElasticSearch is enabled but not configured. \
                  Set host and port in ElasticSearchConfig.",
    },
    Rule {
        kind: RuleKind::ObjectStorage,
        triggered: |f| f.object_storage,
        satisfied: |_, r| is_object_storage_configured(r),
        message: "MinIO storage is enabled but not configured. Set host and port in MinIOConfig.",
    },
    Rule {
        kind: RuleKind::HashDatabase,
        triggered: |f| f.hash_db_lookup || f.photodna_lookup,
        satisfied: |_, r| is_hashes_db_configured(r),
        message: "Hash DB lookup or PhotoDNA lookup requires a hash database. \
                  Set the hashesDB path in LocalConfig.",
    },
];

/// Run every rule against the registry's documents.
/// An empty list means the configuration is consistent.
pub fn validate_configuration(registry: &mut ConfigRegistry) -> Vec<ValidationIssue> {
    let Some(main) = registry.main_config() else {
        warn!("Main config not found, skipping validation rules");
        return vec![ValidationIssue {
            rule: RuleKind::MainConfigMissing,
            message: format!("{} was not found or could not be loaded.", files::MAIN_CONFIG),
        }];
    };
    let flags = MainFlags::read(main);

    let mut issues = Vec::new();
    for rule in RULES {
        if !(rule.triggered)(&flags) {
            continue;
        }
        if (rule.satisfied)(&flags, registry) {
            debug!(rule = ?rule.kind, "Rule satisfied");
        } else {
            warn!(rule = ?rule.kind, "Configuration check failed");
            issues.push(ValidationIssue {
                rule: rule.kind,
                message: rule.message.to_string(),
            });
        }
    }
    issues
}

/// At least one uncommented line in conf/CategoriesToExport.txt
pub fn has_categories_to_export(registry: &ConfigRegistry) -> bool {
    has_active_lines(registry, files::CATEGORIES_TO_EXPORT)
}

/// At least one uncommented line in conf/KeywordsToExport.txt
pub fn has_keywords_to_export(registry: &ConfigRegistry) -> bool {
    has_active_lines(registry, files::KEYWORDS_TO_EXPORT)
}

fn has_active_lines(registry: &ConfigRegistry, name: &str) -> bool {
    let Some(conf) = registry.conf_path() else {
        return false;
    };
    let path = conf.join(name);
    match fs::read_to_string(&path) {
        Ok(text) => text.lines().map(str::trim).any(|l| !l.is_empty() && !l.starts_with('#')),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "List file unavailable");
            false
        }
    }
}

pub fn is_search_index_configured(registry: &mut ConfigRegistry) -> bool {
    has_value(registry.config_file(files::ELASTIC_CONFIG), keys::HOST)
}

pub fn is_object_storage_configured(registry: &mut ConfigRegistry) -> bool {
    has_value(registry.config_file(files::MINIO_CONFIG), keys::HOST)
}

pub fn is_hashes_db_configured(registry: &mut ConfigRegistry) -> bool {
    has_value(registry.local_config(), keys::HASHES_DB)
}

fn has_value(doc: Option<&mut ConfigDocument>, key: &str) -> bool {
    doc.is_some_and(|doc| !doc.get(key).trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn install(main: &str) -> (tempfile::TempDir, ConfigRegistry) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("conf")).unwrap();
        fs::write(dir.path().join("IPEDConfig.txt"), main).unwrap();
        let registry = ConfigRegistry::for_tool(&dir.path().join("iped.jar"));
        (dir, registry)
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        fs::write(root.join(rel), contents).unwrap();
    }

    fn kinds(issues: &[ValidationIssue]) -> Vec<RuleKind> {
        issues.iter().map(|i| i.rule).collect()
    }

    #[test]
    fn test_missing_main_config_is_single_fatal_issue() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ConfigRegistry::for_tool(&dir.path().join("iped.jar"));

        let issues = validate_configuration(&mut registry);
        assert_eq!(kinds(&issues), vec![RuleKind::MainConfigMissing]);
    }

    #[test]
    fn test_clean_config_has_no_issues() {
        let (_dir, mut registry) = install("enableOCR = true\n");
        assert!(validate_configuration(&mut registry).is_empty());
    }

    #[test]
    fn test_image_similarity_requires_thumbnails() {
        let (_dir, mut registry) =
            install("enableImageSimilarity = true\nenableImageThumbs = false\n");
        let issues = validate_configuration(&mut registry);
        assert_eq!(kinds(&issues), vec![RuleKind::ImageSimilarity]);
        assert!(issues[0].message.contains("Image similarity"));

        let (_dir, mut registry) =
            install("enableImageSimilarity = true\nenableImageThumbs = true\n");
        assert!(validate_configuration(&mut registry).is_empty());
    }

    #[test]
    fn test_export_with_only_comments_reports_once() {
        let (dir, mut registry) = install("enableAutomaticExportFiles = true\n");
        write(dir.path(), "conf/CategoriesToExport.txt", "# Documents\n#Images\n\n");
        write(dir.path(), "conf/KeywordsToExport.txt", "");

        let issues = validate_configuration(&mut registry);
        assert_eq!(kinds(&issues), vec![RuleKind::AutomaticExport]);
    }

    #[test]
    fn test_export_satisfied_by_category_or_keyword() {
        let (dir, mut registry) = install("enableAutomaticExportFiles = true\n");
        write(dir.path(), "conf/CategoriesToExport.txt", "# Documents\nImages\n");
        assert!(validate_configuration(&mut registry).is_empty());

        let (dir, mut registry) = install("enableAutomaticExportFiles = true\n");
        write(dir.path(), "conf/KeywordsToExport.txt", "  password  \n");
        assert!(validate_configuration(&mut registry).is_empty());
    }

    #[test]
    fn test_remote_services_need_host() {
        let (dir, mut registry) =
            install("enableIndexToElasticSearch = true\nenableMinIO = true\n");
        write(dir.path(), "conf/ElasticSearchConfig.txt", "host = \nport = 9200\n");

        let issues = validate_configuration(&mut registry);
        assert_eq!(kinds(&issues), vec![RuleKind::SearchIndex, RuleKind::ObjectStorage]);

        write(dir.path(), "conf/ElasticSearchConfig.txt", "host = es.local\n");
        write(dir.path(), "conf/MinIOConfig.txt", "host = minio.local\n");
        registry.reload();
        assert!(validate_configuration(&mut registry).is_empty());
    }

    #[test]
    fn test_hash_lookups_need_hashes_db() {
        let (dir, mut registry) = install("enablePhotoDNALookup = true\n");
        let issues = validate_configuration(&mut registry);
        assert_eq!(kinds(&issues), vec![RuleKind::HashDatabase]);

        write(dir.path(), "LocalConfig.txt", "hashesDB = /data/hashes.db\n");
        registry.reload();
        assert!(validate_configuration(&mut registry).is_empty());
    }

    #[test]
    fn test_all_failing_rules_reported_in_order() {
        let (_dir, mut registry) = install(
            "enableAutomaticExportFiles = true\n\
             enableImageSimilarity = true\n\
             enableIndexToElasticSearch = true\n\
             enableMinIO = true\n\
             enableHashDBLookup = true\n",
        );
        let issues = validate_configuration(&mut registry);
        assert_eq!(
            kinds(&issues),
            vec![
                RuleKind::AutomaticExport,
                RuleKind::ImageSimilarity,
                RuleKind::SearchIndex,
                RuleKind::ObjectStorage,
                RuleKind::HashDatabase,
            ]
        );
    }
}
