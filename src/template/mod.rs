//! Template set
//!
//! Traverses the configured template paths and turns every YAML document
//! found there into a parsed manifest carrying its source file. All
//! template-level validation happens here: unreadable files, unparseable
//! YAML, documents without an identity, and duplicate identities all abort
//! the task with file attribution before anything touches the cluster.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::resources::Resource;

/// Template content that even *looks* like a Secret is never echoed.
static SECRET_KIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"kind:\s*Secret").expect("static pattern"));

pub fn content_may_contain_secret(content: &str) -> bool {
    SECRET_KIND_RE.is_match(content)
}

/// One YAML document from one template file.
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    pub file_path: PathBuf,
    pub kind: String,
    pub name: String,
    pub api_version: String,
    pub labels: BTreeMap<String, String>,
    /// Full content of the originating file, for error reporting.
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestHeader {
    api_version: String,
    kind: String,
    metadata: ManifestMeta,
}

#[derive(Deserialize)]
struct ManifestMeta {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

/// The validated set of manifests for one task.
#[derive(Debug, Default)]
pub struct TemplateSet {
    templates: Vec<ParsedTemplate>,
}

impl TemplateSet {
    /// Walk `paths` in input order (files directly, directories by sorted
    /// entry name), parse every YAML document, and validate identities.
    pub fn discover(paths: &[PathBuf]) -> Result<Self, TaskError> {
        let mut files: Vec<PathBuf> = Vec::new();
        for path in paths {
            if path.is_dir() {
                let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                    .map_err(|e| TaskError::InvalidTemplate {
                        file: path.display().to_string(),
                        reason: format!("failed to read directory: {e}"),
                    })?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| is_template_file(p))
                    .collect();
                entries.sort();
                files.extend(entries);
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                return Err(TaskError::InvalidTemplate {
                    file: path.display().to_string(),
                    reason: "template path does not exist".to_string(),
                });
            }
        }

        let mut templates = Vec::new();
        let mut seen: HashMap<(String, String), PathBuf> = HashMap::new();
        for file in files {
            let content =
                std::fs::read_to_string(&file).map_err(|e| TaskError::InvalidTemplate {
                    file: file.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

            for template in parse_documents(&file, &content)? {
                let identity = (template.kind.clone(), template.name.clone());
                if let Some(first) = seen.get(&identity) {
                    return Err(TaskError::InvalidTemplate {
                        file: file.display().to_string(),
                        reason: format!(
                            "duplicate definition of {}/{}; first defined in {}",
                            template.kind,
                            template.name,
                            first.display()
                        ),
                    });
                }
                seen.insert(identity, file.clone());
                templates.push(template);
            }
        }

        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[ParsedTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Build resources, classifying each template against the discovered
    /// global kind set carried by `config`.
    pub fn into_resources(self, config: &TaskConfig) -> Vec<Resource> {
        self.templates
            .iter()
            .map(|t| Resource::from_template(t, config))
            .collect()
    }
}

fn is_template_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

fn parse_documents(file: &Path, content: &str) -> Result<Vec<ParsedTemplate>, TaskError> {
    let mut templates = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| invalid(file, content, e))?;
        if value.is_null() {
            continue;
        }
        let header: ManifestHeader =
            serde_yaml::from_value(value).map_err(|e| invalid(file, content, e))?;
        templates.push(ParsedTemplate {
            file_path: file.to_path_buf(),
            kind: header.kind,
            name: header.metadata.name,
            api_version: header.api_version,
            labels: header.metadata.labels,
            content: content.to_string(),
        });
    }
    Ok(templates)
}

fn invalid(file: &Path, content: &str, err: impl std::fmt::Display) -> TaskError {
    let reason = if content_may_contain_secret(content) {
        format!("{err} (content suppressed because it may contain a Secret)")
    } else {
        format!("{err}\n{}", snippet(content))
    };
    TaskError::InvalidTemplate {
        file: file.display().to_string(),
        reason,
    }
}

fn snippet(content: &str) -> String {
    content
        .lines()
        .take(6)
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
