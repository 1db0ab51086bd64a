//! Classification of kubectl failure output
//!
//! `kubectl apply` reports problems per input file on stderr. This module
//! turns that text into per-file summary paragraphs, applying the
//! sensitivity rules: content and stderr belonging to a sensitive resource
//! that was not cleared by server-side dry-run never reach the summary.

use std::sync::LazyLock;

use regex::Regex;

use crate::resources::Resource;
use crate::summary::{DeploySummary, Tone};
use crate::template::content_may_contain_secret;

/// Extracts quoted template paths from kubectl stderr lines.
static BAD_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(/\S+\.ya?ml\S*)""#).expect("static pattern"));

/// Matches `<kind/name> pruned` lines on apply stdout.
static PRUNED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*) pruned$").expect("static pattern"));

/// The apply may have partially succeeded by the time it failed, so the
/// reader is warned before any per-file detail.
pub const ROLLBACK_WARNING: &str = "WARNING: Any resources not mentioned in the error(s) below \
    were likely created/updated. You may wish to roll back this deploy.";

pub const SUPPRESSED_FOR_SECURITY: &str = "SUPPRESSED FOR SECURITY";

const SECRET_CONTENT_PLACEHOLDER: &str =
    "> Template content: Suppressed because it may contain a Secret";

/// Names pruned by an apply, in stdout order.
pub fn parse_pruned(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| PRUNED_RE.captures(line).map(|c| c[1].to_string()))
        .collect()
}

/// Classify apply stderr into summary paragraphs.
///
/// `attempted` is the set of resources that was submitted; it is consulted
/// for sensitivity and for template content.
pub fn record_apply_failure(stderr: &str, attempted: &[&Resource], summary: &DeploySummary) {
    summary.add_paragraph(ROLLBACK_WARNING, Tone::Warning);

    let mut per_file: Vec<(String, Vec<String>)> = Vec::new();
    let mut unidentified: Vec<&str> = Vec::new();

    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        let mut found = false;
        for captures in BAD_FILE_RE.captures_iter(line) {
            found = true;
            let basename = basename_of(&captures[1]);
            match per_file.iter_mut().find(|(b, _)| *b == basename) {
                Some((_, lines)) => lines.push(line.to_string()),
                None => per_file.push((basename, vec![line.to_string()])),
            }
        }
        if !found {
            unidentified.push(line);
        }
    }

    for (basename, lines) in per_file {
        let resource = attempted
            .iter()
            .find(|r| {
                r.file_path()
                    .file_name()
                    .map(|n| n.to_string_lossy() == basename.as_str())
                    .unwrap_or(false)
            })
            .copied();
        summary.add_paragraph(
            invalid_template_paragraph(&basename, resource, &lines.join("\n")),
            Tone::Failure,
        );
    }

    if !unidentified.is_empty() {
        if attempted.iter().any(|r| r.sensitive_output()) {
            summary.add_paragraph(
                "Unidentified error(s) occurred; output suppressed because the deploy \
                 included sensitive template content.",
                Tone::Failure,
            );
        } else {
            summary.add_paragraph(
                format!("Unidentified error(s):\n{}", indent(&unidentified.join("\n"))),
                Tone::Failure,
            );
        }
    }
}

/// Record a single resource's template as invalid (used for server-side
/// dry-run failures during validation).
pub fn record_invalid_template(summary: &DeploySummary, resource: &Resource, err: &str) {
    let basename = resource
        .file_path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| resource.file_path().display().to_string());
    summary.add_paragraph(
        invalid_template_paragraph(&basename, Some(resource), err),
        Tone::Failure,
    );
}

fn invalid_template_paragraph(basename: &str, resource: Option<&Resource>, err: &str) -> String {
    let mut text = format!("Invalid template: {basename}");

    match resource {
        Some(r) if r.sensitive_output() => {
            text.push_str(&format!(
                "\n> Error message:\n{}",
                indent(SUPPRESSED_FOR_SECURITY)
            ));
        }
        Some(r) => {
            text.push_str(&format!("\n> Error message:\n{}", indent(err)));
            if content_may_contain_secret(r.raw_manifest()) {
                text.push('\n');
                text.push_str(SECRET_CONTENT_PLACEHOLDER);
            } else {
                text.push_str(&format!("\n> Template content:\n{}", indent(r.raw_manifest())));
            }
        }
        None => {
            // File mentioned on stderr but not among the submitted set;
            // report the error without content.
            text.push_str(&format!("\n> Error message:\n{}", indent(err)));
        }
    }
    text
}

fn basename_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use crate::config::TaskConfig;
    use crate::template::ParsedTemplate;

    fn resource(kind: &str, name: &str, file: &str, content: &str) -> Resource {
        let mut config = TaskConfig::new("test-context");
        config.global_kinds.insert(kind.to_string());
        let template = ParsedTemplate {
            file_path: PathBuf::from(file),
            kind: kind.to_string(),
            name: name.to_string(),
            api_version: "v1".to_string(),
            labels: BTreeMap::new(),
            content: content.to_string(),
        };
        Resource::from_template(&template, &config)
    }

    #[test]
    fn test_parse_pruned_round_trip() {
        let stdout = "\
storageclass.storage.k8s.io/old-class pruned
clusterrole.rbac.authorization.k8s.io/stale-role pruned
storageclass.storage.k8s.io/kept configured
";
        assert_eq!(
            parse_pruned(stdout),
            vec![
                "storageclass.storage.k8s.io/old-class",
                "clusterrole.rbac.authorization.k8s.io/stale-role"
            ]
        );
    }

    #[test]
    fn test_bad_file_extraction_classifies_per_file() {
        let r = resource(
            "ClusterRole",
            "x",
            "/tmp/abc/foo.yaml",
            "kind: ClusterRole\nmetadata:\n  name: x\n",
        );
        let attempted = vec![&r];
        let summary = DeploySummary::new();
        record_apply_failure(
            "error when creating \"/tmp/abc/foo.yaml\": ClusterRole \"x\" is invalid",
            &attempted,
            &summary,
        );

        let paragraphs = summary.paragraphs();
        assert_eq!(paragraphs[0], ROLLBACK_WARNING);
        assert!(paragraphs[1].starts_with("Invalid template: foo.yaml"), "{}", paragraphs[1]);
        assert!(paragraphs[1].contains("is invalid"));
        assert!(paragraphs[1].contains("> Template content:"));
        assert!(paragraphs[1].contains("kind: ClusterRole"));
    }

    #[test]
    fn test_sensitive_file_error_is_suppressed() {
        let r = resource(
            "Secret",
            "creds",
            "/templates/creds.yaml",
            "kind: Secret\ndata:\n  password: aHVudGVyMg==\n",
        );
        let attempted = vec![&r];
        let summary = DeploySummary::new();
        record_apply_failure(
            "error validating \"/templates/creds.yaml\": data is invalid: aHVudGVyMg==",
            &attempted,
            &summary,
        );

        let text = summary.paragraphs().join("\n\n");
        assert!(text.contains(SUPPRESSED_FOR_SECURITY));
        assert!(!text.contains("aHVudGVyMg=="), "secret bytes leaked: {text}");
        assert!(!text.contains("> Template content:"), "{text}");
    }

    #[test]
    fn test_secret_looking_content_is_replaced_even_when_not_flagged() {
        // A non-Secret kind whose template embeds a Secret document
        let r = resource(
            "ClusterRole",
            "x",
            "/templates/bundle.yaml",
            "kind: ClusterRole\n---\nkind: Secret\ndata:\n  token: c3VwZXI=\n",
        );
        let attempted = vec![&r];
        let summary = DeploySummary::new();
        record_apply_failure(
            "error when creating \"/templates/bundle.yaml\": something broke",
            &attempted,
            &summary,
        );

        let text = summary.paragraphs().join("\n\n");
        assert!(text.contains("Suppressed because it may contain a Secret"), "{text}");
        assert!(!text.contains("c3VwZXI="), "{text}");
    }

    #[test]
    fn test_unidentified_errors_are_grouped() {
        let r = resource("ClusterRole", "x", "/templates/role.yaml", "kind: ClusterRole\n");
        let attempted = vec![&r];
        let summary = DeploySummary::new();
        record_apply_failure(
            "The connection to the server was refused\nunable to recognize input",
            &attempted,
            &summary,
        );

        let paragraphs = summary.paragraphs();
        assert_eq!(paragraphs[0], ROLLBACK_WARNING);
        assert!(paragraphs[1].starts_with("Unidentified error(s):"), "{}", paragraphs[1]);
        assert!(paragraphs[1].contains("  The connection to the server was refused"));
        assert!(paragraphs[1].contains("  unable to recognize input"));
    }

    #[test]
    fn test_unidentified_errors_suppressed_when_sensitive_resource_present() {
        let secret = resource("Secret", "creds", "/templates/creds.yaml", "kind: Secret\n");
        let attempted = vec![&secret];
        let summary = DeploySummary::new();
        record_apply_failure("raw stderr that might leak: c3VwZXI=", &attempted, &summary);

        let text = summary.paragraphs().join("\n\n");
        assert!(!text.contains("c3VwZXI="), "{text}");
        assert!(text.contains("output suppressed"), "{text}");
    }
}
