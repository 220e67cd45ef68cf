//! Manifest inspection and path-dependency pinning.

use anyhow::Result;
use serde_json::json;

use relkit_core::manifest::{self, DependencySource, Manifest};
use relkit_core::outcome::StageReport;
use relkit_core::package::classify;
use relkit_core::targets::TargetSpec;

use crate::formatting::{
    print_dependency_table, print_error, print_key_value, print_outcome_table, print_section_header,
    print_success,
};

use super::Session;

/// Lists the dependencies of each target, or pins path dependencies to a version.
pub fn cmd_pyproject(
    session: &Session,
    targets: &TargetSpec,
    pin_version: Option<&str>,
    json: bool,
) -> Result<bool> {
    let manifest_name = session.settings.manifest_name.as_str();
    let manifests = targets.resolve(manifest_name)?;

    if let Some(version) = pin_version {
        let mut combined = StageReport::new();
        for path in &manifests {
            combined.merge(manifest::pin_path_dependencies(path, version, manifest_name)?);
        }
        if json {
            println!("{}", serde_json::to_string_pretty(&combined)?);
        } else {
            print_outcome_table(&combined);
            if combined.success {
                print_success(&format!("Pinned path dependencies to {}", version));
            } else {
                print_error("Some path dependencies could not be updated");
            }
        }
        return Ok(combined.success);
    }

    let mut listings = Vec::new();
    for path in &manifests {
        let manifest = Manifest::read(path)?;
        let classification = classify(&manifest);
        let dependencies = manifest.dependencies();

        if json {
            let entries: Vec<_> = dependencies
                .iter()
                .filter_map(|dep| match &dep.source {
                    DependencySource::Path(p) => Some(json!({
                        "name": dep.name,
                        "path": p,
                    })),
                    DependencySource::Git(git) => Some(json!({
                        "name": dep.name,
                        "git": git.url,
                        "branch": git.branch,
                        "subdirectory": git.subdirectory,
                        "optional": git.optional,
                    })),
                    _ => None,
                })
                .collect();
            listings.push(json!({
                "manifest": path,
                "name": classification.name,
                "kind": classification.kind,
                "version": manifest.version(),
                "dependencies": entries,
            }));
            continue;
        }

        print_section_header(&path.display().to_string());
        print_key_value("Name:", &classification.name);
        print_key_value("Kind:", &classification.kind.to_string());
        print_key_value("Version:", manifest.version().as_deref().unwrap_or("(none)"));
        let local: Vec<_> = dependencies
            .into_iter()
            .filter(|dep| {
                matches!(
                    dep.source,
                    DependencySource::Path(_) | DependencySource::Git(_)
                )
            })
            .collect();
        if local.is_empty() {
            print_key_value("Dependencies:", "no path or git dependencies");
        } else {
            println!();
            print_dependency_table(&local);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
    }
    Ok(true)
}
