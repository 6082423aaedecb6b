//! Overlay templating over a directory of plain manifests.
//!
//! Every YAML or JSON document found under the resource path becomes one
//! child. A directory holding a kustomization file contributes only the
//! entries listed under its `resources`. Overlays copy parent fields into matching documents, then each
//! child name is prefixed with the parent name so several parents can share
//! one namespace.

use std::fs;
use std::path::{Path, PathBuf};

use kube::ResourceExt;
use kube::core::DynamicObject;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use super::{Overlay, TemplatingEngine, TemplatingError};
use crate::resource::{ChildResource, ParentResource};

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];
const KUSTOMIZATION_FILES: &[&str] =
    &["kustomization.yaml", "kustomization.yml", "Kustomization"];

#[derive(Deserialize, Debug, Default)]
struct Kustomization {
    #[serde(default)]
    resources: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ManifestEngine {
    resource_path: PathBuf,
    overlays: Vec<Overlay>,
    name_prefix: bool,
}

impl ManifestEngine {
    pub fn new(resource_path: impl Into<PathBuf>) -> Self {
        Self {
            resource_path: resource_path.into(),
            overlays: Vec::new(),
            name_prefix: true,
        }
    }

    pub fn with_overlays(mut self, overlays: Vec<Overlay>) -> Self {
        self.overlays = overlays;
        self
    }

    /// Keep rendered names as written instead of `<parent>-<name>`.
    pub fn without_name_prefix(mut self) -> Self {
        self.name_prefix = false;
        self
    }

    fn manifest_files(&self) -> Result<Vec<PathBuf>, TemplatingError> {
        let mut files = Vec::new();
        collect_files(&self.resource_path, &mut files)?;
        Ok(files)
    }

    fn load_documents(
        &self,
        path: &Path,
    ) -> Result<Vec<JsonValue>, TemplatingError> {
        let content =
            fs::read_to_string(path).map_err(|source| TemplatingError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut docs = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(&content) {
            let value = JsonValue::deserialize(doc).map_err(|source| {
                TemplatingError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            if value.is_null() {
                continue;
            }
            docs.push(value);
        }
        Ok(docs)
    }
}

/// Manifests under `dir`: the kustomization's resources in listed order
/// when there is one, otherwise every manifest file sorted by path.
fn collect_files(
    dir: &Path,
    out: &mut Vec<PathBuf>,
) -> Result<(), TemplatingError> {
    if let Some(kustomization) = kustomization_file(dir) {
        for entry in read_kustomization(&kustomization)?.resources {
            let path = dir.join(entry);
            if path.is_dir() {
                collect_files(&path, out)?;
            } else {
                out.push(path);
            }
        }
        return Ok(());
    }

    let read_err = |source| TemplatingError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        entries.push(entry.map_err(read_err)?.path());
    }
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn kustomization_file(dir: &Path) -> Option<PathBuf> {
    KUSTOMIZATION_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

fn read_kustomization(path: &Path) -> Result<Kustomization, TemplatingError> {
    let content =
        fs::read_to_string(path).map_err(|source| TemplatingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_yaml::from_str(&content).map_err(|source| TemplatingError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn into_child(
    path: &Path,
    doc: JsonValue,
) -> Result<ChildResource, TemplatingError> {
    let invalid = |reason: String| TemplatingError::InvalidObject {
        path: path.to_path_buf(),
        reason,
    };
    if !doc.is_object() {
        return Err(invalid("document is not a mapping".into()));
    }
    let obj: DynamicObject =
        serde_json::from_value(doc).map_err(|e| invalid(e.to_string()))?;
    match obj.types.as_ref() {
        Some(t) if !t.api_version.is_empty() && !t.kind.is_empty() => {}
        _ => return Err(invalid("missing apiVersion or kind".into())),
    }
    if obj.metadata.name.as_deref().unwrap_or("").is_empty() {
        return Err(invalid("missing metadata.name".into()));
    }
    Ok(obj)
}

impl TemplatingEngine for ManifestEngine {
    fn run(
        &self,
        parent: &ParentResource,
    ) -> Result<Vec<ChildResource>, TemplatingError> {
        let parent_doc = serde_json::to_value(parent)
            .map_err(|e| TemplatingError::Other(e.to_string()))?;
        let parent_name = parent.name_any();

        let mut children = Vec::new();
        for path in self.manifest_files()? {
            for mut doc in self.load_documents(&path)? {
                for overlay in &self.overlays {
                    if overlay.matches(&doc) {
                        trace!(path = %path.display(), overlay = %overlay.name, "applying overlay");
                        overlay.apply(&parent_doc, &mut doc)?;
                    }
                }
                let mut child = into_child(&path, doc)?;
                if self.name_prefix {
                    child.metadata.name =
                        Some(format!("{}-{}", parent_name, child.name_any()));
                }
                children.push(child);
            }
        }
        debug!(
            parent = %parent_name,
            count = children.len(),
            "rendered child resources"
        );
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::parent;
    use crate::templating::FieldBinding;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn renders_documents_in_file_order_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: second\n",
        );
        write(
            dir.path(),
            "a.yaml",
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: first\n---\n\
             ---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n",
        );
        write(dir.path(), "README.md", "not a manifest");

        let engine = ManifestEngine::new(dir.path());
        let children = engine.run(&parent("default", "blog")).unwrap();

        let names: Vec<String> =
            children.iter().map(|c| c.name_any()).collect();
        assert_eq!(names, ["blog-first", "blog-creds", "blog-second"]);
    }

    #[test]
    fn overlays_copy_parent_fields_before_prefixing() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "deploy.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n\
             spec:\n  replicas: 1\n",
        );
        let engine = ManifestEngine::new(dir.path()).with_overlays(vec![
            Overlay {
                api_version: "apps/v1".into(),
                kind: "Deployment".into(),
                name: "web".into(),
                bindings: vec![FieldBinding {
                    from: "spec.image".into(),
                    to: "spec.template.metadata.annotations.image".into(),
                }],
            },
        ]);

        let children = engine.run(&parent("default", "blog")).unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name_any(), "blog-web");
        assert_eq!(
            children[0].data["spec"]["template"]["metadata"]["annotations"]
                ["image"],
            "wordpress:6"
        );
    }

    #[test]
    fn overlays_on_one_document_build_on_each_other() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "deploy.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
        );
        let overlay = |from: &str, to: &str| Overlay {
            api_version: "apps/v1".into(),
            kind: "Deployment".into(),
            name: "web".into(),
            bindings: vec![FieldBinding {
                from: from.into(),
                to: to.into(),
            }],
        };
        let engine = ManifestEngine::new(dir.path()).with_overlays(vec![
            overlay("spec.image", "spec.template.metadata.labels.image"),
            overlay("metadata.name", "spec.template.metadata.labels.instance"),
        ]);

        let children = engine.run(&parent("default", "blog")).unwrap();

        let labels = &children[0].data["spec"]["template"]["metadata"]["labels"];
        assert_eq!(labels["image"], "wordpress:6");
        assert_eq!(labels["instance"], "blog");
    }

    #[test]
    fn kustomization_limits_rendering_to_listed_resources() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "kustomization.yaml",
            "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n\
             resources:\n  - services\n  - cm.yaml\n",
        );
        write(
            dir.path(),
            "cm.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n",
        );
        write(
            dir.path(),
            "unlisted.yaml",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: stray\n",
        );
        let services = dir.path().join("services");
        fs::create_dir(&services).unwrap();
        write(
            &services,
            "svc.yaml",
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n",
        );

        let children = ManifestEngine::new(dir.path())
            .run(&parent("default", "blog"))
            .unwrap();

        let names: Vec<String> =
            children.iter().map(|c| c.name_any()).collect();
        assert_eq!(names, ["blog-web", "blog-cfg"]);
    }

    #[test]
    fn kustomization_naming_a_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "kustomization.yml", "resources:\n  - gone.yaml\n");
        let err = ManifestEngine::new(dir.path())
            .run(&parent("default", "blog"))
            .unwrap_err();
        assert!(matches!(err, TemplatingError::Read { .. }));
    }

    #[test]
    fn rendering_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "cm.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n",
        );
        let engine = ManifestEngine::new(dir.path()).without_name_prefix();
        let p = parent("default", "blog");
        let first = serde_json::to_value(engine.run(&p).unwrap()).unwrap();
        let second = serde_json::to_value(engine.run(&p).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let engine = ManifestEngine::new("/definitely/not/here");
        let err = engine.run(&parent("default", "blog")).unwrap_err();
        assert!(matches!(err, TemplatingError::Read { .. }));
    }

    #[test]
    fn objects_without_kind_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.yaml", "apiVersion: v1\nmetadata:\n  name: x\n");
        let engine = ManifestEngine::new(dir.path());
        let err = engine.run(&parent("default", "blog")).unwrap_err();
        assert!(matches!(err, TemplatingError::InvalidObject { .. }));
    }
}
