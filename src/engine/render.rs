//! engine::render
//!
//! Manifest rendering into an environment's generated directory.
//!
//! Every regular file directly under `template_path` is a template named by
//! its file name. All templates are loaded before any is rendered, so they can
//! include each other. The generated directory is wiped and rebuilt on every
//! run; files that were generated before but have no template any more are
//! reported as removed so the commit deletes them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use minijinja::{context, AutoEscape, UndefinedBehavior};
use tracing::debug;

use super::error::DeployError;
use super::freeze::FREEZE_FILE;
use crate::core::config::Environment;

/// The variables a template can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub service_name: String,
    pub environment: String,
    pub version: String,
}

/// Paths produced by [`render`], relative to the workspace root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub rendered: Vec<String>,
    pub removed: Vec<String>,
}

impl RenderOutput {
    /// Everything the commit has to touch: rendered files, then removals.
    pub fn changed_paths(&self) -> Vec<String> {
        self.rendered
            .iter()
            .chain(self.removed.iter())
            .cloned()
            .collect()
    }
}

/// Render `environment`'s templates inside the workspace at `root`.
///
/// # Errors
///
/// - `Io` when the template directory is missing or a file cannot be written
/// - `Render` when the template directory holds no templates, or the
///   generated directory would swallow it
/// - `Template` when a template fails to parse or references an undefined
///   variable
pub fn render(
    root: &Path,
    environment: &Environment,
    vars: &TemplateVars,
) -> Result<RenderOutput, DeployError> {
    let generated_rel = environment.generated_path.trim_end_matches('/');
    let generated_dir = root.join(generated_rel);
    let template_dir = root.join(environment.template_path.trim_end_matches('/'));

    if environment.generated_overlaps_sources() {
        return Err(DeployError::Render {
            path: environment.generated_path.clone(),
            reason: "generated directory contains the templates",
        });
    }

    let sources = load_templates(&template_dir)?;
    if sources.is_empty() {
        return Err(DeployError::Render {
            path: environment.template_path.clone(),
            reason: "no templates found",
        });
    }

    let previous = list_files(root, &generated_dir)?;

    if generated_dir.exists() {
        std::fs::remove_dir_all(&generated_dir).map_err(|e| DeployError::io(&generated_dir, e))?;
    }
    std::fs::create_dir_all(&generated_dir).map_err(|e| DeployError::io(&generated_dir, e))?;

    let mut env = minijinja::Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    for (name, source) in &sources {
        env.add_template(name, source)
            .map_err(|source| DeployError::Template {
                name: name.clone(),
                source,
            })?;
    }

    let ctx = context! {
        ServiceName => vars.service_name,
        Environment => vars.environment,
        Version => vars.version,
    };

    let mut rendered = Vec::with_capacity(sources.len());
    for (name, _) in &sources {
        let template_error = |source| DeployError::Template {
            name: name.clone(),
            source,
        };
        let output = env
            .get_template(name)
            .and_then(|t| t.render(&ctx))
            .map_err(template_error)?;

        let target = generated_dir.join(name);
        std::fs::write(&target, output).map_err(|e| DeployError::io(&target, e))?;
        rendered.push(join_rel(generated_rel, name));
    }

    let current: BTreeSet<&str> = rendered.iter().map(String::as_str).collect();
    let removed: Vec<String> = previous
        .into_iter()
        .filter(|p| !current.contains(p.as_str()))
        .collect();

    debug!(
        rendered = rendered.len(),
        removed = removed.len(),
        generated = %generated_rel,
        "rendered templates"
    );

    Ok(RenderOutput { rendered, removed })
}

/// `(file name, source)` for each template, sorted by name.
fn load_templates(dir: &Path) -> Result<Vec<(String, String)>, DeployError> {
    let entries = std::fs::read_dir(dir).map_err(|e| DeployError::io(dir, e))?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DeployError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| DeployError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name == FREEZE_FILE {
            continue;
        }
        let path = entry.path();
        let source = std::fs::read_to_string(&path).map_err(|e| DeployError::io(&path, e))?;
        sources.push((name, source));
    }
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(sources)
}

/// Every file below `dir`, as sorted `/`-separated paths relative to `root`.
fn list_files(root: &Path, dir: &Path) -> Result<Vec<String>, DeployError> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }

    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| DeployError::io(&current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| DeployError::io(&current, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| DeployError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if let Ok(rel) = path.strip_prefix(root) {
                let parts: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
    }
    files.sort();
    Ok(files)
}

fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn environment() -> Environment {
        Environment {
            name: "prod".to_string(),
            template_path: "templates/prod".to_string(),
            generated_path: "generated/prod".to_string(),
            allowed_branches: vec![],
            deployment_branch: None,
            freeze_file_path: None,
        }
    }

    fn vars() -> TemplateVars {
        TemplateVars {
            service_name: "payments".to_string(),
            environment: "prod".to_string(),
            version: "abc1234".to_string(),
        }
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).unwrap()
    }

    mod render {
        use super::*;

        #[test]
        fn substitutes_variables() {
            let dir = TempDir::new().unwrap();
            write(
                dir.path(),
                "templates/prod/app.yaml",
                "name: {{ ServiceName }}\nenv: {{ Environment }}\ntag: {{ Version }}\n",
            );

            let out = render(dir.path(), &environment(), &vars()).unwrap();

            assert_eq!(out.rendered, vec!["generated/prod/app.yaml".to_string()]);
            assert!(out.removed.is_empty());
            assert_eq!(
                read(dir.path(), "generated/prod/app.yaml"),
                "name: payments\nenv: prod\ntag: abc1234\n"
            );
        }

        #[test]
        fn output_is_not_html_escaped() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/a.html", "<{{ ServiceName }}> & \"x\"");

            render(dir.path(), &environment(), &vars()).unwrap();

            assert_eq!(read(dir.path(), "generated/prod/a.html"), "<payments> & \"x\"");
        }

        #[test]
        fn unknown_variable_fails() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/bad.yaml", "{{ Replicas }}\n");

            let err = render(dir.path(), &environment(), &vars()).unwrap_err();
            match err {
                DeployError::Template { name, .. } => assert_eq!(name, "bad.yaml"),
                other => panic!("expected template error, got {other:?}"),
            }
        }

        #[test]
        fn templates_include_each_other() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/_labels.tpl", "app: {{ ServiceName }}");
            write(
                dir.path(),
                "templates/prod/deploy.yaml",
                "labels:\n  {% include \"_labels.tpl\" %}\n",
            );

            render(dir.path(), &environment(), &vars()).unwrap();

            assert_eq!(
                read(dir.path(), "generated/prod/deploy.yaml"),
                "labels:\n  app: payments\n"
            );
        }

        #[test]
        fn stale_outputs_are_reported_removed() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/keep.yaml", "k");
            write(dir.path(), "generated/prod/keep.yaml", "old");
            write(dir.path(), "generated/prod/gone.yaml", "old");
            write(dir.path(), "generated/prod/nested/deep.yaml", "old");

            let out = render(dir.path(), &environment(), &vars()).unwrap();

            assert_eq!(out.rendered, vec!["generated/prod/keep.yaml".to_string()]);
            assert_eq!(
                out.removed,
                vec![
                    "generated/prod/gone.yaml".to_string(),
                    "generated/prod/nested/deep.yaml".to_string()
                ]
            );
            assert!(!dir.path().join("generated/prod/gone.yaml").exists());
            assert_eq!(
                out.changed_paths(),
                vec![
                    "generated/prod/keep.yaml".to_string(),
                    "generated/prod/gone.yaml".to_string(),
                    "generated/prod/nested/deep.yaml".to_string()
                ]
            );
        }

        #[test]
        fn subdirectories_and_marker_are_skipped() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/b.yaml", "b");
            write(dir.path(), "templates/prod/a.yaml", "a");
            write(dir.path(), "templates/prod/.freeze", "frozen");
            write(dir.path(), "templates/prod/sub/c.yaml", "c");

            let out = render(dir.path(), &environment(), &vars()).unwrap();

            assert_eq!(
                out.rendered,
                vec![
                    "generated/prod/a.yaml".to_string(),
                    "generated/prod/b.yaml".to_string()
                ]
            );
        }

        #[test]
        fn empty_template_dir_leaves_outputs_alone() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/.freeze", "frozen");
            write(dir.path(), "generated/prod/app.yaml", "old");

            let err = render(dir.path(), &environment(), &vars()).unwrap_err();

            assert!(matches!(err, DeployError::Render { .. }));
            assert_eq!(read(dir.path(), "generated/prod/app.yaml"), "old");
        }

        #[test]
        fn generated_over_templates_keeps_sources() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "templates/prod/app.yaml", "{{ ServiceName }}");
            let env = Environment {
                generated_path: "templates/prod".to_string(),
                ..environment()
            };

            let err = render(dir.path(), &env, &vars()).unwrap_err();

            assert!(matches!(err, DeployError::Render { .. }));
            assert_eq!(read(dir.path(), "templates/prod/app.yaml"), "{{ ServiceName }}");
        }

        #[test]
        fn missing_template_dir_is_io_error() {
            let dir = TempDir::new().unwrap();
            let err = render(dir.path(), &environment(), &vars()).unwrap_err();
            assert!(matches!(err, DeployError::Io { .. }));
        }
    }
}
